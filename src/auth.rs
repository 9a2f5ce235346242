use crate::config::IssuerConfig;
use crate::context::CallerContext;
use crate::error::{Error, Result};
use std::fmt;

/// Administrative operations reserved for the issuing organization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    GenerateKeyPair,
    StorePrivateKey,
    StorePublicKey,
    StoreKeyPair,
    GetPrivateKey,
    SetBankAccount,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub fn is_issuer(config: &IssuerConfig, org_id: &str) -> bool {
    org_id == config.issuer_org
}

/// Reject `op` unless the caller belongs to the issuer organization.
///
/// Must run before any state is touched.
pub fn ensure_issuer(config: &IssuerConfig, ctx: &CallerContext, op: Operation) -> Result<()> {
    if is_issuer(config, ctx.org_id()) {
        return Ok(());
    }
    tracing::warn!(operation = %op, org = ctx.org_id(), "unauthorized administrative call");
    Err(Error::Unauthorized(op.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_issuer_passes() {
        let config = IssuerConfig::default();
        assert!(is_issuer(&config, "Org1MSP"));
        assert!(!is_issuer(&config, "Org2MSP"));
        assert!(!is_issuer(&config, "org1msp"));

        let bank = CallerContext::new("Org1MSP", "admin");
        assert!(ensure_issuer(&config, &bank, Operation::SetBankAccount).is_ok());
    }

    #[test]
    fn error_names_the_operation() {
        let config = IssuerConfig::default();
        let outsider = CallerContext::new("WRONG_ORG", "mallory");
        let err = ensure_issuer(&config, &outsider, Operation::StorePublicKey).unwrap_err();
        assert_eq!(err.to_string(), "client is not authorized to call StorePublicKey");
    }

    #[test]
    fn follows_configured_issuer() {
        let config = IssuerConfig::new("CentralBankMSP");
        let ctx = CallerContext::new("Org1MSP", "admin");
        assert!(ensure_issuer(&config, &ctx, Operation::GenerateKeyPair).is_err());
    }
}

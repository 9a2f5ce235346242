use crate::error::{Error, Result};
use crate::ledger::Partition;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ISSUER_ORG: &str = "Org1MSP";
pub const DEFAULT_KEY_BITS: usize = 2048;

const MIN_KEY_BITS: usize = 1024;
const MAX_KEY_BITS: usize = 4096;

/// Issuer-side settings shared by the key custodian and the payment engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IssuerConfig {
    /// Organization that acts as the issuing bank.
    pub issuer_org: String,
    /// RSA modulus size used by `GenerateKeyPair`.
    pub key_bits: usize,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            issuer_org: DEFAULT_ISSUER_ORG.to_string(),
            key_bits: DEFAULT_KEY_BITS,
        }
    }
}

impl IssuerConfig {
    pub fn new(issuer_org: impl Into<String>) -> Self {
        Self {
            issuer_org: issuer_org.into(),
            ..Self::default()
        }
    }

    pub fn with_key_bits(mut self, key_bits: usize) -> Self {
        self.key_bits = key_bits;
        self
    }

    /// Parse a JSON document, filling absent fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.issuer_org.trim().is_empty() {
            return Err(Error::Config("issuer_org must not be empty".to_string()));
        }
        if self.key_bits < MIN_KEY_BITS || self.key_bits > MAX_KEY_BITS {
            return Err(Error::Config(format!(
                "key_bits must be between {} and {}, got {}",
                MIN_KEY_BITS, MAX_KEY_BITS, self.key_bits
            )));
        }
        Ok(())
    }

    /// The confidentiality partition owned by the issuer.
    pub fn issuer_partition(&self) -> Partition {
        Partition::implicit_org(&self.issuer_org)
    }
}

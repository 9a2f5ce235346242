//! Issuer key management and settlement configuration.
//!
//! Every operation here is reserved for the issuer organization. The private
//! key only ever lives in the issuer's confidentiality partition; the public
//! key is published to world state for payers to blind against.

use crate::auth::{ensure_issuer, Operation};
use crate::config::IssuerConfig;
use crate::context::{CallerContext, ConfidentialInput};
use crate::error::{Error, Result};
use crate::keys::{self, PrivateKeyRecord};
use crate::ledger::{LedgerKey, PrivateState, WorldState};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use rand::rngs::OsRng;
use rsa::{RsaPrivateKey, RsaPublicKey};

/// Name of the confidential field carrying private key material.
pub const CONFIDENTIAL_KEY_FIELD: &str = "key";

#[derive(Clone, Debug, Default)]
pub struct KeyCustodian {
    config: IssuerConfig,
}

impl KeyCustodian {
    pub fn new(config: IssuerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    /// Generate a fresh issuer keypair and return its private record as Base64.
    ///
    /// The result holds private key material. Hosts must serve this as a
    /// query and never append it to a replicated transaction.
    pub fn generate_key_pair(&self, ctx: &CallerContext) -> Result<String> {
        ensure_issuer(&self.config, ctx, Operation::GenerateKeyPair)?;
        self.config.validate()?;

        let raw = keys::generate_private_key(&mut OsRng, self.config.key_bits)?;
        tracing::info!(bits = self.config.key_bits, "generated issuer keypair");
        Ok(BASE64_STANDARD.encode(raw.as_slice()))
    }

    /// Store the private key delivered in the confidential `key` field.
    pub fn store_private_key<L>(
        &self,
        ctx: &CallerContext,
        ledger: &mut L,
        input: &ConfidentialInput,
    ) -> Result<()>
    where
        L: PrivateState + ?Sized,
    {
        ensure_issuer(&self.config, ctx, Operation::StorePrivateKey)?;
        let (raw, _) = confidential_private_key(input)?;
        self.put_private_key(ledger, raw)
    }

    pub fn store_public_key<L>(
        &self,
        ctx: &CallerContext,
        ledger: &mut L,
        public: &str,
    ) -> Result<()>
    where
        L: WorldState + ?Sized,
    {
        ensure_issuer(&self.config, ctx, Operation::StorePublicKey)?;
        let pk = keys::public_key_from_base64(public)?;
        ledger.put_state(&self.public_key_entry(), public.trim().as_bytes())?;
        tracing::info!(key = %keys::fingerprint(&pk), "published issuer public key");
        Ok(())
    }

    /// Store the private key from the confidential `key` field and publish
    /// its public half, in one call.
    pub fn store_key_pair<L>(
        &self,
        ctx: &CallerContext,
        ledger: &mut L,
        input: &ConfidentialInput,
    ) -> Result<()>
    where
        L: WorldState + PrivateState + ?Sized,
    {
        ensure_issuer(&self.config, ctx, Operation::StoreKeyPair)?;
        let (raw, record) = confidential_private_key(input)?;
        let pk = record.public().to_key()?;

        self.put_private_key(ledger, raw)?;
        ledger.put_state(
            &self.public_key_entry(),
            keys::public_key_to_base64(&pk)?.as_bytes(),
        )?;
        tracing::info!(key = %keys::fingerprint(&pk), "stored issuer keypair");
        Ok(())
    }

    /// Read back the stored private key as Base64.
    pub fn get_private_key<L>(&self, ctx: &CallerContext, ledger: &L) -> Result<String>
    where
        L: PrivateState + ?Sized,
    {
        ensure_issuer(&self.config, ctx, Operation::GetPrivateKey)?;
        let raw = ledger
            .get_private(&self.config.issuer_partition(), &self.private_key_entry())?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::KeyUnavailable("private key not stored".to_string()))?;
        Ok(BASE64_STANDARD.encode(raw))
    }

    pub fn set_bank_account<L>(
        &self,
        ctx: &CallerContext,
        ledger: &mut L,
        account: &str,
    ) -> Result<()>
    where
        L: WorldState + ?Sized,
    {
        ensure_issuer(&self.config, ctx, Operation::SetBankAccount)?;
        if account.trim().is_empty() {
            return Err(Error::MissingInput("account"));
        }
        ledger.put_state(&self.settlement_entry(), account.as_bytes())?;
        tracing::info!(account, "settlement account set");
        Ok(())
    }

    fn put_private_key<L>(&self, ledger: &mut L, raw: &[u8]) -> Result<()>
    where
        L: PrivateState + ?Sized,
    {
        ledger.put_private(&self.config.issuer_partition(), &self.private_key_entry(), raw)?;
        tracing::info!(partition = %self.config.issuer_partition(), "stored issuer private key");
        Ok(())
    }

    fn public_key_entry(&self) -> LedgerKey {
        LedgerKey::IssuerPublicKey(self.config.issuer_org.clone())
    }

    fn private_key_entry(&self) -> LedgerKey {
        LedgerKey::IssuerPrivateKey(self.config.issuer_org.clone())
    }

    fn settlement_entry(&self) -> LedgerKey {
        LedgerKey::SettlementAccount(self.config.issuer_org.clone())
    }

    /// The published public key, as stored. Readable by anyone.
    pub fn get_public_key<L>(&self, ledger: &L) -> Result<String>
    where
        L: WorldState + ?Sized,
    {
        let raw = ledger
            .get_state(&self.public_key_entry())?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::KeyUnavailable("public key not published".to_string()))?;
        String::from_utf8(raw).map_err(|e| Error::encoding("pubkey", e))
    }

    pub(crate) fn load_public_key<L>(&self, ledger: &L) -> Result<RsaPublicKey>
    where
        L: WorldState + ?Sized,
    {
        keys::public_key_from_base64(&self.get_public_key(ledger)?)
    }

    /// Private key for signing. Fails unless the request executes on an
    /// issuer peer, because the partition is unreadable anywhere else.
    pub(crate) fn load_private_key<L>(&self, ledger: &L) -> Result<RsaPrivateKey>
    where
        L: PrivateState + ?Sized,
    {
        let raw = ledger
            .get_private(&self.config.issuer_partition(), &self.private_key_entry())?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::KeyUnavailable("private key not stored".to_string()))?;
        keys::private_key_from_json(&raw)?.to_key()
    }

    pub(crate) fn load_settlement_account<L>(&self, ledger: &L) -> Result<String>
    where
        L: WorldState + ?Sized,
    {
        let raw = ledger
            .get_state(&self.settlement_entry())?
            .filter(|v| !v.is_empty())
            .ok_or(Error::AccountNotConfigured)?;
        String::from_utf8(raw).map_err(|e| Error::encoding("settlement account", e))
    }
}

fn confidential_private_key(input: &ConfidentialInput) -> Result<(&[u8], PrivateKeyRecord)> {
    let raw = input
        .get(CONFIDENTIAL_KEY_FIELD)
        .ok_or(Error::MissingInput(CONFIDENTIAL_KEY_FIELD))?;
    let record = keys::private_key_from_json(raw)?;
    record.to_key()?;
    Ok((raw, record))
}

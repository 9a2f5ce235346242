//! Interfaces to the host ledger.
//!
//! The payment core never talks to storage through raw strings. Every entry
//! is addressed by a [`LedgerKey`], whose variants render to disjoint
//! prefixes, so a debit proof can never shadow a credit proof, the public key
//! or the settlement account.

use std::fmt;
use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("peer of {peer} cannot access private partition {partition}")]
    Forbidden { partition: String, peer: String },

    #[error("{0}")]
    Backend(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("account {account} has insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds {
        account: String,
        balance: u64,
        required: u64,
    },

    #[error("transfer amount must be positive")]
    ZeroAmount,

    #[error("cannot transfer to the same account {0}")]
    SelfTransfer(String),

    #[error("{0}")]
    Backend(String),
}

/// Typed address of every entry the payment core reads or writes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LedgerKey {
    /// Issuer public key, global, keyed by issuer organization.
    IssuerPublicKey(String),
    /// Issuer private key, only ever stored inside the issuer partition.
    IssuerPrivateKey(String),
    /// Settlement account configured by the issuer.
    SettlementAccount(String),
    /// Debit marker, keyed by the Base64 blinded message.
    DebitProof(String),
    /// Credit marker, keyed by the plaintext token id.
    CreditProof(String),
}

impl LedgerKey {
    pub const DEBIT_PREFIX: &'static str = "debit_";
    pub const CREDIT_PREFIX: &'static str = "credit_";

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::IssuerPublicKey(_) => "pubkey_",
            Self::IssuerPrivateKey(_) => "privkey_",
            Self::SettlementAccount(_) => "account_",
            Self::DebitProof(_) => Self::DEBIT_PREFIX,
            Self::CreditProof(_) => Self::CREDIT_PREFIX,
        }
    }

    fn id(&self) -> &str {
        match self {
            Self::IssuerPublicKey(id)
            | Self::IssuerPrivateKey(id)
            | Self::SettlementAccount(id)
            | Self::DebitProof(id)
            | Self::CreditProof(id) => id,
        }
    }

    /// Storage representation of the key.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix(), self.id())
    }
}

/// A confidentiality partition readable only by peers of its owner.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Partition {
    owner: String,
}

impl Partition {
    pub fn implicit_org(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_implicit_org_{}", self.owner)
    }
}

/// Globally readable key-value state.
pub trait WorldState {
    fn get_state(&self, key: &LedgerKey) -> StoreResult<Option<Vec<u8>>>;
    fn put_state(&mut self, key: &LedgerKey, value: &[u8]) -> StoreResult<()>;

    /// Write `value` unless `key` already holds something.
    ///
    /// Returns `false` without writing when the entry exists. Conflicting
    /// writers are ordered by the surrounding transaction.
    fn insert_if_absent(&mut self, key: &LedgerKey, value: &[u8]) -> StoreResult<bool> {
        if self.contains(key)? {
            return Ok(false);
        }
        self.put_state(key, value)?;
        Ok(true)
    }

    fn contains(&self, key: &LedgerKey) -> StoreResult<bool> {
        Ok(self
            .get_state(key)?
            .map(|v| !v.is_empty())
            .unwrap_or(false))
    }
}

/// Partitioned state hidden from peers outside the owning organization.
pub trait PrivateState {
    fn get_private(&self, partition: &Partition, key: &LedgerKey)
        -> StoreResult<Option<Vec<u8>>>;
    fn put_private(&mut self, partition: &Partition, key: &LedgerKey, value: &[u8])
        -> StoreResult<()>;
}

/// The base token ledger. Only its transfer primitive is used here.
pub trait FungibleLedger {
    fn transfer(&mut self, from: &str, to: &str, amount: u64) -> Result<(), TransferError>;
}

/// Everything a payment transaction needs from the host.
pub trait Ledger: WorldState + PrivateState + FungibleLedger {}

impl<T: WorldState + PrivateState + FungibleLedger + ?Sized> Ledger for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_kinds_never_collide() {
        let id = "Org1MSP".to_string();
        let keys = vec![
            LedgerKey::IssuerPublicKey(id.clone()),
            LedgerKey::IssuerPrivateKey(id.clone()),
            LedgerKey::SettlementAccount(id.clone()),
            LedgerKey::DebitProof(id.clone()),
            LedgerKey::CreditProof(id),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a.encode(), b.encode());
                assert!(!a.encode().starts_with(b.prefix()));
                assert!(!b.encode().starts_with(a.prefix()));
            }
        }
    }

    #[test]
    fn encoding() {
        assert_eq!(LedgerKey::DebitProof("abc".into()).encode(), "debit_abc");
        assert_eq!(LedgerKey::CreditProof("t-1".into()).to_string(), "credit_t-1");
        assert_eq!(
            Partition::implicit_org("Org1MSP").to_string(),
            "_implicit_org_Org1MSP"
        );
    }
}

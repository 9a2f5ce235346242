//! In-process ledger used by tests and as a reference for host adapters.
//!
//! Transactions run one at a time under a mutex against a private copy of the
//! committed state. The copy replaces the committed state only when the
//! transaction body returns `Ok`, so a failed call leaves no trace.

use crate::context::CallerContext;
use crate::ledger::{
    FungibleLedger, LedgerKey, Partition, PrivateState, StoreError, StoreResult, TransferError,
    WorldState,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Clone, Debug, Default)]
struct LedgerState {
    world: BTreeMap<String, Vec<u8>>,
    private: BTreeMap<(String, String), Vec<u8>>,
    balances: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // a panicking transaction never commits, so the guarded state is intact
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `body` as one serialized, all-or-nothing transaction for `ctx`.
    pub fn transact<T, E, F>(&self, ctx: &CallerContext, body: F) -> Result<T, E>
    where
        F: FnOnce(&mut Transaction) -> Result<T, E>,
    {
        let mut committed = self.lock();
        let mut tx = Transaction {
            working: committed.clone(),
            peer_org: ctx.peer_org().to_string(),
        };
        let out = body(&mut tx)?;
        *committed = tx.working;
        Ok(out)
    }

    /// Credit `account` out of thin air. Test setup only; the base token
    /// ledger owns minting.
    pub fn mint(&self, account: &str, amount: u64) -> Result<(), TransferError> {
        let mut state = self.lock();
        let balance = state.balances.entry(account.to_string()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| TransferError::Backend(format!("balance overflow for {}", account)))?;
        Ok(())
    }

    pub fn balance(&self, account: &str) -> u64 {
        self.lock().balances.get(account).copied().unwrap_or(0)
    }

    pub fn get_state(&self, key: &LedgerKey) -> Option<Vec<u8>> {
        self.lock().world.get(&key.encode()).cloned()
    }

    /// Number of committed world-state entries whose key starts with `prefix`.
    pub fn count_prefixed(&self, prefix: &str) -> usize {
        self.lock()
            .world
            .keys()
            .filter(|k| k.starts_with(prefix))
            .count()
    }
}

/// Uncommitted view handed to a transaction body.
pub struct Transaction {
    working: LedgerState,
    peer_org: String,
}

impl Transaction {
    fn check_partition(&self, partition: &Partition) -> StoreResult<()> {
        if partition.owner() == self.peer_org {
            Ok(())
        } else {
            Err(StoreError::Forbidden {
                partition: partition.to_string(),
                peer: self.peer_org.clone(),
            })
        }
    }
}

impl WorldState for Transaction {
    fn get_state(&self, key: &LedgerKey) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.working.world.get(&key.encode()).cloned())
    }

    fn put_state(&mut self, key: &LedgerKey, value: &[u8]) -> StoreResult<()> {
        self.working.world.insert(key.encode(), value.to_vec());
        Ok(())
    }
}

impl PrivateState for Transaction {
    fn get_private(
        &self,
        partition: &Partition,
        key: &LedgerKey,
    ) -> StoreResult<Option<Vec<u8>>> {
        self.check_partition(partition)?;
        Ok(self
            .working
            .private
            .get(&(partition.to_string(), key.encode()))
            .cloned())
    }

    fn put_private(
        &mut self,
        partition: &Partition,
        key: &LedgerKey,
        value: &[u8],
    ) -> StoreResult<()> {
        self.check_partition(partition)?;
        self.working
            .private
            .insert((partition.to_string(), key.encode()), value.to_vec());
        Ok(())
    }
}

impl FungibleLedger for Transaction {
    fn transfer(&mut self, from: &str, to: &str, amount: u64) -> Result<(), TransferError> {
        if amount == 0 {
            return Err(TransferError::ZeroAmount);
        }
        if from == to {
            return Err(TransferError::SelfTransfer(from.to_string()));
        }
        let balance = self.working.balances.get(from).copied().unwrap_or(0);
        if balance < amount {
            return Err(TransferError::InsufficientFunds {
                account: from.to_string(),
                balance,
                required: amount,
            });
        }
        let credited = self.working.balances.get(to).copied().unwrap_or(0);
        let credited = credited
            .checked_add(amount)
            .ok_or_else(|| TransferError::Backend(format!("balance overflow for {}", to)))?;
        self.working.balances.insert(from.to_string(), balance - amount);
        self.working.balances.insert(to.to_string(), credited);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(org: &str) -> CallerContext {
        CallerContext::new(org, "tester")
    }

    #[test]
    fn failed_transaction_discards_writes() {
        let ledger = MemoryLedger::new();
        ledger.mint("alice", 5).unwrap();

        let res: Result<(), StoreError> = ledger.transact(&ctx("Org2MSP"), |tx| {
            tx.put_state(&LedgerKey::DebitProof("b".into()), b"b")?;
            tx.transfer("alice", "bank", 2).map_err(|e| StoreError::Backend(e.to_string()))?;
            Err(StoreError::Backend("boom".into()))
        });

        assert!(res.is_err());
        assert_eq!(ledger.get_state(&LedgerKey::DebitProof("b".into())), None);
        assert_eq!(ledger.balance("alice"), 5);
        assert_eq!(ledger.balance("bank"), 0);
    }

    #[test]
    fn insert_if_absent_is_write_once() -> StoreResult<()> {
        let ledger = MemoryLedger::new();
        let key = LedgerKey::CreditProof("token".into());

        let first = ledger.transact(&ctx("Org2MSP"), |tx| tx.insert_if_absent(&key, b"1"))?;
        let second = ledger.transact(&ctx("Org2MSP"), |tx| tx.insert_if_absent(&key, b"2"))?;

        assert!(first);
        assert!(!second);
        assert_eq!(ledger.get_state(&key), Some(b"1".to_vec()));
        Ok(())
    }

    #[test]
    fn private_partition_is_scoped_to_peer_org() {
        let ledger = MemoryLedger::new();
        let partition = Partition::implicit_org("Org1MSP");
        let key = LedgerKey::IssuerPrivateKey("Org1MSP".into());

        ledger
            .transact(&ctx("Org1MSP"), |tx| tx.put_private(&partition, &key, b"secret"))
            .unwrap();

        let err = ledger
            .transact(&ctx("Org2MSP"), |tx| tx.get_private(&partition, &key))
            .unwrap_err();
        assert!(matches!(err, StoreError::Forbidden { .. }));

        // a foreign client whose request reaches an issuer peer can read it
        let routed = ctx("Org2MSP").on_peer("Org1MSP");
        let value = ledger
            .transact(&routed, |tx| tx.get_private(&partition, &key))
            .unwrap();
        assert_eq!(value, Some(b"secret".to_vec()));
    }

    #[test]
    fn transfer_checks_funds() {
        let ledger = MemoryLedger::new();
        ledger.mint("alice", 1).unwrap();

        let err = ledger
            .transact(&ctx("Org2MSP"), |tx| tx.transfer("alice", "bank", 2))
            .unwrap_err();
        assert_eq!(
            err,
            TransferError::InsufficientFunds {
                account: "alice".into(),
                balance: 1,
                required: 2
            }
        );

        ledger
            .transact(&ctx("Org2MSP"), |tx| tx.transfer("alice", "bank", 1))
            .unwrap();
        assert_eq!(ledger.balance("alice"), 0);
        assert_eq!(ledger.balance("bank"), 1);
    }

    #[test]
    fn mint_rejects_overflow() {
        let ledger = MemoryLedger::new();
        ledger.mint("alice", u64::MAX).unwrap();

        let err = ledger.mint("alice", 1).unwrap_err();
        assert!(matches!(err, TransferError::Backend(_)));
        assert_eq!(ledger.balance("alice"), u64::MAX);
    }
}

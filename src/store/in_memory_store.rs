use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    account::{Account, AccountId},
    ledger::{NewTransactionRecord, Order, Role, TransactionLog, TransactionRecord},
};

use super::{
    AccountStore, CommitOutcome, CommittedTransfer, StoreError, TransactionLedger, TransferCommit,
    TransferStore,
};

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

#[derive(Debug, Default)]
struct LedgerState {
    log: TransactionLog,
    attempts: HashMap<(AccountId, String), CommittedTransfer>,
}

/// Process-local store.
///
/// Each account sits behind its own mutex; a commit locks just the two
/// accounts it touches (in id order, so opposite transfers cannot deadlock)
/// and then the ledger, in that order. Readers of the ledger never hold an
/// account lock.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<Account>>>>,
    ledger: Mutex<LedgerState>,
}

impl InMemoryStore {
    fn handle(&self, account_id: &str) -> Result<Option<Arc<Mutex<Account>>>, StoreError> {
        let accounts = self.accounts.read().map_err(poisoned)?;
        Ok(accounts.get(account_id).cloned())
    }

    fn require_handle(&self, account_id: &str) -> Result<Arc<Mutex<Account>>, StoreError> {
        self.handle(account_id)?
            .ok_or_else(|| StoreError::MissingAccount {
                account_id: account_id.to_string(),
            })
    }

    fn query(
        &self,
        account_id: &str,
        role: Role,
        limit: usize,
        order: Order,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let ledger = self.ledger.lock().map_err(poisoned)?;
        Ok(ledger.log.query(account_id, role, limit, order))
    }
}

impl AccountStore for InMemoryStore {
    fn create_account(
        &self,
        name: &str,
        starting_balance: Decimal,
    ) -> Result<Account, StoreError> {
        let account = Account::open(Uuid::new_v4().to_string(), name.to_string(), starting_balance);
        let mut accounts = self.accounts.write().map_err(poisoned)?;
        accounts.insert(
            account.id().to_string(),
            Arc::new(Mutex::new(account.clone())),
        );
        tracing::trace!(account_id = account.id(), "account stored");
        Ok(account)
    }

    fn account(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        match self.handle(account_id)? {
            Some(handle) => Ok(Some(handle.lock().map_err(poisoned)?.clone())),
            None => Ok(None),
        }
    }

    /// Snapshot of every account. All of them are locked together, in the same
    /// id order `commit_transfer` uses, so no transfer is seen half applied.
    fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut handles: Vec<(AccountId, Arc<Mutex<Account>>)> = self
            .accounts
            .read()
            .map_err(poisoned)?
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect();
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        let guards = handles
            .iter()
            .map(|(_, handle)| handle.lock().map_err(poisoned))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(guards.iter().map(|account| Account::clone(account)).collect())
    }
}

impl TransactionLedger for InMemoryStore {
    fn query_by_sender(
        &self,
        account_id: &str,
        limit: usize,
        order: Order,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        self.query(account_id, Role::Sent, limit, order)
    }

    fn query_by_recipient(
        &self,
        account_id: &str,
        limit: usize,
        order: Order,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        self.query(account_id, Role::Received, limit, order)
    }

    fn find_attempt(
        &self,
        sender_id: &str,
        attempt_id: &str,
    ) -> Result<Option<CommittedTransfer>, StoreError> {
        let ledger = self.ledger.lock().map_err(poisoned)?;
        Ok(ledger
            .attempts
            .get(&(sender_id.to_string(), attempt_id.to_string()))
            .cloned())
    }
}

impl TransferStore for InMemoryStore {
    fn commit_transfer(&self, commit: TransferCommit) -> Result<CommitOutcome, StoreError> {
        let sender_handle = self.require_handle(&commit.sender_id)?;
        let recipient_handle = self.require_handle(&commit.recipient_id)?;

        let (mut sender, mut recipient) = if commit.sender_id < commit.recipient_id {
            let sender = sender_handle.lock().map_err(poisoned)?;
            let recipient = recipient_handle.lock().map_err(poisoned)?;
            (sender, recipient)
        } else {
            let recipient = recipient_handle.lock().map_err(poisoned)?;
            let sender = sender_handle.lock().map_err(poisoned)?;
            (sender, recipient)
        };
        let mut ledger = self.ledger.lock().map_err(poisoned)?;

        let attempt_key = commit
            .attempt_id
            .as_ref()
            .map(|attempt_id| (commit.sender_id.clone(), attempt_id.clone()));
        if let Some(existing) = attempt_key.as_ref().and_then(|key| ledger.attempts.get(key)) {
            return Ok(CommitOutcome::Replayed(existing.clone()));
        }

        if sender.version() != commit.sender_version {
            return Err(StoreError::Conflict {
                account_id: commit.sender_id,
            });
        }
        if recipient.version() != commit.recipient_version {
            return Err(StoreError::Conflict {
                account_id: commit.recipient_id,
            });
        }

        // nothing below can fail, so either all of it is visible or none of it
        sender.apply(&commit.sender_event);
        recipient.apply(&commit.recipient_event);
        let record = ledger
            .log
            .append(NewTransactionRecord {
                sender_id: commit.sender_id,
                sender_name: sender.name().to_string(),
                recipient_id: commit.recipient_id,
                recipient_name: recipient.name().to_string(),
                amount: commit.amount,
                attempt_id: commit.attempt_id,
            })
            .clone();
        let committed = CommittedTransfer {
            record,
            sender_balance: sender.balance(),
        };
        if let Some(key) = attempt_key {
            ledger.attempts.insert(key, committed.clone());
        }
        tracing::trace!(record_id = %committed.record.id(), "transfer committed");
        Ok(CommitOutcome::Applied(committed))
    }
}

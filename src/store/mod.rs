use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    account::{Account, AccountEvent, AccountId},
    ledger::{Order, TransactionRecord},
};

pub mod in_memory_store;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Account {account_id} was modified concurrently")]
    Conflict { account_id: AccountId },
    #[error("Account {account_id} does not exist")]
    MissingAccount { account_id: AccountId },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// All effects of one transfer, built from account snapshots taken at
/// `sender_version` / `recipient_version`.
///
/// Only the transfer engine creates commits, so there is no way to set a
/// balance from outside of a transfer.
#[derive(Debug, Clone)]
pub struct TransferCommit {
    pub(crate) sender_id: AccountId,
    pub(crate) sender_version: u64,
    pub(crate) sender_event: AccountEvent,
    pub(crate) recipient_id: AccountId,
    pub(crate) recipient_version: u64,
    pub(crate) recipient_event: AccountEvent,
    pub(crate) amount: Decimal,
    pub(crate) attempt_id: Option<String>,
}

impl TransferCommit {
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn attempt_id(&self) -> Option<&str> {
        self.attempt_id.as_deref()
    }
}

/// A transfer as it was committed, together with the sender's balance right
/// after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTransfer {
    pub record: TransactionRecord,
    pub sender_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied(CommittedTransfer),
    /// The attempt id was already committed; nothing was changed.
    Replayed(CommittedTransfer),
}

pub trait AccountStore {
    fn create_account(&self, name: &str, starting_balance: Decimal)
    -> Result<Account, StoreError>;

    fn account(&self, account_id: &str) -> Result<Option<Account>, StoreError>;

    fn accounts(&self) -> Result<Vec<Account>, StoreError>;
}

pub trait TransactionLedger {
    fn query_by_sender(
        &self,
        account_id: &str,
        limit: usize,
        order: Order,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    fn query_by_recipient(
        &self,
        account_id: &str,
        limit: usize,
        order: Order,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    fn find_attempt(
        &self,
        sender_id: &str,
        attempt_id: &str,
    ) -> Result<Option<CommittedTransfer>, StoreError>;
}

/// Store able to apply a [`TransferCommit`] as a single atomic step: both
/// balance changes and the ledger record are written together, or the commit
/// fails with [`StoreError::Conflict`] when either account changed since the
/// snapshot it was built from.
pub trait TransferStore: AccountStore + TransactionLedger {
    fn commit_transfer(&self, commit: TransferCommit) -> Result<CommitOutcome, StoreError>;
}

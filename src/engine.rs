use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::{
    account::{AccountError, AccountId},
    command::{CommandError, TransferCommand, TransferRequest},
    ledger::{RecordId, TransactionRecord},
    store::{CommitOutcome, CommittedTransfer, StoreError, TransferCommit, TransferStore},
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },
    #[error("Recipient id is required")]
    MissingRecipient,
    #[error("Cannot transfer from account {account_id} to itself")]
    SelfTransfer { account_id: AccountId },
    #[error("Recipient {recipient_id} not found")]
    RecipientNotFound { recipient_id: AccountId },
    #[error("Sender {sender_id} not found")]
    SenderNotFound { sender_id: AccountId },
    #[error("Insufficient balance: balance {balance}, requested {requested}")]
    InsufficientBalance {
        balance: Decimal,
        requested: Decimal,
    },
    #[error("Attempt id must not be blank")]
    InvalidAttemptId,
    #[error("Attempt id `{attempt_id}` was already used for a different transfer")]
    AttemptIdReused { attempt_id: String },
    #[error("Transfer gave up after {attempts} concurrent modifications")]
    Contention { attempts: u32 },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl TransferError {
    /// Stable name of the error kind, suitable for wire formats.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "InvalidAmount",
            Self::MissingRecipient => "MissingRecipient",
            Self::SelfTransfer { .. } => "SelfTransfer",
            Self::RecipientNotFound { .. } => "RecipientNotFound",
            Self::SenderNotFound { .. } => "SenderNotFound",
            Self::InsufficientBalance { .. } => "InsufficientBalance",
            Self::InvalidAttemptId => "InvalidAttemptId",
            Self::AttemptIdReused { .. } => "AttemptIdReused",
            Self::Contention { .. } => "Contention",
            Self::Unavailable(_) => "Unavailable",
        }
    }

    /// Text meant for the person who submitted the transfer.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "Amount must be greater than 0, with at most 2 decimals.",
            Self::MissingRecipient => "Please enter recipient User ID.",
            Self::SelfTransfer { .. } => "Cannot send money to yourself.",
            Self::RecipientNotFound { .. } => "Recipient not found. Please check the User ID.",
            Self::SenderNotFound { .. } => "Your account could not be found. Please sign in again.",
            Self::InsufficientBalance { .. } => "Insufficient balance.",
            Self::InvalidAttemptId => {
                "The request is missing its retry key. Please reload and try again."
            }
            Self::AttemptIdReused { .. } => {
                "This request was already used for a different transfer. Please start a new one."
            }
            Self::Contention { .. } => {
                "Your balance changed while sending. Check your recent activity, then try again."
            }
            Self::Unavailable(_) => {
                "Service temporarily unavailable. Check your recent activity before retrying."
            }
        }
    }

    /// Whether resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention { .. } | Self::Unavailable(_))
    }
}

impl From<CommandError> for TransferError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::RecipientRequired => Self::MissingRecipient,
            CommandError::SelfTransfer { account_id } => Self::SelfTransfer { account_id },
            CommandError::EmptyAttemptId => Self::InvalidAttemptId,
            err => Self::InvalidAmount {
                reason: err.to_string(),
            },
        }
    }
}

impl From<AccountError> for TransferError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InsufficientFunds { balance, requested } => {
                Self::InsufficientBalance { balance, requested }
            }
            err @ AccountError::BalanceOverflow { .. } => Self::InvalidAmount {
                reason: err.to_string(),
            },
        }
    }
}

impl From<StoreError> for TransferError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => Self::Contention { attempts: 1 },
            StoreError::Unavailable(reason) => Self::Unavailable(reason),
            err @ StoreError::MissingAccount { .. } => Self::Unavailable(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub new_sender_balance: Decimal,
    pub transaction_id: RecordId,
    /// `true` when an earlier commit with the same attempt id was returned.
    pub replayed: bool,
    #[serde(skip)]
    pub record: TransactionRecord,
}

enum Attempt {
    Done(TransferReceipt),
    Conflict(AccountId),
}

/// Validates transfers and commits them through a [`TransferStore`].
///
/// Balances are read as versioned snapshots and the commit only succeeds if
/// neither account changed in between. A conflicting commit restarts the whole
/// validate-and-commit sequence, at most `max_attempts` times.
pub struct TransferEngine<S> {
    store: Arc<S>,
    max_attempts: u32,
}

impl<S> TransferEngine<S>
where
    S: TransferStore,
{
    pub fn new(store: Arc<S>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt, TransferError> {
        let command = TransferCommand::parse(request).inspect_err(|err| {
            tracing::debug!("transfer rejected: {err}");
        })?;

        if let Some(attempt_id) = &command.attempt_id {
            if let Some(existing) = self.store.find_attempt(&command.sender_id, attempt_id)? {
                return replay(&command, existing);
            }
        }

        for attempt in 1..=self.max_attempts {
            match self.attempt(&command)? {
                Attempt::Done(receipt) => {
                    tracing::info!(
                        sender_id = %command.sender_id,
                        recipient_id = %command.recipient_id,
                        amount = %command.amount,
                        transaction_id = %receipt.transaction_id,
                        replayed = receipt.replayed,
                        "transfer completed"
                    );
                    return Ok(receipt);
                }
                Attempt::Conflict(account_id) => {
                    tracing::debug!(
                        attempt,
                        account_id = %account_id,
                        "concurrent modification, retrying transfer"
                    );
                }
            }
        }

        tracing::warn!(
            sender_id = %command.sender_id,
            attempts = self.max_attempts,
            "transfer abandoned under contention"
        );
        Err(TransferError::Contention {
            attempts: self.max_attempts,
        })
    }

    fn attempt(&self, command: &TransferCommand) -> Result<Attempt, TransferError> {
        let recipient = self.store.account(&command.recipient_id)?.ok_or_else(|| {
            TransferError::RecipientNotFound {
                recipient_id: command.recipient_id.clone(),
            }
        })?;
        let sender = self.store.account(&command.sender_id)?.ok_or_else(|| {
            TransferError::SenderNotFound {
                sender_id: command.sender_id.clone(),
            }
        })?;

        let commit = TransferCommit {
            sender_id: command.sender_id.clone(),
            sender_version: sender.version(),
            sender_event: sender.handle_debit(command.amount)?,
            recipient_id: command.recipient_id.clone(),
            recipient_version: recipient.version(),
            recipient_event: recipient.handle_credit(command.amount)?,
            amount: command.amount,
            attempt_id: command.attempt_id.clone(),
        };

        match self.store.commit_transfer(commit) {
            Ok(CommitOutcome::Applied(committed)) => Ok(Attempt::Done(receipt(committed, false))),
            Ok(CommitOutcome::Replayed(committed)) => replay(command, committed).map(Attempt::Done),
            Err(StoreError::Conflict { account_id }) => Ok(Attempt::Conflict(account_id)),
            Err(StoreError::MissingAccount { account_id })
                if account_id == command.recipient_id =>
            {
                Err(TransferError::RecipientNotFound {
                    recipient_id: account_id,
                })
            }
            Err(StoreError::MissingAccount { account_id }) => {
                Err(TransferError::SenderNotFound {
                    sender_id: account_id,
                })
            }
            Err(StoreError::Unavailable(reason)) => {
                tracing::warn!("store unavailable during transfer commit: {reason}");
                Err(TransferError::Unavailable(reason))
            }
        }
    }
}

fn receipt(committed: CommittedTransfer, replayed: bool) -> TransferReceipt {
    TransferReceipt {
        new_sender_balance: committed.sender_balance,
        transaction_id: committed.record.id(),
        replayed,
        record: committed.record,
    }
}

fn replay(
    command: &TransferCommand,
    committed: CommittedTransfer,
) -> Result<TransferReceipt, TransferError> {
    let record = &committed.record;
    if record.recipient_id() != command.recipient_id || record.amount() != command.amount {
        return Err(TransferError::AttemptIdReused {
            attempt_id: command.attempt_id.clone().unwrap_or_default(),
        });
    }
    Ok(receipt(committed, true))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use rust_decimal_macros::dec;

    use crate::{
        account::Account,
        ledger::Order,
        store::{
            AccountStore, TransactionLedger, in_memory_store::InMemoryStore,
            test_utils::FaultyStore,
        },
    };

    use super::*;

    fn setup(sender: Decimal, recipient: Decimal) -> (Arc<InMemoryStore>, Account, Account) {
        let store = Arc::new(InMemoryStore::default());
        let a = store.create_account("Alice", sender).unwrap();
        let b = store.create_account("Bob", recipient).unwrap();
        (store, a, b)
    }

    fn balance<S: AccountStore>(store: &S, account: &Account) -> Decimal {
        store.account(account.id()).unwrap().unwrap().balance()
    }

    #[test]
    fn transfer_moves_money_and_records_it() {
        let (store, a, b) = setup(dec!(30.00), dec!(0.00));
        let engine = TransferEngine::new(store.clone(), DEFAULT_MAX_ATTEMPTS);

        let receipt = engine
            .transfer(TransferRequest::new(a.id(), b.id(), dec!(10.00)))
            .unwrap();
        assert_eq!(receipt.new_sender_balance, dec!(20.00));
        assert!(!receipt.replayed);
        assert_eq!(balance(&*store, &a), dec!(20.00));
        assert_eq!(balance(&*store, &b), dec!(10.00));

        let sent = store.query_by_sender(a.id(), 5, Order::NewestFirst).unwrap();
        assert_eq!(sent.len(), 1);
        let record = &sent[0];
        assert_eq!(record.id(), receipt.transaction_id);
        assert_eq!(record.sender_id(), a.id());
        assert_eq!(record.recipient_id(), b.id());
        assert_eq!(record.amount(), dec!(10.00));
    }

    #[test]
    fn insufficient_balance_changes_nothing() {
        let (store, a, b) = setup(dec!(5.00), dec!(0.00));
        let engine = TransferEngine::new(store.clone(), DEFAULT_MAX_ATTEMPTS);

        let err = engine
            .transfer(TransferRequest::new(a.id(), b.id(), dec!(10.00)))
            .unwrap_err();
        assert_eq!(
            err,
            TransferError::InsufficientBalance {
                balance: dec!(5.00),
                requested: dec!(10.00)
            }
        );
        assert_eq!(err.user_message(), "Insufficient balance.");
        assert_eq!(balance(&*store, &a), dec!(5.00));
        assert!(store.query_by_sender(a.id(), 5, Order::NewestFirst).unwrap().is_empty());
    }

    #[test]
    fn self_transfer_fails_before_store_access() {
        let store = Arc::new(FaultyStore::default());
        *store.commit_error.lock().unwrap() = Some(StoreError::Unavailable("down".to_string()));
        let engine = TransferEngine::new(store.clone(), DEFAULT_MAX_ATTEMPTS);

        // the account does not even exist, so any lookup would fail differently
        let err = engine
            .transfer(TransferRequest::new("a", "a", dec!(10.00)))
            .unwrap_err();
        assert_eq!(
            err,
            TransferError::SelfTransfer {
                account_id: "a".to_string()
            }
        );
        assert_eq!(err.kind(), "SelfTransfer");
        assert_eq!(store.commits_seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn validation_errors_map_to_distinct_kinds() {
        let (store, a, _) = setup(dec!(30.00), dec!(0.00));
        let engine = TransferEngine::new(store, DEFAULT_MAX_ATTEMPTS);

        let err = engine
            .transfer(TransferRequest::new(a.id(), "b", dec!(0)))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidAmount");

        let err = engine
            .transfer(TransferRequest::new(a.id(), "", dec!(1)))
            .unwrap_err();
        assert_eq!(err, TransferError::MissingRecipient);
    }

    #[test]
    fn unknown_recipient_leaves_sender_untouched() {
        let (store, a, _) = setup(dec!(30.00), dec!(0.00));
        let engine = TransferEngine::new(store.clone(), DEFAULT_MAX_ATTEMPTS);

        let err = engine
            .transfer(TransferRequest::new(a.id(), "nobody", dec!(10.00)))
            .unwrap_err();
        assert_eq!(
            err,
            TransferError::RecipientNotFound {
                recipient_id: "nobody".to_string()
            }
        );
        assert_eq!(balance(&*store, &a), dec!(30.00));
        assert_eq!(store.account(a.id()).unwrap().unwrap().version(), 0);
    }

    #[test]
    fn unknown_sender_is_reported() {
        let (store, _, b) = setup(dec!(30.00), dec!(0.00));
        let engine = TransferEngine::new(store, DEFAULT_MAX_ATTEMPTS);

        let err = engine
            .transfer(TransferRequest::new("ghost", b.id(), dec!(1)))
            .unwrap_err();
        assert_eq!(
            err,
            TransferError::SenderNotFound {
                sender_id: "ghost".to_string()
            }
        );
    }

    #[test]
    fn conflicts_are_retried() {
        let store = Arc::new(FaultyStore::default());
        let a = store.create_account("Alice", dec!(30.00)).unwrap();
        let b = store.create_account("Bob", dec!(0.00)).unwrap();
        store.conflicts.store(2, Ordering::SeqCst);
        let engine = TransferEngine::new(store.clone(), 3);

        let receipt = engine
            .transfer(TransferRequest::new(a.id(), b.id(), dec!(10.00)))
            .unwrap();
        assert_eq!(receipt.new_sender_balance, dec!(20.00));
        assert_eq!(store.commits_seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn contention_after_exhausting_attempts() {
        let store = Arc::new(FaultyStore::default());
        let a = store.create_account("Alice", dec!(30.00)).unwrap();
        let b = store.create_account("Bob", dec!(0.00)).unwrap();
        store.conflicts.store(10, Ordering::SeqCst);
        let engine = TransferEngine::new(store.clone(), 3);

        let err = engine
            .transfer(TransferRequest::new(a.id(), b.id(), dec!(10.00)))
            .unwrap_err();
        assert_eq!(err, TransferError::Contention { attempts: 3 });
        assert!(err.is_retryable());
        assert_eq!(balance(&*store, &a), dec!(30.00));
        assert_eq!(balance(&*store, &b), dec!(0.00));
    }

    #[test]
    fn store_outage_is_unavailable() {
        let store = Arc::new(FaultyStore::default());
        let a = store.create_account("Alice", dec!(30.00)).unwrap();
        let b = store.create_account("Bob", dec!(0.00)).unwrap();
        *store.commit_error.lock().unwrap() = Some(StoreError::Unavailable("timeout".to_string()));
        let engine = TransferEngine::new(store.clone(), 3);

        let err = engine
            .transfer(TransferRequest::new(a.id(), b.id(), dec!(10.00)))
            .unwrap_err();
        assert_eq!(err, TransferError::Unavailable("timeout".to_string()));
        assert_eq!(store.commits_seen.load(Ordering::SeqCst), 1);
        assert_eq!(balance(&*store, &a), dec!(30.00));
    }

    #[test]
    fn attempt_id_makes_retries_idempotent() {
        let (store, a, b) = setup(dec!(30.00), dec!(0.00));
        let engine = TransferEngine::new(store.clone(), DEFAULT_MAX_ATTEMPTS);
        let request = TransferRequest::new(a.id(), b.id(), dec!(25.00)).with_attempt_id("try-1");

        let first = engine.transfer(request.clone()).unwrap();
        // the balance no longer covers the amount, but nothing is re-applied
        let second = engine.transfer(request).unwrap();
        assert!(second.replayed);
        assert_eq!(second.transaction_id, first.transaction_id);
        assert_eq!(second.new_sender_balance, dec!(5.00));
        assert_eq!(balance(&*store, &a), dec!(5.00));
        assert_eq!(balance(&*store, &b), dec!(25.00));

        let err = engine
            .transfer(TransferRequest::new(a.id(), b.id(), dec!(1.00)).with_attempt_id("try-1"))
            .unwrap_err();
        assert_eq!(
            err,
            TransferError::AttemptIdReused {
                attempt_id: "try-1".to_string()
            }
        );
    }

    #[test]
    fn concurrent_transfers_never_overdraw() {
        let store = Arc::new(InMemoryStore::default());
        let a = store.create_account("Alice", dec!(30.00)).unwrap();
        let recipients: Vec<_> = (0..8)
            .map(|i| store.create_account(&format!("R{i}"), dec!(0)).unwrap())
            .collect();
        let engine = TransferEngine::new(store.clone(), 50);

        let (engine, sender) = (&engine, a.id());
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = recipients
                .iter()
                .map(|r| {
                    s.spawn(move || {
                        engine.transfer(TransferRequest::new(sender, r.id(), dec!(10.00)))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        assert!(succeeded <= 3);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(
                err,
                TransferError::InsufficientBalance { .. } | TransferError::Contention { .. }
            ));
        }
        let sender_balance = balance(&*store, &a);
        assert!(sender_balance >= Decimal::ZERO);
        assert_eq!(sender_balance, dec!(30.00) - dec!(10.00) * Decimal::from(succeeded as u64));

        let total: Decimal = store.accounts().unwrap().iter().map(|acc| acc.balance()).sum();
        assert_eq!(total, dec!(30.00));
        assert_eq!(
            store.query_by_sender(a.id(), 100, Order::NewestFirst).unwrap().len(),
            succeeded
        );
    }
}

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::{
    ledger::{Order, Role, TransactionRecord},
    store::{StoreError, TransactionLedger},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub record: TransactionRecord,
    pub role: Role,
}

impl HistoryEntry {
    /// The other party, as named when the transfer happened.
    pub fn counterparty_name(&self) -> &str {
        match self.role {
            Role::Sent => self.record.recipient_name(),
            Role::Received => self.record.sender_name(),
        }
    }

    /// Amount as seen from the account: negative when sent.
    pub fn signed_amount(&self) -> Decimal {
        match self.role {
            Role::Sent => -self.record.amount(),
            Role::Received => self.record.amount(),
        }
    }
}

/// One of the two role queries failed; the history only holds the other one.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("{missing} transactions could not be loaded: {reason}")]
pub struct HistoryPartial {
    pub missing: Role,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct History {
    pub entries: Vec<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<HistoryPartial>,
}

impl History {
    pub fn is_partial(&self) -> bool {
        self.partial.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("History unavailable, retry shortly: {0}")]
    Unavailable(String),
}

impl HistoryError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "Unavailable",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => {
                "Transaction history is not ready yet. Please try again in a moment."
            }
        }
    }
}

/// Builds an account's recent activity from two independent ledger reads.
pub struct HistoryReader<L> {
    ledger: Arc<L>,
}

impl<L> HistoryReader<L>
where
    L: TransactionLedger,
{
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Up to `limit_per_role` latest sent and latest received records, newest
    /// first. Records sharing a timestamp keep the order they were written in.
    ///
    /// A failure of one of the reads is reported through
    /// [`History::partial`]; only when both fail is an error returned.
    pub fn history(
        &self,
        account_id: &str,
        limit_per_role: usize,
    ) -> Result<History, HistoryError> {
        let sent = self
            .ledger
            .query_by_sender(account_id, limit_per_role, Order::NewestFirst);
        let received = self
            .ledger
            .query_by_recipient(account_id, limit_per_role, Order::NewestFirst);

        let (entries, partial) = match (sent, received) {
            (Ok(sent), Ok(received)) => (merge(sent, received), None),
            (Ok(sent), Err(err)) => (
                merge(sent, Vec::new()),
                Some(missing_role(Role::Received, err)),
            ),
            (Err(err), Ok(received)) => (
                merge(Vec::new(), received),
                Some(missing_role(Role::Sent, err)),
            ),
            (Err(sent_err), Err(received_err)) => {
                tracing::warn!(
                    account_id,
                    "history unavailable: {sent_err}; {received_err}"
                );
                return Err(HistoryError::Unavailable(sent_err.to_string()));
            }
        };
        if let Some(partial) = &partial {
            tracing::warn!(account_id, "returning partial history: {partial}");
        }
        Ok(History { entries, partial })
    }
}

fn missing_role(missing: Role, err: StoreError) -> HistoryPartial {
    HistoryPartial {
        missing,
        reason: err.to_string(),
    }
}

fn merge(sent: Vec<TransactionRecord>, received: Vec<TransactionRecord>) -> Vec<HistoryEntry> {
    let mut entries: Vec<HistoryEntry> = sent
        .into_iter()
        .map(|record| HistoryEntry {
            record,
            role: Role::Sent,
        })
        .chain(received.into_iter().map(|record| HistoryEntry {
            record,
            role: Role::Received,
        }))
        .collect();
    entries.sort_by(|a, b| {
        b.record
            .timestamp()
            .cmp(&a.record.timestamp())
            .then_with(|| b.record.sequence().cmp(&a.record.sequence()))
    });
    entries
}

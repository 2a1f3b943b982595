use std::{collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::account::AccountId;

pub type RecordId = Uuid;

/// Failed transfers never produce a record, so `Completed` is the only state
/// that is ever persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
}

/// The side of a transfer an account was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Sent,
    Received,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sent => f.write_str("sent"),
            Role::Received => f.write_str("received"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Immutable record of one completed transfer.
///
/// Names are copied from the accounts at commit time, so renaming an account
/// later does not rewrite its history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    id: RecordId,
    sender_id: AccountId,
    sender_name: String,
    recipient_id: AccountId,
    recipient_name: String,
    amount: Decimal,
    timestamp: DateTime<Utc>,
    #[serde(skip)]
    sequence: u64,
    status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempt_id: Option<String>,
}

impl TransactionRecord {
    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn sender_name(&self) -> &str {
        &self.sender_name
    }

    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    pub fn recipient_name(&self) -> &str {
        &self.recipient_name
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Position in the log, used to order records sharing a timestamp.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn attempt_id(&self) -> Option<&str> {
        self.attempt_id.as_deref()
    }

    /// Role `account_id` played in this transfer, if any.
    pub fn role_of(&self, account_id: &str) -> Option<Role> {
        if self.sender_id == account_id {
            Some(Role::Sent)
        } else if self.recipient_id == account_id {
            Some(Role::Received)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewTransactionRecord {
    pub sender_id: AccountId,
    pub sender_name: String,
    pub recipient_id: AccountId,
    pub recipient_name: String,
    pub amount: Decimal,
    pub attempt_id: Option<String>,
}

/// Append-only list of completed transfers, indexed by sender and recipient.
///
/// Timestamps are assigned on append and never go backwards, even if the wall
/// clock does.
#[derive(Debug, Default)]
pub struct TransactionLog {
    records: Vec<TransactionRecord>,
    by_sender: HashMap<AccountId, Vec<usize>>,
    by_recipient: HashMap<AccountId, Vec<usize>>,
}

impl TransactionLog {
    pub(crate) fn append(&mut self, new: NewTransactionRecord) -> &TransactionRecord {
        let now = Utc::now();
        let timestamp = match self.records.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        let idx = self.records.len();
        let record = TransactionRecord {
            id: Uuid::new_v4(),
            sender_id: new.sender_id,
            sender_name: new.sender_name,
            recipient_id: new.recipient_id,
            recipient_name: new.recipient_name,
            amount: new.amount,
            timestamp,
            sequence: idx as u64,
            status: TransactionStatus::Completed,
            attempt_id: new.attempt_id,
        };
        self.by_sender
            .entry(record.sender_id.clone())
            .or_default()
            .push(idx);
        self.by_recipient
            .entry(record.recipient_id.clone())
            .or_default()
            .push(idx);
        self.records.push(record);
        &self.records[idx]
    }

    /// At most `limit` records where `account_id` played `role`, taken from
    /// the most recent end of the log and returned in `order`.
    pub fn query(
        &self,
        account_id: &str,
        role: Role,
        limit: usize,
        order: Order,
    ) -> Vec<TransactionRecord> {
        let index = match role {
            Role::Sent => &self.by_sender,
            Role::Received => &self.by_recipient,
        };
        let Some(positions) = index.get(account_id) else {
            return Vec::new();
        };
        // positions are in append order, which is also timestamp order
        let mut found: Vec<TransactionRecord> = positions
            .iter()
            .rev()
            .take(limit)
            .map(|idx| self.records[*idx].clone())
            .collect();
        if order == Order::OldestFirst {
            found.reverse();
        }
        found
    }
}

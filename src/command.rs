use std::str::FromStr;

use rust_decimal::{Decimal, prelude::FromPrimitive};
use thiserror::Error;

use crate::account::AccountId;

/// Amounts are kept to cents.
pub const MAX_AMOUNT_SCALE: u32 = 2;

/// Transfer as submitted by a caller, before any validation.
///
/// `sender_id` is supplied by the identity provider and trusted apart from
/// surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub sender_id: AccountId,
    pub recipient_id: AccountId,
    pub amount: Option<Decimal>,
    pub attempt_id: Option<String>,
}

impl TransferRequest {
    pub fn new(
        sender_id: impl Into<AccountId>,
        recipient_id: impl Into<AccountId>,
        amount: Decimal,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            amount: Some(amount),
            attempt_id: None,
        }
    }

    /// Makes retries of this request idempotent: a second request with the same
    /// sender and attempt id returns the first receipt instead of moving money again.
    pub fn with_attempt_id(mut self, attempt_id: impl Into<String>) -> Self {
        self.attempt_id = Some(attempt_id.into());
        self
    }
}

/// Validated transfer, safe to hand over to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCommand {
    pub sender_id: AccountId,
    pub recipient_id: AccountId,
    pub amount: Decimal,
    pub attempt_id: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Amount is required")]
    AmountRequired,
    #[error("Amount `{input}` is not a number")]
    Unparseable { input: String },
    #[error("Amount is not a finite number")]
    NotFinite,
    #[error("Amount must be greater than zero, got {amount}")]
    NonPositiveAmount { amount: Decimal },
    #[error("Amount {amount} has more than two decimal places")]
    TooPrecise { amount: Decimal },
    #[error("Recipient id is required")]
    RecipientRequired,
    #[error("Cannot transfer from account {account_id} to itself")]
    SelfTransfer { account_id: AccountId },
    #[error("Attempt id must not be empty")]
    EmptyAttemptId,
}

impl CommandError {
    pub fn is_amount_error(&self) -> bool {
        matches!(
            self,
            Self::AmountRequired
                | Self::Unparseable { .. }
                | Self::NotFinite
                | Self::NonPositiveAmount { .. }
                | Self::TooPrecise { .. }
        )
    }
}

impl TransferCommand {
    /// Runs the checks that need no store access: the amount first, then the
    /// recipient. Nothing is read or written when this fails.
    pub fn parse(request: TransferRequest) -> Result<Self, CommandError> {
        let TransferRequest {
            sender_id,
            recipient_id,
            amount,
            attempt_id,
        } = request;

        let amount = validate_amount(amount)?;

        let sender_id = sender_id.trim();
        let recipient_id = recipient_id.trim();
        if recipient_id.is_empty() {
            return Err(CommandError::RecipientRequired);
        }
        if recipient_id == sender_id {
            return Err(CommandError::SelfTransfer {
                account_id: sender_id.to_string(),
            });
        }

        if attempt_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(CommandError::EmptyAttemptId);
        }

        Ok(Self {
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            amount,
            attempt_id,
        })
    }
}

fn validate_amount(amount: Option<Decimal>) -> Result<Decimal, CommandError> {
    let Some(amount) = amount else {
        return Err(CommandError::AmountRequired);
    };
    if amount <= Decimal::ZERO {
        return Err(CommandError::NonPositiveAmount { amount });
    }
    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(CommandError::TooPrecise { amount });
    }
    Ok(amount)
}

/// Parses a user-typed amount such as `10`, `10.5` or ` 0.25 `.
pub fn parse_amount(input: &str) -> Result<Decimal, CommandError> {
    Decimal::from_str(input.trim()).map_err(|_| CommandError::Unparseable {
        input: input.to_string(),
    })
}

/// Converts a floating point amount coming from a loosely typed client.
pub fn amount_from_f64(value: f64) -> Result<Decimal, CommandError> {
    if !value.is_finite() {
        return Err(CommandError::NotFinite);
    }
    Decimal::from_f64(value).ok_or(CommandError::NotFinite)
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

pub type AccountId = String;

/// Welcome credit every account is opened with (30.00).
pub const STARTING_BALANCE: Decimal = Decimal::from_parts(3000, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountEventKind {
    Debited,
    Credited,
}

#[derive(Debug, Clone)]
pub struct AccountEvent {
    amount: Decimal,
    kind: AccountEventKind,
}

impl AccountEvent {
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn kind(&self) -> AccountEventKind {
        self.kind
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },
    #[error("Balance overflow when crediting {amount}")]
    BalanceOverflow { amount: Decimal },
}

/// A user's identity plus current balance.
///
/// The balance is only changed through [`AccountEvent`]s produced by
/// [`Account::handle_debit`] / [`Account::handle_credit`] and applied by the
/// store inside a transfer commit. Every applied event bumps `version`, which
/// the store compares against to detect concurrent modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    id: AccountId,
    name: String,
    balance: Decimal,
    #[serde(skip)]
    version: u64,
    created_at: DateTime<Utc>,
}

impl Account {
    pub(crate) fn open(id: AccountId, name: String, starting_balance: Decimal) -> Self {
        Self {
            id,
            name,
            balance: starting_balance,
            version: 0,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn apply(&mut self, event: &AccountEvent) {
        match event.kind {
            AccountEventKind::Debited => {
                self.balance -= event.amount;
            }
            AccountEventKind::Credited => {
                self.balance += event.amount;
            }
        }
        self.version += 1;
    }

    /// Checks that `amount` can leave this account without driving the
    /// balance below zero.
    pub fn handle_debit(&self, amount: Decimal) -> Result<AccountEvent, AccountError> {
        if self.balance >= amount {
            Ok(AccountEvent {
                amount,
                kind: AccountEventKind::Debited,
            })
        } else {
            Err(AccountError::InsufficientFunds {
                balance: self.balance,
                requested: amount,
            })
        }
    }

    pub fn handle_credit(&self, amount: Decimal) -> Result<AccountEvent, AccountError> {
        match self.balance.checked_add(amount) {
            Some(_) => Ok(AccountEvent {
                amount,
                kind: AccountEventKind::Credited,
            }),
            None => Err(AccountError::BalanceOverflow { amount }),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn account(balance: Decimal) -> Account {
        Account::open("acc-1".to_string(), "Alice".to_string(), balance)
    }

    #[test]
    fn starting_balance_is_thirty() {
        assert_eq!(STARTING_BALANCE, dec!(30.00));
        assert_eq!(STARTING_BALANCE.to_string(), "30.00");
    }

    #[test]
    fn apply_events() {
        let mut acc = account(dec!(30.00));
        assert_eq!(acc.version(), 0);

        acc.apply(&AccountEvent {
            amount: dec!(10.00),
            kind: AccountEventKind::Debited,
        });
        assert_eq!(acc.balance(), dec!(20.00));
        assert_eq!(acc.version(), 1);

        acc.apply(&AccountEvent {
            amount: dec!(2.50),
            kind: AccountEventKind::Credited,
        });
        assert_eq!(acc.balance(), dec!(22.50));
        assert_eq!(acc.version(), 2);
    }

    #[test]
    fn handle_debit() {
        let mut acc = account(dec!(5.00));

        let err = acc.handle_debit(dec!(10.00)).unwrap_err();
        assert_eq!(
            err,
            AccountError::InsufficientFunds {
                balance: dec!(5.00),
                requested: dec!(10.00)
            }
        );
        // rejecting a debit never touches the account
        assert_eq!(acc.balance(), dec!(5.00));
        assert_eq!(acc.version(), 0);

        // the whole balance may be spent
        let evt = acc.handle_debit(dec!(5.00)).unwrap();
        assert_eq!(evt.kind(), AccountEventKind::Debited);
        acc.apply(&evt);
        assert_eq!(acc.balance(), Decimal::ZERO);
    }

    #[test]
    fn handle_credit() {
        let acc = account(Decimal::ZERO);
        let evt = acc.handle_credit(dec!(10.00)).unwrap();
        assert_eq!(evt.amount(), dec!(10.00));
        assert_eq!(evt.kind(), AccountEventKind::Credited);

        let rich = account(Decimal::MAX);
        let err = rich.handle_credit(dec!(1)).unwrap_err();
        assert!(matches!(err, AccountError::BalanceOverflow { .. }));
    }
}

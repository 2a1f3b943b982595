/// Account identity and balance; balance changes are expressed as events
/// produced by debit/credit checks and applied by the store.
pub mod account;

/// Turns a raw transfer request into a validated [`command::TransferCommand`].
pub mod command;

/// Transaction records and the append-only log they live in.
pub mod ledger;

/// Store interfaces, plus "in memory" implementation.
///
/// The transfer engine only talks to [`store::TransferStore`], so a database
/// backed store can replace the in memory one as long as it commits a
/// [`store::TransferCommit`] atomically.
pub mod store;

/// Transfer validation and the optimistic commit loop.
pub mod engine;

/// Merged sent / received activity of an account.
pub mod history;

/// Ledger settings, loaded from JSON and checked before use.
pub mod config;

/// Facade tying store, engine and history reader together.
pub mod payments;

/// Batch driver used by the binary and by integration tests: reads operations
/// from CSV, answers each with a JSON line and finally prints balances.
pub mod bin_utils;

pub use command::TransferRequest;
pub use config::LedgerConfig;
pub use engine::{TransferError, TransferReceipt};
pub use history::{History, HistoryEntry, HistoryError};
pub use payments::Payments;

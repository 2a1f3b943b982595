use std::sync::Arc;

use crate::{
    account::Account,
    command::TransferRequest,
    config::{ConfigError, LedgerConfig},
    engine::{TransferEngine, TransferError, TransferReceipt},
    history::{History, HistoryError, HistoryReader},
    store::{StoreError, TransferStore, in_memory_store::InMemoryStore},
};

/// Entry point used by the presentation layer.
///
/// The caller passes the authenticated account id explicitly into every call;
/// nothing here keeps a notion of a current user.
pub struct Payments<S> {
    store: Arc<S>,
    config: LedgerConfig,
    engine: TransferEngine<S>,
    history: HistoryReader<S>,
}

impl Payments<InMemoryStore> {
    pub fn in_memory(config: LedgerConfig) -> Result<Self, ConfigError> {
        Self::new(Arc::new(InMemoryStore::default()), config)
    }
}

impl<S> Payments<S>
where
    S: TransferStore,
{
    /// Fails when `config` does not pass [`LedgerConfig::validate`].
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        Ok(Self {
            engine: TransferEngine::new(store.clone(), config.max_transfer_attempts),
            history: HistoryReader::new(store.clone()),
            store,
            config,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Opens an account holding the configured starting balance.
    pub fn create_account(&self, name: &str) -> Result<Account, StoreError> {
        let account = self
            .store
            .create_account(name.trim(), self.config.starting_balance)?;
        tracing::info!(account_id = account.id(), "account created");
        Ok(account)
    }

    pub fn account(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        self.store.account(account_id)
    }

    /// All accounts, ordered by name and then id.
    pub fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts = self.store.accounts()?;
        accounts.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
        Ok(accounts)
    }

    pub fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt, TransferError> {
        self.engine.transfer(request)
    }

    /// Recent activity using the configured per-role limit.
    pub fn history(&self, account_id: &str) -> Result<History, HistoryError> {
        self.history
            .history(account_id, self.config.history_limit_per_role)
    }

    pub fn history_with_limit(
        &self,
        account_id: &str,
        limit_per_role: usize,
    ) -> Result<History, HistoryError> {
        self.history.history(account_id, limit_per_role)
    }
}

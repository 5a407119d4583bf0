use super::lock_table::{LockTable, RowGuard};
use crate::domain::balance::AccountBalance;
use crate::domain::payment::{ClientId, PaymentId, PaymentRequest};
use crate::domain::ports::{CommitOutcome, LedgerStore, UnitOfWork, UnitOfWorkBox};
use crate::error::PersistenceError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct LedgerTables {
    payments: HashMap<PaymentId, PaymentRequest>,
    balances: HashMap<ClientId, AccountBalance>,
}

/// A thread-safe in-memory ledger store.
///
/// Both tables live behind one `Arc<RwLock<..>>`; row locks come from a
/// shared `LockTable`. Ideal for testing or batch runs where persistence is
/// not required.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<LedgerTables>>,
    locks: LockTable,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory ledger store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exposes the row-lock registry so callers can observe contention.
    pub fn locks(&self) -> &LockTable {
        &self.locks
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self, client_id: ClientId) -> Result<UnitOfWorkBox, PersistenceError> {
        let guard = self.locks.lock(client_id).await;
        let balance = self
            .tables
            .read()
            .await
            .balances
            .get(&client_id)
            .cloned()
            .unwrap_or_else(|| AccountBalance::new(client_id));

        Ok(Box::new(InMemoryUnitOfWork {
            tables: self.tables.clone(),
            balance,
            payment: None,
            guard: Some(guard),
        }))
    }

    async fn payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<PaymentRequest>, PersistenceError> {
        Ok(self.tables.read().await.payments.get(&payment_id).cloned())
    }

    async fn balance(
        &self,
        client_id: ClientId,
    ) -> Result<Option<AccountBalance>, PersistenceError> {
        Ok(self.tables.read().await.balances.get(&client_id).cloned())
    }

    async fn all_balances(&self) -> Result<Vec<AccountBalance>, PersistenceError> {
        let tables = self.tables.read().await;
        let mut balances: Vec<AccountBalance> = tables.balances.values().cloned().collect();
        balances.sort_by_key(|b| b.client_id);
        Ok(balances)
    }
}

struct InMemoryUnitOfWork {
    tables: Arc<RwLock<LedgerTables>>,
    balance: AccountBalance,
    payment: Option<PaymentRequest>,
    guard: Option<RowGuard>,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    fn balance(&self) -> &AccountBalance {
        &self.balance
    }

    async fn find_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<PaymentRequest>, PersistenceError> {
        if let Some(staged) = self.payment.as_ref().filter(|p| p.payment_id() == payment_id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.tables.read().await.payments.get(&payment_id).cloned())
    }

    fn insert_payment(&mut self, payment: PaymentRequest) {
        self.payment = Some(payment);
    }

    fn update_balance(&mut self, balance: AccountBalance) {
        self.balance = balance;
    }

    async fn commit(&mut self) -> Result<CommitOutcome, PersistenceError> {
        if self.guard.is_none() {
            return Err(PersistenceError::Unavailable(
                "unit of work already finished".to_string(),
            ));
        }

        let mut tables = self.tables.write().await;
        let outcome = match self.payment.take() {
            Some(payment) if tables.payments.contains_key(&payment.payment_id()) => {
                CommitOutcome::Duplicate
            }
            Some(payment) => {
                tables.payments.insert(payment.payment_id(), payment);
                tables
                    .balances
                    .insert(self.balance.client_id, self.balance.clone());
                CommitOutcome::Applied
            }
            None => {
                tables
                    .balances
                    .insert(self.balance.client_id, self.balance.clone());
                CommitOutcome::Applied
            }
        };
        drop(tables);
        self.guard = None;
        Ok(outcome)
    }
}

use super::balance::AccountBalance;
use super::payment::{ClientId, PaymentId, PaymentRequest};
use crate::error::{PersistenceError, TransportError};
use async_trait::async_trait;
use std::time::Duration;

/// Result of committing a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The payment row and the balance update were written and flushed.
    Applied,
    /// Another unit of work stored the same payment id first; nothing was written.
    Duplicate,
}

/// Persistent store for payments and per-client balances.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens a unit of work that holds the exclusive lock on `client_id`'s
    /// balance row until it is committed or dropped. Clients without a row
    /// start from a staged zero-balance row, written on commit.
    async fn begin(&self, client_id: ClientId) -> Result<UnitOfWorkBox, PersistenceError>;
    async fn payment(&self, payment_id: PaymentId)
    -> Result<Option<PaymentRequest>, PersistenceError>;
    async fn balance(&self, client_id: ClientId)
    -> Result<Option<AccountBalance>, PersistenceError>;
    async fn all_balances(&self) -> Result<Vec<AccountBalance>, PersistenceError>;
}

/// A locked, all-or-nothing unit of work against a `LedgerStore`.
///
/// Staged writes become visible only through `commit`. Dropping the unit
/// without committing discards them and releases the lock.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// The locked balance row as staged in this unit.
    fn balance(&self) -> &AccountBalance;
    async fn find_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<PaymentRequest>, PersistenceError>;
    fn insert_payment(&mut self, payment: PaymentRequest);
    fn update_balance(&mut self, balance: AccountBalance);
    /// Writes the staged rows atomically and flushes them to durable storage.
    async fn commit(&mut self) -> Result<CommitOutcome, PersistenceError>;
}

/// Opens connections to the queue transport.
#[async_trait]
pub trait QueueConnector: Send + Sync {
    /// Opens a fresh connection. `inactivity_timeout` bounds blocking pops;
    /// `None` waits forever.
    async fn connect(
        &self,
        inactivity_timeout: Option<Duration>,
    ) -> Result<QueueConnectionBox, TransportError>;
}

/// A single connection to a named-list queue transport.
#[async_trait]
pub trait QueueConnection: Send {
    async fn length(&mut self, key: &str) -> Result<u64, TransportError>;
    /// Removes and returns the oldest element of `key`, blocking until one
    /// arrives. Returns `Ok(None)` when the inactivity timeout elapses first.
    async fn blocking_pop_tail(&mut self, key: &str) -> Result<Option<Vec<u8>>, TransportError>;
    async fn pop_head(&mut self, key: &str) -> Result<Option<Vec<u8>>, TransportError>;
    /// Pushes `value` as the newest element of `key`; returns the new length.
    async fn push_head(&mut self, key: &str, value: Vec<u8>) -> Result<u64, TransportError>;
}

pub type LedgerStoreBox = Box<dyn LedgerStore>;
pub type UnitOfWorkBox = Box<dyn UnitOfWork>;
pub type QueueConnectorBox = Box<dyn QueueConnector>;
pub type QueueConnectionBox = Box<dyn QueueConnection>;

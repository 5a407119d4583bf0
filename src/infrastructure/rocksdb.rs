use super::lock_table::{LockTable, RowGuard};
use crate::domain::balance::AccountBalance;
use crate::domain::payment::{ClientId, PaymentId, PaymentRequest};
use crate::domain::ports::{CommitOutcome, LedgerStore, UnitOfWork, UnitOfWorkBox};
use crate::error::PersistenceError;
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch, WriteOptions};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for stored payment requests, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for per-client balances, keyed by client id.
pub const CF_BALANCES: &str = "balances";

/// A persistent ledger store implementation using RocksDB.
///
/// Payments and balances live in separate Column Families. A unit of work
/// commits both rows in a single `WriteBatch` with a synced WAL, so either
/// both are durable or neither is.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    locks: LockTable,
    commit_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("payments" and "balances") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_payments = ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default());
        let cf_balances = ColumnFamilyDescriptor::new(CF_BALANCES, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_payments, cf_balances])?;

        Ok(Self {
            db: Arc::new(db),
            locks: LockTable::new(),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }
}

fn column<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily, PersistenceError> {
    db.cf_handle(name).ok_or_else(|| {
        PersistenceError::Unavailable(format!("{} column family not found", name))
    })
}

fn read_row<T: DeserializeOwned>(
    db: &DB,
    cf_name: &str,
    key: u64,
) -> Result<Option<T>, PersistenceError> {
    let cf = column(db, cf_name)?;
    match db.get_cf(cf, key.to_be_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn begin(&self, client_id: ClientId) -> Result<UnitOfWorkBox, PersistenceError> {
        let guard = self.locks.lock(client_id).await;
        let balance = read_row::<AccountBalance>(&self.db, CF_BALANCES, client_id)?
            .unwrap_or_else(|| AccountBalance::new(client_id));

        Ok(Box::new(RocksDBUnitOfWork {
            db: self.db.clone(),
            commit_lock: self.commit_lock.clone(),
            balance,
            payment: None,
            guard: Some(guard),
        }))
    }

    async fn payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<PaymentRequest>, PersistenceError> {
        read_row(&self.db, CF_PAYMENTS, payment_id)
    }

    async fn balance(
        &self,
        client_id: ClientId,
    ) -> Result<Option<AccountBalance>, PersistenceError> {
        read_row(&self.db, CF_BALANCES, client_id)
    }

    async fn all_balances(&self) -> Result<Vec<AccountBalance>, PersistenceError> {
        let cf = column(&self.db, CF_BALANCES)?;

        let mut balances = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            let balance: AccountBalance = serde_json::from_slice(&value)?;
            balances.push(balance);
        }

        Ok(balances)
    }
}

struct RocksDBUnitOfWork {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
    balance: AccountBalance,
    payment: Option<PaymentRequest>,
    guard: Option<RowGuard>,
}

#[async_trait]
impl UnitOfWork for RocksDBUnitOfWork {
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
        read_row(&self.db, CF_PAYMENTS, payment_id)
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

        let _commit = self.commit_lock.lock().await;
        let mut batch = WriteBatch::default();

        if let Some(payment) = self.payment.take() {
            let cf_payments = column(&self.db, CF_PAYMENTS)?;
            let key = payment.payment_id().to_be_bytes();
            // Just check if the key exists without retrieving the value
            if self.db.get_pinned_cf(cf_payments, key)?.is_some() {
                self.guard = None;
                return Ok(CommitOutcome::Duplicate);
            }
            batch.put_cf(cf_payments, key, serde_json::to_vec(&payment)?);
        }

        let cf_balances = column(&self.db, CF_BALANCES)?;
        batch.put_cf(
            cf_balances,
            self.balance.client_id.to_be_bytes(),
            serde_json::to_vec(&self.balance)?,
        );

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        self.db.write_opt(batch, &write_opts)?;

        self.guard = None;
        Ok(CommitOutcome::Applied)
    }
}

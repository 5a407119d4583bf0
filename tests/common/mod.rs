#![allow(dead_code)]

use async_trait::async_trait;
use microthrottler::domain::balance::AccountBalance;
use microthrottler::domain::payment::{ClientId, PaymentId, PaymentRequest};
use microthrottler::domain::ports::{CommitOutcome, LedgerStore, UnitOfWork, UnitOfWorkBox};
use microthrottler::error::PersistenceError;
use microthrottler::infrastructure::in_memory::InMemoryLedgerStore;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

pub fn generate_csv(path: &Path, rows: usize, clients: u64) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["client", "payment", "amount"])?;

    for i in 1..=rows {
        let client = (i as u64 % clients) + 1;
        wtr.write_record([client.to_string(), i.to_string(), "1.0".to_string()])?;
    }

    wtr.flush()?;
    Ok(())
}

#[derive(Default)]
struct Switches {
    begins: AtomicU64,
    unavailable: AtomicBool,
    fail_commits: AtomicBool,
}

/// In-memory ledger store with knobs for latency and outages.
#[derive(Clone, Default)]
pub struct InstrumentedStore {
    inner: InMemoryLedgerStore,
    commit_delay: Duration,
    delayed_client: Option<ClientId>,
    switches: Arc<Switches>,
}

impl InstrumentedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every commit sleeps for `delay` while still holding the row lock.
    pub fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = delay;
        self
    }

    /// Restricts the commit delay to one client.
    pub fn only_for_client(mut self, client_id: ClientId) -> Self {
        self.delayed_client = Some(client_id);
        self
    }

    pub fn inner(&self) -> &InMemoryLedgerStore {
        &self.inner
    }

    pub fn begins(&self) -> u64 {
        self.switches.begins.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.switches.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.switches.fail_commits.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), PersistenceError> {
        if self.switches.unavailable.load(Ordering::SeqCst) {
            Err(PersistenceError::Unavailable("store is down".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LedgerStore for InstrumentedStore {
    async fn begin(&self, client_id: ClientId) -> Result<UnitOfWorkBox, PersistenceError> {
        self.switches.begins.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let inner = self.inner.begin(client_id).await?;
        let delay = match self.delayed_client {
            Some(delayed) if delayed != client_id => Duration::ZERO,
            _ => self.commit_delay,
        };
        Ok(Box::new(InstrumentedUnit {
            inner,
            delay,
            switches: self.switches.clone(),
        }))
    }

    async fn payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<PaymentRequest>, PersistenceError> {
        self.inner.payment(payment_id).await
    }

    async fn balance(
        &self,
        client_id: ClientId,
    ) -> Result<Option<AccountBalance>, PersistenceError> {
        self.inner.balance(client_id).await
    }

    async fn all_balances(&self) -> Result<Vec<AccountBalance>, PersistenceError> {
        self.inner.all_balances().await
    }
}

struct InstrumentedUnit {
    inner: UnitOfWorkBox,
    delay: Duration,
    switches: Arc<Switches>,
}

#[async_trait]
impl UnitOfWork for InstrumentedUnit {
    fn balance(&self) -> &AccountBalance {
        self.inner.balance()
    }

    async fn find_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<PaymentRequest>, PersistenceError> {
        self.inner.find_payment(payment_id).await
    }

    fn insert_payment(&mut self, payment: PaymentRequest) {
        self.inner.insert_payment(payment);
    }

    fn update_balance(&mut self, balance: AccountBalance) {
        self.inner.update_balance(balance);
    }

    async fn commit(&mut self) -> Result<CommitOutcome, PersistenceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.switches.fail_commits.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable(
                "transaction aborted".to_string(),
            ));
        }
        self.inner.commit().await
    }
}

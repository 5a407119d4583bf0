use crate::domain::payment::ClientId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type RowMap = HashMap<ClientId, Arc<AsyncMutex<()>>>;

/// Exclusive guard over one client's balance row.
///
/// Releasing the last interest in a row removes it from the registry.
pub struct RowGuard {
    guard: Option<OwnedMutexGuard<()>>,
    client_id: ClientId,
    rows: Arc<Mutex<RowMap>>,
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut rows = lock_rows(&self.rows);
        // Only the registry still references the mutex: no holder, no waiter.
        if rows
            .get(&self.client_id)
            .is_some_and(|row| Arc::strong_count(row) == 1)
        {
            rows.remove(&self.client_id);
        }
    }
}

fn lock_rows(rows: &Mutex<RowMap>) -> MutexGuard<'_, RowMap> {
    rows.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of per-client row locks.
///
/// Holders for the same client queue up in arrival order; holders for
/// different clients never contend beyond the brief registry lookup.
#[derive(Default, Clone)]
pub struct LockTable {
    rows: Arc<Mutex<RowMap>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the exclusive lock on `client_id`'s row.
    pub async fn lock(&self, client_id: ClientId) -> RowGuard {
        let row = lock_rows(&self.rows).entry(client_id).or_default().clone();
        let guard = row.lock_owned().await;
        RowGuard {
            guard: Some(guard),
            client_id,
            rows: self.rows.clone(),
        }
    }

    /// Returns `true` when some unit of work currently holds `client_id`.
    pub fn is_locked(&self, client_id: ClientId) -> bool {
        lock_rows(&self.rows)
            .get(&client_id)
            .is_some_and(|row| row.try_lock().is_err())
    }

    /// Number of rows currently held or waited on.
    pub fn len(&self) -> usize {
        lock_rows(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

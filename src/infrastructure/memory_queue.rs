use crate::domain::ports::{QueueConnection, QueueConnectionBox, QueueConnector};
use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
struct QueueState {
    lists: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    pushed: Notify,
    connections: AtomicU64,
    offline: AtomicBool,
}

/// An in-process stand-in for the shared queue transport.
///
/// Named lists of byte payloads: `push_head` adds the newest element and
/// `blocking_pop_tail` removes the oldest, so each list is FIFO. Clones share
/// the same lists, which lets a test or a batch producer feed the consumer.
#[derive(Default, Clone)]
pub struct InMemoryQueue {
    state: Arc<QueueState>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections opened so far.
    pub fn connections(&self) -> u64 {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// While offline, new connections are refused and open ones fail their
    /// next command.
    pub fn set_offline(&self, offline: bool) {
        self.state.offline.store(offline, Ordering::SeqCst);
        self.state.pushed.notify_waiters();
    }

    pub fn len(&self, key: &str) -> usize {
        self.lists().get(key).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, key: &str) -> bool {
        self.len(key) == 0
    }

    pub fn push(&self, key: &str, value: Vec<u8>) -> u64 {
        let len = {
            let mut lists = self.lists();
            let list = lists.entry(key.to_string()).or_default();
            list.push_front(value);
            list.len() as u64
        };
        self.state.pushed.notify_waiters();
        len
    }

    fn lists(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<Vec<u8>>>> {
        self.state
            .lists
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn pop_back(&self, key: &str) -> Option<Vec<u8>> {
        self.lists().get_mut(key).and_then(VecDeque::pop_back)
    }

    fn pop_front(&self, key: &str) -> Option<Vec<u8>> {
        self.lists().get_mut(key).and_then(VecDeque::pop_front)
    }

    fn ensure_online(&self) -> Result<(), TransportError> {
        if self.state.offline.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QueueConnector for InMemoryQueue {
    async fn connect(
        &self,
        inactivity_timeout: Option<Duration>,
    ) -> Result<QueueConnectionBox, TransportError> {
        if self.state.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("queue is offline".to_string()));
        }
        self.state.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryConnection {
            queue: self.clone(),
            inactivity_timeout,
        }))
    }
}

struct InMemoryConnection {
    queue: InMemoryQueue,
    inactivity_timeout: Option<Duration>,
}

impl InMemoryConnection {
    async fn wait_for_element(&self, key: &str) -> Result<Vec<u8>, TransportError> {
        loop {
            // Register before checking so a concurrent push cannot be missed.
            let pushed = self.queue.state.pushed.notified();
            self.queue.ensure_online()?;
            if let Some(value) = self.queue.pop_back(key) {
                return Ok(value);
            }
            pushed.await;
        }
    }
}

#[async_trait]
impl QueueConnection for InMemoryConnection {
    async fn length(&mut self, key: &str) -> Result<u64, TransportError> {
        self.queue.ensure_online()?;
        Ok(self.queue.len(key) as u64)
    }

    async fn blocking_pop_tail(&mut self, key: &str) -> Result<Option<Vec<u8>>, TransportError> {
        match self.inactivity_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.wait_for_element(key)).await
            {
                Ok(result) => result.map(Some),
                Err(_elapsed) => Ok(None),
            },
            None => self.wait_for_element(key).await.map(Some),
        }
    }

    async fn pop_head(&mut self, key: &str) -> Result<Option<Vec<u8>>, TransportError> {
        self.queue.ensure_online()?;
        Ok(self.queue.pop_front(key))
    }

    async fn push_head(&mut self, key: &str, value: Vec<u8>) -> Result<u64, TransportError> {
        self.queue.ensure_online()?;
        Ok(self.queue.push(key, value))
    }
}

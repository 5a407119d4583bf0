use crate::domain::ports::{QueueConnection, QueueConnectionBox, QueueConnector};
use crate::error::TransportError;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tracing::debug;

/// Queue transport backed by Redis lists.
///
/// `blocking_pop_tail` is `BRPOP`, `pop_head` is `LPOP` and `push_head` is
/// `LPUSH`, so producers pushing with `LPUSH` are drained oldest-first.
#[derive(Clone)]
pub struct RedisConnector {
    client: redis::Client,
}

impl RedisConnector {
    pub fn open(url: &str) -> Result<Self, TransportError> {
        let client =
            redis::Client::open(url).map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl QueueConnector for RedisConnector {
    async fn connect(
        &self,
        inactivity_timeout: Option<Duration>,
    ) -> Result<QueueConnectionBox, TransportError> {
        let conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(?inactivity_timeout, "Opened Redis connection");
        Ok(Box::new(RedisConnection {
            conn,
            inactivity_timeout,
        }))
    }
}

struct RedisConnection {
    conn: MultiplexedConnection,
    inactivity_timeout: Option<Duration>,
}

#[async_trait]
impl QueueConnection for RedisConnection {
    async fn length(&mut self, key: &str) -> Result<u64, TransportError> {
        Ok(redis::cmd("LLEN")
            .arg(key)
            .query_async::<_, u64>(&mut self.conn)
            .await?)
    }

    async fn blocking_pop_tail(&mut self, key: &str) -> Result<Option<Vec<u8>>, TransportError> {
        // BRPOP treats 0 as "block forever".
        let timeout = self.inactivity_timeout.map_or(0.0, |t| t.as_secs_f64());
        let popped = redis::cmd("BRPOP")
            .arg(key)
            .arg(timeout)
            .query_async::<_, Option<(Vec<u8>, Vec<u8>)>>(&mut self.conn)
            .await?;
        Ok(popped.map(|(_key, value)| value))
    }

    async fn pop_head(&mut self, key: &str) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(redis::cmd("LPOP")
            .arg(key)
            .query_async::<_, Option<Vec<u8>>>(&mut self.conn)
            .await?)
    }

    async fn push_head(&mut self, key: &str, value: Vec<u8>) -> Result<u64, TransportError> {
        Ok(redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async::<_, u64>(&mut self.conn)
            .await?)
    }
}

//! Redis counter backend
//!
//! For multi-process deployments the counter capability needs an external
//! atomic-increment store; Redis INCR is exactly that. Only counters live
//! here — subscriptions and the webhook seen-set need durable storage and
//! stay on PostgreSQL.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{CounterStore, CounterUpdate};
use crate::error::AccessResult;

pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Open a managed connection to `url` (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> AccessResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn compare_and_increment(
        &self,
        key: &str,
        ceiling: u32,
        ttl: Duration,
    ) -> AccessResult<CounterUpdate> {
        let mut conn = self.conn.clone();

        if ceiling == 0 {
            let count: Option<u32> = conn.get(key).await?;
            return Ok(CounterUpdate {
                admitted: false,
                count: count.unwrap_or(0),
            });
        }

        let count: u32 = conn.incr(key, 1u32).await?;
        if count == 1 {
            // Fresh key; let Redis expire it instead of sweeping.
            let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
        }

        if count <= ceiling {
            Ok(CounterUpdate {
                admitted: true,
                count,
            })
        } else {
            // Undo the overshoot so the stored value stays at the ceiling.
            let _: () = conn.decr(key, 1u32).await?;
            Ok(CounterUpdate {
                admitted: false,
                count: ceiling,
            })
        }
    }

    async fn get(&self, key: &str) -> AccessResult<u32> {
        let mut conn = self.conn.clone();
        let count: Option<u32> = conn.get(key).await?;
        Ok(count.unwrap_or(0))
    }

    async fn remove_prefix(&self, _prefix: &str) -> AccessResult<u64> {
        // Keys carry TTLs; there is nothing to sweep.
        Ok(0)
    }
}

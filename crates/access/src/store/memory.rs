//! In-memory store backends
//!
//! Mutex-guarded maps. Counter and rate-window state is ephemeral by
//! contract, and single-process deployments accept losing subscription and
//! seen-set state on restart (the payment provider re-delivers).

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moodmate_shared::UserId;

use super::{
    CounterStore, CounterUpdate, EventClaim, SubscriptionStore, WebhookStore,
    CLAIM_STALE_AFTER_SECS,
};
use crate::error::AccessResult;
use crate::subscriptions::Subscription;

#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: Mutex<HashMap<String, u32>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn compare_and_increment(
        &self,
        key: &str,
        ceiling: u32,
        _ttl: Duration,
    ) -> AccessResult<CounterUpdate> {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let value = counters.entry(key.to_string()).or_insert(0);
        if *value < ceiling {
            *value += 1;
            Ok(CounterUpdate {
                admitted: true,
                count: *value,
            })
        } else {
            Ok(CounterUpdate {
                admitted: false,
                count: *value,
            })
        }
    }

    async fn get(&self, key: &str) -> AccessResult<u32> {
        let counters = self
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(counters.get(key).copied().unwrap_or(0))
    }

    async fn remove_prefix(&self, prefix: &str) -> AccessResult<u64> {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = counters.len();
        counters.retain(|key, _| !key.starts_with(prefix));
        Ok((before - counters.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: Mutex<HashMap<UserId, Subscription>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn get(&self, user_id: UserId) -> AccessResult<Option<Subscription>> {
        let subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(subscriptions.get(&user_id).cloned())
    }

    async fn upsert(&self, subscription: &Subscription) -> AccessResult<()> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscriptions.insert(subscription.user_id, subscription.clone());
        Ok(())
    }

    async fn list_lapsed(&self, now: DateTime<Utc>) -> AccessResult<Vec<Subscription>> {
        let subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(subscriptions
            .values()
            .filter(|sub| sub.has_lapsed(now))
            .cloned()
            .collect())
    }
}

enum EventState {
    Processing { claimed_at: DateTime<Utc> },
    Applied,
}

#[derive(Default)]
pub struct InMemoryWebhookStore {
    events: Mutex<HashMap<String, EventState>>,
}

impl InMemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn try_claim(&self, event_id: &str, now: DateTime<Utc>) -> AccessResult<EventClaim> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        match events.get(event_id) {
            None => {
                events.insert(
                    event_id.to_string(),
                    EventState::Processing { claimed_at: now },
                );
                Ok(EventClaim::Claimed)
            }
            Some(EventState::Applied) => Ok(EventClaim::AlreadyApplied),
            Some(EventState::Processing { claimed_at })
                if (now - *claimed_at).num_seconds() >= CLAIM_STALE_AFTER_SECS =>
            {
                events.insert(
                    event_id.to_string(),
                    EventState::Processing { claimed_at: now },
                );
                Ok(EventClaim::Claimed)
            }
            Some(EventState::Processing { .. }) => Ok(EventClaim::InFlight),
        }
    }

    async fn mark_applied(&self, event_id: &str) -> AccessResult<()> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.insert(event_id.to_string(), EventState::Applied);
        Ok(())
    }

    async fn release(&self, event_id: &str) -> AccessResult<()> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(EventState::Processing { .. }) = events.get(event_id) {
            events.remove(event_id);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn counter_admits_up_to_the_ceiling() {
        let store = InMemoryCounterStore::new();
        for expected in 1..=3u32 {
            let update = store.compare_and_increment("k", 3, TTL).await.unwrap();
            assert!(update.admitted);
            assert_eq!(update.count, expected);
        }
        let denied = store.compare_and_increment("k", 3, TTL).await.unwrap();
        assert!(!denied.admitted);
        assert_eq!(denied.count, 3);
        assert_eq!(store.get("k").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn counter_zero_ceiling_never_admits() {
        let store = InMemoryCounterStore::new();
        let update = store.compare_and_increment("k", 0, TTL).await.unwrap();
        assert!(!update.admitted);
        assert_eq!(update.count, 0);
    }

    #[tokio::test]
    async fn remove_prefix_only_touches_matching_keys() {
        let store = InMemoryCounterStore::new();
        store.compare_and_increment("a:1", 5, TTL).await.unwrap();
        store.compare_and_increment("a:2", 5, TTL).await.unwrap();
        store.compare_and_increment("b:1", 5, TTL).await.unwrap();
        assert_eq!(store.remove_prefix("a:").await.unwrap(), 2);
        assert_eq!(store.get("b:1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn webhook_claims_are_exclusive_until_released() {
        let store = InMemoryWebhookStore::new();
        let now = Utc::now();
        assert_eq!(store.try_claim("evt", now).await.unwrap(), EventClaim::Claimed);
        assert_eq!(
            store.try_claim("evt", now).await.unwrap(),
            EventClaim::InFlight
        );
        store.release("evt").await.unwrap();
        assert_eq!(store.try_claim("evt", now).await.unwrap(), EventClaim::Claimed);
        store.mark_applied("evt").await.unwrap();
        assert_eq!(
            store.try_claim("evt", now).await.unwrap(),
            EventClaim::AlreadyApplied
        );
    }

    #[tokio::test]
    async fn stale_processing_claims_can_be_stolen() {
        let store = InMemoryWebhookStore::new();
        let t0 = Utc::now();
        assert_eq!(store.try_claim("evt", t0).await.unwrap(), EventClaim::Claimed);
        let later = t0 + chrono::Duration::seconds(CLAIM_STALE_AFTER_SECS + 1);
        assert_eq!(
            store.try_claim("evt", later).await.unwrap(),
            EventClaim::Claimed
        );
    }
}

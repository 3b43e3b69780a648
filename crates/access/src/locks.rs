//! Per-user async locks
//!
//! Subscription transitions and webhook application serialize per user so
//! two concurrent events for the same user cannot interleave their
//! read-modify-write cycles. There is deliberately no lock across users.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use moodmate_shared::UserId;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for `user_id`; callers hold the guard across the
    /// transition.
    pub fn handle(&self, user_id: UserId) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(user_id).or_default().clone()
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::{Lease, LockProvider, LockSettings};
use crate::error::LockError;

#[derive(Debug)]
struct Held {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    leases: Mutex<HashMap<String, Held>>,
    released: Notify,
    unavailable: AtomicBool,
}

/// Lease table kept in process memory.
///
/// Suitable for a single inventory instance and for tests. Waiters are woken
/// when a lease is released and otherwise re-check every `retry_delay`, which
/// is how expired leases get picked up.
#[derive(Debug, Clone)]
pub struct InMemoryLockProvider {
    inner: Arc<Inner>,
    settings: LockSettings,
}

impl InMemoryLockProvider {
    pub fn new(settings: LockSettings) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            settings,
        }
    }

    /// Simulates the lock service going away (or coming back).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns true if an unexpired lease is held on `key`.
    pub fn is_held(&self, key: &str) -> bool {
        self.leases()
            .get(key)
            .is_some_and(|held| held.expires_at > Instant::now())
    }

    fn leases(&self) -> MutexGuard<'_, HashMap<String, Held>> {
        self.inner
            .leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), LockError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(LockError::Unavailable("lock service unreachable".to_string()));
        }
        Ok(())
    }

    fn try_grant(&self, key: &str, ttl: Duration) -> Option<Lease> {
        let mut leases = self.leases();
        let now = Instant::now();
        if leases.get(key).is_some_and(|held| held.expires_at > now) {
            return None;
        }
        let token = Uuid::new_v4().to_string();
        leases.insert(
            key.to_string(),
            Held {
                token: token.clone(),
                expires_at: now + ttl,
            },
        );
        Some(Lease::new(key, token, ttl))
    }
}

impl Default for InMemoryLockProvider {
    fn default() -> Self {
        Self::new(LockSettings::default())
    }
}

#[async_trait]
impl LockProvider for InMemoryLockProvider {
    async fn acquire(&self, key: &str, lease: Duration) -> Result<Lease, LockError> {
        let started = Instant::now();
        let deadline = started + self.settings.wait;

        loop {
            self.check_available()?;

            let released = self.inner.released.notified();
            if let Some(granted) = self.try_grant(key, lease) {
                return Ok(granted);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Timeout {
                    key: key.to_string(),
                    waited: now - started,
                });
            }
            let pause = self.settings.retry_delay.min(deadline - now);
            let _ = tokio::time::timeout(pause, released).await;
        }
    }

    async fn release(&self, lease: &Lease) -> Result<(), LockError> {
        self.check_available()?;

        let removed = {
            let mut leases = self.leases();
            match leases.get(lease.key()) {
                Some(held) if held.token == lease.token() => leases.remove(lease.key()).is_some(),
                _ => false,
            }
        };
        if removed {
            self.inner.released.notify_waiters();
        }
        Ok(())
    }
}

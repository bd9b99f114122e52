//! Per-product mutual exclusion.
//!
//! Reservations for the same product are serialized by a lease taken from a
//! [`LockProvider`] that every inventory instance shares. Reservations for
//! different products use different keys and never wait on each other.
//!
//! Two other strategies were considered for guarding the read-check-decrement
//! and rejected:
//! - a row lock (`SELECT ... FOR UPDATE`) held for the check and write. It
//!   makes correctness depend on the ledger database's isolation behaviour,
//!   and the lock stays held across a network hop when the caller is not
//!   co-located with the database.
//! - optimistic versioning: read `(available_units, version)`, write back with
//!   `WHERE version = $read`, and retry on zero affected rows. No lock is held
//!   across I/O, but every conflict costs a retry and the retry loop needs a
//!   bound to avoid livelock.

mod memory;
mod redis;

pub use self::memory::InMemoryLockProvider;
pub use self::redis::RedisLockProvider;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use common::ProductId;
use tokio::time::Instant;

use crate::error::{LockError, Result};

/// Resource key guarding a product's stock record.
pub fn product_key(product_id: ProductId) -> String {
    format!("inventory:product:{product_id}")
}

/// Timing parameters for lease-based locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    /// How long a granted lease stays valid if never released.
    pub lease: Duration,
    /// Upper bound on waiting for a held lease before giving up.
    pub wait: Duration,
    /// Pause between acquisition attempts while waiting.
    pub retry_delay: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(8),
            wait: Duration::from_secs(3),
            retry_delay: Duration::from_millis(50),
        }
    }
}

/// A granted, time-bounded claim on a named resource.
#[derive(Debug, Clone)]
pub struct Lease {
    key: String,
    token: String,
    expires_at: Instant,
}

impl Lease {
    pub(crate) fn new(key: impl Into<String>, token: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            token: token.into(),
            expires_at: Instant::now() + ttl,
        }
    }

    /// The resource key this lease covers.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Unique token identifying this holder; release only succeeds with it.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns true once the lease duration has elapsed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// A cross-process mutual-exclusion service.
///
/// `acquire` waits at most the provider's configured bound and fails with
/// [`LockError::Timeout`] when the lease stays taken, or
/// [`LockError::Unavailable`] when the provider cannot be reached. `release`
/// is idempotent and harmless after the lease has expired.
#[async_trait]
pub trait LockProvider: Send + Sync {
    async fn acquire(&self, key: &str, lease: Duration) -> std::result::Result<Lease, LockError>;

    async fn release(&self, lease: &Lease) -> std::result::Result<(), LockError>;
}

/// Runs a critical section while holding a product's lock.
///
/// This is the only locking surface the inventory service depends on; the
/// strategy behind it is chosen by the type the service is built with.
pub trait ProductLock: Send + Sync {
    fn with_product_lock<T, F, Fut>(
        &self,
        product_id: ProductId,
        critical: F,
    ) -> impl Future<Output = Result<T>> + Send
    where
        T: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send;
}

/// [`ProductLock`] backed by leases from a [`LockProvider`].
#[derive(Debug, Clone)]
pub struct LeasedProductLock<P> {
    provider: P,
    lease: Duration,
}

impl<P: LockProvider> LeasedProductLock<P> {
    pub fn new(provider: P, lease: Duration) -> Self {
        Self { provider, lease }
    }

    /// Returns the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: LockProvider> ProductLock for LeasedProductLock<P> {
    fn with_product_lock<T, F, Fut>(
        &self,
        product_id: ProductId,
        critical: F,
    ) -> impl Future<Output = Result<T>> + Send
    where
        T: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        async move {
            let key = product_key(product_id);
            let started = Instant::now();
            let lease = self.provider.acquire(&key, self.lease).await?;
            metrics::histogram!("inventory_lock_wait_seconds")
                .record(started.elapsed().as_secs_f64());

            let outcome = critical().await;

            if lease.is_expired() {
                tracing::warn!(%key, "lease expired before the critical section finished");
            }
            if let Err(e) = self.provider.release(&lease).await {
                // The write is already staged; the lease times out on its own.
                tracing::warn!(%key, error = %e, "failed to release product lock");
            }
            outcome
        }
    }
}

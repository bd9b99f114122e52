use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::time::Instant;
use uuid::Uuid;

use super::{Lease, LockProvider, LockSettings};
use crate::error::LockError;

/// Deletes the key only while it still carries the caller's token, so a
/// holder whose lease expired cannot remove someone else's lease.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Smallest per-command bound, so a zero wait still gets one attempt.
const MIN_REPLY_WAIT: Duration = Duration::from_millis(1);

/// Lease provider backed by Redis `SET NX PX`.
///
/// Every command is bounded: `acquire` by what is left of `settings.wait`,
/// `release` by `settings.wait` itself.
#[derive(Clone)]
pub struct RedisLockProvider {
    conn: MultiplexedConnection,
    settings: LockSettings,
}

impl RedisLockProvider {
    /// Connects to the Redis server at `url`.
    ///
    /// Gives up after `settings.wait` so a dead server surfaces as
    /// [`LockError::Unavailable`] rather than a hang at startup.
    pub async fn connect(url: &str, settings: LockSettings) -> Result<Self, LockError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let conn = tokio::time::timeout(settings.wait, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| LockError::Unavailable(format!("timed out connecting to {url}")))?
            .map_err(unavailable)?;

        tracing::info!("Connected to Redis lock service");
        Ok(Self { conn, settings })
    }

    async fn try_set(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
        limit: Duration,
    ) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        let millis = u64::try_from(lease.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Option<String> = bounded(
            limit,
            redis::cmd("SET")
                .arg(key)
                .arg(token)
                .arg("NX")
                .arg("PX")
                .arg(millis)
                .query_async(&mut conn),
        )
        .await?;
        Ok(reply.is_some())
    }
}

/// Awaits one Redis round trip for at most `limit`.
///
/// A server that accepted the connection but stopped answering is reported
/// as [`LockError::Unavailable`].
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = redis::RedisResult<T>>,
) -> Result<T, LockError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| LockError::Unavailable(format!("no reply from Redis within {limit:?}")))?
        .map_err(unavailable)
}

fn unavailable(err: redis::RedisError) -> LockError {
    LockError::Unavailable(err.to_string())
}

#[async_trait]
impl LockProvider for RedisLockProvider {
    async fn acquire(&self, key: &str, lease: Duration) -> Result<Lease, LockError> {
        let token = Uuid::new_v4().to_string();
        let started = Instant::now();
        let deadline = started + self.settings.wait;

        loop {
            let remaining = deadline
                .saturating_duration_since(Instant::now())
                .max(MIN_REPLY_WAIT);
            if self.try_set(key, &token, lease, remaining).await? {
                return Ok(Lease::new(key, token, lease));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Timeout {
                    key: key.to_string(),
                    waited: now - started,
                });
            }
            tokio::time::sleep(self.settings.retry_delay.min(deadline - now)).await;
        }
    }

    async fn release(&self, lease: &Lease) -> Result<(), LockError> {
        let mut conn = self.conn.clone();
        let script = redis::Script::new(RELEASE_SCRIPT);
        let removed: i64 = bounded(
            self.settings.wait,
            script
                .key(lease.key())
                .arg(lease.token())
                .invoke_async(&mut conn),
        )
        .await?;

        if removed == 0 {
            tracing::debug!(key = lease.key(), "lease already expired or taken over");
        }
        Ok(())
    }
}

//! Local JTI cache layered over a shared replay store.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{InMemoryReplayGuard, ReplayGuard, ReplayKey};
use crate::AuthResult;

/// Answers known replays locally and defers first uses to a shared store.
///
/// The shared store stays authoritative: a key is only accepted when the
/// store accepts it, so the local cache can only add rejections.
pub struct CachedReplayGuard {
    local: InMemoryReplayGuard,
    store: Arc<dyn ReplayGuard>,
}

impl CachedReplayGuard {
    /// Wraps `store` with the given local cache.
    #[must_use]
    pub fn new(local: InMemoryReplayGuard, store: Arc<dyn ReplayGuard>) -> Self {
        Self { local, store }
    }

    fn remember(&self, key: &ReplayKey, retain_until: OffsetDateTime, now: OffsetDateTime) {
        if let Err(e) = self.local.try_consume_at(key, retain_until, now) {
            tracing::debug!(error = %e, "Local JTI cache did not record entry");
        }
    }
}

#[async_trait]
impl ReplayGuard for CachedReplayGuard {
    async fn try_consume(
        &self,
        key: &ReplayKey,
        retain_until: OffsetDateTime,
        now: OffsetDateTime,
    ) -> AuthResult<bool> {
        if self.local.is_consumed_at(key, now) {
            return Ok(false);
        }

        let first_use = self.store.try_consume(key, retain_until, now).await?;
        self.remember(key, retain_until, now);
        Ok(first_use)
    }

    async fn is_consumed(&self, key: &ReplayKey) -> AuthResult<bool> {
        if self.local.is_consumed_at(key, OffsetDateTime::now_utc()) {
            return Ok(true);
        }
        self.store.is_consumed(key).await
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let local = self.local.purge(OffsetDateTime::now_utc());
        let shared = self.store.cleanup_expired().await?;
        Ok(local + shared)
    }
}

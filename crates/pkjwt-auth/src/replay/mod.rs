//! Assertion replay prevention.
//!
//! A [`ReplayGuard`] records which assertions have been consumed so the same
//! `jti` cannot authenticate twice while it could still pass validation.
//!
//! # Implementations
//!
//! - [`InMemoryReplayGuard`] - process-local, bounded, lazily evicted
//! - [`CachedReplayGuard`] - local cache in front of a shared store
//! - [`NoopReplayGuard`] - used when token reuse is permitted
//!
//! Shared stores (a database table, a distributed cache) implement the trait
//! in their own crates and are handed to [`guard_for_policy`].

mod cached;
mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

use crate::AuthResult;
use crate::policy::ValidationPolicy;

pub use cached::CachedReplayGuard;
pub use memory::InMemoryReplayGuard;

/// Identity of a consumed assertion.
///
/// `jti` values are only unique per issuer, so the key includes `iss` and
/// `sub` as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplayKey {
    issuer: String,
    subject: String,
    jwt_id: String,
}

impl ReplayKey {
    /// Creates a replay key. A missing issuer is stored as the empty string.
    #[must_use]
    pub fn new(issuer: Option<&str>, subject: &str, jwt_id: &str) -> Self {
        Self {
            issuer: issuer.unwrap_or_default().to_string(),
            subject: subject.to_string(),
            jwt_id: jwt_id.to_string(),
        }
    }

    /// The assertion's issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The assertion's subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The assertion's JWT ID.
    #[must_use]
    pub fn jwt_id(&self) -> &str {
        &self.jwt_id
    }
}

/// Tracks consumed assertions.
#[async_trait]
pub trait ReplayGuard: Send + Sync {
    /// Atomically records `key` as consumed unless it already is.
    ///
    /// Returns `true` on first use and `false` for a replay. Of any number
    /// of concurrent calls with the same key, exactly one returns `true`.
    /// An existing entry counts as a replay while `retain_until` is after
    /// `now`, the evaluation time of the assertion.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails or is full. Callers must
    /// treat an error as a rejection.
    async fn try_consume(
        &self,
        key: &ReplayKey,
        retain_until: OffsetDateTime,
        now: OffsetDateTime,
    ) -> AuthResult<bool>;

    /// Returns `true` if `key` is currently recorded as consumed.
    ///
    /// Prefer [`try_consume`](Self::try_consume), which checks and records
    /// in one step.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn is_consumed(&self, key: &ReplayKey) -> AuthResult<bool>;

    /// Deletes entries whose retention has passed and returns how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}

/// Accepts every assertion. Used when token reuse is permitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReplayGuard;

#[async_trait]
impl ReplayGuard for NoopReplayGuard {
    async fn try_consume(
        &self,
        _key: &ReplayKey,
        _retain_until: OffsetDateTime,
        _now: OffsetDateTime,
    ) -> AuthResult<bool> {
        Ok(true)
    }

    async fn is_consumed(&self, _key: &ReplayKey) -> AuthResult<bool> {
        Ok(false)
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        Ok(0)
    }
}

/// Picks the replay guard matching `policy`.
///
/// - reuse permitted: [`NoopReplayGuard`]
/// - shared store with the JTI cache enabled: [`CachedReplayGuard`]
/// - shared store alone: the store itself
/// - no shared store: [`InMemoryReplayGuard`]
#[must_use]
pub fn guard_for_policy(
    policy: &ValidationPolicy,
    shared_store: Option<Arc<dyn ReplayGuard>>,
) -> Arc<dyn ReplayGuard> {
    if !policy.prevent_token_reuse() {
        return Arc::new(NoopReplayGuard);
    }

    match shared_store {
        Some(store) if policy.enable_jti_cache() => Arc::new(CachedReplayGuard::new(
            InMemoryReplayGuard::with_capacity(policy.replay_cache_capacity()),
            store,
        )),
        Some(store) => store,
        None => Arc::new(InMemoryReplayGuard::with_capacity(
            policy.replay_cache_capacity(),
        )),
    }
}

/// Spawns a task that calls [`ReplayGuard::cleanup_expired`] every `period`.
///
/// The task runs until the returned handle is aborted or the runtime shuts
/// down. Must be called from within a Tokio runtime.
pub fn spawn_sweeper(guard: Arc<dyn ReplayGuard>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match guard.cleanup_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Swept expired replay entries"),
                Err(e) => tracing::warn!(error = %e, "Replay cache sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrivateKeyJwtConfig;

    fn policy(prevent_reuse: bool, jti_cache: bool) -> ValidationPolicy {
        let mut config = PrivateKeyJwtConfig::new("aud").with_prevent_token_reuse(prevent_reuse);
        config.enable_jti_cache = jti_cache;
        ValidationPolicy::from_config(&config).unwrap()
    }

    fn key(jti: &str) -> ReplayKey {
        ReplayKey::new(Some("client"), "client", jti)
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn later() -> OffsetDateTime {
        now() + time::Duration::minutes(5)
    }

    #[test]
    fn test_replay_key_scopes_by_issuer() {
        assert_ne!(
            ReplayKey::new(Some("a"), "s", "j"),
            ReplayKey::new(Some("b"), "s", "j")
        );
        assert_eq!(ReplayKey::new(None, "s", "j").issuer(), "");
    }

    #[tokio::test]
    async fn test_noop_guard_never_detects_replay() {
        let guard = NoopReplayGuard;
        assert!(guard.try_consume(&key("j"), later(), now()).await.unwrap());
        assert!(guard.try_consume(&key("j"), later(), now()).await.unwrap());
        assert!(!guard.is_consumed(&key("j")).await.unwrap());
    }

    #[tokio::test]
    async fn test_guard_for_policy_reuse_allowed() {
        let guard = guard_for_policy(&policy(false, true), None);
        assert!(guard.try_consume(&key("j"), later(), now()).await.unwrap());
        assert!(guard.try_consume(&key("j"), later(), now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_guard_for_policy_in_memory() {
        let guard = guard_for_policy(&policy(true, false), None);
        assert!(guard.try_consume(&key("j"), later(), now()).await.unwrap());
        assert!(!guard.try_consume(&key("j"), later(), now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_guard_for_policy_uses_shared_store() {
        let store: Arc<dyn ReplayGuard> = Arc::new(InMemoryReplayGuard::new());
        store.try_consume(&key("seen"), later(), now()).await.unwrap();

        for jti_cache in [true, false] {
            let guard = guard_for_policy(&policy(true, jti_cache), Some(store.clone()));
            assert!(!guard.try_consume(&key("seen"), later(), now()).await.unwrap());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_entries() {
        let guard = Arc::new(InMemoryReplayGuard::new());
        let past = now() - time::Duration::seconds(1);
        let earlier = past - time::Duration::seconds(1);
        guard.try_consume(&key("old"), past, earlier).await.unwrap();
        guard.try_consume(&key("new"), later(), now()).await.unwrap();
        assert_eq!(guard.len(), 2);

        let handle = spawn_sweeper(guard.clone(), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;

        assert_eq!(guard.len(), 1);
        handle.abort();
    }
}

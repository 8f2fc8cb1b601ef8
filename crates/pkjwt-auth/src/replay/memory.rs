//! Process-local replay cache.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

use super::{ReplayGuard, ReplayKey};
use crate::AuthResult;
use crate::config::DEFAULT_REPLAY_CACHE_CAPACITY;
use crate::error::AuthError;

/// In-memory [`ReplayGuard`] backed by a concurrent map.
///
/// Check-and-record happens under the map's per-shard entry lock, so two
/// concurrent requests carrying the same assertion cannot both succeed.
/// Expired entries are replaced in place on lookup and removed in bulk by
/// [`cleanup_expired`](ReplayGuard::cleanup_expired).
///
/// The cache is bounded. When it is full of live entries, new assertions are
/// refused with a storage error rather than evicting live entries, which
/// would reopen a replay window.
#[derive(Debug)]
pub struct InMemoryReplayGuard {
    entries: DashMap<ReplayKey, OffsetDateTime>,
    capacity: usize,
}

impl InMemoryReplayGuard {
    /// Creates a guard with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CACHE_CAPACITY)
    }

    /// Creates a guard holding at most `capacity` live entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of entries currently held, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records `key` as consumed as of `now`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Storage` if the cache is full of live entries.
    pub fn try_consume_at(
        &self,
        key: &ReplayKey,
        retain_until: OffsetDateTime,
        now: OffsetDateTime,
    ) -> AuthResult<bool> {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(key) {
            self.purge(now);
            if self.entries.len() >= self.capacity {
                tracing::warn!(capacity = self.capacity, "Replay cache is full");
                return Err(AuthError::storage("replay cache is full"));
            }
        }

        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() <= now {
                    entry.insert(retain_until);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(retain_until);
                Ok(true)
            }
        }
    }

    /// Returns `true` if `key` holds an entry still retained at `now`.
    #[must_use]
    pub fn is_consumed_at(&self, key: &ReplayKey, now: OffsetDateTime) -> bool {
        self.entries
            .get(key)
            .is_some_and(|retain_until| *retain_until > now)
    }

    /// Removes entries whose retention ended at or before `now`.
    pub fn purge(&self, now: OffsetDateTime) -> u64 {
        let before = self.entries.len();
        self.entries.retain(|_, retain_until| *retain_until > now);
        before.saturating_sub(self.entries.len()) as u64
    }
}

impl Default for InMemoryReplayGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplayGuard for InMemoryReplayGuard {
    async fn try_consume(
        &self,
        key: &ReplayKey,
        retain_until: OffsetDateTime,
        now: OffsetDateTime,
    ) -> AuthResult<bool> {
        self.try_consume_at(key, retain_until, now)
    }

    async fn is_consumed(&self, key: &ReplayKey) -> AuthResult<bool> {
        Ok(self.is_consumed_at(key, OffsetDateTime::now_utc()))
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        Ok(self.purge(OffsetDateTime::now_utc()))
    }
}

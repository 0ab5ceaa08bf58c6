//! Process-wide tagging cooldowns

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Source of "now" for cooldown bookkeeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Used by tests across the workspace.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { origin: Instant::now(), offset: Mutex::new(Duration::ZERO) }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A member currently in cooldown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserCooldown {
    pub user_id: String,
    pub remaining_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CooldownStats {
    /// Entries held, including expired ones not yet pruned
    pub tracked: usize,
    pub active: usize,
    /// Active entries, longest remaining first
    pub users: Vec<UserCooldown>,
}

/// Mapping of user id to cooldown expiry.
///
/// Every operation takes the same lock, so per-user transitions are
/// linearizable and concurrent marks on different users are never lost.
/// The lock is never held across an await point.
pub struct CooldownStore {
    entries: Mutex<HashMap<String, Instant>>,
    clock: Arc<dyn Clock>,
}

impl CooldownStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { entries: Mutex::new(HashMap::new()), clock }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn is_active(&self, user_id: &str) -> bool {
        self.is_active_at(user_id, self.clock.now())
    }

    /// Locks the store and pins "now" for a read-then-commit sequence.
    pub fn guard(&self) -> CooldownGuard<'_> {
        let now = self.clock.now();
        CooldownGuard { entries: self.lock(), now }
    }

    pub fn is_active_at(&self, user_id: &str, now: Instant) -> bool {
        self.lock().get(user_id).is_some_and(|expires_at| *expires_at > now)
    }

    /// Starts or restarts the cooldown. A previous entry is overwritten,
    /// never extended.
    pub fn mark(&self, user_id: &str, duration: Duration) {
        let expires_at = self.clock.now() + duration;
        self.lock().insert(user_id.to_owned(), expires_at);
    }

    /// Marks a batch under a single lock acquisition, all with the same expiry.
    pub fn mark_all<I, S>(&self, user_ids: I, duration: Duration)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let expires_at = self.clock.now() + duration;
        let mut entries = self.lock();
        for user_id in user_ids {
            entries.insert(user_id.as_ref().to_owned(), expires_at);
        }
    }

    pub fn remaining(&self, user_id: &str) -> Option<Duration> {
        let now = self.clock.now();
        remaining_at(self.lock().get(user_id).copied(), now)
    }

    /// Drops expired entries and returns how many were removed.
    pub fn prune(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    pub fn prune_expired(&self) -> usize {
        self.prune(self.clock.now())
    }

    pub fn stats(&self) -> CooldownStats {
        let now = self.clock.now();
        let entries = self.lock();
        let mut users: Vec<UserCooldown> = entries
            .iter()
            .filter_map(|(user_id, expires_at)| {
                remaining_at(Some(*expires_at), now).map(|left| UserCooldown {
                    user_id: user_id.clone(),
                    remaining_secs: left.as_secs(),
                })
            })
            .collect();
        users.sort_by(|a, b| {
            b.remaining_secs.cmp(&a.remaining_secs).then_with(|| a.user_id.cmp(&b.user_id))
        });

        CooldownStats { tracked: entries.len(), active: users.len(), users }
    }

    /// Entry set ordered by user id.
    pub fn snapshot(&self) -> Vec<(String, Instant)> {
        let mut entries: Vec<(String, Instant)> = self
            .lock()
            .iter()
            .map(|(user_id, expires_at)| (user_id.clone(), *expires_at))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Writers only insert or remove whole entries, so a poisoned map is still
    // consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive view of the cooldown map at a single instant.
///
/// Checks and marks made through one guard are atomic with respect to every
/// other store operation. Drop it before awaiting.
pub struct CooldownGuard<'a> {
    entries: MutexGuard<'a, HashMap<String, Instant>>,
    now: Instant,
}

impl CooldownGuard<'_> {
    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn remaining(&self, user_id: &str) -> Option<Duration> {
        remaining_at(self.entries.get(user_id).copied(), self.now)
    }

    pub fn is_active(&self, user_id: &str) -> bool {
        self.remaining(user_id).is_some()
    }

    pub fn mark_all<I, S>(&mut self, user_ids: I, duration: Duration)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let expires_at = self.now + duration;
        for user_id in user_ids {
            self.entries.insert(user_id.as_ref().to_owned(), expires_at);
        }
    }
}

fn remaining_at(expires_at: Option<Instant>, now: Instant) -> Option<Duration> {
    expires_at
        .and_then(|expires_at| expires_at.checked_duration_since(now))
        .filter(|remaining| !remaining.is_zero())
}

impl Default for CooldownStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CooldownStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownStore").field("tracked", &self.len()).finish()
    }
}

//! Fixed-window rate limiting keyed by client
//!
//! [`RateLimiter`] is the seam the gateway talks to. [`InMemoryRateLimiter`]
//! keeps one [`RateLimitRecord`] per client key in process memory.
//!
//! **Single-process only.** Counters are not shared between instances and do
//! not survive a restart. Running several instances behind a load balancer
//! multiplies the effective limit by the instance count; a shared counter
//! store (atomic increment + expiry) has to implement [`RateLimiter`] for
//! that deployment.
//!
//! Per key the state moves `NEW -> ACTIVE -> EXHAUSTED -> (window expiry) NEW`.
//! `NEW` is the absence of a record.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Outcome of one rate-limit check. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,

    /// Maximum requests allowed per window
    pub limit: u32,

    /// `limit - count`, floored at zero
    pub remaining: u32,

    /// Moment the current window ends
    pub reset_time: DateTime<Utc>,
}

/// Counter for a single client key inside its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u32,
    pub reset_time: DateTime<Utc>,
}

/// Backend that counts requests per client key.
///
/// `check_and_increment` must be atomic per key: two concurrent calls for the
/// same key may never both observe `count < limit` when only one slot is left.
pub trait RateLimiter: Send + Sync + 'static {
    /// Counts one request for `key` and decides whether it is admitted.
    fn check_and_increment(&self, key: &str) -> RateLimitDecision;

    /// Maximum requests per window.
    fn limit(&self) -> u32;
}

/// Process-local limiter backed by a sharded concurrent map.
///
/// The `Entry` API holds the shard write lock for the whole
/// read-increment-write sequence, which makes each check atomic per key.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    limit: u32,
    window: TimeDelta,
    records: DashMap<String, RateLimitRecord>,
}

impl InMemoryRateLimiter {
    /// Creates a limiter admitting `limit` requests per `window`.
    ///
    /// A `limit` of zero is raised to one: the first request of a window is
    /// always admitted.
    pub fn new(limit: u32, window: TimeDelta) -> Self {
        Self {
            limit: limit.max(1),
            window,
            records: DashMap::new(),
        }
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Same as [`RateLimiter::check_and_increment`] with an explicit clock.
    pub fn check_at(&self, key: &str, now: DateTime<Utc>) -> RateLimitDecision {
        match self.records.entry(key.to_owned()) {
            Entry::Vacant(vacant) => {
                let record = vacant.insert(self.fresh_record(now));
                self.admitted(record.count, record.reset_time)
            }
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();

                // Window expired: start over at 1
                if now > record.reset_time {
                    *record = self.fresh_record(now);
                    return self.admitted(record.count, record.reset_time);
                }

                if record.count >= self.limit {
                    return RateLimitDecision {
                        allowed: false,
                        limit: self.limit,
                        remaining: 0,
                        reset_time: record.reset_time,
                    };
                }

                record.count += 1;
                self.admitted(record.count, record.reset_time)
            }
        }
    }

    /// Current record for `key`, if any.
    pub fn record(&self, key: &str) -> Option<RateLimitRecord> {
        self.records.get(key).map(|record| *record)
    }

    /// Number of client keys currently tracked.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops every record whose window ended before `now`.
    ///
    /// Returns how many records were removed.
    pub fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| now <= record.reset_time);
        before.saturating_sub(self.records.len())
    }

    fn fresh_record(&self, now: DateTime<Utc>) -> RateLimitRecord {
        RateLimitRecord {
            count: 1,
            // Saturates instead of panicking on windows past the calendar range
            reset_time: now
                .checked_add_signed(self.window)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    fn admitted(&self, count: u32, reset_time: DateTime<Utc>) -> RateLimitDecision {
        RateLimitDecision {
            allowed: count <= self.limit,
            limit: self.limit,
            remaining: self.limit.saturating_sub(count),
            reset_time,
        }
    }
}

impl RateLimiter for InMemoryRateLimiter {
    fn check_and_increment(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Utc::now())
    }

    fn limit(&self) -> u32 {
        self.limit
    }
}

//! Fixed-window request limiter keyed by caller identity
//!
//! Each identity gets a window of `window` length starting at its first
//! request. Requests past `max_requests` inside the window are rejected, and
//! the window restarts on the first request after it ends. All mutation
//! happens under a single mutex, so a burst from one caller never loses an
//! increment and the sweeper never removes an entry that is being counted.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

/// Limiter policy
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::milliseconds(60_000),
        }
    }
}

/// Counting state for one identity
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

/// Outcome of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, never less than one
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> i64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0);
        ((millis + 999) / 1000).max(1)
    }
}

/// Aggregate view for diagnostics; carries no identity strings
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStats {
    pub tracked_identities: usize,
    pub total_requests: u64,
    pub max_requests: u32,
    pub window_ms: i64,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Count a request from `identity` against its current window
    pub fn check(&self, identity: &str) -> RateLimitDecision {
        self.check_at(identity, Utc::now())
    }

    pub fn check_at(&self, identity: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let max = self.config.max_requests;

        let Some(window_end) = now.checked_add_signed(self.config.window) else {
            // Fail open: a broken limiter must not take the endpoint down with it
            tracing::warn!("Rate limit window end out of range, allowing request");
            return RateLimitDecision {
                allowed: true,
                limit: max,
                remaining: max,
                reset_at: now,
            };
        };

        let mut entries = self.lock_entries();

        let entry = entries
            .entry(identity.to_string())
            .or_insert_with(|| RateLimitEntry {
                count: 0,
                window_start: now,
                window_end: now,
            });

        if entry.count == 0 || now >= entry.window_end {
            entry.count = 1;
            entry.window_start = now;
            entry.window_end = window_end;
        } else {
            // Rejected requests still count, capped one past the limit
            entry.count = entry.count.saturating_add(1).min(max.saturating_add(1));
        }

        RateLimitDecision {
            allowed: entry.count <= max,
            limit: max,
            remaining: max.saturating_sub(entry.count),
            reset_at: entry.window_end,
        }
    }

    /// Entries are plain counters, so state left by a panicking holder is still usable
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, RateLimitEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Rate limiter state poisoned, recovering");
            self.entries.clear_poison();
            poisoned.into_inner()
        })
    }

    /// Drop every entry whose window has ended; returns how many were removed
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock_entries();

        let before = entries.len();
        entries.retain(|_, entry| entry.window_end > now);
        before - entries.len()
    }

    pub fn stats(&self) -> RateLimitStats {
        let (tracked_identities, total_requests) = {
            let entries = self.lock_entries();
            (
                entries.len(),
                entries.values().map(|e| u64::from(e.count)).sum::<u64>(),
            )
        };

        RateLimitStats {
            tracked_identities,
            total_requests,
            max_requests: self.config.max_requests,
            window_ms: self.config.window.num_milliseconds(),
        }
    }

    /// Run `sweep` every `every` until the returned handle is aborted
    pub fn spawn_sweeper(self: Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let removed = self.sweep();
                if removed > 0 {
                    tracing::debug!("Swept {} expired rate limit entries", removed);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::milliseconds(60_000),
        })
    }

    #[test]
    fn test_eleven_rapid_requests() {
        let limiter = limiter(10);
        let now = Utc::now();

        for expected_remaining in (0..10).rev() {
            let decision = limiter.check_at("sessionA", now);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let decision = limiter.check_at("sessionA", now);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_at, now + Duration::milliseconds(60_000));
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let limiter = limiter(3);
        let start = Utc::now();

        for _ in 0..8 {
            limiter.check_at("caller", start);
        }
        assert!(!limiter.check_at("caller", start).allowed);

        let later = start + Duration::milliseconds(60_000);
        let decision = limiter.check_at("caller", later);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_at, later + Duration::milliseconds(60_000));
    }

    #[test]
    fn test_count_capped_one_past_limit() {
        let limiter = limiter(2);
        let now = Utc::now();

        for _ in 0..10 {
            limiter.check_at("burst", now);
        }

        assert_eq!(limiter.stats().total_requests, 3);
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = limiter(2);
        let now = Utc::now();

        limiter.check_at("alice", now);
        limiter.check_at("alice", now);
        assert!(!limiter.check_at("alice", now).allowed);

        let decision = limiter.check_at("bob", now);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn test_empty_identity_is_one_shared_bucket() {
        let limiter = limiter(1);
        let now = Utc::now();

        assert!(limiter.check_at("", now).allowed);
        assert!(!limiter.check_at("", now).allowed);
    }

    #[test]
    fn test_sweep_only_removes_expired_windows() {
        let limiter = limiter(5);
        let start = Utc::now();

        limiter.check_at("old", start);
        limiter.check_at("fresh", start + Duration::milliseconds(30_000));

        assert_eq!(limiter.sweep_at(start + Duration::milliseconds(59_999)), 0);
        assert_eq!(limiter.sweep_at(start + Duration::milliseconds(60_000)), 1);

        let stats = limiter.stats();
        assert_eq!(stats.tracked_identities, 1);
        assert_eq!(stats.total_requests, 1);

        // "fresh" is still in its window, so its count survives
        let decision = limiter.check_at("fresh", start + Duration::milliseconds(60_000));
        assert_eq!(decision.remaining, 3);
    }

    #[test]
    fn test_retry_after() {
        let now = Utc::now();
        let decision = RateLimitDecision {
            allowed: false,
            limit: 10,
            remaining: 0,
            reset_at: now + Duration::milliseconds(1_500),
        };
        assert_eq!(decision.retry_after_secs(now), 2);
        assert_eq!(decision.retry_after_secs(now + Duration::milliseconds(5_000)), 1);
    }

    #[test]
    fn test_poisoned_lock_keeps_counting() {
        let limiter = Arc::new(limiter(2));
        let now = Utc::now();
        assert!(limiter.check_at("anyone", now).allowed);

        let poisoner = Arc::clone(&limiter);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.entries.lock().unwrap();
            panic!("poison the limiter");
        })
        .join();

        assert!(limiter.check_at("anyone", now).allowed);
        assert!(!limiter.check_at("anyone", now).allowed);
        assert!(!limiter.entries.is_poisoned());
        assert_eq!(limiter.stats().tracked_identities, 1);
    }

    #[test]
    fn test_unrepresentable_window_fails_open() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::days(100_000_000),
        });
        let now = Utc::now();

        for _ in 0..5 {
            let decision = limiter.check_at("caller", now);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, 1);
        }
        assert_eq!(limiter.stats().tracked_identities, 0);
    }

    #[test]
    fn test_concurrent_burst_counts_every_request() {
        let limiter = Arc::new(limiter(1_000));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        limiter.check("shared");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(limiter.stats().total_requests, 400);
    }

    #[tokio::test]
    async fn test_sweeper_task_can_be_aborted() {
        let limiter = Arc::new(limiter(5));
        let handle = Arc::clone(&limiter).spawn_sweeper(std::time::Duration::from_millis(10));

        handle.abort();
        let result = handle.await;
        assert!(result.unwrap_err().is_cancelled());
    }
}

//! Core rate limiter implementation.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use super::clock::{Clock, SystemClock};
use super::entry::RateLimitEntry;
use super::store::{RateLimitStateStore, RateLimitStore};
use crate::config::{FailureMode, RateLimitingConfig};

/// Default number of actions allowed per window.
pub const DEFAULT_LIMIT: u32 = 3;
/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Configuration for a rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Maximum actions allowed in the window
    pub limit: u32,
    /// Length of the fixed window
    pub window: Duration,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Outcome of [`RateLimiter::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the action was admitted and counted
    pub allowed: bool,
    /// Count in the current window after this call
    pub count: u32,
    /// Configured limit
    pub limit: u32,
    /// Actions left in this window
    pub remaining: u32,
    /// When the current window ends
    pub reset_at: DateTime<Utc>,
    /// Time until `reset_at`
    pub retry_after: Duration,
}

/// Fixed-window rate limiter over a pluggable state store.
///
/// Every operation loads the whole store, works on one entry and, when it
/// changes something, saves the whole store back. A single async lock spans
/// each load/modify/save so that concurrent requests in this process cannot
/// interleave their reads and writes. Processes sharing one state file are
/// not coordinated.
pub struct RateLimiter {
    store: Arc<dyn RateLimitStateStore>,
    clock: Arc<dyn Clock>,
    limits: LimitConfig,
    failure_mode: FailureMode,
    lock: Mutex<()>,
}

impl RateLimiter {
    /// Create a new rate limiter with default limits and the system clock.
    pub fn new(store: Arc<dyn RateLimitStateStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            limits: LimitConfig::default(),
            failure_mode: FailureMode::Open,
            lock: Mutex::new(()),
        }
    }

    /// Create a rate limiter from the service configuration.
    pub fn from_config(config: &RateLimitingConfig, store: Arc<dyn RateLimitStateStore>) -> Self {
        Self::new(store)
            .with_limits(LimitConfig {
                limit: config.max_requests,
                window: config.window(),
            })
            .with_failure_mode(config.failure_mode)
    }

    pub fn with_limits(mut self, limits: LimitConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    /// Whether `client_id` may act now. Never writes.
    ///
    /// On a load failure this returns `true` in open mode and `false` in
    /// closed mode.
    pub async fn is_allowed(&self, client_id: &str) -> bool {
        let _guard = self.lock.lock().await;
        let now = self.clock.now();

        let Some(store) = self.load().await else {
            return self.failure_mode == FailureMode::Open;
        };

        let entry = self.current_entry(&store, client_id, now);
        let allowed = entry.has_capacity(self.limits.limit);

        trace!(
            client_id = client_id,
            count = entry.count,
            allowed = allowed,
            "Checked rate limit"
        );
        allowed
    }

    /// Count one action for `client_id` and persist the store.
    ///
    /// If the store cannot be loaded the action is recorded into a fresh
    /// store holding only this client. Save failures are logged and dropped.
    pub async fn record_action(&self, client_id: &str) {
        let _guard = self.lock.lock().await;
        let now = self.clock.now();

        let mut store = self.load().await.unwrap_or_default();
        let mut entry = self.current_entry(&store, client_id, now);
        entry.increment();

        debug!(client_id = client_id, count = entry.count, "Recorded action");

        store.insert(client_id.to_string(), entry);
        self.persist(&store).await;
    }

    /// Check and count in one step.
    ///
    /// The action is counted only when it is admitted. Nothing is written
    /// for a denied action.
    pub async fn acquire(&self, client_id: &str) -> RateLimitDecision {
        let _guard = self.lock.lock().await;
        let now = self.clock.now();

        let mut store = match self.load().await {
            Some(store) => store,
            None if self.failure_mode == FailureMode::Open => RateLimitStore::new(),
            None => {
                warn!(client_id = client_id, "Denying request, rate limit state unavailable");
                return RateLimitDecision {
                    allowed: false,
                    count: self.limits.limit,
                    limit: self.limits.limit,
                    remaining: 0,
                    reset_at: RateLimitEntry::new(now, self.limits.window).window_reset_at,
                    retry_after: self.limits.window,
                };
            }
        };

        let mut entry = self.current_entry(&store, client_id, now);
        let allowed = entry.has_capacity(self.limits.limit);

        if allowed {
            entry.increment();
            store.insert(client_id.to_string(), entry);
            self.persist(&store).await;
            debug!(
                client_id = client_id,
                count = entry.count,
                limit = self.limits.limit,
                "Request admitted"
            );
        } else {
            warn!(
                client_id = client_id,
                count = entry.count,
                limit = self.limits.limit,
                reset_at = %entry.window_reset_at,
                "Rate limit exceeded"
            );
        }

        RateLimitDecision {
            allowed,
            count: entry.count,
            limit: self.limits.limit,
            remaining: entry.remaining(self.limits.limit),
            reset_at: entry.window_reset_at,
            retry_after: entry.duration_until_reset(now),
        }
    }

    /// Window-adjusted count stored for `client_id`.
    ///
    /// Returns `None` if the client is unknown or the store cannot be read.
    pub async fn current_count(&self, client_id: &str) -> Option<u32> {
        let _guard = self.lock.lock().await;
        let now = self.clock.now();
        let store = self.load().await?;

        store.get(client_id).map(|entry| {
            let mut entry = *entry;
            entry.refresh(now, self.limits.window);
            entry.count
        })
    }

    /// Find or default the entry for a client, reset if its window expired.
    fn current_entry(
        &self,
        store: &RateLimitStore,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> RateLimitEntry {
        let mut entry = store
            .get(client_id)
            .copied()
            .unwrap_or_else(|| RateLimitEntry::new(now, self.limits.window));
        if entry.refresh(now, self.limits.window) {
            trace!(client_id = client_id, "Rate limit window reset");
        }
        entry
    }

    async fn load(&self) -> Option<RateLimitStore> {
        match self.store.load().await {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(error = %e, "Failed to load rate limit state");
                None
            }
        }
    }

    async fn persist(&self, store: &RateLimitStore) {
        if let Err(e) = self.store.save(store).await {
            warn!(error = %e, "Failed to save rate limit state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReportGateError, Result};
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::store::MemoryStateStore;
    use async_trait::async_trait;
    use chrono::TimeZone;

    /// Store whose reads always fail; remembers the last save.
    #[derive(Default)]
    struct UnreadableStore {
        saved: parking_lot::Mutex<Option<RateLimitStore>>,
    }

    #[async_trait]
    impl RateLimitStateStore for UnreadableStore {
        async fn load(&self) -> Result<RateLimitStore> {
            Err(ReportGateError::Storage(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "state file unreadable",
            )))
        }

        async fn save(&self, store: &RateLimitStore) -> Result<()> {
            *self.saved.lock() = Some(store.clone());
            Ok(())
        }
    }

    fn test_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap(),
        ))
    }

    fn create_limiter(clock: Arc<ManualClock>) -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStateStore::new())).with_clock(clock)
    }

    #[tokio::test]
    async fn test_fourth_action_in_window_rejected() {
        let limiter = create_limiter(test_clock());

        for _ in 0..3 {
            assert!(limiter.is_allowed("198.51.100.1").await);
            limiter.record_action("198.51.100.1").await;
        }

        assert!(!limiter.is_allowed("198.51.100.1").await);
        assert_eq!(limiter.current_count("198.51.100.1").await, Some(3));
    }

    #[tokio::test]
    async fn test_is_allowed_does_not_write() {
        let store = Arc::new(MemoryStateStore::new());
        let limiter = RateLimiter::new(store.clone()).with_clock(test_clock());

        assert!(limiter.is_allowed("198.51.100.1").await);
        assert!(store.snapshot().is_empty());
        assert_eq!(limiter.current_count("198.51.100.1").await, None);
    }

    #[tokio::test]
    async fn test_window_expiry_resets_count() {
        let clock = test_clock();
        let limiter = create_limiter(clock.clone());

        for _ in 0..3 {
            limiter.record_action("198.51.100.1").await;
        }
        assert!(!limiter.is_allowed("198.51.100.1").await);

        clock.advance(DEFAULT_WINDOW + Duration::from_secs(1));

        assert!(limiter.is_allowed("198.51.100.1").await);
        limiter.record_action("198.51.100.1").await;
        assert_eq!(limiter.current_count("198.51.100.1").await, Some(1));
    }

    #[tokio::test]
    async fn test_window_boundary_is_inclusive() {
        let clock = test_clock();
        let limiter = create_limiter(clock.clone());

        for _ in 0..3 {
            limiter.record_action("198.51.100.1").await;
        }

        clock.advance(DEFAULT_WINDOW);
        assert!(!limiter.is_allowed("198.51.100.1").await);
    }

    #[tokio::test]
    async fn test_different_clients_have_separate_counters() {
        let limiter = create_limiter(test_clock());

        for _ in 0..3 {
            limiter.record_action("198.51.100.1").await;
        }
        limiter.record_action("198.51.100.2").await;

        assert!(!limiter.is_allowed("198.51.100.1").await);
        assert!(limiter.is_allowed("198.51.100.2").await);
        assert_eq!(limiter.current_count("198.51.100.1").await, Some(3));
        assert_eq!(limiter.current_count("198.51.100.2").await, Some(1));
    }

    #[tokio::test]
    async fn test_unreadable_store_fails_open() {
        let limiter = RateLimiter::new(Arc::new(UnreadableStore::default()));
        assert!(limiter.is_allowed("198.51.100.1").await);
    }

    #[tokio::test]
    async fn test_unreadable_store_fails_closed_when_configured() {
        let limiter = RateLimiter::new(Arc::new(UnreadableStore::default()))
            .with_failure_mode(FailureMode::Closed);

        assert!(!limiter.is_allowed("198.51.100.1").await);
        assert!(!limiter.acquire("198.51.100.1").await.allowed);
    }

    #[tokio::test]
    async fn test_fail_closed_denial_resets_after_one_window() {
        let clock = test_clock();
        let limiter = RateLimiter::new(Arc::new(UnreadableStore::default()))
            .with_clock(clock.clone())
            .with_failure_mode(FailureMode::Closed);

        let decision = limiter.acquire("198.51.100.1").await;

        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, DEFAULT_WINDOW);
        assert_eq!(
            decision.reset_at,
            clock.now() + chrono::TimeDelta::minutes(15)
        );
    }

    #[tokio::test]
    async fn test_record_after_read_failure_writes_single_entry() {
        let store = Arc::new(UnreadableStore::default());
        let limiter = RateLimiter::new(store.clone()).with_clock(test_clock());

        limiter.record_action("198.51.100.9").await;

        let saved = store.saved.lock().clone().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved["198.51.100.9"].count, 1);
    }

    #[tokio::test]
    async fn test_acquire_counts_only_admitted_actions() {
        let limiter = create_limiter(test_clock());

        for expected in 1..=3 {
            let decision = limiter.acquire("198.51.100.1").await;
            assert!(decision.allowed);
            assert_eq!(decision.count, expected);
            assert_eq!(decision.remaining, 3 - expected);
        }

        let denied = limiter.acquire("198.51.100.1").await;
        assert!(!denied.allowed);
        assert_eq!(denied.count, 3);
        assert_eq!(denied.retry_after, DEFAULT_WINDOW);
        assert_eq!(limiter.current_count("198.51.100.1").await, Some(3));
    }

    #[tokio::test]
    async fn test_custom_limits() {
        let limiter = create_limiter(test_clock()).with_limits(LimitConfig {
            limit: 1,
            window: Duration::from_secs(60),
        });

        assert!(limiter.acquire("client").await.allowed);
        let denied = limiter.acquire("client").await;
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Duration::from_secs(60));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_never_exceeds_limit() {
        let limiter = Arc::new(create_limiter(test_clock()));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire("198.51.100.1").await.allowed })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, DEFAULT_LIMIT);
        assert_eq!(limiter.current_count("198.51.100.1").await, Some(DEFAULT_LIMIT));
    }
}

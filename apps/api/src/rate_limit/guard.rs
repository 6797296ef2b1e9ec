//! Fixed-window admission over a `RateLimitStore`.
//!
//! The check is read-then-write and NOT atomic: two concurrent requests for the
//! same key can both observe `count < max` and both be admitted. Limits are
//! approximate under true concurrency.
//!
//! Storage failures fail open. The algorithm itself returns
//! `Result<RateDecision, StorageError>`; only the public entry points turn an
//! error into the fixed fail-open decision.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::rate_limit::client_ip::UNKNOWN_IP;
use crate::rate_limit::models::{RateDecision, RateLimitPolicy, RateLimitRecord};
use crate::rate_limit::store::{RateLimitStore, StorageError};

/// Retention for user-keyed records, regardless of window size.
const USER_RECORD_RETENTION_SECS: i64 = 3600;
/// Extra retention added on top of the window for IP-keyed records.
const IP_RECORD_GRACE_SECS: i64 = 3600;

/// Identity of one counter: the storage key plus what it was derived from.
struct Scope<'a> {
    key: String,
    caller_id: &'a str,
    endpoint_name: &'a str,
    retention_secs: i64,
}

#[derive(Clone)]
pub struct RateLimitGuard {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimitGuard {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Checks and counts one request from `caller_id` against `endpoint_name`.
    pub async fn check_rate_limit(
        &self,
        caller_id: &str,
        endpoint_name: &str,
        policy: RateLimitPolicy,
    ) -> RateDecision {
        self.check_rate_limit_at(caller_id, endpoint_name, policy, now_millis())
            .await
    }

    pub async fn check_rate_limit_at(
        &self,
        caller_id: &str,
        endpoint_name: &str,
        policy: RateLimitPolicy,
        now: i64,
    ) -> RateDecision {
        if caller_id.is_empty() || endpoint_name.is_empty() {
            return RateDecision::reject(0);
        }

        let scope = Scope {
            key: user_key(caller_id, endpoint_name),
            caller_id,
            endpoint_name,
            retention_secs: USER_RECORD_RETENTION_SECS,
        };
        self.admit(&scope, policy, now).await
    }

    /// Same admission rules keyed by client IP, for anonymous endpoints.
    pub async fn check_ip_rate_limit(
        &self,
        ip: &str,
        endpoint_name: &str,
        policy: RateLimitPolicy,
    ) -> RateDecision {
        self.check_ip_rate_limit_at(ip, endpoint_name, policy, now_millis())
            .await
    }

    pub async fn check_ip_rate_limit_at(
        &self,
        ip: &str,
        endpoint_name: &str,
        policy: RateLimitPolicy,
        now: i64,
    ) -> RateDecision {
        if ip.is_empty() || ip == UNKNOWN_IP || endpoint_name.is_empty() {
            return RateDecision::reject(now.saturating_add(policy.window_ms.max(0)));
        }

        let window_secs = (policy.window_ms.max(0) as u64).div_ceil(1000) as i64;
        let scope = Scope {
            key: ip_key(ip, endpoint_name),
            caller_id: ip,
            endpoint_name,
            retention_secs: window_secs + IP_RECORD_GRACE_SECS,
        };
        self.admit(&scope, policy, now).await
    }

    /// Gives back one request credit, e.g. after the guarded call failed with a
    /// server-side error. Errors are logged and swallowed.
    pub async fn refund_rate_limit(&self, caller_id: &str, endpoint_name: &str) {
        if caller_id.is_empty() || endpoint_name.is_empty() {
            return;
        }

        let key = user_key(caller_id, endpoint_name);
        match self.store.decrement_count(&key).await {
            Ok(true) => info!("Rate limit refunded for {caller_id} on {endpoint_name}"),
            Ok(false) => debug!("Nothing to refund for {key}"),
            Err(e) => error!(key = %key, "Rate limit refund failed: {e}"),
        }
    }

    async fn admit(&self, scope: &Scope<'_>, policy: RateLimitPolicy, now: i64) -> RateDecision {
        let window_ms = policy.window_ms.max(0);

        if policy.max_requests == 0 {
            debug!(key = %scope.key, "Policy allows zero requests, rejecting");
            return RateDecision::reject(now.saturating_add(window_ms));
        }

        match self.try_admit(scope, policy, now).await {
            Ok(decision) => {
                if !decision.allowed {
                    warn!(
                        key = %scope.key,
                        reset_time = decision.reset_time,
                        "Rate limit exceeded"
                    );
                }
                decision
            }
            Err(e) => {
                error!(key = %scope.key, "Rate limit check failed, allowing request: {e}");
                RateDecision::admit(policy.max_requests, now.saturating_add(window_ms))
            }
        }
    }

    async fn try_admit(
        &self,
        scope: &Scope<'_>,
        policy: RateLimitPolicy,
        now: i64,
    ) -> Result<RateDecision, StorageError> {
        let window_ms = policy.window_ms.max(0);

        match self.store.get(&scope.key).await? {
            Some(record) if !window_expired(&record, policy, now) => {
                let reset_time = record.window_start.saturating_add(window_ms);
                if record.request_count >= policy.max_requests {
                    return Ok(RateDecision::reject(reset_time));
                }

                let new_count = record.request_count + 1;
                self.store.update_count(&scope.key, new_count).await?;
                Ok(RateDecision::admit(
                    policy.max_requests - new_count,
                    reset_time,
                ))
            }
            // First request, or the previous window is over.
            _ => {
                let record = RateLimitRecord::fresh(
                    &scope.key,
                    scope.caller_id,
                    scope.endpoint_name,
                    now,
                    scope.retention_secs,
                );
                self.store.put(&record).await?;
                Ok(RateDecision::admit(
                    policy.max_requests - 1,
                    now.saturating_add(window_ms),
                ))
            }
        }
    }
}

fn window_expired(record: &RateLimitRecord, policy: RateLimitPolicy, now: i64) -> bool {
    policy.window_ms <= 0 || now.saturating_sub(record.window_start) > policy.window_ms
}

pub fn user_key(caller_id: &str, endpoint_name: &str) -> String {
    format!("{caller_id}-{endpoint_name}")
}

pub fn ip_key(ip: &str, endpoint_name: &str) -> String {
    format!("ip-{endpoint_name}-{ip}")
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Barrier;

    use super::*;
    use crate::rate_limit::memory::InMemoryStore;

    const T0: i64 = 1_700_000_000_000;
    const POLICY: RateLimitPolicy = RateLimitPolicy::new(5, 60_000);

    fn guard_with_memory() -> (RateLimitGuard, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (RateLimitGuard::new(store.clone()), store)
    }

    /// Fails every call and counts how often it was touched.
    #[derive(Default)]
    struct FailingStore {
        calls: AtomicUsize,
    }

    impl FailingStore {
        fn fail(&self) -> StorageError {
            self.calls.fetch_add(1, Ordering::SeqCst);
            StorageError::Dynamo("connection refused".to_string())
        }
    }

    #[async_trait]
    impl RateLimitStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<RateLimitRecord>, StorageError> {
            Err(self.fail())
        }
        async fn put(&self, _record: &RateLimitRecord) -> Result<(), StorageError> {
            Err(self.fail())
        }
        async fn update_count(&self, _key: &str, _count: u32) -> Result<(), StorageError> {
            Err(self.fail())
        }
        async fn decrement_count(&self, _key: &str) -> Result<bool, StorageError> {
            Err(self.fail())
        }
    }

    /// Holds every reader at a barrier so concurrent checks interleave
    /// read, read, write, write.
    struct InterleavingStore {
        inner: InMemoryStore,
        barrier: Barrier,
    }

    #[async_trait]
    impl RateLimitStore for InterleavingStore {
        async fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, StorageError> {
            let record = self.inner.get(key).await?;
            self.barrier.wait().await;
            Ok(record)
        }
        async fn put(&self, record: &RateLimitRecord) -> Result<(), StorageError> {
            self.inner.put(record).await
        }
        async fn update_count(&self, key: &str, count: u32) -> Result<(), StorageError> {
            self.inner.update_count(key, count).await
        }
        async fn decrement_count(&self, key: &str) -> Result<bool, StorageError> {
            self.inner.decrement_count(key).await
        }
    }

    #[tokio::test]
    async fn test_first_call_opens_window() {
        let (guard, store) = guard_with_memory();
        let d = guard.check_rate_limit_at("user-1", "ai-enhance", POLICY, T0).await;
        assert_eq!(d, RateDecision::admit(4, T0 + 60_000));

        let record = store.get("user-1-ai-enhance").await.unwrap().unwrap();
        assert_eq!(record.request_count, 1);
        assert_eq!(record.window_start, T0);
        assert_eq!(record.caller_id, "user-1");
        assert_eq!(record.endpoint_name, "ai-enhance");
        assert_eq!(record.expiry_hint, T0 / 1000 + 3600);
    }

    #[tokio::test]
    async fn test_max_requests_then_reject() {
        let (guard, store) = guard_with_memory();
        for i in 0..5u32 {
            let d = guard
                .check_rate_limit_at("u", "ep", POLICY, T0 + i as i64 * 1000)
                .await;
            assert!(d.allowed, "call {i} should be admitted");
            assert_eq!(d.remaining, 4 - i);
            assert_eq!(d.reset_time, T0 + 60_000);
        }

        let d = guard.check_rate_limit_at("u", "ep", POLICY, T0 + 10_000).await;
        assert_eq!(d, RateDecision::reject(T0 + 60_000));
        // Rejection does not count.
        assert_eq!(store.get("u-ep").await.unwrap().unwrap().request_count, 5);
    }

    #[tokio::test]
    async fn test_window_boundary_is_inclusive() {
        let (guard, _) = guard_with_memory();
        let policy = RateLimitPolicy::new(1, 60_000);
        guard.check_rate_limit_at("u", "ep", policy, T0).await;

        // Exactly windowMs later the window is still active.
        let d = guard.check_rate_limit_at("u", "ep", policy, T0 + 60_000).await;
        assert!(!d.allowed);

        let d = guard.check_rate_limit_at("u", "ep", policy, T0 + 60_001).await;
        assert_eq!(d, RateDecision::admit(0, T0 + 60_001 + 60_000));
    }

    #[tokio::test]
    async fn test_expired_window_resets_count() {
        let (guard, store) = guard_with_memory();
        for _ in 0..6 {
            guard.check_rate_limit_at("u", "ep", POLICY, T0).await;
        }

        let later = T0 + 120_000;
        let d = guard.check_rate_limit_at("u", "ep", POLICY, later).await;
        assert_eq!(d, RateDecision::admit(4, later + 60_000));

        let record = store.get("u-ep").await.unwrap().unwrap();
        assert_eq!(record.request_count, 1);
        assert_eq!(record.window_start, later);
    }

    #[tokio::test]
    async fn test_clock_skew_never_moves_window_back() {
        let (guard, store) = guard_with_memory();
        guard.check_rate_limit_at("u", "ep", POLICY, T0).await;
        guard.check_rate_limit_at("u", "ep", POLICY, T0 - 5_000).await;
        let record = store.get("u-ep").await.unwrap().unwrap();
        assert_eq!(record.window_start, T0);
        assert_eq!(record.request_count, 2);
    }

    #[tokio::test]
    async fn test_endpoints_and_callers_are_independent() {
        let (guard, _) = guard_with_memory();
        let policy = RateLimitPolicy::new(1, 60_000);
        assert!(guard.check_rate_limit_at("a", "x", policy, T0).await.allowed);
        assert!(guard.check_rate_limit_at("a", "y", policy, T0).await.allowed);
        assert!(guard.check_rate_limit_at("b", "x", policy, T0).await.allowed);
        assert!(!guard.check_rate_limit_at("a", "x", policy, T0).await.allowed);
    }

    #[tokio::test]
    async fn test_malformed_identity_fails_closed_without_storage() {
        let store = Arc::new(FailingStore::default());
        let guard = RateLimitGuard::new(store.clone());

        let expected = RateDecision::reject(0);
        assert_eq!(guard.check_rate_limit_at("", "anything", POLICY, T0).await, expected);
        assert_eq!(guard.check_rate_limit_at("user", "", POLICY, T0).await, expected);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_fails_open() {
        let store = Arc::new(FailingStore::default());
        let guard = RateLimitGuard::new(store.clone());

        for _ in 0..10 {
            let d = guard.check_rate_limit_at("u", "ep", POLICY, T0).await;
            assert_eq!(d, RateDecision::admit(5, T0 + 60_000));
        }
        assert!(store.calls.load(Ordering::SeqCst) >= 10);
    }

    #[tokio::test]
    async fn test_zero_max_requests_always_rejects() {
        let store = Arc::new(FailingStore::default());
        let guard = RateLimitGuard::new(store.clone());
        let d = guard
            .check_rate_limit_at("u", "ep", RateLimitPolicy::new(0, 60_000), T0)
            .await;
        assert_eq!(d, RateDecision::reject(T0 + 60_000));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_positive_window_always_starts_new_window() {
        let (guard, store) = guard_with_memory();
        let policy = RateLimitPolicy::new(1, 0);
        for i in 0..3 {
            let d = guard.check_rate_limit_at("u", "ep", policy, T0 + i).await;
            assert_eq!(d, RateDecision::admit(0, T0 + i));
        }
        let d = guard
            .check_rate_limit_at("u", "ep", RateLimitPolicy::new(1, -500), T0 + 10)
            .await;
        assert!(d.allowed);
        assert_eq!(store.get("u-ep").await.unwrap().unwrap().request_count, 1);
    }

    #[tokio::test]
    async fn test_ip_limit_uses_ip_key_and_long_retention() {
        let (guard, store) = guard_with_memory();
        let day = 24 * 60 * 60 * 1000;
        let policy = RateLimitPolicy::new(3, day);

        for expected_remaining in [2, 1, 0] {
            let d = guard
                .check_ip_rate_limit_at("203.0.113.9", "public-translate", policy, T0)
                .await;
            assert_eq!(d, RateDecision::admit(expected_remaining, T0 + day));
        }
        let d = guard
            .check_ip_rate_limit_at("203.0.113.9", "public-translate", policy, T0 + 1)
            .await;
        assert!(!d.allowed);

        let record = store
            .get("ip-public-translate-203.0.113.9")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.expiry_hint, T0 / 1000 + day / 1000 + 3600);
    }

    #[tokio::test]
    async fn test_unknown_ip_rejected_with_future_reset() {
        let store = Arc::new(FailingStore::default());
        let guard = RateLimitGuard::new(store.clone());
        for ip in ["", "unknown"] {
            let d = guard.check_ip_rate_limit_at(ip, "ep", POLICY, T0).await;
            assert_eq!(d, RateDecision::reject(T0 + 60_000));
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refund_returns_one_credit() {
        let (guard, store) = guard_with_memory();
        let policy = RateLimitPolicy::new(2, 60_000);
        guard.check_rate_limit_at("u", "score", policy, T0).await;
        guard.check_rate_limit_at("u", "score", policy, T0).await;
        assert!(!guard.check_rate_limit_at("u", "score", policy, T0).await.allowed);

        guard.refund_rate_limit("u", "score").await;
        assert_eq!(store.get("u-score").await.unwrap().unwrap().request_count, 1);
        assert!(guard.check_rate_limit_at("u", "score", policy, T0).await.allowed);
    }

    #[tokio::test]
    async fn test_refund_swallows_errors_and_ignores_missing() {
        let failing = Arc::new(FailingStore::default());
        RateLimitGuard::new(failing.clone())
            .refund_rate_limit("u", "ep")
            .await;
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);

        let (guard, store) = guard_with_memory();
        guard.refund_rate_limit("u", "ep").await;
        guard.refund_rate_limit("", "ep").await;
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_checks_can_both_take_last_slot() {
        let store = Arc::new(InterleavingStore {
            inner: InMemoryStore::new(),
            barrier: Barrier::new(2),
        });
        store
            .inner
            .put(&RateLimitRecord {
                request_count: 4,
                ..RateLimitRecord::fresh("u-ep", "u", "ep", T0, 3600)
            })
            .await
            .unwrap();
        let guard = RateLimitGuard::new(store.clone());

        let (a, b) = tokio::join!(
            guard.check_rate_limit_at("u", "ep", POLICY, T0 + 1),
            guard.check_rate_limit_at("u", "ep", POLICY, T0 + 2),
        );

        // Both read count=4 before either wrote: the race admits six requests
        // in a five-request window and the stored count under-counts.
        assert!(a.allowed && b.allowed);
        assert_eq!(
            store.inner.get("u-ep").await.unwrap().unwrap().request_count,
            5
        );
    }

    #[test]
    fn test_key_formats() {
        assert_eq!(user_key("abc", "ai-enhance"), "abc-ai-enhance");
        assert_eq!(ip_key("10.0.0.1", "lead-capture"), "ip-lead-capture-10.0.0.1");
    }
}

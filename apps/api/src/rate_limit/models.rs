use serde::{Deserialize, Serialize};

/// Persisted counter for one `(caller, endpoint)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub key: String,
    pub caller_id: String,
    pub endpoint_name: String,
    /// Requests observed in the current window. Always >= 1.
    pub request_count: u32,
    /// Epoch milliseconds.
    pub window_start: i64,
    /// Epoch seconds after which the storage layer may drop the record.
    pub expiry_hint: i64,
}

impl RateLimitRecord {
    /// A record opening a new window at `now_ms` with a single request counted.
    pub fn fresh(
        key: &str,
        caller_id: &str,
        endpoint_name: &str,
        now_ms: i64,
        retention_secs: i64,
    ) -> Self {
        Self {
            key: key.to_string(),
            caller_id: caller_id.to_string(),
            endpoint_name: endpoint_name.to_string(),
            request_count: 1,
            window_start: now_ms,
            expiry_hint: now_ms.div_euclid(1000) + retention_secs,
        }
    }
}

/// Per-endpoint admission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Zero rejects every request.
    pub max_requests: u32,
    /// Zero or negative starts a new window on every request.
    pub window_ms: i64,
}

impl RateLimitPolicy {
    pub const fn new(max_requests: u32, window_ms: i64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(5, 60_000)
    }
}

/// Outcome of a rate-limit check. Rejection is data, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Epoch milliseconds at which the current window closes; 0 for malformed input.
    pub reset_time: i64,
}

impl RateDecision {
    pub(crate) fn admit(remaining: u32, reset_time: i64) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_time,
        }
    }

    pub(crate) fn reject(reset_time: i64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_time,
        }
    }

    /// Whole seconds until `reset_time`, never less than one.
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let wait_ms = self.reset_time.saturating_sub(now_ms).max(0) as u64;
        wait_ms.div_ceil(1000).max(1)
    }
}

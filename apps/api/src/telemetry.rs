//! Structured warnings for requests that tripped a sanitizer check.
//!
//! Events go through `tracing` with `event = "suspicious_activity"` so a log
//! pipeline can filter on them. Logging never fails the request.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::warn;

use crate::sanitizer::clean::truncate_chars;

const INPUT_SAMPLE_CHARS: usize = 100;
const USER_AGENT_CHARS: usize = 200;

/// Who tripped the check: an authenticated caller or an anonymous IP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    User(String),
    Ip(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousActivity {
    pub actor: Actor,
    pub endpoint: String,
    pub reason: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_sample: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl SuspiciousActivity {
    fn new(actor: Actor, endpoint: &str, reason: &str) -> Self {
        Self {
            actor,
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            input_sample: None,
            user_agent: None,
        }
    }

    fn with_input(mut self, input: Option<&str>) -> Self {
        self.input_sample = input.map(|s| truncate_chars(s, INPUT_SAMPLE_CHARS).to_string());
        self
    }

    fn with_user_agent(mut self, user_agent: Option<&str>) -> Self {
        self.user_agent = user_agent.map(|s| truncate_chars(s, USER_AGENT_CHARS).to_string());
        self
    }

    fn emit(&self) {
        match &self.actor {
            Actor::User(user_id) => warn!(
                event = "suspicious_activity",
                user_id = %user_id,
                endpoint = %self.endpoint,
                reason = %self.reason,
                timestamp = %self.timestamp,
                input = self.input_sample.as_deref(),
                "Suspicious activity detected"
            ),
            Actor::Ip(ip) => warn!(
                event = "suspicious_activity",
                ip = %ip,
                endpoint = %self.endpoint,
                reason = %self.reason,
                timestamp = %self.timestamp,
                user_agent = self.user_agent.as_deref(),
                "Suspicious activity on public endpoint"
            ),
        }
    }
}

/// Records a rejected input from an authenticated caller. Only the first 100
/// characters of `input` are kept.
pub fn log_suspicious_activity(
    caller_id: &str,
    endpoint: &str,
    reason: &str,
    input: Option<&str>,
) -> SuspiciousActivity {
    let activity =
        SuspiciousActivity::new(Actor::User(caller_id.to_string()), endpoint, reason)
            .with_input(input);
    activity.emit();
    activity
}

/// Records a rejected request on an unauthenticated endpoint.
pub fn log_public_suspicious_activity(
    ip: &str,
    endpoint: &str,
    reason: &str,
    user_agent: Option<&str>,
) -> SuspiciousActivity {
    let activity = SuspiciousActivity::new(Actor::Ip(ip.to_string()), endpoint, reason)
        .with_user_agent(user_agent);
    activity.emit();
    activity
}

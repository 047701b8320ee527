//! Sliding-window counter with exponential backoff for repeat offenders.
//!
//! The evaluator is a pure function of the stored state and the current
//! time so every backend shares the same arithmetic.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Limits applied to one (client, endpoint) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    pub limit: u32,
    pub window: Duration,
    pub base_block: Duration,
    pub max_block: Duration,
    pub violation_decay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowState {
    pub request_count: u32,
    pub previous_count: u32,
    pub window_start: DateTime<Utc>,
    pub violation_count: u32,
    pub blocked_until: Option<DateTime<Utc>>,
    pub last_violation_at: Option<DateTime<Utc>>,
    pub last_request_at: DateTime<Utc>,
}

impl WindowState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            request_count: 0,
            previous_count: 0,
            window_start: now,
            violation_count: 0,
            blocked_until: None,
            last_violation_at: None,
            last_request_at: now,
        }
    }

    pub fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.map_or(false, |until| until > now)
    }

    pub fn is_idle(&self, now: DateTime<Utc>, idle_after: Duration) -> bool {
        !self.is_blocked(now) && to_std(now - self.last_request_at) >= idle_after
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset_after: Duration,
    },
    Denied {
        limit: u32,
        retry_after: Duration,
        blocked_until: DateTime<Utc>,
        /// True only for the request that triggered the block.
        newly_blocked: bool,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Whole seconds for `Retry-After`; never zero on a denial.
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            Decision::Allowed { .. } => 0,
            Decision::Denied { retry_after, .. } => ceil_secs(*retry_after).max(1),
        }
    }
}

pub fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

fn to_std(delta: chrono::Duration) -> Duration {
    delta.to_std().unwrap_or(Duration::ZERO)
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}

/// `min(base × 2^(violations − 1), max)`.
pub fn block_duration(policy: &LimitPolicy, violations: u32) -> Duration {
    if violations == 0 {
        return Duration::ZERO;
    }
    let exponent = (violations - 1).min(31);
    policy
        .base_block
        .checked_mul(1u32 << exponent)
        .unwrap_or(policy.max_block)
        .min(policy.max_block)
}

/// Evaluates one request against `state`, updating it in place.
pub fn evaluate(state: &mut WindowState, policy: &LimitPolicy, now: DateTime<Utc>) -> Decision {
    if let Some(until) = state.blocked_until.filter(|until| *until > now) {
        state.last_request_at = now;
        return Decision::Denied {
            limit: policy.limit,
            retry_after: to_std(until - now),
            blocked_until: until,
            newly_blocked: false,
        };
    }

    if let Some(last) = state.last_violation_at {
        if to_std(now - last) >= policy.violation_decay {
            state.violation_count = 0;
            state.last_violation_at = None;
        }
    }

    let window_ms = policy.window.as_millis().max(1) as i64;
    let elapsed_ms = (now - state.window_start).num_milliseconds().max(0);
    if elapsed_ms >= window_ms {
        let windows_passed = elapsed_ms / window_ms;
        // The window just before the new one was empty once two or more have passed.
        state.previous_count = if windows_passed == 1 {
            state.request_count
        } else {
            0
        };
        state.request_count = 0;
        state.window_start += chrono::Duration::milliseconds(windows_passed * window_ms);
    }

    let elapsed_in_window = (now - state.window_start).num_milliseconds().clamp(0, window_ms);
    let weight = 1.0 - elapsed_in_window as f64 / window_ms as f64;
    let estimate =
        f64::from(state.previous_count) * weight + f64::from(state.request_count) + 1.0;
    state.last_request_at = now;

    if estimate > f64::from(policy.limit) {
        state.violation_count = state.violation_count.saturating_add(1);
        state.last_violation_at = Some(now);
        let block = block_duration(policy, state.violation_count);
        let until = now + to_chrono(block);
        state.blocked_until = Some(until);
        return Decision::Denied {
            limit: policy.limit,
            retry_after: block,
            blocked_until: until,
            newly_blocked: true,
        };
    }

    state.request_count = state.request_count.saturating_add(1);
    state.blocked_until = None;
    let remaining = (f64::from(policy.limit) - estimate).floor().max(0.0) as u32;
    Decision::Allowed {
        limit: policy.limit,
        remaining,
        reset_after: Duration::from_millis((window_ms - elapsed_in_window) as u64),
    }
}

//! Request budget for the remote extraction service
//!
//! A fixed number of calls is allowed per window. The window restarts lazily
//! on the first call after it has elapsed.

use chrono::{DateTime, Duration, Utc};
use gpuslot_core::ExtractionConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Utilization above which usage is reported as `warning`
pub const WARNING_UTILIZATION: u32 = 70;
/// Utilization above which usage is reported as `critical`
pub const CRITICAL_UTILIZATION: u32 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    Normal,
    Warning,
    Critical,
}

impl UsageStatus {
    pub fn from_utilization(percent: u32) -> Self {
        if percent > CRITICAL_UTILIZATION {
            UsageStatus::Critical
        } else if percent > WARNING_UTILIZATION {
            UsageStatus::Warning
        } else {
            UsageStatus::Normal
        }
    }
}

/// Snapshot of the current window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub request_count: u32,
    pub daily_limit: u32,
    pub remaining_requests: u32,
    pub hours_until_reset: i64,
    pub utilization_percentage: u32,
    pub status: UsageStatus,
}

#[derive(Debug)]
struct UsageWindow {
    count: u32,
    started_at: DateTime<Utc>,
}

/// Counts remote calls against a per-window limit
#[derive(Debug)]
pub struct UsageLimiter {
    limit: u32,
    interval: Duration,
    window: Mutex<UsageWindow>,
}

impl UsageLimiter {
    pub fn new(limit: u32, interval: Duration, now: DateTime<Utc>) -> Self {
        Self {
            limit,
            interval,
            window: Mutex::new(UsageWindow {
                count: 0,
                started_at: now,
            }),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(
            config.daily_limit,
            Duration::hours(i64::from(config.reset_interval_hours)),
            Utc::now(),
        )
    }

    /// Reserve one call; false once the window's budget is spent
    pub async fn try_acquire(&self, now: DateTime<Utc>) -> bool {
        let mut window = self.window.lock().await;
        if now - window.started_at >= self.interval {
            debug!(previous = window.count, "Usage window reset");
            window.count = 0;
            window.started_at = now;
        }

        if window.count >= self.limit {
            warn!(limit = self.limit, "Remote extraction budget exhausted");
            return false;
        }

        window.count += 1;
        debug!(count = window.count, limit = self.limit, "Remote extraction call counted");
        true
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> UsageStats {
        let window = self.window.lock().await;
        let elapsed = now - window.started_at;
        let (count, remaining_time) = if elapsed >= self.interval {
            (0, self.interval)
        } else {
            (window.count, self.interval - elapsed)
        };

        let utilization = if self.limit == 0 {
            100
        } else {
            ((f64::from(count) / f64::from(self.limit)) * 100.0).round() as u32
        };
        let hours_until_reset = (remaining_time.num_minutes() + 59) / 60;

        UsageStats {
            request_count: count,
            daily_limit: self.limit,
            remaining_requests: self.limit.saturating_sub(count),
            hours_until_reset,
            utilization_percentage: utilization,
            status: UsageStatus::from_utilization(utilization),
        }
    }
}

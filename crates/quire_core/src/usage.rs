//! Message usage counters with per-tier limits and a periodic reset.

use std::fmt;
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::LocalStore;

pub const KEY_MESSAGE_USAGE: &str = "message_usage";

pub const DEFAULT_STANDARD_LIMIT: u32 = 1500;
pub const DEFAULT_PREMIUM_LIMIT: u32 = 100;
pub const DEFAULT_RESET_PERIOD_DAYS: i64 = 30;

/// Share of a limit at which the user is warned, in percent.
pub const WARNING_THRESHOLD_PERCENT: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageTier {
    Standard,
    Premium,
}

impl fmt::Display for UsageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "Standard"),
            Self::Premium => write!(f, "Premium"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounters {
    pub standard: u32,
    pub premium: u32,
    pub standard_limit: u32,
    pub premium_limit: u32,
    pub reset_at: DateTime<Utc>,
}

impl UsageCounters {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            standard: 0,
            premium: 0,
            standard_limit: DEFAULT_STANDARD_LIMIT,
            premium_limit: DEFAULT_PREMIUM_LIMIT,
            reset_at: now + Duration::days(DEFAULT_RESET_PERIOD_DAYS),
        }
    }

    pub fn used(&self, tier: UsageTier) -> u32 {
        match tier {
            UsageTier::Standard => self.standard,
            UsageTier::Premium => self.premium,
        }
    }

    pub fn limit(&self, tier: UsageTier) -> u32 {
        match tier {
            UsageTier::Standard => self.standard_limit,
            UsageTier::Premium => self.premium_limit,
        }
    }

    pub fn remaining(&self, tier: UsageTier) -> u32 {
        self.limit(tier).saturating_sub(self.used(tier))
    }

    /// Used share of the tier's limit, capped at 100.
    pub fn percent(&self, tier: UsageTier) -> f64 {
        let limit = self.limit(tier);
        if limit == 0 {
            return 100.0;
        }
        (f64::from(self.used(tier)) / f64::from(limit) * 100.0).min(100.0)
    }

    pub fn is_limit_reached(&self, tier: UsageTier) -> bool {
        self.used(tier) >= self.limit(tier)
    }

    pub fn status(&self, tier: UsageTier) -> UsageStatus {
        if self.is_limit_reached(tier) {
            UsageStatus::LimitReached
        } else if self.percent(tier) >= WARNING_THRESHOLD_PERCENT {
            UsageStatus::Warning {
                used: self.used(tier),
                limit: self.limit(tier),
            }
        } else {
            UsageStatus::Ok
        }
    }

    /// Zero the counters if the reset time has passed, advancing `reset_at`
    /// by whole periods so it lands in the future. Returns whether a reset
    /// happened.
    fn apply_reset(&mut self, now: DateTime<Utc>, period: Duration) -> bool {
        if now < self.reset_at {
            return false;
        }
        self.standard = 0;
        self.premium = 0;
        while self.reset_at <= now {
            self.reset_at += period;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageStatus {
    Ok,
    Warning { used: u32, limit: u32 },
    LimitReached,
}

// ---------------------------------------------------------------------------
// UsageTracker
// ---------------------------------------------------------------------------

/// Persists [`UsageCounters`] in the local store under `message_usage`.
pub struct UsageTracker {
    store: Arc<LocalStore>,
    reset_period: Duration,
}

impl UsageTracker {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self {
            store,
            reset_period: Duration::days(DEFAULT_RESET_PERIOD_DAYS),
        }
    }

    /// Use a custom reset period. The period must be positive.
    pub fn with_reset_period(mut self, period: Duration) -> Result<Self> {
        if period <= Duration::zero() {
            bail!("Usage reset period must be positive, got {period}");
        }
        self.reset_period = period;
        Ok(self)
    }

    pub fn snapshot(&self) -> Result<UsageCounters> {
        self.snapshot_at(Utc::now())
    }

    /// Current counters, applying (and persisting) a scheduled reset.
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Result<UsageCounters> {
        let mut counters = match self.store.get_json::<UsageCounters>(KEY_MESSAGE_USAGE) {
            Some(c) => c,
            None => {
                let fresh = UsageCounters {
                    reset_at: now + self.reset_period,
                    ..UsageCounters::fresh(now)
                };
                self.store.set_json(KEY_MESSAGE_USAGE, &fresh)?;
                return Ok(fresh);
            }
        };
        if counters.apply_reset(now, self.reset_period) {
            info!("Usage counters reset; next reset at {}", counters.reset_at);
            self.store.set_json(KEY_MESSAGE_USAGE, &counters)?;
        }
        Ok(counters)
    }

    pub fn record(&self, tier: UsageTier) -> Result<UsageCounters> {
        self.record_at(tier, Utc::now())
    }

    /// Count one successful send against `tier`.
    pub fn record_at(&self, tier: UsageTier, now: DateTime<Utc>) -> Result<UsageCounters> {
        let mut counters = self.snapshot_at(now)?;
        match tier {
            UsageTier::Standard => counters.standard += 1,
            UsageTier::Premium => counters.premium += 1,
        }
        self.store.set_json(KEY_MESSAGE_USAGE, &counters)?;
        debug!("{tier} usage now {}/{}", counters.used(tier), counters.limit(tier));
        Ok(counters)
    }

    /// Overwrite the stored counters. Used by settings and tests.
    pub fn replace(&self, counters: &UsageCounters) -> Result<()> {
        self.store.set_json(KEY_MESSAGE_USAGE, counters)
    }

    pub fn is_limit_reached(&self, tier: UsageTier) -> Result<bool> {
        Ok(self.snapshot()?.is_limit_reached(tier))
    }

    pub fn formatted_reset_time(&self) -> Result<String> {
        Ok(format_reset_time(self.snapshot()?.reset_at))
    }
}

/// Human-readable local reset time, e.g. `Mar 4, 2026 3:05 PM`.
pub fn format_reset_time(reset_at: DateTime<Utc>) -> String {
    reset_at
        .with_timezone(&Local)
        .format("%b %-d, %Y %-I:%M %p")
        .to_string()
}

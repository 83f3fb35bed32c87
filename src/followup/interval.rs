use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};

const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Minutes,
    Hours,
    Days,
}

/// Follow-up cadence descriptor. Accepts the legacy wire form (a bare
/// number of days) alongside `{value, unit}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntervalConfig {
    pub value: u32,
    pub unit: IntervalUnit,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntervalConfigRepr {
    Full { value: u32, unit: IntervalUnit },
    LegacyDays(u32),
}

impl<'de> Deserialize<'de> for IntervalConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(IntervalConfigRepr::deserialize(deserializer)?.into())
    }
}

impl From<IntervalConfigRepr> for IntervalConfig {
    fn from(repr: IntervalConfigRepr) -> Self {
        match repr {
            IntervalConfigRepr::Full { value, unit } => IntervalConfig { value, unit },
            IntervalConfigRepr::LegacyDays(days) => IntervalConfig::from_days(days),
        }
    }
}

impl IntervalConfig {
    pub fn from_days(days: u32) -> Self {
        IntervalConfig {
            value: days,
            unit: IntervalUnit::Days,
        }
    }
}

/// Interval length in milliseconds. A zero value is clamped to one unit.
pub fn interval_ms(cfg: IntervalConfig) -> i64 {
    let value = i64::from(cfg.value.max(1));
    match cfg.unit {
        IntervalUnit::Minutes => value * 60_000,
        IntervalUnit::Hours => value * 3_600_000,
        IntervalUnit::Days => value * DAY_MS,
    }
}

/// Next fire timestamp. Intervals of a day or longer step forward over
/// Saturdays and Sundays when weekend skipping is on; sub-day intervals
/// never shift.
pub fn next_send_date(
    from: DateTime<Utc>,
    cfg: IntervalConfig,
    skip_weekends: bool,
) -> DateTime<Utc> {
    let ms = interval_ms(cfg);
    let mut next = from + Duration::milliseconds(ms);
    if skip_weekends && ms >= DAY_MS {
        while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
            next += Duration::days(1);
        }
    }
    next
}

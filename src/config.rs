use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{NaiveTime, TimeDelta};
use ulid::Ulid;

use crate::engine::{EngineSettings, parse_time};
use crate::limits::*;
use crate::model::{Span, TimeSlot};

const DEFAULT_TIME_SLOTS: &str = "11:00-12:00,12:00-13:00,13:00-14:00,14:00-15:00";

#[derive(Debug)]
pub enum ConfigError {
    Invalid { key: &'static str, value: String },
    TimeSlots(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { key, value } => write!(f, "invalid value for {key}: {value:?}"),
            ConfigError::TimeSlots(msg) => write!(f, "invalid SLOTBOOK_TIME_SLOTS: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Process configuration, read from `SLOTBOOK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub utc_offset_minutes: i32,
    /// Shift applied to the real clock, for rehearsing a day off-hours.
    pub simulated_offset_minutes: Option<i64>,
    pub capacity: u32,
    pub cutoff: NaiveTime,
    pub grace_minutes: i64,
    pub sweep_interval: Duration,
    pub sweep_retry: Duration,
    pub compact_threshold: u64,
    pub time_slots: Vec<TimeSlot>,
    /// HR account created at startup if it does not exist yet.
    pub bootstrap_hr: Option<Ulid>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let (cutoff_h, cutoff_m) = DEFAULT_CUTOFF;
        let cutoff = match get("SLOTBOOK_CUTOFF") {
            Some(v) => parse_time(v.trim()).map_err(|_| ConfigError::Invalid {
                key: "SLOTBOOK_CUTOFF",
                value: v,
            })?,
            None => NaiveTime::from_hms_opt(cutoff_h, cutoff_m, 0).unwrap_or(NaiveTime::MIN),
        };
        let slots = get("SLOTBOOK_TIME_SLOTS").unwrap_or_else(|| DEFAULT_TIME_SLOTS.into());

        let utc_offset_minutes = bounded(
            "SLOTBOOK_UTC_OFFSET_MINUTES",
            parsed(&get, "SLOTBOOK_UTC_OFFSET_MINUTES")?.unwrap_or(DEFAULT_UTC_OFFSET_MINUTES),
            -MAX_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES,
        )?;
        let capacity = bounded(
            "SLOTBOOK_CAPACITY",
            parsed(&get, "SLOTBOOK_CAPACITY")?.unwrap_or(DEFAULT_CAPACITY),
            1..=u32::MAX,
        )?;
        let grace_minutes = bounded(
            "SLOTBOOK_GRACE_MINUTES",
            parsed(&get, "SLOTBOOK_GRACE_MINUTES")?.unwrap_or(DEFAULT_GRACE_MINUTES),
            0..=MAX_GRACE_MINUTES,
        )?;
        let interval_secs = bounded(
            "SLOTBOOK_SWEEP_INTERVAL_SECS",
            parsed(&get, "SLOTBOOK_SWEEP_INTERVAL_SECS")?.unwrap_or(300),
            1..=u64::MAX,
        )?;
        // Retry must not outlast the regular tick.
        let retry_secs = bounded(
            "SLOTBOOK_SWEEP_RETRY_SECS",
            parsed(&get, "SLOTBOOK_SWEEP_RETRY_SECS")?.unwrap_or(interval_secs.min(30)),
            1..=interval_secs,
        )?;

        Ok(Self {
            bind: get("SLOTBOOK_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&get, "SLOTBOOK_PORT")?.unwrap_or(8080),
            data_dir: PathBuf::from(get("SLOTBOOK_DATA_DIR").unwrap_or_else(|| "./data".into())),
            metrics_port: parsed(&get, "SLOTBOOK_METRICS_PORT")?,
            utc_offset_minutes,
            simulated_offset_minutes: parsed(&get, "SLOTBOOK_SIMULATED_OFFSET_MINUTES")?,
            capacity,
            cutoff,
            grace_minutes,
            sweep_interval: Duration::from_secs(interval_secs),
            sweep_retry: Duration::from_secs(retry_secs),
            compact_threshold: parsed(&get, "SLOTBOOK_COMPACT_THRESHOLD")?.unwrap_or(1000),
            time_slots: parse_time_slots(&slots)?,
            bootstrap_hr: parsed(&get, "SLOTBOOK_BOOTSTRAP_HR")?,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            capacity: self.capacity,
            cutoff: self.cutoff,
            grace: TimeDelta::minutes(self.grace_minutes),
            time_slots: self.time_slots.clone(),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("slotbook.wal")
    }
}

fn parsed<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match get(key) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}

fn bounded<T: PartialOrd + fmt::Display>(
    key: &'static str,
    value: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        })
    }
}

/// `HH:mm-HH:mm` entries separated by commas, ids assigned in order from 1.
/// A leading `!` seeds the slot inactive.
pub fn parse_time_slots(s: &str) -> Result<Vec<TimeSlot>, ConfigError> {
    let mut slots = Vec::new();
    for (i, entry) in s.split(',').map(str::trim).filter(|e| !e.is_empty()).enumerate() {
        let (active, range) = match entry.strip_prefix('!') {
            Some(rest) => (false, rest.trim()),
            None => (true, entry),
        };
        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| ConfigError::TimeSlots(format!("{entry:?} is not HH:mm-HH:mm")))?;
        let start = parse_time(start.trim()).map_err(|e| ConfigError::TimeSlots(e.to_string()))?;
        let end = parse_time(end.trim()).map_err(|e| ConfigError::TimeSlots(e.to_string()))?;
        let span = Span::try_new(start, end)
            .ok_or_else(|| ConfigError::TimeSlots(format!("{entry:?} ends before it starts")))?;
        slots.push(TimeSlot {
            id: i as u32 + 1,
            span,
            active,
        });
    }
    if slots.is_empty() {
        return Err(ConfigError::TimeSlots("no time slots configured".into()));
    }
    if slots.len() > MAX_TIME_SLOTS {
        return Err(ConfigError::TimeSlots(format!("more than {MAX_TIME_SLOTS} slots")));
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.capacity, 5);
        assert_eq!(cfg.cutoff, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert_eq!(cfg.utc_offset_minutes, -300);
        assert_eq!(cfg.sweep_interval, Duration::from_secs(300));
        assert_eq!(cfg.sweep_retry, Duration::from_secs(30));
        assert_eq!(cfg.time_slots.len(), 4);
        assert_eq!(cfg.time_slots[2].span.label(), "13:00 - 14:00");
        assert!(cfg.metrics_port.is_none());
        assert!(cfg.bootstrap_hr.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let hr = Ulid::new();
        let hr_str = hr.to_string();
        let cfg = Config::from_lookup(lookup(&[
            ("SLOTBOOK_CAPACITY", "12"),
            ("SLOTBOOK_CUTOFF", "09:30"),
            ("SLOTBOOK_GRACE_MINUTES", "5"),
            ("SLOTBOOK_TIME_SLOTS", "12:00-12:30, !12:30-13:00"),
            ("SLOTBOOK_BOOTSTRAP_HR", hr_str.as_str()),
        ]))
        .unwrap();
        assert_eq!(cfg.capacity, 12);
        assert_eq!(cfg.cutoff, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(cfg.engine_settings().grace, TimeDelta::minutes(5));
        assert_eq!(cfg.time_slots.len(), 2);
        assert!(cfg.time_slots[0].active);
        assert!(!cfg.time_slots[1].active);
        assert_eq!(cfg.time_slots[1].id, 2);
        assert_eq!(cfg.bootstrap_hr, Some(hr));
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("SLOTBOOK_CAPACITY", "lots")])),
            Err(ConfigError::Invalid { key: "SLOTBOOK_CAPACITY", .. })
        ));
        assert!(Config::from_lookup(lookup(&[("SLOTBOOK_CUTOFF", "9am")])).is_err());
        assert!(parse_time_slots("13:00-12:00").is_err());
        assert!(parse_time_slots("noon").is_err());
        assert!(parse_time_slots(" , ").is_err());
    }

    fn rejected_key(pairs: &[(&str, &str)]) -> Option<&'static str> {
        match Config::from_lookup(lookup(pairs)) {
            Err(ConfigError::Invalid { key, .. }) => Some(key),
            _ => None,
        }
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let grace = Some("SLOTBOOK_GRACE_MINUTES");
        assert_eq!(rejected_key(&[("SLOTBOOK_GRACE_MINUTES", "-30")]), grace);
        assert_eq!(rejected_key(&[("SLOTBOOK_GRACE_MINUTES", "1441")]), grace);
        assert_eq!(rejected_key(&[("SLOTBOOK_GRACE_MINUTES", "1000000000000")]), grace);

        let offset = Some("SLOTBOOK_UTC_OFFSET_MINUTES");
        assert_eq!(rejected_key(&[("SLOTBOOK_UTC_OFFSET_MINUTES", "1081")]), offset);
        assert_eq!(rejected_key(&[("SLOTBOOK_UTC_OFFSET_MINUTES", "-2000000000")]), offset);

        assert_eq!(rejected_key(&[("SLOTBOOK_CAPACITY", "0")]), Some("SLOTBOOK_CAPACITY"));
        assert_eq!(
            rejected_key(&[("SLOTBOOK_SWEEP_INTERVAL_SECS", "0")]),
            Some("SLOTBOOK_SWEEP_INTERVAL_SECS")
        );
        let retry = Some("SLOTBOOK_SWEEP_RETRY_SECS");
        assert_eq!(rejected_key(&[("SLOTBOOK_SWEEP_RETRY_SECS", "0")]), retry);
        assert_eq!(
            rejected_key(&[
                ("SLOTBOOK_SWEEP_INTERVAL_SECS", "60"),
                ("SLOTBOOK_SWEEP_RETRY_SECS", "120"),
            ]),
            retry
        );
    }

    #[test]
    fn range_edges_are_accepted() {
        let cfg = Config::from_lookup(lookup(&[
            ("SLOTBOOK_GRACE_MINUTES", "0"),
            ("SLOTBOOK_UTC_OFFSET_MINUTES", "-1080"),
            ("SLOTBOOK_CAPACITY", "1"),
            ("SLOTBOOK_SWEEP_INTERVAL_SECS", "10"),
        ]))
        .unwrap();
        assert_eq!(cfg.grace_minutes, 0);
        assert_eq!(cfg.utc_offset_minutes, -1080);
        assert_eq!(cfg.capacity, 1);
        // Default retry is clamped to a short interval.
        assert_eq!(cfg.sweep_retry, Duration::from_secs(10));

        let cfg = Config::from_lookup(lookup(&[
            ("SLOTBOOK_SWEEP_INTERVAL_SECS", "60"),
            ("SLOTBOOK_SWEEP_RETRY_SECS", "60"),
        ]))
        .unwrap();
        assert_eq!(cfg.sweep_retry, Duration::from_secs(60));
    }
}

//! Files the upstream fetch step leaves behind.
//!
//! - A raw snapshot per fetch: `<raw_dir>/<YYYY-MM-DD>__<prefix>_events.json`
//!   holding `{fetched_at, calendar_id, event_count, events}`.
//! - One checkpoint file holding `{last_sync, time_range: {from, to}, event_count}`.
//!
//! Both are pretty-printed JSON. The reconciliation engine does not read them.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default look-ahead when no explicit range is given.
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    pub raw_dir: PathBuf,
    pub checkpoint: PathBuf,
    pub file_prefix: String,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("raw/calendars/gcal"),
            checkpoint: PathBuf::from("state/checkpoints/gcal_last_sync.json"),
            file_prefix: "gcal".into(),
        }
    }
}

impl HandoffConfig {
    /// Re-root relative paths under `root`.
    pub fn rooted(&self, root: &Path) -> Self {
        Self {
            raw_dir: root.join(&self.raw_dir),
            checkpoint: root.join(&self.checkpoint),
            file_prefix: self.file_prefix.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub fetched_at: DateTime<Utc>,
    #[serde(alias = "source_id")]
    pub calendar_id: String,
    pub event_count: usize,
    pub events: Vec<Value>,
}

impl RawSnapshot {
    pub fn new(calendar_id: impl Into<String>, events: Vec<Value>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            fetched_at,
            calendar_id: calendar_id.into(),
            event_count: events.len(),
            events,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.event_count != self.events.len() {
            return Err(format!(
                "event_count is {} but {} events are present",
                self.event_count,
                self.events.len()
            ));
        }
        Ok(())
    }

    /// File name for this snapshot: one per prefix per UTC day.
    pub fn file_name(&self, prefix: &str) -> String {
        format!("{}__{prefix}_events.json", self.fetched_at.format("%Y-%m-%d"))
    }
}

/// Write a snapshot under `config.raw_dir`, creating the directory if needed.
/// A snapshot from the same day replaces the earlier one.
pub fn write_snapshot(config: &HandoffConfig, snapshot: &RawSnapshot) -> Result<PathBuf, String> {
    snapshot.validate()?;
    fs::create_dir_all(&config.raw_dir).map_err(|e| e.to_string())?;
    let path = config.raw_dir.join(snapshot.file_name(&config.file_prefix));
    write_json(&path, snapshot)?;
    Ok(path)
}

pub fn read_snapshot(path: &Path) -> Result<RawSnapshot, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let snapshot: RawSnapshot =
        serde_json::from_str(&content).map_err(|e| format!("{}: {e}", path.display()))?;
    snapshot.validate().map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(snapshot)
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// `[now, now + days)`.
    pub fn days_ahead(now: DateTime<Utc>, days: i64) -> Self {
        Self { from: now, to: now + Duration::days(days) }
    }

    /// Whole UTC days `from..=to`, given as `YYYY-MM-DD`.
    pub fn from_dates(from: &str, to: &str) -> Result<Self, String> {
        let start = parse_date(from)?;
        let end = parse_date(to)?;
        if end < start {
            return Err(format!("end date {to} is before start date {from}"));
        }
        Ok(Self {
            from: start,
            to: end + Duration::days(1),
        })
    }
}

fn parse_date(value: &str) -> Result<DateTime<Utc>, String> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{value}' (expected YYYY-MM-DD)"))?;
    Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_sync: DateTime<Utc>,
    pub time_range: TimeRange,
    pub event_count: usize,
}

pub fn write_checkpoint(path: &Path, checkpoint: &Checkpoint) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    write_json(path, checkpoint)
}

/// `Ok(None)` when no checkpoint has been written yet.
pub fn read_checkpoint(path: &Path) -> Result<Option<Checkpoint>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| format!("{}: {e}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    let mut json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    json.push('\n');
    fs::write(path, json).map_err(|e| e.to_string())
}

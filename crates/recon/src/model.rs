use chrono::{SecondsFormat, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Leads
// ---------------------------------------------------------------------------

/// Mutable attributes of a lead. Replaced wholesale on every applied write
/// and captured verbatim in history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeadFields {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub lead_source: Option<String>,
    /// JSON object carrying `Lead_Status`, `Owner` and `Created_Time`.
    pub description: Option<String>,
    /// Origin-supplied modification marker. Compared for equality only.
    pub source_modified_time: Option<String>,
}

/// A lead as received in a batch, before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingLead {
    pub id: String,
    pub fields: LeadFields,
}

/// A lead as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lead {
    pub id: String,
    pub fields: LeadFields,
    pub created_at: String,
    pub updated_at: String,
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Insert,
    Update,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub entity_id: String,
    pub fields: LeadFields,
    pub captured_at: String,
    pub change_type: ChangeType,
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Run lifecycle: `running -> completed` or `running -> failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(self, Self::Running) && next.is_terminal()
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRun {
    pub id: i64,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: RunStatus,
    pub records_fetched: i64,
    pub records_inserted: i64,
    pub records_updated: i64,
    /// JSON-encoded list of error strings.
    pub error_message: Option<String>,
}

impl SyncRun {
    /// Decoded `error_message`. A value that is not a JSON list of strings
    /// comes back as a single entry.
    pub fn error_details(&self) -> Vec<String> {
        match &self.error_message {
            None => Vec::new(),
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|_| vec![raw.clone()]),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-record outcome + Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Applied { id: String, change_type: ChangeType },
    Skipped { id: String },
    Failed { id: String, message: String },
}

/// What a finished run hands back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub run_id: i64,
    pub status: RunStatus,
    pub records_fetched: usize,
    pub records_inserted: usize,
    pub records_updated: usize,
    pub errors: usize,
    pub error_details: Vec<String>,
    pub started_at: String,
    pub completed_at: String,
}

/// Engine timestamp: RFC 3339, UTC, fixed microsecond precision so that
/// stored values sort lexically in time order.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

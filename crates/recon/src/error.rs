use std::fmt;

#[derive(Debug)]
pub enum SyncError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad table name, missing database, etc.).
    ConfigValidation(String),
    /// Batch envelope is structurally invalid (not an object, no `data` array).
    InvalidBatch(String),
    /// A single record could not be turned into a lead.
    MalformedRecord(String),
    /// SQLite error.
    Store(String),
    /// The database itself cannot take further work (disk full, I/O, corruption).
    StoreUnavailable(String),
    /// A required table is absent from the store.
    SchemaMissing { table: String },
    /// A required table lacks a column the engine reads or writes.
    SchemaMismatch { table: String, column: String },
    /// Finalize attempted on a run that already left `running`.
    InvalidTransition { run_id: i64, status: String },
    /// JSON encoding error.
    Serialize(String),
    /// IO error (config file read, etc.).
    Io(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::InvalidBatch(msg) => write!(f, "invalid batch: {msg}"),
            Self::MalformedRecord(msg) => write!(f, "malformed record: {msg}"),
            Self::Store(msg) => write!(f, "store error: {msg}"),
            Self::StoreUnavailable(msg) => write!(f, "store unavailable: {msg}"),
            Self::SchemaMissing { table } => write!(f, "store is missing table '{table}'"),
            Self::SchemaMismatch { table, column } => {
                write!(f, "table '{table}' has no column '{column}'")
            }
            Self::InvalidTransition { run_id, status } => {
                write!(f, "run {run_id} is already '{status}' and cannot be finalized again")
            }
            Self::Serialize(msg) => write!(f, "serialization error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for SyncError {}

impl SyncError {
    /// Errors that stop a run even when raised inside a record boundary.
    pub fn is_run_level(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::SchemaMissing { .. } | Self::SchemaMismatch { .. }
        )
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match e.sqlite_error_code() {
            Some(
                ErrorCode::DiskFull
                | ErrorCode::SystemIoFailure
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::NotADatabase
                | ErrorCode::ReadOnly
                | ErrorCode::CannotOpen
                | ErrorCode::OutOfMemory,
            ) => Self::StoreUnavailable(e.to_string()),
            _ => Self::Store(e.to_string()),
        }
    }
}


impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(e.to_string())
    }
}

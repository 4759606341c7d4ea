//! SQLite-backed store for leads, their history and the run log.
//!
//! `SyncStore` owns the connection. Row-level functions take a plain
//! `&Connection` so they work the same on the connection, a transaction or
//! a savepoint.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use crate::config::{SyncConfig, Tables};
use crate::error::SyncError;
use crate::model::{ChangeType, HistoryEntry, IncomingLead, Lead, LeadFields, RunStatus, SyncRun};

const HISTORY_APPEND_ONLY: &str = "history is append-only";

const LEAD_COLUMNS: &[&str] = &[
    "id", "first_name", "last_name", "email", "phone", "company", "lead_source",
    "description", "created_at", "updated_at", "source_modified_time",
];

const HISTORY_COLUMNS: &[&str] = &[
    "id", "lead_id", "first_name", "last_name", "email", "phone", "company",
    "lead_source", "description", "source_modified_time", "captured_at", "change_type",
];

const RUN_COLUMNS: &[&str] = &[
    "id", "started_at", "completed_at", "status", "records_fetched",
    "records_inserted", "records_updated", "error_message",
];

fn schema_sql(tables: &Tables) -> String {
    let Tables { entities, history, runs } = tables;
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {entities} (
    id TEXT PRIMARY KEY,
    first_name TEXT,
    last_name TEXT,
    email TEXT,
    phone TEXT,
    company TEXT,
    lead_source TEXT,
    description TEXT,             -- JSON: Lead_Status, Owner, Created_Time
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    source_modified_time TEXT     -- opaque origin marker
);

CREATE TABLE IF NOT EXISTS {history} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lead_id TEXT NOT NULL REFERENCES {entities}(id),
    first_name TEXT,
    last_name TEXT,
    email TEXT,
    phone TEXT,
    company TEXT,
    lead_source TEXT,
    description TEXT,
    source_modified_time TEXT,
    captured_at TEXT NOT NULL,
    change_type TEXT NOT NULL CHECK (change_type IN ('insert', 'update'))
);

CREATE INDEX IF NOT EXISTS {history}_lead_idx ON {history} (lead_id, captured_at);

CREATE TRIGGER IF NOT EXISTS {history}_no_update BEFORE UPDATE ON {history}
BEGIN
    SELECT RAISE(ABORT, '{HISTORY_APPEND_ONLY}');
END;

CREATE TRIGGER IF NOT EXISTS {history}_no_delete BEFORE DELETE ON {history}
BEGIN
    SELECT RAISE(ABORT, '{HISTORY_APPEND_ONLY}');
END;

CREATE TABLE IF NOT EXISTS {runs} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL CHECK (status IN ('running', 'completed', 'failed')),
    records_fetched INTEGER NOT NULL DEFAULT 0,
    records_inserted INTEGER NOT NULL DEFAULT 0,
    records_updated INTEGER NOT NULL DEFAULT 0,
    error_message TEXT            -- JSON list of error strings
);
"#
    )
}

// ---------------------------------------------------------------------------
// Store handle
// ---------------------------------------------------------------------------

pub struct SyncStore {
    conn: Connection,
    tables: Tables,
}

impl SyncStore {
    /// Open an existing store. Fails with `SchemaMissing` if a table is absent
    /// and `SchemaMismatch` if one lacks a required column.
    pub fn open(path: &Path, tables: Tables) -> Result<Self, SyncError> {
        let store = Self::connect(Connection::open(path)?, tables)?;
        store.verify_schema()?;
        Ok(store)
    }

    /// Fresh in-memory store with the schema provisioned.
    pub fn open_in_memory(tables: Tables) -> Result<Self, SyncError> {
        let store = Self::connect(Connection::open_in_memory()?, tables)?;
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;
        let store = Self::connect(Connection::open(&config.database)?, config.tables.clone())?;
        if config.create_schema {
            store.ensure_schema()?;
        } else {
            store.verify_schema()?;
        }
        Ok(store)
    }

    fn connect(conn: Connection, tables: Tables) -> Result<Self, SyncError> {
        tables.validate()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn, tables })
    }

    /// Create any missing tables, indexes and triggers. Idempotent.
    pub fn ensure_schema(&self) -> Result<(), SyncError> {
        self.conn.execute_batch(&schema_sql(&self.tables))?;
        Ok(())
    }

    /// Check that every table exists with the columns the engine uses.
    /// Extra columns are allowed.
    pub fn verify_schema(&self) -> Result<(), SyncError> {
        let required = [
            (&self.tables.entities, LEAD_COLUMNS),
            (&self.tables.history, HISTORY_COLUMNS),
            (&self.tables.runs, RUN_COLUMNS),
        ];
        for (table, columns) in required {
            let present = self.columns_of(table)?;
            if present.is_empty() {
                return Err(SyncError::SchemaMissing { table: table.clone() });
            }
            if let Some(column) = columns.iter().find(|c| !present.iter().any(|p| p == *c)) {
                return Err(SyncError::SchemaMismatch {
                    table: table.clone(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }

    fn columns_of(&self, table: &str) -> Result<Vec<String>, SyncError> {
        let mut stmt = self.conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
        let names = stmt
            .query_map(params![table], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Insert a `running` run row outside any transaction, so it is durable
    /// before the batch is touched.
    pub fn begin_run(&self, started_at: &str) -> Result<i64, SyncError> {
        self.conn.execute(
            &format!("INSERT INTO {} (started_at, status) VALUES (?1, ?2)", self.tables.runs),
            params![started_at, RunStatus::Running.as_str()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Open the run-scoped transaction.
    pub fn transaction(&mut self) -> Result<Transaction<'_>, SyncError> {
        Ok(self.conn.transaction()?)
    }

    pub fn lead(&self, id: &str) -> Result<Option<Lead>, SyncError> {
        find_lead(&self.conn, &self.tables, id)
    }

    pub fn lead_count(&self) -> Result<usize, SyncError> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.tables.entities),
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// History of one lead, oldest first.
    pub fn history_for(&self, id: &str) -> Result<Vec<HistoryEntry>, SyncError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, lead_id, first_name, last_name, email, phone, company, lead_source, \
             description, source_modified_time, captured_at, change_type \
             FROM {} WHERE lead_id = ?1 ORDER BY captured_at, id",
            self.tables.history
        ))?;
        let rows = stmt.query_map(params![id], |row| {
            let raw_change: String = row.get(11)?;
            Ok((
                HistoryEntry {
                    id: row.get(0)?,
                    entity_id: row.get(1)?,
                    fields: LeadFields {
                        first_name: row.get(2)?,
                        last_name: row.get(3)?,
                        email: row.get(4)?,
                        phone: row.get(5)?,
                        company: row.get(6)?,
                        lead_source: row.get(7)?,
                        description: row.get(8)?,
                        source_modified_time: row.get(9)?,
                    },
                    captured_at: row.get(10)?,
                    change_type: ChangeType::Insert,
                },
                raw_change,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (mut entry, raw_change) = row?;
            entry.change_type = ChangeType::parse(&raw_change).ok_or_else(|| {
                SyncError::Store(format!("history row {}: unknown change_type '{raw_change}'", entry.id))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn history_count(&self) -> Result<usize, SyncError> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.tables.history),
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    pub fn run(&self, run_id: i64) -> Result<Option<SyncRun>, SyncError> {
        find_run(&self.conn, &self.tables, run_id)
    }

    /// Every run, oldest first.
    pub fn runs(&self) -> Result<Vec<SyncRun>, SyncError> {
        let mut stmt = self.conn.prepare(&format!("{} ORDER BY id", select_runs(&self.tables)))?;
        let raw = stmt
            .query_map([], raw_run)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawRun::into_run).collect()
    }
}

// ---------------------------------------------------------------------------
// Leads
// ---------------------------------------------------------------------------

pub fn find_lead(conn: &Connection, tables: &Tables, id: &str) -> Result<Option<Lead>, SyncError> {
    let lead = conn
        .query_row(
            &format!(
                "SELECT id, first_name, last_name, email, phone, company, lead_source, \
                 description, source_modified_time, created_at, updated_at \
                 FROM {} WHERE id = ?1",
                tables.entities
            ),
            params![id],
            |row| {
                Ok(Lead {
                    id: row.get(0)?,
                    fields: LeadFields {
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        email: row.get(3)?,
                        phone: row.get(4)?,
                        company: row.get(5)?,
                        lead_source: row.get(6)?,
                        description: row.get(7)?,
                        source_modified_time: row.get(8)?,
                    },
                    created_at: row.get(9)?,
                    updated_at: row.get(10)?,
                })
            },
        )
        .optional()?;
    Ok(lead)
}

pub fn insert_lead(
    conn: &Connection,
    tables: &Tables,
    lead: &IncomingLead,
    now: &str,
) -> Result<(), SyncError> {
    let f = &lead.fields;
    conn.execute(
        &format!(
            "INSERT INTO {} (id, first_name, last_name, email, phone, company, lead_source, \
             description, created_at, updated_at, source_modified_time) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            tables.entities
        ),
        params![
            lead.id,
            f.first_name,
            f.last_name,
            f.email,
            f.phone,
            f.company,
            f.lead_source,
            f.description,
            now,
            now,
            f.source_modified_time
        ],
    )?;
    Ok(())
}

/// Full replace of the mutable fields. `created_at` is left alone.
pub fn update_lead(
    conn: &Connection,
    tables: &Tables,
    lead: &IncomingLead,
    now: &str,
) -> Result<(), SyncError> {
    let f = &lead.fields;
    let changed = conn.execute(
        &format!(
            "UPDATE {} SET first_name = ?1, last_name = ?2, email = ?3, phone = ?4, \
             company = ?5, lead_source = ?6, description = ?7, updated_at = ?8, \
             source_modified_time = ?9 WHERE id = ?10",
            tables.entities
        ),
        params![
            f.first_name,
            f.last_name,
            f.email,
            f.phone,
            f.company,
            f.lead_source,
            f.description,
            now,
            f.source_modified_time,
            lead.id
        ],
    )?;
    if changed != 1 {
        return Err(SyncError::Store(format!("lead '{}' vanished before update", lead.id)));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Terminal state written by `finalize_run`.
#[derive(Debug, Clone, Copy)]
pub enum RunOutcome<'a> {
    Completed {
        fetched: usize,
        inserted: usize,
        updated: usize,
        errors: &'a [String],
    },
    Failed {
        message: &'a str,
    },
}

impl RunOutcome<'_> {
    pub fn status(&self) -> RunStatus {
        match self {
            Self::Completed { .. } => RunStatus::Completed,
            Self::Failed { .. } => RunStatus::Failed,
        }
    }
}

/// Move a `running` run to its terminal state. Any other current state is
/// rejected with `InvalidTransition`; the update itself is still guarded on
/// `status = 'running'`.
pub fn finalize_run(
    conn: &Connection,
    tables: &Tables,
    run_id: i64,
    completed_at: &str,
    outcome: RunOutcome<'_>,
) -> Result<(), SyncError> {
    let status = outcome.status();
    let current = find_run(conn, tables, run_id)?
        .ok_or_else(|| SyncError::Store(format!("run {run_id} does not exist")))?;
    if !current.status.can_transition_to(status) {
        return Err(SyncError::InvalidTransition {
            run_id,
            status: current.status.to_string(),
        });
    }

    let changed = match outcome {
        RunOutcome::Completed { fetched, inserted, updated, errors } => {
            let error_message = if errors.is_empty() {
                None
            } else {
                Some(serde_json::to_string(errors)?)
            };
            conn.execute(
                &format!(
                    "UPDATE {} SET completed_at = ?1, status = ?2, records_fetched = ?3, \
                     records_inserted = ?4, records_updated = ?5, error_message = ?6 \
                     WHERE id = ?7 AND status = ?8",
                    tables.runs
                ),
                params![
                    completed_at,
                    status.as_str(),
                    fetched as i64,
                    inserted as i64,
                    updated as i64,
                    error_message,
                    run_id,
                    RunStatus::Running.as_str()
                ],
            )?
        }
        RunOutcome::Failed { message } => {
            let error_message = serde_json::to_string(&[message])?;
            conn.execute(
                &format!(
                    "UPDATE {} SET completed_at = ?1, status = ?2, error_message = ?3 \
                     WHERE id = ?4 AND status = ?5",
                    tables.runs
                ),
                params![
                    completed_at,
                    status.as_str(),
                    error_message,
                    run_id,
                    RunStatus::Running.as_str()
                ],
            )?
        }
    };

    if changed != 1 {
        return Err(SyncError::Store(format!(
            "run {run_id} left 'running' while being finalized"
        )));
    }
    Ok(())
}

pub fn find_run(conn: &Connection, tables: &Tables, run_id: i64) -> Result<Option<SyncRun>, SyncError> {
    let raw = conn
        .query_row(
            &format!("{} WHERE id = ?1", select_runs(tables)),
            params![run_id],
            raw_run,
        )
        .optional()?;
    raw.map(RawRun::into_run).transpose()
}

fn select_runs(tables: &Tables) -> String {
    format!(
        "SELECT id, started_at, completed_at, status, records_fetched, records_inserted, \
         records_updated, error_message FROM {}",
        tables.runs
    )
}

/// Run row with the status still as stored text.
struct RawRun {
    run: SyncRun,
    status: String,
}

fn raw_run(row: &Row<'_>) -> rusqlite::Result<RawRun> {
    Ok(RawRun {
        run: SyncRun {
            id: row.get(0)?,
            started_at: row.get(1)?,
            completed_at: row.get(2)?,
            status: RunStatus::Running,
            records_fetched: row.get(4)?,
            records_inserted: row.get(5)?,
            records_updated: row.get(6)?,
            error_message: row.get(7)?,
        },
        status: row.get(3)?,
    })
}

impl RawRun {
    fn into_run(self) -> Result<SyncRun, SyncError> {
        let mut run = self.run;
        run.status = RunStatus::parse(&self.status).ok_or_else(|| {
            SyncError::Store(format!("run {}: unknown status '{}'", run.id, self.status))
        })?;
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SyncStore {
        SyncStore::open_in_memory(Tables::default()).unwrap()
    }

    fn lead(id: &str, first_name: &str, modified: &str) -> IncomingLead {
        IncomingLead {
            id: id.into(),
            fields: LeadFields {
                first_name: Some(first_name.into()),
                source_modified_time: Some(modified.into()),
                ..LeadFields::default()
            },
        }
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let store = store();
        store.ensure_schema().unwrap();
        store.verify_schema().unwrap();
        assert_eq!(store.lead_count().unwrap(), 0);
    }

    #[test]
    fn open_without_schema_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        let err = SyncStore::open(&path, Tables::default()).err().unwrap();
        assert!(matches!(err, SyncError::SchemaMissing { ref table } if table == "leads"));
    }

    #[test]
    fn open_rejects_tables_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(&schema_sql(&Tables::default())).unwrap();
        conn.execute_batch("ALTER TABLE sync_log DROP COLUMN error_message;")
            .unwrap();
        drop(conn);
        let err = SyncStore::open(&path, Tables::default()).err().unwrap();
        assert!(matches!(
            err,
            SyncError::SchemaMismatch { ref table, ref column }
                if table == "sync_log" && column == "error_message"
        ));
        assert!(err.is_run_level());
    }

    #[test]
    fn from_config_provisions_or_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SyncConfig::for_database(dir.path().join("crm.db"));

        assert!(matches!(
            SyncStore::from_config(&config),
            Err(SyncError::SchemaMissing { .. })
        ));

        config.create_schema = true;
        drop(SyncStore::from_config(&config).unwrap());

        config.create_schema = false;
        let store = SyncStore::from_config(&config).unwrap();
        store.verify_schema().unwrap();
    }

    #[test]
    fn custom_table_names() {
        let tables = Tables {
            entities: "crm_leads".into(),
            history: "crm_leads_history".into(),
            runs: "crm_runs".into(),
        };
        let store = SyncStore::open_in_memory(tables).unwrap();
        insert_lead(store.connection(), store.tables(), &lead("1", "Jane", "t1"), "now").unwrap();
        assert_eq!(store.lead_count().unwrap(), 1);
        let run_id = store.begin_run("t0").unwrap();
        assert_eq!(store.run(run_id).unwrap().unwrap().status, RunStatus::Running);
    }

    #[test]
    fn insert_then_update_preserves_created_at() {
        let store = store();
        let conn = store.connection();
        insert_lead(conn, store.tables(), &lead("1", "Jane", "t1"), "2025-01-01").unwrap();
        update_lead(conn, store.tables(), &lead("1", "Janet", "t2"), "2025-02-01").unwrap();

        let stored = store.lead("1").unwrap().unwrap();
        assert_eq!(stored.fields.first_name.as_deref(), Some("Janet"));
        assert_eq!(stored.fields.source_modified_time.as_deref(), Some("t2"));
        assert_eq!(stored.created_at, "2025-01-01");
        assert_eq!(stored.updated_at, "2025-02-01");
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let store = store();
        let conn = store.connection();
        insert_lead(conn, store.tables(), &lead("1", "Jane", "t1"), "now").unwrap();
        let err = insert_lead(conn, store.tables(), &lead("1", "Jane", "t1"), "now").unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));
        assert_eq!(store.lead_count().unwrap(), 1);
    }

    #[test]
    fn update_of_missing_lead_fails() {
        let store = store();
        let err = update_lead(store.connection(), store.tables(), &lead("9", "X", "t"), "now")
            .unwrap_err();
        assert!(err.to_string().contains("'9'"));
    }

    #[test]
    fn finalize_completed_and_failed() {
        let store = store();
        let conn = store.connection();

        let ok_id = store.begin_run("t0").unwrap();
        let errors = vec!["2: malformed record: missing required field 'id'".to_string()];
        finalize_run(
            conn,
            store.tables(),
            ok_id,
            "t1",
            RunOutcome::Completed { fetched: 3, inserted: 2, updated: 0, errors: &errors },
        )
        .unwrap();
        let run = store.run(ok_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.completed_at.as_deref(), Some("t1"));
        assert_eq!(run.records_fetched, 3);
        assert_eq!(run.records_inserted, 2);
        assert_eq!(run.error_details(), errors);

        let clean_id = store.begin_run("t2").unwrap();
        finalize_run(
            conn,
            store.tables(),
            clean_id,
            "t3",
            RunOutcome::Completed { fetched: 0, inserted: 0, updated: 0, errors: &[] },
        )
        .unwrap();
        assert_eq!(store.run(clean_id).unwrap().unwrap().error_message, None);

        let bad_id = store.begin_run("t4").unwrap();
        finalize_run(conn, store.tables(), bad_id, "t5", RunOutcome::Failed { message: "boom" })
            .unwrap();
        let run = store.run(bad_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error_details(), vec!["boom"]);

        assert_eq!(store.runs().unwrap().len(), 3);
    }

    #[test]
    fn terminal_runs_cannot_be_finalized_again() {
        let store = store();
        let conn = store.connection();
        let run_id = store.begin_run("t0").unwrap();
        finalize_run(conn, store.tables(), run_id, "t1", RunOutcome::Failed { message: "x" })
            .unwrap();

        let err = finalize_run(
            conn,
            store.tables(),
            run_id,
            "t2",
            RunOutcome::Completed { fetched: 0, inserted: 0, updated: 0, errors: &[] },
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::InvalidTransition { status, .. } if status == "failed"));

        let err = finalize_run(conn, store.tables(), 99, "t2", RunOutcome::Failed { message: "x" })
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn history_rows_reject_update_and_delete() {
        let store = store();
        let conn = store.connection();
        insert_lead(conn, store.tables(), &lead("1", "Jane", "t1"), "now").unwrap();
        conn.execute(
            "INSERT INTO leads_history (lead_id, captured_at, change_type) VALUES ('1', 'now', 'insert')",
            [],
        )
        .unwrap();

        let err = conn
            .execute("UPDATE leads_history SET first_name = 'X'", [])
            .unwrap_err();
        assert!(err.to_string().contains(HISTORY_APPEND_ONLY));

        let err = conn.execute("DELETE FROM leads_history", []).unwrap_err();
        assert!(err.to_string().contains(HISTORY_APPEND_ONLY));

        assert_eq!(store.history_count().unwrap(), 1);
    }
}

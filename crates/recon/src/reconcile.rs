use log::{debug, warn};
use rusqlite::{Connection, Transaction};
use serde::Serialize;
use serde_json::Value;

use crate::batch::record_id;
use crate::config::Tables;
use crate::differ::{decide, Action};
use crate::error::SyncError;
use crate::history::HistoryRecorder;
use crate::model::{now_timestamp, ChangeType, IncomingLead, RecordOutcome};
use crate::store::{find_lead, insert_lead, update_lead};

/// Counts and per-record outcomes for one pass over a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    /// `"<entity_id>: <message>"` per failed record, in batch order.
    pub errors: Vec<String>,
    pub outcomes: Vec<RecordOutcome>,
}

impl ReconcileReport {
    fn record(&mut self, outcome: RecordOutcome) {
        match &outcome {
            RecordOutcome::Applied { change_type: ChangeType::Insert, .. } => self.inserted += 1,
            RecordOutcome::Applied { change_type: ChangeType::Update, .. } => self.updated += 1,
            RecordOutcome::Skipped { .. } => self.skipped += 1,
            RecordOutcome::Failed { id, message } => self.errors.push(format!("{id}: {message}")),
        }
        self.outcomes.push(outcome);
    }
}

/// Reconcile `records` in order inside the caller's transaction.
///
/// Each record runs in its own savepoint: a record that fails is rolled back
/// on its own and reported as `Failed`, and the loop moves on. The returned
/// `Err` is reserved for faults that make the store itself unusable (a
/// savepoint that cannot be opened or closed, a full disk, I/O errors). The
/// failing record is rolled back first; earlier records stay applied in `tx`.
/// Committing is the caller's job.
pub fn reconcile(
    tx: &mut Transaction<'_>,
    tables: &Tables,
    records: &[Value],
) -> Result<ReconcileReport, SyncError> {
    let mut report = ReconcileReport {
        fetched: records.len(),
        ..ReconcileReport::default()
    };

    for record in records {
        let sp = tx.savepoint()?;
        let outcome = match apply_record(&sp, tables, record) {
            Ok(outcome) => {
                sp.commit()?;
                outcome
            }
            Err(e) if e.is_run_level() => {
                sp.finish()?;
                return Err(e);
            }
            Err(e) => {
                // Default drop behavior of a savepoint is rollback.
                sp.finish()?;
                let id = record_id(record);
                warn!("lead {id} failed: {e}");
                RecordOutcome::Failed { id, message: e.to_string() }
            }
        };
        report.record(outcome);
    }

    Ok(report)
}

fn apply_record(conn: &Connection, tables: &Tables, record: &Value) -> Result<RecordOutcome, SyncError> {
    let incoming = IncomingLead::from_value(record)?;
    let existing = find_lead(conn, tables, &incoming.id)?;

    let now = now_timestamp();
    let change_type = match decide(&incoming, existing.as_ref()) {
        Action::Unchanged => {
            debug!("lead {} unchanged", incoming.id);
            return Ok(RecordOutcome::Skipped { id: incoming.id });
        }
        Action::Insert => {
            insert_lead(conn, tables, &incoming, &now)?;
            ChangeType::Insert
        }
        Action::Update => {
            update_lead(conn, tables, &incoming, &now)?;
            ChangeType::Update
        }
    };
    HistoryRecorder::new(conn, tables).append(&incoming.id, &incoming.fields, change_type, &now)?;

    debug!("lead {} {change_type}", incoming.id);
    Ok(RecordOutcome::Applied { id: incoming.id, change_type })
}

use rusqlite::{params, Connection};

use crate::config::Tables;
use crate::error::SyncError;
use crate::model::{ChangeType, LeadFields};

/// Append-only writer for the history table.
///
/// Borrow it from the same connection, transaction or savepoint that performed
/// the entity write, so both land or neither does. There is no read or update
/// path here; reads go through `SyncStore::history_for`.
pub struct HistoryRecorder<'c> {
    conn: &'c Connection,
    table: &'c str,
}

impl<'c> HistoryRecorder<'c> {
    pub fn new(conn: &'c Connection, tables: &'c Tables) -> Self {
        Self { conn, table: &tables.history }
    }

    /// Returns the new history row id.
    pub fn append(
        &self,
        entity_id: &str,
        snapshot: &LeadFields,
        change_type: ChangeType,
        captured_at: &str,
    ) -> Result<i64, SyncError> {
        self.conn.execute(
            &format!(
                "INSERT INTO {} (lead_id, first_name, last_name, email, phone, company, \
                 lead_source, description, source_modified_time, captured_at, change_type) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                self.table
            ),
            params![
                entity_id,
                snapshot.first_name,
                snapshot.last_name,
                snapshot.email,
                snapshot.phone,
                snapshot.company,
                snapshot.lead_source,
                snapshot.description,
                snapshot.source_modified_time,
                captured_at,
                change_type.as_str()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

//! Run lifecycle around one reconciliation pass.
//!
//! 1. A `running` row is written and committed on its own.
//! 2. One transaction covers the whole batch; the reconciler only borrows it.
//! 3. The run row is finalized inside that same transaction, which is then
//!    committed exactly once, on the success path and on the failure path.
//!
//! A run-level failure does not roll back records already reconciled: they
//! are committed together with the `failed` status and the error is returned
//! to the caller afterwards.

use log::{debug, error, info};
use rusqlite::Transaction;
use serde_json::Value;

use crate::batch::Batch;
use crate::config::{SyncConfig, Tables};
use crate::error::SyncError;
use crate::model::{now_timestamp, RunStatus, SyncSummary};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::store::{finalize_run, RunOutcome, SyncStore};

pub struct RunCoordinator<'s> {
    store: &'s mut SyncStore,
}

impl<'s> RunCoordinator<'s> {
    pub fn new(store: &'s mut SyncStore) -> Self {
        Self { store }
    }

    /// Reconcile one batch. Per-record failures end up in the summary; a
    /// run-level failure is returned as `Err` once the `failed` status is
    /// committed. A failure to write the run row itself is returned as-is.
    pub fn run(&mut self, batch: &Value) -> Result<SyncSummary, SyncError> {
        let tables = self.store.tables().clone();

        let started_at = now_timestamp();
        let run_id = self.store.begin_run(&started_at)?;
        info!("sync run {run_id} started");

        let mut tx = self.store.transaction()?;
        match drive(&mut tx, &tables, batch) {
            Ok(report) => {
                let completed_at = now_timestamp();
                finalize_run(
                    &tx,
                    &tables,
                    run_id,
                    &completed_at,
                    RunOutcome::Completed {
                        fetched: report.fetched,
                        inserted: report.inserted,
                        updated: report.updated,
                        errors: &report.errors,
                    },
                )?;
                tx.commit()?;

                info!(
                    "sync run {run_id} completed: fetched={} inserted={} updated={} skipped={} errors={}",
                    report.fetched,
                    report.inserted,
                    report.updated,
                    report.skipped,
                    report.errors.len()
                );

                Ok(SyncSummary {
                    run_id,
                    status: RunStatus::Completed,
                    records_fetched: report.fetched,
                    records_inserted: report.inserted,
                    records_updated: report.updated,
                    errors: report.errors.len(),
                    error_details: report.errors,
                    started_at,
                    completed_at,
                })
            }
            Err(err) => {
                error!("sync run {run_id} failed: {err}");
                let completed_at = now_timestamp();
                let message = err.to_string();
                finalize_run(
                    &tx,
                    &tables,
                    run_id,
                    &completed_at,
                    RunOutcome::Failed { message: &message },
                )?;
                tx.commit()?;
                Err(err)
            }
        }
    }
}

fn drive(
    tx: &mut Transaction<'_>,
    tables: &Tables,
    batch: &Value,
) -> Result<ReconcileReport, SyncError> {
    let batch = Batch::from_value(batch)?;
    if let Some(info) = batch.info() {
        debug!(
            "batch info: page={:?} per_page={:?} count={:?} more_records={:?}",
            info.page, info.per_page, info.count, info.more_records
        );
    }
    reconcile(tx, tables, &batch.data)
}

/// Open the configured store, run one batch through it and close it again.
pub fn sync_batch(config: &SyncConfig, batch: &Value) -> Result<SyncSummary, SyncError> {
    let mut store = SyncStore::from_config(config)?;
    RunCoordinator::new(&mut store).run(batch)
}

//! `leadsync-recon` — Incremental reconciliation engine for CRM lead batches.
//!
//! Receives an already-fetched batch and a SQLite store handle; decides per
//! record whether it is new, changed or unchanged, applies the minimal write,
//! appends history and records the run. No network IO.

pub mod batch;
pub mod config;
pub mod coordinator;
pub mod differ;
pub mod error;
pub mod history;
pub mod model;
pub mod reconcile;
pub mod report;
pub mod store;

pub use config::{SyncConfig, Tables};
pub use coordinator::{sync_batch, RunCoordinator};
pub use error::SyncError;
pub use model::{RecordOutcome, RunStatus, SyncSummary};
pub use store::SyncStore;

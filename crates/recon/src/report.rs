use std::fmt;

use crate::model::SyncSummary;

const RULE_WIDTH: usize = 60;

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(RULE_WIDTH);
        writeln!(f, "{rule}")?;
        writeln!(f, "LEAD SYNC SUMMARY")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Sync ID: {}", self.run_id)?;
        writeln!(f, "Status: {}", self.status)?;
        writeln!(f, "Records Fetched: {}", self.records_fetched)?;
        writeln!(f, "Records Inserted: {}", self.records_inserted)?;
        writeln!(f, "Records Updated: {}", self.records_updated)?;
        writeln!(f, "Errors: {}", self.errors)?;
        writeln!(f, "Started: {}", self.started_at)?;
        writeln!(f, "Completed: {}", self.completed_at)?;

        if !self.error_details.is_empty() {
            writeln!(f)?;
            writeln!(f, "Error Details:")?;
            for detail in &self.error_details {
                writeln!(f, "  - {detail}")?;
            }
        }

        write!(f, "{rule}")
    }
}

//! Runs command - list recent sync runs

use crate::error::Result;
use crate::store::{Db, SyncRun};
use tracing::info;

/// List recent sync runs, newest first.
pub async fn cmd_runs(db: &Db, supplier: Option<&str>, limit: i64) -> Result<Vec<SyncRun>> {
    info!("Listing sync runs");
    db.list_sync_runs(supplier, limit).await
}

/// Print sync runs to console
pub fn print_runs(runs: &[SyncRun]) {
    println!("\n📜 Sync Runs\n");

    if runs.is_empty() {
        println!("No sync runs recorded. Use 'stockroom sync' to pull feeds.");
        return;
    }

    for run in runs {
        println!("• {} [{}] {}", run.source, run.status, run.started_at);
        println!(
            "  Inserted: {}, Updated: {}, Unchanged: {}, Failed: {}",
            run.records_inserted, run.records_updated, run.records_unchanged, run.records_failed
        );
        if let Some(checksum) = &run.feed_checksum {
            println!("  Feed checksum: {}", checksum);
        }
        if let Some(error) = &run.error_message {
            println!("  Error: {}", error);
        }
        println!();
    }
}

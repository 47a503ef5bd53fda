//! Run command - sync then normalize in one pass

use crate::commands::normalize::{normalize_supplier, NormalizeReport};
use crate::commands::sync::{sync_supplier, SyncReport};
use crate::config::{Config, SupplierConfig};
use crate::error::Result;
use crate::store::Db;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Combined pipeline outcome for one supplier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub sync: SyncReport,
    pub normalize: Option<NormalizeReport>,
}

/// Run the full pipeline for one supplier, or every enabled one.
pub async fn cmd_run(config: &Config, db: &Db, supplier: Option<&str>) -> Result<Vec<RunReport>> {
    let suppliers: Vec<&SupplierConfig> = match supplier {
        Some(name) => vec![config.supplier(name)?],
        None => config.enabled_suppliers(),
    };

    let mut reports = Vec::with_capacity(suppliers.len());
    for supplier in suppliers {
        if !supplier.enabled {
            info!("Supplier {} is disabled, skipping", supplier.name);
            continue;
        }

        let sync = sync_supplier(config, db, supplier).await?;
        let normalize = if sync.counts.total() > 0 {
            Some(normalize_supplier(db, supplier).await?)
        } else {
            info!(
                "Feed for {} staged no records, skipping normalize",
                supplier.name
            );
            None
        };
        reports.push(RunReport { sync, normalize });
    }

    Ok(reports)
}

/// Print run reports to console
pub fn print_run_reports(reports: &[RunReport]) {
    println!("\n✓ Pipeline complete\n");

    if reports.is_empty() {
        println!("No enabled suppliers. Add [[suppliers]] entries to the config file.");
        return;
    }

    for report in reports {
        let counts = &report.sync.counts;
        println!("• {}", report.sync.source);
        println!(
            "  Staged: {} inserted, {} updated, {} unchanged",
            counts.inserted, counts.updated, counts.unchanged
        );
        if counts.failed > 0 {
            println!("  Staging failures: {}", counts.failed);
        }
        match &report.normalize {
            Some(normalize) => {
                let stats = &normalize.stats;
                println!(
                    "  Catalog: {} created, {} updated, {} excluded, {} unmapped",
                    stats.created, stats.updated, stats.skipped_excluded, stats.skipped_unmapped
                );
                if stats.failed > 0 {
                    println!("  Normalize failures: {}", stats.failed);
                }
            }
            None => println!("  Catalog: skipped (no staged records)"),
        }
        println!();
    }
}

//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::store::{Db, SyncRun};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Per-supplier status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierStatus {
    pub name: String,
    pub enabled: bool,
    pub staged_records: i64,
    pub excluded_records: i64,
    pub catalog_products: i64,
    pub last_run: Option<SyncRun>,
}

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub catalog_products: i64,
    pub suppliers: Vec<SupplierStatus>,
}

/// Get system status
pub async fn cmd_status(config: &Config, db: &Db) -> Result<StatusInfo> {
    info!("Getting status");

    let mut suppliers = Vec::with_capacity(config.suppliers.len());
    for supplier in &config.suppliers {
        suppliers.push(SupplierStatus {
            name: supplier.name.clone(),
            enabled: supplier.enabled,
            staged_records: db.count_staged(&supplier.name).await?,
            excluded_records: db.count_staged_excluded(&supplier.name).await?,
            catalog_products: db.count_source_products(&supplier.name).await?,
            last_run: db.latest_sync_run(&supplier.name).await?,
        });
    }

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        catalog_products: db.count_products().await?,
        suppliers,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 stockroom Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Catalog products: {}", status.catalog_products);

    if status.suppliers.is_empty() {
        println!("\nNo suppliers configured. Add [[suppliers]] entries to the config file.");
        return;
    }

    println!("\nSuppliers:");
    for supplier in &status.suppliers {
        let state = if supplier.enabled { "enabled" } else { "disabled" };
        println!("• {} [{}]", supplier.name, state);
        println!(
            "  Staged: {} ({} excluded)",
            supplier.staged_records, supplier.excluded_records
        );
        println!("  Catalog products: {}", supplier.catalog_products);
        match &supplier.last_run {
            Some(run) => {
                println!(
                    "  Last sync: {} at {} ({} inserted, {} updated, {} unchanged, {} failed)",
                    run.status,
                    run.completed_at.as_deref().unwrap_or(&run.started_at),
                    run.records_inserted,
                    run.records_updated,
                    run.records_unchanged,
                    run.records_failed
                );
                if let Some(error) = &run.error_message {
                    println!("  Last error: {}", error);
                }
            }
            None => println!("  Last sync: never"),
        }
        println!();
    }
}

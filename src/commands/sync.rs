//! Sync command - download feeds and stage their records

use crate::config::{Config, SupplierConfig};
use crate::error::Result;
use crate::feed::{feed_checksum, FeedFetcher, FeedParser};
use crate::progress;
use crate::store::{Db, RunStatus, UpsertCounts};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Outcome of syncing one supplier feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub source: String,
    pub feed_checksum: Option<String>,
    pub counts: UpsertCounts,
}

/// Download and stage feeds for one supplier, or every enabled one.
pub async fn cmd_sync(config: &Config, db: &Db, supplier: Option<&str>) -> Result<Vec<SyncReport>> {
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
        reports.push(sync_supplier(config, db, supplier).await?);
    }

    Ok(reports)
}

/// Sync one supplier under a recorded run. A failure marks the run as
/// failed before propagating; batches committed before the failure stay.
pub(crate) async fn sync_supplier(
    config: &Config,
    db: &Db,
    supplier: &SupplierConfig,
) -> Result<SyncReport> {
    info!("Syncing supplier {}", supplier.name);
    let run = db.start_sync_run(&supplier.name).await?;

    match stage_feed(config, db, supplier).await {
        Ok((counts, checksum)) => {
            db.complete_sync_run(&run.id, RunStatus::Completed, &counts, checksum.clone(), None)
                .await?;
            info!(
                "Sync completed for {}: {} inserted, {} updated, {} unchanged, {} failed",
                supplier.name, counts.inserted, counts.updated, counts.unchanged, counts.failed
            );
            Ok(SyncReport {
                source: supplier.name.clone(),
                feed_checksum: checksum,
                counts,
            })
        }
        Err(e) => {
            warn!("Sync failed for {}: {}", supplier.name, e);
            db.complete_sync_run(
                &run.id,
                RunStatus::Failed,
                &UpsertCounts::default(),
                None,
                Some(e.to_string()),
            )
            .await?;
            Err(e)
        }
    }
}

async fn stage_feed(
    config: &Config,
    db: &Db,
    supplier: &SupplierConfig,
) -> Result<(UpsertCounts, Option<String>)> {
    let fetcher = FeedFetcher::new(&config.fetch)?;
    let feeds_dir = config.paths.base_dir.join("feeds");

    let pb = progress::spinner(&format!("Fetching feed for {}", supplier.name));
    let fetched = fetcher.fetch(supplier, &feeds_dir).await;
    pb.finish_and_clear();
    let feed_path = fetched?;

    let checksum = feed_checksum(&feed_path);

    let pb = progress::spinner(&format!("Staging records for {}", supplier.name));
    let result = stage_records(config, db, supplier, &feed_path, &pb).await;
    match &result {
        Ok(counts) => pb.finish_with_message(format!(
            "Staged {} records for {}",
            counts.total(),
            supplier.name
        )),
        Err(_) => pb.finish_and_clear(),
    }

    Ok((result?, checksum))
}

async fn stage_records(
    config: &Config,
    db: &Db,
    supplier: &SupplierConfig,
    feed_path: &Path,
    pb: &ProgressBar,
) -> Result<UpsertCounts> {
    let mut parser = FeedParser::from_path(feed_path)?;
    let mut counts = UpsertCounts::default();
    let mut batch = Vec::with_capacity(config.sync.batch_size);

    for item in parser.by_ref() {
        batch.push(item?);
        if batch.len() >= config.sync.batch_size {
            counts.merge(&db.upsert_staged_batch(&supplier.name, &batch).await?);
            batch.clear();
            pb.set_message(format!(
                "Staged {} records for {}",
                counts.total(),
                supplier.name
            ));
        }
    }
    if !batch.is_empty() {
        counts.merge(&db.upsert_staged_batch(&supplier.name, &batch).await?);
    }

    info!(
        "Parsed {} feed items for {}",
        parser.records_parsed(),
        supplier.name
    );
    Ok(counts)
}

/// Print sync reports to console
pub fn print_sync_reports(reports: &[SyncReport]) {
    println!("\n✓ Sync complete\n");

    if reports.is_empty() {
        println!("No enabled suppliers. Add [[suppliers]] entries to the config file.");
        return;
    }

    for report in reports {
        println!("• {}", report.source);
        println!("  Inserted: {}", report.counts.inserted);
        println!("  Updated: {}", report.counts.updated);
        println!("  Unchanged: {}", report.counts.unchanged);
        if report.counts.failed > 0 {
            println!("  Failed: {}", report.counts.failed);
        }
        if let Some(checksum) = &report.feed_checksum {
            println!("  Feed checksum: {}", checksum);
        }
        println!();
    }
}

//! Normalize command - map staged records into the catalog

use crate::catalog::{CatalogNormalizer, NormalizeStats};
use crate::config::{Config, SupplierConfig};
use crate::error::Result;
use crate::progress;
use crate::store::Db;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome of normalizing one supplier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeReport {
    pub source: String,
    pub stats: NormalizeStats,
}

/// Normalize staged records for one supplier, or every enabled one.
pub async fn cmd_normalize(
    config: &Config,
    db: &Db,
    supplier: Option<&str>,
) -> Result<Vec<NormalizeReport>> {
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
        reports.push(normalize_supplier(db, supplier).await?);
    }

    Ok(reports)
}

pub(crate) async fn normalize_supplier(
    db: &Db,
    supplier: &SupplierConfig,
) -> Result<NormalizeReport> {
    let normalizer = CatalogNormalizer::new(db.clone());
    let pb = progress::counting_bar(0, &format!("Normalizing {}", supplier.name));

    let result = normalizer
        .normalize_source_with_progress(
            &supplier.name,
            supplier.pack_attribute.as_deref(),
            |done, total| {
                if pb.length() != Some(total) {
                    pb.set_length(total);
                }
                pb.set_position(done);
            },
        )
        .await;

    match &result {
        Ok(stats) => pb.finish_with_message(format!(
            "Normalized {} records for {}",
            stats.processed, supplier.name
        )),
        Err(_) => pb.finish_and_clear(),
    }
    let stats = result?;

    info!(
        "Normalize completed for {}: {} created, {} updated, {} excluded, {} unmapped, {} failed",
        supplier.name,
        stats.created,
        stats.updated,
        stats.skipped_excluded,
        stats.skipped_unmapped,
        stats.failed
    );

    Ok(NormalizeReport {
        source: supplier.name.clone(),
        stats,
    })
}

/// Print normalize reports to console
pub fn print_normalize_reports(reports: &[NormalizeReport]) {
    println!("\n✓ Normalize complete\n");

    if reports.is_empty() {
        println!("No enabled suppliers. Add [[suppliers]] entries to the config file.");
        return;
    }

    for report in reports {
        let stats = &report.stats;
        println!("• {}", report.source);
        println!("  Processed: {}", stats.processed);
        println!("  Created: {}", stats.created);
        println!("  Updated: {}", stats.updated);
        println!("  Excluded: {}", stats.skipped_excluded);
        println!("  Unmapped: {}", stats.skipped_unmapped);
        if stats.failed > 0 {
            println!("  Failed: {}", stats.failed);
        }
        if stats.skipped_unmapped > 0 {
            println!("  Add rules with 'stockroom rules add', then re-run normalize");
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, RawProductRecord};
    use crate::store::NewCategoryRule;
    use tempfile::TempDir;

    fn test_supplier(name: &str) -> SupplierConfig {
        SupplierConfig {
            name: name.to_string(),
            feed_url: Some("https://example.com/feed.xml".to_string()),
            feed_path: None,
            enabled: true,
            pack_attribute: None,
        }
    }

    #[tokio::test]
    async fn test_normalize_reports_per_supplier() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.suppliers.push(test_supplier("acme"));
        let db = Db::connect(&config).await.unwrap();

        let mut rec = RawProductRecord {
            feed_id: "1".to_string(),
            sku: Some("SKU1".to_string()),
            title: Some("Test".to_string()),
            ..Default::default()
        };
        rec.categories.push(Category {
            id: None,
            name: Some("Hygiena".to_string()),
        });
        db.upsert_staged_batch("acme", &[rec]).await.unwrap();
        db.insert_rule(&NewCategoryRule {
            source: "acme".to_string(),
            source_category_exact: Some("Hygiena".to_string()),
            target_category_id: 42,
            priority: 100,
            ..Default::default()
        })
        .await
        .unwrap();

        let reports = cmd_normalize(&config, &db, None).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].source, "acme");
        assert_eq!(reports[0].stats.created, 1);
        assert_eq!(db.count_products().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_normalize_unknown_supplier() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        let db = Db::connect(&config).await.unwrap();

        assert!(cmd_normalize(&config, &db, Some("nope")).await.is_err());
    }
}

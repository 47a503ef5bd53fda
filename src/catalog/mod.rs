//! Catalog normalization: staged records become products.
//!
//! Each staged record is resolved against the category rules, enriched with
//! derived pricing fields, and upserted into the catalog in two phases:
//! an existing supplier binding updates its product in place, an unbound
//! record with a known SKU attaches a new binding to the existing product,
//! and everything else creates a product plus its first binding.

use crate::error::Result;
use crate::mapping::CategoryMatcher;
use crate::models::{MatchResult, StockStatus};
use crate::store::{CatalogProduct, Db, ProductSource, StagedRecord};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Counters for one normalize pass
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NormalizeStats {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped_excluded: usize,
    pub skipped_unmapped: usize,
    pub failed: usize,
}

enum RecordOutcome {
    Created,
    Updated,
    SkippedExcluded,
    SkippedUnmapped,
}

/// Margin as a percentage of the retail price, or None when it cannot be
/// computed. The quotient rounds to 4 dp before scaling, the result to 2 dp.
pub fn margin_percent(purchase: Option<Decimal>, retail: Option<Decimal>) -> Option<Decimal> {
    let purchase = purchase?;
    let retail = retail?;
    if retail.is_zero() {
        return None;
    }
    let ratio = ((retail - purchase) / retail)
        .round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
    let margin = (ratio * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    Some(margin)
}

/// Grams to kilograms at a fixed 4 dp scale.
pub fn weight_kg(grams: Option<i64>) -> Option<Decimal> {
    let grams = grams?;
    let mut kg = Decimal::from(grams) / Decimal::ONE_THOUSAND;
    kg.rescale(4);
    Some(kg)
}

/// Integer pack size from the configured attribute, when present and numeric.
pub fn pack_quantity(
    attributes: &BTreeMap<String, String>,
    attribute: Option<&str>,
) -> Option<i64> {
    let name = attribute?;
    let value = attributes.get(name)?;
    match value.parse::<i64>() {
        Ok(qty) => Some(qty),
        Err(_) => {
            debug!("Cannot parse pack quantity '{}' from attribute {}", value, name);
            None
        }
    }
}

fn apply_record(
    product: &mut CatalogProduct,
    record: &StagedRecord,
    result: &MatchResult,
    pack_attribute: Option<&str>,
) {
    product.name = record.title.clone();
    product.description = record.description.clone();
    product.category_id = result.target_category_id;
    product.price_cost = record.price_purchase.clone();
    product.price_b2b = record.price_retail.clone();
    product.margin_percent =
        margin_percent(record.purchase_price(), record.retail_price()).map(|m| m.to_string());
    product.weight_kg = weight_kg(record.weight_grams).map(|w| w.to_string());
    product.pack_quantity = pack_quantity(&record.attributes(), pack_attribute);
    product.images_json = Some(record.images_json.clone());
    product.attributes_json = Some(record.attributes_json.clone());
    product.stock_status =
        StockStatus::from_availability(record.availability.as_deref()).to_string();
}

fn new_binding(product_id: &str, source: &str, record: &StagedRecord) -> ProductSource {
    let mut binding = ProductSource::new(
        product_id.to_string(),
        source.to_string(),
        record.feed_id.clone(),
    );
    binding.source_sku = record.sku.clone();
    binding.last_price_purchase = record.price_purchase.clone();
    binding.last_price_retail = record.price_retail.clone();
    binding
}

/// Runs the staged-to-catalog pass
pub struct CatalogNormalizer {
    db: Db,
}

impl CatalogNormalizer {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Normalize all non-excluded staged records for one source.
    pub async fn normalize_source(
        &self,
        source: &str,
        pack_attribute: Option<&str>,
    ) -> Result<NormalizeStats> {
        self.normalize_source_with_progress(source, pack_attribute, |_, _| {})
            .await
    }

    /// Normalize with a `(done, total)` progress callback per record.
    pub async fn normalize_source_with_progress(
        &self,
        source: &str,
        pack_attribute: Option<&str>,
        mut progress: impl FnMut(u64, u64),
    ) -> Result<NormalizeStats> {
        let matcher = CategoryMatcher::load(&self.db, source).await?;
        let staged = self.db.list_staged_active(source).await?;
        info!("Normalizing {} staged records for {}", staged.len(), source);

        let mut stats = NormalizeStats::default();
        for record in &staged {
            stats.processed += 1;

            match self
                .process_record(&matcher, source, record, pack_attribute)
                .await
            {
                Ok(RecordOutcome::Created) => stats.created += 1,
                Ok(RecordOutcome::Updated) => stats.updated += 1,
                Ok(RecordOutcome::SkippedExcluded) => stats.skipped_excluded += 1,
                Ok(RecordOutcome::SkippedUnmapped) => stats.skipped_unmapped += 1,
                Err(e) => {
                    warn!("Failed to normalize record {}: {}", record.feed_id, e);
                    stats.failed += 1;
                }
            }

            if stats.processed % 500 == 0 {
                info!("Processed {} products", stats.processed);
            }
            progress(stats.processed as u64, staged.len() as u64);
        }

        Ok(stats)
    }

    async fn process_record(
        &self,
        matcher: &CategoryMatcher,
        source: &str,
        record: &StagedRecord,
        pack_attribute: Option<&str>,
    ) -> Result<RecordOutcome> {
        let category = record.deepest_category_name();
        let result = matcher.match_category(category.as_deref(), record.title.as_deref());

        self.db
            .insert_mapping_log(
                source,
                &record.feed_id,
                record.sku.as_deref(),
                category.as_deref(),
                &result,
            )
            .await?;

        if result.is_excluded() {
            self.db
                .mark_staged_excluded(source, &record.feed_id, "Category excluded")
                .await?;
            return Ok(RecordOutcome::SkippedExcluded);
        }

        if !result.is_matched() {
            debug!(
                "No category mapping for record {} (category {:?})",
                record.feed_id, category
            );
            return Ok(RecordOutcome::SkippedUnmapped);
        }

        let created = self
            .upsert_product(source, record, &result, pack_attribute)
            .await?;
        Ok(if created {
            RecordOutcome::Created
        } else {
            RecordOutcome::Updated
        })
    }

    /// Two-phase upsert. Returns true when a new product row was created.
    async fn upsert_product(
        &self,
        source: &str,
        record: &StagedRecord,
        result: &MatchResult,
        pack_attribute: Option<&str>,
    ) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        // Phase 1: a known binding refreshes its product in place
        if let Some(binding) = Db::get_binding(&mut tx, source, &record.feed_id).await? {
            let mut product = CatalogProduct::new();
            product.id = binding.product_id.clone();
            apply_record(&mut product, record, result, pack_attribute);
            Db::update_product(&mut tx, &product).await?;
            Db::touch_binding(
                &mut tx,
                source,
                &record.feed_id,
                record.price_purchase.as_deref(),
                record.price_retail.as_deref(),
            )
            .await?;
            tx.commit().await?;
            return Ok(false);
        }

        // Phase 2: a shared SKU attaches this supplier to the existing product
        if let Some(sku) = record.sku.as_deref() {
            if let Some(existing) = Db::get_product_by_sku(&mut tx, sku).await? {
                Db::upsert_binding(&mut tx, &new_binding(&existing.id, source, record)).await?;
                tx.commit().await?;
                return Ok(false);
            }
        }

        // Phase 3: brand-new product with its first binding
        let mut product = CatalogProduct::new();
        product.sku = record.sku.clone();
        apply_record(&mut product, record, result, pack_attribute);
        Db::insert_product(&mut tx, &product).await?;
        Db::upsert_binding(&mut tx, &new_binding(&product.id, source, record)).await?;
        tx.commit().await?;
        Ok(true)
    }
}

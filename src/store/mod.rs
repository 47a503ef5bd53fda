//! Staging and catalog storage using SQLite
//!
//! This module handles all persistent state:
//! - Staged records (raw feed products with change-detection checksums)
//! - Category rules and exclusions (mapping curation)
//! - Mapping log (per-resolution audit trail)
//! - Products and product sources (the normalized catalog)
//! - Sync runs (history and stats)

mod checksum;
mod schema;

pub use checksum::*;
pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{MatchResult, RawProductRecord};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, Transaction};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Sync run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(Error::Other(format!("Unknown run status: {}", s))),
        }
    }
}

/// Per-record staging outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Staging counters for one sync
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UpsertCounts {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl UpsertCounts {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged + self.failed
    }

    pub fn merge(&mut self, other: &UpsertCounts) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
    }
}

/// A staged feed record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StagedRecord {
    pub id: String,
    pub source: String,
    pub feed_id: String,
    pub sku: Option<String>,
    pub gtin: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub price_purchase: Option<String>,
    pub price_retail: Option<String>,
    pub weight_grams: Option<i64>,
    pub availability: Option<String>,
    pub condition: Option<String>,
    pub categories_json: String,
    pub images_json: String,
    pub attributes_json: String,
    pub checksum: String,
    pub is_excluded: bool,
    pub exclusion_reason: Option<String>,
    pub imported_at: String,
    pub updated_at: String,
}

impl StagedRecord {
    pub fn new(source: &str, rec: &RawProductRecord) -> Result<Self> {
        let now = Utc::now().to_rfc3339();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            feed_id: rec.feed_id.clone(),
            sku: rec.sku.clone(),
            gtin: rec.gtin.clone(),
            title: rec.title.clone(),
            description: rec.description.clone(),
            link: rec.link.clone(),
            price_purchase: rec.price_purchase.map(|p| p.to_string()),
            price_retail: rec.price_retail.map(|p| p.to_string()),
            weight_grams: rec.weight_grams,
            availability: rec.availability.clone(),
            condition: rec.condition.clone(),
            categories_json: serde_json::to_string(&rec.categories)?,
            images_json: serde_json::to_string(&rec.images)?,
            attributes_json: serde_json::to_string(&rec.attributes)?,
            checksum: record_checksum(rec)?,
            is_excluded: false,
            exclusion_reason: None,
            imported_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn purchase_price(&self) -> Option<Decimal> {
        self.price_purchase.as_deref().and_then(|p| p.parse().ok())
    }

    pub fn retail_price(&self) -> Option<Decimal> {
        self.price_retail.as_deref().and_then(|p| p.parse().ok())
    }

    pub fn categories(&self) -> Vec<crate::models::Category> {
        serde_json::from_str(&self.categories_json).unwrap_or_default()
    }

    pub fn images(&self) -> Vec<String> {
        serde_json::from_str(&self.images_json).unwrap_or_default()
    }

    pub fn attributes(&self) -> BTreeMap<String, String> {
        serde_json::from_str(&self.attributes_json).unwrap_or_default()
    }

    /// Name of the deepest stored category, if usable.
    pub fn deepest_category_name(&self) -> Option<String> {
        self.categories()
            .last()
            .and_then(|c| c.name.clone())
            .filter(|n| !n.trim().is_empty())
    }
}

/// A category mapping rule
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CategoryRule {
    pub id: i64,
    pub source: String,
    pub source_category_exact: Option<String>,
    pub source_category_pattern: Option<String>,
    pub title_pattern: Option<String>,
    pub target_category_id: i64,
    pub priority: i64,
    pub is_active: bool,
    pub created_at: String,
}

/// Fields for a rule being created
#[derive(Debug, Clone, Default)]
pub struct NewCategoryRule {
    pub source: String,
    pub source_category_exact: Option<String>,
    pub source_category_pattern: Option<String>,
    pub title_pattern: Option<String>,
    pub target_category_id: i64,
    pub priority: i64,
}

/// A category exclusion
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CategoryExclusion {
    pub id: i64,
    pub source: String,
    pub pattern: String,
    pub is_active: bool,
    pub created_at: String,
}

/// Per-source mapping statistics
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MappingStats {
    pub exact: i64,
    pub pattern: i64,
    pub title: i64,
    pub unmapped: i64,
    pub excluded: i64,
}

impl MappingStats {
    pub fn total(&self) -> i64 {
        self.exact + self.pattern + self.title + self.unmapped + self.excluded
    }

    pub fn matched(&self) -> i64 {
        self.exact + self.pattern + self.title
    }

    pub fn matched_percent(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.matched() as f64 * 100.0 / total as f64
        }
    }
}

/// A catalog product
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: String,
    pub sku: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub price_cost: Option<String>,
    pub price_b2b: Option<String>,
    pub margin_percent: Option<String>,
    pub weight_kg: Option<String>,
    pub pack_quantity: Option<i64>,
    pub images_json: Option<String>,
    pub attributes_json: Option<String>,
    pub stock_status: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl CatalogProduct {
    pub fn new() -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            sku: None,
            name: None,
            description: None,
            category_id: None,
            price_cost: None,
            price_b2b: None,
            margin_percent: None,
            weight_kg: None,
            pack_quantity: None,
            images_json: None,
            attributes_json: None,
            stock_status: crate::models::StockStatus::InStock.to_string(),
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

impl Default for CatalogProduct {
    fn default() -> Self {
        Self::new()
    }
}

/// A supplier binding for a catalog product
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProductSource {
    pub id: String,
    pub product_id: String,
    pub source: String,
    pub source_id: String,
    pub source_sku: Option<String>,
    pub last_price_purchase: Option<String>,
    pub last_price_retail: Option<String>,
    pub is_primary: bool,
    pub priority: i64,
    pub is_active: bool,
    pub first_seen_at: String,
    pub last_seen_at: String,
}

impl ProductSource {
    pub fn new(product_id: String, source: String, source_id: String) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            product_id,
            source,
            source_id,
            source_sku: None,
            last_price_purchase: None,
            last_price_retail: None,
            is_primary: true,
            priority: 1,
            is_active: true,
            first_seen_at: now.clone(),
            last_seen_at: now,
        }
    }
}

/// A sync run record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: String,
    pub source: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub records_inserted: i64,
    pub records_updated: i64,
    pub records_unchanged: i64,
    pub records_failed: i64,
    pub feed_checksum: Option<String>,
    pub error_message: Option<String>,
}

impl SyncRun {
    pub fn new(source: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
            status: RunStatus::Running.to_string(),
            records_inserted: 0,
            records_updated: 0,
            records_unchanged: 0,
            records_failed: 0,
            feed_checksum: None,
            error_message: None,
        }
    }
}

/// Database handle
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Connect to the database using config
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(&config.paths.db_file).await
    }

    /// Connect with a path directly, initializing the schema if needed
    pub async fn new(db_path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };

        if !db.is_initialized().await? {
            db.init_schema().await?;
        }

        Ok(db)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='staged_records'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    /// Begin a transaction
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    // ===== Staging Operations =====

    /// Stage one record: insert when new, update when the checksum differs,
    /// and leave the row untouched when it matches.
    pub async fn upsert_staged(
        conn: &mut SqliteConnection,
        source: &str,
        rec: &RawProductRecord,
    ) -> Result<UpsertOutcome> {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT checksum FROM staged_records WHERE source = ? AND feed_id = ?")
                .bind(source)
                .bind(&rec.feed_id)
                .fetch_optional(&mut *conn)
                .await?;

        let staged = StagedRecord::new(source, rec)?;

        match existing {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO staged_records (
                        id, source, feed_id, sku, gtin, title, description, link,
                        price_purchase, price_retail, weight_grams, availability, condition,
                        categories_json, images_json, attributes_json, checksum,
                        is_excluded, exclusion_reason, imported_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&staged.id)
                .bind(&staged.source)
                .bind(&staged.feed_id)
                .bind(&staged.sku)
                .bind(&staged.gtin)
                .bind(&staged.title)
                .bind(&staged.description)
                .bind(&staged.link)
                .bind(&staged.price_purchase)
                .bind(&staged.price_retail)
                .bind(staged.weight_grams)
                .bind(&staged.availability)
                .bind(&staged.condition)
                .bind(&staged.categories_json)
                .bind(&staged.images_json)
                .bind(&staged.attributes_json)
                .bind(&staged.checksum)
                .bind(staged.is_excluded)
                .bind(&staged.exclusion_reason)
                .bind(&staged.imported_at)
                .bind(&staged.updated_at)
                .execute(&mut *conn)
                .await?;
                Ok(UpsertOutcome::Inserted)
            }
            Some((checksum,)) if checksum == staged.checksum => Ok(UpsertOutcome::Unchanged),
            Some(_) => {
                // Content changed: rewrite content columns, keep imported_at
                // and the exclusion flags (normalize re-evaluates those)
                sqlx::query(
                    r#"
                    UPDATE staged_records SET
                        sku = ?, gtin = ?, title = ?, description = ?, link = ?,
                        price_purchase = ?, price_retail = ?, weight_grams = ?,
                        availability = ?, condition = ?,
                        categories_json = ?, images_json = ?, attributes_json = ?,
                        checksum = ?, updated_at = ?
                    WHERE source = ? AND feed_id = ?
                    "#,
                )
                .bind(&staged.sku)
                .bind(&staged.gtin)
                .bind(&staged.title)
                .bind(&staged.description)
                .bind(&staged.link)
                .bind(&staged.price_purchase)
                .bind(&staged.price_retail)
                .bind(staged.weight_grams)
                .bind(&staged.availability)
                .bind(&staged.condition)
                .bind(&staged.categories_json)
                .bind(&staged.images_json)
                .bind(&staged.attributes_json)
                .bind(&staged.checksum)
                .bind(&staged.updated_at)
                .bind(source)
                .bind(&rec.feed_id)
                .execute(&mut *conn)
                .await?;
                Ok(UpsertOutcome::Updated)
            }
        }
    }

    /// Stage a batch of records in one transaction. Per-record failures are
    /// counted, not fatal.
    pub async fn upsert_staged_batch(
        &self,
        source: &str,
        records: &[RawProductRecord],
    ) -> Result<UpsertCounts> {
        let mut tx = self.pool.begin().await?;
        let mut counts = UpsertCounts::default();

        for rec in records {
            match Db::upsert_staged(&mut tx, source, rec).await {
                Ok(UpsertOutcome::Inserted) => counts.inserted += 1,
                Ok(UpsertOutcome::Updated) => counts.updated += 1,
                Ok(UpsertOutcome::Unchanged) => counts.unchanged += 1,
                Err(e) => {
                    warn!("Failed to stage record {}: {}", rec.feed_id, e);
                    counts.failed += 1;
                }
            }
        }

        tx.commit().await?;
        Ok(counts)
    }

    /// Get a staged record
    pub async fn get_staged(&self, source: &str, feed_id: &str) -> Result<Option<StagedRecord>> {
        let rec = sqlx::query_as::<_, StagedRecord>(
            "SELECT * FROM staged_records WHERE source = ? AND feed_id = ?",
        )
        .bind(source)
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    /// List non-excluded staged records for a source, in feed-id order
    pub async fn list_staged_active(&self, source: &str) -> Result<Vec<StagedRecord>> {
        let recs = sqlx::query_as::<_, StagedRecord>(
            "SELECT * FROM staged_records WHERE source = ? AND is_excluded = 0 ORDER BY feed_id",
        )
        .bind(source)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    /// Mark a staged record excluded. Re-syncs preserve the flag.
    pub async fn mark_staged_excluded(
        &self,
        source: &str,
        feed_id: &str,
        reason: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE staged_records SET is_excluded = 1, exclusion_reason = ? WHERE source = ? AND feed_id = ?",
        )
        .bind(reason)
        .bind(source)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Count staged records for a source
    pub async fn count_staged(&self, source: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM staged_records WHERE source = ?")
            .bind(source)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Count excluded staged records for a source
    pub async fn count_staged_excluded(&self, source: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM staged_records WHERE source = ? AND is_excluded = 1",
        )
        .bind(source)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // ===== Rule Operations =====

    /// List active rules, optionally for one source, in match order
    pub async fn list_rules(&self, source: Option<&str>) -> Result<Vec<CategoryRule>> {
        let rules = match source {
            Some(src) => {
                sqlx::query_as::<_, CategoryRule>(
                    "SELECT * FROM category_rules WHERE source = ? AND is_active = 1 ORDER BY priority, id",
                )
                .bind(src)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, CategoryRule>(
                    "SELECT * FROM category_rules WHERE is_active = 1 ORDER BY source, priority, id",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rules)
    }

    /// Insert a rule, returning its id
    pub async fn insert_rule(&self, rule: &NewCategoryRule) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO category_rules (
                source, source_category_exact, source_category_pattern, title_pattern,
                target_category_id, priority, is_active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(&rule.source)
        .bind(&rule.source_category_exact)
        .bind(&rule.source_category_pattern)
        .bind(&rule.title_pattern)
        .bind(rule.target_category_id)
        .bind(rule.priority)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Deactivate a rule. The row stays for the mapping-log audit trail.
    pub async fn deactivate_rule(&self, id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE category_rules SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::RuleNotFound(id));
        }
        Ok(())
    }

    /// List active exclusions, optionally for one source
    pub async fn list_exclusions(&self, source: Option<&str>) -> Result<Vec<CategoryExclusion>> {
        let exclusions = match source {
            Some(src) => {
                sqlx::query_as::<_, CategoryExclusion>(
                    "SELECT * FROM category_exclusions WHERE source = ? AND is_active = 1 ORDER BY id",
                )
                .bind(src)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, CategoryExclusion>(
                    "SELECT * FROM category_exclusions WHERE is_active = 1 ORDER BY source, id",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(exclusions)
    }

    /// Insert an exclusion, returning its id
    pub async fn insert_exclusion(&self, source: &str, pattern: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO category_exclusions (source, pattern, is_active, created_at) VALUES (?, ?, 1, ?)",
        )
        .bind(source)
        .bind(pattern)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Deactivate an exclusion
    pub async fn deactivate_exclusion(&self, id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE category_exclusions SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::RuleNotFound(id));
        }
        Ok(())
    }

    // ===== Mapping Log Operations =====

    /// Append one resolution to the mapping log
    pub async fn insert_mapping_log(
        &self,
        source: &str,
        source_product_id: &str,
        source_sku: Option<&str>,
        source_category: Option<&str>,
        result: &MatchResult,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO mapping_log (
                source, source_product_id, source_sku, source_category,
                matched_rule_id, target_category_id, match_type, mapped_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(source)
        .bind(source_product_id)
        .bind(source_sku)
        .bind(source_category)
        .bind(result.matched_rule_id)
        .bind(result.target_category_id)
        .bind(result.match_type.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mapping statistics for a source, grouped by match type
    pub async fn mapping_stats(&self, source: &str) -> Result<MappingStats> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT match_type, COUNT(*) FROM mapping_log WHERE source = ? GROUP BY match_type",
        )
        .bind(source)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = MappingStats::default();
        for (match_type, count) in rows {
            match match_type.as_str() {
                "exact" => stats.exact = count,
                "pattern" => stats.pattern = count,
                "title" => stats.title = count,
                "unmapped" => stats.unmapped = count,
                "excluded" => stats.excluded = count,
                other => warn!("Unknown match type in mapping log: {}", other),
            }
        }
        Ok(stats)
    }

    // ===== Catalog Operations =====
    //
    // These run inside a caller-held transaction so one staged record maps
    // to exactly one atomic set of catalog writes.

    /// Look up the binding for a supplier record
    pub async fn get_binding(
        conn: &mut SqliteConnection,
        source: &str,
        source_id: &str,
    ) -> Result<Option<ProductSource>> {
        let binding = sqlx::query_as::<_, ProductSource>(
            "SELECT * FROM product_sources WHERE source = ? AND source_id = ?",
        )
        .bind(source)
        .bind(source_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(binding)
    }

    /// Look up a product by SKU
    pub async fn get_product_by_sku(
        conn: &mut SqliteConnection,
        sku: &str,
    ) -> Result<Option<CatalogProduct>> {
        let product = sqlx::query_as::<_, CatalogProduct>("SELECT * FROM products WHERE sku = ?")
            .bind(sku)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(product)
    }

    /// Insert a catalog product
    pub async fn insert_product(
        conn: &mut SqliteConnection,
        product: &CatalogProduct,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, description, category_id, price_cost, price_b2b,
                margin_percent, weight_kg, pack_quantity, images_json, attributes_json,
                stock_status, is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.category_id)
        .bind(&product.price_cost)
        .bind(&product.price_b2b)
        .bind(&product.margin_percent)
        .bind(&product.weight_kg)
        .bind(product.pack_quantity)
        .bind(&product.images_json)
        .bind(&product.attributes_json)
        .bind(&product.stock_status)
        .bind(product.is_active)
        .bind(&product.created_at)
        .bind(&product.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Update a catalog product's feed-derived fields
    pub async fn update_product(
        conn: &mut SqliteConnection,
        product: &CatalogProduct,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE products SET
                name = ?, description = ?, category_id = ?, price_cost = ?,
                price_b2b = ?, margin_percent = ?, weight_kg = ?, pack_quantity = ?,
                images_json = ?, attributes_json = ?, stock_status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.category_id)
        .bind(&product.price_cost)
        .bind(&product.price_b2b)
        .bind(&product.margin_percent)
        .bind(&product.weight_kg)
        .bind(product.pack_quantity)
        .bind(&product.images_json)
        .bind(&product.attributes_json)
        .bind(&product.stock_status)
        .bind(Utc::now().to_rfc3339())
        .bind(&product.id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Insert or refresh a supplier binding
    pub async fn upsert_binding(
        conn: &mut SqliteConnection,
        binding: &ProductSource,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO product_sources (
                id, product_id, source, source_id, source_sku,
                last_price_purchase, last_price_retail, is_primary, priority,
                is_active, first_seen_at, last_seen_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source, source_id) DO UPDATE SET
                source_sku = excluded.source_sku,
                last_price_purchase = excluded.last_price_purchase,
                last_price_retail = excluded.last_price_retail,
                last_seen_at = excluded.last_seen_at
            "#,
        )
        .bind(&binding.id)
        .bind(&binding.product_id)
        .bind(&binding.source)
        .bind(&binding.source_id)
        .bind(&binding.source_sku)
        .bind(&binding.last_price_purchase)
        .bind(&binding.last_price_retail)
        .bind(binding.is_primary)
        .bind(binding.priority)
        .bind(binding.is_active)
        .bind(&binding.first_seen_at)
        .bind(&binding.last_seen_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Update the last-seen prices on a binding
    pub async fn touch_binding(
        conn: &mut SqliteConnection,
        source: &str,
        source_id: &str,
        last_price_purchase: Option<&str>,
        last_price_retail: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE product_sources SET
                last_price_purchase = ?, last_price_retail = ?, last_seen_at = ?
            WHERE source = ? AND source_id = ?
            "#,
        )
        .bind(last_price_purchase)
        .bind(last_price_retail)
        .bind(Utc::now().to_rfc3339())
        .bind(source)
        .bind(source_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Count all catalog products
    pub async fn count_products(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Count catalog products bound to a source
    pub async fn count_source_products(&self, source: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT product_id) FROM product_sources WHERE source = ?",
        )
        .bind(source)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // ===== Sync Run Operations =====

    /// Start a new sync run
    pub async fn start_sync_run(&self, source: &str) -> Result<SyncRun> {
        let run = SyncRun::new(source.to_string());
        sqlx::query(
            r#"
            INSERT INTO sync_runs (
                id, source, started_at, status,
                records_inserted, records_updated, records_unchanged, records_failed
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.source)
        .bind(&run.started_at)
        .bind(&run.status)
        .bind(run.records_inserted)
        .bind(run.records_updated)
        .bind(run.records_unchanged)
        .bind(run.records_failed)
        .execute(&self.pool)
        .await?;
        Ok(run)
    }

    /// Complete a sync run
    pub async fn complete_sync_run(
        &self,
        id: &str,
        status: RunStatus,
        counts: &UpsertCounts,
        feed_checksum: Option<String>,
        error_message: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_runs SET
                completed_at = ?,
                status = ?,
                records_inserted = ?,
                records_updated = ?,
                records_unchanged = ?,
                records_failed = ?,
                feed_checksum = ?,
                error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(status.to_string())
        .bind(counts.inserted as i64)
        .bind(counts.updated as i64)
        .bind(counts.unchanged as i64)
        .bind(counts.failed as i64)
        .bind(feed_checksum)
        .bind(error_message)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get the latest sync run for a source
    pub async fn latest_sync_run(&self, source: &str) -> Result<Option<SyncRun>> {
        let run = sqlx::query_as::<_, SyncRun>(
            "SELECT * FROM sync_runs WHERE source = ? ORDER BY started_at DESC LIMIT 1",
        )
        .bind(source)
        .fetch_optional(&self.pool)
        .await?;
        Ok(run)
    }

    /// List recent sync runs, optionally for one source
    pub async fn list_sync_runs(&self, source: Option<&str>, limit: i64) -> Result<Vec<SyncRun>> {
        let runs = match source {
            Some(src) => {
                sqlx::query_as::<_, SyncRun>(
                    "SELECT * FROM sync_runs WHERE source = ? ORDER BY started_at DESC LIMIT ?",
                )
                .bind(src)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, SyncRun>(
                    "SELECT * FROM sync_runs ORDER BY started_at DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, MatchType};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Db, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = Db::new(&tmp.path().join("test.db")).await.unwrap();
        (db, tmp)
    }

    fn sample_record(feed_id: &str) -> RawProductRecord {
        let mut rec = RawProductRecord {
            feed_id: feed_id.to_string(),
            sku: Some(format!("SKU-{}", feed_id)),
            title: Some("Test Product".to_string()),
            price_purchase: Some(dec!(6.467)),
            price_retail: Some(dec!(11.931)),
            weight_grams: Some(450),
            availability: Some("in stock".to_string()),
            ..Default::default()
        };
        rec.categories.push(Category {
            id: Some("137".to_string()),
            name: Some("Hygiena".to_string()),
        });
        rec.add_attribute("Balenie", "24");
        rec
    }

    #[tokio::test]
    async fn test_staged_insert_then_unchanged() {
        let (db, _tmp) = setup_test_db().await;
        let rec = sample_record("922");

        let counts = db.upsert_staged_batch("acme", &[rec.clone()]).await.unwrap();
        assert_eq!(counts.inserted, 1);
        assert_eq!(counts.total(), 1);

        let staged = db.get_staged("acme", "922").await.unwrap().unwrap();
        let first_updated_at = staged.updated_at.clone();
        assert_eq!(staged.purchase_price(), Some(dec!(6.467)));
        assert_eq!(staged.categories()[0].id.as_deref(), Some("137"));

        // Same content again: no write at all
        let counts = db.upsert_staged_batch("acme", &[rec]).await.unwrap();
        assert_eq!(counts.unchanged, 1);
        assert_eq!(counts.inserted, 0);

        let staged = db.get_staged("acme", "922").await.unwrap().unwrap();
        assert_eq!(staged.updated_at, first_updated_at);
    }

    #[tokio::test]
    async fn test_staged_update_on_changed_content() {
        let (db, _tmp) = setup_test_db().await;
        let mut rec = sample_record("922");

        db.upsert_staged_batch("acme", &[rec.clone()]).await.unwrap();
        let before = db.get_staged("acme", "922").await.unwrap().unwrap();

        rec.price_retail = Some(dec!(12.5));
        let counts = db.upsert_staged_batch("acme", &[rec]).await.unwrap();
        assert_eq!(counts.updated, 1);

        let after = db.get_staged("acme", "922").await.unwrap().unwrap();
        assert_ne!(after.checksum, before.checksum);
        assert_eq!(after.retail_price(), Some(dec!(12.5)));
        assert_eq!(after.imported_at, before.imported_at);
    }

    #[tokio::test]
    async fn test_staged_update_preserves_exclusion() {
        let (db, _tmp) = setup_test_db().await;
        let mut rec = sample_record("922");

        db.upsert_staged_batch("acme", &[rec.clone()]).await.unwrap();
        db.mark_staged_excluded("acme", "922", "Category excluded")
            .await
            .unwrap();

        rec.title = Some("Renamed".to_string());
        db.upsert_staged_batch("acme", &[rec]).await.unwrap();

        let staged = db.get_staged("acme", "922").await.unwrap().unwrap();
        assert!(staged.is_excluded);
        assert_eq!(staged.exclusion_reason.as_deref(), Some("Category excluded"));
        assert!(db.list_staged_active("acme").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_staged_sources_are_isolated() {
        let (db, _tmp) = setup_test_db().await;
        let rec = sample_record("922");

        db.upsert_staged_batch("acme", &[rec.clone()]).await.unwrap();
        let counts = db.upsert_staged_batch("globex", &[rec]).await.unwrap();
        assert_eq!(counts.inserted, 1);

        assert_eq!(db.count_staged("acme").await.unwrap(), 1);
        assert_eq!(db.count_staged("globex").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rule_crud() {
        let (db, _tmp) = setup_test_db().await;

        let id = db
            .insert_rule(&NewCategoryRule {
                source: "acme".to_string(),
                source_category_exact: Some("Hygiena".to_string()),
                target_category_id: 42,
                priority: 10,
                ..Default::default()
            })
            .await
            .unwrap();

        let rules = db.list_rules(Some("acme")).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, id);
        assert_eq!(rules[0].target_category_id, 42);

        db.deactivate_rule(id).await.unwrap();
        assert!(db.list_rules(Some("acme")).await.unwrap().is_empty());

        assert!(matches!(
            db.deactivate_rule(9999).await,
            Err(Error::RuleNotFound(9999))
        ));
    }

    #[tokio::test]
    async fn test_exclusion_crud() {
        let (db, _tmp) = setup_test_db().await;

        let id = db.insert_exclusion("acme", "Tabak%").await.unwrap();
        let exclusions = db.list_exclusions(Some("acme")).await.unwrap();
        assert_eq!(exclusions.len(), 1);
        assert_eq!(exclusions[0].pattern, "Tabak%");

        db.deactivate_exclusion(id).await.unwrap();
        assert!(db.list_exclusions(Some("acme")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mapping_log_stats() {
        let (db, _tmp) = setup_test_db().await;

        let exact = MatchResult {
            target_category_id: Some(42),
            matched_rule_id: Some(1),
            match_type: MatchType::Exact,
        };
        db.insert_mapping_log("acme", "1", None, Some("Hygiena"), &exact)
            .await
            .unwrap();
        db.insert_mapping_log("acme", "2", None, Some("Hygiena"), &exact)
            .await
            .unwrap();
        db.insert_mapping_log("acme", "3", None, None, &MatchResult::unmapped())
            .await
            .unwrap();

        let stats = db.mapping_stats("acme").await.unwrap();
        assert_eq!(stats.exact, 2);
        assert_eq!(stats.unmapped, 1);
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.matched(), 2);
        assert!((stats.matched_percent() - 66.66).abs() < 0.1);

        // Other sources see nothing
        assert_eq!(db.mapping_stats("globex").await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_product_and_binding_roundtrip() {
        let (db, _tmp) = setup_test_db().await;

        let mut product = CatalogProduct::new();
        product.sku = Some("SKU123".to_string());
        product.name = Some("Test Product".to_string());
        product.price_b2b = Some("11.931".to_string());

        let mut tx = db.begin().await.unwrap();
        Db::insert_product(&mut tx, &product).await.unwrap();

        let mut binding =
            ProductSource::new(product.id.clone(), "acme".to_string(), "922".to_string());
        binding.source_sku = Some("SKU123".to_string());
        binding.last_price_retail = Some("11.931".to_string());
        Db::upsert_binding(&mut tx, &binding).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let found = Db::get_binding(&mut tx, "acme", "922").await.unwrap().unwrap();
        assert_eq!(found.product_id, product.id);

        let by_sku = Db::get_product_by_sku(&mut tx, "SKU123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_sku.id, product.id);

        // Conflicting binding insert refreshes last-seen prices
        let mut refresh =
            ProductSource::new(product.id.clone(), "acme".to_string(), "922".to_string());
        refresh.last_price_retail = Some("12.5".to_string());
        Db::upsert_binding(&mut tx, &refresh).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let found = Db::get_binding(&mut tx, "acme", "922").await.unwrap().unwrap();
        assert_eq!(found.last_price_retail.as_deref(), Some("12.5"));
        // Identity of the original binding row is preserved
        assert_eq!(found.id, binding.id);
        tx.commit().await.unwrap();

        assert_eq!(db.count_products().await.unwrap(), 1);
        assert_eq!(db.count_source_products("acme").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sync_run_lifecycle() {
        let (db, _tmp) = setup_test_db().await;

        let run = db.start_sync_run("acme").await.unwrap();
        let latest = db.latest_sync_run("acme").await.unwrap().unwrap();
        assert_eq!(latest.id, run.id);
        assert_eq!(latest.status, "running");

        let counts = UpsertCounts {
            inserted: 10,
            updated: 2,
            unchanged: 88,
            failed: 1,
        };
        db.complete_sync_run(
            &run.id,
            RunStatus::Completed,
            &counts,
            Some("abc123".to_string()),
            None,
        )
        .await
        .unwrap();

        let latest = db.latest_sync_run("acme").await.unwrap().unwrap();
        assert_eq!(latest.status, "completed");
        assert_eq!(latest.records_inserted, 10);
        assert_eq!(latest.records_unchanged, 88);
        assert_eq!(latest.feed_checksum.as_deref(), Some("abc123"));
        assert!(latest.completed_at.is_some());

        let runs = db.list_sync_runs(Some("acme"), 10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(db.list_sync_runs(None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_run_records_error() {
        let (db, _tmp) = setup_test_db().await;

        let run = db.start_sync_run("acme").await.unwrap();
        db.complete_sync_run(
            &run.id,
            RunStatus::Failed,
            &UpsertCounts::default(),
            None,
            Some("feed download failed: HTTP 500".to_string()),
        )
        .await
        .unwrap();

        let latest = db.latest_sync_run("acme").await.unwrap().unwrap();
        assert_eq!(latest.status, "failed");
        assert!(latest
            .error_message
            .as_deref()
            .unwrap()
            .contains("HTTP 500"));
    }
}

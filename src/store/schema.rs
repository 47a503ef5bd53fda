//! SQLite schema definition

/// SQL schema for the stockroom database
pub const SCHEMA_SQL: &str = r#"
-- Staged records: raw feed products with change-detection checksums
CREATE TABLE IF NOT EXISTS staged_records (
    id TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    feed_id TEXT NOT NULL,
    sku TEXT,
    gtin TEXT,
    title TEXT,
    description TEXT,
    link TEXT,
    price_purchase TEXT,
    price_retail TEXT,
    weight_grams INTEGER,
    availability TEXT,
    condition TEXT,
    categories_json TEXT NOT NULL,
    images_json TEXT NOT NULL,
    attributes_json TEXT NOT NULL,
    checksum TEXT NOT NULL,
    is_excluded INTEGER NOT NULL DEFAULT 0,
    exclusion_reason TEXT,
    imported_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(source, feed_id)
);

-- Category rules: how supplier categories map to catalog categories
CREATE TABLE IF NOT EXISTS category_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    source_category_exact TEXT,
    source_category_pattern TEXT,
    title_pattern TEXT,
    target_category_id INTEGER NOT NULL,
    priority INTEGER NOT NULL DEFAULT 100,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

-- Category exclusions: supplier categories never imported
CREATE TABLE IF NOT EXISTS category_exclusions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    pattern TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

-- Mapping log: one row per resolution, the audit trail for rule tuning
CREATE TABLE IF NOT EXISTS mapping_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    source_product_id TEXT,
    source_sku TEXT,
    source_category TEXT,
    matched_rule_id INTEGER,
    target_category_id INTEGER,
    match_type TEXT NOT NULL,
    mapped_at TEXT NOT NULL
);

-- Products: the normalized catalog
CREATE TABLE IF NOT EXISTS products (
    id TEXT PRIMARY KEY,
    sku TEXT UNIQUE,
    name TEXT,
    description TEXT,
    category_id INTEGER,
    price_cost TEXT,
    price_b2b TEXT,
    margin_percent TEXT,
    weight_kg TEXT,
    pack_quantity INTEGER,
    images_json TEXT,
    attributes_json TEXT,
    stock_status TEXT NOT NULL DEFAULT 'instock',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Product sources: which supplier record feeds which product
CREATE TABLE IF NOT EXISTS product_sources (
    id TEXT PRIMARY KEY,
    product_id TEXT NOT NULL REFERENCES products(id),
    source TEXT NOT NULL,
    source_id TEXT NOT NULL,
    source_sku TEXT,
    last_price_purchase TEXT,
    last_price_retail TEXT,
    is_primary INTEGER NOT NULL DEFAULT 1,
    priority INTEGER NOT NULL DEFAULT 1,
    is_active INTEGER NOT NULL DEFAULT 1,
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    UNIQUE(source, source_id)
);

-- Sync runs: tracking history
CREATE TABLE IF NOT EXISTS sync_runs (
    id TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    records_inserted INTEGER DEFAULT 0,
    records_updated INTEGER DEFAULT 0,
    records_unchanged INTEGER DEFAULT 0,
    records_failed INTEGER DEFAULT 0,
    feed_checksum TEXT,
    error_message TEXT
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_staged_source ON staged_records(source);
CREATE INDEX IF NOT EXISTS idx_staged_excluded ON staged_records(source, is_excluded);
CREATE INDEX IF NOT EXISTS idx_rules_source ON category_rules(source);
CREATE INDEX IF NOT EXISTS idx_exclusions_source ON category_exclusions(source);
CREATE INDEX IF NOT EXISTS idx_mapping_log_source ON mapping_log(source, match_type);
CREATE INDEX IF NOT EXISTS idx_product_sources_product ON product_sources(product_id);
CREATE INDEX IF NOT EXISTS idx_runs_source ON sync_runs(source);
"#;

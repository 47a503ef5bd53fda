//! Shared domain types: parsed feed records, category match outcomes, stock status.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One product as parsed from a supplier feed, before staging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawProductRecord {
    /// Supplier-side product identifier (the `<id>` element)
    pub feed_id: String,
    pub sku: Option<String>,
    pub gtin: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub price_purchase: Option<Decimal>,
    pub price_retail: Option<Decimal>,
    pub weight_grams: Option<i64>,
    pub availability: Option<String>,
    pub condition: Option<String>,
    /// Category path, outermost first
    pub categories: Vec<Category>,
    pub images: Vec<String>,
    /// Sorted by name so serialization is deterministic
    pub attributes: BTreeMap<String, String>,
}

impl RawProductRecord {
    /// Add an image URL, ignoring blanks.
    pub fn add_image(&mut self, url: &str) {
        let url = url.trim();
        if !url.is_empty() {
            self.images.push(url.to_string());
        }
    }

    /// Add a named attribute. Both name and value are required.
    pub fn add_attribute(&mut self, name: &str, value: &str) {
        if !name.is_empty() && !value.is_empty() {
            self.attributes.insert(name.to_string(), value.to_string());
        }
    }

    /// Name of the deepest (last) category in the path, if usable.
    pub fn deepest_category_name(&self) -> Option<&str> {
        self.categories
            .last()
            .and_then(|c| c.name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// One step in a feed category path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// How a staged record was matched to a target category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Pattern,
    Title,
    Unmapped,
    Excluded,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchType::Exact => write!(f, "exact"),
            MatchType::Pattern => write!(f, "pattern"),
            MatchType::Title => write!(f, "title"),
            MatchType::Unmapped => write!(f, "unmapped"),
            MatchType::Excluded => write!(f, "excluded"),
        }
    }
}

impl FromStr for MatchType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(MatchType::Exact),
            "pattern" => Ok(MatchType::Pattern),
            "title" => Ok(MatchType::Title),
            "unmapped" => Ok(MatchType::Unmapped),
            "excluded" => Ok(MatchType::Excluded),
            _ => Err(crate::error::Error::Other(format!(
                "Unknown match type: {}",
                s
            ))),
        }
    }
}

/// Outcome of resolving one record against the mapping rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub target_category_id: Option<i64>,
    pub matched_rule_id: Option<i64>,
    pub match_type: MatchType,
}

impl MatchResult {
    pub fn unmapped() -> Self {
        Self {
            target_category_id: None,
            matched_rule_id: None,
            match_type: MatchType::Unmapped,
        }
    }

    pub fn excluded() -> Self {
        Self {
            target_category_id: None,
            matched_rule_id: None,
            match_type: MatchType::Excluded,
        }
    }

    /// Matched means a target category was assigned.
    pub fn is_matched(&self) -> bool {
        self.target_category_id.is_some()
            && !matches!(self.match_type, MatchType::Unmapped | MatchType::Excluded)
    }

    pub fn is_excluded(&self) -> bool {
        self.match_type == MatchType::Excluded
    }
}

/// Catalog stock status derived from feed availability text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    InStock,
    OutOfStock,
    OnBackorder,
}

impl StockStatus {
    /// Map feed availability text. Unknown or missing values default to in stock.
    pub fn from_availability(availability: Option<&str>) -> Self {
        match availability.map(|a| a.trim().to_lowercase()).as_deref() {
            Some("in stock") | Some("in_stock") => StockStatus::InStock,
            Some("out of stock") | Some("out_of_stock") => StockStatus::OutOfStock,
            Some("preorder") | Some("pre-order") => StockStatus::OnBackorder,
            _ => StockStatus::InStock,
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockStatus::InStock => write!(f, "instock"),
            StockStatus::OutOfStock => write!(f, "outofstock"),
            StockStatus::OnBackorder => write!(f, "onbackorder"),
        }
    }
}

impl FromStr for StockStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instock" => Ok(StockStatus::InStock),
            "outofstock" => Ok(StockStatus::OutOfStock),
            "onbackorder" => Ok(StockStatus::OnBackorder),
            _ => Err(crate::error::Error::Other(format!(
                "Unknown stock status: {}",
                s
            ))),
        }
    }
}

//! Category mapping: wildcard rules resolved in strict precedence order.
//!
//! Rules and exclusions use SQL-LIKE-style patterns (`%` matches any run of
//! characters, `_` exactly one). The matcher compiles them once per source
//! and resolves records in memory, so a normalize pass never queries the
//! rule tables per record.

use crate::error::Result;
use crate::models::{MatchResult, MatchType};
use crate::store::{CategoryRule, Db};
use regex::Regex;
use tracing::debug;

/// Compile a wildcard pattern to an anchored regex.
fn like_to_regex(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    if case_insensitive {
        re.push_str("(?i)");
    }
    re.push('^');
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Ok(Regex::new(&re)?)
}

struct CompiledRule {
    rule: CategoryRule,
    category_regex: Option<Regex>,
    title_regex: Option<Regex>,
}

/// Resolves feed categories to catalog categories for one source.
pub struct CategoryMatcher {
    exclusions: Vec<Regex>,
    // Kept in (priority, id) order so the first hit of each pass wins
    rules: Vec<CompiledRule>,
}

impl CategoryMatcher {
    /// Load and compile the active exclusions and rules for a source.
    pub async fn load(db: &Db, source: &str) -> Result<Self> {
        let mut exclusions = Vec::new();
        for exclusion in db.list_exclusions(Some(source)).await? {
            exclusions.push(like_to_regex(&exclusion.pattern, false)?);
        }

        let mut rules = Vec::new();
        for rule in db.list_rules(Some(source)).await? {
            rules.push(CompiledRule {
                category_regex: rule
                    .source_category_pattern
                    .as_deref()
                    .map(|p| like_to_regex(p, false))
                    .transpose()?,
                title_regex: rule
                    .title_pattern
                    .as_deref()
                    .map(|p| like_to_regex(p, true))
                    .transpose()?,
                rule,
            });
        }

        debug!(
            "Loaded {} rules and {} exclusions for source {}",
            rules.len(),
            exclusions.len(),
            source
        );

        Ok(Self { exclusions, rules })
    }

    /// Resolve one record. Precedence: exclusion, exact category, category
    /// pattern, title pattern, unmapped. Each pass scans all rules before
    /// the next one runs.
    pub fn match_category(&self, category: Option<&str>, title: Option<&str>) -> MatchResult {
        if let Some(cat) = category {
            if self.exclusions.iter().any(|re| re.is_match(cat)) {
                return MatchResult::excluded();
            }

            for compiled in &self.rules {
                if compiled.rule.source_category_exact.as_deref() == Some(cat) {
                    return Self::hit(&compiled.rule, MatchType::Exact);
                }
            }

            for compiled in &self.rules {
                if let Some(re) = &compiled.category_regex {
                    if re.is_match(cat) {
                        return Self::hit(&compiled.rule, MatchType::Pattern);
                    }
                }
            }
        }

        if let Some(title) = title {
            for compiled in &self.rules {
                if let Some(re) = &compiled.title_regex {
                    if re.is_match(title) {
                        return Self::hit(&compiled.rule, MatchType::Title);
                    }
                }
            }
        }

        MatchResult::unmapped()
    }

    fn hit(rule: &CategoryRule, match_type: MatchType) -> MatchResult {
        MatchResult {
            target_category_id: Some(rule.target_category_id),
            matched_rule_id: Some(rule.id),
            match_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewCategoryRule;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Db, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = Db::new(&tmp.path().join("test.db")).await.unwrap();
        (db, tmp)
    }

    fn exact_rule(source: &str, category: &str, target: i64, priority: i64) -> NewCategoryRule {
        NewCategoryRule {
            source: source.to_string(),
            source_category_exact: Some(category.to_string()),
            target_category_id: target,
            priority,
            ..Default::default()
        }
    }

    #[test]
    fn test_like_to_regex_wildcards() {
        let re = like_to_regex("Kuchyňa%", false).unwrap();
        assert!(re.is_match("Kuchyňa"));
        assert!(re.is_match("Kuchyňa > Rúry"));
        assert!(!re.is_match("Dom > Kuchyňa"));

        let re = like_to_regex("%papier%", false).unwrap();
        assert!(re.is_match("Toaletný papier dvojvrstvový"));
        assert!(!re.is_match("Toaletný PAPIER"));

        let re = like_to_regex("SKU_", false).unwrap();
        assert!(re.is_match("SKU1"));
        assert!(!re.is_match("SKU12"));
        assert!(!re.is_match("SKU"));
    }

    #[test]
    fn test_like_to_regex_escapes_metachars() {
        let re = like_to_regex("a.b", false).unwrap();
        assert!(re.is_match("a.b"));
        assert!(!re.is_match("axb"));

        let re = like_to_regex("(vat 20%)", false).unwrap();
        assert!(re.is_match("(vat 20€)"));
    }

    #[test]
    fn test_like_to_regex_case_insensitive() {
        let re = like_to_regex("%PAPIER%", true).unwrap();
        assert!(re.is_match("Toaletný papier"));
    }

    #[tokio::test]
    async fn test_exclusion_beats_exact() {
        let (db, _tmp) = setup_test_db().await;
        db.insert_exclusion("acme", "Tabak%").await.unwrap();
        db.insert_rule(&exact_rule("acme", "Tabakové výrobky", 42, 10))
            .await
            .unwrap();

        let matcher = CategoryMatcher::load(&db, "acme").await.unwrap();
        let result = matcher.match_category(Some("Tabakové výrobky"), None);
        assert!(result.is_excluded());
        assert_eq!(result.target_category_id, None);
    }

    #[tokio::test]
    async fn test_exact_beats_pattern_regardless_of_priority() {
        let (db, _tmp) = setup_test_db().await;
        db.insert_rule(&NewCategoryRule {
            source: "acme".to_string(),
            source_category_pattern: Some("Hyg%".to_string()),
            target_category_id: 100,
            priority: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        db.insert_rule(&exact_rule("acme", "Hygiena", 200, 50))
            .await
            .unwrap();

        let matcher = CategoryMatcher::load(&db, "acme").await.unwrap();
        let result = matcher.match_category(Some("Hygiena"), None);
        assert_eq!(result.match_type, MatchType::Exact);
        assert_eq!(result.target_category_id, Some(200));

        // Non-exact name falls through to the pattern
        let result = matcher.match_category(Some("Hygiena > Papier"), None);
        assert_eq!(result.match_type, MatchType::Pattern);
        assert_eq!(result.target_category_id, Some(100));
    }

    #[tokio::test]
    async fn test_priority_then_id_tie_break() {
        let (db, _tmp) = setup_test_db().await;
        let first = db.insert_rule(&exact_rule("acme", "Hygiena", 1, 10)).await.unwrap();
        db.insert_rule(&exact_rule("acme", "Hygiena", 2, 20))
            .await
            .unwrap();
        let matcher = CategoryMatcher::load(&db, "acme").await.unwrap();
        let result = matcher.match_category(Some("Hygiena"), None);
        assert_eq!(result.matched_rule_id, Some(first));
        assert_eq!(result.target_category_id, Some(1));

        // Same priority: the older rule wins
        let (db, _tmp) = setup_test_db().await;
        let older = db.insert_rule(&exact_rule("acme", "Hygiena", 1, 10)).await.unwrap();
        db.insert_rule(&exact_rule("acme", "Hygiena", 2, 10))
            .await
            .unwrap();
        let matcher = CategoryMatcher::load(&db, "acme").await.unwrap();
        assert_eq!(
            matcher.match_category(Some("Hygiena"), None).matched_rule_id,
            Some(older)
        );
    }

    #[tokio::test]
    async fn test_title_fallback_and_unmapped() {
        let (db, _tmp) = setup_test_db().await;
        db.insert_rule(&NewCategoryRule {
            source: "acme".to_string(),
            title_pattern: Some("%PAPIER%".to_string()),
            target_category_id: 7,
            priority: 100,
            ..Default::default()
        })
        .await
        .unwrap();

        let matcher = CategoryMatcher::load(&db, "acme").await.unwrap();

        let result = matcher.match_category(None, Some("Toaletný papier"));
        assert_eq!(result.match_type, MatchType::Title);
        assert_eq!(result.target_category_id, Some(7));

        assert_eq!(
            matcher.match_category(None, None).match_type,
            MatchType::Unmapped
        );
        assert_eq!(
            matcher
                .match_category(Some("Neznáma kategória"), Some("Neznámy produkt"))
                .match_type,
            MatchType::Unmapped
        );
    }

    #[tokio::test]
    async fn test_missing_category_never_excluded() {
        let (db, _tmp) = setup_test_db().await;
        db.insert_exclusion("acme", "%").await.unwrap();
        db.insert_rule(&NewCategoryRule {
            source: "acme".to_string(),
            title_pattern: Some("%papier%".to_string()),
            target_category_id: 7,
            priority: 100,
            ..Default::default()
        })
        .await
        .unwrap();

        let matcher = CategoryMatcher::load(&db, "acme").await.unwrap();
        let result = matcher.match_category(None, Some("Toaletný papier"));
        assert_eq!(result.match_type, MatchType::Title);
    }

    #[tokio::test]
    async fn test_rules_are_per_source() {
        let (db, _tmp) = setup_test_db().await;
        db.insert_rule(&exact_rule("globex", "Hygiena", 42, 10))
            .await
            .unwrap();

        let matcher = CategoryMatcher::load(&db, "acme").await.unwrap();
        assert_eq!(
            matcher.match_category(Some("Hygiena"), None).match_type,
            MatchType::Unmapped
        );
    }
}

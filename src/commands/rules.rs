//! Rules and exclusions management

use crate::error::{Error, Result};
use crate::store::{CategoryExclusion, CategoryRule, Db, NewCategoryRule};
use tracing::info;

/// List active category rules.
pub async fn cmd_rules_list(db: &Db, supplier: Option<&str>) -> Result<Vec<CategoryRule>> {
    db.list_rules(supplier).await
}

/// Add a category mapping rule.
pub async fn cmd_rules_add(db: &Db, rule: &NewCategoryRule) -> Result<i64> {
    if rule.source_category_exact.is_none()
        && rule.source_category_pattern.is_none()
        && rule.title_pattern.is_none()
    {
        return Err(Error::Config(
            "rule needs --exact, --pattern, or --title".to_string(),
        ));
    }

    let id = db.insert_rule(rule).await?;
    info!("Added rule #{} for {}", id, rule.source);
    Ok(id)
}

/// Deactivate a rule by id.
pub async fn cmd_rules_remove(db: &Db, id: i64) -> Result<()> {
    db.deactivate_rule(id).await?;
    info!("Deactivated rule #{}", id);
    Ok(())
}

/// List active category exclusions.
pub async fn cmd_exclusions_list(
    db: &Db,
    supplier: Option<&str>,
) -> Result<Vec<CategoryExclusion>> {
    db.list_exclusions(supplier).await
}

/// Add a category exclusion pattern.
pub async fn cmd_exclusions_add(db: &Db, supplier: &str, pattern: &str) -> Result<i64> {
    if pattern.trim().is_empty() {
        return Err(Error::Config(
            "exclusion pattern must not be empty".to_string(),
        ));
    }

    let id = db.insert_exclusion(supplier, pattern).await?;
    info!("Added exclusion #{} for {}", id, supplier);
    Ok(id)
}

/// Deactivate an exclusion by id.
pub async fn cmd_exclusions_remove(db: &Db, id: i64) -> Result<()> {
    db.deactivate_exclusion(id).await?;
    info!("Deactivated exclusion #{}", id);
    Ok(())
}

/// Print rules to console
pub fn print_rules(rules: &[CategoryRule]) {
    println!("\n📋 Category Rules\n");

    if rules.is_empty() {
        println!("No active rules. Use 'stockroom rules add' to create one.");
        return;
    }

    for rule in rules {
        println!(
            "• #{} {} (priority {}) -> category {}",
            rule.id, rule.source, rule.priority, rule.target_category_id
        );
        if let Some(exact) = &rule.source_category_exact {
            println!("  Exact: {}", exact);
        }
        if let Some(pattern) = &rule.source_category_pattern {
            println!("  Pattern: {}", pattern);
        }
        if let Some(title) = &rule.title_pattern {
            println!("  Title: {}", title);
        }
        println!();
    }
}

/// Print exclusions to console
pub fn print_exclusions(exclusions: &[CategoryExclusion]) {
    println!("\n🚫 Category Exclusions\n");

    if exclusions.is_empty() {
        println!("No active exclusions. Use 'stockroom exclusions add' to create one.");
        return;
    }

    for exclusion in exclusions {
        println!(
            "• #{} {}: {}",
            exclusion.id, exclusion.source, exclusion.pattern
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Db, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = Db::new(&tmp.path().join("test.db")).await.unwrap();
        (db, tmp)
    }

    #[tokio::test]
    async fn test_rule_needs_a_criterion() {
        let (db, _tmp) = setup_test_db().await;

        let rule = NewCategoryRule {
            source: "acme".to_string(),
            target_category_id: 42,
            priority: 100,
            ..Default::default()
        };
        assert!(matches!(
            cmd_rules_add(&db, &rule).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_rule_lifecycle() {
        let (db, _tmp) = setup_test_db().await;

        let rule = NewCategoryRule {
            source: "acme".to_string(),
            source_category_pattern: Some("Hygiena%".to_string()),
            target_category_id: 42,
            priority: 100,
            ..Default::default()
        };
        let id = cmd_rules_add(&db, &rule).await.unwrap();

        let rules = cmd_rules_list(&db, Some("acme")).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, id);

        cmd_rules_remove(&db, id).await.unwrap();
        assert!(cmd_rules_list(&db, Some("acme")).await.unwrap().is_empty());
        assert!(matches!(
            cmd_rules_remove(&db, id + 1).await,
            Err(Error::RuleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_exclusion_lifecycle() {
        let (db, _tmp) = setup_test_db().await;

        assert!(cmd_exclusions_add(&db, "acme", "  ").await.is_err());

        let id = cmd_exclusions_add(&db, "acme", "Tabak%").await.unwrap();
        let exclusions = cmd_exclusions_list(&db, Some("acme")).await.unwrap();
        assert_eq!(exclusions.len(), 1);
        assert_eq!(exclusions[0].pattern, "Tabak%");

        cmd_exclusions_remove(&db, id).await.unwrap();
        assert!(cmd_exclusions_list(&db, Some("acme"))
            .await
            .unwrap()
            .is_empty());
    }
}

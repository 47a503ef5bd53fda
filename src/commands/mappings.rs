//! Mappings command - category mapping coverage

use crate::config::Config;
use crate::error::Result;
use crate::store::{Db, MappingStats};
use serde::{Deserialize, Serialize};

/// Mapping coverage for one source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingReport {
    pub source: String,
    pub stats: MappingStats,
}

/// Mapping statistics per supplier.
pub async fn cmd_mappings(
    config: &Config,
    db: &Db,
    supplier: Option<&str>,
) -> Result<Vec<MappingReport>> {
    let sources: Vec<String> = match supplier {
        Some(name) => vec![name.to_string()],
        None => config.suppliers.iter().map(|s| s.name.clone()).collect(),
    };

    let mut reports = Vec::with_capacity(sources.len());
    for source in sources {
        let stats = db.mapping_stats(&source).await?;
        reports.push(MappingReport { source, stats });
    }

    Ok(reports)
}

/// Print mapping coverage to console
pub fn print_mappings(reports: &[MappingReport]) {
    println!("\n📈 Mapping Coverage\n");

    if reports.is_empty() {
        println!("No suppliers configured. Add [[suppliers]] entries to the config file.");
        return;
    }

    for report in reports {
        let stats = &report.stats;
        println!("• {}", report.source);
        if stats.total() == 0 {
            println!("  No mapping decisions logged. Run 'stockroom normalize' first.");
            println!();
            continue;
        }
        println!("  Exact: {}", stats.exact);
        println!("  Pattern: {}", stats.pattern);
        println!("  Title: {}", stats.title);
        println!("  Unmapped: {}", stats.unmapped);
        println!("  Excluded: {}", stats.excluded);
        println!("  Matched: {:.1}%", stats.matched_percent());
        println!();
    }
}

//! stockroom CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use stockroom::{
    commands::{
        cmd_exclusions_add, cmd_exclusions_list, cmd_exclusions_remove, cmd_init, cmd_mappings,
        cmd_normalize, cmd_rules_add, cmd_rules_list, cmd_rules_remove, cmd_run, cmd_runs,
        cmd_status, cmd_sync, print_exclusions, print_mappings, print_normalize_reports,
        print_rules, print_run_reports, print_runs, print_status, print_sync_reports,
    },
    config::Config,
    error::Result,
    progress::LogWriterFactory,
    store::{Db, NewCategoryRule},
};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "stockroom")]
#[command(version, about = "Supplier feed ETL for a wholesale product catalog", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize stockroom configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Download supplier feeds and stage their records
    Sync {
        /// Only sync this supplier
        #[arg(short, long)]
        supplier: Option<String>,
    },

    /// Map staged records into the catalog
    Normalize {
        /// Only normalize this supplier
        #[arg(short, long)]
        supplier: Option<String>,
    },

    /// Sync then normalize in one pass
    Run {
        /// Only run this supplier
        #[arg(short, long)]
        supplier: Option<String>,
    },

    /// Show system status
    Status,

    /// List recent sync runs
    Runs {
        /// Only show runs for this supplier
        #[arg(short, long)]
        supplier: Option<String>,

        /// Maximum runs to show
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },

    /// Show category mapping coverage
    Mappings {
        /// Only show coverage for this supplier
        #[arg(short, long)]
        supplier: Option<String>,
    },

    /// Manage category mapping rules
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    /// Manage category exclusions
    Exclusions {
        #[command(subcommand)]
        action: ExclusionsAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum RulesAction {
    /// List active rules
    List {
        /// Only list rules for this supplier
        #[arg(short, long)]
        supplier: Option<String>,
    },

    /// Add a mapping rule
    Add {
        /// Supplier the rule applies to
        #[arg(short, long)]
        supplier: String,

        /// Exact source category to match
        #[arg(long)]
        exact: Option<String>,

        /// SQL LIKE pattern for the source category
        #[arg(long)]
        pattern: Option<String>,

        /// SQL LIKE pattern for the product title (case-insensitive)
        #[arg(long)]
        title: Option<String>,

        /// Target catalog category ID
        #[arg(short, long)]
        target: i64,

        /// Rule priority (lower wins)
        #[arg(long, default_value = "100")]
        priority: i64,
    },

    /// Deactivate a rule
    Remove {
        /// Rule ID (use 'stockroom rules list' to find it)
        id: i64,
    },
}

#[derive(Subcommand)]
enum ExclusionsAction {
    /// List active exclusions
    List {
        /// Only list exclusions for this supplier
        #[arg(short, long)]
        supplier: Option<String>,
    },

    /// Add an exclusion pattern
    Add {
        /// Supplier the exclusion applies to
        #[arg(short, long)]
        supplier: String,

        /// SQL LIKE pattern for the source category
        pattern: String,
    },

    /// Deactivate an exclusion
    Remove {
        /// Exclusion ID (use 'stockroom exclusions list' to find it)
        id: i64,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if matches!(cli.command, Commands::Init { .. }) {
        return handle_init(cli).await;
    }

    // Handle completions command (doesn't need config/db)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "stockroom", &mut std::io::stdout());
        return Ok(());
    }

    // Load configuration
    let config = load_config(cli.config.as_deref())?;

    let db = Db::connect(&config).await?;

    // Handle commands
    match cli.command {
        Commands::Init { .. } => unreachable!(),

        Commands::Sync { supplier } => {
            let reports = cmd_sync(&config, &db, supplier.as_deref()).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                print_sync_reports(&reports);
            }
        }

        Commands::Normalize { supplier } => {
            let reports = cmd_normalize(&config, &db, supplier.as_deref()).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                print_normalize_reports(&reports);
            }
        }

        Commands::Run { supplier } => {
            let reports = cmd_run(&config, &db, supplier.as_deref()).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                print_run_reports(&reports);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, &db).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Runs { supplier, limit } => {
            let runs = cmd_runs(&db, supplier.as_deref(), limit).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else {
                print_runs(&runs);
            }
        }

        Commands::Mappings { supplier } => {
            let reports = cmd_mappings(&config, &db, supplier.as_deref()).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                print_mappings(&reports);
            }
        }

        Commands::Rules { action } => {
            handle_rules(&db, action, cli.json).await?;
        }

        Commands::Exclusions { action } => {
            handle_exclusions(&db, action, cli.json).await?;
        }

        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}

async fn handle_init(cli: Cli) -> Result<()> {
    let Commands::Init { force } = cli.command else {
        unreachable!()
    };

    // A --config pointing at a .toml file initializes its parent directory,
    // a directory path is used as the base directly
    let base_dir = cli.config.map(|path| {
        if path.extension().map_or(false, |e| e == "toml") {
            path.parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir)
        } else {
            path
        }
    });

    let config = cmd_init(base_dir, force).await?;

    println!("✓ stockroom initialized");
    println!("  Config: {}", config.paths.config_file.display());
    println!("  Database: {}", config.paths.db_file.display());
    println!("\nNext steps:");
    println!("  1. Add [[suppliers]] entries to the config file");
    println!("  2. Map categories: stockroom rules add -s acme --exact \"Hygiena\" -t 42");
    println!("  3. Pull feeds: stockroom run");

    Ok(())
}

async fn handle_rules(db: &Db, action: RulesAction, json: bool) -> Result<()> {
    match action {
        RulesAction::List { supplier } => {
            let rules = cmd_rules_list(db, supplier.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rules)?);
            } else {
                print_rules(&rules);
            }
        }
        RulesAction::Add {
            supplier,
            exact,
            pattern,
            title,
            target,
            priority,
        } => {
            let rule = NewCategoryRule {
                source: supplier,
                source_category_exact: exact,
                source_category_pattern: pattern,
                title_pattern: title,
                target_category_id: target,
                priority,
            };
            let id = cmd_rules_add(db, &rule).await?;
            if json {
                println!(r#"{{"id": {}}}"#, id);
            } else {
                println!("✓ Rule #{} added", id);
            }
        }
        RulesAction::Remove { id } => {
            cmd_rules_remove(db, id).await?;
            if json {
                println!(r#"{{"status": "ok"}}"#);
            } else {
                println!("✓ Rule #{} deactivated", id);
            }
        }
    }

    Ok(())
}

async fn handle_exclusions(db: &Db, action: ExclusionsAction, json: bool) -> Result<()> {
    match action {
        ExclusionsAction::List { supplier } => {
            let exclusions = cmd_exclusions_list(db, supplier.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&exclusions)?);
            } else {
                print_exclusions(&exclusions);
            }
        }
        ExclusionsAction::Add { supplier, pattern } => {
            let id = cmd_exclusions_add(db, &supplier, &pattern).await?;
            if json {
                println!(r#"{{"id": {}}}"#, id);
            } else {
                println!("✓ Exclusion #{} added", id);
            }
        }
        ExclusionsAction::Remove { id } => {
            cmd_exclusions_remove(db, id).await?;
            if json {
                println!(r#"{{"status": "ok"}}"#);
            } else {
                println!("✓ Exclusion #{} deactivated", id);
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'stockroom init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}

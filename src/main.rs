use std::{path::PathBuf, sync::Arc};

use chrono::Utc;
use clap::Parser;
use gateway_billing::{
    config::KernelConfig,
    db::DbPool,
    jobs::{run_budget_reset, start_budget_reset_worker},
    observability,
    pricing::{PricingCatalog, microcents_to_dollars},
    services::Services,
};

/// Config file looked up in the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "gateway-billing.toml";

/// Operator CLI for the gateway billing kernel
#[derive(Parser, Debug)]
#[command(version, about = "Gateway billing kernel", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (defaults to ./gateway-billing.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run database migrations and exit
    Migrate,
    /// Run one budget reset pass and exit
    ResetBudgets {
        /// Log what would be reset without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the budget reset worker until interrupted
    Worker,
    /// Price and charge usage rows that were recorded without a cost
    Reconcile {
        /// Maximum number of rows to settle
        #[arg(long, default_value = "1000")]
        limit: u32,
    },
    /// Show the price schedule in force for a model (`provider:model`)
    Price {
        model: String,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config(args.config);

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    match args.command {
        Command::Migrate => run_migrate(&config).await,
        Command::ResetBudgets { dry_run } => run_reset_budgets(config, dry_run).await,
        Command::Worker => run_worker(config).await,
        Command::Reconcile { limit } => run_reconcile(&config, limit).await,
        Command::Price { model } => run_price(&config, &model).await,
    }
}

fn load_config(explicit: Option<PathBuf>) -> KernelConfig {
    let path = match explicit {
        Some(path) => path,
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !default.exists() {
                return KernelConfig::default();
            }
            default
        }
    };

    match KernelConfig::from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

/// Connect to the configured database or exit.
async fn connect(config: &KernelConfig) -> Arc<DbPool> {
    if config.database.is_none() {
        eprintln!("Error: Database is not configured.");
        std::process::exit(1);
    }

    match DbPool::from_config(&config.database).await {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_migrate(config: &KernelConfig) {
    let db = connect(config).await;
    match db.run_migrations().await {
        Ok(()) => tracing::info!("Database migrations completed successfully"),
        Err(e) => {
            tracing::error!(error = %e, "Database migrations failed");
            eprintln!("Error: Database migrations failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_reset_budgets(config: KernelConfig, dry_run: bool) {
    let db = connect(&config).await;
    let mut reset_config = config.jobs.budget_reset;
    reset_config.dry_run |= dry_run;

    match run_budget_reset(&db, &reset_config, Utc::now()).await {
        Ok(result) => {
            println!(
                "examined={} reset={} already_reset={} failed={} dry_run={} duration_ms={}",
                result.examined,
                result.reset,
                result.already_reset,
                result.failed,
                reset_config.dry_run,
                result.duration_ms
            );
            if result.failed > 0 {
                std::process::exit(2);
            }
        }
        Err(e) => {
            eprintln!("Error: Budget reset failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_worker(config: KernelConfig) {
    let db = connect(&config).await;
    let mut reset_config = config.jobs.budget_reset;
    // Running the worker is an explicit request, whatever the config says.
    reset_config.enabled = true;

    tokio::select! {
        _ = start_budget_reset_worker(db, reset_config) => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
            tracing::info!("Shutdown signal received, stopping budget reset worker");
        }
    }
}

async fn run_reconcile(config: &KernelConfig, limit: u32) {
    let db = connect(config).await;
    let services = Services::new(db, &config.billing);

    match services.ledger.reconcile(limit).await {
        Ok(result) => {
            println!(
                "examined={} charged={} already_charged={} unpriced={} failed={} amount=${} duration_ms={}",
                result.examined,
                result.charged,
                result.already_charged,
                result.unpriced,
                result.failed,
                microcents_to_dollars(result.amount_charged),
                result.duration_ms
            );
            if result.failed > 0 {
                std::process::exit(2);
            }
        }
        Err(e) => {
            eprintln!("Error: Reconciliation failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_price(config: &KernelConfig, model: &str) {
    let db = connect(config).await;
    let catalog = PricingCatalog::new(db, config.billing.default_provider.clone());

    let model_ref = match catalog.parse_model(model) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match catalog
        .resolve_price(&model_ref.provider, &model_ref.model, Utc::now())
        .await
    {
        Ok(price) => {
            println!("model:           {}", model_ref);
            println!("effective_from:  {}", price.effective_from);
            println!("input/token:     ${}", price.input_price_per_token);
            println!("output/token:    ${}", price.output_price_per_token);
            println!("cache/token:     ${}", price.cache_price_per_token);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(if e.is_expected() { 3 } else { 1 });
        }
    }
}

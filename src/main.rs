use agriclimate_qa::execution::store::{AGRI_TABLE, CLIMATE_TABLE};
use agriclimate_qa::inventory::DatasetCategory;
use agriclimate_qa::metrics::ServiceMetrics;
use agriclimate_qa::table::display_value;
use agriclimate_qa::{EngineConfig, QaAssistant};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const SAMPLE_ROWS: usize = 10;

#[derive(Parser)]
#[command(name = "agriclimate-qa")]
#[command(about = "Answer agriculture and climate questions from open government data")]
struct Args {
    /// Canonical SQLite store (overrides DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Dataset inventory CSV (overrides INVENTORY_PATH)
    #[arg(long, global = true)]
    inventory: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question in plain language
    Ask {
        question: String,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the dataset inventory
    Datasets,
    /// Show raw rows backing a dataset
    Sample { dataset_id: String },
    /// Check store reachability, API key and inventory
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = EngineConfig::from_env().context("reading configuration")?;
    if let Some(db) = args.db {
        config.db_path = db;
    }
    if let Some(inventory) = args.inventory {
        config.inventory_path = inventory;
    }
    info!(
        "Store: {}, inventory: {}",
        config.db_path.display(),
        config.inventory_path.display()
    );

    let assistant = QaAssistant::new(&config).context("initializing assistant")?;
    let metrics = ServiceMetrics::new();

    match args.command {
        Command::Ask { question, json } => {
            metrics.record_request();
            let response = assistant.resolve(&question).await;
            if response.data_source_tag.starts_with("fallback") || response.data_source_tag == "mock_data" {
                metrics.record_failure();
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.answer_text);
                if !response.citations.is_empty() {
                    println!("\nSources:");
                    for citation in &response.citations {
                        println!("- {} ({}) {}", citation.title, citation.publisher, citation.url);
                    }
                }
                if let Some(suggestion) = &response.suggestion {
                    println!("\nNote: {}", suggestion);
                }
            }
            debug!("Metrics: {:?}", metrics.snapshot());
        }
        Command::Datasets => {
            for source in assistant.inventory().sources() {
                let years = source
                    .available_years
                    .map(|(from, to)| format!("{}-{}", from, to))
                    .unwrap_or_else(|| "n/a".to_string());
                println!(
                    "{:<12} {:<11} {:<9} {:<10} {}",
                    source.dataset_id,
                    format!("{:?}", source.category).to_lowercase(),
                    source.geo_granularity.as_str(),
                    years,
                    source.title
                );
            }
        }
        Command::Sample { dataset_id } => {
            let Some(source) = assistant.inventory().get(&dataset_id) else {
                bail!("unknown dataset '{}'", dataset_id);
            };
            let relation = match source.category {
                DatasetCategory::Agriculture => AGRI_TABLE,
                DatasetCategory::Climate => CLIMATE_TABLE,
                DatasetCategory::Live => {
                    println!("{} is served by the live API; ask a question to fetch its rows.", dataset_id);
                    return Ok(());
                }
                DatasetCategory::Other => bail!("dataset '{}' has no canonical relation", dataset_id),
            };
            let table = assistant.store().sample(relation, SAMPLE_ROWS)?;
            println!("{}", table.columns.join(" | "));
            for row in &table.rows {
                let cells: Vec<String> = table
                    .columns
                    .iter()
                    .map(|c| row.get(c).map(display_value).unwrap_or_default())
                    .collect();
                println!("{}", cells.join(" | "));
            }
        }
        Command::Health => {
            let store_status = match assistant.store().ping() {
                Ok(()) => "ok".to_string(),
                Err(e) => format!("unreachable ({})", e),
            };
            println!("store:     {}", store_status);
            println!(
                "api key:   {}",
                if assistant.live_enabled() { "configured" } else { "missing (live data disabled)" }
            );
            println!("inventory: {} datasets", assistant.inventory().len());
            println!("uptime:    {}s", metrics.snapshot().uptime_secs);
        }
    }

    Ok(())
}

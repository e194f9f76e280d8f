//! Labeler server - sharded human-in-the-loop image/document labeling

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use labeler::config::{Config, ConfigArgs};
use labeler::dataset::DatasetSource;
use labeler::export;
use labeler::models::ExportScope;
use labeler::partition::ShardPlan;
use labeler::session::Session;
use labeler::store::{JsonFileStore, LabelStore, MemoryStore};
use labeler::AppState;

#[derive(Parser)]
#[command(name = "labeler")]
#[command(about = "Sharded image/document labeling server")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the labeling server (default)
    Serve,

    /// Create a sample dataset file if none exists
    Init {
        /// Overwrite an existing dataset file
        #[arg(long)]
        force: bool,
    },

    /// Print the shard layout for the configured dataset
    Shards {
        /// Also show which shard this participant id lands on
        #[arg(short, long)]
        participant: Option<String>,
    },

    /// Write an export from the dataset and saved labels
    Export {
        /// all | mine
        #[arg(long, default_value = "all")]
        scope: ExportScope,

        /// Participant id for `mine`
        #[arg(short, long)]
        participant: Option<String>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "labeler=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_serve(config).await,
        Commands::Init { force } => run_init(&config, force),
        Commands::Shards { participant } => run_shards(&config, participant.as_deref()),
        Commands::Export {
            scope,
            participant,
            output,
        } => run_export(&config, scope, participant.as_deref(), output),
    }
}

async fn run_serve(config: Config) -> anyhow::Result<()> {
    let dataset = DatasetSource::new(&config.data)
        .load()
        .with_context(|| format!("loading dataset {}", config.data.display()))?;
    let store = config.build_store()?;
    let session = Session::open(dataset, store, config.shards)?;
    let state = AppState::new(session);

    let app = labeler::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(
        "Server listening on {} ({} mode)",
        listener.local_addr()?,
        config.mode.as_str()
    );

    axum::serve(listener, app).await?;

    Ok(())
}

fn run_init(config: &Config, force: bool) -> anyhow::Result<()> {
    if config.data.exists() && !force {
        tracing::info!("{} already exists, leaving it alone", config.data.display());
        return Ok(());
    }

    std::fs::create_dir_all("static/images")?;
    let sample = serde_json::json!([
        {
            "image": "static/images/sample1.png",
            "document": "<!DOCTYPE html><html><head><title>数学示例</title></head><body><h1>示例数学内容</h1></body></html>"
        },
        {
            "image": "static/images/sample2.png",
            "document": "<!DOCTYPE html><html><head><title>物理示例</title></head><body><h1>示例物理内容</h1></body></html>"
        }
    ]);
    std::fs::write(&config.data, serde_json::to_string_pretty(&sample)?)?;
    tracing::info!("Wrote sample dataset to {}", config.data.display());
    Ok(())
}

fn run_shards(config: &Config, participant: Option<&str>) -> anyhow::Result<()> {
    let dataset = DatasetSource::new(&config.data).load()?;
    let plan = ShardPlan::new(dataset.len(), config.shards)?;

    for (shard, range) in plan.ranges().into_iter().enumerate() {
        println!("shard {:>3}: [{}, {}) {} items", shard, range.start, range.end, range.len());
    }
    if let Some(id) = participant {
        let assignment = plan.assign(id);
        println!(
            "participant {} -> shard {} [{}, {})",
            id, assignment.shard_index, assignment.range.start, assignment.range.end
        );
    }
    Ok(())
}

fn run_export(
    config: &Config,
    scope: ExportScope,
    participant: Option<&str>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let dataset = DatasetSource::new(&config.data).load()?;
    // Read-only: never rewrite the labels file from here
    let saved = JsonFileStore::new(&config.labels).load_snapshot()?;
    let store: Arc<dyn LabelStore> = Arc::new(MemoryStore::with_seed(saved));
    let session = Session::open(dataset, store, config.shards)?;

    let records = session.export_snapshot(scope, participant, Utc::now())?;
    let json = export::to_json(&records)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)?;
            tracing::info!("Wrote {} records to {}", records.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

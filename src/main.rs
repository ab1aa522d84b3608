use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use okr_planner::api::{self, AppState};
use okr_planner::config::PlannerConfig;
use okr_planner::export;
use okr_planner::pipeline::{Depth, Pipeline};
use okr_planner::reasoning;
use okr_planner::store::SessionStore;
use okr_planner::tracker::{JiraTracker, Reconciler};

#[derive(Parser)]
#[command(name = "okrp")]
#[command(about = "Break objectives down into key results, epics, stories and tasks")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port for HTTP API (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Config file (defaults to the user config directory)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run the whole pipeline for one objective and print the result
    Plan {
        /// The objective to plan for
        objective: String,

        /// Which suggested key result to expand (1-based)
        #[arg(short, long, default_value = "1")]
        key_result: usize,

        /// How far to break the plan down
        #[arg(short, long, value_enum, default_value = "tasks")]
        depth: Depth,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Config file (defaults to the user config directory)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Outline,
}

/// Initialize tracing with output to stderr (for `plan`) or stdout
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "okr_planner=debug,tower_http=debug".into()),
    );

    if use_stderr {
        // Plan mode: stdout carries only the document
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn build_pipeline(config: &PlannerConfig) -> anyhow::Result<Pipeline> {
    let backend = reasoning::create_backend(&config.reasoning)
        .context("Failed to create reasoning backend")?;
    Ok(Pipeline::new(SessionStore::new(), backend)
        .with_stage_timeout(config.reasoning.stage_timeout()))
}

async fn serve(config: PlannerConfig) -> anyhow::Result<()> {
    let pipeline = build_pipeline(&config)?;
    let tracker = JiraTracker::new(Duration::from_secs(config.tracker.request_timeout_secs))
        .context("Failed to create tracker client")?;
    let state = AppState::new(
        pipeline,
        Reconciler::new(std::sync::Arc::new(tracker)),
        config.tracker.clone(),
    );
    let app = api::create_router(state, &config.server);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("OKR planner listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn plan(
    config: PlannerConfig,
    objective: &str,
    key_result: usize,
    depth: Depth,
    format: OutputFormat,
) -> anyhow::Result<()> {
    if key_result == 0 {
        anyhow::bail!("--key-result is 1-based");
    }
    let pipeline = build_pipeline(&config)?;
    let session_id = pipeline.autoplan(objective, key_result - 1, depth).await?;

    let output = match format {
        OutputFormat::Json => pipeline
            .store()
            .read(session_id, export::export_json)??,
        OutputFormat::Outline => {
            let doc = pipeline.store().read(session_id, export::export)?;
            export::render_outline(&doc)
        }
    };
    println!("{}", output.trim_end());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let use_stderr = matches!(cli.command, Some(Commands::Plan { .. }));
    init_tracing(use_stderr);

    match cli.command {
        Some(Commands::Serve { port, host, config }) => {
            let mut config = PlannerConfig::resolve(config.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            serve(config).await?;
        }
        Some(Commands::Plan {
            objective,
            key_result,
            depth,
            format,
            config,
        }) => {
            let config = PlannerConfig::resolve(config.as_deref())?;
            plan(config, &objective, key_result, depth, format).await?;
        }
        None => {
            // Default: start server
            serve(PlannerConfig::resolve(None)?).await?;
        }
    }

    Ok(())
}

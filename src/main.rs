use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use dbs_vector::config::{init_logging, load_settings, resolve_config_path};
use dbs_vector::error::DbsError;
use dbs_vector::http::{build_state, router};
use dbs_vector::ingest::IngestionService;
use dbs_vector::mcp::run_stdio_server;
use dbs_vector::search::{render_results_text, SearchService};

#[derive(Debug, Parser)]
#[command(name = "dbsv")]
#[command(version)]
#[command(about = "Local, Arrow-native hybrid search engine for developer corpora")]
struct Cli {
    /// Path to the YAML config file (falls back to DBS_CONFIG_FILE, then config.yaml).
    #[arg(long, short = 'c', global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest a directory or glob pattern into an engine's table.
    Ingest {
        path: PathBuf,
        #[arg(long, short = 't', default_value = "md")]
        r#type: String,
        #[arg(long, short = 'r')]
        rebuild: bool,
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Run a hybrid search query against an engine's table.
    Search {
        query: String,
        #[arg(long, short = 't', default_value = "md")]
        r#type: String,
        #[arg(long, short = 's')]
        source: Option<String>,
        #[arg(long, short = 'l', default_value_t = 5)]
        limit: usize,
        #[arg(long)]
        min_time: Option<f64>,
    },
    /// Start the HTTP search server.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8000)]
        port: u16,
        #[arg(long)]
        reload: bool,
    },
    /// Start the agent-tool server over stdin/stdout.
    Mcp,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<()> {
    let config_path = resolve_config_path(cli.config_file.as_deref());
    let settings = load_settings(&config_path)?;
    init_logging(&settings.system);

    match cli.command {
        Command::Ingest { path, r#type, rebuild, force } => {
            if rebuild && !force {
                print!(
                    "Are you sure you want to completely rebuild the '{type}' vector store? This will erase all existing data. [y/N] "
                );
                std::io::stdout().flush().ok();
                let mut answer = String::new();
                std::io::stdin().read_line(&mut answer).ok();
                if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
                    anyhow::bail!("aborted rebuild");
                }
            }

            let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
            rt.block_on(async move {
                let service = IngestionService::new(&settings, &r#type).await?;
                let report = service.run(&path, rebuild).await?;
                println!(
                    "Ingest complete: {} new chunks, {} skipped (already indexed)",
                    report.new_chunks, report.skipped_chunks
                );
                Ok::<(), DbsError>(())
            })?;
            Ok(())
        }
        Command::Search { query, r#type, source, limit, min_time } => {
            let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
            rt.block_on(async move {
                let service = SearchService::new(&settings, &r#type).await?;
                let results = service.execute_query(&query, source.as_deref(), limit, min_time).await?;
                println!("{}", render_results_text(&results));
                Ok::<(), DbsError>(())
            })?;
            Ok(())
        }
        Command::Serve { host, port, reload: _ } => {
            let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
            rt.block_on(async move {
                let state = build_state(settings).await?;
                let app = router(state);
                let addr = format!("{host}:{port}");
                tracing::info!(%addr, "starting HTTP server");
                let listener = tokio::net::TcpListener::bind(&addr)
                    .await
                    .with_context(|| format!("failed to bind {addr}"))?;
                axum::serve(listener, app).await.context("HTTP server failed")?;
                Ok::<(), anyhow::Error>(())
            })?;
            Ok(())
        }
        Command::Mcp => run_stdio_server(settings),
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use gerrit_stats::{Cache, Config, Database, FilterWindow, SourceKind, StatsEngine};

#[derive(Parser)]
#[command(name = "gerrit-stats", about = "Gerrit review and commit statistics", version)]
struct Cli {
    /// Config file (default: ~/.gerrit-stats/config.json)
    #[arg(long, env = "GERRIT_STATS_CONFIG")]
    config: Option<PathBuf>,

    /// Where raw review data comes from, overriding the config file
    #[arg(long, env = "GERRIT_STATS_SOURCE", value_enum)]
    source: Option<SourceKind>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Listen address, e.g. 0.0.0.0:3000
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print the dashboard summary as JSON
    Dashboard,
    /// Print windowed statistics as JSON
    Stats {
        /// TODAY, THIS_WEEK, THIS_MONTH, LAST_30_DAYS or LAST_6_MONTHS
        #[arg(long)]
        filter: Option<FilterWindow>,
        /// Maximum entries per list
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Create or migrate the review database schema
    InitDb,
}

async fn build_engine(config: &Config) -> anyhow::Result<StatsEngine> {
    let source = gerrit_stats::source::open_source(config).await?;
    Ok(StatsEngine::new(source, Arc::new(Cache::new()), config))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(source) = cli.source {
        config.source = source;
    }

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            let engine = Arc::new(build_engine(&config).await?);
            gerrit_stats::server::serve(engine, &config.server).await?;
        }
        Commands::Dashboard => {
            let engine = build_engine(&config).await?;
            let summary = engine.dashboard().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Stats { filter, limit } => {
            let engine = build_engine(&config).await?;
            let window = filter.unwrap_or(engine.default_window());
            let limit = limit.or(engine.default_limit());
            let stats = engine.stats(window, limit).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::InitDb => {
            let path = config.database.resolved_path()?;
            Database::open_at(&path).await?;
            println!("Review database ready at {}", path.display());
        }
    }

    Ok(())
}

// backend/src/main.rs

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod api;
mod database;
mod model;
mod server;
mod table;

#[derive(Parser, Debug)]
#[command(name = "perf-dashboard")]
#[command(about = "SDK performance dashboard backend")]
struct Cli {
    /// SQLite database holding runs, buckets and metrics
    #[arg(long, env = "DASHBOARD_DB", default_value = "db/perf.sqlite")]
    db: PathBuf,

    #[arg(long, env = "DASHBOARD_ADDR", default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// Deployment environment; `production` gets the larger pool
    #[arg(long, env = "DASHBOARD_ENV", default_value = "development")]
    env: String,

    #[arg(long, env = "DASHBOARD_POOL_MAX")]
    pool_max: Option<u32>,

    #[arg(long, env = "DASHBOARD_POOL_IDLE_SECS")]
    pool_idle_secs: Option<u64>,

    #[arg(long, env = "DASHBOARD_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the dashboard API (default)
    Serve,
    /// Run one chart request from a JSON file and print its series
    Graph {
        #[arg(long)]
        input: PathBuf,
    },
}

impl Cli {
    fn settings(&self) -> database::Settings {
        let mut pool = perf_dashboard::config::PoolConfig::for_environment(&self.env);
        if let Some(max) = self.pool_max {
            pool.max_size = max;
        }
        if let Some(idle) = self.pool_idle_secs {
            pool.idle_timeout = Duration::from_secs(idle);
        }
        database::Settings {
            path: self.db.clone(),
            config: perf_dashboard::config::DashboardConfig::new(
                Duration::from_secs(self.timeout_secs),
                pool,
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = cli.settings();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => server::serve(settings, cli.addr).await,
        Command::Graph { input } => {
            let raw = std::fs::read_to_string(&input)?;
            let request: serde_json::Value = serde_json::from_str(&raw)?;
            let service = database::build_service(&settings)?;
            let graph = service.gen_graph(&request).await?;
            println!("{}", table::render_graph(&graph));
            Ok(())
        }
    }
}

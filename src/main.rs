mod config;
mod probes;
mod snapshot;

use clap::Parser;
use config::Config;
use probes::os::{HostOs, SystemOs};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostprof")]
#[command(version)]
struct Cli {
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
    #[arg(long, conflicts_with = "full")]
    basic: bool,
    #[arg(long, conflicts_with = "basic")]
    full: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "failed to load config");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    let variant = if cli.basic { "basic" } else { "full" };
    info!(
        variant,
        sample_window_ms = cfg.sample_window_ms,
        perf_window_ms = cfg.perf_window_ms,
        "collecting host snapshot"
    );

    let os: Arc<dyn HostOs> = Arc::new(SystemOs::new());
    if cli.basic {
        match snapshot::collect_basic(os, &cfg).await {
            Ok(snapshot) => print_json(&snapshot),
            Err(err) => {
                error!(error = %err, "snapshot failed");
                std::process::exit(1);
            }
        }
    } else {
        match snapshot::collect_full(os, &cfg).await {
            Ok(snapshot) => print_json(&snapshot),
            Err(err) => {
                error!(error = %err, "snapshot failed");
                std::process::exit(1);
            }
        }
    }
}

fn print_json<T: serde::Serialize>(snapshot: &T) {
    match serde_json::to_string_pretty(snapshot) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            error!(error = %err, "failed to serialize snapshot");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

use std::process::ExitCode;

use clap::Parser;
use markwatch::Settings;
use markwatch::cli::commands::{init, resolve_root, scan, watch};
use markwatch::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        eprintln!("Using default configuration.");
        Settings::default()
    });

    markwatch::logging::init_with_config(&settings.logging);

    let result = match cli.command {
        Commands::Init { force } => {
            let root = std::env::current_dir().unwrap_or_else(|_| ".".into());
            return init::run_init(&root, force);
        }
        Commands::Config => return init::run_config(&settings),
        Commands::Scan { root, json } => match resolve_root(root, &settings) {
            Ok(root) => scan::run_scan(&settings, &root, json).await,
            Err(e) => Err(e),
        },
        Commands::Watch { root } => match resolve_root(root, &settings) {
            Ok(root) => watch::run_watch(&settings, &root).await,
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

//! Reconciler - Entry Point
//!
//! Runs the setup orchestration and reconciliation API, or a one-shot status
//! check (`--check`) or complete setup (`--setup`).

use std::collections::HashMap;
use std::env;

use serde::Serialize;
use tracing::{error, info};

use reconciler::app::options::AppOptions;
use reconciler::app::run::run;
use reconciler::app::state::AppState;
use reconciler::filesys::file::File;
use reconciler::logs::{init_logging, LogOptions};
use reconciler::storage::layout::StorageLayout;
use reconciler::storage::settings::Settings;
use reconciler::utils::version_info;

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        print_json(&version);
        return;
    }

    let layout = match cli_args.get("base-dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };
    let settings_file = match cli_args.get("settings") {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };

    let settings = match Settings::load(&settings_file).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e}");
            return;
        }
    };

    // Initialize logging; the guard flushes file output on exit
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings
            .log_to_file
            .then(|| layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    if cli_args.contains_key("check") {
        return run_check(&settings, &layout).await;
    }

    if cli_args.contains_key("setup") {
        return run_setup(&settings, &layout).await;
    }

    let options = AppOptions::from_settings(&settings, layout);
    info!("Running reconciler with options: {:?}", options);
    if let Err(e) = run(version.version, settings, options, await_shutdown_signal()).await {
        error!("Failed to run the reconciler: {e}");
    }
}

/// Check every platform once and print the report
async fn run_check(settings: &Settings, layout: &StorageLayout) {
    let state = match AppState::init(settings, layout).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize: {e}");
            return;
        }
    };

    let report = state.aggregator.check_all().await;
    print_json(&report);
}

/// Run every setup phase once and print the result
async fn run_setup(settings: &Settings, layout: &StorageLayout) {
    let state = match AppState::init(settings, layout).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize: {e}");
            return;
        }
    };

    match state.orchestrator.run_complete_setup().await {
        Ok(result) => print_json(&result),
        Err(e) => error!("Setup failed: {e}"),
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize output: {e}"),
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Failed to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
        }
        info!("Ctrl+C received, shutting down...");
    }
}

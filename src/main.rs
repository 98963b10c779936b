//! Heartbeat coordinator - tracks peer liveness over authenticated HTTP beats.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info};

use heartbeat_daemon::config::Settings;
use heartbeat_daemon::hooks::{CommandObserver, HookCommand, ObserverSet, TracingObserver};
use heartbeat_daemon::logging::init_logging;
use heartbeat_daemon::server::CoordinatorServer;
use heartbeat_daemon::session::SessionObserver;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = "heartbeatd";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{} {}", NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let config_path = get_config_path(&args);

    let settings = match Settings::load(&config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&settings.logging) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting {} v{}", NAME, VERSION);
    info!("Configuration loaded from: {}", config_path);
    info!("Listen address: {}", settings.coordinator.listen_addr);
    info!("Session timeout: {}s", settings.security.session_timeout_seconds);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(settings)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Coordinator failed");
            ExitCode::FAILURE
        }
    }
}

/// Async main function.
async fn async_main(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let observer = build_observer(&settings);
    let server = CoordinatorServer::bind(&settings, observer).await?;

    let shutdown = Arc::new(Notify::new());
    let shutdown_for_run = Arc::clone(&shutdown);
    let server_task = tokio::spawn(server.run(shutdown_for_run));

    shutdown_signal().await;
    info!("Shutdown signal received, initiating graceful shutdown...");
    shutdown.notify_one();

    server_task.await??;

    info!("Coordinator stopped");
    Ok(())
}

/// Log every session change, and run the configured hooks if any.
fn build_observer(settings: &Settings) -> Arc<dyn SessionObserver> {
    let hooks = &settings.hooks;
    let mut observers = ObserverSet::new().with(Arc::new(TracingObserver));

    if hooks.on_connect.is_some() || hooks.on_disconnect.is_some() {
        let command = |path: &Option<std::path::PathBuf>| {
            path.as_ref()
                .map(|p| HookCommand::new(p.clone(), hooks.timeout()))
        };
        observers = observers.with(Arc::new(CommandObserver::new(
            command(&hooks.on_connect),
            command(&hooks.on_disconnect),
        )));
        info!(
            on_connect = ?hooks.on_connect,
            on_disconnect = ?hooks.on_disconnect,
            "Session hooks enabled"
        );
    }

    Arc::new(observers)
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print help message.
fn print_help() {
    println!(
        r#"{} {}
Heartbeat coordinator: tracks which peers are alive from authenticated beats.

USAGE:
    {} [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file
                           [default: /etc/heartbeat/heartbeat.toml]
    -h, --help             Print help information
    -V, --version          Print version information
"#,
        NAME, VERSION, NAME
    );
}

/// Get configuration file path from command line arguments.
fn get_config_path(args: &[String]) -> String {
    for (i, arg) in args.iter().enumerate() {
        if (arg == "--config" || arg == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    "/etc/heartbeat/heartbeat.toml".to_string()
}

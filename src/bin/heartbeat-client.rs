//! Heartbeat client - beats for one identifier until interrupted.

use std::env;
use std::process::ExitCode;

use tokio::signal;
use tracing::{error, info};

use heartbeat_daemon::auth::MessageAuthenticator;
use heartbeat_daemon::client::{BeatOutcome, Initiator};
use heartbeat_daemon::config::Settings;
use heartbeat_daemon::logging::init_logging;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = "heartbeat-client";

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

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(settings)) {
        Ok(BeatOutcome::Cancelled) => ExitCode::SUCCESS,
        Ok(BeatOutcome::BootstrapFailed(e)) => {
            error!(error = %e, "Heartbeat stopped, bootstrap failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Client failed");
            ExitCode::FAILURE
        }
    }
}

/// Async main function.
async fn async_main(settings: Settings) -> Result<BeatOutcome, Box<dyn std::error::Error>> {
    let config = settings.initiator()?;
    let secret = MessageAuthenticator::load_secret(&settings.security.hmac_secret_path)?;
    let initiator = Initiator::from_config(config, &secret)?;

    info!(
        identifier = %config.identifier,
        coordinator = %config.coordinator_url,
        interval_secs = config.interval_seconds,
        bootstrap_failure = ?config.bootstrap_failure,
        "Starting {} v{}",
        NAME,
        VERSION
    );

    let handle = initiator.start(config.interval());

    let canceller = handle.canceller();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping beats...");
        canceller.cancel();
    });

    let outcome = handle.join().await?;
    info!("Client stopped");
    Ok(outcome)
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
Heartbeat client: sends authenticated beats to a coordinator.

USAGE:
    {} [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (needs an [initiator] section)
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

use anyhow::{bail, Result};
use autoheal::cli::{self, Cli, Commands};
use autoheal::config::{AppConfig, LoggingConfig};
use autoheal::PassOutcome;
use clap::Parser;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli::load_config(&cli)?;
    let _guard = init_logging(&config.logging);

    match cli.command() {
        Commands::Run => {
            ensure_valid(&config)?;
            let healer = cli::build_healer(&config)?;
            report(&healer.run_once().await);
        }
        Commands::Check => {
            let healer = cli::build_healer(&config)?;
            let snapshot = healer.check().await;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Watch { interval_secs } => {
            ensure_valid(&config)?;
            run_watch_mode(&config, Duration::from_secs(interval_secs)).await?;
        }
        Commands::NotifyTest => {
            let sink = cli::build_sink(&config)?;
            sink.notify(&cli::test_alert(&config)).await;
            println!("Test notification sent to chat {}", config.notify.chat_id);
        }
    }

    Ok(())
}

fn ensure_valid(config: &AppConfig) -> Result<()> {
    if let Err(problems) = config.validate() {
        for problem in &problems {
            eprintln!("config: {}", problem);
        }
        bail!("invalid configuration ({} problem(s))", problems.len());
    }
    Ok(())
}

fn report(outcome: &PassOutcome) {
    match outcome {
        PassOutcome::Healthy(snapshot) => info!("{} healthy, nothing to do", snapshot.service),
        PassOutcome::Remediated { plan, .. } => info!("Remediated with {}", plan.fix_type()),
        PassOutcome::Failed { plan, result } => error!(
            "Remediation with {} failed at {:?}",
            plan.fix_type(),
            result.failed_stage
        ),
    }
}

/// Sequential passes; the next pass starts only after the previous one ends
async fn run_watch_mode(config: &AppConfig, interval: Duration) -> Result<()> {
    let healer = cli::build_healer(config)?;
    info!("Watching {} every {}s", config.service.name, interval.as_secs());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        // A pass is never interrupted; a signal is picked up while sleeping
        report(&healer.run_once().await);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = &mut shutdown => break,
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},autoheal=debug", logging.level)));

    let console_layer = if logging.json {
        tracing_subscriber::fmt::layer().json().with_target(true).boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    // rolling::daily panics if it cannot create the file, so check first
    let mut guard = None;
    let file_layer = logging.directory.as_ref().and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "Warning: could not create log directory {} ({}), file logging disabled",
                dir.display(),
                e
            );
            return None;
        }
        let appender = tracing_appender::rolling::daily(dir, "autoheal.log");
        let (writer, worker) = tracing_appender::non_blocking(appender);
        guard = Some(worker);
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    guard
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

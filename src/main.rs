use clap::Parser;
use film_harvester::{load_config, setup_logging, Cli, CliRunner, PrometheusExporter};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    setup_logging(args.verbose)?;

    info!("Starting film-harvester v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args).await?;

    if let Some(port) = args.metrics_port {
        PrometheusExporter::new(port).start()?;
    }

    let cli_runner = CliRunner::new(config, &args);

    // A harvest cannot be resumed, so an interrupt only stops the process
    let result = tokio::select! {
        result = cli_runner.run(args.command) => {
            info!("Application completed");
            result
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, abandoning the run");
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("Application error: {:#}", e);
        std::process::exit(1);
    }

    info!("film-harvester stopped");
    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            let _ = signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }
}

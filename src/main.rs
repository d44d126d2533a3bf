use reconcile::config::{Args, Config};
use reconcile::db::SqlitePathIndex;
use reconcile::pipeline::run_pipeline;
use reconcile::torrent::{FileMetainfoReader, TransmissionClient};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Exit code for bad flags, distinct from a failed run
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::load();
    init_tracing(args.verbose);

    let config = match Config::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    debug!(?config, "Loaded configuration");

    let index = match SqlitePathIndex::open(&config.database_path, config.database_timeout).await
    {
        Ok(index) => index,
        Err(e) => {
            error!(
                database = %config.database_path.display(),
                error = %e,
                "Failed to open path database"
            );
            return ExitCode::FAILURE;
        }
    };

    let client = TransmissionClient::new(config.rpc_url(), config.credentials());
    info!(rpc_url = client.rpc_url(), "Using Transmission");

    let result = run_pipeline(
        config.inputs.clone(),
        Arc::new(index),
        Arc::new(FileMetainfoReader),
        Arc::new(client),
        config.pipeline_options(),
    )
    .await;

    match result {
        Ok(summary) => {
            info!("Done: {}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Reconcile aborted");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    // Use RUST_LOG env var if set, otherwise info (or debug with --verbose)
    let default_filter = if verbose {
        "reconcile=debug"
    } else {
        "reconcile=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

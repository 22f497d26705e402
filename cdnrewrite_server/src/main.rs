use std::{path::PathBuf, sync::Arc};

use cdnrewrite_common::{error::Result, serve, state::Config};
use scorched::{logf, LogData, LogImportance};
use tokio::signal;

const APP_NAME: &str = "cdnrewrite";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config: Config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => {
            logf!(Info, "Loading config from file: {}", path.display());
            confy::load_path(&path)?
        }
        None => {
            logf!(
                Info,
                "Loading config from file: {}",
                confy::get_configuration_file_path(APP_NAME, None)?.display()
            );
            confy::load(APP_NAME, None)?
        }
    };

    let config = Arc::new(config.with_env_overrides()?);

    logf!(
        Info,
        "CDN rewriting {} for {} ({:?} environment)",
        if config.rewrite.enabled { "enabled" } else { "disabled" },
        config.rewrite.cdn_domain,
        config.environment
    );

    serve(config, shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    logf!(Info, "Shutting down");
}

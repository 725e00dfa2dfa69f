use std::sync::Arc;

use fanout::config::Config;
use fanout::proxy::Dispatcher;
use fanout::{limits, server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;

    let default_level = if cfg.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_level(true)
        .init();

    if cfg.fd_limit > 0 {
        limits::ensure_open_files_limit(cfg.fd_limit);
    }
    if cfg.verbose {
        match limits::open_files_limit() {
            Ok((current, max)) => tracing::debug!(current, max, "Open files limit"),
            Err(e) => tracing::debug!(error = %e, "Open files limit unknown"),
        }
    }

    let dispatcher = Arc::new(Dispatcher::from_config(&cfg)?);
    tracing::debug!(
        bufsize = cfg.buffer_size,
        maxconns = cfg.max_conns_per_backend,
        backends = ?cfg.backends,
        "Configuration loaded"
    );

    tokio::select! {
        res = server::listener::run(&cfg, dispatcher) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

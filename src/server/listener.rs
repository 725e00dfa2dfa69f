use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::http::connection::Connection;
use crate::proxy::Dispatcher;

/// Pause after a failed accept (e.g. out of file descriptors) before retrying.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub async fn run(cfg: &Config, dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!(
        addr = %listener.local_addr()?,
        mode = ?dispatcher.mode(),
        backends = dispatcher.backends().len(),
        "Listening"
    );

    if let (Some(pool), Some(every)) = (dispatcher.buffer_pool(), cfg.pool_trim_interval) {
        // Stops on its own once the pool is dropped.
        let _trim = pool.spawn_idle_trim(every);
    }

    serve(listener, dispatcher).await
}

/// Accepts connections on an already bound listener until the task is
/// cancelled.
pub async fn serve(listener: TcpListener, dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        debug!("Accepted connection from {}", peer);

        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            let mut conn = Connection::from_tcp(socket, peer, dispatcher);
            if let Err(e) = conn.run().await {
                debug!("Connection error from {}: {}", peer, e);
            }
        });
    }
}

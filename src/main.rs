use std::{io::Error, time::Duration};

use poem::{Server, listener::TcpListener};
use shipments::{
    bootstrap::{bootstrap, build_app},
    config::Config,
};
use tokio::{main, sync::watch};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[main]
async fn main() -> Result<(), Error> {
    let config = Config::try_parse().map_err(Error::other)?;
    init_tracing();

    let server_url = format!("{}://{}:{}", config.scheme, config.host, config.port);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runtime = bootstrap(&config, shutdown_rx)
        .await
        .map_err(|err| Error::other(format!("{err:#}")))?;
    let app = build_app(runtime.state, &server_url, &config.correlation_header)
        .map_err(|err| Error::other(format!("{err:#}")))?;

    info!(%server_url, transport = ?config.transport, "starting server");

    let served = Server::new(TcpListener::bind(format!("localhost:{}", config.port)))
        .run_with_graceful_shutdown(
            app,
            async move {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown requested");
                let _ = shutdown_tx.send(true);
            },
            Some(SHUTDOWN_GRACE),
        )
        .await;

    for worker in runtime.workers {
        if tokio::time::timeout(SHUTDOWN_GRACE, worker).await.is_err() {
            warn!("background worker did not stop in time");
        }
    }
    served
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shipments=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

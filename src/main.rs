//! The service binary: operational endpoints behind the observability pipeline.
//!
//! ```text
//! PORT=9090 APP_NAME=orders RUST_LOG=vigil=debug cargo run
//! curl localhost:9090/health
//! curl localhost:9090/metrics
//! ```

use std::io;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use vigil::{
    App, Config, Endpoints, LogObserver, MetricsObserver, MetricsRegistry, Observability, Router,
    Server, ServiceIdentity,
};

#[tokio::main]
async fn main() -> Result<(), vigil::Error> {
    // One writer thread owns stdout. Operational events and request records
    // both go through it as whole lines. The guard flushes it on exit.
    let (stdout, _guard) = tracing_appender::non_blocking(io::stdout());

    tracing_subscriber::fmt()
        .json()
        .with_writer(stdout.clone())
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vigil=info")),
        )
        .init();

    let config = Arc::new(Config::from_env()?);
    let registry = Arc::new(MetricsRegistry::new()?);

    let router = Endpoints::new(Arc::clone(&config), Arc::clone(&registry)).register(Router::new());
    let observability = Observability::new(ServiceIdentity::from(&*config))
        .with_observer(LogObserver::new(stdout))
        .with_observer(MetricsObserver::new(registry));

    Server::bind(config.listen_addr())
        .await?
        .serve(App::new(router, observability))
        .await
}

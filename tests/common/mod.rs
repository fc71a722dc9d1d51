//! Shared fixtures for integration tests.

use std::io::{self, Write};
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use parking_lot::Mutex;
use serde_json::Value;
use vigil::{
    App, Config, Endpoints, LogObserver, MetricsObserver, MetricsRegistry, Observability, Router,
    ServiceIdentity,
};

/// In-memory log sink shared between the observer and the test.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    /// Every record written so far, parsed.
    pub fn records(&self) -> Vec<Value> {
        let bytes = self.0.lock().clone();
        String::from_utf8(bytes)
            .expect("log output is utf-8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("each line is one JSON object"))
            .collect()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct Harness {
    pub app: Arc<App>,
    pub registry: Arc<MetricsRegistry>,
    pub log: SharedBuf,
}

pub fn test_config() -> Config {
    Config {
        service_name: "orders".to_owned(),
        service_description: "order service".to_owned(),
        version: "1.2.3".to_owned(),
        port: 0,
        hostname: "test-host".to_owned(),
    }
}

/// Builds the full pipeline around `routes` plus the operational endpoints,
/// with a fresh registry and log buffer.
pub fn harness(routes: Router) -> Harness {
    let config = Arc::new(test_config());
    let registry = Arc::new(MetricsRegistry::new().expect("metrics register"));
    let log = SharedBuf::default();

    let router = Endpoints::new(Arc::clone(&config), Arc::clone(&registry)).register(routes);
    let observability = Observability::new(ServiceIdentity::from(&*config))
        .with_observer(LogObserver::new(log.clone()))
        .with_observer(MetricsObserver::new(Arc::clone(&registry)));

    Harness { app: Arc::new(App::new(router, observability)), registry, log }
}

pub fn get(path: &str) -> http::Request<Full<Bytes>> {
    http::Request::get(path)
        .header("user-agent", "vigil-tests/1.0")
        .body(Full::new(Bytes::new()))
        .expect("valid request")
}

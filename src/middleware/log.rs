//! Structured request log: one JSON object per completed request, one per line.
//!
//! ```json
//! {"level":"info","msg":"Request completed","timestamp":"2024-05-01T12:00:00Z",
//!  "service":"microservice","hostname":"pod-7f9c","method":"GET","path":"/users/42",
//!  "status":200,"duration_ms":3,"user_agent":"curl/8.4.0"}
//! ```
//!
//! Each record is serialized into its own buffer and handed to the sink in one
//! `write_all`. In production the sink is a [`tracing_appender::non_blocking`]
//! writer: every write becomes one message on a channel drained by a dedicated
//! thread, so lines never interleave mid-line and no request task waits on
//! stdout. When that channel is full the record is dropped. Ordering between
//! requests is not guaranteed.

use std::io::Write;

use serde::Serialize;
use tracing::warn;

use super::observe::{Observer, RequestObservation, rfc3339};

#[derive(Serialize)]
struct LogRecord<'a> {
    level: &'static str,
    msg: &'static str,
    timestamp: String,
    service: &'a str,
    hostname: &'a str,
    method: &'a str,
    path: &'a str,
    status: u16,
    duration_ms: u64,
    user_agent: &'a str,
}

/// Writes request records to a line-oriented sink.
///
/// The sink is cloned per record, so concurrent requests share no lock here.
/// A sink must therefore deliver each `write` call whole, as
/// [`NonBlocking`](tracing_appender::non_blocking::NonBlocking) does.
///
/// ```rust,no_run
/// let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
/// let log = vigil::LogObserver::new(writer);
/// ```
pub struct LogObserver<W> {
    sink: W,
}

impl<W> LogObserver<W>
where
    W: Write + Clone + Send + Sync + 'static,
{
    pub fn new(sink: W) -> Self {
        Self { sink }
    }
}

/// Serializes one record, newline included.
///
/// Falls back to a reduced record holding only the numeric fields if the full
/// one cannot be serialized.
fn render(obs: &RequestObservation) -> Vec<u8> {
    let duration_ms = u64::try_from(obs.duration.as_millis()).unwrap_or(u64::MAX);
    let record = LogRecord {
        level: "info",
        msg: "Request completed",
        timestamp: rfc3339(obs.timestamp),
        service: &obs.service,
        hostname: &obs.hostname,
        method: obs.method.as_str(),
        path: &obs.path,
        status: obs.status.as_u16(),
        duration_ms,
        user_agent: &obs.user_agent,
    };

    let mut line = serde_json::to_vec(&record).unwrap_or_else(|e| {
        warn!(error = %e, "request log serialization failed");
        format!(
            r#"{{"level":"warn","msg":"Request completed (degraded record)","status":{},"duration_ms":{}}}"#,
            obs.status.as_u16(),
            duration_ms,
        )
        .into_bytes()
    });
    line.push(b'\n');
    line
}

impl<W> Observer for LogObserver<W>
where
    W: Write + Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "log"
    }

    fn observe(&self, observation: &RequestObservation) {
        let line = render(observation);
        let mut sink = self.sink.clone();
        if let Err(e) = sink.write_all(&line) {
            warn!(error = %e, "request log write failed");
        }
    }
}

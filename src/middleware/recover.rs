//! Panic safety net for handlers.
//!
//! A handler that panics yields a fixed `500` JSON response instead of tearing
//! down the connection. The 500 then flows through the observability pipeline
//! like any other response. Other requests are unaffected.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use http::StatusCode;
use tracing::error;

use crate::response::Response;

const INTERNAL_ERROR_BODY: &[u8] = br#"{"error":"Internal server error"}"#;

/// Awaits `fut`, converting a panic into `500 {"error":"Internal server error"}`.
pub async fn catch_panic<F>(path: &str, fut: F) -> Response
where
    F: Future<Output = Response>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            error!(path, error = panic_message(&*panic), "Unhandled error");
            internal_error()
        }
    }
}

pub(crate) fn internal_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .json(INTERNAL_ERROR_BODY.to_vec())
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

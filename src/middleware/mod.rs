//! Middleware layer.
//!
//! Every routed request, matched or not, passes through one
//! [`Observability`] pipeline:
//!
//! ```text
//! RequestContext ──▶ RequestTimer::start
//!                        │
//!                        ▼
//!                 handler (under recover::catch_panic)
//!                        │   status read only after it returns
//!                        ▼
//!                 RequestObservation ──▶ Observer #1  (LogObserver)
//!                                    └─▶ Observer #2  (MetricsObserver)
//! ```
//!
//! Observers run synchronously before the response is handed back to hyper.
//! A failing observer is logged and skipped; it never changes the response.

pub mod log;
pub mod observe;
pub mod recover;

pub use self::log::LogObserver;
pub use self::observe::{
    Labels, Observability, Observer, RequestContext, RequestObservation, RequestTimer,
    OTHER_METHOD, ServiceIdentity, UNMATCHED_ROUTE,
};

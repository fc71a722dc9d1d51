//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Build a [`Response`] in your handler and return it. The status is read by
//! the observability pipeline only after the handler has returned, so whatever
//! you set here is exactly what gets logged and counted.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;
use tracing::warn;

pub(crate) const JSON: &str = "application/json";
pub(crate) const TEXT: &str = "text/plain; charset=utf-8";

/// An outgoing HTTP response.
///
/// ```rust
/// use http::StatusCode;
/// use vigil::Response;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) body: Vec<u8>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) status: StatusCode,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::builder().finish(JSON, body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().finish(TEXT, body.into().into_bytes())
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Vec::new(), headers: Vec::new(), status: code }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn body(&self) -> &[u8] { &self.body }

    /// First header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Converts into the `http` response hyper writes to the wire.
    ///
    /// Headers that are not valid HTTP are dropped with a warning rather than
    /// failing the response.
    pub fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(Bytes::from(self.body)));
        *res.status_mut() = self.status;
        let headers = res.headers_mut();
        for (name, value) in self.headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(n), Ok(v)) => { headers.append(n, v); }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
        res
    }
}

/// Fluent builder for [`Response`]. Defaults to `200 OK`.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish(JSON, body)
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(TEXT, body.into().into_bytes())
    }

    /// Terminate with an explicit content type.
    pub fn bytes(self, content_type: &str, body: Vec<u8>) -> Response {
        self.finish(content_type, body)
    }

    fn finish(self, content_type: &str, body: Vec<u8>) -> Response {
        let mut headers = vec![(CONTENT_TYPE.as_str().to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { body, headers, status: self.status }
    }
}

/// Conversion into an HTTP [`Response`].
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

/// `(StatusCode, body)` overrides the status of any other response.
impl<R: IntoResponse> IntoResponse for (StatusCode, R) {
    fn into_response(self) -> Response {
        let mut res = self.1.into_response();
        res.status = self.0;
        res
    }
}

/// Serializes `T` as the JSON body of a `200 OK`.
///
/// A value serde cannot represent becomes a bare `500`.
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => Response::json(bytes),
            Err(e) => {
                warn!(error = %e, "response serialization failed");
                Response::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_puts_content_type_first() {
        let res = Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/users/42")
            .json(b"{}".to_vec());

        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.headers[0], ("content-type".to_owned(), JSON.to_owned()));
        assert_eq!(res.header("Location"), Some("/users/42"));
    }

    #[test]
    fn into_inner_drops_invalid_headers() {
        let res = Response::builder()
            .header("bad header", "x")
            .header("x-ok", "yes")
            .text("hi")
            .into_inner();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-ok"], "yes");
        assert_eq!(res.headers().len(), 2);
    }

    #[test]
    fn tuple_overrides_status() {
        let res = (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({"a": 1}))).into_response();
        assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(res.body(), br#"{"a":1}"#);
    }
}

//! Request and response objects exchanged through a channel.

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};

/// Streaming HTTP body used for both directions.
pub use axum::body::Body;

/// An outbound request: method, path relative to the channel's prefix,
/// headers and body.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    /// Appended to the channel's path prefix. May be empty.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Body,
}

impl HttpRequest {
    /// A `POST` to the channel's own path carrying `body` and `headers`.
    pub fn new(body: impl Into<Body>, headers: HeaderMap) -> Self {
        Self {
            method: Method::POST,
            path: String::new(),
            headers,
            body: body.into(),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn into_body(self) -> Body {
        self.body
    }
}

/// A response from the remote peer. The body reads straight from the
/// underlying stream; drain or drop it to release the stream.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: Body, headers: HeaderMap) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Body) {
        (self.status, self.headers, self.body)
    }

    /// Read the whole body, failing if it exceeds `limit` bytes.
    pub async fn bytes(self, limit: usize) -> Result<Bytes, axum::Error> {
        axum::body::to_bytes(self.body, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_request_defaults() {
        let mut headers = HeaderMap::new();
        headers.insert("x-a", HeaderValue::from_static("1"));
        let req = HttpRequest::new("body", headers);
        assert_eq!(req.method, Method::POST);
        assert!(req.path.is_empty());
        assert_eq!(req.headers()["x-a"], "1");

        let req = req.with_method(Method::PUT).with_path("/items");
        assert_eq!(req.method, Method::PUT);
        assert_eq!(req.path, "/items");
    }

    #[tokio::test]
    async fn test_response_bytes() {
        let res = HttpResponse::new(StatusCode::OK, Body::from("hello"), HeaderMap::new());
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(&res.bytes(1024).await.unwrap()[..], b"hello");
    }

    #[tokio::test]
    async fn test_response_bytes_limit() {
        let res = HttpResponse::new(StatusCode::OK, Body::from("hello"), HeaderMap::new());
        assert!(res.bytes(2).await.is_err());
    }
}

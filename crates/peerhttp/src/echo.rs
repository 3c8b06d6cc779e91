//! A router that answers every request with what it received.
//!
//! Served by `peerhttp serve` and handy as a counterpart in tests. The
//! response carries the request body unchanged (streamed, not buffered), the
//! request's end-to-end headers, and `x-echo-*` headers describing the request
//! line.

use axum::extract::Request;
use axum::response::Response;
use axum::Router;
use http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderName, HeaderValue};

pub const ECHO_PATH: &str = "x-echo-path";
pub const ECHO_METHOD: &str = "x-echo-method";
pub const ECHO_HOST: &str = "x-echo-host";

pub fn router() -> Router {
    Router::new().fallback(echo)
}

async fn echo(req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let mut response = Response::new(body);
    let headers = response.headers_mut();

    for (name, value) in parts.headers.iter() {
        if is_framing(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    if let Ok(value) = HeaderValue::from_str(path) {
        headers.insert(ECHO_PATH, value);
    }
    if let Ok(value) = HeaderValue::from_str(parts.method.as_str()) {
        headers.insert(ECHO_METHOD, value);
    }
    if let Some(host) = parts.headers.get(HOST) {
        headers.insert(ECHO_HOST, host.clone());
    }
    response
}

fn is_framing(name: &HeaderName) -> bool {
    name == CONTENT_LENGTH || name == TRANSFER_ENCODING || name == HOST || name == CONNECTION
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[tokio::test]
    async fn test_echo_mirrors_request() {
        let req = http::Request::builder()
            .method("PUT")
            .uri("/items?id=3")
            .header(HOST, "peer")
            .header(CONTENT_LENGTH, "4")
            .header("x-multi", "a")
            .header("x-multi", "b")
            .body(Body::from("ping"))
            .unwrap();

        let res = echo(req).await;
        assert_eq!(res.status(), 200);
        let headers = res.headers();
        assert_eq!(headers[ECHO_PATH], "/items?id=3");
        assert_eq!(headers[ECHO_METHOD], "PUT");
        assert_eq!(headers[ECHO_HOST], "peer");
        assert!(headers.get(HOST).is_none());
        assert!(headers.get(CONTENT_LENGTH).is_none());
        let multi: Vec<_> = headers.get_all("x-multi").iter().collect();
        assert_eq!(multi, ["a", "b"]);

        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"ping");
    }
}

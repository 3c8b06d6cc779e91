//! Outbound channel: one HTTP/1.1 round trip per call over a fresh stream.

use crate::context::{Interrupted, RequestContext};
use crate::destination::Destination;
use crate::error::{ChannelError, ConnectFailure, RemoteError, TransportFailure};
use crate::exchange::{Body, HttpRequest, HttpResponse};
use crate::protocol::http_protocol;
use async_trait::async_trait;
use http::header::HOST;
use http::{HeaderValue, Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use peerhttp_wire::{PeerHost, PeerInfo, ProtocolId};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::debug;

/// Anything that can carry a request to a remote service and bring back its
/// response.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn request(
        &self,
        ctx: &RequestContext,
        req: HttpRequest,
    ) -> Result<HttpResponse, ChannelError>;
}

/// A channel bound to one destination and a path prefix.
///
/// Cloning is cheap; clones share the local [`PeerHost`] and nothing else, so
/// concurrent calls never wait on each other at this layer.
#[derive(Clone)]
pub struct HttpChannel {
    host: Arc<PeerHost>,
    destination: Destination,
    path: String,
    protocol: ProtocolId,
}

impl HttpChannel {
    /// Bind a channel to `peer`, prefixing every request path with `path`.
    pub fn new(host: Arc<PeerHost>, peer: PeerInfo, path: impl AsRef<str>) -> Self {
        Self::with_destination(host, peer, path)
    }

    /// Bind a channel to any [`Destination`], including a plain TCP host.
    pub fn with_destination(
        host: Arc<PeerHost>,
        destination: impl Into<Destination>,
        path: impl AsRef<str>,
    ) -> Self {
        Self {
            host,
            destination: destination.into(),
            path: normalize_prefix(path.as_ref()),
            protocol: http_protocol(),
        }
    }

    /// Use a protocol identifier other than [`HTTP_PROTOCOL`](crate::HTTP_PROTOCOL).
    pub fn with_protocol(mut self, protocol: ProtocolId) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// The normalised path prefix.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn protocol(&self) -> &ProtocolId {
        &self.protocol
    }

    /// The effective request path for a request path relative to this channel.
    pub fn target_path(&self, path: &str) -> String {
        join_path(&self.path, path)
    }

    /// Send `req` and wait for the response head.
    ///
    /// A 200 response is returned with its body still streaming from the
    /// peer. Every other status becomes [`ChannelError::Remote`]. `ctx` guards
    /// the connect step and the exchange, and keeps guarding the body until
    /// it is read.
    pub async fn request(
        &self,
        ctx: &RequestContext,
        req: HttpRequest,
    ) -> Result<HttpResponse, ChannelError> {
        let method = req.method.clone();
        let path = self.target_path(&req.path);
        let target = self.destination.to_string();
        let uri = format!("{target}{path}");
        let request = self.build_request(&path, req)?;

        debug!(%method, %uri, "peerhttp: sending request");

        let response = match &self.destination {
            Destination::Peer(info) => {
                ctx.run(self.host.connect(info))
                    .await
                    .map_err(ConnectFailure::Interrupted)
                    .and_then(|res| res.map_err(ConnectFailure::Peer))
                    .map_err(|source| ChannelError::Connect {
                        target: target.clone(),
                        source,
                    })?;

                let host = &self.host;
                let protocol = &self.protocol;
                let peer_id = info.id;
                let exchange = async move {
                    let stream = host
                        .open_stream(&peer_id, protocol)
                        .await
                        .map_err(TransportFailure::Stream)?;
                    round_trip(stream, request, ctx).await
                };
                ctx.run(exchange)
                    .await
                    .map_err(TransportFailure::Interrupted)
                    .and_then(|res| res)
                    .map_err(|source| ChannelError::Transport { target, source })?
            }
            Destination::Host(addr) => {
                let stream = ctx
                    .run(TcpStream::connect(*addr))
                    .await
                    .map_err(ConnectFailure::Interrupted)
                    .and_then(|res| res.map_err(ConnectFailure::Io))
                    .map_err(|source| ChannelError::Connect {
                        target: target.clone(),
                        source,
                    })?;
                ctx.run(round_trip(stream, request, ctx))
                    .await
                    .map_err(TransportFailure::Interrupted)
                    .and_then(|res| res)
                    .map_err(|source| ChannelError::Transport { target, source })?
            }
        };

        let (parts, body) = response.into_parts();
        debug!(%method, %uri, status = parts.status.as_u16(), "peerhttp: response received");
        if parts.status != StatusCode::OK {
            return Err(RemoteError {
                method,
                uri,
                status: parts.status,
                headers: parts.headers,
            }
            .into());
        }
        Ok(HttpResponse::new(parts.status, Body::new(body), parts.headers))
    }

    fn build_request(&self, path: &str, req: HttpRequest) -> Result<Request<Body>, ChannelError> {
        let HttpRequest {
            method,
            headers,
            body,
            ..
        } = req;
        let mut request = Request::builder().method(method).uri(path).body(body)?;
        *request.headers_mut() = headers;
        if !request.headers().contains_key(HOST) {
            let authority =
                HeaderValue::from_str(&self.destination.authority()).map_err(http::Error::from)?;
            request.headers_mut().insert(HOST, authority);
        }
        Ok(request)
    }
}

#[async_trait]
impl Channel for HttpChannel {
    async fn request(
        &self,
        ctx: &RequestContext,
        req: HttpRequest,
    ) -> Result<HttpResponse, ChannelError> {
        HttpChannel::request(self, ctx, req).await
    }
}

/// Run one HTTP/1.1 exchange over `io`.
///
/// The connection task is owned by the caller until the response head
/// arrives; afterwards it runs detached, feeding the body, and stops when the
/// body is consumed or `ctx` is interrupted.
async fn round_trip<T>(
    io: T,
    request: Request<Body>,
    ctx: &RequestContext,
) -> Result<Response<Incoming>, TransportFailure>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io))
        .await
        .map_err(TransportFailure::Http)?;

    let guard = ctx.clone();
    let driver = AbortOnDrop::new(tokio::spawn(async move {
        match guard.run(conn).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("peerhttp: connection error: {}", e),
            Err(Interrupted::Cancelled) => debug!("peerhttp: connection cancelled"),
            Err(Interrupted::DeadlineExceeded) => debug!("peerhttp: connection deadline exceeded"),
        }
    }));

    let response = sender
        .send_request(request)
        .await
        .map_err(TransportFailure::Http)?;
    driver.detach();
    Ok(response)
}

/// Aborts the wrapped task unless detached first.
struct AbortOnDrop(Option<JoinHandle<()>>);

impl AbortOnDrop {
    fn new(handle: JoinHandle<()>) -> Self {
        Self(Some(handle))
    }

    fn detach(mut self) {
        self.0.take();
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// Prepend `/` to a path prefix that lacks one.
fn normalize_prefix(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Join `path` onto `prefix` with exactly one `/` at the seam.
fn join_path(prefix: &str, path: &str) -> String {
    if path.is_empty() {
        return prefix.to_string();
    }
    if path.starts_with('?') {
        return format!("{prefix}{path}");
    }
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

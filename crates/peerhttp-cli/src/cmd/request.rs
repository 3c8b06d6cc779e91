//! `peerhttp request`: one exchange with a remote node.

use anyhow::{anyhow, bail, Context};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use peerhttp::config::{load_config, load_or_create_keypair};
use peerhttp::{ChannelError, HttpChannel, HttpRequest, PeerHost, PeerId, PeerInfo, RequestContext};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Largest response body printed.
const MAX_BODY: usize = 64 * 1024 * 1024;

pub struct RequestArgs {
    pub peer: String,
    pub addr: SocketAddr,
    pub path: String,
    pub method: String,
    pub headers: Vec<String>,
    pub data: String,
}

pub fn cmd_request(config: Option<PathBuf>, args: RequestArgs) -> anyhow::Result<()> {
    let config = load_config(config.as_deref());
    let peer: PeerId = args.peer.parse().context("Invalid --peer")?;
    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .with_context(|| format!("Invalid method '{}'", args.method))?;
    let headers = parse_headers(&args.headers)?;
    let keypair = load_or_create_keypair(&config.key_path())?;

    // Outbound only: bind an ephemeral port so a local `serve` keeps its own.
    let mut host_config = config.host_config();
    host_config.listen_addr = SocketAddr::new(config.listen_addr.ip(), 0);

    super::runtime()?.block_on(async move {
        let host = PeerHost::start(keypair, host_config)
            .await
            .context("Failed to start peer host")?;
        let channel = HttpChannel::new(
            host.clone(),
            PeerInfo::new(peer, vec![args.addr]),
            &config.path,
        );
        let ctx = RequestContext::new().with_timeout(config.request_timeout());
        let req = HttpRequest::new(args.data, headers)
            .with_method(method)
            .with_path(args.path);

        let outcome = match channel.request(&ctx, req).await {
            Ok(res) => {
                print_head(res.status(), res.headers());
                let body = res.bytes(MAX_BODY).await.map_err(|e| anyhow!(e))?;
                let mut stdout = std::io::stdout();
                stdout.write_all(&body)?;
                stdout.flush()?;
                Ok(())
            }
            Err(ChannelError::Remote(remote)) => {
                print_head(remote.status, &remote.headers);
                Err(anyhow!(remote))
            }
            Err(e) => Err(e.into()),
        };
        host.shutdown();
        outcome
    })
}

fn print_head(status: StatusCode, headers: &HeaderMap) {
    println!("{status}");
    for (name, value) in headers {
        println!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()));
    }
    println!();
}

/// Parse repeated `name:value` arguments, keeping repeats as separate values.
fn parse_headers(raw: &[String]) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for entry in raw {
        let Some((name, value)) = entry.split_once(':') else {
            bail!("Header '{entry}' must look like name:value");
        };
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .with_context(|| format!("Invalid header name in '{entry}'"))?;
        let value = HeaderValue::from_str(value.trim())
            .with_context(|| format!("Invalid header value in '{entry}'"))?;
        headers.append(name, value);
    }
    Ok(headers)
}

//! `peerhttp id` and `peerhttp serve`.

use anyhow::Context;
use peerhttp::config::{load_config, load_or_create_keypair};
use peerhttp::{echo, listen, PeerHost};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

pub fn cmd_id(config: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config.as_deref());
    let keypair = load_or_create_keypair(&config.key_path())?;
    println!("{}", keypair.peer_id());
    Ok(())
}

pub fn cmd_serve(config: Option<PathBuf>, listen_addr: Option<SocketAddr>) -> anyhow::Result<()> {
    let mut config = load_config(config.as_deref());
    if let Some(addr) = listen_addr {
        config.listen_addr = addr;
    }
    let keypair = load_or_create_keypair(&config.key_path())?;

    super::runtime()?.block_on(async move {
        let host = PeerHost::start(keypair, config.host_config())
            .await
            .context("Failed to start peer host")?;
        let listener = listen(&host)?;
        let closer = listener.closer();

        println!("peer id:   {}", host.peer_id());
        println!("listening: {}", host.local_addr());

        let on_signal = closer.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, closing listener");
                on_signal.close();
            }
        });

        axum::serve(listener, echo::router())
            .with_graceful_shutdown(async move { closer.closed().await })
            .await?;
        host.shutdown();
        Ok(())
    })
}

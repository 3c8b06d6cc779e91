//! Shared fixtures: real loopback hosts serving axum routers over peer streams.

#![allow(dead_code)]

use axum::Router;
use peerhttp::wire::{HostConfig, Keypair, PeerHost};
use peerhttp::{listen, ListenerCloser};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A host serving a router through an `HttpListener`.
pub struct Server {
    pub host: Arc<PeerHost>,
    pub closer: ListenerCloser,
    pub task: JoinHandle<()>,
}

impl Server {
    pub async fn stop(self) {
        self.closer.close();
        self.task.await.unwrap();
    }
}

pub async fn start_host() -> Arc<PeerHost> {
    PeerHost::start(Keypair::generate(), HostConfig::default())
        .await
        .unwrap()
}

pub async fn serve(router: Router) -> Server {
    let host = start_host().await;
    let listener = listen(&host).unwrap();
    let closer = listener.closer();
    let shutdown = closer.clone();
    let task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.closed().await })
            .await
            .unwrap();
    });
    Server { host, closer, task }
}

pub async fn serve_echo() -> Server {
    serve(peerhttp::echo::router()).await
}

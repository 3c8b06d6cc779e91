//! Clap CLI definitions for peerhttp.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  peerhttp id                              Print this node's peer id
  peerhttp serve                           Serve the echo router to peers
  peerhttp request --peer <ID> --addr 127.0.0.1:4710 --data ping";

/// peerhttp: HTTP requests between peers.
#[derive(Parser)]
#[command(name = "peerhttp", version, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print this node's peer id, creating the identity if needed.
    Id,
    /// Start a host and answer every request with the echo router.
    Serve {
        /// Override the configured listen address.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Send one request to a peer and print the response.
    Request {
        /// Peer id of the remote node (64 hex characters).
        #[arg(long)]
        peer: String,
        /// Socket address the remote node listens on.
        #[arg(long)]
        addr: SocketAddr,
        /// Request path, appended to the configured prefix.
        #[arg(long, default_value = "")]
        path: String,
        /// HTTP method.
        #[arg(long, short = 'X', default_value = "POST")]
        method: String,
        /// Header as `name:value`. May be repeated.
        #[arg(long = "header", short = 'H')]
        headers: Vec<String>,
        /// Request body.
        #[arg(long, short = 'd', default_value = "")]
        data: String,
    },
}

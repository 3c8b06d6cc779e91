//! peerhttp CLI: run a node that serves HTTP over peer streams, or send one
//! request to such a node.

mod cli;
mod cmd;

use crate::cli::*;
use clap::Parser;

fn init_tracing_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing_stderr();

    let result = match cli.command {
        Commands::Id => cmd::node::cmd_id(cli.config),
        Commands::Serve { listen } => cmd::node::cmd_serve(cli.config, listen),
        Commands::Request {
            peer,
            addr,
            path,
            method,
            headers,
            data,
        } => cmd::request::cmd_request(
            cli.config,
            cmd::request::RequestArgs {
                peer,
                addr,
                path,
                method,
                headers,
                data,
            },
        ),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

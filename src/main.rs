//! Entry point for `stream-over-udp`.
//!
//! Parses CLI arguments and dispatches into either **send** or **recv** mode.
//! All actual protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, argument parsing, standard-stream bindings).
//!
//! The receiver writes its ephemeral port as a bare line on stderr so a
//! supervising harness can pick it up; stdout is reserved for the delivered
//! stream itself.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{self, AsyncReadExt};

use stream_over_udp::endpoint;
use stream_over_udp::socket::Socket;

/// Reliable, ordered, one-way byte-stream delivery over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand)]
enum Role {
    /// Read a byte stream from stdin and deliver it to a receiver.
    Send {
        /// Receiver host name or address.
        host: String,
        /// Receiver port, as announced on the receiver's stderr.
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,
    },
    /// Bind an ephemeral UDP port, announce it on stderr, and write the
    /// delivered stream to stdout.
    Recv,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.role {
        Role::Send { host, port } => {
            let peer: SocketAddr = tokio::net::lookup_host((host.as_str(), port))
                .await
                .with_context(|| format!("resolving {host}:{port}"))?
                .next()
                .with_context(|| format!("no address found for {host}"))?;

            let socket = Socket::bind(SocketAddr::from(([0, 0, 0, 0], 0)))
                .await
                .context("binding sender socket")?;

            let mut stream = Vec::new();
            io::stdin()
                .read_to_end(&mut stream)
                .await
                .context("reading standard input")?;

            endpoint::run_sender(&socket, peer, &stream)
                .await
                .context("delivering stream")?;
        }
        Role::Recv => {
            let socket = Socket::bind(SocketAddr::from(([0, 0, 0, 0], 0)))
                .await
                .context("binding receiver socket")?;
            eprintln!("{}", socket.local_addr.port());

            let mut stdout = io::stdout();
            endpoint::run_receiver(&socket, &mut stdout)
                .await
                .context("receiving stream")?;
        }
    }
    Ok(())
}

//! waypointd — rendezvous and relay daemon for group communication.

use std::net::IpAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use waypointd::{Config, RelayServer};

#[derive(Parser, Debug)]
#[command(name = "waypointd", about = "Rendezvous and relay server for group communication", version)]
struct Opts {
    /// TCP port the server listens on
    #[arg(long, default_value_t = 12001)]
    port: u16,

    /// Address to bind; unset = all interfaces
    #[arg(long)]
    bind_addr: Option<IpAddr>,

    /// Max queue size of backlogged connections
    #[arg(long, default_value_t = 1000)]
    backlog: u32,

    /// Time in ms until an idle session expires; 0 = never expire
    #[arg(long, default_value_t = 60_000)]
    expiry: u64,

    /// Time in ms for SO_LINGER on accepted sockets; 0 = do not set
    #[arg(long, default_value_t = 2000)]
    solinger: u64,

    /// Time in ms for the per-record read timeout; 0 = block forever
    #[arg(long, default_value_t = 0)]
    sotimeout: u64,

    /// Max concurrently served sessions; accepts beyond this are rejected
    #[arg(long, default_value_t = 1024)]
    max_conns: usize,

    /// HTTP status endpoint port; 0 = disabled
    #[arg(long, default_value_t = 0)]
    status_port: u16,
}

impl Opts {
    fn into_config(self) -> Config {
        Config {
            port: self.port,
            bind_addr: self.bind_addr,
            backlog: self.backlog,
            expiry_ms: self.expiry,
            linger_ms: self.solinger,
            sock_read_timeout_ms: self.sotimeout,
            max_conns: self.max_conns,
            status_port: self.status_port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opts = Opts::parse();
    let server = RelayServer::new(opts.into_config());
    server
        .start()
        .await
        .context("failed to start relay server")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for shutdown signal")?;
    tracing::info!("shutdown signal received");
    server.stop().await;
    Ok(())
}

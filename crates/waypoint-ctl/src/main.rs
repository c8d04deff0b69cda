//! waypoint-ctl — command-line interface for the waypoint relay daemon.
//!
//! Talks to the daemon's HTTP status endpoint (`waypointd --status-port`).

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "waypoint-ctl", about = "Inspect a running waypoint relay daemon", version)]
struct Opts {
    /// Status endpoint port of the daemon
    #[arg(long, default_value_t = 12002)]
    port: u16,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Daemon overview: uptime, groups, sessions
    Status,
    /// Routing table: group -> registered logical addresses
    Routing,
    /// Logical -> physical address mappings
    Mappings,
}

#[derive(Deserialize)]
struct StatusResponse {
    uptime_secs: u64,
    groups: usize,
    sessions: Vec<SessionInfo>,
}

#[derive(Deserialize)]
struct SessionInfo {
    id: u64,
    peer: String,
    logical_addrs: Vec<String>,
    groups: Vec<String>,
    idle_ms: u64,
}

#[derive(Deserialize)]
struct RoutingResponse {
    groups: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct MappingsResponse {
    mappings: BTreeMap<String, String>,
}

async fn fetch<T: serde::de::DeserializeOwned>(port: u16, path: &str) -> Result<T> {
    reqwest::get(format!("http://127.0.0.1:{port}/{path}"))
        .await
        .context("failed to connect to waypointd — is it running with --status-port?")?
        .json::<T>()
        .await
        .context("failed to parse status response")
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();

    match opts.command.unwrap_or(Command::Status) {
        Command::Status => {
            let resp: StatusResponse = fetch(opts.port, "status").await?;
            println!("═══════════════════════════════════════");
            println!("  Waypoint Daemon Status");
            println!("═══════════════════════════════════════");
            println!("  Uptime          : {}s", resp.uptime_secs);
            println!("  Groups          : {}", resp.groups);
            println!("  Active sessions : {}", resp.sessions.len());

            if resp.sessions.is_empty() {
                println!("\n  No active sessions.");
            } else {
                println!("\n  Sessions:");
                for s in &resp.sessions {
                    println!("  ┌─ #{}", s.id);
                    println!("  │  peer      : {}", s.peer);
                    println!("  │  addresses : {}", s.logical_addrs.join(", "));
                    println!("  │  groups    : {}", s.groups.join(", "));
                    println!("  └─ idle      : {}ms", s.idle_ms);
                }
            }
        }
        Command::Routing => {
            let resp: RoutingResponse = fetch(opts.port, "routing").await?;
            if resp.groups.is_empty() {
                println!("empty routing table");
            }
            for (group, members) in &resp.groups {
                println!("{group}: {}", members.join(", "));
            }
        }
        Command::Mappings => {
            let resp: MappingsResponse = fetch(opts.port, "mappings").await?;
            if resp.mappings.is_empty() {
                println!("no address mappings");
            }
            for (logical, physical) in &resp.mappings {
                println!("{logical}: {physical}");
            }
        }
    }

    Ok(())
}

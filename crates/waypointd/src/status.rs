//! HTTP status endpoint — exposes daemon state as JSON.
//!
//! The operational counterpart of the routing-table and address-mapping
//! dumps: `/status` for sessions, `/routing` for group membership,
//! `/mappings` for logical → physical addresses. Consumed by waypoint-ctl.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::state::ServerState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub groups: usize,
    pub sessions: Vec<SessionInfo>,
}

#[derive(Serialize)]
pub struct SessionInfo {
    pub id: u64,
    pub peer: String,
    pub logical_addrs: Vec<String>,
    pub groups: Vec<String>,
    pub idle_ms: u64,
}

async fn handle_status(State(state): State<Arc<ServerState>>) -> Json<StatusResponse> {
    let sessions = state
        .sessions_snapshot()
        .into_iter()
        .map(|s| SessionInfo {
            id: s.id(),
            peer: s.peer().to_string(),
            logical_addrs: s.logical_addrs().iter().map(|a| a.to_string()).collect(),
            groups: s.known_groups(),
            idle_ms: s.idle_ms(&state),
        })
        .collect();

    Json(StatusResponse {
        uptime_secs: state.epoch.elapsed().as_secs(),
        groups: state.routing.group_count(),
        sessions,
    })
}

// ── /routing ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct RoutingResponse {
    pub groups: BTreeMap<String, Vec<String>>,
}

async fn handle_routing(State(state): State<Arc<ServerState>>) -> Json<RoutingResponse> {
    let groups = state
        .routing
        .dump()
        .into_iter()
        .map(|(group, members)| {
            (group, members.iter().map(|a| a.to_string()).collect())
        })
        .collect();
    Json(RoutingResponse { groups })
}

// ── /mappings ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct MappingsResponse {
    pub mappings: BTreeMap<String, String>,
}

async fn handle_mappings(State(state): State<Arc<ServerState>>) -> Json<MappingsResponse> {
    let mappings = state
        .mappings
        .dump()
        .into_iter()
        .map(|(addr, physical)| (addr.to_string(), physical.to_string()))
        .collect();
    Json(MappingsResponse { mappings })
}

// ── Router ───────────────────────────────────────────────────────────────────

pub async fn serve(
    state: Arc<ServerState>,
    port: u16,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/status", get(handle_status))
        .route("/routing", get(handle_routing))
        .route("/mappings", get(handle_mappings))
        .with_state(state);

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, "status endpoint listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

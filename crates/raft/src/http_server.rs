//! Raft RPC routes.
//!
//! Peers reach each other through `POST /raft/{append_entries,vote,install_snapshot}`
//! with JSON bodies. The router returned by [`create_router`] is merged into
//! the node's query router, so one listener serves clients and peers alike.

use crate::type_config::TypeConfig;
use crate::{NodeId, RaftNode};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use openraft::raft::{AppendEntriesRequest, InstallSnapshotRequest, VoteRequest};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use tracing::debug;

/// State shared by the RPC handlers.
#[derive(Clone)]
pub struct RaftHttpState {
    pub raft: Arc<RaftNode>,
}

impl RaftHttpState {
    pub fn new(raft: Arc<RaftNode>) -> Self {
        Self { raft }
    }
}

pub fn create_router(state: RaftHttpState) -> Router {
    Router::new()
        .route("/raft/append_entries", post(append_entries))
        .route("/raft/vote", post(vote))
        .route("/raft/install_snapshot", post(install_snapshot))
        .with_state(state)
}

/// 200 with the JSON response, or 500 with the error text.
fn rpc_reply<T: Serialize, E: Display>(rpc: &'static str, result: Result<T, E>) -> Response {
    match result {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            debug!(rpc, error = %e, "raft rpc failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{rpc} failed: {e}")).into_response()
        }
    }
}

async fn append_entries(
    State(state): State<RaftHttpState>,
    Json(req): Json<AppendEntriesRequest<TypeConfig>>,
) -> Response {
    rpc_reply("append_entries", state.raft.append_entries(req).await)
}

async fn vote(State(state): State<RaftHttpState>, Json(req): Json<VoteRequest<NodeId>>) -> Response {
    rpc_reply("vote", state.raft.vote(req).await)
}

async fn install_snapshot(
    State(state): State<RaftHttpState>,
    Json(req): Json<InstallSnapshotRequest<TypeConfig>>,
) -> Response {
    rpc_reply("install_snapshot", state.raft.install_snapshot(req).await)
}

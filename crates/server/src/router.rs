//! The query router: HTTP routes clients talk to.
//!
//! The leader replicates submitted statements and answers with their output.
//! Every other node redirects the caller to the leader, or to a random peer
//! when no leader is known.

use crate::error::ApiError;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::{CONTENT_TYPE, HOST, LOCATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::transport;
use common::{ClusterError, Member, NodeStatus, Role};
use raft::{Command, Consensus};
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Shared state for the query routes.
#[derive(Clone)]
pub struct AppState {
    pub consensus: Arc<dyn Consensus>,
    /// How long a submission may take before the caller gets `Timeout`.
    pub commit_timeout: Duration,
}

impl AppState {
    pub fn new(consensus: Arc<dyn Consensus>, commit_timeout: Duration) -> Self {
        Self {
            consensus,
            commit_timeout,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SqlParams {
    #[serde(default)]
    query: String,
}

/// Build the query router: `/sql`, `/healthcheck`, `/join` and `/status`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sql", post(sql_body).get(sql_param))
        .route("/healthcheck", get(healthcheck))
        .route("/join", post(join))
        .route("/status", get(status))
        .with_state(state)
}

async fn sql_body(State(state): State<AppState>, headers: HeaderMap, query: String) -> Response {
    submit(state, &headers, query).await
}

async fn sql_param(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SqlParams>,
) -> Response {
    submit(state, &headers, params.query).await
}

async fn submit(state: AppState, headers: &HeaderMap, query: String) -> Response {
    if state.consensus.role() != Role::Leader {
        return redirect(state.consensus.as_ref(), headers, &query);
    }

    let consensus = Arc::clone(&state.consensus);
    let submission = tokio::spawn(async move { consensus.submit(Command::sql(query)).await });

    // On timeout the submission keeps running; its result is dropped.
    let result = match tokio::time::timeout(state.commit_timeout, submission).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(ClusterError::ApplyRejected(e.to_string())),
        Err(_) => {
            warn!(timeout_ms = state.commit_timeout.as_millis() as u64, "command not applied in time");
            Err(ClusterError::Timeout)
        }
    };

    match result {
        Ok(response) => {
            let body = response
                .output()
                .map(|output| output.to_response())
                .unwrap_or_default();
            (
                StatusCode::OK,
                [(CONTENT_TYPE, "text/plain; charset=utf-8")],
                body,
            )
                .into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}

/// Send the caller to the leader, or to any peer when no leader is known.
fn redirect(consensus: &dyn Consensus, headers: &HeaderMap, query: &str) -> Response {
    let Some(target) = pick_target(consensus) else {
        return ApiError(ClusterError::NotReady).into_response();
    };

    let host = headers.get(HOST).and_then(|value| value.to_str().ok());
    match location(host, &target, query) {
        Ok(location) => {
            debug!(target = %target, %location, "redirecting query");
            (StatusCode::FOUND, [(LOCATION, location)]).into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}

fn pick_target(consensus: &dyn Consensus) -> Option<Member> {
    consensus.leader().or_else(|| {
        consensus
            .peers()
            .choose(&mut rand::thread_rng())
            .cloned()
    })
}

/// `http://<host>/sql?query=<query>` for `target`.
///
/// A socket-form `host` keeps its directory prefix with the target's name
/// substituted in; anything else is replaced by the target's own authority.
fn location(host: Option<&str>, target: &Member, query: &str) -> Result<String, ClusterError> {
    let authority = host
        .and_then(|host| transport::substitute_node(host, &target.name))
        .unwrap_or_else(|| transport::authority(&target.connection_string).to_string());

    let mut url = reqwest::Url::parse(&format!("http://{authority}/sql"))
        .map_err(|e| ClusterError::BadRequest(format!("invalid redirect target {authority}: {e}")))?;
    url.query_pairs_mut().append_pair("query", query);
    Ok(url.to_string())
}

async fn healthcheck() -> StatusCode {
    StatusCode::OK
}

async fn join(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let member: Member =
        serde_json::from_slice(&body).map_err(|e| ClusterError::BadRequest(e.to_string()))?;
    state.consensus.join(member).await?;
    Ok(StatusCode::OK)
}

async fn status(State(state): State<AppState>) -> Json<NodeStatus> {
    let consensus = &state.consensus;
    Json(NodeStatus {
        name: consensus.name().to_string(),
        role: consensus.role(),
        leader: consensus.leader(),
        peers: consensus.peers(),
    })
}

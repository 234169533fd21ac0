//! Webhook handler for GitHub deliveries

use axum::{
    Json,
    body::Bytes,
    extract::{ConnectInfo, State as AxumState},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::net::SocketAddr;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::SharedState;
use crate::dispatch::{dispatch, resolve};
use crate::event::{DELIVERY_HEADER, GitHubEvent};
use crate::webhook::PushPayload;

pub const HI_MSG: &str = "Hi!";
pub const WRONG_EVENT_TYPE_MSG: &str = "wrong event type";

/// Handles the GitHub webhook POST request.
///
/// IP check, then event routing, then mapping lookup and dispatch. Commands
/// are started in the background; the reply does not wait for them.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery = headers
        .get(DELIVERY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    if !state.access.is_allowed(&headers, peer).await {
        return StatusCode::FORBIDDEN.into_response();
    }

    match GitHubEvent::from_headers(&headers) {
        GitHubEvent::Ping => {
            info!("[{}] Ping received", delivery);
            return Json(json!({ "msg": HI_MSG })).into_response();
        }
        GitHubEvent::Other => {
            info!("[{}] Not push event; ignoring", delivery);
            return Json(json!({ "msg": WRONG_EVENT_TYPE_MSG })).into_response();
        }
        GitHubEvent::Push => {}
    }

    let target = match PushPayload::from_slice(&body).and_then(|payload| payload.target()) {
        Ok(target) => target,
        Err(e) => {
            warn!("[{}] {}", delivery, e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };
    debug!("[{}] Push to {:?}", delivery, target);

    let table = match state.config.snapshot() {
        Ok(table) => table,
        Err(e) => {
            error!("[{}] Repository config unavailable: {}", delivery, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "repository config unavailable",
            )
                .into_response();
        }
    };

    let Some((key, mapping)) = resolve(&table, &target) else {
        warn!(
            "[{}] No mapping for '{}' (branch {:?}), skipping.",
            delivery,
            target.repo_key(),
            target.branch
        );
        return StatusCode::NOT_FOUND.into_response();
    };

    let started = dispatch(mapping, state.launcher.as_ref(), &delivery);
    info!("[{}] '{}' matched, started {} process(es)", delivery, key, started);

    "OK".into_response()
}

//! Classification of incoming deliveries by their `X-GitHub-Event` header.

use axum::http::HeaderMap;

pub const EVENT_HEADER: &str = "x-github-event";
pub const DELIVERY_HEADER: &str = "x-github-delivery";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitHubEvent {
    Ping,
    Push,
    Other,
}

impl GitHubEvent {
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("ping") => GitHubEvent::Ping,
            Some("push") => GitHubEvent::Push,
            _ => GitHubEvent::Other,
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::from_name(headers.get(EVENT_HEADER).and_then(|v| v.to_str().ok()))
    }
}

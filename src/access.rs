//! Source-IP allow-listing against GitHub's published webhook ranges.

use async_trait::async_trait;
use axum::http::HeaderMap;
use ipnet::IpNet;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::Result;

pub const DEFAULT_META_URL: &str = "https://api.github.com/meta";
pub const REAL_IP_HEADER: &str = "x-real-ip";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

const USER_AGENT: &str = concat!("simple_git_hook/", env!("CARGO_PKG_VERSION"));

/// Somewhere to obtain the current list of webhook source ranges.
#[async_trait]
pub trait HookRangeSource: Send + Sync {
    async fn hook_ranges(&self) -> Result<Vec<IpNet>>;
}

#[derive(Debug, Deserialize)]
struct MetaResponse {
    hooks: Vec<String>,
}

/// Fetches the `hooks` ranges from GitHub's meta API on every call.
pub struct GitHubMeta {
    client: reqwest::Client,
    url: String,
}

impl GitHubMeta {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl HookRangeSource for GitHubMeta {
    async fn hook_ranges(&self) -> Result<Vec<IpNet>> {
        let meta: MetaResponse = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(parse_blocks(&meta.hooks))
    }
}

/// A fixed set of ranges.
pub struct StaticRanges(pub Vec<IpNet>);

#[async_trait]
impl HookRangeSource for StaticRanges {
    async fn hook_ranges(&self) -> Result<Vec<IpNet>> {
        Ok(self.0.clone())
    }
}

/// Parse CIDR strings, skipping (and logging) anything unparsable.
pub fn parse_blocks<S: AsRef<str>>(blocks: &[S]) -> Vec<IpNet> {
    blocks
        .iter()
        .filter_map(|block| {
            let block = block.as_ref();
            match block.parse::<IpNet>() {
                Ok(net) => Some(net),
                Err(e) => {
                    warn!("Ignoring unparsable hook range {:?}: {}", block, e);
                    None
                }
            }
        })
        .collect()
}

/// Returns true if `ip` lies inside the CIDR `block`. Malformed input is never a match.
pub fn is_ip_in_block(ip: &str, block: &str) -> bool {
    match (ip.trim().parse::<IpAddr>(), block.trim().parse::<IpNet>()) {
        (Ok(ip), Ok(net)) => net.contains(&ip),
        _ => false,
    }
}

/// Picks the address to check. Behind a trusted proxy that is `X-Real-IP`,
/// then the first `X-Forwarded-For` hop; otherwise only the socket peer.
///
/// Returns `None` if a trusted header is present but does not hold an IP address.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr, trust_forwarded: bool) -> Option<IpAddr> {
    if trust_forwarded {
        if let Some(value) = headers.get(REAL_IP_HEADER) {
            return parse_header_ip(value.to_str().ok()?);
        }
        if let Some(value) = headers.get(FORWARDED_FOR_HEADER) {
            return parse_header_ip(value.to_str().ok()?.split(',').next()?);
        }
    }
    Some(peer.ip().to_canonical())
}

fn parse_header_ip(value: &str) -> Option<IpAddr> {
    value
        .trim()
        .parse()
        .ok()
        .map(|ip: IpAddr| ip.to_canonical())
}

pub struct AccessGuard {
    source: Arc<dyn HookRangeSource>,
    trust_forwarded: bool,
}

impl AccessGuard {
    pub fn new(source: Arc<dyn HookRangeSource>, trust_forwarded: bool) -> Self {
        Self {
            source,
            trust_forwarded,
        }
    }

    /// Decide whether a request may proceed. Fails closed on any error.
    pub async fn is_allowed(&self, headers: &HeaderMap, peer: SocketAddr) -> bool {
        let Some(ip) = client_ip(headers, peer, self.trust_forwarded) else {
            warn!("Rejecting request with malformed client IP header (peer {})", peer);
            return false;
        };

        let ranges = match self.source.hook_ranges().await {
            Ok(ranges) => ranges,
            Err(e) => {
                error!("Could not fetch GitHub hook ranges, rejecting {}: {}", ip, e);
                return false;
            }
        };

        match ranges.iter().find(|net| net.contains(&ip)) {
            Some(net) => {
                debug!("{} allowed by hook range {}", ip, net);
                true
            }
            None => {
                warn!("{} is not in any GitHub hook range", ip);
                false
            }
        }
    }
}

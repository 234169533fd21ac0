use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::access::DEFAULT_META_URL;

const WILDCARD_HOST: &str = "0.0.0.0";
const PROXY_HOST: &str = "127.0.0.1";

/// Receives GitHub push webhooks and updates local checkouts.
#[derive(Debug, Clone, Parser)]
#[command(name = "simple_git_hook", version, about)]
pub struct Settings {
    /// Port to listen on
    #[arg(default_value_t = 80)]
    pub port: u16,

    /// Interface to bind
    #[arg(long, env = "HOST", default_value = WILDCARD_HOST)]
    pub host: String,

    /// Runtime environment; `dev` turns on debug logging
    #[arg(long = "env", env = "ENV")]
    pub environment: Option<String>,

    /// Running behind a reverse proxy: trust X-Real-IP / X-Forwarded-For and bind to loopback
    #[arg(long, env = "USE_PROXYFIX")]
    pub use_proxyfix: bool,

    /// Repository mapping file
    #[arg(long, env = "REPOS_JSON_PATH", default_value = "repos.json")]
    pub repos: PathBuf,

    /// Where to fetch GitHub's webhook IP ranges from
    #[arg(long, env = "GITHUB_META_URL", default_value = DEFAULT_META_URL)]
    pub meta_url: String,

    /// Timeout for the meta request, in seconds
    #[arg(long, env = "META_TIMEOUT_SECS", default_value_t = 10)]
    pub meta_timeout_secs: u64,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    pub fn is_dev(&self) -> bool {
        self.environment.as_deref() == Some("dev")
    }

    pub fn meta_timeout(&self) -> Duration {
        Duration::from_secs(self.meta_timeout_secs)
    }

    /// Host to bind; behind a proxy the wildcard address narrows to loopback.
    pub fn bind_host(&self) -> &str {
        if self.use_proxyfix && self.host == WILDCARD_HOST {
            PROXY_HOST
        } else {
            &self.host
        }
    }

    pub fn bind_address(&self) -> String {
        let host = self.bind_host();
        match host.parse::<std::net::IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{}:{}", host, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Settings {
        Settings::try_parse_from(std::iter::once("simple_git_hook").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn port_is_positional() {
        let settings = parse(&["--host", "10.1.2.3", "8080"]);
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.bind_address(), "10.1.2.3:8080");
    }

    #[test]
    fn rejects_non_numeric_port() {
        let result =
            Settings::try_parse_from(["simple_git_hook", "--host", "0.0.0.0", "eighty"]);
        assert!(result.is_err());
    }

    #[test]
    fn proxy_mode_binds_loopback_instead_of_wildcard() {
        let settings = parse(&["--host", "0.0.0.0", "--use-proxyfix", "9000"]);
        assert_eq!(settings.bind_host(), "127.0.0.1");

        let settings = parse(&["--host", "10.0.0.5", "--use-proxyfix", "9000"]);
        assert_eq!(settings.bind_host(), "10.0.0.5");
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let settings = parse(&["--host", "::1", "8080"]);
        assert_eq!(settings.bind_address(), "[::1]:8080");
    }

    #[test]
    fn dev_environment_flag() {
        assert!(parse(&["--host", "0.0.0.0", "--env", "dev", "1"]).is_dev());
        assert!(!parse(&["--host", "0.0.0.0", "--env", "prod", "1"]).is_dev());
    }
}

use std::path::PathBuf;
use std::time::Duration;

/// Everything needed to establish the single upstream channel.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub url: String,
    pub ca_cert: Option<PathBuf>,
    pub domain: Option<String>,
    pub connect_timeout: Duration,
}

pub struct Config {
    pub port: u16,
    pub upstream: UpstreamConfig,
    pub rpc_timeout: Duration,
    pub event_buffer: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let upstream = UpstreamConfig {
            url: std::env::var("PALAVER_UPSTREAM_URL")
                .unwrap_or_else(|_| "http://localhost:9001".to_string()),
            ca_cert: std::env::var("PALAVER_UPSTREAM_CA").ok().map(PathBuf::from),
            domain: std::env::var("PALAVER_UPSTREAM_DOMAIN").ok(),
            connect_timeout: Duration::from_secs(
                std::env::var("PALAVER_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
            ),
        };

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(39200),
            upstream,
            rpc_timeout: Duration::from_secs(
                std::env::var("PALAVER_RPC_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
            event_buffer: std::env::var("PALAVER_EVENT_BUFFER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(256),
        }
    }
}

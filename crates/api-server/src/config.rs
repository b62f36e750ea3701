//! Process configuration read from the environment

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use agent_runner::orchestrator::DEFAULT_REPLY;
use agent_runner::AgentToolAllowlist;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub runtime_url: Option<String>,
    pub turn_timeout: Duration,
    pub create_timeout: Duration,
    pub default_reply: String,
    pub default_model: String,
    pub stream_poll: Duration,
    pub graphviz_dot: String,
    pub agent_tool_allowlist: AgentToolAllowlist,
    pub mock_data_dir: Option<PathBuf>,
}

/// Subset of the config that is safe to expose on `/health`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub runtime_url: Option<String>,
    pub turn_timeout_secs: u64,
    pub default_model: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
            runtime_url: None,
            turn_timeout: Duration::from_secs(15),
            create_timeout: Duration::from_secs(6),
            default_reply: DEFAULT_REPLY.to_string(),
            default_model: agent_runner::network::DEFAULT_MODEL.to_string(),
            stream_poll: Duration::from_millis(500),
            graphviz_dot: "dot".to_string(),
            agent_tool_allowlist: AgentToolAllowlist::default(),
            mock_data_dir: None,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_string(name)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("API_HOST", defaults.host),
            port: env_or("API_PORT", defaults.port),
            runtime_url: env_string("AGENT_RUNTIME_URL"),
            turn_timeout: Duration::from_secs(env_or("TURN_TIMEOUT_SECS", 15)),
            create_timeout: Duration::from_secs(env_or("CREATE_TIMEOUT_SECS", 6)),
            default_reply: env_string("DEFAULT_REPLY").unwrap_or(defaults.default_reply),
            default_model: env_string("DEFAULT_MODEL").unwrap_or(defaults.default_model),
            stream_poll: Duration::from_millis(env_or("STREAM_POLL_MS", 500)),
            graphviz_dot: env_string("GRAPHVIZ_DOT").unwrap_or(defaults.graphviz_dot),
            agent_tool_allowlist: env_string("AGENT_TOOL_ROLE_ALLOWLIST")
                .map(|raw| AgentToolAllowlist::parse(&raw))
                .unwrap_or_default(),
            mock_data_dir: env_string("MOCK_DATA_DIR").map(PathBuf::from),
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            runtime_url: self.runtime_url.clone(),
            turn_timeout_secs: self.turn_timeout.as_secs(),
            default_model: self.default_model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.listen_addr().port(), 8000);
        assert_eq!(config.turn_timeout, Duration::from_secs(15));
        assert_eq!(config.stream_poll, Duration::from_millis(500));
        assert!(config.default_reply.starts_with("I couldn't generate"));
        assert!(config.agent_tool_allowlist.is_empty());
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("API_TEST_BAD_PORT", "not-a-port");
        assert_eq!(env_or("API_TEST_BAD_PORT", 9u16), 9);
        std::env::set_var("API_TEST_GOOD_PORT", " 8123 ");
        assert_eq!(env_or("API_TEST_GOOD_PORT", 9u16), 8123);
    }
}

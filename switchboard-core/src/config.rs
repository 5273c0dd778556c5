//! Environment-driven configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::limiter::DEFAULT_AGENT_LIMIT;

/// Tunables recognized by the context pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum similarity for a cache entry to count as a match.
    pub reload_similarity_floor: f64,
    /// Similarity at which a `<reload_options>` annotation is offered.
    pub reload_suggest_threshold: f64,
    /// Cap on reload-cache entries per session; LRU by last hit beyond it.
    pub max_cache_entries_per_session: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            reload_similarity_floor: 0.50,
            reload_suggest_threshold: 0.90,
            max_cache_entries_per_session: 200,
        }
    }
}

/// Process configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Process-wide cap on live agent instances (`MAX_AGENTS`).
    pub max_agents: usize,
    /// Listen port (`PORT`).
    pub port: u16,
    /// Provider identity (`PROVIDER`); `None` means auto-detect.
    pub provider: Option<String>,
    /// Retire a session this long after its last connection closes.
    pub session_idle_timeout: Duration,
    /// Context-pool tunables.
    pub pool: PoolConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_agents: DEFAULT_AGENT_LIMIT,
            port: 8000,
            provider: None,
            session_idle_timeout: Duration::from_secs(30 * 60),
            pool: PoolConfig::default(),
        }
    }
}

impl Config {
    /// Read configuration from the environment, falling back to defaults.
    ///
    /// Unparseable values fall back rather than failing startup; a warning
    /// is logged for each.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_agents = read_env("MAX_AGENTS")
            .and_then(|v| match v.parse::<usize>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    tracing::warn!(value = %v, "ignoring invalid MAX_AGENTS");
                    None
                }
            })
            .unwrap_or(defaults.max_agents);

        let port = read_env("PORT")
            .and_then(|v| match v.parse::<u16>() {
                Ok(p) => Some(p),
                Err(_) => {
                    tracing::warn!(value = %v, "ignoring invalid PORT");
                    None
                }
            })
            .unwrap_or(defaults.port);

        let provider = read_env("PROVIDER");

        Self {
            max_agents,
            port,
            provider,
            ..defaults
        }
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Root of switchboard's on-disk state (`<config dir>/switchboard`).
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("switchboard")
}

/// Per-session reload-cache file path under the default config directory.
pub fn reload_cache_path(session_id: &str) -> PathBuf {
    reload_cache_path_in(&config_dir(), session_id)
}

/// Per-session reload-cache file path under an explicit state directory.
pub fn reload_cache_path_in(base: &std::path::Path, session_id: &str) -> PathBuf {
    base.join("reload-cache")
        .join(format!("{}.json", sanitize(session_id)))
}

// Session ids come from clients; keep them path-safe.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_agents, 10);
        assert_eq!(config.port, 8000);
        assert!(config.provider.is_none());
        assert_eq!(config.pool.reload_similarity_floor, 0.50);
        assert_eq!(config.pool.reload_suggest_threshold, 0.90);
        assert_eq!(config.pool.max_cache_entries_per_session, 200);
    }

    #[test]
    fn test_reload_cache_path_is_sanitized() {
        let path = reload_cache_path("sess/../../etc");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, "sess______etc.json");
        assert!(path
            .parent()
            .unwrap()
            .ends_with(PathBuf::from("switchboard/reload-cache")));
    }
}

//! Process configuration loaded from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub use vidgen_observability::LogFormat;

use crate::jobs::PollPolicy;

pub const DEFAULT_XAI_BASE_URL: &str = "https://api.x.ai/v1";
pub const DEFAULT_MANAGEMENT_BASE_URL: &str = "https://management-api.x.ai";
pub const DATABASE_FILE_NAME: &str = "grok_imagine.db";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} is invalid: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Credentials for the billing/management API; both parts are required.
#[derive(Clone, PartialEq, Eq)]
pub struct ManagementConfig {
    pub api_key: String,
    pub team_id: String,
    pub base_url: String,
}

impl std::fmt::Debug for ManagementConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementConfig")
            .field("api_key", &"<redacted>")
            .field("team_id", &self.team_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub xai_api_key: String,
    pub xai_base_url: String,
    pub management: Option<ManagementConfig>,
    pub data_dir: PathBuf,
    pub static_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub poll_policy: PollPolicy,
    pub count_cache_ttl: Duration,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("xai_api_key", &"<redacted>")
            .field("xai_base_url", &self.xai_base_url)
            .field("management", &self.management)
            .field("data_dir", &self.data_dir)
            .field("static_dir", &self.static_dir)
            .field("bind_addr", &self.bind_addr)
            .field("poll_policy", &self.poll_policy)
            .field("count_cache_ttl", &self.count_cache_ttl)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let xai_api_key = get("XAI_API_KEY").ok_or(ConfigError::Missing("XAI_API_KEY"))?;
        let xai_base_url = get("XAI_BASE_URL").unwrap_or_else(|| DEFAULT_XAI_BASE_URL.to_string());

        let management = match (get("XAI_MANAGEMENT_KEY"), get("XAI_TEAM_ID")) {
            (Some(api_key), Some(team_id)) => Some(ManagementConfig {
                api_key,
                team_id,
                base_url: get("XAI_MANAGEMENT_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_MANAGEMENT_BASE_URL.to_string()),
            }),
            _ => None,
        };

        let data_dir = get("VIDGEN_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/data"));
        let static_dir = get("VIDGEN_STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("static"));

        let bind_addr = match get("VIDGEN_BIND_ADDR") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
                key: "VIDGEN_BIND_ADDR",
                message: format!("{e}"),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let defaults = PollPolicy::default();
        let poll_policy = PollPolicy {
            interval: secs(&get, "VIDGEN_POLL_INTERVAL_SECS", defaults.interval)?,
            max_duration: secs(&get, "VIDGEN_MAX_POLL_SECS", defaults.max_duration)?,
            transient_window: secs(&get, "VIDGEN_TRANSIENT_WINDOW_SECS", defaults.transient_window)?,
        };
        if poll_policy.interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "VIDGEN_POLL_INTERVAL_SECS",
                message: "must be greater than zero".to_string(),
            });
        }

        let count_cache_ttl = secs(&get, "VIDGEN_COUNT_CACHE_TTL_SECS", Duration::from_secs(5))?;

        let log_format = match get("LOG_FORMAT") {
            None => LogFormat::default(),
            Some(raw) => LogFormat::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                key: "LOG_FORMAT",
                message: format!("expected json or pretty, got {raw}"),
            })?,
        };

        Ok(Self {
            xai_api_key,
            xai_base_url,
            management,
            data_dir,
            static_dir,
            bind_addr,
            poll_policy,
            count_cache_ttl,
            log_format,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.data_dir.join("videos")
    }
}

fn secs<G>(get: &G, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::Invalid {
                key,
                message: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn api_key_is_required() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("XAI_API_KEY"));
    }

    #[test]
    fn defaults_follow_the_deployment_layout() {
        let cfg = AppConfig::from_lookup(lookup(&[("XAI_API_KEY", "k")])).unwrap();
        assert_eq!(cfg.xai_base_url, DEFAULT_XAI_BASE_URL);
        assert_eq!(cfg.database_path(), PathBuf::from("/data/grok_imagine.db"));
        assert_eq!(cfg.videos_dir(), PathBuf::from("/data/videos"));
        assert_eq!(cfg.poll_policy, PollPolicy::default());
        assert_eq!(cfg.count_cache_ttl, Duration::from_secs(5));
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert!(cfg.management.is_none());
    }

    #[test]
    fn management_requires_key_and_team() {
        let only_key = AppConfig::from_lookup(lookup(&[
            ("XAI_API_KEY", "k"),
            ("XAI_MANAGEMENT_KEY", "m"),
        ]))
        .unwrap();
        assert!(only_key.management.is_none());

        let both = AppConfig::from_lookup(lookup(&[
            ("XAI_API_KEY", "k"),
            ("XAI_MANAGEMENT_KEY", "m"),
            ("XAI_TEAM_ID", "team-1"),
        ]))
        .unwrap();
        let mgmt = both.management.unwrap();
        assert_eq!(mgmt.team_id, "team-1");
        assert_eq!(mgmt.base_url, DEFAULT_MANAGEMENT_BASE_URL);
    }

    #[test]
    fn poll_overrides_and_bad_numbers() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("XAI_API_KEY", "k"),
            ("VIDGEN_POLL_INTERVAL_SECS", "2"),
            ("VIDGEN_MAX_POLL_SECS", "60"),
        ]))
        .unwrap();
        assert_eq!(cfg.poll_policy.interval, Duration::from_secs(2));
        assert_eq!(cfg.poll_policy.max_duration, Duration::from_secs(60));

        let err = AppConfig::from_lookup(lookup(&[
            ("XAI_API_KEY", "k"),
            ("VIDGEN_POLL_INTERVAL_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "VIDGEN_POLL_INTERVAL_SECS", .. }));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let cfg = AppConfig::from_lookup(lookup(&[("XAI_API_KEY", "super-secret")])).unwrap();
        assert!(!format!("{cfg:?}").contains("super-secret"));
    }
}

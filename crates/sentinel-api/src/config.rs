//! Process configuration, read once from the environment.

use sentinel_client::DEFAULT_API_URL;
use sentinel_engine::{AgentIdentity, AllowList, EnforcementConfig, EnforcementMode};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_url: String,
    pub listen: SocketAddr,
    pub protected_labels: Vec<String>,
    pub allowed_actor_ids: Vec<String>,
    pub allowed_actor_emails: Vec<String>,
    pub agent: AgentIdentity,
    pub mode: EnforcementMode,
    pub revert_delay: Duration,
    pub cache_path: PathBuf,
    pub audit_path: PathBuf,
    pub slack_webhook_url: Option<String>,
    pub http_timeout: Duration,
    pub http_max_retries: usize,
    /// `None` disables the freshness check.
    pub webhook_max_age: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get("LINEAR_API_KEY").ok_or(ConfigError::Missing("LINEAR_API_KEY"))?;

        let listen_raw = get("SENTINEL_LISTEN").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let listen: SocketAddr = listen_raw.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
            name: "SENTINEL_LISTEN",
            value: listen_raw.clone(),
            reason: e.to_string(),
        })?;

        let protected_labels = split_list(get("PROTECTED_LABELS").as_deref().unwrap_or("Vulnerability"));
        if protected_labels.is_empty() {
            return Err(ConfigError::Invalid {
                name: "PROTECTED_LABELS",
                value: get("PROTECTED_LABELS").unwrap_or_default(),
                reason: "no label names".to_string(),
            });
        }

        let mode: EnforcementMode = match get("SENTINEL_MODE") {
            Some(raw) => raw.parse().map_err(|e: sentinel_engine::ParseModeError| ConfigError::Invalid {
                name: "SENTINEL_MODE",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => EnforcementMode::default(),
        };

        let revert_delay = Duration::from_millis(parse_num(&get, "REVERT_DELAY_MS", 1500)?);
        let http_timeout = Duration::from_secs(parse_num(&get, "HTTP_TIMEOUT_SECS", 30)?);
        let http_max_retries = parse_num(&get, "HTTP_MAX_RETRIES", 3)? as usize;
        let max_age = parse_num(&get, "WEBHOOK_MAX_AGE_SECS", 60)?;

        Ok(Self {
            api_key,
            api_url: get("LINEAR_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            listen,
            protected_labels,
            allowed_actor_ids: split_list(get("ALLOWED_ACTOR_IDS").as_deref().unwrap_or("")),
            allowed_actor_emails: split_list(get("ALLOWED_ACTOR_EMAILS").as_deref().unwrap_or("")),
            agent: AgentIdentity {
                id: get("AGENT_USER_ID"),
                email: get("AGENT_EMAIL"),
                name: get("AGENT_NAME"),
            },
            mode,
            revert_delay,
            cache_path: PathBuf::from(
                get("STATE_CACHE_PATH").unwrap_or_else(|| "sentinel-cache.json".to_string()),
            ),
            audit_path: PathBuf::from(
                get("AUDIT_LOG_PATH").unwrap_or_else(|| "sentinel-audit.jsonl".to_string()),
            ),
            slack_webhook_url: get("SLACK_WEBHOOK_URL"),
            http_timeout,
            http_max_retries,
            webhook_max_age: (max_age > 0).then(|| Duration::from_secs(max_age)),
        })
    }

    /// Engine settings; `agent` is the identity after startup discovery.
    pub fn enforcement(&self, agent: AgentIdentity) -> EnforcementConfig {
        EnforcementConfig::new(&self.protected_labels)
            .with_allow_list(AllowList::new(
                self.allowed_actor_ids.iter().cloned(),
                &self.allowed_actor_emails,
            ))
            .with_agent(agent)
            .with_mode(self.mode)
            .with_revert_delay(self.revert_delay)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_num<G>(get: &G, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
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
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[("LINEAR_API_KEY", "lin_api_x")])).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.protected_labels, vec!["Vulnerability"]);
        assert_eq!(config.mode, EnforcementMode::Enforce);
        assert_eq!(config.revert_delay, Duration::from_millis(1500));
        assert_eq!(config.http_max_retries, 3);
        assert_eq!(config.webhook_max_age, Some(Duration::from_secs(60)));
        assert!(config.agent.is_empty());
        assert!(config.slack_webhook_url.is_none());
    }

    #[test]
    fn api_key_is_required() {
        let err = Config::from_lookup(lookup(&[("LINEAR_API_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("LINEAR_API_KEY")));
    }

    #[test]
    fn lists_and_overrides_parse() {
        let config = Config::from_lookup(lookup(&[
            ("LINEAR_API_KEY", "k"),
            ("PROTECTED_LABELS", "Vulnerability, Embargoed ,"),
            ("ALLOWED_ACTOR_EMAILS", "lead@example.com,ciso@example.com"),
            ("SENTINEL_MODE", "dry-run"),
            ("REVERT_DELAY_MS", "2500"),
            ("WEBHOOK_MAX_AGE_SECS", "0"),
            ("AGENT_EMAIL", "bot@example.com"),
        ]))
        .unwrap();
        assert_eq!(config.protected_labels, vec!["Vulnerability", "Embargoed"]);
        assert_eq!(config.allowed_actor_emails.len(), 2);
        assert_eq!(config.mode, EnforcementMode::DryRun);
        assert_eq!(config.revert_delay, Duration::from_millis(2500));
        assert_eq!(config.webhook_max_age, None);
        assert_eq!(config.agent.email.as_deref(), Some("bot@example.com"));
        let engine = config.enforcement(config.agent.clone());
        assert!(engine.is_protected_name("embargoed"));
    }

    #[test]
    fn bad_values_are_rejected() {
        for (key, value) in [
            ("SENTINEL_MODE", "yolo"),
            ("REVERT_DELAY_MS", "soon"),
            ("SENTINEL_LISTEN", "nowhere"),
            ("PROTECTED_LABELS", ",,"),
        ] {
            let err = Config::from_lookup(lookup(&[("LINEAR_API_KEY", "k"), (key, value)]))
                .unwrap_err();
            match err {
                ConfigError::Invalid { name, .. } => assert_eq!(name, key),
                other => panic!("unexpected error for {key}: {other:?}"),
            }
        }
    }
}

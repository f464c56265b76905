//! Runtime configuration.
//!
//! Resolution order, later wins: built-in defaults, an optional TOML file,
//! the `NEXT_PUBLIC_API_BASE_URL` / `NEXT_PUBLIC_WS_URL` environment
//! variables, then command-line flags (applied by [`crate::cli`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheConfig, CACHE_KEY, CACHE_TTL_MS};
use crate::error::ChatError;

pub const ENV_API_BASE_URL: &str = "NEXT_PUBLIC_API_BASE_URL";
pub const ENV_WS_URL: &str = "NEXT_PUBLIC_WS_URL";

/// Which realtime transport carries the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Sse,
    Ws,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Sse => write!(f, "sse"),
            Transport::Ws => write!(f, "ws"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub transport: Transport,
    /// Base URL of the REST/SSE API, without a trailing slash.
    pub api_base_url: String,
    pub ws_url: String,
    /// SQLite file backing the local cache, identity and token.
    pub storage_path: PathBuf,
    pub cache_key: String,
    pub cache_ttl_ms: u64,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            transport: Transport::Sse,
            api_base_url: "http://localhost:8000/api/v1".to_string(),
            ws_url: "ws://localhost:8000/ws/chat".to_string(),
            storage_path: PathBuf::from("livechat.db"),
            cache_key: CACHE_KEY.to_string(),
            cache_ttl_ms: CACHE_TTL_MS,
            request_timeout_secs: 120,
            connect_timeout_secs: 10,
        }
    }
}

impl ChatConfig {
    /// Defaults, overlaid by `path` when given, then by the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ChatError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ChatError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
            .map_err(|e| ChatError::Config(format!("parsing {}: {}", path.display(), e)))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Overlay URL overrides from an environment lookup. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(url) = lookup(ENV_WS_URL).filter(|v| !v.trim().is_empty()) {
            self.ws_url = url;
        }
        self.normalize();
    }

    /// Strip trailing slashes so endpoint joins never produce `//`.
    pub fn normalize(&mut self) {
        let trimmed = self.api_base_url.trim_end_matches('/').len();
        self.api_base_url.truncate(trimmed);
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig { key: self.cache_key.clone(), ttl_ms: self.cache_ttl_ms }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let c = ChatConfig::default();
        assert_eq!(c.transport, Transport::Sse);
        assert_eq!(c.cache_key, "chat_live_cache_v1");
        assert_eq!(c.cache_ttl_ms, 3_600_000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let c = ChatConfig::from_toml_str(
            r#"
            transport = "ws"
            ws_url = "wss://chat.example.com/ws"
            "#,
        )
        .expect("parse");
        assert_eq!(c.transport, Transport::Ws);
        assert_eq!(c.ws_url, "wss://chat.example.com/ws");
        assert_eq!(c.api_base_url, ChatConfig::default().api_base_url);
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(ChatConfig::from_toml_str("transport = \"carrier-pigeon\"").is_err());
    }

    #[test]
    fn test_env_overrides_urls() {
        let env: HashMap<&str, &str> = [
            (ENV_API_BASE_URL, "https://api.example.com/v2/"),
            (ENV_WS_URL, "wss://api.example.com/ws"),
        ]
        .into_iter()
        .collect();
        let mut c = ChatConfig::default();
        c.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.api_base_url, "https://api.example.com/v2");
        assert_eq!(c.ws_url, "wss://api.example.com/ws");
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut c = ChatConfig::default();
        c.apply_env(|_| Some("   ".to_string()));
        assert_eq!(c, ChatConfig::default());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "cache_ttl_ms = 5000\nrequest_timeout_secs = 30").expect("write");
        let c = ChatConfig::from_file(file.path()).expect("load");
        assert_eq!(c.cache_ttl_ms, 5000);
        assert_eq!(c.request_timeout(), Duration::from_secs(30));
        assert_eq!(c.cache_config().ttl_ms, 5000);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ChatConfig::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }
}

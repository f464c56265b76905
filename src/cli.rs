use std::path::PathBuf;

use clap::Parser;

use crate::config::{ChatConfig, Transport};

#[derive(Parser, Debug)]
#[command(name = "livechat")]
#[command(version)]
#[command(about = "Terminal client for a streaming AI chat backend")]
pub struct Args {
    /// Send this message, print the reply and exit (interactive when omitted)
    pub message: Option<String>,

    /// Transport: sse (one POST per turn) or ws (persistent socket)
    #[arg(long, value_enum)]
    pub transport: Option<Transport>,

    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Base URL of the chat API (overrides config and environment)
    #[arg(long)]
    pub api_base_url: Option<String>,

    /// WebSocket endpoint URL
    #[arg(long)]
    pub ws_url: Option<String>,

    /// SQLite file holding the chat cache and identity
    #[arg(long)]
    pub storage: Option<PathBuf>,

    /// Bearer token; stored as the access token for later runs
    #[arg(long)]
    pub token: Option<String>,

    /// Remove the cached conversation before starting
    #[arg(long)]
    pub clear_cache: bool,
}

impl Args {
    /// Overlay explicit flags onto `config`; flags win over file and env.
    pub fn apply_to(&self, config: &mut ChatConfig) {
        if let Some(t) = self.transport {
            config.transport = t;
        }
        if let Some(url) = &self.api_base_url {
            config.api_base_url = url.clone();
        }
        if let Some(url) = &self.ws_url {
            config.ws_url = url.clone();
        }
        if let Some(path) = &self.storage {
            config.storage_path = path.clone();
        }
        config.normalize();
    }
}

/// A line typed at the interactive prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Retry,
    Clear,
    Quit,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "" => Command::Empty,
            "/retry" => Command::Retry,
            "/clear" => Command::Clear,
            "/quit" | "/exit" => Command::Quit,
            other if other.starts_with('/') => Command::Unknown(other.to_string()),
            other => Command::Send(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_minimal() {
        let args = Args::parse_from(["livechat"]);
        assert!(args.message.is_none());
        assert!(args.transport.is_none());
        assert!(!args.clear_cache);
    }

    #[test]
    fn test_args_parse_full() {
        let args = Args::parse_from([
            "livechat",
            "hello there",
            "--transport",
            "ws",
            "--api-base-url",
            "http://api.test/v1/",
            "--ws-url",
            "ws://api.test/ws",
            "--storage",
            "/tmp/chat.db",
            "--token",
            "tok",
            "--clear-cache",
        ]);
        assert_eq!(args.message.as_deref(), Some("hello there"));
        assert_eq!(args.transport, Some(Transport::Ws));
        assert_eq!(args.token.as_deref(), Some("tok"));
        assert!(args.clear_cache);
    }

    #[test]
    fn test_args_reject_unknown_transport() {
        assert!(Args::try_parse_from(["livechat", "--transport", "grpc"]).is_err());
    }

    #[test]
    fn test_apply_to_overrides_config() {
        let args = Args::parse_from(["livechat", "--transport", "ws", "--api-base-url", "http://x/api/"]);
        let mut config = ChatConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.transport, Transport::Ws);
        assert_eq!(config.api_base_url, "http://x/api");
    }

    #[test]
    fn test_apply_to_keeps_unset_fields() {
        let args = Args::parse_from(["livechat"]);
        let mut config = ChatConfig::default();
        let before = config.ws_url.clone();
        args.apply_to(&mut config);
        assert_eq!(config.ws_url, before);
        assert_eq!(config.transport, Transport::Sse);
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("  hi  "), Command::Send("hi".into()));
        assert_eq!(Command::parse("/retry"), Command::Retry);
        assert_eq!(Command::parse("/clear"), Command::Clear);
        assert_eq!(Command::parse("/quit"), Command::Quit);
        assert_eq!(Command::parse(""), Command::Empty);
        assert_eq!(Command::parse("/nope"), Command::Unknown("/nope".into()));
    }
}

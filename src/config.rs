use crate::constants::cache::DEFAULT_TTL_MS;
use crate::constants::network::TIMEOUT_API_REQUEST_MS;
use crate::errors::ToolError;
use crate::services::logger::LogLevel;
use crate::utils::paths::{instances_path_override, resolve_instances_path, resolve_key_path};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    File(PathBuf),
}

impl StoreConfig {
    fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("memory") {
            StoreConfig::Memory
        } else {
            StoreConfig::File(PathBuf::from(raw.trim()))
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub user_id: Option<String>,
    pub store: StoreConfig,
    pub key_path: PathBuf,
    pub proxy_timeout_ms: u64,
    pub cache_ttl_ms: u64,
    pub log_level: LogLevel,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            store: StoreConfig::Memory,
            key_path: PathBuf::from(".instances.key"),
            proxy_timeout_ms: TIMEOUT_API_REQUEST_MS,
            cache_ttl_ms: DEFAULT_TTL_MS,
            log_level: LogLevel::Info,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_millis(key: &str, fallback: u64) -> Result<u64, ToolError> {
    match env_string(key) {
        None => Ok(fallback),
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            ToolError::invalid_params(format!("{} must be a whole number of milliseconds", key))
                .with_details(serde_json::json!({"value": raw}))
        }),
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ToolError> {
        let store = match instances_path_override() {
            Some(path) => StoreConfig::parse(&path.to_string_lossy()),
            None => StoreConfig::File(resolve_instances_path()),
        };
        Ok(Self {
            user_id: env_string("DHIS_USER_ID"),
            store,
            key_path: resolve_key_path(),
            proxy_timeout_ms: env_millis("DHIS_PROXY_TIMEOUT_MS", TIMEOUT_API_REQUEST_MS)?,
            cache_ttl_ms: env_millis("DHIS_CACHE_TTL_MS", DEFAULT_TTL_MS)?,
            log_level: LogLevel::from_env(),
        })
    }

    /// Flags win over the environment.
    pub fn apply_overrides(mut self, overrides: &ServeArgs) -> Self {
        if let Some(user_id) = overrides.user_id.as_deref().map(str::trim) {
            self.user_id = Some(user_id.to_string()).filter(|id| !id.is_empty());
        }
        if let Some(store) = overrides.store.as_deref() {
            self.store = StoreConfig::parse(store);
        }
        if let Some(timeout) = overrides.proxy_timeout_ms {
            self.proxy_timeout_ms = timeout;
        }
        if let Some(ttl) = overrides.cache_ttl_ms {
            self.cache_ttl_ms = ttl;
        }
        if let Some(level) = overrides.log_level.as_deref().and_then(LogLevel::parse) {
            self.log_level = level;
        }
        self
    }
}

#[derive(Debug, Parser)]
#[command(name = "dhis2-bridge")]
#[command(about = "MCP stdio server proxying tool calls to registered DHIS2 instances")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve JSON-RPC over stdin/stdout (default)
    Serve(ServeArgs),
    /// Check a base URL and API token once and print the result
    Verify {
        #[arg(long)]
        url: String,
        #[arg(long)]
        token: String,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    /// User the tool calls act for
    #[arg(long)]
    pub user_id: Option<String>,

    /// `memory` or the path of the instances file
    #[arg(long)]
    pub store: Option<String>,

    #[arg(long)]
    pub proxy_timeout_ms: Option<u64>,

    /// 0 keeps cache entries until a mutation invalidates them
    #[arg(long)]
    pub cache_ttl_ms: Option<u64>,

    #[arg(long)]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_parses_memory_keyword() {
        assert_eq!(StoreConfig::parse(" Memory "), StoreConfig::Memory);
        assert_eq!(
            StoreConfig::parse("/var/lib/dhis2/instances.json"),
            StoreConfig::File(PathBuf::from("/var/lib/dhis2/instances.json"))
        );
    }

    #[test]
    fn flags_override_defaults() {
        let config = RuntimeConfig::default().apply_overrides(&ServeArgs {
            user_id: Some(" user-7 ".to_string()),
            store: Some("memory".to_string()),
            proxy_timeout_ms: Some(1500),
            cache_ttl_ms: Some(0),
            log_level: Some("debug".to_string()),
        });
        assert_eq!(config.user_id.as_deref(), Some("user-7"));
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.proxy_timeout_ms, 1500);
        assert_eq!(config.cache_ttl_ms, 0);
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn cli_defaults_to_serve() {
        let cli = Cli::parse_from(["dhis2-bridge", "--user-id", "u1"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.serve.user_id.as_deref(), Some("u1"));

        let cli = Cli::parse_from(["dhis2-bridge", "verify", "--url", "https://x", "--token", "t"]);
        assert!(matches!(cli.command, Some(Command::Verify { .. })));
    }
}

//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "riverbero";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_RELAY_PATH: &str = "/store";
const DEFAULT_RELAY_KEY: &str = "store";
const DEFAULT_STORE_ID: &str = "store";
const DEFAULT_CACHE_ID: &str = "state";
const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 16;
const DEFAULT_FEED_CAPACITY: usize = 1024;
const DEFAULT_HISTORY_LIMIT: usize = 0;

/// Command-line arguments for the Riverbero binary.
#[derive(Debug, Parser)]
#[command(name = "riverbero", version, about = "Riverbero state relay server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "RIVERBERO_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Riverbero relay server.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the relay mount path.
    #[arg(long = "relay-path", value_name = "PATH")]
    pub relay_path: Option<String>,

    /// Override the served store id.
    #[arg(long = "relay-store", value_name = "ID")]
    pub relay_store: Option<String>,

    /// Override the served cache id.
    #[arg(long = "relay-cache", value_name = "ID")]
    pub relay_cache: Option<String>,

    /// Override the per-subscriber outbound queue depth.
    #[arg(long = "relay-queue-capacity", value_name = "COUNT")]
    pub relay_queue_capacity: Option<usize>,

    /// Override the cache feed capacity.
    #[arg(long = "cache-feed-capacity", value_name = "COUNT")]
    pub cache_feed_capacity: Option<usize>,

    /// Override the retained history entries per cache (0 keeps everything).
    #[arg(long = "cache-history-limit", value_name = "COUNT")]
    pub cache_history_limit: Option<usize>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub relay: RelaySettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub path: String,
    pub key: String,
    pub store: String,
    pub cache: String,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub feed_capacity: usize,
    pub history_limit: usize,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Parse CLI arguments and load settings in one step.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("RIVERBERO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    relay: RawRelaySettings,
    cache: RawCacheSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(path) = overrides.relay_path.as_ref() {
            self.relay.path = Some(path.clone());
        }
        if let Some(store) = overrides.relay_store.as_ref() {
            self.relay.store = Some(store.clone());
        }
        if let Some(cache) = overrides.relay_cache.as_ref() {
            self.relay.cache = Some(cache.clone());
        }
        if let Some(capacity) = overrides.relay_queue_capacity {
            self.relay.queue_capacity = Some(capacity);
        }
        if let Some(capacity) = overrides.cache_feed_capacity {
            self.cache.feed_capacity = Some(capacity);
        }
        if let Some(limit) = overrides.cache_history_limit {
            self.cache.history_limit = Some(limit);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            relay,
            cache,
            logging,
        } = raw;

        let server = build_server_settings(server)?;
        let relay = build_relay_settings(relay)?;
        let cache = build_cache_settings(cache)?;
        let logging = build_logging_settings(logging)?;

        Ok(Self {
            server,
            relay,
            cache,
            logging,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_relay_settings(relay: RawRelaySettings) -> Result<RelaySettings, LoadError> {
    let path = relay.path.unwrap_or_else(|| DEFAULT_RELAY_PATH.to_string());
    if path.trim().is_empty() {
        return Err(LoadError::invalid("relay.path", "path must be non-empty"));
    }

    let key = relay.key.unwrap_or_else(|| DEFAULT_RELAY_KEY.to_string());
    if key.trim().is_empty() {
        return Err(LoadError::invalid("relay.key", "key must be non-empty"));
    }

    let store = relay.store.unwrap_or_else(|| DEFAULT_STORE_ID.to_string());
    if store.trim().is_empty() {
        return Err(LoadError::invalid(
            "relay.store",
            "store id must be non-empty",
        ));
    }

    let cache = relay.cache.unwrap_or_else(|| DEFAULT_CACHE_ID.to_string());
    if cache.trim().is_empty() {
        return Err(LoadError::invalid(
            "relay.cache",
            "cache id must be non-empty",
        ));
    }

    let queue_capacity = relay
        .queue_capacity
        .unwrap_or(DEFAULT_SUBSCRIBER_QUEUE_CAPACITY);
    if queue_capacity == 0 {
        return Err(LoadError::invalid(
            "relay.queue_capacity",
            "must be greater than zero",
        ));
    }

    Ok(RelaySettings {
        path,
        key,
        store,
        cache,
        queue_capacity,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let feed_capacity = cache.feed_capacity.unwrap_or(DEFAULT_FEED_CAPACITY);
    if feed_capacity == 0 {
        return Err(LoadError::invalid(
            "cache.feed_capacity",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        feed_capacity,
        history_limit: cache.history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    format!("{host}:{port}")
        .parse()
        .map_err(|err| format!("failed to parse `{host}:{port}`: {err}"))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRelaySettings {
    path: Option<String>,
    key: Option<String>,
    store: Option<String>,
    cache: Option<String>,
    queue_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    feed_capacity: Option<usize>,
    history_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[cfg(test)]
mod tests;

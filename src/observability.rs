//! Logging setup and the calendar server's lifecycle events.

use std::net::SocketAddr;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{env_value, parse_bool, ServerConfig};
use crate::grouping::GroupingStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" | "text" => Some(Self::Pretty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn logging_config_from_env() -> LoggingConfig {
    logging_config_from_lookup(env_value)
}

/// Unlike the server settings, unusable logging values never fail startup:
/// each one keeps its default.
pub fn logging_config_from_lookup<F>(lookup: F) -> LoggingConfig
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = LoggingConfig::default();
    LoggingConfig {
        level: lookup("POLYCAL_LOG_LEVEL").unwrap_or(defaults.level),
        format: lookup("POLYCAL_LOG_FORMAT")
            .and_then(|raw| LogFormat::parse(&raw))
            .unwrap_or(defaults.format),
        include_target: lookup("POLYCAL_LOG_TARGET")
            .and_then(|raw| parse_bool(&raw))
            .unwrap_or(defaults.include_target),
    }
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(config.format == LogFormat::Pretty);

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(logging: &LoggingConfig, server: &ServerConfig) {
    info!(
        component = "calendar_server",
        event = "app.start",
        log_level = %logging.level,
        log_format = ?logging.format,
        grouping = server.grouping.as_str(),
        events_file = %server.events_source_label(),
        cache_path = %server.cache_label(),
        cache_ttl_ms = server.cache_ttl_ms
    );
}

pub fn log_app_bind(bound_addr: SocketAddr, routes: &[&str]) {
    info!(
        component = "calendar_server",
        event = "app.bind",
        bind_addr = %bound_addr,
        routes = %routes.join(" ")
    );
}

pub fn log_source_selected(source: &str, strategy: GroupingStrategy, cache_ttl_ms: Option<i64>) {
    let strategy = strategy.as_str();
    match cache_ttl_ms {
        Some(cache_ttl_ms) => info!(
            component = "calendar_server",
            event = "source.selected",
            source,
            strategy,
            cache_ttl_ms
        ),
        None => info!(
            component = "calendar_server",
            event = "source.selected",
            source,
            strategy,
            cache = "disabled"
        ),
    }
}

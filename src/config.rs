//! Calendar server configuration from `POLYCAL_*` environment variables.
//!
//! Both this module and the logging setup read settings through a lookup
//! function (`key -> Option<value>`), so tests pass a map instead of
//! mutating the process environment.

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cache::DEFAULT_CACHE_TTL_MS;
use crate::grouping::{parse_grouping_strategy, GroupingStrategy, GroupingStrategyError};

pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_CACHE_PATH: &str = "data/polycal-cache.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// JSON rows to serve; demo data when absent.
    pub events_file: Option<PathBuf>,
    /// `None` disables the snapshot cache.
    pub cache_path: Option<PathBuf>,
    pub cache_ttl_ms: i64,
    pub grouping: GroupingStrategy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            events_file: None,
            cache_path: Some(PathBuf::from(DEFAULT_CACHE_PATH)),
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            grouping: GroupingStrategy::default(),
        }
    }
}

impl ServerConfig {
    pub fn events_source_label(&self) -> String {
        path_label(self.events_file.as_deref(), "demo")
    }

    pub fn cache_label(&self) -> String {
        path_label(self.cache_path.as_deref(), "disabled")
    }
}

#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("POLYCAL_ADDR is not a socket address: {0}")]
    Addr(#[from] std::net::AddrParseError),
    #[error("POLYCAL_CACHE_TTL_MS must be a non-negative integer, got {0:?}")]
    CacheTtl(String),
    #[error("POLYCAL_GROUPING: {0}")]
    Grouping(#[from] GroupingStrategyError),
}

pub fn server_config_from_env() -> Result<ServerConfig, ServerConfigError> {
    server_config_from_lookup(env_value)
}

pub fn server_config_from_lookup<F>(lookup: F) -> Result<ServerConfig, ServerConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ServerConfig::default();

    if let Some(addr) = lookup("POLYCAL_ADDR") {
        config.addr = addr.parse()?;
    }

    config.events_file = lookup("POLYCAL_EVENTS_FILE").map(PathBuf::from);

    if let Some(cache_path) = lookup("POLYCAL_CACHE_PATH") {
        config.cache_path = if is_disabled(&cache_path) {
            None
        } else {
            Some(PathBuf::from(cache_path))
        };
    }

    if let Some(ttl) = lookup("POLYCAL_CACHE_TTL_MS") {
        config.cache_ttl_ms = ttl
            .parse::<i64>()
            .ok()
            .filter(|ttl| *ttl >= 0)
            .ok_or(ServerConfigError::CacheTtl(ttl))?;
    }

    if let Some(grouping) = lookup("POLYCAL_GROUPING") {
        config.grouping = parse_grouping_strategy(&grouping)?;
    }

    Ok(config)
}

/// Trimmed environment value; unset and blank are the same.
pub(crate) fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A path setting switched off with any false spelling or `none`.
fn is_disabled(raw: &str) -> bool {
    parse_bool(raw) == Some(false) || raw.eq_ignore_ascii_case("none")
}

fn path_label(path: Option<&Path>, absent: &str) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| absent.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = server_config_from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg, ServerConfig::default());
        assert_eq!(cfg.addr.to_string(), DEFAULT_ADDR);
        assert_eq!(cfg.events_source_label(), "demo");
        assert_eq!(cfg.cache_label(), DEFAULT_CACHE_PATH);
    }

    #[test]
    fn reads_every_setting() {
        let cfg = server_config_from_lookup(lookup_from(&[
            ("POLYCAL_ADDR", "0.0.0.0:9000"),
            ("POLYCAL_EVENTS_FILE", "rows.json"),
            ("POLYCAL_CACHE_PATH", "/tmp/cal.sqlite3"),
            ("POLYCAL_CACHE_TTL_MS", "1000"),
            ("POLYCAL_GROUPING", "title"),
        ]))
        .unwrap();

        assert_eq!(cfg.addr.port(), 9000);
        assert_eq!(cfg.events_file, Some(PathBuf::from("rows.json")));
        assert_eq!(cfg.cache_path, Some(PathBuf::from("/tmp/cal.sqlite3")));
        assert_eq!(cfg.cache_ttl_ms, 1000);
        assert_eq!(cfg.grouping, GroupingStrategy::TitleNormalization);
        assert_eq!(cfg.events_source_label(), "rows.json");
    }

    #[test]
    fn cache_path_accepts_boolean_off_spellings() {
        for off in ["off", "OFF", "false", "0", "no", "none"] {
            let cfg =
                server_config_from_lookup(lookup_from(&[("POLYCAL_CACHE_PATH", off)])).unwrap();
            assert_eq!(cfg.cache_path, None, "value: {off}");
            assert_eq!(cfg.cache_label(), "disabled");
        }
    }

    #[test]
    fn malformed_values_are_rejected() {
        let bad_ttl = server_config_from_lookup(lookup_from(&[("POLYCAL_CACHE_TTL_MS", "-5")]));
        assert!(matches!(bad_ttl, Err(ServerConfigError::CacheTtl(_))));

        let bad_grouping = server_config_from_lookup(lookup_from(&[("POLYCAL_GROUPING", "vibes")]));
        assert!(matches!(bad_grouping, Err(ServerConfigError::Grouping(_))));

        let bad_addr = server_config_from_lookup(lookup_from(&[("POLYCAL_ADDR", "nope")]));
        assert!(matches!(bad_addr, Err(ServerConfigError::Addr(_))));
    }

    #[test]
    fn bool_spellings() {
        assert_eq!(parse_bool(" ON "), Some(true));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn env_value_treats_blank_as_unset() {
        // Key unique to this test; nothing else reads it.
        env::set_var("POLYCAL_TEST_BLANK_VALUE", "   ");
        assert_eq!(env_value("POLYCAL_TEST_BLANK_VALUE"), None);
        env::set_var("POLYCAL_TEST_BLANK_VALUE", " x ");
        assert_eq!(env_value("POLYCAL_TEST_BLANK_VALUE").as_deref(), Some("x"));
        env::remove_var("POLYCAL_TEST_BLANK_VALUE");
    }
}

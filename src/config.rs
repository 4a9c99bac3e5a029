use std::env;
use std::time::Duration;

use crate::debounce::DebounceSettings;
use crate::error::{Error, Result};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_QUIET_MS: u64 = 3500;
const DEFAULT_RETENTION_SECS: u64 = 120;
const DEFAULT_METRICS_PORT: u16 = 8083;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub gemini_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub store_names: Vec<String>,
    pub quiet_period: Duration,
    pub retention: Duration,
    pub sync_state_path: String,
    /// `None` when the metrics server is disabled (`METRICS_PORT=0`).
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(Error::MissingVar(name))
        };

        let store_names: Vec<String> = required("FILE_SEARCH_STORE_NAMES")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if store_names.is_empty() {
            return Err(Error::MissingVar("FILE_SEARCH_STORE_NAMES"));
        }

        let quiet_ms = parse_var(&lookup, "DEBOUNCE_QUIET_MS", DEFAULT_QUIET_MS)?;
        let retention_secs = parse_var(&lookup, "DEDUP_RETENTION_SECS", DEFAULT_RETENTION_SECS)?;
        let metrics_port = parse_var(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT)?;

        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            gemini_key: required("GEMINI_API_KEY")?,
            gemini_model: lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.into()),
            gemini_base_url: lookup("GEMINI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.into()),
            store_names,
            quiet_period: Duration::from_millis(quiet_ms),
            retention: Duration::from_secs(retention_secs),
            sync_state_path: lookup("SYNC_STATE_PATH").unwrap_or_else(|| "sync_state.json".into()),
            metrics_port: (metrics_port != 0).then_some(metrics_port),
        })
    }

    pub fn debounce_settings(&self) -> DebounceSettings {
        DebounceSettings {
            quiet_period: self.quiet_period,
            retention: self.retention,
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| Error::InvalidVar { name, value: raw }),
        _ => Ok(default),
    }
}

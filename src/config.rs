//! Runtime settings read from the environment (`.env` is loaded by the binary).
//!
//! Environment variables:
//! - `FROST_SERVER` (required), `FROST_USER`, `FROST_PASSWORD`
//! - `CAMDATA_URL`, `CAMDATA_AUTH_URL`, `CAMDATA_REALM`, `CAMDATA_CLIENT_ID`,
//!   `CAMDATA_CLIENT_SECRET` (required by the import commands)
//! - `SYNC_TIMEZONE` (default: Europe/Berlin)
//! - `HTTP_TIMEOUT_SECS` (default: 180)
//! - `BATCH_SOFT_THRESHOLD` (default: 1000), `BATCH_HARD_CAP` (default: 500)
//! - `ARCHIVE_START` (default: 2023-12-20), `LONG_RUN_START` (default: 2023-12-30)

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::engine::dispatch::DispatchLimits;

const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Berlin;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 180;
const DEFAULT_ARCHIVE_START: &str = "2023-12-20";
const DEFAULT_LONG_RUN_START: &str = "2023-12-30";

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub server: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Telemetry endpoint and the client credentials used to reach it.
#[derive(Clone)]
pub struct TelemetryConfig {
    pub url: String,
    pub auth_url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for TelemetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryConfig")
            .field("url", &self.url)
            .field("auth_url", &self.auth_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub catalog: CatalogConfig,
    pub telemetry: Option<TelemetryConfig>,
    pub timezone: Tz,
    pub http_timeout: Duration,
    pub limits: DispatchLimits,
    pub archive_start: NaiveDate,
    pub long_run_start: NaiveDate,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let catalog = CatalogConfig {
            server: get("FROST_SERVER").context("FROST_SERVER must be set")?,
            user: get("FROST_USER"),
            password: get("FROST_PASSWORD"),
        };

        let telemetry = match get("CAMDATA_URL") {
            Some(url) => {
                let require = |key: &str| {
                    get(key).ok_or_else(|| anyhow!("{key} must be set when CAMDATA_URL is set"))
                };
                Some(TelemetryConfig {
                    url,
                    auth_url: require("CAMDATA_AUTH_URL")?,
                    realm: require("CAMDATA_REALM")?,
                    client_id: require("CAMDATA_CLIENT_ID")?,
                    client_secret: require("CAMDATA_CLIENT_SECRET")?,
                })
            }
            None => None,
        };

        let timezone = match get("SYNC_TIMEZONE") {
            Some(name) => Tz::from_str(&name)
                .map_err(|e| anyhow!("SYNC_TIMEZONE {name:?} is not a known timezone: {e}"))?,
            None => DEFAULT_TIMEZONE,
        };

        let defaults = DispatchLimits::default();
        let limits = DispatchLimits {
            soft_threshold: parse_or(&get, "BATCH_SOFT_THRESHOLD", defaults.soft_threshold)?,
            hard_cap: parse_or(&get, "BATCH_HARD_CAP", defaults.hard_cap)?,
        };
        if limits.soft_threshold == 0 || limits.hard_cap == 0 {
            return Err(anyhow!("batch limits must be positive, got {limits:?}"));
        }

        Ok(Self {
            catalog,
            telemetry,
            timezone,
            http_timeout: Duration::from_secs(parse_or(
                &get,
                "HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
            limits,
            archive_start: date_or(&get, "ARCHIVE_START", DEFAULT_ARCHIVE_START)?,
            long_run_start: date_or(&get, "LONG_RUN_START", DEFAULT_LONG_RUN_START)?,
        })
    }

    pub fn require_telemetry(&self) -> Result<&TelemetryConfig> {
        self.telemetry
            .as_ref()
            .context("CAMDATA_URL must be set for imports")
    }
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has invalid value {raw:?}")),
        None => Ok(default),
    }
}

fn date_or<G>(get: &G, key: &str, default: &str) -> Result<NaiveDate>
where
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key).unwrap_or_else(|| default.to_string());
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("{key} must be a YYYY-MM-DD date, got {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<SyncConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SyncConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("FROST_SERVER", "http://frost/v1.1")]).unwrap();

        assert_eq!(cfg.catalog.server, "http://frost/v1.1");
        assert!(cfg.catalog.user.is_none());
        assert!(cfg.telemetry.is_none());
        assert!(cfg.require_telemetry().is_err());
        assert_eq!(cfg.timezone, chrono_tz::Europe::Berlin);
        assert_eq!(cfg.http_timeout, Duration::from_secs(180));
        assert_eq!(cfg.limits, DispatchLimits::default());
        assert_eq!(cfg.archive_start, NaiveDate::from_ymd_opt(2023, 12, 20).unwrap());
        assert_eq!(cfg.long_run_start, NaiveDate::from_ymd_opt(2023, 12, 30).unwrap());
    }

    #[test]
    fn test_custom_values() {
        let cfg = config(&[
            ("FROST_SERVER", "http://frost"),
            ("FROST_USER", "writer"),
            ("FROST_PASSWORD", "pw"),
            ("CAMDATA_URL", "http://cams/data"),
            ("CAMDATA_AUTH_URL", "http://auth"),
            ("CAMDATA_REALM", "cams"),
            ("CAMDATA_CLIENT_ID", "sync"),
            ("CAMDATA_CLIENT_SECRET", "secret"),
            ("SYNC_TIMEZONE", "America/Santiago"),
            ("HTTP_TIMEOUT_SECS", "30"),
            ("BATCH_SOFT_THRESHOLD", "200"),
            ("BATCH_HARD_CAP", "50"),
            ("LONG_RUN_START", "2024-01-01"),
        ])
        .unwrap();

        assert_eq!(cfg.catalog.user.as_deref(), Some("writer"));
        let telemetry = cfg.require_telemetry().unwrap();
        assert_eq!(telemetry.realm, "cams");
        assert!(!format!("{telemetry:?}").contains("secret"));
        assert_eq!(cfg.timezone, chrono_tz::America::Santiago);
        assert_eq!(cfg.http_timeout, Duration::from_secs(30));
        assert_eq!(
            cfg.limits,
            DispatchLimits {
                soft_threshold: 200,
                hard_cap: 50
            }
        );
        assert_eq!(cfg.long_run_start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn test_missing_server_is_an_error() {
        let err = config(&[]).unwrap_err();
        assert!(err.to_string().contains("FROST_SERVER"));
    }

    #[test]
    fn test_partial_telemetry_settings_are_rejected() {
        let err = config(&[("FROST_SERVER", "http://frost"), ("CAMDATA_URL", "http://c")])
            .unwrap_err();
        assert!(err.to_string().contains("CAMDATA_AUTH_URL"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config(&[("FROST_SERVER", "x"), ("SYNC_TIMEZONE", "Mars/Base")]).is_err());
        assert!(config(&[("FROST_SERVER", "x"), ("BATCH_HARD_CAP", "many")]).is_err());
        assert!(config(&[("FROST_SERVER", "x"), ("BATCH_HARD_CAP", "0")]).is_err());
        assert!(config(&[("FROST_SERVER", "x"), ("ARCHIVE_START", "20.12.2023")]).is_err());
    }
}

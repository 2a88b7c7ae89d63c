use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::limits::DAYS_TO_MAINTAIN;
use crate::slot::{BusinessHours, SlotTime};

#[derive(Debug)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
    Hours(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {var}: {value:?}"),
            ConfigError::Hours(msg) => write!(f, "invalid opening hours: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Stripe credentials. Absent means the sandbox gateway is used.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_base: String,
}

/// Calendar credentials. Absent means calendar actions fail with a
/// configuration error.
#[derive(Debug, Clone)]
pub struct CalendarConfig {
    pub calendar_id: String,
    pub access_token: String,
    pub api_base: String,
}

/// Process configuration, read from `STUDIOBOOK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub horizon_days: u32,
    pub hours: BusinessHours,
    pub maintenance_interval: Duration,
    /// Bearer token for `/v1/admin`. Admin routes are disabled when unset.
    pub admin_token: Option<String>,
    pub stripe: Option<StripeConfig>,
    /// Base URL the payment page redirects back to.
    pub public_url: String,
    pub currency: String,
    pub calendar: Option<CalendarConfig>,
    /// Path to a catalog JSON file replacing the built-in one.
    pub catalog_path: Option<PathBuf>,
    /// Sandbox sessions are paid as soon as they are created.
    pub sandbox_auto_complete: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            horizon_days: DAYS_TO_MAINTAIN,
            hours: BusinessHours::default(),
            maintenance_interval: Duration::from_secs(3600),
            admin_token: None,
            stripe: None,
            public_url: "http://localhost:8080".into(),
            currency: "eur".into(),
            calendar: None,
            catalog_path: None,
            sandbox_auto_complete: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or empty keys take the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let open = parse_opt::<SlotTime>(&get, "STUDIOBOOK_OPEN")?.unwrap_or(defaults.hours.open);
        let close = parse_opt::<SlotTime>(&get, "STUDIOBOOK_CLOSE")?.unwrap_or(defaults.hours.close);
        let hours = BusinessHours::new(open, close).map_err(|e| ConfigError::Hours(e.to_string()))?;

        let horizon_days = parse_opt(&get, "STUDIOBOOK_HORIZON_DAYS")?.unwrap_or(defaults.horizon_days);
        if horizon_days == 0 {
            return Err(ConfigError::Invalid {
                var: "STUDIOBOOK_HORIZON_DAYS",
                value: "0".into(),
            });
        }

        let stripe = get("STUDIOBOOK_STRIPE_SECRET_KEY").map(|secret_key| StripeConfig {
            secret_key,
            api_base: get("STUDIOBOOK_STRIPE_API_BASE").unwrap_or_else(|| "https://api.stripe.com".into()),
        });
        let calendar = match (get("STUDIOBOOK_CALENDAR_ID"), get("STUDIOBOOK_CALENDAR_TOKEN")) {
            (Some(calendar_id), Some(access_token)) => Some(CalendarConfig {
                calendar_id,
                access_token,
                api_base: get("STUDIOBOOK_CALENDAR_API_BASE")
                    .unwrap_or_else(|| "https://www.googleapis.com".into()),
            }),
            _ => None,
        };

        Ok(Self {
            bind: get("STUDIOBOOK_BIND").unwrap_or(defaults.bind),
            port: parse_opt(&get, "STUDIOBOOK_PORT")?.unwrap_or(defaults.port),
            data_dir: get("STUDIOBOOK_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            metrics_port: parse_opt(&get, "STUDIOBOOK_METRICS_PORT")?,
            compact_threshold: parse_opt(&get, "STUDIOBOOK_COMPACT_THRESHOLD")?
                .unwrap_or(defaults.compact_threshold),
            horizon_days,
            hours,
            maintenance_interval: parse_opt(&get, "STUDIOBOOK_MAINTENANCE_INTERVAL_SECS")?
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.maintenance_interval),
            admin_token: get("STUDIOBOOK_ADMIN_TOKEN"),
            stripe,
            public_url: get("STUDIOBOOK_PUBLIC_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_url),
            currency: get("STUDIOBOOK_CURRENCY")
                .map(|c| c.to_lowercase())
                .unwrap_or(defaults.currency),
            calendar,
            catalog_path: get("STUDIOBOOK_CATALOG").map(PathBuf::from),
            sandbox_auto_complete: parse_opt(&get, "STUDIOBOOK_SANDBOX_AUTO_COMPLETE")?
                .unwrap_or(defaults.sandbox_auto_complete),
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("studiobook.wal")
    }
}

fn parse_opt<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match get(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

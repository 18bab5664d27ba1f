use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::engine::SchedulerError;
use crate::grid::OfficeHours;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("office hours: {0}")]
    OfficeHours(#[from] SchedulerError),
}

/// Server settings, read once at startup from `CLINICSLOT_*` variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub office_hours: OfficeHours,
    /// `None` waits for the store lock indefinitely.
    pub lock_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let office_hours = OfficeHours::parse(
            &get("CLINICSLOT_OFFICE_OPEN").unwrap_or_else(|| "09:00".into()),
            &get("CLINICSLOT_OFFICE_CLOSE").unwrap_or_else(|| "17:00".into()),
        )?;
        let lock_timeout_ms: u64 = parsed(&get, "CLINICSLOT_LOCK_TIMEOUT_MS")?.unwrap_or(5000);

        Ok(Self {
            port: parsed(&get, "CLINICSLOT_PORT")?.unwrap_or(5433),
            bind: get("CLINICSLOT_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            data_dir: get("CLINICSLOT_DATA_DIR").unwrap_or_else(|| "./data".into()).into(),
            password: get("CLINICSLOT_PASSWORD").unwrap_or_else(|| "clinicslot".into()),
            max_connections: parsed(&get, "CLINICSLOT_MAX_CONNECTIONS")?.unwrap_or(256),
            compact_threshold: parsed(&get, "CLINICSLOT_COMPACT_THRESHOLD")?.unwrap_or(1000),
            metrics_port: parsed(&get, "CLINICSLOT_METRICS_PORT")?,
            tls_cert: get("CLINICSLOT_TLS_CERT").map(PathBuf::from),
            tls_key: get("CLINICSLOT_TLS_KEY").map(PathBuf::from),
            office_hours,
            lock_timeout: (lock_timeout_ms > 0).then(|| Duration::from_millis(lock_timeout_ms)),
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("clinic.wal")
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parsed<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(var)
        .map(|value| {
            value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

use std::path::PathBuf;

use thiserror::Error;

use crate::alert::AlertMode;

pub const DEFAULT_MAIL_PORT: u16 = 587;
pub const DEFAULT_SIGNATURE: &str = "Deadline Alerter";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,

    #[error("unsupported DATABASE_URL {0:?}, only sqlite databases can be read")]
    UnsupportedDatabase(String),

    #[error("invalid MAIL_PORT {0:?}")]
    InvalidMailPort(String),

    #[error("invalid ALERT_MODE: {0}")]
    InvalidAlertMode(String),
}

/// Credentials and addresses for the outgoing mail relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailConfig {
    Enabled(MailSettings),
    /// At least one required value is absent; `missing` names them.
    Disabled { missing: Vec<&'static str> },
}

/// Everything one run of the alerter needs.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: PathBuf,
    pub mail: MailConfig,
    pub mode: AlertMode,
    pub signature: String,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Settings::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`. Empty values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database_url = get("DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?;
        let database_path = database_path(&database_url)?;

        let port = match get("MAIL_PORT") {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidMailPort(port))?,
            None => DEFAULT_MAIL_PORT,
        };

        let mode = match get("ALERT_MODE") {
            Some(mode) => mode.parse().map_err(ConfigError::InvalidAlertMode)?,
            None => AlertMode::default(),
        };

        let host = get("MAIL_SERVER");
        let username = get("MAIL_USERNAME");
        let password = get("MAIL_PASSWORD");
        let from = get("MAIL_FROM");

        let mail = match (host, username, password, from) {
            (Some(host), Some(username), Some(password), Some(from)) => {
                MailConfig::Enabled(MailSettings {
                    host,
                    port,
                    username,
                    password,
                    from,
                })
            }
            (host, username, password, from) => {
                let missing = [
                    ("MAIL_SERVER", host.is_none()),
                    ("MAIL_USERNAME", username.is_none()),
                    ("MAIL_PASSWORD", password.is_none()),
                    ("MAIL_FROM", from.is_none()),
                ]
                .iter()
                .filter(|(_, absent)| *absent)
                .map(|(key, _)| *key)
                .collect();
                MailConfig::Disabled { missing }
            }
        };

        Ok(Settings {
            database_path,
            mail,
            mode,
            signature: get("ALERT_SIGNATURE").unwrap_or_else(|| DEFAULT_SIGNATURE.to_string()),
        })
    }
}

/// Turn a `DATABASE_URL` into a file path. Accepts `sqlite://path`,
/// `sqlite:path` and plain paths.
pub fn database_path(url: &str) -> Result<PathBuf, ConfigError> {
    let path = if let Some(rest) = url.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = url.strip_prefix("sqlite:") {
        rest
    } else if url.contains("://") {
        return Err(ConfigError::UnsupportedDatabase(url.to_string()));
    } else {
        url
    };

    if path.is_empty() {
        return Err(ConfigError::UnsupportedDatabase(url.to_string()));
    }
    Ok(PathBuf::from(path))
}

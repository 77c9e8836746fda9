//! Process configuration read from the environment (`.env` supported).

use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;

use crate::error::{BotError, Result};
use crate::models::Handle;

const DEFAULT_STATE_PATH: &str = "state";
const DEFAULT_PANEL_TIMEOUT_SECS: u64 = 15;
const DEFAULT_REQUEST_DEADLINE_SECS: u64 = 30;
/// Every day at 09:00 (sec min hour dom mon dow)
const DEFAULT_REMINDER_CRON: &str = "0 0 9 * * *";
const DEFAULT_LOG_BUFFER: usize = 500;

/// Provisioning panel endpoint
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Always ends with `/`
    pub base_url: String,
    pub timeout: Duration,
}

/// How the bot authenticates against the panel
#[derive(Clone, PartialEq, Eq)]
pub enum PanelAuthConfig {
    /// Login with username/password, keep the session cookie
    Session { username: String, password: String },
    /// Login with username/password, use the returned bearer token
    BearerLogin { username: String, password: String },
    /// Pre-issued bearer token
    StaticToken { token: String },
}

impl std::fmt::Debug for PanelAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PanelAuthConfig::Session { username, .. } => write!(f, "Session({})", username),
            PanelAuthConfig::BearerLogin { username, .. } => write!(f, "BearerLogin({})", username),
            PanelAuthConfig::StaticToken { .. } => write!(f, "StaticToken"),
        }
    }
}

#[derive(Clone)]
pub struct BotConfig {
    pub discord_token: String,
    pub operator_ids: Vec<Handle>,
    pub panel: PanelConfig,
    pub panel_auth: PanelAuthConfig,
    pub state_path: PathBuf,
    /// Deadline for each provisioning or store call made by a transition
    pub request_deadline: Duration,
    pub reminder_cron: String,
    pub log_level: LevelFilter,
    pub log_buffer_size: usize,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| BotError::Config {
                message: format!("{} is required", key),
            })
        };

        let discord_token = require("DISCORD_TOKEN")?;
        let operator_ids = parse_operator_ids(&get("OPERATOR_IDS").unwrap_or_default())?;

        let mut base_url = require("PANEL_URL")?;
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let panel = PanelConfig {
            base_url,
            timeout: Duration::from_secs(parse_or(
                get("PANEL_TIMEOUT_SECS"),
                "PANEL_TIMEOUT_SECS",
                DEFAULT_PANEL_TIMEOUT_SECS,
            )?),
        };

        let credentials = match (get("PANEL_USERNAME"), get("PANEL_PASSWORD")) {
            (Some(username), Some(password)) => Some((username, password)),
            _ => None,
        };
        let mode = get("PANEL_AUTH").unwrap_or_else(|| "session".to_string());
        let panel_auth = match (mode.to_lowercase().as_str(), credentials, get("PANEL_TOKEN")) {
            ("session", Some((username, password)), _) => {
                PanelAuthConfig::Session { username, password }
            }
            ("session", None, _) => {
                return Err(BotError::Config {
                    message: "PANEL_AUTH=session needs PANEL_USERNAME and PANEL_PASSWORD"
                        .to_string(),
                })
            }
            ("token", Some((username, password)), _) => {
                PanelAuthConfig::BearerLogin { username, password }
            }
            ("token", None, Some(token)) => PanelAuthConfig::StaticToken { token },
            ("token", None, None) => {
                return Err(BotError::Config {
                    message: "PANEL_AUTH=token needs PANEL_TOKEN or PANEL_USERNAME/PANEL_PASSWORD"
                        .to_string(),
                })
            }
            (other, _, _) => {
                return Err(BotError::Config {
                    message: format!("unknown PANEL_AUTH '{}', expected session or token", other),
                })
            }
        };

        let log_level = match get("LOG_LEVEL") {
            Some(level) => level.parse::<LevelFilter>().map_err(|_| BotError::Config {
                message: format!("invalid LOG_LEVEL '{}'", level),
            })?,
            None => LevelFilter::INFO,
        };

        Ok(Self {
            discord_token,
            operator_ids,
            panel,
            panel_auth,
            state_path: PathBuf::from(get("STATE_PATH").unwrap_or_else(|| DEFAULT_STATE_PATH.to_string())),
            request_deadline: Duration::from_secs(parse_or(
                get("REQUEST_DEADLINE_SECS"),
                "REQUEST_DEADLINE_SECS",
                DEFAULT_REQUEST_DEADLINE_SECS,
            )?),
            reminder_cron: get("REMINDER_CRON").unwrap_or_else(|| DEFAULT_REMINDER_CRON.to_string()),
            log_level,
            log_buffer_size: parse_or(get("LOG_BUFFER_SIZE"), "LOG_BUFFER_SIZE", DEFAULT_LOG_BUFFER)?,
        })
    }

    /// Path of the records document inside the state directory
    pub fn records_path(&self) -> PathBuf {
        self.state_path.join("records.json")
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        Some(v) => v.parse().map_err(|_| BotError::Config {
            message: format!("invalid {} '{}'", key, v),
        }),
        None => Ok(default),
    }
}

fn parse_operator_ids(raw: &str) -> Result<Vec<Handle>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<Handle>().map_err(|e| BotError::Config {
                message: format!("invalid operator id '{}': {}", part, e),
            })
        })
        .collect()
}

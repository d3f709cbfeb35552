use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;

/// What `StartAttempt` does when the student already has an open attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenAttemptPolicy {
    /// Open another attempt next to the existing one.
    #[default]
    Allow,
    /// Hand back the existing open attempt.
    Resume,
    /// Refuse with `AttemptInProgress`.
    Reject,
}

impl FromStr for OpenAttemptPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "resume" => Ok(Self::Resume),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown open attempt policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Knobs the attempt and analytics services need. Kept separate from
/// `Config` so tests can build services without touching the environment.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub common_mistakes_limit: usize,
    pub attempt_start_retries: u32,
    pub open_attempt_policy: OpenAttemptPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            common_mistakes_limit: 5,
            attempt_start_retries: 3,
            open_attempt_policy: OpenAttemptPolicy::Allow,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub log_format: LogFormat,
    pub max_concurrent_requests: usize,
    pub engine: EngineSettings,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let defaults = EngineSettings::default();
        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            database_max_connections: get_env_parse_or("DATABASE_MAX_CONNECTIONS", 20)?,
            jwt_secret: get_env("JWT_SECRET")?,
            log_format: get_env_parse_or("LOG_FORMAT", LogFormat::Pretty)?,
            max_concurrent_requests: get_env_parse_or("MAX_CONCURRENT_REQUESTS", 512)?,
            engine: EngineSettings {
                common_mistakes_limit: get_env_parse_or(
                    "COMMON_MISTAKES_LIMIT",
                    defaults.common_mistakes_limit,
                )?,
                attempt_start_retries: get_env_parse_or(
                    "ATTEMPT_START_RETRIES",
                    defaults.attempt_start_retries,
                )?,
                open_attempt_policy: get_env_parse_or(
                    "OPEN_ATTEMPT_POLICY",
                    defaults.open_attempt_policy,
                )?,
            },
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        _ => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}

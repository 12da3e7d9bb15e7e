//! Runtime configuration read from the environment
//!
//! | Variable                  | Default           |
//! |---------------------------|-------------------|
//! | `PORT`                    | `8080`            |
//! | `DATABASE_URL`            | `data.db`         |
//! | `RATE_LIMIT_MAX_REQUESTS` | `100`             |
//! | `RATE_LIMIT_WINDOW_SECS`  | `60` (max 86400)  |
//! | `ADMIN_TOKEN`             | unset             |
//! | `ADMIN_EMAIL`             | `admin@localhost` |
//!
//! Values that are set but cannot be parsed are reported as errors instead of
//! falling back to the default.

use std::env;
use std::str::FromStr;

use chrono::TimeDelta;

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATABASE_URL: &str = "data.db";
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 100;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: i64 = 60;
/// One day
pub const MAX_RATE_LIMIT_WINDOW_SECS: i64 = 24 * 60 * 60;
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@localhost";

#[derive(Debug, Clone)]
pub struct Config {
    /// Server port number
    pub port: u16,

    /// Path to the redb database file
    pub database_url: String,

    /// Requests admitted per client key and window
    pub rate_limit_max_requests: u32,

    /// Length of one rate-limit window
    pub rate_limit_window: TimeDelta,

    /// When set, an active admin session is seeded under this token at startup
    pub admin_token: Option<String>,

    /// Email recorded for the seeded admin
    pub admin_email: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            rate_limit_max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            rate_limit_window: TimeDelta::seconds(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            admin_token: None,
            admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
        }
    }
}

impl Config {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the raw value
    /// of a variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = parse_or(&lookup, "PORT", defaults.port)?;
        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.database_url);

        let rate_limit_max_requests = parse_or(
            &lookup,
            "RATE_LIMIT_MAX_REQUESTS",
            defaults.rate_limit_max_requests,
        )?;
        if rate_limit_max_requests == 0 {
            return Err(invalid("RATE_LIMIT_MAX_REQUESTS", "0", "must be at least 1"));
        }

        let window_secs: i64 =
            parse_or(&lookup, "RATE_LIMIT_WINDOW_SECS", DEFAULT_RATE_LIMIT_WINDOW_SECS)?;
        if window_secs < 1 {
            return Err(invalid(
                "RATE_LIMIT_WINDOW_SECS",
                &window_secs.to_string(),
                "must be at least 1",
            ));
        }
        if window_secs > MAX_RATE_LIMIT_WINDOW_SECS {
            return Err(invalid(
                "RATE_LIMIT_WINDOW_SECS",
                &window_secs.to_string(),
                &format!("must be at most {MAX_RATE_LIMIT_WINDOW_SECS}"),
            ));
        }
        let rate_limit_window = TimeDelta::try_seconds(window_secs).ok_or_else(|| {
            invalid(
                "RATE_LIMIT_WINDOW_SECS",
                &window_secs.to_string(),
                "out of range",
            )
        })?;

        let admin_token = lookup("ADMIN_TOKEN").filter(|value| !value.trim().is_empty());
        let admin_email = lookup("ADMIN_EMAIL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.admin_email);

        Ok(Self {
            port,
            database_url,
            rate_limit_max_requests,
            rate_limit_window,
            admin_token,
            admin_email,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err: T::Err| invalid(key, &raw, &err.to_string())),
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

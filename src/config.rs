//! Configuration types.
//!
//! Every section has a `Default` and reads `ONBOARDING_*` overrides from
//! the environment. Values that are present but unparsable are errors,
//! not silently defaulted.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Registration and password-reset session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Cache TTL for a session, in days.
    pub ttl_days: u32,
    /// Number of digits in an OTP.
    pub otp_length: usize,
    /// How long an issued OTP stays valid.
    pub otp_validity: Duration,
    /// Minimum gap between two OTPs for the same session.
    pub otp_cooldown: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_days: 1,
            otp_length: 6,
            otp_validity: Duration::from_secs(10 * 60),
            otp_cooldown: Duration::from_secs(60),
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.ttl_days) * 24 * 60 * 60)
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let otp_length = parse_or(lookup, "ONBOARDING_OTP_LENGTH", defaults.otp_length)?;
        if !(4..=10).contains(&otp_length) {
            return Err(ConfigError::InvalidValue {
                key: "ONBOARDING_OTP_LENGTH".into(),
                message: format!("must be between 4 and 10, got {otp_length}"),
            });
        }
        Ok(Self {
            ttl_days: parse_or(lookup, "ONBOARDING_SESSION_TTL_DAYS", defaults.ttl_days)?,
            otp_length,
            otp_validity: Duration::from_secs(parse_or(
                lookup,
                "ONBOARDING_OTP_VALIDITY_SECS",
                defaults.otp_validity.as_secs(),
            )?),
            otp_cooldown: Duration::from_secs(parse_or(
                lookup,
                "ONBOARDING_OTP_COOLDOWN_SECS",
                defaults.otp_cooldown.as_secs(),
            )?),
        })
    }
}

/// Dealer search settings.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// How long a cached search result is served.
    pub cache_ttl: Duration,
    /// Only return dealers that finished onboarding.
    pub only_complete: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60 * 60),
            only_complete: true,
        }
    }
}

impl SearchConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            cache_ttl: Duration::from_secs(parse_or(
                lookup,
                "ONBOARDING_SEARCH_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )?),
            only_complete: parse_or(
                lookup,
                "ONBOARDING_SEARCH_ONLY_COMPLETE",
                defaults.only_complete,
            )?,
        })
    }
}

/// Outbound SMTP settings. Absent unless `ONBOARDING_SMTP_HOST` is set.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    /// Recipient for back-office topic messages.
    pub back_office_address: String,
}

impl SmtpConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let Some(host) = lookup("ONBOARDING_SMTP_HOST") else {
            return Ok(None);
        };
        let username = lookup("ONBOARDING_SMTP_USERNAME").unwrap_or_default();
        let password = lookup("ONBOARDING_SMTP_PASSWORD")
            .ok_or_else(|| ConfigError::MissingEnvVar("ONBOARDING_SMTP_PASSWORD".into()))?;
        let from_address =
            lookup("ONBOARDING_SMTP_FROM_ADDRESS").unwrap_or_else(|| username.clone());
        let back_office_address = lookup("ONBOARDING_BACK_OFFICE_ADDRESS")
            .ok_or_else(|| ConfigError::MissingEnvVar("ONBOARDING_BACK_OFFICE_ADDRESS".into()))?;

        Ok(Some(Self {
            host,
            port: parse_or(lookup, "ONBOARDING_SMTP_PORT", 587)?,
            username,
            password: SecretString::from(password),
            from_address,
            back_office_address,
        }))
    }
}

/// Base URLs of the reference-data and work-order services.
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    pub catalog_url: String,
    pub work_order_url: String,
    pub request_timeout: Duration,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            catalog_url: "http://localhost:8081".to_string(),
            work_order_url: "http://localhost:8082".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl CollaboratorConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            catalog_url: lookup("ONBOARDING_CATALOG_URL").unwrap_or(defaults.catalog_url),
            work_order_url: lookup("ONBOARDING_WORK_ORDER_URL").unwrap_or(defaults.work_order_url),
            request_timeout: Duration::from_secs(parse_or(
                lookup,
                "ONBOARDING_HTTP_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
        })
    }
}

/// Everything the service needs at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub session: SessionConfig,
    pub search: SearchConfig,
    pub smtp: Option<SmtpConfig>,
    pub collaborators: CollaboratorConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/onboarding.db"),
            session: SessionConfig::default(),
            search: SearchConfig::default(),
            smtp: None,
            collaborators: CollaboratorConfig::default(),
        }
    }
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            db_path: lookup("ONBOARDING_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| Self::default().db_path),
            session: SessionConfig::from_lookup(&lookup)?,
            search: SearchConfig::from_lookup(&lookup)?,
            smtp: SmtpConfig::from_lookup(&lookup)?,
            collaborators: CollaboratorConfig::from_lookup(&lookup)?,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}

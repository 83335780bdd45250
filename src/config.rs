use std::env;

use base64::prelude::*;

const DEFAULT_PAGARME_API_URL: &str = "https://api.pagar.me/core/v5";
const DEFAULT_PIX_EXPIRES_IN: u32 = 3600;
const PIX_EXPIRES_IN_RANGE: std::ops::RangeInclusive<u32> = 1800..=3600;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub db_pool_size: u32,
    pub pagarme_api_url: String,
    pub pagarme_secret_key: String,
    pub webhook_user: String,
    pub webhook_password: String,
    pub session_jwt_secret: String,
    /// PIX QR code lifetime in seconds.
    pub pix_expires_in: u32,
    /// Reverse proxies in front of the service that append to
    /// `X-Forwarded-For`. Zero means forwarding headers are ignored.
    pub trusted_proxy_hops: usize,
    pub sentry_dsn: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let pix_expires_in = parse_or("PIX_EXPIRES_IN", DEFAULT_PIX_EXPIRES_IN)?;
        if !PIX_EXPIRES_IN_RANGE.contains(&pix_expires_in) {
            return Err(ConfigError::Invalid {
                name: "PIX_EXPIRES_IN",
                value: pix_expires_in.to_string(),
            });
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "billing.db".to_string()),
            port: parse_or("PORT", 3000)?,
            db_pool_size: parse_or("DB_POOL_SIZE", 8)?,
            pagarme_api_url: env::var("PAGARME_API_URL")
                .unwrap_or_else(|_| DEFAULT_PAGARME_API_URL.to_string()),
            pagarme_secret_key: required("PAGARME_SECRET_KEY")?,
            webhook_user: required("PAGARME_WEBHOOK_USER")?,
            webhook_password: required("PAGARME_WEBHOOK_PASSWORD")?,
            session_jwt_secret: required("SESSION_JWT_SECRET")?,
            pix_expires_in,
            trusted_proxy_hops: parse_or("TRUSTED_PROXY_HOPS", 1)?,
            sentry_dsn: env::var("SENTRY_DSN").ok().filter(|dsn| !dsn.is_empty()),
        })
    }

    /// The exact `Authorization` header value the gateway must send.
    pub fn webhook_authorization(&self) -> String {
        let credentials = format!("{}:{}", self.webhook_user, self.webhook_password);
        format!("Basic {}", BASE64_STANDARD.encode(credentials))
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

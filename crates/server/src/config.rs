use std::{env, fmt::Display, str::FromStr};

use anyhow::bail;
use tracing::{info, warn};

const DEV_JWT_SECRET: &str = "development-secret-change-in-production";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_name: String,
}

#[derive(Clone, Debug)]
pub struct AdminSeed {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expires_days: i64,
    pub environment: Environment,
    pub cors_origins: Vec<String>,
    pub upload_tmp_dir: String,
    pub trust_proxy: bool,
    pub rate_limit_max: u32,
    pub rate_limit_window_secs: i64,
    pub smtp: Option<SmtpConfig>,
    pub contact_notify_to: String,
    pub admin_seed: Option<AdminSeed>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        };

        let jwt_secret = jwt_secret(environment, env::var("JWT_SECRET").ok())?;

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|v| parse_list(&v))
            .unwrap_or_else(|_| match environment {
                Environment::Production => vec!["http://localhost:5173".to_string()],
                Environment::Development => vec![
                    "http://localhost:5173".to_string(),
                    "http://localhost:3000".to_string(),
                ],
            });

        let smtp = env::var("SMTP_HOST").ok().map(|host| SmtpConfig {
            host,
            port: try_load("SMTP_PORT", "587"),
            username: env::var("SMTP_USERNAME").ok(),
            password: env::var("SMTP_PASSWORD").ok(),
            from_name: env::var("EMAIL_FROM_NAME").unwrap_or_else(|_| "Website Contact".to_string()),
        });

        let admin_seed = match (env::var("ADMIN_EMAIL"), env::var("ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(AdminSeed {
                username: env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string()),
                email,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            port: try_load("PORT", "5000"),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/rms.db?mode=rwc".to_string()),
            jwt_secret,
            jwt_expires_days: try_load("JWT_EXPIRES_DAYS", "7"),
            environment,
            cors_origins,
            upload_tmp_dir: env::var("UPLOAD_TMP_DIR").unwrap_or_else(|_| "./temp".to_string()),
            trust_proxy: try_load("TRUST_PROXY", "false"),
            rate_limit_max: try_load("RATE_LIMIT_MAX", "100"),
            rate_limit_window_secs: try_load("RATE_LIMIT_WINDOW_SECS", "900"),
            smtp,
            contact_notify_to: env::var("CONTACT_NOTIFY_TO")
                .unwrap_or_else(|_| "admin@rms.com".to_string()),
            admin_seed,
        })
    }

    /// Development settings backed by an in-memory database.
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-secret".to_string(),
            jwt_expires_days: 7,
            environment: Environment::Development,
            cors_origins: vec!["http://localhost:5173".to_string()],
            upload_tmp_dir: env::temp_dir()
                .join(format!("rms-uploads-{}", uuid::Uuid::new_v4()))
                .to_string_lossy()
                .into_owned(),
            trust_proxy: false,
            rate_limit_max: 100,
            rate_limit_window_secs: 900,
            smtp: None,
            contact_notify_to: "ops@example.com".to_string(),
            admin_seed: None,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

/// Production refuses to sign tokens with the built-in development secret.
fn jwt_secret(environment: Environment, value: Option<String>) -> anyhow::Result<String> {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(secret) => Ok(secret),
        None if environment == Environment::Production => {
            bail!("JWT_SECRET must be set when APP_ENV=production")
        }
        None => {
            warn!("JWT_SECRET not set, using the development secret");
            Ok(DEV_JWT_SECRET.to_string())
        }
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value {raw:?} ({e}), using default: {default}");
        // Defaults are literals in this file; a bad one is a programming error.
        default
            .parse()
            .unwrap_or_else(|_| panic!("default for {key} does not parse"))
    })
}

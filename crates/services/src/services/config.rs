//! Runtime configuration read from environment variables.

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_DATABASE_URL: &str = "sqlite://roadside.db?mode=rwc";
const DEFAULT_EMAIL_FROM: &str = "Roadside Assistance <noreply@example.com>";
const DEFAULT_CONSISTENCY_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Presence of the deployment variables the health route reports on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvChecks {
    pub supabase_url: bool,
    pub supabase_service_role_key: bool,
    pub vite_supabase_url: bool,
}

impl EnvChecks {
    pub fn all_passed(&self) -> bool {
        self.supabase_url && self.supabase_service_role_key && self.vite_supabase_url
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// `SUPABASE_URL`, falling back to `VITE_SUPABASE_URL`.
    pub supabase_url: Option<String>,
    pub supabase_service_role_key: Option<SecretString>,
    pub resend_api_key: Option<SecretString>,
    pub email_from: String,
    /// Raw service-account JSON from `FIREBASE_SERVICE_ACCOUNT`.
    pub firebase_service_account: Option<SecretString>,
    pub admin_bootstrap_token: Option<SecretString>,
    pub cors_allowed_origins: Vec<String>,
    /// `None` disables the background consistency monitor.
    pub consistency_check_interval: Option<Duration>,
    pub default_country_code: String,
    pub env_checks: EnvChecks,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let supabase_url_var = get("SUPABASE_URL");
        let vite_supabase_url = get("VITE_SUPABASE_URL");
        let service_role_key = get("SUPABASE_SERVICE_ROLE_KEY");

        let env_checks = EnvChecks {
            supabase_url: supabase_url_var.is_some(),
            supabase_service_role_key: service_role_key.is_some(),
            vite_supabase_url: vite_supabase_url.is_some(),
        };

        let port = match get("PORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidValue { name: "PORT", value })?,
            None => 3001,
        };

        let interval_secs = match get("CONSISTENCY_CHECK_INTERVAL_SECS") {
            Some(value) => value.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                name: "CONSISTENCY_CHECK_INTERVAL_SECS",
                value,
            })?,
            None => DEFAULT_CONSISTENCY_INTERVAL_SECS,
        };

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            host: get("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            supabase_url: supabase_url_var
                .or(vite_supabase_url)
                .map(|url| url.trim_end_matches('/').to_string()),
            supabase_service_role_key: service_role_key.map(SecretString::from),
            resend_api_key: get("RESEND_API_KEY").map(SecretString::from),
            email_from: get("EMAIL_FROM").unwrap_or_else(|| DEFAULT_EMAIL_FROM.to_string()),
            firebase_service_account: get("FIREBASE_SERVICE_ACCOUNT").map(SecretString::from),
            admin_bootstrap_token: get("ADMIN_BOOTSTRAP_TOKEN").map(SecretString::from),
            cors_allowed_origins,
            consistency_check_interval: (interval_secs > 0)
                .then(|| Duration::from_secs(interval_secs)),
            default_country_code: get("DEFAULT_COUNTRY_CODE").unwrap_or_else(|| "90".to_string()),
            env_checks,
        })
    }
}

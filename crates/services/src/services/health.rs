use chrono::{DateTime, Utc};
use db::DBService;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::config::{Config, EnvChecks};

#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
pub struct EnvironmentChecks {
    pub supabase_url: bool,
    pub supabase_service_role_key: bool,
    pub vite_supabase_url: bool,
}

impl From<EnvChecks> for EnvironmentChecks {
    fn from(checks: EnvChecks) -> Self {
        Self {
            supabase_url: checks.supabase_url,
            supabase_service_role_key: checks.supabase_service_role_key,
            vite_supabase_url: checks.vite_supabase_url,
        }
    }
}

/// Optional integrations; none of them affect `all_checks_passed`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
pub struct IntegrationChecks {
    pub email: bool,
    pub push: bool,
    pub admin_bootstrap: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct HealthReport {
    pub status: String,
    /// True only when all three required environment variables are set.
    pub all_checks_passed: bool,
    pub checks: EnvironmentChecks,
    pub database: bool,
    pub integrations: IntegrationChecks,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

pub struct HealthService;

impl HealthService {
    pub async fn report(db: &DBService, config: &Config) -> HealthReport {
        let database = db.ping().await;
        HealthReport {
            status: if database { "ok" } else { "degraded" }.to_string(),
            all_checks_passed: config.env_checks.all_passed(),
            checks: config.env_checks.into(),
            database,
            integrations: IntegrationChecks {
                email: config.resend_api_key.is_some(),
                push: config.firebase_service_account.is_some(),
                admin_bootstrap: config.admin_bootstrap_token.is_some(),
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
        }
    }
}

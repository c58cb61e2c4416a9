use std::sync::Arc;

use async_trait::async_trait;
use db::{DBService, DBServiceError};
use services::services::{
    auth::{AuthAdmin, AuthError, SupabaseAuthClient},
    config::{Config, ConfigError},
    email::{EmailError, EmailSender, ResendClient},
    push::{FcmClient, PushError, PushSender},
};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Database(#[from] DBServiceError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Email(#[from] EmailError),
    #[error(transparent)]
    Push(#[from] PushError),
}

/// Everything a route handler needs: the database, the configuration and the
/// upstream providers.
#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    fn db(&self) -> &DBService;

    fn config(&self) -> &Config;

    fn auth(&self) -> &dyn AuthAdmin;

    fn email(&self) -> &dyn EmailSender;

    fn push(&self) -> &dyn PushSender;

    /// Structured audit record of a state-changing action.
    async fn track_event(&self, event_name: &str, properties: serde_json::Value) {
        info!(target: "audit", event = event_name, properties = %properties, "Event tracked");
    }
}

#[derive(Clone)]
pub struct AppDeployment {
    db: DBService,
    config: Arc<Config>,
    auth: Arc<dyn AuthAdmin>,
    email: Arc<dyn EmailSender>,
    push: Arc<dyn PushSender>,
}

impl AppDeployment {
    /// Opens the database and builds the live provider clients. Missing
    /// provider credentials are not an error; those calls fail as not configured.
    pub async fn new(config: Config) -> Result<Self, DeploymentError> {
        let db = DBService::new(&config.database_url).await?;

        let auth = SupabaseAuthClient::new(
            config.supabase_url.clone(),
            config.supabase_service_role_key.clone(),
        )?;
        let email = ResendClient::new(config.resend_api_key.clone(), config.email_from.clone())?;
        let push = FcmClient::new(config.firebase_service_account.as_ref())?;

        if !config.env_checks.all_passed() {
            warn!(checks = ?config.env_checks, "Supabase environment is incomplete");
        }
        if !email.is_configured() {
            warn!("RESEND_API_KEY not set, email delivery disabled");
        }
        if !push.is_configured() {
            warn!("FIREBASE_SERVICE_ACCOUNT not set, push delivery disabled");
        }

        Ok(Self::from_parts(
            db,
            config,
            Arc::new(auth),
            Arc::new(email),
            Arc::new(push),
        ))
    }

    /// Assembles a deployment from ready-made parts, e.g. in-process fakes.
    pub fn from_parts(
        db: DBService,
        config: Config,
        auth: Arc<dyn AuthAdmin>,
        email: Arc<dyn EmailSender>,
        push: Arc<dyn PushSender>,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            auth,
            email,
            push,
        }
    }
}

#[async_trait]
impl Deployment for AppDeployment {
    fn db(&self) -> &DBService {
        &self.db
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn auth(&self) -> &dyn AuthAdmin {
        self.auth.as_ref()
    }

    fn email(&self) -> &dyn EmailSender {
        self.email.as_ref()
    }

    fn push(&self) -> &dyn PushSender {
        self.push.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use services::services::test_support::{
        FakeAuthAdmin, RecordingEmailSender, RecordingPushSender,
    };

    use super::*;

    #[tokio::test]
    async fn test_from_parts_exposes_shared_state() {
        let db = DBService::new_in_memory().await.unwrap();
        let config = Config::from_lookup(|_| None).unwrap();
        let auth = Arc::new(FakeAuthAdmin::new());
        auth.add_user_with_token("ops@example.com", "token");

        let deployment = AppDeployment::from_parts(
            db,
            config,
            auth,
            Arc::new(RecordingEmailSender::default()),
            Arc::new(RecordingPushSender::default()),
        );
        let cloned = deployment.clone();

        assert!(cloned.db().ping().await);
        assert_eq!(cloned.config().port, 3001);
        assert!(cloned.push().is_configured());
        let user = cloned.auth().user_from_token("token").await.unwrap();
        assert_eq!(user.email.as_deref(), Some("ops@example.com"));
    }
}

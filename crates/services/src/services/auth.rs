//! Supabase Auth admin API client.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::http::build_http_client;

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("auth provider not configured")]
    NotConfigured,
    #[error("email already registered")]
    EmailExists,
    #[error("invalid or expired access token")]
    InvalidToken,
    #[error("auth request rejected: {0}")]
    Rejected(String),
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("json error: {0}")]
    Serde(String),
}

impl AuthError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Account operations delegated to the hosted auth provider.
#[async_trait]
pub trait AuthAdmin: Send + Sync {
    /// Creates a confirmed user with the given password and metadata.
    async fn create_user(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<AuthUser, AuthError>;

    async fn delete_user(&self, user_id: Uuid) -> Result<(), AuthError>;

    /// Resolves a user access token (JWT) to its user.
    async fn user_from_token(&self, access_token: &str) -> Result<AuthUser, AuthError>;
}

#[derive(Debug, Serialize)]
struct CreateUserBody<'a> {
    email: &'a str,
    password: &'a str,
    email_confirm: bool,
    user_metadata: serde_json::Value,
}

/// Talks to `{SUPABASE_URL}/auth/v1` with the service-role key.
#[derive(Debug, Clone)]
pub struct SupabaseAuthClient {
    http: Client,
    base_url: Option<String>,
    service_role_key: Option<SecretString>,
}

impl SupabaseAuthClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

    /// Missing URL or key is allowed; every call then fails with `NotConfigured`.
    pub fn new(
        base_url: Option<String>,
        service_role_key: Option<SecretString>,
    ) -> Result<Self, AuthError> {
        let http = build_http_client(Self::REQUEST_TIMEOUT)
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            service_role_key,
        })
    }

    fn credentials(&self) -> Result<(&str, &str), AuthError> {
        match (&self.base_url, &self.service_role_key) {
            (Some(url), Some(key)) => Ok((url.as_str(), key.expose_secret())),
            _ => Err(AuthError::NotConfigured),
        }
    }

    async fn fetch_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let (base_url, key) = self.credentials()?;
        let res = self
            .http
            .get(format!("{base_url}/auth/v1/user"))
            .header("apikey", key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => res
                .json::<AuthUser>()
                .await
                .map_err(|e| AuthError::Serde(e.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::InvalidToken),
            s => Err(AuthError::Http {
                status: s.as_u16(),
                body: res.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl AuthAdmin for SupabaseAuthClient {
    async fn create_user(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<AuthUser, AuthError> {
        let (base_url, key) = self.credentials()?;
        let body = CreateUserBody {
            email,
            password,
            email_confirm: true,
            user_metadata: metadata,
        };

        // Not retried: a timeout after the user was created would turn into a duplicate.
        let res = self
            .http
            .post(format!("{base_url}/auth/v1/admin/users"))
            .header("apikey", key)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = res.status();
        if status.is_success() {
            return res
                .json::<AuthUser>()
                .await
                .map_err(|e| AuthError::Serde(e.to_string()));
        }

        let body = res.text().await.unwrap_or_default();
        Err(classify_create_failure(status, body))
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        let (base_url, key) = self.credentials()?;
        let res = self
            .http
            .delete(format!("{base_url}/auth/v1/admin/users/{user_id}"))
            .header("apikey", key)
            .bearer_auth(key)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => Ok(()),
            s => Err(AuthError::Http {
                status: s.as_u16(),
                body: res.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn user_from_token(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        (|| async { self.fetch_user(access_token).await })
            .retry(
                &ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(200))
                    .with_max_delay(Duration::from_secs(2))
                    .with_max_times(2)
                    .with_jitter(),
            )
            .when(|e: &AuthError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "Auth token lookup failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }
}

/// Supabase answers duplicate sign-ups with 422 (`email_exists`) on current
/// versions and 400/409 with an "already registered" message on older ones.
fn classify_create_failure(status: StatusCode, body: String) -> AuthError {
    let lowered = body.to_lowercase();
    let duplicate = lowered.contains("email_exists")
        || lowered.contains("already been registered")
        || lowered.contains("already registered")
        || lowered.contains("already exists");

    match status {
        StatusCode::CONFLICT => AuthError::EmailExists,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY if duplicate => {
            AuthError::EmailExists
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => AuthError::Rejected(body),
        s => AuthError::Http {
            status: s.as_u16(),
            body,
        },
    }
}

fn map_reqwest_error(e: reqwest::Error) -> AuthError {
    if e.is_timeout() {
        AuthError::Timeout
    } else {
        AuthError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_email_detection() {
        let err = classify_create_failure(
            StatusCode::UNPROCESSABLE_ENTITY,
            concat!(
                r#"{"code":422,"error_code":"email_exists","#,
                r#""msg":"A user with this email address has already been registered"}"#
            )
            .to_string(),
        );
        assert!(matches!(err, AuthError::EmailExists));
    }

    #[test]
    fn test_weak_password_is_rejection_not_duplicate() {
        let err = classify_create_failure(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"error_code":"weak_password","msg":"Password should be at least 6 characters"}"#
                .to_string(),
        );
        assert!(matches!(err, AuthError::Rejected(_)));
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let err = classify_create_failure(StatusCode::BAD_GATEWAY, String::new());
        assert!(err.should_retry());
        assert!(!AuthError::InvalidToken.should_retry());
    }

    #[tokio::test]
    async fn test_unconfigured_client_fails_fast() {
        let client = SupabaseAuthClient::new(None, None).unwrap();
        let err = client.user_from_token("token").await.unwrap_err();
        assert!(matches!(err, AuthError::NotConfigured));
    }
}

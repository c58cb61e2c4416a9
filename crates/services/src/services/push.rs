//! Firebase Cloud Messaging (HTTP v1) client authenticated with a service account.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use moka::future::Cache;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::http::build_http_client;

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const ACCESS_TOKEN_KEY: &str = "fcm";

#[derive(Debug, Clone, Error)]
pub enum PushError {
    #[error("push provider not configured")]
    NotConfigured,
    #[error("invalid service account: {0}")]
    InvalidServiceAccount(String),
    #[error("registration token is no longer valid")]
    Unregistered,
    #[error("oauth error: {0}")]
    Auth(String),
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
}

impl PushError {
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

/// Payload delivered to one device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: Option<String>,
    pub body: Option<String>,
    pub data: BTreeMap<String, String>,
    pub high_priority: bool,
}

#[async_trait]
pub trait PushSender: Send + Sync {
    /// Sends to a single registration token and returns the provider message id.
    async fn send(&self, token: &str, message: &PushMessage) -> Result<String, PushError>;

    fn is_configured(&self) -> bool;
}

/// Subset of the Google service-account key file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccount {
    pub fn from_json(raw: &str) -> Result<Self, PushError> {
        let mut account: ServiceAccount = serde_json::from_str(raw)
            .map_err(|e| PushError::InvalidServiceAccount(e.to_string()))?;
        // Keys pasted into dashboards often arrive with escaped newlines.
        if account.private_key.contains("\\n") {
            account.private_key = account.private_key.replace("\\n", "\n");
        }
        Ok(account)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Clone)]
pub struct FcmClient {
    http: Client,
    account: Option<Arc<ServiceAccount>>,
    access_tokens: Cache<&'static str, Arc<SecretString>>,
}

impl FcmClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    // Google access tokens live for an hour.
    const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(50 * 60);

    pub fn new(service_account_json: Option<&SecretString>) -> Result<Self, PushError> {
        let account = service_account_json
            .map(|raw| ServiceAccount::from_json(raw.expose_secret()))
            .transpose()?
            .map(Arc::new);

        let http = build_http_client(Self::REQUEST_TIMEOUT)
            .map_err(|e| PushError::Transport(e.to_string()))?;

        let access_tokens = Cache::builder()
            .max_capacity(1)
            .time_to_live(Self::ACCESS_TOKEN_TTL)
            .build();

        Ok(Self {
            http,
            account,
            access_tokens,
        })
    }

    fn account(&self) -> Result<&ServiceAccount, PushError> {
        self.account.as_deref().ok_or(PushError::NotConfigured)
    }

    async fn access_token(&self) -> Result<Arc<SecretString>, PushError> {
        self.access_tokens
            .try_get_with(ACCESS_TOKEN_KEY, async {
                let token = (|| async { self.exchange_assertion().await })
                    .retry(
                        &ExponentialBuilder::default()
                            .with_min_delay(Duration::from_millis(500))
                            .with_max_delay(Duration::from_secs(5))
                            .with_max_times(3)
                            .with_jitter(),
                    )
                    .when(|e: &PushError| e.should_retry())
                    .notify(|e, dur| {
                        warn!(
                            "FCM token exchange failed, retrying after {:.2}s: {}",
                            dur.as_secs_f64(),
                            e
                        )
                    })
                    .await?;
                Ok::<_, PushError>(Arc::new(token))
            })
            .await
            .map_err(|e: Arc<PushError>| (*e).clone())
    }

    async fn exchange_assertion(&self) -> Result<SecretString, PushError> {
        let account = self.account()?;
        let token_uri = account.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let assertion = sign_assertion(account, token_uri, Utc::now().timestamp())?;

        let res = self
            .http
            .post(token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => {
                let body = res
                    .json::<TokenResponse>()
                    .await
                    .map_err(|e| PushError::Auth(e.to_string()))?;
                debug!("Obtained FCM access token");
                Ok(SecretString::from(body.access_token))
            }
            s if s.is_client_error() => Err(PushError::Auth(res.text().await.unwrap_or_default())),
            s => Err(PushError::Http {
                status: s.as_u16(),
                body: res.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl PushSender for FcmClient {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<String, PushError> {
        let account = self.account()?;
        let access_token = self.access_token().await?;
        let url = format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            account.project_id
        );

        let res = self
            .http
            .post(url)
            .bearer_auth(access_token.expose_secret())
            .json(&fcm_payload(token, message))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = res.status();
        if status.is_success() {
            return res
                .json::<SendResponse>()
                .await
                .map(|r| r.name)
                .map_err(|e| PushError::Transport(e.to_string()));
        }

        let body = res.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            self.access_tokens.invalidate(ACCESS_TOKEN_KEY).await;
            return Err(PushError::Auth(body));
        }
        Err(classify_send_failure(status, body))
    }

    fn is_configured(&self) -> bool {
        self.account.is_some()
    }
}

fn sign_assertion(account: &ServiceAccount, audience: &str, now: i64) -> Result<String, PushError> {
    let claims = AssertionClaims {
        iss: &account.client_email,
        scope: FCM_SCOPE,
        aud: audience,
        iat: now,
        exp: now + 3600,
    };
    let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
        .map_err(|e| PushError::InvalidServiceAccount(e.to_string()))?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| PushError::InvalidServiceAccount(e.to_string()))
}

fn fcm_payload(token: &str, message: &PushMessage) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "token": token,
        "data": message.data,
    });

    if message.title.is_some() || message.body.is_some() {
        payload["notification"] = serde_json::json!({
            "title": message.title,
            "body": message.body,
        });
    }

    if message.high_priority {
        payload["android"] = serde_json::json!({ "priority": "HIGH", "ttl": "30s" });
        payload["apns"] = serde_json::json!({ "headers": { "apns-priority": "10" } });
        payload["webpush"] = serde_json::json!({ "headers": { "Urgency": "high", "TTL": "30" } });
    }

    serde_json::json!({ "message": payload })
}

/// FCM reports dead tokens as 404 `UNREGISTERED`, or 400 `INVALID_ARGUMENT`
/// naming the registration token.
fn classify_send_failure(status: StatusCode, body: String) -> PushError {
    let unregistered = body.contains("UNREGISTERED")
        || (status == StatusCode::BAD_REQUEST && body.contains("registration token"));
    match status {
        StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST if unregistered => PushError::Unregistered,
        s => PushError::Http {
            status: s.as_u16(),
            body,
        },
    }
}

fn map_reqwest_error(e: reqwest::Error) -> PushError {
    if e.is_timeout() {
        PushError::Timeout
    } else {
        PushError::Transport(e.to_string())
    }
}

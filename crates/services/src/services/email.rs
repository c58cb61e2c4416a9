//! Transactional email through the Resend REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use super::http::build_http_client;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Clone, Error)]
pub enum EmailError {
    #[error("email provider not configured")]
    NotConfigured,
    #[error("invalid email: {0}")]
    Validation(String),
    #[error("email rejected by provider: {0}")]
    Rejected(String),
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
    pub reply_to: Option<String>,
}

impl EmailMessage {
    /// Checks the fields Resend would otherwise reject with a 422.
    pub fn validate(&self) -> Result<(), EmailError> {
        if self.to.is_empty() {
            return Err(EmailError::Validation("at least one recipient is required".into()));
        }
        if let Some(bad) = self.to.iter().find(|addr| !looks_like_email(addr)) {
            return Err(EmailError::Validation(format!("invalid recipient: {bad}")));
        }
        if self.subject.trim().is_empty() {
            return Err(EmailError::Validation("subject is required".into()));
        }
        let has_body = self.html.as_deref().is_some_and(|b| !b.trim().is_empty())
            || self.text.as_deref().is_some_and(|b| !b.trim().is_empty());
        if !has_body {
            return Err(EmailError::Validation("html or text body is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SentEmail {
    pub id: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<SentEmail, EmailError>;
}

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct ResendClient {
    http: Client,
    api_key: Option<SecretString>,
    from: String,
}

impl ResendClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

    pub fn new(api_key: Option<SecretString>, from: String) -> Result<Self, EmailError> {
        let http = build_http_client(Self::REQUEST_TIMEOUT)
            .map_err(|e| EmailError::Transport(e.to_string()))?;
        Ok(Self { http, api_key, from })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl EmailSender for ResendClient {
    async fn send(&self, message: &EmailMessage) -> Result<SentEmail, EmailError> {
        let api_key = self.api_key.as_ref().ok_or(EmailError::NotConfigured)?;
        message.validate()?;

        let body = ResendRequest {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            html: message.html.as_deref(),
            text: message.text.as_deref(),
            reply_to: message.reply_to.as_deref(),
        };

        let res = self
            .http
            .post(RESEND_API_URL)
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmailError::Timeout
                } else {
                    EmailError::Transport(e.to_string())
                }
            })?;

        match res.status() {
            s if s.is_success() => res
                .json::<SentEmail>()
                .await
                .map_err(|e| EmailError::Transport(e.to_string())),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(EmailError::Rejected(res.text().await.unwrap_or_default()))
            }
            s => Err(EmailError::Http {
                status: s.as_u16(),
                body: res.text().await.unwrap_or_default(),
            }),
        }
    }
}

fn looks_like_email(address: &str) -> bool {
    // Accept "Name <user@host>" as well as a bare address.
    let address = match (address.find('<'), address.rfind('>')) {
        (Some(start), Some(end)) if start < end => &address[start + 1..end],
        _ => address,
    };
    match address.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

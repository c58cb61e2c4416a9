//! Incoming-call push fan-out and device token registration.

use std::collections::BTreeMap;

use db::models::push_token::PushToken;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::push::{PushError, PushMessage, PushSender};

const PLATFORMS: &[&str] = &["android", "ios", "web"];

#[derive(Debug, Error)]
pub enum CallNotificationError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Validation(String),
    #[error("receiver has no registered push tokens")]
    NoPushTokens,
    #[error("push provider is not configured")]
    NotConfigured,
    #[error("push delivery failed: {0}")]
    Push(PushError),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CallNotification {
    pub receiver_id: Uuid,
    pub caller_name: String,
    pub call_id: String,
    pub caller_id: Option<String>,
    pub call_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
pub struct CallNotificationResult {
    pub sent: usize,
    pub failed: usize,
    pub removed_tokens: usize,
}

/// Device registration for the signed-in user; the owner comes from the session.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct RegisterPushToken {
    pub token: String,
    pub platform: String,
}

pub struct CallNotificationService;

impl CallNotificationService {
    /// Sends a high-priority data message to every device of the receiver.
    /// Tokens the provider reports as unregistered are deleted.
    pub async fn notify(
        pool: &SqlitePool,
        push: &dyn PushSender,
        notification: &CallNotification,
    ) -> Result<CallNotificationResult, CallNotificationError> {
        let caller_name = notification.caller_name.trim();
        let call_id = notification.call_id.trim();
        if caller_name.is_empty() || call_id.is_empty() {
            return Err(CallNotificationError::Validation(
                "caller_name and call_id are required".into(),
            ));
        }
        if !push.is_configured() {
            return Err(CallNotificationError::NotConfigured);
        }

        let tokens = PushToken::find_by_user_id(pool, notification.receiver_id).await?;
        if tokens.is_empty() {
            return Err(CallNotificationError::NoPushTokens);
        }

        let message = call_message(notification, caller_name, call_id);
        let mut result = CallNotificationResult {
            sent: 0,
            failed: 0,
            removed_tokens: 0,
        };
        let mut last_error = None;

        for token in &tokens {
            match push.send(&token.token, &message).await {
                Ok(_) => result.sent += 1,
                Err(PushError::Unregistered) => {
                    result.failed += 1;
                    let removed = PushToken::delete_by_token(pool, &token.token).await?;
                    result.removed_tokens += removed as usize;
                }
                Err(e) => {
                    warn!(
                        receiver_id = %notification.receiver_id,
                        platform = %token.platform,
                        error = %e,
                        "Call notification delivery failed"
                    );
                    result.failed += 1;
                    last_error = Some(e);
                }
            }
        }

        info!(
            receiver_id = %notification.receiver_id,
            call_id,
            sent = result.sent,
            failed = result.failed,
            removed_tokens = result.removed_tokens,
            "Call notification fan-out finished"
        );

        if result.sent == 0 {
            return Err(match last_error {
                Some(e) => CallNotificationError::Push(e),
                // Every token was stale, so the receiver has no devices left.
                None => CallNotificationError::NoPushTokens,
            });
        }
        Ok(result)
    }

    pub async fn register_token(
        pool: &SqlitePool,
        user_id: Uuid,
        data: &RegisterPushToken,
    ) -> Result<PushToken, CallNotificationError> {
        let token = data.token.trim();
        if token.is_empty() {
            return Err(CallNotificationError::Validation("token is required".into()));
        }
        let platform = data.platform.trim().to_lowercase();
        if !PLATFORMS.contains(&platform.as_str()) {
            return Err(CallNotificationError::Validation(format!(
                "platform must be one of {}",
                PLATFORMS.join(", ")
            )));
        }

        Ok(PushToken::upsert(pool, user_id, token, &platform).await?)
    }
}

fn call_message(notification: &CallNotification, caller_name: &str, call_id: &str) -> PushMessage {
    let mut data = BTreeMap::new();
    data.insert("type".to_string(), "incoming_call".to_string());
    data.insert("call_id".to_string(), call_id.to_string());
    data.insert("caller_name".to_string(), caller_name.to_string());
    data.insert(
        "call_type".to_string(),
        notification
            .call_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("audio")
            .to_string(),
    );
    if let Some(caller_id) = notification.caller_id.as_deref().filter(|c| !c.is_empty()) {
        data.insert("caller_id".to_string(), caller_id.to_string());
    }

    // Data-only so the app can present its own call screen.
    PushMessage {
        title: None,
        body: None,
        data,
        high_priority: true,
    }
}

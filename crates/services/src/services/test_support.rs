//! In-process stand-ins for the upstream providers, for tests across the workspace.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    auth::{AuthAdmin, AuthError, AuthUser},
    email::{EmailError, EmailMessage, EmailSender, SentEmail},
    push::{PushError, PushMessage, PushSender},
};

#[derive(Default)]
struct AuthState {
    users: HashMap<Uuid, AuthUser>,
    tokens: HashMap<String, Uuid>,
    deleted: Vec<Uuid>,
    next_create_error: Option<AuthError>,
}

/// Auth provider that keeps users in memory and records deletions.
#[derive(Default)]
pub struct FakeAuthAdmin {
    state: Mutex<AuthState>,
}

impl FakeAuthAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user reachable through `access_token` and returns its id.
    pub fn add_user_with_token(&self, email: &str, access_token: &str) -> Uuid {
        let mut state = self.state.lock().unwrap();
        let id = Uuid::new_v4();
        state.users.insert(
            id,
            AuthUser {
                id,
                email: Some(email.to_string()),
            },
        );
        state.tokens.insert(access_token.to_string(), id);
        id
    }

    pub fn fail_next_create(&self, error: AuthError) {
        self.state.lock().unwrap().next_create_error = Some(error);
    }

    pub fn users(&self) -> Vec<AuthUser> {
        self.state.lock().unwrap().users.values().cloned().collect()
    }

    pub fn deleted(&self) -> Vec<Uuid> {
        self.state.lock().unwrap().deleted.clone()
    }
}

#[async_trait]
impl AuthAdmin for FakeAuthAdmin {
    async fn create_user(
        &self,
        email: &str,
        _password: &str,
        _metadata: serde_json::Value,
    ) -> Result<AuthUser, AuthError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.next_create_error.take() {
            return Err(error);
        }
        let taken = state
            .users
            .values()
            .any(|u| u.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)));
        if taken {
            return Err(AuthError::EmailExists);
        }

        let user = AuthUser {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        let mut state = self.state.lock().unwrap();
        state.deleted.push(user_id);
        match state.users.remove(&user_id) {
            Some(_) => Ok(()),
            None => Err(AuthError::Http {
                status: 404,
                body: "user not found".to_string(),
            }),
        }
    }

    async fn user_from_token(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let state = self.state.lock().unwrap();
        state
            .tokens
            .get(access_token)
            .and_then(|id| state.users.get(id))
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

/// Email sender that validates and keeps every message.
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingEmailSender {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<SentEmail, EmailError> {
        message.validate()?;
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        Ok(SentEmail {
            id: format!("email-{}", sent.len()),
        })
    }
}

/// Push sender that records deliveries and reports chosen tokens as unregistered.
#[derive(Default)]
pub struct RecordingPushSender {
    sent: Mutex<Vec<(String, PushMessage)>>,
    unregistered: Mutex<HashSet<String>>,
}

impl RecordingPushSender {
    pub fn mark_unregistered(&self, token: &str) {
        self.unregistered.lock().unwrap().insert(token.to_string());
    }

    pub fn sent(&self) -> Vec<(String, PushMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushSender for RecordingPushSender {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<String, PushError> {
        if self.unregistered.lock().unwrap().contains(token) {
            return Err(PushError::Unregistered);
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((token.to_string(), message.clone()));
        Ok(format!("projects/test/messages/{}", sent.len()))
    }

    fn is_configured(&self) -> bool {
        true
    }
}

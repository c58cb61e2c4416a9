use axum::{
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson, Response},
};
use services::services::{
    activity_tracker::ActivityError,
    auth::AuthError,
    call_notification::CallNotificationError,
    consistency::ConsistencyError,
    email::EmailError,
    marketplace::MarketplaceError,
    onboarding::OnboardingError,
    reviews::ReviewError,
};
use thiserror::Error;
use tracing::{error, warn};
use utils::response::{ApiResponse, ErrorData};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Onboarding(#[from] OnboardingError),
    #[error(transparent)]
    Activity(#[from] ActivityError),
    #[error(transparent)]
    CallNotification(#[from] CallNotificationError),
    #[error(transparent)]
    Email(#[from] EmailError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
}

impl ApiError {
    /// HTTP status plus the machine-readable code carried in `error_data`.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Marketplace(err) => match err {
                MarketplaceError::Validation(_) => validation(),
                MarketplaceError::NotFound(_) => not_found(),
                MarketplaceError::Forbidden(_) => forbidden(),
                MarketplaceError::InvalidTransition(_) => invalid_transition(),
                MarketplaceError::Conflict(_) => conflict(),
                MarketplaceError::Database(_) => internal(),
            },
            ApiError::Review(err) => match err {
                ReviewError::Validation(_) => validation(),
                ReviewError::NotFound(_) => not_found(),
                ReviewError::Forbidden(_) => forbidden(),
                ReviewError::InvalidTransition(_) => invalid_transition(),
                ReviewError::Conflict(_) => conflict(),
                ReviewError::Database(_) => internal(),
            },
            ApiError::Onboarding(err) => match err {
                OnboardingError::Validation(_) => validation(),
                OnboardingError::PhoneExists => (StatusCode::CONFLICT, "PHONE_EXISTS"),
                OnboardingError::EmailExists => (StatusCode::CONFLICT, "EMAIL_EXISTS"),
                OnboardingError::Unauthorized(_) => unauthorized(),
                OnboardingError::Forbidden(_) => forbidden(),
                OnboardingError::Conflict(_) => conflict(),
                OnboardingError::NotConfigured(_) => not_configured(),
                OnboardingError::Auth(auth) => auth_status(auth),
                OnboardingError::Database(_) => internal(),
            },
            ApiError::Activity(err) => match err {
                ActivityError::Validation(_) => validation(),
                ActivityError::Database(_) => internal(),
            },
            ApiError::CallNotification(err) => match err {
                CallNotificationError::Validation(_) => validation(),
                CallNotificationError::NoPushTokens => (StatusCode::NOT_FOUND, "NO_PUSH_TOKENS"),
                CallNotificationError::NotConfigured => not_configured(),
                CallNotificationError::Push(_) => upstream(),
                CallNotificationError::Database(_) => internal(),
            },
            ApiError::Email(err) => match err {
                EmailError::Validation(_) => validation(),
                EmailError::NotConfigured => not_configured(),
                EmailError::Rejected(_)
                | EmailError::Transport(_)
                | EmailError::Timeout
                | EmailError::Http { .. } => upstream(),
            },
            ApiError::Auth(err) => auth_status(err),
            ApiError::Consistency(_) | ApiError::Database(_) => internal(),
            ApiError::BadRequest(_) => validation(),
            ApiError::Unauthorized(_) => unauthorized(),
            ApiError::NotFound(_) => not_found(),
            ApiError::Conflict(_) => conflict(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if status.is_server_error() {
            error!(code, error = %self, "Request failed");
            match status {
                StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
                _ => self.to_string(),
            }
        } else {
            warn!(code, status = status.as_u16(), error = %self, "Request rejected");
            self.to_string()
        };

        let body = ApiResponse::<(), ErrorData>::error_with_data(
            &message,
            ErrorData {
                code: code.to_string(),
            },
        );
        (status, ResponseJson(body)).into_response()
    }
}

fn auth_status(err: &AuthError) -> (StatusCode, &'static str) {
    match err {
        AuthError::NotConfigured => not_configured(),
        AuthError::EmailExists => (StatusCode::CONFLICT, "EMAIL_EXISTS"),
        AuthError::InvalidToken => unauthorized(),
        AuthError::Rejected(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_REJECTED"),
        AuthError::Transport(_)
        | AuthError::Timeout
        | AuthError::Http { .. }
        | AuthError::Serde(_) => upstream(),
    }
}

fn validation() -> (StatusCode, &'static str) {
    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
}

fn unauthorized() -> (StatusCode, &'static str) {
    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED")
}

fn forbidden() -> (StatusCode, &'static str) {
    (StatusCode::FORBIDDEN, "FORBIDDEN")
}

fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "NOT_FOUND")
}

fn conflict() -> (StatusCode, &'static str) {
    (StatusCode::CONFLICT, "CONFLICT")
}

fn invalid_transition() -> (StatusCode, &'static str) {
    (StatusCode::CONFLICT, "INVALID_TRANSITION")
}

fn upstream() -> (StatusCode, &'static str) {
    (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR")
}

fn not_configured() -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, "NOT_CONFIGURED")
}

fn internal() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_onboarding_codes() {
        assert_eq!(
            ApiError::from(OnboardingError::PhoneExists).status_and_code(),
            (StatusCode::CONFLICT, "PHONE_EXISTS")
        );
        assert_eq!(
            ApiError::from(OnboardingError::from(AuthError::EmailExists)).status_and_code(),
            (StatusCode::CONFLICT, "EMAIL_EXISTS")
        );
        assert_eq!(
            ApiError::from(OnboardingError::from(AuthError::Timeout)).status_and_code(),
            (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR")
        );
    }

    #[test]
    fn test_lifecycle_conflicts_are_409() {
        let (status, code) =
            ApiError::from(MarketplaceError::InvalidTransition("offer is accepted".into()))
                .status_and_code();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, "INVALID_TRANSITION");
    }

    #[test]
    fn test_missing_push_tokens_is_404() {
        assert_eq!(
            ApiError::from(CallNotificationError::NoPushTokens).status_and_code(),
            (StatusCode::NOT_FOUND, "NO_PUSH_TOKENS")
        );
    }
}

use axum::{
    Router, extract::State, http::StatusCode, response::Json as ResponseJson, routing::post,
};
use db::models::push_token::PushToken;
use deployment::Deployment;
use services::services::{
    call_notification::{
        CallNotification, CallNotificationResult, CallNotificationService, RegisterPushToken,
    },
    email::{EmailMessage, SentEmail},
};
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, middleware::RequireUser};

/// POST /api/send-call-notification
/// Wakes the receiver's devices for an incoming call.
pub async fn send_call_notification(
    State(deployment): State<DeploymentImpl>,
    RequireUser(user): RequireUser,
    axum::Json(payload): axum::Json<CallNotification>,
) -> Result<ResponseJson<ApiResponse<CallNotificationResult>>, ApiError> {
    let result =
        CallNotificationService::notify(&deployment.db().pool, deployment.push(), &payload).await?;

    deployment
        .track_event(
            "call_notification_sent",
            serde_json::json!({
                "receiver_id": payload.receiver_id.to_string(),
                "call_id": payload.call_id,
                "sender_id": user.id.to_string(),
                "sent": result.sent,
                "failed": result.failed,
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(result)))
}

/// POST /api/push-tokens
/// Registers a device for the signed-in user; a token re-registered by another user moves to them.
pub async fn register_push_token(
    State(deployment): State<DeploymentImpl>,
    RequireUser(user): RequireUser,
    axum::Json(payload): axum::Json<RegisterPushToken>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<PushToken>>), ApiError> {
    let token =
        CallNotificationService::register_token(&deployment.db().pool, user.id, &payload).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(token))))
}

/// POST /api/send-email
pub async fn send_email(
    State(deployment): State<DeploymentImpl>,
    RequireUser(user): RequireUser,
    axum::Json(payload): axum::Json<EmailMessage>,
) -> Result<ResponseJson<ApiResponse<SentEmail>>, ApiError> {
    let sent = deployment.email().send(&payload).await?;

    deployment
        .track_event(
            "email_sent",
            serde_json::json!({
                "email_id": sent.id,
                "recipients": payload.to.len(),
                "sender_id": user.id.to_string(),
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(sent)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/send-call-notification", post(send_call_notification))
        .route("/push-tokens", post(register_push_token))
        .route("/send-email", post(send_email))
}

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::{Duration, Utc};
use db::models::activity_log::ActivityLog;
use deployment::Deployment;
use serde::Deserialize;
use services::services::activity_tracker::{ActivitySummary, ActivityTracker, PageViewEvent};
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, middleware::RequireAdmin};

const DEFAULT_SUMMARY_DAYS: i64 = 30;
const MAX_SUMMARY_DAYS: i64 = 365;

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub days: Option<i64>,
}

/// POST /api/activity
/// Public page-view beacon; attribution fields are derived server-side.
pub async fn record_page_view(
    State(deployment): State<DeploymentImpl>,
    axum::Json(payload): axum::Json<PageViewEvent>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<ActivityLog>>), ApiError> {
    let log = ActivityTracker::record(&deployment.db().pool, &payload).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(log))))
}

pub async fn get_summary(
    State(deployment): State<DeploymentImpl>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<SummaryQuery>,
) -> Result<ResponseJson<ApiResponse<ActivitySummary>>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_SUMMARY_DAYS);
    if !(1..=MAX_SUMMARY_DAYS).contains(&days) {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {MAX_SUMMARY_DAYS}"
        )));
    }

    let since = Utc::now() - Duration::days(days);
    let summary = ActivityTracker::summary(&deployment.db().pool, since).await?;
    Ok(ResponseJson(ApiResponse::success(summary)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/activity", post(record_page_view))
        .route("/activity/summary", get(get_summary))
}

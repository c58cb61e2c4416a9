use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::{
    offer::{CreateOffer, Offer},
    review::{CreateReview, Review},
    service_request::{CreateServiceRequest, RequestStatus, ServiceRequest},
};
use deployment::Deployment;
use serde::Deserialize;
use services::services::{
    marketplace::{JobStageUpdate, MarketplaceService},
    reviews::ReviewService,
};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct RequestListQuery {
    pub status: Option<RequestStatus>,
}

/// POST /api/requests
pub async fn create_request(
    State(deployment): State<DeploymentImpl>,
    axum::Json(payload): axum::Json<CreateServiceRequest>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<ServiceRequest>>), ApiError> {
    let request = MarketplaceService::create_request(
        &deployment.db().pool,
        &payload,
        &deployment.config().default_country_code,
    )
    .await?;

    deployment
        .track_event(
            "request_created",
            serde_json::json!({
                "request_id": request.id.to_string(),
                "service_type": request.service_type,
            }),
        )
        .await;

    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(request))))
}

pub async fn get_requests(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<RequestListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<ServiceRequest>>>, ApiError> {
    let requests = ServiceRequest::find_all(&deployment.db().pool, query.status).await?;
    Ok(ResponseJson(ApiResponse::success(requests)))
}

pub async fn get_request(
    State(deployment): State<DeploymentImpl>,
    Path(request_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<ServiceRequest>>, ApiError> {
    let request = MarketplaceService::get_request(&deployment.db().pool, request_id).await?;
    Ok(ResponseJson(ApiResponse::success(request)))
}

/// POST /api/requests/{request_id}/cancel
/// Pending offers on the request are rejected together with the cancellation.
pub async fn cancel_request(
    State(deployment): State<DeploymentImpl>,
    Path(request_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<ServiceRequest>>, ApiError> {
    let request = MarketplaceService::cancel_request(&deployment.db().pool, request_id).await?;

    deployment
        .track_event(
            "request_cancelled",
            serde_json::json!({ "request_id": request_id.to_string() }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(request)))
}

/// POST /api/requests/{request_id}/job-stage
pub async fn update_job_stage(
    State(deployment): State<DeploymentImpl>,
    Path(request_id): Path<Uuid>,
    axum::Json(payload): axum::Json<JobStageUpdate>,
) -> Result<ResponseJson<ApiResponse<ServiceRequest>>, ApiError> {
    let request =
        MarketplaceService::advance_job_stage(&deployment.db().pool, request_id, &payload).await?;

    deployment
        .track_event(
            "job_stage_updated",
            serde_json::json!({
                "request_id": request_id.to_string(),
                "partner_id": payload.partner_id.to_string(),
                "job_stage": request.job_stage,
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(request)))
}

pub async fn complete_request(
    State(deployment): State<DeploymentImpl>,
    Path(request_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<ServiceRequest>>, ApiError> {
    let request = MarketplaceService::complete_request(&deployment.db().pool, request_id).await?;

    deployment
        .track_event(
            "request_completed",
            serde_json::json!({
                "request_id": request_id.to_string(),
                "partner_id": request.assigned_partner_id.map(|id| id.to_string()),
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(request)))
}

pub async fn get_request_offers(
    State(deployment): State<DeploymentImpl>,
    Path(request_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Offer>>>, ApiError> {
    let offers = MarketplaceService::offers_for_request(&deployment.db().pool, request_id).await?;
    Ok(ResponseJson(ApiResponse::success(offers)))
}

/// POST /api/requests/{request_id}/offers
/// Adds one `sent` offer; offers already on the request are left as they are.
pub async fn submit_offer(
    State(deployment): State<DeploymentImpl>,
    Path(request_id): Path<Uuid>,
    axum::Json(payload): axum::Json<CreateOffer>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Offer>>), ApiError> {
    let offer =
        MarketplaceService::submit_offer(&deployment.db().pool, request_id, &payload).await?;

    deployment
        .track_event(
            "offer_submitted",
            serde_json::json!({
                "offer_id": offer.id.to_string(),
                "request_id": request_id.to_string(),
                "partner_id": offer.partner_id.to_string(),
            }),
        )
        .await;

    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(offer))))
}

pub async fn create_review(
    State(deployment): State<DeploymentImpl>,
    Path(request_id): Path<Uuid>,
    axum::Json(payload): axum::Json<CreateReview>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Review>>), ApiError> {
    let review = ReviewService::create_review(&deployment.db().pool, request_id, &payload).await?;

    deployment
        .track_event(
            "review_created",
            serde_json::json!({
                "review_id": review.id.to_string(),
                "partner_id": review.partner_id.to_string(),
                "rating": review.rating,
            }),
        )
        .await;

    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(review))))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let request_id_router = Router::new()
        .route("/", get(get_request))
        .route("/cancel", post(cancel_request))
        .route("/job-stage", post(update_job_stage))
        .route("/complete", post(complete_request))
        .route("/offers", get(get_request_offers).post(submit_offer))
        .route("/review", post(create_review));

    let requests_router = Router::new()
        .route("/", get(get_requests).post(create_request))
        .nest("/{request_id}", request_id_router);

    Router::new().nest("/requests", requests_router)
}

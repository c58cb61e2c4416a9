use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{delete, get, post, put},
};
use db::models::{
    offer::Offer,
    partner::{Partner, PartnerStatus, UpdateShowcase},
    partner_vehicle::{CreatePartnerVehicle, PartnerVehicle},
    review::Review,
};
use deployment::Deployment;
use serde::Deserialize;
use services::services::{
    marketplace::MarketplaceService,
    onboarding::{CreatePartnerAccount, OnboardingService},
    reviews::ReviewService,
};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    middleware::{MaybeAdmin, RequireAdmin},
};

#[derive(Debug, Deserialize)]
pub struct PartnerListQuery {
    pub status: Option<PartnerStatus>,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdatePartnerStatus {
    pub status: PartnerStatus,
}

#[derive(Debug, Deserialize, TS)]
pub struct AdjustCredits {
    pub delta: i64,
    pub reason: Option<String>,
}

/// POST /api/create-partner-user
/// Creates the auth user and the partner profile.
pub async fn create_partner_user(
    State(deployment): State<DeploymentImpl>,
    axum::Json(payload): axum::Json<CreatePartnerAccount>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Partner>>), ApiError> {
    let partner = OnboardingService::create_partner(
        &deployment.db().pool,
        deployment.auth(),
        &payload,
        &deployment.config().default_country_code,
    )
    .await?;

    deployment
        .track_event(
            "partner_created",
            serde_json::json!({ "partner_id": partner.id.to_string(), "city": partner.city }),
        )
        .await;

    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(partner))))
}

pub async fn get_partners(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<PartnerListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Partner>>>, ApiError> {
    let partners = Partner::find_all(&deployment.db().pool, query.status).await?;
    Ok(ResponseJson(ApiResponse::success(partners)))
}

pub async fn get_partner(
    State(deployment): State<DeploymentImpl>,
    Path(partner_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Partner>>, ApiError> {
    let partner = Partner::find_by_id(&deployment.db().pool, partner_id)
        .await?
        .ok_or(ApiError::NotFound("partner"))?;
    Ok(ResponseJson(ApiResponse::success(partner)))
}

/// PUT /api/partners/{partner_id}/status (admin)
pub async fn update_partner_status(
    State(deployment): State<DeploymentImpl>,
    Path(partner_id): Path<Uuid>,
    RequireAdmin(admin): RequireAdmin,
    axum::Json(payload): axum::Json<UpdatePartnerStatus>,
) -> Result<ResponseJson<ApiResponse<Partner>>, ApiError> {
    let partner = Partner::update_status(&deployment.db().pool, partner_id, payload.status)
        .await?
        .ok_or(ApiError::NotFound("partner"))?;

    deployment
        .track_event(
            "partner_status_changed",
            serde_json::json!({
                "partner_id": partner_id.to_string(),
                "status": payload.status.to_string(),
                "admin_id": admin.id.to_string(),
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(partner)))
}

pub async fn update_showcase(
    State(deployment): State<DeploymentImpl>,
    Path(partner_id): Path<Uuid>,
    axum::Json(payload): axum::Json<UpdateShowcase>,
) -> Result<ResponseJson<ApiResponse<Partner>>, ApiError> {
    let partner = Partner::update_showcase(&deployment.db().pool, partner_id, &payload)
        .await?
        .ok_or(ApiError::NotFound("partner"))?;
    Ok(ResponseJson(ApiResponse::success(partner)))
}

/// POST /api/partners/{partner_id}/credits (admin)
/// The balance never goes below zero.
pub async fn adjust_credits(
    State(deployment): State<DeploymentImpl>,
    Path(partner_id): Path<Uuid>,
    RequireAdmin(admin): RequireAdmin,
    axum::Json(payload): axum::Json<AdjustCredits>,
) -> Result<ResponseJson<ApiResponse<Partner>>, ApiError> {
    if payload.delta == 0 {
        return Err(ApiError::BadRequest("delta must not be zero".into()));
    }

    let pool = &deployment.db().pool;
    let Some(partner) = Partner::adjust_credits(pool, partner_id, payload.delta).await? else {
        return match Partner::find_by_id(pool, partner_id).await? {
            Some(partner) => Err(ApiError::Conflict(format!(
                "insufficient credits: balance is {}",
                partner.credits
            ))),
            None => Err(ApiError::NotFound("partner")),
        };
    };

    deployment
        .track_event(
            "partner_credits_adjusted",
            serde_json::json!({
                "partner_id": partner_id.to_string(),
                "delta": payload.delta,
                "balance": partner.credits,
                "reason": payload.reason,
                "admin_id": admin.id.to_string(),
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(partner)))
}

pub async fn get_vehicles(
    State(deployment): State<DeploymentImpl>,
    Path(partner_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<PartnerVehicle>>>, ApiError> {
    let vehicles = PartnerVehicle::find_by_partner_id(&deployment.db().pool, partner_id).await?;
    Ok(ResponseJson(ApiResponse::success(vehicles)))
}

pub async fn add_vehicle(
    State(deployment): State<DeploymentImpl>,
    Path(partner_id): Path<Uuid>,
    axum::Json(payload): axum::Json<CreatePartnerVehicle>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<PartnerVehicle>>), ApiError> {
    if payload.plate.trim().is_empty() || payload.vehicle_type.trim().is_empty() {
        return Err(ApiError::BadRequest("plate and vehicle_type are required".into()));
    }

    let pool = &deployment.db().pool;
    Partner::find_by_id(pool, partner_id)
        .await?
        .ok_or(ApiError::NotFound("partner"))?;

    let vehicle = PartnerVehicle::create(pool, partner_id, &payload)
        .await
        .map_err(|e| {
            if db::is_unique_violation(&e) {
                ApiError::Conflict("vehicle with this plate already registered".into())
            } else {
                ApiError::Database(e)
            }
        })?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(vehicle))))
}

pub async fn remove_vehicle(
    State(deployment): State<DeploymentImpl>,
    Path((partner_id, vehicle_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let removed = PartnerVehicle::delete(&deployment.db().pool, partner_id, vehicle_id).await?;
    if removed == 0 {
        return Err(ApiError::NotFound("vehicle"));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn get_partner_offers(
    State(deployment): State<DeploymentImpl>,
    Path(partner_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Offer>>>, ApiError> {
    let offers = MarketplaceService::offers_for_partner(&deployment.db().pool, partner_id).await?;
    Ok(ResponseJson(ApiResponse::success(offers)))
}

/// GET /api/partners/{partner_id}/reviews
/// Hidden reviews are only included for admins.
pub async fn get_partner_reviews(
    State(deployment): State<DeploymentImpl>,
    Path(partner_id): Path<Uuid>,
    MaybeAdmin(admin): MaybeAdmin,
) -> Result<ResponseJson<ApiResponse<Vec<Review>>>, ApiError> {
    let reviews =
        ReviewService::reviews_for_partner(&deployment.db().pool, partner_id, admin.is_some())
            .await?;
    Ok(ResponseJson(ApiResponse::success(reviews)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let partner_router = Router::new()
        .route("/", get(get_partner))
        .route("/status", put(update_partner_status))
        .route("/showcase", put(update_showcase))
        .route("/credits", post(adjust_credits))
        .route("/vehicles", get(get_vehicles).post(add_vehicle))
        .route("/vehicles/{vehicle_id}", delete(remove_vehicle))
        .route("/offers", get(get_partner_offers))
        .route("/reviews", get(get_partner_reviews));

    Router::new()
        .route("/create-partner-user", post(create_partner_user))
        .route("/partners", get(get_partners))
        .nest("/partners/{partner_id}", partner_router)
}

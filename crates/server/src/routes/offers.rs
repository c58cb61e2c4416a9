use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::post,
};
use db::models::offer::Offer;
use deployment::Deployment;
use serde::Deserialize;
use services::services::marketplace::{AcceptedOffer, MarketplaceService};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError};

#[derive(Debug, Deserialize, TS)]
pub struct WithdrawOffer {
    pub partner_id: Uuid,
}

/// POST /api/offers/{offer_id}/accept
/// Matches the request to the offer's partner and rejects every other pending offer.
pub async fn accept_offer(
    State(deployment): State<DeploymentImpl>,
    Path(offer_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<AcceptedOffer>>, ApiError> {
    let accepted = MarketplaceService::accept_offer(&deployment.db().pool, offer_id).await?;

    deployment
        .track_event(
            "offer_accepted",
            serde_json::json!({
                "offer_id": offer_id.to_string(),
                "request_id": accepted.request.id.to_string(),
                "partner_id": accepted.offer.partner_id.to_string(),
                "rejected_offers": accepted.rejected_offers,
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(accepted)))
}

pub async fn reject_offer(
    State(deployment): State<DeploymentImpl>,
    Path(offer_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Offer>>, ApiError> {
    let offer = MarketplaceService::reject_offer(&deployment.db().pool, offer_id).await?;

    deployment
        .track_event(
            "offer_rejected",
            serde_json::json!({ "offer_id": offer_id.to_string() }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(offer)))
}

pub async fn withdraw_offer(
    State(deployment): State<DeploymentImpl>,
    Path(offer_id): Path<Uuid>,
    axum::Json(payload): axum::Json<WithdrawOffer>,
) -> Result<ResponseJson<ApiResponse<Offer>>, ApiError> {
    let offer =
        MarketplaceService::withdraw_offer(&deployment.db().pool, offer_id, payload.partner_id)
            .await?;

    deployment
        .track_event(
            "offer_withdrawn",
            serde_json::json!({
                "offer_id": offer_id.to_string(),
                "partner_id": payload.partner_id.to_string(),
            }),
        )
        .await;

    Ok(ResponseJson(ApiResponse::success(offer)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let offer_router = Router::new()
        .route("/accept", post(accept_offer))
        .route("/reject", post(reject_offer))
        .route("/withdraw", post(withdraw_offer));

    Router::new().nest("/offers/{offer_id}", offer_router)
}

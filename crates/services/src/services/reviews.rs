//! Review moderation: creation, hiding and partner objections.

use db::models::{
    partner::Partner,
    review::{CreateReview, ObjectionStatus, Review, ReviewObjection},
    service_request::{RequestStatus, ServiceRequest},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("{0}")]
    Conflict(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ResolvedObjection {
    pub objection: ReviewObjection,
    pub review: Review,
}

pub struct ReviewService;

impl ReviewService {
    /// Reviews a completed job. The partner's rating is recomputed in the same transaction.
    pub async fn create_review(
        pool: &SqlitePool,
        request_id: Uuid,
        data: &CreateReview,
    ) -> Result<Review, ReviewError> {
        if !(1..=5).contains(&data.rating) {
            return Err(ReviewError::Validation("rating must be between 1 and 5".into()));
        }

        let request = ServiceRequest::find_by_id(pool, request_id)
            .await?
            .ok_or(ReviewError::NotFound("request"))?;
        if request.status != RequestStatus::Completed {
            return Err(ReviewError::InvalidTransition(format!(
                "request is {}, only completed jobs can be reviewed",
                request.status
            )));
        }
        let partner_id = request.assigned_partner_id.ok_or_else(|| {
            ReviewError::InvalidTransition("request has no assigned partner".into())
        })?;

        let data = CreateReview {
            rating: data.rating,
            comment: data
                .comment
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        };

        let mut tx = pool.begin().await?;
        let review = Review::create(&mut *tx, request_id, partner_id, &data)
            .await
            .map_err(|e| {
                if db::is_unique_violation(&e) {
                    ReviewError::Conflict("request already has a review".into())
                } else {
                    ReviewError::Database(e)
                }
            })?;
        Partner::refresh_rating(&mut *tx, partner_id).await?;
        tx.commit().await?;

        info!(
            review_id = %review.id,
            partner_id = %partner_id,
            rating = review.rating,
            "Review created"
        );
        Ok(review)
    }

    /// Sets the hidden flag. Setting the current value again changes nothing.
    pub async fn set_hidden(
        pool: &SqlitePool,
        review_id: Uuid,
        hidden: bool,
    ) -> Result<Review, ReviewError> {
        let mut tx = pool.begin().await?;
        let review = Review::set_hidden(&mut *tx, review_id, hidden)
            .await?
            .ok_or(ReviewError::NotFound("review"))?;
        Partner::refresh_rating(&mut *tx, review.partner_id).await?;
        tx.commit().await?;

        info!(review_id = %review_id, hidden, "Review visibility set");
        Ok(review)
    }

    pub async fn reviews_for_partner(
        pool: &SqlitePool,
        partner_id: Uuid,
        include_hidden: bool,
    ) -> Result<Vec<Review>, ReviewError> {
        Partner::find_by_id(pool, partner_id)
            .await?
            .ok_or(ReviewError::NotFound("partner"))?;
        Ok(Review::find_by_partner_id(pool, partner_id, include_hidden).await?)
    }

    pub async fn file_objection(
        pool: &SqlitePool,
        review_id: Uuid,
        partner_id: Uuid,
        reason: &str,
    ) -> Result<ReviewObjection, ReviewError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ReviewError::Validation("reason is required".into()));
        }

        let review = Review::find_by_id(pool, review_id)
            .await?
            .ok_or(ReviewError::NotFound("review"))?;
        if review.partner_id != partner_id {
            return Err(ReviewError::Forbidden(
                "only the reviewed partner can object".into(),
            ));
        }

        let objection = ReviewObjection::create(pool, review_id, partner_id, reason)
            .await
            .map_err(|e| {
                if db::is_unique_violation(&e) {
                    ReviewError::Conflict("review already has a pending objection".into())
                } else {
                    ReviewError::Database(e)
                }
            })?;

        info!(objection_id = %objection.id, review_id = %review_id, "Review objection filed");
        Ok(objection)
    }

    /// Closes a pending objection. Approving it hides the review.
    pub async fn resolve_objection(
        pool: &SqlitePool,
        objection_id: Uuid,
        approve: bool,
        admin_note: Option<&str>,
    ) -> Result<ResolvedObjection, ReviewError> {
        let status = if approve {
            ObjectionStatus::Approved
        } else {
            ObjectionStatus::Rejected
        };
        let admin_note = admin_note.map(str::trim).filter(|n| !n.is_empty());

        let mut tx = pool.begin().await?;
        let Some(objection) =
            ReviewObjection::resolve(&mut *tx, objection_id, status, admin_note).await?
        else {
            drop(tx);
            return match ReviewObjection::find_by_id(pool, objection_id).await? {
                Some(existing) => Err(ReviewError::InvalidTransition(format!(
                    "objection is already {}",
                    existing.status
                ))),
                None => Err(ReviewError::NotFound("objection")),
            };
        };

        let review = if approve {
            let review = Review::set_hidden(&mut *tx, objection.review_id, true)
                .await?
                .ok_or(ReviewError::NotFound("review"))?;
            Partner::refresh_rating(&mut *tx, review.partner_id).await?;
            review
        } else {
            Review::find_by_id(&mut *tx, objection.review_id)
                .await?
                .ok_or(ReviewError::NotFound("review"))?
        };
        tx.commit().await?;

        info!(
            objection_id = %objection_id,
            review_id = %review.id,
            status = %status,
            "Review objection resolved"
        );
        Ok(ResolvedObjection { objection, review })
    }

    pub async fn pending_objections(
        pool: &SqlitePool,
    ) -> Result<Vec<ReviewObjection>, ReviewError> {
        Ok(ReviewObjection::find_by_status(pool, ObjectionStatus::Pending).await?)
    }
}

//! Request and offer lifecycle.
//!
//! Multi-row transitions run in one transaction of status-guarded updates; an
//! update that touches no rows means another writer got there first and the
//! whole transition is rolled back as a conflict.

use db::models::{
    offer::{CreateOffer, Offer, OfferStatus},
    partner::{Partner, PartnerStatus},
    service_request::{CreateServiceRequest, FINAL_JOB_STAGE, RequestStatus, ServiceRequest},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};
use ts_rs::TS;
use utils::phone::normalize_phone;
use uuid::Uuid;

/// Stage from which a start-of-job proof photo may be attached (on site).
const START_PHOTO_MIN_STAGE: i64 = 2;

#[derive(Debug, Error)]
pub enum MarketplaceError {
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
pub struct JobStageUpdate {
    pub partner_id: Uuid,
    pub job_stage: i64,
    pub start_proof_photo_url: Option<String>,
    pub end_proof_photo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AcceptedOffer {
    pub offer: Offer,
    pub request: ServiceRequest,
    pub rejected_offers: u64,
}

pub struct MarketplaceService;

impl MarketplaceService {
    pub async fn create_request(
        pool: &SqlitePool,
        data: &CreateServiceRequest,
        default_country_code: &str,
    ) -> Result<ServiceRequest, MarketplaceError> {
        let customer_name = required("customer_name", &data.customer_name)?;
        let service_type = required("service_type", &data.service_type)?;
        let from_location = required("from_location", &data.from_location)?;
        let customer_phone = normalize_phone(&data.customer_phone, default_country_code)
            .ok_or_else(|| MarketplaceError::Validation("customer_phone is invalid".into()))?;

        let customer_email = match data.customer_email.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(email) if email.contains('@') => Some(email.to_string()),
            Some(_) => {
                return Err(MarketplaceError::Validation(
                    "customer_email is invalid".into(),
                ));
            }
        };

        let normalized = CreateServiceRequest {
            customer_name,
            customer_phone,
            customer_email,
            service_type,
            from_location,
            to_location: trimmed(&data.to_location),
            vehicle_info: trimmed(&data.vehicle_info),
            description: trimmed(&data.description),
        };

        let request = ServiceRequest::create(pool, &normalized, Uuid::new_v4()).await?;
        info!(
            request_id = %request.id,
            service_type = %request.service_type,
            "Service request opened"
        );
        Ok(request)
    }

    pub async fn get_request(
        pool: &SqlitePool,
        request_id: Uuid,
    ) -> Result<ServiceRequest, MarketplaceError> {
        ServiceRequest::find_by_id(pool, request_id)
            .await?
            .ok_or(MarketplaceError::NotFound("request"))
    }

    /// Places a `sent` offer. Other offers on the request are not touched.
    pub async fn submit_offer(
        pool: &SqlitePool,
        request_id: Uuid,
        data: &CreateOffer,
    ) -> Result<Offer, MarketplaceError> {
        if data.price <= 0 {
            return Err(MarketplaceError::Validation("price must be positive".into()));
        }
        if data.eta_minutes <= 0 {
            return Err(MarketplaceError::Validation(
                "eta_minutes must be positive".into(),
            ));
        }

        let partner = Partner::find_by_id(pool, data.partner_id)
            .await?
            .ok_or(MarketplaceError::NotFound("partner"))?;
        if partner.status != PartnerStatus::Active {
            return Err(MarketplaceError::Forbidden(format!(
                "partner is {}, only active partners can send offers",
                partner.status
            )));
        }

        let request = Self::get_request(pool, request_id).await?;
        if request.status != RequestStatus::Open {
            return Err(MarketplaceError::InvalidTransition(format!(
                "request is {}, offers are only accepted on open requests",
                request.status
            )));
        }

        let data = CreateOffer {
            message: trimmed(&data.message),
            ..data.clone()
        };
        let offer = Offer::create(pool, request_id, &data, Uuid::new_v4())
            .await
            .map_err(|e| {
                if db::is_unique_violation(&e) {
                    MarketplaceError::Conflict(
                        "partner already has a pending offer on this request".into(),
                    )
                } else {
                    MarketplaceError::Database(e)
                }
            })?;

        info!(
            offer_id = %offer.id,
            request_id = %request_id,
            partner_id = %offer.partner_id,
            price = offer.price,
            "Offer submitted"
        );
        Ok(offer)
    }

    /// Accepts an offer, matches its request and rejects the competing offers.
    pub async fn accept_offer(
        pool: &SqlitePool,
        offer_id: Uuid,
    ) -> Result<AcceptedOffer, MarketplaceError> {
        let offer = Offer::find_by_id(pool, offer_id)
            .await?
            .ok_or(MarketplaceError::NotFound("offer"))?;

        // The first statement writes, so SQLite takes the write lock up front
        // and concurrent accepts queue on it instead of failing mid-transaction.
        let mut tx = pool.begin().await?;

        let accepted = Offer::transition_from_sent(&mut *tx, offer.id, OfferStatus::Accepted)
            .await
            .map_err(already_accepted_as_conflict)?;
        if accepted == 0 {
            return Err(MarketplaceError::InvalidTransition(
                "offer is no longer pending".into(),
            ));
        }

        let matched = ServiceRequest::mark_matched(&mut *tx, offer.request_id, offer.partner_id)
            .await?;
        if matched == 0 {
            return Err(MarketplaceError::InvalidTransition(
                "request is no longer open".into(),
            ));
        }

        let rejected_offers =
            Offer::reject_other_sent(&mut *tx, offer.request_id, Some(offer.id)).await?;
        tx.commit().await?;

        info!(
            offer_id = %offer.id,
            request_id = %offer.request_id,
            partner_id = %offer.partner_id,
            rejected_offers,
            "Offer accepted"
        );

        let offer = Offer::find_by_id(pool, offer.id)
            .await?
            .ok_or(MarketplaceError::NotFound("offer"))?;
        let request = Self::get_request(pool, offer.request_id).await?;
        Ok(AcceptedOffer {
            offer,
            request,
            rejected_offers,
        })
    }

    pub async fn reject_offer(
        pool: &SqlitePool,
        offer_id: Uuid,
    ) -> Result<Offer, MarketplaceError> {
        Self::leave_sent(pool, offer_id, OfferStatus::Rejected).await
    }

    /// Partner takes back its own pending offer.
    pub async fn withdraw_offer(
        pool: &SqlitePool,
        offer_id: Uuid,
        partner_id: Uuid,
    ) -> Result<Offer, MarketplaceError> {
        let offer = Offer::find_by_id(pool, offer_id)
            .await?
            .ok_or(MarketplaceError::NotFound("offer"))?;
        if offer.partner_id != partner_id {
            return Err(MarketplaceError::Forbidden(
                "offer belongs to another partner".into(),
            ));
        }
        Self::leave_sent(pool, offer_id, OfferStatus::Withdrawn).await
    }

    async fn leave_sent(
        pool: &SqlitePool,
        offer_id: Uuid,
        status: OfferStatus,
    ) -> Result<Offer, MarketplaceError> {
        if Offer::transition_from_sent(pool, offer_id, status).await? == 0 {
            return match Offer::find_by_id(pool, offer_id).await? {
                Some(offer) => Err(MarketplaceError::InvalidTransition(format!(
                    "offer is {}, only sent offers can be {}",
                    offer.status, status
                ))),
                None => Err(MarketplaceError::NotFound("offer")),
            };
        }

        debug!(offer_id = %offer_id, status = %status, "Offer closed");
        Offer::find_by_id(pool, offer_id)
            .await?
            .ok_or(MarketplaceError::NotFound("offer"))
    }

    /// Cancels an open or matched request and rejects its pending offers.
    pub async fn cancel_request(
        pool: &SqlitePool,
        request_id: Uuid,
    ) -> Result<ServiceRequest, MarketplaceError> {
        let mut tx = pool.begin().await?;
        if ServiceRequest::mark_cancelled(&mut *tx, request_id).await? == 0 {
            return match ServiceRequest::find_by_id(&mut *tx, request_id).await? {
                Some(request) => Err(MarketplaceError::InvalidTransition(format!(
                    "request is {} and cannot be cancelled",
                    request.status
                ))),
                None => Err(MarketplaceError::NotFound("request")),
            };
        }
        let rejected_offers = Offer::reject_other_sent(&mut *tx, request_id, None).await?;
        tx.commit().await?;

        info!(request_id = %request_id, rejected_offers, "Service request cancelled");
        Self::get_request(pool, request_id).await
    }

    /// Records job progress reported by the assigned partner.
    pub async fn advance_job_stage(
        pool: &SqlitePool,
        request_id: Uuid,
        update: &JobStageUpdate,
    ) -> Result<ServiceRequest, MarketplaceError> {
        if !(1..=FINAL_JOB_STAGE).contains(&update.job_stage) {
            return Err(MarketplaceError::Validation(format!(
                "job_stage must be between 1 and {FINAL_JOB_STAGE}"
            )));
        }
        let start_photo = trimmed(&update.start_proof_photo_url);
        let end_photo = trimmed(&update.end_proof_photo_url);
        if start_photo.is_some() && update.job_stage < START_PHOTO_MIN_STAGE {
            return Err(MarketplaceError::Validation(
                "start proof photo can only be attached once on site".into(),
            ));
        }
        if end_photo.is_some() != (update.job_stage == FINAL_JOB_STAGE) {
            return Err(MarketplaceError::Validation(
                "end proof photo is required at delivery and only at delivery".into(),
            ));
        }

        let updated = ServiceRequest::advance_job_stage(
            pool,
            request_id,
            update.partner_id,
            update.job_stage,
            start_photo.as_deref(),
            end_photo.as_deref(),
        )
        .await?;

        match updated {
            Some(request) => {
                info!(
                    request_id = %request_id,
                    job_stage = request.job_stage,
                    "Job stage advanced"
                );
                Ok(request)
            }
            None => {
                let request = Self::get_request(pool, request_id).await?;
                if request.assigned_partner_id != Some(update.partner_id) {
                    Err(MarketplaceError::Forbidden(
                        "request is assigned to another partner".into(),
                    ))
                } else if request.status != RequestStatus::Matched {
                    Err(MarketplaceError::InvalidTransition(format!(
                        "request is {}, job stages only move on matched requests",
                        request.status
                    )))
                } else {
                    Err(MarketplaceError::InvalidTransition(format!(
                        "job stage is already {}",
                        request.job_stage
                    )))
                }
            }
        }
    }

    pub async fn complete_request(
        pool: &SqlitePool,
        request_id: Uuid,
    ) -> Result<ServiceRequest, MarketplaceError> {
        match ServiceRequest::mark_completed(pool, request_id).await? {
            Some(request) => {
                info!(request_id = %request_id, "Service request completed");
                Ok(request)
            }
            None => {
                let request = Self::get_request(pool, request_id).await?;
                Err(MarketplaceError::InvalidTransition(
                    if request.status != RequestStatus::Matched {
                        format!("request is {} and cannot be completed", request.status)
                    } else {
                        "delivery proof photo is required before completion".to_string()
                    },
                ))
            }
        }
    }

    pub async fn offers_for_request(
        pool: &SqlitePool,
        request_id: Uuid,
    ) -> Result<Vec<Offer>, MarketplaceError> {
        Self::get_request(pool, request_id).await?;
        Ok(Offer::find_by_request_id(pool, request_id).await?)
    }

    pub async fn offers_for_partner(
        pool: &SqlitePool,
        partner_id: Uuid,
    ) -> Result<Vec<Offer>, MarketplaceError> {
        Partner::find_by_id(pool, partner_id)
            .await?
            .ok_or(MarketplaceError::NotFound("partner"))?;
        Ok(Offer::find_by_partner_id(pool, partner_id).await?)
    }
}

fn already_accepted_as_conflict(e: sqlx::Error) -> MarketplaceError {
    if db::is_unique_violation(&e) {
        MarketplaceError::Conflict("request already has an accepted offer".into())
    } else {
        MarketplaceError::Database(e)
    }
}

fn required(field: &str, value: &str) -> Result<String, MarketplaceError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(MarketplaceError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
pub(crate) mod tests {
    use db::{
        DBService,
        models::partner::{CreatePartner, Partner, PartnerStatus},
    };

    use super::*;

    pub(crate) async fn active_partner(pool: &SqlitePool, phone: &str) -> Partner {
        let partner = Partner::create(
            pool,
            &CreatePartner {
                auth_user_id: Uuid::new_v4(),
                company_name: "Yol Yardim Ltd".to_string(),
                contact_name: "Emre Demir".to_string(),
                email: format!("{}@example.com", Uuid::new_v4()),
                phone: phone.to_string(),
                city: "Istanbul".to_string(),
                district: None,
                service_types: vec!["towing".to_string()],
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        Partner::update_status(pool, partner.id, PartnerStatus::Active)
            .await
            .unwrap()
            .unwrap()
    }

    pub(crate) async fn open_request(pool: &SqlitePool) -> ServiceRequest {
        MarketplaceService::create_request(
            pool,
            &CreateServiceRequest {
                customer_name: " Ayse Yilmaz ".to_string(),
                customer_phone: "0555 111 22 33".to_string(),
                customer_email: None,
                service_type: "towing".to_string(),
                from_location: "E-5 Bostanci".to_string(),
                to_location: Some("Kartal".to_string()),
                vehicle_info: None,
                description: Some("  ".to_string()),
            },
            "90",
        )
        .await
        .unwrap()
    }

    fn offer(partner_id: Uuid, price: i64) -> CreateOffer {
        CreateOffer {
            partner_id,
            price,
            eta_minutes: 25,
            message: None,
        }
    }

    #[tokio::test]
    async fn test_create_request_normalizes_input() {
        let db = DBService::new_in_memory().await.unwrap();
        let request = open_request(&db.pool).await;

        assert_eq!(request.status, RequestStatus::Open);
        assert_eq!(request.customer_name, "Ayse Yilmaz");
        assert_eq!(request.customer_phone, "+905551112233");
        assert!(request.description.is_none());
    }

    #[tokio::test]
    async fn test_create_request_rejects_missing_fields() {
        let db = DBService::new_in_memory().await.unwrap();
        let err = MarketplaceService::create_request(
            &db.pool,
            &CreateServiceRequest {
                customer_name: "Ayse".to_string(),
                customer_phone: "12".to_string(),
                customer_email: None,
                service_type: "towing".to_string(),
                from_location: "Kadikoy".to_string(),
                to_location: None,
                vehicle_info: None,
                description: None,
            },
            "90",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MarketplaceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_submit_offer_leaves_other_offers_unchanged() {
        let db = DBService::new_in_memory().await.unwrap();
        let first = active_partner(&db.pool, "+905320000101").await;
        let second = active_partner(&db.pool, "+905320000102").await;
        let request = open_request(&db.pool).await;

        let existing =
            MarketplaceService::submit_offer(&db.pool, request.id, &offer(first.id, 120_000))
                .await
                .unwrap();
        let new = MarketplaceService::submit_offer(&db.pool, request.id, &offer(second.id, 99_000))
            .await
            .unwrap();

        assert_eq!(new.status, OfferStatus::Sent);
        let existing_after = Offer::find_by_id(&db.pool, existing.id).await.unwrap().unwrap();
        assert_eq!(existing_after.status, OfferStatus::Sent);
        assert_eq!(existing_after.updated_at, existing.updated_at);
    }

    #[tokio::test]
    async fn test_submit_offer_guards() {
        let db = DBService::new_in_memory().await.unwrap();
        let partner = active_partner(&db.pool, "+905320000103").await;
        let request = open_request(&db.pool).await;

        let err = MarketplaceService::submit_offer(&db.pool, request.id, &offer(partner.id, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::Validation(_)));

        MarketplaceService::submit_offer(&db.pool, request.id, &offer(partner.id, 100))
            .await
            .unwrap();
        let err = MarketplaceService::submit_offer(&db.pool, request.id, &offer(partner.id, 90))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::Conflict(_)));

        Partner::update_status(&db.pool, partner.id, PartnerStatus::Suspended)
            .await
            .unwrap();
        let other_request = open_request(&db.pool).await;
        let err =
            MarketplaceService::submit_offer(&db.pool, other_request.id, &offer(partner.id, 90))
                .await
                .unwrap_err();
        assert!(matches!(err, MarketplaceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_accept_offer_matches_request_and_rejects_others() {
        let db = DBService::new_in_memory().await.unwrap();
        let winner = active_partner(&db.pool, "+905320000104").await;
        let loser = active_partner(&db.pool, "+905320000105").await;
        let request = open_request(&db.pool).await;

        let winning = MarketplaceService::submit_offer(&db.pool, request.id, &offer(winner.id, 100))
            .await
            .unwrap();
        let losing = MarketplaceService::submit_offer(&db.pool, request.id, &offer(loser.id, 200))
            .await
            .unwrap();

        let accepted = MarketplaceService::accept_offer(&db.pool, winning.id).await.unwrap();
        assert_eq!(accepted.offer.status, OfferStatus::Accepted);
        assert_eq!(accepted.request.status, RequestStatus::Matched);
        assert_eq!(accepted.request.assigned_partner_id, Some(winner.id));
        assert_eq!(accepted.request.job_stage, 0);
        assert_eq!(accepted.rejected_offers, 1);

        let losing = Offer::find_by_id(&db.pool, losing.id).await.unwrap().unwrap();
        assert_eq!(losing.status, OfferStatus::Rejected);

        let err = MarketplaceService::accept_offer(&db.pool, losing.id).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_concurrent_accepts_have_one_winner() {
        let db = DBService::new_in_memory().await.unwrap();
        let a = active_partner(&db.pool, "+905320000106").await;
        let b = active_partner(&db.pool, "+905320000107").await;
        let request = open_request(&db.pool).await;

        let offer_a = MarketplaceService::submit_offer(&db.pool, request.id, &offer(a.id, 100))
            .await
            .unwrap();
        let offer_b = MarketplaceService::submit_offer(&db.pool, request.id, &offer(b.id, 100))
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            MarketplaceService::accept_offer(&db.pool, offer_a.id),
            MarketplaceService::accept_offer(&db.pool, offer_b.id),
        );
        assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);

        let accepted = Offer::find_by_request_id(&db.pool, request.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|o| o.status == OfferStatus::Accepted)
            .count();
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn test_cancel_rejects_pending_offers() {
        let db = DBService::new_in_memory().await.unwrap();
        let partner = active_partner(&db.pool, "+905320000108").await;
        let request = open_request(&db.pool).await;
        let pending =
            MarketplaceService::submit_offer(&db.pool, request.id, &offer(partner.id, 100))
                .await
                .unwrap();

        let cancelled = MarketplaceService::cancel_request(&db.pool, request.id).await.unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        let pending = Offer::find_by_id(&db.pool, pending.id).await.unwrap().unwrap();
        assert_eq!(pending.status, OfferStatus::Rejected);

        let err = MarketplaceService::cancel_request(&db.pool, request.id).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::InvalidTransition(_)));
        let err = MarketplaceService::cancel_request(&db.pool, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::NotFound("request")));
    }

    #[tokio::test]
    async fn test_withdraw_requires_owner() {
        let db = DBService::new_in_memory().await.unwrap();
        let partner = active_partner(&db.pool, "+905320000109").await;
        let request = open_request(&db.pool).await;
        let sent = MarketplaceService::submit_offer(&db.pool, request.id, &offer(partner.id, 100))
            .await
            .unwrap();

        let err = MarketplaceService::withdraw_offer(&db.pool, sent.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::Forbidden(_)));

        let withdrawn = MarketplaceService::withdraw_offer(&db.pool, sent.id, partner.id)
            .await
            .unwrap();
        assert_eq!(withdrawn.status, OfferStatus::Withdrawn);

        let err = MarketplaceService::reject_offer(&db.pool, sent.id).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_job_flow_through_completion() {
        let db = DBService::new_in_memory().await.unwrap();
        let partner = active_partner(&db.pool, "+905320000110").await;
        let request = open_request(&db.pool).await;
        let sent = MarketplaceService::submit_offer(&db.pool, request.id, &offer(partner.id, 100))
            .await
            .unwrap();
        MarketplaceService::accept_offer(&db.pool, sent.id).await.unwrap();

        let stage = |job_stage: i64, start: Option<&str>, end: Option<&str>| JobStageUpdate {
            partner_id: partner.id,
            job_stage,
            start_proof_photo_url: start.map(str::to_string),
            end_proof_photo_url: end.map(str::to_string),
        };

        let start_too_early = stage(1, Some("s.jpg"), None);
        let err = MarketplaceService::advance_job_stage(&db.pool, request.id, &start_too_early)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::Validation(_)));

        let err = MarketplaceService::complete_request(&db.pool, request.id).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::InvalidTransition(_)));

        MarketplaceService::advance_job_stage(&db.pool, request.id, &stage(2, Some("s.jpg"), None))
            .await
            .unwrap();
        let err = MarketplaceService::advance_job_stage(&db.pool, request.id, &stage(2, None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::InvalidTransition(_)));

        let err = MarketplaceService::advance_job_stage(&db.pool, request.id, &stage(4, None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::Validation(_)));

        let delivered = MarketplaceService::advance_job_stage(
            &db.pool,
            request.id,
            &stage(4, None, Some("e.jpg")),
        )
        .await
        .unwrap();
        assert_eq!(delivered.job_stage, FINAL_JOB_STAGE);
        assert_eq!(delivered.start_proof_photo_url.as_deref(), Some("s.jpg"));

        let completed = MarketplaceService::complete_request(&db.pool, request.id).await.unwrap();
        assert_eq!(completed.status, RequestStatus::Completed);
    }
}

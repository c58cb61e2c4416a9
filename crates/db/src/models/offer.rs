use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug,
    Clone,
    Copy,
    Type,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    TS,
    EnumString,
    Display,
    Default,
)]
#[sqlx(type_name = "offer_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OfferStatus {
    #[default]
    Sent,
    Accepted,
    Rejected,
    Withdrawn,
}

/// A partner's bid on a service request.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Offer {
    pub id: Uuid,
    pub request_id: Uuid,
    pub partner_id: Uuid,
    pub price: i64, // Minor currency units
    pub eta_minutes: i64,
    pub message: Option<String>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateOffer {
    pub partner_id: Uuid,
    pub price: i64,
    pub eta_minutes: i64,
    pub message: Option<String>,
}

const OFFER_COLUMNS: &str =
    "id, request_id, partner_id, price, eta_minutes, message, status, created_at, updated_at";

impl Offer {
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Offer>(&format!("SELECT {OFFER_COLUMNS} FROM offers WHERE id = $1"))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_request_id(
        pool: &SqlitePool,
        request_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Offer>(&format!(
            "SELECT {OFFER_COLUMNS} FROM offers WHERE request_id = $1 ORDER BY created_at ASC"
        ))
        .bind(request_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_partner_id(
        pool: &SqlitePool,
        partner_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Offer>(&format!(
            "SELECT {OFFER_COLUMNS} FROM offers WHERE partner_id = $1 ORDER BY created_at DESC"
        ))
        .bind(partner_id)
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        request_id: Uuid,
        data: &CreateOffer,
        offer_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Offer>(&format!(
            r#"INSERT INTO offers
                   (id, request_id, partner_id, price, eta_minutes, message, status,
                    created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
               RETURNING {OFFER_COLUMNS}"#
        ))
        .bind(offer_id)
        .bind(request_id)
        .bind(data.partner_id)
        .bind(data.price)
        .bind(data.eta_minutes)
        .bind(&data.message)
        .bind(OfferStatus::Sent)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    /// Moves an offer out of `sent`. Returns rows affected; 0 means the offer
    /// had already left `sent` (or does not exist).
    pub async fn transition_from_sent<'e, E>(
        executor: E,
        id: Uuid,
        status: OfferStatus,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE offers SET status = $2, updated_at = $3 WHERE id = $1 AND status = 'sent'",
        )
        .bind(id)
        .bind(status)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Rejects every still-sent offer on `request_id` except `keep_offer_id`.
    pub async fn reject_other_sent<'e, E>(
        executor: E,
        request_id: Uuid,
        keep_offer_id: Option<Uuid>,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"UPDATE offers SET status = 'rejected', updated_at = $3
               WHERE request_id = $1
                 AND status = 'sent'
                 AND ($2 IS NULL OR id != $2)"#,
        )
        .bind(request_id)
        .bind(keep_offer_id)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DBService,
        models::{
            partner::tests::insert_partner,
            service_request::{ServiceRequest, tests::sample_request},
        },
    };

    #[tokio::test]
    async fn test_second_sent_offer_from_same_partner_is_rejected_by_index() {
        let db = DBService::new_in_memory().await.unwrap();
        let partner = insert_partner(&db.pool, "+905320000030").await;
        let request = ServiceRequest::create(&db.pool, &sample_request(), Uuid::new_v4())
            .await
            .unwrap();

        let data = CreateOffer {
            partner_id: partner.id,
            price: 150_000,
            eta_minutes: 30,
            message: None,
        };
        Offer::create(&db.pool, request.id, &data, Uuid::new_v4()).await.unwrap();
        let err = Offer::create(&db.pool, request.id, &data, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(crate::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_reject_other_sent_keeps_selected_offer() {
        let db = DBService::new_in_memory().await.unwrap();
        let first = insert_partner(&db.pool, "+905320000031").await;
        let second = insert_partner(&db.pool, "+905320000032").await;
        let request = ServiceRequest::create(&db.pool, &sample_request(), Uuid::new_v4())
            .await
            .unwrap();

        let keep = Offer::create(
            &db.pool,
            request.id,
            &CreateOffer { partner_id: first.id, price: 100, eta_minutes: 10, message: None },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        let other = Offer::create(
            &db.pool,
            request.id,
            &CreateOffer { partner_id: second.id, price: 90, eta_minutes: 20, message: None },
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let rejected = Offer::reject_other_sent(&db.pool, request.id, Some(keep.id)).await.unwrap();
        assert_eq!(rejected, 1);

        let keep = Offer::find_by_id(&db.pool, keep.id).await.unwrap().unwrap();
        let other = Offer::find_by_id(&db.pool, other.id).await.unwrap().unwrap();
        assert_eq!(keep.status, OfferStatus::Sent);
        assert_eq!(other.status, OfferStatus::Rejected);
    }
}

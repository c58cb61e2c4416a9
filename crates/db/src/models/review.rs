use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Review {
    pub id: Uuid,
    pub request_id: Uuid,
    pub partner_id: Uuid,
    pub rating: i64,
    pub comment: Option<String>,
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateReview {
    pub rating: i64,
    pub comment: Option<String>,
}

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
#[sqlx(type_name = "objection_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ObjectionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// A partner's dispute of a review, resolved by an admin.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ReviewObjection {
    pub id: Uuid,
    pub review_id: Uuid,
    pub partner_id: Uuid,
    pub reason: String,
    pub status: ObjectionStatus,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

const REVIEW_COLUMNS: &str =
    "id, request_id, partner_id, rating, comment, hidden, created_at, updated_at";
const OBJECTION_COLUMNS: &str =
    "id, review_id, partner_id, reason, status, admin_note, created_at, resolved_at";

impl Review {
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Review>(&format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_partner_id(
        pool: &SqlitePool,
        partner_id: Uuid,
        include_hidden: bool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Review>(&format!(
            r#"SELECT {REVIEW_COLUMNS} FROM reviews
               WHERE partner_id = $1 AND ($2 OR hidden = 0)
               ORDER BY created_at DESC"#
        ))
        .bind(partner_id)
        .bind(include_hidden)
        .fetch_all(pool)
        .await
    }

    pub async fn create<'e, E>(
        executor: E,
        request_id: Uuid,
        partner_id: Uuid,
        data: &CreateReview,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Review>(&format!(
            r#"INSERT INTO reviews
                   (id, request_id, partner_id, rating, comment, hidden, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, 0, $6, $6)
               RETURNING {REVIEW_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(request_id)
        .bind(partner_id)
        .bind(data.rating)
        .bind(&data.comment)
        .bind(Utc::now())
        .fetch_one(executor)
        .await
    }

    /// Sets (not toggles) the hidden flag, so repeating a call is a no-op.
    pub async fn set_hidden<'e, E>(
        executor: E,
        id: Uuid,
        hidden: bool,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Review>(&format!(
            r#"UPDATE reviews
               SET hidden = $2,
                   updated_at = CASE WHEN hidden = $2 THEN updated_at ELSE $3 END
               WHERE id = $1
               RETURNING {REVIEW_COLUMNS}"#
        ))
        .bind(id)
        .bind(hidden)
        .bind(Utc::now())
        .fetch_optional(executor)
        .await
    }
}

impl ReviewObjection {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ReviewObjection>(&format!(
            "SELECT {OBJECTION_COLUMNS} FROM review_objections WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_status(
        pool: &SqlitePool,
        status: ObjectionStatus,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ReviewObjection>(&format!(
            r#"SELECT {OBJECTION_COLUMNS} FROM review_objections
               WHERE status = $1
               ORDER BY created_at ASC"#
        ))
        .bind(status)
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        review_id: Uuid,
        partner_id: Uuid,
        reason: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ReviewObjection>(&format!(
            r#"INSERT INTO review_objections (id, review_id, partner_id, reason, status, created_at)
               VALUES ($1, $2, $3, $4, 'pending', $5)
               RETURNING {OBJECTION_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(review_id)
        .bind(partner_id)
        .bind(reason)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    /// `pending -> approved | rejected`. `None` when the objection is not pending.
    pub async fn resolve<'e, E>(
        executor: E,
        id: Uuid,
        status: ObjectionStatus,
        admin_note: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, ReviewObjection>(&format!(
            r#"UPDATE review_objections
               SET status = $2, admin_note = $3, resolved_at = $4
               WHERE id = $1 AND status = 'pending'
               RETURNING {OBJECTION_COLUMNS}"#
        ))
        .bind(id)
        .bind(status)
        .bind(admin_note)
        .bind(Utc::now())
        .fetch_optional(executor)
        .await
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
    async fn test_set_hidden_twice_keeps_timestamp() {
        let db = DBService::new_in_memory().await.unwrap();
        let partner = insert_partner(&db.pool, "+905320000040").await;
        let request = ServiceRequest::create(&db.pool, &sample_request(), Uuid::new_v4())
            .await
            .unwrap();
        let review = Review::create(
            &db.pool,
            request.id,
            partner.id,
            &CreateReview { rating: 2, comment: None },
        )
        .await
        .unwrap();

        let first = Review::set_hidden(&db.pool, review.id, true).await.unwrap().unwrap();
        let second = Review::set_hidden(&db.pool, review.id, true).await.unwrap().unwrap();
        assert!(first.hidden && second.hidden);
        assert_eq!(first.updated_at, second.updated_at);

        let visible = Review::find_by_partner_id(&db.pool, partner.id, false).await.unwrap();
        assert!(visible.is_empty());
        let all = Review::find_by_partner_id(&db.pool, partner.id, true).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_one_pending_objection_per_review() {
        let db = DBService::new_in_memory().await.unwrap();
        let partner = insert_partner(&db.pool, "+905320000041").await;
        let request = ServiceRequest::create(&db.pool, &sample_request(), Uuid::new_v4())
            .await
            .unwrap();
        let review = Review::create(
            &db.pool,
            request.id,
            partner.id,
            &CreateReview { rating: 1, comment: Some("late".to_string()) },
        )
        .await
        .unwrap();

        let objection =
            ReviewObjection::create(&db.pool, review.id, partner.id, "customer never called")
                .await
                .unwrap();
        let err = ReviewObjection::create(&db.pool, review.id, partner.id, "again")
            .await
            .unwrap_err();
        assert!(crate::is_unique_violation(&err));

        let resolved =
            ReviewObjection::resolve(&db.pool, objection.id, ObjectionStatus::Rejected, None)
                .await
                .unwrap()
                .unwrap();
        assert_eq!(resolved.status, ObjectionStatus::Rejected);
        assert!(resolved.resolved_at.is_some());
        assert!(
            ReviewObjection::resolve(&db.pool, objection.id, ObjectionStatus::Approved, None)
                .await
                .unwrap()
                .is_none()
        );

        // A resolved objection frees the slot for a new one.
        ReviewObjection::create(&db.pool, review.id, partner.id, "new evidence")
            .await
            .unwrap();
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type, types::Json};
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
#[sqlx(type_name = "partner_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PartnerStatus {
    #[default]
    Pending,
    Active,
    Suspended,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Partner {
    pub id: Uuid,
    pub auth_user_id: Uuid,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String, // Normalized, unique
    pub city: String,
    pub district: Option<String>,
    #[ts(type = "string[]")]
    pub service_types: Json<Vec<String>>,
    pub status: PartnerStatus,
    pub credits: i64,
    pub rating: f64,
    pub rating_count: i64,
    pub showcase_description: Option<String>,
    pub showcase_logo_url: Option<String>,
    pub showcase_working_hours: Option<String>,
    pub showcase_visible: bool,
    pub iban: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreatePartner {
    pub auth_user_id: Uuid,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub city: String,
    pub district: Option<String>,
    pub service_types: Vec<String>,
}

/// Public marketing profile fields a partner edits from the dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateShowcase {
    pub showcase_description: Option<String>,
    pub showcase_logo_url: Option<String>,
    pub showcase_working_hours: Option<String>,
    pub showcase_visible: Option<bool>,
    pub iban: Option<String>,
}

const PARTNER_COLUMNS: &str = "id, auth_user_id, company_name, contact_name, email, phone, city, \
    district, service_types, status, credits, rating, rating_count, showcase_description, \
    showcase_logo_url, showcase_working_hours, showcase_visible, iban, created_at, updated_at";

impl Partner {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Partner>(&format!(
            "SELECT {PARTNER_COLUMNS} FROM partners WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_phone(
        pool: &SqlitePool,
        phone: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Partner>(&format!(
            "SELECT {PARTNER_COLUMNS} FROM partners WHERE phone = $1"
        ))
        .bind(phone)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_auth_user_id(
        pool: &SqlitePool,
        auth_user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Partner>(&format!(
            "SELECT {PARTNER_COLUMNS} FROM partners WHERE auth_user_id = $1"
        ))
        .bind(auth_user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_all(
        pool: &SqlitePool,
        status: Option<PartnerStatus>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        match status {
            Some(status) => {
                sqlx::query_as::<_, Partner>(&format!(
                    r#"SELECT {PARTNER_COLUMNS} FROM partners
                       WHERE status = $1
                       ORDER BY created_at DESC"#
                ))
                .bind(status)
                .fetch_all(pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Partner>(&format!(
                    "SELECT {PARTNER_COLUMNS} FROM partners ORDER BY created_at DESC"
                ))
                .fetch_all(pool)
                .await
            }
        }
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreatePartner,
        partner_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Partner>(&format!(
            r#"INSERT INTO partners
                   (id, auth_user_id, company_name, contact_name, email, phone, city, district,
                    service_types, status, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
               RETURNING {PARTNER_COLUMNS}"#
        ))
        .bind(partner_id)
        .bind(data.auth_user_id)
        .bind(&data.company_name)
        .bind(&data.contact_name)
        .bind(&data.email)
        .bind(&data.phone)
        .bind(&data.city)
        .bind(&data.district)
        .bind(Json(&data.service_types))
        .bind(PartnerStatus::Pending)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn update_status(
        pool: &SqlitePool,
        id: Uuid,
        status: PartnerStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Partner>(&format!(
            r#"UPDATE partners SET status = $2, updated_at = $3
               WHERE id = $1
               RETURNING {PARTNER_COLUMNS}"#
        ))
        .bind(id)
        .bind(status)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    /// Applies only the showcase fields that are present.
    pub async fn update_showcase(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateShowcase,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Partner>(&format!(
            r#"UPDATE partners SET
                   showcase_description   = COALESCE($2, showcase_description),
                   showcase_logo_url      = COALESCE($3, showcase_logo_url),
                   showcase_working_hours = COALESCE($4, showcase_working_hours),
                   showcase_visible       = COALESCE($5, showcase_visible),
                   iban                   = COALESCE($6, iban),
                   updated_at             = $7
               WHERE id = $1
               RETURNING {PARTNER_COLUMNS}"#
        ))
        .bind(id)
        .bind(&data.showcase_description)
        .bind(&data.showcase_logo_url)
        .bind(&data.showcase_working_hours)
        .bind(data.showcase_visible)
        .bind(&data.iban)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    /// Adds `delta` to the balance unless the result would go below zero.
    /// Returns `None` when the partner is missing or the balance is insufficient.
    pub async fn adjust_credits(
        pool: &SqlitePool,
        id: Uuid,
        delta: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Partner>(&format!(
            r#"UPDATE partners SET credits = credits + $2, updated_at = $3
               WHERE id = $1 AND credits + $2 >= 0
               RETURNING {PARTNER_COLUMNS}"#
        ))
        .bind(id)
        .bind(delta)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    /// Recomputes rating and rating_count from the partner's visible reviews.
    pub async fn refresh_rating<'e, E>(executor: E, id: Uuid) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"UPDATE partners SET
                   rating = COALESCE(
                       (SELECT AVG(rating) FROM reviews WHERE partner_id = $1 AND hidden = 0),
                       0
                   ),
                   rating_count =
                       (SELECT COUNT(*) FROM reviews WHERE partner_id = $1 AND hidden = 0),
                   updated_at = $2
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::DBService;

    pub(crate) async fn insert_partner(pool: &SqlitePool, phone: &str) -> Partner {
        let data = CreatePartner {
            auth_user_id: Uuid::new_v4(),
            company_name: "Kurtaran Oto".to_string(),
            contact_name: "Deniz Kaya".to_string(),
            email: format!("{}@example.com", Uuid::new_v4()),
            phone: phone.to_string(),
            city: "Istanbul".to_string(),
            district: Some("Kadikoy".to_string()),
            service_types: vec!["towing".to_string()],
        };
        Partner::create(pool, &data, Uuid::new_v4()).await.unwrap()
    }

    #[tokio::test]
    async fn test_new_partner_is_pending_with_zero_credits() {
        let db = DBService::new_in_memory().await.unwrap();
        let partner = insert_partner(&db.pool, "+905320000001").await;

        assert_eq!(partner.status, PartnerStatus::Pending);
        assert_eq!(partner.credits, 0);
        assert_eq!(partner.service_types.0, vec!["towing".to_string()]);

        let found = Partner::find_by_phone(&db.pool, "+905320000001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, partner.id);
    }

    #[tokio::test]
    async fn test_duplicate_phone_is_unique_violation() {
        let db = DBService::new_in_memory().await.unwrap();
        insert_partner(&db.pool, "+905320000002").await;

        let data = CreatePartner {
            auth_user_id: Uuid::new_v4(),
            company_name: "Other".to_string(),
            contact_name: "Other".to_string(),
            email: "other@example.com".to_string(),
            phone: "+905320000002".to_string(),
            city: "Ankara".to_string(),
            district: None,
            service_types: vec![],
        };
        let err = Partner::create(&db.pool, &data, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(crate::is_unique_violation_on(&err, "partners.phone"));
    }

    #[tokio::test]
    async fn test_credits_never_go_negative() {
        let db = DBService::new_in_memory().await.unwrap();
        let partner = insert_partner(&db.pool, "+905320000003").await;

        let topped_up = Partner::adjust_credits(&db.pool, partner.id, 5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(topped_up.credits, 5);

        let overdrawn = Partner::adjust_credits(&db.pool, partner.id, -6).await.unwrap();
        assert!(overdrawn.is_none());

        let after = Partner::find_by_id(&db.pool, partner.id).await.unwrap().unwrap();
        assert_eq!(after.credits, 5);
    }

    #[tokio::test]
    async fn test_showcase_update_keeps_missing_fields() {
        let db = DBService::new_in_memory().await.unwrap();
        let partner = insert_partner(&db.pool, "+905320000004").await;

        Partner::update_showcase(
            &db.pool,
            partner.id,
            &UpdateShowcase {
                showcase_description: Some("24/7 towing".to_string()),
                showcase_visible: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let updated = Partner::update_showcase(
            &db.pool,
            partner.id,
            &UpdateShowcase {
                showcase_working_hours: Some("00:00-24:00".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(updated.showcase_description.as_deref(), Some("24/7 towing"));
        assert_eq!(updated.showcase_working_hours.as_deref(), Some("00:00-24:00"));
        assert!(updated.showcase_visible);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct AdminUser {
    pub id: Uuid,
    pub auth_user_id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AdminUser {
    pub async fn find_by_auth_user_id(
        pool: &SqlitePool,
        auth_user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AdminUser>(
            r#"SELECT id, auth_user_id, email, full_name, created_at
               FROM admin_users
               WHERE auth_user_id = $1"#,
        )
        .bind(auth_user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM admin_users")
            .fetch_one(pool)
            .await
    }

    pub async fn create(
        pool: &SqlitePool,
        auth_user_id: Uuid,
        email: &str,
        full_name: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AdminUser>(
            r#"INSERT INTO admin_users (id, auth_user_id, email, full_name, created_at)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, auth_user_id, email, full_name, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(auth_user_id)
        .bind(email)
        .bind(full_name)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    /// Inserts only while the table is empty; `None` means another admin won.
    pub async fn create_first(
        pool: &SqlitePool,
        auth_user_id: Uuid,
        email: &str,
        full_name: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AdminUser>(
            r#"INSERT INTO admin_users (id, auth_user_id, email, full_name, created_at)
               SELECT $1, $2, $3, $4, $5
               WHERE NOT EXISTS (SELECT 1 FROM admin_users)
               RETURNING id, auth_user_id, email, full_name, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(auth_user_id)
        .bind(email)
        .bind(full_name)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }
}

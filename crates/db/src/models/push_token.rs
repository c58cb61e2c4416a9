use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// FCM registration token for one device of one user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct PushToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub platform: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PushToken {
    pub async fn find_by_user_id(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PushToken>(
            r#"SELECT id, user_id, token, platform, created_at, updated_at
               FROM push_tokens
               WHERE user_id = $1
               ORDER BY updated_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// A token moves to the latest user that registers it.
    pub async fn upsert(
        pool: &SqlitePool,
        user_id: Uuid,
        token: &str,
        platform: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PushToken>(
            r#"INSERT INTO push_tokens (id, user_id, token, platform, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $5)
               ON CONFLICT(token) DO UPDATE SET
                   user_id = excluded.user_id,
                   platform = excluded.platform,
                   updated_at = excluded.updated_at
               RETURNING id, user_id, token, platform, created_at, updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token)
        .bind(platform)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn delete_by_token(pool: &SqlitePool, token: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM push_tokens WHERE token = $1")
            .bind(token)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;

    #[tokio::test]
    async fn test_upsert_moves_token_between_users() {
        let db = DBService::new_in_memory().await.unwrap();
        let first_user = Uuid::new_v4();
        let second_user = Uuid::new_v4();

        PushToken::upsert(&db.pool, first_user, "fcm-token-1", "web").await.unwrap();
        PushToken::upsert(&db.pool, second_user, "fcm-token-1", "android").await.unwrap();

        assert!(PushToken::find_by_user_id(&db.pool, first_user).await.unwrap().is_empty());
        let tokens = PushToken::find_by_user_id(&db.pool, second_user).await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].platform, "android");
    }
}

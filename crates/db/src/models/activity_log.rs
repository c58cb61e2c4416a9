use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display,
)]
#[sqlx(type_name = "traffic_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrafficSource {
    Direct,
    OrganicSearch,
    Social,
    Referral,
    Paid,
    Email,
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display,
)]
#[sqlx(type_name = "device_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
}

/// One page view with its derived attribution fields.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ActivityLog {
    pub id: Uuid,
    pub session_id: String,
    pub user_id: Option<Uuid>,
    pub page_path: String,
    pub page_title: Option<String>,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub traffic_source: TrafficSource,
    pub device_type: DeviceType,
    pub duration_seconds: i64,
    pub scroll_depth: i64,
    pub is_landing: bool,
    pub is_bounce: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateActivityLog {
    pub session_id: String,
    pub user_id: Option<Uuid>,
    pub page_path: String,
    pub page_title: Option<String>,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub traffic_source: TrafficSource,
    pub device_type: DeviceType,
    pub duration_seconds: i64,
    pub scroll_depth: i64,
    pub is_landing: bool,
    pub is_bounce: bool,
}

const ACTIVITY_COLUMNS: &str = "id, session_id, user_id, page_path, page_title, referrer, \
    utm_source, utm_medium, utm_campaign, traffic_source, device_type, duration_seconds, \
    scroll_depth, is_landing, is_bounce, created_at";

impl ActivityLog {
    pub async fn create<'e, E>(executor: E, data: &CreateActivityLog) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, ActivityLog>(&format!(
            r#"INSERT INTO activity_logs
                   (id, session_id, user_id, page_path, page_title, referrer, utm_source,
                    utm_medium, utm_campaign, traffic_source, device_type, duration_seconds,
                    scroll_depth, is_landing, is_bounce, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
               RETURNING {ACTIVITY_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(&data.session_id)
        .bind(data.user_id)
        .bind(&data.page_path)
        .bind(&data.page_title)
        .bind(&data.referrer)
        .bind(&data.utm_source)
        .bind(&data.utm_medium)
        .bind(&data.utm_campaign)
        .bind(data.traffic_source)
        .bind(data.device_type)
        .bind(data.duration_seconds)
        .bind(data.scroll_depth)
        .bind(data.is_landing)
        .bind(data.is_bounce)
        .bind(Utc::now())
        .fetch_one(executor)
        .await
    }

    pub async fn session_has_events<'e, E>(
        executor: E,
        session_id: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM activity_logs WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_one(executor)
        .await?;
        Ok(count > 0)
    }

    /// A second page view means the session did not bounce.
    pub async fn clear_session_bounce<'e, E>(
        executor: E,
        session_id: &str,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE activity_logs SET is_bounce = 0 WHERE session_id = $1 AND is_bounce = 1",
        )
        .bind(session_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Rows created at or after `since`, oldest first.
    pub async fn find_since(
        pool: &SqlitePool,
        since: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ActivityLog>(&format!(
            r#"SELECT {ACTIVITY_COLUMNS} FROM activity_logs
               WHERE created_at >= $1
               ORDER BY created_at ASC"#
        ))
        .bind(since)
        .fetch_all(pool)
        .await
    }
}

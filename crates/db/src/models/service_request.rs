use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Highest `job_stage` value; reaching it means the vehicle was delivered.
pub const FINAL_JOB_STAGE: i64 = 4;

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
#[sqlx(type_name = "request_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Open,
    Matched,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub service_type: String,
    pub from_location: String,
    pub to_location: Option<String>,
    pub vehicle_info: Option<String>,
    pub description: Option<String>,
    pub status: RequestStatus,
    pub job_stage: i64, // 0 assigned, 1 on the way, 2 on site, 3 in transit, 4 delivered
    pub assigned_partner_id: Option<Uuid>,
    pub start_proof_photo_url: Option<String>,
    pub end_proof_photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateServiceRequest {
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub service_type: String,
    pub from_location: String,
    pub to_location: Option<String>,
    pub vehicle_info: Option<String>,
    pub description: Option<String>,
}

const REQUEST_COLUMNS: &str = "id, customer_name, customer_phone, customer_email, service_type, \
    from_location, to_location, vehicle_info, description, status, job_stage, \
    assigned_partner_id, start_proof_photo_url, end_proof_photo_url, created_at, updated_at";

impl ServiceRequest {
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, ServiceRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM service_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_all(
        pool: &SqlitePool,
        status: Option<RequestStatus>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        match status {
            Some(status) => {
                sqlx::query_as::<_, ServiceRequest>(&format!(
                    r#"SELECT {REQUEST_COLUMNS} FROM service_requests
                       WHERE status = $1
                       ORDER BY created_at DESC"#
                ))
                .bind(status)
                .fetch_all(pool)
                .await
            }
            None => {
                sqlx::query_as::<_, ServiceRequest>(&format!(
                    "SELECT {REQUEST_COLUMNS} FROM service_requests ORDER BY created_at DESC"
                ))
                .fetch_all(pool)
                .await
            }
        }
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateServiceRequest,
        request_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ServiceRequest>(&format!(
            r#"INSERT INTO service_requests
                   (id, customer_name, customer_phone, customer_email, service_type,
                    from_location, to_location, vehicle_info, description, status, job_stage,
                    created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, $11, $11)
               RETURNING {REQUEST_COLUMNS}"#
        ))
        .bind(request_id)
        .bind(&data.customer_name)
        .bind(&data.customer_phone)
        .bind(&data.customer_email)
        .bind(&data.service_type)
        .bind(&data.from_location)
        .bind(&data.to_location)
        .bind(&data.vehicle_info)
        .bind(&data.description)
        .bind(RequestStatus::Open)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    /// `open -> matched`. Returns rows affected; 0 means the request was no longer open.
    pub async fn mark_matched<'e, E>(
        executor: E,
        id: Uuid,
        partner_id: Uuid,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"UPDATE service_requests
               SET status = 'matched', assigned_partner_id = $2, job_stage = 0, updated_at = $3
               WHERE id = $1 AND status = 'open'"#,
        )
        .bind(id)
        .bind(partner_id)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// `open | matched -> cancelled`. Returns rows affected.
    pub async fn mark_cancelled<'e, E>(executor: E, id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"UPDATE service_requests
               SET status = 'cancelled', updated_at = $2
               WHERE id = $1 AND status IN ('open', 'matched')"#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Moves a matched job forward. The stage must strictly increase and the
    /// caller must be the assigned partner; otherwise nothing changes and `None`
    /// is returned. Photo URLs that are `None` keep their previous value.
    pub async fn advance_job_stage(
        pool: &SqlitePool,
        id: Uuid,
        partner_id: Uuid,
        job_stage: i64,
        start_proof_photo_url: Option<&str>,
        end_proof_photo_url: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ServiceRequest>(&format!(
            r#"UPDATE service_requests SET
                   job_stage = $3,
                   start_proof_photo_url = COALESCE($4, start_proof_photo_url),
                   end_proof_photo_url = COALESCE($5, end_proof_photo_url),
                   updated_at = $6
               WHERE id = $1
                 AND assigned_partner_id = $2
                 AND status = 'matched'
                 AND job_stage < $3
               RETURNING {REQUEST_COLUMNS}"#
        ))
        .bind(id)
        .bind(partner_id)
        .bind(job_stage)
        .bind(start_proof_photo_url)
        .bind(end_proof_photo_url)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    /// `matched -> completed`, only once the delivery photo exists.
    pub async fn mark_completed(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ServiceRequest>(&format!(
            r#"UPDATE service_requests SET status = 'completed', updated_at = $2
               WHERE id = $1 AND status = 'matched' AND end_proof_photo_url IS NOT NULL
               RETURNING {REQUEST_COLUMNS}"#
        ))
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }
}

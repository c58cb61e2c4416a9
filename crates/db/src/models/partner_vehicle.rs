use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Fleet entry shown on the partner dashboard.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct PartnerVehicle {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub plate: String,
    pub model: Option<String>,
    pub vehicle_type: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreatePartnerVehicle {
    pub plate: String,
    pub model: Option<String>,
    pub vehicle_type: String,
}

impl PartnerVehicle {
    pub async fn find_by_partner_id(
        pool: &SqlitePool,
        partner_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PartnerVehicle>(
            r#"SELECT id, partner_id, plate, model, vehicle_type, is_active, created_at
               FROM partner_vehicles
               WHERE partner_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(partner_id)
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        partner_id: Uuid,
        data: &CreatePartnerVehicle,
    ) -> Result<Self, sqlx::Error> {
        // Plates are stored upper-case without spaces so "34 abc 12" and "34ABC12" collide.
        let plate: String = data
            .plate
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();

        sqlx::query_as::<_, PartnerVehicle>(
            r#"INSERT INTO partner_vehicles
                   (id, partner_id, plate, model, vehicle_type, is_active, created_at)
               VALUES ($1, $2, $3, $4, $5, 1, $6)
               RETURNING id, partner_id, plate, model, vehicle_type, is_active, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(partner_id)
        .bind(plate)
        .bind(&data.model)
        .bind(&data.vehicle_type)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, partner_id: Uuid, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM partner_vehicles WHERE id = $1 AND partner_id = $2")
            .bind(id)
            .bind(partner_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

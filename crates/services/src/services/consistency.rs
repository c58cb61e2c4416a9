//! Cross-table consistency checks for the request/offer/review data, plus a
//! background monitor that runs them periodically.

use std::time::Duration;

use chrono::{DateTime, Utc};
use db::DBService;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ConsistencyError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Ids of the rows that break each rule. Empty vectors mean the rule holds.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ConsistencyReport {
    pub checked_at: DateTime<Utc>,
    pub migrations_applied: i64,
    /// Requests with more than one accepted offer.
    pub multiple_accepted_offers: Vec<Uuid>,
    /// Matched or completed requests without an accepted offer.
    pub matched_without_accepted_offer: Vec<Uuid>,
    /// Requests whose assigned partner is not the accepted offer's partner.
    pub assigned_partner_mismatch: Vec<Uuid>,
    /// Open requests that already have an accepted offer.
    pub open_with_accepted_offer: Vec<Uuid>,
    /// Reviews whose request is not completed.
    pub reviews_on_unfinished_requests: Vec<Uuid>,
}

impl ConsistencyReport {
    pub fn issue_count(&self) -> usize {
        self.multiple_accepted_offers.len()
            + self.matched_without_accepted_offer.len()
            + self.assigned_partner_mismatch.len()
            + self.open_with_accepted_offer.len()
            + self.reviews_on_unfinished_requests.len()
    }

    pub fn is_consistent(&self) -> bool {
        self.issue_count() == 0
    }
}

pub struct ConsistencyChecker {
    pool: SqlitePool,
}

impl ConsistencyChecker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run(&self) -> Result<ConsistencyReport, ConsistencyError> {
        let migrations_applied = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1",
        )
        .fetch_one(&self.pool)
        .await?;

        let report = ConsistencyReport {
            checked_at: Utc::now(),
            migrations_applied,
            multiple_accepted_offers: self
                .ids(
                    r#"SELECT request_id FROM offers
                       WHERE status = 'accepted'
                       GROUP BY request_id
                       HAVING COUNT(*) > 1"#,
                )
                .await?,
            matched_without_accepted_offer: self
                .ids(
                    r#"SELECT r.id FROM service_requests r
                       WHERE r.status IN ('matched', 'completed')
                         AND NOT EXISTS (
                             SELECT 1 FROM offers o
                             WHERE o.request_id = r.id AND o.status = 'accepted'
                         )"#,
                )
                .await?,
            assigned_partner_mismatch: self
                .ids(
                    r#"SELECT DISTINCT r.id FROM service_requests r
                       JOIN offers o ON o.request_id = r.id AND o.status = 'accepted'
                       WHERE r.assigned_partner_id IS NULL
                          OR r.assigned_partner_id != o.partner_id"#,
                )
                .await?,
            open_with_accepted_offer: self
                .ids(
                    r#"SELECT DISTINCT r.id FROM service_requests r
                       JOIN offers o ON o.request_id = r.id AND o.status = 'accepted'
                       WHERE r.status = 'open'"#,
                )
                .await?,
            reviews_on_unfinished_requests: self
                .ids(
                    r#"SELECT rv.id FROM reviews rv
                       JOIN service_requests r ON r.id = rv.request_id
                       WHERE r.status != 'completed'"#,
                )
                .await?,
        };

        info!(
            issues = report.issue_count(),
            migrations_applied, "Consistency check complete"
        );
        Ok(report)
    }

    async fn ids(&self, query: &str) -> Result<Vec<Uuid>, ConsistencyError> {
        Ok(sqlx::query_scalar::<_, Uuid>(query)
            .fetch_all(&self.pool)
            .await?)
    }
}

/// Background service that logs consistency findings on an interval.
pub struct ConsistencyMonitor {
    checker: ConsistencyChecker,
    poll_interval: Duration,
}

impl ConsistencyMonitor {
    pub async fn spawn(db: DBService, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
        let service = Self {
            checker: ConsistencyChecker::new(db.pool),
            poll_interval,
        };
        tokio::spawn(async move {
            service.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting consistency monitor with interval {:?}",
            self.poll_interval
        );

        let mut interval = interval(self.poll_interval);
        loop {
            interval.tick().await;
            match self.checker.run().await {
                Ok(report) if report.is_consistent() => {
                    debug!("Consistency monitor: no issues");
                }
                Ok(report) => {
                    warn!(
                        issues = report.issue_count(),
                        multiple_accepted_offers = ?report.multiple_accepted_offers,
                        matched_without_accepted_offer = ?report.matched_without_accepted_offer,
                        assigned_partner_mismatch = ?report.assigned_partner_mismatch,
                        open_with_accepted_offer = ?report.open_with_accepted_offer,
                        reviews_on_unfinished_requests = ?report.reviews_on_unfinished_requests,
                        "Consistency monitor found issues"
                    );
                }
                Err(e) => error!("Error running consistency check: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use db::models::{
        offer::{CreateOffer, Offer, OfferStatus},
        review::{CreateReview, Review},
        service_request::ServiceRequest,
    };

    use super::*;
    use crate::services::marketplace::{
        MarketplaceService,
        tests::{active_partner, open_request},
    };

    #[tokio::test]
    async fn test_clean_lifecycle_is_consistent() {
        let db = DBService::new_in_memory().await.unwrap();
        let partner = active_partner(&db.pool, "+905320000301").await;
        let request = open_request(&db.pool).await;
        let offer = MarketplaceService::submit_offer(
            &db.pool,
            request.id,
            &CreateOffer {
                partner_id: partner.id,
                price: 100,
                eta_minutes: 10,
                message: None,
            },
        )
        .await
        .unwrap();
        MarketplaceService::accept_offer(&db.pool, offer.id).await.unwrap();

        let report = ConsistencyChecker::new(db.pool.clone()).run().await.unwrap();
        assert!(report.is_consistent(), "{report:?}");
        assert!(report.migrations_applied >= 1);
    }

    #[tokio::test]
    async fn test_detects_half_applied_writes() {
        let db = DBService::new_in_memory().await.unwrap();
        let partner = active_partner(&db.pool, "+905320000302").await;

        // Matched without going through an offer.
        let orphan_match = open_request(&db.pool).await;
        ServiceRequest::mark_matched(&db.pool, orphan_match.id, partner.id)
            .await
            .unwrap();

        // Offer accepted while its request stayed open.
        let half_accepted = open_request(&db.pool).await;
        let offer = Offer::create(
            &db.pool,
            half_accepted.id,
            &CreateOffer {
                partner_id: partner.id,
                price: 100,
                eta_minutes: 10,
                message: None,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        Offer::transition_from_sent(&db.pool, offer.id, OfferStatus::Accepted)
            .await
            .unwrap();

        // Review left on a job that never finished.
        let review = Review::create(
            &db.pool,
            orphan_match.id,
            partner.id,
            &CreateReview {
                rating: 5,
                comment: None,
            },
        )
        .await
        .unwrap();

        let report = ConsistencyChecker::new(db.pool.clone()).run().await.unwrap();
        assert_eq!(report.matched_without_accepted_offer, vec![orphan_match.id]);
        assert_eq!(report.open_with_accepted_offer, vec![half_accepted.id]);
        assert_eq!(report.assigned_partner_mismatch, vec![half_accepted.id]);
        assert_eq!(report.reviews_on_unfinished_requests, vec![review.id]);
        assert!(report.multiple_accepted_offers.is_empty());
        assert_eq!(report.issue_count(), 4);
    }
}

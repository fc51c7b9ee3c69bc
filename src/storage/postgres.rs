use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::catalog::aggregates::{RatingSummary, ServiceAggregateStore};
use crate::domain::catalog::{ListingStatus, PackageSnapshot, ServiceCatalog, ServiceSnapshot};
use crate::domain::order::{ActorRole, Order, OrderStatus};
use crate::domain::review::Review;
use crate::ledger::{LedgerStore, StatusHistoryEntry};

use super::{
    FavoriteStore, InsertOrderError, InsertReviewError, OrderPatch, OrderStore, ReviewStore,
    StoreError, TransitionStoreError,
};

// ============================================================================
// Postgres Store
// ============================================================================
//
// Production implementation of every storage seam.
//
// Two patterns carry the concurrency contract:
// - Status transitions are conditional UPDATEs (`... WHERE id = $x AND
//   status = $expected`), so the guard-then-write sequence is one atomic
//   statement and racing transitions resolve to a single winner.
// - Aggregate columns are adjusted with expressions evaluated by the
//   database (`favorite_count + 1`, `GREATEST(favorite_count - 1, 0)`,
//   UPDATE-from-subquery for the rating), never computed in request code.
//
// ============================================================================

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, StoreError> {
    OrderStatus::from_str(raw).map_err(StoreError::Corrupt)
}

fn parse_url_list(raw: &str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(raw)
        .map_err(|err| StoreError::Corrupt(format!("bad attachment list: {}", err)))
}

fn encode_url_list(urls: &[String]) -> String {
    serde_json::to_string(urls).unwrap_or_else(|_| "[]".to_string())
}

fn parse_order_row(row: &PgRow) -> Result<Order, StoreError> {
    let status_raw: String = row.try_get("status")?;
    let client_attachments_raw: String = row.try_get("client_attachments")?;
    let freelancer_attachments_raw: String = row.try_get("freelancer_attachments")?;

    Ok(Order {
        id: row.try_get("id")?,
        order_number: row.try_get("order_number")?,
        client_id: row.try_get("client_id")?,
        freelancer_id: row.try_get("freelancer_id")?,
        service_id: row.try_get("service_id")?,
        package_id: row.try_get("package_id")?,
        price: row.try_get("price")?,
        platform_fee: row.try_get("platform_fee")?,
        total_due: row.try_get("total_due")?,
        work_duration_days: row.try_get("work_duration_days")?,
        deadline: row.try_get("deadline")?,
        sent_at: row.try_get("sent_at")?,
        completed_at: row.try_get("completed_at")?,
        client_notes: row.try_get("client_notes")?,
        client_attachments: parse_url_list(&client_attachments_raw)?,
        freelancer_attachments: parse_url_list(&freelancer_attachments_raw)?,
        freelancer_note: row.try_get("freelancer_note")?,
        status: parse_status(&status_raw)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const ORDER_COLUMNS: &str = "id, order_number, client_id, freelancer_id, service_id, package_id, \
     price, platform_fee, total_due, work_duration_days, deadline, sent_at, completed_at, \
     client_notes, client_attachments, freelancer_attachments, freelancer_note, status, \
     created_at, updated_at";

#[async_trait]
impl OrderStore for PgStore {
    async fn insert(&self, order: &Order) -> Result<(), InsertOrderError> {
        let result = sqlx::query(
            "INSERT INTO orders (
                id, order_number, client_id, freelancer_id, service_id, package_id,
                price, platform_fee, total_due, work_duration_days, deadline,
                sent_at, completed_at, client_notes, client_attachments,
                freelancer_attachments, freelancer_note, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                      $12, $13, $14, $15, $16, $17, $18, $19, $20)",
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.client_id)
        .bind(order.freelancer_id)
        .bind(order.service_id)
        .bind(order.package_id)
        .bind(order.price)
        .bind(order.platform_fee)
        .bind(order.total_due)
        .bind(order.work_duration_days)
        .bind(order.deadline)
        .bind(order.sent_at)
        .bind(order.completed_at)
        .bind(&order.client_notes)
        .bind(encode_url_list(&order.client_attachments))
        .bind(encode_url_list(&order.freelancer_attachments))
        .bind(&order.freelancer_note)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                InsertOrderError::DuplicateOrderNumber(order.order_number.clone()),
            ),
            Err(err) => Err(InsertOrderError::Store(err.into())),
        }
    }

    async fn get(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(parse_order_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn transition(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        patch: OrderPatch,
    ) -> Result<Order, TransitionStoreError> {
        // Guard and write in a single conditional UPDATE; zero rows means
        // the order is gone or someone else won the race.
        let attachments_json = patch.freelancer_attachments.as_deref().map(encode_url_list);

        let row = sqlx::query(&format!(
            "UPDATE orders SET
                status = $1,
                sent_at = COALESCE($2, sent_at),
                completed_at = COALESCE($3, completed_at),
                freelancer_attachments = COALESCE($4, freelancer_attachments),
                freelancer_note = COALESCE($5, freelancer_note),
                updated_at = NOW()
             WHERE id = $6 AND status = $7
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(patch.status.as_str())
        .bind(patch.sent_at)
        .bind(patch.completed_at)
        .bind(attachments_json)
        .bind(patch.freelancer_note)
        .bind(order_id)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        if let Some(row) = row {
            return Ok(parse_order_row(&row)?);
        }

        // Distinguish a vanished order from a lost race.
        let current: Option<String> = sqlx::query("SELECT status FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?
            .map(|row| row.try_get("status"))
            .transpose()
            .map_err(StoreError::from)?;

        match current {
            Some(raw) => Err(TransitionStoreError::StatusConflict {
                current: parse_status(&raw)?,
            }),
            None => Err(TransitionStoreError::NotFound),
        }
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn append(&self, entry: StatusHistoryEntry) -> Result<(), StoreError> {
        let metadata_json = serde_json::to_string(&entry.metadata)
            .map_err(|err| StoreError::Corrupt(format!("bad ledger metadata: {}", err)))?;

        sqlx::query(
            "INSERT INTO order_status_history (
                id, order_id, from_status, to_status, changed_by, changed_by_role,
                reason, metadata, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entry.id)
        .bind(entry.order_id)
        .bind(entry.from_status.map(|s| s.as_str()))
        .bind(entry.to_status.as_str())
        .bind(entry.changed_by)
        .bind(entry.changed_by_role.as_str())
        .bind(&entry.reason)
        .bind(metadata_json)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for(&self, order_id: Uuid) -> Result<Vec<StatusHistoryEntry>, StoreError> {
        // `seq` is the insertion sequence; created_at ties resolve by it.
        let rows = sqlx::query(
            "SELECT id, order_id, from_status, to_status, changed_by, changed_by_role,
                    reason, metadata, created_at
             FROM order_status_history
             WHERE order_id = $1
             ORDER BY created_at ASC, seq ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let from_raw: Option<String> = row.try_get("from_status")?;
            let to_raw: String = row.try_get("to_status")?;
            let role_raw: String = row.try_get("changed_by_role")?;
            let metadata_raw: String = row.try_get("metadata")?;

            let metadata: HashMap<String, String> = serde_json::from_str(&metadata_raw)
                .map_err(|err| StoreError::Corrupt(format!("bad ledger metadata: {}", err)))?;

            entries.push(StatusHistoryEntry {
                id: row.try_get("id")?,
                order_id: row.try_get("order_id")?,
                from_status: from_raw.as_deref().map(parse_status).transpose()?,
                to_status: parse_status(&to_raw)?,
                changed_by: row.try_get("changed_by")?,
                changed_by_role: ActorRole::from_str(&role_raw).map_err(StoreError::Corrupt)?,
                reason: row.try_get("reason")?,
                metadata,
                created_at: row.try_get("created_at")?,
            });
        }

        Ok(entries)
    }
}

#[async_trait]
impl ServiceCatalog for PgStore {
    async fn snapshot(&self, service_id: Uuid) -> Result<Option<ServiceSnapshot>, StoreError> {
        let row = sqlx::query(
            "SELECT id, freelancer_id, title, price, work_duration_days, status
             FROM services WHERE id = $1",
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status_raw: String = row.try_get("status")?;
        let mut snapshot = ServiceSnapshot {
            id: row.try_get("id")?,
            freelancer_id: row.try_get("freelancer_id")?,
            title: row.try_get("title")?,
            price: row.try_get("price")?,
            work_duration_days: row.try_get("work_duration_days")?,
            status: ListingStatus::from_str(&status_raw).map_err(StoreError::Corrupt)?,
            packages: Vec::new(),
        };

        let package_rows = sqlx::query(
            "SELECT id, service_id, title, price, work_duration_days
             FROM service_packages WHERE service_id = $1",
        )
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?;

        for row in package_rows {
            snapshot.packages.push(PackageSnapshot {
                id: row.try_get("id")?,
                service_id: row.try_get("service_id")?,
                title: row.try_get("title")?,
                price: row.try_get("price")?,
                work_duration_days: row.try_get("work_duration_days")?,
            });
        }

        Ok(Some(snapshot))
    }
}

#[async_trait]
impl ServiceAggregateStore for PgStore {
    async fn refresh_rating(&self, service_id: Uuid) -> Result<RatingSummary, StoreError> {
        // Average and count land in one UPDATE, so readers never see one
        // fresh and the other stale.
        let row = sqlx::query(
            "UPDATE services SET
                rating_average = sub.avg_rating,
                rating_count = sub.review_count
             FROM (
                SELECT COALESCE(AVG(rating)::DOUBLE PRECISION, 0) AS avg_rating,
                       COUNT(*) AS review_count
                FROM reviews WHERE service_id = $1
             ) AS sub
             WHERE id = $1
             RETURNING rating_average, rating_count",
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            StoreError::Backend(format!("service {} not found for aggregate update", service_id))
        })?;

        Ok(RatingSummary {
            average: row.try_get("rating_average")?,
            count: row.try_get("rating_count")?,
        })
    }

    async fn increment_favorites(&self, service_id: Uuid) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "UPDATE services SET favorite_count = favorite_count + 1
             WHERE id = $1
             RETURNING favorite_count",
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            StoreError::Backend(format!("service {} not found for aggregate update", service_id))
        })?;

        Ok(row.try_get("favorite_count")?)
    }

    async fn decrement_favorites(&self, service_id: Uuid) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "UPDATE services SET favorite_count = GREATEST(favorite_count - 1, 0)
             WHERE id = $1
             RETURNING favorite_count",
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            StoreError::Backend(format!("service {} not found for aggregate update", service_id))
        })?;

        Ok(row.try_get("favorite_count")?)
    }

    async fn increment_completed_orders(&self, service_id: Uuid) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "UPDATE services SET completed_order_count = completed_order_count + 1
             WHERE id = $1
             RETURNING completed_order_count",
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            StoreError::Backend(format!("service {} not found for aggregate update", service_id))
        })?;

        Ok(row.try_get("completed_order_count")?)
    }
}

#[async_trait]
impl ReviewStore for PgStore {
    async fn insert(&self, review: &Review) -> Result<(), InsertReviewError> {
        let result = sqlx::query(
            "INSERT INTO reviews (id, order_id, service_id, reviewer_id, rating, comment, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(review.id)
        .bind(review.order_id)
        .bind(review.service_id)
        .bind(review.reviewer_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(InsertReviewError::DuplicateOrder)
            }
            Err(err) => Err(InsertReviewError::Store(err.into())),
        }
    }

    async fn get(&self, review_id: Uuid) -> Result<Option<Review>, StoreError> {
        let row = sqlx::query(
            "SELECT id, order_id, service_id, reviewer_id, rating, comment, created_at
             FROM reviews WHERE id = $1",
        )
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Review {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            service_id: row.try_get("service_id")?,
            reviewer_id: row.try_get("reviewer_id")?,
            rating: row.try_get("rating")?,
            comment: row.try_get("comment")?,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn delete(&self, review_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(review_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl FavoriteStore for PgStore {
    async fn insert(&self, user_id: Uuid, service_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO favorites (user_id, service_id, created_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (user_id, service_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(service_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, user_id: Uuid, service_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM favorites WHERE user_id = $1 AND service_id = $2",
        )
        .bind(user_id)
        .bind(service_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Integration Test Notes
// ============================================================================
//
// Everything above needs a live Postgres to exercise:
// - conditional-UPDATE transitions under racing writers
// - unique-violation mapping for order numbers and one-review-per-order
// - the UPDATE-from-subquery rating refresh
// - GREATEST clamping on the favorite counter
//
// The in-memory store mirrors these semantics for unit tests; run the
// Postgres paths against a disposable database (e.g. testcontainers).
//
// ============================================================================

// ============================================================================
// Storage Seams
// ============================================================================
//
// Traits for every persistent collection the core touches, with two
// implementations: Postgres (`postgres`) for production and an in-memory
// store (`memory`) that mirrors the same semantics for unit tests.
//
// The one rule every implementation must honor: a status transition is a
// compare-and-swap. The read-validate-write sequence on `status` executes as
// one atomic unit relative to other transition attempts on the same order.
//
// ============================================================================

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::order::{Order, OrderStatus};

/// Unexpected storage failures. These propagate to the caller untranslated
/// (500-equivalent); they are not part of the domain error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Failure modes of inserting a freshly-created order.
#[derive(Debug, thiserror::Error)]
pub enum InsertOrderError {
    /// The generated order number is already taken; the factory regenerates
    /// and retries.
    #[error("order number already taken: {0}")]
    DuplicateOrderNumber(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure modes of the conditional status update.
#[derive(Debug, thiserror::Error)]
pub enum TransitionStoreError {
    #[error("order not found")]
    NotFound,

    /// The order was not in the expected status at write time; `current` is
    /// what it actually was.
    #[error("order status is {current}, not the expected status")]
    StatusConflict { current: OrderStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Field updates applied together with a successful status change. Only the
/// fields a transition owns are set; financial columns are never touched.
#[derive(Debug, Clone)]
pub struct OrderPatch {
    pub status: OrderStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub freelancer_attachments: Option<Vec<String>>,
    pub freelancer_note: Option<String>,
}

impl OrderPatch {
    /// A patch that only moves the status.
    pub fn to(status: OrderStatus) -> Self {
        Self {
            status,
            sent_at: None,
            completed_at: None,
            freelancer_attachments: None,
            freelancer_note: None,
        }
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), InsertOrderError>;

    async fn get(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Compare-and-swap: apply `patch` only if the order's status still
    /// equals `expected`. Returns the updated order on success.
    async fn transition(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        patch: OrderPatch,
    ) -> Result<Order, TransitionStoreError>;
}

/// Failure modes of inserting a review.
#[derive(Debug, thiserror::Error)]
pub enum InsertReviewError {
    /// The order already has a review.
    #[error("order has already been reviewed")]
    DuplicateOrder,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn insert(&self, review: &crate::domain::review::Review) -> Result<(), InsertReviewError>;

    async fn get(&self, review_id: Uuid)
        -> Result<Option<crate::domain::review::Review>, StoreError>;

    /// Returns true when a row was actually removed.
    async fn delete(&self, review_id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait FavoriteStore: Send + Sync {
    /// Insert the (user, service) pair if absent. Returns true when a fresh
    /// row was created, false when the pair already existed.
    async fn insert(&self, user_id: Uuid, service_id: Uuid) -> Result<bool, StoreError>;

    /// Remove the pair when present. Returns true when a row was removed.
    async fn remove(&self, user_id: Uuid, service_id: Uuid) -> Result<bool, StoreError>;
}

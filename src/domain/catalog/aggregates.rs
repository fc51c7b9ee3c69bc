use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::StoreError;

// ============================================================================
// Derived Aggregate Maintenance
// ============================================================================
//
// Summary columns on the service row are computed from other entities:
// rating average/count from reviews, favorite count from favorites, and the
// completed-order count from the order lifecycle. These columns are mutated
// concurrently by unrelated request flows, so every operation here is a
// single atomic expression evaluated by the storage layer. Reading a value,
// adjusting it in request code and writing it back loses updates under
// concurrency and is not an acceptable implementation of this trait.
//
// A failed aggregate update never rolls back the primary operation that
// triggered it; call sites log the failure and move on.
//
// ============================================================================

/// Current derived aggregate values for a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceAggregates {
    pub rating_average: f64,
    pub rating_count: i64,
    pub favorite_count: i64,
    pub completed_order_count: i64,
}

/// Result of a rating recompute. Average and count are refreshed together in
/// one atomic write; a reader never sees one fresh and the other stale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    pub average: f64,
    pub count: i64,
}

#[async_trait]
pub trait ServiceAggregateStore: Send + Sync {
    /// Recompute `rating_average` and `rating_count` from all reviews of the
    /// service and persist both atomically relative to each other.
    async fn refresh_rating(&self, service_id: Uuid) -> Result<RatingSummary, StoreError>;

    /// Atomically increment `favorite_count`. Returns the new value.
    async fn increment_favorites(&self, service_id: Uuid) -> Result<i64, StoreError>;

    /// Atomically decrement `favorite_count`, clamped at zero. Returns the
    /// new value.
    async fn decrement_favorites(&self, service_id: Uuid) -> Result<i64, StoreError>;

    /// Atomically increment `completed_order_count`. Returns the new value.
    async fn increment_completed_orders(&self, service_id: Uuid) -> Result<i64, StoreError>;
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::catalog::aggregates::{RatingSummary, ServiceAggregateStore, ServiceAggregates};
use crate::domain::catalog::{ServiceCatalog, ServiceSnapshot};
use crate::domain::favorite::Favorite;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::review::Review;
use crate::ledger::{LedgerStore, StatusHistoryEntry};

use super::{
    FavoriteStore, InsertOrderError, InsertReviewError, OrderPatch, OrderStore, ReviewStore,
    StoreError, TransitionStoreError,
};

// ============================================================================
// In-Memory Store
// ============================================================================
//
// One store backing every seam, with the same semantics the Postgres
// implementation gets from SQL: conditional status updates, an append-only
// history, and aggregate adjustments applied atomically under the state
// lock. Backs the unit tests; production uses `postgres::PgStore`.
//
// ============================================================================

struct ServiceRecord {
    snapshot: ServiceSnapshot,
    aggregates: ServiceAggregates,
}

#[derive(Default)]
struct MemoryState {
    services: HashMap<Uuid, ServiceRecord>,
    orders: HashMap<Uuid, Order>,
    history: Vec<StatusHistoryEntry>,
    reviews: HashMap<Uuid, Review>,
    favorites: HashMap<(Uuid, Uuid), Favorite>,
}

pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    fail_next_aggregate: AtomicBool,
    fail_next_order_insert: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            fail_next_aggregate: AtomicBool::new(false),
            fail_next_order_insert: AtomicBool::new(false),
        }
    }

    /// A poisoned lock only means a test thread panicked mid-write; the
    /// state itself stays usable.
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a service with zeroed aggregates.
    pub fn seed_service(&self, snapshot: ServiceSnapshot) {
        let mut state = self.state();
        state.services.insert(
            snapshot.id,
            ServiceRecord {
                snapshot,
                aggregates: ServiceAggregates::default(),
            },
        );
    }

    /// Current aggregate values of a service, for assertions.
    pub fn service_aggregates(&self, service_id: Uuid) -> Option<ServiceAggregates> {
        let state = self.state();
        state.services.get(&service_id).map(|r| r.aggregates)
    }

    /// Make the next aggregate update fail, to exercise the
    /// log-and-continue policy at the call sites.
    pub fn fail_next_aggregate_update(&self) {
        self.fail_next_aggregate.store(true, Ordering::SeqCst);
    }

    /// Make the next order insert report an order-number collision, to
    /// exercise the factory's regenerate loop.
    pub fn fail_next_order_insert_with_duplicate(&self) {
        self.fail_next_order_insert.store(true, Ordering::SeqCst);
    }

    fn aggregates_mut<'a>(
        state: &'a mut MemoryState,
        service_id: Uuid,
    ) -> Result<&'a mut ServiceAggregates, StoreError> {
        state
            .services
            .get_mut(&service_id)
            .map(|r| &mut r.aggregates)
            .ok_or_else(|| {
                StoreError::Backend(format!("service {} not found for aggregate update", service_id))
            })
    }

    fn check_aggregate_fault(&self) -> Result<(), StoreError> {
        if self.fail_next_aggregate.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend(
                "injected aggregate update failure".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceCatalog for InMemoryStore {
    async fn snapshot(&self, service_id: Uuid) -> Result<Option<ServiceSnapshot>, StoreError> {
        let state = self.state();
        Ok(state.services.get(&service_id).map(|r| r.snapshot.clone()))
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert(&self, order: &Order) -> Result<(), InsertOrderError> {
        if self.fail_next_order_insert.swap(false, Ordering::SeqCst) {
            return Err(InsertOrderError::DuplicateOrderNumber(
                order.order_number.clone(),
            ));
        }

        let mut state = self.state();
        let taken = state
            .orders
            .values()
            .any(|existing| existing.order_number == order.order_number);
        if taken {
            return Err(InsertOrderError::DuplicateOrderNumber(
                order.order_number.clone(),
            ));
        }

        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let state = self.state();
        Ok(state.orders.get(&order_id).cloned())
    }

    async fn transition(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        patch: OrderPatch,
    ) -> Result<Order, TransitionStoreError> {
        // The compare and the write happen under one lock; this is the
        // in-memory equivalent of the conditional UPDATE.
        let mut state = self.state();
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(TransitionStoreError::NotFound)?;

        if order.status != expected {
            return Err(TransitionStoreError::StatusConflict {
                current: order.status,
            });
        }

        order.status = patch.status;
        if let Some(sent_at) = patch.sent_at {
            order.sent_at = Some(sent_at);
        }
        if let Some(completed_at) = patch.completed_at {
            order.completed_at = Some(completed_at);
        }
        if let Some(attachments) = patch.freelancer_attachments {
            order.freelancer_attachments = attachments;
        }
        if let Some(note) = patch.freelancer_note {
            order.freelancer_note = Some(note);
        }
        order.updated_at = Utc::now();

        Ok(order.clone())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn append(&self, entry: StatusHistoryEntry) -> Result<(), StoreError> {
        let mut state = self.state();
        state.history.push(entry);
        Ok(())
    }

    async fn list_for(&self, order_id: Uuid) -> Result<Vec<StatusHistoryEntry>, StoreError> {
        let state = self.state();
        Ok(state
            .history
            .iter()
            .filter(|entry| entry.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ServiceAggregateStore for InMemoryStore {
    async fn refresh_rating(&self, service_id: Uuid) -> Result<RatingSummary, StoreError> {
        self.check_aggregate_fault()?;

        let mut state = self.state();
        let ratings: Vec<i32> = state
            .reviews
            .values()
            .filter(|review| review.service_id == service_id)
            .map(|review| review.rating)
            .collect();

        let count = ratings.len() as i64;
        let average = if count == 0 {
            0.0
        } else {
            ratings.iter().map(|r| f64::from(*r)).sum::<f64>() / count as f64
        };

        let aggregates = Self::aggregates_mut(&mut state, service_id)?;
        aggregates.rating_average = average;
        aggregates.rating_count = count;

        Ok(RatingSummary { average, count })
    }

    async fn increment_favorites(&self, service_id: Uuid) -> Result<i64, StoreError> {
        self.check_aggregate_fault()?;

        let mut state = self.state();
        let aggregates = Self::aggregates_mut(&mut state, service_id)?;
        aggregates.favorite_count += 1;
        Ok(aggregates.favorite_count)
    }

    async fn decrement_favorites(&self, service_id: Uuid) -> Result<i64, StoreError> {
        self.check_aggregate_fault()?;

        let mut state = self.state();
        let aggregates = Self::aggregates_mut(&mut state, service_id)?;
        aggregates.favorite_count = (aggregates.favorite_count - 1).max(0);
        Ok(aggregates.favorite_count)
    }

    async fn increment_completed_orders(&self, service_id: Uuid) -> Result<i64, StoreError> {
        self.check_aggregate_fault()?;

        let mut state = self.state();
        let aggregates = Self::aggregates_mut(&mut state, service_id)?;
        aggregates.completed_order_count += 1;
        Ok(aggregates.completed_order_count)
    }
}

#[async_trait]
impl ReviewStore for InMemoryStore {
    async fn insert(&self, review: &Review) -> Result<(), InsertReviewError> {
        let mut state = self.state();
        let already_reviewed = state
            .reviews
            .values()
            .any(|existing| existing.order_id == review.order_id);
        if already_reviewed {
            return Err(InsertReviewError::DuplicateOrder);
        }

        state.reviews.insert(review.id, review.clone());
        Ok(())
    }

    async fn get(&self, review_id: Uuid) -> Result<Option<Review>, StoreError> {
        let state = self.state();
        Ok(state.reviews.get(&review_id).cloned())
    }

    async fn delete(&self, review_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state();
        Ok(state.reviews.remove(&review_id).is_some())
    }
}

#[async_trait]
impl FavoriteStore for InMemoryStore {
    async fn insert(&self, user_id: Uuid, service_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state();
        let key = (user_id, service_id);
        if state.favorites.contains_key(&key) {
            return Ok(false);
        }

        state.favorites.insert(
            key,
            Favorite {
                user_id,
                service_id,
                created_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn remove(&self, user_id: Uuid, service_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state();
        Ok(state.favorites.remove(&(user_id, service_id)).is_some())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

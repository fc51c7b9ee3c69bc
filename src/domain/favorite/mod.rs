// ============================================================================
// Favorite Domain - Bookmarking a Service
// ============================================================================
//
// A user keeps at most one favorite per service. The favorite row is the
// primary write; the service's favorite counter is a derived aggregate
// adjusted through atomic storage expressions, and a counter failure never
// undoes the favorite write.
//
// ============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::aggregates::ServiceAggregateStore;
use crate::storage::{FavoriteStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Favorite {
    pub user_id: Uuid,
    pub service_id: Uuid,
    pub created_at: DateTime<Utc>,
}

pub struct FavoriteService {
    favorites: Arc<dyn FavoriteStore>,
    aggregates: Arc<dyn ServiceAggregateStore>,
}

impl FavoriteService {
    pub fn new(
        favorites: Arc<dyn FavoriteStore>,
        aggregates: Arc<dyn ServiceAggregateStore>,
    ) -> Self {
        Self {
            favorites,
            aggregates,
        }
    }

    /// Add a favorite. Returns true when a fresh favorite was created; a
    /// repeated add is a no-op and does not bump the counter.
    pub async fn add(&self, user_id: Uuid, service_id: Uuid) -> Result<bool, StoreError> {
        let inserted = self.favorites.insert(user_id, service_id).await?;
        if !inserted {
            return Ok(false);
        }

        if let Err(err) = self.aggregates.increment_favorites(service_id).await {
            tracing::error!(
                service_id = %service_id,
                error = %err,
                "failed to bump favorite counter"
            );
        }

        tracing::debug!(user_id = %user_id, service_id = %service_id, "favorite added");
        Ok(true)
    }

    /// Remove a favorite. The counter is decremented (clamped at zero) only
    /// when a row was actually removed.
    pub async fn remove(&self, user_id: Uuid, service_id: Uuid) -> Result<bool, StoreError> {
        let removed = self.favorites.remove(user_id, service_id).await?;
        if !removed {
            return Ok(false);
        }

        if let Err(err) = self.aggregates.decrement_favorites(service_id).await {
            tracing::error!(
                service_id = %service_id,
                error = %err,
                "failed to lower favorite counter"
            );
        }

        tracing::debug!(user_id = %user_id, service_id = %service_id, "favorite removed");
        Ok(true)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

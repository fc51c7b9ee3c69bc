// ============================================================================
// Review Domain - Rating a Completed Order
// ============================================================================
//
// A client may review an order once it is completed, and each order carries
// at most one review. Creating or deleting a review refreshes the service's
// rating aggregate; the refresh is an independent side effect and its
// failure never undoes the review write itself.
//
// ============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::aggregates::ServiceAggregateStore;
use crate::storage::{InsertReviewError, OrderStore, ReviewStore, StoreError};

use super::order::OrderStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub order_id: Uuid,
    pub service_id: Uuid,
    pub reviewer_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateReviewInput {
    pub order_id: Uuid,
    pub reviewer_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("order not found")]
    OrderNotFound,

    #[error("review not found")]
    NotFound,

    #[error("order is not eligible for review")]
    NotEligible,

    #[error("order has already been reviewed")]
    AlreadyReviewed,

    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(i32),

    #[error("requester is not permitted to perform this operation")]
    Forbidden,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ReviewError {
    pub fn status_code(&self) -> u16 {
        match self {
            ReviewError::OrderNotFound | ReviewError::NotFound => 404,
            ReviewError::NotEligible | ReviewError::Forbidden => 403,
            ReviewError::AlreadyReviewed | ReviewError::InvalidRating(_) => 422,
            ReviewError::Storage(_) => 500,
        }
    }
}

pub struct ReviewService {
    orders: Arc<dyn OrderStore>,
    reviews: Arc<dyn ReviewStore>,
    aggregates: Arc<dyn ServiceAggregateStore>,
}

impl ReviewService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        reviews: Arc<dyn ReviewStore>,
        aggregates: Arc<dyn ServiceAggregateStore>,
    ) -> Self {
        Self {
            orders,
            reviews,
            aggregates,
        }
    }

    /// Create a review for a completed order and refresh the service's
    /// rating aggregate.
    pub async fn create(&self, input: CreateReviewInput) -> Result<Review, ReviewError> {
        if !(1..=5).contains(&input.rating) {
            return Err(ReviewError::InvalidRating(input.rating));
        }

        let order = self
            .orders
            .get(input.order_id)
            .await
            .map_err(ReviewError::Storage)?
            .ok_or(ReviewError::OrderNotFound)?;

        if order.status != OrderStatus::Completed || order.client_id != input.reviewer_id {
            return Err(ReviewError::NotEligible);
        }

        let review = Review {
            id: Uuid::new_v4(),
            order_id: order.id,
            service_id: order.service_id,
            reviewer_id: input.reviewer_id,
            rating: input.rating,
            comment: input.comment,
            created_at: Utc::now(),
        };

        self.reviews.insert(&review).await.map_err(|err| match err {
            InsertReviewError::DuplicateOrder => ReviewError::AlreadyReviewed,
            InsertReviewError::Store(err) => ReviewError::Storage(err),
        })?;

        self.refresh_rating(review.service_id).await;

        tracing::info!(
            review_id = %review.id,
            order_id = %review.order_id,
            rating = review.rating,
            "review created"
        );
        Ok(review)
    }

    /// Delete a review; only its author may do so. Refreshes the rating
    /// aggregate afterwards.
    pub async fn delete(&self, review_id: Uuid, requester_id: Uuid) -> Result<(), ReviewError> {
        let review = self
            .reviews
            .get(review_id)
            .await
            .map_err(ReviewError::Storage)?
            .ok_or(ReviewError::NotFound)?;

        if review.reviewer_id != requester_id {
            return Err(ReviewError::Forbidden);
        }

        let removed = self
            .reviews
            .delete(review_id)
            .await
            .map_err(ReviewError::Storage)?;
        if !removed {
            return Err(ReviewError::NotFound);
        }

        self.refresh_rating(review.service_id).await;

        tracing::info!(review_id = %review_id, "review deleted");
        Ok(())
    }

    /// Independent side effect: log and swallow failures so a broken counter
    /// never undoes the review write.
    async fn refresh_rating(&self, service_id: Uuid) {
        if let Err(err) = self.aggregates.refresh_rating(service_id).await {
            tracing::error!(
                service_id = %service_id,
                error = %err,
                "failed to refresh rating aggregate"
            );
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

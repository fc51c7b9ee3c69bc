use crate::storage::StoreError;

use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

/// Errors surfaced by order creation and every lifecycle transition.
///
/// All variants are expected, recoverable-by-caller conditions. The transport
/// layer outside this core maps them through `status_code`.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order not found")]
    NotFound,

    #[error("service not found")]
    ServiceNotFound,

    #[error("service is not accepting new orders")]
    ServiceNotActive,

    #[error("cannot place an order on your own service")]
    SelfOrderNotAllowed,

    #[error("package does not belong to the selected service")]
    InvalidPackage,

    #[error("requester is not permitted to perform this operation")]
    Forbidden,

    #[error("operation not allowed while order status is {current}")]
    InvalidStateTransition { current: OrderStatus },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl OrderError {
    /// Caller-facing status code for the transport layer.
    pub fn status_code(&self) -> u16 {
        match self {
            OrderError::NotFound | OrderError::ServiceNotFound => 404,
            OrderError::Forbidden => 403,
            OrderError::InvalidStateTransition { .. } => 400,
            OrderError::ServiceNotActive
            | OrderError::SelfOrderNotAllowed
            | OrderError::InvalidPackage
            | OrderError::Validation(_) => 422,
            OrderError::Storage(_) => 500,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

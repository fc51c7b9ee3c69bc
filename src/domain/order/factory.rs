use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::domain::catalog::{ListingStatus, ServiceCatalog, ServiceSnapshot};
use crate::ledger::{LedgerStore, StatusHistoryEntry};
use crate::storage::{InsertOrderError, OrderStore, StoreError};

use super::aggregate::Order;
use super::commands::CreateOrderInput;
use super::errors::OrderError;
use super::value_objects::{OrderNumber, OrderStatus};

// ============================================================================
// Order Factory
// ============================================================================
//
// Creates a new order from a service (and optional package), snapshotting
// everything the rest of the lifecycle treats as immutable: the parties, the
// financial figures and the work deadline. The catalog is consulted exactly
// once, here; later catalog changes never affect an existing order.
//
// ============================================================================

/// Bounded retries for order-number collisions before giving up.
const MAX_ORDER_NUMBER_ATTEMPTS: u32 = 5;

/// Financial figures computed once at creation. The platform fee is 10% of
/// the price truncated toward zero, not rounded to nearest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingSnapshot {
    pub price: i64,
    pub platform_fee: i64,
    pub total_due: i64,
    pub work_duration_days: i64,
}

impl PricingSnapshot {
    pub fn new(price: i64, work_duration_days: i64) -> Result<Self, OrderError> {
        if price < 0 {
            return Err(OrderError::Validation(format!(
                "price must be non-negative, got {}",
                price
            )));
        }
        if work_duration_days <= 0 {
            return Err(OrderError::Validation(format!(
                "work duration must be positive, got {} days",
                work_duration_days
            )));
        }

        let platform_fee = price / 10;
        Ok(Self {
            price,
            platform_fee,
            total_due: price + platform_fee,
            work_duration_days,
        })
    }

    /// Price and duration come from the package when one was chosen, else
    /// from the service itself.
    fn from_selection(
        service: &ServiceSnapshot,
        package_id: Option<Uuid>,
    ) -> Result<Self, OrderError> {
        match package_id {
            Some(package_id) => {
                let package = service
                    .package(package_id)
                    .ok_or(OrderError::InvalidPackage)?;
                Self::new(package.price, package.work_duration_days)
            }
            None => Self::new(service.price, service.work_duration_days),
        }
    }
}

pub struct OrderFactory {
    catalog: Arc<dyn ServiceCatalog>,
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn LedgerStore>,
}

impl OrderFactory {
    pub fn new(
        catalog: Arc<dyn ServiceCatalog>,
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn LedgerStore>,
    ) -> Self {
        Self {
            catalog,
            orders,
            ledger,
        }
    }

    /// Create a new order in `awaiting_payment` and append its creation
    /// ledger entry.
    pub async fn create(&self, input: CreateOrderInput) -> Result<Order, OrderError> {
        let service = self
            .catalog
            .snapshot(input.service_id)
            .await?
            .ok_or(OrderError::ServiceNotFound)?;

        if service.status != ListingStatus::Active {
            return Err(OrderError::ServiceNotActive);
        }
        if service.freelancer_id == input.client_id {
            return Err(OrderError::SelfOrderNotAllowed);
        }

        let pricing = PricingSnapshot::from_selection(&service, input.package_id)?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let mut order = Order {
            id: order_id,
            order_number: String::new(),
            client_id: input.client_id,
            freelancer_id: service.freelancer_id,
            service_id: service.id,
            package_id: input.package_id,
            price: pricing.price,
            platform_fee: pricing.platform_fee,
            total_due: pricing.total_due,
            work_duration_days: pricing.work_duration_days,
            deadline: now + Duration::days(pricing.work_duration_days),
            sent_at: None,
            completed_at: None,
            client_notes: input.client_notes,
            client_attachments: input.client_attachments,
            freelancer_attachments: Vec::new(),
            freelancer_note: None,
            status: OrderStatus::AwaitingPayment,
            created_at: now,
            updated_at: now,
        };

        self.persist_with_fresh_number(&mut order).await?;

        let entry = StatusHistoryEntry::creation(order.id, order.status, order.client_id);
        self.ledger.append(entry).await?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            service_id = %order.service_id,
            total_due = order.total_due,
            "order created"
        );

        Ok(order)
    }

    /// Generate an order number and insert, regenerating on a uniqueness
    /// violation up to the attempt bound.
    async fn persist_with_fresh_number(&self, order: &mut Order) -> Result<(), OrderError> {
        let mut last_taken = String::new();

        for attempt in 1..=MAX_ORDER_NUMBER_ATTEMPTS {
            let number = OrderNumber::generate(order.created_at, &mut rand::thread_rng());
            order.order_number = number.into_string();

            match self.orders.insert(order).await {
                Ok(()) => return Ok(()),
                Err(InsertOrderError::DuplicateOrderNumber(taken)) => {
                    tracing::warn!(
                        order_id = %order.id,
                        order_number = %taken,
                        attempt,
                        "order number collision, regenerating"
                    );
                    last_taken = taken;
                }
                Err(InsertOrderError::Store(err)) => return Err(err.into()),
            }
        }

        Err(OrderError::Storage(StoreError::Backend(format!(
            "could not allocate a unique order number after {} attempts (last tried {})",
            MAX_ORDER_NUMBER_ATTEMPTS, last_taken
        ))))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

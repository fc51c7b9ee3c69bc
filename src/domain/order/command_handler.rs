use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::catalog::aggregates::ServiceAggregateStore;
use crate::ledger::{LedgerStore, StatusHistoryEntry};
use crate::storage::{OrderPatch, OrderStore, TransitionStoreError};

use super::aggregate::Order;
use super::commands::{CancelOrderInput, CompleteOrderInput};
use super::errors::OrderError;
use super::transitions::{next_status, OrderAction, RequiredActor};
use super::value_objects::{ActorRole, OrderStatus};

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: load order -> check role -> consult transition table ->
// compare-and-swap the status -> append ledger entry.
//
// The CAS uses the loaded status as the expected value, so two racing
// transition attempts on the same order resolve to exactly one winner; the
// loser surfaces InvalidStateTransition naming the status it lost to.
//
// Every successful transition appends a ledger entry.
//
// ============================================================================

/// Both parties of an order, exposed for authorization checks in
/// collaborating subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderParties {
    pub client_id: Uuid,
    pub freelancer_id: Uuid,
}

/// Check the requester against the actor the transition table demands.
/// Returns the requester's role on the order for the ledger entry.
fn ensure_actor(
    order: &Order,
    action: OrderAction,
    requester_id: Uuid,
) -> Result<ActorRole, OrderError> {
    let role = order.role_of(requester_id);
    match (action.required_actor(), role) {
        (RequiredActor::Client, Some(ActorRole::Client)) => Ok(ActorRole::Client),
        (RequiredActor::Freelancer, Some(ActorRole::Freelancer)) => Ok(ActorRole::Freelancer),
        (RequiredActor::EitherParty, Some(role)) => Ok(role),
        _ => Err(OrderError::Forbidden),
    }
}

pub struct OrderCommandHandler {
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn LedgerStore>,
    aggregates: Arc<dyn ServiceAggregateStore>,
}

impl OrderCommandHandler {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn LedgerStore>,
        aggregates: Arc<dyn ServiceAggregateStore>,
    ) -> Self {
        Self {
            orders,
            ledger,
            aggregates,
        }
    }

    /// Consume the payment subsystem's "payment succeeded" event.
    ///
    /// The gateway is not an actor in the role domain; the entry is recorded
    /// against the paying client.
    pub async fn mark_paid(&self, order_id: Uuid) -> Result<Order, OrderError> {
        let order = self.load(order_id).await?;
        let next = next_status(order.status, OrderAction::MarkPaid)?;

        let updated = self.swap_status(&order, OrderPatch::to(next)).await?;

        let entry = StatusHistoryEntry::transition(
            updated.id,
            order.status,
            updated.status,
            updated.client_id,
            ActorRole::Client,
        )
        .with_reason("payment confirmed by payment gateway");
        self.ledger.append(entry).await?;

        tracing::info!(order_id = %updated.id, "order marked paid");
        Ok(updated)
    }

    /// Freelancer accepts a paid order and starts work.
    pub async fn accept(&self, order_id: Uuid, freelancer_id: Uuid) -> Result<Order, OrderError> {
        let order = self.load(order_id).await?;
        ensure_actor(&order, OrderAction::Accept, freelancer_id)?;
        let next = next_status(order.status, OrderAction::Accept)?;

        let updated = self.swap_status(&order, OrderPatch::to(next)).await?;

        let entry = StatusHistoryEntry::transition(
            updated.id,
            order.status,
            updated.status,
            freelancer_id,
            ActorRole::Freelancer,
        )
        .with_reason("freelancer accepted the order and started work");
        self.ledger.append(entry).await?;

        tracing::info!(order_id = %updated.id, "order accepted by freelancer");
        Ok(updated)
    }

    /// Freelancer delivers results. Attachment objects are reduced to their
    /// URLs; any other metadata on them is discarded.
    pub async fn complete(&self, input: CompleteOrderInput) -> Result<Order, OrderError> {
        let order = self.load(input.order_id).await?;
        ensure_actor(&order, OrderAction::Deliver, input.freelancer_id)?;
        let next = next_status(order.status, OrderAction::Deliver)?;

        let now = Utc::now();
        let attachment_urls: Vec<String> =
            input.attachments.into_iter().map(|a| a.url).collect();

        let patch = OrderPatch {
            status: next,
            sent_at: Some(now),
            completed_at: Some(now),
            freelancer_attachments: Some(attachment_urls),
            freelancer_note: input.note.clone(),
        };
        let updated = self.swap_status(&order, patch).await?;

        let mut metadata = HashMap::new();
        if let Some(note) = input.note {
            metadata.insert("note_for_client".to_string(), note);
        }
        let mut entry = StatusHistoryEntry::transition(
            updated.id,
            order.status,
            updated.status,
            input.freelancer_id,
            ActorRole::Freelancer,
        )
        .with_reason("freelancer marked order complete and delivered results");
        entry.metadata = metadata;
        self.ledger.append(entry).await?;

        tracing::info!(
            order_id = %updated.id,
            attachment_count = updated.freelancer_attachments.len(),
            "order delivered, awaiting client review"
        );
        Ok(updated)
    }

    /// Client confirms the delivery, closing the lifecycle and bumping the
    /// service's completed-order counter.
    pub async fn confirm_delivery(
        &self,
        order_id: Uuid,
        client_id: Uuid,
    ) -> Result<Order, OrderError> {
        let order = self.load(order_id).await?;
        ensure_actor(&order, OrderAction::ConfirmDelivery, client_id)?;
        let next = next_status(order.status, OrderAction::ConfirmDelivery)?;

        let updated = self.swap_status(&order, OrderPatch::to(next)).await?;

        let entry = StatusHistoryEntry::transition(
            updated.id,
            order.status,
            updated.status,
            client_id,
            ActorRole::Client,
        )
        .with_reason("client confirmed the delivery");
        self.ledger.append(entry).await?;

        // Independent side effect: a counter failure must not roll back the
        // completed transition.
        if let Err(err) = self
            .aggregates
            .increment_completed_orders(updated.service_id)
            .await
        {
            tracing::error!(
                service_id = %updated.service_id,
                order_id = %updated.id,
                error = %err,
                "failed to bump completed-order counter"
            );
        }

        tracing::info!(order_id = %updated.id, "order completed");
        Ok(updated)
    }

    /// Either party calls the order off; only permitted before work starts.
    pub async fn cancel(&self, input: CancelOrderInput) -> Result<Order, OrderError> {
        let order = self.load(input.order_id).await?;
        let role = ensure_actor(&order, OrderAction::Cancel, input.requester_id)?;
        let next = next_status(order.status, OrderAction::Cancel)?;

        let updated = self.swap_status(&order, OrderPatch::to(next)).await?;

        let mut entry = StatusHistoryEntry::transition(
            updated.id,
            order.status,
            updated.status,
            input.requester_id,
            role,
        );
        if let Some(reason) = input.reason {
            entry = entry.with_reason(reason);
        }
        self.ledger.append(entry).await?;

        tracing::info!(order_id = %updated.id, cancelled_by = %role, "order cancelled");
        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Read surface for collaborating subsystems
    // ------------------------------------------------------------------

    pub async fn get(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.load(order_id).await
    }

    pub async fn parties(&self, order_id: Uuid) -> Result<OrderParties, OrderError> {
        let order = self.load(order_id).await?;
        Ok(OrderParties {
            client_id: order.client_id,
            freelancer_id: order.freelancer_id,
        })
    }

    /// True iff the order is completed and the requester is its client.
    pub async fn is_eligible_for_review(
        &self,
        order_id: Uuid,
        requester_id: Uuid,
    ) -> Result<bool, OrderError> {
        let order = self.load(order_id).await?;
        Ok(order.status == OrderStatus::Completed && order.client_id == requester_id)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn load(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.orders
            .get(order_id)
            .await?
            .ok_or(OrderError::NotFound)
    }

    async fn swap_status(&self, order: &Order, patch: OrderPatch) -> Result<Order, OrderError> {
        self.orders
            .transition(order.id, order.status, patch)
            .await
            .map_err(|err| match err {
                TransitionStoreError::NotFound => OrderError::NotFound,
                TransitionStoreError::StatusConflict { current } => {
                    OrderError::InvalidStateTransition { current }
                }
                TransitionStoreError::Store(err) => OrderError::Storage(err),
            })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{ListingStatus, ServiceSnapshot};
    use crate::domain::order::commands::{CreateOrderInput, DeliveredAttachment};
    use crate::domain::order::factory::OrderFactory;
    use crate::ledger::replayed_status;
    use crate::storage::memory::InMemoryStore;

    struct Fixture {
        store: Arc<InMemoryStore>,
        handler: Arc<OrderCommandHandler>,
        order: Order,
        client_id: Uuid,
        freelancer_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let freelancer_id = Uuid::new_v4();
        let client_id = Uuid::new_v4();

        let service = ServiceSnapshot {
            id: Uuid::new_v4(),
            freelancer_id,
            title: "Mobile app UI kit".to_string(),
            price: 2_500_000,
            work_duration_days: 14,
            status: ListingStatus::Active,
            packages: vec![],
        };
        store.seed_service(service.clone());

        let factory = OrderFactory::new(store.clone(), store.clone(), store.clone());
        let order = factory
            .create(CreateOrderInput {
                client_id,
                service_id: service.id,
                package_id: None,
                client_notes: None,
                client_attachments: vec![],
            })
            .await
            .unwrap();

        let handler = Arc::new(OrderCommandHandler::new(
            store.clone(),
            store.clone(),
            store.clone(),
        ));

        Fixture {
            store,
            handler,
            order,
            client_id,
            freelancer_id,
        }
    }

    fn delivery(order_id: Uuid, freelancer_id: Uuid) -> CompleteOrderInput {
        CompleteOrderInput {
            order_id,
            freelancer_id,
            attachments: vec![DeliveredAttachment {
                url: "https://cdn.example/final.zip".to_string(),
                label: Some("final delivery".to_string()),
            }],
            note: Some("thanks for your patience".to_string()),
        }
    }

    #[tokio::test]
    async fn test_full_lifecycle_keeps_financials_and_ledger_consistent() {
        let fx = fixture().await;

        let paid = fx.handler.mark_paid(fx.order.id).await.unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);

        let in_progress = fx
            .handler
            .accept(fx.order.id, fx.freelancer_id)
            .await
            .unwrap();
        assert_eq!(in_progress.status, OrderStatus::InProgress);

        let input = delivery(fx.order.id, fx.freelancer_id);
        assert!(input.attachments[0].label.is_some());

        let delivered = fx.handler.complete(input).await.unwrap();
        assert_eq!(delivered.status, OrderStatus::AwaitingReview);
        assert!(delivered.sent_at.is_some());
        assert!(delivered.completed_at.is_some());
        // Only the URL survives persistence; the label is discarded.
        assert_eq!(
            delivered.freelancer_attachments,
            vec!["https://cdn.example/final.zip".to_string()]
        );

        let completed = fx
            .handler
            .confirm_delivery(fx.order.id, fx.client_id)
            .await
            .unwrap();
        assert_eq!(completed.status, OrderStatus::Completed);

        // Financial snapshot untouched by any transition.
        assert_eq!(completed.price, fx.order.price);
        assert_eq!(completed.platform_fee, fx.order.platform_fee);
        assert_eq!(completed.total_due, fx.order.total_due);

        // Ledger replays to the current status: creation + 4 transitions.
        let history = fx.store.list_for(fx.order.id).await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(replayed_status(&history), Some(OrderStatus::Completed));

        // Delivery entry carries the canonical reason and the note.
        let delivery_entry = history
            .iter()
            .find(|e| e.to_status == OrderStatus::AwaitingReview)
            .unwrap();
        assert_eq!(
            delivery_entry.reason.as_deref(),
            Some("freelancer marked order complete and delivered results")
        );
        assert_eq!(
            delivery_entry
                .metadata
                .get("note_for_client")
                .map(String::as_str),
            Some("thanks for your patience")
        );
    }

    #[tokio::test]
    async fn test_accept_requires_the_orders_freelancer() {
        let fx = fixture().await;
        fx.handler.mark_paid(fx.order.id).await.unwrap();

        let err = fx
            .handler
            .accept(fx.order.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Forbidden));
    }

    #[tokio::test]
    async fn test_accept_requires_paid_status() {
        let fx = fixture().await;

        let err = fx
            .handler
            .accept(fx.order.id, fx.freelancer_id)
            .await
            .unwrap_err();
        match err {
            OrderError::InvalidStateTransition { current } => {
                assert_eq!(current, OrderStatus::AwaitingPayment);
            }
            other => panic!("expected InvalidStateTransition, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_from_paid_fails_before_work_starts() {
        let fx = fixture().await;
        fx.handler.mark_paid(fx.order.id).await.unwrap();

        let err = fx
            .handler
            .complete(delivery(fx.order.id, fx.freelancer_id))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidStateTransition {
                current: OrderStatus::Paid
            }
        ));
    }

    #[tokio::test]
    async fn test_complete_by_stranger_is_forbidden() {
        let fx = fixture().await;
        fx.handler.mark_paid(fx.order.id).await.unwrap();
        fx.handler
            .accept(fx.order.id, fx.freelancer_id)
            .await
            .unwrap();

        let err = fx
            .handler
            .complete(delivery(fx.order.id, Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Forbidden));
    }

    #[tokio::test]
    async fn test_complete_twice_is_rejected() {
        let fx = fixture().await;
        fx.handler.mark_paid(fx.order.id).await.unwrap();
        fx.handler
            .accept(fx.order.id, fx.freelancer_id)
            .await
            .unwrap();
        fx.handler
            .complete(delivery(fx.order.id, fx.freelancer_id))
            .await
            .unwrap();

        let err = fx
            .handler
            .complete(delivery(fx.order.id, fx.freelancer_id))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidStateTransition {
                current: OrderStatus::AwaitingReview
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_boundary() {
        // Cancellable while awaiting payment.
        let fx = fixture().await;
        let cancelled = fx
            .handler
            .cancel(CancelOrderInput {
                order_id: fx.order.id,
                requester_id: fx.client_id,
                reason: Some("found another provider".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let history = fx.store.list_for(fx.order.id).await.unwrap();
        let cancel_entry = history.last().unwrap();
        assert_eq!(cancel_entry.reason.as_deref(), Some("found another provider"));

        // Cancellable by the freelancer while paid.
        let fx = fixture().await;
        fx.handler.mark_paid(fx.order.id).await.unwrap();
        let cancelled = fx
            .handler
            .cancel(CancelOrderInput {
                order_id: fx.order.id,
                requester_id: fx.freelancer_id,
                reason: None,
            })
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        // Not cancellable once work has started.
        let fx = fixture().await;
        fx.handler.mark_paid(fx.order.id).await.unwrap();
        fx.handler
            .accept(fx.order.id, fx.freelancer_id)
            .await
            .unwrap();
        let err = fx
            .handler
            .cancel(CancelOrderInput {
                order_id: fx.order.id,
                requester_id: fx.client_id,
                reason: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidStateTransition {
                current: OrderStatus::InProgress
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_by_stranger_is_forbidden() {
        let fx = fixture().await;
        let err = fx
            .handler
            .cancel(CancelOrderInput {
                order_id: fx.order.id,
                requester_id: Uuid::new_v4(),
                reason: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Forbidden));
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let fx = fixture().await;
        let err = fx.handler.mark_paid(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound));
    }

    #[tokio::test]
    async fn test_confirm_delivery_bumps_completed_counter() {
        let fx = fixture().await;
        fx.handler.mark_paid(fx.order.id).await.unwrap();
        fx.handler
            .accept(fx.order.id, fx.freelancer_id)
            .await
            .unwrap();
        fx.handler
            .complete(delivery(fx.order.id, fx.freelancer_id))
            .await
            .unwrap();
        fx.handler
            .confirm_delivery(fx.order.id, fx.client_id)
            .await
            .unwrap();

        let aggregates = fx.store.service_aggregates(fx.order.service_id).unwrap();
        assert_eq!(aggregates.completed_order_count, 1);
    }

    #[tokio::test]
    async fn test_counter_failure_does_not_roll_back_completion() {
        let fx = fixture().await;
        fx.handler.mark_paid(fx.order.id).await.unwrap();
        fx.handler
            .accept(fx.order.id, fx.freelancer_id)
            .await
            .unwrap();
        fx.handler
            .complete(delivery(fx.order.id, fx.freelancer_id))
            .await
            .unwrap();

        fx.store.fail_next_aggregate_update();
        let completed = fx
            .handler
            .confirm_delivery(fx.order.id, fx.client_id)
            .await
            .unwrap();
        assert_eq!(completed.status, OrderStatus::Completed);

        let aggregates = fx.store.service_aggregates(fx.order.service_id).unwrap();
        assert_eq!(aggregates.completed_order_count, 0);
    }

    #[tokio::test]
    async fn test_review_eligibility_query() {
        let fx = fixture().await;
        assert!(!fx
            .handler
            .is_eligible_for_review(fx.order.id, fx.client_id)
            .await
            .unwrap());

        fx.handler.mark_paid(fx.order.id).await.unwrap();
        fx.handler
            .accept(fx.order.id, fx.freelancer_id)
            .await
            .unwrap();
        fx.handler
            .complete(delivery(fx.order.id, fx.freelancer_id))
            .await
            .unwrap();
        fx.handler
            .confirm_delivery(fx.order.id, fx.client_id)
            .await
            .unwrap();

        assert!(fx
            .handler
            .is_eligible_for_review(fx.order.id, fx.client_id)
            .await
            .unwrap());
        // The freelancer never reviews their own order.
        assert!(!fx
            .handler
            .is_eligible_for_review(fx.order.id, fx.freelancer_id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_parties_query() {
        let fx = fixture().await;
        let parties = fx.handler.parties(fx.order.id).await.unwrap();
        assert_eq!(parties.client_id, fx.client_id);
        assert_eq!(parties.freelancer_id, fx.freelancer_id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_completes_have_exactly_one_winner() {
        let fx = fixture().await;
        fx.handler.mark_paid(fx.order.id).await.unwrap();
        fx.handler
            .accept(fx.order.id, fx.freelancer_id)
            .await
            .unwrap();

        let first = {
            let handler = fx.handler.clone();
            let input = delivery(fx.order.id, fx.freelancer_id);
            tokio::spawn(async move { handler.complete(input).await })
        };
        let second = {
            let handler = fx.handler.clone();
            let input = delivery(fx.order.id, fx.freelancer_id);
            tokio::spawn(async move { handler.complete(input).await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    Err(OrderError::InvalidStateTransition {
                        current: OrderStatus::AwaitingReview
                    })
                )
            })
            .count();

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);

        // Exactly one delivery ledger entry, and replay matches the status.
        let history = fx.store.list_for(fx.order.id).await.unwrap();
        let delivery_entries = history
            .iter()
            .filter(|e| e.to_status == OrderStatus::AwaitingReview)
            .count();
        assert_eq!(delivery_entries, 1);
        assert_eq!(replayed_status(&history), Some(OrderStatus::AwaitingReview));
    }
}

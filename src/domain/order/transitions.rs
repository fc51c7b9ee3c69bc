use super::errors::OrderError;
use super::value_objects::OrderStatus;

// ============================================================================
// Order State Machine - Transition Table
// ============================================================================
//
// Single source of truth for which action moves an order from which status
// to which. Guards on WHO may perform an action live next to the table as
// `required_actor`; the command handler enforces both before writing.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    /// Payment-success event consumed from the payment subsystem.
    MarkPaid,
    /// Freelancer accepts the paid order and starts work.
    Accept,
    /// Freelancer delivers results.
    Deliver,
    /// Client confirms the delivery, closing the lifecycle.
    ConfirmDelivery,
    /// Either party calls the order off before work has started.
    Cancel,
}

/// Which party must be behind an action for it to be authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredActor {
    Client,
    Freelancer,
    EitherParty,
    /// Triggered by an external event rather than a user request.
    System,
}

impl OrderAction {
    pub fn required_actor(&self) -> RequiredActor {
        match self {
            OrderAction::MarkPaid => RequiredActor::System,
            OrderAction::Accept => RequiredActor::Freelancer,
            OrderAction::Deliver => RequiredActor::Freelancer,
            OrderAction::ConfirmDelivery => RequiredActor::Client,
            OrderAction::Cancel => RequiredActor::EitherParty,
        }
    }
}

/// Validate an action against the current status and return the status it
/// leads to. Reserved statuses (`revision`, `disputed`, `refunded`) admit no
/// action; neither do terminal ones.
pub fn next_status(current: OrderStatus, action: OrderAction) -> Result<OrderStatus, OrderError> {
    match (current, action) {
        (OrderStatus::AwaitingPayment, OrderAction::MarkPaid) => Ok(OrderStatus::Paid),
        (OrderStatus::Paid, OrderAction::Accept) => Ok(OrderStatus::InProgress),
        (OrderStatus::InProgress, OrderAction::Deliver) => Ok(OrderStatus::AwaitingReview),
        (OrderStatus::AwaitingReview, OrderAction::ConfirmDelivery) => Ok(OrderStatus::Completed),
        (OrderStatus::AwaitingPayment | OrderStatus::Paid, OrderAction::Cancel) => {
            Ok(OrderStatus::Cancelled)
        }
        (current, _) => Err(OrderError::InvalidStateTransition { current }),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert_eq!(
            next_status(OrderStatus::AwaitingPayment, OrderAction::MarkPaid).unwrap(),
            OrderStatus::Paid
        );
        assert_eq!(
            next_status(OrderStatus::Paid, OrderAction::Accept).unwrap(),
            OrderStatus::InProgress
        );
        assert_eq!(
            next_status(OrderStatus::InProgress, OrderAction::Deliver).unwrap(),
            OrderStatus::AwaitingReview
        );
        assert_eq!(
            next_status(OrderStatus::AwaitingReview, OrderAction::ConfirmDelivery).unwrap(),
            OrderStatus::Completed
        );
    }

    #[test]
    fn test_deliver_requires_work_in_progress() {
        // Paid but not yet accepted: delivery must be rejected, and the error
        // must name the status the order is actually in.
        let err = next_status(OrderStatus::Paid, OrderAction::Deliver).unwrap_err();
        match err {
            OrderError::InvalidStateTransition { current } => {
                assert_eq!(current, OrderStatus::Paid);
            }
            other => panic!("expected InvalidStateTransition, got {:?}", other),
        }
    }

    #[test]
    fn test_cancel_allowed_only_before_work_starts() {
        assert_eq!(
            next_status(OrderStatus::AwaitingPayment, OrderAction::Cancel).unwrap(),
            OrderStatus::Cancelled
        );
        assert_eq!(
            next_status(OrderStatus::Paid, OrderAction::Cancel).unwrap(),
            OrderStatus::Cancelled
        );

        for blocked in [
            OrderStatus::InProgress,
            OrderStatus::AwaitingReview,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            let err = next_status(blocked, OrderAction::Cancel).unwrap_err();
            assert!(matches!(
                err,
                OrderError::InvalidStateTransition { current } if current == blocked
            ));
        }
    }

    #[test]
    fn test_transitions_are_not_idempotent() {
        // Delivering an already-delivered order fails instead of silently
        // succeeding.
        let err = next_status(OrderStatus::AwaitingReview, OrderAction::Deliver).unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidStateTransition {
                current: OrderStatus::AwaitingReview
            }
        ));
    }

    #[test]
    fn test_reserved_statuses_admit_no_action() {
        for reserved in [
            OrderStatus::Revision,
            OrderStatus::Disputed,
            OrderStatus::Refunded,
        ] {
            for action in [
                OrderAction::MarkPaid,
                OrderAction::Accept,
                OrderAction::Deliver,
                OrderAction::ConfirmDelivery,
                OrderAction::Cancel,
            ] {
                assert!(next_status(reserved, action).is_err());
            }
        }
    }

    #[test]
    fn test_required_actors() {
        assert_eq!(
            OrderAction::Accept.required_actor(),
            RequiredActor::Freelancer
        );
        assert_eq!(
            OrderAction::ConfirmDelivery.required_actor(),
            RequiredActor::Client
        );
        assert_eq!(
            OrderAction::Cancel.required_actor(),
            RequiredActor::EitherParty
        );
        assert_eq!(OrderAction::MarkPaid.required_actor(), RequiredActor::System);
    }
}

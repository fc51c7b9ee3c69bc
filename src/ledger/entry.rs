use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::{ActorRole, OrderStatus};

// ============================================================================
// Status History Entry
// ============================================================================

/// One status change on one order: who changed it, from what, to what, why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub order_id: Uuid,

    /// None only for the creation entry.
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,

    pub changed_by: Uuid,
    pub changed_by_role: ActorRole,

    pub reason: Option<String>,
    pub metadata: HashMap<String, String>,

    pub created_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    /// Entry recorded when an order is created.
    pub fn creation(order_id: Uuid, to_status: OrderStatus, changed_by: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            from_status: None,
            to_status,
            changed_by,
            changed_by_role: ActorRole::Client,
            reason: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Entry recorded for any later transition.
    pub fn transition(
        order_id: Uuid,
        from_status: OrderStatus,
        to_status: OrderStatus,
        changed_by: Uuid,
        changed_by_role: ActorRole,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            from_status: Some(from_status),
            to_status,
            changed_by,
            changed_by_role,
            reason: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Replay a ledger slice: the `to_status` of the last entry is the status the
/// order must currently be in. Entries are expected in insertion order, as
/// returned by the store.
pub fn replayed_status(entries: &[StatusHistoryEntry]) -> Option<OrderStatus> {
    entries.last().map(|entry| entry.to_status)
}

// ============================================================================
// Unit Tests
// ============================================================================

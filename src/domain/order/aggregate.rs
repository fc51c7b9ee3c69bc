use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::{ActorRole, OrderStatus};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// A single commissioned transaction between a client and a freelancer.
//
// Invariants:
// - client_id != freelancer_id, enforced at creation
// - price, platform_fee and total_due are written once at creation and never
//   mutated by any transition
// - status only changes through the transition table, with a ledger entry
//   appended for every change
//
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub order_number: String,

    // Parties (immutable after creation)
    pub client_id: Uuid,
    pub freelancer_id: Uuid,

    // Subject
    pub service_id: Uuid,
    pub package_id: Option<Uuid>,

    // Financial snapshot (write-once)
    pub price: i64,
    pub platform_fee: i64,
    pub total_due: i64,

    // Scheduling
    pub work_duration_days: i64,
    pub deadline: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    // Content
    pub client_notes: Option<String>,
    pub client_attachments: Vec<String>,
    pub freelancer_attachments: Vec<String>,
    pub freelancer_note: Option<String>,

    pub status: OrderStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.client_id == user_id || self.freelancer_id == user_id
    }

    /// Role of a user on this order, if they are a party to it.
    pub fn role_of(&self, user_id: Uuid) -> Option<ActorRole> {
        if self.client_id == user_id {
            Some(ActorRole::Client)
        } else if self.freelancer_id == user_id {
            Some(ActorRole::Freelancer)
        } else {
            None
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

use std::fmt;
use std::str::FromStr;

use chrono::Datelike;
use rand::Rng;
use serde::{Deserialize, Serialize};

// ============================================================================
// Order Value Objects
// ============================================================================

/// Order lifecycle status.
///
/// `Revision`, `Disputed` and `Refunded` belong to the status domain but are
/// reserved: no implemented transition enters or leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    AwaitingPayment,
    Paid,
    InProgress,
    AwaitingReview,
    Revision,
    Completed,
    Disputed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::AwaitingPayment => "awaiting_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::AwaitingReview => "awaiting_review",
            OrderStatus::Revision => "revision",
            OrderStatus::Completed => "completed",
            OrderStatus::Disputed => "disputed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Terminal statuses are retained for audit; the order row is never
    /// deleted once one of these is reached.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting_payment" => Ok(OrderStatus::AwaitingPayment),
            "paid" => Ok(OrderStatus::Paid),
            "in_progress" => Ok(OrderStatus::InProgress),
            "awaiting_review" => Ok(OrderStatus::AwaitingReview),
            "revision" => Ok(OrderStatus::Revision),
            "completed" => Ok(OrderStatus::Completed),
            "disputed" => Ok(OrderStatus::Disputed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who performed a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Client,
    Freelancer,
    Admin,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Client => "client",
            ActorRole::Freelancer => "freelancer",
            ActorRole::Admin => "admin",
        }
    }
}

impl FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(ActorRole::Client),
            "freelancer" => Ok(ActorRole::Freelancer),
            "admin" => Ok(ActorRole::Admin),
            other => Err(format!("unknown actor role: {}", other)),
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable order number, `PES-<year>-<5 digits>`.
///
/// The format alone does not guarantee uniqueness; the order store enforces a
/// uniqueness constraint and the factory regenerates on collision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn generate(created_at: chrono::DateTime<chrono::Utc>, rng: &mut impl Rng) -> Self {
        let suffix: u32 = rng.gen_range(0..100_000);
        Self(format!("PES-{}-{:05}", created_at.year(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for OrderNumber {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

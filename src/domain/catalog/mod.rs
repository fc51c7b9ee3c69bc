// ============================================================================
// Catalog - Read Surface of the Service Subsystem
// ============================================================================
//
// Services are owned by an external catalog subsystem. This core only reads
// a snapshot of a service at order-creation time, and writes back the
// derived aggregate columns through the maintainer in `aggregates`.
//
// ============================================================================

pub mod aggregates;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::storage::StoreError;

/// Listing state of a service. Only `active` services accept new orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Paused,
    Archived,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Paused => "paused",
            ListingStatus::Archived => "archived",
        }
    }
}

impl FromStr for ListingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ListingStatus::Active),
            "paused" => Ok(ListingStatus::Paused),
            "archived" => Ok(ListingStatus::Archived),
            other => Err(format!("unknown listing status: {}", other)),
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priced variant of a service with its own turnaround time. Overrides the
/// service defaults when selected at order creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSnapshot {
    pub id: Uuid,
    pub service_id: Uuid,
    pub title: String,
    pub price: i64,
    pub work_duration_days: i64,
}

/// What the order factory reads from the catalog at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub id: Uuid,
    pub freelancer_id: Uuid,
    pub title: String,
    pub price: i64,
    pub work_duration_days: i64,
    pub status: ListingStatus,
    pub packages: Vec<PackageSnapshot>,
}

impl ServiceSnapshot {
    pub fn package(&self, package_id: Uuid) -> Option<&PackageSnapshot> {
        self.packages.iter().find(|p| p.id == package_id)
    }
}

/// Read-only view into the service catalog, consumed at order creation.
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn snapshot(&self, service_id: Uuid) -> Result<Option<ServiceSnapshot>, StoreError>;
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_lookup() {
        let service_id = Uuid::new_v4();
        let package_id = Uuid::new_v4();
        let snapshot = ServiceSnapshot {
            id: service_id,
            freelancer_id: Uuid::new_v4(),
            title: "Logo design".to_string(),
            price: 500_000,
            work_duration_days: 3,
            status: ListingStatus::Active,
            packages: vec![PackageSnapshot {
                id: package_id,
                service_id,
                title: "Premium".to_string(),
                price: 1_200_000,
                work_duration_days: 5,
            }],
        };

        assert!(snapshot.package(package_id).is_some());
        assert!(snapshot.package(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_listing_status_round_trip() {
        for status in [
            ListingStatus::Active,
            ListingStatus::Paused,
            ListingStatus::Archived,
        ] {
            let parsed: ListingStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}

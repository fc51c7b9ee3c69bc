use async_trait::async_trait;
use uuid::Uuid;

use crate::storage::StoreError;

use super::entry::StatusHistoryEntry;

// ============================================================================
// Ledger Store Seam
// ============================================================================

/// Append-only persistence for status history entries.
///
/// `list_for` returns entries ordered by `created_at` ascending with ties
/// broken by insertion sequence (the store's own monotonic sequence, not a
/// secondary sort key). Implementations expose no update or delete.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append(&self, entry: StatusHistoryEntry) -> Result<(), StoreError>;

    async fn list_for(&self, order_id: Uuid) -> Result<Vec<StatusHistoryEntry>, StoreError>;
}

use chrono::{DateTime, Datelike, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use tokio::sync::{Mutex, MutexGuard};
use tracing::instrument;

use crate::entities::purchase_order::{self, Entity as PurchaseOrder};
use crate::errors::ServiceError;

/// Allocates human-readable purchase order numbers: `PO-YYYYMM-NNNN`,
/// unique within a calendar month and increasing by creation order.
///
/// The sequence continues from the highest number already allocated in the
/// month, so a deleted draft never frees its number for reuse. Allocation and
/// the subsequent insert must not interleave with another creator: callers
/// take the allocator's guard before opening the creating transaction and
/// hold it until the insert commits. The unique index on `po_number`
/// backstops any allocation that slips past an out-of-process writer.
#[derive(Debug, Default)]
pub struct OrderNumberAllocator {
    lock: Mutex<()>,
}

impl OrderNumberAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the single-writer guard for the allocate-then-insert window.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Produces the next number for the month containing `now`. Must be
    /// called with the allocator guard held, on the creating transaction.
    #[instrument(skip(self, conn))]
    pub async fn next_number<C: ConnectionTrait>(
        &self,
        conn: &C,
        now: DateTime<Utc>,
    ) -> Result<String, ServiceError> {
        let prefix = format!("PO-{:04}{:02}-", now.year(), now.month());

        // Zero-padded fixed width, so the lexicographic maximum is the
        // numeric maximum.
        let last = PurchaseOrder::find()
            .filter(purchase_order::Column::PoNumber.starts_with(&prefix))
            .order_by_desc(purchase_order::Column::PoNumber)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        let sequence = match &last {
            Some(order) => parse_sequence(&order.po_number, &prefix)? + 1,
            None => 1,
        };
        Ok(format!("{}{:04}", prefix, sequence))
    }
}

fn parse_sequence(po_number: &str, prefix: &str) -> Result<u64, ServiceError> {
    po_number
        .get(prefix.len()..)
        .and_then(|suffix| suffix.parse().ok())
        .ok_or_else(|| {
            ServiceError::InternalError(format!(
                "malformed purchase order number {}",
                po_number
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_continues_from_the_last_allocated_number() {
        assert_eq!(parse_sequence("PO-202608-0042", "PO-202608-").unwrap(), 42);
        assert_eq!(parse_sequence("PO-202512-9999", "PO-202512-").unwrap(), 9999);
    }

    #[test]
    fn malformed_numbers_are_an_error_not_a_restart() {
        assert!(parse_sequence("PO-202608-", "PO-202608-").is_err());
        assert!(parse_sequence("PO-202608-00x1", "PO-202608-").is_err());
    }

    #[test]
    fn number_format_is_month_scoped_and_zero_padded() {
        let prefix = format!("PO-{:04}{:02}-", 2026, 3);
        assert_eq!(format!("{}{:04}", prefix, 7u64), "PO-202603-0007");
    }
}

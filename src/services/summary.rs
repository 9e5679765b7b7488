use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

use crate::entities::purchase_order::{Entity as PurchaseOrder, PurchaseOrderStatus};
use crate::errors::ServiceError;

/// Count and monetary total for one lifecycle status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub status: PurchaseOrderStatus,
    pub count: u64,
    pub total_amount: Decimal,
}

/// Dashboard aggregates over current purchase order rows. Purely derived:
/// recomputed from a full scan at call time, never cached or persisted.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderSummary {
    pub total_orders: u64,
    pub by_status: Vec<StatusSummary>,
    /// Sum of totals for orders currently `Ordered`.
    pub pending_value: Decimal,
}

#[derive(Clone)]
pub struct SummaryService {
    db: Arc<DatabaseConnection>,
}

impl SummaryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn purchase_order_summary(&self) -> Result<PurchaseOrderSummary, ServiceError> {
        let orders = PurchaseOrder::find()
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let statuses = [
            PurchaseOrderStatus::Draft,
            PurchaseOrderStatus::Ordered,
            PurchaseOrderStatus::Received,
            PurchaseOrderStatus::Cancelled,
        ];

        let by_status = statuses
            .into_iter()
            .map(|status| {
                let matching = orders.iter().filter(|o| o.status == status);
                StatusSummary {
                    count: matching.clone().count() as u64,
                    total_amount: matching.map(|o| o.total_amount).sum(),
                    status,
                }
            })
            .collect::<Vec<_>>();

        let pending_value = orders
            .iter()
            .filter(|o| o.status == PurchaseOrderStatus::Ordered)
            .map(|o| o.total_amount)
            .sum();

        Ok(PurchaseOrderSummary {
            total_orders: orders.len() as u64,
            by_status,
            pending_value,
        })
    }
}

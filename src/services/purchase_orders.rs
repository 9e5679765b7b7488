use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use prometheus::IntCounter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::entities::product::Entity as Product;
use crate::entities::product_supplier::Entity as ProductSupplier;
use crate::entities::purchase_order::{
    self, Entity as PurchaseOrder, Model as PurchaseOrderModel, PurchaseOrderStatus,
};
use crate::entities::purchase_order_item::{self, Model as PurchaseOrderItemModel};
use crate::entities::supplier::{Entity as Supplier, Model as SupplierModel};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::{
    purchase_order_repository::items_total, ItemInput, PurchaseOrderFilter,
    PurchaseOrderRepository,
};
use crate::services::order_numbering::OrderNumberAllocator;
use crate::services::reconciliation::{ItemReconciliation, ReconciliationEngine};

lazy_static! {
    static ref PO_CREATIONS: IntCounter = IntCounter::new(
        "purchase_order_creations_total",
        "Total number of purchase orders created"
    )
    .expect("metric can be created");
    static ref PO_RECEIPTS: IntCounter = IntCounter::new(
        "purchase_order_receipts_total",
        "Total number of purchase orders received"
    )
    .expect("metric can be created");
    static ref PO_VALIDATION_FAILURES: IntCounter = IntCounter::new(
        "purchase_order_validation_failures_total",
        "Total number of rejected purchase order requests"
    )
    .expect("metric can be created");
}

/// Request to create a purchase order. Persisted as `Draft`.
#[derive(Debug, Clone)]
pub struct CreatePurchaseOrder {
    pub supplier_id: Uuid,
    pub expected_date: Option<NaiveDate>,
    pub tax_amount: Decimal,
    pub shipping_cost: Decimal,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub items: Vec<ItemInput>,
}

/// Partial update. `status: Received` routes through the full receive
/// transition so the stock effect is never skipped, even when the status is
/// set via this generic call.
#[derive(Debug, Clone, Default)]
pub struct UpdatePurchaseOrder {
    pub status: Option<PurchaseOrderStatus>,
    pub expected_date: Option<NaiveDate>,
    pub received_date: Option<DateTime<Utc>>,
    pub tax_amount: Option<Decimal>,
    pub shipping_cost: Option<Decimal>,
    pub notes: Option<String>,
    pub approved_by: Option<Uuid>,
    pub items: Option<Vec<ItemInput>>,
}

/// A purchase order with its supplier and items.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PurchaseOrderDetails {
    pub order: PurchaseOrderModel,
    pub supplier: SupplierModel,
    pub items: Vec<PurchaseOrderItemModel>,
}

/// Orchestrates the purchase order lifecycle: validation, the state machine
/// `Draft -> Ordered -> Received` (`Cancelled` from either non-terminal
/// state), and the atomic receive transition.
#[derive(Clone)]
pub struct PurchaseOrderService {
    db: Arc<DatabaseConnection>,
    repo: Arc<PurchaseOrderRepository>,
    numbering: Arc<OrderNumberAllocator>,
    reconciliation: ReconciliationEngine,
    event_sender: Option<EventSender>,
}

impl PurchaseOrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        repo: Arc<PurchaseOrderRepository>,
        numbering: Arc<OrderNumberAllocator>,
        reconciliation: ReconciliationEngine,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            db,
            repo,
            numbering,
            reconciliation,
            event_sender,
        }
    }

    /// Creates a purchase order in `Draft`, allocating its number and
    /// computing the total inside one transaction.
    #[instrument(skip(self, request), fields(supplier_id = %request.supplier_id))]
    pub async fn create(
        &self,
        request: CreatePurchaseOrder,
    ) -> Result<PurchaseOrderModel, ServiceError> {
        // Fail fast: every check happens before any write.
        self.check_item_values(&request.items)?;
        self.check_supplier(request.supplier_id).await?;
        self.check_sourcing(request.supplier_id, &request.items)
            .await?;

        let now = Utc::now();
        let total = items_total(&request.items) + request.tax_amount + request.shipping_cost;

        // Hold the allocator guard across count-and-insert so concurrent
        // creators cannot collide on the month sequence.
        let _numbering_guard = self.numbering.acquire().await;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let po_number = self.numbering.next_number(&txn, now).await?;

        let order = purchase_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            po_number: Set(po_number.clone()),
            supplier_id: Set(request.supplier_id),
            status: Set(PurchaseOrderStatus::Draft),
            order_date: Set(now),
            expected_date: Set(request.expected_date),
            received_date: Set(None),
            total_amount: Set(total),
            tax_amount: Set(request.tax_amount),
            shipping_cost: Set(request.shipping_cost),
            notes: Set(request.notes.clone()),
            created_by: Set(request.created_by),
            approved_by: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let saved = self
            .repo
            .insert_with_items(&txn, order, &request.items)
            .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        PO_CREATIONS.inc();
        info!(
            purchase_order_id = %saved.id,
            po_number,
            total_amount = %saved.total_amount,
            "purchase order created"
        );
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::PurchaseOrderCreated(saved.id)).await;
        }

        Ok(saved)
    }

    pub async fn get(&self, id: Uuid) -> Result<PurchaseOrderDetails, ServiceError> {
        let order = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("purchase order {} not found", id)))?;
        self.load_details(order).await
    }

    pub async fn get_by_number(&self, po_number: &str) -> Result<PurchaseOrderDetails, ServiceError> {
        let order = self.repo.find_by_number(po_number).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("purchase order {} not found", po_number))
        })?;
        self.load_details(order).await
    }

    /// Lists orders matching the filter, newest order date first.
    pub async fn list(
        &self,
        filter: &PurchaseOrderFilter,
    ) -> Result<Vec<PurchaseOrderModel>, ServiceError> {
        self.repo.list(filter).await
    }

    /// Applies a partial update. Status changes go through the state machine;
    /// `Received` triggers the full receive transition first. Item patches
    /// recompute the total before persisting.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        id: Uuid,
        patch: UpdatePurchaseOrder,
    ) -> Result<PurchaseOrderModel, ServiceError> {
        let mut order = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("purchase order {} not found", id)))?;

        // received_date tracks the status; it is only writable through the
        // receive transition, never as a free-standing field.
        if patch.received_date.is_some() && patch.status != Some(PurchaseOrderStatus::Received) {
            PO_VALIDATION_FAILURES.inc();
            return Err(ServiceError::ValidationError(
                "received_date can only be set by moving the status to received".to_string(),
            ));
        }

        if let Some(items) = &patch.items {
            self.check_item_values(items)?;
            self.check_sourcing(order.supplier_id, items).await?;
        }

        // A status patch to Received is the receive transition, stock effect
        // included; it must never reduce to a bare column write. Other status
        // changes are deferred into the patch transaction below.
        let mut deferred_status = None;
        if let Some(new_status) = &patch.status {
            if *new_status == PurchaseOrderStatus::Received
                && order.status != PurchaseOrderStatus::Received
            {
                order = self.receive(id, patch.received_date, None).await?;
            } else if *new_status != order.status {
                if !order.status.can_transition_to(new_status) {
                    return Err(ServiceError::InvalidOperation(format!(
                        "cannot move purchase order {} from {} to {}",
                        order.po_number, order.status, new_status
                    )));
                }
                deferred_status = Some(new_status.clone());
            }
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        // The status write shares the transaction with every other field
        // write, so a patch that fails mid-way leaves the status untouched.
        if let Some(status) = &deferred_status {
            let mut active: purchase_order::ActiveModel = order.clone().into();
            active.status = Set(status.clone());
            active.received_date = Set(None);
            active.updated_at = Set(Utc::now());
            order = active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        let tax = patch.tax_amount.unwrap_or(order.tax_amount);
        let shipping = patch.shipping_cost.unwrap_or(order.shipping_cost);

        let updated = if let Some(items) = &patch.items {
            self.repo
                .apply_items(&txn, &order, items, tax, shipping)
                .await?
        } else {
            // No item changes: the total still tracks the patched tax and
            // shipping against the stored item sum.
            let item_sum: Decimal = self
                .repo
                .find_items(&txn, order.id)
                .await?
                .iter()
                .map(|i| i.total_cost)
                .sum();
            let mut active: purchase_order::ActiveModel = order.clone().into();
            active.tax_amount = Set(tax);
            active.shipping_cost = Set(shipping);
            active.total_amount = Set(item_sum + tax + shipping);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await.map_err(ServiceError::db_error)?
        };

        let mut active: purchase_order::ActiveModel = updated.into();
        if let Some(expected) = patch.expected_date {
            active.expected_date = Set(Some(expected));
        }
        if let Some(notes) = patch.notes {
            active.notes = Set(Some(notes));
        }
        if let Some(approver) = patch.approved_by {
            active.approved_by = Set(Some(approver));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(purchase_order_id = %id, "purchase order updated");
        if let Some(sender) = &self.event_sender {
            if deferred_status == Some(PurchaseOrderStatus::Cancelled) {
                sender.send_or_log(Event::PurchaseOrderCancelled(id)).await;
            }
            sender.send_or_log(Event::PurchaseOrderUpdated(id)).await;
        }

        Ok(updated)
    }

    /// Deletes a draft order and its items. Any other status is a guard
    /// error, reported distinctly from not-found.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let order = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("purchase order {} not found", id)))?;

        if order.status != PurchaseOrderStatus::Draft {
            return Err(ServiceError::InvalidOperation(format!(
                "purchase order {} is {}; only draft orders can be deleted",
                order.po_number, order.status
            )));
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        self.repo.delete_with_items(&txn, id).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(purchase_order_id = %id, "purchase order deleted");
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::PurchaseOrderDeleted(id)).await;
        }
        Ok(())
    }

    /// The sole path that applies a received order to inventory. Permitted
    /// only from `Ordered`. Stock increments, movement records, the status
    /// write, and `received_date` commit as one transaction; on any failure
    /// the order stays `Ordered` and no inventory change is visible.
    #[instrument(skip(self))]
    pub async fn receive(
        &self,
        id: Uuid,
        received_date: Option<DateTime<Utc>>,
        received_by: Option<Uuid>,
    ) -> Result<PurchaseOrderModel, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        // Status is re-read inside the transaction so the guard, the stock
        // mutations, and the status write are linearizable as a unit.
        let order = PurchaseOrder::find_by_id(id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("purchase order {} not found", id)))?;

        if order.status != PurchaseOrderStatus::Ordered {
            return Err(ServiceError::InvalidOperation(format!(
                "purchase order {} is {}; only ordered orders can be received",
                order.po_number, order.status
            )));
        }

        let items = purchase_order_item::Entity::find()
            .filter(purchase_order_item::Column::PurchaseOrderId.eq(id))
            .order_by_asc(purchase_order_item::Column::CreatedAt)
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let acting_user = received_by.unwrap_or(order.created_by);
        let outcomes = self
            .reconciliation
            .apply_receipt(&txn, &order.po_number, &items, acting_user)
            .await
            .map_err(|e| {
                error!(purchase_order_id = %id, "receipt reconciliation failed: {}", e);
                e
            })?;

        // Full receipt: ordered quantity lands as received on every line.
        for item in &items {
            let mut active: purchase_order_item::ActiveModel = item.clone().into();
            active.quantity_received = Set(item.quantity);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        let when = received_date.unwrap_or_else(Utc::now);
        let mut active: purchase_order::ActiveModel = order.clone().into();
        active.status = Set(PurchaseOrderStatus::Received);
        active.received_date = Set(Some(when));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        PO_RECEIPTS.inc();
        let movements = outcomes
            .iter()
            .filter(|o| matches!(o, ItemReconciliation::Applied { .. }))
            .count();
        info!(
            purchase_order_id = %id,
            po_number = %updated.po_number,
            movements,
            "purchase order received"
        );
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PurchaseOrderReceived {
                    order_id: id,
                    po_number: updated.po_number.clone(),
                    movements,
                })
                .await;
            for outcome in &outcomes {
                if let ItemReconciliation::Applied {
                    variant_id,
                    quantity,
                } = outcome
                {
                    sender
                        .send_or_log(Event::StockRestocked {
                            variant_id: *variant_id,
                            quantity: *quantity,
                            po_number: updated.po_number.clone(),
                        })
                        .await;
                }
            }
        }

        Ok(updated)
    }

    /// Ordered orders whose expected date has passed.
    pub async fn get_overdue(&self) -> Result<Vec<PurchaseOrderModel>, ServiceError> {
        let today = Utc::now().date_naive();
        PurchaseOrder::find()
            .filter(purchase_order::Column::Status.eq(PurchaseOrderStatus::Ordered))
            .filter(purchase_order::Column::ExpectedDate.lt(today))
            .order_by_desc(purchase_order::Column::OrderDate)
            .all(self.repo.db())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Orders placed with the supplier and not yet received or cancelled.
    pub async fn get_pending(&self) -> Result<Vec<PurchaseOrderModel>, ServiceError> {
        PurchaseOrder::find()
            .filter(purchase_order::Column::Status.eq(PurchaseOrderStatus::Ordered))
            .order_by_desc(purchase_order::Column::OrderDate)
            .all(self.repo.db())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn load_details(
        &self,
        order: PurchaseOrderModel,
    ) -> Result<PurchaseOrderDetails, ServiceError> {
        let supplier = Supplier::find_by_id(order.supplier_id)
            .one(self.repo.db())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("supplier {} not found", order.supplier_id))
            })?;
        let items = self.repo.find_items(self.repo.db(), order.id).await?;
        Ok(PurchaseOrderDetails {
            order,
            supplier,
            items,
        })
    }

    fn check_item_values(&self, items: &[ItemInput]) -> Result<(), ServiceError> {
        for item in items {
            if item.quantity <= 0 {
                PO_VALIDATION_FAILURES.inc();
                return Err(ServiceError::ValidationError(format!(
                    "quantity must be positive for product {}",
                    item.product_id
                )));
            }
            if item.unit_cost <= Decimal::ZERO {
                PO_VALIDATION_FAILURES.inc();
                return Err(ServiceError::ValidationError(format!(
                    "unit cost must be positive for product {}",
                    item.product_id
                )));
            }
        }
        Ok(())
    }

    async fn check_supplier(&self, supplier_id: Uuid) -> Result<SupplierModel, ServiceError> {
        let found = Supplier::find_by_id(supplier_id)
            .one(self.repo.db())
            .await
            .map_err(ServiceError::db_error)?;

        match found {
            Some(s) if s.active => Ok(s),
            Some(s) => {
                PO_VALIDATION_FAILURES.inc();
                Err(ServiceError::ValidationError(format!(
                    "supplier {} is inactive",
                    s.name
                )))
            }
            None => {
                PO_VALIDATION_FAILURES.inc();
                Err(ServiceError::ValidationError(format!(
                    "supplier {} does not exist",
                    supplier_id
                )))
            }
        }
    }

    async fn check_sourcing(
        &self,
        supplier_id: Uuid,
        items: &[ItemInput],
    ) -> Result<(), ServiceError> {
        for item in items {
            let product = Product::find_by_id(item.product_id)
                .one(self.repo.db())
                .await
                .map_err(ServiceError::db_error)?;
            if product.is_none() {
                PO_VALIDATION_FAILURES.inc();
                return Err(ServiceError::ValidationError(format!(
                    "product {} does not exist",
                    item.product_id
                )));
            }

            let link = ProductSupplier::find_by_id((item.product_id, supplier_id))
                .one(self.repo.db())
                .await
                .map_err(ServiceError::db_error)?;
            if link.is_none() {
                PO_VALIDATION_FAILURES.inc();
                return Err(ServiceError::ValidationError(format!(
                    "product {} is not sourced from supplier {}",
                    item.product_id, supplier_id
                )));
            }
        }
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::purchase_order::{
    self, Entity as PurchaseOrder, Model as PurchaseOrderModel, PurchaseOrderStatus,
};
use crate::entities::purchase_order_item::{
    self, Entity as PurchaseOrderItem, Model as PurchaseOrderItemModel,
};
use crate::errors::ServiceError;
use crate::repositories::{BaseRepository, Repository};

/// Filters for listing purchase orders.
#[derive(Debug, Clone, Default)]
pub struct PurchaseOrderFilter {
    pub supplier_id: Option<Uuid>,
    pub status: Option<PurchaseOrderStatus>,
    pub order_date_from: Option<DateTime<Utc>>,
    pub order_date_to: Option<DateTime<Utc>>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
}

/// One requested line in a create or item-edit call. A present `id` patches
/// the existing item in place; an absent `id` inserts a new item.
#[derive(Debug, Clone)]
pub struct ItemInput {
    pub id: Option<Uuid>,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_cost: Decimal,
}

impl ItemInput {
    pub fn line_total(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_cost
    }
}

/// Sum of `quantity * unit_cost` over a requested item set.
pub fn items_total(items: &[ItemInput]) -> Decimal {
    items.iter().map(ItemInput::line_total).sum()
}

/// Persistence boundary for purchase orders and their items.
///
/// Mutating operations take a caller-provided connection so the lifecycle
/// service can scope them inside one transaction.
#[derive(Debug)]
pub struct PurchaseOrderRepository {
    base: BaseRepository,
}

impl PurchaseOrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<PurchaseOrderModel>, ServiceError> {
        PurchaseOrder::find_by_id(id)
            .one(self.db())
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn find_by_number(
        &self,
        po_number: &str,
    ) -> Result<Option<PurchaseOrderModel>, ServiceError> {
        PurchaseOrder::find()
            .filter(purchase_order::Column::PoNumber.eq(po_number))
            .one(self.db())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Items of one order, on the caller's connection so reads inside an
    /// open transaction see that transaction and never re-enter the pool.
    pub async fn find_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<Vec<PurchaseOrderItemModel>, ServiceError> {
        PurchaseOrderItem::find()
            .filter(purchase_order_item::Column::PurchaseOrderId.eq(order_id))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Lists purchase orders matching the filter, newest order date first.
    pub async fn list(
        &self,
        filter: &PurchaseOrderFilter,
    ) -> Result<Vec<PurchaseOrderModel>, ServiceError> {
        let mut query = PurchaseOrder::find();

        if let Some(supplier_id) = filter.supplier_id {
            query = query.filter(purchase_order::Column::SupplierId.eq(supplier_id));
        }
        if let Some(status) = &filter.status {
            query = query.filter(purchase_order::Column::Status.eq(status.clone()));
        }
        if let Some(from) = filter.order_date_from {
            query = query.filter(purchase_order::Column::OrderDate.gte(from));
        }
        if let Some(to) = filter.order_date_to {
            query = query.filter(purchase_order::Column::OrderDate.lte(to));
        }
        if let Some(min) = filter.min_amount {
            query = query.filter(purchase_order::Column::TotalAmount.gte(min));
        }
        if let Some(max) = filter.max_amount {
            query = query.filter(purchase_order::Column::TotalAmount.lte(max));
        }

        query
            .order_by_desc(purchase_order::Column::OrderDate)
            .all(self.db())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Inserts an order row and its item rows on the given connection.
    pub async fn insert_with_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: purchase_order::ActiveModel,
        items: &[ItemInput],
    ) -> Result<PurchaseOrderModel, ServiceError> {
        let saved = order.insert(conn).await.map_err(ServiceError::db_error)?;

        for item in items {
            let now = Utc::now();
            purchase_order_item::ActiveModel {
                id: Set(item.id.unwrap_or_else(Uuid::new_v4)),
                purchase_order_id: Set(saved.id),
                product_id: Set(item.product_id),
                variant_id: Set(item.variant_id),
                quantity: Set(item.quantity),
                unit_cost: Set(item.unit_cost),
                total_cost: Set(item.line_total()),
                quantity_received: Set(0),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?;
        }

        Ok(saved)
    }

    /// Applies an item edit as an explicit diff and recomputes the order
    /// total, all on the caller's connection.
    ///
    /// Items whose `id` matches an existing row are updated in place (so
    /// per-item state such as `quantity_received` survives edits); inputs
    /// without an id are inserted; existing rows absent from the input are
    /// deleted. The order row's `total_amount` is rewritten as
    /// `items_total + tax_amount + shipping_cost`.
    pub async fn apply_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: &PurchaseOrderModel,
        items: &[ItemInput],
        tax_amount: Decimal,
        shipping_cost: Decimal,
    ) -> Result<PurchaseOrderModel, ServiceError> {
        let existing = PurchaseOrderItem::find()
            .filter(purchase_order_item::Column::PurchaseOrderId.eq(order.id))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        let existing_by_id: HashMap<Uuid, PurchaseOrderItemModel> =
            existing.iter().map(|i| (i.id, i.clone())).collect();
        let kept_ids: HashSet<Uuid> = items.iter().filter_map(|i| i.id).collect();
        let now = Utc::now();

        for input in items {
            match input.id.and_then(|id| existing_by_id.get(&id)).cloned() {
                Some(current) => {
                    let mut active: purchase_order_item::ActiveModel = current.into();
                    active.product_id = Set(input.product_id);
                    active.variant_id = Set(input.variant_id);
                    active.quantity = Set(input.quantity);
                    active.unit_cost = Set(input.unit_cost);
                    active.total_cost = Set(input.line_total());
                    active.updated_at = Set(now);
                    active.update(conn).await.map_err(ServiceError::db_error)?;
                }
                None => {
                    purchase_order_item::ActiveModel {
                        id: Set(input.id.unwrap_or_else(Uuid::new_v4)),
                        purchase_order_id: Set(order.id),
                        product_id: Set(input.product_id),
                        variant_id: Set(input.variant_id),
                        quantity: Set(input.quantity),
                        unit_cost: Set(input.unit_cost),
                        total_cost: Set(input.line_total()),
                        quantity_received: Set(0),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(conn)
                    .await
                    .map_err(ServiceError::db_error)?;
                }
            }
        }

        let removed: Vec<Uuid> = existing_by_id
            .keys()
            .filter(|id| !kept_ids.contains(id))
            .copied()
            .collect();
        if !removed.is_empty() {
            PurchaseOrderItem::delete_many()
                .filter(purchase_order_item::Column::Id.is_in(removed))
                .exec(conn)
                .await
                .map_err(ServiceError::db_error)?;
        }

        let total = items_total(items) + tax_amount + shipping_cost;
        let mut active: purchase_order::ActiveModel = order.clone().into();
        active.total_amount = Set(total);
        active.tax_amount = Set(tax_amount);
        active.shipping_cost = Set(shipping_cost);
        active.updated_at = Set(now);
        active.update(conn).await.map_err(ServiceError::db_error)
    }

    /// Deletes the order and its items on the caller's connection. State
    /// guards live in the lifecycle service.
    pub async fn delete_with_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        PurchaseOrderItem::delete_many()
            .filter(purchase_order_item::Column::PurchaseOrderId.eq(order_id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        PurchaseOrder::delete_by_id(order_id)
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(())
    }
}

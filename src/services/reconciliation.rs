use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::entities::product_variant::{self, Entity as ProductVariant};
use crate::entities::purchase_order_item::Model as PurchaseOrderItemModel;
use crate::entities::stock_movement::{self, MOVEMENT_RESTOCK};
use crate::errors::ServiceError;

/// How to resolve the target variant when a received item does not name one.
///
/// `RequireExplicit` rejects ambiguous (multi-variant) and variant-less
/// products outright, so a receipt can never silently credit the wrong
/// variant or skip stock. `FirstVariant` reproduces the legacy behavior:
/// first variant on ambiguity, warn-and-skip when the product has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantResolution {
    RequireExplicit,
    FirstVariant,
}

/// Outcome of reconciling one order item.
#[derive(Debug, Clone)]
pub enum ItemReconciliation {
    Applied { variant_id: Uuid, quantity: i32 },
    SkippedNoVariant { product_id: Uuid },
}

/// Applies a received order's stock effect: per resolvable item, one relative
/// stock increment and one immutable movement record, all on the caller's
/// transaction. The caller owns commit/rollback, so a failure on any item
/// rolls back every increment and movement at once.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    resolution: VariantResolution,
}

impl ReconciliationEngine {
    pub fn new(resolution: VariantResolution) -> Self {
        Self { resolution }
    }

    pub fn resolution(&self) -> VariantResolution {
        self.resolution
    }

    #[instrument(skip(self, conn, items), fields(item_count = items.len()))]
    pub async fn apply_receipt<C: ConnectionTrait>(
        &self,
        conn: &C,
        po_number: &str,
        items: &[PurchaseOrderItemModel],
        acting_user: Uuid,
    ) -> Result<Vec<ItemReconciliation>, ServiceError> {
        let mut outcomes = Vec::with_capacity(items.len());

        for item in items {
            let variant_id = match self.resolve_variant(conn, item).await? {
                Some(id) => id,
                None => {
                    warn!(
                        product_id = %item.product_id,
                        po_number,
                        "product has no variants; stock not adjusted for this line"
                    );
                    outcomes.push(ItemReconciliation::SkippedNoVariant {
                        product_id: item.product_id,
                    });
                    continue;
                }
            };

            self.increment_stock(conn, variant_id, item.quantity).await?;
            self.record_movement(conn, variant_id, item.quantity, po_number, acting_user)
                .await?;

            outcomes.push(ItemReconciliation::Applied {
                variant_id,
                quantity: item.quantity,
            });
        }

        Ok(outcomes)
    }

    /// Resolves the stock-bearing variant for an item. `Ok(None)` means the
    /// product has no variants and policy allows skipping the line.
    async fn resolve_variant<C: ConnectionTrait>(
        &self,
        conn: &C,
        item: &PurchaseOrderItemModel,
    ) -> Result<Option<Uuid>, ServiceError> {
        if let Some(variant_id) = item.variant_id {
            let exists = ProductVariant::find_by_id(variant_id)
                .one(conn)
                .await
                .map_err(ServiceError::db_error)?;
            return match exists {
                Some(v) => Ok(Some(v.id)),
                None => Err(ServiceError::InventoryError(format!(
                    "variant {} referenced by order item {} does not exist",
                    variant_id, item.id
                ))),
            };
        }

        let variants = ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(item.product_id))
            .order_by_asc(product_variant::Column::CreatedAt)
            .order_by_asc(product_variant::Column::Id)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        match (variants.len(), self.resolution) {
            (0, VariantResolution::RequireExplicit) => Err(ServiceError::InventoryError(format!(
                "product {} has no stock-bearing variant to receive into",
                item.product_id
            ))),
            (0, VariantResolution::FirstVariant) => Ok(None),
            (1, _) => Ok(Some(variants[0].id)),
            (_, VariantResolution::RequireExplicit) => {
                Err(ServiceError::InventoryError(format!(
                    "product {} has multiple variants; the order item must name one",
                    item.product_id
                )))
            }
            (_, VariantResolution::FirstVariant) => {
                warn!(
                    product_id = %item.product_id,
                    chosen_variant = %variants[0].id,
                    "multiple variants and none specified; defaulting to first"
                );
                Ok(Some(variants[0].id))
            }
        }
    }

    /// Relative delta applied in SQL, never read-modify-write, so concurrent
    /// receivers of other orders cannot lose updates on the same variant.
    async fn increment_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let result = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).add(quantity),
            )
            .col_expr(
                product_variant::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(product_variant::Column::Id.eq(variant_id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected != 1 {
            return Err(ServiceError::InventoryError(format!(
                "stock update touched {} rows for variant {}",
                result.rows_affected, variant_id
            )));
        }
        Ok(())
    }

    async fn record_movement<C: ConnectionTrait>(
        &self,
        conn: &C,
        variant_id: Uuid,
        quantity: i32,
        po_number: &str,
        acting_user: Uuid,
    ) -> Result<(), ServiceError> {
        stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            variant_id: Set(variant_id),
            movement_type: Set(MOVEMENT_RESTOCK.to_string()),
            quantity: Set(quantity),
            reason: Set(format!("Received purchase order {}", po_number)),
            notes: Set(None),
            created_by: Set(acting_user),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;
        Ok(())
    }
}

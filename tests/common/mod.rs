#![allow(dead_code)]

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use std::sync::Arc;
use uuid::Uuid;

use backoffice_api::db::{self, DbConfig, DbPool};
use backoffice_api::entities::purchase_order::{Model as PurchaseOrderModel, PurchaseOrderStatus};
use backoffice_api::entities::{product, product_supplier, product_variant, supplier};
use backoffice_api::repositories::{ItemInput, PurchaseOrderRepository};
use backoffice_api::services::order_numbering::OrderNumberAllocator;
use backoffice_api::services::purchase_orders::{
    CreatePurchaseOrder, PurchaseOrderService, UpdatePurchaseOrder,
};
use backoffice_api::services::reconciliation::{ReconciliationEngine, VariantResolution};
use backoffice_api::services::summary::SummaryService;

/// In-memory SQLite harness with the full service graph wired the same way
/// as the composition root.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub repo: Arc<PurchaseOrderRepository>,
    pub purchase_orders: PurchaseOrderService,
    pub summary: SummaryService,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_resolution(VariantResolution::RequireExplicit).await
    }

    pub async fn with_resolution(resolution: VariantResolution) -> Self {
        // A pooled in-memory SQLite hands each connection its own database;
        // pin the pool to one connection so every query sees the same state.
        let config = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&config)
            .await
            .expect("sqlite in-memory connection");
        db::setup_schema(&pool).await.expect("schema setup");
        let pool = Arc::new(pool);

        let repo = Arc::new(PurchaseOrderRepository::new(pool.clone()));
        let purchase_orders = PurchaseOrderService::new(
            pool.clone(),
            repo.clone(),
            Arc::new(OrderNumberAllocator::new()),
            ReconciliationEngine::new(resolution),
            None,
        );
        let summary = SummaryService::new(pool.clone());

        Self {
            db: pool,
            repo,
            purchase_orders,
            summary,
        }
    }

    pub async fn seed_supplier(&self, name: &str, active: bool) -> supplier::Model {
        supplier::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            contact_email: Set(None),
            active: Set(active),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed supplier")
    }

    pub async fn seed_product(&self, name: &str, sku: &str) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            sku: Set(sku.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_variant(
        &self,
        product_id: Uuid,
        sku: &str,
        stock: i32,
    ) -> product_variant::Model {
        let now = Utc::now();
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            sku: Set(sku.to_string()),
            stock: Set(stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed variant")
    }

    pub async fn link_sourcing(&self, product_id: Uuid, supplier_id: Uuid) {
        product_supplier::ActiveModel {
            product_id: Set(product_id),
            supplier_id: Set(supplier_id),
        }
        .insert(&*self.db)
        .await
        .expect("seed sourcing link");
    }

    /// Supplier + one product with a single stocked variant + sourcing link.
    pub async fn seed_sourced_product(
        &self,
        supplier_id: Uuid,
        name: &str,
        sku: &str,
        stock: i32,
    ) -> (product::Model, product_variant::Model) {
        let product = self.seed_product(name, sku).await;
        let variant = self
            .seed_variant(product.id, &format!("{}-V1", sku), stock)
            .await;
        self.link_sourcing(product.id, supplier_id).await;
        (product, variant)
    }
}

pub fn dec(value: &str) -> Decimal {
    value.parse().expect("decimal literal")
}

pub fn item(product_id: Uuid, variant_id: Option<Uuid>, quantity: i32, unit_cost: &str) -> ItemInput {
    ItemInput {
        id: None,
        product_id,
        variant_id,
        quantity,
        unit_cost: dec(unit_cost),
    }
}

pub fn create_request(supplier_id: Uuid, items: Vec<ItemInput>) -> CreatePurchaseOrder {
    CreatePurchaseOrder {
        supplier_id,
        expected_date: None,
        tax_amount: Decimal::ZERO,
        shipping_cost: Decimal::ZERO,
        notes: None,
        created_by: Uuid::nil(),
        items,
    }
}

/// Moves a draft order to `Ordered` through the same update path the API uses.
pub async fn mark_ordered(app: &TestApp, id: Uuid) -> PurchaseOrderModel {
    app.purchase_orders
        .update(
            id,
            UpdatePurchaseOrder {
                status: Some(PurchaseOrderStatus::Ordered),
                ..Default::default()
            },
        )
        .await
        .expect("draft order moves to ordered")
}

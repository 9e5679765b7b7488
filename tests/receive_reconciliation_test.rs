mod common;

use assert_matches::assert_matches;
use sea_orm::EntityTrait;
use uuid::Uuid;

use backoffice_api::entities::product_variant::Entity as ProductVariant;
use backoffice_api::entities::purchase_order::PurchaseOrderStatus;
use backoffice_api::entities::stock_movement::{self, Entity as StockMovement, MOVEMENT_RESTOCK};
use backoffice_api::errors::ServiceError;
use backoffice_api::services::purchase_orders::UpdatePurchaseOrder;
use backoffice_api::services::reconciliation::VariantResolution;

use common::{create_request, item, mark_ordered, TestApp};

async fn stock_of(app: &TestApp, variant_id: Uuid) -> i32 {
    ProductVariant::find_by_id(variant_id)
        .one(&*app.db)
        .await
        .unwrap()
        .expect("variant exists")
        .stock
}

async fn movements(app: &TestApp) -> Vec<stock_movement::Model> {
    StockMovement::find().all(&*app.db).await.unwrap()
}

#[tokio::test]
async fn receiving_applies_stock_movements_and_status_atomically() {
    let app = TestApp::new().await;
    let supplier = app.seed_supplier("Acme Wholesale", true).await;
    let (widget, widget_variant) = app
        .seed_sourced_product(supplier.id, "Widget", "WID", 10)
        .await;
    let (gadget, gadget_variant) = app
        .seed_sourced_product(supplier.id, "Gadget", "GAD", 0)
        .await;

    let order = app
        .purchase_orders
        .create(create_request(
            supplier.id,
            vec![
                item(widget.id, None, 5, "10.00"),
                item(gadget.id, None, 2, "25.00"),
            ],
        ))
        .await
        .unwrap();
    mark_ordered(&app, order.id).await;

    let received = app
        .purchase_orders
        .receive(order.id, None, None)
        .await
        .unwrap();

    assert_eq!(received.status, PurchaseOrderStatus::Received);
    assert!(received.received_date.is_some());

    assert_eq!(stock_of(&app, widget_variant.id).await, 15);
    assert_eq!(stock_of(&app, gadget_variant.id).await, 2);

    let movements = movements(&app).await;
    assert_eq!(movements.len(), 2);
    for movement in &movements {
        assert_eq!(movement.movement_type, MOVEMENT_RESTOCK);
        assert!(movement.reason.contains(&received.po_number));
    }
    let widget_movement = movements
        .iter()
        .find(|m| m.variant_id == widget_variant.id)
        .unwrap();
    assert_eq!(widget_movement.quantity, 5);

    let items = app.repo.find_items(&*app.db, order.id).await.unwrap();
    assert!(items.iter().all(|i| i.quantity_received == i.quantity));
}

#[tokio::test]
async fn receiving_requires_an_ordered_status() {
    let app = TestApp::new().await;
    let supplier = app.seed_supplier("Acme Wholesale", true).await;
    let (widget, variant) = app
        .seed_sourced_product(supplier.id, "Widget", "WID", 10)
        .await;

    let order = app
        .purchase_orders
        .create(create_request(
            supplier.id,
            vec![item(widget.id, None, 5, "10.00")],
        ))
        .await
        .unwrap();

    let refused = app.purchase_orders.receive(order.id, None, None).await;
    assert_matches!(refused, Err(ServiceError::InvalidOperation(_)));

    assert_eq!(stock_of(&app, variant.id).await, 10);
    assert!(movements(&app).await.is_empty());

    let current = app.repo.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(current.status, PurchaseOrderStatus::Draft);
    assert_eq!(current.received_date, None);

    let missing = app.purchase_orders.receive(Uuid::new_v4(), None, None).await;
    assert_matches!(missing, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn a_second_receive_changes_nothing() {
    let app = TestApp::new().await;
    let supplier = app.seed_supplier("Acme Wholesale", true).await;
    let (widget, variant) = app
        .seed_sourced_product(supplier.id, "Widget", "WID", 0)
        .await;

    let order = app
        .purchase_orders
        .create(create_request(
            supplier.id,
            vec![item(widget.id, None, 5, "10.00")],
        ))
        .await
        .unwrap();
    mark_ordered(&app, order.id).await;
    app.purchase_orders.receive(order.id, None, None).await.unwrap();

    let again = app.purchase_orders.receive(order.id, None, None).await;
    assert_matches!(again, Err(ServiceError::InvalidOperation(_)));

    assert_eq!(stock_of(&app, variant.id).await, 5);
    assert_eq!(movements(&app).await.len(), 1);

    // Received is terminal for deletion too.
    let deleted = app.purchase_orders.delete(order.id).await;
    assert_matches!(deleted, Err(ServiceError::InvalidOperation(_)));
    assert!(app.repo.find_by_id(order.id).await.unwrap().is_some());
}

#[tokio::test]
async fn a_status_patch_to_received_runs_the_full_receipt() {
    let app = TestApp::new().await;
    let supplier = app.seed_supplier("Acme Wholesale", true).await;
    let (widget, variant) = app
        .seed_sourced_product(supplier.id, "Widget", "WID", 3)
        .await;

    let order = app
        .purchase_orders
        .create(create_request(
            supplier.id,
            vec![item(widget.id, None, 4, "10.00")],
        ))
        .await
        .unwrap();
    mark_ordered(&app, order.id).await;

    let updated = app
        .purchase_orders
        .update(
            order.id,
            UpdatePurchaseOrder {
                status: Some(PurchaseOrderStatus::Received),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.status, PurchaseOrderStatus::Received);
    assert!(updated.received_date.is_some());
    assert_eq!(stock_of(&app, variant.id).await, 7);
    assert_eq!(movements(&app).await.len(), 1);
}

#[tokio::test]
async fn an_unresolvable_line_rolls_back_the_whole_receipt() {
    let app = TestApp::new().await;
    let supplier = app.seed_supplier("Acme Wholesale", true).await;
    let (widget, widget_variant) = app
        .seed_sourced_product(supplier.id, "Widget", "WID", 10)
        .await;

    // Two variants and no explicit choice is ambiguous under RequireExplicit.
    let shirt = app.seed_product("Shirt", "SHI").await;
    let small = app.seed_variant(shirt.id, "SHI-S", 0).await;
    let large = app.seed_variant(shirt.id, "SHI-L", 0).await;
    app.link_sourcing(shirt.id, supplier.id).await;

    let order = app
        .purchase_orders
        .create(create_request(
            supplier.id,
            vec![
                item(widget.id, None, 5, "10.00"),
                item(shirt.id, None, 3, "8.00"),
            ],
        ))
        .await
        .unwrap();
    mark_ordered(&app, order.id).await;

    let refused = app.purchase_orders.receive(order.id, None, None).await;
    assert_matches!(refused, Err(ServiceError::InventoryError(_)));

    // All or nothing: the resolvable widget line must not stick either.
    assert_eq!(stock_of(&app, widget_variant.id).await, 10);
    assert_eq!(stock_of(&app, small.id).await, 0);
    assert_eq!(stock_of(&app, large.id).await, 0);
    assert!(movements(&app).await.is_empty());

    let current = app.repo.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(current.status, PurchaseOrderStatus::Ordered);
    let items = app.repo.find_items(&*app.db, order.id).await.unwrap();
    assert!(items.iter().all(|i| i.quantity_received == 0));
}

#[tokio::test]
async fn an_explicit_variant_is_credited_even_when_ambiguous() {
    let app = TestApp::new().await;
    let supplier = app.seed_supplier("Acme Wholesale", true).await;
    let shirt = app.seed_product("Shirt", "SHI").await;
    let small = app.seed_variant(shirt.id, "SHI-S", 1).await;
    let large = app.seed_variant(shirt.id, "SHI-L", 1).await;
    app.link_sourcing(shirt.id, supplier.id).await;

    let order = app
        .purchase_orders
        .create(create_request(
            supplier.id,
            vec![item(shirt.id, Some(large.id), 6, "8.00")],
        ))
        .await
        .unwrap();
    mark_ordered(&app, order.id).await;
    app.purchase_orders.receive(order.id, None, None).await.unwrap();

    assert_eq!(stock_of(&app, large.id).await, 7);
    assert_eq!(stock_of(&app, small.id).await, 1);
}

#[tokio::test]
async fn a_dangling_variant_reference_is_an_inventory_error() {
    let app = TestApp::new().await;
    let supplier = app.seed_supplier("Acme Wholesale", true).await;
    let (widget, variant) = app
        .seed_sourced_product(supplier.id, "Widget", "WID", 0)
        .await;

    let order = app
        .purchase_orders
        .create(create_request(
            supplier.id,
            vec![item(widget.id, Some(Uuid::new_v4()), 5, "10.00")],
        ))
        .await
        .unwrap();
    mark_ordered(&app, order.id).await;

    let refused = app.purchase_orders.receive(order.id, None, None).await;
    assert_matches!(refused, Err(ServiceError::InventoryError(_)));
    assert_eq!(stock_of(&app, variant.id).await, 0);
}

#[tokio::test]
async fn first_variant_policy_defaults_and_skips_variantless_products() {
    let app = TestApp::with_resolution(VariantResolution::FirstVariant).await;
    let supplier = app.seed_supplier("Acme Wholesale", true).await;

    let shirt = app.seed_product("Shirt", "SHI").await;
    let first = app.seed_variant(shirt.id, "SHI-S", 0).await;
    let second = app.seed_variant(shirt.id, "SHI-L", 0).await;
    app.link_sourcing(shirt.id, supplier.id).await;

    let service_plan = app.seed_product("Service Plan", "SVC").await;
    app.link_sourcing(service_plan.id, supplier.id).await;

    let order = app
        .purchase_orders
        .create(create_request(
            supplier.id,
            vec![
                item(shirt.id, None, 3, "8.00"),
                item(service_plan.id, None, 1, "99.00"),
            ],
        ))
        .await
        .unwrap();
    mark_ordered(&app, order.id).await;

    let received = app
        .purchase_orders
        .receive(order.id, None, None)
        .await
        .unwrap();
    assert_eq!(received.status, PurchaseOrderStatus::Received);

    // Ambiguity falls back to the first variant; the variant-less line is
    // skipped without blocking the receipt.
    assert_eq!(stock_of(&app, first.id).await, 3);
    assert_eq!(stock_of(&app, second.id).await, 0);
    assert_eq!(movements(&app).await.len(), 1);
}

#[tokio::test]
async fn require_explicit_rejects_variantless_products() {
    let app = TestApp::new().await;
    let supplier = app.seed_supplier("Acme Wholesale", true).await;
    let service_plan = app.seed_product("Service Plan", "SVC").await;
    app.link_sourcing(service_plan.id, supplier.id).await;

    let order = app
        .purchase_orders
        .create(create_request(
            supplier.id,
            vec![item(service_plan.id, None, 1, "99.00")],
        ))
        .await
        .unwrap();
    mark_ordered(&app, order.id).await;

    let refused = app.purchase_orders.receive(order.id, None, None).await;
    assert_matches!(refused, Err(ServiceError::InventoryError(_)));
    assert!(movements(&app).await.is_empty());
}

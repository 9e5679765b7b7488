use axum::{
    extract::{Json, Path, Query, State},
    routing::{delete, get, post, put},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::entities::purchase_order::PurchaseOrderStatus;
use crate::handlers::{created_response, success_response, validate_input};
use crate::repositories::{ItemInput, PurchaseOrderFilter};
use crate::services::purchase_orders::{CreatePurchaseOrder, UpdatePurchaseOrder};
use crate::AppState;

/// Placeholder actor recorded when the boundary supplies no user context.
const SYSTEM_USER: Uuid = Uuid::nil();

// Request DTOs

// Serialize as well: validator embeds offending values in error params.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct PurchaseOrderItemRequest {
    /// Present when patching an existing item; absent for new items.
    pub id: Option<Uuid>,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub unit_cost: Decimal,
}

impl From<PurchaseOrderItemRequest> for ItemInput {
    fn from(req: PurchaseOrderItemRequest) -> Self {
        ItemInput {
            id: req.id,
            product_id: req.product_id,
            variant_id: req.variant_id,
            quantity: req.quantity,
            unit_cost: req.unit_cost,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePurchaseOrderRequest {
    pub supplier_id: Uuid,
    pub expected_date: Option<NaiveDate>,
    pub tax_amount: Option<Decimal>,
    pub shipping_cost: Option<Decimal>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<PurchaseOrderItemRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePurchaseOrderRequest {
    pub status: Option<String>,
    pub expected_date: Option<NaiveDate>,
    pub received_date: Option<DateTime<Utc>>,
    pub tax_amount: Option<Decimal>,
    pub shipping_cost: Option<Decimal>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    pub approved_by: Option<Uuid>,
    pub items: Option<Vec<PurchaseOrderItemRequest>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReceivePurchaseOrderRequest {
    pub received_date: Option<DateTime<Utc>>,
    pub received_by: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ListPurchaseOrdersParams {
    pub supplier_id: Option<Uuid>,
    pub status: Option<String>,
    pub order_date_from: Option<DateTime<Utc>>,
    pub order_date_to: Option<DateTime<Utc>>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
}

fn parse_status(raw: &str) -> Result<PurchaseOrderStatus, ServiceError> {
    PurchaseOrderStatus::parse(raw).ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "unknown status '{}'; expected draft, ordered, received or cancelled",
            raw
        ))
    })
}

// Handler functions

/// List purchase orders, newest order date first.
pub async fn list_purchase_orders(
    State(state): State<AppState>,
    Query(params): Query<ListPurchaseOrdersParams>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let status = params.status.as_deref().map(parse_status).transpose()?;

    let filter = PurchaseOrderFilter {
        supplier_id: params.supplier_id,
        status,
        order_date_from: params.order_date_from,
        order_date_to: params.order_date_to,
        min_amount: params.min_amount,
        max_amount: params.max_amount,
    };

    let orders = state.purchase_orders.list(&filter).await?;
    Ok(success_response(orders))
}

/// Fetch one purchase order with supplier and items.
pub async fn get_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let details = state.purchase_orders.get(id).await?;
    Ok(success_response(details))
}

/// Fetch one purchase order addressed by its human-readable number.
pub async fn get_purchase_order_by_number(
    State(state): State<AppState>,
    Path(po_number): Path<String>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let details = state.purchase_orders.get_by_number(&po_number).await?;
    Ok(success_response(details))
}

/// Create a purchase order in draft.
pub async fn create_purchase_order(
    State(state): State<AppState>,
    Json(payload): Json<CreatePurchaseOrderRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let request = CreatePurchaseOrder {
        supplier_id: payload.supplier_id,
        expected_date: payload.expected_date,
        tax_amount: payload.tax_amount.unwrap_or(Decimal::ZERO),
        shipping_cost: payload.shipping_cost.unwrap_or(Decimal::ZERO),
        notes: payload.notes,
        created_by: payload.created_by.unwrap_or(SYSTEM_USER),
        items: payload.items.into_iter().map(Into::into).collect(),
    };

    let order = state.purchase_orders.create(request).await?;
    Ok(created_response(order))
}

/// Partially update a purchase order. Setting `status` to `received` runs
/// the full receive transition, stock effect included.
pub async fn update_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePurchaseOrderRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let status = payload.status.as_deref().map(parse_status).transpose()?;

    let patch = UpdatePurchaseOrder {
        status,
        expected_date: payload.expected_date,
        received_date: payload.received_date,
        tax_amount: payload.tax_amount,
        shipping_cost: payload.shipping_cost,
        notes: payload.notes,
        approved_by: payload.approved_by,
        items: payload
            .items
            .map(|items| items.into_iter().map(Into::into).collect()),
    };

    let order = state.purchase_orders.update(id, patch).await?;
    Ok(success_response(order))
}

/// Delete a draft purchase order and its items.
pub async fn delete_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    state.purchase_orders.delete(id).await?;
    Ok(success_response(serde_json::json!({ "deleted": id })))
}

/// Receive an ordered purchase order: stock, movements, status and
/// received date commit atomically.
pub async fn receive_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<ReceivePurchaseOrderRequest>>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let request = payload.map(|Json(p)| p).unwrap_or_default();
    let order = state
        .purchase_orders
        .receive(id, request.received_date, request.received_by)
        .await?;
    Ok(success_response(order))
}

/// Counts and totals per status plus pending value.
pub async fn get_purchase_order_summary(
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let summary = state.summary.purchase_order_summary().await?;
    Ok(success_response(summary))
}

/// Ordered purchase orders past their expected date.
pub async fn get_overdue_purchase_orders(
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let orders = state.purchase_orders.get_overdue().await?;
    Ok(success_response(orders))
}

/// Purchase orders currently with the supplier.
pub async fn get_pending_purchase_orders(
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let orders = state.purchase_orders.get_pending().await?;
    Ok(success_response(orders))
}

/// Creates the router for purchase order endpoints.
pub fn purchase_order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_purchase_orders))
        .route("/", post(create_purchase_order))
        .route("/summary", get(get_purchase_order_summary))
        .route("/overdue", get(get_overdue_purchase_orders))
        .route("/pending", get(get_pending_purchase_orders))
        .route("/number/:po_number", get(get_purchase_order_by_number))
        .route("/:id", get(get_purchase_order))
        .route("/:id", put(update_purchase_order))
        .route("/:id", delete(delete_purchase_order))
        .route("/:id/receive", post(receive_purchase_order))
}

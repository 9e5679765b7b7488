//! Backoffice API Library
//!
//! Retail back-office procurement core: the purchase order lifecycle and its
//! transactional effect on inventory, exposed over a thin HTTP boundary.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod repositories;
pub mod services;

use axum::Router;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use repositories::PurchaseOrderRepository;
use services::order_numbering::OrderNumberAllocator;
use services::purchase_orders::PurchaseOrderService;
use services::reconciliation::{ReconciliationEngine, VariantResolution};
use services::summary::SummaryService;

/// Application state: explicitly constructed services, injected at the
/// composition root. No process-wide statics.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub purchase_orders: Arc<PurchaseOrderService>,
    pub summary: Arc<SummaryService>,
}

impl AppState {
    /// Wires the full service graph over one database pool.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
        resolution: VariantResolution,
    ) -> Self {
        let repo = Arc::new(PurchaseOrderRepository::new(db.clone()));
        let numbering = Arc::new(OrderNumberAllocator::new());
        let reconciliation = ReconciliationEngine::new(resolution);
        let purchase_orders = Arc::new(PurchaseOrderService::new(
            db.clone(),
            repo,
            numbering,
            reconciliation,
            Some(event_sender.clone()),
        ));
        let summary = Arc::new(SummaryService::new(db.clone()));

        Self {
            db,
            config,
            event_sender,
            purchase_orders,
            summary,
        }
    }
}

/// Builds the application router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api/v1/purchase-orders",
            handlers::purchase_orders::purchase_order_routes(),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

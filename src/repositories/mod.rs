use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub mod purchase_order_repository;

pub use purchase_order_repository::{ItemInput, PurchaseOrderFilter, PurchaseOrderRepository};

/// Repository trait for common database operations.
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[derive(Debug)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl Repository for BaseRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

pub mod order_numbering;
pub mod purchase_orders;
pub mod reconciliation;
pub mod summary;

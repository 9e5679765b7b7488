pub mod product;
pub mod product_supplier;
pub mod product_variant;
pub mod purchase_order;
pub mod purchase_order_item;
pub mod stock_movement;
pub mod supplier;

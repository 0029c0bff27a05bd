//! sea-orm entities for the warehouse/production schema.
//!
//! Item stock counters are mutated only through the ledger and reservation
//! primitives in `services`; everything else treats them as read-only.

pub mod item;
pub mod production_request;
pub mod production_request_material;
pub mod purchase_order;
pub mod purchase_order_line;
pub mod stock_history;
pub mod stock_transaction;
pub mod waste_stock;
pub mod work_order;
pub mod work_order_line;

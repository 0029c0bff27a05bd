// Stock primitives: the only code allowed to touch the item counters.
pub mod reservation;
pub mod stock_ledger;

// Workflow services, one transaction per operation.
pub mod production;
pub mod purchasing;
pub mod recycling;
pub mod work_orders;

// Shared helpers.
pub mod catalog;
pub mod matching;

pub use production::ProductionService;
pub use purchasing::PurchasingService;
pub use recycling::RecyclingService;
pub use work_orders::WorkOrderService;

//! gudang-core: the stock reservation and fulfillment engine of a
//! warehouse/production ERP.
//!
//! Physical stock (`current_stock`), soft-reserved stock (`reserved_stock`)
//! and the work-order line state machine move in lockstep across several
//! independent workflows — order creation, cancellation, production
//! progress, vendor receipt, waste recycling — each wrapped in its own
//! database transaction. Correctness rests on every call site going
//! through the same primitives in [`services::reservation`] and
//! [`services::stock_ledger`], whose arithmetic guards are evaluated by
//! the database itself.
//!
//! HTTP routing, authentication, rendering and file storage are external
//! collaborators; this crate is the persistence-facing core they call.

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod services;

pub use config::AppConfig;
pub use errors::ServiceError;
pub use events::{Event, EventSender};

/// Installs the global tracing subscriber, honoring `RUST_LOG`. Safe to
/// call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

//! Reservation Engine
//!
//! The four primitives that move quantity between `current_stock` and
//! `reserved_stock`. Every caller in the crate goes through these; the
//! counters are never written directly anywhere else. Each primitive is a
//! single conditional UPDATE whose guard the database evaluates, so two
//! concurrent reservations against the same item cannot both pass the
//! availability check. All of them run on the caller's transaction.

use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::debug;
use uuid::Uuid;

use crate::entities::{
    item::{self, Entity as ItemEntity},
    stock_history,
};
use crate::errors::ServiceError;

fn positive(qty: i32, what: &str) -> Result<(), ServiceError> {
    if qty <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "{} quantity must be positive, got {}",
            what, qty
        )));
    }
    Ok(())
}

async fn find_item<C: ConnectionTrait>(conn: &C, item_id: Uuid) -> Result<item::Model, ServiceError> {
    ItemEntity::find_by_id(item_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))
}

/// Soft-holds `qty` against open demand: increments `reserved_stock` only.
///
/// Guard: `reserved_stock + qty <= current_stock`, evaluated by the
/// database. Fails with `InsufficientStock` when the quantity exceeds what
/// is available, leaving state untouched.
pub async fn reserve<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    qty: i32,
    actor_id: Uuid,
    reason: &str,
) -> Result<item::Model, ServiceError> {
    positive(qty, "reserve")?;

    let result = ItemEntity::update_many()
        .col_expr(
            item::Column::ReservedStock,
            Expr::col(item::Column::ReservedStock).add(qty),
        )
        .col_expr(item::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
        .filter(item::Column::Id.eq(item_id))
        .filter(
            Expr::col(item::Column::CurrentStock)
                .gte(Expr::col(item::Column::ReservedStock).add(qty)),
        )
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let it = find_item(conn, item_id).await?;
        return Err(ServiceError::InsufficientStock(format!(
            "cannot reserve {} of item {}: {} available ({} on hand, {} reserved)",
            qty,
            it.code,
            it.available(),
            it.current_stock,
            it.reserved_stock
        )));
    }

    let updated = find_item(conn, item_id).await?;
    debug!(
        item_id = %item_id,
        qty = qty,
        reserved_stock = updated.reserved_stock,
        actor_id = %actor_id,
        reason = reason,
        "Reserved stock"
    );
    Ok(updated)
}

/// Releases a soft hold: decrements `reserved_stock` only.
///
/// Over-release is an error, not a clamp, so bookkeeping bugs surface
/// instead of silently flooring at zero.
pub async fn release<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    qty: i32,
    actor_id: Uuid,
    reason: &str,
) -> Result<item::Model, ServiceError> {
    positive(qty, "release")?;

    let result = ItemEntity::update_many()
        .col_expr(
            item::Column::ReservedStock,
            Expr::col(item::Column::ReservedStock).sub(qty),
        )
        .col_expr(item::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
        .filter(item::Column::Id.eq(item_id))
        .filter(item::Column::ReservedStock.gte(qty))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let it = find_item(conn, item_id).await?;
        return Err(ServiceError::InsufficientStock(format!(
            "cannot release {} of item {}: only {} reserved",
            qty, it.code, it.reserved_stock
        )));
    }

    let updated = find_item(conn, item_id).await?;
    debug!(
        item_id = %item_id,
        qty = qty,
        reserved_stock = updated.reserved_stock,
        actor_id = %actor_id,
        reason = reason,
        "Released reservation"
    );
    Ok(updated)
}

/// Converts a reservation into an outbound movement: decrements both
/// `current_stock` and `reserved_stock` atomically.
///
/// This is the only operation that removes physical stock tied to a prior
/// reservation. Writes the stock-history row for the physical decrement;
/// the caller records the matching journal entry.
pub async fn fulfill<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    qty: i32,
    actor_id: Uuid,
    reason: &str,
    reference: Option<&str>,
) -> Result<item::Model, ServiceError> {
    positive(qty, "fulfill")?;

    let result = ItemEntity::update_many()
        .col_expr(
            item::Column::CurrentStock,
            Expr::col(item::Column::CurrentStock).sub(qty),
        )
        .col_expr(
            item::Column::ReservedStock,
            Expr::col(item::Column::ReservedStock).sub(qty),
        )
        .col_expr(item::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
        .filter(item::Column::Id.eq(item_id))
        .filter(item::Column::ReservedStock.gte(qty))
        .filter(item::Column::CurrentStock.gte(qty))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let it = find_item(conn, item_id).await?;
        return Err(ServiceError::InsufficientStock(format!(
            "cannot fulfill {} of item {}: {} on hand, {} reserved",
            qty, it.code, it.current_stock, it.reserved_stock
        )));
    }

    let updated = find_item(conn, item_id).await?;

    let history = stock_history::ActiveModel {
        item_id: Set(item_id),
        delta: Set(-qty),
        previous_stock: Set(updated.current_stock + qty),
        new_stock: Set(updated.current_stock),
        reason: Set(reason.to_string()),
        actor_id: Set(actor_id),
        reference: Set(reference.map(str::to_string)),
        ..Default::default()
    };
    history.insert(conn).await?;

    debug!(
        item_id = %item_id,
        qty = qty,
        current_stock = updated.current_stock,
        reserved_stock = updated.reserved_stock,
        actor_id = %actor_id,
        "Fulfilled reservation"
    );
    Ok(updated)
}

/// Quantity available for new demand: `current_stock - reserved_stock`.
/// Never negative after any committed operation.
pub async fn available<C: ConnectionTrait>(conn: &C, item_id: Uuid) -> Result<i32, ServiceError> {
    let it = find_item(conn, item_id).await?;
    Ok(it.available())
}

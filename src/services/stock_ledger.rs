//! Stock Ledger
//!
//! Owns every mutation of `items.current_stock` and appends one
//! `stock_history` row per physical movement, plus the append-only
//! `stock_transactions` journal. All functions are primitives: they run on
//! the caller's connection or transaction and never open their own, so a
//! failing step rolls the whole ambient transaction back.

use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::{
    item::{self, Entity as ItemEntity},
    stock_history::{self, Entity as StockHistoryEntity},
    stock_transaction::{self, Entity as StockTransactionEntity, TransactionDirection, TransactionSource},
};
use crate::errors::ServiceError;

/// Adds `delta` (positive or negative) to an item's physical stock and
/// writes one history row with the previous/new snapshot.
///
/// The arithmetic guard is evaluated by the database in a single
/// conditional UPDATE: the new physical quantity must stay at or above the
/// item's reserved quantity (and therefore above zero). Read-then-write is
/// deliberately avoided so two concurrent decrements cannot both pass the
/// check.
pub async fn apply_stock_change<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    delta: i32,
    reason: &str,
    actor_id: Uuid,
    reference: Option<&str>,
) -> Result<item::Model, ServiceError> {
    if delta == 0 {
        return Err(ServiceError::ValidationError(
            "stock change delta must be non-zero".to_string(),
        ));
    }

    let result = ItemEntity::update_many()
        .col_expr(
            item::Column::CurrentStock,
            Expr::col(item::Column::CurrentStock).add(delta),
        )
        .col_expr(item::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
        .filter(item::Column::Id.eq(item_id))
        // current + delta >= reserved; since reserved >= 0 this also keeps
        // physical stock non-negative.
        .filter(
            Expr::col(item::Column::CurrentStock)
                .gte(Expr::col(item::Column::ReservedStock).sub(delta)),
        )
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let existing = ItemEntity::find_by_id(item_id).one(conn).await?;
        return match existing {
            None => Err(ServiceError::NotFound(format!("Item {} not found", item_id))),
            Some(it) => Err(ServiceError::InsufficientStock(format!(
                "stock change of {} on item {} would leave {} on hand with {} reserved",
                delta, it.code, it.current_stock + delta, it.reserved_stock
            ))),
        };
    }

    let updated = ItemEntity::find_by_id(item_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))?;

    let history = stock_history::ActiveModel {
        item_id: Set(item_id),
        delta: Set(delta),
        previous_stock: Set(updated.current_stock - delta),
        new_stock: Set(updated.current_stock),
        reason: Set(reason.to_string()),
        actor_id: Set(actor_id),
        reference: Set(reference.map(str::to_string)),
        ..Default::default()
    };
    history.insert(conn).await?;

    if updated.current_stock < updated.stock_minimum {
        warn!(
            item_code = %updated.code,
            current_stock = updated.current_stock,
            stock_minimum = updated.stock_minimum,
            "Item stock fell below configured minimum"
        );
    }

    debug!(
        item_id = %item_id,
        delta = delta,
        new_stock = updated.current_stock,
        reason = reason,
        "Applied stock change"
    );

    Ok(updated)
}

/// Appends one journal row for a physical movement.
///
/// Side-effect-only: pairs with [`apply_stock_change`] at every call site,
/// but kept separate so reporting and physical-stock mutation can be
/// audited independently.
pub async fn record_transaction<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    direction: TransactionDirection,
    quantity: i32,
    source: TransactionSource,
    reference: Option<&str>,
    actor_id: Uuid,
    unit_price: Option<Decimal>,
) -> Result<stock_transaction::Model, ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "transaction quantity must be positive".to_string(),
        ));
    }

    let entry = stock_transaction::ActiveModel {
        item_id: Set(item_id),
        direction: Set(direction.as_str().to_string()),
        source: Set(source.as_str().to_string()),
        quantity: Set(quantity),
        unit_price: Set(unit_price),
        order_reference: Set(reference.map(str::to_string)),
        actor_id: Set(actor_id),
        ..Default::default()
    };

    Ok(entry.insert(conn).await?)
}

/// Fetches an item or fails with `NotFound`.
pub async fn get_item<C: ConnectionTrait>(conn: &C, item_id: Uuid) -> Result<item::Model, ServiceError> {
    ItemEntity::find_by_id(item_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))
}

/// Looks an item up by its unique code.
pub async fn find_item_by_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<Option<item::Model>, ServiceError> {
    Ok(ItemEntity::find()
        .filter(item::Column::Code.eq(code))
        .one(conn)
        .await?)
}

/// History rows for an item, most recent first. Reconciliation read.
pub async fn history_for<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
) -> Result<Vec<stock_history::Model>, ServiceError> {
    Ok(StockHistoryEntity::find()
        .filter(stock_history::Column::ItemId.eq(item_id))
        .order_by_desc(stock_history::Column::CreatedAt)
        .all(conn)
        .await?)
}

/// Journal rows for an item, most recent first.
pub async fn journal_for<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
) -> Result<Vec<stock_transaction::Model>, ServiceError> {
    Ok(StockTransactionEntity::find()
        .filter(stock_transaction::Column::ItemId.eq(item_id))
        .order_by_desc(stock_transaction::Column::CreatedAt)
        .all(conn)
        .await?)
}

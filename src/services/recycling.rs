//! Waste recycling: converts recoverable production byproduct back into
//! usable stock.
//!
//! `waste_stock.quantity` is the remaining recyclable amount; recycling
//! decrements it (database-guarded, never negative) and brings the same
//! quantity into stock on the origin material or an operator-chosen target
//! item, all in one transaction.

use std::sync::Arc;

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{
    stock_transaction::{TransactionDirection, TransactionSource},
    waste_stock::{self, Entity as WasteStockEntity},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::stock_ledger;

/// Where the recycled quantity lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RecycleTarget {
    /// Back onto the material the waste originated from.
    ReturnToOrigin,
    /// Onto an operator-chosen catalog item.
    NewItem(Uuid),
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterWasteInput {
    #[validate(length(min = 1))]
    pub work_order_number: String,
    pub item_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Clone)]
pub struct RecyclingService {
    db: Arc<DatabaseConnection>,
    events: Option<EventSender>,
}

impl RecyclingService {
    pub fn new(db: Arc<DatabaseConnection>, events: Option<EventSender>) -> Self {
        Self { db, events }
    }

    /// Registers byproduct recovered from a work order.
    #[instrument(skip(self, input))]
    pub async fn register_waste(
        &self,
        input: RegisterWasteInput,
    ) -> Result<waste_stock::Model, ServiceError> {
        input.validate()?;
        // The origin material must exist.
        stock_ledger::get_item(&*self.db, input.item_id).await?;

        let waste = waste_stock::ActiveModel {
            work_order_number: Set(input.work_order_number),
            item_id: Set(input.item_id),
            quantity: Set(input.quantity),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;
        Ok(waste)
    }

    pub async fn get_waste(&self, waste_id: Uuid) -> Result<waste_stock::Model, ServiceError> {
        WasteStockEntity::find_by_id(waste_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Waste stock {} not found", waste_id)))
    }

    /// Recycles `qty` of a waste entry into the target item.
    ///
    /// The waste decrement and the inbound stock movement commit together
    /// or not at all.
    #[instrument(skip(self))]
    pub async fn recycle(
        &self,
        waste_id: Uuid,
        qty: i32,
        target: RecycleTarget,
        actor_id: Uuid,
    ) -> Result<waste_stock::Model, ServiceError> {
        if qty <= 0 {
            return Err(ServiceError::ValidationError(
                "recycle quantity must be positive".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let waste = WasteStockEntity::find_by_id(waste_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Waste stock {} not found", waste_id)))?;

        let result = WasteStockEntity::update_many()
            .col_expr(
                waste_stock::Column::Quantity,
                Expr::col(waste_stock::Column::Quantity).sub(qty),
            )
            .col_expr(waste_stock::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
            .filter(waste_stock::Column::Id.eq(waste_id))
            .filter(waste_stock::Column::Quantity.gte(qty))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "cannot recycle {}: only {} recyclable remaining",
                qty, waste.quantity
            )));
        }

        let target_item_id = match target {
            RecycleTarget::ReturnToOrigin => waste.item_id,
            RecycleTarget::NewItem(item_id) => item_id,
        };

        stock_ledger::apply_stock_change(
            &txn,
            target_item_id,
            qty,
            &format!("recycled waste from work order {}", waste.work_order_number),
            actor_id,
            Some(waste.work_order_number.as_str()),
        )
        .await?;
        stock_ledger::record_transaction(
            &txn,
            target_item_id,
            TransactionDirection::Inbound,
            qty,
            TransactionSource::Recycling,
            Some(waste.work_order_number.as_str()),
            actor_id,
            None,
        )
        .await?;

        let updated = WasteStockEntity::find_by_id(waste_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Waste stock {} not found", waste_id)))?;

        txn.commit().await?;

        info!(
            waste_id = %waste_id,
            qty = qty,
            remaining = updated.quantity,
            "Recycled waste into stock"
        );
        self.emit(Event::WasteRecycled {
            waste_id,
            item_id: target_item_id,
            quantity: qty,
        })
        .await;

        Ok(updated)
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.events {
            sender.send(event).await;
        }
    }
}

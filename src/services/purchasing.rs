//! Purchasing: vendor orders and the receipt flow that brings purchased
//! goods into stock and backfills linked TRADING work-order lines.
//!
//! The purchase-order line → work-order line association is a best-effort
//! normalized-name match (see `services::matching`); receipt clamps the
//! backfilled `ready_qty` at the requested quantity so line invariants
//! hold even when the vendor over-delivers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{
    item::ItemCategory,
    purchase_order::{self, Entity as PurchaseOrderEntity, PurchaseOrderStatus},
    purchase_order_line::{self, Entity as PurchaseOrderLineEntity},
    stock_transaction::{TransactionDirection, TransactionSource},
    work_order::{self, Entity as WorkOrderEntity},
    work_order_line::{self, Entity as WorkOrderLineEntity, FulfillmentMethod, FulfillmentStatus},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::matching::{NameMatcher, NormalizedNameMatcher};
use crate::services::work_orders::{line_status, update_order_status_if_ready};
use crate::services::{catalog, stock_ledger};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePurchaseOrderInput {
    #[validate(length(min = 1))]
    pub number: String,
    #[validate(length(min = 1))]
    pub vendor_name: String,
    /// Work order whose TRADING lines this purchase sources, if any.
    pub work_order_number: Option<String>,
    pub created_by: Uuid,
    #[validate(length(min = 1))]
    pub lines: Vec<CreatePurchaseOrderLineInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseOrderLineInput {
    #[validate(length(min = 1))]
    pub item_name: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
}

#[derive(Clone)]
pub struct PurchasingService {
    db: Arc<DatabaseConnection>,
    events: Option<EventSender>,
}

impl PurchasingService {
    pub fn new(db: Arc<DatabaseConnection>, events: Option<EventSender>) -> Self {
        Self { db, events }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.events {
            sender.send(event).await;
        }
    }

    #[instrument(skip(self, input), fields(number = %input.number))]
    pub async fn create_purchase_order(
        &self,
        input: CreatePurchaseOrderInput,
    ) -> Result<(purchase_order::Model, Vec<purchase_order_line::Model>), ServiceError> {
        input.validate()?;
        for line in &input.lines {
            line.validate()?;
        }

        let txn = self.db.begin().await?;

        // Duplicate numbers are caught by the unique index, so a racing
        // insert fails the same way a sequential one does.
        let order = purchase_order::ActiveModel {
            number: Set(input.number.clone()),
            vendor_name: Set(input.vendor_name.clone()),
            work_order_number: Set(input.work_order_number.clone()),
            status: Set(PurchaseOrderStatus::Open.as_str().to_string()),
            created_by: Set(input.created_by),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|err| {
            ServiceError::conflict_on_unique(err, || {
                format!("Purchase order number {} already exists", input.number)
            })
        })?;

        let mut lines = Vec::with_capacity(input.lines.len());
        for line_input in &input.lines {
            let line = purchase_order_line::ActiveModel {
                purchase_order_id: Set(order.id),
                item_name: Set(line_input.item_name.clone()),
                quantity: Set(line_input.quantity),
                unit_price: Set(line_input.unit_price),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            lines.push(line);
        }

        txn.commit().await?;
        info!(purchase_order = %order.number, "Created purchase order");
        Ok((order, lines))
    }

    /// Vendor receipt: OPEN → RECEIVED, physical stock incremented per
    /// line, IN journal rows written, and any linked work order's TRADING
    /// lines backfilled via the name matcher.
    #[instrument(skip(self))]
    pub async fn receive(
        &self,
        po_id: Uuid,
        received_at: DateTime<Utc>,
        proof_ref: Option<&str>,
        actor_id: Uuid,
    ) -> Result<purchase_order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = PurchaseOrderEntity::find_by_id(po_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {} not found", po_id)))?;
        match order.status() {
            Some(PurchaseOrderStatus::Open) => {}
            Some(other) => {
                return Err(ServiceError::InvalidStatus(format!(
                    "purchase order {} is {} and cannot be received",
                    order.number,
                    other.as_str()
                )))
            }
            None => {
                return Err(ServiceError::InternalError(format!(
                    "purchase order {} carries unknown status '{}'",
                    order.number, order.status
                )))
            }
        }

        let po_lines = PurchaseOrderLineEntity::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(po_id))
            .order_by_asc(purchase_order_line::Column::CreatedAt)
            .all(&txn)
            .await?;

        // Purchases linked to a work order source sellable goods; plain
        // restocks default to raw material.
        let default_category = if order.work_order_number.is_some() {
            ItemCategory::FinishedGood
        } else {
            ItemCategory::RawMaterial
        };

        let matcher = NormalizedNameMatcher;
        for po_line in &po_lines {
            let (item, _created) = catalog::resolve_or_create(
                &txn,
                &matcher,
                &po_line.item_name,
                default_category,
                actor_id,
            )
            .await?;

            stock_ledger::apply_stock_change(
                &txn,
                item.id,
                po_line.quantity,
                &format!("vendor receipt for purchase order {}", order.number),
                actor_id,
                Some(order.number.as_str()),
            )
            .await?;
            stock_ledger::record_transaction(
                &txn,
                item.id,
                TransactionDirection::Inbound,
                po_line.quantity,
                TransactionSource::VendorReceipt,
                Some(order.number.as_str()),
                actor_id,
                po_line.unit_price,
            )
            .await?;
        }

        if let Some(wo_number) = order.work_order_number.as_deref() {
            self.backfill_trading_lines(&txn, &matcher, wo_number, &po_lines)
                .await?;
        }

        let number = order.number.clone();
        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(PurchaseOrderStatus::Received.as_str().to_string());
        active.received_at = Set(Some(received_at));
        active.receipt_proof = Set(proof_ref.map(str::to_string));
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(purchase_order = %number, lines = po_lines.len(), "Received purchase order");
        self.emit(Event::PurchaseOrderReceived {
            purchase_order_id: updated.id,
            number,
        })
        .await;

        Ok(updated)
    }

    /// Increases `ready_qty` on the linked work order's TRADING lines,
    /// matching purchase-order lines to work-order lines by normalized
    /// item name. First match in line order wins; each purchase-order line
    /// backfills at most one work-order line.
    async fn backfill_trading_lines<C: ConnectionTrait>(
        &self,
        conn: &C,
        matcher: &dyn NameMatcher,
        wo_number: &str,
        po_lines: &[purchase_order_line::Model],
    ) -> Result<(), ServiceError> {
        let wo = WorkOrderEntity::find()
            .filter(work_order::Column::Number.eq(wo_number))
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Linked work order {} not found", wo_number))
            })?;

        let trading_lines = WorkOrderLineEntity::find()
            .filter(work_order_line::Column::WorkOrderId.eq(wo.id))
            .filter(work_order_line::Column::Method.eq(FulfillmentMethod::Trading.as_str()))
            .filter(work_order_line::Column::Status.ne(FulfillmentStatus::Cancelled.as_str()))
            .order_by_asc(work_order_line::Column::CreatedAt)
            .all(conn)
            .await?;

        for po_line in po_lines {
            let matched = trading_lines
                .iter()
                .find(|l| matcher.matches(&l.item_name, &po_line.item_name));
            let Some(line) = matched else {
                warn!(
                    purchase_line = %po_line.item_name,
                    work_order = wo_number,
                    "No trading line matches received purchase line"
                );
                continue;
            };

            // Re-read: an earlier purchase line may have already advanced
            // this work-order line within the transaction.
            let current = WorkOrderLineEntity::find_by_id(line.id)
                .one(conn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Work order line {} not found", line.id))
                })?;

            let ready = (current.ready_qty + po_line.quantity).min(current.requested_qty);
            if ready == current.ready_qty {
                continue;
            }
            let mut active: work_order_line::ActiveModel = current.into();
            active.ready_qty = Set(ready);
            active.update(conn).await?;
        }

        update_order_status_if_ready(conn, wo.id).await?;
        Ok(())
    }

    /// Terminal fulfillment for TRADING lines that are fully sourced:
    /// goods leave stock to the customer (OUT journal) and the line flips
    /// to FULFILLED.
    #[instrument(skip(self))]
    pub async fn approve_trading(
        &self,
        line_ids: &[Uuid],
        actor_id: Uuid,
    ) -> Result<Vec<work_order_line::Model>, ServiceError> {
        let txn = self.db.begin().await?;
        let matcher = NormalizedNameMatcher;
        let mut updated_lines = Vec::with_capacity(line_ids.len());
        let mut low_stock = Vec::new();

        for &line_id in line_ids {
            let line = WorkOrderLineEntity::find_by_id(line_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Work order line {} not found", line_id))
                })?;
            if line.method() != Some(FulfillmentMethod::Trading) {
                return Err(ServiceError::InvalidStatus(format!(
                    "line {} is not a TRADING line",
                    line.id
                )));
            }
            let status = line_status(&line)?;
            if status != FulfillmentStatus::Pending {
                return Err(ServiceError::InvalidStatus(format!(
                    "line {} cannot be approved from {}",
                    line.id,
                    status.as_str()
                )));
            }
            if line.ready_qty < line.requested_qty {
                return Err(ServiceError::InvalidStatus(format!(
                    "line {} is not fully sourced: {} of {} ready",
                    line.id, line.ready_qty, line.requested_qty
                )));
            }

            let item = match line.item_id {
                Some(id) => stock_ledger::get_item(&txn, id).await?,
                None => catalog::resolve_by_name(&txn, &matcher, &line.item_name)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "No catalog item matches '{}' for trading approval",
                            line.item_name
                        ))
                    })?,
            };

            let order = WorkOrderEntity::find_by_id(line.work_order_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Work order {} not found", line.work_order_id))
                })?;

            let item_after = stock_ledger::apply_stock_change(
                &txn,
                item.id,
                -line.requested_qty,
                &format!("trading goods out for work order {}", order.number),
                actor_id,
                Some(order.number.as_str()),
            )
            .await?;
            if item_after.current_stock < item_after.stock_minimum {
                low_stock.push(item_after);
            }
            stock_ledger::record_transaction(
                &txn,
                item.id,
                TransactionDirection::Outbound,
                line.requested_qty,
                TransactionSource::Trading,
                Some(order.number.as_str()),
                actor_id,
                None,
            )
            .await?;

            let mut active: work_order_line::ActiveModel = line.into();
            active.item_id = Set(Some(item.id));
            active.status = Set(FulfillmentStatus::Fulfilled.as_str().to_string());
            let updated = active.update(&txn).await?;
            update_order_status_if_ready(&txn, updated.work_order_id).await?;
            updated_lines.push(updated);
        }

        txn.commit().await?;
        for item in low_stock {
            self.emit(Event::StockBelowMinimum {
                item_id: item.id,
                code: item.code,
                current_stock: item.current_stock,
                stock_minimum: item.stock_minimum,
            })
            .await;
        }
        Ok(updated_lines)
    }

    pub async fn get_purchase_order(
        &self,
        po_id: Uuid,
    ) -> Result<(purchase_order::Model, Vec<purchase_order_line::Model>), ServiceError> {
        let order = PurchaseOrderEntity::find_by_id(po_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {} not found", po_id)))?;
        let lines = PurchaseOrderLineEntity::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(po_id))
            .order_by_asc(purchase_order_line::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok((order, lines))
    }
}

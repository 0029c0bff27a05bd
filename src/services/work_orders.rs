//! Work order (SPK) lifecycle.
//!
//! Orders are created at QUEUE with every line PENDING; FROM_STOCK lines
//! are reserved in the same transaction and flipped to RESERVED. Every
//! stock side effect goes through the reservation/ledger primitives, and
//! every line mutation is followed by the idempotent order-status
//! aggregation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{
    stock_transaction::{TransactionDirection, TransactionSource},
    work_order::{self, Entity as WorkOrderEntity, WorkOrderStatus},
    work_order_line::{self, Entity as WorkOrderLineEntity, FulfillmentMethod, FulfillmentStatus},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::matching::NormalizedNameMatcher;
use crate::services::{catalog, reservation, stock_ledger};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWorkOrderInput {
    #[validate(length(min = 1))]
    pub number: String,
    #[validate(length(min = 1))]
    pub customer_name: String,
    pub deadline: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    #[validate(length(min = 1))]
    pub lines: Vec<CreateWorkOrderLineInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateWorkOrderLineInput {
    /// Explicit catalog reference; FROM_STOCK lines may instead resolve by
    /// exact item name.
    pub item_id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub item_name: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub method: FulfillmentMethod,
}

/// Service for the work-order state machine.
#[derive(Clone)]
pub struct WorkOrderService {
    db: Arc<DatabaseConnection>,
    events: Option<EventSender>,
}

impl WorkOrderService {
    pub fn new(db: Arc<DatabaseConnection>, events: Option<EventSender>) -> Self {
        Self { db, events }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.events {
            sender.send(event).await;
        }
    }

    /// Creates a work order at QUEUE and, in the same transaction,
    /// reserves stock for every FROM_STOCK line.
    #[instrument(skip(self, input), fields(number = %input.number))]
    pub async fn create_work_order(
        &self,
        input: CreateWorkOrderInput,
    ) -> Result<(work_order::Model, Vec<work_order_line::Model>), ServiceError> {
        input.validate()?;
        for line in &input.lines {
            line.validate()?;
        }

        let txn = self.db.begin().await?;

        // The unique index on the order number is the authority on
        // duplicates, so a concurrent insert loses cleanly too.
        let order = work_order::ActiveModel {
            number: Set(input.number.clone()),
            status: Set(WorkOrderStatus::Queue.as_str().to_string()),
            deadline: Set(input.deadline),
            customer_name: Set(input.customer_name.clone()),
            created_by: Set(input.created_by),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|err| {
            ServiceError::conflict_on_unique(err, || {
                format!("Work order number {} already exists", input.number)
            })
        })?;

        let matcher = NormalizedNameMatcher;
        let mut lines = Vec::with_capacity(input.lines.len());
        for line_input in &input.lines {
            let (item_id, status) = match line_input.method {
                FulfillmentMethod::FromStock => {
                    let item = match line_input.item_id {
                        Some(id) => stock_ledger::get_item(&txn, id).await?,
                        None => catalog::resolve_by_name(&txn, &matcher, &line_input.item_name)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "No catalog item matches '{}' for a FROM_STOCK line",
                                    line_input.item_name
                                ))
                            })?,
                    };
                    reservation::reserve(
                        &txn,
                        item.id,
                        line_input.quantity,
                        input.created_by,
                        &format!("reserved for work order {}", input.number),
                    )
                    .await?;
                    (Some(item.id), FulfillmentStatus::Reserved)
                }
                // PRODUCTION and TRADING lines hold no finished-goods
                // reservation; their items may not exist yet.
                _ => (line_input.item_id, FulfillmentStatus::Pending),
            };

            let line = work_order_line::ActiveModel {
                work_order_id: Set(order.id),
                item_id: Set(item_id),
                item_name: Set(line_input.item_name.clone()),
                requested_qty: Set(line_input.quantity),
                produced_qty: Set(0),
                ready_qty: Set(0),
                shipped_qty: Set(0),
                method: Set(line_input.method.as_str().to_string()),
                status: Set(status.as_str().to_string()),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            lines.push(line);
        }

        txn.commit().await?;

        info!(
            work_order = %order.number,
            line_count = lines.len(),
            "Created work order"
        );
        self.emit(Event::WorkOrderCreated {
            work_order_id: order.id,
            number: order.number.clone(),
        })
        .await;

        Ok((order, lines))
    }

    /// QUEUE → IN_PROGRESS. A pure status flip: reservation already
    /// happened at creation, so starting must not touch stock.
    #[instrument(skip(self))]
    pub async fn start_work_order(&self, order_id: Uuid) -> Result<work_order::Model, ServiceError> {
        self.transition(order_id, WorkOrderStatus::InProgress).await
    }

    /// READY_TO_SHIP → SHIPPING.
    #[instrument(skip(self))]
    pub async fn mark_shipping(&self, order_id: Uuid) -> Result<work_order::Model, ServiceError> {
        self.transition(order_id, WorkOrderStatus::Shipping).await
    }

    async fn transition(
        &self,
        order_id: Uuid,
        next: WorkOrderStatus,
    ) -> Result<work_order::Model, ServiceError> {
        let order = self.get_order(&*self.db, order_id).await?;
        let current = order_status(&order)?;
        if !current.can_transition_to(next) {
            return Err(ServiceError::InvalidStatus(format!(
                "work order {} cannot move from {} to {}",
                order.number,
                current.as_str(),
                next.as_str()
            )));
        }

        let mut active: work_order::ActiveModel = order.into();
        active.status = Set(next.as_str().to_string());
        let updated = active.update(&*self.db).await?;

        info!(
            work_order = %updated.number,
            old_status = current.as_str(),
            new_status = next.as_str(),
            "Work order status changed"
        );
        self.emit(Event::WorkOrderStatusChanged {
            work_order_id: updated.id,
            old_status: current.as_str().to_string(),
            new_status: next.as_str().to_string(),
        })
        .await;

        Ok(updated)
    }

    /// Cancels a work order from any non-terminal state.
    ///
    /// Every FROM_STOCK line still holding its reservation (RESERVED, or
    /// COMPLETED i.e. ready but never fulfilled) has its full requested
    /// quantity released. Consumed lines are left untouched: cancellation
    /// cannot claw back delivered stock.
    #[instrument(skip(self))]
    pub async fn cancel_work_order(
        &self,
        order_id: Uuid,
        actor_id: Uuid,
    ) -> Result<work_order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = self.get_order(&txn, order_id).await?;
        let current = order_status(&order)?;
        if !current.can_transition_to(WorkOrderStatus::Cancelled) {
            return Err(ServiceError::InvalidStatus(format!(
                "work order {} is already {} and cannot be cancelled",
                order.number,
                current.as_str()
            )));
        }

        let lines = WorkOrderLineEntity::find()
            .filter(work_order_line::Column::WorkOrderId.eq(order_id))
            .all(&txn)
            .await?;

        for line in lines {
            let status = line_status(&line)?;
            if line.is_consumed() || status == FulfillmentStatus::Cancelled {
                // Stock already delivered, or nothing left to undo.
                continue;
            }

            if line.method() == Some(FulfillmentMethod::FromStock)
                && matches!(
                    status,
                    FulfillmentStatus::Reserved | FulfillmentStatus::Completed
                )
            {
                // COMPLETED here means ready, not consumed: the
                // reservation stays live until approval fulfills it.
                let item_id = line.item_id.ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "reserved line {} has no item reference",
                        line.id
                    ))
                })?;
                reservation::release(
                    &txn,
                    item_id,
                    line.requested_qty,
                    actor_id,
                    &format!("work order {} cancelled", order.number),
                )
                .await?;
            }

            let mut active: work_order_line::ActiveModel = line.into();
            active.status = Set(FulfillmentStatus::Cancelled.as_str().to_string());
            active.update(&txn).await?;
        }

        let number = order.number.clone();
        let mut active: work_order::ActiveModel = order.into();
        active.status = Set(WorkOrderStatus::Cancelled.as_str().to_string());
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(work_order = %number, "Cancelled work order");
        self.emit(Event::WorkOrderCancelled {
            work_order_id: updated.id,
            number,
        })
        .await;

        Ok(updated)
    }

    /// Upstream "ready" signal for a FROM_STOCK line: RESERVED → COMPLETED
    /// with the full requested quantity marked ready.
    #[instrument(skip(self))]
    pub async fn mark_line_ready(&self, line_id: Uuid) -> Result<work_order_line::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let line = self.get_line(&txn, line_id).await?;
        if line.method() != Some(FulfillmentMethod::FromStock) {
            return Err(ServiceError::InvalidStatus(format!(
                "line {} is not FROM_STOCK",
                line.id
            )));
        }
        let status = line_status(&line)?;
        if status != FulfillmentStatus::Reserved {
            return Err(ServiceError::InvalidStatus(format!(
                "line {} cannot be marked ready from {}",
                line.id,
                status.as_str()
            )));
        }

        let order_id = line.work_order_id;
        let requested = line.requested_qty;
        let mut active: work_order_line::ActiveModel = line.into();
        active.status = Set(FulfillmentStatus::Completed.as_str().to_string());
        active.ready_qty = Set(requested);
        let updated = active.update(&txn).await?;

        update_order_status_if_ready(&txn, order_id).await?;
        txn.commit().await?;
        Ok(updated)
    }

    /// Terminal fulfillment for FROM_STOCK lines: converts each line's
    /// reservation into an outbound movement and journals it.
    #[instrument(skip(self))]
    pub async fn approve_from_stock(
        &self,
        line_ids: &[Uuid],
        actor_id: Uuid,
    ) -> Result<Vec<work_order_line::Model>, ServiceError> {
        let txn = self.db.begin().await?;
        let mut updated_lines = Vec::with_capacity(line_ids.len());
        let mut low_stock = Vec::new();

        for &line_id in line_ids {
            let line = self.get_line(&txn, line_id).await?;
            if line.method() != Some(FulfillmentMethod::FromStock) {
                return Err(ServiceError::InvalidStatus(format!(
                    "line {} is not FROM_STOCK",
                    line.id
                )));
            }
            let status = line_status(&line)?;
            // The upstream ready signal is the only admission path.
            if status != FulfillmentStatus::Completed {
                return Err(ServiceError::InvalidStatus(format!(
                    "line {} must be marked ready before approval, not {}",
                    line.id,
                    status.as_str()
                )));
            }

            let order = self.get_order(&txn, line.work_order_id).await?;
            let order_st = order_status(&order)?;
            if order_st.is_terminal() {
                return Err(ServiceError::InvalidStatus(format!(
                    "work order {} is {} and cannot fulfill lines",
                    order.number,
                    order_st.as_str()
                )));
            }

            let item_id = line.item_id.ok_or_else(|| {
                ServiceError::InternalError(format!("line {} has no item reference", line.id))
            })?;

            let item_after = reservation::fulfill(
                &txn,
                item_id,
                line.requested_qty,
                actor_id,
                &format!("fulfilled for work order {}", order.number),
                Some(order.number.as_str()),
            )
            .await?;
            if item_after.current_stock < item_after.stock_minimum {
                low_stock.push(item_after);
            }
            stock_ledger::record_transaction(
                &txn,
                item_id,
                TransactionDirection::Outbound,
                line.requested_qty,
                TransactionSource::CustomerOrder,
                Some(order.number.as_str()),
                actor_id,
                None,
            )
            .await?;

            let requested = line.requested_qty;
            let line_id = line.id;
            let mut active: work_order_line::ActiveModel = line.into();
            active.status = Set(FulfillmentStatus::Fulfilled.as_str().to_string());
            active.ready_qty = Set(requested);
            let updated = active.update(&txn).await?;
            updated_lines.push(updated);

            update_order_status_if_ready(&txn, order.id).await?;

            info!(line_id = %line_id, qty = requested, "Approved FROM_STOCK line");
        }

        txn.commit().await?;

        for line in &updated_lines {
            if let Some(item_id) = line.item_id {
                self.emit(Event::LineFulfilled {
                    line_id: line.id,
                    item_id,
                    quantity: line.requested_qty,
                })
                .await;
            }
        }
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

    /// Records an outbound shipment against a line, bounded by what is
    /// ready.
    #[instrument(skip(self))]
    pub async fn ship_line(
        &self,
        line_id: Uuid,
        qty: i32,
        actor_id: Uuid,
    ) -> Result<work_order_line::Model, ServiceError> {
        if qty <= 0 {
            return Err(ServiceError::ValidationError(
                "shipment quantity must be positive".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let line = self.get_line(&txn, line_id).await?;
        let status = line_status(&line)?;
        if status == FulfillmentStatus::Cancelled {
            return Err(ServiceError::InvalidStatus(format!(
                "line {} is cancelled",
                line.id
            )));
        }
        if line.shipped_qty + qty > line.ready_qty {
            return Err(ServiceError::ValidationError(format!(
                "cannot ship {}: only {} of {} ready ({} already shipped)",
                qty, line.ready_qty, line.requested_qty, line.shipped_qty
            )));
        }

        let order_id = line.work_order_id;
        let shipped = line.shipped_qty + qty;
        let mut active: work_order_line::ActiveModel = line.into();
        active.shipped_qty = Set(shipped);
        let updated = active.update(&txn).await?;

        update_order_status_if_ready(&txn, order_id).await?;
        txn.commit().await?;
        Ok(updated)
    }

    /// Recomputes the order-level status from its lines; public entry
    /// point for callers outside an ambient transaction.
    #[instrument(skip(self))]
    pub async fn refresh_order_status(
        &self,
        order_id: Uuid,
    ) -> Result<WorkOrderStatus, ServiceError> {
        let txn = self.db.begin().await?;
        let status = update_order_status_if_ready(&txn, order_id).await?;
        txn.commit().await?;
        Ok(status)
    }

    pub async fn get_work_order(
        &self,
        order_id: Uuid,
    ) -> Result<(work_order::Model, Vec<work_order_line::Model>), ServiceError> {
        let order = self.get_order(&*self.db, order_id).await?;
        let lines = WorkOrderLineEntity::find()
            .filter(work_order_line::Column::WorkOrderId.eq(order_id))
            .order_by_asc(work_order_line::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok((order, lines))
    }

    async fn get_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<work_order::Model, ServiceError> {
        WorkOrderEntity::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Work order {} not found", order_id)))
    }

    async fn get_line<C: ConnectionTrait>(
        &self,
        conn: &C,
        line_id: Uuid,
    ) -> Result<work_order_line::Model, ServiceError> {
        WorkOrderLineEntity::find_by_id(line_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Work order line {} not found", line_id))
            })
    }
}

pub(crate) fn order_status(order: &work_order::Model) -> Result<WorkOrderStatus, ServiceError> {
    order.status().ok_or_else(|| {
        ServiceError::InternalError(format!(
            "work order {} carries unknown status '{}'",
            order.number, order.status
        ))
    })
}

pub(crate) fn line_status(
    line: &work_order_line::Model,
) -> Result<FulfillmentStatus, ServiceError> {
    line.status().ok_or_else(|| {
        ServiceError::InternalError(format!(
            "work order line {} carries unknown status '{}'",
            line.id, line.status
        ))
    })
}

/// Order-level aggregation, recomputed after every line mutation.
///
/// All (non-cancelled) lines shipped in full ⇒ DONE; some but not all
/// shipped ⇒ PARTIAL; all ready but nothing shipped ⇒ READY_TO_SHIP;
/// otherwise unchanged. Idempotent: writes only when the computed status
/// differs from the stored one, and only along a legal transition.
pub(crate) async fn update_order_status_if_ready<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<WorkOrderStatus, ServiceError> {
    let order = WorkOrderEntity::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Work order {} not found", order_id)))?;
    let current = order_status(&order)?;
    if current.is_terminal() {
        return Ok(current);
    }

    let lines = WorkOrderLineEntity::find()
        .filter(work_order_line::Column::WorkOrderId.eq(order_id))
        .filter(work_order_line::Column::Status.ne(FulfillmentStatus::Cancelled.as_str()))
        .all(conn)
        .await?;
    if lines.is_empty() {
        return Ok(current);
    }

    let all_shipped = lines.iter().all(|l| l.shipped_qty >= l.requested_qty);
    let any_shipped = lines.iter().any(|l| l.shipped_qty > 0);
    let all_ready = lines.iter().all(|l| l.ready_qty >= l.requested_qty);

    let target = if all_shipped {
        Some(WorkOrderStatus::Done)
    } else if any_shipped {
        Some(WorkOrderStatus::Partial)
    } else if all_ready {
        Some(WorkOrderStatus::ReadyToShip)
    } else {
        None
    };

    match target {
        Some(next) if next != current && current.can_transition_to(next) => {
            let mut active: work_order::ActiveModel = order.into();
            active.status = Set(next.as_str().to_string());
            active.update(conn).await?;
            Ok(next)
        }
        _ => Ok(current),
    }
}

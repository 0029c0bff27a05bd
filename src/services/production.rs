//! Production workflows: raw-material draw-down requests and incremental
//! progress reporting against PRODUCTION work-order lines.
//!
//! Approving a request reserves its raw materials; completing it consumes
//! them (fulfill + OUT journal). Progress reports bring finished goods
//! into stock (IN journal) and advance the line counters until the line
//! reaches DONE; final approval records the outbound movement to the
//! customer and flips the line to COMPLETED.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{
    item::ItemCategory,
    production_request::{self, Entity as ProductionRequestEntity, ProductionRequestStatus},
    production_request_material::{self, Entity as MaterialEntity},
    stock_transaction::{TransactionDirection, TransactionSource},
    work_order::{self, Entity as WorkOrderEntity},
    work_order_line::{self, Entity as WorkOrderLineEntity, FulfillmentMethod, FulfillmentStatus},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::matching::NormalizedNameMatcher;
use crate::services::work_orders::{line_status, order_status, update_order_status_if_ready};
use crate::services::{catalog, reservation, stock_ledger};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductionRequestInput {
    #[validate(length(min = 1))]
    pub number: String,
    #[validate(length(min = 1))]
    pub work_order_number: String,
    pub requested_by: Uuid,
    #[validate(length(min = 1))]
    pub materials: Vec<MaterialDrawDown>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MaterialDrawDown {
    pub item_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Clone)]
pub struct ProductionService {
    db: Arc<DatabaseConnection>,
    events: Option<EventSender>,
}

impl ProductionService {
    pub fn new(db: Arc<DatabaseConnection>, events: Option<EventSender>) -> Self {
        Self { db, events }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.events {
            sender.send(event).await;
        }
    }

    /// Files a raw-material draw-down plan against a work order. No stock
    /// effect until approval.
    #[instrument(skip(self, input), fields(number = %input.number))]
    pub async fn create_request(
        &self,
        input: CreateProductionRequestInput,
    ) -> Result<production_request::Model, ServiceError> {
        input.validate()?;
        for material in &input.materials {
            material.validate()?;
        }

        let txn = self.db.begin().await?;

        let order = WorkOrderEntity::find()
            .filter(work_order::Column::Number.eq(input.work_order_number.as_str()))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Work order {} not found",
                    input.work_order_number
                ))
            })?;
        let order_st = order_status(&order)?;
        if order_st.is_terminal() {
            return Err(ServiceError::InvalidStatus(format!(
                "work order {} is {} and cannot take production requests",
                order.number,
                order_st.as_str()
            )));
        }

        // Duplicate numbers are caught by the unique index, so a racing
        // insert fails the same way a sequential one does.
        let request = production_request::ActiveModel {
            number: Set(input.number.clone()),
            work_order_number: Set(input.work_order_number.clone()),
            status: Set(ProductionRequestStatus::Pending.as_str().to_string()),
            requested_by: Set(input.requested_by),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|err| {
            ServiceError::conflict_on_unique(err, || {
                format!("Production request number {} already exists", input.number)
            })
        })?;

        for material in &input.materials {
            // Fails early if the material is not in the catalog.
            stock_ledger::get_item(&txn, material.item_id).await?;
            production_request_material::ActiveModel {
                production_request_id: Set(request.id),
                item_id: Set(material.item_id),
                quantity: Set(material.quantity),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        info!(request = %request.number, "Created production request");
        Ok(request)
    }

    /// PENDING → APPROVED; reserves every listed raw material.
    #[instrument(skip(self))]
    pub async fn approve_request(
        &self,
        request_id: Uuid,
        actor_id: Uuid,
    ) -> Result<production_request::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let request = self.get_request(&txn, request_id).await?;
        let current = request_status(&request)?;
        if !current.can_transition_to(ProductionRequestStatus::Approved) {
            return Err(ServiceError::InvalidStatus(format!(
                "production request {} cannot be approved from {}",
                request.number,
                current.as_str()
            )));
        }

        let materials = self.materials_of(&txn, request_id).await?;
        for material in &materials {
            reservation::reserve(
                &txn,
                material.item_id,
                material.quantity,
                actor_id,
                &format!("raw material for production request {}", request.number),
            )
            .await?;
        }

        let mut active: production_request::ActiveModel = request.into();
        active.status = Set(ProductionRequestStatus::Approved.as_str().to_string());
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        info!(request = %updated.number, materials = materials.len(), "Approved production request");
        Ok(updated)
    }

    /// APPROVED → COMPLETED; consumes every reserved raw material and
    /// journals the outbound movements.
    #[instrument(skip(self))]
    pub async fn complete_request(
        &self,
        request_id: Uuid,
        actor_id: Uuid,
    ) -> Result<production_request::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let request = self.get_request(&txn, request_id).await?;
        let current = request_status(&request)?;
        if !current.can_transition_to(ProductionRequestStatus::Completed) {
            return Err(ServiceError::InvalidStatus(format!(
                "production request {} cannot be completed from {}",
                request.number,
                current.as_str()
            )));
        }

        let materials = self.materials_of(&txn, request_id).await?;
        let mut low_stock = Vec::new();
        for material in &materials {
            let item_after = reservation::fulfill(
                &txn,
                material.item_id,
                material.quantity,
                actor_id,
                &format!("consumed by production request {}", request.number),
                Some(request.work_order_number.as_str()),
            )
            .await?;
            if item_after.current_stock < item_after.stock_minimum {
                low_stock.push(item_after);
            }
            stock_ledger::record_transaction(
                &txn,
                material.item_id,
                TransactionDirection::Outbound,
                material.quantity,
                TransactionSource::Production,
                Some(request.work_order_number.as_str()),
                actor_id,
                None,
            )
            .await?;
        }

        let mut active: production_request::ActiveModel = request.into();
        active.status = Set(ProductionRequestStatus::Completed.as_str().to_string());
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        info!(request = %updated.number, "Completed production request");
        for item in low_stock {
            self.emit(Event::StockBelowMinimum {
                item_id: item.id,
                code: item.code,
                current_stock: item.current_stock,
                stock_minimum: item.stock_minimum,
            })
            .await;
        }
        Ok(updated)
    }

    /// PENDING/APPROVED → REJECTED; an approved request releases the
    /// reservations taken at approval so none are orphaned.
    #[instrument(skip(self))]
    pub async fn reject_request(
        &self,
        request_id: Uuid,
        actor_id: Uuid,
    ) -> Result<production_request::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let request = self.get_request(&txn, request_id).await?;
        let current = request_status(&request)?;
        if !current.can_transition_to(ProductionRequestStatus::Rejected) {
            return Err(ServiceError::InvalidStatus(format!(
                "production request {} cannot be rejected from {}",
                request.number,
                current.as_str()
            )));
        }

        if current == ProductionRequestStatus::Approved {
            let materials = self.materials_of(&txn, request_id).await?;
            for material in &materials {
                reservation::release(
                    &txn,
                    material.item_id,
                    material.quantity,
                    actor_id,
                    &format!("production request {} rejected", request.number),
                )
                .await?;
            }
        }

        let mut active: production_request::ActiveModel = request.into();
        active.status = Set(ProductionRequestStatus::Rejected.as_str().to_string());
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        info!(request = %updated.number, "Rejected production request");
        Ok(updated)
    }

    /// Incremental completion report from the shop floor.
    ///
    /// Adds to `produced_qty`/`ready_qty`, brings the finished goods into
    /// stock (IN journal) and flips the line to DONE exactly when the
    /// produced total reaches the requested quantity. Over-reporting is
    /// rejected.
    #[instrument(skip(self))]
    pub async fn report_progress(
        &self,
        line_id: Uuid,
        additional_qty: i32,
        actor_id: Uuid,
    ) -> Result<work_order_line::Model, ServiceError> {
        if additional_qty <= 0 {
            return Err(ServiceError::ValidationError(
                "progress quantity must be positive".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let line = WorkOrderLineEntity::find_by_id(line_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Work order line {} not found", line_id))
            })?;
        if line.method() != Some(FulfillmentMethod::Production) {
            return Err(ServiceError::InvalidStatus(format!(
                "line {} is not a PRODUCTION line",
                line.id
            )));
        }
        let status = line_status(&line)?;
        if !matches!(status, FulfillmentStatus::Pending) {
            return Err(ServiceError::InvalidStatus(format!(
                "line {} cannot take progress reports from {}",
                line.id,
                status.as_str()
            )));
        }
        if line.produced_qty + additional_qty > line.requested_qty {
            return Err(ServiceError::ValidationError(format!(
                "progress of {} would exceed requested quantity ({} of {} already produced)",
                additional_qty, line.produced_qty, line.requested_qty
            )));
        }

        let order = WorkOrderEntity::find_by_id(line.work_order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Work order {} not found", line.work_order_id))
            })?;
        let order_st = order_status(&order)?;
        if order_st.is_terminal() {
            return Err(ServiceError::InvalidStatus(format!(
                "work order {} is {} and cannot take progress",
                order.number,
                order_st.as_str()
            )));
        }

        // Finished-good item may not exist yet on the first report.
        let matcher = NormalizedNameMatcher;
        let item_id = match line.item_id {
            Some(id) => id,
            None => {
                let (item, _created) = catalog::resolve_or_create(
                    &txn,
                    &matcher,
                    &line.item_name,
                    ItemCategory::FinishedGood,
                    actor_id,
                )
                .await?;
                item.id
            }
        };

        stock_ledger::apply_stock_change(
            &txn,
            item_id,
            additional_qty,
            &format!("production output for work order {}", order.number),
            actor_id,
            Some(order.number.as_str()),
        )
        .await?;
        stock_ledger::record_transaction(
            &txn,
            item_id,
            TransactionDirection::Inbound,
            additional_qty,
            TransactionSource::Production,
            Some(order.number.as_str()),
            actor_id,
            None,
        )
        .await?;

        let produced = line.produced_qty + additional_qty;
        let ready = line.ready_qty + additional_qty;
        let done = produced >= line.requested_qty;

        let mut active: work_order_line::ActiveModel = line.into();
        active.item_id = Set(Some(item_id));
        active.produced_qty = Set(produced);
        active.ready_qty = Set(ready);
        if done {
            active.status = Set(FulfillmentStatus::Done.as_str().to_string());
        }
        let updated = active.update(&txn).await?;

        update_order_status_if_ready(&txn, updated.work_order_id).await?;
        txn.commit().await?;

        info!(
            line_id = %line_id,
            additional_qty = additional_qty,
            produced_qty = produced,
            done = done,
            "Recorded production progress"
        );
        self.emit(Event::ProductionProgressReported {
            line_id,
            additional_qty,
            produced_qty: produced,
        })
        .await;

        Ok(updated)
    }

    /// Final approval for PRODUCTION lines that reached DONE: the produced
    /// goods leave stock to the customer (OUT journal) and the line flips
    /// to COMPLETED.
    #[instrument(skip(self))]
    pub async fn approve_production(
        &self,
        line_ids: &[Uuid],
        actor_id: Uuid,
    ) -> Result<Vec<work_order_line::Model>, ServiceError> {
        let txn = self.db.begin().await?;
        let mut updated_lines = Vec::with_capacity(line_ids.len());
        let mut low_stock = Vec::new();

        for &line_id in line_ids {
            let line = WorkOrderLineEntity::find_by_id(line_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Work order line {} not found", line_id))
                })?;
            if line.method() != Some(FulfillmentMethod::Production) {
                return Err(ServiceError::InvalidStatus(format!(
                    "line {} is not a PRODUCTION line",
                    line.id
                )));
            }
            let status = line_status(&line)?;
            if status != FulfillmentStatus::Done {
                return Err(ServiceError::InvalidStatus(format!(
                    "line {} cannot be approved from {}",
                    line.id,
                    status.as_str()
                )));
            }
            let item_id = line.item_id.ok_or_else(|| {
                ServiceError::InternalError(format!("produced line {} has no item", line.id))
            })?;

            let order = WorkOrderEntity::find_by_id(line.work_order_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Work order {} not found", line.work_order_id))
                })?;

            let item_after = stock_ledger::apply_stock_change(
                &txn,
                item_id,
                -line.requested_qty,
                &format!("production approved out for work order {}", order.number),
                actor_id,
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
                TransactionSource::Production,
                Some(order.number.as_str()),
                actor_id,
                None,
            )
            .await?;

            let mut active: work_order_line::ActiveModel = line.into();
            active.status = Set(FulfillmentStatus::Completed.as_str().to_string());
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

    async fn get_request<C: ConnectionTrait>(
        &self,
        conn: &C,
        request_id: Uuid,
    ) -> Result<production_request::Model, ServiceError> {
        ProductionRequestEntity::find_by_id(request_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Production request {} not found", request_id))
            })
    }

    async fn materials_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        request_id: Uuid,
    ) -> Result<Vec<production_request_material::Model>, ServiceError> {
        Ok(MaterialEntity::find()
            .filter(production_request_material::Column::ProductionRequestId.eq(request_id))
            .all(conn)
            .await?)
    }
}

fn request_status(
    request: &production_request::Model,
) -> Result<ProductionRequestStatus, ServiceError> {
    request.status().ok_or_else(|| {
        ServiceError::InternalError(format!(
            "production request {} carries unknown status '{}'",
            request.number, request.status
        ))
    })
}

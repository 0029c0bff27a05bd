use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sourcing method for a work-order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FulfillmentMethod {
    /// Existing finished-good inventory, reserved at order creation.
    FromStock,
    /// Manufactured to order; raw materials drawn via production requests.
    Production,
    /// Purchased from a vendor via a linked purchase order.
    Trading,
}

impl FulfillmentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentMethod::FromStock => "FROM_STOCK",
            FulfillmentMethod::Production => "PRODUCTION",
            FulfillmentMethod::Trading => "TRADING",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "FROM_STOCK" => Some(FulfillmentMethod::FromStock),
            "PRODUCTION" => Some(FulfillmentMethod::Production),
            "TRADING" => Some(FulfillmentMethod::Trading),
            _ => None,
        }
    }
}

/// Per-line fulfillment status.
///
/// PENDING → RESERVED → DONE/COMPLETED/FULFILLED, or CANCELLED. Which
/// terminal chain applies depends on the line's method: FROM_STOCK lines go
/// RESERVED → COMPLETED (ready) → FULFILLED; PRODUCTION lines go
/// PENDING → DONE (produced in full) → COMPLETED; TRADING lines go
/// PENDING → FULFILLED at approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FulfillmentStatus {
    Pending,
    Reserved,
    Done,
    Completed,
    Fulfilled,
    Cancelled,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "PENDING",
            FulfillmentStatus::Reserved => "RESERVED",
            FulfillmentStatus::Done => "DONE",
            FulfillmentStatus::Completed => "COMPLETED",
            FulfillmentStatus::Fulfilled => "FULFILLED",
            FulfillmentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(FulfillmentStatus::Pending),
            "RESERVED" => Some(FulfillmentStatus::Reserved),
            "DONE" => Some(FulfillmentStatus::Done),
            "COMPLETED" => Some(FulfillmentStatus::Completed),
            "FULFILLED" => Some(FulfillmentStatus::Fulfilled),
            "CANCELLED" => Some(FulfillmentStatus::Cancelled),
            _ => None,
        }
    }

    /// Single authoritative transition table for line status.
    ///
    /// Cancellation is gated on FULFILLED only; whether COMPLETED means
    /// stock already left the warehouse depends on the line's method,
    /// which [`Model::is_consumed`] decides.
    pub fn can_transition_to(&self, next: FulfillmentStatus) -> bool {
        use FulfillmentStatus::*;
        if *self == next {
            return false;
        }
        if next == Cancelled {
            return !matches!(self, Fulfilled | Cancelled);
        }
        match (self, next) {
            (Pending, Reserved) => true,
            // PRODUCTION: produced in full, then approved out to customer.
            (Pending, Done) | (Done, Completed) => true,
            // FROM_STOCK: ready signal, then terminal fulfillment.
            (Reserved, Completed) | (Completed, Fulfilled) => true,
            // TRADING: vendor receipt + approval.
            (Pending, Fulfilled) => true,
            _ => false,
        }
    }
}

/// One line of a work order: a target item, a requested quantity and the
/// running counters the fulfillment workflows advance.
///
/// Invariants: `shipped_qty <= ready_qty <= requested_qty` and
/// `produced_qty <= requested_qty`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "work_order_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub work_order_id: Uuid,
    /// Resolved lazily for PRODUCTION/TRADING lines (by name match or
    /// catalog auto-creation); always set for FROM_STOCK lines.
    pub item_id: Option<Uuid>,
    pub item_name: String,
    pub requested_qty: i32,
    pub produced_qty: i32,
    pub ready_qty: i32,
    pub shipped_qty: i32,
    pub method: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn method(&self) -> Option<FulfillmentMethod> {
        FulfillmentMethod::from_str(&self.method)
    }

    pub fn status(&self) -> Option<FulfillmentStatus> {
        FulfillmentStatus::from_str(&self.status)
    }

    /// True when stock already left the warehouse for this line, so
    /// cancellation cannot claw it back. FROM_STOCK and TRADING lines
    /// consume stock at FULFILLED; PRODUCTION lines at COMPLETED, when
    /// final approval moves the produced goods out. A COMPLETED
    /// FROM_STOCK line is merely ready and still holds its reservation.
    pub fn is_consumed(&self) -> bool {
        match self.status() {
            Some(FulfillmentStatus::Fulfilled) => true,
            Some(FulfillmentStatus::Completed) => {
                self.method() == Some(FulfillmentMethod::Production)
            }
            _ => false,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::work_order::Entity",
        from = "Column::WorkOrderId",
        to = "super::work_order::Column::Id"
    )]
    WorkOrder,
    #[sea_orm(
        belongs_to = "super::item::Entity",
        from = "Column::ItemId",
        to = "super::item::Column::Id"
    )]
    Item,
}

impl Related<super::work_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorkOrder.def()
    }
}

impl Related<super::item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Item.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr> {
        let mut active_model = self;
        let now = Utc::now();
        if insert {
            active_model.created_at = Set(now);
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
        } else {
            active_model.updated_at = Set(Some(now));
        }
        Ok(active_model)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order-level status for a work order (SPK).
///
/// The only authority on legal moves is [`WorkOrderStatus::can_transition_to`];
/// call sites must not compare raw status strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkOrderStatus {
    Queue,
    InProgress,
    Partial,
    ReadyToShip,
    Shipping,
    Done,
    Cancelled,
}

impl WorkOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOrderStatus::Queue => "QUEUE",
            WorkOrderStatus::InProgress => "IN_PROGRESS",
            WorkOrderStatus::Partial => "PARTIAL",
            WorkOrderStatus::ReadyToShip => "READY_TO_SHIP",
            WorkOrderStatus::Shipping => "SHIPPING",
            WorkOrderStatus::Done => "DONE",
            WorkOrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "QUEUE" => Some(WorkOrderStatus::Queue),
            "IN_PROGRESS" => Some(WorkOrderStatus::InProgress),
            "PARTIAL" => Some(WorkOrderStatus::Partial),
            "READY_TO_SHIP" => Some(WorkOrderStatus::ReadyToShip),
            "SHIPPING" => Some(WorkOrderStatus::Shipping),
            "DONE" => Some(WorkOrderStatus::Done),
            "CANCELLED" => Some(WorkOrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkOrderStatus::Done | WorkOrderStatus::Cancelled)
    }

    /// Single authoritative transition table for order status.
    pub fn can_transition_to(&self, next: WorkOrderStatus) -> bool {
        use WorkOrderStatus::*;
        if *self == next {
            return false;
        }
        // Cancellation is reachable from any non-terminal state.
        if next == Cancelled {
            return !self.is_terminal();
        }
        match (self, next) {
            (Queue, InProgress) => true,
            // Progress aggregation can move an order to PARTIAL or
            // READY_TO_SHIP from either of the two working states.
            (InProgress, Partial) | (InProgress, ReadyToShip) => true,
            (Partial, ReadyToShip) | (ReadyToShip, Partial) => true,
            (Partial, Done) => true,
            (ReadyToShip, Shipping) => true,
            (Shipping, Partial) | (Shipping, Done) => true,
            _ => false,
        }
    }
}

/// A work order (SPK): an internal fulfillment order for a customer sale,
/// owning an ordered set of lines with differing sourcing methods.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "work_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub number: String,
    pub status: String,
    pub deadline: Option<DateTime<Utc>>,
    pub customer_name: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn status(&self) -> Option<WorkOrderStatus> {
        WorkOrderStatus::from_str(&self.status)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::work_order_line::Entity")]
    Lines,
}

impl Related<super::work_order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
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

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a production request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionRequestStatus {
    Pending,
    Approved,
    Completed,
    Rejected,
}

impl ProductionRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductionRequestStatus::Pending => "PENDING",
            ProductionRequestStatus::Approved => "APPROVED",
            ProductionRequestStatus::Completed => "COMPLETED",
            ProductionRequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ProductionRequestStatus::Pending),
            "APPROVED" => Some(ProductionRequestStatus::Approved),
            "COMPLETED" => Some(ProductionRequestStatus::Completed),
            "REJECTED" => Some(ProductionRequestStatus::Rejected),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: ProductionRequestStatus) -> bool {
        use ProductionRequestStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Approved, Completed) | (Pending, Rejected) | (Approved, Rejected)
        )
    }
}

/// Raw-material draw-down plan for a work order's PRODUCTION lines.
/// Approval reserves the listed materials; completion consumes them.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "production_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub number: String,
    pub work_order_number: String,
    pub status: String,
    pub requested_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn status(&self) -> Option<ProductionRequestStatus> {
        ProductionRequestStatus::from_str(&self.status)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::production_request_material::Entity")]
    Materials,
}

impl Related<super::production_request_material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Materials.def()
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

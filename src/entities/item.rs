use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog category for an inventory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemCategory {
    RawMaterial,
    FinishedGood,
}

impl ItemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::RawMaterial => "RAW_MATERIAL",
            ItemCategory::FinishedGood => "FINISHED_GOOD",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "RAW_MATERIAL" => Some(ItemCategory::RawMaterial),
            "FINISHED_GOOD" => Some(ItemCategory::FinishedGood),
            _ => None,
        }
    }
}

/// Inventory item with the two stock counters the reservation engine moves
/// in lockstep.
///
/// `current_stock` is physical on-hand quantity; `reserved_stock` is the
/// soft-held portion promised to open work orders. The invariant
/// `0 <= reserved_stock <= current_stock` holds after every committed
/// operation. Both counters are mutated only through the ledger and
/// reservation primitives, never written directly elsewhere.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub current_stock: i32,
    pub reserved_stock: i32,
    pub stock_minimum: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Quantity available for new reservations.
    pub fn available(&self) -> i32 {
        self.current_stock - self.reserved_stock
    }

    pub fn category(&self) -> Option<ItemCategory> {
        ItemCategory::from_str(&self.category)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

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

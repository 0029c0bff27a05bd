use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Physical movement direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionDirection {
    Inbound,
    Outbound,
}

impl TransactionDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionDirection::Inbound => "IN",
            TransactionDirection::Outbound => "OUT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "IN" => Some(TransactionDirection::Inbound),
            "OUT" => Some(TransactionDirection::Outbound),
            _ => None,
        }
    }
}

/// Business process that caused a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionSource {
    Production,
    Trading,
    CustomerOrder,
    Recycling,
    VendorReceipt,
    Manual,
}

impl TransactionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionSource::Production => "PRODUCTION",
            TransactionSource::Trading => "TRADING",
            TransactionSource::CustomerOrder => "CUSTOMER_ORDER",
            TransactionSource::Recycling => "RECYCLING",
            TransactionSource::VendorReceipt => "VENDOR_RECEIPT",
            TransactionSource::Manual => "MANUAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PRODUCTION" => Some(TransactionSource::Production),
            "TRADING" => Some(TransactionSource::Trading),
            "CUSTOMER_ORDER" => Some(TransactionSource::CustomerOrder),
            "RECYCLING" => Some(TransactionSource::Recycling),
            "VENDOR_RECEIPT" => Some(TransactionSource::VendorReceipt),
            "MANUAL" => Some(TransactionSource::Manual),
            _ => None,
        }
    }
}

/// Journal entry: one immutable row per physical movement, feeding
/// reporting and reconciliation independently of the item counters.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub item_id: Uuid,
    pub direction: String,
    pub source: String,
    pub quantity: i32,
    // Precision 16 is the widest the SQLite schema builder accepts.
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub unit_price: Option<Decimal>,
    /// Linked work order / purchase order number, when applicable.
    pub order_reference: Option<String>,
    pub actor_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::item::Entity",
        from = "Column::ItemId",
        to = "super::item::Column::Id"
    )]
    Item,
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
        if insert {
            active_model.created_at = Set(Utc::now());
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
        }
        Ok(active_model)
    }
}

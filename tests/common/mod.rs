//! Test harness: a fresh file-backed SQLite database per test with the
//! schema bootstrapped from the entities, plus seeding helpers.

use std::sync::Arc;

use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use tempfile::TempDir;
use uuid::Uuid;

use gudang_core::entities::item::{self, ItemCategory};
use gudang_core::services::{
    ProductionService, PurchasingService, RecyclingService, WorkOrderService,
};
use gudang_core::{db, events};

pub struct TestCtx {
    pub db: Arc<DatabaseConnection>,
    pub actor: Uuid,
    pub work_orders: WorkOrderService,
    pub production: ProductionService,
    pub purchasing: PurchasingService,
    pub recycling: RecyclingService,
    _dir: TempDir,
}

pub async fn setup() -> TestCtx {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("gudang_test.db").display()
    );

    let conn = db::establish_connection(&url).await.expect("db connect");
    db::init_schema(&conn).await.expect("schema init");
    let db = Arc::new(conn);

    // Events are drained by a background logger; tests only assert that
    // workflows never fail because of the sink.
    let (sender, receiver) = events::channel(64);
    tokio::spawn(events::process_events(receiver));

    TestCtx {
        work_orders: WorkOrderService::new(db.clone(), Some(sender.clone())),
        production: ProductionService::new(db.clone(), Some(sender.clone())),
        purchasing: PurchasingService::new(db.clone(), Some(sender.clone())),
        recycling: RecyclingService::new(db.clone(), Some(sender)),
        actor: Uuid::new_v4(),
        db,
        _dir: dir,
    }
}

/// Inserts a catalog item with the given counters.
pub async fn seed_item(
    db: &DatabaseConnection,
    code: &str,
    name: &str,
    category: ItemCategory,
    current_stock: i32,
    reserved_stock: i32,
) -> item::Model {
    item::ActiveModel {
        code: Set(code.to_string()),
        name: Set(name.to_string()),
        category: Set(category.as_str().to_string()),
        unit: Set("pcs".to_string()),
        current_stock: Set(current_stock),
        reserved_stock: Set(reserved_stock),
        stock_minimum: Set(0),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed item")
}

/// Re-reads an item's counters.
pub async fn stock_of(db: &DatabaseConnection, item_id: Uuid) -> (i32, i32) {
    let it = item::Entity::find_by_id(item_id)
        .one(db)
        .await
        .expect("query item")
        .expect("item exists");
    (it.current_stock, it.reserved_stock)
}

use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::entities;

/// Type alias for a database connection pool.
pub type DbPool = DatabaseConnection;

/// Establishes a connection pool to the database.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, DbErr> {
    let mut opt = ConnectOptions::new(database_url.to_string());
    opt.max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(false);

    debug!(url = database_url, "Connecting to database");
    let pool = Database::connect(opt).await?;
    info!("Database connection established");
    Ok(pool)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    establish_connection(&cfg.database_url).await
}

/// Creates the schema for every entity in this crate when it does not
/// exist yet. Used for SQLite development/test databases; production
/// deployments manage the schema with migrations instead.
pub async fn init_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut statements = vec![
        schema.create_table_from_entity(entities::item::Entity),
        schema.create_table_from_entity(entities::stock_history::Entity),
        schema.create_table_from_entity(entities::stock_transaction::Entity),
        schema.create_table_from_entity(entities::work_order::Entity),
        schema.create_table_from_entity(entities::work_order_line::Entity),
        schema.create_table_from_entity(entities::production_request::Entity),
        schema.create_table_from_entity(entities::production_request_material::Entity),
        schema.create_table_from_entity(entities::purchase_order::Entity),
        schema.create_table_from_entity(entities::purchase_order_line::Entity),
        schema.create_table_from_entity(entities::waste_stock::Entity),
    ];

    for statement in &mut statements {
        statement.if_not_exists();
        db.execute(backend.build(&*statement)).await?;
    }

    Ok(())
}

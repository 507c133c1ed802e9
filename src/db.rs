use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::entities;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Establishes a connection pool to the database with custom configuration.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, DbErr> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .sqlx_logging(true);

    info!(
        "Connecting to database with max_connections={}",
        config.max_connections
    );
    Database::connect(opt).await
}

/// Establishes a connection pool using the application configuration.
pub async fn establish_connection_from_app_config(config: &AppConfig) -> Result<DbPool, DbErr> {
    establish_connection_with_config(&DbConfig {
        url: config.database_url.clone(),
        max_connections: config.db_max_connections,
        min_connections: config.db_min_connections,
        connect_timeout: Duration::from_secs(config.db_connect_timeout_secs),
    })
    .await
}

/// Creates the service's tables from the entity definitions when they do
/// not exist yet. Production schemas are owned by the hosted platform; this
/// covers sqlite development databases and the test rig.
pub async fn setup_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut pending = schema.create_table_from_entity(entities::PendingPurchase);
    db.execute(backend.build(pending.if_not_exists())).await?;

    let mut history = schema.create_table_from_entity(entities::PurchaseHistory);
    db.execute(backend.build(history.if_not_exists())).await?;

    Ok(())
}

use dropship_core::CoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Maps a sqlx failure onto the domain taxonomy. Driver detail is logged, not returned.
pub(crate) fn db_error(e: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_foreign_key_violation() {
            let constraint = db.constraint().unwrap_or("unknown");
            if constraint.contains("product") {
                return CoreError::NotFound("product referenced by order does not exist".to_string());
            }
            return CoreError::NotFound(format!("referenced row missing ({})", constraint));
        }
    }
    error!("Database error: {}", e);
    CoreError::PersistenceError("storage operation failed".to_string())
}

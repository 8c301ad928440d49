//! Global database connection pool

use once_cell::sync::OnceCell;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::time::Duration;

static DB_POOL: OnceCell<DatabaseConnection> = OnceCell::new();

/// Connects to the database and stores the pool globally. Later calls are ignored.
pub async fn init_db(database_url: String) -> Result<(), DbErr> {
    if DB_POOL.get().is_some() {
        return Ok(());
    }

    let mut options = ConnectOptions::new(database_url);
    options
        .max_connections(32)
        .connect_timeout(Duration::from_secs(8))
        .sqlx_logging(false);

    let pool = Database::connect(options).await?;

    if DB_POOL.set(pool).is_err() {
        log::debug!("Database pool was initialized concurrently; keeping the first.");
    }
    Ok(())
}

/// Returns the global pool. Panics if `init_db` has not run.
pub fn get_db_pool() -> &'static DatabaseConnection {
    DB_POOL
        .get()
        .expect("Database pool accessed before init_db.")
}

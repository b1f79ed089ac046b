pub mod api;
pub mod config;
pub mod context;
pub mod cover_letter;
pub mod errors;
pub mod models;
pub mod observability;
pub mod schema;
pub mod tasks;
#[cfg(test)]
pub mod test_helpers;
pub mod web_ui;

use actix_web::web;
use diesel::r2d2::{self, ConnectionManager};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub type RqDbPool = web::Data<DbPool>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/migrations");

pub fn initialize_db_pool(db_path: &str) -> Result<DbPool, r2d2::PoolError> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    r2d2::Pool::builder().build(manager)
}

/// Brings the schema up to date. Safe to call on every start.
pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut conn = pool.get()?;
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    if !applied.is_empty() {
        log::info!("Applied {} database migration(s)", applied.len());
    }
    Ok(())
}

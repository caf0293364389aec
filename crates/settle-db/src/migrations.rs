//! Schema migrations, embedded from `migrations/sqlite/` at compile time.
//!
//! ```text
//! Database::new ──► _sqlx_migrations ──► apply what is missing, in order
//!                                          001_initial_schema.sql
//!                                          002_...               (future)
//! ```
//!
//! Applied files are checksummed; edit the schema by adding a new
//! `NNN_description.sql`, never by changing an applied one.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!(embedded = MIGRATOR.migrations.len(), "Schema up to date");
    Ok(())
}

/// `(embedded, applied)`. A fresh database reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((MIGRATOR.migrations.len(), usize::try_from(applied).unwrap_or(0)))
}

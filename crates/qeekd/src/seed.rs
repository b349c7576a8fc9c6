//! Test-data seeding through the raw-SQL escape hatch.

use std::path::Path;
use tracing::info;

use qeek_common::QeekError;

use crate::store::StoreClient;

/// Seeding is refused in production unless the override flag is set.
pub fn seeding_allowed(environment: &str, allow_in_production: bool) -> bool {
    environment != "production" || allow_in_production
}

/// Run the seed SQL file against the store.
pub async fn seed_database(client: &StoreClient, sql_path: &Path) -> Result<(), QeekError> {
    let sql = std::fs::read_to_string(sql_path)?;

    client
        .exec_sql(&sql)
        .await
        .map_err(|e| QeekError::Store(e.to_string()))?;

    info!("Seed data applied from {}", sql_path.display());
    Ok(())
}

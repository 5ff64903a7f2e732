//! Database migration command.

use crate::output;
use waitroom_core::error::AppError;
use waitroom_database::DatabasePool;

/// Apply every pending migration
pub async fn execute(config_path: &str) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let pool = DatabasePool::connect(&config.database).await?;

    println!("Running database migrations...");
    waitroom_database::migration::run_migrations(pool.pool()).await?;
    pool.close().await;

    output::print_success("All migrations applied successfully.");
    Ok(())
}

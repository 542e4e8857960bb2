//! SurrealDB schema migrations and initialization
//!
//! Sets up the association table used by [`crate::SurrealKeyValueStore`].

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Table holding object PID → resource map PID associations.
pub const ASSOCIATIONS_TABLE: &str = "rm_associations";

/// Initialize all tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing rmap SurrealDB schema");
    init_associations_table(db).await?;
    Ok(())
}

/// Initialize `rm_associations` table
///
/// Schema:
/// ```text
/// TABLE rm_associations {
///   key:         STRING (object PID, unique)
///   value:       STRING (resource map PID)
///   updated_at:  DATETIME
/// }
/// ```
///
/// Constraints:
/// - `key` is unique (one association per object, last write wins)
async fn init_associations_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing rm_associations table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS rm_associations SCHEMAFULL;
        DEFINE FIELD IF NOT EXISTS key ON rm_associations TYPE string;
        DEFINE FIELD IF NOT EXISTS value ON rm_associations TYPE string;
        DEFINE FIELD IF NOT EXISTS updated_at ON rm_associations TYPE datetime DEFAULT time::now();
        DEFINE INDEX IF NOT EXISTS idx_association_key ON rm_associations FIELDS key UNIQUE;
    "#;

    db.query(sql)
        .await
        .map_err(|e| crate::StateError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| crate::StateError::SchemaSetup(e.to_string()))?;
    debug!("rm_associations table initialized");
    Ok(())
}

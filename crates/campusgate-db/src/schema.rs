//! Schema definitions and migration runner for SurrealDB.
//!
//! Collections are SCHEMALESS so that nullable columns (contract dates,
//! guidance teacher) can hold `NULL`. Every always-present column is
//! still declared with a type, and lookup columns are indexed. UUIDs and
//! calendar dates are stored as strings.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "institutions_and_memberships",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- Institutions
DEFINE TABLE institutions SCHEMALESS;
DEFINE FIELD name ON TABLE institutions TYPE string;
DEFINE FIELD is_active ON TABLE institutions TYPE bool DEFAULT false;
DEFINE FIELD is_premium ON TABLE institutions TYPE bool DEFAULT false;
DEFINE FIELD payment_status ON TABLE institutions TYPE string \
    ASSERT $value IN ['pending', 'paid', 'overdue'];
DEFINE INDEX idx_institutions_name ON TABLE institutions COLUMNS name;
DEFINE INDEX idx_institutions_guidance ON TABLE institutions \
    COLUMNS guidance_teacher_id;
DEFINE INDEX idx_institutions_contract_end ON TABLE institutions \
    COLUMNS contract_end_date;

-- Memberships (user <-> institution)
DEFINE TABLE institution_memberships SCHEMALESS;
DEFINE FIELD user_id ON TABLE institution_memberships TYPE string;
DEFINE FIELD institution_id ON TABLE institution_memberships TYPE string;
DEFINE FIELD role ON TABLE institution_memberships TYPE string \
    ASSERT $value IN ['teacher', 'student'];
DEFINE FIELD is_active ON TABLE institution_memberships TYPE bool \
    DEFAULT true;
DEFINE INDEX idx_memberships_user ON TABLE institution_memberships \
    COLUMNS user_id;
DEFINE INDEX idx_memberships_institution ON TABLE institution_memberships \
    COLUMNS institution_id;

-- Teachers and students
DEFINE TABLE teachers SCHEMALESS;
DEFINE FIELD user_id ON TABLE teachers TYPE string;
DEFINE FIELD name ON TABLE teachers TYPE string;
DEFINE INDEX idx_teachers_user ON TABLE teachers COLUMNS user_id UNIQUE;

DEFINE TABLE students SCHEMALESS;

-- User profiles (keyed by identity-provider user id)
DEFINE TABLE user_profiles SCHEMALESS;
DEFINE FIELD role ON TABLE user_profiles TYPE string \
    ASSERT $value IN ['admin', 'teacher', 'student', 'individual'];
DEFINE FIELD display_name ON TABLE user_profiles TYPE string;
DEFINE FIELD email ON TABLE user_profiles TYPE string;

-- Institution admin credentials
DEFINE TABLE institution_admin_credentials SCHEMALESS;
DEFINE FIELD institution_id ON TABLE institution_admin_credentials \
    TYPE string;
DEFINE FIELD username ON TABLE institution_admin_credentials TYPE string;
DEFINE FIELD password_hash ON TABLE institution_admin_credentials \
    TYPE string;
DEFINE FIELD is_active ON TABLE institution_admin_credentials TYPE bool \
    DEFAULT true;
DEFINE INDEX idx_admin_credentials_login \
    ON TABLE institution_admin_credentials \
    COLUMNS institution_id, username UNIQUE;
";

/// Run all pending migrations.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "v{} '{}': {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "recording v{}: {}",
                    migration.version, e,
                ))
            })?;
    }

    Ok(())
}

/// Raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

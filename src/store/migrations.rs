//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "profiles",
        sql: r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                phone_number TEXT,
                role TEXT NOT NULL,
                onboarding_complete INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS customers (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL UNIQUE REFERENCES accounts(id),
                last_completed_step TEXT NOT NULL,
                address TEXT,
                financial_account_id TEXT
            );

            CREATE TABLE IF NOT EXISTS experts (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL UNIQUE REFERENCES accounts(id),
                last_completed_step TEXT NOT NULL,
                bio TEXT,
                years_of_experience INTEGER,
                address TEXT
            );

            CREATE TABLE IF NOT EXISTS dealers (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL UNIQUE REFERENCES accounts(id),
                last_completed_step TEXT NOT NULL,
                financial_account_id TEXT
            );

            CREATE TABLE IF NOT EXISTS businesses (
                id TEXT PRIMARY KEY,
                dealer_id TEXT NOT NULL UNIQUE REFERENCES dealers(id),
                name TEXT NOT NULL,
                phone_number TEXT,
                website TEXT,
                description TEXT
            );

            CREATE TABLE IF NOT EXISTS business_locations (
                id TEXT PRIMARY KEY,
                business_id TEXT NOT NULL REFERENCES businesses(id),
                name TEXT,
                line1 TEXT NOT NULL,
                line2 TEXT,
                city TEXT NOT NULL,
                state TEXT NOT NULL,
                zip_code TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_business_locations_business
                ON business_locations(business_id);

            CREATE TABLE IF NOT EXISTS keyed_children (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                code TEXT NOT NULL,
                others_text TEXT,
                position INTEGER NOT NULL DEFAULT 0,
                UNIQUE (owner_id, kind, code)
            );
            CREATE INDEX IF NOT EXISTS idx_keyed_children_owner
                ON keyed_children(owner_id, kind);
            CREATE INDEX IF NOT EXISTS idx_keyed_children_code
                ON keyed_children(kind, code);
        "#,
    },
    Migration {
        version: 2,
        name: "favourite_dealers",
        sql: r#"
            CREATE TABLE IF NOT EXISTS favourite_dealers (
                customer_id TEXT PRIMARY KEY REFERENCES customers(id),
                business_location_id TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 3,
        name: "expert_reminders_seeded",
        sql: r#"
            ALTER TABLE experts ADD COLUMN reminders_seeded INTEGER NOT NULL DEFAULT 0;
        "#,
    },
];

/// Run all pending migrations.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    let mut applied = 0;
    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
            applied += 1;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::info!(version, applied, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
pub async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Latest version known to this build.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}

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
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS acquisitions (
                id TEXT PRIMARY KEY,
                written_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS bulletins (
                id TEXT PRIMARY KEY,
                external_id TEXT NOT NULL UNIQUE,
                content TEXT,
                closed INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                written_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_bulletins_state ON bulletins(closed, failed);

            CREATE TABLE IF NOT EXISTS parties (
                id INTEGER PRIMARY KEY,
                status TEXT NOT NULL,
                tax_id TEXT,
                reg_id TEXT,
                full_name TEXT NOT NULL DEFAULT '',
                short_name TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_parties_status ON parties(status);
            CREATE INDEX IF NOT EXISTS idx_parties_tax_id ON parties(tax_id);

            CREATE TABLE IF NOT EXISTS matters (
                id INTEGER PRIMARY KEY,
                party_id INTEGER NOT NULL REFERENCES parties(id),
                case_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                lead_user_id INTEGER,
                assistant_user_id INTEGER,
                project_id INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_matters_party ON matters(party_id);

            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tracking_settings (
                case_id INTEGER PRIMARY KEY,
                disabled INTEGER
            );

            CREATE TABLE IF NOT EXISTS court_sessions (
                id INTEGER PRIMARY KEY,
                case_id INTEGER NOT NULL,
                stage INTEGER NOT NULL DEFAULT 0,
                is_current INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_court_sessions_case ON court_sessions(case_id);

            CREATE TABLE IF NOT EXISTS working_calendar (
                date TEXT PRIMARY KEY,
                is_working INTEGER
            );

            CREATE TABLE IF NOT EXISTS department_members (
                department_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                PRIMARY KEY (department_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS case_comments (
                id TEXT PRIMARY KEY,
                case_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                order_weight INTEGER NOT NULL,
                creator_user_id INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_case_comments_case ON case_comments(case_id);

            CREATE TABLE IF NOT EXISTS case_tasks (
                id TEXT PRIMARY KEY,
                case_id INTEGER NOT NULL,
                task_type_code INTEGER NOT NULL,
                executor_user_id INTEGER,
                court_session_id INTEGER NOT NULL,
                begin_date TEXT NOT NULL,
                plan_date TEXT NOT NULL,
                fact_date TEXT NOT NULL,
                status INTEGER NOT NULL,
                section_code INTEGER NOT NULL,
                creator_user_id INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_case_tasks_case ON case_tasks(case_id);

            CREATE TABLE IF NOT EXISTS potential_parties (
                id TEXT PRIMARY KEY,
                party_id INTEGER NOT NULL UNIQUE,
                status TEXT NOT NULL,
                bulletin_external_id TEXT NOT NULL,
                message_type TEXT,
                setting_key TEXT NOT NULL,
                project_name TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS action_settings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL,
                normalized_key TEXT NOT NULL UNIQUE,
                action TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS action_setting_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                setting_id INTEGER NOT NULL REFERENCES action_settings(id) ON DELETE CASCADE,
                executor_type TEXT NOT NULL,
                task_type_name TEXT NOT NULL,
                task_type_code INTEGER,
                time_limit_days INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_action_setting_tasks_setting
                ON action_setting_tasks(setting_id);
        "#,
    },
    Migration {
        version: 2,
        name: "bulletin_diagnostics",
        sql: r#"
            ALTER TABLE bulletins ADD COLUMN diagnostic TEXT;

            CREATE TABLE IF NOT EXISTS broken_bulletins (
                id TEXT PRIMARY KEY,
                bulletin_id TEXT NOT NULL,
                errors TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_broken_bulletins_bulletin
                ON broken_bulletins(bulletin_id);
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
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
        }
    }

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
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

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_conn() -> Connection {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        db.connect().unwrap()
    }

    #[tokio::test]
    async fn migrations_create_all_tables() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        for table in &[
            "acquisitions",
            "bulletins",
            "broken_bulletins",
            "parties",
            "matters",
            "projects",
            "tracking_settings",
            "court_sessions",
            "working_calendar",
            "department_members",
            "case_comments",
            "case_tasks",
            "potential_parties",
            "action_settings",
            "action_setting_tasks",
            "_migrations",
        ] {
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    libsql::params![*table],
                )
                .await
                .unwrap();
            let row = rows.next().await.unwrap().unwrap();
            let count: i64 = row.get(0).unwrap();
            assert_eq!(count, 1, "Table '{}' should exist", table);
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        let version = get_current_version(&conn).await.unwrap();
        assert_eq!(version, 2);
    }
}

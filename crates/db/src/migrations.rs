use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Count of applied migrations, or `None` when the migrations table
/// does not exist yet.
pub async fn applied_count(pool: &DbPool) -> Option<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .ok()
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use crate::connect_with_settings;

    use super::run_pending;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "quote",
        "quote_status_history",
        "department_approval",
        "approval_set",
        "rate_set",
        "calculation_result",
        "idx_quote_status",
        "idx_quote_status_history_quote_id",
    ];

    #[tokio::test]
    async fn migrations_create_the_managed_schema() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("in-memory pool");
        run_pending(&pool).await.expect("migrations apply");

        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'index') AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&pool)
        .await
        .expect("schema listing");

        let names: Vec<String> =
            rows.iter().filter_map(|row| row.try_get::<String, _>("name").ok()).collect();
        for object in MANAGED_SCHEMA_OBJECTS {
            assert!(names.iter().any(|name| name == object), "missing schema object `{object}`");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("in-memory pool");
        run_pending(&pool).await.expect("first run");
        run_pending(&pool).await.expect("second run is a no-op");
    }
}

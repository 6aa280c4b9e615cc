//! Database schema for reports and provider aggregates.

use sqlx::PgPool;
use tally_core::error::AppError;

/// Statements creating the schema. Each is idempotent and must be executed
/// separately.
pub const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS reports (
        id UUID PRIMARY KEY,
        provider_id TEXT NOT NULL,
        report_name TEXT NOT NULL,
        release TEXT NOT NULL,
        year_month TEXT NOT NULL,
        payload JSONB,
        downloaded_at TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        failed_attempts INTEGER,
        failed_reason TEXT,
        CONSTRAINT uk_reports_key UNIQUE (provider_id, report_name, release, year_month)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_reports_provider ON reports(provider_id)",
    r#"CREATE TABLE IF NOT EXISTS provider_aggregates (
        provider_id TEXT PRIMARY KEY,
        earliest_report TEXT,
        latest_report TEXT,
        report_types TEXT[] NOT NULL DEFAULT '{}',
        has_failed_report BOOLEAN NOT NULL DEFAULT FALSE,
        report_error_codes TEXT[] NOT NULL DEFAULT '{}',
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
];

/// Creates the tables and indexes if they do not exist.
pub async fn init_schema(pool: &PgPool) -> Result<(), AppError> {
    for statement in MIGRATIONS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(AppError::DatabaseError)?;
    }
    tracing::debug!(statements = MIGRATIONS.len(), "Schema initialized");
    Ok(())
}

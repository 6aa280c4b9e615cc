//! Report repository for PostgreSQL.
//!
//! Every mutation runs in one transaction that first locks the provider's
//! `provider_aggregates` row, then applies the change, then recomputes the
//! aggregates from all of the provider's reports. Writers for the same
//! provider are serialized on that row lock; writers for different providers
//! never block each other.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Pool, Postgres};
use uuid::Uuid;

use tally_core::aggregate::recompute;
use tally_core::error::AppError;
use tally_core::models::{ProviderAggregates, ReportRecord, ReportSummary, YearMonth};
use tally_core::traits::ReportStore;

/// Column list for report SELECT queries.
const REPORT_COLUMNS: &str = "id, provider_id, report_name, release, year_month, payload, downloaded_at, created_at, failed_attempts, failed_reason";

/// Repository for harvested reports and provider aggregates.
///
/// # Examples
///
/// ```no_run
/// use sqlx::postgres::PgPoolOptions;
/// use tally_db::ReportRepository;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPoolOptions::new()
///     .max_connections(5)
///     .connect("postgresql://localhost/tally")
///     .await?;
///
/// let repo = ReportRepository::new(pool);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ReportRepository {
    pool: Pool<Postgres>,
}

impl ReportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a report and recomputes the provider's aggregates.
    ///
    /// `created_at` of an existing row is preserved.
    pub async fn upsert(&self, report: &ReportRecord) -> Result<Uuid, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::DatabaseError)?;
        lock_provider(&mut tx, &report.provider_id).await?;

        let rec: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO reports (
                id,
                provider_id,
                report_name,
                release,
                year_month,
                payload,
                downloaded_at,
                created_at,
                failed_attempts,
                failed_reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id)
            DO UPDATE SET
                payload = EXCLUDED.payload,
                downloaded_at = EXCLUDED.downloaded_at,
                failed_attempts = EXCLUDED.failed_attempts,
                failed_reason = EXCLUDED.failed_reason
            RETURNING id
            "#,
        )
        .bind(report.id)
        .bind(&report.provider_id)
        .bind(&report.report_name)
        .bind(&report.release)
        .bind(report.year_month.to_string())
        .bind(&report.payload)
        .bind(report.downloaded_at)
        .bind(report.created_at)
        .bind(report.failed_attempts)
        .bind(&report.failed_reason)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::DatabaseError)?;

        refresh_aggregates(&mut tx, &report.provider_id).await?;
        tx.commit().await.map_err(AppError::DatabaseError)?;

        Ok(rec.0)
    }

    /// Deletes a report and recomputes its provider's aggregates.
    ///
    /// Returns true if a row was deleted.
    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let provider: Option<(String,)> =
            sqlx::query_as("SELECT provider_id FROM reports WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(AppError::DatabaseError)?;
        let Some((provider_id,)) = provider else {
            return Ok(false);
        };

        let mut tx = self.pool.begin().await.map_err(AppError::DatabaseError)?;
        lock_provider(&mut tx, &provider_id).await?;

        let result = sqlx::query("DELETE FROM reports WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::DatabaseError)?;

        if result.rows_affected() == 0 {
            // Deleted concurrently; that writer already refreshed the aggregates.
            tx.rollback().await.map_err(AppError::DatabaseError)?;
            return Ok(false);
        }

        refresh_aggregates(&mut tx, &provider_id).await?;
        tx.commit().await.map_err(AppError::DatabaseError)?;
        Ok(true)
    }

    /// Retrieves a report by id.
    pub async fn get(&self, id: Uuid) -> Result<Option<ReportRecord>, AppError> {
        let query = format!("SELECT {} FROM reports WHERE id = $1", REPORT_COLUMNS);
        let row = sqlx::query_as::<_, ReportRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        row.map(ReportRow::into_record).transpose()
    }

    /// Months with a successfully stored report for this key.
    pub async fn successful_months(
        &self,
        provider_id: &str,
        report_name: &str,
        release: &str,
    ) -> Result<BTreeSet<YearMonth>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT year_month
            FROM reports
            WHERE provider_id = $1
              AND report_name = $2
              AND release = $3
              AND failed_attempts IS NULL
            "#,
        )
        .bind(provider_id)
        .bind(report_name)
        .bind(release)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        rows.into_iter().map(|(month,)| month.parse()).collect()
    }

    /// Reads the stored aggregates of a provider.
    pub async fn provider_aggregates(
        &self,
        provider_id: &str,
    ) -> Result<Option<ProviderAggregates>, AppError> {
        let row = sqlx::query_as::<_, AggregateRow>(
            r#"
            SELECT earliest_report, latest_report, report_types, has_failed_report, report_error_codes
            FROM provider_aggregates
            WHERE provider_id = $1
            "#,
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        row.map(AggregateRow::into_aggregates).transpose()
    }

    /// Lists a provider's reports ordered by report name and month.
    pub async fn list_for_provider(&self, provider_id: &str) -> Result<Vec<ReportRecord>, AppError> {
        let query = format!(
            "SELECT {} FROM reports WHERE provider_id = $1 ORDER BY report_name, year_month",
            REPORT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReportRow>(&query)
            .bind(provider_id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        rows.into_iter().map(ReportRow::into_record).collect()
    }

    /// Checks database connectivity by executing a simple query.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(())
    }
}

/// Takes the provider's aggregate row lock for the rest of the transaction,
/// creating the row on first use.
async fn lock_provider(conn: &mut PgConnection, provider_id: &str) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO provider_aggregates (provider_id) VALUES ($1) ON CONFLICT (provider_id) DO NOTHING",
    )
    .bind(provider_id)
    .execute(&mut *conn)
    .await
    .map_err(AppError::DatabaseError)?;

    sqlx::query("SELECT provider_id FROM provider_aggregates WHERE provider_id = $1 FOR UPDATE")
        .bind(provider_id)
        .execute(&mut *conn)
        .await
        .map_err(AppError::DatabaseError)?;

    Ok(())
}

/// Recomputes the provider's aggregates from its reports.
///
/// Must run in the transaction holding the provider's lock.
async fn refresh_aggregates(conn: &mut PgConnection, provider_id: &str) -> Result<(), AppError> {
    let rows = sqlx::query_as::<_, SummaryRow>(
        r#"
        SELECT report_name, year_month, failed_attempts, failed_reason
        FROM reports
        WHERE provider_id = $1
        "#,
    )
    .bind(provider_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(AppError::DatabaseError)?;

    let summaries = rows
        .into_iter()
        .map(SummaryRow::into_summary)
        .collect::<Result<Vec<_>, _>>()?;
    let aggregates = recompute(&summaries);

    sqlx::query(
        r#"
        UPDATE provider_aggregates
        SET earliest_report = $2,
            latest_report = $3,
            report_types = $4,
            has_failed_report = $5,
            report_error_codes = $6,
            updated_at = NOW()
        WHERE provider_id = $1
        "#,
    )
    .bind(provider_id)
    .bind(aggregates.earliest_report.map(|m| m.to_string()))
    .bind(aggregates.latest_report.map(|m| m.to_string()))
    .bind(&aggregates.report_types)
    .bind(aggregates.has_failed_report)
    .bind(&aggregates.report_error_codes)
    .execute(&mut *conn)
    .await
    .map_err(AppError::DatabaseError)?;

    tracing::debug!(
        provider_id,
        has_failed_report = aggregates.has_failed_report,
        "Provider aggregates refreshed"
    );
    Ok(())
}

// =============================================================================
// Helper Types for Database Mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: Uuid,
    provider_id: String,
    report_name: String,
    release: String,
    year_month: String,
    payload: Option<serde_json::Value>,
    downloaded_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    failed_attempts: Option<i32>,
    failed_reason: Option<String>,
}

impl ReportRow {
    fn into_record(self) -> Result<ReportRecord, AppError> {
        Ok(ReportRecord {
            id: self.id,
            provider_id: self.provider_id,
            report_name: self.report_name,
            release: self.release,
            year_month: self.year_month.parse()?,
            payload: self.payload,
            downloaded_at: self.downloaded_at,
            created_at: self.created_at,
            failed_attempts: self.failed_attempts,
            failed_reason: self.failed_reason,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    report_name: String,
    year_month: String,
    failed_attempts: Option<i32>,
    failed_reason: Option<String>,
}

impl SummaryRow {
    fn into_summary(self) -> Result<ReportSummary, AppError> {
        Ok(ReportSummary {
            report_name: self.report_name,
            year_month: self.year_month.parse()?,
            failed_attempts: self.failed_attempts,
            failed_reason: self.failed_reason,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AggregateRow {
    earliest_report: Option<String>,
    latest_report: Option<String>,
    report_types: Vec<String>,
    has_failed_report: bool,
    report_error_codes: Vec<String>,
}

impl AggregateRow {
    fn into_aggregates(self) -> Result<ProviderAggregates, AppError> {
        Ok(ProviderAggregates {
            earliest_report: self.earliest_report.as_deref().map(str::parse::<YearMonth>).transpose()?,
            latest_report: self.latest_report.as_deref().map(str::parse::<YearMonth>).transpose()?,
            report_types: self.report_types,
            has_failed_report: self.has_failed_report,
            report_error_codes: self.report_error_codes,
        })
    }
}

// =============================================================================
// Trait Implementation: ReportStore
// =============================================================================

impl ReportStore for ReportRepository {
    async fn upsert(&self, report: &ReportRecord) -> Result<Uuid, AppError> {
        ReportRepository::upsert(self, report).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        ReportRepository::delete(self, id).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<ReportRecord>, AppError> {
        ReportRepository::get(self, id).await
    }

    async fn successful_months(
        &self,
        provider_id: &str,
        report_name: &str,
        release: &str,
    ) -> Result<BTreeSet<YearMonth>, AppError> {
        ReportRepository::successful_months(self, provider_id, report_name, release).await
    }

    async fn provider_aggregates(
        &self,
        provider_id: &str,
    ) -> Result<Option<ProviderAggregates>, AppError> {
        ReportRepository::provider_aggregates(self, provider_id).await
    }

    async fn list_for_provider(&self, provider_id: &str) -> Result<Vec<ReportRecord>, AppError> {
        ReportRepository::list_for_provider(self, provider_id).await
    }

    async fn health_check(&self) -> Result<(), AppError> {
        ReportRepository::health_check(self).await
    }
}

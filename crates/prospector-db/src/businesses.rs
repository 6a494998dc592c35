//! Database operations for the `businesses` table, and the Postgres
//! [`RecordSink`] the pipeline persists through.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Acquire, PgPool, Postgres, Transaction};

use prospector_core::sink::{RecordSink, SinkError, SinkOutcome};
use prospector_core::BusinessRecord;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `businesses` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BusinessRow {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub addresses: Vec<String>,
    pub services: Vec<String>,
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub raw_attributes: serde_json::Value,
    pub business_type: String,
    pub location: String,
    pub scraped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const BUSINESS_COLUMNS: &str = "id, external_id, name, website, phone, addresses, services, \
     rating, review_count, raw_attributes, business_type, location, \
     scraped_at, created_at, updated_at";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns all businesses stored for a `(business_type, location)` query,
/// ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_businesses(
    pool: &PgPool,
    business_type: &str,
    location: &str,
) -> Result<Vec<BusinessRow>, DbError> {
    let rows = sqlx::query_as::<_, BusinessRow>(&format!(
        "SELECT {BUSINESS_COLUMNS} FROM businesses \
         WHERE business_type = $1 AND location = $2 \
         ORDER BY name"
    ))
    .bind(business_type)
    .bind(location)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns a single business by its target-side id, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_business_by_external_id(
    pool: &PgPool,
    external_id: &str,
) -> Result<Option<BusinessRow>, DbError> {
    let row = sqlx::query_as::<_, BusinessRow>(&format!(
        "SELECT {BUSINESS_COLUMNS} FROM businesses WHERE external_id = $1"
    ))
    .bind(external_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns the number of stored businesses for a `(business_type, location)`
/// query.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_businesses(
    pool: &PgPool,
    business_type: &str,
    location: &str,
) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM businesses WHERE business_type = $1 AND location = $2",
    )
    .bind(business_type)
    .bind(location)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Upserts one record inside the given transaction, keyed by `external_id`.
async fn upsert_business(
    tx: &mut Transaction<'_, Postgres>,
    record: &BusinessRecord,
    business_type: &str,
    location: &str,
) -> Result<(), sqlx::Error> {
    let services: Vec<String> = record.services.iter().cloned().collect();
    let review_count: Option<i32> = record.review_count.and_then(|c| i32::try_from(c).ok());

    sqlx::query(
        "INSERT INTO businesses \
            (external_id, name, website, phone, addresses, services, rating, \
             review_count, raw_attributes, business_type, location, scraped_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW()) \
         ON CONFLICT (external_id) DO UPDATE SET \
            name = EXCLUDED.name, \
            website = EXCLUDED.website, \
            phone = EXCLUDED.phone, \
            addresses = EXCLUDED.addresses, \
            services = EXCLUDED.services, \
            rating = EXCLUDED.rating, \
            review_count = EXCLUDED.review_count, \
            raw_attributes = EXCLUDED.raw_attributes, \
            business_type = EXCLUDED.business_type, \
            location = EXCLUDED.location, \
            scraped_at = NOW(), \
            updated_at = NOW()",
    )
    .bind(&record.external_id)
    .bind(&record.name)
    .bind(record.website.as_deref())
    .bind(record.phone.as_deref())
    .bind(&record.addresses)
    .bind(&services)
    .bind(record.rating)
    .bind(review_count)
    .bind(Json(&record.raw_attributes))
    .bind(business_type)
    .bind(location)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Postgres-backed [`RecordSink`]. Each batch runs in one transaction with a
/// savepoint per record, so a rejected record rolls back alone and the rest
/// of the batch still commits.
pub struct PgSink {
    pool: PgPool,
    business_type: String,
    location: String,
}

impl PgSink {
    #[must_use]
    pub fn new(
        pool: PgPool,
        business_type: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            business_type: business_type.into(),
            location: location.into(),
        }
    }
}

impl RecordSink for PgSink {
    async fn persist(&mut self, batch: &[BusinessRecord]) -> Result<SinkOutcome, SinkError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        let mut outcome = SinkOutcome::default();
        for record in batch {
            // Nested transaction = savepoint; a failed record rolls back to
            // here without poisoning the outer transaction.
            let mut savepoint = tx
                .begin()
                .await
                .map_err(|e| SinkError::Batch(e.to_string()))?;
            match upsert_business(&mut savepoint, record, &self.business_type, &self.location)
                .await
            {
                Ok(()) => {
                    savepoint
                        .commit()
                        .await
                        .map_err(|e| SinkError::Batch(e.to_string()))?;
                    outcome.inserted += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        external_id = %record.external_id,
                        error = %err,
                        "record rejected by database"
                    );
                    if let Err(rollback_err) = savepoint.rollback().await {
                        return Err(SinkError::Batch(rollback_err.to_string()));
                    }
                    outcome
                        .failed
                        .push((record.external_id.clone(), err.to_string()));
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| SinkError::Batch(e.to_string()))?;
        Ok(outcome)
    }
}

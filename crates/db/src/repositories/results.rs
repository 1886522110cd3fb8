use sqlx::Row;

use tradedesk_core::calc::QuoteCalculationResult;
use tradedesk_core::domain::quote::QuoteId;
use tradedesk_core::errors::StoreError;

use super::backend_error;
use crate::DbPool;

/// Persists complete calculation outputs as currency-tagged JSON blobs
/// keyed by quote. Export renderers read these back as opaque data.
pub struct SqlCalculationResultRepository {
    pool: DbPool,
}

impl SqlCalculationResultRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(
        &self,
        quote_id: &QuoteId,
        result: &QuoteCalculationResult,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(result).map_err(backend_error)?;
        sqlx::query(
            "INSERT INTO calculation_result (quote_id, currency, payload, calculated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(quote_id) DO UPDATE SET
                 currency = excluded.currency,
                 payload = excluded.payload,
                 calculated_at = excluded.calculated_at",
        )
        .bind(&quote_id.0)
        .bind(result.currency.code())
        .bind(payload)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;
        Ok(())
    }

    pub async fn find_by_quote(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Option<QuoteCalculationResult>, StoreError> {
        let row = sqlx::query("SELECT payload FROM calculation_result WHERE quote_id = ?")
            .bind(&quote_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;

        match row {
            Some(row) => {
                let payload: String = row.try_get("payload").map_err(backend_error)?;
                serde_json::from_str(&payload).map(Some).map_err(backend_error)
            }
            None => Ok(None),
        }
    }
}

use async_trait::async_trait;
use sqlx::Row;

use tradedesk_core::domain::currency::Currency;
use tradedesk_core::domain::quote::{ParallelStages, Quote, QuoteId, TransitionRecord};
use tradedesk_core::domain::status::WorkflowStatus;
use tradedesk_core::errors::StoreError;
use tradedesk_core::workflow::QuoteStore;

use super::{backend_error, parse_timestamp};
use crate::DbPool;

pub struct SqlQuoteRepository {
    pool: DbPool,
}

impl SqlQuoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_quote(row: &sqlx::sqlite::SqliteRow) -> Result<Quote, StoreError> {
    let id: String = row.try_get("id").map_err(backend_error)?;
    let number: String = row.try_get("number").map_err(backend_error)?;
    let status_raw: String = row.try_get("status").map_err(backend_error)?;
    let currency_raw: String = row.try_get("quote_currency").map_err(backend_error)?;
    let logistics_done: bool = row.try_get("logistics_done").map_err(backend_error)?;
    let customs_done: bool = row.try_get("customs_done").map_err(backend_error)?;
    let version: i64 = row.try_get("version").map_err(backend_error)?;
    let created_at: String = row.try_get("created_at").map_err(backend_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(backend_error)?;

    let status = WorkflowStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Backend(format!("unknown stored status `{status_raw}`")))?;
    let quote_currency = Currency::parse(&currency_raw)
        .ok_or_else(|| StoreError::Backend(format!("unknown stored currency `{currency_raw}`")))?;

    Ok(Quote {
        id: QuoteId(id),
        number,
        status,
        quote_currency,
        parallel_stages: ParallelStages { logistics: logistics_done, customs: customs_done },
        version: version.max(0) as u64,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<TransitionRecord, StoreError> {
    let id: String = row.try_get("id").map_err(backend_error)?;
    let quote_id: String = row.try_get("quote_id").map_err(backend_error)?;
    let from_raw: String = row.try_get("from_status").map_err(backend_error)?;
    let to_raw: String = row.try_get("to_status").map_err(backend_error)?;
    let actor: String = row.try_get("actor").map_err(backend_error)?;
    let comment: Option<String> = row.try_get("comment").map_err(backend_error)?;
    let automatic: bool = row.try_get("automatic").map_err(backend_error)?;
    let occurred_at: String = row.try_get("occurred_at").map_err(backend_error)?;

    let from_status = WorkflowStatus::parse(&from_raw)
        .ok_or_else(|| StoreError::Backend(format!("unknown stored status `{from_raw}`")))?;
    let to_status = WorkflowStatus::parse(&to_raw)
        .ok_or_else(|| StoreError::Backend(format!("unknown stored status `{to_raw}`")))?;

    Ok(TransitionRecord {
        id,
        quote_id: QuoteId(quote_id),
        from_status,
        to_status,
        actor,
        comment,
        automatic,
        occurred_at: parse_timestamp(&occurred_at, "occurred_at")?,
    })
}

#[async_trait]
impl QuoteStore for SqlQuoteRepository {
    async fn insert(&self, quote: Quote) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO quote (id, number, status, quote_currency, logistics_done,
                                customs_done, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&quote.id.0)
        .bind(&quote.number)
        .bind(quote.status.as_str())
        .bind(quote.quote_currency.code())
        .bind(quote.parallel_stages.logistics)
        .bind(quote.parallel_stages.customs)
        .bind(quote.version as i64)
        .bind(quote.created_at.to_rfc3339())
        .bind(quote.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;
        Ok(())
    }

    async fn get(&self, id: &QuoteId) -> Result<Quote, StoreError> {
        let row = sqlx::query(
            "SELECT id, number, status, quote_currency, logistics_done, customs_done,
                    version, created_at, updated_at
             FROM quote WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        match row {
            Some(ref row) => row_to_quote(row),
            None => Err(StoreError::NotFound(id.0.clone())),
        }
    }

    /// Compare-and-swap on the version column. Zero affected rows means
    /// either a lost race or a missing record; a follow-up existence
    /// probe distinguishes the two.
    async fn update(&self, quote: Quote, expected_version: u64) -> Result<Quote, StoreError> {
        let new_version = expected_version + 1;
        let result = sqlx::query(
            "UPDATE quote
             SET number = ?, status = ?, quote_currency = ?, logistics_done = ?,
                 customs_done = ?, version = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&quote.number)
        .bind(quote.status.as_str())
        .bind(quote.quote_currency.code())
        .bind(quote.parallel_stages.logistics)
        .bind(quote.parallel_stages.customs)
        .bind(new_version as i64)
        .bind(quote.updated_at.to_rfc3339())
        .bind(&quote.id.0)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        if result.rows_affected() == 0 {
            return match self.get(&quote.id).await {
                Ok(_) => Err(StoreError::Conflict(quote.id.0.clone())),
                Err(StoreError::NotFound(id)) => Err(StoreError::NotFound(id)),
                Err(other) => Err(other),
            };
        }

        let mut stored = quote;
        stored.version = new_version;
        Ok(stored)
    }

    async fn append_history(&self, record: TransitionRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO quote_status_history (id, quote_id, from_status, to_status, actor,
                                               comment, automatic, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.quote_id.0)
        .bind(record.from_status.as_str())
        .bind(record.to_status.as_str())
        .bind(&record.actor)
        .bind(&record.comment)
        .bind(record.automatic)
        .bind(record.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;
        Ok(())
    }

    async fn history(&self, id: &QuoteId) -> Result<Vec<TransitionRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, quote_id, from_status, to_status, actor, comment, automatic, occurred_at
             FROM quote_status_history
             WHERE quote_id = ?
             ORDER BY occurred_at, id",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        rows.iter().map(row_to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use tradedesk_core::domain::currency::Currency;
    use tradedesk_core::domain::quote::{Quote, QuoteId};
    use tradedesk_core::domain::status::WorkflowStatus;
    use tradedesk_core::errors::StoreError;
    use tradedesk_core::workflow::QuoteStore;

    use crate::connect_with_settings;
    use crate::migrations::run_pending;

    use super::SqlQuoteRepository;

    async fn repository() -> SqlQuoteRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("in-memory pool");
        run_pending(&pool).await.expect("migrations apply");
        SqlQuoteRepository::new(pool)
    }

    fn quote() -> Quote {
        Quote::new(QuoteId("Q-1".to_owned()), "TD-2026-0001", Currency::Usd, Utc::now())
    }

    #[tokio::test]
    async fn round_trips_a_quote_record() {
        let repo = repository().await;
        let quote = quote();
        repo.insert(quote.clone()).await.expect("insert");

        let found = repo.get(&quote.id).await.expect("get");
        assert_eq!(found.number, quote.number);
        assert_eq!(found.status, WorkflowStatus::Draft);
        assert_eq!(found.version, 0);
    }

    #[tokio::test]
    async fn conditional_update_rejects_stale_versions() {
        let repo = repository().await;
        let quote = quote();
        repo.insert(quote.clone()).await.expect("insert");

        let mut first = quote.clone();
        first.status = WorkflowStatus::PendingProcurement;
        let stored = repo.update(first, 0).await.expect("first writer wins");
        assert_eq!(stored.version, 1);

        let mut second = quote.clone();
        second.status = WorkflowStatus::Cancelled;
        let error = repo.update(second, 0).await.expect_err("stale writer loses");
        assert!(matches!(error, StoreError::Conflict(_)));

        let current = repo.get(&quote.id).await.expect("get");
        assert_eq!(current.status, WorkflowStatus::PendingProcurement);
    }

    #[tokio::test]
    async fn missing_quote_is_not_found() {
        let repo = repository().await;
        let error = repo.get(&QuoteId("Q-404".to_owned())).await.expect_err("absent");
        assert!(matches!(error, StoreError::NotFound(_)));
    }
}

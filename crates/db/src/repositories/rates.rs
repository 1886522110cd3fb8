use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use tracing::warn;

use tradedesk_core::domain::currency::Currency;
use tradedesk_core::errors::StoreError;
use tradedesk_core::fx::{RateSource, RateSourceError, RateTable};

use super::backend_error;
use crate::DbPool;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Persisted daily rate tables, consulted before the network source.
pub struct SqlRateStore {
    pool: DbPool,
}

impl SqlRateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_date(&self, date: NaiveDate) -> Result<Option<RateTable>, StoreError> {
        let rows = sqlx::query(
            "SELECT currency, rate_to_rub FROM rate_set WHERE rate_date = ?",
        )
        .bind(date.format(DATE_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut rates = Vec::with_capacity(rows.len());
        for row in &rows {
            let currency_raw: String = row.try_get("currency").map_err(backend_error)?;
            let rate_raw: String = row.try_get("rate_to_rub").map_err(backend_error)?;
            let currency = Currency::parse(&currency_raw).ok_or_else(|| {
                StoreError::Backend(format!("unknown stored currency `{currency_raw}`"))
            })?;
            let rate: Decimal = rate_raw.parse().map_err(|error| {
                StoreError::Backend(format!("bad stored rate `{rate_raw}`: {error}"))
            })?;
            rates.push((currency, rate));
        }

        Ok(Some(RateTable::new(rates)))
    }

    pub async fn save(&self, date: NaiveDate, table: &RateTable) -> Result<(), StoreError> {
        let fetched_at = Utc::now().to_rfc3339();
        for (currency, rate) in table.iter() {
            sqlx::query(
                "INSERT INTO rate_set (rate_date, currency, rate_to_rub, fetched_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(rate_date, currency) DO UPDATE SET
                     rate_to_rub = excluded.rate_to_rub,
                     fetched_at = excluded.fetched_at",
            )
            .bind(date.format(DATE_FORMAT).to_string())
            .bind(currency.code())
            .bind(rate.to_string())
            .bind(&fetched_at)
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        }
        Ok(())
    }
}

/// Rate source that reads through the database cache: stored sets are
/// served without touching the network, fresh fetches are persisted
/// best-effort.
pub struct CachingRateSource<S> {
    store: SqlRateStore,
    inner: S,
}

impl<S> CachingRateSource<S> {
    pub fn new(store: SqlRateStore, inner: S) -> Self {
        Self { store, inner }
    }
}

#[async_trait]
impl<S> RateSource for CachingRateSource<S>
where
    S: RateSource,
{
    async fn fetch_rates(&self, date: NaiveDate) -> Result<Option<RateTable>, RateSourceError> {
        match self.store.find_by_date(date).await {
            Ok(Some(table)) => return Ok(Some(table)),
            Ok(None) => {}
            Err(error) => {
                warn!(
                    event_name = "rates.cache_read_failed",
                    date = %date,
                    error = %error,
                    "rate cache unavailable, falling through to the source"
                );
            }
        }

        let fetched = self.inner.fetch_rates(date).await?;
        if let Some(table) = &fetched {
            if let Err(error) = self.store.save(date, table).await {
                warn!(
                    event_name = "rates.cache_write_failed",
                    date = %date,
                    error = %error,
                    "failed to persist fetched rate set"
                );
            }
        }
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use tradedesk_core::domain::currency::Currency;
    use tradedesk_core::fx::{InMemoryRateSource, RateSource, RateTable};

    use crate::connect_with_settings;
    use crate::migrations::run_pending;

    use super::{CachingRateSource, SqlRateStore};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 3).expect("valid date")
    }

    fn table() -> RateTable {
        RateTable::new([
            (Currency::Usd, Decimal::new(90_00, 2)),
            (Currency::Eur, Decimal::new(99_00, 2)),
        ])
    }

    async fn store() -> SqlRateStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("in-memory pool");
        run_pending(&pool).await.expect("migrations apply");
        SqlRateStore::new(pool)
    }

    #[tokio::test]
    async fn rate_tables_round_trip_through_the_store() {
        let store = store().await;
        store.save(date(), &table()).await.expect("save");

        let found = store.find_by_date(date()).await.expect("find").expect("present");
        assert_eq!(found.rate_to_rub(Currency::Usd), Some(Decimal::new(90_00, 2)));
        assert_eq!(found.rate_to_rub(Currency::Eur), Some(Decimal::new(99_00, 2)));

        let absent = store
            .find_by_date(date().succ_opt().expect("next day"))
            .await
            .expect("find");
        assert!(absent.is_none());
    }

    #[tokio::test]
    async fn caching_source_persists_fetched_sets_and_skips_refetches() {
        let caching = CachingRateSource::new(store().await, InMemoryRateSource::new([(
            date(),
            table(),
        )]));

        let first = caching.fetch_rates(date()).await.expect("fetch");
        assert!(first.is_some());
        assert_eq!(caching.inner.fetches(), 1);

        let second = caching.fetch_rates(date()).await.expect("cached fetch");
        assert!(second.is_some());
        assert_eq!(caching.inner.fetches(), 1);
    }
}

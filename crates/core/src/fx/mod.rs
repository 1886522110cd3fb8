use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::domain::currency::{round_money, Currency};

/// The rate source does not publish on non-business days; the converter
/// walks back at most this many dates looking for the latest set.
pub const MAX_RATE_LOOKBACK_DAYS: u64 = 7;

/// One day's exchange rates, each expressed as units of RUB per one
/// unit of the foreign currency.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    rates: HashMap<Currency, Decimal>,
}

impl RateTable {
    pub fn new(rates: impl IntoIterator<Item = (Currency, Decimal)>) -> Self {
        Self { rates: rates.into_iter().filter(|(currency, _)| *currency != Currency::Rub).collect() }
    }

    pub fn rate_to_rub(&self, currency: Currency) -> Option<Decimal> {
        if currency == Currency::Rub {
            return Some(Decimal::ONE);
        }
        self.rates.get(&currency).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Currency, Decimal)> + '_ {
        self.rates.iter().map(|(currency, rate)| (*currency, *rate))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("rate source failure: {0}")]
pub struct RateSourceError(pub String);

/// Boundary contract for the external daily-rate publisher. `Ok(None)`
/// means "no rate set published for this date" (weekend or holiday).
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rates(&self, date: NaiveDate) -> Result<Option<RateTable>, RateSourceError>;
}

/// Converts amounts between supported currencies through RUB, the only
/// anchor the rate source publishes against.
pub struct CurrencyConverter<S> {
    source: S,
    cache: RwLock<HashMap<NaiveDate, RateTable>>,
}

impl<S> CurrencyConverter<S>
where
    S: RateSource,
{
    pub fn new(source: S) -> Self {
        Self { source, cache: RwLock::new(HashMap::new()) }
    }

    /// Converts `amount` from one currency to another using the most
    /// recent rate set at or before `as_of`.
    ///
    /// Fail-open by design: when no usable rate survives the lookback,
    /// the original amount is returned unconverted and a warning is
    /// logged. Availability wins over correctness during a rate-source
    /// outage, and the degraded path stays observable.
    pub async fn convert(
        &self,
        amount: Decimal,
        from: Currency,
        to: Currency,
        as_of: NaiveDate,
    ) -> Decimal {
        if from == to {
            return amount;
        }
        if amount.is_zero() {
            return Decimal::ZERO;
        }

        let Some(table) = self.rates_for(as_of).await else {
            warn!(
                event_name = "fx.rates_unavailable",
                as_of = %as_of,
                from = from.code(),
                to = to.code(),
                "no rate set within lookback window, returning amount unconverted"
            );
            return amount;
        };

        let (Some(from_rate), Some(to_rate)) = (table.rate_to_rub(from), table.rate_to_rub(to))
        else {
            warn!(
                event_name = "fx.rate_missing",
                as_of = %as_of,
                from = from.code(),
                to = to.code(),
                "rate set lacks a required currency, returning amount unconverted"
            );
            return amount;
        };

        let amount_in_rub = amount * from_rate;
        round_money(amount_in_rub / to_rate, to)
    }

    /// Most recent rate set at or before `as_of`, walking back day by
    /// day across the bounded lookback window.
    pub async fn rates_for(&self, as_of: NaiveDate) -> Option<RateTable> {
        for offset in 0..MAX_RATE_LOOKBACK_DAYS {
            let Some(date) = as_of.checked_sub_days(Days::new(offset)) else {
                return None;
            };

            if let Some(table) = self.cached(date) {
                return Some(table);
            }

            match self.source.fetch_rates(date).await {
                Ok(Some(table)) if !table.is_empty() => {
                    self.store(date, table.clone());
                    return Some(table);
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(
                        event_name = "fx.fetch_failed",
                        date = %date,
                        error = %error,
                        "rate fetch failed, trying previous day"
                    );
                }
            }
        }

        None
    }

    fn cached(&self, date: NaiveDate) -> Option<RateTable> {
        match self.cache.read() {
            Ok(cache) => cache.get(&date).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&date).cloned(),
        }
    }

    fn store(&self, date: NaiveDate, table: RateTable) {
        match self.cache.write() {
            Ok(mut cache) => {
                cache.insert(date, table);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(date, table);
            }
        }
    }
}

/// Deterministic in-process source for tests and offline runs.
#[derive(Default)]
pub struct InMemoryRateSource {
    tables: HashMap<NaiveDate, RateTable>,
    fetch_count: std::sync::atomic::AtomicUsize,
}

impl InMemoryRateSource {
    pub fn new(tables: impl IntoIterator<Item = (NaiveDate, RateTable)>) -> Self {
        Self { tables: tables.into_iter().collect(), fetch_count: Default::default() }
    }

    pub fn fetches(&self) -> usize {
        self.fetch_count.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl RateSource for InMemoryRateSource {
    async fn fetch_rates(&self, date: NaiveDate) -> Result<Option<RateTable>, RateSourceError> {
        self.fetch_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.tables.get(&date).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use crate::domain::currency::Currency;

    use super::{CurrencyConverter, InMemoryRateSource, RateTable};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).expect("valid date")
    }

    fn table() -> RateTable {
        RateTable::new([
            (Currency::Usd, Decimal::new(90_00, 2)),
            (Currency::Eur, Decimal::new(99_00, 2)),
            (Currency::Cny, Decimal::new(12_50, 2)),
            (Currency::Try, Decimal::new(2_75, 2)),
        ])
    }

    #[tokio::test]
    async fn identity_conversion_is_exact_including_zero() {
        let converter = CurrencyConverter::new(InMemoryRateSource::default());

        let amount = Decimal::new(1234_56, 2);
        assert_eq!(converter.convert(amount, Currency::Eur, Currency::Eur, date(3)).await, amount);
        assert_eq!(
            converter.convert(Decimal::ZERO, Currency::Usd, Currency::Usd, date(3)).await,
            Decimal::ZERO
        );
    }

    #[tokio::test]
    async fn zero_amount_short_circuits_before_rate_lookup() {
        let source = InMemoryRateSource::default();
        let converter = CurrencyConverter::new(source);

        let converted =
            converter.convert(Decimal::ZERO, Currency::Usd, Currency::Eur, date(3)).await;

        assert_eq!(converted, Decimal::ZERO);
        assert_eq!(converter.source.fetches(), 0);
    }

    #[tokio::test]
    async fn converts_through_rub_for_two_foreign_currencies() {
        let converter =
            CurrencyConverter::new(InMemoryRateSource::new([(date(3), table())]));

        // 100 EUR -> 9900 RUB -> 110 USD at the fixture rates.
        let converted =
            converter.convert(Decimal::new(100_00, 2), Currency::Eur, Currency::Usd, date(3)).await;

        assert_eq!(converted, Decimal::new(110_00, 2));
    }

    #[tokio::test]
    async fn converts_to_and_from_the_anchor_currency() {
        let converter =
            CurrencyConverter::new(InMemoryRateSource::new([(date(3), table())]));

        let to_rub =
            converter.convert(Decimal::new(10_00, 2), Currency::Usd, Currency::Rub, date(3)).await;
        assert_eq!(to_rub, Decimal::new(900_00, 2));

        let from_rub =
            converter.convert(Decimal::new(900_00, 2), Currency::Rub, Currency::Usd, date(3)).await;
        assert_eq!(from_rub, Decimal::new(10_00, 2));
    }

    #[tokio::test]
    async fn round_trip_stays_within_one_minor_unit() {
        let converter =
            CurrencyConverter::new(InMemoryRateSource::new([(date(3), table())]));

        let original = Decimal::new(1234_57, 2);
        let there =
            converter.convert(original, Currency::Usd, Currency::Try, date(3)).await;
        let back = converter.convert(there, Currency::Try, Currency::Usd, date(3)).await;

        assert!((back - original).abs() <= Decimal::new(1, 2), "drifted to {back}");
    }

    #[tokio::test]
    async fn walks_back_to_the_most_recent_published_set() {
        // Nothing published on the 3rd or 2nd; the 1st has rates.
        let converter =
            CurrencyConverter::new(InMemoryRateSource::new([(date(1), table())]));

        let converted =
            converter.convert(Decimal::new(100_00, 2), Currency::Eur, Currency::Usd, date(3)).await;

        assert_eq!(converted, Decimal::new(110_00, 2));
        assert_eq!(converter.source.fetches(), 3);
    }

    #[tokio::test]
    async fn degrades_to_unconverted_amount_when_lookback_is_exhausted() {
        let converter = CurrencyConverter::new(InMemoryRateSource::default());

        let amount = Decimal::new(250_00, 2);
        let converted = converter.convert(amount, Currency::Cny, Currency::Usd, date(20)).await;

        assert_eq!(converted, amount);
        assert_eq!(converter.source.fetches(), 7);
    }

    #[tokio::test]
    async fn caches_fetched_tables_per_date() {
        let converter =
            CurrencyConverter::new(InMemoryRateSource::new([(date(3), table())]));

        let _ = converter.convert(Decimal::ONE, Currency::Eur, Currency::Usd, date(3)).await;
        let _ = converter.convert(Decimal::ONE, Currency::Usd, Currency::Eur, date(3)).await;

        assert_eq!(converter.source.fetches(), 1);
    }
}

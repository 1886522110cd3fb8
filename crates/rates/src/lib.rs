use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use tradedesk_core::domain::currency::Currency;
use tradedesk_core::fx::{RateSource, RateSourceError, RateTable};

/// Client for the central-bank daily-rates JSON feed. The feed anchors
/// every rate to RUB and publishes nothing on non-business days, which
/// the archive endpoint reports as 404.
pub struct CbrRateSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct DailyRates {
    #[serde(rename = "Valute")]
    valute: HashMap<String, ValuteEntry>,
}

#[derive(Debug, Deserialize)]
struct ValuteEntry {
    #[serde(rename = "CharCode")]
    char_code: String,
    #[serde(rename = "Nominal")]
    nominal: u32,
    #[serde(rename = "Value")]
    value: Decimal,
}

impl CbrRateSource {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, RateSourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|error| RateSourceError(error.to_string()))?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_owned() })
    }

    fn archive_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/archive/{:04}/{:02}/{:02}/daily_json.js",
            self.base_url,
            date.year(),
            date.month(),
            date.day()
        )
    }
}

/// Parses the feed payload into a rate table. Quotes arrive per
/// `Nominal` units (TRY is quoted per 10), so each value is scaled to
/// a per-unit rate. Currencies outside the supported set are skipped.
pub fn parse_daily_rates(payload: &str) -> Result<RateTable, RateSourceError> {
    let daily: DailyRates = serde_json::from_str(payload)
        .map_err(|error| RateSourceError(format!("malformed rate payload: {error}")))?;

    let mut rates = Vec::new();
    for entry in daily.valute.into_values() {
        let Some(currency) = Currency::parse(&entry.char_code) else {
            continue;
        };
        if entry.nominal == 0 {
            return Err(RateSourceError(format!(
                "zero nominal for currency `{}`",
                entry.char_code
            )));
        }
        rates.push((currency, entry.value / Decimal::from(entry.nominal)));
    }

    Ok(RateTable::new(rates))
}

#[async_trait]
impl RateSource for CbrRateSource {
    async fn fetch_rates(&self, date: NaiveDate) -> Result<Option<RateTable>, RateSourceError> {
        let url = self.archive_url(date);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|error| RateSourceError(format!("request to `{url}` failed: {error}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(event_name = "rates.not_published", date = %date, "no rate set for date");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(RateSourceError(format!(
                "rate source answered {} for `{url}`",
                response.status()
            )));
        }

        let payload = response
            .text()
            .await
            .map_err(|error| RateSourceError(format!("reading `{url}` failed: {error}")))?;
        parse_daily_rates(&payload).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use tradedesk_core::domain::currency::Currency;

    use super::{parse_daily_rates, CbrRateSource};

    const PAYLOAD: &str = r#"{
        "Date": "2025-03-03T11:30:00+03:00",
        "Valute": {
            "USD": {"CharCode": "USD", "Nominal": 1, "Value": 90.50},
            "EUR": {"CharCode": "EUR", "Nominal": 1, "Value": 99.25},
            "CNY": {"CharCode": "CNY", "Nominal": 1, "Value": 12.42},
            "TRY": {"CharCode": "TRY", "Nominal": 10, "Value": 27.50},
            "GBP": {"CharCode": "GBP", "Nominal": 1, "Value": 115.00}
        }
    }"#;

    #[test]
    fn parses_supported_currencies_and_scales_nominals() {
        let table = parse_daily_rates(PAYLOAD).expect("payload parses");

        assert_eq!(table.rate_to_rub(Currency::Usd), Some(Decimal::new(90_50, 2)));
        assert_eq!(table.rate_to_rub(Currency::Eur), Some(Decimal::new(99_25, 2)));
        // Quoted per 10 TRY; stored per unit.
        assert_eq!(table.rate_to_rub(Currency::Try), Some(Decimal::new(2_75, 2)));
        // Unsupported currencies are skipped, the anchor is implicit.
        assert_eq!(table.rate_to_rub(Currency::Rub), Some(Decimal::ONE));
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(parse_daily_rates("{not json").is_err());
    }

    #[test]
    fn archive_url_follows_the_feed_layout() {
        let source = CbrRateSource::new("https://rates.example/", 5).expect("client builds");
        let url = source.archive_url(NaiveDate::from_ymd_opt(2025, 3, 3).expect("valid date"));
        assert_eq!(url, "https://rates.example/archive/2025/03/03/daily_json.js");
    }
}

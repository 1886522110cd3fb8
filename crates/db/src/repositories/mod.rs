use chrono::{DateTime, Utc};

use tradedesk_core::errors::StoreError;

pub mod approval;
pub mod quote;
pub mod rates;
pub mod results;

pub use approval::SqlApprovalRepository;
pub use quote::SqlQuoteRepository;
pub use rates::{CachingRateSource, SqlRateStore};
pub use results::SqlCalculationResultRepository;

pub(crate) fn backend_error(error: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(error.to_string())
}

pub(crate) fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| StoreError::Backend(format!("bad `{column}` timestamp `{raw}`: {error}")))
}

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Serialize;

use tradedesk_core::fx::CurrencyConverter;
use tradedesk_rates::CbrRateSource;

use super::{load_config, runtime, CommandResult};

#[derive(Debug, Serialize)]
struct RateProbe {
    command: String,
    status: String,
    as_of: String,
    rates: Vec<RateLine>,
}

#[derive(Debug, Serialize)]
struct RateLine {
    currency: String,
    rate_to_rub: String,
}

pub fn run(config_path: Option<PathBuf>, date: Option<NaiveDate>) -> CommandResult {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "rates",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let as_of = date.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let source = match CbrRateSource::new(&config.rates.base_url, config.rates.timeout_secs) {
        Ok(source) => source,
        Err(error) => {
            return CommandResult::failure("rates", "rate_source_init", error.to_string(), 3);
        }
    };

    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "rates",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let converter = CurrencyConverter::new(source);
    let table = runtime.block_on(converter.rates_for(as_of));

    match table {
        Some(table) => {
            let mut rates: Vec<RateLine> = table
                .iter()
                .map(|(currency, rate)| RateLine {
                    currency: currency.code().to_owned(),
                    rate_to_rub: rate.to_string(),
                })
                .collect();
            rates.sort_by(|left, right| left.currency.cmp(&right.currency));
            let probe = RateProbe {
                command: "rates".to_owned(),
                status: "ok".to_owned(),
                as_of: as_of.to_string(),
                rates,
            };
            match serde_json::to_string_pretty(&probe) {
                Ok(output) => CommandResult::payload(output),
                Err(error) => {
                    CommandResult::failure("rates", "serialization", error.to_string(), 6)
                }
            }
        }
        None => CommandResult::failure(
            "rates",
            "rates_unavailable",
            format!("no rate set published within the lookback window ending {as_of}"),
            4,
        ),
    }
}

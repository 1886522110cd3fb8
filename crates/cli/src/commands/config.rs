use std::path::PathBuf;

use serde::Serialize;

use super::{load_config, CommandResult};

#[derive(Debug, Serialize)]
struct ConfigReport {
    command: String,
    status: String,
    database_url: String,
    database_max_connections: u32,
    logging_level: String,
    rates_base_url: String,
    rates_timeout_secs: u64,
    engine_annual_interest_pct: String,
    engine_financing_commission_pct: String,
    engine_insurance_rate_pct: String,
    engine_customs_due_days: u32,
    engine_default_vat_rate_pct: String,
    engine_transit_zone_countries: Vec<String>,
}

pub fn run(config_path: Option<PathBuf>) -> CommandResult {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let report = ConfigReport {
        command: "config".to_owned(),
        status: "ok".to_owned(),
        database_url: config.database.url,
        database_max_connections: config.database.max_connections,
        logging_level: config.logging.level,
        rates_base_url: config.rates.base_url,
        rates_timeout_secs: config.rates.timeout_secs,
        engine_annual_interest_pct: config.engine.annual_interest_pct.to_string(),
        engine_financing_commission_pct: config.engine.financing_commission_pct.to_string(),
        engine_insurance_rate_pct: config.engine.insurance_rate_pct.to_string(),
        engine_customs_due_days: config.engine.customs_due_days,
        engine_default_vat_rate_pct: config.engine.default_vat_rate_pct.to_string(),
        engine_transit_zone_countries: config
            .engine
            .transit_zone_countries
            .iter()
            .map(|country| country.as_str().to_owned())
            .collect(),
    };

    match serde_json::to_string_pretty(&report) {
        Ok(output) => CommandResult::payload(output),
        Err(error) => CommandResult::failure("config", "serialization", error.to_string(), 6),
    }
}

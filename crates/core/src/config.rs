use std::env;
use std::fs;
use std::path::PathBuf;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calc::input::RateConstants;
use crate::domain::trade::CountryCode;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub rates: RatesConfig,
    pub engine: EngineSettings,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug)]
pub struct RatesConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// System-wide engine constants and workflow-adjacent settings.
/// Built once at process start and passed by reference into the
/// resolver; never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub financing_commission_pct: Decimal,
    pub annual_interest_pct: Decimal,
    pub insurance_rate_pct: Decimal,
    pub customs_due_days: u32,
    pub default_vat_rate_pct: Decimal,
    pub transit_zone_countries: Vec<CountryCode>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            financing_commission_pct: Decimal::ONE,
            annual_interest_pct: Decimal::from(18),
            insurance_rate_pct: Decimal::new(3, 1),
            customs_due_days: 15,
            default_vat_rate_pct: Decimal::from(20),
            transit_zone_countries: ["KZ", "BY", "AM", "KG"]
                .into_iter()
                .filter_map(CountryCode::parse)
                .collect(),
        }
    }
}

impl EngineSettings {
    pub fn is_transit_country(&self, country: &CountryCode) -> bool {
        self.transit_zone_countries.contains(country)
    }

    pub fn rate_constants(&self) -> RateConstants {
        RateConstants {
            financing_commission_pct: self.financing_commission_pct,
            annual_interest_pct: self.annual_interest_pct,
            insurance_rate_pct: self.insurance_rate_pct,
            customs_due_days: self.customs_due_days,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub rates_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid configuration value for `{key}`: `{value}`")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    database: Option<DatabaseSection>,
    logging: Option<LoggingSection>,
    rates: Option<RatesSection>,
    engine: Option<EngineSection>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseSection {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct RatesSection {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EngineSection {
    financing_commission_pct: Option<Decimal>,
    annual_interest_pct: Option<Decimal>,
    insurance_rate_pct: Option<Decimal>,
    customs_due_days: Option<u32>,
    default_vat_rate_pct: Option<Decimal>,
    transit_zone_countries: Option<Vec<String>>,
}

const DEFAULT_CONFIG_PATH: &str = "tradedesk.toml";
const DEFAULT_DATABASE_URL: &str = "sqlite://tradedesk.db?mode=rwc";
const DEFAULT_RATES_BASE_URL: &str = "https://www.cbr-xml-daily.ru";

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<AppConfig, ConfigError> {
        let path =
            options.config_path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let file = match fs::read_to_string(&path) {
            Ok(raw) => toml::from_str::<ConfigFile>(&raw)
                .map_err(|source| ConfigError::ParseFile { path: path.clone(), source })?,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                if options.require_file {
                    return Err(ConfigError::MissingConfigFile(path));
                }
                ConfigFile::default()
            }
            Err(source) => return Err(ConfigError::ReadFile { path, source }),
        };

        Self::build(file, options.overrides)
    }

    fn build(file: ConfigFile, overrides: ConfigOverrides) -> Result<AppConfig, ConfigError> {
        let database_section = file.database.unwrap_or_default();
        let logging_section = file.logging.unwrap_or_default();
        let rates_section = file.rates.unwrap_or_default();
        let engine_section = file.engine.unwrap_or_default();

        let database = DatabaseConfig {
            url: overrides
                .database_url
                .or_else(|| env_var("TRADEDESK_DATABASE_URL"))
                .or(database_section.url)
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned()),
            max_connections: database_section.max_connections.unwrap_or(5),
            timeout_secs: database_section.timeout_secs.unwrap_or(30),
        };

        let level = overrides
            .log_level
            .or_else(|| env_var("TRADEDESK_LOG_LEVEL"))
            .or(logging_section.level)
            .unwrap_or_else(|| "info".to_owned());
        if level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::InvalidValue { key: "logging.level".to_owned(), value: level });
        }
        let logging =
            LoggingConfig { level, format: logging_section.format.unwrap_or(LogFormat::Compact) };

        let rates = RatesConfig {
            base_url: overrides
                .rates_base_url
                .or_else(|| env_var("TRADEDESK_RATES_URL"))
                .or(rates_section.base_url)
                .unwrap_or_else(|| DEFAULT_RATES_BASE_URL.to_owned()),
            timeout_secs: rates_section.timeout_secs.unwrap_or(5),
        };

        let defaults = EngineSettings::default();
        let transit_zone_countries = match engine_section.transit_zone_countries {
            Some(raw_countries) => {
                let mut countries = Vec::with_capacity(raw_countries.len());
                for raw in raw_countries {
                    let country = CountryCode::parse(&raw).ok_or_else(|| {
                        ConfigError::InvalidValue {
                            key: "engine.transit_zone_countries".to_owned(),
                            value: raw,
                        }
                    })?;
                    countries.push(country);
                }
                countries
            }
            None => defaults.transit_zone_countries,
        };
        let engine = EngineSettings {
            financing_commission_pct: engine_section
                .financing_commission_pct
                .unwrap_or(defaults.financing_commission_pct),
            annual_interest_pct: engine_section
                .annual_interest_pct
                .unwrap_or(defaults.annual_interest_pct),
            insurance_rate_pct: engine_section
                .insurance_rate_pct
                .unwrap_or(defaults.insurance_rate_pct),
            customs_due_days: engine_section.customs_due_days.unwrap_or(defaults.customs_due_days),
            default_vat_rate_pct: engine_section
                .default_vat_rate_pct
                .unwrap_or(defaults.default_vat_rate_pct),
            transit_zone_countries,
        };

        Ok(AppConfig { database, logging, rates, engine })
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use tradedesk_core::calc::engine::calculate_quote;
use tradedesk_core::calc::{VariableMap, VariableResolver};

use super::{load_config, CommandResult};

/// Input file shape: quote-level variables plus one override map per
/// product row (an empty map means "no overrides").
#[derive(Debug, Deserialize)]
struct CalculateRequest {
    quote: VariableMap,
    #[serde(default)]
    products: Vec<VariableMap>,
}

pub fn run(config_path: Option<PathBuf>, input: &Path) -> CommandResult {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "calculate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let raw = match fs::read_to_string(input) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "calculate",
                "input_read",
                format!("could not read `{}`: {error}", input.display()),
                3,
            );
        }
    };
    let request: CalculateRequest = match serde_json::from_str(&raw) {
        Ok(request) => request,
        Err(error) => {
            return CommandResult::failure(
                "calculate",
                "input_parse",
                format!("could not parse `{}`: {error}", input.display()),
                3,
            );
        }
    };

    let products = if request.products.is_empty() {
        vec![VariableMap::new()]
    } else {
        request.products
    };

    let resolver = VariableResolver::new(&config.engine);
    let inputs = match resolver.resolve_quote(&request.quote, &products) {
        Ok(inputs) => inputs,
        Err(error) => {
            return CommandResult::failure("calculate", "validation", error.to_string(), 4);
        }
    };

    let result = match calculate_quote(&inputs) {
        Ok(result) => result,
        Err(error) => {
            return CommandResult::failure("calculate", "calculation", error.to_string(), 5);
        }
    };

    match serde_json::to_string_pretty(&result) {
        Ok(output) => CommandResult::payload(output),
        Err(error) => CommandResult::failure("calculate", "serialization", error.to_string(), 6),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::run;

    #[test]
    fn calculates_a_quote_from_a_json_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{
                "quote": {{
                    "quote_currency": "USD",
                    "exchange_rate": 1.08,
                    "base_price_currency": "EUR",
                    "base_price_includes_vat": true,
                    "supplier_country": "DE",
                    "markup_pct": 15,
                    "insurance_rate_pct": 0
                }},
                "products": [
                    {{"base_price": 1000, "quantity": 10}}
                ]
            }}"#
        )
        .expect("write input");

        let result = run(None, file.path());

        assert_eq!(result.exit_code, 0, "output: {}", result.output);
        let payload: serde_json::Value =
            serde_json::from_str(&result.output).expect("json output");
        assert_eq!(payload["currency"], "USD");
        assert_eq!(payload["total_purchase"], "9000.00");
        assert_eq!(payload["total_sale_excl_vat"], "10350.00");
    }

    #[test]
    fn missing_required_variable_reports_validation_failure() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"quote": {{"quote_currency": "USD"}}, "products": [{{}}]}}"#
        )
        .expect("write input");

        let result = run(None, file.path());

        assert_eq!(result.exit_code, 4);
        assert!(result.output.contains("validation"));
    }
}

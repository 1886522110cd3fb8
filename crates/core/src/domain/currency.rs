use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Currencies the rate source publishes against RUB.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Rub,
    Cny,
    Try,
}

impl Currency {
    pub const ALL: [Currency; 5] =
        [Currency::Usd, Currency::Eur, Currency::Rub, Currency::Cny, Currency::Try];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Rub => "RUB",
            Currency::Cny => "CNY",
            Currency::Try => "TRY",
        }
    }

    pub fn parse(code: &str) -> Option<Currency> {
        match code.trim().to_ascii_uppercase().as_str() {
            "USD" => Some(Currency::Usd),
            "EUR" => Some(Currency::Eur),
            "RUB" => Some(Currency::Rub),
            "CNY" => Some(Currency::Cny),
            "TRY" => Some(Currency::Try),
            _ => None,
        }
    }

    /// All supported currencies settle to two minor-unit digits.
    pub fn minor_units(&self) -> u32 {
        2
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Half-up rounding to the currency minor unit, applied only at
/// designated calculation phase boundaries.
pub fn round_money(amount: Decimal, currency: Currency) -> Decimal {
    amount.round_dp_with_strategy(currency.minor_units(), RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{round_money, Currency};

    #[test]
    fn parse_accepts_known_codes_case_insensitively() {
        assert_eq!(Currency::parse("usd"), Some(Currency::Usd));
        assert_eq!(Currency::parse(" EUR "), Some(Currency::Eur));
        assert_eq!(Currency::parse("GBP"), None);
    }

    #[test]
    fn display_round_trips_through_parse() {
        for currency in Currency::ALL {
            assert_eq!(Currency::parse(currency.code()), Some(currency));
        }
    }

    #[test]
    fn rounds_half_away_from_zero_at_two_places() {
        assert_eq!(round_money(Decimal::new(10_125, 3), Currency::Usd), Decimal::new(1013, 2));
        assert_eq!(round_money(Decimal::new(-10_125, 3), Currency::Usd), Decimal::new(-1013, 2));
    }
}

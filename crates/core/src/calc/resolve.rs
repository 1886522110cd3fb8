use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calc::input::{
    ClearanceCosts, CompanyParams, CustomsRegime, FinancialParams, LogisticsAllocation,
    LogisticsParams, PaymentMilestone, PaymentSchedule, ProductParams, QuoteCalculationInput,
    TaxParams, MAX_PAYMENT_MILESTONES,
};
use crate::config::EngineSettings;
use crate::domain::currency::Currency;
use crate::domain::quote::ProductId;
use crate::domain::trade::{CountryCode, DmFeeMode, Incoterms, SaleType};
use crate::errors::ValidationError;

/// A raw calculation variable as delivered by the input surface
/// (spreadsheet upload or form submission). Null marks an absent
/// value; zero is a present value and never falls through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(Decimal),
    Text(String),
}

impl RawValue {
    fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

pub type VariableMap = BTreeMap<String, RawValue>;

/// Canonicalizes a percentage-like raw value. Upstream sources encode
/// "15 percent" as either `0.15` or `15`; values at or below 1 are
/// read as fractions and scaled to percentage form. The scale is
/// chosen so that normalizing an already-normalized value is a no-op.
/// A true sub-1% rate (for example 0.5%) cannot be expressed directly
/// and must arrive pre-scaled; this is a documented compatibility rule,
/// not an accident.
pub fn normalize_pct(value: Decimal) -> Decimal {
    if value <= Decimal::ONE {
        value * Decimal::ONE_HUNDRED
    } else {
        value
    }
}

/// Resolves raw quote variables plus optional per-product overrides
/// into one product's calculation input. Precedence per variable:
/// product override, then quote default, then system fallback.
pub struct VariableResolver<'a> {
    settings: &'a EngineSettings,
}

struct Scope<'a> {
    defaults: &'a VariableMap,
    overrides: Option<&'a VariableMap>,
    row: usize,
}

impl Scope<'_> {
    fn raw(&self, name: &str) -> Option<&RawValue> {
        self.overrides
            .and_then(|overrides| overrides.get(name))
            .filter(|value| !value.is_null())
            .or_else(|| self.defaults.get(name).filter(|value| !value.is_null()))
    }

    fn decimal_opt(&self, name: &str) -> Result<Option<Decimal>, ValidationError> {
        match self.raw(name) {
            None => Ok(None),
            Some(RawValue::Number(value)) => Ok(Some(*value)),
            Some(RawValue::Text(text)) => parse_decimal_text(text)
                .map(Some)
                .ok_or_else(|| ValidationError::InvalidValue {
                    field: name.to_owned(),
                    value: text.clone(),
                    row: self.row,
                    reason: "expected a decimal number".to_owned(),
                }),
            Some(RawValue::Bool(value)) => Err(ValidationError::InvalidValue {
                field: name.to_owned(),
                value: value.to_string(),
                row: self.row,
                reason: "expected a decimal number, got a boolean".to_owned(),
            }),
            Some(RawValue::Null) => Ok(None),
        }
    }

    fn required_decimal(&self, name: &str) -> Result<Decimal, ValidationError> {
        self.decimal_opt(name)?.ok_or_else(|| ValidationError::MissingField {
            field: name.to_owned(),
            row: self.row,
        })
    }

    fn decimal_or(&self, name: &str, fallback: Decimal) -> Result<Decimal, ValidationError> {
        Ok(self.decimal_opt(name)?.unwrap_or(fallback))
    }

    fn pct_or(&self, name: &str, fallback: Decimal) -> Result<Decimal, ValidationError> {
        Ok(self.decimal_opt(name)?.map(normalize_pct).unwrap_or(fallback))
    }

    fn text(&self, name: &str) -> Option<String> {
        match self.raw(name) {
            Some(RawValue::Text(text)) => Some(text.trim().to_owned()),
            Some(RawValue::Number(value)) => Some(value.to_string()),
            Some(RawValue::Bool(value)) => Some(value.to_string()),
            _ => None,
        }
    }

    fn required_text(&self, name: &str) -> Result<String, ValidationError> {
        self.text(name).filter(|text| !text.is_empty()).ok_or_else(|| {
            ValidationError::MissingField { field: name.to_owned(), row: self.row }
        })
    }

    fn bool_or(&self, name: &str, fallback: bool) -> Result<bool, ValidationError> {
        match self.raw(name) {
            None | Some(RawValue::Null) => Ok(fallback),
            Some(RawValue::Bool(value)) => Ok(*value),
            Some(RawValue::Number(value)) => Ok(!value.is_zero()),
            Some(RawValue::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" | "" => Ok(false),
                other => Err(ValidationError::InvalidValue {
                    field: name.to_owned(),
                    value: other.to_owned(),
                    row: self.row,
                    reason: "expected a boolean flag".to_owned(),
                }),
            },
        }
    }

    fn code<T>(
        &self,
        name: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<T, ValidationError> {
        let raw = self.required_text(name)?;
        parse(&raw).ok_or_else(|| ValidationError::UnknownCode {
            field: name.to_owned(),
            value: raw,
            row: self.row,
        })
    }

    fn code_or<T>(
        &self,
        name: &str,
        parse: impl Fn(&str) -> Option<T>,
        fallback: T,
    ) -> Result<T, ValidationError> {
        match self.text(name) {
            None => Ok(fallback),
            Some(raw) if raw.is_empty() => Ok(fallback),
            Some(raw) => parse(&raw).ok_or_else(|| ValidationError::UnknownCode {
                field: name.to_owned(),
                value: raw,
                row: self.row,
            }),
        }
    }
}

// Spreadsheet exports from decimal-comma locales arrive as "1 234,56".
fn parse_decimal_text(text: &str) -> Option<Decimal> {
    let cleaned: String =
        text.trim().chars().filter(|c| !c.is_whitespace()).map(|c| if c == ',' { '.' } else { c }).collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

impl<'a> VariableResolver<'a> {
    pub fn new(settings: &'a EngineSettings) -> Self {
        Self { settings }
    }

    /// Resolves one product line. `row` is the 1-based product row used
    /// in error messages.
    pub fn resolve_product(
        &self,
        quote_vars: &VariableMap,
        product_overrides: Option<&VariableMap>,
        row: usize,
    ) -> Result<QuoteCalculationInput, ValidationError> {
        let scope = Scope { defaults: quote_vars, overrides: product_overrides, row };
        let settings = self.settings;

        let quantity = scope.required_decimal("quantity")?;
        let unit_weight_kg = scope.decimal_or("unit_weight_kg", Decimal::ZERO)?;
        let product = ProductParams {
            product_id: ProductId(
                scope.text("product_id").unwrap_or_else(|| format!("row-{row}")),
            ),
            name: scope.text("product_name").unwrap_or_default(),
            quantity,
            unit_weight_kg,
            base_price: scope.required_decimal("base_price")?,
            base_price_currency: scope.code("base_price_currency", Currency::parse)?,
            base_price_includes_vat: scope.bool_or("base_price_includes_vat", false)?,
            supplier_vat_rate_pct: scope
                .pct_or("supplier_vat_rate_pct", settings.default_vat_rate_pct)?,
        };

        let dm_fee_mode = scope.code_or("dm_fee_mode", DmFeeMode::parse, DmFeeMode::Fixed)?;
        let dm_fee_raw = scope.decimal_or("dm_fee_value", Decimal::ZERO)?;
        let financial = FinancialParams {
            quote_currency: scope.code("quote_currency", Currency::parse)?,
            exchange_rate: scope.required_decimal("exchange_rate")?,
            discount_pct: scope.pct_or("discount_pct", Decimal::ZERO)?,
            markup_pct: scope.pct_or("markup_pct", Decimal::ZERO)?,
            forex_risk_pct: scope.pct_or("forex_risk_pct", Decimal::ZERO)?,
            dm_fee_mode,
            // A fixed fee is an absolute amount; only the percentage
            // mode goes through fraction normalization.
            dm_fee_value: match dm_fee_mode {
                DmFeeMode::Fixed => dm_fee_raw,
                DmFeeMode::PercentOfSale => normalize_pct(dm_fee_raw),
            },
        };

        let supplier_country = scope.code("supplier_country", CountryCode::parse)?;
        let allocation = match scope.decimal_opt("quote_total_weight_kg")? {
            Some(total_weight) if total_weight > Decimal::ZERO => {
                LogisticsAllocation::WeightShare(quantity * unit_weight_kg / total_weight)
            }
            _ => LogisticsAllocation::PerProduct,
        };
        let logistics = LogisticsParams {
            incoterms: scope.code_or("incoterms", Incoterms::parse, Incoterms::Exw)?,
            delivery_days: to_days(scope.decimal_or("delivery_days", Decimal::ZERO)?),
            supplier_to_hub: scope.decimal_or("logistics_supplier_to_hub", Decimal::ZERO)?,
            hub_to_customs: scope.decimal_or("logistics_hub_to_customs", Decimal::ZERO)?,
            customs_to_client: scope.decimal_or("logistics_customs_to_client", Decimal::ZERO)?,
            allocation,
            supplier_country: supplier_country.clone(),
        };

        let regime = if settings.is_transit_country(&supplier_country) {
            CustomsRegime::TransitZone
        } else {
            CustomsRegime::Standard
        };
        let taxes = TaxParams {
            regime,
            import_tariff_pct: scope.pct_or("import_tariff_pct", Decimal::ZERO)?,
            excise_pct: scope.pct_or("excise_pct", Decimal::ZERO)?,
            utilization_fee_pct: scope.pct_or("utilization_fee_pct", Decimal::ZERO)?,
            vat_rate_pct: scope.pct_or("vat_rate_pct", settings.default_vat_rate_pct)?,
        };

        let mut milestones = Vec::new();
        for slot in 1..=MAX_PAYMENT_MILESTONES {
            let Some(share) = scope.decimal_opt(&format!("payment_share_{slot}"))? else {
                continue;
            };
            if share.is_zero() {
                continue;
            }
            milestones.push(PaymentMilestone {
                share_pct: normalize_pct(share),
                day_offset: to_days(scope.decimal_or(&format!("payment_days_{slot}"), Decimal::ZERO)?),
            });
        }

        let clearance = ClearanceCosts {
            brokerage_at_hub: scope.decimal_or("brokerage_at_hub", Decimal::ZERO)?,
            brokerage_at_customs: scope.decimal_or("brokerage_at_customs", Decimal::ZERO)?,
            warehousing: scope.decimal_or("warehousing", Decimal::ZERO)?,
            documentation: scope.decimal_or("documentation", Decimal::ZERO)?,
            extra: scope.decimal_or("extra_clearance", Decimal::ZERO)?,
        };

        let company = CompanyParams {
            selling_entity: scope.text("selling_entity").unwrap_or_default(),
            sale_type: scope.code_or("sale_type", SaleType::parse, SaleType::Resale)?,
        };

        // Rate constants are maintained in percent form already (an
        // insurance rate of 0.3 means 0.3%), so fraction normalization
        // must not touch them.
        let constants = crate::calc::input::RateConstants {
            financing_commission_pct: scope
                .decimal_or("financing_commission_pct", settings.financing_commission_pct)?,
            annual_interest_pct: scope
                .decimal_or("annual_interest_pct", settings.annual_interest_pct)?,
            insurance_rate_pct: scope
                .decimal_or("insurance_rate_pct", settings.insurance_rate_pct)?,
            customs_due_days: to_days(
                scope.decimal_or("customs_due_days", Decimal::from(settings.customs_due_days))?,
            ),
        };

        Ok(QuoteCalculationInput {
            product,
            financial,
            logistics,
            taxes,
            payments: PaymentSchedule::new(milestones),
            clearance,
            company,
            constants,
        })
    }

    /// Resolves every product row of a quote. Override maps align with
    /// rows by position; a missing entry means "no overrides".
    pub fn resolve_quote(
        &self,
        quote_vars: &VariableMap,
        product_overrides: &[VariableMap],
    ) -> Result<Vec<QuoteCalculationInput>, ValidationError> {
        product_overrides
            .iter()
            .enumerate()
            .map(|(index, overrides)| self.resolve_product(quote_vars, Some(overrides), index + 1))
            .collect()
    }
}

fn to_days(value: Decimal) -> u32 {
    use rust_decimal::prelude::ToPrimitive;

    value.max(Decimal::ZERO).trunc().to_u32().unwrap_or(0)
}

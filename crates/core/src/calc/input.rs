use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::currency::Currency;
use crate::domain::quote::ProductId;
use crate::domain::trade::{CountryCode, DmFeeMode, Incoterms, SaleType};

/// Customs regime of the supplier country. Transit-zone countries value
/// goods at the purchase price alone; the standard regime adds the
/// first logistics leg to the valuation base.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomsRegime {
    Standard,
    TransitZone,
}

/// How quote-level logistics costs are attributed to this product.
/// `WeightShare` carries the product's fraction of total quote weight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogisticsAllocation {
    PerProduct,
    WeightShare(Decimal),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductParams {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: Decimal,
    pub unit_weight_kg: Decimal,
    /// Listed unit price in the supplier's own currency.
    pub base_price: Decimal,
    pub base_price_currency: Currency,
    pub base_price_includes_vat: bool,
    pub supplier_vat_rate_pct: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialParams {
    pub quote_currency: Currency,
    /// Units of quote currency per unit of the base-price currency,
    /// fixed for the quote. Not a rate lookup.
    pub exchange_rate: Decimal,
    pub discount_pct: Decimal,
    pub markup_pct: Decimal,
    pub forex_risk_pct: Decimal,
    pub dm_fee_mode: DmFeeMode,
    pub dm_fee_value: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogisticsParams {
    pub supplier_country: CountryCode,
    pub incoterms: Incoterms,
    pub delivery_days: u32,
    pub supplier_to_hub: Decimal,
    pub hub_to_customs: Decimal,
    pub customs_to_client: Decimal,
    pub allocation: LogisticsAllocation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxParams {
    pub regime: CustomsRegime,
    pub import_tariff_pct: Decimal,
    pub excise_pct: Decimal,
    pub utilization_fee_pct: Decimal,
    pub vat_rate_pct: Decimal,
}

pub const MAX_PAYMENT_MILESTONES: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMilestone {
    pub share_pct: Decimal,
    pub day_offset: u32,
}

/// Up to five payment milestones. An empty schedule means full payment
/// on day zero, which carries no financing cost.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSchedule {
    pub milestones: Vec<PaymentMilestone>,
}

impl PaymentSchedule {
    pub fn new(milestones: Vec<PaymentMilestone>) -> Self {
        Self { milestones }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearanceCosts {
    pub brokerage_at_hub: Decimal,
    pub brokerage_at_customs: Decimal,
    pub warehousing: Decimal,
    pub documentation: Decimal,
    pub extra: Decimal,
}

impl ClearanceCosts {
    pub fn total(&self) -> Decimal {
        self.brokerage_at_hub
            + self.brokerage_at_customs
            + self.warehousing
            + self.documentation
            + self.extra
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyParams {
    pub selling_entity: String,
    pub sale_type: SaleType,
}

/// System-wide rate constants, sourced from engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateConstants {
    pub financing_commission_pct: Decimal,
    pub annual_interest_pct: Decimal,
    pub insurance_rate_pct: Decimal,
    pub customs_due_days: u32,
}

/// One product line's complete calculation input. All monetary fields
/// except `base_price` are already expressed in the quote currency;
/// the engine performs no cross-currency conversion of its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteCalculationInput {
    pub product: ProductParams,
    pub financial: FinancialParams,
    pub logistics: LogisticsParams,
    pub taxes: TaxParams,
    pub payments: PaymentSchedule,
    pub clearance: ClearanceCosts,
    pub company: CompanyParams,
    pub constants: RateConstants,
}

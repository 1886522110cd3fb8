use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::currency::Currency;
use crate::domain::quote::ProductId;

/// Complete output of one per-product calculation. Every field is in
/// the quote currency and derived deterministically from the input;
/// persisted externally as a currency-tagged JSON blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCalculationResult {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub currency: Currency,

    // phases 1-3: purchase price
    pub purchase_price_gross_unit: Decimal,
    pub purchase_price_net_unit: Decimal,
    pub purchase_price_discounted_unit: Decimal,
    pub purchase_price_total: Decimal,

    // phase 4: logistics legs
    pub logistics_supplier_to_hub: Decimal,
    pub logistics_hub_to_customs: Decimal,
    pub logistics_customs_to_client: Decimal,
    pub logistics_total: Decimal,

    // phase 5: customs
    pub customs_value_base: Decimal,
    pub customs_duty: Decimal,
    pub excise: Decimal,
    pub utilization_fee: Decimal,
    pub customs_total: Decimal,

    // phase 6: cost of goods sold
    pub clearance_total: Decimal,
    pub insurance_cost: Decimal,
    pub cogs_unit: Decimal,
    pub cogs_total: Decimal,

    // phases 7-11: sale price build-up
    pub margin_amount: Decimal,
    pub sale_price_pre_financial: Decimal,
    pub dm_fee: Decimal,
    pub forex_reserve: Decimal,
    pub agent_fee: Decimal,
    pub sale_price_unit: Decimal,
    pub sale_price_total: Decimal,

    // phase 12: VAT
    pub output_vat: Decimal,
    pub import_vat: Decimal,
    pub import_vat_reclaimable: bool,
    pub net_vat_payable: Decimal,
    pub sale_price_with_vat: Decimal,

    // phase 13: financing and profit
    pub weighted_payment_days: Decimal,
    pub financing_cost: Decimal,
    pub transfer_price_excl_vat: Decimal,
    pub transfer_price_incl_vat: Decimal,
    pub profit_unit: Decimal,
    pub profit_total: Decimal,
    pub profit_margin_pct: Decimal,
}

/// Multi-product aggregate. Totals are pure sums of the per-product
/// results; nothing is re-derived here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteCalculationResult {
    pub currency: Currency,
    pub products: Vec<ProductCalculationResult>,
    pub total_purchase: Decimal,
    pub total_logistics: Decimal,
    pub total_customs: Decimal,
    pub total_cogs: Decimal,
    pub total_sale_excl_vat: Decimal,
    pub total_sale_incl_vat: Decimal,
    pub total_vat_payable: Decimal,
    pub total_financing: Decimal,
    pub total_profit: Decimal,
}

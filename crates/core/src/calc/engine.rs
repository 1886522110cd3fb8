use rust_decimal::Decimal;

use crate::calc::input::{
    CustomsRegime, LogisticsAllocation, QuoteCalculationInput, MAX_PAYMENT_MILESTONES,
};
use crate::calc::result::{ProductCalculationResult, QuoteCalculationResult};
use crate::domain::currency::{round_money, Currency};
use crate::domain::trade::{DmFeeMode, SaleType};
use crate::errors::{CalculationError, CalculationPhase};

const DAYS_PER_YEAR: Decimal = Decimal::from_parts(365, 0, 0, false, 0);

fn pct_of(amount: Decimal, percentage: Decimal) -> Decimal {
    amount * percentage / Decimal::ONE_HUNDRED
}

/// Executes the 13-phase formula chain for one product line.
///
/// Phases run strictly in order; each reads only the input and earlier
/// phases' outputs. Rounding to the currency minor unit happens at the
/// phase boundaries marked below and nowhere else — moving a rounding
/// point changes reconciliation against the reference spreadsheet.
pub fn calculate_product(
    input: &QuoteCalculationInput,
) -> Result<ProductCalculationResult, CalculationError> {
    validate(input)?;

    let currency = input.financial.quote_currency;
    let quantity = input.product.quantity;
    let round = |amount: Decimal| round_money(amount, currency);

    // Phase 1: purchase price resolution. VAT is stripped in the native
    // currency, conversion happens at the supplied rate, and rounding
    // only applies after conversion.
    let rate = input.financial.exchange_rate;
    let purchase_price_gross_unit = round(input.product.base_price * rate);
    let net_native = if input.product.base_price_includes_vat {
        input.product.base_price
            / (Decimal::ONE + input.product.supplier_vat_rate_pct / Decimal::ONE_HUNDRED)
    } else {
        input.product.base_price
    };
    let purchase_price_net_unit = round(net_native * rate);

    // Phase 2: supplier discount.
    let discount_factor = Decimal::ONE - input.financial.discount_pct / Decimal::ONE_HUNDRED;
    let purchase_price_discounted_unit = round(purchase_price_net_unit * discount_factor);

    // Phase 3: total purchase price.
    let purchase_price_total = round(purchase_price_discounted_unit * quantity);

    // Phase 4: logistics legs, apportioned by the allocation basis.
    let share = match input.logistics.allocation {
        LogisticsAllocation::PerProduct => Decimal::ONE,
        LogisticsAllocation::WeightShare(share) => share,
    };
    let logistics_supplier_to_hub = round(input.logistics.supplier_to_hub * share);
    let logistics_hub_to_customs = round(input.logistics.hub_to_customs * share);
    let logistics_customs_to_client = round(input.logistics.customs_to_client * share);
    let logistics_total =
        logistics_supplier_to_hub + logistics_hub_to_customs + logistics_customs_to_client;

    // Phase 5: customs valuation and duties. The transit-zone regime
    // values goods at the purchase price alone; the standard regime
    // includes the supplier-to-hub leg.
    let customs_value_base = match input.taxes.regime {
        CustomsRegime::Standard => purchase_price_total + logistics_supplier_to_hub,
        CustomsRegime::TransitZone => purchase_price_total,
    };
    let customs_duty = round(pct_of(customs_value_base, input.taxes.import_tariff_pct));
    let excise = round(pct_of(customs_value_base, input.taxes.excise_pct));
    let utilization_fee = round(pct_of(customs_value_base, input.taxes.utilization_fee_pct));
    let customs_total = customs_duty + excise + utilization_fee;

    // Phase 6: cost of goods sold.
    let clearance_total = round(input.clearance.total());
    let insurance_cost = round(pct_of(purchase_price_total, input.constants.insurance_rate_pct));
    let cogs_total =
        purchase_price_total + logistics_total + customs_total + clearance_total + insurance_cost;
    let cogs_unit = per_unit(cogs_total, quantity, currency);

    // Phase 7: markup.
    let margin_amount = round(pct_of(cogs_total, input.financial.markup_pct));
    let sale_price_pre_financial = cogs_total + margin_amount;

    // Phase 8: distribution-management fee.
    let dm_fee = match input.financial.dm_fee_mode {
        DmFeeMode::Fixed => round(input.financial.dm_fee_value),
        DmFeeMode::PercentOfSale => {
            round(pct_of(sale_price_pre_financial, input.financial.dm_fee_value))
        }
    };

    // Phase 9: forex risk reserve.
    let forex_reserve = round(pct_of(sale_price_pre_financial, input.financial.forex_risk_pct));

    // Phase 10: financial agent commission, agency sales only.
    let agent_fee = match input.company.sale_type {
        SaleType::Agency => {
            round(pct_of(sale_price_pre_financial, input.constants.financing_commission_pct))
        }
        SaleType::Resale => Decimal::ZERO,
    };

    // Phase 11: sale price excl. VAT.
    let sale_price_total = sale_price_pre_financial + dm_fee + forex_reserve + agent_fee;
    let sale_price_unit = per_unit(sale_price_total, quantity, currency);

    // Phase 12: VAT. Import VAT is assessed on customs value plus duty
    // plus excise and is reclaimable only when the selling entity owns
    // the goods (resale).
    let vat_rate = input.taxes.vat_rate_pct;
    let output_vat = round(pct_of(sale_price_total, vat_rate));
    let import_vat = round(pct_of(customs_value_base + customs_duty + excise, vat_rate));
    let import_vat_reclaimable = input.company.sale_type == SaleType::Resale;
    let net_vat_payable = if import_vat_reclaimable {
        output_vat - import_vat
    } else {
        output_vat
    };
    let sale_price_with_vat = sale_price_total + output_vat;

    // Phase 13: financing cost and profit. Each unpaid share finances
    // COGS for its day offset; customs payments finance past the
    // due-day threshold.
    let annual_rate = input.constants.annual_interest_pct / Decimal::ONE_HUNDRED;
    let mut weighted_payment_days = Decimal::ZERO;
    let mut goods_financing = Decimal::ZERO;
    for milestone in &input.payments.milestones {
        let share = milestone.share_pct / Decimal::ONE_HUNDRED;
        let days = Decimal::from(milestone.day_offset);
        weighted_payment_days += share * days;
        goods_financing += cogs_total * share * annual_rate * days / DAYS_PER_YEAR;
    }
    let overdue_days =
        (weighted_payment_days - Decimal::from(input.constants.customs_due_days)).max(Decimal::ZERO);
    let customs_financing = customs_total * annual_rate * overdue_days / DAYS_PER_YEAR;
    let financing_cost = round(goods_financing + customs_financing);

    let transfer_price_excl_vat = cogs_total + financing_cost;
    let transfer_price_incl_vat =
        round(transfer_price_excl_vat * (Decimal::ONE + vat_rate / Decimal::ONE_HUNDRED));

    let profit_total =
        sale_price_total - cogs_total - dm_fee - forex_reserve - agent_fee - financing_cost;
    let profit_unit = per_unit(profit_total, quantity, currency);
    let profit_margin_pct = if sale_price_total.is_zero() {
        Decimal::ZERO
    } else {
        round(profit_total / sale_price_total * Decimal::ONE_HUNDRED)
    };

    Ok(ProductCalculationResult {
        product_id: input.product.product_id.clone(),
        quantity,
        currency,
        purchase_price_gross_unit,
        purchase_price_net_unit,
        purchase_price_discounted_unit,
        purchase_price_total,
        logistics_supplier_to_hub,
        logistics_hub_to_customs,
        logistics_customs_to_client,
        logistics_total,
        customs_value_base,
        customs_duty,
        excise,
        utilization_fee,
        customs_total,
        clearance_total,
        insurance_cost,
        cogs_unit,
        cogs_total,
        margin_amount,
        sale_price_pre_financial,
        dm_fee,
        forex_reserve,
        agent_fee,
        sale_price_unit,
        sale_price_total,
        output_vat,
        import_vat,
        import_vat_reclaimable,
        net_vat_payable,
        sale_price_with_vat,
        weighted_payment_days,
        financing_cost,
        transfer_price_excl_vat,
        transfer_price_incl_vat,
        profit_unit,
        profit_total,
        profit_margin_pct,
    })
}

/// Runs the per-product chain over every line and sums the totals.
/// Aggregation is pure summation; nothing is re-derived, so per-product
/// sums always reconcile with the quote totals exactly.
pub fn calculate_quote(
    inputs: &[QuoteCalculationInput],
) -> Result<QuoteCalculationResult, CalculationError> {
    let currency = match inputs.first() {
        Some(first) => first.financial.quote_currency,
        None => Currency::Usd,
    };

    let mut products = Vec::with_capacity(inputs.len());
    for input in inputs {
        if input.financial.quote_currency != currency {
            return Err(CalculationError::new(
                CalculationPhase::PurchasePrice,
                "quote_currency",
                format!(
                    "all products must share the quote currency {currency}, found {}",
                    input.financial.quote_currency
                ),
            ));
        }
        products.push(calculate_product(input)?);
    }

    let sum = |select: fn(&ProductCalculationResult) -> Decimal| {
        products.iter().map(select).sum::<Decimal>()
    };

    Ok(QuoteCalculationResult {
        currency,
        total_purchase: sum(|p| p.purchase_price_total),
        total_logistics: sum(|p| p.logistics_total),
        total_customs: sum(|p| p.customs_total),
        total_cogs: sum(|p| p.cogs_total),
        total_sale_excl_vat: sum(|p| p.sale_price_total),
        total_sale_incl_vat: sum(|p| p.sale_price_with_vat),
        total_vat_payable: sum(|p| p.net_vat_payable),
        total_financing: sum(|p| p.financing_cost),
        total_profit: sum(|p| p.profit_total),
        products,
    })
}

fn per_unit(total: Decimal, quantity: Decimal, currency: Currency) -> Decimal {
    if quantity.is_zero() {
        Decimal::ZERO
    } else {
        round_money(total / quantity, currency)
    }
}

fn validate(input: &QuoteCalculationInput) -> Result<(), CalculationError> {
    use CalculationPhase::{Customs, Discount, Financing, ForexReserve, Logistics, Markup,
        PurchasePrice, PurchaseTotal};

    if input.product.quantity < Decimal::ZERO {
        return Err(CalculationError::new(
            PurchaseTotal,
            "quantity",
            format!("quantity must not be negative, got {}", input.product.quantity),
        ));
    }
    if input.financial.exchange_rate <= Decimal::ZERO {
        return Err(CalculationError::new(
            PurchasePrice,
            "exchange_rate",
            format!("exchange rate must be positive, got {}", input.financial.exchange_rate),
        ));
    }
    if input.product.supplier_vat_rate_pct < Decimal::ZERO {
        return Err(CalculationError::new(
            PurchasePrice,
            "supplier_vat_rate_pct",
            "supplier VAT rate must not be negative",
        ));
    }
    if input.financial.discount_pct < Decimal::ZERO
        || input.financial.discount_pct > Decimal::ONE_HUNDRED
    {
        return Err(CalculationError::new(
            Discount,
            "discount_pct",
            format!("discount must be within 0..=100, got {}", input.financial.discount_pct),
        ));
    }
    if input.financial.markup_pct < Decimal::ZERO {
        return Err(CalculationError::new(Markup, "markup_pct", "markup must not be negative"));
    }
    if input.financial.forex_risk_pct < Decimal::ZERO {
        return Err(CalculationError::new(
            ForexReserve,
            "forex_risk_pct",
            "forex risk reserve must not be negative",
        ));
    }
    if let LogisticsAllocation::WeightShare(share) = input.logistics.allocation {
        if share < Decimal::ZERO || share > Decimal::ONE {
            return Err(CalculationError::new(
                Logistics,
                "weight_share",
                format!("weight share must be within 0..=1, got {share}"),
            ));
        }
    }
    for (field, value) in [
        ("import_tariff_pct", input.taxes.import_tariff_pct),
        ("excise_pct", input.taxes.excise_pct),
        ("utilization_fee_pct", input.taxes.utilization_fee_pct),
        ("vat_rate_pct", input.taxes.vat_rate_pct),
    ] {
        if value < Decimal::ZERO {
            return Err(CalculationError::new(Customs, field, "rate must not be negative"));
        }
    }

    let milestones = &input.payments.milestones;
    if milestones.len() > MAX_PAYMENT_MILESTONES {
        return Err(CalculationError::new(
            Financing,
            "payment_schedule",
            format!("at most {MAX_PAYMENT_MILESTONES} payment milestones are supported"),
        ));
    }
    if !milestones.is_empty() {
        if milestones.iter().any(|m| m.share_pct <= Decimal::ZERO) {
            return Err(CalculationError::new(
                Financing,
                "payment_schedule",
                "every milestone share must be positive",
            ));
        }
        let total_share: Decimal = milestones.iter().map(|m| m.share_pct).sum();
        if total_share != Decimal::ONE_HUNDRED {
            return Err(CalculationError::new(
                Financing,
                "payment_schedule",
                format!("milestone shares must sum to 100, got {total_share}"),
            ));
        }
    }

    Ok(())
}

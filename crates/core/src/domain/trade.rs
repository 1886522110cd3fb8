use serde::{Deserialize, Serialize};

/// ISO 3166-1 alpha-2 country code, validated at the input boundary.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CountryCode(String);

impl CountryCode {
    pub fn parse(raw: &str) -> Option<CountryCode> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() == 2 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Some(CountryCode(code))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Incoterms {
    Exw,
    Fca,
    Fob,
    Cfr,
    Cif,
    Cpt,
    Cip,
    Dap,
    Ddp,
}

impl Incoterms {
    pub fn parse(code: &str) -> Option<Incoterms> {
        match code.trim().to_ascii_uppercase().as_str() {
            "EXW" => Some(Incoterms::Exw),
            "FCA" => Some(Incoterms::Fca),
            "FOB" => Some(Incoterms::Fob),
            "CFR" => Some(Incoterms::Cfr),
            "CIF" => Some(Incoterms::Cif),
            "CPT" => Some(Incoterms::Cpt),
            "CIP" => Some(Incoterms::Cip),
            "DAP" => Some(Incoterms::Dap),
            "DDP" => Some(Incoterms::Ddp),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Incoterms::Exw => "EXW",
            Incoterms::Fca => "FCA",
            Incoterms::Fob => "FOB",
            Incoterms::Cfr => "CFR",
            Incoterms::Cif => "CIF",
            Incoterms::Cpt => "CPT",
            Incoterms::Cip => "CIP",
            Incoterms::Dap => "DAP",
            Incoterms::Ddp => "DDP",
        }
    }
}

/// Whether the selling entity resells on its own account or acts as a
/// brokerage/agency intermediary. Drives the financial-agent commission
/// and import-VAT reclaim rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleType {
    Resale,
    Agency,
}

impl SaleType {
    pub fn parse(code: &str) -> Option<SaleType> {
        match code.trim().to_ascii_lowercase().as_str() {
            "resale" => Some(SaleType::Resale),
            "agency" | "brokerage" => Some(SaleType::Agency),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SaleType::Resale => "resale",
            SaleType::Agency => "agency",
        }
    }
}

/// Distribution-management fee mode: a fixed absolute amount in the
/// quote currency, or a percentage of the pre-financial sale price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmFeeMode {
    Fixed,
    PercentOfSale,
}

impl DmFeeMode {
    pub fn parse(code: &str) -> Option<DmFeeMode> {
        match code.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(DmFeeMode::Fixed),
            "percent" | "percent_of_sale" => Some(DmFeeMode::PercentOfSale),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DmFeeMode::Fixed => "fixed",
            DmFeeMode::PercentOfSale => "percent_of_sale",
        }
    }
}

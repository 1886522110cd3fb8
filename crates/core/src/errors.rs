use thiserror::Error;

/// Input is malformed or a required field is missing. Raised before any
/// computation begins; the caller corrects the source data and retries.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("required field `{field}` is missing for product row {row}")]
    MissingField { field: String, row: usize },
    #[error("field `{field}` has invalid value `{value}` for product row {row}: {reason}")]
    InvalidValue { field: String, value: String, row: usize, reason: String },
    #[error("field `{field}` has unrecognized code `{value}` for product row {row}")]
    UnknownCode { field: String, value: String, row: usize },
}

/// The 13 ordered phases of the per-product formula chain. Later phases
/// read earlier phases' outputs, so execution order is fixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalculationPhase {
    PurchasePrice,
    Discount,
    PurchaseTotal,
    Logistics,
    Customs,
    Cogs,
    Markup,
    DistributionFee,
    ForexReserve,
    AgentCommission,
    SalePrice,
    Vat,
    Financing,
}

impl CalculationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationPhase::PurchasePrice => "purchase_price",
            CalculationPhase::Discount => "discount",
            CalculationPhase::PurchaseTotal => "purchase_total",
            CalculationPhase::Logistics => "logistics",
            CalculationPhase::Customs => "customs",
            CalculationPhase::Cogs => "cogs",
            CalculationPhase::Markup => "markup",
            CalculationPhase::DistributionFee => "distribution_fee",
            CalculationPhase::ForexReserve => "forex_reserve",
            CalculationPhase::AgentCommission => "agent_commission",
            CalculationPhase::SalePrice => "sale_price",
            CalculationPhase::Vat => "vat",
            CalculationPhase::Financing => "financing",
        }
    }
}

impl std::fmt::Display for CalculationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phase hit an invalid numeric precondition. The whole per-product
/// calculation aborts; partial results are never returned.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("calculation failed in phase `{phase}` on field `{field}`: {message}")]
pub struct CalculationError {
    pub phase: CalculationPhase,
    pub field: &'static str,
    pub message: String,
}

impl CalculationError {
    pub fn new(
        phase: CalculationPhase,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self { phase, field, message: message.into() }
    }
}

/// Failures crossing the storage collaborator boundary. `Conflict`
/// means a concurrent writer won the compare-and-swap; the caller
/// decides whether to re-read and retry, never this layer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record `{0}` not found")]
    NotFound(String),
    #[error("concurrent modification detected for `{0}`")]
    Conflict(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

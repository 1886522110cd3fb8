pub mod engine;
pub mod input;
pub mod resolve;
pub mod result;

pub use engine::{calculate_product, calculate_quote};
pub use input::{CustomsRegime, LogisticsAllocation, QuoteCalculationInput};
pub use resolve::{normalize_pct, RawValue, VariableMap, VariableResolver};
pub use result::{ProductCalculationResult, QuoteCalculationResult};

pub mod approvals;
pub mod audit;
pub mod calc;
pub mod config;
pub mod domain;
pub mod errors;
pub mod fx;
pub mod workflow;

pub use approvals::{
    ApprovalCheck, ApprovalError, ApprovalLedger, ApprovalSet, ApprovalStore, DepartmentApproval,
    InMemoryApprovalStore,
};
pub use calc::{
    calculate_product, calculate_quote, normalize_pct, ProductCalculationResult,
    QuoteCalculationInput, QuoteCalculationResult, RawValue, VariableMap, VariableResolver,
};
pub use domain::currency::{round_money, Currency};
pub use domain::department::{Department, Role, UserContext};
pub use domain::quote::{ParallelStages, ProductId, Quote, QuoteId, TransitionRecord};
pub use domain::status::WorkflowStatus;
pub use errors::{CalculationError, CalculationPhase, StoreError, ValidationError};
pub use fx::{CurrencyConverter, InMemoryRateSource, RateSource, RateSourceError, RateTable};
pub use workflow::{
    ApprovalGate, InMemoryQuoteStore, QuoteStore, TransitionCheck, TransitionDenial,
    TransitionOutcome, WorkflowConfig, WorkflowError, WorkflowService,
};

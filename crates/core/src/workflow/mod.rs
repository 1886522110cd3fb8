pub mod service;
pub mod transitions;

pub use service::{
    ApprovalGate, InMemoryQuoteStore, OpenGate, QuoteStore, TransitionOutcome, WorkflowError,
    WorkflowService,
};
pub use transitions::{TransitionCheck, TransitionDenial, TransitionRule, WorkflowConfig};

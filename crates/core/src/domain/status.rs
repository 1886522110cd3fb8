use serde::{Deserialize, Serialize};

/// Closed set of workflow statuses a quote moves through, from draft
/// to one of the three terminal outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    PendingProcurement,
    /// Parallel fork: logistics and customs evaluate concurrently.
    PendingLogisticsAndCustoms,
    PendingSalesReview,
    PendingQuoteControl,
    PendingApproval,
    Approved,
    SentToClient,
    Negotiation,
    PendingSpecControl,
    PendingSignature,
    SpecificationSigned,
    Deal,
    Rejected,
    Cancelled,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 15] = [
        WorkflowStatus::Draft,
        WorkflowStatus::PendingProcurement,
        WorkflowStatus::PendingLogisticsAndCustoms,
        WorkflowStatus::PendingSalesReview,
        WorkflowStatus::PendingQuoteControl,
        WorkflowStatus::PendingApproval,
        WorkflowStatus::Approved,
        WorkflowStatus::SentToClient,
        WorkflowStatus::Negotiation,
        WorkflowStatus::PendingSpecControl,
        WorkflowStatus::PendingSignature,
        WorkflowStatus::SpecificationSigned,
        WorkflowStatus::Deal,
        WorkflowStatus::Rejected,
        WorkflowStatus::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Deal | WorkflowStatus::Rejected | WorkflowStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Draft => "draft",
            WorkflowStatus::PendingProcurement => "pending_procurement",
            WorkflowStatus::PendingLogisticsAndCustoms => "pending_logistics_and_customs",
            WorkflowStatus::PendingSalesReview => "pending_sales_review",
            WorkflowStatus::PendingQuoteControl => "pending_quote_control",
            WorkflowStatus::PendingApproval => "pending_approval",
            WorkflowStatus::Approved => "approved",
            WorkflowStatus::SentToClient => "sent_to_client",
            WorkflowStatus::Negotiation => "negotiation",
            WorkflowStatus::PendingSpecControl => "pending_spec_control",
            WorkflowStatus::PendingSignature => "pending_signature",
            WorkflowStatus::SpecificationSigned => "specification_signed",
            WorkflowStatus::Deal => "deal",
            WorkflowStatus::Rejected => "rejected",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(code: &str) -> Option<WorkflowStatus> {
        WorkflowStatus::ALL.into_iter().find(|status| status.as_str() == code.trim())
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

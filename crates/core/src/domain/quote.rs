use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::currency::Currency;
use crate::domain::status::WorkflowStatus;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

/// Completion flags for the parallel logistics/customs evaluation legs.
/// Both must be true before the join transition to sales review fires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelStages {
    pub logistics: bool,
    pub customs: bool,
}

impl ParallelStages {
    pub fn both_complete(&self) -> bool {
        self.logistics && self.customs
    }
}

/// The quote record as the workflow layer sees it. The storage
/// collaborator owns persistence; `version` backs compare-and-swap
/// writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub number: String,
    pub status: WorkflowStatus,
    pub quote_currency: Currency,
    pub parallel_stages: ParallelStages,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(
        id: QuoteId,
        number: impl Into<String>,
        quote_currency: Currency,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            number: number.into(),
            status: WorkflowStatus::Draft,
            quote_currency,
            parallel_stages: ParallelStages::default(),
            version: 0,
            created_at,
            updated_at: created_at,
        }
    }
}

/// Append-only record of one executed status transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: String,
    pub quote_id: QuoteId,
    pub from_status: WorkflowStatus,
    pub to_status: WorkflowStatus,
    pub actor: String,
    pub comment: Option<String>,
    pub automatic: bool,
    pub occurred_at: DateTime<Utc>,
}

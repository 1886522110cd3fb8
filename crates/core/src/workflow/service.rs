use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::department::{Department, Role, UserContext};
use crate::domain::quote::{ParallelStages, Quote, QuoteId, TransitionRecord};
use crate::domain::status::WorkflowStatus;
use crate::errors::StoreError;
use crate::workflow::transitions::{TransitionCheck, WorkflowConfig};

/// Storage collaborator boundary for the quote record and its
/// append-only transition history. `update` is a compare-and-swap on
/// the record version; a lost race comes back as
/// `StoreError::Conflict` and is never retried here.
#[async_trait]
pub trait QuoteStore: Send + Sync {
    async fn insert(&self, quote: Quote) -> Result<(), StoreError>;
    async fn get(&self, id: &QuoteId) -> Result<Quote, StoreError>;
    async fn update(&self, quote: Quote, expected_version: u64) -> Result<Quote, StoreError>;
    async fn append_history(&self, record: TransitionRecord) -> Result<(), StoreError>;
    async fn history(&self, id: &QuoteId) -> Result<Vec<TransitionRecord>, StoreError>;
}

/// Gate consulted before a quote may enter `approved`: the five
/// department approvals must all be satisfied.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn missing_departments(&self, id: &QuoteId) -> Result<Vec<Department>, StoreError>;
}

/// Gate that is always satisfied, for flows managed outside the
/// five-department ledger.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenGate;

#[async_trait]
impl ApprovalGate for OpenGate {
    async fn missing_departments(&self, _id: &QuoteId) -> Result<Vec<Department>, StoreError> {
        Ok(Vec::new())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("{reason}")]
    Denied { check: TransitionCheck, reason: String },
    #[error("transition from `{from}` to `{to}` requires a comment")]
    CommentRequired { from: WorkflowStatus, to: WorkflowStatus },
    #[error("quote cannot be approved, departments still pending: {missing:?}")]
    ApprovalsIncomplete { missing: Vec<Department> },
    #[error("parallel stage `{stage}` cannot complete while quote is `{status}`")]
    ParallelStageUnavailable { stage: Department, status: WorkflowStatus },
    #[error("user `{user_id}` lacks the `{required}` role for stage completion")]
    StageRoleNotPermitted { user_id: String, required: Role },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub quote: Quote,
    pub record: TransitionRecord,
}

/// Validates and executes status transitions against the quote store,
/// including the logistics/customs fork-join.
pub struct WorkflowService<S, G> {
    store: S,
    gate: G,
    config: WorkflowConfig,
}

impl<S, G> WorkflowService<S, G>
where
    S: QuoteStore,
    G: ApprovalGate,
{
    pub fn new(store: S, gate: G, config: WorkflowConfig) -> Self {
        Self { store, gate, config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn gate(&self) -> &G {
        &self.gate
    }

    pub fn can_transition(
        &self,
        from: WorkflowStatus,
        to: WorkflowStatus,
        user: &UserContext,
    ) -> TransitionCheck {
        self.config.can_transition(from, to, user)
    }

    pub fn get_allowed_target_statuses(
        &self,
        from: WorkflowStatus,
        user: &UserContext,
    ) -> Vec<WorkflowStatus> {
        self.config.allowed_targets(from, user)
    }

    /// Moves a quote to `to_status` on behalf of `user`. All
    /// validation happens before any write; the status update and the
    /// history append go through the store's conditional write.
    pub async fn transition_quote_status(
        &self,
        quote_id: &QuoteId,
        to_status: WorkflowStatus,
        user: &UserContext,
        comment: Option<String>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let quote = self.store.get(quote_id).await?;
        self.execute_transition(quote, to_status, user, comment, false).await
    }

    pub async fn transition_quote_status_with_audit<A>(
        &self,
        quote_id: &QuoteId,
        to_status: WorkflowStatus,
        user: &UserContext,
        comment: Option<String>,
        sink: &A,
        correlation_id: &str,
    ) -> Result<TransitionOutcome, WorkflowError>
    where
        A: AuditSink,
    {
        let result = self.transition_quote_status(quote_id, to_status, user, comment).await;
        match &result {
            Ok(outcome) => sink.emit(
                AuditEvent::new(
                    Some(quote_id.clone()),
                    correlation_id,
                    "workflow.transition_applied",
                    AuditCategory::Workflow,
                    user.user_id.as_str(),
                    AuditOutcome::Success,
                )
                .with_metadata("from", outcome.record.from_status.as_str())
                .with_metadata("to", outcome.record.to_status.as_str()),
            ),
            Err(error) => sink.emit(
                AuditEvent::new(
                    Some(quote_id.clone()),
                    correlation_id,
                    "workflow.transition_rejected",
                    AuditCategory::Workflow,
                    user.user_id.as_str(),
                    AuditOutcome::Rejected,
                )
                .with_metadata("to", to_status.as_str())
                .with_metadata("error", error.to_string()),
            ),
        }
        result
    }

    pub async fn get_parallel_stages_status(
        &self,
        quote_id: &QuoteId,
    ) -> Result<ParallelStages, WorkflowError> {
        Ok(self.store.get(quote_id).await?.parallel_stages)
    }

    /// Marks the logistics leg of the fork complete. Idempotent:
    /// completing an already-completed leg is a no-op.
    pub async fn complete_logistics(
        &self,
        quote_id: &QuoteId,
        user: &UserContext,
    ) -> Result<ParallelStages, WorkflowError> {
        self.complete_stage(quote_id, Department::Logistics, user).await
    }

    /// Marks the customs leg of the fork complete. Idempotent like
    /// `complete_logistics`.
    pub async fn complete_customs(
        &self,
        quote_id: &QuoteId,
        user: &UserContext,
    ) -> Result<ParallelStages, WorkflowError> {
        self.complete_stage(quote_id, Department::Customs, user).await
    }

    async fn complete_stage(
        &self,
        quote_id: &QuoteId,
        stage: Department,
        user: &UserContext,
    ) -> Result<ParallelStages, WorkflowError> {
        let required = Role::for_department(stage);
        if !user.is_admin() && !user.has_role(required) {
            return Err(WorkflowError::StageRoleNotPermitted {
                user_id: user.user_id.clone(),
                required,
            });
        }

        let mut quote = self.store.get(quote_id).await?;
        let already_done = match stage {
            Department::Logistics => quote.parallel_stages.logistics,
            _ => quote.parallel_stages.customs,
        };

        if quote.status != WorkflowStatus::PendingLogisticsAndCustoms {
            // The join may already have fired; a repeated completion of
            // a recorded leg stays a no-op instead of an error.
            if already_done {
                return Ok(quote.parallel_stages);
            }
            return Err(WorkflowError::ParallelStageUnavailable { stage, status: quote.status });
        }

        if already_done {
            return Ok(quote.parallel_stages);
        }

        match stage {
            Department::Logistics => quote.parallel_stages.logistics = true,
            _ => quote.parallel_stages.customs = true,
        }
        quote.updated_at = Utc::now();
        let expected_version = quote.version;
        let stored = self.store.update(quote, expected_version).await?;

        // Join condition is checked after every completion; the CAS on
        // the status transition guarantees at most one join fires even
        // when both legs complete in the same instant.
        if stored.parallel_stages.both_complete() {
            let outcome = self
                .execute_transition(
                    stored.clone(),
                    WorkflowStatus::PendingSalesReview,
                    user,
                    None,
                    true,
                )
                .await?;
            return Ok(outcome.quote.parallel_stages);
        }

        Ok(stored.parallel_stages)
    }

    async fn execute_transition(
        &self,
        quote: Quote,
        to_status: WorkflowStatus,
        user: &UserContext,
        comment: Option<String>,
        automatic: bool,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let from_status = quote.status;
        let check = self.config.can_transition(from_status, to_status, user);
        if !check.allowed {
            let reason = check.reason.clone().unwrap_or_else(|| "transition denied".to_owned());
            return Err(WorkflowError::Denied { check, reason });
        }

        let requires_comment = self
            .config
            .find_rule(from_status, to_status)
            .is_some_and(|rule| rule.requires_comment);
        let comment = comment.filter(|comment| !comment.trim().is_empty());
        if requires_comment && comment.is_none() {
            return Err(WorkflowError::CommentRequired { from: from_status, to: to_status });
        }

        if to_status == WorkflowStatus::Approved {
            let missing = self.gate.missing_departments(&quote.id).await?;
            if !missing.is_empty() {
                return Err(WorkflowError::ApprovalsIncomplete { missing });
            }
        }

        let now = Utc::now();
        let mut updated = quote;
        let expected_version = updated.version;
        updated.status = to_status;
        updated.updated_at = now;
        let stored = self.store.update(updated, expected_version).await?;

        let record = TransitionRecord {
            id: Uuid::new_v4().to_string(),
            quote_id: stored.id.clone(),
            from_status,
            to_status,
            actor: user.user_id.clone(),
            comment,
            automatic,
            occurred_at: now,
        };
        self.store.append_history(record.clone()).await?;

        Ok(TransitionOutcome { quote: stored, record })
    }
}

/// In-process store used by tests and the CLI's dry runs.
#[derive(Default)]
pub struct InMemoryQuoteStore {
    quotes: Mutex<HashMap<String, Quote>>,
    history: Mutex<Vec<TransitionRecord>>,
}

impl InMemoryQuoteStore {
    fn lock_quotes(&self) -> std::sync::MutexGuard<'_, HashMap<String, Quote>> {
        match self.quotes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, Vec<TransitionRecord>> {
        match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl QuoteStore for InMemoryQuoteStore {
    async fn insert(&self, quote: Quote) -> Result<(), StoreError> {
        self.lock_quotes().insert(quote.id.0.clone(), quote);
        Ok(())
    }

    async fn get(&self, id: &QuoteId) -> Result<Quote, StoreError> {
        self.lock_quotes().get(&id.0).cloned().ok_or_else(|| StoreError::NotFound(id.0.clone()))
    }

    async fn update(&self, quote: Quote, expected_version: u64) -> Result<Quote, StoreError> {
        let mut quotes = self.lock_quotes();
        let current =
            quotes.get(&quote.id.0).ok_or_else(|| StoreError::NotFound(quote.id.0.clone()))?;
        if current.version != expected_version {
            return Err(StoreError::Conflict(quote.id.0.clone()));
        }

        let mut stored = quote;
        stored.version = expected_version + 1;
        quotes.insert(stored.id.0.clone(), stored.clone());
        Ok(stored)
    }

    async fn append_history(&self, record: TransitionRecord) -> Result<(), StoreError> {
        self.lock_history().push(record);
        Ok(())
    }

    async fn history(&self, id: &QuoteId) -> Result<Vec<TransitionRecord>, StoreError> {
        Ok(self
            .lock_history()
            .iter()
            .filter(|record| record.quote_id == *id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::currency::Currency;
    use crate::domain::department::{Department, Role, UserContext};
    use crate::domain::quote::{Quote, QuoteId};
    use crate::domain::status::WorkflowStatus;
    use crate::errors::StoreError;
    use crate::workflow::transitions::WorkflowConfig;

    use super::{
        ApprovalGate, InMemoryQuoteStore, OpenGate, QuoteStore, WorkflowError, WorkflowService,
    };

    fn service() -> WorkflowService<InMemoryQuoteStore, OpenGate> {
        WorkflowService::new(InMemoryQuoteStore::default(), OpenGate, WorkflowConfig::standard())
    }

    async fn seed<G: ApprovalGate>(
        service: &WorkflowService<InMemoryQuoteStore, G>,
        status: WorkflowStatus,
    ) -> QuoteId {
        let id = QuoteId("Q-1".to_owned());
        let mut quote = Quote::new(id.clone(), "TD-2026-0001", Currency::Usd, Utc::now());
        quote.status = status;
        service.store().insert(quote).await.expect("seed quote");
        id
    }

    fn sales() -> UserContext {
        UserContext::new("u-sales", [Role::Sales])
    }

    #[tokio::test]
    async fn transition_updates_status_and_appends_history() {
        let service = service();
        let id = seed(&service, WorkflowStatus::Draft).await;

        let outcome = service
            .transition_quote_status(&id, WorkflowStatus::PendingProcurement, &sales(), None)
            .await
            .expect("draft -> pending_procurement");

        assert_eq!(outcome.quote.status, WorkflowStatus::PendingProcurement);
        assert_eq!(outcome.quote.version, 1);

        let history = service.store().history(&id).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, WorkflowStatus::Draft);
        assert_eq!(history[0].to_status, WorkflowStatus::PendingProcurement);
        assert_eq!(history[0].actor, "u-sales");
        assert!(!history[0].automatic);
    }

    #[tokio::test]
    async fn denied_transition_leaves_no_trace() {
        let service = service();
        let id = seed(&service, WorkflowStatus::Draft).await;

        let error = service
            .transition_quote_status(
                &id,
                WorkflowStatus::Approved,
                &UserContext::new("u-proc", [Role::Procurement]),
                None,
            )
            .await
            .expect_err("no draft -> approved edge");

        assert!(matches!(error, WorkflowError::Denied { .. }));
        let quote = service.store().get(&id).await.expect("quote");
        assert_eq!(quote.status, WorkflowStatus::Draft);
        assert!(service.store().history(&id).await.expect("history").is_empty());
    }

    #[tokio::test]
    async fn mandatory_comment_is_enforced_before_any_write() {
        let service = service();
        let id = seed(&service, WorkflowStatus::PendingProcurement).await;
        let user = UserContext::new("u-proc", [Role::Procurement]);

        let error = service
            .transition_quote_status(&id, WorkflowStatus::Rejected, &user, Some("  ".to_owned()))
            .await
            .expect_err("rejection requires a comment");
        assert!(matches!(error, WorkflowError::CommentRequired { .. }));
        assert!(service.store().history(&id).await.expect("history").is_empty());

        service
            .transition_quote_status(
                &id,
                WorkflowStatus::Rejected,
                &user,
                Some("supplier cannot deliver".to_owned()),
            )
            .await
            .expect("rejection with comment");
    }

    #[tokio::test]
    async fn approval_gate_blocks_until_departments_are_satisfied() {
        struct PendingGate;

        #[async_trait::async_trait]
        impl ApprovalGate for PendingGate {
            async fn missing_departments(
                &self,
                _id: &crate::domain::quote::QuoteId,
            ) -> Result<Vec<Department>, StoreError> {
                Ok(vec![Department::Customs])
            }
        }

        let service = WorkflowService::new(
            InMemoryQuoteStore::default(),
            PendingGate,
            WorkflowConfig::standard(),
        );
        let id = seed(&service, WorkflowStatus::PendingApproval).await;

        let error = service
            .transition_quote_status(
                &id,
                WorkflowStatus::Approved,
                &UserContext::new("u-head", [Role::Management]),
                None,
            )
            .await
            .expect_err("customs approval is missing");

        assert_eq!(
            error,
            WorkflowError::ApprovalsIncomplete { missing: vec![Department::Customs] }
        );
    }

    #[tokio::test]
    async fn parallel_join_fires_exactly_once_when_both_legs_complete() {
        let service = service();
        let id = seed(&service, WorkflowStatus::PendingLogisticsAndCustoms).await;

        let stages = service
            .complete_logistics(&id, &UserContext::new("u-log", [Role::Logistics]))
            .await
            .expect("logistics leg");
        assert!(stages.logistics);
        assert!(!stages.customs);

        let quote = service.store().get(&id).await.expect("quote");
        assert_eq!(quote.status, WorkflowStatus::PendingLogisticsAndCustoms);

        let stages = service
            .complete_customs(&id, &UserContext::new("u-cus", [Role::Customs]))
            .await
            .expect("customs leg");
        assert!(stages.both_complete());

        let quote = service.store().get(&id).await.expect("quote");
        assert_eq!(quote.status, WorkflowStatus::PendingSalesReview);

        let history = service.store().history(&id).await.expect("history");
        let joins: Vec<_> = history.iter().filter(|record| record.automatic).collect();
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].to_status, WorkflowStatus::PendingSalesReview);
    }

    #[tokio::test]
    async fn completing_a_completed_leg_is_a_no_op() {
        let service = service();
        let id = seed(&service, WorkflowStatus::PendingLogisticsAndCustoms).await;
        let logistics = UserContext::new("u-log", [Role::Logistics]);

        service.complete_logistics(&id, &logistics).await.expect("first completion");
        let before = service.store().get(&id).await.expect("quote").version;

        let stages = service.complete_logistics(&id, &logistics).await.expect("repeat is no-op");
        assert!(stages.logistics);
        assert_eq!(service.store().get(&id).await.expect("quote").version, before);
    }

    #[tokio::test]
    async fn completing_a_leg_after_the_join_stays_idempotent() {
        let service = service();
        let id = seed(&service, WorkflowStatus::PendingLogisticsAndCustoms).await;
        let logistics = UserContext::new("u-log", [Role::Logistics]);
        let customs = UserContext::new("u-cus", [Role::Customs]);

        service.complete_logistics(&id, &logistics).await.expect("logistics leg");
        service.complete_customs(&id, &customs).await.expect("customs leg and join");

        let stages =
            service.complete_logistics(&id, &logistics).await.expect("post-join repeat");
        assert!(stages.both_complete());
        assert_eq!(
            service.store().get(&id).await.expect("quote").status,
            WorkflowStatus::PendingSalesReview
        );
    }

    #[tokio::test]
    async fn stage_completion_requires_the_matching_role() {
        let service = service();
        let id = seed(&service, WorkflowStatus::PendingLogisticsAndCustoms).await;

        let error = service
            .complete_logistics(&id, &UserContext::new("u-cus", [Role::Customs]))
            .await
            .expect_err("customs user cannot complete logistics");

        assert!(matches!(error, WorkflowError::StageRoleNotPermitted { .. }));
    }

    #[tokio::test]
    async fn stage_completion_outside_the_fork_state_fails() {
        let service = service();
        let id = seed(&service, WorkflowStatus::Draft).await;

        let error = service
            .complete_logistics(&id, &UserContext::new("u-log", [Role::Logistics]))
            .await
            .expect_err("fork is not active in draft");

        assert!(matches!(error, WorkflowError::ParallelStageUnavailable { .. }));
    }

    #[tokio::test]
    async fn version_conflicts_surface_to_the_caller() {
        let service = service();
        let id = seed(&service, WorkflowStatus::Draft).await;

        // Another writer bumps the version between read and write.
        let mut quote = service.store().get(&id).await.expect("quote");
        let expected = quote.version;
        quote.updated_at = Utc::now();
        service.store().update(quote.clone(), expected).await.expect("first write wins");

        let error =
            service.store().update(quote, expected).await.expect_err("stale write loses");
        assert!(matches!(error, StoreError::Conflict(_)));
    }
}

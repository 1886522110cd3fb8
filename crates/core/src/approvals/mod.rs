use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::department::{Department, Role, UserContext};
use crate::domain::quote::QuoteId;
use crate::errors::StoreError;
use crate::workflow::service::ApprovalGate;

/// One department's standing decision for a quote. Cleared (not
/// deleted) when an upstream rejection rolls it back.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentApproval {
    pub approved: bool,
    pub approver: Option<String>,
    pub comment: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// The full five-department approval state of one quote. `version`
/// backs the storage compare-and-swap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSet {
    pub quote_id: QuoteId,
    pub version: u64,
    pub entries: BTreeMap<Department, DepartmentApproval>,
}

impl ApprovalSet {
    /// All-false initial state, created when a quote enters the
    /// evaluation pipeline.
    pub fn new(quote_id: QuoteId) -> Self {
        let entries = Department::ALL
            .into_iter()
            .map(|department| (department, DepartmentApproval::default()))
            .collect();
        Self { quote_id, version: 0, entries }
    }

    pub fn is_approved(&self, department: Department) -> bool {
        self.entries.get(&department).is_some_and(|entry| entry.approved)
    }

    pub fn all_approved(&self) -> bool {
        Department::ALL.into_iter().all(|department| self.is_approved(department))
    }

    pub fn missing(&self) -> Vec<Department> {
        Department::ALL
            .into_iter()
            .filter(|department| !self.is_approved(*department))
            .collect()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("user `{user_id}` lacks the `{required}` role to decide for `{department}`")]
    RoleNotPermitted { user_id: String, department: Department, required: Role },
    #[error("`{department}` cannot approve before {missing:?}")]
    PrerequisitesNotMet { department: Department, missing: Vec<Department> },
    #[error("rejecting `{department}` requires a comment")]
    CommentRequired { department: Department },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Pre-check result mirroring `TransitionCheck`: precondition failures
/// are routine operator traffic, not exceptions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalCheck {
    pub allowed: bool,
    pub reason: Option<String>,
}

/// Storage collaborator boundary for approval sets.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn get(&self, id: &QuoteId) -> Result<Option<ApprovalSet>, StoreError>;
    /// Conditional write: fails with `Conflict` when the stored version
    /// differs from `expected_version`. Inserts when nothing is stored
    /// yet and `expected_version` is zero.
    async fn save(&self, set: ApprovalSet, expected_version: u64)
        -> Result<ApprovalSet, StoreError>;
}

/// Tracks per-department approvals and computes rollback sets.
pub struct ApprovalLedger<S> {
    store: S,
}

impl<S> ApprovalLedger<S>
where
    S: ApprovalStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether `user` may approve `department` given the current set.
    pub fn can_approve(
        set: &ApprovalSet,
        department: Department,
        user: &UserContext,
    ) -> ApprovalCheck {
        if user.is_admin() {
            return ApprovalCheck { allowed: true, reason: None };
        }

        let required = Role::for_department(department);
        if !user.has_role(required) {
            return ApprovalCheck {
                allowed: false,
                reason: Some(format!(
                    "user `{}` lacks the `{required}` role to decide for `{department}`",
                    user.user_id
                )),
            };
        }

        let missing: Vec<Department> = department
            .prerequisites()
            .iter()
            .copied()
            .filter(|prerequisite| !set.is_approved(*prerequisite))
            .collect();
        if !missing.is_empty() {
            return ApprovalCheck {
                allowed: false,
                reason: Some(format!("`{department}` cannot approve before {missing:?}")),
            };
        }

        ApprovalCheck { allowed: true, reason: None }
    }

    /// Sets a department's approval flag. Prerequisites must already be
    /// approved; the admin role bypasses both the role and the
    /// prerequisite check (operational escape hatch, not a normal
    /// path).
    pub async fn approve_department(
        &self,
        quote_id: &QuoteId,
        department: Department,
        user: &UserContext,
    ) -> Result<ApprovalSet, ApprovalError> {
        let mut set = self.load_or_init(quote_id).await?;

        if !user.is_admin() {
            let required = Role::for_department(department);
            if !user.has_role(required) {
                return Err(ApprovalError::RoleNotPermitted {
                    user_id: user.user_id.clone(),
                    department,
                    required,
                });
            }

            let missing: Vec<Department> = department
                .prerequisites()
                .iter()
                .copied()
                .filter(|prerequisite| !set.is_approved(*prerequisite))
                .collect();
            if !missing.is_empty() {
                return Err(ApprovalError::PrerequisitesNotMet { department, missing });
            }
        }

        let expected_version = set.version;
        set.entries.insert(
            department,
            DepartmentApproval {
                approved: true,
                approver: Some(user.user_id.clone()),
                comment: None,
                decided_at: Some(Utc::now()),
            },
        );
        Ok(self.store.save(set, expected_version).await?)
    }

    /// Clears a department's approval and every approval strictly
    /// downstream of it. The sibling parallel leg is untouched;
    /// rollback cascades only forward along the fixed order.
    pub async fn reject_department(
        &self,
        quote_id: &QuoteId,
        department: Department,
        user: &UserContext,
        comment: impl Into<String>,
    ) -> Result<ApprovalSet, ApprovalError> {
        let comment = comment.into();
        if comment.trim().is_empty() {
            return Err(ApprovalError::CommentRequired { department });
        }

        let mut set = self.load_or_init(quote_id).await?;

        if !user.is_admin() {
            let required = Role::for_department(department);
            if !user.has_role(required) {
                return Err(ApprovalError::RoleNotPermitted {
                    user_id: user.user_id.clone(),
                    department,
                    required,
                });
            }
        }

        let expected_version = set.version;
        set.entries.insert(
            department,
            DepartmentApproval {
                approved: false,
                approver: Some(user.user_id.clone()),
                comment: Some(comment),
                decided_at: Some(Utc::now()),
            },
        );
        for downstream in department.downstream() {
            set.entries.insert(*downstream, DepartmentApproval::default());
        }

        Ok(self.store.save(set, expected_version).await?)
    }

    pub async fn approve_department_with_audit<A>(
        &self,
        quote_id: &QuoteId,
        department: Department,
        user: &UserContext,
        sink: &A,
        correlation_id: &str,
    ) -> Result<ApprovalSet, ApprovalError>
    where
        A: AuditSink,
    {
        let result = self.approve_department(quote_id, department, user).await;
        self.emit_decision(quote_id, department, user, sink, correlation_id, "approve", &result);
        result
    }

    pub async fn reject_department_with_audit<A>(
        &self,
        quote_id: &QuoteId,
        department: Department,
        user: &UserContext,
        comment: impl Into<String>,
        sink: &A,
        correlation_id: &str,
    ) -> Result<ApprovalSet, ApprovalError>
    where
        A: AuditSink,
    {
        let result = self.reject_department(quote_id, department, user, comment).await;
        self.emit_decision(quote_id, department, user, sink, correlation_id, "reject", &result);
        result
    }

    fn emit_decision<A>(
        &self,
        quote_id: &QuoteId,
        department: Department,
        user: &UserContext,
        sink: &A,
        correlation_id: &str,
        action: &str,
        result: &Result<ApprovalSet, ApprovalError>,
    ) where
        A: AuditSink,
    {
        let (event_type, outcome) = match result {
            Ok(_) => (format!("approval.{action}_applied"), AuditOutcome::Success),
            Err(_) => (format!("approval.{action}_rejected"), AuditOutcome::Rejected),
        };
        let mut event = AuditEvent::new(
            Some(quote_id.clone()),
            correlation_id,
            event_type,
            AuditCategory::Approval,
            user.user_id.as_str(),
            outcome,
        )
        .with_metadata("department", department.as_str());
        if let Err(error) = result {
            event = event.with_metadata("error", error.to_string());
        }
        sink.emit(event);
    }

    pub async fn all_departments_approved(&self, quote_id: &QuoteId) -> Result<bool, StoreError> {
        Ok(self.store.get(quote_id).await?.is_some_and(|set| set.all_approved()))
    }

    pub async fn approvals(&self, quote_id: &QuoteId) -> Result<ApprovalSet, StoreError> {
        self.load_or_init(quote_id).await.map_err(|error| match error {
            ApprovalError::Store(store) => store,
            other => StoreError::Backend(other.to_string()),
        })
    }

    async fn load_or_init(&self, quote_id: &QuoteId) -> Result<ApprovalSet, ApprovalError> {
        Ok(self
            .store
            .get(quote_id)
            .await?
            .unwrap_or_else(|| ApprovalSet::new(quote_id.clone())))
    }
}

#[async_trait]
impl<S> ApprovalGate for ApprovalLedger<S>
where
    S: ApprovalStore,
{
    async fn missing_departments(&self, id: &QuoteId) -> Result<Vec<Department>, StoreError> {
        Ok(match self.store.get(id).await? {
            Some(set) => set.missing(),
            None => Department::ALL.to_vec(),
        })
    }
}

/// In-process approval store for tests and dry runs.
#[derive(Default)]
pub struct InMemoryApprovalStore {
    sets: Mutex<HashMap<String, ApprovalSet>>,
}

impl InMemoryApprovalStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ApprovalSet>> {
        match self.sets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn get(&self, id: &QuoteId) -> Result<Option<ApprovalSet>, StoreError> {
        Ok(self.lock().get(&id.0).cloned())
    }

    async fn save(
        &self,
        set: ApprovalSet,
        expected_version: u64,
    ) -> Result<ApprovalSet, StoreError> {
        let mut sets = self.lock();
        let current_version = sets.get(&set.quote_id.0).map(|stored| stored.version).unwrap_or(0);
        if current_version != expected_version {
            return Err(StoreError::Conflict(set.quote_id.0.clone()));
        }

        let mut stored = set;
        stored.version = expected_version + 1;
        sets.insert(stored.quote_id.0.clone(), stored.clone());
        Ok(stored)
    }
}

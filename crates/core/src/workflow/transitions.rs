use serde::{Deserialize, Serialize};

use crate::domain::department::{Role, UserContext};
use crate::domain::status::WorkflowStatus;

/// One directed edge of the workflow graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRule {
    pub from: WorkflowStatus,
    pub to: WorkflowStatus,
    pub allowed_roles: Vec<Role>,
    pub requires_comment: bool,
    /// Fired by the system (the parallel join) rather than a user
    /// clicking a button.
    pub automatic: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionDenial {
    TerminalState { from: WorkflowStatus },
    NoSuchTransition { from: WorkflowStatus, to: WorkflowStatus },
    InsufficientRole { from: WorkflowStatus, to: WorkflowStatus, required: Vec<Role> },
}

impl TransitionDenial {
    fn reason(&self) -> String {
        match self {
            Self::TerminalState { from } => {
                format!("status `{from}` is terminal and has no outgoing transitions")
            }
            Self::NoSuchTransition { from, to } => {
                format!("no transition exists from `{from}` to `{to}`")
            }
            Self::InsufficientRole { from, to, required } => {
                let roles: Vec<&str> = required.iter().map(Role::as_str).collect();
                format!(
                    "transition from `{from}` to `{to}` requires one of roles [{}]",
                    roles.join(", ")
                )
            }
        }
    }
}

/// Outcome of a transition check. Denials are normal UI traffic, so
/// they come back as a value, not an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCheck {
    pub allowed: bool,
    pub reason: Option<String>,
    pub denial: Option<TransitionDenial>,
}

impl TransitionCheck {
    fn allow() -> Self {
        Self { allowed: true, reason: None, denial: None }
    }

    fn deny(denial: TransitionDenial) -> Self {
        Self { allowed: false, reason: Some(denial.reason()), denial: Some(denial) }
    }
}

/// Immutable transition-graph configuration, built once at process
/// start and passed by reference into the workflow service.
#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    rules: Vec<TransitionRule>,
}

impl WorkflowConfig {
    pub fn new(rules: Vec<TransitionRule>) -> Self {
        Self { rules }
    }

    /// The production transition graph: a DAG with `draft` as the only
    /// source and deal/rejected/cancelled as the three sinks.
    pub fn standard() -> Self {
        use Role::{Control, Customs, Logistics, Management, Procurement, Sales, SpecControl};
        use WorkflowStatus::{
            Approved, Cancelled, Deal, Draft, Negotiation, PendingApproval,
            PendingLogisticsAndCustoms, PendingProcurement, PendingQuoteControl, PendingSalesReview,
            PendingSignature, PendingSpecControl, Rejected, SentToClient, SpecificationSigned,
        };

        let manual = |from, to, roles: &[Role], requires_comment| TransitionRule {
            from,
            to,
            allowed_roles: roles.to_vec(),
            requires_comment,
            automatic: false,
        };

        Self::new(vec![
            manual(Draft, PendingProcurement, &[Sales], false),
            manual(Draft, Cancelled, &[Sales], false),
            manual(PendingProcurement, PendingLogisticsAndCustoms, &[Procurement], false),
            manual(PendingProcurement, Rejected, &[Procurement], true),
            TransitionRule {
                from: PendingLogisticsAndCustoms,
                to: PendingSalesReview,
                allowed_roles: vec![Logistics, Customs],
                requires_comment: false,
                automatic: true,
            },
            manual(PendingLogisticsAndCustoms, Rejected, &[Logistics, Customs], true),
            manual(PendingSalesReview, PendingQuoteControl, &[Sales], false),
            manual(PendingSalesReview, Rejected, &[Sales], true),
            manual(PendingQuoteControl, PendingApproval, &[Control], false),
            manual(PendingQuoteControl, Rejected, &[Control], true),
            manual(PendingApproval, Approved, &[Management], false),
            manual(PendingApproval, Rejected, &[Management], true),
            manual(Approved, SentToClient, &[Sales], false),
            manual(SentToClient, Negotiation, &[Sales], false),
            manual(SentToClient, PendingSpecControl, &[Sales], false),
            manual(SentToClient, Cancelled, &[Sales], true),
            manual(Negotiation, PendingSpecControl, &[Sales], false),
            manual(Negotiation, Rejected, &[Sales], true),
            manual(Negotiation, Cancelled, &[Sales], true),
            manual(PendingSpecControl, PendingSignature, &[SpecControl], false),
            manual(PendingSpecControl, Rejected, &[SpecControl], true),
            manual(PendingSignature, SpecificationSigned, &[Sales], false),
            manual(PendingSignature, Cancelled, &[Sales], true),
            manual(SpecificationSigned, Deal, &[Sales, Management], false),
        ])
    }

    pub fn rules(&self) -> &[TransitionRule] {
        &self.rules
    }

    pub fn find_rule(
        &self,
        from: WorkflowStatus,
        to: WorkflowStatus,
    ) -> Option<&TransitionRule> {
        self.rules.iter().find(|rule| rule.from == from && rule.to == to)
    }

    pub fn can_transition(
        &self,
        from: WorkflowStatus,
        to: WorkflowStatus,
        user: &UserContext,
    ) -> TransitionCheck {
        if from.is_terminal() {
            return TransitionCheck::deny(TransitionDenial::TerminalState { from });
        }

        let Some(rule) = self.find_rule(from, to) else {
            return TransitionCheck::deny(TransitionDenial::NoSuchTransition { from, to });
        };

        if user.is_admin() || user.has_any_role(&rule.allowed_roles) {
            TransitionCheck::allow()
        } else {
            TransitionCheck::deny(TransitionDenial::InsufficientRole {
                from,
                to,
                required: rule.allowed_roles.clone(),
            })
        }
    }

    /// Targets the given user could move the quote to from `from`.
    pub fn allowed_targets(&self, from: WorkflowStatus, user: &UserContext) -> Vec<WorkflowStatus> {
        if from.is_terminal() {
            return Vec::new();
        }

        self.rules
            .iter()
            .filter(|rule| rule.from == from)
            .filter(|rule| user.is_admin() || user.has_any_role(&rule.allowed_roles))
            .map(|rule| rule.to)
            .collect()
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use crate::domain::department::{Role, UserContext};
    use crate::domain::status::WorkflowStatus;

    use super::{TransitionDenial, WorkflowConfig};

    fn sales() -> UserContext {
        UserContext::new("u-sales", [Role::Sales])
    }

    #[test]
    fn draft_to_procurement_is_allowed_for_sales() {
        let config = WorkflowConfig::standard();
        let check = config.can_transition(
            WorkflowStatus::Draft,
            WorkflowStatus::PendingProcurement,
            &sales(),
        );

        assert!(check.allowed);
        assert!(check.reason.is_none());
    }

    #[test]
    fn procurement_role_cannot_approve() {
        let config = WorkflowConfig::standard();
        let check = config.can_transition(
            WorkflowStatus::PendingApproval,
            WorkflowStatus::Approved,
            &UserContext::new("u-proc", [Role::Procurement]),
        );

        assert!(!check.allowed);
        assert!(check.reason.as_deref().is_some_and(|reason| !reason.is_empty()));
        assert!(matches!(check.denial, Some(TransitionDenial::InsufficientRole { .. })));
    }

    #[test]
    fn admin_bypasses_role_restrictions_but_not_the_graph() {
        let config = WorkflowConfig::standard();
        let admin = UserContext::new("u-admin", [Role::Admin]);

        let allowed = config.can_transition(
            WorkflowStatus::PendingApproval,
            WorkflowStatus::Approved,
            &admin,
        );
        assert!(allowed.allowed);

        let missing_edge =
            config.can_transition(WorkflowStatus::Draft, WorkflowStatus::Approved, &admin);
        assert!(matches!(missing_edge.denial, Some(TransitionDenial::NoSuchTransition { .. })));
    }

    #[test]
    fn terminal_states_have_no_targets_for_any_role() {
        let config = WorkflowConfig::standard();
        let admin = UserContext::new("u-admin", [Role::Admin]);

        for terminal in [WorkflowStatus::Deal, WorkflowStatus::Rejected, WorkflowStatus::Cancelled]
        {
            assert!(config.allowed_targets(terminal, &admin).is_empty());
            let check = config.can_transition(terminal, WorkflowStatus::Draft, &admin);
            assert!(matches!(check.denial, Some(TransitionDenial::TerminalState { .. })));
        }
    }

    #[test]
    fn graph_has_no_duplicate_edges_and_one_source() {
        let config = WorkflowConfig::standard();

        let mut seen = HashSet::new();
        for rule in config.rules() {
            assert!(seen.insert((rule.from, rule.to)), "duplicate edge {:?}", (rule.from, rule.to));
            assert!(!rule.from.is_terminal(), "terminal state {:?} has an outgoing edge", rule.from);
        }

        let targets: HashSet<_> = config.rules().iter().map(|rule| rule.to).collect();
        let sources: HashSet<_> = config.rules().iter().map(|rule| rule.from).collect();
        let roots: Vec<_> = sources.difference(&targets).collect();
        assert_eq!(roots, vec![&WorkflowStatus::Draft]);
    }

    #[test]
    fn graph_is_acyclic() {
        let config = WorkflowConfig::standard();
        let mut indegree: HashMap<WorkflowStatus, usize> = HashMap::new();
        for rule in config.rules() {
            indegree.entry(rule.from).or_insert(0);
            *indegree.entry(rule.to).or_insert(0) += 1;
        }

        // Kahn's algorithm: all nodes drain if and only if the graph
        // has no cycle.
        let mut remaining: Vec<_> = indegree.keys().copied().collect();
        while let Some(position) = remaining
            .iter()
            .position(|status| indegree.get(status).copied().unwrap_or_default() == 0)
        {
            let status = remaining.swap_remove(position);
            for rule in config.rules().iter().filter(|rule| rule.from == status) {
                if let Some(count) = indegree.get_mut(&rule.to) {
                    *count = count.saturating_sub(1);
                }
            }
        }

        assert!(remaining.is_empty(), "cycle through {remaining:?}");
    }

    #[test]
    fn join_edge_is_the_only_automatic_transition() {
        let config = WorkflowConfig::standard();
        let automatic: Vec<_> =
            config.rules().iter().filter(|rule| rule.automatic).collect();

        assert_eq!(automatic.len(), 1);
        assert_eq!(automatic[0].from, WorkflowStatus::PendingLogisticsAndCustoms);
        assert_eq!(automatic[0].to, WorkflowStatus::PendingSalesReview);
    }
}

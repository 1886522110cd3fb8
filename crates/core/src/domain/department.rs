use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The five departments that gate a quote before it can be approved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Procurement,
    Logistics,
    Customs,
    Sales,
    Control,
}

impl Department {
    pub const ALL: [Department; 5] = [
        Department::Procurement,
        Department::Logistics,
        Department::Customs,
        Department::Sales,
        Department::Control,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Procurement => "procurement",
            Department::Logistics => "logistics",
            Department::Customs => "customs",
            Department::Sales => "sales",
            Department::Control => "control",
        }
    }

    pub fn parse(code: &str) -> Option<Department> {
        match code.trim().to_ascii_lowercase().as_str() {
            "procurement" => Some(Department::Procurement),
            "logistics" => Some(Department::Logistics),
            "customs" => Some(Department::Customs),
            "sales" => Some(Department::Sales),
            "control" => Some(Department::Control),
            _ => None,
        }
    }

    /// Departments whose approval becomes stale when this one is
    /// rejected. Logistics and customs are siblings: rejecting one
    /// leaves the other untouched.
    pub fn downstream(&self) -> &'static [Department] {
        match self {
            Department::Procurement => &[
                Department::Logistics,
                Department::Customs,
                Department::Sales,
                Department::Control,
            ],
            Department::Logistics | Department::Customs => {
                &[Department::Sales, Department::Control]
            }
            Department::Sales => &[Department::Control],
            Department::Control => &[],
        }
    }

    /// Direct prerequisites that must already be approved before this
    /// department may approve.
    pub fn prerequisites(&self) -> &'static [Department] {
        match self {
            Department::Procurement => &[],
            Department::Logistics | Department::Customs => &[Department::Procurement],
            Department::Sales => &[Department::Logistics, Department::Customs],
            Department::Control => &[Department::Sales],
        }
    }
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Sales,
    Procurement,
    Logistics,
    Customs,
    Control,
    SpecControl,
    Management,
    Admin,
}

impl Role {
    pub fn parse(code: &str) -> Option<Role> {
        match code.trim().to_ascii_lowercase().as_str() {
            "sales" => Some(Role::Sales),
            "procurement" => Some(Role::Procurement),
            "logistics" => Some(Role::Logistics),
            "customs" => Some(Role::Customs),
            "control" => Some(Role::Control),
            "spec_control" => Some(Role::SpecControl),
            "management" => Some(Role::Management),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Sales => "sales",
            Role::Procurement => "procurement",
            Role::Logistics => "logistics",
            Role::Customs => "customs",
            Role::Control => "control",
            Role::SpecControl => "spec_control",
            Role::Management => "management",
            Role::Admin => "admin",
        }
    }

    /// The role entitled to act for a department in the approval gate.
    pub fn for_department(department: Department) -> Role {
        match department {
            Department::Procurement => Role::Procurement,
            Department::Logistics => Role::Logistics,
            Department::Customs => Role::Customs,
            Department::Sales => Role::Sales,
            Department::Control => Role::Control,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller identity as supplied by the (out-of-scope) session layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub roles: BTreeSet<Role>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self { user_id: user_id.into(), roles: roles.into_iter().collect() }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.roles.contains(role))
    }
}

#[cfg(test)]
mod tests {
    use super::{Department, Role, UserContext};

    #[test]
    fn downstream_of_logistics_skips_its_sibling() {
        let downstream = Department::Logistics.downstream();
        assert!(downstream.contains(&Department::Sales));
        assert!(downstream.contains(&Department::Control));
        assert!(!downstream.contains(&Department::Customs));
        assert!(!downstream.contains(&Department::Procurement));
    }

    #[test]
    fn sales_requires_both_parallel_legs() {
        assert_eq!(
            Department::Sales.prerequisites(),
            &[Department::Logistics, Department::Customs]
        );
    }

    #[test]
    fn user_context_matches_any_of_its_roles() {
        let user = UserContext::new("u-1", [Role::Sales, Role::SpecControl]);
        assert!(user.has_any_role(&[Role::Logistics, Role::Sales]));
        assert!(!user.has_any_role(&[Role::Admin]));
        assert!(!user.is_admin());
    }

    #[test]
    fn every_department_maps_to_its_own_role() {
        for department in Department::ALL {
            assert_eq!(Role::for_department(department).as_str(), department.as_str());
        }
    }
}

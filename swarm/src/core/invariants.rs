//! Graph-level checks over the `reports` relation between roles.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::core::role::RoleDefinition;

pub type RoleMap = BTreeMap<String, Arc<RoleDefinition>>;

/// Check graph invariants that no single role can check on its own:
/// - the leader, if declared, exists
/// - every subordinate name resolves to a role
/// - no role can reach itself through `reports`
pub fn validate_graph(roles: &RoleMap, leader: Option<&str>) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(leader) = leader
        && !roles.contains_key(leader)
    {
        errors.push(format!("Leader '{leader}' is not defined in agents"));
    }

    errors.extend(dangling_reports(roles));
    errors.extend(circular_reports(roles));
    errors
}

/// One error per subordinate name with no matching role.
pub fn dangling_reports(roles: &RoleMap) -> Vec<String> {
    let mut errors = Vec::new();
    for (name, role) in roles {
        for subordinate in role.reports() {
            if !roles.contains_key(subordinate) {
                errors.push(format!(
                    "Agent '{name}' reports to undefined agent '{subordinate}'"
                ));
            }
        }
    }
    errors
}

/// One error per role whose depth-first walk revisits a role on its own path.
///
/// Unknown subordinates end their branch quietly; [`dangling_reports`] owns them.
pub fn circular_reports(roles: &RoleMap) -> Vec<String> {
    roles
        .keys()
        .filter(|name| {
            let mut path = HashSet::new();
            reaches_cycle(roles, name, &mut path)
        })
        .map(|name| format!("Circular dependency detected for agent '{name}'"))
        .collect()
}

fn reaches_cycle<'a>(roles: &'a RoleMap, name: &'a str, path: &mut HashSet<&'a str>) -> bool {
    let Some(role) = roles.get(name) else {
        return false;
    };
    if !path.insert(name) {
        return true;
    }
    let found = role
        .reports()
        .iter()
        .any(|subordinate| reaches_cycle(roles, subordinate, path));
    path.remove(name);
    found
}

//! The tree builder.
//!
//! A [`Forest`] is the read model of one scope: every active assignment
//! becomes a [`TreeNode`] hung under its manager. It is never stored, only
//! derived from the assignment rows, so it can be cached and thrown away
//! freely.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  assignment::Assignment,
  ids::{AssignmentId, PersonId, RoleId, RoleScope},
  role::HierarchicalRole,
};

/// The parts of a role worth showing next to a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInfo {
  pub role_id:         RoleId,
  pub name:            String,
  pub code:            String,
  pub hierarchy_level: i32,
  pub is_manager:      bool,
}

impl From<&HierarchicalRole> for RoleInfo {
  fn from(role: &HierarchicalRole) -> Self {
    Self {
      role_id:         role.id,
      name:            role.name.clone(),
      code:            role.code.clone(),
      hierarchy_level: role.hierarchy_level,
      is_manager:      role.is_manager,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
  pub person_id:            PersonId,
  pub assignment_id:        AssignmentId,
  /// The stored manager, even when that person is no longer a member.
  pub manager_id:           Option<PersonId>,
  /// `None` if the role row could not be resolved.
  pub role:                 Option<RoleInfo>,
  pub is_manager:           bool,
  pub depth:                usize,
  pub direct_reports_count: usize,
  pub descendant_count:     usize,
  /// The node is a root only because its manager has left the scope.
  pub orphaned:             bool,
  pub children:             Vec<TreeNode>,
}

impl TreeNode {
  /// Every person below this node, in pre-order.
  pub fn descendants(&self) -> impl Iterator<Item = &TreeNode> {
    let mut stack: Vec<&TreeNode> = self.children.iter().rev().collect();
    std::iter::from_fn(move || {
      let node = stack.pop()?;
      stack.extend(node.children.iter().rev());
      Some(node)
    })
  }
}

/// Headcount summary for one manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStatistics {
  pub direct_reports:     usize,
  pub total_subordinates: usize,
  /// Direct reports who hold a manager role themselves.
  pub managers:           usize,
  pub staff:              usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forest {
  pub scope:    RoleScope,
  pub built_at: DateTime<Utc>,
  pub roots:    Vec<TreeNode>,
}

impl Forest {
  /// Every node in the forest, roots first, in pre-order.
  pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> {
    self
      .roots
      .iter()
      .flat_map(|root| std::iter::once(root).chain(root.descendants()))
  }

  pub fn len(&self) -> usize { self.nodes().count() }

  pub fn is_empty(&self) -> bool { self.roots.is_empty() }

  pub fn find(&self, person: PersonId) -> Option<&TreeNode> {
    self.nodes().find(|n| n.person_id == person)
  }

  /// Everyone transitively below `manager`.
  ///
  /// Empty when `manager` is not in the scope or does not hold a manager
  /// role there.
  pub fn visible_set(&self, manager: PersonId) -> BTreeSet<PersonId> {
    match self.find(manager) {
      Some(node) if node.is_manager => {
        node.descendants().map(|n| n.person_id).collect()
      }
      _ => BTreeSet::new(),
    }
  }

  pub fn team_statistics(&self, manager: PersonId) -> Option<TeamStatistics> {
    let node = self.find(manager)?;
    let managers = node.children.iter().filter(|c| c.is_manager).count();
    Some(TeamStatistics {
      direct_reports:     node.direct_reports_count,
      total_subordinates: node.descendant_count,
      managers,
      staff:              node.direct_reports_count - managers,
    })
  }
}

// ─── Building ────────────────────────────────────────────────────────────────

/// Build the forest for `scope` from its assignment rows.
///
/// Inactive rows and rows from other scopes are ignored. A person whose
/// manager is not an active member becomes an orphaned root rather than
/// failing the build. If the rows contain a cycle, the members that no root
/// reaches are broken out as orphaned roots as well, lowest id first.
pub fn build_forest(
  scope: RoleScope,
  assignments: &[Assignment],
  roles: &HashMap<RoleId, HierarchicalRole>,
) -> Forest {
  let active: HashMap<PersonId, &Assignment> = assignments
    .iter()
    .filter(|a| a.is_active() && a.scope == scope)
    .map(|a| (a.person_id, a))
    .collect();

  let level = |a: &Assignment| {
    roles.get(&a.role_id).map_or(i32::MAX, |r| r.hierarchy_level)
  };

  let mut reports: HashMap<PersonId, Vec<&Assignment>> = HashMap::new();
  let mut roots: Vec<&Assignment> = Vec::new();
  for a in active.values() {
    match a.manager_id {
      Some(m) if m != a.person_id && active.contains_key(&m) => {
        reports.entry(m).or_default().push(a);
      }
      _ => roots.push(a),
    }
  }
  for list in reports.values_mut() {
    list.sort_by_key(|a| (level(*a), a.person_id));
  }
  roots.sort_by_key(|a| (level(*a), a.person_id));

  let mut builder = Builder { reports, roles, visited: HashSet::new() };
  let mut built: Vec<TreeNode> = roots
    .into_iter()
    .map(|a| builder.node(a, 0, a.manager_id.is_some()))
    .collect();

  let mut stranded: Vec<&Assignment> = active.values().copied().collect();
  stranded.sort_by_key(|a| a.person_id);
  for a in stranded {
    if !builder.visited.contains(&a.person_id) {
      built.push(builder.node(a, 0, true));
    }
  }

  Forest { scope, built_at: Utc::now(), roots: built }
}

struct Builder<'a> {
  reports: HashMap<PersonId, Vec<&'a Assignment>>,
  roles:   &'a HashMap<RoleId, HierarchicalRole>,
  visited: HashSet<PersonId>,
}

impl<'a> Builder<'a> {
  fn node(&mut self, a: &'a Assignment, depth: usize, orphaned: bool) -> TreeNode {
    self.visited.insert(a.person_id);

    let reports = self.reports.get(&a.person_id).cloned().unwrap_or_default();
    let mut children = Vec::with_capacity(reports.len());
    for report in reports {
      if !self.visited.contains(&report.person_id) {
        children.push(self.node(report, depth + 1, false));
      }
    }

    let role = self.roles.get(&a.role_id);
    TreeNode {
      person_id: a.person_id,
      assignment_id: a.id,
      manager_id: a.manager_id,
      role: role.map(RoleInfo::from),
      is_manager: role.is_some_and(|r| r.is_manager),
      depth,
      direct_reports_count: children.len(),
      descendant_count: children.iter().map(|c| 1 + c.descendant_count).sum(),
      orphaned,
      children,
    }
  }
}

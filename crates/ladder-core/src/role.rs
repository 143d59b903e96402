//! The role catalog: role types and hierarchical roles.
//!
//! Roles are reference data. They are seeded once when a store is created
//! and afterwards only added to or retired; assignments point at them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{
  Error, Result,
  ids::{RoleId, RoleScope, RoleTypeId},
};

// ─── Role types ──────────────────────────────────────────────────────────────

/// Whether a role is held system-wide or inside a single scope.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RoleTypeKind {
  System,
  Scope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleType {
  pub id:          RoleTypeId,
  pub kind:        RoleTypeKind,
  pub description: Option<String>,
}

// ─── Capabilities ────────────────────────────────────────────────────────────

/// A capability tag carried by a role.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
  ManageTeam,
  ViewReports,
  BasicAccess,
  SystemManagement,
  /// Implies every other capability.
  All,
}

/// The set of capabilities a role grants.
///
/// Stored as a JSON array of tags. Older rows used an object of
/// `{"tag": true}` pairs; both shapes are accepted on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
  pub fn new(caps: impl IntoIterator<Item = Capability>) -> Self {
    Self(caps.into_iter().collect())
  }

  pub fn grants(&self, cap: Capability) -> bool {
    self.0.contains(&Capability::All) || self.0.contains(&cap)
  }

  pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
    self.0.iter().copied()
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  /// Parse a stored permissions blob. Unknown tags are an error rather than
  /// being silently dropped.
  pub fn from_json(value: &serde_json::Value) -> Result<Self> {
    let tags: Vec<&str> = match value {
      serde_json::Value::Null => Vec::new(),
      serde_json::Value::Array(items) => items
        .iter()
        .map(|v| {
          v.as_str()
            .ok_or_else(|| Error::UnknownCapability(v.to_string()))
        })
        .collect::<Result<_>>()?,
      serde_json::Value::Object(map) => map
        .iter()
        .filter(|(_, enabled)| enabled.as_bool().unwrap_or(false))
        .map(|(tag, _)| tag.as_str())
        .collect(),
      other => return Err(Error::UnknownCapability(other.to_string())),
    };

    tags
      .into_iter()
      .map(|tag| {
        tag
          .parse::<Capability>()
          .map_err(|_| Error::UnknownCapability(tag.to_owned()))
      })
      .collect::<Result<BTreeSet<_>>>()
      .map(Self)
  }

  pub fn to_json(&self) -> serde_json::Value {
    serde_json::Value::Array(
      self
        .0
        .iter()
        .map(|c| serde_json::Value::String(c.to_string()))
        .collect(),
    )
  }
}

// ─── Roles ───────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RoleStatus {
  #[default]
  Active,
  Inactive,
}

/// A named role with a position in the hierarchy (0 = top).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchicalRole {
  pub id:               RoleId,
  pub role_type:        RoleTypeKind,
  pub name:             String,
  /// Unique among non-retired roles of the same role type.
  pub code:             String,
  pub hierarchy_level:  i32,
  pub is_manager:       bool,
  pub can_view_reports: bool,
  pub description:      Option<String>,
  pub permissions:      CapabilitySet,
  pub status:           RoleStatus,
  pub created_at:       DateTime<Utc>,
  pub retired_at:       Option<DateTime<Utc>>,
}

impl HierarchicalRole {
  /// Active and not retired.
  pub fn is_assignable(&self) -> bool {
    self.status == RoleStatus::Active && self.retired_at.is_none()
  }

  /// Check that this role may be held in `scope`.
  pub fn check_assignable_in(&self, scope: &RoleScope) -> Result<()> {
    if !self.is_assignable() {
      return Err(Error::RoleInactive(self.id));
    }
    if self.role_type != scope.role_type() {
      return Err(Error::RoleScopeMismatch { role: self.id, scope: *scope });
    }
    Ok(())
  }
}

/// Input to [`crate::store::HierarchyStore::create_role`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRole {
  pub role_type:        RoleTypeKind,
  pub name:             String,
  pub code:             String,
  pub hierarchy_level:  i32,
  #[serde(default)]
  pub is_manager:       bool,
  #[serde(default)]
  pub can_view_reports: bool,
  pub description:      Option<String>,
  #[serde(default)]
  pub permissions:      CapabilitySet,
}

struct Seed {
  role_type:   RoleTypeKind,
  name:        &'static str,
  code:        &'static str,
  level:       i32,
  manager:     bool,
  description: &'static str,
  permissions: &'static [Capability],
}

const SEEDS: &[Seed] = &[
  Seed {
    role_type:   RoleTypeKind::System,
    name:        "Super Admin",
    code:        "super_admin",
    level:       0,
    manager:     true,
    description: "Full system access",
    permissions: &[Capability::All],
  },
  Seed {
    role_type:   RoleTypeKind::System,
    name:        "Admin",
    code:        "admin",
    level:       0,
    manager:     true,
    description: "System administrator",
    permissions: &[Capability::SystemManagement],
  },
  Seed {
    role_type:   RoleTypeKind::Scope,
    name:        "Manager (L1)",
    code:        "manager_l1",
    level:       1,
    manager:     true,
    description: "First-level manager",
    permissions: &[Capability::ManageTeam, Capability::ViewReports],
  },
  Seed {
    role_type:   RoleTypeKind::Scope,
    name:        "Manager (L2)",
    code:        "manager_l2",
    level:       2,
    manager:     true,
    description: "Second-level manager",
    permissions: &[Capability::ManageTeam, Capability::ViewReports],
  },
  Seed {
    role_type:   RoleTypeKind::Scope,
    name:        "Manager (L3)",
    code:        "manager_l3",
    level:       3,
    manager:     true,
    description: "Third-level manager",
    permissions: &[Capability::ManageTeam, Capability::ViewReports],
  },
  Seed {
    role_type:   RoleTypeKind::Scope,
    name:        "Staff",
    code:        "staff",
    level:       99,
    manager:     false,
    description: "Standard staff member",
    permissions: &[Capability::BasicAccess],
  },
  Seed {
    role_type:   RoleTypeKind::Scope,
    name:        "Member",
    code:        "member",
    level:       99,
    manager:     false,
    description: "Program member",
    permissions: &[Capability::BasicAccess],
  },
];

/// The catalog every new store starts with.
pub fn seed_roles() -> Vec<NewRole> {
  SEEDS
    .iter()
    .map(|seed| NewRole {
      role_type:        seed.role_type,
      name:             seed.name.to_owned(),
      code:             seed.code.to_owned(),
      hierarchy_level:  seed.level,
      is_manager:       seed.manager,
      can_view_reports: seed.manager,
      description:      Some(seed.description.to_owned()),
      permissions:      CapabilitySet::new(seed.permissions.iter().copied()),
    })
    .collect()
}

//! Opaque identifiers.
//!
//! Persons and scopes are owned by collaborating systems; this crate only
//! ever sees their UUIDs. Each identifier gets its own newtype so a person id
//! cannot be passed where a scope id is expected.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::RoleTypeKind;

macro_rules! id_type {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(
      Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
      Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(pub Uuid);

    impl $name {
      /// A fresh random (v4) identifier.
      pub fn random() -> Self { Self(Uuid::new_v4()) }

      pub fn as_uuid(&self) -> Uuid { self.0 }
    }

    impl From<Uuid> for $name {
      fn from(id: Uuid) -> Self { Self(id) }
    }

    impl From<$name> for Uuid {
      fn from(id: $name) -> Uuid { id.0 }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
      }
    }

    impl FromStr for $name {
      type Err = uuid::Error;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
      }
    }
  };
}

id_type!(
  /// A person, as known to the external identity source.
  PersonId
);
id_type!(
  /// A program or organisation unit, as known to the external scope source.
  ScopeId
);
id_type!(RoleId);
id_type!(RoleTypeId);
id_type!(AssignmentId);
id_type!(EventId);

// ─── RoleScope ───────────────────────────────────────────────────────────────

/// Where a reporting relationship lives.
///
/// System-wide roles have no scope; everything else belongs to exactly one
/// program. Each variant forms its own independent reporting forest.
///
/// Serialised as a plain string, the same form used in URL paths.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
  Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum RoleScope {
  System,
  Scoped(ScopeId),
}

impl RoleScope {
  pub fn scope_id(&self) -> Option<ScopeId> {
    match self {
      Self::System => None,
      Self::Scoped(id) => Some(*id),
    }
  }

  /// The role type a role must have to be held in this scope.
  pub fn role_type(&self) -> RoleTypeKind {
    match self {
      Self::System => RoleTypeKind::System,
      Self::Scoped(_) => RoleTypeKind::Scope,
    }
  }
}

impl From<Option<ScopeId>> for RoleScope {
  fn from(id: Option<ScopeId>) -> Self {
    id.map_or(Self::System, Self::Scoped)
  }
}

impl fmt::Display for RoleScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::System => f.write_str("system"),
      Self::Scoped(id) => id.fmt(f),
    }
  }
}

/// Parses the path-segment form: the literal `system`, or a scope UUID.
impl FromStr for RoleScope {
  type Err = uuid::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.eq_ignore_ascii_case("system") {
      return Ok(Self::System);
    }
    s.parse().map(Self::Scoped)
  }
}

impl TryFrom<String> for RoleScope {
  type Error = uuid::Error;

  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<RoleScope> for String {
  fn from(scope: RoleScope) -> String { scope.to_string() }
}

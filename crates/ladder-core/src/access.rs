//! The dashboard access gate.
//!
//! Collaborators that list manager-scoped data (activities, events,
//! questionnaires, notifications, reports) ask the gate before returning
//! anything. Absence of a row denies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::ids::{PersonId, RoleScope};

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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DashboardCapability {
  ViewActivities,
  ViewEvents,
  ViewQuestionnaires,
  ViewNotifications,
  ExportReports,
}

/// Per-capability switches for one manager in one scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardFlags {
  pub can_view_activities:     bool,
  pub can_view_events:         bool,
  pub can_view_questionnaires: bool,
  pub can_view_notifications:  bool,
  pub can_export_reports:      bool,
}

impl DashboardFlags {
  pub fn all() -> Self {
    Self {
      can_view_activities:     true,
      can_view_events:         true,
      can_view_questionnaires: true,
      can_view_notifications:  true,
      can_export_reports:      true,
    }
  }

  pub fn allows(&self, capability: DashboardCapability) -> bool {
    match capability {
      DashboardCapability::ViewActivities => self.can_view_activities,
      DashboardCapability::ViewEvents => self.can_view_events,
      DashboardCapability::ViewQuestionnaires => self.can_view_questionnaires,
      DashboardCapability::ViewNotifications => self.can_view_notifications,
      DashboardCapability::ExportReports => self.can_export_reports,
    }
  }
}

/// At most one row per `(manager_id, scope)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardAccess {
  pub manager_id: PersonId,
  pub scope:      RoleScope,
  pub flags:      DashboardFlags,
  pub updated_at: DateTime<Utc>,
}

/// Default-deny lookup over an optional access row.
pub fn can_view(
  access: Option<&DashboardAccess>,
  capability: DashboardCapability,
) -> bool {
  access.is_some_and(|a| a.flags.allows(capability))
}

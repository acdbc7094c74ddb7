//! Dashboard variants and their tab registries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CollectionKind, Eligibility, Record, TabDescriptor};

/// Which dashboard shell is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardVariant {
    Admin,
    User,
}

impl DashboardVariant {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(DashboardVariant::Admin),
            "user" => Some(DashboardVariant::User),
            _ => None,
        }
    }
}

/// Where a collection's reconciliation cycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Idle,
    Fetching,
    Computed,
}

/// A collection the reconciler tracks, with the rule deciding what counts as unread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionBinding {
    pub kind: CollectionKind,
    pub eligibility: Eligibility,
}

impl CollectionBinding {
    pub fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            eligibility: kind.default_eligibility(),
        }
    }
}

/// Everything that distinguishes one dashboard shell from another.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub variant: DashboardVariant,
    /// Tab registry in display order. Never mutated once built.
    pub tabs: Vec<TabDescriptor>,
    pub collections: Vec<CollectionBinding>,
    pub default_tab: String,
}

impl DashboardConfig {
    /// Tab layout of the administrator dashboard.
    pub fn admin() -> Self {
        Self {
            variant: DashboardVariant::Admin,
            tabs: vec![
                TabDescriptor::new("carte", "Carte", "🗺️"),
                TabDescriptor::new("historique", "Historique", "📊"),
                TabDescriptor::new("annoncez", "Annoncez", "📢"),
                TabDescriptor::new("affichage", "Affichage", "👁️")
                    .bound_to(CollectionKind::Announcements),
                TabDescriptor::new("liste", "Liste", "📋").bound_to(CollectionKind::Alerts),
            ],
            collections: CollectionKind::ALL
                .into_iter()
                .map(CollectionBinding::new)
                .collect(),
            default_tab: "carte".to_string(),
        }
    }

    /// Tab layout of the citizen dashboard.
    pub fn user() -> Self {
        Self {
            variant: DashboardVariant::User,
            tabs: vec![
                TabDescriptor::new("carte", "Carte", "🗺️"),
                TabDescriptor::new("historique", "Historique", "📊"),
                TabDescriptor::new("affichage", "Affichage", "👁️")
                    .bound_to(CollectionKind::Announcements),
                TabDescriptor::new("ajout", "Ajout", "➕"),
                TabDescriptor::new("liste", "Liste", "📋").bound_to(CollectionKind::Alerts),
            ],
            collections: CollectionKind::ALL
                .into_iter()
                .map(CollectionBinding::new)
                .collect(),
            default_tab: "carte".to_string(),
        }
    }

    pub fn for_variant(variant: DashboardVariant) -> Self {
        match variant {
            DashboardVariant::Admin => Self::admin(),
            DashboardVariant::User => Self::user(),
        }
    }

    pub fn tab(&self, tab_id: &str) -> Option<&TabDescriptor> {
        self.tabs.iter().find(|t| t.id == tab_id)
    }

    pub fn binding(&self, kind: CollectionKind) -> Option<&CollectionBinding> {
        self.collections.iter().find(|b| b.kind == kind)
    }
}

/// Request body for mounting a dashboard.
#[derive(Debug, Clone, Deserialize)]
pub struct MountDashboardRequest {
    pub variant: String,
}

/// Snapshot of a mounted dashboard as returned to the frontend.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub id: Uuid,
    pub variant: DashboardVariant,
    pub active_tab: String,
    pub tabs: Vec<TabDescriptor>,
    pub unread: BTreeMap<CollectionKind, u64>,
    pub watermarks: BTreeMap<CollectionKind, i64>,
    pub phases: BTreeMap<CollectionKind, CyclePhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_at: Option<DateTime<Utc>>,
}

/// Query parameters for the tab long-poll.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitQuery {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Result of terminating an alert: the updated record and the refreshed tabs.
#[derive(Debug, Clone, Serialize)]
pub struct AlertUpdate {
    pub alert: Record,
    pub tabs: Vec<TabDescriptor>,
}

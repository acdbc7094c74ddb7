//! Collection records as served by the alerting backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The two remote collections that carry unread notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Alerts,
    Announcements,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 2] = [CollectionKind::Alerts, CollectionKind::Announcements];

    /// Key under which the watermark for this kind is persisted.
    pub fn storage_key(self) -> &'static str {
        match self {
            CollectionKind::Alerts => "lastSeenAlertId",
            CollectionKind::Announcements => "lastSeenAnnonceId",
        }
    }

    /// Path segment of the backend collection endpoint (`/api/<segment>/`).
    pub fn endpoint(self) -> &'static str {
        match self {
            CollectionKind::Alerts => "alertes",
            CollectionKind::Announcements => "annonces",
        }
    }

    /// Announcements have no status, so every one of them counts.
    pub fn default_eligibility(self) -> Eligibility {
        match self {
            CollectionKind::Alerts => Eligibility::OpenOnly,
            CollectionKind::Announcements => Eligibility::Any,
        }
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionKind::Alerts => f.write_str("alerts"),
            CollectionKind::Announcements => f.write_str("announcements"),
        }
    }
}

/// Alert lifecycle status (`statut` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    #[serde(rename = "en_cours")]
    Open,
    #[serde(rename = "termine")]
    Closed,
    #[serde(other)]
    Unknown,
}

/// One entry of a collection snapshot.
///
/// Only `id` and `statut` are interpreted; everything else (description, location, photo,
/// dates) is kept verbatim in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    #[serde(rename = "statut", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AlertStatus>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

#[cfg(test)]
impl Record {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            status: None,
            payload: Map::new(),
        }
    }

    pub fn with_status(mut self, status: AlertStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Which records of a collection count toward its unread total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Only records whose status is open.
    OpenOnly,
    /// Every record, status ignored.
    Any,
}

impl Eligibility {
    pub fn admits(self, record: &Record) -> bool {
        match self {
            Eligibility::OpenOnly => record.status == Some(AlertStatus::Open),
            Eligibility::Any => true,
        }
    }
}

//! Navigation tab model rendered by the dashboard frontends.

use serde::{Deserialize, Serialize};

use super::CollectionKind;

/// A navigation tab, optionally bound to a collection whose unread count it shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabDescriptor {
    pub id: String,
    pub label: String,
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_collection: Option<CollectionKind>,
    /// Present only when the bound collection has unread records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_count: Option<u64>,
}

impl TabDescriptor {
    pub fn new(id: &str, label: &str, icon: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            icon: icon.to_string(),
            bound_collection: None,
            notification_count: None,
        }
    }

    pub fn bound_to(mut self, kind: CollectionKind) -> Self {
        self.bound_collection = Some(kind);
        self
    }
}

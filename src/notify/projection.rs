//! Tab/badge projection.

use std::collections::HashMap;

use crate::models::{CollectionKind, TabDescriptor};

/// Render `tabs` with badge counts taken from `counts`.
///
/// A bound tab gets `notification_count` only when its collection has unread records; a
/// zero count is omitted rather than rendered. Unbound tabs are copied as-is. The input
/// registry is left untouched.
pub fn project(
    tabs: &[TabDescriptor],
    counts: &HashMap<CollectionKind, u64>,
) -> Vec<TabDescriptor> {
    tabs.iter()
        .map(|tab| {
            let mut rendered = tab.clone();
            if let Some(kind) = tab.bound_collection {
                rendered.notification_count = counts.get(&kind).copied().filter(|&n| n > 0);
            }
            rendered
        })
        .collect()
}

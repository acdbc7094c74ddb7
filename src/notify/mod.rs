//! Unread-notification engine.
//!
//! Snapshots come in through a [`CollectionFetcher`](crate::fetcher::CollectionFetcher),
//! get compared against the persisted watermarks, and come out as badge counts on the
//! dashboard tabs.

mod projection;
mod reconciler;
mod registry;
mod unread;

#[cfg(test)]
pub(crate) mod testing;

pub use projection::*;
pub use reconciler::*;
pub use registry::*;
pub use unread::*;

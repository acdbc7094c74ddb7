//! Data models for the notification service.
//!
//! Records mirror the alerting backend's JSON; tab and dashboard models are what the
//! dashboard frontends render.

mod dashboard;
mod record;
mod tab;

pub use dashboard::*;
pub use record::*;
pub use tab::*;

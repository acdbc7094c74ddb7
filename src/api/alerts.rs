//! Alert mutations performed on behalf of a dashboard.

use axum::extract::{Path, State};

use super::{parse_dashboard_id, success, ApiResult};
use crate::models::AlertUpdate;
use crate::AppState;

/// POST /api/dashboards/:id/alerts/:alert_id/terminate - Close an alert.
///
/// The dashboard is reconciled right after the backend accepts the change.
pub async fn terminate_alert(
    State(state): State<AppState>,
    Path((id, alert_id)): Path<(String, i64)>,
) -> ApiResult<AlertUpdate> {
    let reconciler = state.dashboards.get(parse_dashboard_id(&id)?)?;

    let alert = state.backend.terminate_alert(alert_id).await?;
    reconciler.refresh().await;

    success(AlertUpdate {
        alert,
        tabs: reconciler.tabs(),
    })
}

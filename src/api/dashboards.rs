//! Dashboard API endpoints.

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{parse_dashboard_id, success, ApiResult};
use crate::errors::AppError;
use crate::models::{
    DashboardVariant, DashboardView, MountDashboardRequest, TabDescriptor, WaitQuery,
};
use crate::AppState;

/// Default and maximum hold time of the tab long-poll.
const DEFAULT_WAIT_SECS: u64 = 25;
const MAX_WAIT_SECS: u64 = 60;

/// POST /api/dashboards - Mount a dashboard and run its first reconciliation.
pub async fn mount_dashboard(
    State(state): State<AppState>,
    Json(request): Json<MountDashboardRequest>,
) -> ApiResult<DashboardView> {
    let variant = DashboardVariant::parse(&request.variant).ok_or_else(|| {
        AppError::Validation(format!(
            "Unknown dashboard variant: {} (expected admin or user)",
            request.variant
        ))
    })?;

    let reconciler = state.dashboards.mount(variant).await;
    success(reconciler.view())
}

/// GET /api/dashboards/:id - Dashboard state.
pub async fn get_dashboard(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DashboardView> {
    let reconciler = state.dashboards.get(parse_dashboard_id(&id)?)?;
    success(reconciler.view())
}

/// DELETE /api/dashboards/:id - Unmount a dashboard.
pub async fn unmount_dashboard(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.dashboards.unmount(parse_dashboard_id(&id)?)?;
    success(())
}

/// GET /api/dashboards/:id/tabs - Current tabs with badges.
pub async fn get_tabs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<TabDescriptor>> {
    let reconciler = state.dashboards.get(parse_dashboard_id(&id)?)?;
    success(reconciler.tabs())
}

/// GET /api/dashboards/:id/tabs/changes - Wait until the tabs change, or time out.
pub async fn wait_for_tabs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WaitQuery>,
) -> ApiResult<Vec<TabDescriptor>> {
    let reconciler = state.dashboards.get(parse_dashboard_id(&id)?)?;
    let mut changes = reconciler.subscribe();

    let wait = Duration::from_secs(
        query
            .timeout_secs
            .unwrap_or(DEFAULT_WAIT_SECS)
            .min(MAX_WAIT_SECS),
    );
    // Timing out is a normal outcome; the current tabs are returned either way.
    let _ = tokio::time::timeout(wait, changes.changed()).await;
    reconciler.touch();

    success(reconciler.tabs())
}

/// POST /api/dashboards/:id/tabs/:tab_id/activate - Visit a tab.
pub async fn activate_tab(
    State(state): State<AppState>,
    Path((id, tab_id)): Path<(String, String)>,
) -> ApiResult<Vec<TabDescriptor>> {
    let reconciler = state.dashboards.get(parse_dashboard_id(&id)?)?;
    let tabs = reconciler.activate_tab(&tab_id).await?;
    success(tabs)
}

/// POST /api/dashboards/:id/refresh - Data changed; reconcile now.
pub async fn refresh_dashboard(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<TabDescriptor>> {
    let reconciler = state.dashboards.get(parse_dashboard_id(&id)?)?;
    reconciler.refresh().await;
    success(reconciler.tabs())
}

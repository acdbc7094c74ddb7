//! Notification reconciler: one per mounted dashboard.
//!
//! Owns the in-memory unread counts and the projected tab list. Counts are refreshed on
//! mount, on a fixed interval, and whenever a mutating feature reports a data change.
//! Visiting a tab bound to a collection with unread records acknowledges them by
//! advancing that collection's watermark.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use super::{compute_new_watermark, compute_unread, project};
use crate::db::WatermarkStore;
use crate::errors::AppError;
use crate::fetcher::CollectionFetcher;
use crate::models::{
    CollectionBinding, CollectionKind, CyclePhase, DashboardConfig, DashboardVariant,
    DashboardView, TabDescriptor,
};

struct ReconcilerState {
    watermarks: HashMap<CollectionKind, i64>,
    unread: HashMap<CollectionKind, u64>,
    phases: HashMap<CollectionKind, CyclePhase>,
    active_tab: String,
    last_cycle_at: Option<DateTime<Utc>>,
}

impl ReconcilerState {
    fn watermark(&self, kind: CollectionKind) -> i64 {
        self.watermarks.get(&kind).copied().unwrap_or(0)
    }

    fn unread(&self, kind: CollectionKind) -> u64 {
        self.unread.get(&kind).copied().unwrap_or(0)
    }

    /// Phase to fall back to after a failed fetch.
    fn settled_phase(&self, kind: CollectionKind) -> CyclePhase {
        if self.unread.contains_key(&kind) {
            CyclePhase::Computed
        } else {
            CyclePhase::Idle
        }
    }
}

pub struct Reconciler {
    id: Uuid,
    config: DashboardConfig,
    fetcher: Arc<dyn CollectionFetcher>,
    store: WatermarkStore,
    state: Mutex<ReconcilerState>,
    tabs_tx: watch::Sender<Vec<TabDescriptor>>,
    mounted: AtomicBool,
    ticker: Mutex<Option<JoinHandle<()>>>,
    /// Last time a client read or drove this dashboard. Ticks do not count.
    last_seen: Mutex<Instant>,
}

impl Reconciler {
    /// Load watermarks, run the first reconciliation cycle and start the periodic ticker.
    pub async fn mount(
        config: DashboardConfig,
        fetcher: Arc<dyn CollectionFetcher>,
        store: WatermarkStore,
        poll_interval: Duration,
    ) -> Arc<Self> {
        let mut watermarks = HashMap::new();
        let mut phases = HashMap::new();
        for binding in &config.collections {
            watermarks.insert(binding.kind, store.get(binding.kind).await);
            phases.insert(binding.kind, CyclePhase::Idle);
        }

        let (tabs_tx, _) = watch::channel(project(&config.tabs, &HashMap::new()));

        let reconciler = Arc::new(Self {
            id: Uuid::new_v4(),
            state: Mutex::new(ReconcilerState {
                watermarks,
                unread: HashMap::new(),
                phases,
                active_tab: config.default_tab.clone(),
                last_cycle_at: None,
            }),
            config,
            fetcher,
            store,
            tabs_tx,
            mounted: AtomicBool::new(true),
            ticker: Mutex::new(None),
            last_seen: Mutex::new(Instant::now()),
        });

        tracing::info!(
            dashboard = %reconciler.id,
            variant = ?reconciler.config.variant,
            "Dashboard mounted"
        );

        reconciler.refresh().await;

        let handle = tokio::spawn(run_ticker(Arc::downgrade(&reconciler), poll_interval));
        *reconciler.ticker.lock() = Some(handle);

        reconciler
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn variant(&self) -> DashboardVariant {
        self.config.variant
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Record client activity, postponing idle eviction.
    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Current projected tab list.
    pub fn tabs(&self) -> Vec<TabDescriptor> {
        self.tabs_tx.borrow().clone()
    }

    /// Observe the projected tab list. Notified only when the projection changes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<TabDescriptor>> {
        self.tabs_tx.subscribe()
    }

    #[cfg(test)]
    pub fn unread(&self, kind: CollectionKind) -> u64 {
        self.state.lock().unread(kind)
    }

    #[cfg(test)]
    pub fn watermark(&self, kind: CollectionKind) -> i64 {
        self.state.lock().watermark(kind)
    }

    pub fn view(&self) -> DashboardView {
        let state = self.state.lock();
        DashboardView {
            id: self.id,
            variant: self.config.variant,
            active_tab: state.active_tab.clone(),
            tabs: self.tabs(),
            unread: self
                .config
                .collections
                .iter()
                .map(|b| (b.kind, state.unread(b.kind)))
                .collect(),
            watermarks: self
                .config
                .collections
                .iter()
                .map(|b| (b.kind, state.watermark(b.kind)))
                .collect::<BTreeMap<_, _>>(),
            phases: state.phases.iter().map(|(k, p)| (*k, *p)).collect(),
            last_cycle_at: state.last_cycle_at,
        }
    }

    /// Run one reconciliation cycle for every bound collection, concurrently.
    ///
    /// This is also the data-changed entry point: features that create, edit or close
    /// records call it so badges catch up without waiting for the next tick.
    pub async fn refresh(&self) {
        let cycles = self
            .config
            .collections
            .iter()
            .map(|binding| self.run_cycle(*binding));
        futures::future::join_all(cycles).await;
    }

    /// Tab activation. Acknowledges the bound collection when it has unread records.
    pub async fn activate_tab(&self, tab_id: &str) -> Result<Vec<TabDescriptor>, AppError> {
        let tab = self
            .config
            .tab(tab_id)
            .ok_or_else(|| AppError::NotFound(format!("Tab {} not found", tab_id)))?;

        let pending = {
            let mut state = self.state.lock();
            state.active_tab = tab.id.clone();
            tab.bound_collection
                .and_then(|kind| self.config.binding(kind).copied())
                .filter(|binding| state.unread(binding.kind) > 0)
        };

        if let Some(binding) = pending {
            self.mark_as_read(binding).await;
        }

        Ok(self.tabs())
    }

    /// Stop the ticker. Cycles still in flight will discard their results.
    pub fn unmount(&self) {
        if self.mounted.swap(false, Ordering::SeqCst) {
            if let Some(handle) = self.ticker.lock().take() {
                handle.abort();
            }
            tracing::info!(dashboard = %self.id, "Dashboard unmounted");
        }
    }

    async fn run_cycle(&self, binding: CollectionBinding) {
        if !self.is_mounted() {
            return;
        }
        let kind = binding.kind;
        self.state.lock().phases.insert(kind, CyclePhase::Fetching);

        let snapshot = match self.fetcher.fetch(kind).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    dashboard = %self.id,
                    %kind,
                    "Reconciliation fetch failed, keeping last count: {}",
                    e
                );
                let mut state = self.state.lock();
                let settled = state.settled_phase(kind);
                state.phases.insert(kind, settled);
                return;
            }
        };

        if !self.is_mounted() {
            tracing::debug!(dashboard = %self.id, %kind, "Discarding cycle after unmount");
            return;
        }

        // Counted against the watermark at apply time, so a snapshot fetched before a
        // concurrent mark-as-read cannot bring acknowledged records back.
        let mut state = self.state.lock();
        let unread = compute_unread(&snapshot, state.watermark(kind), binding.eligibility);
        state.unread.insert(kind, unread);
        state.phases.insert(kind, CyclePhase::Computed);
        state.last_cycle_at = Some(Utc::now());
        self.publish(&state);

        tracing::debug!(dashboard = %self.id, %kind, unread, "Reconciliation cycle done");
    }

    async fn mark_as_read(&self, binding: CollectionBinding) {
        if !self.is_mounted() {
            return;
        }
        let kind = binding.kind;

        // Fresh snapshot so the watermark reflects the moment of acknowledgment.
        let snapshot = match self.fetcher.fetch(kind).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    dashboard = %self.id,
                    %kind,
                    "Mark-as-read fetch failed, watermark unchanged: {}",
                    e
                );
                return;
            }
        };

        // Other dashboards share the store and may already be ahead of us.
        let persisted = self.store.get(kind).await;
        let current = self.state.lock().watermark(kind).max(persisted);
        let watermark = compute_new_watermark(&snapshot, current, binding.eligibility);
        self.store.set(kind, watermark).await;

        if !self.is_mounted() {
            return;
        }

        let mut state = self.state.lock();
        let entry = state.watermarks.entry(kind).or_insert(0);
        *entry = (*entry).max(watermark);
        state.unread.insert(kind, 0);
        state.phases.insert(kind, CyclePhase::Computed);
        self.publish(&state);

        tracing::info!(dashboard = %self.id, %kind, watermark, "Collection marked as read");
    }

    /// Recompute the projection; held under the state lock so publications stay ordered.
    fn publish(&self, state: &ReconcilerState) {
        let tabs = project(&self.config.tabs, &state.unread);
        self.tabs_tx.send_if_modified(|current| {
            if *current == tabs {
                false
            } else {
                *current = tabs;
                true
            }
        });
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.get_mut().take() {
            handle.abort();
        }
    }
}

/// Periodic reconciliation. Holds only a weak reference so a dropped dashboard stops it.
async fn run_ticker(reconciler: Weak<Reconciler>, period: Duration) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let Some(reconciler) = reconciler.upgrade() else {
            break;
        };
        if !reconciler.is_mounted() {
            break;
        }
        reconciler.refresh().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::{announcement, closed, open, temp_store, ScriptedFetcher};

    const SLOW: Duration = Duration::from_secs(3600);

    async fn mount_user(
        fetcher: &Arc<ScriptedFetcher>,
        store: &WatermarkStore,
        interval: Duration,
    ) -> Arc<Reconciler> {
        Reconciler::mount(
            DashboardConfig::user(),
            fetcher.clone(),
            store.clone(),
            interval,
        )
        .await
    }

    fn badge(tabs: &[TabDescriptor], id: &str) -> Option<u64> {
        tabs.iter()
            .find(|t| t.id == id)
            .and_then(|t| t.notification_count)
    }

    #[tokio::test]
    async fn test_alert_scenario() {
        let (_dir, store) = temp_store().await;
        store.set(CollectionKind::Alerts, 5).await;

        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.set(
            CollectionKind::Alerts,
            vec![open(3), open(6), closed(7), open(9)],
        );

        let reconciler = mount_user(&fetcher, &store, SLOW).await;
        assert_eq!(reconciler.unread(CollectionKind::Alerts), 2);
        assert_eq!(badge(&reconciler.tabs(), "liste"), Some(2));

        let tabs = reconciler.activate_tab("liste").await.unwrap();
        assert_eq!(badge(&tabs, "liste"), None);
        assert_eq!(reconciler.unread(CollectionKind::Alerts), 0);
        assert_eq!(reconciler.watermark(CollectionKind::Alerts), 9);
        assert_eq!(store.get(CollectionKind::Alerts).await, 9);
        assert_eq!(reconciler.view().active_tab, "liste");
    }

    #[tokio::test]
    async fn test_announcement_scenario() {
        let (_dir, store) = temp_store().await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.set(
            CollectionKind::Announcements,
            vec![announcement(1), announcement(2)],
        );

        let reconciler = mount_user(&fetcher, &store, SLOW).await;
        assert_eq!(reconciler.unread(CollectionKind::Announcements), 2);
        assert_eq!(badge(&reconciler.tabs(), "affichage"), Some(2));

        reconciler.activate_tab("affichage").await.unwrap();
        assert_eq!(store.get(CollectionKind::Announcements).await, 2);
        assert_eq!(reconciler.unread(CollectionKind::Announcements), 0);

        reconciler.refresh().await;
        assert_eq!(reconciler.unread(CollectionKind::Announcements), 0);
        assert_eq!(badge(&reconciler.tabs(), "affichage"), None);
    }

    #[tokio::test]
    async fn test_mark_as_read_is_idempotent() {
        let (_dir, store) = temp_store().await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.set(CollectionKind::Alerts, vec![open(1), open(2)]);

        let reconciler = mount_user(&fetcher, &store, SLOW).await;
        reconciler.activate_tab("liste").await.unwrap();
        let calls = fetcher.calls(CollectionKind::Alerts);
        assert_eq!(calls, 2);

        reconciler.activate_tab("liste").await.unwrap();
        reconciler.activate_tab("liste").await.unwrap();

        assert_eq!(fetcher.calls(CollectionKind::Alerts), calls);
        assert_eq!(store.get(CollectionKind::Alerts).await, 2);
    }

    #[tokio::test]
    async fn test_unbound_tab_does_not_fetch() {
        let (_dir, store) = temp_store().await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.set(CollectionKind::Alerts, vec![open(1)]);

        let reconciler = mount_user(&fetcher, &store, SLOW).await;
        reconciler.activate_tab("historique").await.unwrap();

        assert_eq!(fetcher.calls(CollectionKind::Alerts), 1);
        assert_eq!(reconciler.unread(CollectionKind::Alerts), 1);
        assert_eq!(reconciler.view().active_tab, "historique");
    }

    #[tokio::test]
    async fn test_unknown_tab_is_not_found() {
        let (_dir, store) = temp_store().await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        let reconciler = mount_user(&fetcher, &store, SLOW).await;

        let result = reconciler.activate_tab("annoncez").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(reconciler.view().active_tab, "carte");
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_count() {
        let (_dir, store) = temp_store().await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.set(CollectionKind::Alerts, vec![open(1), open(2)]);

        let reconciler = mount_user(&fetcher, &store, SLOW).await;
        assert_eq!(reconciler.unread(CollectionKind::Alerts), 2);

        fetcher.set(CollectionKind::Alerts, vec![open(1), open(2), open(3)]);
        fetcher.fail(CollectionKind::Alerts, true);
        reconciler.refresh().await;

        assert_eq!(reconciler.unread(CollectionKind::Alerts), 2);
        assert_eq!(badge(&reconciler.tabs(), "liste"), Some(2));
        assert_eq!(
            reconciler.view().phases[&CollectionKind::Alerts],
            CyclePhase::Computed
        );
    }

    #[tokio::test]
    async fn test_failed_first_fetch_leaves_collection_idle() {
        let (_dir, store) = temp_store().await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.fail(CollectionKind::Announcements, true);

        let reconciler = mount_user(&fetcher, &store, SLOW).await;
        let view = reconciler.view();

        assert_eq!(view.phases[&CollectionKind::Announcements], CyclePhase::Idle);
        assert_eq!(view.phases[&CollectionKind::Alerts], CyclePhase::Computed);
        assert_eq!(view.unread[&CollectionKind::Announcements], 0);
    }

    #[tokio::test]
    async fn test_failed_mark_as_read_keeps_badge() {
        let (_dir, store) = temp_store().await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.set(CollectionKind::Alerts, vec![open(4)]);

        let reconciler = mount_user(&fetcher, &store, SLOW).await;
        fetcher.fail(CollectionKind::Alerts, true);

        let tabs = reconciler.activate_tab("liste").await.unwrap();
        assert_eq!(badge(&tabs, "liste"), Some(1));
        assert_eq!(store.get(CollectionKind::Alerts).await, 0);

        fetcher.fail(CollectionKind::Alerts, false);
        let tabs = reconciler.activate_tab("liste").await.unwrap();
        assert_eq!(badge(&tabs, "liste"), None);
        assert_eq!(store.get(CollectionKind::Alerts).await, 4);
    }

    #[tokio::test]
    async fn test_mark_as_read_does_not_regress_shared_store() {
        let (_dir, store) = temp_store().await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.set(CollectionKind::Alerts, vec![open(6), open(8)]);

        let reconciler = mount_user(&fetcher, &store, SLOW).await;
        // Another dashboard acknowledged further ahead after we mounted.
        store.set(CollectionKind::Alerts, 20).await;

        reconciler.activate_tab("liste").await.unwrap();
        assert_eq!(store.get(CollectionKind::Alerts).await, 20);
        assert_eq!(reconciler.watermark(CollectionKind::Alerts), 20);
    }

    #[tokio::test]
    async fn test_data_change_updates_badges() {
        let (_dir, store) = temp_store().await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        let reconciler = mount_user(&fetcher, &store, SLOW).await;
        assert_eq!(badge(&reconciler.tabs(), "liste"), None);

        let mut rx = reconciler.subscribe();
        fetcher.set(CollectionKind::Alerts, vec![open(1)]);
        reconciler.refresh().await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(badge(&rx.borrow_and_update(), "liste"), Some(1));

        // Same data again: projection unchanged, observers not woken.
        reconciler.refresh().await;
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_periodic_tick_refreshes_counts() {
        let (_dir, store) = temp_store().await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        let reconciler = mount_user(&fetcher, &store, Duration::from_millis(40)).await;
        assert_eq!(reconciler.unread(CollectionKind::Announcements), 0);

        fetcher.set(
            CollectionKind::Announcements,
            vec![announcement(1), announcement(2), announcement(3)],
        );
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(reconciler.unread(CollectionKind::Announcements), 3);
        assert!(fetcher.calls(CollectionKind::Announcements) >= 2);
        assert!(reconciler.view().last_cycle_at.is_some());
    }

    #[tokio::test]
    async fn test_unmount_stops_ticker_and_discards_late_cycles() {
        let (_dir, store) = temp_store().await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        let reconciler = mount_user(&fetcher, &store, Duration::from_millis(40)).await;

        fetcher.set(CollectionKind::Alerts, vec![open(1), open(2)]);
        fetcher.delay(Some(Duration::from_millis(150)));

        let in_flight = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconciler.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        reconciler.unmount();
        in_flight.await.unwrap();

        assert!(!reconciler.is_mounted());
        assert_eq!(reconciler.unread(CollectionKind::Alerts), 0);

        let calls = fetcher.calls(CollectionKind::Alerts);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fetcher.calls(CollectionKind::Alerts), calls);

        reconciler.refresh().await;
        assert_eq!(fetcher.calls(CollectionKind::Alerts), calls);
    }

    #[tokio::test]
    async fn test_late_cycle_does_not_resurrect_acknowledged_alerts() {
        let (_dir, store) = temp_store().await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.set(CollectionKind::Alerts, vec![open(1), open(2)]);

        let reconciler = mount_user(&fetcher, &store, SLOW).await;
        assert_eq!(reconciler.unread(CollectionKind::Alerts), 2);

        // This cycle reads [1, 2] now but only applies it after the acknowledgment below.
        fetcher.delay(Some(Duration::from_millis(150)));
        let in_flight = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconciler.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        fetcher.delay(None);
        let tabs = reconciler.activate_tab("liste").await.unwrap();
        assert_eq!(badge(&tabs, "liste"), None);
        assert_eq!(reconciler.watermark(CollectionKind::Alerts), 2);

        in_flight.await.unwrap();

        assert_eq!(reconciler.unread(CollectionKind::Alerts), 0);
        assert_eq!(reconciler.watermark(CollectionKind::Alerts), 2);
        assert_eq!(badge(&reconciler.tabs(), "liste"), None);
        assert_eq!(store.get(CollectionKind::Alerts).await, 2);
    }

    #[tokio::test]
    async fn test_touch_resets_idle_time() {
        let (_dir, store) = temp_store().await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        let reconciler = mount_user(&fetcher, &store, SLOW).await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(reconciler.idle_for() >= Duration::from_millis(60));

        reconciler.touch();
        assert!(reconciler.idle_for() < Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_view_reports_state() {
        let (_dir, store) = temp_store().await;
        store.set(CollectionKind::Announcements, 1).await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.set(
            CollectionKind::Announcements,
            vec![announcement(1), announcement(2)],
        );

        let reconciler = Reconciler::mount(
            DashboardConfig::admin(),
            fetcher.clone(),
            store.clone(),
            SLOW,
        )
        .await;
        let view = reconciler.view();

        assert_eq!(view.variant, DashboardVariant::Admin);
        assert_eq!(view.active_tab, "carte");
        assert_eq!(view.tabs.len(), 5);
        assert_eq!(view.unread[&CollectionKind::Announcements], 1);
        assert_eq!(view.watermarks[&CollectionKind::Announcements], 1);
        assert_eq!(view.watermarks[&CollectionKind::Alerts], 0);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["activeTab"], "carte");
        assert_eq!(json["unread"]["announcements"], 1);
        assert_eq!(json["phases"]["alerts"], "computed");
    }
}

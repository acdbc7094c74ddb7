//! Mounted dashboards, keyed by id.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::Reconciler;
use crate::db::WatermarkStore;
use crate::errors::AppError;
use crate::fetcher::CollectionFetcher;
use crate::models::{DashboardConfig, DashboardVariant};

/// Owns one [`Reconciler`] per mounted dashboard. All of them share the fetcher and the
/// watermark store.
///
/// Clients that go away without unmounting are reclaimed by [`sweep_idle`]: a dashboard
/// not looked up for `idle_ttl` is unmounted.
///
/// [`sweep_idle`]: DashboardRegistry::sweep_idle
pub struct DashboardRegistry {
    fetcher: Arc<dyn CollectionFetcher>,
    store: WatermarkStore,
    poll_interval: Duration,
    idle_ttl: Duration,
    dashboards: RwLock<HashMap<Uuid, Arc<Reconciler>>>,
}

impl DashboardRegistry {
    pub fn new(
        fetcher: Arc<dyn CollectionFetcher>,
        store: WatermarkStore,
        poll_interval: Duration,
        idle_ttl: Duration,
    ) -> Self {
        Self {
            fetcher,
            store,
            poll_interval,
            idle_ttl,
            dashboards: RwLock::new(HashMap::new()),
        }
    }

    pub async fn mount(&self, variant: DashboardVariant) -> Arc<Reconciler> {
        let reconciler = Reconciler::mount(
            DashboardConfig::for_variant(variant),
            self.fetcher.clone(),
            self.store.clone(),
            self.poll_interval,
        )
        .await;

        self.dashboards
            .write()
            .insert(reconciler.id(), reconciler.clone());
        tracing::debug!(
            dashboard = %reconciler.id(),
            variant = ?reconciler.variant(),
            "Dashboard registered"
        );
        reconciler
    }

    /// Look up a dashboard. Counts as client activity.
    pub fn get(&self, id: Uuid) -> Result<Arc<Reconciler>, AppError> {
        let reconciler = self
            .dashboards
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Dashboard {} not found", id)))?;
        reconciler.touch();
        Ok(reconciler)
    }

    pub fn unmount(&self, id: Uuid) -> Result<(), AppError> {
        let reconciler = self
            .dashboards
            .write()
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("Dashboard {} not found", id)))?;
        reconciler.unmount();
        Ok(())
    }

    /// Unmount every dashboard idle for longer than the TTL. Returns the number evicted.
    pub fn sweep_idle(&self) -> usize {
        let expired: Vec<Arc<Reconciler>> = {
            let mut dashboards = self.dashboards.write();
            let ids: Vec<Uuid> = dashboards
                .iter()
                .filter(|(_, r)| r.idle_for() > self.idle_ttl)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| dashboards.remove(id)).collect()
        };

        for reconciler in &expired {
            tracing::info!(dashboard = %reconciler.id(), "Evicting idle dashboard");
            reconciler.unmount();
        }
        expired.len()
    }

    /// Run [`sweep_idle`](Self::sweep_idle) every `period` until the registry is dropped.
    pub fn spawn_sweeper(registry: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(run_sweeper(Arc::downgrade(registry), period))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.dashboards.read().len()
    }
}

async fn run_sweeper(registry: Weak<DashboardRegistry>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let Some(registry) = registry.upgrade() else {
            break;
        };
        let evicted = registry.sweep_idle();
        if evicted > 0 {
            tracing::debug!(
                evicted,
                remaining = registry.dashboards.read().len(),
                "Idle sweep done"
            );
        }
    }
}

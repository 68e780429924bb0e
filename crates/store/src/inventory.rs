use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use canvas_core::{Cluster, EntityKind, LabelPair, Workload};
use canvas_search::find_by_label;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Inventory snapshot as last delivered by the data loader. Read-only to the canvas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub epoch: u64,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
    #[serde(default)]
    pub workloads: Vec<Workload>,
}

impl Inventory {
    pub fn new(clusters: Vec<Cluster>, workloads: Vec<Workload>) -> Self { Self { epoch: 0, clusters, workloads } }

    /// Number of entities of `kind` carrying exactly `label`.
    pub fn match_count(&self, kind: EntityKind, label: &LabelPair) -> usize {
        match kind {
            EntityKind::Cluster => find_by_label(&self.clusters, label).len(),
            EntityKind::Workload => find_by_label(&self.workloads, label).len(),
        }
    }
}

/// Handle for readers to access the current inventory and subscribe to refreshes.
#[derive(Clone)]
pub struct InventoryHandle {
    snap: Arc<ArcSwap<Inventory>>,
    epoch_tx: Arc<watch::Sender<u64>>,
    epoch_rx: watch::Receiver<u64>,
    writer: Arc<Mutex<()>>,
}

impl Default for InventoryHandle {
    fn default() -> Self { Self::new(Inventory::default()) }
}

impl InventoryHandle {
    pub fn new(initial: Inventory) -> Self {
        let (epoch_tx, epoch_rx) = watch::channel(initial.epoch);
        Self {
            snap: Arc::new(ArcSwap::from_pointee(initial)),
            epoch_tx: Arc::new(epoch_tx),
            epoch_rx,
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn current(&self) -> Arc<Inventory> { self.snap.load_full() }

    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_rx.clone() }

    /// Swap in a refreshed inventory. Returns the new epoch.
    pub fn replace(&self, clusters: Vec<Cluster>, workloads: Vec<Workload>) -> u64 {
        let _w = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let epoch = self.snap.load().epoch.saturating_add(1);
        debug!(epoch, clusters = clusters.len(), workloads = workloads.len(), "inventory replaced");
        self.snap.store(Arc::new(Inventory { epoch, clusters, workloads }));
        let _ = self.epoch_tx.send(epoch);
        epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_core::labels;

    #[test]
    fn replace_bumps_epoch_and_keeps_old_snapshots() {
        let handle = InventoryHandle::default();
        let old = handle.current();
        let e = handle.replace(vec![Cluster::new("c1", labels([("region", "us")]))], Vec::new());
        assert_eq!(e, 1);
        assert!(old.clusters.is_empty());
        let cur = handle.current();
        assert_eq!(cur.match_count(EntityKind::Cluster, &LabelPair::new("region", "us")), 1);
        assert_eq!(cur.match_count(EntityKind::Workload, &LabelPair::new("region", "us")), 0);
        assert_eq!(*handle.subscribe_epoch().borrow(), 1);
    }
}

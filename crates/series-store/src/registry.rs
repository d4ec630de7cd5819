//! Series registry and per-tick ingestion
//!
//! Maps composite series ids to live series, resolves or creates series as
//! metrics are first observed, and serializes each poll tick so cross-series
//! correlation (average CPU, memory pairs) sees a consistent batch. Reads
//! take the lock briefly and copy out, so the renderer and input layer never
//! observe a half-ingested tick.

use crate::classify::{self, AVG_CPU_METRIC};
use crate::models::{MetricReading, ObjectHandle, ObjectKind, QueryWindow, Sample, SeriesId};
use crate::observability::StoreMetrics;
use crate::series::Series;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// The series touched in one poll tick, used for cross-series correlation.
///
/// A transient view over the registry's map; the series currently being
/// ingested is held outside the map, so sibling lookups never alias it.
pub struct TickBatch<'a> {
    series: &'a mut HashMap<String, Series>,
}

impl<'a> TickBatch<'a> {
    pub(crate) fn new(series: &'a mut HashMap<String, Series>) -> Self {
        Self { series }
    }

    /// Number of per-core CPU series of this owner that already contributed
    /// a sample at the given timestamp.
    pub(crate) fn per_core_contributions(&self, owner: &ObjectHandle, timestamp: i64) -> usize {
        self.series
            .values()
            .filter(|s| {
                s.owner.uuid == owner.uuid
                    && classify::is_per_core_cpu(&s.metric)
                    && s.front().is_some_and(|f| f.timestamp == timestamp)
            })
            .count()
    }

    /// The derived average-CPU series for an owner, created lazily.
    pub(crate) fn avg_cpu_mut(&mut self, owner: &Arc<ObjectHandle>) -> &mut Series {
        let id = SeriesId::new(owner.kind, owner.uuid.clone(), AVG_CPU_METRIC).to_string();
        self.series
            .entry(id)
            .or_insert_with(|| Series::new(owner.clone(), AVG_CPU_METRIC))
    }

    /// A sibling series of the same owner, if it exists.
    pub(crate) fn sibling_mut(&mut self, owner: &ObjectHandle, metric: &str) -> Option<&mut Series> {
        let id = SeriesId::new(owner.kind, owner.uuid.clone(), metric).to_string();
        self.series.get_mut(&id)
    }
}

/// Registry of all live series, keyed by composite id.
pub struct SeriesRegistry {
    /// Owner-object handles by uuid.
    objects: DashMap<String, Arc<ObjectHandle>>,
    series: RwLock<HashMap<String, Series>>,
    metrics: StoreMetrics,
}

impl SeriesRegistry {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            series: RwLock::new(HashMap::new()),
            metrics: StoreMetrics::new(),
        }
    }

    /// Register (or fetch) the handle for a monitored object.
    pub fn register_object(
        &self,
        kind: ObjectKind,
        uuid: &str,
        total_memory: u64,
    ) -> Arc<ObjectHandle> {
        self.objects
            .entry(uuid.to_string())
            .or_insert_with(|| Arc::new(ObjectHandle::new(kind, uuid, total_memory)))
            .clone()
    }

    pub fn object(&self, uuid: &str) -> Option<Arc<ObjectHandle>> {
        self.objects.get(uuid).map(|o| o.value().clone())
    }

    /// Stop monitoring an object: drop its handle and all of its series.
    pub fn remove_object(&self, uuid: &str) {
        self.objects.remove(uuid);
        let mut map = self.write_map();
        map.retain(|_, s| s.owner.uuid != uuid);
        self.metrics.set_series_count(map.len() as i64);
        debug!(uuid, "object removed from monitoring");
    }

    /// Ingest one poll tick for an owner object.
    ///
    /// The whole tick runs under a single write lock: ingestion into series
    /// participating in the same derived-metric correlation must not
    /// interleave, because memory-pair correlation rewrites a sibling's
    /// newest sample in place.
    pub fn ingest_tick(&self, owner: &Arc<ObjectHandle>, readings: &[MetricReading]) {
        let mut map = self.write_map();
        for r in readings {
            let id = SeriesId::new(owner.kind, owner.uuid.clone(), &r.metric).to_string();
            // Lift the series out of the map so the batch view holds only
            // its siblings.
            let mut series = map
                .remove(&id)
                .unwrap_or_else(|| Series::new(owner.clone(), &r.metric));
            {
                let mut batch = TickBatch::new(&mut map);
                series.add_point(&r.raw, r.timestamp, &mut batch);
            }
            map.insert(id, series);
        }
        self.metrics.set_series_count(map.len() as i64);
    }

    /// Reconcile an overlapping fetched batch into a series, creating the
    /// series first if its owner is known.
    pub fn merge_samples(&self, id: &SeriesId, incoming: &[Sample]) {
        let Some(owner) = self.object(&id.uuid) else {
            warn!(id = %id, "merge for unknown owner dropped");
            return;
        };
        let mut map = self.write_map();
        let series = map
            .entry(id.to_string())
            .or_insert_with(|| Series::new(owner, &id.metric));
        series.merge(incoming);
        self.metrics.set_series_count(map.len() as i64);
    }

    /// Windowed retrieval with downsampling; updates the series' displayed
    /// cache. Unknown series yield an empty result.
    pub fn retrieve(
        &self,
        id: &SeriesId,
        window: QueryWindow,
        interval_need: i64,
        interval_at: i64,
    ) -> Vec<Sample> {
        let mut map = self.write_map();
        match map.get_mut(&id.to_string()) {
            Some(s) => s.retrieve(window, interval_need, interval_at).to_vec(),
            None => Vec::new(),
        }
    }

    /// Pointer-hover hit-test against a series' displayed subset.
    pub fn closest_sample(&self, id: &SeriesId, timestamp: i64) -> Option<Sample> {
        self.read_map()
            .get(&id.to_string())
            .and_then(|s| s.closest_sample(timestamp))
    }

    /// Copy of a series' full sample buffer.
    pub fn samples(&self, id: &SeriesId) -> Vec<Sample> {
        self.read_map()
            .get(&id.to_string())
            .map(|s| s.samples().to_vec())
            .unwrap_or_default()
    }

    /// Ids of all visible series in display-stacking order: ascending by
    /// display-area score, then reversed.
    pub fn display_order(&self) -> Vec<SeriesId> {
        let map = self.read_map();
        let mut visible: Vec<&Series> = map.values().filter(|s| !s.hidden).collect();
        visible.sort_by(|a, b| a.cmp_display(b));
        visible.reverse();
        visible.iter().map(|s| s.id.clone()).collect()
    }

    /// Mark a series as user-selected, pinning it in display ordering.
    pub fn set_selected(&self, id: &SeriesId, selected: bool) {
        if let Some(s) = self.write_map().get_mut(&id.to_string()) {
            s.selected = selected;
        }
    }

    /// Retention pass: drop each series' oldest samples beyond `max_count`.
    /// Run between ticks, never concurrently with retrieval.
    pub fn trim_all(&self, max_count: usize) {
        let mut map = self.write_map();
        for s in map.values_mut() {
            s.trim_end(max_count);
        }
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_map().is_empty()
    }

    fn read_map(&self) -> RwLockReadGuard<'_, HashMap<String, Series>> {
        self.series.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, HashMap<String, Series>> {
        self.series.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SeriesRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SENTINEL;

    fn registry_with_host() -> (SeriesRegistry, Arc<ObjectHandle>) {
        let registry = SeriesRegistry::new();
        let owner = registry.register_object(ObjectKind::Host, "h1", 4 * 1024 * 1024 * 1024);
        (registry, owner)
    }

    fn reading(metric: &str, raw: &str, ts: i64) -> MetricReading {
        MetricReading::new(metric, raw, ts)
    }

    #[test]
    fn test_series_created_on_first_observation() {
        let (registry, owner) = registry_with_host();
        registry.ingest_tick(&owner, &[reading("vif_0_rx", "125.0", 10)]);
        let id = SeriesId::new(ObjectKind::Host, "h1", "vif_0_rx");
        assert_eq!(registry.samples(&id), vec![Sample::new(10, 125.0)]);
    }

    #[test]
    fn test_avg_cpu_derivation() {
        let (registry, owner) = registry_with_host();
        registry.ingest_tick(
            &owner,
            &[
                reading("cpu0", "0.2", 10),
                reading("cpu1", "0.4", 10),
                reading("cpu2", "0.6", 10),
            ],
        );
        let avg = SeriesId::new(ObjectKind::Host, "h1", AVG_CPU_METRIC);
        assert_eq!(registry.samples(&avg), vec![Sample::new(10, 40.0)]);
        // Per-core series store the percentage-scaled value.
        let cpu0 = SeriesId::new(ObjectKind::Host, "h1", "cpu0");
        assert_eq!(registry.samples(&cpu0), vec![Sample::new(10, 20.0)]);
    }

    #[test]
    fn test_avg_cpu_sentinel_poisons_average() {
        let (registry, owner) = registry_with_host();
        registry.ingest_tick(
            &owner,
            &[
                reading("cpu0", "0.2", 10),
                reading("cpu1", "bogus", 10),
                reading("cpu2", "0.6", 10),
            ],
        );
        let avg = SeriesId::new(ObjectKind::Host, "h1", AVG_CPU_METRIC);
        assert_eq!(registry.samples(&avg), vec![Sample::new(10, SENTINEL)]);
    }

    #[test]
    fn test_memory_pair_free_second() {
        let (registry, owner) = registry_with_host();
        registry.ingest_tick(
            &owner,
            &[
                reading("memory_total_kib", "1000", 10),
                reading("memory_free_kib", "300", 10),
            ],
        );
        let total = SeriesId::new(ObjectKind::Host, "h1", "memory_total_kib");
        let free = SeriesId::new(ObjectKind::Host, "h1", "memory_free_kib");
        // Total-side overwritten to used = (1000 - 300) KiB in bytes.
        assert_eq!(registry.samples(&total), vec![Sample::new(10, 700.0 * 1024.0)]);
        // Free-side stores its own scaled raw value.
        assert_eq!(registry.samples(&free), vec![Sample::new(10, 300.0 * 1024.0)]);
    }

    #[test]
    fn test_memory_pair_total_second() {
        let (registry, owner) = registry_with_host();
        registry.ingest_tick(
            &owner,
            &[
                reading("memory_free_kib", "300", 10),
                reading("memory_total_kib", "1000", 10),
            ],
        );
        let total = SeriesId::new(ObjectKind::Host, "h1", "memory_total_kib");
        let free = SeriesId::new(ObjectKind::Host, "h1", "memory_free_kib");
        // Same outcome regardless of arrival order.
        assert_eq!(registry.samples(&total), vec![Sample::new(10, 700.0 * 1024.0)]);
        assert_eq!(registry.samples(&free), vec![Sample::new(10, 300.0 * 1024.0)]);
    }

    #[test]
    fn test_memory_pair_out_of_lockstep_skips_correlation() {
        let (registry, owner) = registry_with_host();
        // Total gets an extra tick the free series never saw.
        registry.ingest_tick(&owner, &[reading("memory_total_kib", "1000", 10)]);
        registry.ingest_tick(
            &owner,
            &[
                reading("memory_total_kib", "1000", 20),
                reading("memory_free_kib", "300", 20),
            ],
        );
        let total = SeriesId::new(ObjectKind::Host, "h1", "memory_total_kib");
        // Counts mismatched: the second tick's value stays unmodified.
        let samples = registry.samples(&total);
        assert_eq!(samples[0], Sample::new(20, 1000.0 * 1024.0));
    }

    #[test]
    fn test_memory_pair_sentinel_propagates() {
        let (registry, owner) = registry_with_host();
        registry.ingest_tick(
            &owner,
            &[
                reading("memory_total_kib", "NaN", 10),
                reading("memory_free_kib", "300", 10),
            ],
        );
        let total = SeriesId::new(ObjectKind::Host, "h1", "memory_total_kib");
        assert_eq!(registry.samples(&total), vec![Sample::new(10, SENTINEL)]);
    }

    #[test]
    fn test_merge_samples_requires_known_owner() {
        let (registry, _owner) = registry_with_host();
        let unknown = SeriesId::new(ObjectKind::Vm, "nope", "cpu0");
        registry.merge_samples(&unknown, &[Sample::new(10, 1.0)]);
        assert!(registry.samples(&unknown).is_empty());

        let known = SeriesId::new(ObjectKind::Host, "h1", "vif_0_rx");
        registry.merge_samples(&known, &[Sample::new(10, 1.0)]);
        assert_eq!(registry.samples(&known).len(), 1);
    }

    #[test]
    fn test_remove_object_drops_series() {
        let (registry, owner) = registry_with_host();
        registry.ingest_tick(&owner, &[reading("cpu0", "0.5", 10)]);
        assert!(!registry.is_empty());
        registry.remove_object("h1");
        assert!(registry.is_empty());
        assert!(registry.object("h1").is_none());
    }

    #[test]
    fn test_display_order_hides_forced_hidden() {
        let (registry, owner) = registry_with_host();
        registry.ingest_tick(
            &owner,
            &[reading("xapi_open_fds", "5", 10), reading("vif_0_rx", "5", 10)],
        );
        let order = registry.display_order();
        assert_eq!(order.len(), 1);
        assert_eq!(order[0].metric, "vif_0_rx");
    }

    #[test]
    fn test_retrieve_unknown_series_is_empty() {
        let (registry, _owner) = registry_with_host();
        let id = SeriesId::new(ObjectKind::Host, "h1", "missing");
        assert!(registry.retrieve(&id, QueryWindow::new(10, 0), 1, 1).is_empty());
    }
}

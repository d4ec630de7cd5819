//! Per-(object, metric) sample buffer
//!
//! A `Series` owns the ordered sample sequence for one metric on one object,
//! its scale policy, and the cached subset produced by the last windowed
//! retrieval. Samples are kept in strictly descending timestamp order
//! (newest first); every mutation path preserves that invariant, and the
//! windowed binary chop is undefined without it.

use crate::classify::{self, PairRole};
use crate::models::{ObjectHandle, QueryWindow, Sample, SeriesId, SENTINEL};
use crate::observability::StoreMetrics;
use crate::registry::TickBatch;
use crate::scale::ScalePolicy;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Bounded time series for one (object, metric) pair.
#[derive(Debug, Clone)]
pub struct Series {
    pub id: SeriesId,
    pub owner: Arc<ObjectHandle>,
    pub metric: String,
    pub friendly_name: String,
    unit_multiplier: f64,
    pub scale: ScalePolicy,
    /// Strictly descending by timestamp; newest at index 0.
    samples: Vec<Sample>,
    /// Cache of the most recent retrieval, not a source of truth.
    displayed: Vec<Sample>,
    pub selected: bool,
    pub hidden: bool,
    metrics: StoreMetrics,
}

impl PartialEq for Series {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Series {}

impl Series {
    /// Create a series for a metric on an owner object.
    ///
    /// The unit multiplier and scale policy come from the classification
    /// table and are fixed for the series' lifetime; only the policy's own
    /// bounds change afterwards.
    pub fn new(owner: Arc<ObjectHandle>, metric: &str) -> Self {
        let c = classify::classify(metric);
        Self {
            id: SeriesId::new(owner.kind, owner.uuid.clone(), metric),
            friendly_name: classify::friendly_name(metric),
            metric: metric.to_string(),
            unit_multiplier: c.multiplier,
            scale: c.policy,
            hidden: c.hidden,
            selected: false,
            samples: Vec::new(),
            displayed: Vec::new(),
            metrics: StoreMetrics::new(),
            owner,
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Subset produced by the most recent `retrieve` call.
    pub fn displayed(&self) -> &[Sample] {
        &self.displayed
    }

    /// Newest sample.
    pub fn front(&self) -> Option<&Sample> {
        self.samples.first()
    }

    /// Ingest one raw value from the poller.
    ///
    /// Parse failures, NaN and infinities are recorded as the sentinel. The
    /// batch carries the other series touched in this poll tick for
    /// cross-series correlation: per-core CPU readings fold into the derived
    /// average-CPU sibling, and complementary memory pairs rewrite the
    /// capacity-side sibling's newest sample into "used = total - free".
    pub fn add_point(&mut self, raw: &str, timestamp: i64, batch: &mut TickBatch<'_>) {
        let raw_value = self.parse_raw(raw);
        let scaled = if raw_value < 0.0 {
            SENTINEL
        } else {
            raw_value * self.unit_multiplier
        };
        let mut final_value = scaled;

        if classify::is_per_core_cpu(&self.metric) {
            // Fold this core's reading into the derived average, weighted by
            // how many sibling cores already contributed at this timestamp.
            let contributed = batch.per_core_contributions(&self.owner, timestamp);
            let avg = batch.avg_cpu_mut(&self.owner);
            let pos = avg.ensure_sample_at(timestamp);
            let current = avg.samples[pos].value;
            let folded = if raw_value < 0.0 || current < 0.0 {
                SENTINEL
            } else {
                (current * contributed as f64 + raw_value * 100.0) / (contributed as f64 + 1.0)
            };
            avg.replace_sample_at(pos, folded);
        } else if let Some(pair) = classify::memory_pair(&self.metric) {
            if let Some(sibling) = batch.sibling_mut(&self.owner, pair.sibling) {
                // Correlate only when the pair is in lock-step for this tick:
                // the sibling holds exactly its sample for this timestamp on
                // top of a history the same length as ours.
                let lock_step = sibling.samples.len() == self.samples.len() + 1
                    && sibling.front().is_some_and(|s| s.timestamp == timestamp);
                if lock_step {
                    let sibling_value = sibling.samples[0].value;
                    match pair.role {
                        PairRole::Free => {
                            // Sibling is the capacity side and currently holds
                            // its raw total; rewrite it to the derived "used".
                            let used = if scaled < 0.0 || sibling_value < 0.0 {
                                SENTINEL
                            } else {
                                sibling_value - scaled
                            };
                            sibling.replace_sample_at(0, used);
                        }
                        PairRole::Total => {
                            // Sibling already stored raw free; this series
                            // stores the derived "used" directly.
                            final_value = if scaled < 0.0 || sibling_value < 0.0 {
                                SENTINEL
                            } else {
                                scaled - sibling_value
                            };
                        }
                    }
                }
            }
        }

        self.push_front(Sample::new(timestamp, final_value));
        self.scale.observe(final_value, &self.owner);
        self.metrics.record_sample_ingested();
    }

    /// Windowed retrieval with interval folding.
    ///
    /// Returns the contiguous subsequence inside the window, coarsened by
    /// grouping consecutive samples per `interval_need` bucket and averaging
    /// Y within each group. Requesting `interval_need == interval_at` (the
    /// data's native interval) returns the windowed subsequence unchanged.
    /// The result is cached as the displayed subset.
    pub fn retrieve(
        &mut self,
        window: QueryWindow,
        interval_need: i64,
        interval_at: i64,
    ) -> &[Sample] {
        let slice = window_slice(&self.samples, window);
        if interval_need == interval_at || interval_need <= 0 {
            self.displayed = slice.to_vec();
        } else {
            self.displayed = fold_intervals(slice, interval_need);
        }
        &self.displayed
    }

    /// Reconcile a newly fetched batch (descending order) that may overlap
    /// this buffer on either side, e.g. after a gap or resubscription.
    ///
    /// Older-than-buffer samples are appended at the tail (the boundary
    /// duplicate dropped); newer-than-buffer samples are inserted at the
    /// front in ascending order, skipping anything not strictly newer than
    /// the shifting front. Both directions may apply in one call.
    pub fn merge(&mut self, incoming: &[Sample]) {
        if incoming.is_empty() {
            return;
        }
        self.metrics.record_merge();
        if self.samples.is_empty() {
            self.samples = incoming.to_vec();
            return;
        }

        let oldest = self.samples[self.samples.len() - 1].timestamp;
        if incoming[incoming.len() - 1].timestamp < oldest {
            // Slice strictly older than our current oldest; the chop itself
            // drops a boundary-duplicate timestamp.
            let from = incoming.partition_point(|s| s.timestamp >= oldest);
            self.samples.extend_from_slice(&incoming[from..]);
        }

        let newest = self.samples[0].timestamp;
        if incoming[0].timestamp > newest {
            let to = incoming.partition_point(|s| s.timestamp > newest);
            for s in incoming[..to].iter().rev() {
                // Guards against duplicate boundary re-insertion as the
                // front shifts during insertion.
                if self.samples.first().map_or(true, |f| s.timestamp > f.timestamp) {
                    self.samples.insert(0, *s);
                }
            }
        }
    }

    /// Drop the oldest excess samples when the buffer exceeds `max_count`.
    pub fn trim_end(&mut self, max_count: usize) {
        if self.samples.len() > max_count {
            self.samples.truncate(max_count);
        }
    }

    /// Resolve a pointer-hover query: the displayed sample whose timestamp
    /// is closest to `t`, or `None` when `t` falls outside the displayed
    /// window's span.
    pub fn closest_sample(&self, t: i64) -> Option<Sample> {
        let first = self.displayed.first()?;
        let last = self.displayed[self.displayed.len() - 1];
        if t > first.timestamp || t < last.timestamp {
            return None;
        }
        let idx = self.displayed.partition_point(|s| s.timestamp > t);
        if idx == 0 {
            return Some(*first);
        }
        if idx == self.displayed.len() {
            return Some(last);
        }
        let newer = self.displayed[idx - 1];
        let older = self.displayed[idx];
        if newer.timestamp - t <= t - older.timestamp {
            Some(newer)
        } else {
            Some(older)
        }
    }

    /// "Display area" score: mean displayed Y normalized by the scale max.
    ///
    /// Zero when nothing is displayed or the series is user-selected, so
    /// selected series always rank first when the caller sorts ascending and
    /// reverses. The formula is a sort heuristic preserved for compatibility.
    pub fn display_priority(&self) -> f64 {
        if self.selected || self.displayed.is_empty() || self.scale.max <= 0.0 {
            return 0.0;
        }
        let sum: f64 = self.displayed.iter().map(|s| s.value).sum();
        sum / self.displayed.len() as f64 / self.scale.max
    }

    /// Order by display-area score, ties broken by natural ordering of
    /// friendly names.
    pub fn cmp_display(&self, other: &Series) -> Ordering {
        self.display_priority()
            .partial_cmp(&other.display_priority())
            .unwrap_or(Ordering::Equal)
            .then_with(|| natural_cmp(&self.friendly_name, &other.friendly_name))
    }

    fn parse_raw(&self, raw: &str) -> f64 {
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                self.metrics.record_parse_failure();
                debug!(series = %self.id, raw, "unparseable value recorded as sentinel");
                SENTINEL
            }
        }
    }

    /// Append a new terminal sample at the front of the descending buffer.
    fn push_front(&mut self, sample: Sample) {
        if self
            .samples
            .first()
            .is_some_and(|f| sample.timestamp <= f.timestamp)
        {
            debug!(series = %self.id, timestamp = sample.timestamp, "out-of-order sample dropped");
            return;
        }
        self.samples.insert(0, sample);
    }

    /// Locate the sample at an exact timestamp, creating it with value 0 if
    /// absent. Returns its index.
    pub(crate) fn ensure_sample_at(&mut self, timestamp: i64) -> usize {
        let idx = self.samples.partition_point(|s| s.timestamp > timestamp);
        if self
            .samples
            .get(idx)
            .is_some_and(|s| s.timestamp == timestamp)
        {
            return idx;
        }
        self.samples.insert(idx, Sample::new(timestamp, 0.0));
        idx
    }

    /// The single sanctioned in-place mutation: replace one sample's value
    /// during derived-value correlation.
    pub(crate) fn replace_sample_at(&mut self, idx: usize, value: f64) {
        self.samples[idx].value = value;
    }
}

/// Binary chop of a descending sample sequence against a query window.
///
/// Returns the half-open contiguous slice whose timestamps fall within the
/// window, boundary matches included. Rejects immediately on an invalid
/// window (non-negative delta), an empty sequence, or a sequence whose span
/// does not overlap the window; either bound clamps to the full range when
/// the window extends past it.
pub(crate) fn window_slice(samples: &[Sample], window: QueryWindow) -> &[Sample] {
    if !window.is_valid() {
        debug!(min = window.min, max = window.max, "invalid query window, returning empty");
        return &[];
    }
    if samples.is_empty() {
        return &[];
    }
    let newest = samples[0].timestamp;
    let oldest = samples[samples.len() - 1].timestamp;
    // Oldest sample still newer than the window's new edge, or newest sample
    // already older than the window's old edge: no overlap.
    if oldest > window.min || newest < window.max {
        return &[];
    }

    // First index at or below the newer edge.
    let start = samples.partition_point(|s| s.timestamp > window.min);
    // One past the last index at or above the older edge.
    let end = samples.partition_point(|s| s.timestamp >= window.max);

    debug_assert!(start <= end && end <= samples.len());
    &samples[start..end]
}

/// Group consecutive samples by `timestamp / interval` bucket and average Y
/// within each group. Each emitted sample carries the newest timestamp seen
/// in its group.
fn fold_intervals(samples: &[Sample], interval: i64) -> Vec<Sample> {
    let mut out = Vec::new();
    let mut current_bucket: Option<i64> = None;
    let mut group_timestamp = 0i64;
    let mut sum = 0.0;
    let mut count = 0usize;

    for s in samples {
        let bucket = s.timestamp.div_euclid(interval);
        if current_bucket != Some(bucket) {
            if count > 0 {
                out.push(Sample::new(group_timestamp, sum / count as f64));
            }
            current_bucket = Some(bucket);
            group_timestamp = s.timestamp;
            sum = 0.0;
            count = 0;
        }
        sum += s.value;
        count += 1;
    }
    if count > 0 {
        out.push(Sample::new(group_timestamp, sum / count as f64));
    }
    out
}

/// Digit-aware, case-insensitive ordering for friendly names, so "CPU 2"
/// sorts before "CPU 10".
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let (mut i, mut j) = (0usize, 0usize);
    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let si = i;
            while i < a.len() && a[i].is_ascii_digit() {
                i += 1;
            }
            let sj = j;
            while j < b.len() && b[j].is_ascii_digit() {
                j += 1;
            }
            let na: u128 = a[si..i].iter().collect::<String>().parse().unwrap_or(u128::MAX);
            let nb: u128 = b[sj..j].iter().collect::<String>().parse().unwrap_or(u128::MAX);
            match na.cmp(&nb) {
                Ordering::Equal => {}
                ord => return ord,
            }
        } else {
            match a[i].cmp(&b[j]) {
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
                ord => return ord,
            }
        }
    }
    (a.len() - i).cmp(&(b.len() - j))
}

//! Y-axis scale policy
//!
//! Each series owns a `ScalePolicy` describing the bounds and resolution the
//! renderer should use for its Y axis, with three update modes:
//! - `Auto`: the max grows (never shrinks) with the observed data
//! - `Fixed`: bounds never change (e.g. percentages)
//! - `Delegate`: bounds recomputed from live owner-object metadata on every
//!   ingested sample (e.g. memory capacity)

use crate::models::ObjectHandle;
use serde::{Deserialize, Serialize};

/// Unit tag attached to a scale, consumed by the renderer for axis labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleUnit {
    Percent,
    Bytes,
    BytesPerSecond,
    Milliseconds,
    Megahertz,
    CountPerSecond,
    Count,
    None,
}

/// How the scale reacts to new data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleMode {
    Auto,
    Fixed,
    Delegate,
}

/// Y-axis bounds and resolution for one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalePolicy {
    pub max: f64,
    pub min: f64,
    pub resolution: f64,
    pub unit: ScaleUnit,
    pub mode: ScaleMode,
}

impl ScalePolicy {
    /// Auto-growing scale starting at a unit range.
    pub fn auto(unit: ScaleUnit) -> Self {
        Self {
            max: 1.0,
            min: 0.0,
            resolution: 1.0,
            unit,
            mode: ScaleMode::Auto,
        }
    }

    /// Fixed scale that never changes (e.g. 0-100%).
    pub fn fixed(min: f64, max: f64, resolution: f64, unit: ScaleUnit) -> Self {
        Self {
            max,
            min,
            resolution,
            unit,
            mode: ScaleMode::Fixed,
        }
    }

    /// Scale recomputed from owner-object metadata on every sample.
    pub fn delegate(unit: ScaleUnit) -> Self {
        Self {
            max: 1.0,
            min: 0.0,
            resolution: 1.0,
            unit,
            mode: ScaleMode::Delegate,
        }
    }

    pub fn delta(&self) -> f64 {
        self.max - self.min
    }

    /// Fold one ingested value into the scale.
    ///
    /// Under `Auto` the max only grows; sentinel values are negative and
    /// therefore never move it. Under `Delegate` the bounds track the owner's
    /// live memory capacity regardless of the value.
    pub fn observe(&mut self, value: f64, owner: &ObjectHandle) {
        match self.mode {
            ScaleMode::Fixed => {}
            ScaleMode::Auto => {
                if value > self.max {
                    self.max = value * 1.05;
                    self.resolution = (self.delta() / 10.0).max(1.0);
                }
            }
            ScaleMode::Delegate => {
                self.max = (owner.total_memory() as f64).max(1.0);
                self.resolution = (self.delta() / 10.0).max(1.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObjectKind;

    fn owner() -> ObjectHandle {
        ObjectHandle::new(ObjectKind::Host, "h1", 4096)
    }

    #[test]
    fn test_auto_grows_with_headroom() {
        let mut scale = ScalePolicy::auto(ScaleUnit::BytesPerSecond);
        scale.observe(200.0, &owner());
        assert!((scale.max - 210.0).abs() < 1e-9);
        assert!((scale.resolution - 21.0).abs() < 1e-9);
    }

    #[test]
    fn test_auto_never_shrinks() {
        let mut scale = ScalePolicy::auto(ScaleUnit::BytesPerSecond);
        scale.observe(200.0, &owner());
        let max = scale.max;
        scale.observe(50.0, &owner());
        assert_eq!(scale.max, max);
    }

    #[test]
    fn test_auto_ignores_sentinel() {
        let mut scale = ScalePolicy::auto(ScaleUnit::Count);
        scale.observe(crate::models::SENTINEL, &owner());
        assert_eq!(scale.max, 1.0);
    }

    #[test]
    fn test_fixed_is_static() {
        let mut scale = ScalePolicy::fixed(0.0, 100.0, 10.0, ScaleUnit::Percent);
        scale.observe(5000.0, &owner());
        assert_eq!(scale.max, 100.0);
        assert_eq!(scale.resolution, 10.0);
    }

    #[test]
    fn test_delegate_tracks_capacity() {
        let obj = owner();
        let mut scale = ScalePolicy::delegate(ScaleUnit::Bytes);
        scale.observe(10.0, &obj);
        assert_eq!(scale.max, 4096.0);
        obj.set_total_memory(8192);
        scale.observe(10.0, &obj);
        assert_eq!(scale.max, 8192.0);
    }

    #[test]
    fn test_resolution_floor() {
        let mut scale = ScalePolicy::auto(ScaleUnit::Count);
        scale.observe(2.0, &owner());
        // delta/10 would be 0.21, floored to 1
        assert_eq!(scale.resolution, 1.0);
    }
}

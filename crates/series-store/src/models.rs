//! Core data models for the series store

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Reserved marker for an unknown or invalid measurement.
///
/// Distinct from any legitimate non-negative reading; derived-value
/// computations propagate it explicitly (sentinel in, sentinel out).
pub const SENTINEL: f64 = -1.0;

/// One (timestamp, value) observation.
///
/// The value is only ever rewritten through the owning buffer's
/// replace-front path during derived-value correlation, never by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Timestamp in integer ticks.
    pub timestamp: i64,
    /// Measured value after unit conversion.
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Whether this sample carries the unknown-value sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.value < 0.0
    }
}

/// Requested timestamp range for windowed retrieval.
///
/// The window is expressed in reverse-chronological terms matching the
/// descending sample order: `min` names the newer edge and `max` the older
/// edge, so a valid window has `delta() < 0`. A non-negative delta marks an
/// invalid/empty window and every operation on it degrades to an empty
/// result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWindow {
    /// Newer edge of the window (larger timestamp).
    pub min: i64,
    /// Older edge of the window (smaller timestamp).
    pub max: i64,
}

impl QueryWindow {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// Signed width; negative for valid windows.
    pub fn delta(&self) -> i64 {
        self.max - self.min
    }

    pub fn is_valid(&self) -> bool {
        self.delta() < 0
    }

    /// Whether a timestamp falls within the window, boundaries inclusive.
    pub fn contains(&self, timestamp: i64) -> bool {
        self.max <= timestamp && timestamp <= self.min
    }
}

/// Kind of infrastructure object a series belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Host,
    Vm,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Vm => "vm",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "host" => Some(Self::Host),
            "vm" => Some(Self::Vm),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner-object metadata consumed from the object-model layer.
///
/// `total_memory` is the live memory capacity in bytes; Delegate-mode scale
/// policies re-read it on every ingested sample, so the connection layer may
/// update it at any time.
#[derive(Debug)]
pub struct ObjectHandle {
    pub kind: ObjectKind,
    pub uuid: String,
    total_memory: AtomicU64,
}

impl ObjectHandle {
    pub fn new(kind: ObjectKind, uuid: impl Into<String>, total_memory: u64) -> Self {
        Self {
            kind,
            uuid: uuid.into(),
            total_memory: AtomicU64::new(total_memory),
        }
    }

    /// Current memory capacity in bytes.
    pub fn total_memory(&self) -> u64 {
        self.total_memory.load(Ordering::Relaxed)
    }

    /// Update the live memory capacity (e.g. after ballooning).
    pub fn set_total_memory(&self, bytes: u64) {
        self.total_memory.store(bytes, Ordering::Relaxed);
    }
}

/// One raw observation from the poller, before parsing or unit conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricReading {
    /// Metric name, the classification key.
    pub metric: String,
    /// Raw value as text; unparseable values become the sentinel.
    pub raw: String,
    /// Sample timestamp in ticks.
    pub timestamp: i64,
}

impl MetricReading {
    pub fn new(metric: impl Into<String>, raw: impl Into<String>, timestamp: i64) -> Self {
        Self {
            metric: metric.into(),
            raw: raw.into(),
            timestamp,
        }
    }

    /// Reading stamped with the current wall-clock time.
    pub fn now(metric: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::new(metric, raw, chrono::Utc::now().timestamp())
    }
}

/// Error parsing a composite series id.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdParseError {
    #[error("series id has {0} segments, expected 3")]
    SegmentCount(usize),
    #[error("unknown object kind '{0}'")]
    UnknownKind(String),
}

/// Composite series identifier: `"<objectType>:<objectUuid>:<metricName>"`.
///
/// Two series are equal iff their ids are equal, regardless of other state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesId {
    pub kind: ObjectKind,
    pub uuid: String,
    pub metric: String,
}

impl SeriesId {
    pub fn new(kind: ObjectKind, uuid: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            kind,
            uuid: uuid.into(),
            metric: metric.into(),
        }
    }

    /// Parse a composite id, tolerating one extraneous leading segment
    /// produced by legacy ids.
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        let parts: Vec<&str> = s.split(':').collect();
        let parts: &[&str] = match parts.len() {
            3 => &parts,
            4 => &parts[1..],
            n => return Err(IdParseError::SegmentCount(n)),
        };
        let kind = ObjectKind::parse(parts[0])
            .ok_or_else(|| IdParseError::UnknownKind(parts[0].to_string()))?;
        Ok(Self::new(kind, parts[1], parts[2]))
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.uuid, self.metric)
    }
}

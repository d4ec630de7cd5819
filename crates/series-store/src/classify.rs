//! Metric classification and unit normalization
//!
//! Maps a metric name to its unit, raw-value multiplier, scale policy, and
//! display defaults. The mapping is an explicit ordered rule list (data, not
//! cascading conditionals) matched in fixed precedence order, first match
//! wins. The table is compatibility-sensitive: existing deployments' metric
//! catalogs depend on it, so rules must not be reordered casually.

use crate::scale::{ScalePolicy, ScaleUnit};

/// Metrics forced hidden from the default display regardless of caller
/// intent. Checked before the general rules.
const HIDDEN_METRICS: &[&str] = &[
    "xapi_open_fds",
    "pool_task_count",
    "pool_session_count",
    "memory_reclaimed",
    "memory_reclaimed_max",
];

/// Name pattern for one classification rule.
#[derive(Debug, Clone, Copy)]
enum Pattern {
    Exact(&'static str),
    Prefix(&'static str),
    Suffix(&'static str),
    Contains(&'static str),
    /// Prefix and suffix must both match.
    PrefixSuffix(&'static str, &'static str),
    /// Prefix and substring must both match.
    PrefixContains(&'static str, &'static str),
}

impl Pattern {
    fn matches(&self, name: &str) -> bool {
        match *self {
            Pattern::Exact(p) => name == p,
            Pattern::Prefix(p) => name.starts_with(p),
            Pattern::Suffix(p) => name.ends_with(p),
            Pattern::Contains(p) => name.contains(p),
            Pattern::PrefixSuffix(p, s) => name.starts_with(p) && name.ends_with(s),
            Pattern::PrefixContains(p, c) => name.starts_with(p) && name.contains(c),
        }
    }
}

/// Scale policy selected by a rule.
#[derive(Debug, Clone, Copy)]
enum ScaleKind {
    Auto,
    /// Fixed 0-100 percentage axis.
    Percent,
    /// Recomputed from owner memory capacity on every sample.
    MemoryDelegate,
}

struct Rule {
    pattern: Pattern,
    unit: ScaleUnit,
    multiplier: f64,
    scale: ScaleKind,
}

const fn rule(pattern: Pattern, unit: ScaleUnit, multiplier: f64, scale: ScaleKind) -> Rule {
    Rule {
        pattern,
        unit,
        multiplier,
        scale,
    }
}

/// The classification table. Order is precedence.
const RULES: &[Rule] = &[
    // Latency family: raw microseconds, shown in milliseconds.
    rule(
        Pattern::Contains("latency"),
        ScaleUnit::Milliseconds,
        1e-3,
        ScaleKind::Auto,
    ),
    // Network-interface counters (physical and virtual).
    rule(
        Pattern::Prefix("pif_"),
        ScaleUnit::BytesPerSecond,
        1.0,
        ScaleKind::Auto,
    ),
    rule(
        Pattern::Prefix("vif_"),
        ScaleUnit::BytesPerSecond,
        1.0,
        ScaleKind::Auto,
    ),
    // Virtual-disk throughput.
    rule(
        Pattern::Prefix("vbd_"),
        ScaleUnit::BytesPerSecond,
        1.0,
        ScaleKind::Auto,
    ),
    // Memory family: kibibyte counters scaled to bytes, axis delegated to
    // the owner's live capacity.
    rule(
        Pattern::PrefixSuffix("memory", "_kib"),
        ScaleUnit::Bytes,
        1024.0,
        ScaleKind::MemoryDelegate,
    ),
    rule(
        Pattern::Prefix("memory"),
        ScaleUnit::Bytes,
        1.0,
        ScaleKind::MemoryDelegate,
    ),
    // Load average.
    rule(
        Pattern::Exact("loadavg"),
        ScaleUnit::Count,
        1.0,
        ScaleKind::Auto,
    ),
    // CPU frequency; must precede the general CPU rule so "cpu0-avg-freq"
    // does not classify as a utilization metric.
    rule(
        Pattern::Suffix("-avg-freq"),
        ScaleUnit::Megahertz,
        1.0,
        ScaleKind::Auto,
    ),
    // CPU family: raw fractions 0..1 shown as percentages.
    rule(
        Pattern::Prefix("cpu"),
        ScaleUnit::Percent,
        100.0,
        ScaleKind::Percent,
    ),
    rule(
        Pattern::Exact("avg_cpu"),
        ScaleUnit::Percent,
        100.0,
        ScaleKind::Percent,
    ),
    // Storage-repository cache counters.
    rule(
        Pattern::PrefixContains("sr_", "cache"),
        ScaleUnit::CountPerSecond,
        1.0,
        ScaleKind::Auto,
    ),
    // IOPS.
    rule(
        Pattern::Contains("iops"),
        ScaleUnit::CountPerSecond,
        1.0,
        ScaleKind::Auto,
    ),
    // In-flight requests and queue depth.
    rule(
        Pattern::Contains("inflight"),
        ScaleUnit::Count,
        1.0,
        ScaleKind::Auto,
    ),
    rule(
        Pattern::Contains("queue"),
        ScaleUnit::Count,
        1.0,
        ScaleKind::Auto,
    ),
    // GPU family: memory counters in KiB, utilization in percent.
    rule(
        Pattern::Prefix("gpu_memory"),
        ScaleUnit::Bytes,
        1024.0,
        ScaleKind::Auto,
    ),
    rule(
        Pattern::Prefix("gpu"),
        ScaleUnit::Percent,
        1.0,
        ScaleKind::Percent,
    ),
    // Storage accelerator counters.
    rule(
        Pattern::Prefix("pvsaccelerator"),
        ScaleUnit::CountPerSecond,
        1.0,
        ScaleKind::Auto,
    ),
    // Generic read/write throughput (e.g. whole-SR counters).
    rule(
        Pattern::Suffix("read"),
        ScaleUnit::BytesPerSecond,
        1.0,
        ScaleKind::Auto,
    ),
    rule(
        Pattern::Suffix("write"),
        ScaleUnit::BytesPerSecond,
        1.0,
        ScaleKind::Auto,
    ),
];

/// Result of classifying a metric name.
#[derive(Debug, Clone)]
pub struct Classification {
    pub unit: ScaleUnit,
    pub multiplier: f64,
    pub policy: ScalePolicy,
    pub hidden: bool,
}

/// Classify a metric name against the rule table.
pub fn classify(metric: &str) -> Classification {
    let hidden = HIDDEN_METRICS.contains(&metric);
    for r in RULES {
        if r.pattern.matches(metric) {
            let policy = match r.scale {
                ScaleKind::Auto => ScalePolicy::auto(r.unit),
                ScaleKind::Percent => ScalePolicy::fixed(0.0, 100.0, 10.0, ScaleUnit::Percent),
                ScaleKind::MemoryDelegate => ScalePolicy::delegate(r.unit),
            };
            return Classification {
                unit: r.unit,
                multiplier: r.multiplier,
                policy,
                hidden,
            };
        }
    }
    Classification {
        unit: ScaleUnit::None,
        multiplier: 1.0,
        policy: ScalePolicy::auto(ScaleUnit::None),
        hidden,
    }
}

/// Whether a metric is a per-core CPU utilization metric (`cpu<N>`),
/// excluding the aggregate average and C/P-state variants.
pub fn is_per_core_cpu(metric: &str) -> bool {
    match metric.strip_prefix("cpu") {
        Some(rest) => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Metric name of the derived average-CPU series.
pub const AVG_CPU_METRIC: &str = "avg_cpu";

/// Role of a metric within a complementary memory pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairRole {
    /// The capacity-side member; ends up storing the derived "used" series.
    Total,
    /// The free-side member; always stores its raw scaled value.
    Free,
}

/// Pairing for the memory "used = total - free" derivation.
#[derive(Debug, Clone, Copy)]
pub struct MemoryPair {
    pub role: PairRole,
    pub sibling: &'static str,
}

/// Look up the complementary memory pairing for a metric, if any.
pub fn memory_pair(metric: &str) -> Option<MemoryPair> {
    match metric {
        "memory_total_kib" => Some(MemoryPair {
            role: PairRole::Total,
            sibling: "memory_free_kib",
        }),
        "memory_free_kib" => Some(MemoryPair {
            role: PairRole::Free,
            sibling: "memory_total_kib",
        }),
        "memory" => Some(MemoryPair {
            role: PairRole::Total,
            sibling: "memory_internal_free",
        }),
        "memory_internal_free" => Some(MemoryPair {
            role: PairRole::Free,
            sibling: "memory",
        }),
        _ => None,
    }
}

/// Human-readable name for a metric, used for display ordering ties.
pub fn friendly_name(metric: &str) -> String {
    if metric == AVG_CPU_METRIC {
        return "Average CPU".to_string();
    }
    if let Some(rest) = metric.strip_prefix("cpu") {
        if is_per_core_cpu(metric) {
            return format!("CPU {rest}");
        }
    }
    match metric {
        "memory_total_kib" | "memory" => "Memory Used".to_string(),
        "memory_free_kib" | "memory_internal_free" => "Memory Free".to_string(),
        "loadavg" => "Load Average".to_string(),
        _ => {
            let mut out = String::with_capacity(metric.len());
            let mut capitalize = true;
            for c in metric.chars() {
                if c == '_' || c == '-' {
                    out.push(' ');
                    capitalize = true;
                } else if capitalize {
                    out.extend(c.to_uppercase());
                    capitalize = false;
                } else {
                    out.push(c);
                }
            }
            out
        }
    }
}

use crate::utils::misc::{get_unix_secs_now, Typename};
use scc::ebr::Guard;
use scc::HashIndex;
use serde_json::Value;
use std::collections::HashMap as StdHashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Per-member counters. One instance lives in the runtime context so
/// members running in the same process (tests) do not share state.
#[derive(Debug)]
pub struct Metrics {
    incoming_bytes: AtomicU64, // total bytes read off client/peer connections
    incoming_lines: AtomicU64, // total protocol lines read

    // handled command counters by name (dynamic)
    handled_cmds: HashIndex<String, Arc<AtomicU64>>,

    // error counters by type name (dynamic)
    errors: HashIndex<String, Arc<AtomicU64>>,

    // flood fan-out accounting
    flood_enqueued: AtomicU64,
    flood_dropped: HashIndex<String, Arc<AtomicU64>>,

    start_time: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            incoming_bytes: AtomicU64::new(0),
            incoming_lines: AtomicU64::new(0),
            handled_cmds: HashIndex::new(),
            errors: HashIndex::new(),
            flood_enqueued: AtomicU64::new(0),
            flood_dropped: HashIndex::new(),
            start_time: get_unix_secs_now(),
        }
    }

    /// Count one protocol line with its size.
    pub fn add_line(&self, len: usize) {
        self.incoming_bytes.fetch_add(len as u64, Ordering::Relaxed);
        self.incoming_lines.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_handled_cmd(&self, name: &str) {
        Self::bump(&self.handled_cmds, name);
    }

    pub fn add_error<E: Debug + Typename>(&self, error: &E) {
        warn!(target = "metrics", "protocol error: {error:?}");
        Self::bump(&self.errors, error.typename());
    }

    /// Count an AT line handed to a neighbor queue.
    pub fn add_flood_enqueued(&self) {
        self.flood_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an eviction from a full neighbor queue.
    pub fn add_flood_dropped(&self, peer: &str) {
        Self::bump(&self.flood_dropped, peer);
    }

    pub fn flood_enqueued_total(&self) -> u64 {
        self.flood_enqueued.load(Ordering::Relaxed)
    }

    pub fn flood_dropped_total(&self) -> u64 {
        let guard = Guard::new();
        self.flood_dropped.iter(&guard).map(|(_, c)| c.load(Ordering::Relaxed)).sum()
    }

    fn bump(index: &HashIndex<String, Arc<AtomicU64>>, key: &str) {
        // owned key per scc HashIndex ownership rules
        let owned = key.to_string();
        if let Some(counter) = index.get(&owned) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            let _ = index.insert(owned, Arc::new(AtomicU64::new(1)));
        }
    }

    fn collect(index: &HashIndex<String, Arc<AtomicU64>>) -> StdHashMap<String, u64> {
        let guard = Guard::new();
        let mut out = StdHashMap::new();
        for (name, counter) in index.iter(&guard) {
            out.insert(name.clone(), counter.load(Ordering::Relaxed));
        }
        out
    }

    /// JSON-formatted metrics
    pub fn get_json(&self) -> Value {
        serde_json::json!({
            "handled_cmds": Self::collect(&self.handled_cmds),
            "errors": Self::collect(&self.errors),
            "lines": {
                "total_incoming_lines": self.incoming_lines.load(Ordering::Relaxed),
                "total_incoming_bytes": self.incoming_bytes.load(Ordering::Relaxed),
            },
            "flood": {
                "enqueued": self.flood_enqueued_total(),
                "dropped": Self::collect(&self.flood_dropped),
            },
            "uptime": get_unix_secs_now() - self.start_time,
        })
    }

    /// Prometheus-formatted metrics string
    pub fn get_prometheus(&self) -> String {
        let mut out = format!(
            r#"# HELP locus_lines_total Total number of protocol lines received
# TYPE locus_lines_total counter
locus_lines_total {}
locus_bytes_total {}

# HELP locus_flood_enqueued_total AT lines handed to neighbor queues
# TYPE locus_flood_enqueued_total counter
locus_flood_enqueued_total {}

# HELP locus_uptime_seconds Process uptime in seconds
# TYPE locus_uptime_seconds gauge
locus_uptime_seconds {}"#,
            self.incoming_lines.load(Ordering::Relaxed),
            self.incoming_bytes.load(Ordering::Relaxed),
            self.flood_enqueued_total(),
            get_unix_secs_now() - self.start_time
        );

        out.push_str("\n\n# HELP locus_commands_total Total number of commands handled by type");
        out.push_str("\n# TYPE locus_commands_total counter");
        for (name, count) in Self::collect(&self.handled_cmds) {
            out.push_str(&format!("\nlocus_commands_total{{type=\"{}\"}} {}", name, count));
        }

        out.push_str("\n\n# HELP locus_errors_total Total number of protocol errors by type");
        out.push_str("\n# TYPE locus_errors_total counter");
        for (name, count) in Self::collect(&self.errors) {
            out.push_str(&format!("\nlocus_errors_total{{type=\"{}\"}} {}", name, count));
        }

        out.push_str("\n\n# HELP locus_flood_dropped_total AT lines evicted from full neighbor queues");
        out.push_str("\n# TYPE locus_flood_dropped_total counter");
        for (peer, count) in Self::collect(&self.flood_dropped) {
            out.push_str(&format!("\nlocus_flood_dropped_total{{peer=\"{}\"}} {}", peer, count));
        }

        out
    }
}

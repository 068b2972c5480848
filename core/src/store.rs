use crate::proto::AtRecord;
use scc::hash_map::Entry;
use scc::HashMap;

/// Outcome of offering a record to the store; callers gate flood
/// propagation on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Apply {
    Applied,
    Ignored,
}

/// Last-writer-wins store of the freshest accepted record per client.
///
/// A record replaces the stored one only when its client timestamp is
/// strictly greater; equal timestamps keep the first arrival. That
/// monotone rule is also what terminates floods on cyclic neighbor
/// graphs, so there is no separate seen-set.
#[derive(Debug, Default)]
pub struct LocationStore {
    records: HashMap<String, AtRecord>,
}

impl LocationStore {
    pub fn new() -> Self {
        Self { records: HashMap::new() }
    }

    /// Offer a record; when it wins, `on_applied` runs against the
    /// stored copy while the per-client entry is still held, so the
    /// decision and its fan-out cannot interleave with a concurrent
    /// apply for the same client.
    pub fn apply_with<F: FnOnce(&AtRecord)>(&self, record: AtRecord, on_applied: F) -> Apply {
        match self.records.entry(record.client_id.clone()) {
            Entry::Occupied(mut occupied) => {
                if record.stamp.secs > occupied.get().stamp.secs {
                    *occupied.get_mut() = record;
                    on_applied(occupied.get());
                    Apply::Applied
                } else {
                    Apply::Ignored
                }
            }
            Entry::Vacant(vacant) => {
                let occupied = vacant.insert_entry(record);
                on_applied(occupied.get());
                Apply::Applied
            }
        }
    }

    pub fn apply(&self, record: AtRecord) -> Apply {
        self.apply_with(record, |_| {})
    }

    /// Read-only snapshot of the freshest record for a client.
    pub fn get(&self, client_id: &str) -> Option<AtRecord> {
        self.records.read(client_id, |_, v| v.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

//! Eventually-consistent table of the latest snapshot heard from each peer.

use std::collections::BTreeMap;

use tracing::debug;

use crate::net::snapshot::{NodeId, Snapshot};

/// Last known state of one peer. Replaced wholesale on every update.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerEntry {
    pub forecast_kwh: f32,
    pub last_interval_kwh: f32,
    pub priority: i32,
    pub can_shed: bool,
    /// Cycle index in which the entry was last refreshed.
    pub seen_cycle: u64,
}

/// Outcome of offering a snapshot to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
    /// Sentinel or loopback snapshot; the table is unchanged.
    Ignored,
}

/// Peer identity to last-known state, excluding the local outlet.
#[derive(Debug, Clone)]
pub struct PeerTable {
    local: NodeId,
    entries: BTreeMap<NodeId, PeerEntry>,
}

impl PeerTable {
    pub fn new(local: NodeId) -> Self {
        Self {
            local,
            entries: BTreeMap::new(),
        }
    }

    /// Applies a received snapshot, last writer wins.
    pub fn upsert(&mut self, snapshot: &Snapshot, cycle: u64) -> Upsert {
        if snapshot.is_sentinel() || snapshot.sender == self.local {
            return Upsert::Ignored;
        }
        let entry = PeerEntry {
            forecast_kwh: snapshot.forecast_kwh.max(0.0),
            last_interval_kwh: snapshot.last_interval_kwh.max(0.0),
            priority: snapshot.priority,
            can_shed: snapshot.can_shed,
            seen_cycle: cycle,
        };
        match self.entries.insert(snapshot.sender, entry) {
            Some(_) => Upsert::Replaced,
            None => Upsert::Inserted,
        }
    }

    /// Drops peers that have not been heard from for `max_age` cycles.
    ///
    /// A `max_age` of zero disables eviction. Returns the number of evicted peers.
    pub fn evict_stale(&mut self, current_cycle: u64, max_age: u64) -> usize {
        if max_age == 0 {
            return 0;
        }
        let before = self.entries.len();
        self.entries.retain(|id, entry| {
            let keep = current_cycle.saturating_sub(entry.seen_cycle) < max_age;
            if !keep {
                debug!(peer = %id, last_seen = entry.seen_cycle, "evicting silent peer");
            }
            keep
        });
        before - self.entries.len()
    }

    /// Worst-case fleet projection: own forecast plus every stored peer forecast,
    /// whether or not that peer is currently on or sheddable.
    pub fn aggregate_forecast(&self, self_forecast_kwh: f32) -> f32 {
        self_forecast_kwh + self.entries.values().map(|e| e.forecast_kwh).sum::<f32>()
    }

    /// Sum of the last-interval consumption of peers refreshed in `cycle`.
    ///
    /// Peers missed this cycle are left out so a retained entry never charges
    /// the same interval to the budget twice.
    pub fn last_interval_total(&self, cycle: u64) -> f32 {
        self.entries
            .values()
            .filter(|e| e.seen_cycle == cycle)
            .map(|e| e.last_interval_kwh)
            .sum()
    }

    /// Visits peers whose priority is strictly below `priority`.
    pub fn for_each_below_priority(&self, priority: i32, mut f: impl FnMut(NodeId, &PeerEntry)) {
        for (id, entry) in &self.entries {
            if entry.priority < priority {
                f(*id, entry);
            }
        }
    }

    /// Visits peers whose priority equals `priority`.
    pub fn for_each_at_priority(&self, priority: i32, mut f: impl FnMut(NodeId, &PeerEntry)) {
        for (id, entry) in &self.entries {
            if entry.priority == priority {
                f(*id, entry);
            }
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&PeerEntry> {
        self.entries.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &PeerEntry)> {
        self.entries.iter().map(|(id, e)| (*id, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn local(&self) -> NodeId {
        self.local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(id: u16, forecast: f32, priority: i32) -> Snapshot {
        Snapshot {
            sender: NodeId(id),
            forecast_kwh: forecast,
            last_interval_kwh: forecast / 10.0,
            priority,
            can_shed: true,
            command: None,
        }
    }

    #[test]
    fn sentinel_is_never_stored() {
        let mut table = PeerTable::new(NodeId(1));
        assert_eq!(table.upsert(&Snapshot::sentinel(), 0), Upsert::Ignored);
        let mut disguised = snap(2, 10.0, 3);
        disguised.priority = -1;
        assert_eq!(table.upsert(&disguised, 0), Upsert::Ignored);
        assert!(table.is_empty());
    }

    #[test]
    fn own_identity_is_never_stored() {
        let mut table = PeerTable::new(NodeId(1));
        assert_eq!(table.upsert(&snap(1, 10.0, 3), 0), Upsert::Ignored);
        assert!(table.get(NodeId(1)).is_none());
    }

    #[test]
    fn newer_snapshot_replaces_whole_entry() {
        let mut table = PeerTable::new(NodeId(1));
        assert_eq!(table.upsert(&snap(2, 10.0, 3), 0), Upsert::Inserted);
        let mut update = snap(2, 40.0, 5);
        update.can_shed = false;
        assert_eq!(table.upsert(&update, 1), Upsert::Replaced);

        let entry = table.get(NodeId(2)).expect("entry present");
        assert_eq!(entry.forecast_kwh, 40.0);
        assert_eq!(entry.priority, 5);
        assert!(!entry.can_shed);
        assert_eq!(entry.seen_cycle, 1);
    }

    #[test]
    fn reapplying_a_snapshot_is_idempotent() {
        let mut once = PeerTable::new(NodeId(1));
        once.upsert(&snap(2, 10.0, 3), 4);

        let mut twice = PeerTable::new(NodeId(1));
        twice.upsert(&snap(2, 10.0, 3), 4);
        twice.upsert(&snap(2, 10.0, 3), 4);

        assert_eq!(once.len(), twice.len());
        assert_eq!(once.get(NodeId(2)), twice.get(NodeId(2)));
    }

    #[test]
    fn aggregate_never_below_self_forecast() {
        let mut table = PeerTable::new(NodeId(1));
        assert_eq!(table.aggregate_forecast(25.0), 25.0);
        table.upsert(&snap(2, 10.0, 3), 0);
        table.upsert(&snap(3, 5.0, 1), 0);
        assert_eq!(table.aggregate_forecast(25.0), 40.0);
    }

    #[test]
    fn priority_classification() {
        let mut table = PeerTable::new(NodeId(1));
        table.upsert(&snap(2, 10.0, 1), 0);
        table.upsert(&snap(3, 20.0, 2), 0);
        table.upsert(&snap(4, 30.0, 2), 0);
        table.upsert(&snap(5, 40.0, 3), 0);

        let mut below = Vec::new();
        table.for_each_below_priority(2, |id, _| below.push(id));
        assert_eq!(below, vec![NodeId(2)]);

        let mut same = 0.0;
        table.for_each_at_priority(2, |_, e| same += e.forecast_kwh);
        assert_eq!(same, 50.0);
    }

    #[test]
    fn consumption_counts_only_peers_heard_this_cycle() {
        let mut table = PeerTable::new(NodeId(1));
        table.upsert(&snap(2, 20.0, 1), 5);
        table.upsert(&snap(3, 40.0, 1), 4);

        // Outlet 3 was missed in cycle 5; its cycle-4 interval is already accounted.
        assert_eq!(table.last_interval_total(5), 2.0);
        assert_eq!(table.last_interval_total(4), 4.0);
        assert_eq!(table.last_interval_total(6), 0.0);
        assert_eq!(table.aggregate_forecast(0.0), 60.0);
    }

    #[test]
    fn silent_peers_are_evicted() {
        let mut table = PeerTable::new(NodeId(1));
        table.upsert(&snap(2, 10.0, 1), 0);
        table.upsert(&snap(3, 10.0, 1), 3);

        assert_eq!(table.evict_stale(3, 0), 0);
        assert_eq!(table.evict_stale(3, 4), 0);
        assert_eq!(table.evict_stale(4, 4), 1);
        assert!(table.get(NodeId(2)).is_none());
        assert!(table.get(NodeId(3)).is_some());
    }
}

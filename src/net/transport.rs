use super::snapshot::{NodeId, Snapshot};

/// Best-effort datagram transport shared by all outlets.
///
/// Delivery is lossy and unordered. Sends never fail from the caller's point
/// of view: implementations log and drop what they cannot deliver.
pub trait Transport {
    /// Identity of the local outlet on this medium.
    fn local_id(&self) -> NodeId;

    /// Sends `snapshot` to every reachable outlet.
    fn broadcast(&mut self, snapshot: &Snapshot);

    /// Sends `snapshot` to a single outlet.
    fn send(&mut self, to: NodeId, snapshot: &Snapshot);

    /// Non-blocking receive. `None` when nothing is waiting.
    fn try_receive(&mut self) -> Option<Snapshot>;

    /// Receive that folds "nothing waiting" into the sentinel snapshot.
    fn poll(&mut self) -> Snapshot {
        self.try_receive().unwrap_or_else(Snapshot::sentinel)
    }
}

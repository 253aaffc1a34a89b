//! In-memory lossy broadcast medium for simulating a fleet in one process.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::warn;

use super::snapshot::{NodeId, Snapshot, WIRE_LEN};
use super::transport::Transport;

#[derive(Debug)]
struct MediumState {
    inboxes: BTreeMap<NodeId, VecDeque<[u8; WIRE_LEN]>>,
    loss_probability: f64,
    rng: StdRng,
    delivered: u64,
    dropped: u64,
}

/// A shared radio channel. Every payload goes through the wire codec and each
/// delivery to each receiver is independently dropped with `loss_probability`.
///
/// # Examples
///
/// ```
/// use outlet_shed::net::medium::SharedMedium;
/// use outlet_shed::net::snapshot::{NodeId, Snapshot};
/// use outlet_shed::net::transport::Transport;
///
/// let medium = SharedMedium::new(0.0, 7);
/// let mut a = medium.attach(NodeId(1));
/// let mut b = medium.attach(NodeId(2));
///
/// let mut hello = Snapshot::sentinel();
/// hello.sender = NodeId(1);
/// hello.priority = 2;
/// a.broadcast(&hello);
/// assert_eq!(b.try_receive().map(|s| s.sender), Some(NodeId(1)));
/// assert!(a.try_receive().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct SharedMedium {
    state: Rc<RefCell<MediumState>>,
}

impl SharedMedium {
    /// Creates a medium that drops each delivery with `loss_probability`.
    ///
    /// # Panics
    ///
    /// Panics if `loss_probability` is outside `[0, 1)`.
    pub fn new(loss_probability: f64, seed: u64) -> Self {
        assert!((0.0..1.0).contains(&loss_probability));
        Self {
            state: Rc::new(RefCell::new(MediumState {
                inboxes: BTreeMap::new(),
                loss_probability,
                rng: StdRng::seed_from_u64(seed),
                delivered: 0,
                dropped: 0,
            })),
        }
    }

    /// Connects an outlet and returns its port.
    pub fn attach(&self, id: NodeId) -> MediumPort {
        self.state.borrow_mut().inboxes.entry(id).or_default();
        MediumPort {
            id,
            medium: self.clone(),
        }
    }

    /// Deliveries that reached an inbox so far.
    pub fn delivered(&self) -> u64 {
        self.state.borrow().delivered
    }

    /// Deliveries lost to the simulated channel so far.
    pub fn dropped(&self) -> u64 {
        self.state.borrow().dropped
    }

    fn deliver(&self, from: NodeId, to: Option<NodeId>, snapshot: &Snapshot) {
        let payload = match snapshot.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(sender = %from, error = %e, "snapshot not sent");
                return;
            }
        };

        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        for (id, inbox) in state.inboxes.iter_mut() {
            if *id == from || to.is_some_and(|t| t != *id) {
                continue;
            }
            if state.loss_probability > 0.0 && state.rng.random_bool(state.loss_probability) {
                state.dropped += 1;
                continue;
            }
            inbox.push_back(payload);
            state.delivered += 1;
        }
    }

    fn take(&self, id: NodeId) -> Option<[u8; WIRE_LEN]> {
        self.state
            .borrow_mut()
            .inboxes
            .get_mut(&id)
            .and_then(VecDeque::pop_front)
    }
}

/// One outlet's endpoint on a [`SharedMedium`].
#[derive(Debug, Clone)]
pub struct MediumPort {
    id: NodeId,
    medium: SharedMedium,
}

impl Transport for MediumPort {
    fn local_id(&self) -> NodeId {
        self.id
    }

    fn broadcast(&mut self, snapshot: &Snapshot) {
        self.medium.deliver(self.id, None, snapshot);
    }

    fn send(&mut self, to: NodeId, snapshot: &Snapshot) {
        self.medium.deliver(self.id, Some(to), snapshot);
    }

    fn try_receive(&mut self) -> Option<Snapshot> {
        // Undecodable payloads count as nothing received.
        while let Some(payload) = self.medium.take(self.id) {
            match Snapshot::decode(&payload) {
                Ok(snapshot) => return Some(snapshot),
                Err(e) => warn!(receiver = %self.id, error = %e, "dropping malformed payload"),
            }
        }
        None
    }
}

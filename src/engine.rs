//! A minimal sketch of how a registry of [`Peer`]s and the unchoke round in
//! [`crate::choke`] are driven from a `tokio` task.
//!
//! spec.md explicitly keeps the wire codec, tracker client, and transports
//! external to the peer session core (see spec.md §1); this module is not a
//! working network stack, only the thin shell that shows where those
//! collaborators would attach to the core this crate specifies in full.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use rand::Rng;
use tokio::time;

use crate::choke;
use crate::clock::{Clock, MonotonicClock};
use crate::peer::Peer;

/// How often the engine runs an unchoke round over its peers.
pub const UNCHOKE_INTERVAL: Duration = Duration::from_secs(10);

/// Owns every [`Peer`] known to one torrent and periodically runs the
/// choking algorithm over them. A production engine would additionally own
/// the tracker client, the `MessageDispatcher`, and one socket task per
/// peer; none of that is in scope here (see spec.md §1's external
/// collaborators).
pub struct Engine {
    peers: Vec<Peer>,
    index_by_id: HashMap<String, usize>,
    clock: Rc<dyn Clock>,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            peers: Vec::new(),
            index_by_id: HashMap::new(),
            clock: Rc::new(MonotonicClock::new()),
        }
    }

    /// The clock every `Peer` created for this engine should share, so bad-
    /// condition cooldowns and speed windows agree across the registry.
    pub fn clock(&self) -> Rc<dyn Clock> {
        self.clock.clone()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn add_peer(&mut self, peer: Peer) {
        self.index_by_id
            .insert(peer.id().to_owned(), self.peers.len());
        self.peers.push(peer);
    }

    pub fn peer(&self, id: &str) -> Option<&Peer> {
        self.index_by_id.get(id).map(|&index| &self.peers[index])
    }

    pub fn peer_mut(&mut self, id: &str) -> Option<&mut Peer> {
        self.index_by_id
            .get(id)
            .copied()
            .map(move |index| &mut self.peers[index])
    }

    /// Drops the peer, if known. The registry is compacted with a swap,
    /// so indices are not stable across calls to `remove_peer`.
    pub fn remove_peer(&mut self, id: &str) -> Option<Peer> {
        let index = self.index_by_id.remove(id)?;
        let removed = self.peers.swap_remove(index);
        if let Some(moved) = self.peers.get(index) {
            self.index_by_id.insert(moved.id().to_owned(), index);
        }
        Some(removed)
    }

    /// Runs one unchoke round immediately, over whatever peers are
    /// currently registered. The optimistic-unchoke candidate is picked
    /// freshly at random each round, per the classic BitTorrent unchoke
    /// algorithm.
    pub fn unchoke_once(&mut self) {
        log::debug!("running unchoke round over {} peers", self.peers.len());
        let optimistic_index = rand::thread_rng().gen::<usize>();
        choke::run_unchoke_round(&mut self.peers, optimistic_index);
    }

    /// Runs the `tokio` task that periodically unchokes peers. Never
    /// returns; intended to be spawned once per torrent alongside the real
    /// tracker and per-peer socket tasks.
    pub async fn run(&mut self) {
        let mut ticker = time::interval(UNCHOKE_INTERVAL);
        loop {
            ticker.tick().await;
            self.unchoke_once();
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(engine: &Engine, ipaddr: &str, port: u16) -> Peer {
        Peer::new(ipaddr, port, false, engine.clock())
    }

    #[test]
    fn add_and_look_up_peer_by_id() {
        let mut engine = Engine::new();
        let p = peer(&engine, "10.0.0.1", 6881);
        engine.add_peer(p);
        assert_eq!(engine.len(), 1);
        assert!(engine.peer("10.0.0.1:6881").is_some());
        assert!(engine.peer("10.0.0.2:6881").is_none());
    }

    #[test]
    fn remove_peer_compacts_registry_and_keeps_remaining_lookups_valid() {
        let mut engine = Engine::new();
        engine.add_peer(peer(&engine, "10.0.0.1", 6881));
        engine.add_peer(peer(&engine, "10.0.0.2", 6881));
        engine.add_peer(peer(&engine, "10.0.0.3", 6881));

        let removed = engine.remove_peer("10.0.0.1:6881");
        assert!(removed.is_some());
        assert_eq!(engine.len(), 2);
        assert!(engine.peer("10.0.0.2:6881").is_some());
        assert!(engine.peer("10.0.0.3:6881").is_some());
    }

    #[test]
    fn unchoke_once_only_considers_interested_peers() {
        let mut engine = Engine::new();
        let mut p = peer(&engine, "10.0.0.1", 6881);
        p.allocate_session_resource(16384, 1 << 20);
        p.set_peer_interested(true);
        engine.add_peer(p);

        engine.unchoke_once();
        assert!(!engine.peer("10.0.0.1:6881").unwrap().am_choking());
    }
}

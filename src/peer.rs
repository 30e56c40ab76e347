//! `Peer` — the identity and lifecycle envelope around an optional
//! [`PeerSessionResource`]. A `Peer` exists for as long as a remote address
//! is known to the engine (from tracker response, incoming accept, or DHT);
//! its session exists only between a completed protocol handshake and
//! disconnect.

use std::net::IpAddr;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::clock::{Clock, Timestamp};
use crate::dispatcher::MessageDispatcher;
use crate::error::Result;
use crate::session::{BitOp, PeerSessionResource};
use crate::PieceIndex;

/// The 20-byte opaque peer identity exchanged during the handshake.
pub const PEER_ID_LENGTH: usize = 20;

/// How long a peer must go without a fresh [`Peer::start_bad_condition`]
/// call before [`Peer::is_good`] considers it recovered.
pub const BAD_CONDITION_INTERVAL: Duration = Duration::from_secs(10);

/// A remote participant in the swarm.
///
/// Cheap identity fields (`ipaddr`, `port`, `id`) are set once at
/// construction and never change; `session` is the only field whose
/// presence varies over the `Peer`'s lifetime, and every accessor that
/// depends on it panics if called before a session has been allocated —
/// per spec.md, this is a programmer error, not a recoverable one.
pub struct Peer {
    ipaddr: String,
    port: u16,
    id: String,
    peer_id: [u8; PEER_ID_LENGTH],
    cuid: u64,
    first_contact_time: Timestamp,
    bad_condition_start_time: Option<Timestamp>,
    incoming: bool,
    local_peer: bool,
    seeder: bool,
    session: Option<PeerSessionResource>,
    clock: Rc<dyn Clock>,
}

impl Peer {
    /// Creates a new peer envelope with no active session. `ipaddr` may be
    /// an IPv4 or IPv6 textual address.
    pub fn new(
        ipaddr: impl Into<String>,
        port: u16,
        incoming: bool,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let ipaddr = ipaddr.into();
        let id = format!("{}:{}", ipaddr, port);
        let first_contact_time = clock.now();
        Self {
            ipaddr,
            port,
            id,
            peer_id: [0; PEER_ID_LENGTH],
            cuid: 0,
            first_contact_time,
            bad_condition_start_time: None,
            incoming,
            local_peer: false,
            seeder: false,
            session: None,
            clock,
        }
    }

    /// Parses `ipaddr` into a typed address, for collaborators that need
    /// more than the textual form `id`/logging already use.
    pub fn parsed_ip(&self) -> std::result::Result<IpAddr, std::net::AddrParseError> {
        self.ipaddr.parse()
    }

    pub fn ipaddr(&self) -> &str {
        &self.ipaddr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `"<ip>:<port>"`, stable for the lifetime of the peer; used for
    /// logging and as a map key by the peer registry.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn peer_id(&self) -> &[u8; PEER_ID_LENGTH] {
        &self.peer_id
    }

    /// Copies the handshake's 20-byte peer id. The type itself guarantees
    /// the length; there is no length to validate at this boundary (see
    /// spec.md's design notes on avoiding pointer/length pairs here).
    ///
    /// `peerId` is set exactly once per spec.md §3; a second call (a second
    /// handshake on the same connection) is a protocol error, not silently
    /// accepted.
    pub fn set_peer_id(&mut self, peer_id: [u8; PEER_ID_LENGTH]) -> Result<()> {
        if self.peer_id != [0; PEER_ID_LENGTH] {
            return Err(crate::error::Error::DuplicateHandshake);
        }
        self.peer_id = peer_id;
        Ok(())
    }

    pub fn is_incoming(&self) -> bool {
        self.incoming
    }

    pub fn set_incoming(&mut self, incoming: bool) {
        self.incoming = incoming;
    }

    pub fn is_local_peer(&self) -> bool {
        self.local_peer
    }

    pub fn set_local_peer(&mut self, local_peer: bool) {
        self.local_peer = local_peer;
    }

    pub fn is_seeder(&self) -> bool {
        self.seeder
    }

    pub fn first_contact_time(&self) -> Timestamp {
        self.first_contact_time
    }

    pub fn set_first_contact_time(&mut self, time: Timestamp) {
        self.first_contact_time = time;
    }

    // --- cuid: the local task currently driving this peer ------------

    pub fn used_by(&mut self, cuid: u64) {
        self.cuid = cuid;
    }

    pub fn cuid(&self) -> u64 {
        self.cuid
    }

    /// Clears the driver task id, e.g. when the task that was using this
    /// peer gives it back to the registry.
    pub fn reset_status(&mut self) {
        self.cuid = 0;
    }

    // --- session lifecycle ----------------------------------------------

    /// Allocates a fresh session for this peer, sized for `piece_length`/
    /// `total_length`. If a session already exists it is released first
    /// (this is always safe: see [`Peer::release_session_resource`]). This
    /// is also the one sanctioned way to clear a latched `seeder`: the
    /// cached flag is reset here, not just at construction.
    ///
    /// # Panics
    ///
    /// Panics if `piece_length` or `total_length` is zero.
    pub fn allocate_session_resource(&mut self, piece_length: u32, total_length: u64) {
        self.release_session_resource();
        self.seeder = false;
        log::info!(
            "Peer {} allocating session (piece_length={}, total_length={})",
            self.id,
            piece_length,
            total_length
        );
        self.session = Some(PeerSessionResource::new(
            piece_length,
            total_length,
            self.clock.clone(),
        ));
    }

    /// Destroys the current session, if any. Safe to call repeatedly or
    /// when no session exists.
    pub fn release_session_resource(&mut self) {
        if self.session.take().is_some() {
            log::info!("Peer {} session released", self.id);
        }
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    fn session(&self) -> &PeerSessionResource {
        self.session
            .as_ref()
            .expect("peer accessor called with no session allocated")
    }

    fn session_mut(&mut self) -> &mut PeerSessionResource {
        self.session
            .as_mut()
            .expect("peer mutator called with no session allocated")
    }

    // --- choke/interest flags (all require an allocated session) --------

    pub fn am_choking(&self) -> bool {
        self.session().am_choking()
    }

    pub fn set_am_choking(&mut self, choking: bool) {
        if choking != self.am_choking() {
            log::debug!(
                "Peer {} {}",
                self.id,
                if choking { "now choked" } else { "now unchoked" }
            );
        }
        self.session_mut().set_am_choking(choking);
    }

    pub fn am_interested(&self) -> bool {
        self.session().am_interested()
    }

    pub fn set_am_interested(&mut self, interested: bool) {
        self.session_mut().set_am_interested(interested);
    }

    pub fn peer_choking(&self) -> bool {
        self.session().peer_choking()
    }

    pub fn set_peer_choking(&mut self, choking: bool) {
        self.session_mut().set_peer_choking(choking);
    }

    pub fn peer_interested(&self) -> bool {
        self.session().peer_interested()
    }

    pub fn set_peer_interested(&mut self, interested: bool) {
        self.session_mut().set_peer_interested(interested);
    }

    pub fn choking_required(&self) -> bool {
        self.session().choking_required()
    }

    pub fn set_choking_required(&mut self, required: bool) {
        self.session_mut().set_choking_required(required);
    }

    pub fn opt_unchoking(&self) -> bool {
        self.session().opt_unchoking()
    }

    pub fn set_opt_unchoking(&mut self, opt_unchoking: bool) {
        self.session_mut().set_opt_unchoking(opt_unchoking);
    }

    pub fn snubbing(&self) -> bool {
        self.session().snubbing()
    }

    pub fn set_snubbing(&mut self, snubbing: bool) {
        if snubbing && !self.snubbing() {
            log::debug!("Peer {} is snubbing us", self.id);
        }
        self.session_mut().set_snubbing(snubbing);
    }

    /// The upper-layer choking algorithm's single query point.
    pub fn should_be_choking(&self) -> bool {
        self.session().should_be_choking()
    }

    pub fn last_am_unchoking(&self) -> Option<Timestamp> {
        self.session().last_am_unchoking()
    }

    pub fn last_download_update(&self) -> Option<Timestamp> {
        self.session().last_download_update()
    }

    // --- stats --------------------------------------------------------

    pub fn update_upload_length(&mut self, bytes: u64) {
        self.session_mut().update_upload_length(bytes);
    }

    pub fn update_download_length(&mut self, bytes: u64) {
        self.session_mut().update_download_length(bytes);
    }

    pub fn calculate_upload_speed(&mut self) -> u64 {
        self.session_mut().peer_stat_mut().calculate_upload_speed()
    }

    pub fn calculate_download_speed(&mut self) -> u64 {
        self.session_mut()
            .peer_stat_mut()
            .calculate_download_speed()
    }

    pub fn session_upload_len(&self) -> u64 {
        self.session().upload_len()
    }

    pub fn session_download_len(&self) -> u64 {
        self.session().download_len()
    }

    // --- bitfield -------------------------------------------------------

    /// Applies a single-bit `HAVE`-style update and refreshes the cached
    /// seeder latch.
    pub fn update_bitfield(&mut self, index: PieceIndex, op: BitOp) -> Result<()> {
        self.session_mut().update_bitfield(index, op)?;
        self.update_seeder();
        Ok(())
    }

    /// Replaces the entire bitmap from a `BITFIELD` message's payload and
    /// refreshes the cached seeder latch.
    pub fn set_bitfield(&mut self, bytes: &[u8]) -> Result<()> {
        log::debug!("Peer {} replacing bitfield ({} bytes)", self.id, bytes.len());
        self.session_mut().set_bitfield(bytes)?;
        self.update_seeder();
        Ok(())
    }

    /// `HAVE_ALL` (Fast Extension).
    pub fn mark_have_all(&mut self) {
        log::debug!("Peer {} sent HAVE_ALL", self.id);
        self.session_mut().mark_have_all();
        self.update_seeder();
    }

    /// `HAVE_NONE` (Fast Extension). Note this only resets the session's
    /// bitfield — the cached `seeder` latch on `Peer` is monotonic and is
    /// never cleared within a session's lifetime once set (spec.md §8's
    /// testable properties).
    pub fn mark_have_none(&mut self) {
        log::debug!("Peer {} sent HAVE_NONE", self.id);
        self.session_mut().mark_have_none();
    }

    /// If the bitfield now shows every piece, latches `seeder = true`.
    /// Never clears it; see [`Peer::mark_have_none`].
    pub fn update_seeder(&mut self) {
        if !self.seeder && self.session().has_all_pieces() {
            log::info!("Peer {} is now a seeder", self.id);
            self.seeder = true;
        }
    }

    pub fn has_piece(&self, index: PieceIndex) -> bool {
        self.session().has_piece(index)
    }

    pub fn bitfield_bytes(&self) -> Vec<u8> {
        self.session().bitfield_bytes()
    }

    pub fn bitfield_bit_len(&self) -> usize {
        self.session().bitfield_bit_len()
    }

    pub fn completed_length(&self) -> u64 {
        self.session().completed_length()
    }

    // --- bad-condition cooldown -----------------------------------------

    /// Stamps the start of a bad-condition cooldown, e.g. after the upper
    /// layer decides this peer misbehaved.
    pub fn start_bad_condition(&mut self) {
        log::warn!("Peer {} entering bad-condition cooldown", self.id);
        self.bad_condition_start_time = Some(self.clock.now());
    }

    /// True from birth (no bad condition ever recorded), false for
    /// [`BAD_CONDITION_INTERVAL`] after the most recent
    /// [`Peer::start_bad_condition`] call, true again afterwards.
    pub fn is_good(&self) -> bool {
        match self.bad_condition_start_time {
            None => true,
            Some(start) => {
                self.clock.now().elapsed_since(start) >= BAD_CONDITION_INTERVAL
            }
        }
    }

    // --- fast extension -------------------------------------------------

    pub fn is_fast_extension_enabled(&self) -> bool {
        self.session().fast_extension_enabled()
    }

    pub fn set_fast_extension_enabled(&mut self, enabled: bool) {
        self.session_mut().set_fast_extension_enabled(enabled);
    }

    pub fn add_peer_allowed_index(&mut self, index: PieceIndex) {
        self.session_mut().add_peer_allowed_index(index);
    }

    pub fn is_in_peer_allowed_index_set(&self, index: PieceIndex) -> bool {
        self.session().is_in_peer_allowed_index_set(index)
    }

    pub fn count_peer_allowed_index_set(&self) -> usize {
        self.session().count_peer_allowed_index_set()
    }

    pub fn peer_allowed_index_set(&self) -> &[PieceIndex] {
        self.session().peer_allowed_index_set()
    }

    pub fn add_am_allowed_index(&mut self, index: PieceIndex) {
        self.session_mut().add_am_allowed_index(index);
    }

    pub fn is_in_am_allowed_index_set(&self, index: PieceIndex) -> bool {
        self.session().is_in_am_allowed_index_set(index)
    }

    // --- extension protocol ----------------------------------------------

    pub fn set_extension(&mut self, name: &str, id: u8) {
        self.session_mut().add_extension(name, id);
    }

    pub fn extension_message_id(&self, name: &str) -> u8 {
        self.session().extension_message_id(name)
    }

    pub fn extension_name(&self, id: u8) -> &str {
        self.session().extension_name(id)
    }

    pub fn is_extended_messaging_enabled(&self) -> bool {
        self.session().extended_messaging_enabled()
    }

    pub fn set_extended_messaging_enabled(&mut self, enabled: bool) {
        self.session_mut().set_extended_messaging_enabled(enabled);
    }

    pub fn is_dht_enabled(&self) -> bool {
        self.session().dht_enabled()
    }

    pub fn set_dht_enabled(&mut self, enabled: bool) {
        self.session_mut().set_dht_enabled(enabled);
    }

    // --- dispatcher backlink ----------------------------------------------

    pub fn set_bt_message_dispatcher(&mut self, dispatcher: Weak<dyn MessageDispatcher>) {
        self.session_mut().set_dispatcher(dispatcher);
    }

    pub fn count_outstanding_upload(&self) -> usize {
        self.session().count_outstanding_upload()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use std::time::Duration;

    fn peer(ipaddr: &str, port: u16, incoming: bool) -> (Rc<VirtualClock>, Peer) {
        let clock = Rc::new(VirtualClock::new());
        let peer = Peer::new(ipaddr, port, incoming, clock.clone());
        (clock, peer)
    }

    #[test]
    fn id_is_ip_colon_port() {
        let (_clock, peer) = peer("10.0.0.1", 6881, false);
        assert_eq!(peer.id(), "10.0.0.1:6881");
        // sentinel "never" bad condition means good from birth
        assert!(peer.is_good());
    }

    #[test]
    fn allocate_session_resource_applies_defaults() {
        let (_clock, mut peer) = peer("10.0.0.1", 6881, false);
        peer.allocate_session_resource(16384, 32768);
        assert!(!peer.has_piece(0));
        assert!(!peer.has_piece(1));
        assert!(peer.am_choking());
    }

    #[test]
    #[should_panic(expected = "no session allocated")]
    fn accessor_without_session_panics() {
        let (_clock, peer) = peer("10.0.0.1", 6881, false);
        let _ = peer.am_choking();
    }

    #[test]
    fn release_session_resource_is_idempotent() {
        let (_clock, mut peer) = peer("10.0.0.1", 6881, false);
        peer.allocate_session_resource(16384, 32768);
        peer.release_session_resource();
        peer.release_session_resource();
        assert!(!peer.has_session());
    }

    #[test]
    fn bitfield_update_latches_seeder_and_reports_completed_length() {
        let (_clock, mut peer) = peer("10.0.0.1", 6881, false);
        peer.allocate_session_resource(16384, 32768);
        peer.update_bitfield(0, BitOp::Set).unwrap();
        assert!(!peer.is_seeder());
        peer.update_bitfield(1, BitOp::Set).unwrap();
        assert!(peer.is_seeder());
        assert_eq!(peer.completed_length(), 32768);
    }

    #[test]
    fn seeder_never_transitions_back_to_false() {
        let (_clock, mut peer) = peer("10.0.0.1", 6881, false);
        peer.allocate_session_resource(16384, 32768);
        peer.mark_have_all();
        assert!(peer.is_seeder());
        peer.mark_have_none();
        // the session's bitfield is cleared, but the cached latch on Peer
        // stays monotonic
        assert!(peer.is_seeder());
    }

    #[test]
    fn reallocating_the_session_clears_the_seeder_latch() {
        let (_clock, mut peer) = peer("10.0.0.1", 6881, false);
        peer.allocate_session_resource(16384, 32768);
        peer.mark_have_all();
        assert!(peer.is_seeder());
        // releasing and reallocating is the one sanctioned way to clear it
        peer.allocate_session_resource(16384, 32768);
        assert!(!peer.is_seeder());
    }

    #[test]
    fn set_peer_id_rejects_a_second_handshake() {
        let (_clock, mut peer) = peer("10.0.0.1", 6881, false);
        peer.set_peer_id([1; PEER_ID_LENGTH]).unwrap();
        assert_eq!(peer.peer_id(), &[1; PEER_ID_LENGTH]);
        let err = peer.set_peer_id([2; PEER_ID_LENGTH]).unwrap_err();
        assert_eq!(err, crate::error::Error::DuplicateHandshake);
        // the first id is unchanged
        assert_eq!(peer.peer_id(), &[1; PEER_ID_LENGTH]);
    }

    #[test]
    fn extension_round_trip() {
        let (_clock, mut peer) = peer("10.0.0.1", 6881, false);
        peer.allocate_session_resource(16384, 32768);
        peer.set_extension("ut_metadata", 2);
        assert_eq!(peer.extension_message_id("ut_metadata"), 2);
        assert_eq!(peer.extension_message_id("unknown"), 0);
    }

    #[test]
    fn bad_condition_cooldown() {
        let (clock, mut peer) = peer("10.0.0.1", 6881, false);
        peer.start_bad_condition();
        assert!(!peer.is_good());
        clock.advance(Duration::from_secs(1));
        assert!(!peer.is_good());
        clock.advance(Duration::from_secs(10));
        assert!(peer.is_good());
    }

    #[test]
    fn download_speed_updates_and_totals_are_monotonic() {
        let (clock, mut peer) = peer("10.0.0.1", 6881, false);
        peer.allocate_session_resource(16384, 32768);
        peer.update_download_length(1024);
        clock.advance(Duration::from_millis(100));
        peer.update_download_length(1024);
        clock.advance(Duration::from_millis(100));
        peer.update_download_length(1024);
        assert!(peer.calculate_download_speed() > 0);
        assert_eq!(peer.session_download_len(), 3072);
    }
}

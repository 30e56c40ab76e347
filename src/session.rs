//! `PeerSessionResource` — the live per-peer mutable state valid between
//! handshake completion and disconnect: the four choke/interest flags, the
//! Fast-Extension allowed-fast sets, extension negotiation, the bitfield,
//! and transfer statistics.

use std::rc::{Rc, Weak};

use crate::bitfield::{self, Bitfield};
use crate::clock::{Clock, Timestamp};
use crate::dispatcher::MessageDispatcher;
use crate::error::{Error, Result};
use crate::extension::ExtensionRegistry;
use crate::peer_stat::PeerStat;
use crate::PieceIndex;

/// The operation carried by a `HAVE`-style bitfield update, matching the
/// wire encoding spec.md §4.1 assigns them (`SET = 1`, `UNSET = 0`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitOp {
    Unset = 0,
    Set = 1,
}

/// The live per-peer session. Allocated once a protocol handshake completes
/// and released on disconnect; `Peer` owns exactly one of these at a time.
pub struct PeerSessionResource {
    piece_length: u32,
    total_length: u64,
    piece_count: usize,

    am_choking: bool,
    am_interested: bool,
    peer_choking: bool,
    peer_interested: bool,
    choking_required: bool,
    opt_unchoking: bool,
    snubbing: bool,

    fast_extension_enabled: bool,
    extended_messaging_enabled: bool,
    dht_enabled: bool,

    bitfield: Bitfield,
    peer_allowed_index_set: Vec<PieceIndex>,
    am_allowed_index_set: Vec<PieceIndex>,
    extensions: ExtensionRegistry,

    peer_stat: PeerStat,
    last_am_unchoking: Option<Timestamp>,

    clock: Rc<dyn Clock>,
    dispatcher: Option<Weak<dyn MessageDispatcher>>,
}

impl PeerSessionResource {
    /// Allocates a fresh session dimensioned for a `piece_length`/
    /// `total_length` torrent. All flags start at their spec-mandated
    /// defaults (choking/not-interested on both sides, `choking_required`
    /// set) and `peer_stat`'s download window is started.
    ///
    /// # Panics
    ///
    /// Panics if `piece_length` or `total_length` is zero — allocating
    /// a session for an empty or malformed torrent is a caller bug, not a
    /// recoverable protocol condition.
    pub fn new(piece_length: u32, total_length: u64, clock: Rc<dyn Clock>) -> Self {
        assert!(piece_length > 0, "piece_length must be > 0");
        assert!(total_length > 0, "total_length must be > 0");

        let piece_count =
            ((total_length + piece_length as u64 - 1) / piece_length as u64) as usize;

        let mut peer_stat = PeerStat::new(clock.clone());
        peer_stat.download_start();

        Self {
            piece_length,
            total_length,
            piece_count,
            am_choking: true,
            am_interested: false,
            peer_choking: true,
            peer_interested: false,
            choking_required: true,
            opt_unchoking: false,
            snubbing: false,
            fast_extension_enabled: false,
            extended_messaging_enabled: false,
            dht_enabled: false,
            bitfield: bitfield::empty(piece_count),
            peer_allowed_index_set: Vec::new(),
            am_allowed_index_set: Vec::new(),
            extensions: ExtensionRegistry::new(),
            peer_stat,
            last_am_unchoking: None,
            clock,
            dispatcher: None,
        }
    }

    pub fn piece_length(&self) -> u32 {
        self.piece_length
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    // --- choke/interest flags -------------------------------------------

    pub fn am_choking(&self) -> bool {
        self.am_choking
    }

    pub fn set_am_choking(&mut self, choking: bool) {
        self.am_choking = choking;
        if !choking {
            self.last_am_unchoking = Some(self.clock.now());
        }
    }

    pub fn am_interested(&self) -> bool {
        self.am_interested
    }

    pub fn set_am_interested(&mut self, interested: bool) {
        self.am_interested = interested;
    }

    pub fn peer_choking(&self) -> bool {
        self.peer_choking
    }

    pub fn set_peer_choking(&mut self, choking: bool) {
        self.peer_choking = choking;
    }

    pub fn peer_interested(&self) -> bool {
        self.peer_interested
    }

    pub fn set_peer_interested(&mut self, interested: bool) {
        self.peer_interested = interested;
    }

    pub fn choking_required(&self) -> bool {
        self.choking_required
    }

    pub fn set_choking_required(&mut self, required: bool) {
        self.choking_required = required;
    }

    pub fn opt_unchoking(&self) -> bool {
        self.opt_unchoking
    }

    pub fn set_opt_unchoking(&mut self, opt_unchoking: bool) {
        self.opt_unchoking = opt_unchoking;
    }

    pub fn snubbing(&self) -> bool {
        self.snubbing
    }

    pub fn set_snubbing(&mut self, snubbing: bool) {
        self.snubbing = snubbing;
    }

    /// The upper-layer choking algorithm's single query point: should this
    /// peer currently be refused upload service?
    pub fn should_be_choking(&self) -> bool {
        self.am_choking || self.choking_required
    }

    pub fn last_am_unchoking(&self) -> Option<Timestamp> {
        self.last_am_unchoking
    }

    // --- extensions -------------------------------------------------------

    pub fn fast_extension_enabled(&self) -> bool {
        self.fast_extension_enabled
    }

    pub fn set_fast_extension_enabled(&mut self, enabled: bool) {
        self.fast_extension_enabled = enabled;
    }

    pub fn extended_messaging_enabled(&self) -> bool {
        self.extended_messaging_enabled
    }

    pub fn set_extended_messaging_enabled(&mut self, enabled: bool) {
        self.extended_messaging_enabled = enabled;
    }

    pub fn dht_enabled(&self) -> bool {
        self.dht_enabled
    }

    pub fn set_dht_enabled(&mut self, enabled: bool) {
        self.dht_enabled = enabled;
    }

    pub fn add_extension(&mut self, name: &str, id: u8) {
        self.extensions.set(name, id);
    }

    pub fn extension_message_id(&self, name: &str) -> u8 {
        self.extensions.message_id(name)
    }

    pub fn extension_name(&self, id: u8) -> &str {
        self.extensions.name(id)
    }

    // --- allowed-fast sets --------------------------------------------

    /// Registers a piece index the peer has told us (via `ALLOWED_FAST`) it
    /// will serve even while choking us. De-duplicating; a no-op if the
    /// index is already present or the set has already grown to
    /// `piece_count` entries.
    pub fn add_peer_allowed_index(&mut self, index: PieceIndex) {
        add_allowed_index(&mut self.peer_allowed_index_set, index, self.piece_count);
    }

    pub fn is_in_peer_allowed_index_set(&self, index: PieceIndex) -> bool {
        self.peer_allowed_index_set.contains(&index)
    }

    pub fn count_peer_allowed_index_set(&self) -> usize {
        self.peer_allowed_index_set.len()
    }

    pub fn peer_allowed_index_set(&self) -> &[PieceIndex] {
        &self.peer_allowed_index_set
    }

    /// Registers a piece index we will serve to this peer even while we
    /// choke it, as computed once per session by the Fast-Extension
    /// peer-ip-hash construction (external to this module).
    pub fn add_am_allowed_index(&mut self, index: PieceIndex) {
        add_allowed_index(&mut self.am_allowed_index_set, index, self.piece_count);
    }

    pub fn is_in_am_allowed_index_set(&self, index: PieceIndex) -> bool {
        self.am_allowed_index_set.contains(&index)
    }

    // --- bitfield -------------------------------------------------------

    pub fn has_piece(&self, index: PieceIndex) -> bool {
        self.bitfield[index]
    }

    /// Applies a `HAVE`-style update to a single bit.
    pub fn update_bitfield(&mut self, index: PieceIndex, op: BitOp) -> Result<()> {
        bitfield::check_index(index, self.piece_count)?;
        self.bitfield.set(index, op == BitOp::Set);
        Ok(())
    }

    /// Replaces the entire bitmap from a wire-format `BITFIELD` payload.
    pub fn set_bitfield(&mut self, bytes: &[u8]) -> Result<()> {
        self.bitfield = bitfield::from_bytes(bytes, self.piece_count)?;
        Ok(())
    }

    /// `HAVE_ALL` (Fast Extension): the peer has announced it holds every
    /// piece without sending an explicit bitfield.
    pub fn mark_have_all(&mut self) {
        bitfield::mark_all(&mut self.bitfield);
    }

    /// `HAVE_NONE` (Fast Extension): the peer has announced it holds no
    /// pieces.
    pub fn mark_have_none(&mut self) {
        bitfield::clear_all(&mut self.bitfield);
    }

    pub fn has_all_pieces(&self) -> bool {
        bitfield::all_set(&self.bitfield, self.piece_count)
    }

    pub fn bitfield_bytes(&self) -> Vec<u8> {
        self.bitfield.clone().into_vec()
    }

    pub fn bitfield_bit_len(&self) -> usize {
        self.bitfield.len()
    }

    /// The length of the piece at `index`, accounting for a possibly-short
    /// final piece.
    fn piece_len(&self, index: PieceIndex) -> Result<u32> {
        bitfield::check_index(index, self.piece_count)?;
        if index == self.piece_count - 1 {
            let preceding = self.piece_length as u64 * (self.piece_count - 1) as u64;
            Ok((self.total_length - preceding) as u32)
        } else {
            Ok(self.piece_length)
        }
    }

    /// The sum of the lengths of every piece this peer has, adjusted for a
    /// possibly-short last piece.
    pub fn completed_length(&self) -> u64 {
        (0..self.piece_count)
            .filter(|&index| self.bitfield[index])
            .map(|index| {
                self.piece_len(index)
                    .expect("index is within 0..piece_count by construction") as u64
            })
            .sum()
    }

    // --- stats ------------------------------------------------------------

    pub fn peer_stat(&self) -> &PeerStat {
        &self.peer_stat
    }

    pub fn peer_stat_mut(&mut self) -> &mut PeerStat {
        &mut self.peer_stat
    }

    pub fn update_upload_length(&mut self, bytes: u64) {
        self.peer_stat.update_upload_length(bytes);
    }

    pub fn update_download_length(&mut self, bytes: u64) {
        self.peer_stat.update_download_length(bytes);
    }

    pub fn upload_len(&self) -> u64 {
        self.peer_stat.upload_len()
    }

    pub fn download_len(&self) -> u64 {
        self.peer_stat.download_len()
    }

    pub fn last_download_update(&self) -> Option<Timestamp> {
        self.peer_stat.last_download_update()
    }

    // --- dispatcher backlink ----------------------------------------------

    pub fn set_dispatcher(&mut self, dispatcher: Weak<dyn MessageDispatcher>) {
        self.dispatcher = Some(dispatcher);
    }

    /// The number of outstanding local upload requests for this peer, or 0
    /// if no dispatcher was ever set or it has since been dropped.
    pub fn count_outstanding_upload(&self) -> usize {
        self.dispatcher
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|dispatcher| dispatcher.count_outstanding_upload())
            .unwrap_or(0)
    }
}

fn add_allowed_index(set: &mut Vec<PieceIndex>, index: PieceIndex, piece_count: usize) {
    if set.contains(&index) {
        return;
    }
    if set.len() >= piece_count {
        return;
    }
    set.push(index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;

    fn session(piece_length: u32, total_length: u64) -> PeerSessionResource {
        let clock: Rc<dyn Clock> = Rc::new(VirtualClock::new());
        PeerSessionResource::new(piece_length, total_length, clock)
    }

    #[test]
    fn defaults_match_spec() {
        let session = session(16384, 32768);
        assert!(session.am_choking());
        assert!(session.peer_choking());
        assert!(!session.am_interested());
        assert!(!session.peer_interested());
        assert!(session.choking_required());
        assert!(!session.has_piece(0));
        assert!(!session.has_piece(1));
    }

    #[test]
    fn update_bitfield_then_completed_length() {
        let mut session = session(16384, 32768);
        session.update_bitfield(0, BitOp::Set).unwrap();
        assert!(!session.has_all_pieces());
        session.update_bitfield(1, BitOp::Set).unwrap();
        assert!(session.has_all_pieces());
        assert_eq!(session.completed_length(), 32768);
    }

    #[test]
    fn update_bitfield_rejects_out_of_range_index() {
        let mut session = session(16384, 32768);
        let err = session.update_bitfield(5, BitOp::Set).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidPieceIndex {
                index: 5,
                piece_count: 2
            }
        );
    }

    #[test]
    fn set_bitfield_replaces_bits_atomically() {
        let mut session = session(16384, 32768);
        session.set_bitfield(&[0b1100_0000]).unwrap();
        assert!(session.has_piece(0));
        assert!(session.has_piece(1));
    }

    #[test]
    fn set_bitfield_rejects_wrong_byte_length() {
        let mut session = session(16384, 32768);
        assert!(session.set_bitfield(&[0, 0]).is_err());
    }

    #[test]
    fn last_piece_is_short() {
        // 3 pieces of 10 bytes would be 30, but total is 25, so the last
        // piece is 5 bytes.
        let session = session(10, 25);
        assert_eq!(session.piece_count(), 3);
        assert_eq!(session.piece_len(2).unwrap(), 5);
    }

    #[test]
    fn have_all_and_have_none() {
        let mut session = session(16384, 32768);
        session.mark_have_all();
        assert!(session.has_all_pieces());
        session.mark_have_none();
        assert!(!session.has_all_pieces());
    }

    #[test]
    fn allowed_fast_sets_deduplicate_and_preserve_order() {
        let mut session = session(16384, 1 << 20);
        session.add_peer_allowed_index(5);
        session.add_peer_allowed_index(2);
        session.add_peer_allowed_index(5);
        assert_eq!(session.peer_allowed_index_set(), &[5, 2]);
        assert_eq!(session.count_peer_allowed_index_set(), 2);
        assert!(session.is_in_peer_allowed_index_set(2));
        assert!(!session.is_in_peer_allowed_index_set(3));
    }

    #[test]
    fn should_be_choking_is_choking_or_required() {
        let mut session = session(16384, 32768);
        // defaults: am_choking=true, choking_required=true
        assert!(session.should_be_choking());
        session.set_am_choking(false);
        // choking_required is still true
        assert!(session.should_be_choking());
        session.set_choking_required(false);
        assert!(!session.should_be_choking());
    }

    #[test]
    fn unchoking_stamps_last_am_unchoking() {
        let mut session = session(16384, 32768);
        assert!(session.last_am_unchoking().is_none());
        session.set_am_choking(false);
        assert!(session.last_am_unchoking().is_some());
    }
}

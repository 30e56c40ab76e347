//! A reference unchoke-round algorithm for the "upper-layer choking
//! algorithm" collaborator spec.md §6 describes only as a reader/writer of
//! `Peer`'s flags and speeds. This module gives that collaborator a concrete
//! body so the crate has a complete, runnable choking policy, but it is not
//! itself part of the specified core — everything it does goes through
//! `Peer`'s public surface.

use crate::peer::Peer;

/// The number of peers we keep unchoked for their upload rate to us, not
/// counting the optimistic-unchoke slot. BitTorrent clients commonly use 4.
pub const REGULAR_UNCHOKE_SLOTS: usize = 4;

/// Runs one round of the standard tit-for-tat unchoke algorithm over
/// `peers`, choosing who to unchoke based on download speed from them (the
/// classic "leecher" policy) and rotating a single optimistic-unchoke slot
/// in to give new or slow peers a chance to prove themselves.
///
/// Only peers with an allocated session and who are interested in us are
/// eligible. Everyone else is always choked. This mutates `am_choking`,
/// `choking_required`, and `opt_unchoking` on each peer, exactly the three
/// fields spec.md §6 names as writable by this collaborator.
pub fn run_unchoke_round(peers: &mut [Peer], optimistic_index: usize) {
    let mut eligible: Vec<usize> = peers
        .iter()
        .enumerate()
        .filter(|(_, peer)| peer.has_session() && peer.peer_interested())
        .map(|(index, _)| index)
        .collect();

    // sort by download speed from the peer, descending: peers who send us
    // data fastest earn the regular unchoke slots
    eligible.sort_by_key(|&index| std::cmp::Reverse(peers[index].calculate_download_speed()));

    for peer in peers.iter_mut() {
        peer.set_choking_required(true);
        peer.set_opt_unchoking(false);
    }

    for &index in eligible.iter().take(REGULAR_UNCHOKE_SLOTS) {
        let peer = &mut peers[index];
        peer.set_choking_required(false);
        peer.set_am_choking(false);
    }

    // pick a single optimistic-unchoke slot among the remaining eligible
    // peers, skipping anyone already unchoked above. `optimistic_index` is
    // reduced modulo the remaining pool size first since callers (e.g. a
    // random pick from the full engine) may pass an arbitrarily large value.
    let remaining = &eligible[REGULAR_UNCHOKE_SLOTS.min(eligible.len())..];
    if !remaining.is_empty() {
        let index = remaining[optimistic_index % remaining.len()];
        let peer = &mut peers[index];
        peer.set_opt_unchoking(true);
        peer.set_choking_required(false);
        peer.set_am_choking(false);
    }

    // anyone not granted a slot above goes back to (or stays at) choking
    for peer in peers.iter_mut() {
        if peer.has_session() && peer.choking_required() && !peer.opt_unchoking() {
            peer.set_am_choking(true);
        }
    }
}

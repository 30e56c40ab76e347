//! The boundary between a peer session and the message dispatcher that
//! actually owns the peer's wire connection and outstanding request queues.
//!
//! The dispatcher lives entirely outside the core (see `spec.md` §6): the
//! session only ever holds a non-owning [`std::rc::Weak`] reference to one,
//! queried when the upper layer wants to know how many upload requests are
//! currently in flight on this peer's behalf.

/// What a `PeerSessionResource` needs from the real message dispatcher.
pub trait MessageDispatcher {
    /// The number of upload requests the local side has queued or is
    /// currently serving for this peer.
    fn count_outstanding_upload(&self) -> usize;
}

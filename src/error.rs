use std::fmt;

/// The crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the peer session engine and its immediate
/// collaborators.
///
/// Programmer errors (calling a session-dependent accessor before a session
/// has been allocated) are *not* represented here: those are bugs in the
/// caller and are reported via `Option::expect` panics, not `Result`, per
/// the "fail fast on misuse" policy the rest of the crate follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A `BITFIELD` message's payload length didn't match
    /// `ceil(piece_count / 8)`.
    InvalidBitfieldLength { expected: usize, actual: usize },
    /// A piece index named in a protocol message (`HAVE`, `ALLOWED_FAST`,
    /// ...) is outside `0..piece_count`.
    InvalidPieceIndex { index: usize, piece_count: usize },
    /// A second handshake arrived on an already-handshaken connection.
    DuplicateHandshake,
    /// A metainfo dictionary was missing the `length`/`files` key a
    /// single-file/multi-file torrent must carry.
    InvalidMetainfo,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBitfieldLength { expected, actual } => write!(
                f,
                "invalid bitfield length: expected {} bytes, got {}",
                expected, actual
            ),
            Self::InvalidPieceIndex { index, piece_count } => write!(
                f,
                "piece index {} out of range (piece count {})",
                index, piece_count
            ),
            Self::DuplicateHandshake => {
                write!(f, "peer sent a second handshake on the same connection")
            }
            Self::InvalidMetainfo => {
                write!(f, "metainfo is missing a required length/files key")
            }
        }
    }
}

impl std::error::Error for Error {}

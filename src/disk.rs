//! The boundary between the peer session engine and the on-disk piece
//! writer. spec.md keeps "the on-disk piece writer" external to the core
//! (see spec.md §1); the teacher crate's real implementation
//! (`disk/io.rs`: `pwritev`, per-torrent write buffers, an `mpsc`-driven
//! event loop) is not carried into this crate — only the narrow trait a
//! peer session's block-write calls go through.

use crate::error::Result;
use crate::{BlockInfo, TorrentId};

/// What a peer session needs from the real disk-IO subsystem: somewhere to
/// hand off a downloaded block for writing, addressed by the owning
/// torrent's id.
pub trait DiskHandle {
    fn write_block(
        &self,
        torrent: TorrentId,
        block: BlockInfo,
        data: Vec<u8>,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// A `DiskHandle` that records writes in memory, for collaborators
    /// (e.g. `engine.rs`) that need something to exercise the trait boundary
    /// against without real file IO.
    #[derive(Default)]
    struct RecordingDisk {
        writes: RefCell<Vec<(TorrentId, BlockInfo, Vec<u8>)>>,
    }

    impl DiskHandle for RecordingDisk {
        fn write_block(
            &self,
            torrent: TorrentId,
            block: BlockInfo,
            data: Vec<u8>,
        ) -> Result<()> {
            self.writes.borrow_mut().push((torrent, block, data));
            Ok(())
        }
    }

    #[test]
    fn write_block_records_call() {
        let disk = RecordingDisk::default();
        let block = BlockInfo {
            piece_index: 0,
            offset: 0,
            len: 16384,
        };
        disk.write_block(1, block, vec![1, 2, 3]).unwrap();
        assert_eq!(disk.writes.borrow().len(), 1);
    }
}

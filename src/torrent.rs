//! The per-torrent status shared across every [`crate::peer::Peer`] session
//! that belongs to the same torrent: info hash, local client id, and the
//! storage layout a `PeerSessionResource` is dimensioned against.
//!
//! This is one of the thin external-collaborator seams spec.md deliberately
//! keeps out of the core (see spec.md §1): the full torrent state machine
//! (announcing, piece picking, completion tracking) lives outside this
//! crate's specified scope, so only the parts a peer session needs to read
//! are modeled here.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::metainfo::Metainfo;
use crate::storage_info::StorageInfo;
use crate::{PeerId, Sha1Hash, TorrentId};

/// Immutable, shared-ownership torrent information. Every peer session in a
/// torrent holds an `Arc` clone of the same `SharedStatus` rather than its
/// own copy, mirroring the teacher crate's `Arc<SharedStatus>` field on its
/// own `PeerSession`.
#[derive(Debug)]
pub struct SharedStatus {
    pub id: TorrentId,
    pub info_hash: Sha1Hash,
    pub client_id: PeerId,
    storage: StorageInfo,
}

impl SharedStatus {
    /// Derives a `SharedStatus` from a parsed metainfo file, the local
    /// client id, and the destination download directory.
    pub fn new(
        id: TorrentId,
        metainfo: &Metainfo,
        client_id: PeerId,
        download_dir: PathBuf,
    ) -> Result<Arc<Self>> {
        let info_hash = metainfo
            .create_info_hash()
            .map_err(|_| Error::InvalidMetainfo)?;
        let storage = StorageInfo::new(metainfo, download_dir)?;
        Ok(Arc::new(Self {
            id,
            info_hash,
            client_id,
            storage,
        }))
    }

    pub fn piece_count(&self) -> usize {
        self.storage.piece_count
    }

    pub fn piece_len(&self) -> u32 {
        self.storage.piece_len
    }

    pub fn download_len(&self) -> u64 {
        self.storage.download_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metainfo::Info;

    #[test]
    fn new_derives_info_hash_and_storage() {
        let metainfo = Metainfo {
            info: Info {
                name: "foo.iso".to_owned(),
                pieces: vec![0; 20 * 2],
                piece_length: 16384,
                length: Some(32768),
                files: None,
                private: None,
            },
        };
        let status =
            SharedStatus::new(1, &metainfo, *b"-PD0001-000000000000", PathBuf::from("/tmp"))
                .unwrap();
        assert_eq!(status.piece_count(), 2);
        assert_eq!(status.piece_len(), 16384);
        assert_eq!(status.download_len(), 32768);
        assert_eq!(status.id, 1);
    }
}

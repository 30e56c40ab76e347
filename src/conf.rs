//! This module defines types used to configure the engine and its parts.

use std::{path::PathBuf, time::Duration};

use crate::PeerId;

/// The default polydl client id.
pub const POLYDL_CLIENT_ID: &PeerId = b"pdl-0000000000000000";

/// The length, in bytes, of a handshake's peer id field.
pub const PEER_ID_LENGTH: usize = 20;

/// How long a peer must go without a fresh bad-condition event before it is
/// considered recovered. See `Peer::is_good`.
pub const BAD_CONDITION_INTERVAL: Duration = Duration::from_secs(10);

/// How long a peer may go without delivering a single byte before the
/// upper layer marks it `snubbing`. Not specified numerically by spec.md;
/// this follows aria2's own default snub timeout, the system this spec was
/// distilled from (see `original_source/src/Peer.cc` and DESIGN.md).
pub const SNUB_INTERVAL: Duration = Duration::from_secs(30);

/// The global configuration for the engine and all its parts.
#[derive(Clone, Debug)]
pub struct Conf {
    pub engine: EngineConf,
    pub torrent: TorrentConf,
    pub peer_session: PeerSessionConf,
}

impl Conf {
    /// Returns the torrent configuration with reasonable defaults, except for
    /// the download directory, as it is not sensible to guess that for the
    /// user. It uses the default polydl client id, [`POLYDL_CLIENT_ID`].
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine: EngineConf {
                client_id: *POLYDL_CLIENT_ID,
            },
            torrent: TorrentConf::new(download_dir),
            peer_session: PeerSessionConf::default(),
        }
    }
}

/// Configuration for the peer session engine: the timings that drive
/// choking cooldowns, snub detection, and speed averaging.
#[derive(Clone, Copy, Debug)]
pub struct PeerSessionConf {
    pub bad_condition_interval: Duration,
    pub snub_interval: Duration,
    pub speed_window: Duration,
}

impl Default for PeerSessionConf {
    fn default() -> Self {
        Self {
            bad_condition_interval: BAD_CONDITION_INTERVAL,
            snub_interval: SNUB_INTERVAL,
            speed_window: crate::peer_stat::SPEED_WINDOW,
        }
    }
}

/// Configuration related to the engine itself.
#[derive(Clone, Debug)]
pub struct EngineConf {
    /// The ID of the client to announce to trackers and other peers.
    pub client_id: PeerId,
}

/// Configuration for a torrent.
///
/// The engine will have a default instance of this applied to all torrents by
/// default, but individual torrents may override this configuration.
#[derive(Clone, Debug)]
pub struct TorrentConf {
    /// The directory in which a torrent's files are placed upon download and
    /// from which they are seeded.
    pub download_dir: PathBuf,

    /// The minimum number of peers we want to keep in torrent at all times.
    /// This will be configurable later.
    pub min_requested_peer_count: usize,

    /// The max number of connected peers the torrent should have.
    pub max_connected_peer_count: usize,

    /// If the tracker doesn't provide a minimum announce interval, we default
    /// to announcing every 30 seconds.
    pub announce_interval: Duration,

    /// After this many attempts, the torrent stops announcing to a tracker.
    pub tracker_error_threshold: usize,
}

impl TorrentConf {
    /// Returns the torrent configuration with reasonable defaults, except for
    /// the download directory, as it is not sensible to guess that for the
    /// user.
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            // We always request at least 10 peers as anything less is a waste
            // of network round trip and it allows us to buffer up a bit more
            // than needed.
            min_requested_peer_count: 10,
            // This value is mostly picked for performance while keeping in mind
            // not to overwhelm the host.
            max_connected_peer_count: 50,
            // needs teting
            announce_interval: Duration::from_secs(60 * 60),
            // needs testing
            tracker_error_threshold: 15,
        }
    }
}

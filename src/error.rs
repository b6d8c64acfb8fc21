//! Error type for caller contract violations.
//!
//! Nothing on the signal path fails: overloads and missing acknowledgements
//! are reported as [`PowerMode`](crate::power::PowerMode) and
//! [`AckResult`](crate::ack::AckResult) values. [`DccError`] only covers
//! requests the core refuses to act on.

use crate::consts::{MAX_BOOSTERS, MAX_PACKET_SIZE};

/// Errors returned by the scheduling and track-management APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DccError {
    /// The payload does not fit in a packet buffer.
    #[error("packet payload of {len} bytes exceeds the {max} byte limit", max = MAX_PACKET_SIZE)]
    PacketTooLong {
        /// Length of the rejected payload.
        len: usize,
    },

    /// An ACK operation was requested on a track that is not the programming track.
    #[error("acknowledgement detection is only available on the programming track")]
    NotProgrammingTrack,

    /// No booster with the given id is attached.
    #[error("no booster with id {0}")]
    UnknownBooster(u8),

    /// The track already carries the maximum number of boosters.
    #[error("booster table is full ({max} boosters)", max = MAX_BOOSTERS)]
    TooManyBoosters,
}

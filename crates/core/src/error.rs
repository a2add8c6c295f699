//! Error taxonomy for travel requests.
//! This module exists so callers can tell recoverable travel failures apart from bad input.
//! It does not cover cache persistence failures, which live beside the file format.

use crate::types::LevelId;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TravelError {
    /// The destination is unreachable under the current safety policy.
    #[error("can't reach that")]
    NoPath,
    /// The level graph toward the target has not been discovered yet.
    #[error("the way to {0} is not fully known yet")]
    PartiallyUnknown(LevelId),
    /// Cached connector distances were computed against older map knowledge.
    #[error("cached distances for {0} are out of date")]
    StaleCache(LevelId),
    /// The request names a level or position that can't exist.
    #[error("invalid travel request: {0}")]
    InvalidState(String),
    #[error("no travel session is active")]
    NoSession,
}

use shared::domain::WorldId;
use thiserror::Error;

use crate::transport::ChannelKind;

#[derive(Debug, Error)]
pub enum CompanionError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("world {world}: failed to open {channel} channel: {reason}")]
    Connection {
        world: WorldId,
        channel: ChannelKind,
        reason: String,
    },
    #[error("world {world}: malformed {channel} message: {reason}")]
    MalformedMessage {
        world: WorldId,
        channel: ChannelKind,
        reason: String,
    },
    #[error("world {world}: {channel} channel closed")]
    ChannelClosed { world: WorldId, channel: ChannelKind },
    #[error("failed to encode outbound payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
}

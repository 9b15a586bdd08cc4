//! Change-feed transport contract.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use vigil_auth::Filter;
use vigil_event::ChangeKind;
use vigil_types::ErrorCode;

/// Backend handle for one open feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedHandle(pub u64);

impl std::fmt::Display for FeedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "feed#{}", self.0)
    }
}

/// One message on an open feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// A backend mutation.
    Change {
        /// Mutation kind.
        kind: ChangeKind,
        /// Row image.
        payload: Value,
    },
    /// The transport failed; the feed is unusable.
    Error(String),
}

/// Backend change-notification API.
///
/// The backend writes into the sender it is given; dropping every clone of
/// it ends the stream, which the caller treats like a transport error.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens a feed for `resource`, narrowed server-side by `predicate`.
    ///
    /// # Errors
    ///
    /// [`ChannelError::OpenFailed`] if the backend refuses.
    async fn open(
        &self,
        resource: &str,
        predicate: &Filter,
        events: mpsc::Sender<FeedMessage>,
    ) -> Result<FeedHandle, ChannelError>;

    /// Closes a feed and releases its backend resources.
    async fn close(&self, handle: FeedHandle);
}

/// Channel failure. Transient unless noted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The backend refused to open the feed.
    #[error("channel open failed: {0}")]
    OpenFailed(String),

    /// The feed did not open in time.
    #[error("channel open timed out after {0:?}")]
    OpenTimeout(Duration),

    /// The transport reported an error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend ended the stream.
    #[error("stream ended")]
    StreamEnded,

    /// The channel was closed and will not reconnect.
    #[error("channel closed")]
    Closed,
}

impl ErrorCode for ChannelError {
    fn code(&self) -> &'static str {
        match self {
            Self::OpenFailed(_) => "CHANNEL_OPEN_FAILED",
            Self::OpenTimeout(_) => "CHANNEL_OPEN_TIMEOUT",
            Self::Transport(_) => "CHANNEL_TRANSPORT",
            Self::StreamEnded => "CHANNEL_STREAM_ENDED",
            Self::Closed => "CHANNEL_CLOSED",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

//! Live change subscriptions.
//!
//! Consumers describe what they want with a [`SubscriptionDescriptor`] and
//! get back a [`SubscriptionHandle`]. Descriptors with the same resource
//! and predicate share one backend feed through the [`SubscriptionManager`].
//!
//! # Error Handling
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | Backend refused | `CHANNEL_OPEN_FAILED` | Yes |
//! | Open took too long | `CHANNEL_OPEN_TIMEOUT` | Yes |
//! | Transport failed | `CHANNEL_TRANSPORT` | Yes |
//! | Backend ended stream | `CHANNEL_STREAM_ENDED` | Yes |
//! | Channel closed | `CHANNEL_CLOSED` | No |
//!
//! Recoverable errors never reach consumers; they drive the reconnect
//! loop and show up as [`Connectivity::Degraded`]. Events emitted during
//! an outage are lost.

mod backoff;
mod descriptor;
mod manager;
mod transport;

pub use backoff::Backoff;
pub use descriptor::{ChannelKey, SubscriptionDescriptor};
pub use manager::{
    ChannelState, Connectivity, HandlerResult, SubscriptionHandle, SubscriptionId,
    SubscriptionManager,
};
pub use transport::{ChangeFeed, ChannelError, FeedHandle, FeedMessage};

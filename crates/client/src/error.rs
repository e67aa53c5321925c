//! Error taxonomy for the synchronization core
//!
//! Transport and REST failures are converted to user-visible messages at
//! the controller boundary; model invariants (dedup, ordering) are enforced
//! unconditionally and are never reported through this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The bearer credential payload could not be decoded. Attribution
    /// features degrade; nothing else is affected.
    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    /// An action was attempted while the real-time channel was not
    /// connected. The caller may retry once the channel reconnects.
    #[error("real-time channel is not connected")]
    ChannelUnavailable,

    /// An asynchronous result arrived for a superseded selection and was
    /// discarded. Internal consistency guard, not user-visible.
    #[error("stale result for a superseded selection")]
    StaleResult,

    /// A REST call failed. State is unchanged.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The server rejected an optimistic send. The draft is retained and
    /// marked failed so the user can retry.
    #[error("send rejected: {0}")]
    AckFailed(String),

    /// A message action requires an active ticket selection.
    #[error("no ticket is selected")]
    NoSelection,

    /// Message drafts must contain non-whitespace content.
    #[error("message draft is empty")]
    EmptyDraft,
}

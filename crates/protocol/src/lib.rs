//! Deskline Protocol
//!
//! Shared types for communication between the Deskline client and the
//! ticket server. These types are serialized as JSON over the real-time
//! channel.

// Re-exports
pub mod client;
pub mod server;
pub mod types;

pub use client::ClientAction;
pub use server::ServerEvent;
pub use types::*;

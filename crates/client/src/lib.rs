//! Deskline client core
//!
//! The synchronization engine behind a support-desk chat frontend. It
//! keeps a live ticket list and one selected message thread consistent
//! with the server over a single realtime channel plus a small REST
//! surface, and exposes the result as plain state a frontend can render.
//!
//! Layering, outermost first:
//!
//! - [`controller::SessionController`] — user-driven entry points, event
//!   fold loop, the only issuer of channel actions and REST calls
//! - [`channel::ChannelSession`] — one connection, event fan-out, acked
//!   emits
//! - [`ticket_list::TicketList`] / [`thread::MessageThread`] — pure
//!   in-memory models, no IO
//! - [`ws::WsTransport`] / [`rest::HttpTicketApi`] — the network edges,
//!   both behind traits so tests run against scripted stand-ins

pub mod channel;
pub mod controller;
pub mod error;
pub mod identity;
pub mod loopback;
pub mod rest;
pub mod thread;
pub mod ticket_list;
pub mod ws;

pub use channel::{ChannelSession, ChannelTransport, ConnectionState, TransportLink};
pub use controller::SessionController;
pub use error::SyncError;
pub use rest::{HttpTicketApi, TicketApi};
pub use thread::{Delivery, MessageThread, Sender, ThreadEntry};
pub use ticket_list::TicketList;
pub use ws::WsTransport;

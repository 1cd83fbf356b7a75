//! Venue transport
//!
//! A single persistent WebSocket carrying any number of correlated
//! request/response exchanges plus unsolicited pushes. Reconnects with
//! exponential backoff and replays authorization; push subscriptions are
//! replayed by the session.

mod api;
mod client;
mod pending;
mod types;

pub use api::VenueApi;
pub use client::{PendingReply, RpcClient};
pub use pending::{PendingRequest, PendingTable, Reply};
pub use types::{backoff_delay, TransportConfig, TransportError, TransportEvent};

//! Venue wire protocol
//!
//! JSON messages exchanged over the WebSocket: requests carry a `req_id`,
//! responses echo it along with `msg_type`.

mod message;
mod request;

pub use message::{
    field, last_digit, last_digit_of, subscription_id, Account, ApiError, Balance,
    ContractUpdate, HistoryTick, OrderSubscription, Placement, Tick,
};
pub use request::{ContractParameters, OrderRequest, Request};

/// Venue contract identifier
pub type ContractId = u64;

/// Push stream identifier returned by subscribe requests
pub type SubscriptionId = String;

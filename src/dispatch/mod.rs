//! Push dispatcher
//!
//! Classifies unsolicited messages by `msg_type` and resolves the engine that
//! owns them. Pushes for untracked symbols or contracts are dropped; late and
//! duplicate updates for settled contracts are routine.

use crate::protocol::{field, ApiError, ContractId, ContractUpdate, Tick};
use crate::strategy::InstrumentStore;
use serde_json::Value;

/// A classified push message
#[derive(Debug, Clone, PartialEq)]
pub enum Push {
    Tick(Tick),
    ContractUpdate(ContractUpdate),
    /// Error not correlated to any outstanding request
    Error {
        req_id: Option<u64>,
        error: ApiError,
    },
    /// Anything else (heartbeats, forget confirmations arriving late, ...)
    Other(String),
}

/// Where a push should be delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Instrument(String),
    Order {
        symbol: String,
        contract_id: ContractId,
    },
    Dropped,
}

/// Classify a raw push
pub fn classify(value: &Value) -> Push {
    if let Some(err) = value.get("error") {
        return Push::Error {
            req_id: value.get("req_id").and_then(Value::as_u64),
            error: ApiError::from_value(err),
        };
    }

    let msg_type = value
        .get("msg_type")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let parsed = match msg_type {
        "tick" => field::<Tick>(value, "tick").map(Push::Tick),
        "proposal_open_contract" => {
            field::<ContractUpdate>(value, "proposal_open_contract").map(Push::ContractUpdate)
        }
        other => return Push::Other(other.to_string()),
    };

    parsed.unwrap_or_else(|e| {
        tracing::warn!(msg_type, error = %e, "Malformed push");
        Push::Other(msg_type.to_string())
    })
}

/// Find the owner of a push
pub fn route(push: &Push, store: &InstrumentStore) -> Route {
    match push {
        Push::Tick(tick) if store.contains(&tick.symbol) => Route::Instrument(tick.symbol.clone()),
        Push::ContractUpdate(update) => match store.owner_of(update.contract_id) {
            Some(symbol) => Route::Order {
                symbol: symbol.to_string(),
                contract_id: update.contract_id,
            },
            None => Route::Dropped,
        },
        _ => Route::Dropped,
    }
}

//! Inbound message shapes

use super::ContractId;
use crate::strategy::Outcome;
use crate::transport::TransportError;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// Final decimal digit of a price rendered at `pip_size` decimals
pub fn last_digit(quote: f64, pip_size: u32) -> Option<u8> {
    last_digit_of(&format!("{:.*}", pip_size as usize, quote))
}

/// Final decimal digit of an already-rendered price
pub fn last_digit_of(display: &str) -> Option<u8> {
    display
        .trim()
        .chars()
        .last()
        .and_then(|c| c.to_digit(10))
        .map(|d| d as u8)
}

/// One price update
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub quote: f64,
    /// Decimals the feed reports for this instrument
    pub pip_size: u32,
    #[serde(default)]
    pub epoch: i64,
}

impl Tick {
    pub fn new(symbol: impl Into<String>, quote: f64, pip_size: u32) -> Self {
        Self {
            symbol: symbol.into(),
            quote,
            pip_size,
            epoch: 0,
        }
    }

    /// Price as reported, at the declared precision
    pub fn display(&self) -> String {
        format!("{:.*}", self.pip_size as usize, self.quote)
    }

    pub fn last_digit(&self) -> Option<u8> {
        last_digit_of(&self.display())
    }
}

/// Tick observed during a contract's lifetime
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryTick {
    #[serde(default)]
    pub epoch: i64,
    #[serde(default)]
    pub tick: Option<f64>,
    #[serde(default)]
    pub tick_display_value: Option<String>,
}

impl HistoryTick {
    /// Prefer the venue's rendering; fall back to the instrument's pip size
    pub fn last_digit(&self, pip_size: Option<u32>) -> Option<u8> {
        if let Some(display) = &self.tick_display_value {
            return last_digit_of(display);
        }
        match (self.tick, pip_size) {
            (Some(quote), Some(pip)) => last_digit(quote, pip),
            _ => None,
        }
    }
}

/// Order lifecycle push
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContractUpdate {
    pub contract_id: ContractId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_sold: u8,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub profit: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub balance_after: Option<Decimal>,
    #[serde(default)]
    pub tick_stream: Vec<HistoryTick>,
}

impl ContractUpdate {
    /// Authoritative outcome, if this update settles the contract
    pub fn settlement(&self) -> Option<Outcome> {
        match self.status.as_deref() {
            Some("won") => return Some(Outcome::Won),
            Some("lost") => return Some(Outcome::Lost),
            _ => {}
        }
        if self.is_sold == 1 {
            let profit = self.profit.unwrap_or_default();
            return Some(if profit > Decimal::ZERO {
                Outcome::Won
            } else {
                Outcome::Lost
            });
        }
        None
    }

    pub fn is_settled(&self) -> bool {
        self.settlement().is_some()
    }
}

/// Venue error payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl ApiError {
    /// Parse an `error` object, keeping the raw text if it has an unexpected shape
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_else(|_| ApiError {
            code: "Unknown".to_string(),
            message: value.to_string(),
        })
    }
}

impl From<ApiError> for TransportError {
    fn from(e: ApiError) -> Self {
        TransportError::Remote {
            code: e.code,
            message: e.message,
        }
    }
}

/// `authorize` response body
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub loginid: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    #[serde(default)]
    pub currency: String,
}

/// `buy` response body
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Placement {
    pub contract_id: ContractId,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub buy_price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub balance_after: Option<Decimal>,
}

/// `balance` response body
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Balance {
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    #[serde(default)]
    pub currency: String,
}

/// Result of subscribing to a contract's updates
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSubscription {
    /// Absent when the contract was already settled
    pub subscription_id: Option<String>,
    /// Contract state carried in the subscription response
    pub snapshot: Option<ContractUpdate>,
}

/// Deserialize `value[key]`
pub fn field<T: DeserializeOwned>(value: &Value, key: &str) -> Result<T, TransportError> {
    let inner = value
        .get(key)
        .ok_or_else(|| TransportError::Protocol(format!("missing `{}`", key)))?;
    Ok(T::deserialize(inner)?)
}

/// `value.subscription.id`
pub fn subscription_id(value: &Value) -> Option<String> {
    value
        .get("subscription")
        .and_then(|s| s.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

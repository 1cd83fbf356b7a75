//! Outbound request shapes

use super::ContractId;
use crate::strategy::BetType;
use rust_decimal::Decimal;
use serde::Serialize;

/// Contract parameters for a stake-based digit contract
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractParameters {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub basis: &'static str,
    pub contract_type: &'static str,
    pub currency: String,
    pub duration: u32,
    pub duration_unit: &'static str,
    pub symbol: String,
}

/// Order placement arguments
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub bet: BetType,
    pub stake: Decimal,
    pub duration_ticks: u32,
    pub currency: String,
}

/// Requests understood by the venue. `req_id` is added by the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Request {
    Authorize {
        authorize: String,
    },
    Ticks {
        ticks: String,
        subscribe: u8,
    },
    Buy {
        buy: u8,
        #[serde(with = "rust_decimal::serde::float")]
        price: Decimal,
        parameters: ContractParameters,
    },
    ProposalOpenContract {
        proposal_open_contract: u8,
        contract_id: ContractId,
        subscribe: u8,
    },
    Forget {
        forget: String,
    },
    Balance {
        balance: u8,
        account: String,
    },
}

impl Request {
    pub fn authorize(token: impl Into<String>) -> Self {
        Request::Authorize {
            authorize: token.into(),
        }
    }

    pub fn subscribe_ticks(symbol: impl Into<String>) -> Self {
        Request::Ticks {
            ticks: symbol.into(),
            subscribe: 1,
        }
    }

    pub fn buy(order: &OrderRequest) -> Self {
        Request::Buy {
            buy: 1,
            price: order.stake,
            parameters: ContractParameters {
                amount: order.stake,
                basis: "stake",
                contract_type: order.bet.contract_type(),
                currency: order.currency.clone(),
                duration: order.duration_ticks,
                duration_unit: "t",
                symbol: order.symbol.clone(),
            },
        }
    }

    pub fn subscribe_contract(contract_id: ContractId) -> Self {
        Request::ProposalOpenContract {
            proposal_open_contract: 1,
            contract_id,
            subscribe: 1,
        }
    }

    pub fn forget(subscription_id: impl Into<String>) -> Self {
        Request::Forget {
            forget: subscription_id.into(),
        }
    }

    /// Balance of `account`; the venue accepts `"current"` for the authorized one
    pub fn balance(account: impl Into<String>) -> Self {
        Request::Balance {
            balance: 1,
            account: account.into(),
        }
    }

    /// Short name for logs; never includes the credential
    pub fn name(&self) -> &'static str {
        match self {
            Request::Authorize { .. } => "authorize",
            Request::Ticks { .. } => "ticks",
            Request::Buy { .. } => "buy",
            Request::ProposalOpenContract { .. } => "proposal_open_contract",
            Request::Forget { .. } => "forget",
            Request::Balance { .. } => "balance",
        }
    }
}

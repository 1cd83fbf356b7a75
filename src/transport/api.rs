//! Typed venue operations on top of the RPC client

use super::client::RpcClient;
use super::types::TransportError;
use crate::protocol::{
    field, subscription_id, Account, Balance, ContractId, ContractUpdate, OrderRequest,
    OrderSubscription, Placement, Request, SubscriptionId,
};
use crate::telemetry;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Instant;

/// Operations the session issues against the venue
#[async_trait]
pub trait VenueApi: Send + Sync {
    /// Authenticate the connection
    async fn authorize(&self, token: &str) -> Result<Account, TransportError>;
    /// Start the tick stream for a symbol
    async fn subscribe_ticks(&self, symbol: &str) -> Result<SubscriptionId, TransportError>;
    /// Buy a contract
    async fn place_order(&self, order: &OrderRequest) -> Result<Placement, TransportError>;
    /// Start the update stream for a contract
    async fn subscribe_order_updates(
        &self,
        contract_id: ContractId,
    ) -> Result<OrderSubscription, TransportError>;
    /// Stop a push stream
    async fn unsubscribe(&self, subscription_id: &str) -> Result<(), TransportError>;
    /// Current balance of `account`
    async fn balance(&self, account: &str) -> Result<Decimal, TransportError>;
    /// Close the connection
    async fn disconnect(&self);
}

impl RpcClient {
    async fn call(&self, request: Request) -> Result<Value, TransportError> {
        let started = Instant::now();
        let result = self.send(&request).await;
        telemetry::record_request_latency(request.name(), started.elapsed());
        result
    }
}

#[async_trait]
impl VenueApi for RpcClient {
    async fn authorize(&self, token: &str) -> Result<Account, TransportError> {
        let response = self.call(Request::authorize(token)).await?;
        field(&response, "authorize")
    }

    async fn subscribe_ticks(&self, symbol: &str) -> Result<SubscriptionId, TransportError> {
        let response = self.call(Request::subscribe_ticks(symbol)).await?;
        subscription_id(&response)
            .ok_or_else(|| TransportError::Protocol("tick response without subscription".into()))
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<Placement, TransportError> {
        let response = self.call(Request::buy(order)).await?;
        field(&response, "buy")
    }

    async fn subscribe_order_updates(
        &self,
        contract_id: ContractId,
    ) -> Result<OrderSubscription, TransportError> {
        let response = self.call(Request::subscribe_contract(contract_id)).await?;
        let snapshot = match response.get("proposal_open_contract") {
            Some(body) if !body.is_null() && body.get("contract_id").is_some() => {
                Some(field::<ContractUpdate>(&response, "proposal_open_contract")?)
            }
            _ => None,
        };
        Ok(OrderSubscription {
            subscription_id: subscription_id(&response),
            snapshot,
        })
    }

    async fn unsubscribe(&self, subscription_id: &str) -> Result<(), TransportError> {
        self.call(Request::forget(subscription_id)).await.map(|_| ())
    }

    async fn balance(&self, account: &str) -> Result<Decimal, TransportError> {
        let response = self.call(Request::balance(account)).await?;
        let balance: Balance = field(&response, "balance")?;
        Ok(balance.balance)
    }

    async fn disconnect(&self) {
        self.close().await;
    }
}

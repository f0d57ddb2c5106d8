//! Wallet connection and the payment bridge seam.
//!
//! The bridge is whatever submits value-bearing transactions to the ledger. The rest
//! of the crate only ever talks to it through a [`WalletConnection`], which owns the
//! bridge handle and tracks where the connection is in its lifecycle.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::errors::{MarketError, MarketResult};

/// Failures reported by the payment bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("user rejected the request in the wallet")]
    UserRejected,

    #[error("insufficient funds: {message}")]
    InsufficientFunds { message: String },

    #[error("wallet has no accounts")]
    NoAccounts,

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response: {message}")]
    InvalidResponse { message: String },

    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    #[error("transaction {tx_hash} not mined within {waited_secs}s")]
    ConfirmationTimeout { tx_hash: String, waited_secs: u64 },

    #[error("connected to chain {actual}, expected {expected}")]
    WrongNetwork { expected: u64, actual: u64 },
}

impl BridgeError {
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub chain_id: u64,
}

/// Proof that a payment was mined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: String,
    pub block_number: Option<u64>,
}

/// External wallet/ledger integration.
#[async_trait]
pub trait PaymentBridge: Send + Sync {
    async fn request_accounts(&self) -> Result<Vec<String>, BridgeError>;

    async fn get_network(&self) -> Result<Network, BridgeError>;

    /// Submits the payment from `from` and resolves once the transaction is mined.
    async fn submit_payment(
        &self,
        from: &str,
        story_id: u64,
        chapter_id: u64,
        value_wei: u128,
    ) -> Result<Receipt, BridgeError>;

    /// Ledger-side purchase confirmation, used by reconciliation.
    async fn has_purchased(
        &self,
        account: &str,
        story_id: u64,
        chapter_id: u64,
    ) -> Result<bool, BridgeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletState {
    Uninitialized,
    Connecting,
    Ready { account: String, chain_id: u64 },
    Error(String),
    Disconnected,
}

impl fmt::Display for WalletState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletState::Uninitialized => write!(f, "uninitialized"),
            WalletState::Connecting => write!(f, "connecting"),
            WalletState::Ready { account, chain_id } => {
                write!(f, "ready ({account} on chain {chain_id})")
            }
            WalletState::Error(reason) => write!(f, "error: {reason}"),
            WalletState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Explicitly owned wallet connection.
pub struct WalletConnection {
    bridge: Arc<dyn PaymentBridge>,
    expected_chain_id: Option<u64>,
    state: WalletState,
}

impl WalletConnection {
    pub fn new(bridge: Arc<dyn PaymentBridge>, expected_chain_id: Option<u64>) -> Self {
        Self {
            bridge,
            expected_chain_id,
            state: WalletState::Uninitialized,
        }
    }

    pub fn state(&self) -> &WalletState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, WalletState::Ready { .. })
    }

    pub fn account(&self) -> Option<&str> {
        match &self.state {
            WalletState::Ready { account, .. } => Some(account),
            _ => None,
        }
    }

    /// Requests accounts and checks the network. Ends in `Ready` or `Error`.
    pub async fn connect(&mut self) -> MarketResult<()> {
        self.state = WalletState::Connecting;
        match self.establish().await {
            Ok((account, chain_id)) => {
                tracing::info!(%account, chain_id, "wallet connected");
                self.state = WalletState::Ready { account, chain_id };
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "wallet connection failed");
                self.state = WalletState::Error(err.to_string());
                Err(MarketError::wallet_not_ready(self.state.to_string()))
            }
        }
    }

    async fn establish(&self) -> Result<(String, u64), BridgeError> {
        let accounts = self.bridge.request_accounts().await?;
        let account = accounts.into_iter().next().ok_or(BridgeError::NoAccounts)?;

        let network = self.bridge.get_network().await?;
        if let Some(expected) = self.expected_chain_id {
            if network.chain_id != expected {
                return Err(BridgeError::WrongNetwork {
                    expected,
                    actual: network.chain_id,
                });
            }
        }
        Ok((account, network.chain_id))
    }

    pub fn disconnect(&mut self) {
        if self.state != WalletState::Disconnected {
            tracing::info!("wallet disconnected");
        }
        self.state = WalletState::Disconnected;
    }

    /// The bridge and active account, or `WalletNotReady` outside the `Ready` state.
    pub fn ready_handle(&self) -> MarketResult<(Arc<dyn PaymentBridge>, String)> {
        match &self.state {
            WalletState::Ready { account, .. } => Ok((Arc::clone(&self.bridge), account.clone())),
            other => Err(MarketError::wallet_not_ready(other.to_string())),
        }
    }
}

/// Converts a store identifier into the integer form the ledger contract expects.
///
/// Only the canonical decimal form is accepted, so two distinct ids can never map to
/// the same ledger integer.
pub fn to_ledger_id(id: &str) -> MarketResult<u64> {
    match id.parse::<u64>() {
        Ok(n) if n.to_string() == id => Ok(n),
        _ => Err(MarketError::UnsupportedIdentifier { id: id.to_string() }),
    }
}

const WEI_PER_ETHER: i64 = 1_000_000_000_000_000_000;

/// Converts an ether-denominated price to wei.
pub fn ether_to_wei(price: Decimal) -> MarketResult<u128> {
    if price.is_sign_negative() {
        return Err(MarketError::invalid_price(format!("{price} is negative")));
    }
    let wei = price
        .checked_mul(Decimal::from(WEI_PER_ETHER))
        .ok_or_else(|| MarketError::invalid_price(format!("{price} is too large")))?;
    if !wei.fract().is_zero() {
        return Err(MarketError::invalid_price(format!(
            "{price} is not a whole number of wei"
        )));
    }
    wei.to_u128()
        .ok_or_else(|| MarketError::invalid_price(format!("{price} does not fit in wei")))
}

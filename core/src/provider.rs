//! Wallet provider seam
//!
//! The provider owns account selection and key custody. The client only
//! asks it for accounts, for a signer bound to one account, and for change
//! notifications.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::address::Address;
use crate::rpc::{decode_hex, decode_quantity, encode_hex, encode_quantity, RpcClient, RpcError};

/// Buffered provider events per subscriber
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Change notification from the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("No wallet provider available")]
    Unavailable,

    #[error("Request rejected by user")]
    UserRejected,

    #[error("Provider error: {0}")]
    Other(String),
}

impl From<RpcError> for ProviderError {
    fn from(err: RpcError) -> Self {
        if err.is_user_rejection() {
            ProviderError::UserRejected
        } else if err.is_transport() {
            ProviderError::Unavailable
        } else {
            ProviderError::Other(err.to_string())
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self)
    }
}

impl TxHash {
    pub fn parse(s: &str) -> Result<Self, RpcError> {
        let bytes = decode_hex(s)?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| RpcError::InvalidResponse(format!("bad transaction hash {:?}", s)))?;
        Ok(TxHash(hash))
    }
}

/// Mined transaction outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
}

/// Signing capability bound to one account
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    /// Read-only call; `block` of `None` means latest
    async fn call(&self, to: Address, data: Vec<u8>, block: Option<u64>)
        -> Result<Vec<u8>, RpcError>;

    async fn send_transaction(&self, to: Address, data: Vec<u8>) -> Result<TxHash, RpcError>;

    /// `None` while the transaction is still pending
    async fn receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, RpcError>;
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Prompt for account access; the first entry is the active account
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    async fn chain_id(&self) -> Result<u64, ProviderError>;

    fn signer(&self, account: Address) -> Result<Arc<dyn Signer>, ProviderError>;

    /// Fresh receiver for account/network change notifications
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}

/// One owned listener on a provider's change notifications.
///
/// Dropping or detaching it stops the listener, so a session holding at most
/// one of these can never accumulate duplicate handlers across reconnects.
pub struct ProviderSubscription {
    handle: Option<JoinHandle<()>>,
}

impl ProviderSubscription {
    pub fn attach<F, Fut>(mut events: broadcast::Receiver<ProviderEvent>, handler: F) -> Self
    where
        F: Fn(ProviderEvent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => handler(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("⚠️ Provider listener lagged, {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Self {
            handle: Some(handle),
        }
    }

    pub fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_attached(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ProviderSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

// ============================================================================
// JSON-RPC provider
// ============================================================================

/// Wallet provider backed by a JSON-RPC endpoint that holds the keys
/// (a local node with unlocked accounts, or a signing proxy).
///
/// The endpoint cannot push events over HTTP, so a watcher task polls
/// `eth_accounts` and `eth_chainId` and broadcasts differences.
pub struct RpcWalletProvider {
    rpc: RpcClient,
    events: broadcast::Sender<ProviderEvent>,
    watcher: Option<JoinHandle<()>>,
}

impl RpcWalletProvider {
    /// Must be called inside a tokio runtime (spawns the watcher)
    pub fn new(rpc: RpcClient, poll_interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let watcher = tokio::spawn(watch_provider(rpc.clone(), events.clone(), poll_interval));
        Self {
            rpc,
            events,
            watcher: Some(watcher),
        }
    }
}

impl Drop for RpcWalletProvider {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

async fn watch_provider(
    rpc: RpcClient,
    events: broadcast::Sender<ProviderEvent>,
    poll_interval: Duration,
) {
    let mut last_accounts: Option<Vec<Address>> = None;
    let mut last_chain: Option<u64> = None;

    loop {
        tokio::time::sleep(poll_interval).await;

        match rpc.request::<_, Vec<Address>>("eth_accounts", json!([])).await {
            Ok(accounts) => {
                if last_accounts.as_ref().is_some_and(|prev| *prev != accounts) {
                    log::info!("🔄 Accounts changed ({} available)", accounts.len());
                    let _ = events.send(ProviderEvent::AccountsChanged(accounts.clone()));
                }
                last_accounts = Some(accounts);
            }
            Err(e) => log::debug!("Account poll failed: {}", e),
        }

        match rpc.request::<_, String>("eth_chainId", json!([])).await {
            Ok(raw) => match decode_quantity(&raw) {
                Ok(chain_id) => {
                    if last_chain.is_some_and(|prev| prev != chain_id) {
                        log::warn!("⚠️ Network changed to chain {}", chain_id);
                        let _ = events.send(ProviderEvent::ChainChanged(chain_id));
                    }
                    last_chain = Some(chain_id);
                }
                Err(e) => log::debug!("Chain poll returned garbage: {}", e),
            },
            Err(e) => log::debug!("Chain poll failed: {}", e),
        }
    }
}

#[async_trait]
impl WalletProvider for RpcWalletProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        match self
            .rpc
            .request::<_, Vec<Address>>("eth_requestAccounts", json!([]))
            .await
        {
            Ok(accounts) => Ok(accounts),
            // plain nodes expose unlocked accounts without a permission prompt
            Err(e) if e.is_method_not_found() => Ok(self
                .rpc
                .request::<_, Vec<Address>>("eth_accounts", json!([]))
                .await?),
            Err(e) => Err(e.into()),
        }
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        let raw: String = self.rpc.request("eth_chainId", json!([])).await?;
        Ok(decode_quantity(&raw)?)
    }

    fn signer(&self, account: Address) -> Result<Arc<dyn Signer>, ProviderError> {
        Ok(Arc::new(RpcSigner {
            rpc: self.rpc.clone(),
            account,
        }))
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

/// Signer that delegates signing to the RPC endpoint
pub struct RpcSigner {
    rpc: RpcClient,
    account: Address,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    status: Option<String>,
}

#[async_trait]
impl Signer for RpcSigner {
    fn address(&self) -> Address {
        self.account
    }

    async fn call(
        &self,
        to: Address,
        data: Vec<u8>,
        block: Option<u64>,
    ) -> Result<Vec<u8>, RpcError> {
        let tag = block.map(encode_quantity).unwrap_or_else(|| "latest".to_string());
        let tx = json!({
            "from": self.account.to_hex(),
            "to": to.to_hex(),
            "data": encode_hex(&data),
        });
        let raw: String = self.rpc.request("eth_call", json!([tx, tag])).await?;
        decode_hex(&raw)
    }

    async fn send_transaction(&self, to: Address, data: Vec<u8>) -> Result<TxHash, RpcError> {
        let tx = json!({
            "from": self.account.to_hex(),
            "to": to.to_hex(),
            "data": encode_hex(&data),
        });
        let raw: String = self.rpc.request("eth_sendTransaction", json!([tx])).await?;
        TxHash::parse(&raw)
    }

    async fn receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, RpcError> {
        let raw: Option<RawReceipt> = self
            .rpc
            .request("eth_getTransactionReceipt", json!([hash.to_string()]))
            .await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        // mined receipts always carry a block number; pending-tagged ones do not
        let Some(block) = raw.block_number else {
            return Ok(None);
        };
        let status = raw.status.as_deref().map(decode_quantity).transpose()?;
        Ok(Some(Receipt {
            tx_hash: TxHash::parse(&raw.transaction_hash)?,
            block_number: decode_quantity(&block)?,
            success: status.unwrap_or(1) == 1,
        }))
    }
}

//! Session manager
//!
//! Tracks the connected account, its network and the ledger binding built
//! for it. Every identity change (connect, account switch, account loss,
//! network change) bumps the session epoch; downstream caches key their
//! results on that epoch and drop anything computed for an older one.

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::address::Address;
use crate::error::{ClientError, Result};
use crate::ledger::{Ledger, LedgerBinder};
use crate::provider::{ProviderEvent, ProviderSubscription, WalletProvider};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Never connected
    NotConnected,
    /// The provider reported no accounts
    AccountsCleared,
    /// The provider switched networks; the binding is no longer valid
    NetworkChanged { chain_id: u64 },
    Failed(String),
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::NotConnected => write!(f, "not connected"),
            DisconnectReason::AccountsCleared => write!(f, "wallet disconnected"),
            DisconnectReason::NetworkChanged { chain_id } => {
                write!(f, "network changed to chain {}", chain_id)
            }
            DisconnectReason::Failed(reason) => write!(f, "{}", reason),
            DisconnectReason::Shutdown => write!(f, "shut down"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected { reason: DisconnectReason },
    Connecting,
    Connected { account: Address, chain_id: u64 },
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected { .. })
    }

    pub fn account(&self) -> Option<Address> {
        match self {
            SessionState::Connected { account, .. } => Some(*account),
            _ => None,
        }
    }
}

/// What the watch channel publishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub epoch: u64,
    pub state: SessionState,
}

/// A connected session as seen at one instant
#[derive(Clone)]
pub struct BoundSession {
    pub epoch: u64,
    pub account: Address,
    pub chain_id: u64,
    pub ledger: Arc<dyn Ledger>,
}

impl fmt::Debug for BoundSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundSession")
            .field("epoch", &self.epoch)
            .field("account", &self.account)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

struct Binding {
    epoch: u64,
    state: SessionState,
    /// Last chain seen from the provider, kept across account loss
    chain_id: Option<u64>,
    ledger: Option<Arc<dyn Ledger>>,
}

pub struct SessionManager {
    provider: Arc<dyn WalletProvider>,
    binder: Arc<dyn LedgerBinder>,
    expected_chain_id: Option<u64>,
    binding: RwLock<Binding>,
    subscription: Mutex<Option<ProviderSubscription>>,
    changes: watch::Sender<SessionSnapshot>,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn WalletProvider>,
        binder: Arc<dyn LedgerBinder>,
        expected_chain_id: Option<u64>,
    ) -> Arc<Self> {
        let state = SessionState::Disconnected {
            reason: DisconnectReason::NotConnected,
        };
        let (changes, _) = watch::channel(SessionSnapshot {
            epoch: 0,
            state: state.clone(),
        });
        Arc::new(Self {
            provider,
            binder,
            expected_chain_id,
            binding: RwLock::new(Binding {
                epoch: 0,
                state,
                chain_id: None,
                ledger: None,
            }),
            subscription: Mutex::new(None),
            changes,
        })
    }

    /// Request account access and bind a ledger for the first account.
    ///
    /// Replaces any existing binding and provider subscription.
    pub async fn connect(self: &Arc<Self>) -> Result<SessionSnapshot> {
        self.set_state(SessionState::Connecting);
        log::info!("🔌 Connecting to wallet provider...");

        match self.establish().await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                log::error!("❌ Connection failed: {}", e);
                self.drop_to(DisconnectReason::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn establish(self: &Arc<Self>) -> Result<SessionSnapshot> {
        let accounts = self.provider.request_accounts().await?;
        let account = *accounts
            .first()
            .ok_or_else(|| ClientError::Provider("No accounts available".to_string()))?;

        let chain_id = self.provider.chain_id().await?;
        if let Some(expected) = self.expected_chain_id {
            if expected != chain_id {
                return Err(ClientError::Provider(format!(
                    "wrong network: expected chain {}, provider is on {}",
                    expected, chain_id
                )));
            }
        }

        let signer = self.provider.signer(account)?;
        let ledger = self.binder.bind(signer);

        // subscribe before publishing so no change between bind and listen is lost
        let weak = Arc::downgrade(self);
        let subscription = ProviderSubscription::attach(self.provider.subscribe(), move |event| {
            let weak = weak.clone();
            async move {
                if let Some(session) = weak.upgrade() {
                    session.handle_event(event).await;
                }
            }
        });
        // the previous listener (if any) is dropped and detached here
        *self.subscription.lock() = Some(subscription);

        let snapshot = self.bind(account, chain_id, ledger);
        log::info!("✅ Connected as {} on chain {}", account, chain_id);
        Ok(snapshot)
    }

    /// React to one provider notification
    pub async fn handle_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                None => {
                    log::warn!("⚠️ Wallet reported no accounts, disconnecting");
                    self.drop_to(DisconnectReason::AccountsCleared);
                }
                Some(&account) => {
                    if self.account() == Some(account) {
                        return;
                    }
                    if let Err(e) = self.rebind(account).await {
                        log::error!("❌ Failed to switch to {}: {}", account, e);
                        self.drop_to(DisconnectReason::Failed(e.to_string()));
                    }
                }
            },
            ProviderEvent::ChainChanged(chain_id) => {
                log::warn!("⚠️ Network changed to chain {}, session dropped", chain_id);
                {
                    self.binding.write().chain_id = Some(chain_id);
                }
                self.drop_to(DisconnectReason::NetworkChanged { chain_id });
            }
        }
    }

    async fn rebind(&self, account: Address) -> Result<()> {
        let known_chain = self.binding.read().chain_id;
        let chain_id = match known_chain {
            Some(id) => id,
            None => self.provider.chain_id().await?,
        };
        let signer = self.provider.signer(account)?;
        let ledger = self.binder.bind(signer);
        self.bind(account, chain_id, ledger);
        log::info!("🔄 Switched account to {}", account);
        Ok(())
    }

    fn bind(&self, account: Address, chain_id: u64, ledger: Arc<dyn Ledger>) -> SessionSnapshot {
        let mut binding = self.binding.write();
        binding.epoch += 1;
        binding.state = SessionState::Connected { account, chain_id };
        binding.chain_id = Some(chain_id);
        binding.ledger = Some(ledger);
        let snapshot = SessionSnapshot {
            epoch: binding.epoch,
            state: binding.state.clone(),
        };
        self.changes.send_replace(snapshot.clone());
        snapshot
    }

    fn drop_to(&self, reason: DisconnectReason) {
        let mut binding = self.binding.write();
        let was_bound = binding.ledger.take().is_some();
        binding.state = SessionState::Disconnected { reason };
        if was_bound {
            binding.epoch += 1;
        }
        self.changes.send_replace(SessionSnapshot {
            epoch: binding.epoch,
            state: binding.state.clone(),
        });
    }

    fn set_state(&self, state: SessionState) {
        let mut binding = self.binding.write();
        binding.state = state;
        self.changes.send_replace(SessionSnapshot {
            epoch: binding.epoch,
            state: binding.state.clone(),
        });
    }

    /// Stop listening to the provider and drop the binding
    pub fn shutdown(&self) {
        if let Some(mut subscription) = self.subscription.lock().take() {
            subscription.detach();
        }
        self.drop_to(DisconnectReason::Shutdown);
        log::info!("🛑 Session shut down");
    }

    pub fn current(&self) -> Option<BoundSession> {
        let binding = self.binding.read();
        match (&binding.state, &binding.ledger) {
            (SessionState::Connected { account, chain_id }, Some(ledger)) => Some(BoundSession {
                epoch: binding.epoch,
                account: *account,
                chain_id: *chain_id,
                ledger: ledger.clone(),
            }),
            _ => None,
        }
    }

    pub fn require(&self) -> Result<BoundSession> {
        self.current().ok_or(ClientError::NotConnected)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let binding = self.binding.read();
        SessionSnapshot {
            epoch: binding.epoch,
            state: binding.state.clone(),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.binding.read().epoch
    }

    pub fn account(&self) -> Option<Address> {
        self.binding.read().state.account()
    }

    pub fn is_listening(&self) -> bool {
        self.subscription
            .lock()
            .as_ref()
            .is_some_and(|s| s.is_attached())
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.changes.subscribe()
    }
}

//! Client facade
//!
//! Wires the session, directory, selected view, gateway and notifier into
//! one dependency graph: a session change invalidates the directory and the
//! view, then reloads them in that order.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::{AdminPolicy, ClientConfig};
use crate::directory::{ElectionDirectory, RefreshOutcome};
use crate::error::{ClientError, Result};
use crate::gateway::{ActionGateway, Clock, SystemClock};
use crate::guard::Capabilities;
use crate::ledger::{ContractBinder, LedgerBinder};
use crate::model::{Election, ElectionSnapshot};
use crate::notify::{Level, Notifier, CONFIG_ERROR_TTL};
use crate::provider::{RpcWalletProvider, WalletProvider};
use crate::rpc::RpcClient;
use crate::session::{DisconnectReason, SessionManager, SessionState};
use crate::view::{ElectionView, Selection};

#[derive(Clone)]
pub struct ClientOptions {
    pub admin_policy: AdminPolicy,
    pub expected_chain_id: Option<u64>,
    pub clock: Arc<dyn Clock>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            admin_policy: AdminPolicy::default(),
            expected_chain_id: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl ClientOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            admin_policy: config.admin_policy,
            expected_chain_id: config.expected_chain_id,
            ..Self::default()
        }
    }
}

pub struct ElectionClient {
    session: Arc<SessionManager>,
    directory: Arc<ElectionDirectory>,
    view: Arc<ElectionView>,
    selection: Arc<Selection>,
    notifier: Arc<Notifier>,
    gateway: ActionGateway,
    /// Last session epoch the directory and view were rebuilt for
    synced_epoch: AtomicU64,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl ElectionClient {
    pub fn new(
        provider: Arc<dyn WalletProvider>,
        binder: Arc<dyn LedgerBinder>,
        options: ClientOptions,
        notifier: Arc<Notifier>,
    ) -> Arc<Self> {
        let session = SessionManager::new(provider, binder, options.expected_chain_id);
        let directory = Arc::new(ElectionDirectory::new());
        let view = Arc::new(ElectionView::new());
        let selection = Arc::new(Selection::new());
        let gateway = ActionGateway::new(
            session.clone(),
            directory.clone(),
            view.clone(),
            selection.clone(),
            notifier.clone(),
            options.clock,
            options.admin_policy,
        );
        Arc::new(Self {
            session,
            directory,
            view,
            selection,
            notifier,
            gateway,
            synced_epoch: AtomicU64::new(0),
            sync_task: Mutex::new(None),
        })
    }

    /// Build a client against the configured JSON-RPC endpoint and contract.
    ///
    /// Must run inside a tokio runtime. A missing contract address is also
    /// pushed to `notifier` with the longer configuration-error lifetime.
    pub fn from_config(config: &ClientConfig, notifier: Arc<Notifier>) -> Result<Arc<Self>> {
        let contract = match config.contract() {
            Ok(contract) => contract,
            Err(e) => {
                notifier.push_for(Level::Error, e.to_string(), CONFIG_ERROR_TTL);
                return Err(e.into());
            }
        };
        let rpc = RpcClient::new(config.rpc_url.clone())
            .map_err(|e| ClientError::Provider(e.to_string()))?;
        let provider = Arc::new(RpcWalletProvider::new(rpc, config.provider_poll_interval()));
        let binder = Arc::new(ContractBinder::new(
            contract,
            config.schema.clone(),
            config.receipt_poll_interval(),
        ));
        Ok(Self::new(
            provider,
            binder,
            ClientOptions::from_config(config),
            notifier,
        ))
    }

    /// Connect the wallet and load everything for the new session
    pub async fn connect(&self) -> Result<()> {
        if let Err(e) = self.session.connect().await {
            self.notifier.error(format!("Failed to connect wallet: {}", e));
            return Err(e);
        }
        self.sync_session().await
    }

    /// Rebuild the directory and view if the session epoch moved since the
    /// last rebuild. Cheap no-op otherwise.
    pub async fn sync_session(&self) -> Result<()> {
        let epoch = self.session.epoch();
        if self.synced_epoch.swap(epoch, Ordering::SeqCst) == epoch {
            return Ok(());
        }
        log::debug!("Session epoch {}, rebuilding state", epoch);
        self.directory.invalidate();
        self.view.invalidate();

        if !self.session.snapshot().state.is_connected() {
            return Ok(());
        }
        self.refresh_all().await
    }

    /// Reload the directory, apply the default selection, reload the view
    pub async fn refresh_all(&self) -> Result<()> {
        if let Err(e) = self.directory.refresh_all(&self.session).await {
            self.notifier.error(e.to_string());
            return Err(e);
        }
        if let Some(id) = self.selection.select_default(&self.directory) {
            log::info!("📌 Selected election {}", id);
        }
        self.refresh_selected().await.map(|_| ())
    }

    pub async fn select(&self, election_id: u64) -> Result<RefreshOutcome> {
        self.selection.set(election_id);
        self.refresh_selected().await
    }

    pub async fn refresh_selected(&self) -> Result<RefreshOutcome> {
        let selected = self.selection.get();
        match self
            .view
            .refresh(selected, &self.session, &self.selection)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.notifier.error(format!("Error loading election details: {}", e));
                Err(e)
            }
        }
    }

    /// Network changes invalidate the whole binding: forget the selection,
    /// reconnect and load everything again
    pub async fn reload(&self) -> Result<()> {
        self.notifier.warning("Network changed, reloading...");
        self.selection.clear();
        self.directory.invalidate();
        self.view.invalidate();
        self.connect().await
    }

    /// Follow session changes in the background until [`Self::shutdown`]
    pub fn spawn_sync(self: &Arc<Self>) {
        let mut changes = self.session.watch();
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let snapshot = changes.borrow_and_update().clone();
                let Some(client) = weak.upgrade() else { break };
                // failures were already reported through the notifier
                let _ = match snapshot.state {
                    SessionState::Connecting => Ok(()),
                    SessionState::Disconnected {
                        reason: DisconnectReason::NetworkChanged { .. },
                    } => client.reload().await,
                    _ => client.sync_session().await,
                };
            }
        });
        if let Some(previous) = self.sync_task.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn shutdown(&self) {
        if let Some(task) = self.sync_task.lock().take() {
            task.abort();
        }
        self.session.shutdown();
    }

    pub fn capabilities(&self) -> Capabilities {
        self.gateway.capabilities()
    }

    pub fn gateway(&self) -> &ActionGateway {
        &self.gateway
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn elections(&self) -> Vec<Election> {
        self.directory.elections()
    }

    pub fn is_admin(&self) -> bool {
        self.directory.is_admin(self.session.epoch())
    }

    pub fn directory(&self) -> &ElectionDirectory {
        &self.directory
    }

    pub fn selected(&self) -> u64 {
        self.selection.get()
    }

    /// Selected election as read for the current session
    pub fn snapshot(&self) -> Option<ElectionSnapshot> {
        self.view.current(self.session.epoch(), self.selection.get())
    }
}

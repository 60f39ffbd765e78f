//! Election directory
//!
//! The full election list plus the deployer identity derived from it.
//! Refreshes replace the list wholesale; a failed refresh leaves the
//! previous list in place.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::address::Address;
use crate::error::{ClientError, Result};
use crate::model::Election;
use crate::session::{BoundSession, SessionManager};

/// Result of a refresh that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated,
    Cleared,
    /// Superseded by a newer session or request; nothing was written
    Stale,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryState {
    /// Ascending id
    pub elections: Vec<Election>,
    pub deployer: Option<Address>,
    /// Connected account is the contract deployer
    pub is_admin: bool,
    /// Session epoch the list was read under
    pub epoch: u64,
}

#[derive(Default)]
struct Inner {
    state: DirectoryState,
    last_ticket: u64,
}

#[derive(Default)]
pub struct ElectionDirectory {
    inner: RwLock<Inner>,
    tickets: AtomicU64,
}

impl ElectionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-read the deployer and every election
    pub async fn refresh_all(&self, session: &SessionManager) -> Result<RefreshOutcome> {
        let bound = session.require()?;
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;

        let loaded = match load(&bound).await {
            Ok(loaded) => loaded,
            Err(e) => {
                if session.epoch() != bound.epoch {
                    return Ok(RefreshOutcome::Stale);
                }
                log::debug!("Election list read failed: {}", e);
                return Err(ClientError::DirectoryUnavailable(e.to_string()));
            }
        };

        let mut inner = self.inner.write();
        if session.epoch() != bound.epoch || ticket <= inner.last_ticket {
            log::debug!("Dropping stale election list (ticket {})", ticket);
            return Ok(RefreshOutcome::Stale);
        }
        let (deployer, elections) = loaded;
        log::info!(
            "📋 Loaded {} election(s), deployer {}",
            elections.len(),
            deployer
        );
        inner.last_ticket = ticket;
        inner.state = DirectoryState {
            is_admin: bound.account == deployer,
            deployer: Some(deployer),
            elections,
            epoch: bound.epoch,
        };
        Ok(RefreshOutcome::Updated)
    }

    pub fn invalidate(&self) {
        self.inner.write().state = DirectoryState::default();
    }

    pub fn state(&self) -> DirectoryState {
        self.inner.read().state.clone()
    }

    pub fn elections(&self) -> Vec<Election> {
        self.inner.read().state.elections.clone()
    }

    pub fn deployer(&self) -> Option<Address> {
        self.inner.read().state.deployer
    }

    /// Deployer as read under session `epoch`; unknown once the session
    /// has moved on
    pub fn deployer_at(&self, epoch: u64) -> Option<Address> {
        let inner = self.inner.read();
        inner.state.deployer.filter(|_| inner.state.epoch == epoch)
    }

    /// Admin flag for the account of session `epoch`. A flag computed for an
    /// earlier account reads as false.
    pub fn is_admin(&self, epoch: u64) -> bool {
        let inner = self.inner.read();
        inner.state.epoch == epoch && inner.state.is_admin
    }

    pub fn contains(&self, election_id: u64) -> bool {
        self.inner
            .read()
            .state
            .elections
            .iter()
            .any(|e| e.id == election_id)
    }

    /// Newest election, if any
    pub fn default_selection(&self) -> Option<u64> {
        self.inner.read().state.elections.iter().map(|e| e.id).max()
    }
}

async fn load(bound: &BoundSession) -> crate::ledger::Result<(Address, Vec<Election>)> {
    let deployer = bound.ledger.deployer().await?;
    let count = bound.ledger.election_count().await?;

    // count comes from the ledger; grow as reads succeed
    let mut elections = Vec::new();
    for id in 1..=count {
        elections.push(bound.ledger.election(id).await?);
    }
    Ok((deployer, elections))
}

//! Selected election view
//!
//! Hydrates one election for the connected account: details, live
//! candidates, the recomputed total, the caller's own voter record and the
//! authorized-voter roster.
//!
//! Every refresh is keyed by `(session epoch, election id)` and carries a
//! ticket. A result commits only while its key is still current and no newer
//! refresh has committed, so switching elections or accounts mid-flight can
//! never let an older answer overwrite a newer one.

use futures::future::try_join_all;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::address::Address;
use crate::directory::{ElectionDirectory, RefreshOutcome};
use crate::error::Result;
use crate::ledger::{self, Ledger};
use crate::model::{Candidate, ElectionSnapshot, Roster, RosterEntry};
use crate::session::{BoundSession, SessionManager};

/// Currently selected election id, 0 for none
#[derive(Debug, Default)]
pub struct Selection(AtomicU64);

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, election_id: u64) {
        self.0.store(election_id, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.set(0);
    }

    /// Select the newest election when nothing is selected. Returns the id
    /// if the selection changed.
    pub fn select_default(&self, directory: &ElectionDirectory) -> Option<u64> {
        let newest = directory.default_selection()?;
        self.0
            .compare_exchange(0, newest, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| newest)
    }
}

#[derive(Default)]
struct Inner {
    snapshot: Option<ElectionSnapshot>,
    /// `(epoch, election id)` the snapshot was read under
    key: Option<(u64, u64)>,
    last_ticket: u64,
}

#[derive(Default)]
pub struct ElectionView {
    inner: RwLock<Inner>,
    tickets: AtomicU64,
}

impl ElectionView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn refresh(
        &self,
        election_id: u64,
        session: &SessionManager,
        selection: &Selection,
    ) -> Result<RefreshOutcome> {
        let bound = match session.current() {
            Some(bound) if election_id != 0 => bound,
            _ => {
                self.invalidate();
                return Ok(RefreshOutcome::Cleared);
            }
        };
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let key = (bound.epoch, election_id);
        let is_current = || session.epoch() == key.0 && selection.get() == key.1;

        let snapshot = match hydrate(&bound, election_id).await {
            Ok(snapshot) => snapshot,
            Err(_) if !is_current() => return Ok(RefreshOutcome::Stale),
            Err(e) => {
                log::debug!("Election {} read failed: {}", election_id, e);
                return Err(e.into());
            }
        };

        let mut inner = self.inner.write();
        if !is_current() || ticket <= inner.last_ticket {
            log::debug!(
                "Dropping stale snapshot of election {} (ticket {})",
                election_id,
                ticket
            );
            return Ok(RefreshOutcome::Stale);
        }
        inner.last_ticket = ticket;
        inner.key = Some(key);
        inner.snapshot = Some(snapshot);
        Ok(RefreshOutcome::Updated)
    }

    pub fn invalidate(&self) {
        let mut inner = self.inner.write();
        inner.snapshot = None;
        inner.key = None;
    }

    /// The snapshot only if it was read for `election_id` under session
    /// `epoch`
    pub fn current(&self, epoch: u64, election_id: u64) -> Option<ElectionSnapshot> {
        let inner = self.inner.read();
        match inner.key {
            Some(key) if key == (epoch, election_id) => inner.snapshot.clone(),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<(u64, u64)> {
        self.inner.read().key
    }
}

async fn hydrate(bound: &BoundSession, election_id: u64) -> ledger::Result<ElectionSnapshot> {
    let ledger = bound.ledger.as_ref();
    let election = ledger.election(election_id).await?;

    let (candidates, voter, roster) = futures::join!(
        live_candidates(ledger, election_id),
        ledger.voter(election_id, bound.account),
        roster(ledger, election_id),
    );
    let candidates = candidates?;
    let voter = voter?;

    let total_votes = candidates
        .iter()
        .try_fold(0u64, |total, c| total.checked_add(c.vote_count))
        .ok_or_else(|| {
            ledger::LedgerError::Decode(format!(
                "vote total of election {} overflows",
                election_id
            ))
        })?;
    Ok(ElectionSnapshot {
        election,
        candidates,
        total_votes,
        voter,
        roster,
    })
}

async fn live_candidates(ledger: &dyn Ledger, election_id: u64) -> ledger::Result<Vec<Candidate>> {
    let ids = ledger.candidate_ids(election_id).await?;
    let fetched = try_join_all(ids.iter().map(|&id| ledger.candidate(election_id, id))).await?;

    let mut live: Vec<Candidate> = fetched.into_iter().filter(|c| c.exists).collect();
    live.sort_by_key(|c| c.id);
    Ok(live)
}

async fn roster(ledger: &dyn Ledger, election_id: u64) -> Roster {
    match roster_entries(ledger, election_id).await {
        Ok(entries) => Roster::Loaded(entries),
        Err(e) => {
            log::warn!("⚠️ Voter roster for election {} unavailable: {}", election_id, e);
            Roster::Unavailable(e.to_string())
        }
    }
}

async fn roster_entries(ledger: &dyn Ledger, election_id: u64) -> ledger::Result<Vec<RosterEntry>> {
    let addresses: Vec<Address> = ledger.authorized_voters(election_id).await?;
    let records = try_join_all(addresses.iter().map(|&a| ledger.voter(election_id, a))).await?;
    Ok(addresses
        .into_iter()
        .zip(records)
        .map(|(address, record)| RosterEntry { address, record })
        .collect())
}

//! Action gateway
//!
//! Every state-changing ledger call goes through here: guard, submit, wait
//! for the receipt, then refresh only what the write could have changed.
//! Outcomes are reported through the notifier exactly once.

use chrono::Utc;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::AdminPolicy;
use crate::directory::ElectionDirectory;
use crate::error::{ClientError, PreconditionViolation, Result};
use crate::guard::{Capabilities, GuardContext};
use crate::ledger::LedgerCall;
use crate::notify::Notifier;
use crate::provider::Receipt;
use crate::session::SessionManager;
use crate::view::{ElectionView, Selection};

/// Wall clock in unix seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Vote,
    AddCandidate,
    RemoveCandidate,
    AuthorizeVoter,
    RevokeAuthorization,
    CreateElection,
    StartElection,
    EndElection,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionKind::Vote => "vote",
            ActionKind::AddCandidate => "add candidate",
            ActionKind::RemoveCandidate => "remove candidate",
            ActionKind::AuthorizeVoter => "authorize voter",
            ActionKind::RevokeAuthorization => "revoke authorization",
            ActionKind::CreateElection => "create election",
            ActionKind::StartElection => "start election",
            ActionKind::EndElection => "end election",
        };
        f.write_str(label)
    }
}

/// A write that has been submitted and not yet resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightAction {
    pub id: u64,
    pub kind: ActionKind,
    /// 0 for actions not tied to one election
    pub election_id: u64,
}

#[derive(Default)]
struct InFlight {
    next_id: AtomicU64,
    actions: Mutex<Vec<InFlightAction>>,
}

impl InFlight {
    fn begin(&self, kind: ActionKind, election_id: u64) -> InFlightTicket<'_> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.actions.lock().push(InFlightAction {
            id,
            kind,
            election_id,
        });
        InFlightTicket { registry: self, id }
    }
}

/// Removes its action from the registry when dropped, however the write ends
struct InFlightTicket<'a> {
    registry: &'a InFlight,
    id: u64,
}

impl Drop for InFlightTicket<'_> {
    fn drop(&mut self) {
        self.registry.actions.lock().retain(|a| a.id != self.id);
    }
}

/// What to reload after a successful write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    View,
    Directory,
    Both,
}

struct Action {
    kind: ActionKind,
    election_id: u64,
    call: LedgerCall,
    pending: String,
    done: String,
    refresh: Refresh,
}

pub struct ActionGateway {
    session: Arc<SessionManager>,
    directory: Arc<ElectionDirectory>,
    view: Arc<ElectionView>,
    selection: Arc<Selection>,
    notifier: Arc<Notifier>,
    clock: Arc<dyn Clock>,
    policy: AdminPolicy,
    in_flight: InFlight,
}

impl ActionGateway {
    pub fn new(
        session: Arc<SessionManager>,
        directory: Arc<ElectionDirectory>,
        view: Arc<ElectionView>,
        selection: Arc<Selection>,
        notifier: Arc<Notifier>,
        clock: Arc<dyn Clock>,
        policy: AdminPolicy,
    ) -> Self {
        Self {
            session,
            directory,
            view,
            selection,
            notifier,
            clock,
            policy,
            in_flight: InFlight::default(),
        }
    }

    pub fn policy(&self) -> AdminPolicy {
        self.policy
    }

    fn with_context<R>(&self, check: impl FnOnce(&GuardContext<'_>) -> R) -> R {
        // cached state counts only if it was read for this session
        let session = self.session.snapshot();
        let selected = self.selection.get();
        let snapshot = self.view.current(session.epoch, selected);
        let ctx = GuardContext {
            account: session.state.account(),
            deployer: self.directory.deployer_at(session.epoch),
            selected,
            snapshot: snapshot.as_ref(),
            policy: self.policy,
            now: self.clock.now(),
        };
        check(&ctx)
    }

    fn guard<T>(&self, outcome: std::result::Result<T, PreconditionViolation>) -> Result<T> {
        outcome.map_err(|violation| {
            self.notifier.error(violation.to_string());
            ClientError::Precondition(violation)
        })
    }

    pub fn capabilities(&self) -> Capabilities {
        self.with_context(Capabilities::derive)
    }

    pub fn is_busy(&self) -> bool {
        !self.in_flight.actions.lock().is_empty()
    }

    pub fn pending(&self) -> Vec<InFlightAction> {
        self.in_flight.actions.lock().clone()
    }

    pub async fn vote(&self, candidate_id: u64) -> Result<Receipt> {
        let election_id = self.selection.get();
        self.guard(self.with_context(|ctx| ctx.check_vote(candidate_id)))?;
        self.execute(Action {
            kind: ActionKind::Vote,
            election_id,
            call: LedgerCall::Vote {
                election_id,
                candidate_id,
            },
            pending: "Casting vote...".to_string(),
            done: "Vote cast successfully!".to_string(),
            refresh: Refresh::View,
        })
        .await
    }

    pub async fn add_candidate(&self, name: &str) -> Result<Receipt> {
        let election_id = self.selection.get();
        let name = self.guard(self.with_context(|ctx| ctx.check_add_candidate(name)))?;
        self.execute(Action {
            kind: ActionKind::AddCandidate,
            election_id,
            pending: format!("Adding candidate \"{}\"...", name),
            done: format!("Candidate \"{}\" added", name),
            call: LedgerCall::AddCandidate { election_id, name },
            refresh: Refresh::View,
        })
        .await
    }

    pub async fn remove_candidate(&self, candidate_id: u64) -> Result<Receipt> {
        let election_id = self.selection.get();
        self.guard(self.with_context(|ctx| ctx.check_remove_candidate(candidate_id)))?;
        self.execute(Action {
            kind: ActionKind::RemoveCandidate,
            election_id,
            call: LedgerCall::RemoveCandidate {
                election_id,
                candidate_id,
            },
            pending: format!("Removing candidate {}...", candidate_id),
            done: format!("Candidate {} removed", candidate_id),
            refresh: Refresh::View,
        })
        .await
    }

    pub async fn authorize_voter(&self, voter: &str) -> Result<Receipt> {
        let election_id = self.selection.get();
        let voter = self.guard(self.with_context(|ctx| ctx.check_authorize(voter)))?;
        self.execute(Action {
            kind: ActionKind::AuthorizeVoter,
            election_id,
            call: LedgerCall::AuthorizeVoter { election_id, voter },
            pending: format!("Authorizing {}...", voter),
            done: format!("Voter {} authorized", voter),
            refresh: Refresh::View,
        })
        .await
    }

    pub async fn revoke_authorization(&self, voter: &str) -> Result<Receipt> {
        let election_id = self.selection.get();
        let voter = self.guard(self.with_context(|ctx| ctx.check_revoke(voter)))?;
        self.execute(Action {
            kind: ActionKind::RevokeAuthorization,
            election_id,
            call: LedgerCall::RevokeVoter { election_id, voter },
            pending: format!("Revoking authorization for {}...", voter),
            done: format!("Authorization revoked for {}", voter),
            refresh: Refresh::View,
        })
        .await
    }

    pub async fn create_election(&self, name: &str, start_time: i64, end_time: i64) -> Result<Receipt> {
        let name = self.guard(
            self.with_context(|ctx| ctx.check_create_election(name, start_time, end_time)),
        )?;
        self.execute(Action {
            kind: ActionKind::CreateElection,
            election_id: 0,
            pending: "Creating election...".to_string(),
            done: format!("Election \"{}\" created", name),
            call: LedgerCall::CreateElection {
                name,
                start_time,
                end_time,
            },
            refresh: Refresh::Directory,
        })
        .await
    }

    pub async fn start_election(&self) -> Result<Receipt> {
        let election_id = self.guard(self.with_context(|ctx| ctx.check_start()))?;
        self.execute(Action {
            kind: ActionKind::StartElection,
            election_id,
            call: LedgerCall::StartElection { election_id },
            pending: "Starting election...".to_string(),
            done: "Election started".to_string(),
            refresh: Refresh::Both,
        })
        .await
    }

    pub async fn end_election(&self) -> Result<Receipt> {
        let election_id = self.guard(self.with_context(|ctx| ctx.check_end()))?;
        self.execute(Action {
            kind: ActionKind::EndElection,
            election_id,
            call: LedgerCall::EndElection { election_id },
            pending: "Ending election...".to_string(),
            done: "Election ended".to_string(),
            refresh: Refresh::Both,
        })
        .await
    }

    async fn execute(&self, action: Action) -> Result<Receipt> {
        let Action {
            kind,
            election_id,
            call,
            pending,
            done,
            refresh,
        } = action;
        let bound = self.guard(
            self.session
                .current()
                .ok_or(PreconditionViolation::NotConnected),
        )?;

        let _ticket = self.in_flight.begin(kind, election_id);
        self.notifier.info(pending);

        let ledger = bound.ledger.as_ref();
        let written = async {
            let tx = ledger.submit(call).await?;
            log::info!("📤 {} submitted as {}", kind, tx.hash);
            tx.wait(ledger).await
        };
        let receipt = match written.await {
            Ok(receipt) => receipt,
            Err(e) => {
                let err = ClientError::from(e);
                self.notifier.error(err.to_string());
                return Err(err);
            }
        };
        self.notifier.success(done);

        if let Err(e) = self.refresh_after(refresh).await {
            self.notifier
                .warning(format!("{} succeeded but refresh failed: {}", kind, e));
        }
        Ok(receipt)
    }

    /// Directory and view reload independently; the first failure is
    /// returned after both have run
    async fn refresh_after(&self, refresh: Refresh) -> Result<()> {
        let mut listed = Ok(());
        if matches!(refresh, Refresh::Directory | Refresh::Both) {
            listed = self.directory.refresh_all(&self.session).await.map(|_| ());
            self.selection.select_default(&self.directory);
        }

        let selected = self.selection.get();
        let loaded = self.view.current(self.session.epoch(), selected).is_some();
        let mut viewed = Ok(());
        if matches!(refresh, Refresh::View | Refresh::Both) || !loaded {
            viewed = self
                .view
                .refresh(selected, &self.session, &self.selection)
                .await
                .map(|_| ());
        }
        listed.and(viewed)
    }
}

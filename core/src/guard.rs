//! Client-side preconditions for ledger writes
//!
//! These mirror the contract's own checks so obviously invalid actions never
//! cost a signature. The contract stays authoritative; passing a guard does
//! not mean the write will succeed.

use crate::address::Address;
use crate::config::AdminPolicy;
use crate::error::PreconditionViolation;
use crate::model::ElectionSnapshot;

pub type GuardResult<T> = std::result::Result<T, PreconditionViolation>;

/// Everything a guard looks at, captured at one instant
#[derive(Debug, Clone, Copy)]
pub struct GuardContext<'a> {
    pub account: Option<Address>,
    pub deployer: Option<Address>,
    /// Selected election id, 0 for none
    pub selected: u64,
    pub snapshot: Option<&'a ElectionSnapshot>,
    pub policy: AdminPolicy,
    /// Unix seconds
    pub now: i64,
}

impl<'a> GuardContext<'a> {
    fn account(&self) -> GuardResult<Address> {
        self.account.ok_or(PreconditionViolation::NotConnected)
    }

    fn loaded(&self) -> GuardResult<&'a ElectionSnapshot> {
        if self.selected == 0 {
            return Err(PreconditionViolation::NoElectionSelected);
        }
        match self.snapshot {
            Some(snapshot) if snapshot.election.id == self.selected => Ok(snapshot),
            _ => Err(PreconditionViolation::ElectionNotLoaded(self.selected)),
        }
    }

    fn is_deployer(&self) -> bool {
        matches!((self.account, self.deployer), (Some(a), Some(d)) if a == d)
    }

    fn is_election_admin(&self) -> bool {
        match (self.account, self.snapshot) {
            (Some(account), Some(snapshot)) => snapshot.election.admin == account,
            _ => false,
        }
    }

    /// Selected, loaded, caller administers it and it has not started
    fn editable(&self) -> GuardResult<&'a ElectionSnapshot> {
        self.account()?;
        let snapshot = self.loaded()?;
        if !self.is_election_admin() {
            return Err(PreconditionViolation::NotElectionAdmin);
        }
        if snapshot.election.is_locked() {
            return Err(PreconditionViolation::ElectionLocked);
        }
        Ok(snapshot)
    }

    fn lifecycle_admin(&self) -> GuardResult<&'a ElectionSnapshot> {
        self.account()?;
        let snapshot = self.loaded()?;
        match self.policy {
            AdminPolicy::ElectionAdmin if !self.is_election_admin() => {
                Err(PreconditionViolation::NotElectionAdmin)
            }
            AdminPolicy::Deployer if !self.is_deployer() => Err(PreconditionViolation::NotDeployer),
            _ => Ok(snapshot),
        }
    }

    /// Voting is open to the caller, regardless of candidate
    fn ballot(&self) -> GuardResult<&'a ElectionSnapshot> {
        self.account()?;
        let snapshot = self.loaded()?;
        if snapshot.voter.voted {
            return Err(PreconditionViolation::AlreadyVoted);
        }
        if !snapshot.voter.authorized {
            return Err(PreconditionViolation::NotAuthorized);
        }
        if !snapshot.election.is_active {
            return Err(PreconditionViolation::ElectionNotActive);
        }
        Ok(snapshot)
    }

    pub fn check_vote(&self, candidate_id: u64) -> GuardResult<()> {
        let snapshot = self.ballot()?;
        if snapshot.candidate(candidate_id).is_none() {
            return Err(PreconditionViolation::UnknownCandidate(candidate_id));
        }
        Ok(())
    }

    /// Returns the trimmed name
    pub fn check_add_candidate(&self, name: &str) -> GuardResult<String> {
        self.editable()?;
        non_empty(name, "Candidate name")
    }

    pub fn check_remove_candidate(&self, candidate_id: u64) -> GuardResult<()> {
        let snapshot = self.editable()?;
        if snapshot.candidate(candidate_id).is_none() {
            return Err(PreconditionViolation::UnknownCandidate(candidate_id));
        }
        Ok(())
    }

    pub fn check_authorize(&self, voter: &str) -> GuardResult<Address> {
        let snapshot = self.editable()?;
        let address = parse_voter(voter)?;
        let self_authorized = self.account == Some(address) && snapshot.voter.authorized;
        if snapshot.roster.contains(&address) || self_authorized {
            return Err(PreconditionViolation::AlreadyAuthorized(address));
        }
        Ok(address)
    }

    pub fn check_revoke(&self, voter: &str) -> GuardResult<Address> {
        self.editable()?;
        parse_voter(voter)
    }

    /// Returns the trimmed name
    pub fn check_create_election(&self, name: &str, start_time: i64, end_time: i64) -> GuardResult<String> {
        self.account()?;
        if !self.is_deployer() {
            return Err(PreconditionViolation::NotDeployer);
        }
        let name = non_empty(name, "Election name")?;
        if start_time <= self.now {
            return Err(PreconditionViolation::StartNotInFuture);
        }
        if end_time <= start_time {
            return Err(PreconditionViolation::EndBeforeStart);
        }
        Ok(name)
    }

    pub fn check_start(&self) -> GuardResult<u64> {
        let snapshot = self.lifecycle_admin()?;
        if snapshot.election.is_locked() {
            return Err(PreconditionViolation::ElectionLocked);
        }
        Ok(snapshot.election.id)
    }

    pub fn check_end(&self) -> GuardResult<u64> {
        let snapshot = self.lifecycle_admin()?;
        if !snapshot.election.is_active {
            return Err(PreconditionViolation::ElectionNotActive);
        }
        Ok(snapshot.election.id)
    }
}

fn non_empty(name: &str, what: &'static str) -> GuardResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(PreconditionViolation::EmptyName(what));
    }
    Ok(trimmed.to_string())
}

fn parse_voter(raw: &str) -> GuardResult<Address> {
    raw.trim()
        .parse()
        .map_err(|_| PreconditionViolation::InvalidAddress(raw.to_string()))
}

/// Which actions the presentation should offer right now
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub is_deployer: bool,
    pub is_election_admin: bool,
    pub can_vote: bool,
    pub can_add_candidate: bool,
    pub can_manage_voters: bool,
    pub can_start: bool,
    pub can_end: bool,
    pub can_create_election: bool,
}

impl Capabilities {
    pub fn derive(ctx: &GuardContext<'_>) -> Self {
        let editable = ctx.editable().is_ok();
        Capabilities {
            is_deployer: ctx.is_deployer(),
            is_election_admin: ctx.is_election_admin(),
            can_vote: ctx.ballot().is_ok(),
            can_add_candidate: editable,
            can_manage_voters: editable,
            can_start: ctx.check_start().is_ok(),
            can_end: ctx.check_end().is_ok(),
            can_create_election: ctx.account.is_some() && ctx.is_deployer(),
        }
    }
}

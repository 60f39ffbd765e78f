//! Election data model
//!
//! Read-only copies of ledger state. The ledger owns these records; the
//! client only ever holds what its last refresh returned.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::Address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    /// Contract-assigned, 1-based, monotonic
    pub id: u64,
    pub name: String,
    pub admin: Address,
    pub start_time: i64,
    pub end_time: i64,
    pub is_active: bool,
    pub is_completed: bool,
    pub candidate_count: u64,
    /// Denormalized total as stored by the contract. Display uses
    /// [`ElectionSnapshot::total_votes`] instead.
    pub total_votes_cast: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionStatus {
    Scheduled,
    Active,
    Completed,
}

impl Election {
    pub fn status(&self) -> ElectionStatus {
        if self.is_active {
            ElectionStatus::Active
        } else if self.is_completed {
            ElectionStatus::Completed
        } else {
            ElectionStatus::Scheduled
        }
    }

    /// Candidate and voter lists are frozen once voting opens
    pub fn is_locked(&self) -> bool {
        self.is_active || self.is_completed
    }

    pub fn voting_window(&self) -> String {
        format!(
            "{} to {}",
            format_timestamp(self.start_time),
            format_timestamp(self.end_time)
        )
    }
}

impl ElectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ElectionStatus::Scheduled => "Scheduled",
            ElectionStatus::Active => "Active",
            ElectionStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for ElectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Unix seconds as `YYYY-MM-DD HH:MM:SS UTC`; `N/A` for zero
pub fn format_timestamp(timestamp: i64) -> String {
    if timestamp == 0 {
        return "N/A".to_string();
    }
    match DateTime::from_timestamp(timestamp, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "N/A".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique within one election only
    pub id: u64,
    pub name: String,
    pub vote_count: u64,
    /// False once logically removed
    pub exists: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterRecord {
    pub authorized: bool,
    pub voted: bool,
    pub voted_candidate_id: u64,
}

impl VoterRecord {
    pub fn can_vote(&self) -> bool {
        self.authorized && !self.voted
    }

    pub fn status_line(&self) -> String {
        match (self.authorized, self.voted) {
            (_, true) => format!(
                "You have voted for candidate ID {}",
                self.voted_candidate_id
            ),
            (true, false) => {
                "You are authorized to vote. Please select a candidate.".to_string()
            }
            (false, false) => {
                "You are not authorized to vote. Please contact the election administrator."
                    .to_string()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub address: Address,
    pub record: VoterRecord,
}

/// Authorized-voter roster for admin display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Roster {
    Loaded(Vec<RosterEntry>),
    /// The roster fan-out failed; the rest of the snapshot is still valid
    Unavailable(String),
}

impl Roster {
    pub fn entries(&self) -> &[RosterEntry] {
        match self {
            Roster::Loaded(entries) => entries,
            Roster::Unavailable(_) => &[],
        }
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.entries().iter().any(|e| e.address == *address)
    }
}

/// Fully hydrated view of one election for the connected account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSnapshot {
    pub election: Election,
    /// Live candidates only, ascending id
    pub candidates: Vec<Candidate>,
    /// Sum of live candidates' vote counts
    pub total_votes: u64,
    pub voter: VoterRecord,
    pub roster: Roster,
}

impl ElectionSnapshot {
    pub fn candidate(&self, id: u64) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    /// Candidates ordered by vote count, highest first (ties by id)
    pub fn results(&self) -> Vec<&Candidate> {
        let mut ranked: Vec<&Candidate> = self.candidates.iter().collect();
        ranked.sort_by(|a, b| b.vote_count.cmp(&a.vote_count).then(a.id.cmp(&b.id)));
        ranked
    }

    /// Percentage of the total, 0 when nobody has voted
    pub fn vote_share(&self, candidate: &Candidate) -> f64 {
        if self.total_votes == 0 {
            return 0.0;
        }
        candidate.vote_count as f64 * 100.0 / self.total_votes as f64
    }
}

use thiserror::Error;

use crate::address::Address;
use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::provider::ProviderError;

/// A client-side guard refused an action before it reached the ledger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionViolation {
    #[error("Wallet is not connected")]
    NotConnected,

    #[error("No election selected")]
    NoElectionSelected,

    #[error("Election {0} is not loaded")]
    ElectionNotLoaded(u64),

    #[error("You are not authorized to vote in this election")]
    NotAuthorized,

    #[error("You have already voted in this election")]
    AlreadyVoted,

    #[error("Election is not active")]
    ElectionNotActive,

    #[error("Election has already started or ended")]
    ElectionLocked,

    #[error("Only the election admin can do this")]
    NotElectionAdmin,

    #[error("Only the contract deployer can do this")]
    NotDeployer,

    #[error("{0} cannot be empty")]
    EmptyName(&'static str),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("{0} is already authorized")]
    AlreadyAuthorized(Address),

    #[error("Start time must be in the future")]
    StartNotInFuture,

    #[error("End time must be after start time")]
    EndBeforeStart,

    #[error("Candidate {0} is not running in this election")]
    UnknownCandidate(u64),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("No wallet provider available")]
    ProviderUnavailable,

    #[error("Request rejected by user")]
    UserRejected,

    #[error("Ledger unreachable: {0}")]
    LedgerUnreachable(String),

    #[error("{}", rejection_text(.reason))]
    LedgerRejected { reason: Option<String> },

    #[error(transparent)]
    Precondition(#[from] PreconditionViolation),

    #[error("Election directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Wallet is not connected")]
    NotConnected,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

fn rejection_text(reason: &Option<String>) -> String {
    reason
        .clone()
        .unwrap_or_else(|| "Transaction failed".to_string())
}

impl From<LedgerError> for ClientError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Unreachable(msg) => ClientError::LedgerUnreachable(msg),
            LedgerError::Decode(msg) => ClientError::LedgerUnreachable(msg),
            LedgerError::Rejected { reason } => ClientError::LedgerRejected { reason },
            LedgerError::UserRejected => ClientError::UserRejected,
        }
    }
}

impl From<ProviderError> for ClientError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable => ClientError::ProviderUnavailable,
            ProviderError::UserRejected => ClientError::UserRejected,
            ProviderError::Other(msg) => ClientError::Provider(msg),
        }
    }
}

impl ClientError {
    pub fn is_precondition(&self) -> bool {
        matches!(self, ClientError::Precondition(_))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

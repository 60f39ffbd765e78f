//! Ballot Core Library
//!
//! Client engine for a multi-election voting contract: wallet session,
//! election directory, selected election view, guarded writes and
//! transient notifications.

pub mod abi;
pub mod address;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod ledger;
pub mod model;
pub mod notify;
pub mod provider;
pub mod rpc;
pub mod session;
pub mod view;

// Re-export main types
pub use address::{Address, AddressError};
pub use client::{ClientOptions, ElectionClient};
pub use config::{AdminPolicy, ClientConfig, ConfigError, ContractSchema};
pub use directory::{DirectoryState, ElectionDirectory, RefreshOutcome};
pub use error::{ClientError, PreconditionViolation, Result};
pub use gateway::{ActionGateway, ActionKind, Clock, InFlightAction, SystemClock};
pub use guard::{Capabilities, GuardContext};
pub use ledger::{ContractBinder, ContractLedger, Ledger, LedgerBinder, LedgerCall, LedgerError, PendingTx};
pub use model::{
    format_timestamp, Candidate, Election, ElectionSnapshot, ElectionStatus, Roster, RosterEntry,
    VoterRecord,
};
pub use notify::{Level, Notification, Notifier};
pub use provider::{
    ProviderError, ProviderEvent, ProviderSubscription, Receipt, RpcWalletProvider, Signer,
    TxHash, WalletProvider,
};
pub use session::{BoundSession, DisconnectReason, SessionManager, SessionSnapshot, SessionState};
pub use view::{ElectionView, Selection};

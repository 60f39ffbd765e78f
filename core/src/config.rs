//! Client configuration (`ballot.toml`)
//!
//! Example:
//!
//! ```toml
//! rpc_url = "http://127.0.0.1:8545"
//! contract_address = "0x4D4a47f5EB23Bf12a7174990661FEAF274325369"
//! admin_policy = "election-admin"
//!
//! [schema]
//! vote = "vote(uint256,uint256)"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::address::Address;

pub const CONFIG_FILE_NAME: &str = "ballot.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Contract address is not configured; set contract_address in {0}")]
    MissingContract(String),

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Who may start and end an election.
///
/// The contract is the final arbiter either way; this only decides which
/// caller the client lets through without a round trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdminPolicy {
    /// The election's own admin address
    #[default]
    ElectionAdmin,
    /// The contract deployer
    Deployer,
}

/// Function signatures for every contract call the client makes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractSchema {
    pub get_deployer: String,
    pub get_election_count: String,
    pub get_election_details: String,
    pub get_election_candidate_ids: String,
    pub get_candidate: String,
    pub get_voter: String,
    pub get_authorized_voters: String,
    pub create_election: String,
    pub start_election: String,
    pub end_election: String,
    pub add_candidate: String,
    pub remove_candidate: String,
    pub authorize_voter: String,
    pub revoke_voter_authorization: String,
    pub vote: String,
}

impl Default for ContractSchema {
    fn default() -> Self {
        Self {
            get_deployer: "getDeployer()".to_string(),
            get_election_count: "getElectionCount()".to_string(),
            get_election_details: "getElectionDetails(uint256)".to_string(),
            get_election_candidate_ids: "getElectionCandidateIds(uint256)".to_string(),
            get_candidate: "getCandidate(uint256,uint256)".to_string(),
            get_voter: "getVoter(uint256,address)".to_string(),
            get_authorized_voters: "getAuthorizedVoters(uint256)".to_string(),
            create_election: "createElection(string,uint256,uint256)".to_string(),
            start_election: "startElection(uint256)".to_string(),
            end_election: "endElection(uint256)".to_string(),
            add_candidate: "addCandidate(uint256,string)".to_string(),
            remove_candidate: "removeCandidate(uint256,uint256)".to_string(),
            authorize_voter: "authorizeVoter(uint256,address)".to_string(),
            revoke_voter_authorization: "removeVoterAuthorization(uint256,address)".to_string(),
            vote: "vote(uint256,uint256)".to_string(),
        }
    }
}

impl ContractSchema {
    fn entries(&self) -> [(&'static str, &str); 15] {
        [
            ("get_deployer", self.get_deployer.as_str()),
            ("get_election_count", self.get_election_count.as_str()),
            ("get_election_details", self.get_election_details.as_str()),
            ("get_election_candidate_ids", self.get_election_candidate_ids.as_str()),
            ("get_candidate", self.get_candidate.as_str()),
            ("get_voter", self.get_voter.as_str()),
            ("get_authorized_voters", self.get_authorized_voters.as_str()),
            ("create_election", self.create_election.as_str()),
            ("start_election", self.start_election.as_str()),
            ("end_election", self.end_election.as_str()),
            ("add_candidate", self.add_candidate.as_str()),
            ("remove_candidate", self.remove_candidate.as_str()),
            ("authorize_voter", self.authorize_voter.as_str()),
            ("revoke_voter_authorization", self.revoke_voter_authorization.as_str()),
            ("vote", self.vote.as_str()),
        ]
    }

    /// Every entry must look like `name(type,...)` with no whitespace
    pub fn validate(&self) -> Result<()> {
        for (field, signature) in self.entries() {
            let well_formed = signature
                .find('(')
                .is_some_and(|open| open > 0 && signature.ends_with(')'))
                && !signature.contains(char::is_whitespace);
            if !well_formed {
                return Err(ConfigError::Invalid {
                    field: format!("schema.{}", field),
                    message: format!("{:?} is not a canonical function signature", signature),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    #[serde(default)]
    pub contract_address: Option<Address>,

    /// Refuse to connect when the provider reports another chain
    #[serde(default)]
    pub expected_chain_id: Option<u64>,

    #[serde(default)]
    pub admin_policy: AdminPolicy,

    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,

    #[serde(default = "default_provider_poll_ms")]
    pub provider_poll_ms: u64,

    #[serde(default = "default_notification_ttl_secs")]
    pub notification_ttl_secs: u64,

    #[serde(default)]
    pub schema: ContractSchema,
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_receipt_poll_ms() -> u64 {
    1_000
}

fn default_provider_poll_ms() -> u64 {
    2_000
}

fn default_notification_ttl_secs() -> u64 {
    5
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            rpc_url: default_rpc_url(),
            contract_address: None,
            expected_chain_id: None,
            admin_policy: AdminPolicy::default(),
            receipt_poll_ms: default_receipt_poll_ms(),
            provider_poll_ms: default_provider_poll_ms(),
            notification_ttl_secs: default_notification_ttl_secs(),
            schema: ContractSchema::default(),
        }
    }
}

impl ClientConfig {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file at the default location is created with defaults;
    /// an explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Self::config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    let config = ClientConfig::default();
                    config.save(&path)?;
                    log::info!("📝 Wrote default configuration to {}", path.display());
                    config
                }
            }
        };
        config.schema.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ballot")
            .join(CONFIG_FILE_NAME)
    }

    /// `BALLOT_RPC_URL` and `BALLOT_CONTRACT` take precedence over the file
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("BALLOT_RPC_URL") {
            self.rpc_url = url;
        }
        if let Ok(raw) = std::env::var("BALLOT_CONTRACT") {
            let address = raw.parse().map_err(|e| ConfigError::Invalid {
                field: "BALLOT_CONTRACT".to_string(),
                message: format!("{}", e),
            })?;
            self.contract_address = Some(address);
        }
        Ok(())
    }

    pub fn contract(&self) -> Result<Address> {
        self.contract_address
            .ok_or_else(|| ConfigError::MissingContract(Self::config_path().display().to_string()))
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    pub fn provider_poll_interval(&self) -> Duration {
        Duration::from_millis(self.provider_poll_ms)
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_secs(self.notification_ttl_secs)
    }
}

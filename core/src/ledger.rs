//! Ledger proxy
//!
//! Typed read and write surface of the election contract. Reads return
//! decoded model types; writes go out as transactions and resolve to a
//! receipt. Nothing is cached here.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::abi::{self, decode_revert_reason, Decoder, Token};
use crate::address::Address;
use crate::config::ContractSchema;
use crate::model::{Candidate, Election, VoterRecord};
use crate::provider::{Receipt, Signer, TxHash};
use crate::rpc::RpcError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger unreachable: {0}")]
    Unreachable(String),

    #[error("Transaction rejected: {}", reason_or_default(.reason))]
    Rejected { reason: Option<String> },

    #[error("Request rejected by user")]
    UserRejected,

    #[error("Malformed ledger response: {0}")]
    Decode(String),
}

fn reason_or_default(reason: &Option<String>) -> &str {
    reason.as_deref().unwrap_or("Transaction failed")
}

impl From<abi::AbiError> for LedgerError {
    fn from(err: abi::AbiError) -> Self {
        LedgerError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// State-mutating contract call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    CreateElection {
        name: String,
        start_time: i64,
        end_time: i64,
    },
    StartElection {
        election_id: u64,
    },
    EndElection {
        election_id: u64,
    },
    AddCandidate {
        election_id: u64,
        name: String,
    },
    RemoveCandidate {
        election_id: u64,
        candidate_id: u64,
    },
    AuthorizeVoter {
        election_id: u64,
        voter: Address,
    },
    RevokeVoter {
        election_id: u64,
        voter: Address,
    },
    Vote {
        election_id: u64,
        candidate_id: u64,
    },
}

impl LedgerCall {
    pub fn label(&self) -> &'static str {
        match self {
            LedgerCall::CreateElection { .. } => "createElection",
            LedgerCall::StartElection { .. } => "startElection",
            LedgerCall::EndElection { .. } => "endElection",
            LedgerCall::AddCandidate { .. } => "addCandidate",
            LedgerCall::RemoveCandidate { .. } => "removeCandidate",
            LedgerCall::AuthorizeVoter { .. } => "authorizeVoter",
            LedgerCall::RevokeVoter { .. } => "revokeVoterAuthorization",
            LedgerCall::Vote { .. } => "vote",
        }
    }

    /// Function signature and ABI arguments for this call
    fn encode(&self, schema: &ContractSchema) -> Vec<u8> {
        // timestamps are validated positive before a call is built
        let ts = |t: i64| Token::Uint(t.max(0) as u64);
        match self {
            LedgerCall::CreateElection {
                name,
                start_time,
                end_time,
            } => abi::encode_call(
                &schema.create_election,
                &[Token::String(name.clone()), ts(*start_time), ts(*end_time)],
            ),
            LedgerCall::StartElection { election_id } => {
                abi::encode_call(&schema.start_election, &[Token::Uint(*election_id)])
            }
            LedgerCall::EndElection { election_id } => {
                abi::encode_call(&schema.end_election, &[Token::Uint(*election_id)])
            }
            LedgerCall::AddCandidate { election_id, name } => abi::encode_call(
                &schema.add_candidate,
                &[Token::Uint(*election_id), Token::String(name.clone())],
            ),
            LedgerCall::RemoveCandidate {
                election_id,
                candidate_id,
            } => abi::encode_call(
                &schema.remove_candidate,
                &[Token::Uint(*election_id), Token::Uint(*candidate_id)],
            ),
            LedgerCall::AuthorizeVoter { election_id, voter } => abi::encode_call(
                &schema.authorize_voter,
                &[Token::Uint(*election_id), Token::Address(*voter)],
            ),
            LedgerCall::RevokeVoter { election_id, voter } => abi::encode_call(
                &schema.revoke_voter_authorization,
                &[Token::Uint(*election_id), Token::Address(*voter)],
            ),
            LedgerCall::Vote {
                election_id,
                candidate_id,
            } => abi::encode_call(
                &schema.vote,
                &[Token::Uint(*election_id), Token::Uint(*candidate_id)],
            ),
        }
    }
}

/// Submitted, not yet confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTx {
    pub hash: TxHash,
    pub call: LedgerCall,
}

impl PendingTx {
    /// Block until the transaction is mined on `ledger`
    pub async fn wait(&self, ledger: &dyn Ledger) -> Result<Receipt> {
        ledger.confirm(self).await
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Account this binding reads and signs as
    fn account(&self) -> Address;

    async fn deployer(&self) -> Result<Address>;
    async fn election_count(&self) -> Result<u64>;
    async fn election(&self, election_id: u64) -> Result<Election>;
    async fn candidate_ids(&self, election_id: u64) -> Result<Vec<u64>>;
    async fn candidate(&self, election_id: u64, candidate_id: u64) -> Result<Candidate>;
    async fn voter(&self, election_id: u64, voter: Address) -> Result<VoterRecord>;
    async fn authorized_voters(&self, election_id: u64) -> Result<Vec<Address>>;

    async fn submit(&self, call: LedgerCall) -> Result<PendingTx>;

    /// Wait for the transaction to be mined; a reverted transaction is
    /// `LedgerError::Rejected`
    async fn confirm(&self, pending: &PendingTx) -> Result<Receipt>;
}

impl std::fmt::Debug for dyn Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("account", &self.account())
            .finish()
    }
}

/// Builds a ledger binding for a signer. The session rebuilds its binding
/// through this whenever the signing account changes.
pub trait LedgerBinder: Send + Sync {
    fn bind(&self, signer: Arc<dyn Signer>) -> Arc<dyn Ledger>;
}

// ============================================================================
// Contract-backed implementation
// ============================================================================

pub struct ContractLedger {
    contract: Address,
    schema: Arc<ContractSchema>,
    signer: Arc<dyn Signer>,
    poll_interval: Duration,
}

impl ContractLedger {
    pub fn new(
        contract: Address,
        schema: Arc<ContractSchema>,
        signer: Arc<dyn Signer>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            contract,
            schema,
            signer,
            poll_interval,
        }
    }

    async fn read(&self, signature: &str, args: &[Token]) -> Result<Vec<u8>> {
        self.signer
            .call(self.contract, abi::encode_call(signature, args), None)
            .await
            .map_err(read_error)
    }

    /// Replay a reverted transaction as a call at its block to recover the
    /// revert reason
    async fn revert_reason(&self, call: &LedgerCall, block: u64) -> Option<String> {
        match self
            .signer
            .call(self.contract, call.encode(&self.schema), Some(block))
            .await
        {
            Ok(_) => None,
            Err(e) => e.revert_data().and_then(|data| decode_revert_reason(&data)),
        }
    }
}

fn read_error(err: RpcError) -> LedgerError {
    LedgerError::Unreachable(err.to_string())
}

fn write_error(err: RpcError) -> LedgerError {
    if err.is_user_rejection() {
        return LedgerError::UserRejected;
    }
    if err.is_transport() {
        return LedgerError::Unreachable(err.to_string());
    }
    let reason = err
        .revert_data()
        .and_then(|data| decode_revert_reason(&data))
        .or_else(|| err.message().map(str::to_string));
    LedgerError::Rejected { reason }
}

#[async_trait]
impl Ledger for ContractLedger {
    fn account(&self) -> Address {
        self.signer.address()
    }

    async fn deployer(&self) -> Result<Address> {
        let data = self.read(&self.schema.get_deployer, &[]).await?;
        Ok(Decoder::new(&data).address(0)?)
    }

    async fn election_count(&self) -> Result<u64> {
        let data = self.read(&self.schema.get_election_count, &[]).await?;
        Ok(Decoder::new(&data).uint(0)?)
    }

    async fn election(&self, election_id: u64) -> Result<Election> {
        let data = self
            .read(
                &self.schema.get_election_details,
                &[Token::Uint(election_id)],
            )
            .await?;
        let d = Decoder::new(&data);
        Ok(Election {
            id: d.uint(0)?,
            name: d.string(1)?,
            admin: d.address(2)?,
            start_time: d.timestamp(3)?,
            end_time: d.timestamp(4)?,
            is_active: d.bool(5)?,
            is_completed: d.bool(6)?,
            candidate_count: d.uint(7)?,
            total_votes_cast: d.uint(8)?,
        })
    }

    async fn candidate_ids(&self, election_id: u64) -> Result<Vec<u64>> {
        let data = self
            .read(
                &self.schema.get_election_candidate_ids,
                &[Token::Uint(election_id)],
            )
            .await?;
        Ok(Decoder::new(&data).uint_array(0)?)
    }

    async fn candidate(&self, election_id: u64, candidate_id: u64) -> Result<Candidate> {
        let data = self
            .read(
                &self.schema.get_candidate,
                &[Token::Uint(election_id), Token::Uint(candidate_id)],
            )
            .await?;
        let d = Decoder::new(&data);
        Ok(Candidate {
            id: d.uint(0)?,
            name: d.string(1)?,
            vote_count: d.uint(2)?,
            exists: d.bool(3)?,
        })
    }

    async fn voter(&self, election_id: u64, voter: Address) -> Result<VoterRecord> {
        let data = self
            .read(
                &self.schema.get_voter,
                &[Token::Uint(election_id), Token::Address(voter)],
            )
            .await?;
        let d = Decoder::new(&data);
        Ok(VoterRecord {
            authorized: d.bool(0)?,
            voted: d.bool(1)?,
            voted_candidate_id: d.uint(2)?,
        })
    }

    async fn authorized_voters(&self, election_id: u64) -> Result<Vec<Address>> {
        let data = self
            .read(
                &self.schema.get_authorized_voters,
                &[Token::Uint(election_id)],
            )
            .await?;
        Ok(Decoder::new(&data).address_array(0)?)
    }

    async fn submit(&self, call: LedgerCall) -> Result<PendingTx> {
        let data = call.encode(&self.schema);
        let hash = self
            .signer
            .send_transaction(self.contract, data)
            .await
            .map_err(write_error)?;
        log::info!("📤 {} submitted: {}", call.label(), hash);
        Ok(PendingTx { hash, call })
    }

    async fn confirm(&self, pending: &PendingTx) -> Result<Receipt> {
        loop {
            match self.signer.receipt(&pending.hash).await {
                Ok(Some(receipt)) if receipt.success => {
                    log::info!(
                        "✅ {} confirmed in block {}",
                        pending.call.label(),
                        receipt.block_number
                    );
                    return Ok(receipt);
                }
                Ok(Some(receipt)) => {
                    let reason = self
                        .revert_reason(&pending.call, receipt.block_number)
                        .await;
                    log::warn!(
                        "❌ {} reverted in block {}: {}",
                        pending.call.label(),
                        receipt.block_number,
                        reason_or_default(&reason)
                    );
                    return Err(LedgerError::Rejected { reason });
                }
                Ok(None) => {}
                Err(e) if e.is_transport() => {
                    // the transaction is already out; keep waiting for it
                    log::warn!("⚠️ Receipt poll for {} failed: {}", pending.hash, e);
                }
                Err(e) => return Err(LedgerError::Unreachable(e.to_string())),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Binds [`ContractLedger`]s for one contract address
pub struct ContractBinder {
    contract: Address,
    schema: Arc<ContractSchema>,
    poll_interval: Duration,
}

impl ContractBinder {
    pub fn new(contract: Address, schema: ContractSchema, poll_interval: Duration) -> Self {
        Self {
            contract,
            schema: Arc::new(schema),
            poll_interval,
        }
    }
}

impl LedgerBinder for ContractBinder {
    fn bind(&self, signer: Arc<dyn Signer>) -> Arc<dyn Ledger> {
        Arc::new(ContractLedger::new(
            self.contract,
            self.schema.clone(),
            signer,
            self.poll_interval,
        ))
    }
}

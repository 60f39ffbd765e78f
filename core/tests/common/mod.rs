//! In-memory election contract and wallet for driving the client end to end

#![allow(dead_code)]

use async_trait::async_trait;
use ballot_core::{
    AdminPolicy, Address, Candidate, ClientOptions, Clock, Election, ElectionClient, Ledger,
    LedgerBinder, LedgerCall, LedgerError, Notifier, PendingTx, ProviderError, ProviderEvent,
    Receipt, Signer, TxHash, VoterRecord, WalletProvider,
};
use ballot_core::rpc::RpcError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};

pub const DEPLOYER: Address = Address::new([0xd0; 20]);
pub const ADMIN: Address = Address::new([0xad; 20]);
pub const VOTER: Address = Address::new([0x70; 20]);
pub const OTHER: Address = Address::new([0x07; 20]);

pub const NOW: i64 = 1_750_000_000;
pub const CHAIN_ID: u64 = 31337;

pub struct FakeElection {
    pub election: Election,
    pub candidates: Vec<Candidate>,
    pub voters: HashMap<Address, VoterRecord>,
    pub authorized: Vec<Address>,
}

#[derive(Default)]
pub struct ChainState {
    pub elections: Vec<FakeElection>,
    pub writes: usize,
    pub fail_reads: bool,
    pub fail_roster: bool,
    pub fail_count: bool,
    /// Reported instead of the real election count
    pub count_override: Option<u64>,
    /// Next submission fails with this instead of reaching the contract
    pub reject_next: Option<LedgerError>,
    outcomes: HashMap<TxHash, Result<u64, String>>,
    block: u64,
}

/// Shared contract state; every bound ledger reads and writes through it
pub struct FakeChain {
    pub deployer: Address,
    pub state: Mutex<ChainState>,
    election_gates: Mutex<HashMap<u64, Arc<Semaphore>>>,
    write_gate: Mutex<Option<Arc<Semaphore>>>,
    waiting: AtomicUsize,
}

impl FakeChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            deployer: DEPLOYER,
            state: Mutex::new(ChainState::default()),
            election_gates: Mutex::new(HashMap::new()),
            write_gate: Mutex::new(None),
            waiting: AtomicUsize::new(0),
        })
    }

    /// Add an election directly to contract storage; returns its id
    pub fn seed(
        &self,
        name: &str,
        admin: Address,
        active: bool,
        candidates: &[(&str, u64)],
        authorized: &[Address],
    ) -> u64 {
        let mut state = self.state.lock();
        let id = state.elections.len() as u64 + 1;
        let candidates: Vec<Candidate> = candidates
            .iter()
            .enumerate()
            .map(|(i, (name, votes))| Candidate {
                id: i as u64 + 1,
                name: name.to_string(),
                vote_count: *votes,
                exists: true,
            })
            .collect();
        let voters = authorized
            .iter()
            .map(|a| {
                (
                    *a,
                    VoterRecord {
                        authorized: true,
                        voted: false,
                        voted_candidate_id: 0,
                    },
                )
            })
            .collect();
        state.elections.push(FakeElection {
            election: Election {
                id,
                name: name.to_string(),
                admin,
                start_time: NOW - 3600,
                end_time: NOW + 86_400,
                is_active: active,
                is_completed: false,
                candidate_count: candidates.len() as u64,
                total_votes_cast: candidates
                    .iter()
                    .try_fold(0u64, |total, c| total.checked_add(c.vote_count))
                    .expect("seeded vote total overflows"),
            },
            candidates,
            voters,
            authorized: authorized.to_vec(),
        });
        id
    }

    pub fn with_election<R>(&self, id: u64, f: impl FnOnce(&mut FakeElection) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut state.elections[id as usize - 1])
    }

    pub fn writes(&self) -> usize {
        self.state.lock().writes
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    pub fn set_fail_roster(&self, fail: bool) {
        self.state.lock().fail_roster = fail;
    }

    pub fn set_fail_count(&self, fail: bool) {
        self.state.lock().fail_count = fail;
    }

    pub fn set_count_override(&self, count: Option<u64>) {
        self.state.lock().count_override = count;
    }

    /// Hold every details read of `election_id` until permits are added
    pub fn gate_election(&self, election_id: u64) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.election_gates.lock().insert(election_id, gate.clone());
        gate
    }

    pub fn ungate_election(&self, election_id: u64) {
        self.election_gates.lock().remove(&election_id);
    }

    /// Hold every receipt until permits are added
    pub fn gate_writes(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.write_gate.lock() = Some(gate.clone());
        gate
    }

    /// Readers currently parked on a gate
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    async fn pass_gate(&self, gate: Option<Arc<Semaphore>>) {
        if let Some(gate) = gate {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            let permit = gate.acquire().await.unwrap();
            permit.forget();
            self.waiting.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn read<R>(&self, f: impl FnOnce(&ChainState) -> Result<R, LedgerError>) -> Result<R, LedgerError> {
        let state = self.state.lock();
        if state.fail_reads {
            return Err(LedgerError::Unreachable("connection refused".to_string()));
        }
        f(&state)
    }

    fn apply(&self, caller: Address, call: &LedgerCall) -> Result<(), String> {
        let mut state = self.state.lock();
        if let LedgerCall::CreateElection {
            name,
            start_time,
            end_time,
        } = call
        {
            if caller != self.deployer {
                return Err("Only the deployer can create elections".to_string());
            }
            let id = state.elections.len() as u64 + 1;
            state.elections.push(FakeElection {
                election: Election {
                    id,
                    name: name.clone(),
                    admin: caller,
                    start_time: *start_time,
                    end_time: *end_time,
                    is_active: false,
                    is_completed: false,
                    candidate_count: 0,
                    total_votes_cast: 0,
                },
                candidates: Vec::new(),
                voters: HashMap::new(),
                authorized: Vec::new(),
            });
            return Ok(());
        }

        let election_id = match call {
            LedgerCall::StartElection { election_id }
            | LedgerCall::EndElection { election_id }
            | LedgerCall::AddCandidate { election_id, .. }
            | LedgerCall::RemoveCandidate { election_id, .. }
            | LedgerCall::AuthorizeVoter { election_id, .. }
            | LedgerCall::RevokeVoter { election_id, .. }
            | LedgerCall::Vote { election_id, .. } => *election_id,
            LedgerCall::CreateElection { .. } => unreachable!(),
        };
        let deployer = self.deployer;
        let e = state
            .elections
            .get_mut(election_id as usize - 1)
            .ok_or("Election does not exist")?;
        let is_admin = caller == e.election.admin;
        let locked = e.election.is_active || e.election.is_completed;

        match call {
            LedgerCall::StartElection { .. } => {
                if !is_admin && caller != deployer {
                    return Err("Only the election admin can start".to_string());
                }
                if locked {
                    return Err("Election already started".to_string());
                }
                e.election.is_active = true;
            }
            LedgerCall::EndElection { .. } => {
                if !is_admin && caller != deployer {
                    return Err("Only the election admin can end".to_string());
                }
                if !e.election.is_active {
                    return Err("Election is not active".to_string());
                }
                e.election.is_active = false;
                e.election.is_completed = true;
            }
            LedgerCall::AddCandidate { name, .. } => {
                if !is_admin {
                    return Err("Only the election admin can add candidates".to_string());
                }
                if locked {
                    return Err("Cannot add candidates after start".to_string());
                }
                let id = e.candidates.len() as u64 + 1;
                e.candidates.push(Candidate {
                    id,
                    name: name.clone(),
                    vote_count: 0,
                    exists: true,
                });
                e.election.candidate_count += 1;
            }
            LedgerCall::RemoveCandidate { candidate_id, .. } => {
                if !is_admin || locked {
                    return Err("Cannot remove candidate".to_string());
                }
                let candidate = e
                    .candidates
                    .iter_mut()
                    .find(|c| c.id == *candidate_id && c.exists)
                    .ok_or("Candidate does not exist")?;
                candidate.exists = false;
                e.election.candidate_count -= 1;
            }
            LedgerCall::AuthorizeVoter { voter, .. } => {
                if !is_admin || locked {
                    return Err("Cannot authorize voter".to_string());
                }
                e.voters.entry(*voter).or_default().authorized = true;
                if !e.authorized.contains(voter) {
                    e.authorized.push(*voter);
                }
            }
            LedgerCall::RevokeVoter { voter, .. } => {
                if !is_admin || locked {
                    return Err("Cannot revoke voter".to_string());
                }
                e.voters.entry(*voter).or_default().authorized = false;
                e.authorized.retain(|a| a != voter);
            }
            LedgerCall::Vote { candidate_id, .. } => {
                if !e.election.is_active {
                    return Err("Election is not active".to_string());
                }
                let record = e.voters.entry(caller).or_default();
                if !record.authorized {
                    return Err("Voter is not authorized".to_string());
                }
                if record.voted {
                    return Err("Voter has already voted".to_string());
                }
                let candidate = e
                    .candidates
                    .iter_mut()
                    .find(|c| c.id == *candidate_id && c.exists)
                    .ok_or("Candidate does not exist")?;
                candidate.vote_count += 1;
                record.voted = true;
                record.voted_candidate_id = *candidate_id;
                e.election.total_votes_cast += 1;
            }
            LedgerCall::CreateElection { .. } => unreachable!(),
        }
        Ok(())
    }
}

fn election_entry(state: &ChainState, id: u64) -> Result<&FakeElection, LedgerError> {
    id.checked_sub(1)
        .and_then(|i| state.elections.get(i as usize))
        .ok_or(LedgerError::Rejected {
            reason: Some("Election does not exist".to_string()),
        })
}

/// Ledger bound to one account of the fake chain
pub struct FakeLedger {
    chain: Arc<FakeChain>,
    account: Address,
}

#[async_trait]
impl Ledger for FakeLedger {
    fn account(&self) -> Address {
        self.account
    }

    async fn deployer(&self) -> Result<Address, LedgerError> {
        self.chain.read(|_| Ok(self.chain.deployer))
    }

    async fn election_count(&self) -> Result<u64, LedgerError> {
        self.chain.read(|s| {
            if s.fail_count {
                return Err(LedgerError::Unreachable("count read timed out".to_string()));
            }
            Ok(s.count_override.unwrap_or(s.elections.len() as u64))
        })
    }

    async fn election(&self, election_id: u64) -> Result<Election, LedgerError> {
        let gate = self.chain.election_gates.lock().get(&election_id).cloned();
        self.chain.pass_gate(gate).await;
        self.chain
            .read(|s| election_entry(s, election_id).map(|e| e.election.clone()))
    }

    async fn candidate_ids(&self, election_id: u64) -> Result<Vec<u64>, LedgerError> {
        self.chain.read(|s| {
            election_entry(s, election_id)
                .map(|e| e.candidates.iter().filter(|c| c.exists).map(|c| c.id).collect())
        })
    }

    async fn candidate(&self, election_id: u64, candidate_id: u64) -> Result<Candidate, LedgerError> {
        self.chain.read(|s| {
            let e = election_entry(s, election_id)?;
            Ok(e.candidates
                .iter()
                .find(|c| c.id == candidate_id)
                .cloned()
                .unwrap_or(Candidate {
                    id: 0,
                    name: String::new(),
                    vote_count: 0,
                    exists: false,
                }))
        })
    }

    async fn voter(&self, election_id: u64, voter: Address) -> Result<VoterRecord, LedgerError> {
        self.chain.read(|s| {
            let e = election_entry(s, election_id)?;
            Ok(e.voters.get(&voter).copied().unwrap_or_default())
        })
    }

    async fn authorized_voters(&self, election_id: u64) -> Result<Vec<Address>, LedgerError> {
        self.chain.read(|s| {
            if s.fail_roster {
                return Err(LedgerError::Unreachable("roster read timed out".to_string()));
            }
            election_entry(s, election_id).map(|e| e.authorized.clone())
        })
    }

    async fn submit(&self, call: LedgerCall) -> Result<PendingTx, LedgerError> {
        if let Some(err) = self.chain.state.lock().reject_next.take() {
            return Err(err);
        }
        let outcome = self.chain.apply(self.account, &call);
        let mut state = self.chain.state.lock();
        state.writes += 1;
        state.block += 1;
        let mut hash = [0u8; 32];
        hash[..8].copy_from_slice(&(state.writes as u64).to_be_bytes());
        let hash = TxHash(hash);
        let block = state.block;
        state.outcomes.insert(hash, outcome.map(|_| block));
        Ok(PendingTx { hash, call })
    }

    async fn confirm(&self, pending: &PendingTx) -> Result<Receipt, LedgerError> {
        let gate = self.chain.write_gate.lock().clone();
        self.chain.pass_gate(gate).await;
        let outcome = self.chain.state.lock().outcomes.get(&pending.hash).cloned();
        match outcome {
            Some(Ok(block_number)) => Ok(Receipt {
                tx_hash: pending.hash,
                block_number,
                success: true,
            }),
            Some(Err(reason)) => Err(LedgerError::Rejected {
                reason: Some(reason),
            }),
            None => Err(LedgerError::Unreachable("unknown transaction".to_string())),
        }
    }
}

pub struct FakeBinder {
    pub chain: Arc<FakeChain>,
}

impl LedgerBinder for FakeBinder {
    fn bind(&self, signer: Arc<dyn Signer>) -> Arc<dyn Ledger> {
        Arc::new(FakeLedger {
            chain: self.chain.clone(),
            account: signer.address(),
        })
    }
}

/// Signer that only knows its address; the fake ledger never calls out
pub struct FakeSigner {
    account: Address,
}

#[async_trait]
impl Signer for FakeSigner {
    fn address(&self) -> Address {
        self.account
    }

    async fn call(&self, _to: Address, _data: Vec<u8>, _block: Option<u64>) -> Result<Vec<u8>, RpcError> {
        Err(RpcError::Http(501))
    }

    async fn send_transaction(&self, _to: Address, _data: Vec<u8>) -> Result<TxHash, RpcError> {
        Err(RpcError::Http(501))
    }

    async fn receipt(&self, _hash: &TxHash) -> Result<Option<Receipt>, RpcError> {
        Err(RpcError::Http(501))
    }
}

pub struct FakeProvider {
    accounts: Mutex<Vec<Address>>,
    chain_id: Mutex<u64>,
    connect_error: Mutex<Option<ProviderError>>,
    events: broadcast::Sender<ProviderEvent>,
}

impl FakeProvider {
    pub fn new(account: Address) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            accounts: Mutex::new(vec![account]),
            chain_id: Mutex::new(CHAIN_ID),
            connect_error: Mutex::new(None),
            events,
        })
    }

    /// Wallet switches to `account` and tells its listeners
    pub fn switch_account(&self, account: Address) {
        *self.accounts.lock() = vec![account];
        let _ = self.events.send(ProviderEvent::AccountsChanged(vec![account]));
    }

    pub fn clear_accounts(&self) {
        self.accounts.lock().clear();
        let _ = self.events.send(ProviderEvent::AccountsChanged(Vec::new()));
    }

    pub fn switch_chain(&self, chain_id: u64) {
        *self.chain_id.lock() = chain_id;
        let _ = self.events.send(ProviderEvent::ChainChanged(chain_id));
    }

    pub fn fail_next_connect(&self, err: ProviderError) {
        *self.connect_error.lock() = Some(err);
    }

    pub fn listeners(&self) -> usize {
        self.events.receiver_count()
    }
}

#[async_trait]
impl WalletProvider for FakeProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        if let Some(err) = self.connect_error.lock().take() {
            return Err(err);
        }
        Ok(self.accounts.lock().clone())
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(*self.chain_id.lock())
    }

    fn signer(&self, account: Address) -> Result<Arc<dyn Signer>, ProviderError> {
        Ok(Arc::new(FakeSigner { account }))
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

pub fn client_with(
    chain: &Arc<FakeChain>,
    provider: &Arc<FakeProvider>,
    policy: AdminPolicy,
) -> Arc<ElectionClient> {
    let options = ClientOptions {
        admin_policy: policy,
        expected_chain_id: None,
        clock: Arc::new(FixedClock(NOW)),
    };
    ElectionClient::new(
        provider.clone(),
        Arc::new(FakeBinder {
            chain: chain.clone(),
        }),
        options,
        Arc::new(Notifier::default()),
    )
}

/// Connected client for `account` with the default admin policy
pub async fn connected(chain: &Arc<FakeChain>, account: Address) -> (Arc<ElectionClient>, Arc<FakeProvider>) {
    let provider = FakeProvider::new(account);
    let client = client_with(chain, &provider, AdminPolicy::default());
    client.connect().await.unwrap();
    (client, provider)
}

/// Let spawned listeners and sync tasks run until `done` holds
pub async fn settle(mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

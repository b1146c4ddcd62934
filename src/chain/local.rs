// Local Contract - in-memory contract with a manual clock
//
// Runs the adjudication rules a deployed contract enforces: escrowed deposits,
// operator-signed checkpoints, proof-checked withdrawals with a challenge
// period, fast deposit-withdrawals, slot queries and fraud-proof halting.

use crate::chain::contract::*;
use crate::identity::{Signature, Signer};
use crate::ids::{CheckpointId, DepositId, DepositWithdrawalId, QueryId, SlotId, WithdrawalId};
use crate::ledger::{deposit_digest, transaction_digest, AccountValue, LedgerRoots};
use crate::merkle::{verify, Proof};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

// ============================================================================
// CONTRACT CONFIG
// ============================================================================

/// Periods enforced by the contract, in chain seconds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Time after commitment before a checkpoint counts as settled
    pub checkpoint_period: u64,
    /// Challenge period of a regular withdrawal
    pub withdrawal_period: u64,
    /// Challenge period of a fast deposit-withdrawal
    pub deposit_withdrawal_period: u64,
    /// Time the operator has to answer a slot query
    pub query_period: u64,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            checkpoint_period: 60,
            withdrawal_period: 3_600,
            deposit_withdrawal_period: 3_600,
            query_period: 600,
        }
    }
}

impl ContractConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checkpoint_period(mut self, secs: u64) -> Self {
        self.checkpoint_period = secs;
        self
    }

    pub fn with_withdrawal_period(mut self, secs: u64) -> Self {
        self.withdrawal_period = secs;
        self
    }

    pub fn with_deposit_withdrawal_period(mut self, secs: u64) -> Self {
        self.deposit_withdrawal_period = secs;
        self
    }

    pub fn with_query_period(mut self, secs: u64) -> Self {
        self.query_period = secs;
        self
    }

    /// Every period set to `secs`
    pub fn with_uniform_period(self, secs: u64) -> Self {
        self.with_checkpoint_period(secs)
            .with_withdrawal_period(secs)
            .with_deposit_withdrawal_period(secs)
            .with_query_period(secs)
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        let periods = [
            ("checkpoint_period", self.checkpoint_period),
            ("withdrawal_period", self.withdrawal_period),
            ("deposit_withdrawal_period", self.deposit_withdrawal_period),
            ("query_period", self.query_period),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(ContractError::InvalidConfig(format!("{name} must be > 0")));
            }
        }
        Ok(())
    }
}

// ============================================================================
// CONTRACT EVENTS
// ============================================================================

/// Events emitted by the contract
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContractEvent {
    Deposited {
        id: DepositId,
        owner: Address,
        amount: U256,
    },
    CheckpointCommitted {
        id: CheckpointId,
        tx_root: B256,
        changes_root: B256,
        accounts_root: B256,
    },
    WithdrawalStarted {
        id: WithdrawalId,
        checkpoint_id: CheckpointId,
        slot_id: SlotId,
        lock: Address,
        amount: U256,
    },
    WithdrawalFinalised {
        id: WithdrawalId,
        lock: Address,
        amount: U256,
    },
    DepositWithdrawRequested {
        id: DepositWithdrawalId,
        deposit_id: DepositId,
    },
    DepositWithdrawChallenged {
        id: DepositWithdrawalId,
    },
    DepositWithdrawFinalised {
        id: DepositWithdrawalId,
        owner: Address,
        amount: U256,
    },
    SlotQueried {
        id: QueryId,
        checkpoint_id: CheckpointId,
        slot_id: SlotId,
    },
    SlotQueryAnswered {
        id: QueryId,
    },
    Halted {
        checkpoint_id: CheckpointId,
    },
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug)]
struct State {
    now: u64,
    halted: bool,
    balances: HashMap<Address, U256>,
    escrow: U256,
    checkpoints: BTreeMap<CheckpointId, CheckpointRecord>,
    next_checkpoint_id: CheckpointId,
    deposits: BTreeMap<DepositId, DepositRecord>,
    next_deposit_id: DepositId,
    withdrawals: BTreeMap<WithdrawalId, WithdrawalRecord>,
    next_withdrawal_id: WithdrawalId,
    /// Slots consumed by a withdrawal, with the checkpoint that consumed them
    withdrawn_slots: HashMap<SlotId, CheckpointId>,
    deposit_withdrawals: BTreeMap<DepositWithdrawalId, DepositWithdrawalRecord>,
    next_deposit_withdrawal_id: DepositWithdrawalId,
    /// Deposits with an open or settled fast exit
    withdrawing_deposits: HashSet<DepositId>,
    queries: BTreeMap<QueryId, SlotQueryRecord>,
    next_query_id: QueryId,
    events: Vec<ContractEvent>,
}

impl State {
    fn new() -> Self {
        Self {
            now: 0,
            halted: false,
            balances: HashMap::new(),
            escrow: U256::ZERO,
            checkpoints: BTreeMap::new(),
            next_checkpoint_id: CheckpointId::new(1),
            deposits: BTreeMap::new(),
            next_deposit_id: DepositId::new(1),
            withdrawals: BTreeMap::new(),
            next_withdrawal_id: WithdrawalId::new(1),
            withdrawn_slots: HashMap::new(),
            deposit_withdrawals: BTreeMap::new(),
            next_deposit_withdrawal_id: DepositWithdrawalId::new(1),
            withdrawing_deposits: HashSet::new(),
            queries: BTreeMap::new(),
            next_query_id: QueryId::new(1),
            events: Vec::new(),
        }
    }

    fn ensure_running(&self) -> Result<(), ContractError> {
        if self.halted {
            return Err(ContractError::Halted);
        }
        Ok(())
    }

    fn checkpoint(&self, id: CheckpointId) -> Result<&CheckpointRecord, ContractError> {
        self.checkpoints
            .get(&id)
            .ok_or(ContractError::not_found(RecordKind::Checkpoint, id.value()))
    }

    fn latest_checkpoint_id(&self) -> CheckpointId {
        self.checkpoints
            .keys()
            .next_back()
            .copied()
            .unwrap_or_default()
    }

    fn pay(&mut self, to: Address, amount: U256) -> Result<(), ContractError> {
        if self.escrow < amount {
            return Err(ContractError::InsufficientBalance {
                have: self.escrow,
                need: amount,
            });
        }
        self.escrow -= amount;
        *self.balances.entry(to).or_default() += amount;
        Ok(())
    }
}

// ============================================================================
// LOCAL CONTRACT
// ============================================================================

/// In-memory commit-chain contract
#[derive(Debug)]
pub struct LocalContract {
    operator: Address,
    config: ContractConfig,
    state: Mutex<State>,
}

impl LocalContract {
    /// Create a contract that accepts checkpoints signed by `operator`
    pub fn new(operator: Address, config: ContractConfig) -> Result<Self, ContractError> {
        config.validate()?;
        Ok(Self {
            operator,
            config,
            state: Mutex::new(State::new()),
        })
    }

    pub fn operator(&self) -> Address {
        self.operator
    }

    pub fn config(&self) -> &ContractConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Credit `amount` tokens to `owner`
    pub fn mint(&self, owner: Address, amount: U256) {
        *self.state().balances.entry(owner).or_default() += amount;
    }

    pub fn balance_of(&self, owner: &Address) -> U256 {
        self.state().balances.get(owner).copied().unwrap_or_default()
    }

    /// Tokens currently held by the contract
    pub fn escrow(&self) -> U256 {
        self.state().escrow
    }

    /// Move the chain clock forward
    pub fn advance_time(&self, secs: u64) -> u64 {
        let mut state = self.state();
        state.now += secs;
        state.now
    }

    pub fn current_time(&self) -> u64 {
        self.state().now
    }

    pub fn is_halted(&self) -> bool {
        self.state().halted
    }

    /// Drain emitted events
    pub fn poll_events(&self) -> Vec<ContractEvent> {
        std::mem::take(&mut self.state().events)
    }

    fn halt(&self, state: &mut State, checkpoint_id: CheckpointId, reason: &str) {
        state.halted = true;
        if let Some(record) = state.checkpoints.get_mut(&checkpoint_id) {
            record.invalidated = true;
        }
        state.events.push(ContractEvent::Halted { checkpoint_id });
        warn!(checkpoint_id = %checkpoint_id, reason, "contract halted by fraud proof");
    }
}

#[async_trait]
impl PlasmoidContract for LocalContract {
    async fn deposit(&self, from: Address, amount: U256) -> Result<DepositId, ContractError> {
        let mut state = self.state();
        state.ensure_running()?;
        if amount.is_zero() {
            return Err(ContractError::ZeroAmount);
        }

        let balance = state.balances.get(&from).copied().unwrap_or_default();
        if balance < amount {
            return Err(ContractError::InsufficientBalance {
                have: balance,
                need: amount,
            });
        }
        state.balances.insert(from, balance - amount);
        state.escrow += amount;

        let id = state.next_deposit_id;
        state.next_deposit_id = id.next();
        let created_at = state.now;
        state.deposits.insert(
            id,
            DepositRecord {
                id,
                owner: from,
                amount,
                created_at,
            },
        );
        state.events.push(ContractEvent::Deposited {
            id,
            owner: from,
            amount,
        });

        info!(deposit_id = %id, owner = %from, amount = %amount, "deposit accepted");
        Ok(id)
    }

    async fn checkpoint(
        &self,
        tx_root: B256,
        changes_root: B256,
        accounts_root: B256,
        signature: Signature,
    ) -> Result<CheckpointId, ContractError> {
        let mut state = self.state();
        state.ensure_running()?;

        let roots = LedgerRoots {
            tx_root,
            changes_root,
            accounts_root,
        };
        let signer = Signer::recover(&signature, &roots.digest())
            .map_err(|_| ContractError::SignatureMismatch {
                expected: self.operator,
            })?;
        if signer != self.operator {
            return Err(ContractError::NotOperator(signer));
        }

        let id = state.next_checkpoint_id;
        state.next_checkpoint_id = id.next();
        let created_at = state.now;
        state.checkpoints.insert(
            id,
            CheckpointRecord {
                id,
                tx_root,
                changes_root,
                accounts_root,
                created_at,
                final_at: created_at + self.config.checkpoint_period,
                invalidated: false,
            },
        );
        state.events.push(ContractEvent::CheckpointCommitted {
            id,
            tx_root,
            changes_root,
            accounts_root,
        });

        info!(checkpoint_id = %id, tx_root = %tx_root, "checkpoint accepted");
        Ok(id)
    }

    async fn start_withdrawal(&self, claim: &WithdrawalClaim) -> Result<WithdrawalId, ContractError> {
        let mut state = self.state();
        state.ensure_running()?;

        let checkpoint = state.checkpoint(claim.checkpoint_id)?;
        if checkpoint.invalidated {
            return Err(ContractError::CheckpointInvalidated(claim.checkpoint_id));
        }

        let digest = transaction_digest(claim.kind, &claim.lock, &claim.amount);
        if !verify(&claim.proof, &digest, &checkpoint.tx_root) {
            return Err(ContractError::InvalidProof(
                "transaction is not in the checkpoint".into(),
            ));
        }
        if !Signer::verify(&claim.lock, &digest, &claim.signature) {
            return Err(ContractError::SignatureMismatch {
                expected: claim.lock,
            });
        }
        // A slot exits once, whichever checkpoint the claim is proven against.
        if let Some(&consumed_by) = state.withdrawn_slots.get(&claim.slot_id) {
            return Err(ContractError::AlreadyWithdrawing {
                checkpoint_id: consumed_by,
                slot_id: claim.slot_id,
            });
        }
        state.withdrawn_slots.insert(claim.slot_id, claim.checkpoint_id);

        let id = state.next_withdrawal_id;
        state.next_withdrawal_id = id.next();
        let requested_at = state.now;
        state.withdrawals.insert(
            id,
            WithdrawalRecord {
                id,
                checkpoint_id: claim.checkpoint_id,
                slot_id: claim.slot_id,
                kind: claim.kind,
                lock: claim.lock,
                amount: claim.amount,
                requested_at,
                ready_at: requested_at + self.config.withdrawal_period,
            },
        );
        state.events.push(ContractEvent::WithdrawalStarted {
            id,
            checkpoint_id: claim.checkpoint_id,
            slot_id: claim.slot_id,
            lock: claim.lock,
            amount: claim.amount,
        });

        info!(withdrawal_id = %id, checkpoint_id = %claim.checkpoint_id, slot_id = %claim.slot_id, "withdrawal started");
        Ok(id)
    }

    async fn finalise_withdrawal(&self, id: WithdrawalId) -> Result<(), ContractError> {
        let mut state = self.state();
        state.ensure_running()?;

        let record = state
            .withdrawals
            .get(&id)
            .cloned()
            .ok_or(ContractError::not_found(RecordKind::Withdrawal, id.value()))?;
        if state.now < record.ready_at {
            return Err(ContractError::TooEarly {
                ready_at: record.ready_at,
                now: state.now,
            });
        }
        if state.checkpoint(record.checkpoint_id)?.invalidated {
            return Err(ContractError::CheckpointInvalidated(record.checkpoint_id));
        }

        state.pay(record.lock, record.amount)?;
        state.withdrawals.remove(&id);
        state.events.push(ContractEvent::WithdrawalFinalised {
            id,
            lock: record.lock,
            amount: record.amount,
        });

        info!(withdrawal_id = %id, lock = %record.lock, amount = %record.amount, "withdrawal finalised");
        Ok(())
    }

    async fn deposit_withdraw(
        &self,
        deposit_id: DepositId,
        unlock: Signature,
    ) -> Result<DepositWithdrawalId, ContractError> {
        let mut state = self.state();
        state.ensure_running()?;

        let deposit = state
            .deposits
            .get(&deposit_id)
            .cloned()
            .ok_or(ContractError::not_found(RecordKind::Deposit, deposit_id.value()))?;
        let digest = deposit_digest(deposit_id, &deposit.amount, &deposit.owner);
        if !Signer::verify(&deposit.owner, &digest, &unlock) {
            return Err(ContractError::SignatureMismatch {
                expected: deposit.owner,
            });
        }
        if !state.withdrawing_deposits.insert(deposit_id) {
            return Err(ContractError::DepositAlreadyWithdrawing(deposit_id));
        }

        let id = state.next_deposit_withdrawal_id;
        state.next_deposit_withdrawal_id = id.next();
        let requested_at = state.now;
        let checkpoint_id = state.latest_checkpoint_id();
        state.deposit_withdrawals.insert(
            id,
            DepositWithdrawalRecord {
                id,
                deposit_id,
                owner: deposit.owner,
                amount: deposit.amount,
                checkpoint_id,
                requested_at,
                ready_at: requested_at + self.config.deposit_withdrawal_period,
                challenged: false,
            },
        );
        state
            .events
            .push(ContractEvent::DepositWithdrawRequested { id, deposit_id });

        info!(id = %id, deposit_id = %deposit_id, "deposit-withdrawal requested");
        Ok(id)
    }

    async fn challenge_deposit_withdraw(
        &self,
        challenge: &DepositWithdrawChallenge,
    ) -> Result<(), ContractError> {
        let mut state = self.state();
        state.ensure_running()?;

        let now = state.now;
        let latest = state.latest_checkpoint_id();
        let record = state
            .deposit_withdrawals
            .get_mut(&challenge.id)
            .ok_or(ContractError::not_found(
                RecordKind::DepositWithdrawal,
                challenge.id.value(),
            ))?;

        if now >= record.ready_at {
            return Err(ContractError::WindowClosed {
                closed_at: record.ready_at,
                now,
            });
        }
        if record.challenged {
            return Err(ContractError::Challenged(challenge.id));
        }
        if latest <= record.checkpoint_id {
            return Err(ContractError::NothingToChallenge(record.checkpoint_id));
        }
        if challenge.proof_transactions.is_empty()
            || challenge.proof_changes.is_empty()
            || challenge.proof_accounts.is_empty()
        {
            return Err(ContractError::InvalidProof("challenge proofs must be non-empty".into()));
        }

        record.challenged = true;
        state
            .events
            .push(ContractEvent::DepositWithdrawChallenged { id: challenge.id });

        warn!(id = %challenge.id, "deposit-withdrawal challenged");
        Ok(())
    }

    async fn finalise_deposit_withdraw(&self, id: DepositWithdrawalId) -> Result<(), ContractError> {
        let mut state = self.state();
        state.ensure_running()?;

        let record = state
            .deposit_withdrawals
            .get(&id)
            .cloned()
            .ok_or(ContractError::not_found(RecordKind::DepositWithdrawal, id.value()))?;
        if record.challenged {
            return Err(ContractError::Challenged(id));
        }
        if state.now < record.ready_at {
            return Err(ContractError::TooEarly {
                ready_at: record.ready_at,
                now: state.now,
            });
        }

        state.pay(record.owner, record.amount)?;
        state.deposit_withdrawals.remove(&id);
        state.deposits.remove(&record.deposit_id);
        state.events.push(ContractEvent::DepositWithdrawFinalised {
            id,
            owner: record.owner,
            amount: record.amount,
        });

        info!(id = %id, owner = %record.owner, amount = %record.amount, "deposit-withdrawal finalised");
        Ok(())
    }

    async fn deposit_withdraw_prove(
        &self,
        deposit_id: DepositId,
        unlock: &Signature,
    ) -> Result<bool, ContractError> {
        let state = self.state();
        Ok(match state.deposits.get(&deposit_id) {
            Some(deposit) => Signer::verify(
                &deposit.owner,
                &deposit_digest(deposit_id, &deposit.amount, &deposit.owner),
                unlock,
            ),
            None => false,
        })
    }

    async fn invalidate(&self, proof: &FraudProof) -> Result<bool, ContractError> {
        let mut state = self.state();

        let checkpoint = state.checkpoint(proof.checkpoint_id)?.clone();
        let previous_id = proof
            .checkpoint_id
            .previous()
            .ok_or(ContractError::not_found(RecordKind::Checkpoint, 0))?;
        let previous = state.checkpoint(previous_id)?.clone();
        state.ensure_running()?;

        let prev_ok = verify(&proof.prev_slot_proof, &proof.prev_slot_key_hash, &previous.accounts_root);
        let cur_ok = verify(&proof.cur_slot_proof, &proof.cur_slot_key_hash, &previous.accounts_root);
        if !prev_ok || !cur_ok {
            return Err(ContractError::InvalidProof(format!(
                "slot proofs do not match checkpoint {previous_id} accounts root"
            )));
        }

        // The signature is checked over the re-derived digest before inclusion:
        // a lock or amount that differs from what was signed halts here.
        let digest = transaction_digest(proof.kind, &proof.lock, &proof.amount);
        if !Signer::verify(&proof.lock, &digest, &proof.signature) {
            self.halt(&mut state, proof.checkpoint_id, "transaction signature does not match lock");
            return Ok(true);
        }

        if !verify(&proof.tx_proof, &digest, &checkpoint.tx_root) {
            return Err(ContractError::InvalidProof(format!(
                "transaction is not in checkpoint {}",
                proof.checkpoint_id
            )));
        }
        if proof.cur_slot_key_hash != AccountValue::new(proof.lock, proof.amount).leaf() {
            self.halt(&mut state, proof.checkpoint_id, "account value does not follow transaction");
            return Ok(true);
        }

        Err(ContractError::ConsistentCheckpoint(proof.checkpoint_id))
    }

    async fn query_slot(
        &self,
        requester: Address,
        checkpoint_id: CheckpointId,
        slot_id: SlotId,
    ) -> Result<QueryId, ContractError> {
        let mut state = self.state();
        state.ensure_running()?;
        state.checkpoint(checkpoint_id)?;

        let id = state.next_query_id;
        state.next_query_id = id.next();
        let asked_at = state.now;
        state.queries.insert(
            id,
            SlotQueryRecord {
                id,
                checkpoint_id,
                slot_id,
                requester,
                asked_at,
                deadline: asked_at + self.config.query_period,
                answered: false,
            },
        );
        state.events.push(ContractEvent::SlotQueried {
            id,
            checkpoint_id,
            slot_id,
        });

        info!(query_id = %id, checkpoint_id = %checkpoint_id, slot_id = %slot_id, "slot queried");
        Ok(id)
    }

    async fn answer_slot_query(
        &self,
        query_id: QueryId,
        value: AccountValue,
        proof: &Proof,
    ) -> Result<(), ContractError> {
        let mut state = self.state();
        state.ensure_running()?;

        let query = state
            .queries
            .get(&query_id)
            .cloned()
            .ok_or(ContractError::not_found(RecordKind::SlotQuery, query_id.value()))?;
        if query.answered {
            return Err(ContractError::AlreadyAnswered(query_id));
        }
        if state.now >= query.deadline {
            return Err(ContractError::WindowClosed {
                closed_at: query.deadline,
                now: state.now,
            });
        }
        let accounts_root = state.checkpoint(query.checkpoint_id)?.accounts_root;
        if !verify(proof, &value.leaf(), &accounts_root) {
            return Err(ContractError::InvalidProof(format!(
                "account value is not in checkpoint {}",
                query.checkpoint_id
            )));
        }

        if let Some(record) = state.queries.get_mut(&query_id) {
            record.answered = true;
        }
        state
            .events
            .push(ContractEvent::SlotQueryAnswered { id: query_id });
        Ok(())
    }

    async fn now(&self) -> Result<u64, ContractError> {
        Ok(self.current_time())
    }

    async fn halted(&self) -> Result<bool, ContractError> {
        Ok(self.is_halted())
    }

    async fn latest_checkpoint(&self) -> Result<Option<CheckpointId>, ContractError> {
        Ok(self.state().checkpoints.keys().next_back().copied())
    }

    async fn checkpoint_record(
        &self,
        id: CheckpointId,
    ) -> Result<Option<CheckpointRecord>, ContractError> {
        Ok(self.state().checkpoints.get(&id).cloned())
    }

    async fn withdrawal_record(
        &self,
        id: WithdrawalId,
    ) -> Result<Option<WithdrawalRecord>, ContractError> {
        Ok(self.state().withdrawals.get(&id).cloned())
    }

    async fn deposit_record(&self, id: DepositId) -> Result<Option<DepositRecord>, ContractError> {
        Ok(self.state().deposits.get(&id).cloned())
    }

    async fn deposit_withdrawal_record(
        &self,
        id: DepositWithdrawalId,
    ) -> Result<Option<DepositWithdrawalRecord>, ContractError> {
        Ok(self.state().deposit_withdrawals.get(&id).cloned())
    }

    async fn slot_query_record(
        &self,
        id: QueryId,
    ) -> Result<Option<SlotQueryRecord>, ContractError> {
        Ok(self.state().queries.get(&id).cloned())
    }
}

// Exit - moving committed balances back on-chain
//
// Regular exit: deposit -> start_withdrawal (proof against a checkpoint's tx
// root) -> challenge period -> finalise_withdrawal.
// Fast exit: deposit -> deposit_withdraw (signed deposit digest) -> period ->
// finalise_deposit_withdraw, unless a newer checkpoint is used to challenge it.

use crate::chain::{ContractError, WithdrawalClaim};
use crate::ids::{CheckpointId, DepositId, DepositWithdrawalId, SlotId, TxId, WithdrawalId};
use crate::ledger::deposit_digest;
use crate::merkle::verify;
use crate::protocol::{Participant, ProtocolError};
use alloy_primitives::U256;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Which exit request a slot is tied to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitRequest {
    Withdrawal(WithdrawalId),
    DepositWithdrawal(DepositWithdrawalId),
}

/// Exit progress of one ledger slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotExitState {
    Exitable,
    WithdrawalStarted { request: ExitRequest, ready_at: u64 },
    Finalised,
    Challenged,
}

/// Result of an on-chain deposit mirrored into the ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepositReceipt {
    pub deposit_id: DepositId,
    pub tx_id: TxId,
    pub slot_id: SlotId,
    pub amount: U256,
}

// ============================================================================
// EXIT BOOK
// ============================================================================

/// Per-slot exit bookkeeping for one participant
#[derive(Clone, Debug, Default)]
pub struct ExitBook {
    slots: BTreeMap<SlotId, SlotExitState>,
    requests: BTreeMap<ExitRequestKey, SlotId>,
    deposits: BTreeMap<DepositId, SlotId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum ExitRequestKey {
    Withdrawal(u64),
    DepositWithdrawal(u64),
}

impl From<ExitRequest> for ExitRequestKey {
    fn from(request: ExitRequest) -> Self {
        match request {
            ExitRequest::Withdrawal(id) => ExitRequestKey::Withdrawal(id.value()),
            ExitRequest::DepositWithdrawal(id) => ExitRequestKey::DepositWithdrawal(id.value()),
        }
    }
}

impl ExitBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit state of a slot; slots never touched by an exit are exitable
    pub fn state_of(&self, slot_id: SlotId) -> SlotExitState {
        self.slots
            .get(&slot_id)
            .copied()
            .unwrap_or(SlotExitState::Exitable)
    }

    pub fn slot_for(&self, request: ExitRequest) -> Option<SlotId> {
        self.requests.get(&request.into()).copied()
    }

    pub fn slot_for_deposit(&self, deposit_id: DepositId) -> Option<SlotId> {
        self.deposits.get(&deposit_id).copied()
    }

    pub fn started(&self) -> impl Iterator<Item = (SlotId, ExitRequest, u64)> + '_ {
        self.slots.iter().filter_map(|(slot, state)| match state {
            SlotExitState::WithdrawalStarted { request, ready_at } => {
                Some((*slot, *request, *ready_at))
            }
            _ => None,
        })
    }

    fn record_deposit(&mut self, deposit_id: DepositId, slot_id: SlotId) {
        self.deposits.insert(deposit_id, slot_id);
    }

    fn start(&mut self, slot_id: SlotId, request: ExitRequest, ready_at: u64) {
        self.slots
            .insert(slot_id, SlotExitState::WithdrawalStarted { request, ready_at });
        self.requests.insert(request.into(), slot_id);
    }

    fn settle(&mut self, request: ExitRequest, outcome: SlotExitState) {
        if let Some(slot) = self.requests.remove(&request.into()) {
            self.slots.insert(slot, outcome);
        }
    }

    fn ready_at(&self, request: ExitRequest) -> Option<u64> {
        let slot = self.slot_for(request)?;
        match self.slots.get(&slot) {
            Some(SlotExitState::WithdrawalStarted { ready_at, .. }) => Some(*ready_at),
            _ => None,
        }
    }
}

// ============================================================================
// EXIT PROTOCOL
// ============================================================================

impl Participant {
    /// A slot is exitable while it holds an account value and no exit has touched it
    pub async fn is_exitable(&self, slot_id: SlotId) -> bool {
        self.exits.state_of(slot_id) == SlotExitState::Exitable
            && self.ledger.lock().await.account(slot_id).is_some()
    }

    /// Slots of this participant that can still be exited
    pub async fn exitable_slots(&self) -> Vec<SlotId> {
        let owned = self.ledger.lock().await.slots_owned_by(&self.address);
        owned
            .into_iter()
            .filter(|slot| self.exits.state_of(*slot) == SlotExitState::Exitable)
            .collect()
    }

    /// Lock `amount` on-chain and record the matching deposit transaction
    pub async fn deposit(&mut self, amount: U256) -> Result<DepositReceipt, ProtocolError> {
        self.ensure_not_halted().await?;

        let deposit_id = self.contract.deposit(self.address, amount).await?;
        let address = self.address;
        let entry = self.append(|ledger| ledger.add_deposit(address, amount)).await;
        self.exits.record_deposit(deposit_id, entry.slot_id);
        let receipt = DepositReceipt {
            deposit_id,
            tx_id: entry.tx_id,
            slot_id: entry.slot_id,
            amount,
        };

        info!(
            participant = %self.address,
            deposit_id = %deposit_id,
            slot_id = %entry.slot_id,
            amount = %amount,
            "deposit recorded"
        );

        // Escrow is already taken; the receipt must survive a failed replication
        if let Err(source) = self.replicate_if_configured().await {
            warn!(deposit_id = %deposit_id, error = %source, "deposit not replicated");
            return Err(ProtocolError::Unreplicated { receipt, source });
        }
        Ok(receipt)
    }

    /// Prove the slot's transaction against checkpoint `checkpoint_id` and open a withdrawal
    pub async fn start_withdrawal(
        &mut self,
        checkpoint_id: CheckpointId,
        slot_id: SlotId,
    ) -> Result<WithdrawalId, ProtocolError> {
        self.ensure_not_halted().await?;

        if !self.is_exitable(slot_id).await {
            return Err(ProtocolError::NotExitable {
                slot_id,
                reason: format!("{:?}", self.exits.state_of(slot_id)),
            });
        }

        let address = self.address;
        let contents = self.checkpoint_contents(checkpoint_id).await?;
        let (_, transaction) = contents
            .slot_transaction(slot_id)
            .ok_or(ProtocolError::not_found("slot", slot_id.value()))?;
        if transaction.lock() != address {
            return Err(ProtocolError::NotExitable {
                slot_id,
                reason: format!("slot is locked to {}", transaction.lock()),
            });
        }
        let proof = contents.tx_proof(&transaction)?;
        let tx_root = contents.tx_root()?;

        let digest = transaction.digest();
        if !verify(&proof, &digest, &tx_root) {
            return Err(ProtocolError::DigestMismatch {
                local: digest,
                remote: tx_root,
            });
        }

        let signature = self.signer.sign(address, digest).await?;
        let claim = WithdrawalClaim {
            checkpoint_id,
            slot_id,
            kind: transaction.kind(),
            lock: transaction.lock(),
            amount: transaction.amount(),
            proof,
            signature,
        };
        let id = self.contract.start_withdrawal(&claim).await?;
        let record = self
            .contract
            .withdrawal_record(id)
            .await?
            .ok_or(ProtocolError::not_found("withdrawal", id.value()))?;
        self.exits
            .start(slot_id, ExitRequest::Withdrawal(id), record.ready_at);

        info!(
            participant = %address,
            withdrawal_id = %id,
            checkpoint_id = %checkpoint_id,
            slot_id = %slot_id,
            ready_at = record.ready_at,
            "withdrawal started"
        );
        Ok(id)
    }

    /// Complete a withdrawal once its challenge period is over
    ///
    /// Too early is reported as `Timing` without calling the contract.
    pub async fn finalise_withdrawal(&mut self, id: WithdrawalId) -> Result<(), ProtocolError> {
        self.ensure_not_halted().await?;
        let request = ExitRequest::Withdrawal(id);
        self.check_ready(request).await?;

        match self.contract.finalise_withdrawal(id).await {
            Ok(()) => {
                self.exits.settle(request, SlotExitState::Finalised);
                info!(participant = %self.address, withdrawal_id = %id, "withdrawal finalised");
                Ok(())
            }
            Err(e @ ContractError::CheckpointInvalidated(_)) => {
                self.exits.settle(request, SlotExitState::Challenged);
                warn!(withdrawal_id = %id, error = %e, "withdrawal blocked");
                Err(ProtocolError::Rejected(e))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Request a fast exit of one of this participant's deposits
    pub async fn deposit_withdraw(
        &mut self,
        deposit_id: DepositId,
    ) -> Result<DepositWithdrawalId, ProtocolError> {
        self.ensure_not_halted().await?;

        let deposit = self
            .contract
            .deposit_record(deposit_id)
            .await?
            .ok_or(ProtocolError::not_found("deposit", deposit_id.value()))?;
        if deposit.owner != self.address {
            return Err(ProtocolError::SignatureInvalid {
                expected: deposit.owner,
            });
        }

        let digest = deposit_digest(deposit_id, &deposit.amount, &deposit.owner);
        let unlock = self.signer.sign(self.address, digest).await?;
        if !self.contract.deposit_withdraw_prove(deposit_id, &unlock).await? {
            return Err(ProtocolError::SignatureInvalid {
                expected: deposit.owner,
            });
        }

        let id = self.contract.deposit_withdraw(deposit_id, unlock).await?;
        let record = self
            .contract
            .deposit_withdrawal_record(id)
            .await?
            .ok_or(ProtocolError::not_found("deposit-withdrawal", id.value()))?;
        if let Some(slot) = self.exits.slot_for_deposit(deposit_id) {
            self.exits
                .start(slot, ExitRequest::DepositWithdrawal(id), record.ready_at);
        }

        info!(
            participant = %self.address,
            id = %id,
            deposit_id = %deposit_id,
            ready_at = record.ready_at,
            "deposit-withdrawal requested"
        );
        Ok(id)
    }

    /// Complete a fast exit; a challenged request stays blocked for good
    pub async fn finalise_deposit_withdraw(
        &mut self,
        id: DepositWithdrawalId,
    ) -> Result<(), ProtocolError> {
        self.ensure_not_halted().await?;
        let request = ExitRequest::DepositWithdrawal(id);
        self.check_ready(request).await?;

        match self.contract.finalise_deposit_withdraw(id).await {
            Ok(()) => {
                self.exits.settle(request, SlotExitState::Finalised);
                info!(participant = %self.address, id = %id, "deposit-withdrawal finalised");
                Ok(())
            }
            Err(e @ ContractError::Challenged(_)) => {
                self.exits.settle(request, SlotExitState::Challenged);
                warn!(id = %id, "deposit-withdrawal was challenged");
                Err(ProtocolError::Rejected(e))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn check_ready(&self, request: ExitRequest) -> Result<(), ProtocolError> {
        if let Some(ready_at) = self.exits.ready_at(request) {
            let now = self.contract.now().await?;
            if now < ready_at {
                return Err(ProtocolError::Timing { ready_at, now });
            }
        }
        Ok(())
    }
}

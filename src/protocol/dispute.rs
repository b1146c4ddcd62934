// Dispute - assembling fraud proofs and challenge material
//
// The contract adjudicates; this side only gathers the right proofs:
// - tx proof from the disputed checkpoint's transactions tree
// - prev/cur slot proofs from the previous checkpoint's accounts tree
// Data availability queries live here too: anyone can demand a slot's data,
// and whoever holds the committed contents answers with value + proof.

use crate::chain::{ContractError, DepositWithdrawChallenge, FraudProof};
use crate::identity::Signature;
use crate::ids::{CheckpointId, DepositWithdrawalId, QueryId, SlotId, TxId};
use crate::ledger::Ledger;
use crate::protocol::{Participant, ProtocolError};
use tracing::{info, warn};

/// Which slots and transaction a fraud proof is about
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisputeTarget {
    pub checkpoint_id: CheckpointId,
    pub tx_id: TxId,
    pub prev_slot: SlotId,
    pub cur_slot: SlotId,
}

impl DisputeTarget {
    pub fn new(checkpoint_id: CheckpointId, tx_id: TxId, prev_slot: SlotId, cur_slot: SlotId) -> Self {
        Self {
            checkpoint_id,
            tx_id,
            prev_slot,
            cur_slot,
        }
    }
}

/// Build a fraud proof from the contents of the disputed checkpoint and of its predecessor
pub fn build_fraud_proof(
    target: &DisputeTarget,
    current: &Ledger,
    previous: &Ledger,
    signature: Signature,
) -> Result<FraudProof, ProtocolError> {
    let transaction = current
        .transaction(target.tx_id)
        .ok_or(ProtocolError::not_found("transaction", target.tx_id.value()))?;
    let tx_proof = current.tx_proof(&transaction)?;

    let prev_value = previous
        .account(target.prev_slot)
        .ok_or(ProtocolError::not_found("slot", target.prev_slot.value()))?;
    let cur_value = previous
        .account(target.cur_slot)
        .ok_or(ProtocolError::not_found("slot", target.cur_slot.value()))?;

    Ok(FraudProof {
        checkpoint_id: target.checkpoint_id,
        tx_id: target.tx_id,
        tx_proof,
        prev_slot_key_hash: prev_value.leaf(),
        prev_slot_proof: previous.account_proof(target.prev_slot)?,
        cur_slot_key_hash: cur_value.leaf(),
        cur_slot_proof: previous.account_proof(target.cur_slot)?,
        kind: transaction.kind(),
        lock: transaction.lock(),
        amount: transaction.amount(),
        signature,
    })
}

impl Participant {
    /// Ask the signing client for the lock's signature over a committed transaction
    pub async fn sign_transaction(
        &mut self,
        checkpoint_id: CheckpointId,
        tx_id: TxId,
    ) -> Result<Signature, ProtocolError> {
        let transaction = self
            .checkpoint_contents(checkpoint_id)
            .await?
            .transaction(tx_id)
            .ok_or(ProtocolError::not_found("transaction", tx_id.value()))?;
        Ok(self.signer.sign(transaction.lock(), transaction.digest()).await?)
    }

    /// Assemble a fraud proof for `target` from the frozen checkpoint contents
    pub async fn fraud_proof(
        &mut self,
        target: &DisputeTarget,
        signature: Signature,
    ) -> Result<FraudProof, ProtocolError> {
        let previous_id = target
            .checkpoint_id
            .previous()
            .ok_or(ProtocolError::not_found("checkpoint", 0))?;
        let previous = self.checkpoint_contents(previous_id).await?;
        let current = self.checkpoint_contents(target.checkpoint_id).await?;
        build_fraud_proof(target, &current, &previous, signature)
    }

    /// Submit a fraud proof; true when the contract halted on it
    pub async fn invalidate(&mut self, proof: &FraudProof) -> Result<bool, ProtocolError> {
        self.ensure_not_halted().await?;

        match self.contract.invalidate(proof).await {
            Ok(true) => {
                self.checkpoints.mark_invalidated(proof.checkpoint_id);
                warn!(
                    participant = %self.address,
                    checkpoint_id = %proof.checkpoint_id,
                    tx_id = %proof.tx_id,
                    "checkpoint invalidated, system halted"
                );
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e @ ContractError::ConsistentCheckpoint(_)) => {
                info!(checkpoint_id = %proof.checkpoint_id, "fraud proof rejected: checkpoint is consistent");
                Err(ProtocolError::Rejected(e))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Challenge a fast exit with the owner's latest slot from a newer checkpoint
    pub async fn challenge_deposit_withdraw(
        &mut self,
        id: DepositWithdrawalId,
    ) -> Result<(), ProtocolError> {
        self.ensure_not_halted().await?;

        let record = self
            .contract
            .deposit_withdrawal_record(id)
            .await?
            .ok_or(ProtocolError::not_found("deposit-withdrawal", id.value()))?;
        let latest = self
            .contract
            .latest_checkpoint()
            .await?
            .filter(|latest| *latest > record.checkpoint_id)
            .ok_or(ProtocolError::Rejected(ContractError::NothingToChallenge(
                record.checkpoint_id,
            )))?;

        let contents = self.checkpoint_contents(latest).await?;
        let slot = contents
            .slots_owned_by(&record.owner)
            .into_iter()
            .next_back()
            .ok_or(ProtocolError::not_found("slot", 0))?;
        let (_, transaction) = contents
            .slot_transaction(slot)
            .ok_or(ProtocolError::not_found("slot", slot.value()))?;

        let challenge = DepositWithdrawChallenge {
            id,
            proof_transactions: contents.tx_proof(&transaction)?,
            proof_changes: contents.change_proof(slot)?,
            proof_accounts: contents.account_proof(slot)?,
        };

        self.contract.challenge_deposit_withdraw(&challenge).await?;
        info!(
            participant = %self.address,
            id = %id,
            checkpoint_id = %latest,
            slot_id = %slot,
            "deposit-withdrawal challenged"
        );
        Ok(())
    }

    /// Demand publication of a slot's data in checkpoint `checkpoint_id`
    pub async fn query_slot(
        &self,
        checkpoint_id: CheckpointId,
        slot_id: SlotId,
    ) -> Result<QueryId, ProtocolError> {
        self.ensure_not_halted().await?;
        let id = self
            .contract
            .query_slot(self.address, checkpoint_id, slot_id)
            .await?;
        info!(query_id = %id, checkpoint_id = %checkpoint_id, slot_id = %slot_id, "slot queried");
        Ok(id)
    }

    /// Answer a slot query with the committed account value and its accounts-tree proof
    pub async fn answer_slot_query(&mut self, query_id: QueryId) -> Result<(), ProtocolError> {
        self.ensure_not_halted().await?;

        let query = self
            .contract
            .slot_query_record(query_id)
            .await?
            .ok_or(ProtocolError::not_found("slot query", query_id.value()))?;
        let contents = self.checkpoint_contents(query.checkpoint_id).await?;
        let value = contents
            .account(query.slot_id)
            .ok_or(ProtocolError::not_found("slot", query.slot_id.value()))?;
        let proof = contents.account_proof(query.slot_id)?;

        self.contract
            .answer_slot_query(query_id, value, &proof)
            .await?;
        info!(query_id = %query_id, slot_id = %query.slot_id, "slot query answered");
        Ok(())
    }
}

// Local Contract Tests
// Adjudication rules of the in-memory commit-chain contract

use alloy_primitives::{Address, U256};
use plasmoid::chain::{
    ContractConfig, ContractError, ContractEvent, DepositWithdrawChallenge, FraudProof,
    LocalContract, PlasmoidContract, RecordKind, WithdrawalClaim,
};
use plasmoid::identity::{Keypair, Signer};
use plasmoid::ids::{CheckpointId, DepositId, DepositWithdrawalId, QueryId, SlotId, TxId};
use plasmoid::ledger::{deposit_digest, AccountValue, Ledger};
use plasmoid::merkle::Proof;

const PERIOD: u64 = 10;

struct Setup {
    operator: Keypair,
    alice: Keypair,
    contract: LocalContract,
}

fn setup() -> Setup {
    let operator = Keypair::generate();
    let alice = Keypair::generate();
    let contract = LocalContract::new(
        operator.address(),
        ContractConfig::new().with_uniform_period(PERIOD),
    )
    .unwrap();
    contract.mint(alice.address(), U256::from(1_000u64));
    Setup {
        operator,
        alice,
        contract,
    }
}

fn ledger_of(owner: Address, deposits: u64) -> Ledger {
    let mut ledger = Ledger::new(owner);
    for _ in 0..deposits {
        ledger.add_deposit(owner, U256::from(100u64));
    }
    ledger.update_trees();
    ledger
}

async fn commit(setup: &Setup, ledger: &Ledger) -> CheckpointId {
    let roots = ledger.roots().unwrap();
    let signature = Signer::sign(&setup.operator, &roots.digest());
    setup
        .contract
        .checkpoint(roots.tx_root, roots.changes_root, roots.accounts_root, signature)
        .await
        .unwrap()
}

fn claim(owner: &Keypair, ledger: &Ledger, checkpoint_id: CheckpointId, slot: u64) -> WithdrawalClaim {
    let slot_id = SlotId::new(slot);
    let (_, transaction) = ledger.slot_transaction(slot_id).unwrap();
    WithdrawalClaim {
        checkpoint_id,
        slot_id,
        kind: transaction.kind(),
        lock: transaction.lock(),
        amount: transaction.amount(),
        proof: ledger.tx_proof(&transaction).unwrap(),
        signature: Signer::sign(owner, &transaction.digest()),
    }
}

fn fraud_proof(
    checkpoint_id: CheckpointId,
    current: &Ledger,
    previous: &Ledger,
    signer: &Keypair,
) -> FraudProof {
    let tx_id = TxId::new(2);
    let transaction = current.transaction(tx_id).unwrap();
    FraudProof {
        checkpoint_id,
        tx_id,
        tx_proof: current.tx_proof(&transaction).unwrap(),
        prev_slot_key_hash: previous.account(SlotId::new(1)).unwrap().leaf(),
        prev_slot_proof: previous.account_proof(SlotId::new(1)).unwrap(),
        cur_slot_key_hash: previous.account(SlotId::new(2)).unwrap().leaf(),
        cur_slot_proof: previous.account_proof(SlotId::new(2)).unwrap(),
        kind: transaction.kind(),
        lock: transaction.lock(),
        amount: transaction.amount(),
        signature: Signer::sign(signer, &transaction.digest()),
    }
}

// ============================================================================
// CHECKPOINTS
// ============================================================================

#[tokio::test]
async fn test_checkpoint_ids_are_sequential() {
    let setup = setup();
    let ledger = ledger_of(setup.alice.address(), 2);

    assert_eq!(commit(&setup, &ledger).await, CheckpointId::new(1));
    assert_eq!(commit(&setup, &ledger).await, CheckpointId::new(2));
    assert_eq!(setup.contract.latest_checkpoint().await.unwrap(), Some(CheckpointId::new(2)));

    let record = setup.contract.checkpoint_record(CheckpointId::new(1)).await.unwrap().unwrap();
    assert_eq!(record.roots(), ledger.roots().unwrap());
    assert_eq!(record.final_at, record.created_at + PERIOD);
}

#[tokio::test]
async fn test_checkpoint_from_non_operator_rejected() {
    let setup = setup();
    let roots = ledger_of(setup.alice.address(), 1).roots().unwrap();
    let signature = Signer::sign(&setup.alice, &roots.digest());

    let result = setup
        .contract
        .checkpoint(roots.tx_root, roots.changes_root, roots.accounts_root, signature)
        .await;
    assert_eq!(result, Err(ContractError::NotOperator(setup.alice.address())));
}

// ============================================================================
// WITHDRAWALS
// ============================================================================

#[tokio::test]
async fn test_withdrawal_lifecycle() {
    let setup = setup();
    let alice = setup.alice.address();
    setup.contract.deposit(alice, U256::from(100u64)).await.unwrap();
    let ledger = ledger_of(alice, 1);
    let checkpoint_id = commit(&setup, &ledger).await;

    let id = setup
        .contract
        .start_withdrawal(&claim(&setup.alice, &ledger, checkpoint_id, 1))
        .await
        .unwrap();

    assert_eq!(
        setup.contract.finalise_withdrawal(id).await,
        Err(ContractError::TooEarly { ready_at: PERIOD, now: 0 })
    );

    setup.contract.advance_time(PERIOD);
    setup.contract.finalise_withdrawal(id).await.unwrap();
    assert_eq!(setup.contract.balance_of(&alice), U256::from(1_000u64));
    assert_eq!(setup.contract.escrow(), U256::ZERO);

    assert_eq!(
        setup.contract.finalise_withdrawal(id).await,
        Err(ContractError::not_found(RecordKind::Withdrawal, id.value()))
    );
}

#[tokio::test]
async fn test_second_withdrawal_of_same_slot_rejected() {
    let setup = setup();
    let alice = setup.alice.address();
    setup.contract.deposit(alice, U256::from(100u64)).await.unwrap();
    let ledger = ledger_of(alice, 1);
    let checkpoint_id = commit(&setup, &ledger).await;
    let claim = claim(&setup.alice, &ledger, checkpoint_id, 1);

    setup.contract.start_withdrawal(&claim).await.unwrap();
    assert!(matches!(
        setup.contract.start_withdrawal(&claim).await,
        Err(ContractError::AlreadyWithdrawing { .. })
    ));
}

#[tokio::test]
async fn test_slot_withdrawn_once_across_checkpoints() {
    let setup = setup();
    let alice = setup.alice.address();
    setup.contract.deposit(alice, U256::from(100u64)).await.unwrap();
    setup.contract.deposit(alice, U256::from(100u64)).await.unwrap();
    let ledger = ledger_of(alice, 2);

    // Nothing changes between the two commits, so both carry the same roots
    let first = commit(&setup, &ledger).await;
    let second = commit(&setup, &ledger).await;

    let id = setup
        .contract
        .start_withdrawal(&claim(&setup.alice, &ledger, first, 1))
        .await
        .unwrap();
    assert_eq!(
        setup
            .contract
            .start_withdrawal(&claim(&setup.alice, &ledger, second, 1))
            .await,
        Err(ContractError::AlreadyWithdrawing {
            checkpoint_id: first,
            slot_id: SlotId::new(1),
        })
    );

    setup.contract.advance_time(PERIOD);
    setup.contract.finalise_withdrawal(id).await.unwrap();
    assert_eq!(setup.contract.balance_of(&alice), U256::from(900u64));
    assert_eq!(setup.contract.escrow(), U256::from(100u64));
}

#[tokio::test]
async fn test_withdrawal_signed_by_other_key_rejected() {
    let setup = setup();
    let ledger = ledger_of(setup.alice.address(), 1);
    let checkpoint_id = commit(&setup, &ledger).await;

    let forged = claim(&Keypair::generate(), &ledger, checkpoint_id, 1);
    assert_eq!(
        setup.contract.start_withdrawal(&forged).await,
        Err(ContractError::SignatureMismatch {
            expected: setup.alice.address()
        })
    );
}

#[tokio::test]
async fn test_withdrawal_with_bad_proof_rejected() {
    let setup = setup();
    let ledger = ledger_of(setup.alice.address(), 3);
    let checkpoint_id = commit(&setup, &ledger).await;

    let mut bad = claim(&setup.alice, &ledger, checkpoint_id, 1);
    bad.proof = Proof::new(Vec::new());
    assert!(matches!(
        setup.contract.start_withdrawal(&bad).await,
        Err(ContractError::InvalidProof(_))
    ));
}

// ============================================================================
// FAST EXITS
// ============================================================================

#[tokio::test]
async fn test_deposit_withdraw_finalises_after_period() {
    let setup = setup();
    let alice = setup.alice.address();
    let amount = U256::from(250u64);
    let deposit_id = setup.contract.deposit(alice, amount).await.unwrap();

    let unlock = Signer::sign(&setup.alice, &deposit_digest(deposit_id, &amount, &alice));
    assert!(setup.contract.deposit_withdraw_prove(deposit_id, &unlock).await.unwrap());
    let id = setup.contract.deposit_withdraw(deposit_id, unlock).await.unwrap();

    assert_eq!(
        setup.contract.deposit_withdraw(deposit_id, unlock).await,
        Err(ContractError::DepositAlreadyWithdrawing(deposit_id))
    );

    setup.contract.advance_time(PERIOD);
    setup.contract.finalise_deposit_withdraw(id).await.unwrap();
    assert_eq!(setup.contract.balance_of(&alice), U256::from(1_000u64));
}

#[tokio::test]
async fn test_wrong_unlock_signature_rejected() {
    let setup = setup();
    let alice = setup.alice.address();
    let deposit_id = setup.contract.deposit(alice, U256::from(5u64)).await.unwrap();

    let wrong = Signer::sign(&setup.operator, &deposit_digest(deposit_id, &U256::from(5u64), &alice));
    assert!(!setup.contract.deposit_withdraw_prove(deposit_id, &wrong).await.unwrap());
    assert!(!setup
        .contract
        .deposit_withdraw_prove(DepositId::new(42), &wrong)
        .await
        .unwrap());
    assert!(matches!(
        setup.contract.deposit_withdraw(deposit_id, wrong).await,
        Err(ContractError::SignatureMismatch { .. })
    ));
}

#[tokio::test]
async fn test_challenge_needs_newer_checkpoint() {
    let setup = setup();
    let alice = setup.alice.address();
    let amount = U256::from(100u64);
    let deposit_id = setup.contract.deposit(alice, amount).await.unwrap();
    let unlock = Signer::sign(&setup.alice, &deposit_digest(deposit_id, &amount, &alice));
    let id = setup.contract.deposit_withdraw(deposit_id, unlock).await.unwrap();

    let ledger = ledger_of(alice, 2);
    let challenge = DepositWithdrawChallenge {
        id,
        proof_transactions: ledger.tx_proof_by_id(TxId::new(1)).unwrap(),
        proof_changes: ledger.change_proof(SlotId::new(1)).unwrap(),
        proof_accounts: ledger.account_proof(SlotId::new(1)).unwrap(),
    };
    assert_eq!(
        setup.contract.challenge_deposit_withdraw(&challenge).await,
        Err(ContractError::NothingToChallenge(CheckpointId::default()))
    );

    commit(&setup, &ledger).await;
    setup.contract.challenge_deposit_withdraw(&challenge).await.unwrap();

    setup.contract.advance_time(PERIOD);
    assert_eq!(
        setup.contract.finalise_deposit_withdraw(id).await,
        Err(ContractError::Challenged(id))
    );
    assert!(setup
        .contract
        .poll_events()
        .contains(&ContractEvent::DepositWithdrawChallenged { id }));
}

#[tokio::test]
async fn test_unknown_deposit_withdrawal() {
    let setup = setup();
    assert_eq!(
        setup.contract.finalise_deposit_withdraw(DepositWithdrawalId::new(3)).await,
        Err(ContractError::not_found(RecordKind::DepositWithdrawal, 3))
    );
}

// ============================================================================
// INVALIDATION
// ============================================================================

#[tokio::test]
async fn test_consistent_checkpoint_is_not_invalidated() {
    let setup = setup();
    let ledger = ledger_of(setup.alice.address(), 4);
    commit(&setup, &ledger).await;
    let checkpoint_id = commit(&setup, &ledger).await;

    let proof = fraud_proof(checkpoint_id, &ledger, &ledger, &setup.alice);
    assert_eq!(
        setup.contract.invalidate(&proof).await,
        Err(ContractError::ConsistentCheckpoint(checkpoint_id))
    );
    assert!(!setup.contract.is_halted());
}

#[tokio::test]
async fn test_forged_signature_halts_contract() {
    let setup = setup();
    let alice = setup.alice.address();
    setup.contract.deposit(alice, U256::from(100u64)).await.unwrap();
    let ledger = ledger_of(alice, 4);
    commit(&setup, &ledger).await;
    let checkpoint_id = commit(&setup, &ledger).await;

    let proof = fraud_proof(checkpoint_id, &ledger, &ledger, &Keypair::generate());
    assert_eq!(setup.contract.invalidate(&proof).await, Ok(true));
    assert!(setup.contract.is_halted());

    let record = setup.contract.checkpoint_record(checkpoint_id).await.unwrap().unwrap();
    assert!(record.invalidated);
    assert_eq!(
        setup.contract.deposit(alice, U256::from(1u64)).await,
        Err(ContractError::Halted)
    );
    assert!(setup
        .contract
        .poll_events()
        .contains(&ContractEvent::Halted { checkpoint_id }));
}

#[tokio::test]
async fn test_mismatched_account_value_halts_contract() {
    let setup = setup();
    let alice = setup.alice.address();

    // Slot 2 of the previous checkpoint does not hold what tx 2 says it should
    let mut previous = Ledger::new(alice);
    previous.add_deposit(alice, U256::from(100u64));
    previous.add_deposit(alice, U256::from(1u64));
    previous.update_trees();
    let current = ledger_of(alice, 2);

    commit(&setup, &previous).await;
    let checkpoint_id = commit(&setup, &current).await;

    let proof = fraud_proof(checkpoint_id, &current, &previous, &setup.alice);
    assert_eq!(setup.contract.invalidate(&proof).await, Ok(true));
}

#[tokio::test]
async fn test_tampered_lock_halts_contract() {
    let setup = setup();
    let ledger = ledger_of(setup.alice.address(), 4);
    commit(&setup, &ledger).await;
    let checkpoint_id = commit(&setup, &ledger).await;

    let mut proof = fraud_proof(checkpoint_id, &ledger, &ledger, &setup.alice);
    proof.lock = Address::repeat_byte(0xee);
    assert_eq!(setup.contract.invalidate(&proof).await, Ok(true));
    assert!(setup.contract.is_halted());
}

#[tokio::test]
async fn test_tampered_amount_halts_contract() {
    let setup = setup();
    let ledger = ledger_of(setup.alice.address(), 4);
    commit(&setup, &ledger).await;
    let checkpoint_id = commit(&setup, &ledger).await;

    let mut proof = fraud_proof(checkpoint_id, &ledger, &ledger, &setup.alice);
    proof.amount = U256::ZERO;
    assert_eq!(setup.contract.invalidate(&proof).await, Ok(true));
    assert!(setup.contract.is_halted());
    assert!(setup
        .contract
        .checkpoint_record(checkpoint_id)
        .await
        .unwrap()
        .unwrap()
        .invalidated);
}

#[tokio::test]
async fn test_signed_transaction_outside_checkpoint_is_rejected() {
    let setup = setup();
    let ledger = ledger_of(setup.alice.address(), 4);
    commit(&setup, &ledger).await;
    let checkpoint_id = commit(&setup, &ledger).await;

    let mut proof = fraud_proof(checkpoint_id, &ledger, &ledger, &setup.alice);
    proof.tx_proof = Proof::new(Vec::new());
    assert!(matches!(
        setup.contract.invalidate(&proof).await,
        Err(ContractError::InvalidProof(_))
    ));
    assert!(!setup.contract.is_halted());
}

#[tokio::test]
async fn test_invalidate_first_checkpoint_has_no_previous() {
    let setup = setup();
    let ledger = ledger_of(setup.alice.address(), 2);
    let checkpoint_id = commit(&setup, &ledger).await;

    let proof = fraud_proof(checkpoint_id, &ledger, &ledger, &Keypair::generate());
    assert!(matches!(
        setup.contract.invalidate(&proof).await,
        Err(ContractError::NotFound { kind: RecordKind::Checkpoint, .. })
    ));
    assert!(!setup.contract.is_halted());
}

// ============================================================================
// SLOT QUERIES
// ============================================================================

#[tokio::test]
async fn test_slot_query_answered_with_proof() {
    let setup = setup();
    let alice = setup.alice.address();
    let ledger = ledger_of(alice, 3);
    let checkpoint_id = commit(&setup, &ledger).await;

    let id = setup
        .contract
        .query_slot(alice, checkpoint_id, SlotId::new(2))
        .await
        .unwrap();
    assert_eq!(id, QueryId::new(1));

    let wrong = AccountValue::new(alice, U256::from(7u64));
    let proof = ledger.account_proof(SlotId::new(2)).unwrap();
    assert!(matches!(
        setup.contract.answer_slot_query(id, wrong, &proof).await,
        Err(ContractError::InvalidProof(_))
    ));

    let value = ledger.account(SlotId::new(2)).unwrap();
    setup.contract.answer_slot_query(id, value, &proof).await.unwrap();
    assert!(setup.contract.slot_query_record(id).await.unwrap().unwrap().answered);
    assert_eq!(
        setup.contract.answer_slot_query(id, value, &proof).await,
        Err(ContractError::AlreadyAnswered(id))
    );
}

#[tokio::test]
async fn test_slot_query_window_closes() {
    let setup = setup();
    let ledger = ledger_of(setup.alice.address(), 1);
    let checkpoint_id = commit(&setup, &ledger).await;
    let id = setup
        .contract
        .query_slot(setup.alice.address(), checkpoint_id, SlotId::new(1))
        .await
        .unwrap();

    setup.contract.advance_time(PERIOD);
    let value = ledger.account(SlotId::new(1)).unwrap();
    let proof = ledger.account_proof(SlotId::new(1)).unwrap();
    assert!(matches!(
        setup.contract.answer_slot_query(id, value, &proof).await,
        Err(ContractError::WindowClosed { .. })
    ));
}

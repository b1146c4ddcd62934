// Ledger State Tests
// Appends, tree rebuilds, proofs and snapshot replacement

use alloy_primitives::{Address, U256};
use plasmoid::ids::{SlotId, TxId};
use plasmoid::ledger::{
    change_leaf, AccountValue, Ledger, LedgerError, Transaction, TreeKind, TxKind,
};
use plasmoid::merkle::{verify, OddNodePolicy};

fn alice() -> Address {
    Address::repeat_byte(0xa1)
}

fn bob() -> Address {
    Address::repeat_byte(0xb0)
}

fn amount(v: u64) -> U256 {
    U256::from(v)
}

// ============================================================================
// LEDGER CREATION
// ============================================================================

#[test]
fn test_ledger_new() {
    let ledger = Ledger::new(alice());

    assert_eq!(ledger.owner(), alice());
    assert!(ledger.is_empty());
    assert_eq!(ledger.transaction_count(), 0);
    assert_eq!(ledger.next_tx_id(), TxId::new(1));
    assert_eq!(ledger.next_slot_id(), SlotId::new(1));
    assert!(ledger.is_participant(&alice()));
}

#[test]
fn test_empty_ledger_has_no_roots() {
    let mut ledger = Ledger::new(alice());
    ledger.update_trees();
    assert_eq!(ledger.tx_root(), Err(LedgerError::EmptyTree(TreeKind::Transactions)));
}

// ============================================================================
// APPENDS
// ============================================================================

#[test]
fn test_append_assigns_sequential_ids() {
    let mut ledger = Ledger::new(alice());

    let first = ledger.add_deposit(alice(), amount(100));
    let second = ledger.add_withdrawal(bob(), amount(40));

    assert_eq!((first.tx_id, first.slot_id), (TxId::new(1), SlotId::new(1)));
    assert_eq!((second.tx_id, second.slot_id), (TxId::new(2), SlotId::new(2)));
    assert_eq!(second.transaction.kind(), TxKind::Withdrawal);
    assert_eq!(ledger.transaction_count(), 2);
}

#[test]
fn test_append_fills_all_collections() {
    let mut ledger = Ledger::new(alice());
    let entry = ledger.add_deposit(bob(), amount(7));

    assert_eq!(ledger.transaction(entry.tx_id), Some(Transaction::deposit(bob(), amount(7))));
    assert_eq!(ledger.change(entry.slot_id), Some(entry.tx_id));
    assert_eq!(ledger.account(entry.slot_id), Some(AccountValue::new(bob(), amount(7))));
    assert_eq!(ledger.slots_owned_by(&bob()), vec![entry.slot_id]);
    assert!(ledger.is_participant(&bob()));
}

#[test]
fn test_unknown_ids_read_as_none() {
    let ledger = Ledger::new(alice());
    assert_eq!(ledger.transaction(TxId::new(0)), None);
    assert_eq!(ledger.transaction(TxId::new(3)), None);
    assert_eq!(ledger.account(SlotId::new(1)), None);
    assert_eq!(ledger.slot_transaction(SlotId::new(1)), None);
}

// ============================================================================
// STALE TREES
// ============================================================================

#[test]
fn test_reads_fail_until_trees_rebuilt() {
    let mut ledger = Ledger::new(alice());
    let entry = ledger.add_deposit(alice(), amount(100));

    assert!(!ledger.is_fresh());
    assert_eq!(ledger.roots(), Err(LedgerError::StaleTree));
    assert_eq!(ledger.account_proof(entry.slot_id), Err(LedgerError::StaleTree));

    ledger.update_trees();
    assert!(ledger.is_fresh());
    assert!(ledger.roots().is_ok());

    ledger.add_deposit(alice(), amount(1));
    assert_eq!(ledger.tx_root(), Err(LedgerError::StaleTree));
}

#[test]
fn test_roots_change_with_every_append() {
    let mut ledger = Ledger::new(alice());
    ledger.add_deposit(alice(), amount(100));
    ledger.update_trees();
    let before = ledger.roots().unwrap();

    ledger.add_deposit(alice(), amount(100));
    ledger.update_trees();
    let after = ledger.roots().unwrap();

    assert_ne!(before.tx_root, after.tx_root);
    assert_ne!(before.digest(), after.digest());
}

#[test]
fn test_identical_appends_give_identical_roots() {
    let mut a = Ledger::new(alice());
    let mut b = Ledger::new(bob());
    for ledger in [&mut a, &mut b] {
        ledger.add_deposit(alice(), amount(10));
        ledger.add_withdrawal(bob(), amount(3));
        ledger.update_trees();
    }
    assert_eq!(a.roots().unwrap(), b.roots().unwrap());
}

// ============================================================================
// PROOFS
// ============================================================================

#[test]
fn test_proofs_verify_against_each_tree() {
    let mut ledger = Ledger::new(alice());
    for i in 1..=5u64 {
        ledger.add_deposit(if i % 2 == 0 { bob() } else { alice() }, amount(i * 10));
    }
    ledger.update_trees();
    let roots = ledger.roots().unwrap();

    for slot in 1..=5u64 {
        let slot = SlotId::new(slot);
        let (tx_id, transaction) = ledger.slot_transaction(slot).unwrap();

        let tx_proof = ledger.tx_proof(&transaction).unwrap();
        assert!(verify(&tx_proof, &transaction.digest(), &roots.tx_root));
        assert_eq!(ledger.tx_proof_by_id(tx_id).unwrap(), tx_proof);

        let change_proof = ledger.change_proof(slot).unwrap();
        assert!(verify(&change_proof, &change_leaf(tx_id), &roots.changes_root));

        let value = ledger.account(slot).unwrap();
        let account_proof = ledger.account_proof(slot).unwrap();
        assert!(verify(&account_proof, &value.leaf(), &roots.accounts_root));
    }
}

#[test]
fn test_proof_for_unknown_records() {
    let mut ledger = Ledger::new(alice());
    ledger.add_deposit(alice(), amount(1));
    ledger.update_trees();

    assert_eq!(
        ledger.account_proof(SlotId::new(9)),
        Err(LedgerError::UnknownSlot(SlotId::new(9)))
    );
    assert_eq!(
        ledger.tx_proof_by_id(TxId::new(9)),
        Err(LedgerError::UnknownTransaction(TxId::new(9)))
    );
    assert!(matches!(
        ledger.tx_proof(&Transaction::withdrawal(bob(), amount(1))),
        Err(LedgerError::Merkle(_))
    ));
}

#[test]
fn test_promote_policy_proofs_verify() {
    let mut ledger = Ledger::with_policy(alice(), OddNodePolicy::Promote);
    for _ in 0..3 {
        ledger.add_deposit(alice(), amount(100));
    }
    ledger.update_trees();
    let roots = ledger.roots().unwrap();

    let value = ledger.account(SlotId::new(3)).unwrap();
    let proof = ledger.account_proof(SlotId::new(3)).unwrap();
    assert!(verify(&proof, &value.leaf(), &roots.accounts_root));
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

#[test]
fn test_apply_replaces_contents() {
    let mut source = Ledger::new(alice());
    source.add_deposit(alice(), amount(100));
    source.add_deposit(bob(), amount(50));
    source.update_trees();

    let mut replica = Ledger::new(bob());
    replica.add_deposit(bob(), amount(999));
    replica.apply(&source.snapshot()).unwrap();
    replica.update_trees();

    assert_eq!(replica.transaction_count(), 2);
    assert_eq!(replica.next_slot_id(), SlotId::new(3));
    assert_eq!(replica.roots().unwrap(), source.roots().unwrap());
    assert!(replica.is_participant(&alice()));
    assert_eq!(replica.owner(), bob());
}

#[test]
fn test_apply_marks_trees_stale() {
    let mut source = Ledger::new(alice());
    source.add_deposit(alice(), amount(1));

    let mut replica = Ledger::new(bob());
    replica.update_trees();
    replica.apply(&source.snapshot()).unwrap();
    assert_eq!(replica.roots(), Err(LedgerError::StaleTree));
}

#[test]
fn test_version_acts_as_logical_clock() {
    let mut source = Ledger::new(alice());
    for _ in 0..3 {
        source.add_deposit(alice(), amount(1));
    }
    assert_eq!(source.snapshot().sequence(), 3);

    let mut replica = Ledger::new(bob());
    replica.apply(&source.snapshot()).unwrap();
    assert_eq!(replica.version(), 3);

    replica.add_deposit(bob(), amount(1));
    assert_eq!(replica.snapshot().sequence(), 4);
    assert_eq!(replica.snapshot().origin(), bob());
}

#[test]
fn test_snapshot_bytes_roundtrip_applies() {
    let mut source = Ledger::new(alice());
    source.add_deposit(alice(), amount(5));
    let bytes = source.snapshot().to_bytes().unwrap();

    let decoded = plasmoid::ledger::LedgerSnapshot::from_bytes(&bytes).unwrap();
    let mut replica = Ledger::new(bob());
    replica.apply(&decoded).unwrap();
    assert_eq!(replica.account(SlotId::new(1)), Some(AccountValue::new(alice(), amount(5))));
}

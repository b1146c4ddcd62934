// Plasmoid CLI - drives participants against an in-memory contract

use alloy_primitives::{Address, U256};
use clap::{Parser, Subcommand, ValueEnum};
use plasmoid::identity::{Keypair, LocalKeystore, Signer, SigningClient};
use plasmoid::ids::{SlotId, TxId};
use plasmoid::merkle::{keccak256, verify, MerkleAccumulator, OddNodePolicy};
use plasmoid::protocol::{connect_mesh, DisputeTarget, Participant, ParticipantConfig, ProtocolError};
use plasmoid::{ContractConfig, LocalContract, PlasmoidContract};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "plasmoid")]
#[command(author, version, about = "Plasma-style commit chain coordinator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Default log level, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "info")]
    log_level: Level,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deposit, checkpoint and exit with a mesh of participants
    Demo {
        /// Number of participants, the first one operates the contract
        #[arg(short = 'n', long, default_value = "3")]
        participants: usize,

        /// Amount each participant deposits
        #[arg(short, long, default_value = "100")]
        amount: u64,

        /// Length of every challenge period in seconds
        #[arg(short, long, default_value = "60")]
        period: u64,
    },

    /// Halt the contract with a fraud proof against a forged transaction
    Dispute {
        /// Deposits made before the disputed checkpoint
        #[arg(short, long, default_value = "4")]
        deposits: u64,
    },

    /// Print the root and proofs of a tree over the keccak256 of each argument
    Merkle {
        /// Leaf preimages
        #[arg(required = true)]
        leaves: Vec<String>,

        /// How an unpaired node is carried to the next level
        #[arg(long, value_enum, default_value = "duplicate")]
        policy: PolicyArg,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    Duplicate,
    Promote,
}

impl From<PolicyArg> for OddNodePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Duplicate => OddNodePolicy::Duplicate,
            PolicyArg::Promote => OddNodePolicy::Promote,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let result = match cli.command {
        Command::Demo {
            participants,
            amount,
            period,
        } => run_demo(participants, amount, period).await,
        Command::Dispute { deposits } => run_dispute(deposits).await,
        Command::Merkle { leaves, policy } => run_merkle(&leaves, policy.into()),
    };

    if let Err(e) = result {
        error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

struct Network {
    contract: Arc<LocalContract>,
    participants: Vec<Participant>,
}

fn network(count: usize, config: ContractConfig) -> Result<Network, ProtocolError> {
    if count == 0 {
        return Err(ProtocolError::InvalidConfig("at least one participant is required".into()));
    }

    let mut keystore = LocalKeystore::new();
    let addresses: Vec<Address> = (0..count).map(|_| keystore.generate()).collect();
    let signer: Arc<dyn SigningClient> = Arc::new(keystore);

    let local = Arc::new(LocalContract::new(addresses[0], config)?);
    let contract: Arc<dyn PlasmoidContract> = local.clone();

    let participants = addresses
        .iter()
        .map(|address| {
            Participant::new(
                *address,
                ParticipantConfig::new(),
                Arc::clone(&contract),
                Arc::clone(&signer),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Network {
        contract: local,
        participants,
    })
}

async fn run_demo(count: usize, amount: u64, period: u64) -> Result<(), ProtocolError> {
    let Network {
        contract,
        mut participants,
    } = network(count, ContractConfig::new().with_uniform_period(period))?;
    let listeners = connect_mesh(&mut participants).await;
    let amount = U256::from(amount);

    let mut receipts = Vec::with_capacity(participants.len());
    for participant in participants.iter_mut() {
        contract.mint(participant.address(), amount);
        receipts.push(participant.deposit(amount).await?);
    }

    let checkpoint = participants[0].make_checkpoint().await?;
    for participant in participants.iter_mut().skip(1) {
        participant.refresh_checkpoint(checkpoint.id()).await?;
    }

    let mut withdrawals = Vec::with_capacity(participants.len());
    for (participant, receipt) in participants.iter_mut().zip(&receipts) {
        let id = participant
            .start_withdrawal(checkpoint.id(), receipt.slot_id)
            .await?;
        withdrawals.push(id);
    }

    contract.advance_time(period);
    for (participant, id) in participants.iter_mut().zip(withdrawals) {
        participant.finalise_withdrawal(id).await?;
        info!(
            participant = %participant.address(),
            balance = %contract.balance_of(&participant.address()),
            "exit complete"
        );
    }
    info!(escrow = %contract.escrow(), "demo finished");

    drop(participants);
    for listener in listeners {
        if let Ok(stats) = listener.await {
            info!(
                applied = stats.snapshots_applied,
                dropped = stats.duplicates_dropped,
                "replica closed"
            );
        }
    }
    Ok(())
}

async fn run_dispute(deposits: u64) -> Result<(), ProtocolError> {
    let Network {
        contract,
        mut participants,
    } = network(1, ContractConfig::default())?;
    let operator = &mut participants[0];
    let value = U256::from(100u64);

    contract.mint(operator.address(), value * U256::from(deposits.max(2)));
    for _ in 0..deposits.max(2) {
        operator.deposit(value).await?;
    }
    let first = operator.make_checkpoint().await?;
    let second = operator.make_checkpoint().await?;
    info!(previous = %first.id(), disputed = %second.id(), "checkpoints committed");

    let target = DisputeTarget::new(second.id(), TxId::new(2), SlotId::new(1), SlotId::new(2));

    let honest = operator.sign_transaction(target.checkpoint_id, target.tx_id).await?;
    let proof = operator.fraud_proof(&target, honest).await?;
    match operator.invalidate(&proof).await {
        Err(ProtocolError::Rejected(e)) => info!(reason = %e, "honest signature rejected"),
        Err(e) => return Err(e),
        Ok(halted) => warn!(halted, "honest signature unexpectedly accepted"),
    }

    let forger = Keypair::generate();
    let transaction = operator
        .ledger()
        .await
        .transaction(target.tx_id)
        .ok_or(ProtocolError::not_found("transaction", target.tx_id.value()))?;
    let forged = Signer::sign(&forger, &transaction.digest());
    let proof = operator.fraud_proof(&target, forged).await?;
    let halted = operator.invalidate(&proof).await?;

    info!(halted, contract_halted = contract.is_halted(), "fraud proof submitted");
    match operator.deposit(value).await {
        Err(ProtocolError::Halted) => info!("deposits refused after halt"),
        other => warn!(result = ?other.map(|receipt| receipt.slot_id), "deposit after halt"),
    }
    Ok(())
}

fn run_merkle(preimages: &[String], policy: OddNodePolicy) -> Result<(), ProtocolError> {
    let leaves: Vec<_> = preimages.iter().map(keccak256).collect();
    let tree = MerkleAccumulator::with_policy(leaves.clone(), policy);
    let root = tree.root()?;
    info!(root = %root, depth = tree.depth(), leaves = tree.len(), ?policy, "tree built");

    for (preimage, leaf) in preimages.iter().zip(&leaves) {
        let proof = tree.proof(leaf)?;
        info!(
            preimage = %preimage,
            leaf = %leaf,
            proof = %proof.to_hex(),
            valid = verify(&proof, leaf, &root),
            "leaf proof"
        );
    }

    Ok(())
}

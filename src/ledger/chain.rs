use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

use std::collections::{HashMap, HashSet};

use super::amount::Amount;
use super::block::{Block, MiningHooks, MiningOutcome, MiningSnapshot};
use super::crypto::Address;
use super::identity::Identity;
use super::transaction::{SignatureError, Transaction};
use crate::config::LedgerConfig;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("Participant already registered: {0}")]
    AlreadyRegistered(String),

    #[error("No miner designated")]
    NoMinerDesignated,

    #[error("The transaction pool is empty")]
    EmptyPool,

    #[error("Transaction amount must be positive, got {0}")]
    NonPositiveAmount(Amount),

    #[error("Transaction fee must not be negative, got {0}")]
    NegativeFee(Amount),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Amount, available: Amount },

    #[error("Mined block does not extend the current chain tip")]
    StaleBlock,

    #[error("Mined block failed verification")]
    InvalidMinedBlock,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),
}

/// Outcome of a ledger-level mining round.
#[derive(Debug, Clone)]
pub enum MiningResult {
    /// The search succeeded; the block is now the chain tip.
    Mined {
        block: Block,
        /// Base reward plus collected fees, credited to the miner.
        reward: Amount,
        snapshot: MiningSnapshot,
    },
    /// The search was cancelled; chain, pool and reward are untouched.
    Aborted { snapshot: MiningSnapshot },
}

/// One row of the all-participant balance listing.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceEntry {
    pub name: String,
    pub address: Address,
    pub balance: Amount,
    pub is_miner: bool,
}

/// A confirmed transaction located by its containing block.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmedTransaction {
    pub block_index: usize,
    pub transaction: Transaction,
}

/// A fully assembled candidate block, ready for the proof-of-work search.
pub(crate) struct Candidate {
    pub(crate) block: Block,
    pub(crate) base_reward: Amount,
    pub(crate) total_reward: Amount,
}

/// The ledger: chain, pending-transaction pool, participant directory and
/// reward schedule.
///
/// A single logical writer mutates chain and pool, one call at a time; the
/// only long-running operation is the proof-of-work search, which observes
/// a cooperative abort signal (see [`Block::mine`] and the `miner` module).
#[derive(Debug)]
pub struct Ledger {
    name: String,
    chain: Vec<Block>,
    pool: Vec<Transaction>,
    participants: HashMap<String, Identity>,
    /// Registration order, kept for display listings.
    roster: Vec<String>,
    miner: Option<String>,
    difficulty: usize,
    block_reward: Amount,
    halving_interval: u64,
    starting_balance: Amount,
    mining_log: Vec<MiningSnapshot>,
}

impl Ledger {
    /// Creates a ledger from its configuration: installs the genesis block,
    /// registers the configured participants and designates the configured
    /// miner.
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        if config.difficulty > 64 {
            return Err(LedgerError::InvalidConfig(
                "difficulty cannot exceed the 64 hex digits of a hash".to_string(),
            ));
        }
        if config.halving_interval == 0 {
            return Err(LedgerError::InvalidConfig(
                "halving interval must be at least 1".to_string(),
            ));
        }
        if config.block_reward.is_negative() {
            return Err(LedgerError::InvalidConfig(
                "block reward must not be negative".to_string(),
            ));
        }
        if config.starting_balance.is_negative() {
            return Err(LedgerError::InvalidConfig(
                "starting balance must not be negative".to_string(),
            ));
        }

        let mut ledger = Ledger {
            name: config.name,
            chain: vec![Block::genesis()],
            pool: Vec::new(),
            participants: HashMap::new(),
            roster: Vec::new(),
            miner: None,
            difficulty: config.difficulty,
            block_reward: config.block_reward,
            halving_interval: config.halving_interval,
            starting_balance: config.starting_balance,
            mining_log: Vec::new(),
        };

        info!("starting the {} instance", ledger.name);
        for name in &config.participants {
            ledger.add_participant(name)?;
        }
        if let Some(miner) = &config.miner {
            ledger.designate_miner(miner)?;
        }

        Ok(ledger)
    }

    /// Creates and registers a new participant identity.
    pub fn add_participant(&mut self, name: &str) -> Result<&Identity, LedgerError> {
        if self.participants.contains_key(name) {
            return Err(LedgerError::AlreadyRegistered(name.to_string()));
        }

        info!("participant joined: {}", name);
        self.roster.push(name.to_string());
        Ok(self
            .participants
            .entry(name.to_string())
            .or_insert_with(|| Identity::new(name)))
    }

    /// Marks the registered participant `name` as the reward recipient for
    /// subsequent mining calls, replacing any previous designation.
    pub fn designate_miner(&mut self, name: &str) -> Result<(), LedgerError> {
        if !self.participants.contains_key(name) {
            return Err(LedgerError::UnknownParticipant(name.to_string()));
        }

        info!("miner designated: {}", name);
        self.miner = Some(name.to_string());
        Ok(())
    }

    pub fn participant(&self, name: &str) -> Option<&Identity> {
        self.participants.get(name)
    }

    /// Registered identities in registration order.
    pub fn participants(&self) -> impl Iterator<Item = &Identity> {
        self.roster
            .iter()
            .filter_map(|name| self.participants.get(name))
    }

    pub fn designated_miner(&self) -> Option<&Identity> {
        self.miner
            .as_deref()
            .and_then(|name| self.participants.get(name))
    }

    /// Replays every confirmed transaction over the configured starting
    /// balance: credits on receipt, debits of amount plus fee on send.
    /// Pure function of chain state; pending transactions are ignored
    /// (see [`Ledger::projected_balance`]).
    pub fn calculate_balance(&self, address: &Address) -> Amount {
        let mut balance = self.starting_balance;
        for block in &self.chain {
            for tx in &block.transactions {
                Self::apply(&mut balance, tx, address);
            }
        }
        balance
    }

    /// Confirmed balance with the pending pool folded in: what the address
    /// would hold if everything currently pooled were mined. Transaction
    /// admission checks this figure so a sender cannot overspend across
    /// multiple pending transfers.
    pub fn projected_balance(&self, address: &Address) -> Amount {
        let mut balance = self.calculate_balance(address);
        for tx in &self.pool {
            Self::apply(&mut balance, tx, address);
        }
        balance
    }

    fn apply(balance: &mut Amount, tx: &Transaction, address: &Address) {
        if tx.sender.as_ref() == Some(address) {
            *balance = *balance - tx.total();
        }
        if &tx.recipient == address {
            *balance += tx.amount;
        }
    }

    /// Balances of all registered participants, in registration order.
    pub fn balances(&self) -> Vec<BalanceEntry> {
        self.participants()
            .map(|identity| BalanceEntry {
                name: identity.name().to_string(),
                address: identity.address().clone(),
                balance: self.calculate_balance(identity.address()),
                is_miner: self.miner.as_deref() == Some(identity.name()),
            })
            .collect()
    }

    /// Confirmed transactions sent or received by `address`, in chain order.
    pub fn history(&self, address: &Address) -> Vec<ConfirmedTransaction> {
        let mut entries = Vec::new();
        for (block_index, block) in self.chain.iter().enumerate() {
            for tx in &block.transactions {
                if tx.sender.as_ref() == Some(address) || &tx.recipient == address {
                    entries.push(ConfirmedTransaction {
                        block_index,
                        transaction: tx.clone(),
                    });
                }
            }
        }
        entries
    }

    /// Builds, signs and enqueues a transfer from `sender` to `recipient`.
    ///
    /// Both names must be registered, the amount must be positive, the fee
    /// non-negative, and the sender's projected balance must cover amount
    /// plus fee. Admitted transactions enter the pool in arrival order.
    ///
    /// # Arguments
    ///
    /// * `sender` - Registered name of the paying participant
    /// * `recipient` - Registered name of the receiving participant
    /// * `amount` - The amount to transfer, must be positive
    /// * `fee` - The fee offered to the miner, must not be negative
    /// * `reference` - Free-form label carried by the transaction
    ///
    /// # Returns
    ///
    /// The signed, admitted transaction
    pub fn create_transaction(
        &mut self,
        sender: &str,
        recipient: &str,
        amount: Amount,
        fee: Amount,
        reference: &str,
    ) -> Result<Transaction, LedgerError> {
        let sender_identity = self
            .participants
            .get(sender)
            .ok_or_else(|| LedgerError::UnknownParticipant(sender.to_string()))?;
        let recipient_identity = self
            .participants
            .get(recipient)
            .ok_or_else(|| LedgerError::UnknownParticipant(recipient.to_string()))?;

        if !amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        if fee.is_negative() {
            return Err(LedgerError::NegativeFee(fee));
        }

        let required = amount + fee;
        let available = self.projected_balance(sender_identity.address());
        if available < required {
            return Err(LedgerError::InsufficientFunds {
                required,
                available,
            });
        }

        let mut tx = Transaction::new(
            sender_identity.address().clone(),
            recipient_identity.address().clone(),
            amount,
            fee,
            reference,
        );
        tx.sign(sender_identity)?;

        info!(
            "transaction admitted: {} sends {} to {} (fee {}, reference {:?})",
            sender, amount, recipient, fee, reference
        );
        self.pool.push(tx.clone());
        Ok(tx)
    }

    /// Assembles the candidate block for the next mining round: the pooled
    /// transactions plus a reward transaction crediting the designated miner
    /// with the (possibly halved) base reward and all collected fees.
    ///
    /// Read-only: committed state changes only when the candidate is
    /// actually mined and appended.
    pub(crate) fn assemble_candidate(
        &self,
        allow_empty_pool: bool,
    ) -> Result<Candidate, LedgerError> {
        let miner = self.designated_miner().ok_or(LedgerError::NoMinerDesignated)?;
        if self.pool.is_empty() && !allow_empty_pool {
            return Err(LedgerError::EmptyPool);
        }

        let base_reward = self.next_base_reward();
        let fees: Amount = self.pool.iter().map(|tx| tx.fee).sum();
        let total_reward = base_reward + fees;

        let mut transactions = self.pool.clone();
        transactions.push(Transaction::reward(miner.address().clone(), total_reward));

        let tip_hash = self.chain.last().unwrap().hash.clone();
        Ok(Candidate {
            block: Block::new(Utc::now(), transactions, tip_hash),
            base_reward,
            total_reward,
        })
    }

    /// The base reward the next block will carry: halved once whenever the
    /// next block index is a multiple of the halving interval. The halved
    /// value becomes standing state only when that block is appended.
    fn next_base_reward(&self) -> Amount {
        let next_index = self.chain.len() as u64;
        if next_index % self.halving_interval == 0 {
            self.block_reward.halved()
        } else {
            self.block_reward
        }
    }

    /// Runs one full mining round synchronously: assembles a candidate,
    /// searches for a qualifying nonce, and on success appends the block
    /// and clears the confirmed transactions from the pool.
    ///
    /// Requires a designated miner, and a non-empty pool unless
    /// `allow_empty_pool` is set. An aborted search discards the candidate
    /// and leaves chain, pool and the running reward unchanged.
    ///
    /// # Arguments
    ///
    /// * `hooks` - Optional progress/attempt observers and abort predicate
    /// * `allow_empty_pool` - Mine a reward-only block if the pool is empty
    ///
    /// # Returns
    ///
    /// The mined block and the reward credited to the miner, or the abort
    /// report
    pub fn mine_next_block(
        &mut self,
        hooks: MiningHooks<'_>,
        allow_empty_pool: bool,
    ) -> Result<MiningResult, LedgerError> {
        let Candidate {
            mut block,
            base_reward,
            total_reward,
        } = self.assemble_candidate(allow_empty_pool)?;

        info!(
            "mining block #{} ({} transaction(s), difficulty {})",
            self.chain.len(),
            block.transactions.len(),
            self.difficulty
        );

        match block.mine(self.difficulty, hooks) {
            MiningOutcome::Found(snapshot) => {
                self.commit(block.clone(), base_reward, snapshot.clone());
                Ok(MiningResult::Mined {
                    block,
                    reward: total_reward,
                    snapshot,
                })
            }
            MiningOutcome::Aborted(snapshot) => {
                info!("mining aborted after {} iterations", snapshot.iterations);
                Ok(MiningResult::Aborted { snapshot })
            }
        }
    }

    /// Appends an externally mined block after verifying that it still
    /// extends the tip, that its hash recomputes, and that it meets the
    /// current difficulty. Returns the reward credited to the miner.
    ///
    /// This is the controller half of the worker protocol in the `miner`
    /// module: only this call touches chain and pool.
    pub fn commit_mined(
        &mut self,
        block: Block,
        snapshot: MiningSnapshot,
    ) -> Result<Amount, LedgerError> {
        if block.previous_hash != self.chain.last().unwrap().hash {
            return Err(LedgerError::StaleBlock);
        }
        if !block.is_valid() || !block.meets_difficulty(self.difficulty) {
            return Err(LedgerError::InvalidMinedBlock);
        }

        let base_reward = self.next_base_reward();
        let reward = block
            .transactions
            .last()
            .filter(|tx| tx.is_reward())
            .map(|tx| tx.amount)
            .unwrap_or(Amount::ZERO);

        self.commit(block, base_reward, snapshot);
        Ok(reward)
    }

    fn commit(&mut self, block: Block, base_reward: Amount, snapshot: MiningSnapshot) {
        info!(
            "block #{} mined with hash {} (nonce {})",
            self.chain.len(),
            block.hash,
            block.nonce
        );

        self.block_reward = base_reward;

        let confirmed: HashSet<String> = block
            .transactions
            .iter()
            .map(Transaction::content_hash)
            .collect();
        self.pool.retain(|tx| !confirmed.contains(&tx.content_hash()));

        self.mining_log.push(snapshot);
        self.chain.push(block);
    }

    /// Full tamper-evidence check: the genesis block must match a fresh
    /// construction, every block's hash must recompute, adjacent blocks
    /// must link by hash, and every transaction must carry a verifying
    /// signature (rewards excepted).
    pub fn is_chain_valid(&self) -> bool {
        match self.chain.first() {
            Some(first) if *first == Block::genesis() => {}
            _ => {
                warn!("genesis block does not match a fresh construction");
                return false;
            }
        }

        for (index, block) in self.chain.iter().enumerate() {
            if !block.is_valid() {
                warn!("block #{} fails hash recomputation", index);
                return false;
            }
            if index > 0 && block.previous_hash != self.chain[index - 1].hash {
                warn!("block #{} does not link to its predecessor", index);
                return false;
            }
            for (tx_index, tx) in block.transactions.iter().enumerate() {
                match tx.is_valid() {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(
                            "transaction {} in block #{} fails signature verification",
                            tx_index, index
                        );
                        return false;
                    }
                    Err(err) => {
                        warn!("transaction {} in block #{}: {}", tx_index, index, err);
                        return false;
                    }
                }
            }
        }

        true
    }

    /// Overwrites a historical transaction amount without recomputing any
    /// hash. Demo hook: the mutation never fails loudly, it is meant to be
    /// caught later by [`Ledger::is_chain_valid`]. Returns whether the
    /// indices addressed an existing transaction.
    pub fn tamper_transaction(
        &mut self,
        block_index: usize,
        tx_index: usize,
        new_amount: Amount,
    ) -> bool {
        match self
            .chain
            .get_mut(block_index)
            .and_then(|block| block.transactions.get_mut(tx_index))
        {
            Some(tx) => {
                tx.amount = new_amount;
                true
            }
            None => false,
        }
    }

    /// The full ledger as pretty JSON: ordered blocks, each in hashing
    /// field order, externally re-verifiable.
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.chain)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn pool(&self) -> &[Transaction] {
        &self.pool
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Adjusts the difficulty for subsequent mining calls. The ledger never
    /// retargets on its own.
    pub fn set_difficulty(&mut self, difficulty: usize) -> Result<(), LedgerError> {
        if difficulty > 64 {
            return Err(LedgerError::InvalidConfig(
                "difficulty cannot exceed the 64 hex digits of a hash".to_string(),
            ));
        }
        self.difficulty = difficulty;
        Ok(())
    }

    /// The current base block reward (before fees, after any halvings).
    pub fn block_reward(&self) -> Amount {
        self.block_reward
    }

    /// Snapshots of every successful mining round, oldest first.
    pub fn mining_log(&self) -> &[MiningSnapshot] {
        &self.mining_log
    }
}

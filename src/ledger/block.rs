use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use std::time::{Duration, Instant};

use super::transaction::Transaction;

/// Sentinel previous-hash carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// How many nonce attempts pass between progress reports and abort checks.
pub const PROGRESS_INTERVAL: u64 = 50;

/// A point-in-time view of a proof-of-work search, reported to progress
/// observers and returned when the search ends.
#[derive(Debug, Clone, Serialize)]
pub struct MiningSnapshot {
    pub nonce: u64,
    pub hash: String,
    pub iterations: u64,
    pub elapsed: Duration,
}

/// Terminal state of one mining round: the search either found a hash
/// matching the difficulty or was cancelled cooperatively.
#[derive(Debug, Clone)]
pub enum MiningOutcome {
    Found(MiningSnapshot),
    Aborted(MiningSnapshot),
}

impl MiningOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, MiningOutcome::Found(_))
    }

    pub fn snapshot(&self) -> &MiningSnapshot {
        match self {
            MiningOutcome::Found(snapshot) | MiningOutcome::Aborted(snapshot) => snapshot,
        }
    }
}

/// Optional observer hooks for a proof-of-work search.
///
/// `on_attempt` fires on every single nonce attempt; `on_progress` and the
/// abort check fire once per [`PROGRESS_INTERVAL`] attempts so a host
/// controller can stay responsive without paying per-iteration cost.
#[derive(Default)]
pub struct MiningHooks<'a> {
    pub on_progress: Option<Box<dyn FnMut(&MiningSnapshot) + 'a>>,
    pub on_attempt: Option<Box<dyn FnMut(u64, &str) + 'a>>,
    pub should_abort: Option<Box<dyn Fn() -> bool + 'a>>,
}

/// An ordered batch of transactions chained to its predecessor by hash.
///
/// Field order matches the hash input (previous hash, timestamp,
/// transactions, nonce) so serialized exports stay externally verifiable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Hash of the previous block
    pub previous_hash: String,

    /// Timestamp when the block was assembled
    pub timestamp: DateTime<Utc>,

    /// Transactions confirmed by this block, order-preserving
    pub transactions: Vec<Transaction>,

    /// Proof-of-work counter
    pub nonce: u64,

    /// Hash of this block
    pub hash: String,
}

impl Block {
    /// Creates a new candidate block. Previous hash and transactions are
    /// fixed from here on; only the nonce and hash change during mining.
    pub fn new(
        timestamp: DateTime<Utc>,
        transactions: Vec<Transaction>,
        previous_hash: String,
    ) -> Self {
        let mut block = Block {
            previous_hash,
            timestamp,
            transactions,
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// The genesis block: no transactions, sentinel previous hash, epoch
    /// timestamp. Deterministic, so a fresh construction compares equal
    /// during chain validation. Not subject to proof-of-work.
    pub fn genesis() -> Self {
        Block::new(
            DateTime::UNIX_EPOCH,
            Vec::new(),
            GENESIS_PREVIOUS_HASH.to_string(),
        )
    }

    /// Recomputes the block hash from the stored fields.
    ///
    /// The payload is pinned: previous hash, Unix-millisecond timestamp,
    /// the canonical transaction records in order, and the nonce.
    pub fn calculate_hash(&self) -> String {
        let records: Vec<String> = self
            .transactions
            .iter()
            .map(Transaction::canonical_record)
            .collect();
        let payload = format!(
            "{}|{}|[{}]|{}",
            self.previous_hash,
            self.timestamp.timestamp_millis(),
            records.join(","),
            self.nonce
        );

        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Whether the stored hash has the required count of leading zero hex
    /// digits.
    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        difficulty <= self.hash.len() && self.hash.bytes().take(difficulty).all(|b| b == b'0')
    }

    /// Brute-force nonce search until the hash gains `difficulty` leading
    /// zero digits.
    ///
    /// A single round moves `IDLE -> SEARCHING -> {FOUND | ABORTED}`. The
    /// search is unbounded: expected iterations grow with 16^difficulty.
    /// Every [`PROGRESS_INTERVAL`] attempts the abort predicate is sampled
    /// and the progress observer (if any) receives a snapshot; cancellation
    /// is cooperative and leaves the caller's committed state untouched.
    pub fn mine(&mut self, difficulty: usize, mut hooks: MiningHooks<'_>) -> MiningOutcome {
        let started = Instant::now();
        let mut iterations: u64 = 0;

        while !self.meets_difficulty(difficulty) {
            self.nonce += 1;
            self.hash = self.calculate_hash();
            iterations += 1;

            if let Some(on_attempt) = hooks.on_attempt.as_mut() {
                on_attempt(self.nonce, &self.hash);
            }

            if iterations % PROGRESS_INTERVAL == 0 {
                let snapshot = self.snapshot(iterations, started.elapsed());
                if hooks.should_abort.as_ref().map_or(false, |abort| abort()) {
                    return MiningOutcome::Aborted(snapshot);
                }
                if let Some(on_progress) = hooks.on_progress.as_mut() {
                    on_progress(&snapshot);
                }
            }
        }

        MiningOutcome::Found(self.snapshot(iterations, started.elapsed()))
    }

    /// True iff the stored hash equals a fresh recomputation, detecting any
    /// post-creation mutation of the block's fields.
    pub fn is_valid(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    fn snapshot(&self, iterations: u64, elapsed: Duration) -> MiningSnapshot {
        MiningSnapshot {
            nonce: self.nonce,
            hash: self.hash.clone(),
            iterations,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::amount::Amount;
    use crate::ledger::identity::Identity;

    fn sample_block() -> Block {
        let miner = Identity::new("miner");
        let reward = Transaction::reward(miner.address().clone(), Amount::from_coins(3));
        Block::new(Utc::now(), vec![reward], "f".repeat(64))
    }

    #[test]
    fn test_new_block_hash_is_consistent() {
        let block = sample_block();
        assert_eq!(block.hash, block.calculate_hash());
        assert_eq!(block.hash.len(), 64);
        assert!(block.is_valid());
    }

    #[test]
    fn test_genesis_is_deterministic() {
        assert_eq!(Block::genesis(), Block::genesis());
        assert_eq!(Block::genesis().previous_hash, GENESIS_PREVIOUS_HASH);
        assert!(Block::genesis().transactions.is_empty());
    }

    #[test]
    fn test_mutation_invalidates_block() {
        let mut block = sample_block();
        block.nonce += 1;
        assert!(!block.is_valid());

        let mut block = sample_block();
        block.transactions[0].amount = Amount::from_coins(9999);
        assert!(!block.is_valid());

        let mut block = sample_block();
        block.previous_hash = "0".repeat(64);
        assert!(!block.is_valid());
    }

    #[test]
    fn test_mine_finds_difficulty_prefix() {
        let mut block = sample_block();
        let outcome = block.mine(2, MiningHooks::default());

        assert!(outcome.is_found());
        assert!(block.hash.starts_with("00"));
        assert!(block.is_valid());
        assert_eq!(outcome.snapshot().hash, block.hash);
    }

    #[test]
    fn test_attempt_observer_sees_every_iteration() {
        let mut block = sample_block();
        let mut attempts = 0u64;
        let outcome = block.mine(
            1,
            MiningHooks {
                on_attempt: Some(Box::new(|_, _| attempts += 1)),
                ..MiningHooks::default()
            },
        );

        assert_eq!(attempts, outcome.snapshot().iterations);
    }

    #[test]
    fn test_progress_observer_is_throttled() {
        let mut block = sample_block();
        let mut reports = 0u64;
        // Difficulty 3 usually needs a few thousand attempts; every report
        // must land on the fixed cadence.
        let outcome = block.mine(
            3,
            MiningHooks {
                on_progress: Some(Box::new(|snapshot| {
                    reports += 1;
                    assert_eq!(snapshot.iterations % PROGRESS_INTERVAL, 0);
                })),
                ..MiningHooks::default()
            },
        );

        assert_eq!(reports, outcome.snapshot().iterations / PROGRESS_INTERVAL);
    }

    #[test]
    fn test_abort_stops_the_search() {
        let mut block = sample_block();
        let outcome = block.mine(
            16,
            MiningHooks {
                should_abort: Some(Box::new(|| true)),
                ..MiningHooks::default()
            },
        );

        assert!(!outcome.is_found());
        // The predicate is sampled at the fixed cadence, so the search stops
        // at the first checkpoint.
        assert_eq!(outcome.snapshot().iterations, PROGRESS_INTERVAL);
    }
}

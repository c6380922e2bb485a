//! Background proof-of-work worker.
//!
//! The worker thread owns the candidate block exclusively until the search
//! ends; the controller keeps the ledger. Progress flows back over a bounded
//! channel, cancellation goes forward through a shared atomic flag sampled
//! at the search's progress cadence. Only the controller, on a `Found`
//! result, appends to the chain via [`Ledger::commit_mined`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::block::{Block, MiningHooks, MiningOutcome, MiningSnapshot};
use super::chain::{Ledger, LedgerError};

/// Progress snapshots buffered between worker and controller. A slow
/// controller loses intermediate snapshots rather than stalling the search.
const PROGRESS_BUFFER: usize = 32;

/// Handle to a mining search running on a dedicated worker thread.
pub struct MiningJob {
    handle: JoinHandle<(Block, MiningOutcome)>,
    progress: Receiver<MiningSnapshot>,
    abort: Arc<AtomicBool>,
}

impl MiningJob {
    /// Signals the worker to stop at its next checkpoint. Cooperative and
    /// best-effort: the worker may still return `Found` if it hits a
    /// qualifying hash first.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// The stream of progress snapshots reported by the worker.
    pub fn progress(&self) -> &Receiver<MiningSnapshot> {
        &self.progress
    }

    /// Waits for the search to end and hands back the candidate block
    /// together with the outcome.
    pub fn join(self) -> (Block, MiningOutcome) {
        self.handle.join().expect("mining worker panicked")
    }
}

/// Spawns a worker thread that mines `block` at `difficulty`.
pub fn spawn(mut block: Block, difficulty: usize) -> MiningJob {
    let abort = Arc::new(AtomicBool::new(false));
    let (sender, receiver) = sync_channel(PROGRESS_BUFFER);
    let flag = Arc::clone(&abort);

    let handle = thread::spawn(move || {
        let hooks = MiningHooks {
            on_progress: Some(Box::new(move |snapshot: &MiningSnapshot| {
                // Dropped snapshots are fine; the search must not stall.
                let _ = sender.try_send(snapshot.clone());
            })),
            on_attempt: None,
            should_abort: Some(Box::new(move || flag.load(Ordering::Relaxed))),
        };
        let outcome = block.mine(difficulty, hooks);
        (block, outcome)
    });

    MiningJob {
        handle,
        progress: receiver,
        abort,
    }
}

impl Ledger {
    /// Assembles the next candidate block and hands it to a worker thread.
    ///
    /// Committed state is untouched until the controller receives a `Found`
    /// outcome and calls [`Ledger::commit_mined`]; dropping the job after an
    /// abort discards the candidate entirely.
    pub fn begin_mining(&mut self, allow_empty_pool: bool) -> Result<MiningJob, LedgerError> {
        let candidate = self.assemble_candidate(allow_empty_pool)?;
        Ok(spawn(candidate.block, self.difficulty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::ledger::amount::Amount;
    use crate::ledger::chain::MiningResult;
    use crate::ledger::block::PROGRESS_INTERVAL;

    fn config(difficulty: usize) -> LedgerConfig {
        LedgerConfig {
            name: "Workcoin".to_string(),
            difficulty,
            block_reward: Amount::from_coins(10),
            halving_interval: 1000,
            starting_balance: Amount::from_coins(10),
            participants: vec!["Alice".to_string(), "Minnie".to_string()],
            miner: Some("Minnie".to_string()),
        }
    }

    #[test]
    fn test_worker_mines_and_controller_commits() {
        let mut ledger = Ledger::new(config(1)).unwrap();
        ledger
            .create_transaction("Alice", "Minnie", Amount::from_coins(1), Amount::ZERO, "bg")
            .unwrap();

        let job = ledger.begin_mining(false).unwrap();
        let (block, outcome) = job.join();
        let MiningOutcome::Found(snapshot) = outcome else {
            panic!("expected the search to finish");
        };

        let reward = ledger.commit_mined(block, snapshot).unwrap();
        assert_eq!(reward, Amount::from_coins(10));
        assert_eq!(ledger.blocks().len(), 2);
        assert!(ledger.pool().is_empty());
        assert!(ledger.is_chain_valid());
    }

    #[test]
    fn test_abort_leaves_ledger_untouched() {
        let mut ledger = Ledger::new(config(16)).unwrap();

        let job = ledger.begin_mining(true).unwrap();
        job.abort();
        let (_block, outcome) = job.join();

        assert!(!outcome.is_found());
        assert_eq!(ledger.blocks().len(), 1);
        assert!(ledger.is_chain_valid());
    }

    #[test]
    fn test_progress_snapshots_flow_to_controller() {
        let mut ledger = Ledger::new(config(16)).unwrap();

        let job = ledger.begin_mining(true).unwrap();
        // The first checkpoint lands after the fixed cadence; wait for it,
        // then cancel.
        let snapshot = job
            .progress()
            .recv()
            .expect("worker should report progress");
        assert_eq!(snapshot.iterations % PROGRESS_INTERVAL, 0);
        assert!(!snapshot.hash.is_empty());

        job.abort();
        let (_, outcome) = job.join();
        assert!(!outcome.is_found());
    }

    #[test]
    fn test_stale_block_is_rejected() {
        let mut ledger = Ledger::new(config(1)).unwrap();

        let job = ledger.begin_mining(true).unwrap();
        let (block, outcome) = job.join();
        let MiningOutcome::Found(snapshot) = outcome else {
            panic!("expected the search to finish");
        };

        // The chain moved on while the worker was busy.
        let MiningResult::Mined { .. } = ledger
            .mine_next_block(MiningHooks::default(), true)
            .unwrap()
        else {
            panic!("expected a mined block");
        };

        assert!(matches!(
            ledger.commit_mined(block, snapshot),
            Err(LedgerError::StaleBlock)
        ));
        assert_eq!(ledger.blocks().len(), 2);
    }

    #[test]
    fn test_tampered_block_is_rejected() {
        let mut ledger = Ledger::new(config(1)).unwrap();

        let job = ledger.begin_mining(true).unwrap();
        let (mut block, outcome) = job.join();
        let MiningOutcome::Found(snapshot) = outcome else {
            panic!("expected the search to finish");
        };

        block.transactions[0].amount = Amount::from_coins(9999);
        assert!(matches!(
            ledger.commit_mined(block, snapshot),
            Err(LedgerError::InvalidMinedBlock)
        ));
        assert_eq!(ledger.blocks().len(), 1);
    }
}

use anyhow::Result;
use log::{debug, info};

use powcoin::config::LedgerConfig;
use powcoin::ledger::{Amount, Ledger, MiningHooks, MiningOutcome, MiningResult};

// Scripted transfer rounds: one block per round.
// (sender, recipient, amount, reference)
const ROUNDS: &[&[(&str, &str, &str, &str)]] = &[
    &[
        ("Mirksen", "Kate", "1", "Bill N°230411"),
        ("Bill", "Chris", "5", "BMW Cabrio 4 Series (2021)"),
    ],
    &[
        ("Mirksen", "Kate", "8", "N°281119"),
        ("Chris", "Bill", "1.25", "Refund: Broken Engine"),
    ],
    &[
        ("Kate", "Minas", "0.2", "Antminer S14"),
        ("Kate", "Minas", "0.00498", "Antminer S14 accessories"),
        ("Chris", "Kate", "0.0000018", "meal thursday"),
    ],
];

fn print_balances(ledger: &Ledger) {
    info!("participant balances:");
    for row in ledger.balances() {
        let tag = if row.is_miner { " (miner)" } else { "" };
        info!("  {}{}: {}", row.name, tag, row.balance);
    }
}

// Runs one mining round synchronously, reporting progress snapshots.
fn mine_round(ledger: &mut Ledger) -> Result<()> {
    let result = ledger.mine_next_block(
        MiningHooks {
            on_progress: Some(Box::new(|snapshot| {
                debug!(
                    "searching: nonce {} after {} iterations ({:?})",
                    snapshot.nonce, snapshot.iterations, snapshot.elapsed
                );
            })),
            ..MiningHooks::default()
        },
        false,
    )?;

    match result {
        MiningResult::Mined {
            block,
            reward,
            snapshot,
        } => {
            info!(
                "mined {} in {:?} ({} iterations), miner credited {}",
                block.hash, snapshot.elapsed, snapshot.iterations, reward
            );
        }
        MiningResult::Aborted { snapshot } => {
            info!("mining aborted after {} iterations", snapshot.iterations);
        }
    }
    Ok(())
}

// Runs one mining round on the background worker, draining its progress
// stream, then commits the result.
fn mine_round_detached(ledger: &mut Ledger) -> Result<()> {
    let job = ledger.begin_mining(false)?;
    for snapshot in job.progress().iter() {
        debug!(
            "worker: nonce {} after {} iterations",
            snapshot.nonce, snapshot.iterations
        );
    }

    let (block, outcome) = job.join();
    match outcome {
        MiningOutcome::Found(snapshot) => {
            let reward = ledger.commit_mined(block, snapshot)?;
            info!("worker-mined block committed, miner credited {}", reward);
        }
        MiningOutcome::Aborted(snapshot) => {
            info!("worker aborted after {} iterations", snapshot.iterations);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let mut ledger = Ledger::new(LedgerConfig::default())?;
    print_balances(&ledger);

    let fee: Amount = "0.00000001".parse()?;
    let last_round = ROUNDS.len() - 1;
    for (round, transfers) in ROUNDS.iter().enumerate() {
        for &(sender, recipient, amount, reference) in transfers.iter() {
            ledger.create_transaction(sender, recipient, amount.parse()?, fee, reference)?;
        }

        // The final round goes through the background worker to show the
        // controller/worker split; the earlier ones mine inline.
        if round == last_round {
            mine_round_detached(&mut ledger)?;
        } else {
            mine_round(&mut ledger)?;
        }
        print_balances(&ledger);
    }

    info!("chain valid: {}", ledger.is_chain_valid());
    debug!("full ledger:\n{}", ledger.export_json()?);

    // Tamper demonstration: silently rewrite a confirmed amount, then watch
    // validation catch it.
    ledger.tamper_transaction(1, 0, Amount::from_coins(2));
    info!(
        "after tampering with block 1: chain valid: {}",
        ledger.is_chain_valid()
    );

    Ok(())
}

use serde::{Deserialize, Serialize};

use crate::ledger::Amount;

/// Everything a [`Ledger`](crate::ledger::Ledger) needs at construction
/// time. Built once by the embedding application and handed over; the core
/// never reads configuration files on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Display name of the chain
    pub name: String,

    /// Required count of leading zero hex digits in a block hash.
    /// Expected mining work grows with 16^difficulty.
    pub difficulty: usize,

    /// Initial block reward, halved every `halving_interval` blocks
    pub block_reward: Amount,

    /// Number of blocks between reward halvings
    pub halving_interval: u64,

    /// Demo airdrop: the balance every address starts from
    pub starting_balance: Amount,

    /// Participants registered at construction, in order
    pub participants: Vec<String>,

    /// Participant designated as miner, if any
    pub miner: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            name: "Powcoin".to_string(),
            difficulty: 3,
            block_reward: "3.125".parse().unwrap(),
            halving_interval: 2,
            starting_balance: Amount::from_coins(10),
            participants: ["Mirksen", "Kate", "Bill", "Chris", "Minas"]
                .map(String::from)
                .to_vec(),
            miner: Some("Minas".to_string()),
        }
    }
}

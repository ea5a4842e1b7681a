// 💰 Wallet Ledger - settlement of fees and prizes
//
// Every balance change is paired with an append-only ledger entry whose
// `balance_after` is the balance read right after that change. Entries of a
// team are hash-chained so the reconciliation pass can detect tampering.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::db::RallyStore;
use crate::error::{RallyError, Result};
use crate::models::{EntryKind, LedgerEntry, NewLedgerEntry, Wallet};

/// `prev_hash` of a team's first ledger entry
pub const GENESIS_HASH: &str = "genesis";

/// Hash linking an entry to its predecessor in the team's ledger
pub fn chain_hash(
    prev_hash: &str,
    team_id: i64,
    race_id: Option<i64>,
    kind: EntryKind,
    amount: f64,
    balance_after: f64,
) -> String {
    let race = race_id.map_or_else(|| "-".to_string(), |id| id.to_string());
    let mut hasher = Sha256::new();
    // Full precision: `{}` on f64 prints the shortest exact round-trip form
    hasher.update(format!(
        "{}|{}|{}|{}|{}|{}",
        prev_hash, team_id, race, kind, amount, balance_after
    ));
    format!("{:x}", hasher.finalize())
}

/// Outcome of one settlement call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub team_id: i64,
    pub race_id: Option<i64>,
    pub fee: f64,
    pub reward: f64,
    pub balance_after_fee: f64,
    pub balance_after: f64,
    /// Fee entry, then the prize entry when a reward was paid
    pub entries: Vec<LedgerEntry>,
}

impl Settlement {
    pub fn net(&self) -> f64 {
        self.reward - self.fee
    }
}

pub struct WalletLedger<'a, S: RallyStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RallyStore + ?Sized> WalletLedger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Create the wallet for a freshly registered team.
    pub fn open(&self, team_id: i64, starting_balance: f64) -> Result<Wallet> {
        if !starting_balance.is_finite() || starting_balance < 0.0 {
            return Err(RallyError::validation(
                "starting_balance",
                "must be a non-negative number",
            ));
        }
        self.store.open_wallet(team_id, starting_balance)
    }

    pub fn balance(&self, team_id: i64) -> Result<f64> {
        self.store
            .get_wallet(team_id)?
            .map(|wallet| wallet.balance)
            .ok_or(RallyError::UnknownTeam(team_id))
    }

    /// Charge `fee`, then credit `reward` when positive.
    ///
    /// Balances may go negative. Each mutation is followed by its own ledger
    /// entry, so the fee entry snapshots the balance before any prize.
    pub fn settle(
        &self,
        team_id: i64,
        race_id: Option<i64>,
        fee: f64,
        reward: f64,
    ) -> Result<Settlement> {
        let mut prev_hash = self
            .store
            .last_entry_hash(team_id)?
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let balance_after_fee = self.store.apply_balance_delta(team_id, -fee)?;
        let fee_entry = self.append(&prev_hash, team_id, race_id, EntryKind::Fee, -fee, balance_after_fee)?;
        prev_hash = fee_entry.entry_hash.clone();

        let mut entries = vec![fee_entry];
        let mut balance_after = balance_after_fee;

        if reward > 0.0 {
            balance_after = self.store.apply_balance_delta(team_id, reward)?;
            entries.push(self.append(
                &prev_hash,
                team_id,
                race_id,
                EntryKind::Prize,
                reward,
                balance_after,
            )?);
        }

        if balance_after < 0.0 {
            warn!(team_id, balance = balance_after, "Team balance is negative");
        }

        debug!(team_id, ?race_id, fee, reward, balance = balance_after, "Settled");

        Ok(Settlement {
            team_id,
            race_id,
            fee,
            reward,
            balance_after_fee,
            balance_after,
            entries,
        })
    }

    fn append(
        &self,
        prev_hash: &str,
        team_id: i64,
        race_id: Option<i64>,
        kind: EntryKind,
        amount: f64,
        balance_after: f64,
    ) -> Result<LedgerEntry> {
        let entry = NewLedgerEntry {
            team_id,
            race_id,
            kind,
            amount,
            balance_after,
            entry_hash: chain_hash(prev_hash, team_id, race_id, kind, amount, balance_after),
        };
        self.store.append_ledger_entry(&entry)
    }
}

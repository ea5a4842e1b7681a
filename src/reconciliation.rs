// ⚖️ Reconciliation Engine - wallet balance vs. ledger
//
// Following the formula:
//   starting_balance + total_credits - total_debits = balance
//
// Alongside the balance check, the pass replays the ledger to confirm each
// entry's snapshot and hash link.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::RallyStore;
use crate::error::{RallyError, Result};
use crate::models::{EntryKind, LedgerEntry, Wallet};
use crate::wallet::{chain_hash, GENESIS_HASH};

// ============================================================================
// RECONCILIATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReconciliationResult {
    /// Balance equals starting balance plus ledger sum
    Balanced {
        starting_balance: f64,
        total_credits: f64,
        total_debits: f64,
        balance: f64,
    },

    /// Off by less than the major threshold
    MinorDiscrepancy {
        expected_balance: f64,
        actual_balance: f64,
        difference: f64,
        tolerance: f64,
    },

    /// Off by at least the major threshold
    MajorDiscrepancy {
        expected_balance: f64,
        actual_balance: f64,
        difference: f64,
    },
}

impl ReconciliationResult {
    pub fn is_balanced(&self) -> bool {
        matches!(self, ReconciliationResult::Balanced { .. })
    }

    pub fn has_discrepancy(&self) -> bool {
        !self.is_balanced()
    }

    pub fn difference(&self) -> f64 {
        match self {
            ReconciliationResult::Balanced { .. } => 0.0,
            ReconciliationResult::MinorDiscrepancy { difference, .. } => *difference,
            ReconciliationResult::MajorDiscrepancy { difference, .. } => *difference,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiscrepancyCategory {
    /// Wallet balance disagrees with the ledger sum
    AmountMismatch,
    /// `balance_after` disagrees with the running total
    SnapshotMismatch,
    /// Entry hash does not follow from its predecessor
    BrokenHashChain,
    /// Fee entry with a positive amount, or prize with a non-positive one
    SignMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    pub description: String,
    pub entry_id: Option<i64>,
    pub amount: f64,
    pub category: DiscrepancyCategory,
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub team_id: i64,
    pub result: ReconciliationResult,
    pub entry_count: usize,
    pub total_credits: f64,
    pub total_debits: f64,
    pub calculated_balance: f64,
    pub discrepancies: Vec<Discrepancy>,
    pub reconciled_at: chrono::DateTime<chrono::Utc>,
}

impl ReconciliationReport {
    /// Balanced and no per-entry problems
    pub fn is_clean(&self) -> bool {
        self.result.is_balanced() && self.discrepancies.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Team {}: {} entries, calculated {:.2}, difference {:.2}, {} discrepancies",
            self.team_id,
            self.entry_count,
            self.calculated_balance,
            self.result.difference(),
            self.discrepancies.len()
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// Tolerance for floating-point comparisons (default: 0.01)
    pub tolerance: f64,

    /// Threshold for minor vs major discrepancy (default: 10.00)
    pub major_discrepancy_threshold: f64,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            tolerance: 0.01,
            major_discrepancy_threshold: 10.0,
        }
    }

    pub fn with_thresholds(tolerance: f64, major_threshold: f64) -> Self {
        ReconciliationEngine {
            tolerance,
            major_discrepancy_threshold: major_threshold,
        }
    }

    /// Reconcile a wallet against its ledger entries (in append order).
    pub fn reconcile(&self, wallet: &Wallet, entries: &[LedgerEntry]) -> ReconciliationReport {
        let total_credits = calculate_credits(entries);
        let total_debits = calculate_debits(entries);
        let calculated_balance = wallet.starting_balance + total_credits - total_debits;
        let difference = (calculated_balance - wallet.balance).abs();

        let result = if difference < self.tolerance {
            ReconciliationResult::Balanced {
                starting_balance: wallet.starting_balance,
                total_credits,
                total_debits,
                balance: wallet.balance,
            }
        } else if difference < self.major_discrepancy_threshold {
            ReconciliationResult::MinorDiscrepancy {
                expected_balance: calculated_balance,
                actual_balance: wallet.balance,
                difference,
                tolerance: self.tolerance,
            }
        } else {
            ReconciliationResult::MajorDiscrepancy {
                expected_balance: calculated_balance,
                actual_balance: wallet.balance,
                difference,
            }
        };

        let mut discrepancies = Vec::new();
        if difference >= self.tolerance {
            discrepancies.push(Discrepancy {
                description: format!("Balance mismatch: {:.2} difference", difference),
                entry_id: None,
                amount: difference,
                category: DiscrepancyCategory::AmountMismatch,
            });
        }
        discrepancies.extend(self.replay_entries(wallet, entries));

        ReconciliationReport {
            team_id: wallet.team_id,
            result,
            entry_count: entries.len(),
            total_credits,
            total_debits,
            calculated_balance,
            discrepancies,
            reconciled_at: chrono::Utc::now(),
        }
    }

    /// Walk the ledger, checking signs, running balance and hash links.
    fn replay_entries(&self, wallet: &Wallet, entries: &[LedgerEntry]) -> Vec<Discrepancy> {
        let mut discrepancies = Vec::new();
        let mut running = wallet.starting_balance;
        let mut prev_hash = GENESIS_HASH.to_string();

        for entry in entries {
            let sign_ok = match entry.kind {
                EntryKind::Fee => entry.amount <= 0.0,
                EntryKind::Prize => entry.amount > 0.0,
            };
            if !sign_ok {
                discrepancies.push(Discrepancy {
                    description: format!("{} entry with amount {:.2}", entry.kind, entry.amount),
                    entry_id: Some(entry.id),
                    amount: entry.amount,
                    category: DiscrepancyCategory::SignMismatch,
                });
            }

            running += entry.amount;
            if (running - entry.balance_after).abs() >= self.tolerance {
                discrepancies.push(Discrepancy {
                    description: format!(
                        "Snapshot {:.2} but running balance is {:.2}",
                        entry.balance_after, running
                    ),
                    entry_id: Some(entry.id),
                    amount: entry.balance_after - running,
                    category: DiscrepancyCategory::SnapshotMismatch,
                });
                // Resync so one bad snapshot is reported once
                running = entry.balance_after;
            }

            let expected = chain_hash(
                &prev_hash,
                entry.team_id,
                entry.race_id,
                entry.kind,
                entry.amount,
                entry.balance_after,
            );
            if expected != entry.entry_hash {
                discrepancies.push(Discrepancy {
                    description: "Entry hash does not follow from its predecessor".to_string(),
                    entry_id: Some(entry.id),
                    amount: entry.amount,
                    category: DiscrepancyCategory::BrokenHashChain,
                });
            }
            prev_hash = entry.entry_hash.clone();
        }

        discrepancies
    }

    /// Reconcile one team straight from storage.
    pub fn reconcile_team<S: RallyStore + ?Sized>(
        &self,
        store: &S,
        team_id: i64,
    ) -> Result<ReconciliationReport> {
        let wallet = store
            .get_wallet(team_id)?
            .ok_or(RallyError::UnknownTeam(team_id))?;
        let entries = store.ledger_for_team(team_id)?;
        let report = self.reconcile(&wallet, &entries);
        if !report.is_clean() {
            warn!(team_id, summary = %report.summary(), "Ledger discrepancy");
        }
        Ok(report)
    }

    /// Reconcile every wallet.
    pub fn reconcile_all<S: RallyStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<Vec<ReconciliationReport>> {
        let reports = store
            .list_wallets()?
            .into_iter()
            .map(|wallet| self.reconcile_team(store, wallet.team_id))
            .collect::<Result<Vec<_>>>()?;

        let clean = reports.iter().filter(|r| r.is_clean()).count();
        info!(teams = reports.len(), clean, "Reconciliation complete");
        Ok(reports)
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Prize credits
fn calculate_credits(entries: &[LedgerEntry]) -> f64 {
    entries
        .iter()
        .filter(|e| e.amount > 0.0)
        .map(|e| e.amount)
        .sum()
}

/// Fee debits, as a positive number
fn calculate_debits(entries: &[LedgerEntry]) -> f64 {
    entries
        .iter()
        .filter(|e| e.amount < 0.0)
        .map(|e| e.amount.abs())
        .sum()
}

// ============================================================================
// TESTS
// ============================================================================

// Rally Ledger - Core Library
// Exposes the race engine for the CLI, the API server, and tests

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod race;
pub mod reconciliation;
pub mod registry;
pub mod scoring;
pub mod seed;
pub mod wallet;

// Re-export commonly used types
pub use config::{AppConfig, RaceConfig, SettlementMode};
pub use db::{setup_database, Event, RallyStore, SqliteStore};
pub use error::{RallyError, Result};
pub use models::{
    Car, Drivetrain, EntryKind, LedgerEntry, NewCar, NewLedgerEntry, NewTeam, NewTrack, Race,
    RaceResult, Team, TeamStanding, Track, Wallet,
};
pub use race::{allocate_rewards, rank_entrants, RaceOrchestrator, RaceReport, StandingRow, TrackChoice};
pub use reconciliation::{
    Discrepancy, DiscrepancyCategory, ReconciliationEngine, ReconciliationReport,
    ReconciliationResult,
};
pub use registry::{register_car, register_team, register_track};
pub use scoring::{score, score_with_draws, ScriptedSource, SeededSource, UniformSource};
pub use seed::{seed_directory, SeedSummary};
pub use wallet::{Settlement, WalletLedger};

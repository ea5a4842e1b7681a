// Shared fixtures for integration tests
#![allow(dead_code)]

use std::cell::Cell;

use rally_ledger::{
    Car, Event, LedgerEntry, NewCar, NewLedgerEntry, NewTeam, NewTrack, Race, RaceResult,
    RallyError, RallyStore, Result, SqliteStore, Team, TeamStanding, Track, Wallet,
};

/// Store operations a `FailingStore` can be told to break
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    OpenWallet,
    BalanceDelta,
    LedgerAppend,
    ResultInsert,
}

/// Delegates to SQLite but fails the Nth call of one operation
pub struct FailingStore {
    pub inner: SqliteStore,
    op: Op,
    fail_on: usize,
    calls: Cell<usize>,
}

impl FailingStore {
    pub fn new(inner: SqliteStore, op: Op, fail_on: usize) -> Self {
        Self {
            inner,
            op,
            fail_on,
            calls: Cell::new(0),
        }
    }

    fn trip(&self, op: Op) -> Result<()> {
        if op != self.op {
            return Ok(());
        }
        let n = self.calls.get() + 1;
        self.calls.set(n);
        if n == self.fail_on {
            return Err(RallyError::Persistence(rusqlite::Error::InvalidQuery));
        }
        Ok(())
    }
}

impl RallyStore for FailingStore {
    fn list_tracks(&self) -> Result<Vec<Track>> {
        self.inner.list_tracks()
    }
    fn get_track(&self, track_id: i64) -> Result<Option<Track>> {
        self.inner.get_track(track_id)
    }
    fn insert_track(&self, track: &NewTrack) -> Result<Track> {
        self.inner.insert_track(track)
    }
    fn insert_team(&self, team: &NewTeam) -> Result<Team> {
        self.inner.insert_team(team)
    }
    fn list_teams_with_balance(&self) -> Result<Vec<TeamStanding>> {
        self.inner.list_teams_with_balance()
    }
    fn insert_car(&self, car: &NewCar) -> Result<Car> {
        self.inner.insert_car(car)
    }
    fn list_cars(&self) -> Result<Vec<Car>> {
        self.inner.list_cars()
    }
    fn open_wallet(&self, team_id: i64, starting_balance: f64) -> Result<Wallet> {
        self.trip(Op::OpenWallet)?;
        self.inner.open_wallet(team_id, starting_balance)
    }
    fn get_wallet(&self, team_id: i64) -> Result<Option<Wallet>> {
        self.inner.get_wallet(team_id)
    }
    fn list_wallets(&self) -> Result<Vec<Wallet>> {
        self.inner.list_wallets()
    }
    fn apply_balance_delta(&self, team_id: i64, delta: f64) -> Result<f64> {
        self.trip(Op::BalanceDelta)?;
        self.inner.apply_balance_delta(team_id, delta)
    }
    fn append_ledger_entry(&self, entry: &NewLedgerEntry) -> Result<LedgerEntry> {
        self.trip(Op::LedgerAppend)?;
        self.inner.append_ledger_entry(entry)
    }
    fn last_entry_hash(&self, team_id: i64) -> Result<Option<String>> {
        self.inner.last_entry_hash(team_id)
    }
    fn ledger_for_team(&self, team_id: i64) -> Result<Vec<LedgerEntry>> {
        self.inner.ledger_for_team(team_id)
    }
    fn insert_race(&self, track_id: i64, entry_fee: f64, prize_pool: f64) -> Result<Race> {
        self.inner.insert_race(track_id, entry_fee, prize_pool)
    }
    fn list_races(&self) -> Result<Vec<Race>> {
        self.inner.list_races()
    }
    fn insert_result(&self, result: &RaceResult) -> Result<()> {
        self.trip(Op::ResultInsert)?;
        self.inner.insert_result(result)
    }
    fn results_for_race(&self, race_id: i64) -> Result<Vec<RaceResult>> {
        self.inner.results_for_race(race_id)
    }
    fn record_event(&self, event: &Event) -> Result<()> {
        self.inner.record_event(event)
    }
    fn begin(&self) -> Result<()> {
        self.inner.begin()
    }
    fn commit(&self) -> Result<()> {
        self.inner.commit()
    }
    fn rollback(&self) -> Result<()> {
        self.inner.rollback()
    }
}

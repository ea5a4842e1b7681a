// 🗄️ Persistence Gateway - SQLite storage for teams, cars, races and the ledger
//
// The race engine talks to storage only through `RallyStore`. `SqliteStore`
// is the production implementation; every write auto-commits unless the
// caller opened a unit of work with `begin`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, error};

use crate::error::{RallyError, Result};
use crate::models::{
    Car, LedgerEntry, NewCar, NewLedgerEntry, NewTeam, NewTrack, Race, RaceResult, Team,
    TeamStanding, Track, Wallet,
};

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// Query/command surface consumed by the race engine.
///
/// Identities are returned by the insert itself, never re-derived with a
/// separate "latest id" query.
pub trait RallyStore {
    // Tracks
    fn list_tracks(&self) -> Result<Vec<Track>>;
    fn get_track(&self, track_id: i64) -> Result<Option<Track>>;
    fn insert_track(&self, track: &NewTrack) -> Result<Track>;

    // Teams & cars
    fn insert_team(&self, team: &NewTeam) -> Result<Team>;
    fn list_teams_with_balance(&self) -> Result<Vec<TeamStanding>>;
    fn insert_car(&self, car: &NewCar) -> Result<Car>;
    /// All cars in fetch order (ascending id)
    fn list_cars(&self) -> Result<Vec<Car>>;

    // Wallets & ledger
    fn open_wallet(&self, team_id: i64, starting_balance: f64) -> Result<Wallet>;
    fn get_wallet(&self, team_id: i64) -> Result<Option<Wallet>>;
    fn list_wallets(&self) -> Result<Vec<Wallet>>;
    /// Add `delta` to the balance and return the balance read right after the update.
    fn apply_balance_delta(&self, team_id: i64, delta: f64) -> Result<f64>;
    fn append_ledger_entry(&self, entry: &NewLedgerEntry) -> Result<LedgerEntry>;
    fn last_entry_hash(&self, team_id: i64) -> Result<Option<String>>;
    /// Ledger entries for a team in append order
    fn ledger_for_team(&self, team_id: i64) -> Result<Vec<LedgerEntry>>;

    // Races & results
    fn insert_race(&self, track_id: i64, entry_fee: f64, prize_pool: f64) -> Result<Race>;
    fn list_races(&self) -> Result<Vec<Race>>;
    fn insert_result(&self, result: &RaceResult) -> Result<()>;
    /// Results for a race ordered by position
    fn results_for_race(&self, race_id: i64) -> Result<Vec<RaceResult>>;

    // Audit trail
    fn record_event(&self, event: &Event) -> Result<()>;

    // Unit of work
    fn begin(&self) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;
}

/// Run `work` between `begin` and `commit`; roll back if it (or the commit) fails.
///
/// Must not be nested: SQLite has no nested `BEGIN`.
pub fn unit_of_work<S, T, F>(store: &S, work: F) -> Result<T>
where
    S: RallyStore + ?Sized,
    F: FnOnce() -> Result<T>,
{
    store.begin()?;
    match work().and_then(|value| store.commit().map(|()| value)) {
        Ok(value) => Ok(value),
        Err(e) => {
            if let Err(rollback_err) = store.rollback() {
                error!(error = %rollback_err, "Rollback after failed unit of work also failed");
            }
            Err(e)
        }
    }
}

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// Audit trail entry ("every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: impl ToString,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            team_name TEXT NOT NULL,
            country TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS wallets (
            team_id INTEGER PRIMARY KEY REFERENCES teams(id),
            balance REAL NOT NULL,
            starting_balance REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cars (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            team_id INTEGER NOT NULL REFERENCES teams(id),
            manufacturer_id INTEGER,
            model TEXT NOT NULL,
            year INTEGER NOT NULL,
            hp REAL NOT NULL,
            weight REAL NOT NULL,
            accel REAL NOT NULL,
            top_speed REAL NOT NULL,
            reliability REAL NOT NULL,
            aero REAL NOT NULL,
            drivetrain TEXT NOT NULL,
            tire TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tracks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            difficulty REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS races (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            track_id INTEGER NOT NULL REFERENCES tracks(id),
            entry_fee REAL NOT NULL,
            prize_pool REAL NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS results (
            race_id INTEGER NOT NULL REFERENCES races(id),
            car_id INTEGER NOT NULL REFERENCES cars(id),
            team_id INTEGER NOT NULL REFERENCES teams(id),
            position INTEGER NOT NULL,
            time_minutes REAL NOT NULL,
            reward REAL NOT NULL,
            penalty REAL NOT NULL,
            PRIMARY KEY (race_id, car_id)
        );

        -- Append-only: rows are never updated or deleted
        CREATE TABLE IF NOT EXISTS ledger (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            team_id INTEGER NOT NULL REFERENCES teams(id),
            race_id INTEGER REFERENCES races(id),
            txn_type TEXT NOT NULL CHECK (txn_type IN ('fee', 'prize')),
            amount REAL NOT NULL,
            balance_after REAL NOT NULL,
            entry_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_cars_team ON cars(team_id);
        CREATE INDEX IF NOT EXISTS idx_ledger_team ON ledger(team_id, id);
        CREATE INDEX IF NOT EXISTS idx_results_race ON results(race_id, position);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);",
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

const CAR_COLUMNS: &str = "id, team_id, manufacturer_id, model, year, hp, weight, accel,
                           top_speed, reliability, aero, drivetrain, tire";

fn car_from_row(row: &Row<'_>) -> rusqlite::Result<Car> {
    Ok(Car {
        id: row.get(0)?,
        team_id: row.get(1)?,
        manufacturer_id: row.get(2)?,
        model: row.get(3)?,
        year: row.get(4)?,
        horsepower: row.get(5)?,
        weight: row.get(6)?,
        acceleration: row.get(7)?,
        top_speed: row.get(8)?,
        reliability: row.get(9)?,
        aerodynamics: row.get(10)?,
        drivetrain: row.get(11)?,
        tire: row.get(12)?,
    })
}

fn track_from_row(row: &Row<'_>) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        name: row.get(1)?,
        difficulty: row.get(2)?,
    })
}

fn race_from_row(row: &Row<'_>) -> rusqlite::Result<Race> {
    let created_at: String = row.get(4)?;
    Ok(Race {
        id: row.get(0)?,
        track_id: row.get(1)?,
        entry_fee: row.get(2)?,
        prize_pool: row.get(3)?,
        created_at: parse_timestamp(4, &created_at)?,
    })
}

fn wallet_from_row(row: &Row<'_>) -> rusqlite::Result<Wallet> {
    Ok(Wallet {
        team_id: row.get(0)?,
        balance: row.get(1)?,
        starting_balance: row.get(2)?,
    })
}

const LEDGER_COLUMNS: &str =
    "id, team_id, race_id, txn_type, amount, balance_after, entry_hash, created_at";

fn ledger_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let created_at: String = row.get(7)?;
    Ok(LedgerEntry {
        id: row.get(0)?,
        team_id: row.get(1)?,
        race_id: row.get(2)?,
        kind: row.get(3)?,
        amount: row.get(4)?,
        balance_after: row.get(5)?,
        entry_hash: row.get(6)?,
        created_at: parse_timestamp(7, &created_at)?,
    })
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file with WAL journaling and the rally schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        // WAL mode for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")?;
        setup_database(&conn)?;
        debug!(path = %path.display(), "Database opened");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Audit events for one entity, newest first
    pub fn events_for_entity(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
             FROM events
             WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY id DESC",
        )?;

        let events = stmt
            .query_map(params![entity_type, entity_id], |row| {
                let timestamp: String = row.get(1)?;
                let data_json: String = row.get(5)?;

                Ok(Event {
                    event_id: row.get(0)?,
                    timestamp: parse_timestamp(1, &timestamp)?,
                    event_type: row.get(2)?,
                    entity_type: row.get(3)?,
                    entity_id: row.get(4)?,
                    data: serde_json::from_str(&data_json).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            5,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?,
                    actor: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(events)
    }
}

impl RallyStore for SqliteStore {
    fn list_tracks(&self) -> Result<Vec<Track>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, difficulty FROM tracks ORDER BY id")?;
        let tracks = stmt
            .query_map([], track_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn get_track(&self, track_id: i64) -> Result<Option<Track>> {
        let track = self
            .conn
            .query_row(
                "SELECT id, name, difficulty FROM tracks WHERE id = ?1",
                [track_id],
                track_from_row,
            )
            .optional()?;
        Ok(track)
    }

    fn insert_track(&self, track: &NewTrack) -> Result<Track> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO tracks (name, difficulty) VALUES (?1, ?2) RETURNING id",
            params![track.name, track.difficulty],
            |row| row.get(0),
        )?;
        Ok(Track {
            id,
            name: track.name.clone(),
            difficulty: track.difficulty,
        })
    }

    fn insert_team(&self, team: &NewTeam) -> Result<Team> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO teams (team_name, country, created_at) VALUES (?1, ?2, ?3) RETURNING id",
            params![team.name, team.country, Utc::now().to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(Team {
            id,
            name: team.name.clone(),
            country: team.country.clone(),
        })
    }

    fn list_teams_with_balance(&self) -> Result<Vec<TeamStanding>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.team_name, t.country, w.balance
             FROM teams t
             JOIN wallets w ON t.id = w.team_id
             ORDER BY t.id",
        )?;
        let teams = stmt
            .query_map([], |row| {
                Ok(TeamStanding {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    country: row.get(2)?,
                    balance: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(teams)
    }

    fn insert_car(&self, car: &NewCar) -> Result<Car> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO cars (
                team_id, manufacturer_id, model, year, hp, weight, accel,
                top_speed, reliability, aero, drivetrain, tire
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            RETURNING id",
            params![
                car.team_id,
                car.manufacturer_id,
                car.model,
                car.year,
                car.horsepower,
                car.weight,
                car.acceleration,
                car.top_speed,
                car.reliability,
                car.aerodynamics,
                car.drivetrain,
                car.tire,
            ],
            |row| row.get(0),
        )?;
        Ok(Car::from_new(id, car.clone()))
    }

    fn list_cars(&self) -> Result<Vec<Car>> {
        let sql = format!("SELECT {CAR_COLUMNS} FROM cars ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let cars = stmt
            .query_map([], car_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cars)
    }

    fn open_wallet(&self, team_id: i64, starting_balance: f64) -> Result<Wallet> {
        self.conn.execute(
            "INSERT INTO wallets (team_id, balance, starting_balance) VALUES (?1, ?2, ?2)",
            params![team_id, starting_balance],
        )?;
        Ok(Wallet {
            team_id,
            balance: starting_balance,
            starting_balance,
        })
    }

    fn get_wallet(&self, team_id: i64) -> Result<Option<Wallet>> {
        let wallet = self
            .conn
            .query_row(
                "SELECT team_id, balance, starting_balance FROM wallets WHERE team_id = ?1",
                [team_id],
                wallet_from_row,
            )
            .optional()?;
        Ok(wallet)
    }

    fn list_wallets(&self) -> Result<Vec<Wallet>> {
        let mut stmt = self
            .conn
            .prepare("SELECT team_id, balance, starting_balance FROM wallets ORDER BY team_id")?;
        let wallets = stmt
            .query_map([], wallet_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(wallets)
    }

    fn apply_balance_delta(&self, team_id: i64, delta: f64) -> Result<f64> {
        self.conn
            .query_row(
                "UPDATE wallets SET balance = balance + ?1 WHERE team_id = ?2 RETURNING balance",
                params![delta, team_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(RallyError::UnknownTeam(team_id))
    }

    fn append_ledger_entry(&self, entry: &NewLedgerEntry) -> Result<LedgerEntry> {
        let created_at = Utc::now();
        let id: i64 = self.conn.query_row(
            "INSERT INTO ledger (team_id, race_id, txn_type, amount, balance_after, entry_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             RETURNING id",
            params![
                entry.team_id,
                entry.race_id,
                entry.kind,
                entry.amount,
                entry.balance_after,
                entry.entry_hash,
                created_at.to_rfc3339(),
            ],
            |row| row.get(0),
        )?;
        Ok(LedgerEntry {
            id,
            team_id: entry.team_id,
            race_id: entry.race_id,
            kind: entry.kind,
            amount: entry.amount,
            balance_after: entry.balance_after,
            entry_hash: entry.entry_hash.clone(),
            created_at,
        })
    }

    fn last_entry_hash(&self, team_id: i64) -> Result<Option<String>> {
        let hash = self
            .conn
            .query_row(
                "SELECT entry_hash FROM ledger WHERE team_id = ?1 ORDER BY id DESC LIMIT 1",
                [team_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    fn ledger_for_team(&self, team_id: i64) -> Result<Vec<LedgerEntry>> {
        let sql = format!("SELECT {LEDGER_COLUMNS} FROM ledger WHERE team_id = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map([team_id], ledger_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn insert_race(&self, track_id: i64, entry_fee: f64, prize_pool: f64) -> Result<Race> {
        let created_at = Utc::now();
        let id: i64 = self.conn.query_row(
            "INSERT INTO races (track_id, entry_fee, prize_pool, created_at)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING id",
            params![track_id, entry_fee, prize_pool, created_at.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(Race {
            id,
            track_id,
            entry_fee,
            prize_pool,
            created_at,
        })
    }

    fn list_races(&self) -> Result<Vec<Race>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, track_id, entry_fee, prize_pool, created_at FROM races ORDER BY id DESC",
        )?;
        let races = stmt
            .query_map([], race_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(races)
    }

    fn insert_result(&self, result: &RaceResult) -> Result<()> {
        self.conn.execute(
            "INSERT INTO results (race_id, car_id, team_id, position, time_minutes, reward, penalty)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                result.race_id,
                result.car_id,
                result.team_id,
                result.position,
                result.elapsed_time,
                result.reward,
                result.penalty,
            ],
        )?;
        Ok(())
    }

    fn results_for_race(&self, race_id: i64) -> Result<Vec<RaceResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT race_id, car_id, team_id, position, time_minutes, reward, penalty
             FROM results
             WHERE race_id = ?1
             ORDER BY position",
        )?;
        let results = stmt
            .query_map([race_id], |row| {
                Ok(RaceResult {
                    race_id: row.get(0)?,
                    car_id: row.get(1)?,
                    team_id: row.get(2)?,
                    position: row.get(3)?,
                    elapsed_time: row.get(4)?,
                    reward: row.get(5)?,
                    penalty: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(results)
    }

    fn record_event(&self, event: &Event) -> Result<()> {
        let data_json = serde_json::to_string(&event.data).map_err(|e| {
            rusqlite::Error::ToSqlConversionFailure(Box::new(e))
        })?;

        self.conn.execute(
            "INSERT INTO events (
                event_id, timestamp, event_type, entity_type, entity_id, data, actor
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.event_id,
                event.timestamp.to_rfc3339(),
                event.event_type,
                event.entity_type,
                event.entity_id,
                data_json,
                event.actor,
            ],
        )?;
        Ok(())
    }

    fn begin(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

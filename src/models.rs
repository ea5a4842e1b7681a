// 🏎️ Domain records - teams, cars, tracks, races, results, wallets, ledger
//
// Rows are immutable once written. Only `Wallet::balance` changes, and only
// through settlement.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised {kind}: {value:?}")]
pub struct ParseKindError {
    pub kind: &'static str,
    pub value: String,
}

// ============================================================================
// TEAMS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTeam {
    pub name: String,
    pub country: String,
    pub starting_balance: f64,
}

/// Team listing row joined with its wallet balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamStanding {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub balance: f64,
}

// ============================================================================
// CARS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Drivetrain {
    #[serde(alias = "awd")]
    Awd,
    #[serde(alias = "rwd")]
    Rwd,
    #[serde(alias = "fwd")]
    Fwd,
}

impl Drivetrain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Drivetrain::Awd => "AWD",
            Drivetrain::Rwd => "RWD",
            Drivetrain::Fwd => "FWD",
        }
    }
}

impl FromStr for Drivetrain {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AWD" => Ok(Drivetrain::Awd),
            "RWD" => Ok(Drivetrain::Rwd),
            "FWD" => Ok(Drivetrain::Fwd),
            _ => Err(ParseKindError {
                kind: "drivetrain",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Drivetrain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl ToSql for Drivetrain {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Drivetrain {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Car attributes as registered. `acceleration` is the 0-100 km/h time in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCar {
    pub team_id: i64,
    #[serde(default)]
    pub manufacturer_id: Option<i64>,
    pub model: String,
    pub year: i32,
    pub horsepower: f64,
    pub weight: f64,
    pub acceleration: f64,
    pub top_speed: f64,
    pub reliability: f64,
    pub aerodynamics: f64,
    pub drivetrain: Drivetrain,
    pub tire: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    pub id: i64,
    pub team_id: i64,
    pub manufacturer_id: Option<i64>,
    pub model: String,
    pub year: i32,
    pub horsepower: f64,
    pub weight: f64,
    pub acceleration: f64,
    pub top_speed: f64,
    pub reliability: f64,
    pub aerodynamics: f64,
    pub drivetrain: Drivetrain,
    pub tire: String,
}

impl Car {
    pub fn from_new(id: i64, car: NewCar) -> Self {
        Car {
            id,
            team_id: car.team_id,
            manufacturer_id: car.manufacturer_id,
            model: car.model,
            year: car.year,
            horsepower: car.horsepower,
            weight: car.weight,
            acceleration: car.acceleration,
            top_speed: car.top_speed,
            reliability: car.reliability,
            aerodynamics: car.aerodynamics,
            drivetrain: car.drivetrain,
            tire: car.tire,
        }
    }

    pub fn power_to_weight(&self) -> f64 {
        self.horsepower / self.weight
    }
}

// ============================================================================
// TRACKS & RACES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    pub name: String,
    /// Severity multiplier applied to the difficulty penalty
    pub difficulty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrack {
    pub name: String,
    pub difficulty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Race {
    pub id: i64,
    pub track_id: i64,
    pub entry_fee: f64,
    pub prize_pool: f64,
    pub created_at: DateTime<Utc>,
}

/// One row per car per race
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    pub race_id: i64,
    pub car_id: i64,
    pub team_id: i64,
    pub position: u32,
    pub elapsed_time: f64,
    pub reward: f64,
    pub penalty: f64,
}

// ============================================================================
// WALLETS & LEDGER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub team_id: i64,
    pub balance: f64,
    pub starting_balance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Fee,
    Prize,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Fee => "fee",
            EntryKind::Prize => "prize",
        }
    }
}

impl FromStr for EntryKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fee" => Ok(EntryKind::Fee),
            "prize" => Ok(EntryKind::Prize),
            _ => Err(ParseKindError {
                kind: "ledger entry kind",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl ToSql for EntryKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EntryKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Ledger entry about to be appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub team_id: i64,
    pub race_id: Option<i64>,
    pub kind: EntryKind,
    /// Signed: fees are negative, prizes positive
    pub amount: f64,
    pub balance_after: f64,
    pub entry_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub team_id: i64,
    pub race_id: Option<i64>,
    pub kind: EntryKind,
    pub amount: f64,
    pub balance_after: f64,
    pub entry_hash: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drivetrain_parse_is_case_insensitive() {
        assert_eq!("awd".parse::<Drivetrain>().unwrap(), Drivetrain::Awd);
        assert_eq!(" RWD ".parse::<Drivetrain>().unwrap(), Drivetrain::Rwd);
        assert!("4WD".parse::<Drivetrain>().is_err());
    }

    #[test]
    fn test_drivetrain_serde_uses_uppercase() {
        let json = serde_json::to_string(&Drivetrain::Fwd).unwrap();
        assert_eq!(json, "\"FWD\"");
    }

    #[test]
    fn test_entry_kind_round_trip_through_str() {
        for kind in [EntryKind::Fee, EntryKind::Prize] {
            assert_eq!(kind.as_str().parse::<EntryKind>().unwrap(), kind);
        }
        assert!("refund".parse::<EntryKind>().is_err());
    }

    #[test]
    fn test_power_to_weight() {
        let car = Car::from_new(
            1,
            NewCar {
                team_id: 1,
                manufacturer_id: None,
                model: "GR Yaris".to_string(),
                year: 2021,
                horsepower: 300.0,
                weight: 1500.0,
                acceleration: 5.2,
                top_speed: 230.0,
                reliability: 0.8,
                aerodynamics: 0.7,
                drivetrain: Drivetrain::Awd,
                tire: "Gravel".to_string(),
            },
        );
        assert!((car.power_to_weight() - 0.2).abs() < 1e-12);
    }
}

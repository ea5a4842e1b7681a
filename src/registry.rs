// 📝 Registration - teams (with their wallet) and cars
//
// Input is validated here, before anything reaches the race engine. The
// accepted ranges are the ones the entry forms have always enforced.

use std::ops::RangeInclusive;
use tracing::info;

use crate::db::{unit_of_work, Event, RallyStore};
use crate::error::{RallyError, Result};
use crate::models::{Car, NewCar, NewTeam, NewTrack, Team, Track};
use crate::wallet::WalletLedger;

pub const HORSEPOWER_RANGE: RangeInclusive<f64> = 50.0..=1000.0;
pub const WEIGHT_RANGE: RangeInclusive<f64> = 500.0..=2000.0;
pub const ACCELERATION_RANGE: RangeInclusive<f64> = 1.0..=10.0;
pub const TOP_SPEED_RANGE: RangeInclusive<f64> = 100.0..=400.0;
pub const RATING_RANGE: RangeInclusive<f64> = 0.0..=1.0;
pub const YEAR_RANGE: RangeInclusive<i32> = 1990..=2030;

// ============================================================================
// VALIDATION
// ============================================================================

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RallyError::validation(field, "must not be empty"));
    }
    Ok(())
}

fn require_in_range(field: &str, value: f64, range: &RangeInclusive<f64>) -> Result<()> {
    if !range.contains(&value) {
        return Err(RallyError::validation(
            field,
            format!("{value} is outside {}..={}", range.start(), range.end()),
        ));
    }
    Ok(())
}

pub fn validate_team(team: &NewTeam) -> Result<()> {
    require_text("team_name", &team.name)?;
    require_text("country", &team.country)?;
    if !team.starting_balance.is_finite() || team.starting_balance < 0.0 {
        return Err(RallyError::validation(
            "starting_balance",
            "must be a non-negative number",
        ));
    }
    Ok(())
}

pub fn validate_car(car: &NewCar) -> Result<()> {
    require_text("model", &car.model)?;
    require_text("tire", &car.tire)?;
    if !YEAR_RANGE.contains(&car.year) {
        return Err(RallyError::validation(
            "year",
            format!("{} is outside {}..={}", car.year, YEAR_RANGE.start(), YEAR_RANGE.end()),
        ));
    }
    require_in_range("horsepower", car.horsepower, &HORSEPOWER_RANGE)?;
    require_in_range("weight", car.weight, &WEIGHT_RANGE)?;
    require_in_range("acceleration", car.acceleration, &ACCELERATION_RANGE)?;
    require_in_range("top_speed", car.top_speed, &TOP_SPEED_RANGE)?;
    require_in_range("reliability", car.reliability, &RATING_RANGE)?;
    require_in_range("aerodynamics", car.aerodynamics, &RATING_RANGE)?;
    if let Some(id) = car.manufacturer_id {
        if id < 1 {
            return Err(RallyError::validation("manufacturer_id", "must be at least 1"));
        }
    }
    Ok(())
}

pub fn validate_track(track: &NewTrack) -> Result<()> {
    require_text("track_name", &track.name)?;
    if !track.difficulty.is_finite() || track.difficulty < 0.0 {
        return Err(RallyError::validation("difficulty", "must be a non-negative number"));
    }
    Ok(())
}

// ============================================================================
// REGISTRATION
// ============================================================================

/// Insert a team and open its wallet with the starting balance.
///
/// Team row, wallet and audit event are written together or not at all.
pub fn register_team<S: RallyStore + ?Sized>(store: &S, team: &NewTeam) -> Result<Team> {
    validate_team(team)?;

    let created = unit_of_work(store, || {
        let created = store.insert_team(team)?;
        WalletLedger::new(store).open(created.id, team.starting_balance)?;

        store.record_event(&Event::new(
            "team_registered",
            "team",
            created.id,
            serde_json::json!({
                "name": created.name,
                "country": created.country,
                "starting_balance": team.starting_balance,
            }),
            "registry",
        ))?;
        Ok(created)
    })?;

    info!(team_id = created.id, name = %created.name, balance = team.starting_balance, "Team registered");
    Ok(created)
}

/// Insert a car for a team that has a wallet.
pub fn register_car<S: RallyStore + ?Sized>(store: &S, car: &NewCar) -> Result<Car> {
    validate_car(car)?;
    // Every entrant must have a wallet to settle against
    if store.get_wallet(car.team_id)?.is_none() {
        return Err(RallyError::UnknownTeam(car.team_id));
    }

    let created = unit_of_work(store, || {
        let created = store.insert_car(car)?;
        store.record_event(&Event::new(
            "car_registered",
            "car",
            created.id,
            serde_json::json!({
                "team_id": created.team_id,
                "model": created.model,
                "horsepower": created.horsepower,
                "weight": created.weight,
            }),
            "registry",
        ))?;
        Ok(created)
    })?;

    info!(car_id = created.id, team_id = created.team_id, model = %created.model, "Car registered");
    Ok(created)
}

/// Add track reference data.
pub fn register_track<S: RallyStore + ?Sized>(store: &S, track: &NewTrack) -> Result<Track> {
    validate_track(track)?;
    let created = store.insert_track(track)?;
    info!(track_id = created.id, name = %created.name, difficulty = created.difficulty, "Track added");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::models::Drivetrain;

    fn new_team(name: &str) -> NewTeam {
        NewTeam {
            name: name.to_string(),
            country: "FI".to_string(),
            starting_balance: 5000.0,
        }
    }

    fn new_car(team_id: i64) -> NewCar {
        NewCar {
            team_id,
            manufacturer_id: Some(1),
            model: "Puma Rally1".to_string(),
            year: 2023,
            horsepower: 500.0,
            weight: 1260.0,
            acceleration: 3.2,
            top_speed: 200.0,
            reliability: 0.85,
            aerodynamics: 0.9,
            drivetrain: Drivetrain::Awd,
            tire: "Gravel".to_string(),
        }
    }

    #[test]
    fn test_register_team_opens_wallet() {
        let store = SqliteStore::open_in_memory().unwrap();
        let team = register_team(&store, &new_team("M-Sport")).unwrap();

        let wallet = store.get_wallet(team.id).unwrap().unwrap();
        assert_eq!(wallet.balance, 5000.0);
        assert_eq!(wallet.starting_balance, 5000.0);

        let events = store.events_for_entity("team", &team.id.to_string()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "team_registered");
    }

    #[test]
    fn test_register_team_rejects_blank_name() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result = register_team(&store, &new_team("   "));
        assert!(matches!(result, Err(RallyError::Validation { ref field, .. }) if field == "team_name"));
        assert!(store.list_teams_with_balance().unwrap().is_empty());
    }

    #[test]
    fn test_register_car() {
        let store = SqliteStore::open_in_memory().unwrap();
        let team = register_team(&store, &new_team("M-Sport")).unwrap();

        let car = register_car(&store, &new_car(team.id)).unwrap();
        assert_eq!(car.team_id, team.id);
        assert_eq!(store.list_cars().unwrap().len(), 1);
    }

    #[test]
    fn test_register_car_for_unknown_team() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result = register_car(&store, &new_car(12));
        assert!(matches!(result, Err(RallyError::UnknownTeam(12))));
    }

    #[test]
    fn test_register_car_for_team_without_wallet() {
        let store = SqliteStore::open_in_memory().unwrap();
        let bare = store.insert_team(&new_team("No Wallet")).unwrap();

        let result = register_car(&store, &new_car(bare.id));

        assert!(matches!(result, Err(RallyError::UnknownTeam(id)) if id == bare.id));
        assert!(store.list_cars().unwrap().is_empty());
    }

    #[test]
    fn test_car_ranges() {
        let mut car = new_car(1);
        car.horsepower = 49.0;
        assert!(validate_car(&car).is_err());

        let mut car = new_car(1);
        car.weight = 2500.0;
        assert!(validate_car(&car).is_err());

        let mut car = new_car(1);
        car.reliability = 1.01;
        assert!(validate_car(&car).is_err());

        let mut car = new_car(1);
        car.year = 1989;
        assert!(validate_car(&car).is_err());

        let mut car = new_car(1);
        car.horsepower = f64::NAN;
        assert!(validate_car(&car).is_err());

        assert!(validate_car(&new_car(1)).is_ok());
    }

    #[test]
    fn test_track_difficulty_must_be_non_negative() {
        let store = SqliteStore::open_in_memory().unwrap();
        let bad = NewTrack { name: "Safari".into(), difficulty: -0.5 };
        assert!(register_track(&store, &bad).is_err());

        let good = NewTrack { name: "Safari".into(), difficulty: 1.8 };
        assert_eq!(register_track(&store, &good).unwrap().name, "Safari");
    }
}

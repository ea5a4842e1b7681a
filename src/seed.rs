// 🌱 Seed data - tracks, teams and cars from CSV
//
// Expected files in the seed directory (each optional):
//   tracks.csv  name,difficulty
//   teams.csv   team_name,country[,balance]
//   cars.csv    team_id,manufacturer_id,model,year,hp,weight,accel,top_speed,
//               reliability,aero,drivetrain,tire
//
// Every row goes through the same validation as interactive registration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::db::RallyStore;
use crate::error::Result;
use crate::models::{Drivetrain, NewCar, NewTeam, NewTrack};
use crate::registry;

#[derive(Debug, Deserialize)]
struct TrackRow {
    name: String,
    difficulty: f64,
}

#[derive(Debug, Deserialize)]
struct TeamRow {
    team_name: String,
    country: String,
    #[serde(default)]
    balance: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CarRow {
    team_id: i64,
    #[serde(default)]
    manufacturer_id: Option<i64>,
    model: String,
    year: i32,
    hp: f64,
    weight: f64,
    accel: f64,
    top_speed: f64,
    reliability: f64,
    aero: f64,
    drivetrain: Drivetrain,
    tire: String,
}

impl From<CarRow> for NewCar {
    fn from(row: CarRow) -> Self {
        NewCar {
            team_id: row.team_id,
            manufacturer_id: row.manufacturer_id,
            model: row.model,
            year: row.year,
            horsepower: row.hp,
            weight: row.weight,
            acceleration: row.accel,
            top_speed: row.top_speed,
            reliability: row.reliability,
            aerodynamics: row.aero,
            drivetrain: row.drivetrain,
            tire: row.tire,
        }
    }
}

pub fn load_tracks(path: &Path) -> Result<Vec<NewTrack>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut tracks = Vec::new();
    for row in rdr.deserialize() {
        let row: TrackRow = row?;
        tracks.push(NewTrack {
            name: row.name,
            difficulty: row.difficulty,
        });
    }
    Ok(tracks)
}

/// Teams without a balance column get `default_balance`.
pub fn load_teams(path: &Path, default_balance: f64) -> Result<Vec<NewTeam>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut teams = Vec::new();
    for row in rdr.deserialize() {
        let row: TeamRow = row?;
        teams.push(NewTeam {
            name: row.team_name,
            country: row.country,
            starting_balance: row.balance.unwrap_or(default_balance),
        });
    }
    Ok(teams)
}

pub fn load_cars(path: &Path) -> Result<Vec<NewCar>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut cars = Vec::new();
    for row in rdr.deserialize() {
        let row: CarRow = row?;
        cars.push(row.into());
    }
    Ok(cars)
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedSummary {
    pub tracks: usize,
    pub teams: usize,
    pub cars: usize,
}

/// Load whichever seed files exist in `dir`: tracks, then teams, then cars.
pub fn seed_directory<S: RallyStore + ?Sized>(
    store: &S,
    dir: &Path,
    default_balance: f64,
) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    let tracks_path = dir.join("tracks.csv");
    if tracks_path.exists() {
        for track in load_tracks(&tracks_path)? {
            registry::register_track(store, &track)?;
            summary.tracks += 1;
        }
    }

    let teams_path = dir.join("teams.csv");
    if teams_path.exists() {
        for team in load_teams(&teams_path, default_balance)? {
            registry::register_team(store, &team)?;
            summary.teams += 1;
        }
    }

    let cars_path = dir.join("cars.csv");
    if cars_path.exists() {
        for car in load_cars(&cars_path)? {
            registry::register_car(store, &car)?;
            summary.cars += 1;
        }
    }

    info!(
        dir = %dir.display(),
        tracks = summary.tracks,
        teams = summary.teams,
        cars = summary.cars,
        "Seed data loaded"
    );
    Ok(summary)
}

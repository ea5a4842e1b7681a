// 🏁 Race Orchestrator - track → race record → scoring → ranking → settlement
//
// Steps of one run:
//   1. pick a track (uniformly at random unless one is requested)
//   2. insert the race record
//   3. load every car (no balance pre-check; teams may race into the red)
//   4. score each car
//   5. rank by time, ties by ascending car id
//   6. allocate the prize pool by position
//   7. settle each entrant in rank order and record its result

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};

use crate::config::{RaceConfig, SettlementMode};
use crate::db::{unit_of_work, Event, RallyStore};
use crate::error::{RallyError, Result};
use crate::models::{Car, Race, RaceResult, Track};
use crate::scoring::{self, UniformSource};
use crate::wallet::{Settlement, WalletLedger};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackChoice {
    #[default]
    Random,
    Id(i64),
}

/// A scored car
#[derive(Debug, Clone, PartialEq)]
pub struct Entrant {
    pub car: Car,
    pub elapsed_time: f64,
}

/// Display row: position, car, time (2 decimals), reward
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingRow {
    pub position: u32,
    pub car: String,
    pub time: f64,
    pub reward: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceReport {
    pub race: Race,
    pub track: Track,
    pub results: Vec<RaceResult>,
    pub table: Vec<StandingRow>,
    pub settlements: Vec<Settlement>,
}

impl RaceReport {
    pub fn total_rewards(&self) -> f64 {
        self.results.iter().map(|r| r.reward).sum()
    }

    pub fn total_fees(&self) -> f64 {
        self.results.iter().map(|r| r.penalty).sum()
    }

    pub fn winner(&self) -> Option<&StandingRow> {
        self.table.first()
    }
}

// ============================================================================
// PURE HELPERS
// ============================================================================

/// Reward per finishing position. Positions past the share list get 0.
pub fn allocate_rewards(prize_pool: f64, shares: &[f64], entrants: usize) -> Vec<f64> {
    (0..entrants)
        .map(|idx| shares.get(idx).map_or(0.0, |share| prize_pool * share))
        .collect()
}

/// Sort ascending by time; equal times go to the lower car id.
pub fn rank_entrants(mut entrants: Vec<Entrant>) -> Vec<Entrant> {
    entrants.sort_by(|a, b| match a.elapsed_time.total_cmp(&b.elapsed_time) {
        Ordering::Equal => a.car.id.cmp(&b.car.id),
        other => other,
    });
    entrants
}

/// Index in `0..len` from one uniform draw
fn pick_index<R: UniformSource + ?Sized>(source: &mut R, len: usize) -> usize {
    let draw = source.uniform(0.0, len as f64);
    (draw.max(0.0).floor() as usize).min(len - 1)
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct RaceOrchestrator<'a, S: RallyStore + ?Sized> {
    store: &'a S,
    config: &'a RaceConfig,
}

impl<'a, S: RallyStore + ?Sized> RaceOrchestrator<'a, S> {
    pub fn new(store: &'a S, config: &'a RaceConfig) -> Self {
        Self { store, config }
    }

    /// Run one race and settle every entrant.
    ///
    /// In `PerEntrant` mode each entrant's settlement and result row form one
    /// transaction: a failure aborts the run, leaves earlier entrants settled
    /// and leaves no trace of the failing one. In `PerRace` mode the whole run
    /// is one transaction and is rolled back on failure.
    pub fn run_race<R: UniformSource + ?Sized>(
        &self,
        choice: TrackChoice,
        source: &mut R,
    ) -> Result<RaceReport> {
        self.config.validate()?;
        let track = self.select_track(choice, source)?;

        match self.config.settlement {
            SettlementMode::PerEntrant => self.run_on_track(track, source),
            SettlementMode::PerRace => {
                unit_of_work(self.store, || self.run_on_track(track, source))
            }
        }
    }

    pub fn select_track<R: UniformSource + ?Sized>(
        &self,
        choice: TrackChoice,
        source: &mut R,
    ) -> Result<Track> {
        match choice {
            TrackChoice::Id(id) => self.store.get_track(id)?.ok_or(RallyError::UnknownTrack(id)),
            TrackChoice::Random => {
                let mut tracks = self.store.list_tracks()?;
                if tracks.is_empty() {
                    return Err(RallyError::EmptyTrackSet);
                }
                let idx = pick_index(source, tracks.len());
                Ok(tracks.swap_remove(idx))
            }
        }
    }

    /// Score every car on the track and rank them.
    pub fn score_entrants<R: UniformSource + ?Sized>(
        &self,
        track: &Track,
        source: &mut R,
    ) -> Result<Vec<Entrant>> {
        let entrants = self
            .store
            .list_cars()?
            .into_iter()
            .map(|car| {
                let elapsed_time = scoring::score(&car, track.difficulty, &mut *source);
                debug!(car_id = car.id, time = elapsed_time, "Scored");
                Entrant { car, elapsed_time }
            })
            .collect();
        Ok(rank_entrants(entrants))
    }

    fn run_on_track<R: UniformSource + ?Sized>(
        &self,
        track: Track,
        source: &mut R,
    ) -> Result<RaceReport> {
        let race = self
            .store
            .insert_race(track.id, self.config.entry_fee, self.config.prize_pool)?;

        info!(
            race_id = race.id,
            track = %track.name,
            difficulty = track.difficulty,
            "Race started"
        );

        let ranked = self.score_entrants(&track, source)?;
        let rewards = allocate_rewards(race.prize_pool, &self.config.reward_shares, ranked.len());
        let ledger = WalletLedger::new(self.store);

        let mut results = Vec::with_capacity(ranked.len());
        let mut table = Vec::with_capacity(ranked.len());
        let mut settlements = Vec::with_capacity(ranked.len());

        for ((idx, entrant), reward) in ranked.into_iter().enumerate().zip(rewards) {
            let position = idx as u32 + 1;
            let (settlement, result) = match self.config.settlement {
                SettlementMode::PerEntrant => unit_of_work(self.store, || {
                    self.settle_entrant(&ledger, &race, &entrant, position, reward)
                })?,
                // Already inside the race-wide transaction
                SettlementMode::PerRace => {
                    self.settle_entrant(&ledger, &race, &entrant, position, reward)?
                }
            };

            table.push(StandingRow {
                position,
                car: entrant.car.model,
                time: scoring::round_time(entrant.elapsed_time),
                reward,
            });
            results.push(result);
            settlements.push(settlement);
        }

        let report = RaceReport {
            race,
            track,
            results,
            table,
            settlements,
        };

        self.store.record_event(&Event::new(
            "race_finished",
            "race",
            report.race.id,
            serde_json::json!({
                "track_id": report.track.id,
                "entrants": report.results.len(),
                "rewards_paid": report.total_rewards(),
                "fees_charged": report.total_fees(),
            }),
            "race_orchestrator",
        ))?;

        info!(
            race_id = report.race.id,
            entrants = report.results.len(),
            winner = report.winner().map(|w| w.car.as_str()).unwrap_or("-"),
            "Race finished"
        );

        Ok(report)
    }

    /// Charge the fee, pay the reward and record the result row for one car.
    fn settle_entrant(
        &self,
        ledger: &WalletLedger<'_, S>,
        race: &Race,
        entrant: &Entrant,
        position: u32,
        reward: f64,
    ) -> Result<(Settlement, RaceResult)> {
        let settlement = ledger.settle(entrant.car.team_id, Some(race.id), race.entry_fee, reward)?;

        let result = RaceResult {
            race_id: race.id,
            car_id: entrant.car.id,
            team_id: entrant.car.team_id,
            position,
            elapsed_time: entrant.elapsed_time,
            reward,
            penalty: race.entry_fee,
        };
        self.store.insert_result(&result)?;

        Ok((settlement, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Drivetrain, NewCar};
    use crate::scoring::ScriptedSource;

    fn entrant(id: i64, time: f64) -> Entrant {
        Entrant {
            car: Car::from_new(
                id,
                NewCar {
                    team_id: id,
                    manufacturer_id: None,
                    model: format!("car-{id}"),
                    year: 2020,
                    horsepower: 300.0,
                    weight: 1400.0,
                    acceleration: 5.0,
                    top_speed: 250.0,
                    reliability: 0.8,
                    aerodynamics: 0.7,
                    drivetrain: Drivetrain::Fwd,
                    tire: "Snow".to_string(),
                },
            ),
            elapsed_time: time,
        }
    }

    #[test]
    fn test_allocate_rewards_full_field() {
        let rewards = allocate_rewards(3000.0, &[0.5, 0.3, 0.2], 5);
        assert_eq!(rewards, vec![1500.0, 900.0, 600.0, 0.0, 0.0]);
        assert_eq!(rewards.iter().sum::<f64>(), 3000.0);
    }

    #[test]
    fn test_allocate_rewards_short_field_pays_less() {
        let rewards = allocate_rewards(3000.0, &[0.5, 0.3, 0.2], 2);
        assert_eq!(rewards, vec![1500.0, 900.0]);
        assert!(rewards.iter().sum::<f64>() < 3000.0);
        assert!(allocate_rewards(3000.0, &[0.5, 0.3, 0.2], 0).is_empty());
    }

    #[test]
    fn test_rank_ties_go_to_lower_car_id() {
        let ranked = rank_entrants(vec![entrant(9, 50.0), entrant(3, 50.0), entrant(5, 40.0)]);
        let ids: Vec<i64> = ranked.iter().map(|e| e.car.id).collect();
        assert_eq!(ids, vec![5, 3, 9]);
    }

    #[test]
    fn test_pick_index_stays_in_bounds() {
        let mut top = ScriptedSource::new(vec![3.0]);
        assert_eq!(pick_index(&mut top, 3), 2);
        let mut bottom = ScriptedSource::new(vec![0.0]);
        assert_eq!(pick_index(&mut bottom, 3), 0);
        let mut middle = ScriptedSource::new(vec![1.7]);
        assert_eq!(pick_index(&mut middle, 3), 1);
    }
}

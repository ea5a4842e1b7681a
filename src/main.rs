use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;

use rally_ledger::logging::init_logging;
use rally_ledger::{
    register_car, register_team, seed_directory, AppConfig, Drivetrain, NewCar, NewTeam,
    RaceOrchestrator, RallyStore, ReconciliationEngine, SeededSource, SqliteStore, TrackChoice,
};

const DEFAULT_CONFIG: &str = "rally.toml";

const USAGE: &str = "\
Usage: rally [--config PATH] <command>

Commands:
  init                             create the database schema
  seed <dir>                       load tracks.csv / teams.csv / cars.csv
  teams                            list teams with wallet balances
  tracks                           list tracks
  add-team <name> <country> [balance]
  add-car team_id=N model=NAME [key=value ...]
                                   keys: manufacturer_id year hp weight accel
                                   top_speed reliability aero drivetrain tire
  race [--seed N] [--track ID]     run a race and settle every team
  races                            list past races
  results <race_id>                show a race's results
  ledger <team_id>                 show a team's ledger
  reconcile                        check every wallet against its ledger";

fn main() -> Result<()> {
    init_logging("rally_ledger=info");

    let mut args: Vec<String> = env::args().skip(1).collect();
    let config_path = take_flag(&mut args, "--config")?
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = AppConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    let Some(command) = args.first().cloned() else {
        println!("{USAGE}");
        return Ok(());
    };
    let rest = &args[1..];

    if matches!(command.as_str(), "help" | "--help" | "-h") {
        println!("{USAGE}");
        return Ok(());
    }

    let store = open_store(&config.database.path)?;

    match command.as_str() {
        "init" => {
            println!("✓ Database ready at {}", config.database.path.display());
        }
        "seed" => run_seed(&store, &config, rest)?,
        "teams" => run_teams(&store)?,
        "tracks" => run_tracks(&store)?,
        "add-team" => run_add_team(&store, &config, rest)?,
        "add-car" => run_add_car(&store, rest)?,
        "race" => run_race(&store, &config, rest)?,
        "races" => run_races(&store)?,
        "results" => run_results(&store, rest)?,
        "ledger" => run_ledger(&store, rest)?,
        "reconcile" => run_reconcile(&store)?,
        other => bail!("Unknown command '{other}'\n\n{USAGE}"),
    }

    Ok(())
}

fn open_store(path: &Path) -> Result<SqliteStore> {
    SqliteStore::open(path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Remove `--name value` from `args`, returning the value.
fn take_flag(args: &mut Vec<String>, name: &str) -> Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == name) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        bail!("{name} needs a value");
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

fn arg<'a>(rest: &'a [String], idx: usize, name: &str) -> Result<&'a str> {
    rest.get(idx)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing <{name}>\n\n{USAGE}"))
}

fn parse_id(raw: &str, name: &str) -> Result<i64> {
    raw.parse()
        .with_context(|| format!("<{name}> must be an integer, got '{raw}'"))
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_seed(store: &SqliteStore, config: &AppConfig, rest: &[String]) -> Result<()> {
    let dir = PathBuf::from(arg(rest, 0, "dir")?);
    let summary = seed_directory(store, &dir, config.teams.default_starting_balance)
        .with_context(|| format!("Failed to seed from {}", dir.display()))?;
    println!(
        "✓ Seeded {} tracks, {} teams, {} cars",
        summary.tracks, summary.teams, summary.cars
    );
    Ok(())
}

fn run_teams(store: &SqliteStore) -> Result<()> {
    println!("{:>4}  {:<28} {:<12} {:>12}", "ID", "TEAM", "COUNTRY", "BALANCE");
    for team in store.list_teams_with_balance()? {
        println!(
            "{:>4}  {:<28} {:<12} {:>12.2}",
            team.id, team.name, team.country, team.balance
        );
    }
    Ok(())
}

fn run_tracks(store: &SqliteStore) -> Result<()> {
    println!("{:>4}  {:<28} {:>10}", "ID", "TRACK", "DIFFICULTY");
    for track in store.list_tracks()? {
        println!("{:>4}  {:<28} {:>10.2}", track.id, track.name, track.difficulty);
    }
    Ok(())
}

fn run_add_team(store: &SqliteStore, config: &AppConfig, rest: &[String]) -> Result<()> {
    let name = arg(rest, 0, "name")?;
    let country = arg(rest, 1, "country")?;
    let starting_balance = match rest.get(2) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("[balance] must be a number, got '{raw}'"))?,
        None => config.teams.default_starting_balance,
    };

    let team = register_team(
        store,
        &NewTeam {
            name: name.to_string(),
            country: country.to_string(),
            starting_balance,
        },
    )?;
    println!(
        "✓ Team '{}' added (id {}) with balance {:.2}",
        team.name, team.id, starting_balance
    );
    Ok(())
}

/// Parse `key=value` pairs into a car, with the entry form's defaults.
fn parse_new_car(rest: &[String]) -> Result<NewCar> {
    let mut fields: HashMap<&str, &str> = HashMap::new();
    for pair in rest {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value, got '{pair}'"))?;
        fields.insert(key, value);
    }

    fn num<T: std::str::FromStr>(fields: &HashMap<&str, &str>, key: &str, default: T) -> Result<T>
    where
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match fields.get(key) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("{key} must be a number, got '{raw}'")),
            None => Ok(default),
        }
    }

    let team_id = fields
        .get("team_id")
        .ok_or_else(|| anyhow!("team_id is required"))
        .and_then(|raw| parse_id(raw, "team_id"))?;
    let model = fields
        .get("model")
        .ok_or_else(|| anyhow!("model is required"))?
        .to_string();
    let manufacturer_id = fields
        .get("manufacturer_id")
        .map(|raw| parse_id(raw, "manufacturer_id"))
        .transpose()?;
    let drivetrain: Drivetrain = match fields.get("drivetrain") {
        Some(raw) => raw.parse()?,
        None => Drivetrain::Awd,
    };

    Ok(NewCar {
        team_id,
        manufacturer_id,
        model,
        year: num(&fields, "year", 2020)?,
        horsepower: num(&fields, "hp", 300.0)?,
        weight: num(&fields, "weight", 1400.0)?,
        acceleration: num(&fields, "accel", 5.0)?,
        top_speed: num(&fields, "top_speed", 250.0)?,
        reliability: num(&fields, "reliability", 0.8)?,
        aerodynamics: num(&fields, "aero", 0.7)?,
        drivetrain,
        tire: fields.get("tire").unwrap_or(&"Tarmac").to_string(),
    })
}

fn run_add_car(store: &SqliteStore, rest: &[String]) -> Result<()> {
    let car = register_car(store, &parse_new_car(rest)?)?;
    println!("✓ Car {} added to Team {} (id {})", car.model, car.team_id, car.id);
    Ok(())
}

fn run_race(store: &SqliteStore, config: &AppConfig, rest: &[String]) -> Result<()> {
    let mut rest = rest.to_vec();
    let seed = take_flag(&mut rest, "--seed")?
        .map(|raw| raw.parse::<u64>().with_context(|| format!("--seed must be an integer, got '{raw}'")))
        .transpose()?;
    let choice = match take_flag(&mut rest, "--track")? {
        Some(raw) => TrackChoice::Id(parse_id(&raw, "track")?),
        None => TrackChoice::Random,
    };

    let mut source = match seed {
        Some(seed) => {
            info!(seed, "Using seeded randomness");
            SeededSource::new(seed)
        }
        None => SeededSource::from_entropy(),
    };

    let report = RaceOrchestrator::new(store, &config.race)
        .run_race(choice, &mut source)
        .context("Race failed")?;

    println!("🏁 Track: {} (difficulty {:.2})", report.track.name, report.track.difficulty);
    println!("{:>8}  {:<28} {:>12} {:>10}", "POSITION", "CAR", "TIME", "REWARD");
    for row in &report.table {
        println!(
            "{:>8}  {:<28} {:>12.2} {:>10.2}",
            row.position, row.car, row.time, row.reward
        );
    }
    println!("✅ Race finished and saved! (Race ID: {})", report.race.id);
    Ok(())
}

fn run_races(store: &SqliteStore) -> Result<()> {
    println!("{:>4}  {:>6} {:>10} {:>10}  {}", "ID", "TRACK", "FEE", "POOL", "CREATED");
    for race in store.list_races()? {
        println!(
            "{:>4}  {:>6} {:>10.2} {:>10.2}  {}",
            race.id,
            race.track_id,
            race.entry_fee,
            race.prize_pool,
            race.created_at.to_rfc3339()
        );
    }
    Ok(())
}

fn run_results(store: &SqliteStore, rest: &[String]) -> Result<()> {
    let race_id = parse_id(arg(rest, 0, "race_id")?, "race_id")?;
    let results = store.results_for_race(race_id)?;
    if results.is_empty() {
        bail!("No results for race {race_id}");
    }
    println!(
        "{:>8}  {:>6} {:>6} {:>12} {:>10} {:>10}",
        "POSITION", "CAR", "TEAM", "TIME", "REWARD", "FEE"
    );
    for r in results {
        println!(
            "{:>8}  {:>6} {:>6} {:>12.2} {:>10.2} {:>10.2}",
            r.position, r.car_id, r.team_id, r.elapsed_time, r.reward, r.penalty
        );
    }
    Ok(())
}

fn run_ledger(store: &SqliteStore, rest: &[String]) -> Result<()> {
    let team_id = parse_id(arg(rest, 0, "team_id")?, "team_id")?;
    if store.get_wallet(team_id)?.is_none() {
        bail!("Team {team_id} has no wallet");
    }
    println!("{:>6}  {:>6} {:<6} {:>10} {:>12}", "ENTRY", "RACE", "TYPE", "AMOUNT", "BALANCE");
    for entry in store.ledger_for_team(team_id)? {
        let race = entry.race_id.map_or_else(|| "-".to_string(), |id| id.to_string());
        println!(
            "{:>6}  {:>6} {:<6} {:>+10.2} {:>12.2}",
            entry.id, race, entry.kind, entry.amount, entry.balance_after
        );
    }
    Ok(())
}

fn run_reconcile(store: &SqliteStore) -> Result<()> {
    let reports = ReconciliationEngine::new().reconcile_all(store)?;
    let mut dirty = 0;
    for report in &reports {
        let mark = if report.is_clean() { "✓" } else { "❌" };
        println!("{mark} {}", report.summary());
        for d in &report.discrepancies {
            println!("    {:?}: {}", d.category, d.description);
        }
        if !report.is_clean() {
            dirty += 1;
        }
    }
    if dirty > 0 {
        bail!("{dirty} of {} wallets do not reconcile", reports.len());
    }
    Ok(())
}

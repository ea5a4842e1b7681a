// Registration is all-or-nothing

mod common;

use common::{FailingStore, Op};
use rally_ledger::{
    register_car, register_team, Drivetrain, NewCar, NewTeam, RallyError, RallyStore, SqliteStore,
};

fn new_team(name: &str) -> NewTeam {
    NewTeam {
        name: name.to_string(),
        country: "EE".to_string(),
        starting_balance: 5000.0,
    }
}

fn team_rows(store: &FailingStore) -> i64 {
    store
        .inner
        .connection()
        .query_row("SELECT COUNT(*) FROM teams", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn failed_wallet_leaves_no_team_behind() {
    let store = FailingStore::new(SqliteStore::open_in_memory().unwrap(), Op::OpenWallet, 1);

    let result = register_team(&store, &new_team("Half Registered"));

    assert!(matches!(result, Err(RallyError::Persistence(_))));
    assert_eq!(team_rows(&store), 0);
    assert!(store.list_teams_with_balance().unwrap().is_empty());
    assert!(store
        .inner
        .events_for_entity("team", "1")
        .unwrap()
        .is_empty());
}

#[test]
fn registration_recovers_after_a_failed_attempt() {
    let store = FailingStore::new(SqliteStore::open_in_memory().unwrap(), Op::OpenWallet, 1);

    assert!(register_team(&store, &new_team("First Try")).is_err());
    let team = register_team(&store, &new_team("Second Try")).unwrap();

    assert_eq!(team_rows(&store), 1);
    let standings = store.list_teams_with_balance().unwrap();
    assert_eq!(standings.len(), 1);
    assert_eq!(standings[0].id, team.id);
    assert_eq!(standings[0].balance, 5000.0);

    let car = register_car(
        &store,
        &NewCar {
            team_id: team.id,
            manufacturer_id: None,
            model: "Rally2".to_string(),
            year: 2021,
            horsepower: 290.0,
            weight: 1230.0,
            acceleration: 4.1,
            top_speed: 190.0,
            reliability: 0.9,
            aerodynamics: 0.7,
            drivetrain: Drivetrain::Awd,
            tire: "Gravel".to_string(),
        },
    )
    .unwrap();
    assert_eq!(car.team_id, team.id);
}

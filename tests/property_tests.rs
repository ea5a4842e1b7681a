// Property tests for scoring, reward allocation and wallet settlement

use proptest::prelude::*;

use rally_ledger::{
    allocate_rewards, register_team, score, score_with_draws, Car, Drivetrain, NewCar, NewTeam,
    RallyStore, ReconciliationEngine, ScriptedSource, SqliteStore, WalletLedger,
};

fn car(horsepower: f64, weight: f64) -> Car {
    Car::from_new(
        1,
        NewCar {
            team_id: 1,
            manufacturer_id: None,
            model: "Prop".to_string(),
            year: 2020,
            horsepower,
            weight,
            acceleration: 5.0,
            top_speed: 250.0,
            reliability: 0.8,
            aerodynamics: 0.7,
            drivetrain: Drivetrain::Fwd,
            tire: "Tarmac".to_string(),
        },
    )
}

proptest! {
    #[test]
    fn score_is_positive(
        hp in 50.0f64..1000.0,
        weight in 500.0f64..2000.0,
        difficulty in 0.0f64..3.0,
        jitter in 0.9f64..=1.1,
        draw in 0.1f64..=0.3,
    ) {
        let time = score_with_draws(&car(hp, weight), difficulty, jitter, draw);
        prop_assert!(time > 0.0);
        prop_assert!(time.is_finite());
    }

    #[test]
    fn more_power_per_kilo_is_never_slower(
        weight in 500.0f64..2000.0,
        hp in 50.0f64..900.0,
        extra in 1.0f64..100.0,
        difficulty in 0.0f64..3.0,
        jitter in 0.9f64..=1.1,
        draw in 0.1f64..=0.3,
    ) {
        let slower = score_with_draws(&car(hp, weight), difficulty, jitter, draw);
        let faster = score_with_draws(&car(hp + extra, weight), difficulty, jitter, draw);
        prop_assert!(faster < slower);
    }

    #[test]
    fn same_draws_give_same_time(
        hp in 50.0f64..1000.0,
        weight in 500.0f64..2000.0,
        difficulty in 0.0f64..3.0,
        jitter in 0.9f64..=1.1,
        draw in 0.1f64..=0.3,
    ) {
        let c = car(hp, weight);
        let a = score(&c, difficulty, &mut ScriptedSource::fixed(jitter, draw));
        let b = score(&c, difficulty, &mut ScriptedSource::fixed(jitter, draw));
        prop_assert_eq!(a, b);
        prop_assert_eq!(a, score_with_draws(&c, difficulty, jitter, draw));
    }

    #[test]
    fn full_field_pays_out_the_whole_pool(pool in 0.0f64..1_000_000.0, entrants in 3usize..40) {
        let rewards = allocate_rewards(pool, &[0.5, 0.3, 0.2], entrants);
        prop_assert_eq!(rewards.len(), entrants);
        let paid: f64 = rewards.iter().sum();
        prop_assert!((paid - pool).abs() <= pool * 1e-12 + 1e-9);
        prop_assert!(rewards[3..].iter().all(|r| *r == 0.0));
    }

    #[test]
    fn short_field_pays_out_less(pool in 1.0f64..1_000_000.0, entrants in 0usize..3) {
        let rewards = allocate_rewards(pool, &[0.5, 0.3, 0.2], entrants);
        prop_assert_eq!(rewards.len(), entrants);
        prop_assert!(rewards.iter().sum::<f64>() < pool);
    }

    #[test]
    fn balance_is_starting_plus_ledger_sum(
        starting in 0.0f64..20_000.0,
        races in prop::collection::vec((0.0f64..2_000.0, prop::sample::select(vec![0.0, 600.0, 900.0, 1500.0])), 1..15),
    ) {
        let store = SqliteStore::open_in_memory().unwrap();
        let team = register_team(
            &store,
            &NewTeam {
                name: "Prop Racing".to_string(),
                country: "NZ".to_string(),
                starting_balance: starting,
            },
        )
        .unwrap();

        let ledger = WalletLedger::new(&store);
        for (fee, reward) in &races {
            ledger.settle(team.id, None, *fee, *reward).unwrap();
        }

        let entries = store.ledger_for_team(team.id).unwrap();
        let sum: f64 = entries.iter().map(|e| e.amount).sum();
        let balance = ledger.balance(team.id).unwrap();
        prop_assert!((balance - (starting + sum)).abs() < 1e-6);

        let expected_entries = races.len() + races.iter().filter(|(_, r)| *r > 0.0).count();
        prop_assert_eq!(entries.len(), expected_entries);

        let report = ReconciliationEngine::new().reconcile_team(&store, team.id).unwrap();
        prop_assert!(report.is_clean(), "{}", report.summary());
    }
}

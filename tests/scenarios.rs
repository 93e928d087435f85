use std::sync::Arc;

use approx::assert_relative_eq;
use episim::disease::DiseaseDistributions;
use episim::mobility::{ContactMode, MobilityConfig, MobilitySimulator, PersonId, SiteType};
use episim::{
    launch_parallel_rollouts, CancellationToken, DiseaseState, Rollout, SimError, SimulationParams,
    SimulationSetup,
};

fn isolated_people(households: Vec<usize>) -> MobilityConfig {
    let n = households.len();
    MobilityConfig {
        home_loc: vec![[0.0, 0.0]; n],
        people_age: vec![0; n],
        people_household: households,
        site_loc: Vec::new(),
        site_type: Vec::new(),
        mob_rate_per_age_per_type: vec![vec![0.0; 5]],
        dur_mean_per_type: vec![1.0; 5],
        variety_per_type: vec![1; 5],
        seed: 0,
        downsample: 1,
        num_people_unscaled: None,
        region_population: None,
    }
}

/// `n` people in separate households who all work at the same office.
fn office_workers(n: usize) -> MobilityConfig {
    MobilityConfig {
        home_loc: (0..n).map(|i| [i as f64, 0.0]).collect(),
        people_age: vec![0; n],
        people_household: (0..n).collect(),
        site_loc: vec![[0.0, 1.0]],
        site_type: vec![SiteType::Office],
        mob_rate_per_age_per_type: vec![vec![0.0, 0.0, 0.0, 6.0, 0.0]],
        dur_mean_per_type: vec![1.0, 1.0, 1.0, 3.0, 1.0],
        variety_per_type: vec![1; 5],
        seed: 11,
        downsample: 1,
        num_people_unscaled: None,
        region_population: None,
    }
}

fn setup(config: MobilityConfig, params: &str, dists: DiseaseDistributions) -> SimulationSetup {
    let params = SimulationParams::from_json_str(params).unwrap();
    let mobility = MobilitySimulator::new(config, params.max_time, ContactMode::Lazy).unwrap();
    SimulationSetup::new(Arc::new(mobility), params, dists).unwrap()
}

#[test]
fn single_exposed_individual() {
    let setup = setup(
        isolated_people(vec![0]),
        r#"{"max_time": 240.0, "betas": {}, "initial_seeds": {"expo": 1}}"#,
        DiseaseDistributions::constant(24.0, 24.0, 48.0, 1),
    );
    let summary = launch_parallel_rollouts(&setup, &CancellationToken::new()).unwrap();
    for rollout in 0..2 {
        let started = |state: DiseaseState| summary.state_started_at[state.index()][rollout][0];
        let ended = |state: DiseaseState| summary.state_ended_at[state.index()][rollout][0];
        assert_relative_eq!(started(DiseaseState::Susc), 0.0);
        assert_relative_eq!(ended(DiseaseState::Susc), 0.0);
        assert_relative_eq!(started(DiseaseState::Expo), 0.0);
        assert_relative_eq!(ended(DiseaseState::Expo), 24.0);
        assert_relative_eq!(started(DiseaseState::Ipre), 24.0);
        assert_relative_eq!(ended(DiseaseState::Ipre), 48.0);
        assert_relative_eq!(started(DiseaseState::Isym), 48.0);
        assert_relative_eq!(ended(DiseaseState::Isym), 96.0);
        assert_relative_eq!(started(DiseaseState::Resi), 96.0);
        assert!(ended(DiseaseState::Resi).is_infinite());
        assert!(started(DiseaseState::Dead).is_infinite());
        assert!(started(DiseaseState::Posi).is_infinite());
    }
}

#[test]
fn household_transmission() {
    let setup = setup(
        isolated_people(vec![0, 0]),
        r#"{"max_time": 240.0, "betas": {}, "beta_household": 1000.0,
            "initial_seeds": {"isym": 1}}"#,
        DiseaseDistributions::constant(24.0, 24.0, 48.0, 1),
    );
    let summary = launch_parallel_rollouts(&setup, &CancellationToken::new()).unwrap();
    for rollout in 0..2 {
        let (seed, _) = summary.seeds[rollout][0];
        let other = PersonId(1 - seed.0);
        let exposed_at = summary.state_started_at[DiseaseState::Expo.index()][rollout][other.0];
        assert!(exposed_at < 1.0, "exposed at {exposed_at}");
        assert_eq!(summary.infected_by[rollout][other.0], Some(seed));
        assert_eq!(summary.run_stats[rollout].exposures_by_household, 1);
    }
}

#[test]
fn staying_home_removes_every_exposure_attempt() {
    let setup = setup(
        office_workers(20),
        r#"{"max_time": 100.0, "betas": {"office": 1.0}, "initial_seeds": {"ipre": 5},
            "measures": [{"type": "SocialDistancingForAll", "t_window": [0.0, 100.0],
                          "p_stay_home": 1.0}]}"#,
        DiseaseDistributions::constant(24.0, 200.0, 48.0, 1),
    );
    let summary = launch_parallel_rollouts(&setup, &CancellationToken::new()).unwrap();
    for stats in &summary.run_stats {
        assert_eq!(stats.exposure_attempts, 0);
        assert_eq!(stats.exposures_by_contact, 0);
        assert!(stats.contacts_suppressed > 0);
    }
    for rollout in 0..summary.num_rollouts() {
        assert_eq!(summary.count_started_before(DiseaseState::Expo, rollout, 100.0, None), 0);
    }
}

#[test]
fn closing_one_site_type_only_affects_that_type() {
    let measures = |site_type: &str| {
        format!(
            r#"{{"max_time": 100.0, "betas": {{"office": 1.0}}, "initial_seeds": {{"ipre": 5}},
                "measures": [{{"type": "SocialDistancingBySiteTypeForAll",
                              "t_window": [0.0, 100.0], "p_stay_home": {{"{site_type}": 1.0}}}}]}}"#
        )
    };
    let dists = DiseaseDistributions::constant(24.0, 200.0, 48.0, 1);
    let closed = setup(office_workers(20), &measures("office"), dists.clone());
    let summary = launch_parallel_rollouts(&closed, &CancellationToken::new()).unwrap();
    for stats in &summary.run_stats {
        assert_eq!(stats.exposure_attempts, 0);
        assert!(stats.contacts_suppressed > 0);
    }

    let elsewhere = setup(office_workers(20), &measures("education"), dists);
    let summary = launch_parallel_rollouts(&elsewhere, &CancellationToken::new()).unwrap();
    for stats in &summary.run_stats {
        assert_eq!(stats.contacts_suppressed, 0);
        assert!(stats.exposure_attempts > 0);
    }
}

#[test]
fn without_measures_office_contacts_transmit() {
    let setup = setup(
        office_workers(20),
        r#"{"max_time": 100.0, "betas": {"office": 1.0}, "initial_seeds": {"ipre": 5}}"#,
        DiseaseDistributions::constant(24.0, 200.0, 48.0, 1),
    );
    let summary = launch_parallel_rollouts(&setup, &CancellationToken::new()).unwrap();
    for stats in &summary.run_stats {
        assert_eq!(stats.contacts_suppressed, 0);
        assert!(stats.exposure_attempts > 0);
        assert!(stats.exposure_attempts <= stats.contacts_considered);
    }
}

#[test]
fn too_few_rollouts_fail() {
    let params = r#"{"max_time": 48.0, "betas": {}, "random_repeats": 1}"#;
    let dists = DiseaseDistributions::constant(24.0, 24.0, 48.0, 1);
    let single = setup(isolated_people(vec![0, 1]), params, dists.clone());
    assert!(matches!(
        launch_parallel_rollouts(&single, &CancellationToken::new()),
        Err(SimError::InsufficientRolloutsError { .. })
    ));

    let params = r#"{"max_time": 48.0, "betas": {}, "random_repeats": 2}"#;
    let pair = setup(isolated_people(vec![0, 1]), params, dists);
    let summary = launch_parallel_rollouts(&pair, &CancellationToken::new()).unwrap();
    assert_eq!(summary.num_rollouts(), 2);
    for state in 0..summary.state_started_at.len() {
        assert_eq!(summary.state_started_at[state].len(), 2);
        assert_eq!(summary.state_started_at[state][0].len(), 2);
    }
}

#[test]
fn testing_capacity_holds_in_every_day() {
    let k = 3;
    let setup = setup(
        isolated_people((0..30).collect()),
        &format!(
            r#"{{"max_time": 240.0, "betas": {{}}, "initial_seeds": {{"isym": 30}},
                "testing": {{"tests_per_batch": 100, "testing_frequency": 6.0}},
                "measures": [{{"type": "TestingCapacity", "t_window": [0.0, 240.0],
                               "tests_per_day": {k}}}]}}"#
        ),
        DiseaseDistributions::constant(24.0, 24.0, 48.0, 1),
    );
    let record = Rollout::new(&setup, 0).run(&CancellationToken::new()).unwrap();
    let times: Vec<f64> = record.test_log.iter().map(|test| test.administered_at).collect();
    assert!(!times.is_empty());
    for a in &times {
        let in_window = times.iter().filter(|t| **t >= *a && **t < a + 24.0).count();
        assert!(in_window <= k, "{in_window} tests in [{a}, {a} + 24)");
    }
    // The budget is the only limit, so it is used every day.
    assert_eq!(record.test_log.len(), 10 * k);
}

#[test]
fn positive_results_count_from_the_day_they_arrive() {
    let setup = setup(
        isolated_people(vec![0]),
        r#"{"max_time": 100.0, "betas": {}, "initial_seeds": {"isym": 1},
            "testing": {"tests_per_batch": 10}}"#,
        DiseaseDistributions::constant(24.0, 24.0, 200.0, 1),
    );
    let summary = launch_parallel_rollouts(&setup, &CancellationToken::new()).unwrap();
    for rollout in 0..summary.num_rollouts() {
        // Tested at 0, reported after the default two-day lag.
        let posi = summary.state_started_at[DiseaseState::Posi.index()][rollout][0];
        assert_relative_eq!(posi, 48.0);
        assert_eq!(summary.count_started_before(DiseaseState::Posi, rollout, 48.0, None), 0);
        assert_eq!(
            summary.daily_cumulative(DiseaseState::Posi, rollout, None),
            vec![0, 0, 1, 1]
        );
        assert_eq!(
            summary.daily_cumulative(DiseaseState::Posi, rollout, Some(0)),
            vec![0, 0, 1, 1]
        );
    }
}

#[test]
fn failing_rollout_is_reported() {
    // A negative constant delay cannot be sampled.
    let dists = DiseaseDistributions::constant(-1.0, 24.0, 48.0, 1);
    let params = SimulationParams::from_json_str(
        r#"{"max_time": 48.0, "betas": {}, "initial_seeds": {"expo": 1}}"#,
    )
    .unwrap();
    let mobility =
        MobilitySimulator::new(isolated_people(vec![0]), 48.0, ContactMode::Lazy).unwrap();
    let setup = match SimulationSetup::new(Arc::new(mobility), params, dists) {
        Ok(setup) => setup,
        // Rejected up front is fine too.
        Err(err) => {
            assert!(matches!(err, SimError::ConfigError(_)));
            return;
        }
    };
    let err = launch_parallel_rollouts(&setup, &CancellationToken::new()).unwrap_err();
    match err {
        SimError::RolloutError { source, .. } => {
            assert!(matches!(*source, SimError::InvalidDistributionSample { .. }));
        }
        other => panic!("unexpected error {other}"),
    }
}

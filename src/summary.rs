//! The merged result of an orchestration run.

use serde_derive::{Deserialize, Serialize};
use strum::{EnumCount, IntoEnumIterator};

use crate::disease::DiseaseState;
use crate::error::SimError;
use crate::mobility::PersonId;
use crate::params::{SeedState, SimulationSetup};
use crate::rollout::{RolloutRecord, RolloutStats, TracingStats};
use crate::TO_HOURS;

/// State timings of every person in every rollout, plus the per-rollout statistics.
///
/// Rollouts are stored in index order whatever order they finished in. Times are hours;
/// a state that never started or never ended is `f64::INFINITY`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub max_time: f64,
    pub num_people: usize,
    /// `[state][rollout][person]`, states in `DiseaseState` order.
    pub state_started_at: Vec<Vec<Vec<f64>>>,
    pub state_ended_at: Vec<Vec<Vec<f64>>>,
    pub people_age: Vec<usize>,
    pub people_household: Vec<usize>,
    /// `[rollout][person]`
    pub infected_by: Vec<Vec<Option<PersonId>>>,
    pub seeds: Vec<Vec<(PersonId, SeedState)>>,
    pub tracing_stats: Vec<TracingStats>,
    /// The thresholds behind each rollout's `TracingStats::roc` entries.
    pub thresholds_roc: Vec<f64>,
    pub tests_administered: Vec<usize>,
    pub run_stats: Vec<RolloutStats>,
}

impl Summary {
    /// Merges finished rollouts. The result does not depend on the order of `records`.
    ///
    /// # Errors
    ///
    /// Returns `SimError::InsufficientRolloutsError` for fewer than two records, and
    /// `SimError::ConfigError` if a record does not match the population of `setup`.
    pub fn from_records(
        setup: &SimulationSetup,
        mut records: Vec<RolloutRecord>,
    ) -> Result<Summary, SimError> {
        if records.len() < 2 {
            return Err(SimError::InsufficientRolloutsError {
                completed: records.len(),
            });
        }
        records.sort_by_key(|record| record.rollout);
        let population = setup.mobility.population();
        let num_people = population.len();
        if let Some(record) = records.iter().find(|r| r.health.len() != num_people) {
            return Err(format!(
                "rollout {} has {} people, the population has {num_people}",
                record.rollout,
                record.health.len()
            )
            .into());
        }

        let per_state: Vec<Vec<Vec<f64>>> =
            vec![Vec::with_capacity(records.len()); DiseaseState::COUNT];
        let mut state_started_at = per_state.clone();
        let mut state_ended_at = per_state;
        for state in DiseaseState::iter() {
            for record in &records {
                state_started_at[state.index()]
                    .push(record.health.iter().map(|h| h.started_at(state)).collect());
                state_ended_at[state.index()]
                    .push(record.health.iter().map(|h| h.ended_at(state)).collect());
            }
        }

        Ok(Summary {
            max_time: setup.params.max_time,
            num_people,
            state_started_at,
            state_ended_at,
            people_age: population.ages().collect(),
            people_household: population.iter().map(|p| p.household.0).collect(),
            tests_administered: records.iter().map(|r| r.test_log.len()).collect(),
            tracing_stats: records.iter().map(|r| r.tracing_stats.clone()).collect(),
            thresholds_roc: setup.params.testing.thresholds_roc.clone(),
            run_stats: records.iter().map(|r| r.stats.clone()).collect(),
            seeds: records.iter().map(|r| r.seeds.clone()).collect(),
            infected_by: records.into_iter().map(|r| r.infected_by).collect(),
        })
    }

    #[must_use]
    pub fn num_rollouts(&self) -> usize {
        self.run_stats.len()
    }

    /// How many people of rollout `rollout` entered `state` strictly before `t`, optionally
    /// restricted to one age group.
    #[must_use]
    pub fn count_started_before(
        &self,
        state: DiseaseState,
        rollout: usize,
        t: f64,
        age_group: Option<usize>,
    ) -> usize {
        self.state_started_at[state.index()][rollout]
            .iter()
            .zip(&self.people_age)
            .filter(|(started, age)| {
                **started < t && age_group.is_none_or(|group| group == **age)
            })
            .count()
    }

    /// Cumulative counts of `state` for each whole day of the horizon. Day `d` counts the
    /// people who entered `state` before hour `24 * (d + 1)`; a trailing partial day is
    /// left out.
    #[must_use]
    pub fn daily_cumulative(
        &self,
        state: DiseaseState,
        rollout: usize,
        age_group: Option<usize>,
    ) -> Vec<usize> {
        let days = (self.max_time / TO_HOURS).floor() as usize;
        (1..=days)
            .map(|day| {
                self.count_started_before(state, rollout, day as f64 * TO_HOURS, age_group)
            })
            .collect()
    }

    /// # Errors
    ///
    /// Returns `SimError::EncodeError` if the summary cannot be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SimError> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::standard())?)
    }

    /// # Errors
    ///
    /// Returns `SimError::DecodeError` if `bytes` is not an encoded summary.
    pub fn from_bytes(bytes: &[u8]) -> Result<Summary, SimError> {
        let (summary, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::disease::DiseaseDistributions;
    use crate::mobility::{ContactMode, MobilityConfig, MobilitySimulator};
    use crate::orchestrator::CancellationToken;
    use crate::params::SimulationParams;
    use crate::rollout::Rollout;

    fn setup() -> SimulationSetup {
        let config = MobilityConfig {
            home_loc: vec![[0.0, 0.0]; 3],
            people_age: vec![0, 1, 1],
            people_household: vec![0, 1, 2],
            site_loc: Vec::new(),
            site_type: Vec::new(),
            mob_rate_per_age_per_type: vec![vec![0.0; 5], vec![0.0; 5]],
            dur_mean_per_type: vec![1.0; 5],
            variety_per_type: vec![1; 5],
            seed: 0,
            downsample: 1,
            num_people_unscaled: None,
            region_population: None,
        };
        let mobility = MobilitySimulator::new(config, 96.0, ContactMode::Lazy).unwrap();
        let params = SimulationParams::from_json_str(
            r#"{"max_time": 96.0, "betas": {}, "initial_seeds": {"expo": 2}}"#,
        )
        .unwrap();
        SimulationSetup::new(
            Arc::new(mobility),
            params,
            DiseaseDistributions::constant(24.0, 24.0, 24.0, 2),
        )
        .unwrap()
    }

    fn records(setup: &SimulationSetup) -> Vec<RolloutRecord> {
        (0..3)
            .map(|k| Rollout::new(setup, k).run(&CancellationToken::new()).unwrap())
            .collect()
    }

    #[test]
    fn merge_is_order_independent() {
        let setup = setup();
        let mut shuffled = records(&setup);
        shuffled.swap(0, 2);
        let a = Summary::from_records(&setup, records(&setup)).unwrap();
        let b = Summary::from_records(&setup, shuffled).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.num_rollouts(), 3);
        assert_eq!(a.state_started_at.len(), DiseaseState::COUNT);
        assert_eq!(a.state_started_at[0][0].len(), 3);
    }

    #[test]
    fn counts_by_day_and_age() {
        let setup = setup();
        let summary = Summary::from_records(&setup, records(&setup)).unwrap();
        // Two people exposed at 0, infectious at 24.
        assert_eq!(summary.count_started_before(DiseaseState::Expo, 0, 0.0, None), 0);
        assert_eq!(summary.count_started_before(DiseaseState::Expo, 0, 1.0, None), 2);
        assert_eq!(summary.count_started_before(DiseaseState::Ipre, 0, 24.0, None), 0);
        assert_eq!(summary.count_started_before(DiseaseState::Ipre, 0, 24.5, None), 2);
        // Entering at hour 24 belongs to the second day.
        assert_eq!(summary.daily_cumulative(DiseaseState::Ipre, 1, None), vec![0, 2, 2, 2]);
        let by_age: usize = (0..2)
            .map(|age| summary.count_started_before(DiseaseState::Expo, 2, 1.0, Some(age)))
            .sum();
        assert_eq!(by_age, 2);
    }

    #[test]
    fn partial_last_day_is_dropped() {
        let setup = setup();
        let mut summary = Summary::from_records(&setup, records(&setup)).unwrap();
        summary.max_time = 100.0;
        assert_eq!(summary.daily_cumulative(DiseaseState::Expo, 0, None), vec![2, 2, 2, 2]);
        summary.max_time = 23.0;
        assert!(summary.daily_cumulative(DiseaseState::Expo, 0, None).is_empty());
    }

    #[test]
    fn bytes_round_trip() {
        let setup = setup();
        let summary = Summary::from_records(&setup, records(&setup)).unwrap();
        let restored = Summary::from_bytes(&summary.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, summary);
    }

    #[test]
    fn one_record_is_not_enough() {
        let setup = setup();
        let mut records = records(&setup);
        records.truncate(1);
        assert!(matches!(
            Summary::from_records(&setup, records),
            Err(SimError::InsufficientRolloutsError { completed: 1 })
        ));
    }
}

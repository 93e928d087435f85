//! A single stochastic replica of the epidemic.
//!
//! A `Rollout` owns everything that changes during a run: its event queue, the health record
//! and course of disease of every person, the measure state, the test queue and its random
//! streams, all seeded from the rollout seed. Everything it reads from the
//! `SimulationSetup` is shared with the other rollouts and never mutated.
//!
//! The event loop is single-threaded. Events are processed in `(time, insertion)` order, so a
//! rollout replays exactly for a fixed seed.

pub mod exposure;
mod record;
mod testing;
mod tracing;

pub use exposure::ExposureSource;
pub use record::{
    ActionStats, RocCounts, RolloutRecord, RolloutStats, TestRecord, TracingStats,
};

use log::{debug, trace};
use strum::IntoEnumIterator;

use crate::define_rng;
use crate::disease::{DiseaseState, HealthRecord, ProgressionPlan};
use crate::error::SimError;
use crate::measures::{MeasureState, TracingAction};
use crate::mobility::PersonId;
use crate::orchestrator::CancellationToken;
use crate::params::{SeedState, SimulationSetup};
use crate::plan::Queue;
use crate::random::RandomStreams;
use testing::TestQueue;

define_rng!(SeedingRng);

/// How many events are processed between two looks at the cancellation token.
const CANCELLATION_POLL_INTERVAL: usize = 1024;

/// The kinds of things that can happen in a rollout.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// `person` may become exposed. Re-checked against the current state when it fires.
    Exposure {
        person: PersonId,
        infector: Option<PersonId>,
        source: ExposureSource,
    },
    /// Move along the course of disease.
    Transition {
        person: PersonId,
        from: DiseaseState,
        to: DiseaseState,
    },
    Hospitalization {
        person: PersonId,
    },
    /// Exposure attempts of `infector` over the next day of contacts from `from`.
    ContactBatch { infector: PersonId, from: f64 },
    /// A batch of queued tests is administered.
    TestAdministration,
    TestResult {
        person: PersonId,
        positive: bool,
        from_tracing: bool,
    },
    TracingAction {
        person: PersonId,
        action: TracingAction,
        index: PersonId,
        risk: f64,
    },
}

pub struct Rollout<'a> {
    setup: &'a SimulationSetup,
    index: usize,
    seed: u64,
    now: f64,
    queue: Queue<Event>,
    streams: RandomStreams,
    health: Vec<HealthRecord>,
    plans: Vec<Option<ProgressionPlan>>,
    infected_by: Vec<Option<PersonId>>,
    isolated_until: Vec<f64>,
    measure_state: MeasureState,
    tests: TestQueue,
    test_log: Vec<record::TestRecord>,
    seeds: Vec<(PersonId, SeedState)>,
    tracing_stats: TracingStats,
    stats: RolloutStats,
}

impl<'a> Rollout<'a> {
    /// Rollout `index` of an orchestration run, seeded `base_seed + index`.
    #[must_use]
    pub fn new(setup: &'a SimulationSetup, index: usize) -> Rollout<'a> {
        let seed = setup.params.base_seed.wrapping_add(index as u64);
        Rollout::with_seed(setup, index, seed)
    }

    #[must_use]
    pub fn with_seed(setup: &'a SimulationSetup, index: usize, seed: u64) -> Rollout<'a> {
        let num_people = setup.mobility.population().len();
        Rollout {
            setup,
            index,
            seed,
            now: 0.0,
            queue: Queue::new(),
            streams: RandomStreams::new(seed),
            health: vec![HealthRecord::new(); num_people],
            plans: vec![None; num_people],
            infected_by: vec![None; num_people],
            isolated_until: vec![f64::NEG_INFINITY; num_people],
            measure_state: MeasureState::new(),
            tests: TestQueue::default(),
            test_log: Vec::new(),
            seeds: Vec::new(),
            tracing_stats: TracingStats::with_roc_thresholds(
                setup.params.testing.thresholds_roc.len(),
            ),
            stats: RolloutStats::default(),
        }
    }

    /// Runs the event loop to the horizon and returns what happened.
    ///
    /// # Errors
    ///
    /// Returns the first sampling or scheduling error, or `SimError::Cancelled` if `cancel`
    /// fires before the horizon is reached.
    pub fn run(mut self, cancel: &CancellationToken) -> Result<RolloutRecord, SimError> {
        debug!("rollout {} starting with seed {}", self.index, self.seed);
        self.initialize()?;
        let max_time = self.setup.params.max_time;
        while let Some(time) = self.queue.peek_time() {
            if time > max_time {
                break;
            }
            let poll = self.stats.events_processed % CANCELLATION_POLL_INTERVAL == 0;
            if poll && cancel.is_cancelled() {
                debug!("rollout {} cancelled at t={}", self.index, self.now);
                return Err(SimError::Cancelled);
            }
            let plan = self.queue.pop_min()?;
            self.now = plan.time;
            self.stats.events_processed += 1;
            trace!("rollout {} t={:.3} {:?}", self.index, self.now, plan.data);
            self.handle(plan.data)?;
        }
        debug!(
            "rollout {} finished after {} events ({} exposures, {} tests)",
            self.index,
            self.stats.events_processed,
            self.stats.exposures_by_contact
                + self.stats.exposures_by_household
                + self.stats.exposures_by_background,
            self.test_log.len()
        );
        Ok(RolloutRecord {
            rollout: self.index,
            seed: self.seed,
            health: self.health,
            infected_by: self.infected_by,
            seeds: self.seeds,
            test_log: self.test_log,
            tracing_stats: self.tracing_stats,
            stats: self.stats,
        })
    }

    fn initialize(&mut self) -> Result<(), SimError> {
        self.apply_seeds()?;
        self.schedule_background_exposures()?;
        let testing = &self.setup.params.testing;
        if testing.testing_enabled() {
            let window = testing.testing_t_window;
            let first = window.start.max(0.0);
            if window.contains(first) {
                self.schedule(first, Event::TestAdministration)?;
            }
        }
        Ok(())
    }

    /// Places the configured number of people in each seed state, chosen uniformly without
    /// replacement.
    fn apply_seeds(&mut self) -> Result<(), SimError> {
        let setup = self.setup;
        let num_people = setup.mobility.population().len();
        let total = setup.params.total_seeds();
        if total > num_people {
            return Err(format!(
                "{total} initial seeds requested for a population of {num_people}"
            )
            .into());
        }
        let chosen = self.streams.sample(SeedingRng, |rng| {
            rand::seq::index::sample(rng, num_people, total).into_vec()
        });
        let mut chosen = chosen.into_iter();
        for seed_state in SeedState::iter() {
            let count = setup.params.initial_seeds.get(&seed_state).copied().unwrap_or(0);
            for person in chosen.by_ref().take(count) {
                self.seed_person(PersonId(person), seed_state)?;
            }
        }
        Ok(())
    }

    fn seed_person(&mut self, person: PersonId, seed_state: SeedState) -> Result<(), SimError> {
        self.seeds.push((person, seed_state));
        let (state, positive) = match seed_state {
            SeedState::Expo => (DiseaseState::Expo, false),
            SeedState::Ipre => (DiseaseState::Ipre, false),
            SeedState::Isym => (DiseaseState::Isym, false),
            SeedState::IsymPosi => (DiseaseState::Isym, true),
            SeedState::Iasy => (DiseaseState::Iasy, false),
            SeedState::ResiPosi => (DiseaseState::Resi, true),
            SeedState::ResiNotposi => (DiseaseState::Resi, false),
        };
        self.health[person.0].move_to(state, 0.0);
        if positive {
            self.health[person.0].start_side(DiseaseState::Posi, 0.0);
        }
        if state.is_terminal() {
            return Ok(());
        }
        self.start_course_of_disease(person, state)
    }

    /// Samples the course of disease of `person`, who just entered `state`.
    fn start_course_of_disease(
        &mut self,
        person: PersonId,
        state: DiseaseState,
    ) -> Result<(), SimError> {
        let setup = self.setup;
        let age_group = setup.mobility.population().get(person).age_group;
        let dists = &setup.distributions;
        let plan = ProgressionPlan::sample(state, self.now, age_group, dists, &self.streams)?;
        self.plans[person.0] = Some(plan);
        self.after_entering(person, state)
    }

    /// Schedules whatever follows `person` entering the primary state `state`.
    fn after_entering(&mut self, person: PersonId, state: DiseaseState) -> Result<(), SimError> {
        let Some(plan) = self.plans[person.0].as_ref() else {
            return Ok(());
        };
        let next = plan.next_after(state);
        let hospitalized_at = plan.hospitalized_at();
        let starts_transmitting =
            state.is_infectious() && (state == DiseaseState::Ipre || state == plan.start_state());

        if starts_transmitting {
            self.begin_infectious_period(person)?;
        }
        if state == DiseaseState::Isym {
            if let Some(admitted) = hospitalized_at {
                self.schedule(admitted, Event::Hospitalization { person })?;
            }
            self.request_test(person, true, 0.0, false);
        }
        if let Some((time, to)) = next {
            self.schedule(time, Event::Transition { person, from: state, to })?;
        }
        Ok(())
    }

    /// Adds an event to the queue. Events past the horizon are dropped since they would
    /// never be processed.
    fn schedule(&mut self, time: f64, event: Event) -> Result<(), SimError> {
        if time.is_nan() || time < self.now {
            return Err(SimError::InvalidPlanTime {
                time,
                current_time: self.now,
            });
        }
        if time > self.setup.params.max_time {
            return Ok(());
        }
        self.queue.push(time, event);
        Ok(())
    }

    fn handle(&mut self, event: Event) -> Result<(), SimError> {
        match event {
            Event::Exposure {
                person,
                infector,
                source,
            } => self.handle_exposure(person, infector, source),
            Event::Transition { person, from, to } => self.handle_transition(person, from, to),
            Event::Hospitalization { person } => {
                if self.health[person.0].primary() == DiseaseState::Isym {
                    self.health[person.0].start_side(DiseaseState::Hosp, self.now);
                }
                Ok(())
            }
            Event::ContactBatch { infector, from } => self.handle_contact_batch(infector, from),
            Event::TestAdministration => self.handle_test_administration(),
            Event::TestResult {
                person,
                positive,
                from_tracing,
            } => self.handle_test_result(person, positive, from_tracing),
            Event::TracingAction {
                person,
                action,
                index,
                risk,
            } => {
                self.handle_tracing_action(person, action, index, risk);
                Ok(())
            }
        }
    }

    fn handle_transition(
        &mut self,
        person: PersonId,
        from: DiseaseState,
        to: DiseaseState,
    ) -> Result<(), SimError> {
        let current = self.health[person.0].primary();
        if current.is_terminal() || current != from {
            return Err(SimError::InvalidTransitionError {
                person,
                current,
                from,
                to,
                time: self.now,
            });
        }
        self.health[person.0].move_to(to, self.now);
        self.after_entering(person, to)
    }

    /// Marks `person` as exposed now and samples the course of disease.
    fn infect(&mut self, person: PersonId, infector: Option<PersonId>) -> Result<(), SimError> {
        self.health[person.0].move_to(DiseaseState::Expo, self.now);
        self.infected_by[person.0] = infector;
        self.start_course_of_disease(person, DiseaseState::Expo)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::disease::DiseaseDistributions;
    use crate::mobility::{ContactMode, MobilityConfig, MobilitySimulator};
    use crate::params::SimulationParams;

    fn lonely_setup(people: usize, households: Vec<usize>) -> SimulationSetup {
        let config = MobilityConfig {
            home_loc: vec![[0.0, 0.0]; people],
            people_age: vec![0; people],
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
        };
        let mobility = MobilitySimulator::new(config, 240.0, ContactMode::Lazy).unwrap();
        let params = SimulationParams::from_json_str(
            r#"{"max_time": 240.0, "betas": {}, "initial_seeds": {"expo": 1}}"#,
        )
        .unwrap();
        SimulationSetup::new(
            Arc::new(mobility),
            params,
            DiseaseDistributions::constant(24.0, 24.0, 48.0, 1),
        )
        .unwrap()
    }

    #[test]
    fn seeded_person_runs_through_the_course_of_disease() {
        let setup = lonely_setup(1, vec![0]);
        let record = Rollout::new(&setup, 0).run(&CancellationToken::new()).unwrap();
        let health = &record.health[0];
        assert_eq!(health.started_at(DiseaseState::Susc), 0.0);
        assert_eq!(health.ended_at(DiseaseState::Susc), 0.0);
        assert_eq!(health.started_at(DiseaseState::Ipre), 24.0);
        assert_eq!(health.started_at(DiseaseState::Isym), 48.0);
        assert_eq!(health.started_at(DiseaseState::Resi), 96.0);
        assert_eq!(health.primary(), DiseaseState::Resi);
        assert_eq!(record.seeds, vec![(PersonId(0), SeedState::Expo)]);
    }

    #[test]
    fn past_and_nan_plans_are_rejected() {
        let setup = lonely_setup(1, vec![0]);
        let mut rollout = Rollout::new(&setup, 0);
        rollout.now = 10.0;
        assert!(matches!(
            rollout.schedule(5.0, Event::TestAdministration),
            Err(SimError::InvalidPlanTime { .. })
        ));
        assert!(rollout.schedule(f64::NAN, Event::TestAdministration).is_err());
        // Past the horizon: silently dropped.
        assert!(rollout.schedule(1000.0, Event::TestAdministration).is_ok());
        assert!(rollout.queue.is_empty());
    }

    #[test]
    fn transition_from_terminal_state_fails() {
        let setup = lonely_setup(1, vec![0]);
        let mut rollout = Rollout::new(&setup, 0);
        rollout.health[0].move_to(DiseaseState::Dead, 0.0);
        let result = rollout.handle_transition(PersonId(0), DiseaseState::Dead, DiseaseState::Resi);
        assert!(matches!(result, Err(SimError::InvalidTransitionError { .. })));
        let result = rollout.handle_transition(PersonId(0), DiseaseState::Expo, DiseaseState::Ipre);
        assert!(matches!(result, Err(SimError::InvalidTransitionError { .. })));
    }

    #[test]
    fn cancelled_rollout_stops() {
        let setup = lonely_setup(1, vec![0]);
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            Rollout::new(&setup, 0).run(&token),
            Err(SimError::Cancelled)
        ));
    }
}

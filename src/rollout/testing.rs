use log::trace;

use crate::define_rng;
use crate::disease::DiseaseState;
use crate::error::SimError;
use crate::hashing::{HashMap, HashSet};
use crate::mobility::PersonId;
use crate::params::TestQueuePolicy;
use crate::rollout::record::TestRecord;
use crate::rollout::{Event, Rollout};

define_rng!(TestingRng);

#[derive(Clone, Debug, PartialEq)]
pub(super) struct TestRequest {
    pub(super) person: PersonId,
    pub(super) symptomatic: bool,
    pub(super) risk: f64,
    pub(super) from_tracing: bool,
    seq: usize,
}

/// Pending test requests, at most one per person, plus the people whose administered test
/// has not been reported yet.
#[derive(Debug, Default)]
pub(super) struct TestQueue {
    requests: Vec<TestRequest>,
    /// Position of each person's request in `requests`.
    position: HashMap<PersonId, usize>,
    awaiting_result: HashSet<PersonId>,
    next_seq: usize,
}

impl TestQueue {
    /// Adds a request. A person already waiting keeps their place in the queue; the
    /// request is merged into the pending one. People with a test on its way are not
    /// queued again.
    pub(super) fn push(
        &mut self,
        person: PersonId,
        symptomatic: bool,
        risk: f64,
        from_tracing: bool,
    ) {
        if self.awaiting_result.contains(&person) {
            return;
        }
        if let Some(&i) = self.position.get(&person) {
            let pending = &mut self.requests[i];
            pending.symptomatic |= symptomatic;
            pending.risk = pending.risk.max(risk);
            pending.from_tracing &= from_tracing;
            return;
        }
        self.position.insert(person, self.requests.len());
        self.requests.push(TestRequest {
            person,
            symptomatic,
            risk,
            from_tracing,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    pub(super) fn len(&self) -> usize {
        self.requests.len()
    }

    /// Removes every pending request, in the order they are to be served.
    pub(super) fn take_ordered(&mut self, policy: TestQueuePolicy) -> Vec<TestRequest> {
        self.position.clear();
        let mut requests = std::mem::take(&mut self.requests);
        match policy {
            TestQueuePolicy::Fifo => requests.sort_by_key(|r| r.seq),
            TestQueuePolicy::ExposureRisk => requests.sort_by(|a, b| {
                b.symptomatic
                    .cmp(&a.symptomatic)
                    .then(b.risk.total_cmp(&a.risk))
                    .then(a.seq.cmp(&b.seq))
            }),
        }
        requests
    }

    /// Puts back requests that could not be served.
    pub(super) fn restore(&mut self, unserved: Vec<TestRequest>) {
        for request in unserved {
            self.push(
                request.person,
                request.symptomatic,
                request.risk,
                request.from_tracing,
            );
            if let Some(&i) = self.position.get(&request.person) {
                let merged = &mut self.requests[i];
                merged.seq = merged.seq.min(request.seq);
            }
        }
    }

    fn administered(&mut self, person: PersonId) {
        self.awaiting_result.insert(person);
    }

    fn reported(&mut self, person: PersonId) {
        self.awaiting_result.remove(&person);
    }
}

impl Rollout<'_> {
    /// Queues a test for `person` if testing is running now.
    pub(super) fn request_test(
        &mut self,
        person: PersonId,
        symptomatic: bool,
        risk: f64,
        from_tracing: bool,
    ) {
        let testing = &self.setup.params.testing;
        if !testing.testing_enabled() || !testing.testing_t_window.contains(self.now) {
            return;
        }
        self.tests.push(person, symptomatic, risk, from_tracing);
    }

    pub(super) fn handle_test_administration(&mut self) -> Result<(), SimError> {
        let setup = self.setup;
        let testing = &setup.params.testing;
        let now = self.now;
        let capacity = setup.measures.testing_capacity(now);

        let mut unserved = Vec::new();
        let mut administered = 0;
        for request in self.tests.take_ordered(testing.test_queue_policy) {
            let health = &self.health[request.person.0];
            if health.primary() == DiseaseState::Dead || health.has_started(DiseaseState::Posi) {
                continue;
            }
            if administered >= testing.tests_per_batch {
                unserved.push(request);
                continue;
            }
            if let Some((measure, per_day)) = capacity {
                if !self.measure_state.budget(measure, None, per_day).try_consume(now) {
                    unserved.push(request);
                    continue;
                }
            }
            administered += 1;
            self.administer(request.person, request.from_tracing)?;
        }
        self.tests.restore(unserved);
        trace!(
            "t={now:.1}: administered {administered} tests, {} still queued",
            self.tests.len()
        );

        let next = now + testing.testing_frequency;
        if testing.testing_t_window.contains(next) {
            self.schedule(next, Event::TestAdministration)?;
        }
        Ok(())
    }

    /// The outcome is fixed now and reported after the reporting lag.
    fn administer(&mut self, person: PersonId, from_tracing: bool) -> Result<(), SimError> {
        let testing = &self.setup.params.testing;
        let infected = self.health[person.0].primary().is_infected();
        let p_positive = if infected {
            1.0 - testing.test_fnr
        } else {
            testing.test_fpr
        };
        let positive = self.streams.sample_bool(TestingRng, p_positive);
        self.tests.administered(person);
        let reported_at = self.now + testing.test_reporting_lag;
        self.test_log.push(TestRecord {
            person,
            administered_at: self.now,
            reported_at,
            positive,
            from_tracing,
        });
        self.schedule(
            reported_at,
            Event::TestResult {
                person,
                positive,
                from_tracing,
            },
        )
    }

    pub(super) fn handle_test_result(
        &mut self,
        person: PersonId,
        positive: bool,
        from_tracing: bool,
    ) -> Result<(), SimError> {
        let now = self.now;
        self.tests.reported(person);
        let health = &mut self.health[person.0];
        if !positive {
            if !health.has_started(DiseaseState::Posi) {
                health.start_side(DiseaseState::Nega, now);
            }
            return Ok(());
        }
        if health.has_started(DiseaseState::Posi) {
            return Ok(());
        }
        health.end_side(DiseaseState::Nega, now);
        health.start_side(DiseaseState::Posi, now);

        let testing = &self.setup.params.testing;
        let triggers = !from_tracing || testing.trigger_tracing_after_posi_trace_test;
        if testing.tracing_enabled() && triggers {
            self.trace_contacts(person)?;
        }
        Ok(())
    }
}

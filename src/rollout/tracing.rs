//! Contact tracing triggered by positive test results.

use std::collections::BTreeMap;

use log::trace;

use crate::define_rng;
use crate::disease::DiseaseState;
use crate::error::SimError;
use crate::measures::{Interval, MeasureId, TracingAction, TracingRule, TransitionModifier};
use crate::mobility::{PersonId, SiteType};
use crate::rollout::{Event, Rollout};

define_rng!(TracingRng);

/// A traced contact of an index case.
#[derive(Copy, Clone, Debug, PartialEq)]
struct Candidate {
    /// Summed probability of infection over the traced contacts.
    risk: f64,
    category: SiteType,
    /// Risk of the riskiest single contact, which determines `category`.
    riskiest: f64,
    /// Hours until the candidate is reached.
    delay: f64,
}

impl Rollout<'_> {
    /// Finds the contacts of the newly positive `index` and schedules the tracing actions
    /// selected by the active policies.
    pub(super) fn trace_contacts(&mut self, index: PersonId) -> Result<(), SimError> {
        let candidates = self.tracing_candidates(index);
        let setup = self.setup;
        let now = self.now;
        trace!("t={now:.1}: tracing {} candidates of {index:?}", candidates.len());

        let thresholds = &setup.params.testing.thresholds_roc;
        if !thresholds.is_empty() && setup.params.tracing_stats_window().contains(now) {
            for (person, candidate) in &candidates {
                let infected_by_index = self.infected_by[person.0] == Some(index);
                self.tracing_stats
                    .record_roc(thresholds, candidate.risk, infected_by_index);
            }
        }

        for &action in &setup.params.testing.smart_tracing_actions {
            let (measure, rule) = match setup.measures.tracing_policy(action, now) {
                Some((measure, rule)) => (Some(measure), rule),
                None => (None, TracingRule::Basic),
            };
            for (person, candidate) in self.select_candidates(&candidates, measure, &rule) {
                self.schedule(
                    now + candidate.delay,
                    Event::TracingAction {
                        person,
                        action,
                        index,
                        risk: candidate.risk,
                    },
                )?;
            }
        }
        Ok(())
    }

    fn tracing_candidates(&mut self, index: PersonId) -> BTreeMap<PersonId, Candidate> {
        let setup = self.setup;
        let now = self.now;
        let population = setup.mobility.population();
        let mut candidates = BTreeMap::new();

        let household = population.household_members(population.get(index).household);
        for member in household {
            if *member != index {
                candidates.insert(
                    *member,
                    Candidate {
                        risk: 1.0,
                        category: SiteType::Household,
                        riskiest: 1.0,
                        delay: 0.0,
                    },
                );
            }
        }

        let window = Interval::new(now - setup.params.testing.smart_tracing_contact_delta, now);
        let measures = &setup.measures;
        let compliance = measures.first_transition_modifier(now, |modifier| match modifier {
            TransitionModifier::Compliance { p_compliance } => Some(p_compliance),
            _ => None,
        });
        let manual = measures.first_transition_modifier(now, |modifier| match modifier {
            TransitionModifier::ManualTracing {
                p_participate,
                p_recall,
                delta_manual_tracing,
            } => Some((p_participate, p_recall, delta_manual_tracing)),
            _ => None,
        });
        let reachability = measures.first_transition_modifier(now, |modifier| match modifier {
            TransitionModifier::ManualReachability { p_reachable } => Some(p_reachable),
            _ => None,
        });

        for contact in setup.mobility.contacts_of_during(index, window) {
            let other = contact.other;
            if household.contains(&other) {
                continue;
            }
            let digital = match compliance {
                Some((measure, p)) => {
                    self.measure_state.person_bernoulli(&self.streams, measure, index, p)
                        && self.measure_state.person_bernoulli(&self.streams, measure, other, p)
                }
                // Without an adoption measure everyone runs the app.
                None => true,
            };
            let manual_delay = match manual {
                Some((measure, (p_participate, p_recall, delta))) if !digital => {
                    let participates = self
                        .measure_state
                        .person_bernoulli(&self.streams, measure, index, p_participate);
                    let recalled = participates && self.streams.sample_bool(TracingRng, p_recall);
                    let reachable = recalled
                        && reachability.is_none_or(|(measure, p)| {
                            self.measure_state.person_bernoulli(&self.streams, measure, other, p)
                        });
                    reachable.then_some(delta)
                }
                _ => None,
            };
            let delay = if digital {
                0.0
            } else if let Some(delay) = manual_delay {
                delay
            } else {
                continue;
            };

            let duration = contact.interval().intersect(&window).map_or(0.0, |i| i.length());
            let risk = 1.0 - (-setup.params.beta(contact.site_type) * duration).exp();
            let candidate = candidates.entry(other).or_insert(Candidate {
                risk: 0.0,
                category: contact.site_type,
                riskiest: f64::NEG_INFINITY,
                delay,
            });
            candidate.risk += risk;
            candidate.delay = candidate.delay.min(delay);
            if risk > candidate.riskiest {
                candidate.riskiest = risk;
                candidate.category = contact.site_type;
            }
        }

        candidates.retain(|person, _| {
            let health = &self.health[person.0];
            health.primary() != DiseaseState::Dead && !health.has_started(DiseaseState::Posi)
        });
        candidates
    }

    /// The candidates `rule` selects, consuming the budgets of `measure` as it goes.
    fn select_candidates(
        &mut self,
        candidates: &BTreeMap<PersonId, Candidate>,
        measure: Option<MeasureId>,
        rule: &TracingRule,
    ) -> Vec<(PersonId, Candidate)> {
        let now = self.now;
        let mut by_risk: Vec<(PersonId, Candidate)> =
            candidates.iter().map(|(p, c)| (*p, *c)).collect();
        by_risk.sort_by(|(pa, a), (pb, b)| b.risk.total_cmp(&a.risk).then(pa.cmp(pb)));

        match (rule, measure) {
            (TracingRule::AdvancedThreshold { threshold }, _) => candidates
                .iter()
                .filter(|(_, c)| c.risk >= *threshold)
                .map(|(p, c)| (*p, *c))
                .collect(),
            (TracingRule::AdvancedGlobalBudget { per_day }, Some(measure)) => {
                let budget = self.measure_state.budget(measure, None, *per_day);
                by_risk
                    .into_iter()
                    .take_while(|_| budget.try_consume(now))
                    .collect()
            }
            (TracingRule::AdvancedPerCategoryBudget { per_day }, Some(measure)) => by_risk
                .into_iter()
                .filter(|(_, c)| {
                    let cap = per_day.get(&c.category).copied().unwrap_or(0);
                    self.measure_state
                        .budget(measure, Some(c.category), cap)
                        .try_consume(now)
                })
                .collect(),
            _ => candidates.iter().map(|(p, c)| (*p, *c)).collect(),
        }
    }

    pub(super) fn handle_tracing_action(
        &mut self,
        person: PersonId,
        action: TracingAction,
        index: PersonId,
        risk: f64,
    ) {
        let setup = self.setup;
        let now = self.now;
        let primary = self.health[person.0].primary();
        if primary == DiseaseState::Dead {
            return;
        }
        if setup.params.tracing_stats_window().contains(now) {
            let infected = primary != DiseaseState::Susc;
            let by_index = self.infected_by[person.0] == Some(index);
            self.tracing_stats.record(action, infected, by_index);
        }
        match action {
            TracingAction::Isolate => {
                let until = now + setup.params.testing.smart_tracing_isolation_duration;
                self.isolated_until[person.0] = self.isolated_until[person.0].max(until);
            }
            TracingAction::Test => self.request_test(person, false, risk, true),
        }
    }
}

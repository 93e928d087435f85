use crate::define_rng;
use crate::hashing::{HashMap, HashMapExt};
use crate::measures::{DailyBudget, MeasureId};
use crate::mobility::{PersonId, SiteType, VisitId};
use crate::random::RandomStreams;

define_rng!(MeasureRng);

/// The mutable side of the measures for one rollout.
///
/// Bernoulli outcomes are drawn the first time they are needed and then reused, so a person
/// who stays home for a visit stays home for every contact of that visit, and budgets count
/// from the start of the rollout. A fresh `MeasureState` is created for every rollout.
#[derive(Default)]
pub struct MeasureState {
    visit_draws: HashMap<(MeasureId, PersonId, VisitId), bool>,
    person_draws: HashMap<(MeasureId, PersonId), bool>,
    budgets: HashMap<(MeasureId, Option<SiteType>), DailyBudget>,
}

impl MeasureState {
    #[must_use]
    pub fn new() -> MeasureState {
        MeasureState {
            visit_draws: HashMap::new(),
            person_draws: HashMap::new(),
            budgets: HashMap::new(),
        }
    }

    /// A Bernoulli(`p`) outcome shared by every contact of `person` during `visit`.
    pub fn visit_bernoulli(
        &mut self,
        streams: &RandomStreams,
        measure: MeasureId,
        person: PersonId,
        visit: VisitId,
        p: f64,
    ) -> bool {
        *self
            .visit_draws
            .entry((measure, person, visit))
            .or_insert_with(|| streams.sample_bool(MeasureRng, p))
    }

    /// A Bernoulli(`p`) outcome drawn once per person for the whole rollout.
    pub fn person_bernoulli(
        &mut self,
        streams: &RandomStreams,
        measure: MeasureId,
        person: PersonId,
        p: f64,
    ) -> bool {
        *self
            .person_draws
            .entry((measure, person))
            .or_insert_with(|| streams.sample_bool(MeasureRng, p))
    }

    /// The sliding daily budget of `measure`, optionally split by contact category.
    pub fn budget(
        &mut self,
        measure: MeasureId,
        category: Option<SiteType>,
        per_day: usize,
    ) -> &mut DailyBudget {
        self.budgets
            .entry((measure, category))
            .or_insert_with(|| DailyBudget::new(per_day))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_are_cached_per_visit() {
        let streams = RandomStreams::new(3);
        let mut state = MeasureState::new();
        let first: Vec<bool> = (0..50)
            .map(|v| state.visit_bernoulli(&streams, MeasureId(0), PersonId(1), VisitId(v), 0.5))
            .collect();
        let again: Vec<bool> = (0..50)
            .map(|v| state.visit_bernoulli(&streams, MeasureId(0), PersonId(1), VisitId(v), 0.5))
            .collect();
        assert_eq!(first, again);
        assert!(first.iter().any(|d| *d) && first.iter().any(|d| !*d));
    }

    #[test]
    fn person_draws_are_independent_per_measure() {
        let streams = RandomStreams::new(3);
        let mut state = MeasureState::new();
        assert!(state.person_bernoulli(&streams, MeasureId(0), PersonId(0), 1.0));
        assert!(!state.person_bernoulli(&streams, MeasureId(1), PersonId(0), 0.0));
        // The cached outcome wins over a new probability.
        assert!(state.person_bernoulli(&streams, MeasureId(0), PersonId(0), 0.0));
    }

    #[test]
    fn budgets_persist() {
        let mut state = MeasureState::new();
        assert!(state.budget(MeasureId(0), None, 1).try_consume(0.0));
        assert!(!state.budget(MeasureId(0), None, 1).try_consume(1.0));
        assert!(state
            .budget(MeasureId(0), Some(SiteType::Office), 1)
            .try_consume(1.0));
    }
}

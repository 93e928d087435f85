use serde_derive::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HouseholdId(pub usize);

/// The structural attributes of one person. Health state is kept by each rollout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub id: PersonId,
    pub age_group: usize,
    pub household: HouseholdId,
    pub home_loc: [f64; 2],
}

/// The people of the simulated region, dense in `PersonId`.
#[derive(Clone, Debug, Default)]
pub struct Population {
    individuals: Vec<Individual>,
    households: Vec<Vec<PersonId>>,
    num_age_groups: usize,
}

impl Population {
    #[must_use]
    pub fn new(individuals: Vec<Individual>, num_age_groups: usize) -> Population {
        let num_households = individuals
            .iter()
            .map(|individual| individual.household.0 + 1)
            .max()
            .unwrap_or(0);
        let mut households = vec![Vec::new(); num_households];
        for individual in &individuals {
            households[individual.household.0].push(individual.id);
        }
        Population {
            individuals,
            households,
            num_age_groups,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    #[must_use]
    pub fn num_age_groups(&self) -> usize {
        self.num_age_groups
    }

    /// # Panics
    ///
    /// Panics if `person` is not part of this population.
    #[must_use]
    pub fn get(&self, person: PersonId) -> &Individual {
        &self.individuals[person.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Individual> {
        self.individuals.iter()
    }

    /// Everyone living in the given household, in id order, including the person asking.
    #[must_use]
    pub fn household_members(&self, household: HouseholdId) -> &[PersonId] {
        self.households
            .get(household.0)
            .map_or(&[], Vec::as_slice)
    }

    pub fn ages(&self) -> impl Iterator<Item = usize> + '_ {
        self.individuals.iter().map(|individual| individual.age_group)
    }
}

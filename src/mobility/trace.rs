//! Visit generation and the per-person / per-site visit indices.
//!
//! Every person chooses a few favourite sites of each type, preferring sites close to home,
//! and then visits them as a Poisson process whose rate depends on the person's age group.
//! All draws come from one stream seeded by `MobilityConfig::seed`, consumed person by person
//! in id order, so the trace only depends on the configuration and the horizon.

use log::debug;
use rand_distr::Exp;
use serde_derive::{Deserialize, Serialize};

use crate::define_rng;
use crate::error::SimError;
use crate::mobility::{MobilityConfig, PersonId, Population, Site, SiteId, SiteType};
use crate::random::RandomStreams;
use crate::TO_HOURS;

define_rng!(MobilityRng);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VisitId(pub usize);

/// A stay of one person at one site during `[t_from, t_to)`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: VisitId,
    pub person: PersonId,
    pub site: SiteId,
    pub t_from: f64,
    pub t_to: f64,
}

impl Visit {
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.t_to - self.t_from
    }
}

/// Visits indexed by person (in time order) and by site (sorted by start time).
#[derive(Clone, Debug, Default)]
pub struct VisitIndex {
    visits: Vec<Visit>,
    by_person: Vec<Vec<VisitId>>,
    by_site: Vec<Vec<VisitId>>,
    site_max_duration: Vec<f64>,
}

impl VisitIndex {
    #[must_use]
    pub fn new(visits: Vec<Visit>, num_people: usize, num_sites: usize) -> VisitIndex {
        let mut by_person = vec![Vec::new(); num_people];
        let mut by_site = vec![Vec::new(); num_sites];
        let mut site_max_duration = vec![0.0_f64; num_sites];
        for visit in &visits {
            by_person[visit.person.0].push(visit.id);
            by_site[visit.site.0].push(visit.id);
            site_max_duration[visit.site.0] = site_max_duration[visit.site.0].max(visit.duration());
        }
        for site_visits in &mut by_site {
            site_visits.sort_by(|a, b| {
                let (a, b) = (&visits[a.0], &visits[b.0]);
                a.t_from.total_cmp(&b.t_from).then(a.id.cmp(&b.id))
            });
        }
        VisitIndex {
            visits,
            by_person,
            by_site,
            site_max_duration,
        }
    }

    #[must_use]
    pub fn visit(&self, id: VisitId) -> &Visit {
        &self.visits[id.0]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.visits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }

    /// The visits of `person` in time order.
    #[must_use]
    pub fn person_visits(&self, person: PersonId) -> &[VisitId] {
        self.by_person.get(person.0).map_or(&[], Vec::as_slice)
    }

    /// All visits at `site` that overlap `[t_from, t_to)`, in start order.
    ///
    /// The scan starts at the first visit that could still be running at `t_from`, which is
    /// bounded by the longest visit ever made to the site.
    pub fn site_visits_overlapping(
        &self,
        site: SiteId,
        t_from: f64,
        t_to: f64,
    ) -> impl Iterator<Item = &Visit> + '_ {
        let site_visits = self.by_site.get(site.0).map_or(&[][..], Vec::as_slice);
        let earliest_start = t_from - self.site_max_duration.get(site.0).copied().unwrap_or(0.0);
        let first = site_visits.partition_point(|id| self.visits[id.0].t_from < earliest_start);
        site_visits[first..]
            .iter()
            .map(|id| &self.visits[id.0])
            .take_while(move |visit| visit.t_from < t_to)
            .filter(move |visit| visit.t_to > t_from)
    }
}

/// Picks up to `variety` favourite sites of one type for a person living at `home`, without
/// replacement, with weights `1 / (1 + distance)`.
fn choose_favourites(
    streams: &RandomStreams,
    candidates: &[&Site],
    home: [f64; 2],
    variety: usize,
) -> Vec<SiteId> {
    let mut weights: Vec<f64> = candidates
        .iter()
        .map(|site| 1.0 / (1.0 + site.distance_to(home)))
        .collect();
    let mut favourites = Vec::with_capacity(variety.min(candidates.len()));
    while favourites.len() < variety {
        let Some(chosen) = streams.sample_weighted(MobilityRng, &weights) else {
            break;
        };
        favourites.push(candidates[chosen].id);
        weights[chosen] = 0.0;
    }
    favourites
}

/// Generates every visit of every person over `[0, max_time)`.
///
/// # Errors
///
/// Returns `SimError::ConfigError` if a rate or mean duration cannot parameterize an
/// exponential distribution.
pub fn generate_visits(
    config: &MobilityConfig,
    population: &Population,
    sites: &[Site],
    max_time: f64,
) -> Result<Vec<Visit>, SimError> {
    let streams = RandomStreams::new(config.seed);
    let sites_by_type: Vec<Vec<&Site>> = SiteType::OUTSIDE
        .iter()
        .map(|site_type| sites.iter().filter(|site| site.site_type == *site_type).collect())
        .collect();
    let durations = config
        .dur_mean_per_type
        .iter()
        .map(|mean| Exp::new(1.0 / mean).map_err(|e| SimError::ConfigError(e.to_string())))
        .collect::<Result<Vec<_>, _>>()?;

    let mut visits = Vec::new();
    for individual in population.iter() {
        let favourites: Vec<Vec<SiteId>> = sites_by_type
            .iter()
            .zip(&config.variety_per_type)
            .map(|(candidates, variety)| {
                choose_favourites(&streams, candidates, individual.home_loc, *variety)
            })
            .collect();

        // Hourly visit rate per type; a type without favourites is never visited.
        let rates: Vec<f64> = config.mob_rate_per_age_per_type[individual.age_group]
            .iter()
            .zip(&favourites)
            .map(|(rate, sites)| if sites.is_empty() { 0.0 } else { rate / TO_HOURS })
            .collect();
        let total_rate: f64 = rates.iter().sum();
        if total_rate <= 0.0 {
            continue;
        }
        let gaps = Exp::new(total_rate).map_err(|e| SimError::ConfigError(e.to_string()))?;

        let mut t = 0.0;
        loop {
            t += streams.sample_distr(MobilityRng, gaps);
            if t >= max_time {
                break;
            }
            let Some(type_index) = streams.sample_weighted(MobilityRng, &rates) else {
                break;
            };
            let options = &favourites[type_index];
            let site = options[streams.sample_range(MobilityRng, 0..options.len())];
            let duration: f64 = streams.sample_distr(MobilityRng, durations[type_index]);
            let t_to = (t + duration).min(max_time);
            if t_to > t {
                visits.push(Visit {
                    id: VisitId(visits.len()),
                    person: individual.id,
                    site,
                    t_from: t,
                    t_to,
                });
            }
            t = t_to;
        }
    }
    debug!(
        "generated {} visits for {} people at {} sites",
        visits.len(),
        population.len(),
        sites.len()
    );
    Ok(visits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn town() -> MobilityConfig {
        MobilityConfig {
            home_loc: (0..6_u8).map(|i| [f64::from(i), 0.0]).collect(),
            people_age: vec![0, 1, 0, 1, 0, 1],
            people_household: vec![0, 0, 1, 1, 2, 2],
            site_loc: vec![[0.0, 1.0], [3.0, 1.0], [5.0, 1.0]],
            site_type: vec![SiteType::Office, SiteType::Office, SiteType::Supermarket],
            mob_rate_per_age_per_type: vec![
                vec![0.0, 0.0, 0.0, 2.0, 1.0],
                vec![0.0, 0.0, 0.0, 1.0, 3.0],
            ],
            dur_mean_per_type: vec![2.0, 2.0, 0.5, 6.0, 0.5],
            variety_per_type: vec![1, 1, 1, 2, 1],
            seed: 11,
            downsample: 1,
            num_people_unscaled: None,
            region_population: None,
        }
    }

    fn visits_for(config: &MobilityConfig, max_time: f64) -> Vec<Visit> {
        let population = config.build_population();
        let sites = config.build_sites();
        generate_visits(config, &population, &sites, max_time).unwrap()
    }

    #[test]
    fn visits_are_ordered_and_confined() {
        let config = town();
        let visits = visits_for(&config, 24.0 * 7.0);
        assert!(!visits.is_empty());
        let index = VisitIndex::new(visits, config.num_people(), config.num_sites());
        for person in 0..config.num_people() {
            let mut previous_end = 0.0;
            for id in index.person_visits(PersonId(person)) {
                let visit = index.visit(*id);
                assert!(visit.t_from >= previous_end);
                assert!(visit.t_to > visit.t_from);
                assert!(visit.t_to <= 24.0 * 7.0);
                previous_end = visit.t_to;
            }
        }
    }

    #[test]
    fn generation_is_reproducible() {
        let config = town();
        assert_eq!(visits_for(&config, 100.0), visits_for(&config, 100.0));
        let mut other = town();
        other.seed = 12;
        assert_ne!(visits_for(&config, 100.0), visits_for(&other, 100.0));
    }

    #[test]
    fn favourites_respect_variety() {
        let config = town();
        let visits = visits_for(&config, 24.0 * 30.0);
        for person in 0..config.num_people() {
            let mut offices: Vec<_> = visits
                .iter()
                .filter(|v| v.person == PersonId(person) && v.site != SiteId(2))
                .map(|v| v.site)
                .collect();
            offices.sort();
            offices.dedup();
            assert!(offices.len() <= 2);
        }
    }

    #[test]
    fn overlapping_site_visits() {
        let visits = vec![
            Visit { id: VisitId(0), person: PersonId(0), site: SiteId(0), t_from: 0.0, t_to: 10.0 },
            Visit { id: VisitId(1), person: PersonId(1), site: SiteId(0), t_from: 2.0, t_to: 3.0 },
            Visit {
                id: VisitId(2),
                person: PersonId(2),
                site: SiteId(0),
                t_from: 11.0,
                t_to: 12.0,
            },
        ];
        let index = VisitIndex::new(visits, 3, 1);
        let found: Vec<_> = index
            .site_visits_overlapping(SiteId(0), 5.0, 11.5)
            .map(|v| v.id)
            .collect();
        assert_eq!(found, vec![VisitId(0), VisitId(2)]);
    }
}

//! Transmission: contact batches, household and background exposures, and the bridge to
//! the distancing measures.

use rand_distr::{Exp, Exp1};
use serde_derive::{Deserialize, Serialize};

use crate::define_rng;
use crate::disease::{first_event_time, DiseaseState};
use crate::error::SimError;
use crate::measures::{ContactModifier, PersonStatus};
use crate::mobility::{Contact, PersonId, SiteType};
use crate::rollout::{Event, Rollout};
use crate::TO_HOURS;

define_rng!(ExposureRng);

/// Where an exposure came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ExposureSource {
    Contact(Contact),
    Household,
    /// Infection from outside the simulated population.
    Background,
}

impl Rollout<'_> {
    /// One background exposure per initially susceptible person, at the configured daily
    /// rate per 100k people.
    pub(super) fn schedule_background_exposures(&mut self) -> Result<(), SimError> {
        let rate = self.setup.params.expected_daily_base_expo_per100k / 100_000.0 / TO_HOURS;
        if rate <= 0.0 {
            return Ok(());
        }
        let gap = Exp::new(rate).map_err(|err| SimError::ConfigError(err.to_string()))?;
        for person in 0..self.health.len() {
            if self.health[person].primary() != DiseaseState::Susc {
                continue;
            }
            let time = self.streams.sample_distr(ExposureRng, gap);
            self.schedule(
                time,
                Event::Exposure {
                    person: PersonId(person),
                    infector: None,
                    source: ExposureSource::Background,
                },
            )?;
        }
        Ok(())
    }

    /// Called once per infected person when they start transmitting.
    pub(super) fn begin_infectious_period(&mut self, infector: PersonId) -> Result<(), SimError> {
        let setup = self.setup;
        let Some(plan) = self.plans[infector.0].as_ref() else {
            return Ok(());
        };
        let segments = plan.infectious_segments(&setup.distributions);
        let Some((start, _)) = plan.infectious_period(&setup.distributions) else {
            return Ok(());
        };

        let population = setup.mobility.population();
        let household = population.get(infector).household;
        let beta = setup.params.beta_household;
        if beta > 0.0 {
            for member in population.household_members(household) {
                if *member == infector || self.health[member.0].primary() != DiseaseState::Susc {
                    continue;
                }
                let draw: f64 = self.streams.sample_distr(ExposureRng, Exp1);
                let exposure = first_event_time(&segments, self.now, f64::INFINITY, beta, draw);
                if let Some(time) = exposure {
                    self.schedule(
                        time,
                        Event::Exposure {
                            person: *member,
                            infector: Some(infector),
                            source: ExposureSource::Household,
                        },
                    )?;
                }
            }
        }
        let from = start.max(self.now);
        self.schedule(from, Event::ContactBatch { infector, from })
    }

    /// Makes one exposure attempt per contact of `infector` whose clipped start falls in
    /// the next day of the infectious period, then schedules the following batch.
    pub(super) fn handle_contact_batch(
        &mut self,
        infector: PersonId,
        from: f64,
    ) -> Result<(), SimError> {
        let setup = self.setup;
        let Some(plan) = self.plans[infector.0].as_ref() else {
            return Ok(());
        };
        let segments = plan.infectious_segments(&setup.distributions);
        let Some((infectious_start, infectious_end)) = plan.infectious_period(&setup.distributions)
        else {
            return Ok(());
        };
        if from >= infectious_end {
            return Ok(());
        }
        let window_end = (from + TO_HOURS).min(infectious_end);

        let contacts: Vec<Contact> = setup
            .mobility
            .contact_stream(infector, from)
            .take_while(|contact| contact.t_from < window_end)
            .filter(|contact| {
                let s = contact.t_from.max(infectious_start);
                s >= from && s < window_end
            })
            .collect();

        for contact in contacts {
            self.stats.contacts_considered += 1;
            if self.health[contact.other.0].primary() != DiseaseState::Susc {
                continue;
            }
            let s = contact.t_from.max(infectious_start);
            if self.contact_suppressed(&contact, s) {
                self.stats.contacts_suppressed += 1;
                continue;
            }
            self.stats.exposure_attempts += 1;
            let scale = setup.params.beta(contact.site_type)
                * setup.measures.beta_multiplier(contact.site_type, s);
            let draw: f64 = self.streams.sample_distr(ExposureRng, Exp1);
            if let Some(time) = first_event_time(&segments, s, contact.t_to, scale, draw) {
                self.schedule(
                    time,
                    Event::Exposure {
                        person: contact.other,
                        infector: Some(infector),
                        source: ExposureSource::Contact(contact),
                    },
                )?;
            }
        }

        if let Some(next) = setup.mobility.next_contact_after(infector, window_end) {
            let next_from = window_end.max(next.t_from);
            if next_from < infectious_end {
                self.schedule(next_from, Event::ContactBatch { infector, from: next_from })?;
            }
        }
        Ok(())
    }

    pub(super) fn handle_exposure(
        &mut self,
        person: PersonId,
        infector: Option<PersonId>,
        source: ExposureSource,
    ) -> Result<(), SimError> {
        if self.health[person.0].primary() != DiseaseState::Susc {
            self.stats.stale_exposures += 1;
            return Ok(());
        }
        let now = self.now;
        match &source {
            ExposureSource::Contact(contact) => {
                if self.contact_suppressed(contact, now) {
                    self.stats.contacts_suppressed += 1;
                    return Ok(());
                }
                self.stats.exposures_by_contact += 1;
            }
            ExposureSource::Household => {
                if infector.is_some_and(|infector| self.household_isolated(infector, now)) {
                    self.stats.contacts_suppressed += 1;
                    return Ok(());
                }
                self.stats.exposures_by_household += 1;
            }
            ExposureSource::Background => self.stats.exposures_by_background += 1,
        }
        self.infect(person, infector)
    }

    pub(super) fn person_status(&self, person: PersonId, t: f64) -> PersonStatus {
        PersonStatus {
            age_group: self.setup.mobility.population().get(person).age_group,
            positive: self.health[person.0].is_active(DiseaseState::Posi, t),
            isolated: t < self.isolated_until[person.0],
        }
    }

    /// Whether either party of `contact` stays home for their visit at time `t`. Each
    /// distancing measure draws once per person and visit.
    fn contact_suppressed(&mut self, contact: &Contact, t: f64) -> bool {
        let setup = self.setup;
        let mut suppressed = false;
        let parties = [
            (contact.person, contact.person_visit),
            (contact.other, contact.other_visit),
        ];
        for (party, visit) in parties {
            let status = self.person_status(party, t);
            let modifiers = setup.measures.contact_modifiers(&status, contact.site_type, t);
            for (measure, modifier) in modifiers {
                if let ContactModifier::StayHome { p } = modifier {
                    // No short-circuit: the cached outcomes must not depend on measure order.
                    suppressed |= self
                        .measure_state
                        .visit_bernoulli(&self.streams, measure, party, visit, p);
                }
            }
        }
        suppressed
    }

    /// Whether `infector` isolates from their household at time `t`.
    fn household_isolated(&mut self, infector: PersonId, t: f64) -> bool {
        let setup = self.setup;
        let status = self.person_status(infector, t);
        let mut isolated = false;
        let modifiers = setup.measures.contact_modifiers(&status, SiteType::Household, t);
        for (measure, modifier) in modifiers {
            if let ContactModifier::Isolate { p } = modifier {
                isolated |= self
                    .measure_state
                    .person_bernoulli(&self.streams, measure, infector, p);
            }
        }
        isolated
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::disease::DiseaseDistributions;
    use crate::measures::{Interval, Measure};
    use crate::mobility::{ContactMode, MobilityConfig, MobilitySimulator};
    use crate::orchestrator::CancellationToken;
    use crate::params::{SimulationParams, SimulationSetup};

    fn pair_setup(measures: &str, beta_household: f64) -> SimulationSetup {
        let config = MobilityConfig {
            home_loc: vec![[0.0, 0.0]; 2],
            people_age: vec![0; 2],
            people_household: vec![0, 0],
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
        let params = SimulationParams::from_json_str(&format!(
            r#"{{"max_time": 240.0, "betas": {{}}, "beta_household": {beta_household},
                "initial_seeds": {{"isym_posi": 1}}, "measures": {measures}}}"#
        ))
        .unwrap();
        SimulationSetup::new(
            Arc::new(mobility),
            params,
            DiseaseDistributions::constant(24.0, 24.0, 48.0, 1),
        )
        .unwrap()
    }

    #[test]
    fn household_member_is_infected() {
        let setup = pair_setup("[]", 1000.0);
        let record = Rollout::new(&setup, 0).run(&CancellationToken::new()).unwrap();
        let (seed, _) = record.seeds[0];
        let other = PersonId(1 - seed.0);
        assert!(record.health[other.0].has_started(DiseaseState::Expo));
        assert_eq!(record.infected_by[other.0], Some(seed));
        assert_eq!(record.stats.exposures_by_household, 1);
    }

    #[test]
    fn isolating_positive_infector_protects_household() {
        let setup = pair_setup(
            r#"[{"type": "SocialDistancingForPositiveHousehold", "t_window": [0.0, 240.0],
                 "p_isolate": 1.0}]"#,
            1000.0,
        );
        let record = Rollout::new(&setup, 0).run(&CancellationToken::new()).unwrap();
        let (seed, _) = record.seeds[0];
        let other = PersonId(1 - seed.0);
        assert_eq!(record.health[other.0].primary(), DiseaseState::Susc);
        assert_eq!(record.stats.contacts_suppressed, 1);
        assert_eq!(record.stats.exposures_by_household, 0);
    }

    #[test]
    fn background_exposures_reach_everyone_eventually() {
        let mut setup = pair_setup("[]", 0.0);
        setup.params.initial_seeds.clear();
        setup.params.expected_daily_base_expo_per100k = 1e7;
        let record = Rollout::new(&setup, 0).run(&CancellationToken::new()).unwrap();
        assert_eq!(record.stats.exposures_by_background, 2);
        assert!(record.infected_by.iter().all(Option::is_none));
        assert!(record.health.iter().all(|h| h.has_started(DiseaseState::Expo)));
    }

    #[test]
    fn status_reflects_positive_and_isolation() {
        let setup = pair_setup("[]", 0.0);
        let mut rollout = Rollout::new(&setup, 0);
        rollout.health[0].start_side(DiseaseState::Posi, 5.0);
        rollout.isolated_until[0] = 10.0;
        let status = rollout.person_status(PersonId(0), 6.0);
        assert!(status.positive && status.isolated);
        let status = rollout.person_status(PersonId(0), 12.0);
        assert!(status.positive && !status.isolated);
        assert!(!rollout.person_status(PersonId(1), 6.0).positive);
        assert!(Measure::SocialDistancingForAll {
            t_window: Interval::new(0.0, 1.0),
            p_stay_home: 1.0
        }
        .applies_to(&status, 0.5));
    }
}

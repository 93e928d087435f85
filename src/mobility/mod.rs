//! The mobility provider: who is where, when, and with whom.
//!
//! `MobilitySimulator` turns a `MobilityConfig` into a trace of site visits and answers
//! contact queries against it. The disease engine only sees the `MobilityProvider` trait and
//! treats it as a read-only oracle shared by every rollout.
//!
//! Contacts can either be precomputed for every visit (`ContactMode::Eager`) or derived from
//! the visit index when they are asked for (`ContactMode::Lazy`). Both modes use the same
//! generator and the same per-visit derivation, so they answer every query identically.

mod config;
mod contacts;
mod population;
mod site;
mod trace;

pub use config::MobilityConfig;
pub use contacts::{Contact, ContactStream};
pub use population::{HouseholdId, Individual, PersonId, Population};
pub use site::{Site, SiteId, SiteType};
pub use trace::{generate_visits, Visit, VisitId, VisitIndex};

use log::info;
use serde_derive::{Deserialize, Serialize};

use crate::error::SimError;
use crate::measures::Interval;
use contacts::{contacts_of_visit, site_order};

/// Whether contacts are precomputed when the trace is built or derived on demand.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactMode {
    Eager,
    #[default]
    Lazy,
}

/// The read-only view of the mobility trace used by the rollouts.
pub trait MobilityProvider: Send + Sync {
    fn population(&self) -> &Population;

    fn sites(&self) -> &[Site];

    /// The end of the horizon the trace was generated for.
    fn max_time(&self) -> f64;

    /// The contacts of `person` with `t_to > from`, sorted by `(t_from, t_to, other, site)`.
    fn contact_stream(&self, person: PersonId, from: f64) -> ContactStream<'_>;

    /// Every contact at `site` overlapping `window`, each unordered pair reported once with
    /// `person < other`, sorted by `(t_from, t_to, person, other)`.
    fn contacts_at_site_during(&self, site: SiteId, window: Interval) -> Vec<Contact>;

    /// Every contact of `person` overlapping `window`, oriented with `person` first.
    fn contacts_of_during(&self, person: PersonId, window: Interval) -> Vec<Contact> {
        self.contact_stream(person, window.start)
            .take_while(|contact| contact.t_from < window.end)
            .collect()
    }

    /// The first contact of `person` starting at or after `t`.
    fn next_contact_after(&self, person: PersonId, t: f64) -> Option<Contact> {
        self.contact_stream(person, t)
            .find(|contact| contact.t_from >= t)
    }
}

/// A mobility trace generated from a `MobilityConfig` over `[0, max_time)`.
pub struct MobilitySimulator {
    config: MobilityConfig,
    population: Population,
    sites: Vec<Site>,
    index: VisitIndex,
    max_time: f64,
    mode: ContactMode,
    /// Per-visit contact lists, present in eager mode only.
    precomputed: Option<Vec<Vec<Contact>>>,
}

impl MobilitySimulator {
    /// Validates `config` and generates the visit trace.
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigError` if the configuration is inconsistent or the horizon is
    /// not a positive finite number of hours.
    pub fn new(
        config: MobilityConfig,
        max_time: f64,
        mode: ContactMode,
    ) -> Result<MobilitySimulator, SimError> {
        config.validate()?;
        if !max_time.is_finite() || max_time <= 0.0 {
            return Err(format!("max_time must be positive and finite, got {max_time}").into());
        }
        let population = config.build_population();
        let sites = config.build_sites();
        let visits = generate_visits(&config, &population, &sites, max_time)?;
        let index = VisitIndex::new(visits, population.len(), sites.len());

        let mut simulator = MobilitySimulator {
            config,
            population,
            sites,
            index,
            max_time,
            mode,
            precomputed: None,
        };
        if mode == ContactMode::Eager {
            let precomputed: Vec<Vec<Contact>> = (0..simulator.index.len())
                .map(|visit| simulator.derive_visit_contacts(VisitId(visit)))
                .collect();
            info!(
                "precomputed {} contacts for {} visits",
                precomputed.iter().map(Vec::len).sum::<usize>(),
                precomputed.len()
            );
            simulator.precomputed = Some(precomputed);
        }
        Ok(simulator)
    }

    #[must_use]
    pub fn config(&self) -> &MobilityConfig {
        &self.config
    }

    #[must_use]
    pub fn mode(&self) -> ContactMode {
        self.mode
    }

    #[must_use]
    pub fn visits(&self) -> &VisitIndex {
        &self.index
    }

    #[must_use]
    pub fn downsample(&self) -> usize {
        self.config.downsample
    }

    #[must_use]
    pub fn scale_factor(&self) -> f64 {
        self.config.scale_factor()
    }

    fn derive_visit_contacts(&self, visit: VisitId) -> Vec<Contact> {
        let visit = self.index.visit(visit);
        contacts_of_visit(&self.index, visit, self.sites[visit.site.0].site_type)
    }

    /// The contacts made during one visit, from the precomputed table in eager mode.
    #[must_use]
    pub fn visit_contacts(&self, visit: VisitId) -> Vec<Contact> {
        match &self.precomputed {
            Some(precomputed) => precomputed[visit.0].clone(),
            None => self.derive_visit_contacts(visit),
        }
    }
}

impl MobilityProvider for MobilitySimulator {
    fn population(&self) -> &Population {
        &self.population
    }

    fn sites(&self) -> &[Site] {
        &self.sites
    }

    fn max_time(&self) -> f64 {
        self.max_time
    }

    fn contact_stream(&self, person: PersonId, from: f64) -> ContactStream<'_> {
        let visits = self.index.person_visits(person);
        // A person's visits never overlap, so they are also sorted by end time.
        let first = visits.partition_point(|id| self.index.visit(*id).t_to <= from);
        ContactStream::new(
            visits[first..]
                .iter()
                .flat_map(move |id| self.visit_contacts(*id))
                .filter(move |contact| contact.t_to > from),
        )
    }

    fn contacts_at_site_during(&self, site: SiteId, window: Interval) -> Vec<Contact> {
        let mut contacts: Vec<Contact> = self
            .index
            .site_visits_overlapping(site, window.start, window.end)
            .flat_map(|visit| self.visit_contacts(visit.id))
            .filter(|contact| contact.person < contact.other && contact.overlaps(&window))
            .collect();
        contacts.sort_by(site_order);
        contacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn town() -> MobilityConfig {
        MobilityConfig {
            home_loc: (0..8_u8).map(|i| [f64::from(i), 0.0]).collect(),
            people_age: vec![0, 1, 0, 1, 0, 1, 0, 1],
            people_household: vec![0, 0, 1, 1, 2, 2, 3, 3],
            site_loc: vec![[0.0, 1.0], [4.0, 1.0], [7.0, 1.0], [2.0, 2.0]],
            site_type: vec![
                SiteType::Office,
                SiteType::Supermarket,
                SiteType::Social,
                SiteType::Education,
            ],
            mob_rate_per_age_per_type: vec![
                vec![1.0, 1.0, 0.0, 2.0, 2.0],
                vec![1.0, 2.0, 0.0, 1.0, 3.0],
            ],
            dur_mean_per_type: vec![4.0, 2.0, 0.5, 6.0, 1.0],
            variety_per_type: vec![1, 1, 1, 1, 1],
            seed: 5,
            downsample: 1,
            num_people_unscaled: None,
            region_population: None,
        }
    }

    #[test]
    fn rejects_bad_horizon() {
        assert!(MobilitySimulator::new(town(), 0.0, ContactMode::Lazy).is_err());
        assert!(MobilitySimulator::new(town(), f64::NAN, ContactMode::Lazy).is_err());
    }

    #[test]
    fn contacts_are_symmetric() {
        let mobility = MobilitySimulator::new(town(), 24.0 * 7.0, ContactMode::Lazy).unwrap();
        let window = Interval::new(24.0, 72.0);
        let mut total = 0;
        for person in 0..8 {
            for contact in mobility.contacts_of_during(PersonId(person), window) {
                total += 1;
                assert!(contact.duration() > 0.0);
                assert!(contact.t_to <= 24.0 * 7.0);
                let mirrored = mobility.contacts_of_during(contact.other, window);
                assert!(mirrored.contains(&contact.mirrored()));
            }
        }
        assert!(total > 0);
    }

    #[test]
    fn eager_and_lazy_agree() {
        let eager = MobilitySimulator::new(town(), 24.0 * 5.0, ContactMode::Eager).unwrap();
        let lazy = MobilitySimulator::new(town(), 24.0 * 5.0, ContactMode::Lazy).unwrap();
        for person in 0..8 {
            let eager_all: Vec<_> = eager.contact_stream(PersonId(person), 0.0).collect();
            let lazy_all: Vec<_> = lazy.contact_stream(PersonId(person), 0.0).collect();
            assert_eq!(eager_all, lazy_all);
            assert_eq!(
                eager.next_contact_after(PersonId(person), 30.0),
                lazy.next_contact_after(PersonId(person), 30.0)
            );
        }
        for site in 0..4 {
            let window = Interval::new(10.0, 50.0);
            assert_eq!(
                eager.contacts_at_site_during(SiteId(site), window),
                lazy.contacts_at_site_during(SiteId(site), window)
            );
        }
    }

    #[test]
    fn site_contacts_report_each_pair_once() {
        let mobility = MobilitySimulator::new(town(), 24.0 * 7.0, ContactMode::Lazy).unwrap();
        let window = Interval::new(0.0, 24.0 * 7.0);
        for site in 0..4 {
            let contacts = mobility.contacts_at_site_during(SiteId(site), window);
            for pair in contacts.windows(2) {
                assert!(site_order(&pair[0], &pair[1]).is_le());
            }
            for contact in &contacts {
                assert!(contact.person < contact.other);
                assert_eq!(contact.site, SiteId(site));
            }
        }
    }

    #[test]
    fn streams_are_sorted_and_start_after_from() {
        let mobility = MobilitySimulator::new(town(), 24.0 * 7.0, ContactMode::Eager).unwrap();
        for person in 0..8 {
            let contacts: Vec<_> = mobility.contact_stream(PersonId(person), 40.0).collect();
            for pair in contacts.windows(2) {
                assert!(contacts::person_order(&pair[0], &pair[1]).is_le());
            }
            assert!(contacts.iter().all(|c| c.t_to > 40.0));
            if let Some(next) = mobility.next_contact_after(PersonId(person), 40.0) {
                assert!(next.t_from >= 40.0);
                assert!(contacts.contains(&next));
            }
        }
    }
}

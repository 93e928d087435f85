use std::fs;
use std::path::Path;

use serde_derive::{Deserialize, Serialize};

use crate::error::SimError;
use crate::mobility::{HouseholdId, Individual, PersonId, Population, Site, SiteId, SiteType};

fn default_downsample() -> usize {
    1
}

/// The structural description of a region: who lives where, which sites exist and how
/// often each age group visits each type of site.
///
/// Per-type parameters are indexed in the order of `SiteType::OUTSIDE`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MobilityConfig {
    pub home_loc: Vec<[f64; 2]>,
    pub people_age: Vec<usize>,
    pub people_household: Vec<usize>,
    pub site_loc: Vec<[f64; 2]>,
    pub site_type: Vec<SiteType>,
    /// Expected visits per day, `[age_group][site_type]`.
    pub mob_rate_per_age_per_type: Vec<Vec<f64>>,
    /// Mean visit duration in hours, per site type.
    pub dur_mean_per_type: Vec<f64>,
    /// How many distinct favourite sites of each type a person visits.
    pub variety_per_type: Vec<usize>,
    /// Seed of the visit generator. Independent of the rollout seeds.
    pub seed: u64,
    #[serde(default = "default_downsample")]
    pub downsample: usize,
    #[serde(default)]
    pub num_people_unscaled: Option<usize>,
    #[serde(default)]
    pub region_population: Option<usize>,
}

impl MobilityConfig {
    /// # Errors
    ///
    /// Returns `SimError::JsonError` if the string is not a valid configuration.
    pub fn from_json_str(json: &str) -> Result<MobilityConfig, SimError> {
        Ok(serde_json::from_str(json)?)
    }

    /// # Errors
    ///
    /// Returns `SimError::IoError` if the file cannot be read and `SimError::JsonError` if
    /// it does not hold a valid configuration.
    pub fn from_json_file(path: &Path) -> Result<MobilityConfig, SimError> {
        let contents = fs::read_to_string(path)?;
        MobilityConfig::from_json_str(&contents)
    }

    #[must_use]
    pub fn num_people(&self) -> usize {
        self.home_loc.len()
    }

    #[must_use]
    pub fn num_sites(&self) -> usize {
        self.site_loc.len()
    }

    #[must_use]
    pub fn num_age_groups(&self) -> usize {
        self.mob_rate_per_age_per_type.len()
    }

    /// Factor that converts counts in the simulated town to counts in the whole region.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn scale_factor(&self) -> f64 {
        let unscaled = self
            .num_people_unscaled
            .unwrap_or(self.num_people() * self.downsample);
        let region = self.region_population.unwrap_or(unscaled);
        if unscaled == 0 {
            return 1.0;
        }
        self.downsample as f64 * region as f64 / unscaled as f64
    }

    /// Checks that every table has consistent dimensions and every value is in range.
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigError` naming the first problem found.
    pub fn validate(&self) -> Result<(), SimError> {
        let num_people = self.num_people();
        let num_types = SiteType::OUTSIDE.len();
        if self.people_age.len() != num_people || self.people_household.len() != num_people {
            return Err(format!(
                "home_loc, people_age and people_household must have the same length \
                 ({num_people}, {}, {})",
                self.people_age.len(),
                self.people_household.len()
            )
            .into());
        }
        if self.site_type.len() != self.num_sites() {
            return Err("site_loc and site_type must have the same length".into());
        }
        if let Some(position) = self.site_type.iter().position(|t| !t.is_outside()) {
            return Err(format!("site {position} has type household, which is not a site").into());
        }
        if self.num_age_groups() == 0 {
            return Err("mob_rate_per_age_per_type must have at least one age group".into());
        }
        if let Some(age) = self.people_age.iter().find(|age| **age >= self.num_age_groups()) {
            return Err(format!(
                "age group {age} has no mobility rates ({} age groups configured)",
                self.num_age_groups()
            )
            .into());
        }
        for (age, rates) in self.mob_rate_per_age_per_type.iter().enumerate() {
            if rates.len() != num_types {
                return Err(format!("age group {age} must have {num_types} mobility rates").into());
            }
            if rates.iter().any(|rate| !rate.is_finite() || *rate < 0.0) {
                return Err(format!("age group {age} has a negative or non-finite rate").into());
            }
        }
        if self.dur_mean_per_type.len() != num_types || self.variety_per_type.len() != num_types {
            return Err(format!(
                "dur_mean_per_type and variety_per_type must have {num_types} entries"
            )
            .into());
        }
        if self
            .dur_mean_per_type
            .iter()
            .any(|mean| !mean.is_finite() || *mean <= 0.0)
        {
            return Err("visit durations must have a positive finite mean".into());
        }
        if self.downsample == 0 {
            return Err("downsample must be at least 1".into());
        }
        Ok(())
    }

    pub(crate) fn build_population(&self) -> Population {
        let individuals = (0..self.num_people())
            .map(|i| Individual {
                id: PersonId(i),
                age_group: self.people_age[i],
                household: HouseholdId(self.people_household[i]),
                home_loc: self.home_loc[i],
            })
            .collect();
        Population::new(individuals, self.num_age_groups())
    }

    pub(crate) fn build_sites(&self) -> Vec<Site> {
        self.site_loc
            .iter()
            .zip(&self.site_type)
            .enumerate()
            .map(|(i, (loc, site_type))| Site {
                id: SiteId(i),
                site_type: *site_type,
                loc: *loc,
            })
            .collect()
    }
}

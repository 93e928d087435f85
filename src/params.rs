//! Run parameters and the validated, shareable setup built from them.
//!
//! `SimulationParams` is the record an outer calibration or experiment layer fills in. It is
//! plain serde data; `SimulationSetup::new` checks it against the mobility trace and the
//! disease parameters before any rollout starts, so that every configuration problem is
//! reported as a `SimError::ConfigError` up front.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::disease::DiseaseDistributions;
use crate::error::SimError;
use crate::hashing::HashMap;
use crate::measures::{Interval, Measure, MeasureList, TracingAction};
use crate::mobility::{ContactMode, MobilityProvider, SiteType};
use crate::TO_HOURS;

/// The states individuals can be placed in at t=0.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SeedState {
    Expo,
    Ipre,
    #[serde(alias = "isym_notposi")]
    Isym,
    IsymPosi,
    Iasy,
    ResiPosi,
    ResiNotposi,
}

/// Order in which queued test requests are served.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestQueuePolicy {
    #[default]
    Fifo,
    /// Symptomatic requests first, then by descending exposure risk.
    #[serde(alias = "exposure-risk")]
    ExposureRisk,
}

fn default_testing_frequency() -> f64 {
    TO_HOURS
}

fn default_test_reporting_lag() -> f64 {
    2.0 * TO_HOURS
}

fn default_contact_delta() -> f64 {
    10.0 * TO_HOURS
}

fn default_isolation_duration() -> f64 {
    14.0 * TO_HOURS
}

fn default_true() -> bool {
    true
}

/// Testing and contact tracing parameters. Testing is off while `tests_per_batch` is 0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestingParams {
    #[serde(default = "Interval::from_zero")]
    pub testing_t_window: Interval,
    /// Hours between two test administrations.
    #[serde(default = "default_testing_frequency")]
    pub testing_frequency: f64,
    /// Hours between administering a test and knowing its result.
    #[serde(default = "default_test_reporting_lag")]
    pub test_reporting_lag: f64,
    #[serde(default)]
    pub tests_per_batch: usize,
    #[serde(default)]
    pub test_fpr: f64,
    #[serde(default)]
    pub test_fnr: f64,
    #[serde(default)]
    pub test_queue_policy: TestQueuePolicy,
    /// How far back contacts of a positive case are traced, in hours.
    #[serde(default = "default_contact_delta")]
    pub smart_tracing_contact_delta: f64,
    #[serde(default)]
    pub smart_tracing_actions: Vec<TracingAction>,
    #[serde(default = "default_isolation_duration")]
    pub smart_tracing_isolation_duration: f64,
    #[serde(default = "default_true")]
    pub trigger_tracing_after_posi_trace_test: bool,
    /// Risk thresholds at which tracing candidates are classified for ROC analysis.
    #[serde(default)]
    pub thresholds_roc: Vec<f64>,
}

impl Default for TestingParams {
    fn default() -> Self {
        TestingParams {
            testing_t_window: Interval::from_zero(),
            testing_frequency: default_testing_frequency(),
            test_reporting_lag: default_test_reporting_lag(),
            tests_per_batch: 0,
            test_fpr: 0.0,
            test_fnr: 0.0,
            test_queue_policy: TestQueuePolicy::default(),
            smart_tracing_contact_delta: default_contact_delta(),
            smart_tracing_actions: Vec::new(),
            smart_tracing_isolation_duration: default_isolation_duration(),
            trigger_tracing_after_posi_trace_test: true,
            thresholds_roc: Vec::new(),
        }
    }
}

impl TestingParams {
    #[must_use]
    pub fn testing_enabled(&self) -> bool {
        self.tests_per_batch > 0
    }

    #[must_use]
    pub fn tracing_enabled(&self) -> bool {
        !self.smart_tracing_actions.is_empty()
    }

    fn validate(&self) -> Result<(), SimError> {
        if !(self.testing_frequency > 0.0) {
            return Err("testing_frequency must be positive".into());
        }
        for (name, value) in [
            ("test_reporting_lag", self.test_reporting_lag),
            ("smart_tracing_contact_delta", self.smart_tracing_contact_delta),
            ("smart_tracing_isolation_duration", self.smart_tracing_isolation_duration),
        ] {
            if !(value >= 0.0) {
                return Err(format!("{name} must be non-negative, got {value}").into());
            }
        }
        if let Some(threshold) = self.thresholds_roc.iter().find(|t| !t.is_finite()) {
            return Err(format!("thresholds_roc must be finite, got {threshold}").into());
        }
        for (name, p) in [("test_fpr", self.test_fpr), ("test_fnr", self.test_fnr)] {
            if !(0.0..=1.0).contains(&p) {
                return Err(format!("{name} must be a probability, got {p}").into());
            }
        }
        Ok(())
    }
}

fn default_random_repeats() -> usize {
    2
}

fn default_cpu_count() -> usize {
    1
}

/// Everything that defines a scenario apart from the mobility trace and the course of
/// disease.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Horizon in hours.
    pub max_time: f64,
    /// Transmission rate per hour of contact, per site type.
    pub betas: HashMap<SiteType, f64>,
    #[serde(default)]
    pub beta_household: f64,
    /// Expected exposures from outside the simulated population per 100k people per day.
    #[serde(default)]
    pub expected_daily_base_expo_per100k: f64,
    #[serde(default)]
    pub initial_seeds: HashMap<SeedState, usize>,
    #[serde(default)]
    pub testing: TestingParams,
    #[serde(default)]
    pub measures: Vec<Measure>,
    #[serde(default = "default_random_repeats")]
    pub random_repeats: usize,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
    #[serde(default)]
    pub base_seed: u64,
    /// Tracing actions are only counted inside this window; defaults to `[0, max_time)`.
    #[serde(default)]
    pub tracing_stats_window: Option<Interval>,
    #[serde(default)]
    pub contact_mode: ContactMode,
}

impl SimulationParams {
    /// # Errors
    ///
    /// Returns `SimError::JsonError` if the string is not a valid parameter record.
    pub fn from_json_str(json: &str) -> Result<SimulationParams, SimError> {
        Ok(serde_json::from_str(json)?)
    }

    /// # Errors
    ///
    /// Returns `SimError::IoError` or `SimError::JsonError` if the file cannot be loaded.
    pub fn from_json_file(path: &Path) -> Result<SimulationParams, SimError> {
        SimulationParams::from_json_str(&fs::read_to_string(path)?)
    }

    /// The transmission rate of contacts of `site_type`; household contacts use
    /// `beta_household`.
    #[must_use]
    pub fn beta(&self, site_type: SiteType) -> f64 {
        match site_type {
            SiteType::Household => self.beta_household,
            other => self.betas.get(&other).copied().unwrap_or(0.0),
        }
    }

    #[must_use]
    pub fn tracing_stats_window(&self) -> Interval {
        self.tracing_stats_window
            .unwrap_or(Interval::new(0.0, self.max_time))
    }

    #[must_use]
    pub fn total_seeds(&self) -> usize {
        self.initial_seeds.values().sum()
    }

    /// # Errors
    ///
    /// Returns `SimError::ConfigError` naming the first invalid field.
    pub fn validate(&self) -> Result<(), SimError> {
        if !self.max_time.is_finite() || self.max_time <= 0.0 {
            return Err(
                format!("max_time must be positive and finite, got {}", self.max_time).into(),
            );
        }
        for (site_type, beta) in &self.betas {
            if !beta.is_finite() || *beta < 0.0 {
                return Err(format!("beta for {site_type} must be non-negative, got {beta}").into());
            }
        }
        if !self.beta_household.is_finite() || self.beta_household < 0.0 {
            return Err("beta_household must be non-negative".into());
        }
        if !self.expected_daily_base_expo_per100k.is_finite()
            || self.expected_daily_base_expo_per100k < 0.0
        {
            return Err("expected_daily_base_expo_per100k must be non-negative".into());
        }
        if self.cpu_count == 0 {
            return Err("cpu_count must be at least 1".into());
        }
        self.testing.validate()
    }
}

/// The immutable inputs of an orchestration run, shared by every rollout.
pub struct SimulationSetup {
    pub mobility: Arc<dyn MobilityProvider>,
    pub params: SimulationParams,
    pub distributions: DiseaseDistributions,
    pub measures: MeasureList,
}

impl SimulationSetup {
    /// Checks the parameters against each other and builds the measure list.
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigError` if any parameter is invalid, if the trace is shorter
    /// than `max_time` or if there are more initial seeds than people.
    pub fn new(
        mobility: Arc<dyn MobilityProvider>,
        params: SimulationParams,
        distributions: DiseaseDistributions,
    ) -> Result<SimulationSetup, SimError> {
        params.validate()?;
        let population = mobility.population();
        distributions.validate(population.num_age_groups())?;
        if mobility.max_time() < params.max_time {
            return Err(format!(
                "the mobility trace ends at {} but the horizon is {}",
                mobility.max_time(),
                params.max_time
            )
            .into());
        }
        if params.total_seeds() > population.len() {
            return Err(format!(
                "{} initial seeds requested for a population of {}",
                params.total_seeds(),
                population.len()
            )
            .into());
        }
        for measure in &params.measures {
            if let Measure::SocialDistancingByAge { p_stay_home, .. } = measure {
                if p_stay_home.len() < population.num_age_groups() {
                    return Err(
                        "SocialDistancingByAge needs a probability for every age group".into()
                    );
                }
            }
        }
        let measures = MeasureList::new(params.measures.clone())?;
        Ok(SimulationSetup {
            mobility,
            params,
            distributions,
            measures,
        })
    }
}

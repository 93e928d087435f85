//! Sojourn-time distributions and severity parameters of the disease.
//!
//! The statistical form of every delay is chosen by the caller (`Delay`); this module only
//! samples them and rejects samples that cannot be used as a delay.

use std::fs;
use std::path::Path;

use rand::distr::Uniform;
use rand_distr::{Exp, Gamma, LogNormal};
use serde_derive::{Deserialize, Serialize};

use crate::error::SimError;
use crate::random::{RandomStreams, RngId};

/// A delay distribution in hours.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delay {
    Constant { value: f64 },
    Exponential { mean: f64 },
    /// Log-normal parameterized by the mean and standard deviation of the delay itself.
    LogNormal { mean: f64, sd: f64 },
    Gamma { shape: f64, scale: f64 },
    Uniform { low: f64, high: f64 },
}

impl Delay {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Delay::Constant { .. } => "constant",
            Delay::Exponential { .. } => "exponential",
            Delay::LogNormal { .. } => "log_normal",
            Delay::Gamma { .. } => "gamma",
            Delay::Uniform { .. } => "uniform",
        }
    }

    fn invalid(&self, message: impl std::fmt::Display) -> SimError {
        SimError::ConfigError(format!("invalid {} delay: {message}", self.name()))
    }

    /// Draws one delay from the stream `rng_id`.
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigError` if the parameters do not describe a distribution and
    /// `SimError::InvalidDistributionSample` if the draw is negative or not finite.
    pub fn sample<R: RngId>(&self, streams: &RandomStreams, rng_id: R) -> Result<f64, SimError> {
        let value = match *self {
            Delay::Constant { value } => value,
            Delay::Exponential { mean } => {
                let distr = Exp::new(1.0 / mean).map_err(|e| self.invalid(e))?;
                streams.sample_distr(rng_id, distr)
            }
            Delay::LogNormal { mean, sd } => {
                if mean <= 0.0 {
                    return Err(self.invalid("mean must be positive"));
                }
                let sigma2 = (1.0 + (sd * sd) / (mean * mean)).ln();
                let mu = mean.ln() - sigma2 / 2.0;
                let distr = LogNormal::new(mu, sigma2.sqrt()).map_err(|e| self.invalid(e))?;
                streams.sample_distr(rng_id, distr)
            }
            Delay::Gamma { shape, scale } => {
                let distr = Gamma::new(shape, scale).map_err(|e| self.invalid(e))?;
                streams.sample_distr(rng_id, distr)
            }
            Delay::Uniform { low, high } => {
                let distr = Uniform::new(low, high).map_err(|e| self.invalid(e))?;
                streams.sample_distr(rng_id, distr)
            }
        };
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(SimError::InvalidDistributionSample {
                distribution: self.name(),
                value,
            })
        }
    }

    /// The expected delay, used to sanity check parameters.
    #[must_use]
    pub fn mean(&self) -> f64 {
        match *self {
            Delay::Constant { value } => value,
            Delay::Exponential { mean } | Delay::LogNormal { mean, .. } => mean,
            Delay::Gamma { shape, scale } => shape * scale,
            Delay::Uniform { low, high } => (low + high) / 2.0,
        }
    }
}

/// Relative infectiousness of each infectious stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InfectiousnessWeights {
    pub presymptomatic: f64,
    pub symptomatic: f64,
    pub asymptomatic: f64,
}

impl Default for InfectiousnessWeights {
    fn default() -> Self {
        InfectiousnessWeights {
            presymptomatic: 1.0,
            symptomatic: 1.0,
            asymptomatic: 1.0,
        }
    }
}

/// Everything the progression needs to know about the course of the disease.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiseaseDistributions {
    pub incubation: Delay,
    pub presymptomatic: Delay,
    /// Symptom onset to recovery.
    pub symptomatic: Delay,
    /// Asymptomatic stage to recovery.
    pub asymptomatic: Delay,
    pub symptomatic_to_hospital: Delay,
    pub symptomatic_to_death: Delay,
    pub hospital_to_death: Delay,
    pub hospital_to_resistant: Delay,
    /// Probability that a presymptomatic case develops symptoms.
    pub alpha: f64,
    pub p_hospital_by_age: Vec<f64>,
    pub p_death_by_age: Vec<f64>,
    pub p_death_given_hospital_by_age: Vec<f64>,
    #[serde(default)]
    pub infectiousness: InfectiousnessWeights,
}

impl DiseaseDistributions {
    /// # Errors
    ///
    /// Returns `SimError::JsonError` if the string is not a valid parameter set.
    pub fn from_json_str(json: &str) -> Result<DiseaseDistributions, SimError> {
        Ok(serde_json::from_str(json)?)
    }

    /// # Errors
    ///
    /// Returns `SimError::IoError` or `SimError::JsonError` if the file cannot be loaded.
    pub fn from_json_file(path: &Path) -> Result<DiseaseDistributions, SimError> {
        DiseaseDistributions::from_json_str(&fs::read_to_string(path)?)
    }

    /// A course of disease where every delay is a constant number of hours and nobody is
    /// hospitalized or dies.
    #[must_use]
    pub fn constant(
        incubation: f64,
        presymptomatic: f64,
        infectious: f64,
        num_age_groups: usize,
    ) -> Self {
        let constant = |value| Delay::Constant { value };
        DiseaseDistributions {
            incubation: constant(incubation),
            presymptomatic: constant(presymptomatic),
            symptomatic: constant(infectious),
            asymptomatic: constant(infectious),
            symptomatic_to_hospital: constant(infectious),
            symptomatic_to_death: constant(infectious),
            hospital_to_death: constant(infectious),
            hospital_to_resistant: constant(infectious),
            alpha: 1.0,
            p_hospital_by_age: vec![0.0; num_age_groups],
            p_death_by_age: vec![0.0; num_age_groups],
            p_death_given_hospital_by_age: vec![0.0; num_age_groups],
            infectiousness: InfectiousnessWeights::default(),
        }
    }

    /// # Errors
    ///
    /// Returns `SimError::ConfigError` if a probability is outside `[0, 1]`, a per-age table
    /// does not cover `num_age_groups`, or a delay has a negative mean.
    pub fn validate(&self, num_age_groups: usize) -> Result<(), SimError> {
        let probability = |name: &str, p: f64| -> Result<(), SimError> {
            if (0.0..=1.0).contains(&p) {
                Ok(())
            } else {
                Err(format!("{name} must be a probability, got {p}").into())
            }
        };
        probability("alpha", self.alpha)?;
        for (name, table) in [
            ("p_hospital_by_age", &self.p_hospital_by_age),
            ("p_death_by_age", &self.p_death_by_age),
            ("p_death_given_hospital_by_age", &self.p_death_given_hospital_by_age),
        ] {
            if table.len() < num_age_groups {
                return Err(format!(
                    "{name} has {} entries but there are {num_age_groups} age groups",
                    table.len()
                )
                .into());
            }
            for p in table {
                probability(name, *p)?;
            }
        }
        for delay in [
            &self.incubation,
            &self.presymptomatic,
            &self.symptomatic,
            &self.asymptomatic,
            &self.symptomatic_to_hospital,
            &self.symptomatic_to_death,
            &self.hospital_to_death,
            &self.hospital_to_resistant,
        ] {
            if !(delay.mean() >= 0.0) {
                return Err(format!("{} delay has a negative mean", delay.name()).into());
            }
        }
        let weights = &self.infectiousness;
        if [weights.presymptomatic, weights.symptomatic, weights.asymptomatic]
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err("infectiousness weights must be non-negative".into());
        }
        Ok(())
    }
}

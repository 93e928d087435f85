use serde_derive::{Deserialize, Serialize};

use crate::disease::HealthRecord;
use crate::measures::TracingAction;
use crate::mobility::PersonId;
use crate::params::SeedState;

/// One administered test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub person: PersonId,
    pub administered_at: f64,
    pub reported_at: f64,
    pub positive: bool,
    pub from_tracing: bool,
}

/// Outcome counts of the tracing actions of one kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStats {
    pub traced: usize,
    /// Traced people who had been infected by the time the action was taken.
    pub infected: usize,
    pub not_infected: usize,
    /// Traced people infected by the index case that triggered the tracing.
    pub infected_by_index: usize,
}

/// Confusion counts of tracing candidates at one risk threshold. A candidate is flagged
/// when its exposure risk is at least the threshold, and is a positive when the index case
/// infected it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RocCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl RocCounts {
    fn record(&mut self, flagged: bool, positive: bool) {
        match (flagged, positive) {
            (true, true) => self.true_positives += 1,
            (true, false) => self.false_positives += 1,
            (false, false) => self.true_negatives += 1,
            (false, true) => self.false_negatives += 1,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingStats {
    pub isolate: ActionStats,
    pub test: ActionStats,
    /// One entry per `TestingParams::thresholds_roc` threshold, in the same order.
    pub roc: Vec<RocCounts>,
}

impl TracingStats {
    #[must_use]
    pub fn with_roc_thresholds(num_thresholds: usize) -> TracingStats {
        TracingStats {
            roc: vec![RocCounts::default(); num_thresholds],
            ..TracingStats::default()
        }
    }

    #[must_use]
    pub fn get(&self, action: TracingAction) -> &ActionStats {
        match action {
            TracingAction::Isolate => &self.isolate,
            TracingAction::Test => &self.test,
        }
    }

    pub(crate) fn record(&mut self, action: TracingAction, infected: bool, by_index: bool) {
        let stats = match action {
            TracingAction::Isolate => &mut self.isolate,
            TracingAction::Test => &mut self.test,
        };
        stats.traced += 1;
        if infected {
            stats.infected += 1;
        } else {
            stats.not_infected += 1;
        }
        if by_index {
            stats.infected_by_index += 1;
        }
    }

    /// Classifies one candidate of risk `risk` against every threshold.
    pub(crate) fn record_roc(&mut self, thresholds: &[f64], risk: f64, infected_by_index: bool) {
        for (counts, threshold) in self.roc.iter_mut().zip(thresholds) {
            counts.record(risk >= *threshold, infected_by_index);
        }
    }
}

/// Counters describing what happened during one rollout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutStats {
    pub events_processed: usize,
    /// Contacts of infectious people examined for transmission.
    pub contacts_considered: usize,
    /// Contacts (or household exposures) removed by a distancing or isolation measure.
    pub contacts_suppressed: usize,
    pub exposure_attempts: usize,
    pub exposures_by_contact: usize,
    pub exposures_by_household: usize,
    pub exposures_by_background: usize,
    /// Exposures that found their target no longer susceptible.
    pub stale_exposures: usize,
}

/// Everything one rollout produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RolloutRecord {
    pub rollout: usize,
    pub seed: u64,
    pub health: Vec<HealthRecord>,
    pub infected_by: Vec<Option<PersonId>>,
    pub seeds: Vec<(PersonId, SeedState)>,
    pub test_log: Vec<TestRecord>,
    pub tracing_stats: TracingStats,
    pub stats: RolloutStats,
}

impl RolloutRecord {
    /// Serialized form of the per-person results, for bit-for-bit comparisons.
    ///
    /// # Errors
    ///
    /// Returns `SimError::EncodeError` if the record cannot be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>, crate::error::SimError> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }
}

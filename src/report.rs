//! CSV exports of a `Summary`.
use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::Path;

use csv::Writer;
use serde_derive::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::disease::DiseaseState;
use crate::error::SimError;
use crate::summary::Summary;

/// One state one person entered in one rollout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateTimingRow {
    pub rollout: usize,
    pub person: usize,
    pub age_group: usize,
    pub household: usize,
    pub state: String,
    pub started_at: f64,
    /// Empty while the state is still active at the end of the run.
    pub ended_at: Option<f64>,
}

/// Per-rollout counters, one row per rollout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RolloutStatsRow {
    pub rollout: usize,
    pub events_processed: usize,
    pub contacts_considered: usize,
    pub contacts_suppressed: usize,
    pub exposure_attempts: usize,
    pub exposures_by_contact: usize,
    pub exposures_by_household: usize,
    pub exposures_by_background: usize,
    pub stale_exposures: usize,
    pub tests_administered: usize,
    pub isolated_by_tracing: usize,
    pub tested_by_tracing: usize,
}

/// Tracing ROC counts of one rollout at one threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RocRow {
    pub rollout: usize,
    pub threshold: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

// Checks that the path is valid. Creates all parent directories if they do not exist.
fn generate_validate_filepath(path: &Path) -> Result<File, SimError> {
    match path.extension().and_then(OsStr::to_str) {
        Some("csv") => {
            let parent = path
                .parent()
                .ok_or_else(|| {
                SimError::ConfigError(format!("{} has no parent directory", path.display()))
            })?;
            create_dir_all(parent)?;
            Ok(File::create(path)?)
        }
        _ => Err(SimError::ConfigError(
            "Report output files must be CSVs".to_string(),
        )),
    }
}

/// Writes every started state of every person in every rollout to `path`.
///
/// # Errors
///
/// Returns `SimError::ConfigError` if `path` is not a `.csv` file and `SimError::IoError`
/// or `SimError::CSVError` if writing fails.
pub fn write_state_timings(summary: &Summary, path: &Path) -> Result<(), SimError> {
    let mut writer = Writer::from_writer(generate_validate_filepath(path)?);
    for rollout in 0..summary.num_rollouts() {
        for person in 0..summary.num_people {
            for state in DiseaseState::iter() {
                let started_at = summary.state_started_at[state.index()][rollout][person];
                if !started_at.is_finite() {
                    continue;
                }
                let ended_at = summary.state_ended_at[state.index()][rollout][person];
                writer.serialize(StateTimingRow {
                    rollout,
                    person,
                    age_group: summary.people_age[person],
                    household: summary.people_household[person],
                    state: state.to_string(),
                    started_at,
                    ended_at: ended_at.is_finite().then_some(ended_at),
                })?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

/// # Errors
///
/// Same as `write_state_timings`.
pub fn write_rollout_stats(summary: &Summary, path: &Path) -> Result<(), SimError> {
    let mut writer = Writer::from_writer(generate_validate_filepath(path)?);
    for (rollout, stats) in summary.run_stats.iter().enumerate() {
        let tracing = &summary.tracing_stats[rollout];
        writer.serialize(RolloutStatsRow {
            rollout,
            events_processed: stats.events_processed,
            contacts_considered: stats.contacts_considered,
            contacts_suppressed: stats.contacts_suppressed,
            exposure_attempts: stats.exposure_attempts,
            exposures_by_contact: stats.exposures_by_contact,
            exposures_by_household: stats.exposures_by_household,
            exposures_by_background: stats.exposures_by_background,
            stale_exposures: stats.stale_exposures,
            tests_administered: summary.tests_administered[rollout],
            isolated_by_tracing: tracing.isolate.traced,
            tested_by_tracing: tracing.test.traced,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// One row per rollout and `thresholds_roc` entry.
///
/// # Errors
///
/// Same as `write_state_timings`.
pub fn write_tracing_roc(summary: &Summary, path: &Path) -> Result<(), SimError> {
    let mut writer = Writer::from_writer(generate_validate_filepath(path)?);
    for (rollout, stats) in summary.tracing_stats.iter().enumerate() {
        for (threshold, counts) in summary.thresholds_roc.iter().zip(&stats.roc) {
            writer.serialize(RocRow {
                rollout,
                threshold: *threshold,
                true_positives: counts.true_positives,
                false_positives: counts.false_positives,
                true_negatives: counts.true_negatives,
                false_negatives: counts.false_negatives,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

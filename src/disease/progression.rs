//! The course of disease of one infected person, sampled up front.

use serde_derive::{Deserialize, Serialize};

use crate::define_rng;
use crate::disease::{DiseaseDistributions, DiseaseState};
use crate::error::SimError;
use crate::random::RandomStreams;

define_rng!(ProgressionRng);

/// A stretch of time during which a person transmits with a constant relative weight.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InfectiousSegment {
    pub start: f64,
    pub end: f64,
    pub weight: f64,
}

/// The primary states a person will pass through from `start_state` on, with the time each
/// one is entered, plus the hospital admission if there is one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressionPlan {
    start_state: DiseaseState,
    start_time: f64,
    steps: Vec<(f64, DiseaseState)>,
    hospitalized_at: Option<f64>,
}

impl ProgressionPlan {
    /// Samples the rest of the course of disease of someone entering `start_state` (one of
    /// `expo`, `ipre`, `isym`, `iasy`) at time `t`.
    ///
    /// # Errors
    ///
    /// Returns `SimError::InvalidDistributionSample` if a delay draw is unusable and
    /// `SimError::ConfigError` for any other start state.
    pub fn sample(
        start_state: DiseaseState,
        t: f64,
        age_group: usize,
        dists: &DiseaseDistributions,
        streams: &RandomStreams,
    ) -> Result<ProgressionPlan, SimError> {
        let mut plan = ProgressionPlan {
            start_state,
            start_time: t,
            steps: Vec::new(),
            hospitalized_at: None,
        };
        let mut now = t;
        let mut state = start_state;
        if state == DiseaseState::Expo {
            now += dists.incubation.sample(streams, ProgressionRng)?;
            state = DiseaseState::Ipre;
            plan.steps.push((now, state));
        }
        if state == DiseaseState::Ipre {
            let symptomatic = streams.sample_bool(ProgressionRng, dists.alpha);
            now += dists.presymptomatic.sample(streams, ProgressionRng)?;
            state = if symptomatic {
                DiseaseState::Isym
            } else {
                DiseaseState::Iasy
            };
            plan.steps.push((now, state));
        }
        match state {
            DiseaseState::Isym => {
                let p_hospital = dists.p_hospital_by_age.get(age_group).copied().unwrap_or(0.0);
                if streams.sample_bool(ProgressionRng, p_hospital) {
                    let admitted =
                        now + dists.symptomatic_to_hospital.sample(streams, ProgressionRng)?;
                    plan.hospitalized_at = Some(admitted);
                    let p_death = dists
                        .p_death_given_hospital_by_age
                        .get(age_group)
                        .copied()
                        .unwrap_or(0.0);
                    let (delay, outcome) = if streams.sample_bool(ProgressionRng, p_death) {
                        (&dists.hospital_to_death, DiseaseState::Dead)
                    } else {
                        (&dists.hospital_to_resistant, DiseaseState::Resi)
                    };
                    plan.steps
                        .push((admitted + delay.sample(streams, ProgressionRng)?, outcome));
                } else {
                    let p_death = dists.p_death_by_age.get(age_group).copied().unwrap_or(0.0);
                    let (delay, outcome) = if streams.sample_bool(ProgressionRng, p_death) {
                        (&dists.symptomatic_to_death, DiseaseState::Dead)
                    } else {
                        (&dists.symptomatic, DiseaseState::Resi)
                    };
                    plan.steps
                        .push((now + delay.sample(streams, ProgressionRng)?, outcome));
                }
            }
            DiseaseState::Iasy => {
                plan.steps.push((
                    now + dists.asymptomatic.sample(streams, ProgressionRng)?,
                    DiseaseState::Resi,
                ));
            }
            other => {
                return Err(format!("a course of disease cannot start in state {other}").into());
            }
        }
        Ok(plan)
    }

    #[must_use]
    pub fn start_state(&self) -> DiseaseState {
        self.start_state
    }

    /// The transition that follows entering `state`, as `(time, next_state)`.
    #[must_use]
    pub fn next_after(&self, state: DiseaseState) -> Option<(f64, DiseaseState)> {
        if state == self.start_state {
            return self.steps.first().copied();
        }
        let position = self.steps.iter().position(|(_, s)| *s == state)?;
        self.steps.get(position + 1).copied()
    }

    /// The time `state` is entered under this plan.
    #[must_use]
    pub fn entered_at(&self, state: DiseaseState) -> Option<f64> {
        if state == self.start_state {
            return Some(self.start_time);
        }
        self.steps
            .iter()
            .find(|(_, s)| *s == state)
            .map(|(t, _)| *t)
    }

    #[must_use]
    pub fn hospitalized_at(&self) -> Option<f64> {
        self.hospitalized_at
    }

    #[must_use]
    pub fn is_symptomatic(&self) -> bool {
        self.entered_at(DiseaseState::Isym).is_some()
    }

    /// The infectious stretches of this plan with the weight of each stage. Nobody
    /// transmits once admitted to hospital.
    #[must_use]
    pub fn infectious_segments(&self, dists: &DiseaseDistributions) -> Vec<InfectiousSegment> {
        let weights = &dists.infectiousness;
        let cutoff = self.hospitalized_at.unwrap_or(f64::INFINITY);
        let mut segments = Vec::new();
        for (state, weight) in [
            (DiseaseState::Ipre, weights.presymptomatic),
            (DiseaseState::Isym, weights.symptomatic),
            (DiseaseState::Iasy, weights.asymptomatic),
        ] {
            let Some(start) = self.entered_at(state) else {
                continue;
            };
            let end = self
                .next_after(state)
                .map_or(f64::INFINITY, |(t, _)| t)
                .min(cutoff);
            if end > start {
                segments.push(InfectiousSegment { start, end, weight });
            }
        }
        segments
    }

    /// The first and last instant this plan transmits, or `None` if it never does.
    #[must_use]
    pub fn infectious_period(&self, dists: &DiseaseDistributions) -> Option<(f64, f64)> {
        let segments = self.infectious_segments(dists);
        Some((segments.first()?.start, segments.last()?.end))
    }
}

/// Draws the time of the first event of a Poisson process whose rate is `scale * weight`
/// on each segment, restricted to `[from, to)`. `unit_draw` is a standard exponential
/// variate, so one draw decides both whether and when the event happens.
#[must_use]
pub fn first_event_time(
    segments: &[InfectiousSegment],
    from: f64,
    to: f64,
    scale: f64,
    unit_draw: f64,
) -> Option<f64> {
    let mut remaining = unit_draw;
    for segment in segments {
        let start = segment.start.max(from);
        let end = segment.end.min(to);
        let rate = scale * segment.weight;
        if end <= start || rate <= 0.0 {
            continue;
        }
        let hazard = rate * (end - start);
        if hazard >= remaining {
            return Some(start + remaining / rate);
        }
        remaining -= hazard;
    }
    None
}

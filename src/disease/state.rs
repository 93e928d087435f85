use serde_derive::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter};

/// The health states tracked for every person. The serialized names are the short names
/// used by downstream consumers of the summary.
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
    EnumCount,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DiseaseState {
    Susc,
    Expo,
    Ipre,
    Isym,
    Iasy,
    Posi,
    Nega,
    Resi,
    Dead,
    Hosp,
}

impl DiseaseState {
    /// Primary states are mutually exclusive; exactly one is active at any time.
    #[must_use]
    pub fn is_primary(self) -> bool {
        !matches!(
            self,
            DiseaseState::Posi | DiseaseState::Nega | DiseaseState::Hosp
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, DiseaseState::Resi | DiseaseState::Dead)
    }

    #[must_use]
    pub fn is_infectious(self) -> bool {
        matches!(
            self,
            DiseaseState::Ipre | DiseaseState::Isym | DiseaseState::Iasy
        )
    }

    /// Carrying the pathogen, which is what a test detects.
    #[must_use]
    pub fn is_infected(self) -> bool {
        self == DiseaseState::Expo || self.is_infectious()
    }

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// When each state started and ended for one person, `f64::INFINITY` until it happens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    started_at: [f64; DiseaseState::COUNT],
    ended_at: [f64; DiseaseState::COUNT],
    primary: DiseaseState,
}

impl Default for HealthRecord {
    fn default() -> Self {
        HealthRecord::new()
    }
}

impl HealthRecord {
    /// A record for someone susceptible from t=0.
    #[must_use]
    pub fn new() -> HealthRecord {
        let mut record = HealthRecord {
            started_at: [f64::INFINITY; DiseaseState::COUNT],
            ended_at: [f64::INFINITY; DiseaseState::COUNT],
            primary: DiseaseState::Susc,
        };
        record.started_at[DiseaseState::Susc.index()] = 0.0;
        record
    }

    #[must_use]
    pub fn primary(&self) -> DiseaseState {
        self.primary
    }

    #[must_use]
    pub fn started_at(&self, state: DiseaseState) -> f64 {
        self.started_at[state.index()]
    }

    #[must_use]
    pub fn ended_at(&self, state: DiseaseState) -> f64 {
        self.ended_at[state.index()]
    }

    #[must_use]
    pub fn has_started(&self, state: DiseaseState) -> bool {
        self.started_at(state).is_finite()
    }

    /// Started at or before `t` and not yet ended at `t`.
    #[must_use]
    pub fn is_active(&self, state: DiseaseState, t: f64) -> bool {
        self.started_at(state) <= t && t < self.ended_at(state)
    }

    /// Leaves the current primary state and enters `to` at time `t`. Reaching a terminal
    /// state also ends a hospital stay.
    pub fn move_to(&mut self, to: DiseaseState, t: f64) {
        self.ended_at[self.primary.index()] = t;
        self.started_at[to.index()] = t;
        self.primary = to;
        if to.is_terminal() && self.is_active(DiseaseState::Hosp, t) {
            self.ended_at[DiseaseState::Hosp.index()] = t;
        }
    }

    /// Opens a side channel (`posi`, `nega`, `hosp`). A channel that already started is
    /// left alone since they never reopen.
    pub fn start_side(&mut self, state: DiseaseState, t: f64) {
        if !self.has_started(state) {
            self.started_at[state.index()] = t;
        }
    }

    pub fn end_side(&mut self, state: DiseaseState, t: f64) {
        if self.is_active(state, t) {
            self.ended_at[state.index()] = t;
        }
    }
}

//! The per-person disease state machine: states, delay distributions and the sampled course
//! of disease. Exposure between people lives in `crate::rollout::exposure`.

mod distributions;
mod progression;
mod state;

pub use distributions::{Delay, DiseaseDistributions, InfectiousnessWeights};
pub use progression::{first_event_time, InfectiousSegment, ProgressionPlan};
pub use state::{DiseaseState, HealthRecord};

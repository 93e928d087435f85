//! A discrete-event engine for mobility-driven epidemic rollouts
//!
//! Episim simulates the spread of a disease through a synthetic population whose
//! movements between sites (schools, offices, supermarkets, bus stops, social venues)
//! come from a mobility trace. Each *rollout* is one stochastic replica of the epidemic:
//! a single-threaded event loop over exposures, disease transitions, tests and contact
//! tracing actions, all drawn from random streams seeded from the rollout index, so a
//! rollout always replays exactly.
//!
//! A run is assembled from three inputs:
//! * A `MobilityConfig`, from which `MobilitySimulator` generates the visit trace and
//!   answers contact queries.
//! * The `SimulationParams` of the scenario: transmission rates, initial seeds, testing
//!   and tracing parameters and the list of `Measure`s in force.
//! * The `DiseaseDistributions` of the course of disease.
//!
//! `SimulationSetup::new` validates them together and
//! `orchestrator::launch_parallel_rollouts` runs the rollouts on a pool of threads and
//! merges them into a `Summary`, which can be stored as a blob or exported as CSV with
//! the `report` module.
pub mod disease;
pub mod error;
pub mod hashing;
pub mod log;
pub mod measures;
pub mod mobility;
pub mod orchestrator;
pub mod params;
pub mod plan;
pub mod random;
pub mod report;
pub mod rollout;
pub mod summary;

pub use disease::{DiseaseDistributions, DiseaseState, HealthRecord};
pub use error::SimError;
pub use measures::{Interval, Measure, MeasureList, TracingAction, TracingRule};
pub use mobility::{
    ContactMode, MobilityConfig, MobilityProvider, MobilitySimulator, PersonId, SiteType,
};
pub use orchestrator::{launch_parallel_rollouts, CancellationToken};
pub use params::{SeedState, SimulationParams, SimulationSetup, TestingParams};
pub use rollout::{Rollout, RolloutRecord};
pub use summary::Summary;

// Re-exported for the `define_rng!` macro.
pub use paste;
pub use rand;

/// Hours per day. Times are hours throughout.
pub const TO_HOURS: f64 = 24.0;

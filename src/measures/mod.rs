//! Time-windowed interventions.
//!
//! A `Measure` is plain data; its behavior is given by three queries that every variant
//! answers: whether it applies to a person at a time, how it changes a contact, and how it
//! changes the testing and tracing side of the state machine. Outside its `t_window` every
//! measure is a no-op.
//!
//! Measures of the same kind compose as follows:
//! * distancing measures stack: each one draws its own Bernoulli, any success suppresses;
//! * beta multipliers multiply;
//! * `TestingCapacity` measures, and `TracingPolicy` measures for the same action, are
//!   mutually exclusive. `MeasureList::new` sorts them by descending `priority`, registration
//!   order breaking ties in favour of the later measure, and the first active one wins.

mod budget;
mod interval;
mod state;

pub use budget::DailyBudget;
pub use interval::Interval;
pub use state::MeasureState;

use serde_derive::{Deserialize, Serialize};

use crate::error::SimError;
use crate::hashing::HashMap;
use crate::mobility::SiteType;

/// What a tracing policy does to a selected contact.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracingAction {
    Isolate,
    Test,
}

/// How traced contacts are selected for an action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TracingRule {
    /// Every traced contact.
    Basic,
    /// Contacts whose exposure risk is at least `threshold`.
    AdvancedThreshold { threshold: f64 },
    /// The riskiest contacts, at most `per_day` in any 24 hour window.
    AdvancedGlobalBudget { per_day: usize },
    /// The riskiest contacts, with a daily budget per contact category.
    AdvancedPerCategoryBudget { per_day: HashMap<SiteType, usize> },
}

/// The state of a person that measures condition on.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PersonStatus {
    pub age_group: usize,
    /// Has a positive test result at the time of the query.
    pub positive: bool,
    /// Isolated by contact tracing at the time of the query.
    pub isolated: bool,
}

/// The effect of a measure on one contact.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ContactModifier {
    /// The person stays home instead of making the visit, with probability `p`.
    StayHome { p: f64 },
    /// The person isolates from the household, with probability `p`.
    Isolate { p: f64 },
    /// The transmission rate is multiplied by this factor.
    BetaMultiplier(f64),
}

/// The effect of a measure on testing and tracing.
#[derive(Clone, Debug, PartialEq)]
pub enum TransitionModifier {
    TestingCapacity { tests_per_day: usize },
    Tracing { action: TracingAction, rule: TracingRule },
    Compliance { p_compliance: f64 },
    ManualTracing { p_participate: f64, p_recall: f64, delta_manual_tracing: f64 },
    ManualReachability { p_reachable: f64 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Measure {
    BetaMultiplierByType {
        t_window: Interval,
        beta_multiplier: HashMap<SiteType, f64>,
    },
    /// A beta multiplier that holds for the whole run.
    APrioriBetaMultiplierByType {
        beta_multiplier: HashMap<SiteType, f64>,
    },
    SocialDistancingForAll {
        t_window: Interval,
        p_stay_home: f64,
    },
    SocialDistancingByAge {
        t_window: Interval,
        p_stay_home: Vec<f64>,
    },
    /// Mobility reduction per site type. Site types without an entry are unaffected.
    SocialDistancingBySiteTypeForAll {
        t_window: Interval,
        p_stay_home: HashMap<SiteType, f64>,
    },
    SocialDistancingForPositive {
        t_window: Interval,
        p_stay_home: f64,
    },
    SocialDistancingForPositiveHousehold {
        t_window: Interval,
        p_isolate: f64,
    },
    SocialDistancingForSmartTracing {
        t_window: Interval,
        p_stay_home: f64,
    },
    SocialDistancingForSmartTracingHousehold {
        t_window: Interval,
        p_isolate: f64,
    },
    ComplianceForAll {
        t_window: Interval,
        p_compliance: f64,
    },
    ManualTracingForAll {
        t_window: Interval,
        p_participate: f64,
        p_recall: f64,
        delta_manual_tracing: f64,
    },
    ManualTracingReachabilityForAll {
        t_window: Interval,
        p_reachable: f64,
    },
    TestingCapacity {
        t_window: Interval,
        tests_per_day: usize,
        #[serde(default)]
        priority: i32,
    },
    TracingPolicy {
        t_window: Interval,
        action: TracingAction,
        rule: TracingRule,
        #[serde(default)]
        priority: i32,
    },
}

impl Measure {
    #[must_use]
    pub fn t_window(&self) -> Interval {
        match self {
            Measure::APrioriBetaMultiplierByType { .. } => {
                Interval::new(f64::NEG_INFINITY, f64::INFINITY)
            }
            Measure::BetaMultiplierByType { t_window, .. }
            | Measure::SocialDistancingForAll { t_window, .. }
            | Measure::SocialDistancingByAge { t_window, .. }
            | Measure::SocialDistancingBySiteTypeForAll { t_window, .. }
            | Measure::SocialDistancingForPositive { t_window, .. }
            | Measure::SocialDistancingForPositiveHousehold { t_window, .. }
            | Measure::SocialDistancingForSmartTracing { t_window, .. }
            | Measure::SocialDistancingForSmartTracingHousehold { t_window, .. }
            | Measure::ComplianceForAll { t_window, .. }
            | Measure::ManualTracingForAll { t_window, .. }
            | Measure::ManualTracingReachabilityForAll { t_window, .. }
            | Measure::TestingCapacity { t_window, .. }
            | Measure::TracingPolicy { t_window, .. } => *t_window,
        }
    }

    #[must_use]
    pub fn is_active(&self, t: f64) -> bool {
        self.t_window().contains(t)
    }

    /// Whether this measure concerns `person` at time `t`.
    #[must_use]
    pub fn applies_to(&self, person: &PersonStatus, t: f64) -> bool {
        if !self.is_active(t) {
            return false;
        }
        match self {
            Measure::SocialDistancingForPositive { .. }
            | Measure::SocialDistancingForPositiveHousehold { .. } => person.positive,
            Measure::SocialDistancingForSmartTracing { .. }
            | Measure::SocialDistancingForSmartTracingHousehold { .. } => person.isolated,
            _ => true,
        }
    }

    /// How this measure changes a contact of category `site_type` made by `person` at `t`.
    #[must_use]
    pub fn modifies_contact(
        &self,
        person: &PersonStatus,
        site_type: SiteType,
        t: f64,
    ) -> Option<ContactModifier> {
        if !self.applies_to(person, t) {
            return None;
        }
        let outside = site_type.is_outside();
        match self {
            Measure::BetaMultiplierByType {
                beta_multiplier, ..
            }
            | Measure::APrioriBetaMultiplierByType { beta_multiplier } if outside => {
                let m = beta_multiplier.get(&site_type).copied().unwrap_or(1.0);
                Some(ContactModifier::BetaMultiplier(m))
            }
            Measure::SocialDistancingForAll { p_stay_home, .. }
            | Measure::SocialDistancingForPositive { p_stay_home, .. }
            | Measure::SocialDistancingForSmartTracing { p_stay_home, .. }
                if outside =>
            {
                Some(ContactModifier::StayHome { p: *p_stay_home })
            }
            Measure::SocialDistancingByAge { p_stay_home, .. } if outside => {
                Some(ContactModifier::StayHome {
                    p: p_stay_home.get(person.age_group).copied().unwrap_or(0.0),
                })
            }
            Measure::SocialDistancingBySiteTypeForAll { p_stay_home, .. } if outside => {
                p_stay_home.get(&site_type).map(|p| ContactModifier::StayHome { p: *p })
            }
            Measure::SocialDistancingForPositiveHousehold { p_isolate, .. }
            | Measure::SocialDistancingForSmartTracingHousehold { p_isolate, .. }
                if !outside =>
            {
                Some(ContactModifier::Isolate { p: *p_isolate })
            }
            _ => None,
        }
    }

    /// How this measure changes testing and tracing at time `t`.
    #[must_use]
    pub fn modifies_transition(&self, t: f64) -> Option<TransitionModifier> {
        if !self.is_active(t) {
            return None;
        }
        match self {
            Measure::TestingCapacity { tests_per_day, .. } => {
                Some(TransitionModifier::TestingCapacity {
                    tests_per_day: *tests_per_day,
                })
            }
            Measure::TracingPolicy { action, rule, .. } => Some(TransitionModifier::Tracing {
                action: *action,
                rule: rule.clone(),
            }),
            Measure::ComplianceForAll { p_compliance, .. } => {
                Some(TransitionModifier::Compliance {
                    p_compliance: *p_compliance,
                })
            }
            Measure::ManualTracingForAll {
                p_participate,
                p_recall,
                delta_manual_tracing,
                ..
            } => Some(TransitionModifier::ManualTracing {
                p_participate: *p_participate,
                p_recall: *p_recall,
                delta_manual_tracing: *delta_manual_tracing,
            }),
            Measure::ManualTracingReachabilityForAll { p_reachable, .. } => {
                Some(TransitionModifier::ManualReachability {
                    p_reachable: *p_reachable,
                })
            }
            _ => None,
        }
    }

    fn priority(&self) -> i32 {
        match self {
            Measure::TestingCapacity { priority, .. }
            | Measure::TracingPolicy { priority, .. } => *priority,
            _ => 0,
        }
    }

    /// # Errors
    ///
    /// Returns `SimError::ConfigError` if a probability is outside `[0, 1]` or a
    /// multiplier, threshold or delay is negative.
    pub fn validate(&self) -> Result<(), SimError> {
        let probability = |p: f64| (0.0..=1.0).contains(&p);
        let ok = match self {
            Measure::BetaMultiplierByType { beta_multiplier, .. }
            | Measure::APrioriBetaMultiplierByType { beta_multiplier } => {
                beta_multiplier.values().all(|m| m.is_finite() && *m >= 0.0)
            }
            Measure::SocialDistancingForAll { p_stay_home, .. }
            | Measure::SocialDistancingForPositive { p_stay_home, .. }
            | Measure::SocialDistancingForSmartTracing { p_stay_home, .. } => {
                probability(*p_stay_home)
            }
            Measure::SocialDistancingByAge { p_stay_home, .. } => {
                p_stay_home.iter().all(|p| probability(*p))
            }
            Measure::SocialDistancingBySiteTypeForAll { p_stay_home, .. } => {
                p_stay_home.values().all(|p| probability(*p))
            }
            Measure::SocialDistancingForPositiveHousehold { p_isolate, .. }
            | Measure::SocialDistancingForSmartTracingHousehold { p_isolate, .. } => {
                probability(*p_isolate)
            }
            Measure::ComplianceForAll { p_compliance, .. } => probability(*p_compliance),
            Measure::ManualTracingForAll {
                p_participate,
                p_recall,
                delta_manual_tracing,
                ..
            } => {
                probability(*p_participate)
                    && probability(*p_recall)
                    && *delta_manual_tracing >= 0.0
            }
            Measure::ManualTracingReachabilityForAll { p_reachable, .. } => {
                probability(*p_reachable)
            }
            Measure::TestingCapacity { .. } => true,
            Measure::TracingPolicy { rule, .. } => match rule {
                TracingRule::AdvancedThreshold { threshold } => *threshold >= 0.0,
                _ => true,
            },
        };
        if ok {
            Ok(())
        } else {
            Err(format!("invalid parameters in measure {self:?}").into())
        }
    }
}

/// Index of a measure in its `MeasureList`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeasureId(pub usize);

/// The immutable measures of a run, with the precedence order of the mutually exclusive ones
/// fixed at construction.
#[derive(Clone, Debug, Default)]
pub struct MeasureList {
    measures: Vec<Measure>,
    testing_precedence: Vec<MeasureId>,
    isolate_precedence: Vec<MeasureId>,
    test_precedence: Vec<MeasureId>,
}

impl MeasureList {
    /// # Errors
    ///
    /// Returns `SimError::ConfigError` if any measure has invalid parameters.
    pub fn new(measures: Vec<Measure>) -> Result<MeasureList, SimError> {
        for measure in &measures {
            measure.validate()?;
        }
        let precedence = |selected: &dyn Fn(&Measure) -> bool| {
            let mut ids: Vec<MeasureId> = (0..measures.len())
                .filter(|i| selected(&measures[*i]))
                .map(MeasureId)
                .collect();
            // Highest priority first, then the measure registered last.
            ids.sort_by(|a, b| {
                measures[b.0]
                    .priority()
                    .cmp(&measures[a.0].priority())
                    .then(b.cmp(a))
            });
            ids
        };
        let testing_precedence = precedence(&|m| matches!(m, Measure::TestingCapacity { .. }));
        let isolate_precedence = precedence(&|m| {
            matches!(m, Measure::TracingPolicy { action: TracingAction::Isolate, .. })
        });
        let test_precedence = precedence(&|m| {
            matches!(m, Measure::TracingPolicy { action: TracingAction::Test, .. })
        });
        Ok(MeasureList {
            measures,
            testing_precedence,
            isolate_precedence,
            test_precedence,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.measures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: MeasureId) -> &Measure {
        &self.measures[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (MeasureId, &Measure)> {
        self.measures
            .iter()
            .enumerate()
            .map(|(i, measure)| (MeasureId(i), measure))
    }

    /// Every contact modifier that applies to `person` for a contact at `t`.
    pub fn contact_modifiers<'a>(
        &'a self,
        person: &'a PersonStatus,
        site_type: SiteType,
        t: f64,
    ) -> impl Iterator<Item = (MeasureId, ContactModifier)> + 'a {
        self.iter().filter_map(move |(id, measure)| {
            Some((id, measure.modifies_contact(person, site_type, t)?))
        })
    }

    /// The product of every active beta multiplier for contacts of `site_type` at `t`.
    #[must_use]
    pub fn beta_multiplier(&self, site_type: SiteType, t: f64) -> f64 {
        let anyone = PersonStatus::default();
        self.contact_modifiers(&anyone, site_type, t)
            .filter_map(|(_, modifier)| match modifier {
                ContactModifier::BetaMultiplier(m) => Some(m),
                _ => None,
            })
            .product()
    }

    /// The winning `TestingCapacity` measure at `t` and its daily budget.
    #[must_use]
    pub fn testing_capacity(&self, t: f64) -> Option<(MeasureId, usize)> {
        self.testing_precedence.iter().find_map(|id| {
            match self.get(*id).modifies_transition(t)? {
                TransitionModifier::TestingCapacity { tests_per_day } => Some((*id, tests_per_day)),
                _ => None,
            }
        })
    }

    /// The winning `TracingPolicy` for `action` at `t`.
    #[must_use]
    pub fn tracing_policy(
        &self,
        action: TracingAction,
        t: f64,
    ) -> Option<(MeasureId, TracingRule)> {
        let precedence = match action {
            TracingAction::Isolate => &self.isolate_precedence,
            TracingAction::Test => &self.test_precedence,
        };
        precedence.iter().find_map(|id| {
            match self.get(*id).modifies_transition(t)? {
                TransitionModifier::Tracing { rule, .. } => Some((*id, rule)),
                _ => None,
            }
        })
    }

    /// The first active measure at `t` whose transition modifier `select` accepts.
    pub fn first_transition_modifier<T>(
        &self,
        t: f64,
        select: impl Fn(TransitionModifier) -> Option<T>,
    ) -> Option<(MeasureId, T)> {
        self.iter()
            .find_map(|(id, measure)| Some((id, select(measure.modifies_transition(t)?)?)))
    }
}

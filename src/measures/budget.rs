use std::collections::VecDeque;

use crate::TO_HOURS;

/// A budget of `per_day` uses in any sliding 24 hour window.
///
/// A use at time `s` stops counting against the budget once the clock reaches `s + 24`, so
/// no half-open window `[a, a + 24)` ever holds more than `per_day` uses.
#[derive(Clone, Debug)]
pub struct DailyBudget {
    per_day: usize,
    used_at: VecDeque<f64>,
}

impl DailyBudget {
    #[must_use]
    pub fn new(per_day: usize) -> DailyBudget {
        DailyBudget {
            per_day,
            used_at: VecDeque::with_capacity(per_day),
        }
    }

    fn expire(&mut self, t: f64) {
        while let Some(first) = self.used_at.front() {
            if *first <= t - TO_HOURS {
                self.used_at.pop_front();
            } else {
                break;
            }
        }
    }

    #[must_use]
    pub fn per_day(&self) -> usize {
        self.per_day
    }

    /// How many uses are left at time `t`.
    pub fn remaining(&mut self, t: f64) -> usize {
        self.expire(t);
        self.per_day.saturating_sub(self.used_at.len())
    }

    /// Uses one unit at time `t` if any is left. Times must not decrease between calls.
    pub fn try_consume(&mut self, t: f64) -> bool {
        if self.remaining(t) == 0 {
            return false;
        }
        self.used_at.push_back(t);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::DailyBudget;

    #[test]
    fn budget_slides_with_time() {
        let mut budget = DailyBudget::new(2);
        assert!(budget.try_consume(0.0));
        assert!(budget.try_consume(10.0));
        assert!(!budget.try_consume(23.9));
        // The use at t=0 expires at t=24.
        assert!(budget.try_consume(24.0));
        assert!(!budget.try_consume(30.0));
        assert_eq!(budget.remaining(34.0), 1);
        assert_eq!(budget.remaining(48.0), 2);
    }

    #[test]
    fn zero_budget_never_allows() {
        let mut budget = DailyBudget::new(0);
        assert!(!budget.try_consume(0.0));
        assert!(!budget.try_consume(1000.0));
    }
}

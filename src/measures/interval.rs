use serde_derive::{Deserialize, Serialize};

/// A half-open time window `[start, end)` in hours.
///
/// Serialized as a two element array, e.g. `"t_window": [0.0, 240.0]`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    #[must_use]
    pub fn new(start: f64, end: f64) -> Interval {
        Interval { start, end }
    }

    /// The window that contains every time from 0 on.
    #[must_use]
    pub fn from_zero() -> Interval {
        Interval::new(0.0, f64::INFINITY)
    }

    #[must_use]
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    #[must_use]
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The common part of both windows, or `None` if they do not overlap.
    #[must_use]
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let common = Interval::new(self.start.max(other.start), self.end.min(other.end));
        (!common.is_empty()).then_some(common)
    }
}

impl From<(f64, f64)> for Interval {
    fn from((start, end): (f64, f64)) -> Self {
        Interval { start, end }
    }
}

impl From<Interval> for (f64, f64) {
    fn from(interval: Interval) -> Self {
        (interval.start, interval.end)
    }
}

#[cfg(test)]
mod tests {
    use super::Interval;

    #[test]
    fn half_open() {
        let window = Interval::new(0.0, 100.0);
        assert!(window.contains(0.0));
        assert!(window.contains(99.9));
        assert!(!window.contains(100.0));
        assert!(!window.contains(-1.0));
    }

    #[test]
    fn intersections() {
        let a = Interval::new(0.0, 10.0);
        let b = Interval::new(5.0, 20.0);
        assert_eq!(a.intersect(&b), Some(Interval::new(5.0, 10.0)));
        assert!(a.overlaps(&b));
        let c = Interval::new(10.0, 11.0);
        assert!(!a.overlaps(&c));
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn deserializes_from_pair() {
        let window: Interval = serde_json::from_str("[24.0, 48.0]").unwrap();
        assert_eq!(window, Interval::new(24.0, 48.0));
        assert_eq!(serde_json::to_string(&window).unwrap(), "[24.0,48.0]");
    }
}

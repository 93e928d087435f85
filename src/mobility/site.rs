use serde_derive::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// The category of a place where people meet.
///
/// `Household` is only used as the contact category of intra-household exposure; the site
/// table itself holds the five outside types.
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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SiteType {
    Education,
    Social,
    BusStop,
    Office,
    Supermarket,
    Household,
}

impl SiteType {
    /// The site types that can appear in the site table, in the column order of the
    /// per-type mobility parameters.
    pub const OUTSIDE: [SiteType; 5] = [
        SiteType::Education,
        SiteType::Social,
        SiteType::BusStop,
        SiteType::Office,
        SiteType::Supermarket,
    ];

    #[must_use]
    pub fn is_outside(self) -> bool {
        self != SiteType::Household
    }

    /// Position of this type in `SiteType::OUTSIDE`, or `None` for `Household`.
    #[must_use]
    pub fn outside_index(self) -> Option<usize> {
        SiteType::OUTSIDE.iter().position(|site_type| *site_type == self)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiteId(pub usize);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub site_type: SiteType,
    pub loc: [f64; 2],
}

impl Site {
    #[must_use]
    pub fn distance_to(&self, loc: [f64; 2]) -> f64 {
        (self.loc[0] - loc[0]).hypot(self.loc[1] - loc[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outside_index_follows_column_order() {
        assert_eq!(SiteType::Education.outside_index(), Some(0));
        assert_eq!(SiteType::Supermarket.outside_index(), Some(4));
        assert_eq!(SiteType::Household.outside_index(), None);
        assert!(!SiteType::Household.is_outside());
    }

    #[test]
    fn serialized_names() {
        assert_eq!(SiteType::BusStop.to_string(), "bus_stop");
        let parsed: SiteType = serde_json::from_str("\"bus_stop\"").unwrap();
        assert_eq!(parsed, SiteType::BusStop);
    }
}

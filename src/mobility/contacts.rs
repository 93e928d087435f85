use serde_derive::{Deserialize, Serialize};

use crate::measures::Interval;
use crate::mobility::{PersonId, SiteId, SiteType, Visit, VisitId, VisitIndex};

/// Two people at the same site at the same time, seen from `person`'s side.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub person: PersonId,
    pub other: PersonId,
    pub site: SiteId,
    pub site_type: SiteType,
    pub t_from: f64,
    pub t_to: f64,
    pub person_visit: VisitId,
    pub other_visit: VisitId,
}

impl Contact {
    /// The same contact seen from `other`'s side.
    #[must_use]
    pub fn mirrored(&self) -> Contact {
        Contact {
            person: self.other,
            other: self.person,
            person_visit: self.other_visit,
            other_visit: self.person_visit,
            ..*self
        }
    }

    #[must_use]
    pub fn duration(&self) -> f64 {
        self.t_to - self.t_from
    }

    #[must_use]
    pub fn interval(&self) -> Interval {
        Interval::new(self.t_from, self.t_to)
    }

    #[must_use]
    pub fn overlaps(&self, window: &Interval) -> bool {
        self.interval().overlaps(window)
    }
}

/// Every contact made during `visit`, oriented with the visitor first and sorted by
/// `(t_from, t_to, other, site)`.
pub(crate) fn contacts_of_visit(
    index: &VisitIndex,
    visit: &Visit,
    site_type: SiteType,
) -> Vec<Contact> {
    let mut contacts: Vec<Contact> = index
        .site_visits_overlapping(visit.site, visit.t_from, visit.t_to)
        .filter(|other| other.person != visit.person)
        .filter_map(|other| {
            let t_from = visit.t_from.max(other.t_from);
            let t_to = visit.t_to.min(other.t_to);
            (t_to > t_from).then_some(Contact {
                person: visit.person,
                other: other.person,
                site: visit.site,
                site_type,
                t_from,
                t_to,
                person_visit: visit.id,
                other_visit: other.id,
            })
        })
        .collect();
    contacts.sort_by(person_order);
    contacts
}

/// The order of a person's contacts: `(t_from, t_to, other, site)`.
pub(crate) fn person_order(a: &Contact, b: &Contact) -> std::cmp::Ordering {
    a.t_from
        .total_cmp(&b.t_from)
        .then(a.t_to.total_cmp(&b.t_to))
        .then(a.other.cmp(&b.other))
        .then(a.site.cmp(&b.site))
}

/// The order of the contacts at one site: `(t_from, t_to, person, other)`.
pub(crate) fn site_order(a: &Contact, b: &Contact) -> std::cmp::Ordering {
    a.t_from
        .total_cmp(&b.t_from)
        .then(a.t_to.total_cmp(&b.t_to))
        .then(a.person.cmp(&b.person))
        .then(a.other.cmp(&b.other))
}

/// A pull-based sequence of one person's contacts that end after a given time, in the order
/// of `person_order`.
///
/// The stream is finite and cannot be rewound; ask the provider for a new one to replay.
pub struct ContactStream<'a> {
    inner: Box<dyn Iterator<Item = Contact> + 'a>,
}

impl<'a> ContactStream<'a> {
    pub fn new(inner: impl Iterator<Item = Contact> + 'a) -> ContactStream<'a> {
        ContactStream {
            inner: Box::new(inner),
        }
    }
}

impl Iterator for ContactStream<'_> {
    type Item = Contact;

    fn next(&mut self) -> Option<Contact> {
        self.inner.next()
    }
}

//! 标识：每个库所按令牌种类计数的多重集。
use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::net::ids::{PlaceId, TokenId};
use crate::net::structure::Weight;

pub type TokenCounts = BTreeMap<TokenId, Weight>;

/// Token counts of every place, one entry per registered token kind.
///
/// A marking owned by a [`Net`](crate::net::Net) is always dense: every
/// place carries an entry for every kind, zero included, so two markings of
/// the same net compare equal exactly when they hold the same tokens.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Marking(BTreeMap<PlaceId, TokenCounts>);

impl Marking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PlaceId, &TokenCounts)> {
        self.0.iter()
    }

    pub fn contains_place(&self, place: &str) -> bool {
        self.0.contains_key(place)
    }

    pub fn counts(&self, place: &str) -> Option<&TokenCounts> {
        self.0.get(place)
    }

    /// Count of `token` at `place`; absent entries read as zero.
    pub fn tokens(&self, place: &str, token: &str) -> Weight {
        self.0
            .get(place)
            .and_then(|counts| counts.get(token))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of the counts at `place`. A net keeps every place total within
    /// [`Weight`], so saturation only shows on hand-built markings.
    pub fn total(&self, place: &str) -> Weight {
        self.0
            .get(place)
            .map(|counts| {
                counts
                    .values()
                    .fold(0, |total: Weight, count| total.saturating_add(*count))
            })
            .unwrap_or(0)
    }

    /// Sum of all counts in the marking, saturating.
    pub fn grand_total(&self) -> Weight {
        self.0
            .values()
            .flat_map(|counts| counts.values())
            .fold(0, |total: Weight, count| total.saturating_add(*count))
    }

    pub(crate) fn insert_place(&mut self, place: PlaceId, counts: TokenCounts) {
        self.0.insert(place, counts);
    }

    pub(crate) fn remove_place(&mut self, place: &str) -> Option<TokenCounts> {
        self.0.remove(place)
    }

    pub(crate) fn rename_place(&mut self, old: &str, new: &PlaceId) {
        if let Some(counts) = self.0.remove(old) {
            self.0.insert(new.clone(), counts);
        }
    }

    pub(crate) fn add_token(&mut self, token: &TokenId) {
        for counts in self.0.values_mut() {
            counts.entry(token.clone()).or_insert(0);
        }
    }

    /// Drops `token` everywhere and returns the non-zero counts it had.
    pub(crate) fn remove_token(&mut self, token: &str) -> Vec<(PlaceId, Weight)> {
        let mut removed = Vec::new();
        for (place, counts) in self.0.iter_mut() {
            if let Some(count) = counts.remove(token) {
                if count > 0 {
                    removed.push((place.clone(), count));
                }
            }
        }
        removed
    }

    pub(crate) fn rename_token(&mut self, old: &str, new: &TokenId) {
        for counts in self.0.values_mut() {
            if let Some(count) = counts.remove(old) {
                counts.insert(new.clone(), count);
            }
        }
    }

    pub(crate) fn set(&mut self, place: &PlaceId, token: &TokenId, value: Weight) {
        self.0
            .entry(place.clone())
            .or_default()
            .insert(token.clone(), value);
    }

    pub fn hashable_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Debug for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (place, counts) in self.iter() {
            map.entry(place, counts);
        }
        map.finish()
    }
}

/// Compact rendering, e.g. `{P0: black=1, P1: -}`; zero counts are left out.
impl fmt::Display for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, (place, counts)) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{place}: ")?;
            let mut any = false;
            for (token, count) in counts.iter().filter(|(_, count)| **count > 0) {
                if any {
                    f.write_str(" ")?;
                }
                write!(f, "{token}={count}")?;
                any = true;
            }
            if !any {
                f.write_str("-")?;
            }
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marking() -> Marking {
        let mut marking = Marking::new();
        let p0 = PlaceId::new("P0");
        let p1 = PlaceId::new("P1");
        marking.insert_place(p0.clone(), TokenCounts::new());
        marking.insert_place(p1.clone(), TokenCounts::new());
        marking.add_token(&TokenId::new("black"));
        marking.add_token(&TokenId::new("red"));
        marking.set(&p0, &TokenId::new("black"), 2);
        marking.set(&p0, &TokenId::new("red"), 1);
        marking
    }

    #[test]
    fn totals_sum_every_kind() {
        let marking = marking();
        assert_eq!(marking.total("P0"), 3);
        assert_eq!(marking.total("P1"), 0);
        assert_eq!(marking.total("missing"), 0);
        assert_eq!(marking.grand_total(), 3);
    }

    #[test]
    fn totals_saturate_instead_of_wrapping() {
        let mut marking = marking();
        let p0 = PlaceId::new("P0");
        marking.set(&p0, &TokenId::new("black"), Weight::MAX);
        assert_eq!(marking.total("P0"), Weight::MAX);
        assert_eq!(marking.grand_total(), Weight::MAX);
    }

    #[test]
    fn removing_a_kind_reports_non_zero_counts() {
        let mut marking = marking();
        let removed = marking.remove_token("black");
        assert_eq!(removed, vec![(PlaceId::new("P0"), 2)]);
        assert_eq!(marking.counts("P1").map(|c| c.len()), Some(1));
    }

    #[test]
    fn rename_keeps_counts() {
        let mut marking = marking();
        marking.rename_token("red", &TokenId::new("crimson"));
        marking.rename_place("P0", &PlaceId::new("Start"));
        assert_eq!(marking.tokens("Start", "crimson"), 1);
        assert!(!marking.contains_place("P0"));
    }

    #[test]
    fn display_skips_zero_counts() {
        assert_eq!(marking().to_string(), "{P0: black=2 red=1, P1: -}");
    }
}

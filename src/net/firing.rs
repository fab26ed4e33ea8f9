//! 激发引擎：可激发判定、增量计算、正向激发与基于记录增量的逆向回放。
//!
//! 激发分两步：先从激发前的标识整体算出增量并校验，再一次性写入。
//! 撤销与重做只回放记录下来的增量，不重新求值函数式权重。
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::net::core::{Net, NetError};
use crate::net::ids::{PlaceId, TokenId, TransitionId};
use crate::net::marking::{Marking, TokenCounts};
use crate::net::observer::NetEvent;
use crate::net::structure::{Arc, ArcDirection, Weight};
use crate::net::weight::ArcWeightEvaluator;

/// Signed per-place, per-kind change produced by one firing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiringDelta {
    transition: TransitionId,
    changes: BTreeMap<PlaceId, BTreeMap<TokenId, i64>>,
}

impl FiringDelta {
    pub fn transition(&self) -> &TransitionId {
        &self.transition
    }

    pub fn changes(&self) -> &BTreeMap<PlaceId, BTreeMap<TokenId, i64>> {
        &self.changes
    }

    pub fn change(&self, place: &str, token: &str) -> i64 {
        self.changes
            .get(place)
            .and_then(|changes| changes.get(token))
            .copied()
            .unwrap_or(0)
    }

    /// True when firing moves no tokens at all.
    pub fn is_empty(&self) -> bool {
        self.changes
            .values()
            .all(|changes| changes.values().all(|change| *change == 0))
    }

    pub fn inverse(&self) -> FiringDelta {
        FiringDelta {
            transition: self.transition.clone(),
            changes: self
                .changes
                .iter()
                .map(|(place, changes)| {
                    let negated = changes
                        .iter()
                        .map(|(token, change)| (token.clone(), -change))
                        .collect();
                    (place.clone(), negated)
                })
                .collect(),
        }
    }

    /// Adds `amount` to one entry; `None` when the entry would leave `i64`.
    fn add(&mut self, place: &PlaceId, token: &TokenId, amount: i128) -> Option<()> {
        let entry = self
            .changes
            .entry(place.clone())
            .or_default()
            .entry(token.clone())
            .or_insert(0);
        *entry = i64::try_from(i128::from(*entry) + amount).ok()?;
        Some(())
    }
}

impl fmt::Display for FiringDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.transition)?;
        for (place, changes) in &self.changes {
            for (token, change) in changes.iter().filter(|(_, change)| **change != 0) {
                write!(f, " {place}.{token}{change:+}")?;
            }
        }
        Ok(())
    }
}

/// Why a transition cannot fire under a given marking.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Blocked {
    InsufficientTokens {
        place: PlaceId,
        token: TokenId,
        needed: Weight,
    },
    Inhibited {
        place: PlaceId,
        token: TokenId,
        threshold: Weight,
    },
    Capacity {
        place: PlaceId,
        total: Weight,
        capacity: Weight,
    },
    /// The firing would move or hold more tokens than a count can represent.
    Overflow { place: PlaceId },
}

impl Blocked {
    fn into_error(self, transition: &TransitionId) -> NetError {
        match self {
            Blocked::Capacity {
                place,
                total,
                capacity,
            } => NetError::CapacityExceeded {
                place,
                total,
                capacity,
            },
            Blocked::Overflow { place } => NetError::CountOverflow { place },
            _ => NetError::TransitionNotEnabled(transition.clone()),
        }
    }
}

impl fmt::Display for Blocked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Blocked::InsufficientTokens {
                place,
                token,
                needed,
            } => write!(f, "{place} lacks {needed} x {token}"),
            Blocked::Inhibited {
                place,
                token,
                threshold,
            } => write!(f, "{place} holds at least {threshold} x {token}"),
            Blocked::Capacity {
                place,
                total,
                capacity,
            } => write!(f, "{place} would hold {total} > {capacity}"),
            Blocked::Overflow { place } => write!(f, "{place} would overflow"),
        }
    }
}

enum Plan {
    Ready(FiringDelta),
    Blocked(Blocked),
}

/// New counts of every touched entry, computed before anything is written.
type Staged = Vec<(PlaceId, TokenId, Weight)>;

impl Net {
    /// Evaluates every arc of `transition` against `marking` and derives the
    /// delta, or the first condition that blocks it. Checks run in a fixed
    /// order: input tokens, inhibitor thresholds, output capacity.
    fn plan(&self, marking: &Marking, transition: &TransitionId) -> Result<Plan, NetError> {
        let evaluator = ArcWeightEvaluator::new(&self.tokens, marking);
        let mut arcs: SmallVec<[(&Arc, TokenCounts); 4]> = SmallVec::new();
        for arc in self.arcs_of(transition) {
            arcs.push((arc, evaluator.evaluate(arc)?));
        }

        let mut delta = FiringDelta {
            transition: transition.clone(),
            changes: BTreeMap::new(),
        };
        let inputs = arcs
            .iter()
            .filter(|(arc, _)| arc.direction() == ArcDirection::PlaceToTransition);
        for (arc, amounts) in inputs.clone().filter(|(arc, _)| !arc.is_inhibitor()) {
            for (token, needed) in amounts {
                if marking.tokens(arc.place(), token) < *needed {
                    return Ok(Plan::Blocked(Blocked::InsufficientTokens {
                        place: arc.place().clone(),
                        token: token.clone(),
                        needed: *needed,
                    }));
                }
                if delta.add(arc.place(), token, -i128::from(*needed)).is_none() {
                    return Ok(overflow(arc.place()));
                }
            }
        }
        for (arc, amounts) in inputs.filter(|(arc, _)| arc.is_inhibitor()) {
            // 阈值为 0 的条目不起作用
            for (token, threshold) in amounts.iter().filter(|(_, threshold)| **threshold > 0) {
                if marking.tokens(arc.place(), token) >= *threshold {
                    return Ok(Plan::Blocked(Blocked::Inhibited {
                        place: arc.place().clone(),
                        token: token.clone(),
                        threshold: *threshold,
                    }));
                }
            }
        }

        let mut produced: BTreeMap<&PlaceId, Weight> = BTreeMap::new();
        let outputs = arcs
            .iter()
            .filter(|(arc, _)| arc.direction() == ArcDirection::TransitionToPlace);
        for (arc, amounts) in outputs {
            for (token, amount) in amounts {
                let sum = produced.entry(arc.place()).or_insert(0);
                match sum.checked_add(*amount) {
                    Some(next) => *sum = next,
                    None => return Ok(overflow(arc.place())),
                }
                if delta.add(arc.place(), token, i128::from(*amount)).is_none() {
                    return Ok(overflow(arc.place()));
                }
            }
        }
        for (place, amount) in produced {
            let Some(total) = marking.total(place).checked_add(amount) else {
                return Ok(overflow(place));
            };
            if let Some(capacity) = self.place(place)?.capacity().filter(|cap| total > *cap) {
                return Ok(Plan::Blocked(Blocked::Capacity {
                    place: place.clone(),
                    total,
                    capacity,
                }));
            }
        }
        Ok(Plan::Ready(delta))
    }

    /// Computes the resulting counts of `delta` against `marking`, refusing
    /// negative counts, capacity overruns and unknown places or kinds.
    fn stage(&self, marking: &Marking, delta: &FiringDelta) -> Result<Staged, String> {
        let mut staged = Staged::new();
        for (place_id, changes) in &delta.changes {
            let place = self
                .places
                .get(place_id.as_str())
                .ok_or_else(|| format!("unknown place {place_id}"))?;
            let mut total = i128::from(marking.total(place_id));
            for (token, change) in changes {
                if !self.tokens.contains_key(token.as_str()) {
                    return Err(format!("unknown token kind {token}"));
                }
                let current = i128::from(marking.tokens(place_id, token));
                let next = current + i128::from(*change);
                let next = Weight::try_from(next)
                    .map_err(|_| format!("{place_id}.{token} would become {next}"))?;
                total += i128::from(*change);
                staged.push((place_id.clone(), token.clone(), next));
            }
            if total > i128::from(Weight::MAX) {
                return Err(format!("{place_id} would hold {total} tokens"));
            }
            if let Some(capacity) = place.capacity() {
                if total > i128::from(capacity) {
                    return Err(format!(
                        "{place_id} would hold {total} tokens, capacity {capacity}"
                    ));
                }
            }
        }
        Ok(staged)
    }

    fn ready_delta(&self, marking: &Marking, transition: &str) -> Result<FiringDelta, NetError> {
        let transition = self.transition(transition)?.id().clone();
        match self.plan(marking, &transition)? {
            Plan::Ready(delta) => Ok(delta),
            Plan::Blocked(blocked) => {
                log::warn!("{transition} rejected: {blocked}");
                Err(blocked.into_error(&transition))
            }
        }
    }

    pub fn is_enabled(&self, transition: &str) -> Result<bool, NetError> {
        self.is_enabled_under(&self.marking, transition)
    }

    /// Enabling is a function of `marking` alone; tokens freed by the same
    /// firing are not counted towards its outputs.
    pub fn is_enabled_under(&self, marking: &Marking, transition: &str) -> Result<bool, NetError> {
        let id = self.transition(transition)?.id().clone();
        match self.plan(marking, &id)? {
            Plan::Ready(_) => {
                log::trace!("{id} enabled");
                Ok(true)
            }
            Plan::Blocked(blocked) => {
                log::trace!("{id} disabled: {blocked}");
                Ok(false)
            }
        }
    }

    pub fn enabled_transitions(&self) -> Result<Vec<TransitionId>, NetError> {
        self.enabled_transitions_under(&self.marking)
    }

    pub fn enabled_transitions_under(
        &self,
        marking: &Marking,
    ) -> Result<Vec<TransitionId>, NetError> {
        let mut enabled = Vec::new();
        for id in self.transitions.keys() {
            if self.is_enabled_under(marking, id)? {
                enabled.push(id.clone());
            }
        }
        Ok(enabled)
    }

    /// The delta firing `transition` would apply now, without applying it.
    pub fn firing_delta(&self, transition: &str) -> Result<FiringDelta, NetError> {
        self.ready_delta(&self.marking, transition)
    }

    /// Fires `transition` against a detached marking and returns the result
    /// together with the delta. The net itself is not touched.
    pub fn successor(
        &self,
        marking: &Marking,
        transition: &str,
    ) -> Result<(Marking, FiringDelta), NetError> {
        let delta = self.ready_delta(marking, transition)?;
        let staged = self
            .stage(marking, &delta)
            .map_err(NetError::InconsistentState)?;
        let mut next = marking.clone();
        for (place, token, value) in staged {
            next.set(&place, &token, value);
        }
        Ok((next, delta))
    }

    /// Fires an enabled transition and returns the applied delta, which is
    /// what [`Net::unfire`] and [`Net::replay`] take.
    pub fn fire(&mut self, transition: &str) -> Result<FiringDelta, NetError> {
        let delta = self.ready_delta(&self.marking, transition)?;
        self.commit(&delta)?;
        log::debug!("fired {delta}");
        self.notify(NetEvent::Fired(delta.transition.clone()));
        Ok(delta)
    }

    /// Reverses a recorded firing by applying the negated delta.
    pub fn unfire(&mut self, delta: &FiringDelta) -> Result<(), NetError> {
        self.commit(&delta.inverse())?;
        log::debug!("unfired {delta}");
        self.notify(NetEvent::Unfired(delta.transition.clone()));
        Ok(())
    }

    /// Re-applies a recorded delta as-is, without re-evaluating weights.
    pub fn replay(&mut self, delta: &FiringDelta) -> Result<(), NetError> {
        self.commit(delta)?;
        log::debug!("replayed {delta}");
        self.notify(NetEvent::Replayed(delta.transition.clone()));
        Ok(())
    }

    fn commit(&mut self, delta: &FiringDelta) -> Result<(), NetError> {
        let staged = self.stage(&self.marking, delta).map_err(|reason| {
            log::error!("delta of {} does not fit the marking: {reason}", delta.transition);
            NetError::InconsistentState(reason)
        })?;
        for (place, token, value) in staged {
            self.marking.set(&place, &token, value);
        }
        Ok(())
    }
}

fn overflow(place: &PlaceId) -> Plan {
    Plan::Blocked(Blocked::Overflow {
        place: place.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::structure::{Color, Place, TokenKind, Transition};
    use crate::net::weight::WeightExpr;

    fn net() -> Net {
        let mut net = Net::empty();
        net.add_token_kind(TokenKind::new("black", Color::BLACK)).unwrap();
        net.add_token_kind(TokenKind::new("red", Color::RED)).unwrap();
        for place in ["P0", "P1"] {
            net.add_place(Place::new(place)).unwrap();
        }
        net.add_transition(Transition::new("T0")).unwrap();
        net
    }

    #[test]
    fn fire_moves_tokens_and_unfire_restores() {
        let mut net = net();
        net.add_arc(Arc::input("P0", "T0").with_weight("black", 2)).unwrap();
        net.add_arc(Arc::output("T0", "P1").with_weight("red", 1)).unwrap();
        net.set_count("P0", "black", 3).unwrap();
        let before = net.marking().clone();

        let delta = net.fire("T0").unwrap();
        assert_eq!(delta.change("P0", "black"), -2);
        assert_eq!(delta.change("P1", "red"), 1);
        assert_eq!(net.tokens_at("P0", "black"), Ok(1));
        assert_eq!(net.tokens_at("P1", "red"), Ok(1));
        assert_eq!(net.is_enabled("T0"), Ok(false));

        net.unfire(&delta).unwrap();
        assert_eq!(net.marking(), &before);
    }

    #[test]
    fn rejected_fire_leaves_marking_untouched() {
        let mut net = net();
        net.add_arc(Arc::input("P0", "T0").with_weight("black", 1)).unwrap();
        let before = net.marking().clone();
        assert_eq!(
            net.fire("T0"),
            Err(NetError::TransitionNotEnabled(TransitionId::new("T0")))
        );
        assert_eq!(net.marking(), &before);
    }

    #[test]
    fn no_self_loop_relaxation_on_capacity() {
        let mut net = net();
        net.set_capacity("P0", Some(1)).unwrap();
        net.add_arc(Arc::input("P0", "T0").with_weight("black", 1)).unwrap();
        net.add_arc(Arc::output("T0", "P0").with_weight("black", 1)).unwrap();
        net.set_count("P0", "black", 1).unwrap();
        assert_eq!(net.is_enabled("T0"), Ok(false));
        assert!(matches!(
            net.fire("T0"),
            Err(NetError::CapacityExceeded { total: 2, capacity: 1, .. })
        ));
    }

    #[test]
    fn capacity_bounds_the_sum_of_all_kinds() {
        let mut net = net();
        net.set_capacity("P1", Some(3)).unwrap();
        net.add_arc(
            Arc::output("T0", "P1")
                .with_weight("black", 1)
                .with_weight("red", 1),
        )
        .unwrap();
        net.set_count("P1", "black", 1).unwrap();
        assert_eq!(net.is_enabled("T0"), Ok(true));
        net.fire("T0").unwrap();
        assert_eq!(net.is_enabled("T0"), Ok(false));
    }

    #[test]
    fn zero_threshold_inhibitor_entries_are_ignored() {
        let mut net = net();
        net.add_arc(
            Arc::inhibitor("P0", "T0")
                .with_weight("black", 0)
                .with_weight("red", 2),
        )
        .unwrap();
        net.set_count("P0", "black", 5).unwrap();
        net.set_count("P0", "red", 1).unwrap();
        assert_eq!(net.is_enabled("T0"), Ok(true));
        let delta = net.fire("T0").unwrap();
        assert!(delta.is_empty());
        net.set_count("P0", "red", 2).unwrap();
        assert_eq!(net.is_enabled("T0"), Ok(false));
    }

    #[test]
    fn functional_weights_are_replayed_not_reevaluated() {
        let mut net = net();
        // 取走 P0 中全部黑色令牌
        net.add_arc(Arc::input("P0", "T0").with_expr("black", WeightExpr::count("black")))
            .unwrap();
        net.add_arc(Arc::output("T0", "P1").with_expr("black", WeightExpr::count_at("P0", "black")))
            .unwrap();
        net.set_count("P0", "black", 4).unwrap();

        let delta = net.fire("T0").unwrap();
        assert_eq!(delta.change("P0", "black"), -4);
        assert_eq!(net.tokens_at("P1", "black"), Ok(4));

        net.unfire(&delta).unwrap();
        assert_eq!(net.tokens_at("P0", "black"), Ok(4));
        assert_eq!(net.tokens_at("P1", "black"), Ok(0));
        net.replay(&delta).unwrap();
        assert_eq!(net.tokens_at("P1", "black"), Ok(4));
    }

    #[test]
    fn mismatched_unfire_is_inconsistent_state() {
        let mut net = net();
        net.add_arc(Arc::output("T0", "P1").with_weight("red", 2)).unwrap();
        let delta = net.fire("T0").unwrap();
        net.set_count("P1", "red", 1).unwrap();
        let before = net.marking().clone();
        assert!(matches!(
            net.unfire(&delta),
            Err(NetError::InconsistentState(_))
        ));
        assert_eq!(net.marking(), &before);
    }

    #[test]
    fn firing_past_the_count_range_is_refused() {
        let mut net = net();
        net.add_arc(Arc::output("T0", "P0").with_weight("black", 1)).unwrap();
        net.set_count("P0", "black", i64::MAX).unwrap();
        net.set_count("P0", "red", i64::MAX).unwrap();

        // 总数恰好到达上限时仍可激发
        net.fire("T0").unwrap();
        assert_eq!(net.marking().total("P0"), Weight::MAX);

        let before = net.marking().clone();
        assert_eq!(net.is_enabled("T0"), Ok(false));
        assert_eq!(
            net.fire("T0"),
            Err(NetError::CountOverflow {
                place: PlaceId::new("P0")
            })
        );
        assert_eq!(net.marking(), &before);
        assert_eq!(net.enabled_transitions(), Ok(vec![]));
    }

    #[test]
    fn invalid_weight_surfaces_at_evaluation() {
        let mut net = net();
        net.add_arc(
            Arc::input("P0", "T0").with_expr("black", "#(black) - 1".parse().unwrap()),
        )
        .unwrap();
        assert!(matches!(
            net.is_enabled("T0"),
            Err(NetError::InvalidArcWeight { .. })
        ));
        net.set_count("P0", "black", 1).unwrap();
        assert_eq!(net.is_enabled("T0"), Ok(true));
    }

    #[test]
    fn successor_does_not_touch_the_net() {
        let mut net = net();
        net.add_arc(Arc::output("T0", "P0").with_weight("black", 1)).unwrap();
        let start = net.marking().clone();
        let (next, delta) = net.successor(&start, "T0").unwrap();
        assert_eq!(next.tokens("P0", "black"), 1);
        assert_eq!(net.marking(), &start);
        assert_eq!(delta.to_string(), "T0: P0.black+1");
        assert_eq!(net.enabled_transitions_under(&next), Ok(vec![TransitionId::new("T0")]));
    }
}

//! 组件图：令牌注册表、库所、迁移、弧与当前标识，以及保持不变量的编辑操作。
//!
//! 每个编辑操作都先完整校验再一次性写入，失败时网保持不变。
use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::ids::{ARC_SEPARATOR, ArcId, PlaceId, TokenId, TransitionId, is_endpoint_id};
use crate::net::marking::{Marking, TokenCounts};
use crate::net::observer::{NetEvent, Observers, SubscriberId};
use crate::net::structure::{Arc, Color, ComponentKind, Place, TokenKind, Transition, Weight};
use crate::net::visit::ComponentKey;
use crate::net::weight::{ArcWeightEvaluator, WeightError, WeightExpr};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetError {
    #[error("{kind} '{id}' already exists")]
    DuplicateIdentifier { kind: ComponentKind, id: String },
    #[error("{kind} '{id}' refers to missing {missing} '{target}'")]
    DanglingReference {
        kind: ComponentKind,
        id: String,
        missing: ComponentKind,
        target: String,
    },
    #[error("{kind} '{id}' not found")]
    ComponentNotFound { kind: ComponentKind, id: String },
    #[error("negative count {value} of '{token}' at place '{place}'")]
    NegativeCount {
        place: PlaceId,
        token: TokenId,
        value: i64,
    },
    #[error("capacity exceeded at place '{place}': {total} > {capacity}")]
    CapacityExceeded {
        place: PlaceId,
        total: Weight,
        capacity: Weight,
    },
    #[error("invalid weight for '{token}' on arc '{arc}': {source}")]
    InvalidArcWeight {
        arc: ArcId,
        token: TokenId,
        source: WeightError,
    },
    #[error("transition '{0}' is not enabled")]
    TransitionNotEnabled(TransitionId),
    #[error("{kind} '{id}' has a derived identifier and cannot be renamed")]
    ImmutableIdentifier { kind: ComponentKind, id: String },
    #[error("{kind} '{id}' would clash with the arc separator '{sep}'", sep = ARC_SEPARATOR.trim())]
    InvalidIdentifier { kind: ComponentKind, id: String },
    #[error("token total at place '{place}' would exceed {max}", max = Weight::MAX)]
    CountOverflow { place: PlaceId },
    #[error("inconsistent state: {0}")]
    InconsistentState(String),
}

impl NetError {
    pub(crate) fn not_found(kind: ComponentKind, id: impl fmt::Display) -> Self {
        NetError::ComponentNotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Refuses place and transition ids that would make derived arc ids
    /// ambiguous.
    fn check_endpoint(kind: ComponentKind, id: &str) -> Result<(), NetError> {
        if is_endpoint_id(id) {
            Ok(())
        } else {
            Err(NetError::InvalidIdentifier {
                kind,
                id: id.to_string(),
            })
        }
    }

    pub(crate) fn duplicate(kind: ComponentKind, id: impl fmt::Display) -> Self {
        NetError::DuplicateIdentifier {
            kind,
            id: id.to_string(),
        }
    }

    fn dangling(
        kind: ComponentKind,
        id: impl fmt::Display,
        missing: ComponentKind,
        target: impl fmt::Display,
    ) -> Self {
        NetError::DanglingReference {
            kind,
            id: id.to_string(),
            missing,
            target: target.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedPlace {
    pub index: usize,
    pub place: Place,
    pub counts: TokenCounts,
}

/// Everything a single `remove` took out of the net, in removal order.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedComponents {
    pub place: Option<RemovedPlace>,
    pub transition: Option<(usize, Transition)>,
    pub arcs: Vec<(usize, Arc)>,
}

impl RemovedComponents {
    pub fn keys(&self) -> Vec<ComponentKey> {
        let mut keys: Vec<ComponentKey> = self
            .arcs
            .iter()
            .map(|(_, arc)| ComponentKey::Arc(arc.id.clone()))
            .collect();
        if let Some(removed) = &self.place {
            keys.push(ComponentKey::Place(removed.place.id.clone()));
        }
        if let Some((_, transition)) = &self.transition {
            keys.push(ComponentKey::Transition(transition.id.clone()));
        }
        keys
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedTokenKind {
    pub index: usize,
    pub kind: TokenKind,
    /// Non-zero counts the kind had, per place.
    pub counts: Vec<(PlaceId, Weight)>,
    /// Weight entries keyed by the kind, with their position in the arc.
    pub weights: Vec<(ArcId, usize, WeightExpr)>,
}

/// Full component and marking state, for import/export layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetSnapshot {
    pub tokens: Vec<TokenKind>,
    pub places: Vec<Place>,
    pub transitions: Vec<Transition>,
    pub arcs: Vec<Arc>,
    pub marking: Marking,
}

/// A Petri net and its marking.
///
/// All mutation goes through `&mut self`; the type does no locking and is
/// meant to be driven from one thread.
#[derive(Default)]
pub struct Net {
    pub(crate) tokens: IndexMap<TokenId, TokenKind>,
    pub(crate) places: IndexMap<PlaceId, Place>,
    pub(crate) transitions: IndexMap<TransitionId, Transition>,
    pub(crate) arcs: IndexMap<ArcId, Arc>,
    pub(crate) marking: Marking,
    observers: Observers,
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("tokens", &self.tokens.keys().collect::<Vec<_>>())
            .field("places", &self.places.keys().collect::<Vec<_>>())
            .field("transitions", &self.transitions.keys().collect::<Vec<_>>())
            .field("arcs", &self.arcs.keys().collect::<Vec<_>>())
            .field("marking", &self.marking)
            .finish()
    }
}

/// Clones structure and marking; subscribers stay with the original.
impl Clone for Net {
    fn clone(&self) -> Self {
        Self {
            tokens: self.tokens.clone(),
            places: self.places.clone(),
            transitions: self.transitions.clone(),
            arcs: self.arcs.clone(),
            marking: self.marking.clone(),
            observers: Observers::default(),
        }
    }
}

/// Re-keys an entry in place, keeping its position.
fn rekey<K, V>(map: &mut IndexMap<K, V>, old: &str, new: K)
where
    K: Hash + Eq + Borrow<str>,
{
    if let Some((index, _, value)) = map.swap_remove_full(old) {
        map.insert(new, value);
        let last = map.len() - 1;
        map.swap_indices(index, last);
    }
}

impl Net {
    pub fn empty() -> Self {
        Self::default()
    }

    // ---- observers ----

    pub fn subscribe(&mut self, handler: impl FnMut(&NetEvent) + 'static) -> SubscriberId {
        self.observers.subscribe(Box::new(handler))
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub(crate) fn notify(&mut self, event: NetEvent) {
        self.observers.notify(event);
    }

    // ---- queries ----

    pub fn tokens(&self) -> impl Iterator<Item = &TokenKind> {
        self.tokens.values()
    }

    pub fn token(&self, id: &str) -> Result<&TokenKind, NetError> {
        self.tokens
            .get(id)
            .ok_or_else(|| NetError::not_found(ComponentKind::TokenKind, id))
    }

    pub fn places(&self) -> impl Iterator<Item = &Place> {
        self.places.values()
    }

    pub fn place(&self, id: &str) -> Result<&Place, NetError> {
        self.places
            .get(id)
            .ok_or_else(|| NetError::not_found(ComponentKind::Place, id))
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.values()
    }

    pub fn transition(&self, id: &str) -> Result<&Transition, NetError> {
        self.transitions
            .get(id)
            .ok_or_else(|| NetError::not_found(ComponentKind::Transition, id))
    }

    /// Scheduling metadata is free to edit; the id is not reachable here.
    pub fn transition_mut(&mut self, id: &str) -> Result<&mut Transition, NetError> {
        self.transitions
            .get_mut(id)
            .ok_or_else(|| NetError::not_found(ComponentKind::Transition, id))
    }

    pub fn arcs(&self) -> impl Iterator<Item = &Arc> {
        self.arcs.values()
    }

    pub fn arc(&self, id: &str) -> Result<&Arc, NetError> {
        self.arcs
            .get(id)
            .ok_or_else(|| NetError::not_found(ComponentKind::Arc, id))
    }

    /// Arcs attached to `transition`, inputs and inhibitors included.
    pub fn arcs_of<'a>(&'a self, transition: &'a str) -> impl Iterator<Item = &'a Arc> + 'a {
        self.arcs
            .values()
            .filter(move |arc| arc.transition == transition)
    }

    /// Arcs touching the place or transition named `node`.
    fn incident_arc_ids(&self, key: &ComponentKey) -> Vec<ArcId> {
        self.arcs
            .values()
            .filter(|arc| match key {
                ComponentKey::Place(place) => arc.place == *place,
                ComponentKey::Transition(transition) => arc.transition == *transition,
                ComponentKey::Arc(id) => arc.id == *id,
            })
            .map(|arc| arc.id.clone())
            .collect()
    }

    pub fn places_len(&self) -> usize {
        self.places.len()
    }

    pub fn transitions_len(&self) -> usize {
        self.transitions.len()
    }

    pub fn arcs_len(&self) -> usize {
        self.arcs.len()
    }

    pub fn marking(&self) -> &Marking {
        &self.marking
    }

    pub fn tokens_at(&self, place: &str, token: &str) -> Result<Weight, NetError> {
        self.place(place)?;
        self.token(token)?;
        Ok(self.marking.tokens(place, token))
    }

    /// Current per-kind amounts of `arc`, read-only.
    pub fn evaluate_arc(&self, arc: &str) -> Result<TokenCounts, NetError> {
        let arc = self.arc(arc)?;
        ArcWeightEvaluator::new(&self.tokens, &self.marking).evaluate(arc)
    }

    pub fn snapshot(&self) -> NetSnapshot {
        NetSnapshot {
            tokens: self.tokens.values().cloned().collect(),
            places: self.places.values().cloned().collect(),
            transitions: self.transitions.values().cloned().collect(),
            arcs: self.arcs.values().cloned().collect(),
            marking: self.marking.clone(),
        }
    }

    // ---- token registry ----

    pub fn add_token_kind(&mut self, kind: TokenKind) -> Result<TokenId, NetError> {
        if self.tokens.contains_key(kind.id.as_str()) {
            return Err(NetError::duplicate(ComponentKind::TokenKind, &kind.id));
        }
        let id = kind.id.clone();
        self.marking.add_token(&id);
        self.tokens.insert(id.clone(), kind);
        log::debug!("added token kind {id}");
        self.notify(NetEvent::TokenKindAdded(id.clone()));
        Ok(id)
    }

    /// Renames and/or recolors a token kind and returns its previous value.
    /// Only the parts that actually differ are applied and announced.
    pub fn update_token_kind(
        &mut self,
        id: &str,
        new_id: &str,
        color: Color,
    ) -> Result<TokenKind, NetError> {
        let previous = self.token(id)?.clone();
        let renamed = new_id != id;
        if renamed && self.tokens.contains_key(new_id) {
            return Err(NetError::duplicate(ComponentKind::TokenKind, new_id));
        }

        let new_id = TokenId::new(new_id);
        if renamed {
            rekey(&mut self.tokens, id, new_id.clone());
            if let Some(kind) = self.tokens.get_mut(new_id.as_str()) {
                kind.id = new_id.clone();
            }
            self.marking.rename_token(id, &new_id);
            for arc in self.arcs.values_mut() {
                rekey(&mut arc.weights, id, new_id.clone());
                for expr in arc.weights.values_mut() {
                    expr.rename_token(id, &new_id);
                }
            }
            log::debug!("renamed token kind {id} to {new_id}");
            self.notify(NetEvent::TokenKindRenamed {
                old: previous.id.clone(),
                new: new_id.clone(),
            });
        }
        if color != previous.color {
            if let Some(kind) = self.tokens.get_mut(new_id.as_str()) {
                kind.color = color;
            }
            log::debug!("recolored token kind {new_id} to {color:?}");
            self.notify(NetEvent::TokenKindRecolored {
                token: new_id,
                color,
            });
        }
        Ok(previous)
    }

    /// Drops the kind from the registry, every marking entry and every arc
    /// weight keyed by it. Expressions elsewhere that still mention it fail
    /// when evaluated.
    pub fn remove_token_kind(&mut self, id: &str) -> Result<RemovedTokenKind, NetError> {
        let (index, _, kind) = self
            .tokens
            .shift_remove_full(id)
            .ok_or_else(|| NetError::not_found(ComponentKind::TokenKind, id))?;
        let counts = self.marking.remove_token(id);
        let mut weights = Vec::new();
        for arc in self.arcs.values_mut() {
            if let Some((position, _, expr)) = arc.weights.shift_remove_full(id) {
                weights.push((arc.id.clone(), position, expr));
            }
        }
        log::debug!(
            "removed token kind {id} ({} counts, {} weights)",
            counts.len(),
            weights.len()
        );
        self.notify(NetEvent::TokenKindRemoved(kind.id.clone()));
        Ok(RemovedTokenKind {
            index,
            kind,
            counts,
            weights,
        })
    }

    pub fn restore_token_kind(&mut self, removed: RemovedTokenKind) -> Result<(), NetError> {
        let id = removed.kind.id.clone();
        if self.tokens.contains_key(id.as_str()) {
            return Err(NetError::duplicate(ComponentKind::TokenKind, &id));
        }
        for (place, count) in &removed.counts {
            let place = self.places.get(place.as_str()).ok_or_else(|| {
                NetError::dangling(ComponentKind::TokenKind, &id, ComponentKind::Place, place)
            })?;
            let total = self
                .marking
                .total(&place.id)
                .checked_add(*count)
                .ok_or_else(|| NetError::CountOverflow {
                    place: place.id.clone(),
                })?;
            if let Some(capacity) = place.capacity.filter(|capacity| total > *capacity) {
                return Err(NetError::CapacityExceeded {
                    place: place.id.clone(),
                    total,
                    capacity,
                });
            }
        }
        for (arc, _, _) in &removed.weights {
            if !self.arcs.contains_key(arc.as_str()) {
                return Err(NetError::dangling(
                    ComponentKind::TokenKind,
                    &id,
                    ComponentKind::Arc,
                    arc,
                ));
            }
        }

        let index = removed.index.min(self.tokens.len());
        self.tokens.shift_insert(index, id.clone(), removed.kind);
        self.marking.add_token(&id);
        for (place, count) in removed.counts {
            self.marking.set(&place, &id, count);
        }
        for (arc, position, expr) in removed.weights.into_iter().rev() {
            if let Some(arc) = self.arcs.get_mut(arc.as_str()) {
                let position = position.min(arc.weights.len());
                arc.weights.shift_insert(position, id.clone(), expr);
            }
        }
        log::debug!("restored token kind {id}");
        self.notify(NetEvent::TokenKindAdded(id));
        Ok(())
    }

    // ---- structure ----

    pub fn add_place(&mut self, place: Place) -> Result<PlaceId, NetError> {
        NetError::check_endpoint(ComponentKind::Place, &place.id)?;
        if self.places.contains_key(place.id.as_str()) {
            return Err(NetError::duplicate(ComponentKind::Place, &place.id));
        }
        let id = place.id.clone();
        let counts = self.tokens.keys().map(|token| (token.clone(), 0)).collect();
        self.marking.insert_place(id.clone(), counts);
        self.places.insert(id.clone(), place);
        log::debug!("added place {id}");
        self.notify(NetEvent::PlaceAdded(id.clone()));
        Ok(id)
    }

    pub fn add_transition(&mut self, transition: Transition) -> Result<TransitionId, NetError> {
        NetError::check_endpoint(ComponentKind::Transition, &transition.id)?;
        if self.transitions.contains_key(transition.id.as_str()) {
            return Err(NetError::duplicate(ComponentKind::Transition, &transition.id));
        }
        let id = transition.id.clone();
        self.transitions.insert(id.clone(), transition);
        log::debug!("added transition {id}");
        self.notify(NetEvent::TransitionAdded(id.clone()));
        Ok(id)
    }

    fn check_arc(&self, arc: &Arc) -> Result<(), NetError> {
        if self.arcs.contains_key(arc.id.as_str()) {
            return Err(NetError::duplicate(ComponentKind::Arc, &arc.id));
        }
        if !self.places.contains_key(arc.place.as_str()) {
            return Err(NetError::dangling(
                ComponentKind::Arc,
                &arc.id,
                ComponentKind::Place,
                &arc.place,
            ));
        }
        if !self.transitions.contains_key(arc.transition.as_str()) {
            return Err(NetError::dangling(
                ComponentKind::Arc,
                &arc.id,
                ComponentKind::Transition,
                &arc.transition,
            ));
        }
        if let Some(token) = arc
            .weights
            .keys()
            .find(|token| !self.tokens.contains_key(token.as_str()))
        {
            return Err(NetError::dangling(
                ComponentKind::Arc,
                &arc.id,
                ComponentKind::TokenKind,
                token,
            ));
        }
        Ok(())
    }

    pub fn add_arc(&mut self, mut arc: Arc) -> Result<ArcId, NetError> {
        arc.refresh_id();
        self.check_arc(&arc)?;
        let id = arc.id.clone();
        self.arcs.insert(id.clone(), arc);
        log::debug!("added arc {id}");
        self.notify(NetEvent::ArcAdded(id.clone()));
        Ok(id)
    }

    /// Sets (or replaces) the weight of `token` on `arc`, returning the
    /// previous expression.
    pub fn set_arc_weight(
        &mut self,
        arc: &str,
        token: &str,
        weight: impl Into<WeightExpr>,
    ) -> Result<Option<WeightExpr>, NetError> {
        self.token(token)?;
        let arc = self
            .arcs
            .get_mut(arc)
            .ok_or_else(|| NetError::not_found(ComponentKind::Arc, arc))?;
        let token = TokenId::new(token);
        let weight = weight.into();
        log::debug!("{}.{token}: weight {weight}", arc.id);
        let previous = arc.weights.insert(token.clone(), weight);
        let arc = arc.id.clone();
        self.notify(NetEvent::ArcWeightChanged { arc, token });
        Ok(previous)
    }

    /// Changes a place's capacity; refuses a bound below the current total.
    pub fn set_capacity(
        &mut self,
        place: &str,
        capacity: Option<Weight>,
    ) -> Result<Option<Weight>, NetError> {
        let total = self.marking.total(place);
        let entry = self
            .places
            .get_mut(place)
            .ok_or_else(|| NetError::not_found(ComponentKind::Place, place))?;
        if let Some(capacity) = capacity.filter(|capacity| total > *capacity) {
            return Err(NetError::CapacityExceeded {
                place: entry.id.clone(),
                total,
                capacity,
            });
        }
        let previous = std::mem::replace(&mut entry.capacity, capacity);
        let place = entry.id.clone();
        log::debug!("{place}: capacity {previous:?} -> {capacity:?}");
        self.notify(NetEvent::CapacityChanged { place, capacity });
        Ok(previous)
    }

    /// Sets one count and returns the previous value.
    pub fn set_count(&mut self, place: &str, token: &str, value: i64) -> Result<Weight, NetError> {
        let entry = self.place(place)?;
        let token = self.token(token)?.id.clone();
        let place = entry.id.clone();
        let value = Weight::try_from(value).map_err(|_| NetError::NegativeCount {
            place: place.clone(),
            token: token.clone(),
            value,
        })?;
        let old = self.marking.tokens(&place, &token);
        let total = (self.marking.total(&place) - old)
            .checked_add(value)
            .ok_or_else(|| NetError::CountOverflow {
                place: place.clone(),
            })?;
        if let Some(capacity) = entry.capacity.filter(|capacity| total > *capacity) {
            return Err(NetError::CapacityExceeded {
                place,
                total,
                capacity,
            });
        }
        self.marking.set(&place, &token, value);
        if old != value {
            log::debug!("{place}.{token}: {old} -> {value}");
            self.notify(NetEvent::CountChanged {
                place,
                token,
                old,
                new: value,
            });
        }
        Ok(old)
    }

    // ---- deletion ----

    /// Removes a component and, for places and transitions, every incident
    /// arc first. The returned value is what [`Net::restore`] needs.
    pub fn remove(&mut self, key: &ComponentKey) -> Result<RemovedComponents, NetError> {
        match key {
            ComponentKey::Place(id) => self.place(id).map(|_| ())?,
            ComponentKey::Transition(id) => self.transition(id).map(|_| ())?,
            ComponentKey::Arc(id) => self.arc(id).map(|_| ())?,
        }

        let mut removed = RemovedComponents {
            place: None,
            transition: None,
            arcs: Vec::new(),
        };
        for arc in self.incident_arc_ids(key) {
            if let Some((index, _, arc)) = self.arcs.shift_remove_full(arc.as_str()) {
                removed.arcs.push((index, arc));
            }
        }
        match key {
            ComponentKey::Place(id) => {
                if let Some((index, _, place)) = self.places.shift_remove_full(id.as_str()) {
                    let counts = self.marking.remove_place(id).unwrap_or_default();
                    removed.place = Some(RemovedPlace {
                        index,
                        place,
                        counts,
                    });
                }
            }
            ComponentKey::Transition(id) => {
                removed.transition = self
                    .transitions
                    .shift_remove_full(id.as_str())
                    .map(|(index, _, transition)| (index, transition));
            }
            ComponentKey::Arc(_) => {}
        }

        log::debug!(
            "removed {} {} with {} incident arcs",
            key.kind(),
            key.id(),
            removed.arcs.len()
        );
        self.notify(NetEvent::ComponentsRemoved(removed.keys()));
        Ok(removed)
    }

    /// Puts back what [`Net::remove`] returned, at the original positions.
    pub fn restore(&mut self, removed: RemovedComponents) -> Result<(), NetError> {
        let mut places: HashSet<&str> = self.places.keys().map(|id| id.as_str()).collect();
        let mut transitions: HashSet<&str> =
            self.transitions.keys().map(|id| id.as_str()).collect();
        if let Some(entry) = &removed.place {
            if !places.insert(entry.place.id.as_str()) {
                return Err(NetError::duplicate(ComponentKind::Place, &entry.place.id));
            }
            if let Some(token) = entry
                .counts
                .keys()
                .find(|token| !self.tokens.contains_key(token.as_str()))
            {
                return Err(NetError::dangling(
                    ComponentKind::Place,
                    &entry.place.id,
                    ComponentKind::TokenKind,
                    token,
                ));
            }
            let total = entry
                .counts
                .values()
                .try_fold(0 as Weight, |total, count| total.checked_add(*count));
            if total.is_none() {
                return Err(NetError::CountOverflow {
                    place: entry.place.id.clone(),
                });
            }
        }
        if let Some((_, transition)) = &removed.transition {
            if !transitions.insert(transition.id.as_str()) {
                return Err(NetError::duplicate(ComponentKind::Transition, &transition.id));
            }
        }
        for (_, arc) in &removed.arcs {
            if self.arcs.contains_key(arc.id.as_str()) {
                return Err(NetError::duplicate(ComponentKind::Arc, &arc.id));
            }
            if !places.contains(arc.place.as_str()) {
                return Err(NetError::dangling(
                    ComponentKind::Arc,
                    &arc.id,
                    ComponentKind::Place,
                    &arc.place,
                ));
            }
            if !transitions.contains(arc.transition.as_str()) {
                return Err(NetError::dangling(
                    ComponentKind::Arc,
                    &arc.id,
                    ComponentKind::Transition,
                    &arc.transition,
                ));
            }
            if let Some(token) = arc
                .weights
                .keys()
                .find(|token| !self.tokens.contains_key(token.as_str()))
            {
                return Err(NetError::dangling(
                    ComponentKind::Arc,
                    &arc.id,
                    ComponentKind::TokenKind,
                    token,
                ));
            }
        }

        let keys = removed.keys();
        if let Some(entry) = removed.place {
            let id = entry.place.id.clone();
            let mut counts: TokenCounts =
                self.tokens.keys().map(|token| (token.clone(), 0)).collect();
            counts.extend(entry.counts);
            self.marking.insert_place(id.clone(), counts);
            let index = entry.index.min(self.places.len());
            self.places.shift_insert(index, id, entry.place);
        }
        if let Some((index, transition)) = removed.transition {
            let index = index.min(self.transitions.len());
            self.transitions
                .shift_insert(index, transition.id.clone(), transition);
        }
        for (index, arc) in removed.arcs.into_iter().rev() {
            let index = index.min(self.arcs.len());
            self.arcs.shift_insert(index, arc.id.clone(), arc);
        }
        log::debug!("restored {} components", keys.len());
        self.notify(NetEvent::ComponentsRestored(keys));
        Ok(())
    }

    // ---- renaming ----

    pub fn rename(&mut self, key: &ComponentKey, new_id: &str) -> Result<(), NetError> {
        match key {
            ComponentKey::Place(id) => self.rename_place(id, new_id),
            ComponentKey::Transition(id) => self.rename_transition(id, new_id),
            ComponentKey::Arc(id) => Err(NetError::ImmutableIdentifier {
                kind: ComponentKind::Arc,
                id: id.to_string(),
            }),
        }
    }

    /// Validates that re-deriving the ids of `affected` arcs after a rename
    /// produces no collision, and returns the arcs with their new ids.
    fn rederive_arcs(
        &self,
        affected: &[ArcId],
        update: impl Fn(&mut Arc),
    ) -> Result<Vec<Arc>, NetError> {
        let mut seen = HashSet::new();
        let mut renamed = Vec::with_capacity(affected.len());
        for id in affected {
            let mut arc = self.arc(id)?.clone();
            update(&mut arc);
            arc.refresh_id();
            let untouched = !affected.contains(&arc.id);
            if (untouched && self.arcs.contains_key(arc.id.as_str()))
                || !seen.insert(arc.id.clone())
            {
                return Err(NetError::duplicate(ComponentKind::Arc, &arc.id));
            }
            renamed.push(arc);
        }
        Ok(renamed)
    }

    fn replace_arcs(&mut self, affected: &[ArcId], renamed: Vec<Arc>) {
        let mut slots = Vec::with_capacity(affected.len());
        for id in affected {
            if let Some(index) = self.arcs.get_index_of(id.as_str()) {
                slots.push(index);
            }
        }
        for id in affected {
            self.arcs.shift_remove(id.as_str());
        }
        // 按原位置升序插回，保持迭代顺序不变
        let mut ordered: Vec<(usize, Arc)> = slots.into_iter().zip(renamed).collect();
        ordered.sort_by_key(|(index, _)| *index);
        for (index, arc) in ordered {
            let index = index.min(self.arcs.len());
            self.arcs.shift_insert(index, arc.id.clone(), arc);
        }
    }

    pub fn rename_place(&mut self, id: &str, new_id: &str) -> Result<(), NetError> {
        let old = self.place(id)?.id.clone();
        if new_id == id {
            return Ok(());
        }
        NetError::check_endpoint(ComponentKind::Place, new_id)?;
        if self.places.contains_key(new_id) {
            return Err(NetError::duplicate(ComponentKind::Place, new_id));
        }
        let new = PlaceId::new(new_id);
        let affected = self.incident_arc_ids(&ComponentKey::Place(old.clone()));
        let renamed = self.rederive_arcs(&affected, |arc| arc.place = new.clone())?;

        rekey(&mut self.places, id, new.clone());
        if let Some(place) = self.places.get_mut(new.as_str()) {
            place.id = new.clone();
        }
        self.marking.rename_place(id, &new);
        self.replace_arcs(&affected, renamed);
        for arc in self.arcs.values_mut() {
            for expr in arc.weights.values_mut() {
                expr.rename_place(id, &new);
            }
        }
        log::debug!("renamed place {old} to {new}");
        self.notify(NetEvent::Renamed {
            old: ComponentKey::Place(old),
            new: ComponentKey::Place(new),
        });
        Ok(())
    }

    pub fn rename_transition(&mut self, id: &str, new_id: &str) -> Result<(), NetError> {
        let old = self.transition(id)?.id.clone();
        if new_id == id {
            return Ok(());
        }
        NetError::check_endpoint(ComponentKind::Transition, new_id)?;
        if self.transitions.contains_key(new_id) {
            return Err(NetError::duplicate(ComponentKind::Transition, new_id));
        }
        let new = TransitionId::new(new_id);
        let affected = self.incident_arc_ids(&ComponentKey::Transition(old.clone()));
        let renamed = self.rederive_arcs(&affected, |arc| arc.transition = new.clone())?;

        rekey(&mut self.transitions, id, new.clone());
        if let Some(transition) = self.transitions.get_mut(new.as_str()) {
            transition.id = new.clone();
        }
        self.replace_arcs(&affected, renamed);
        log::debug!("renamed transition {old} to {new}");
        self.notify(NetEvent::Renamed {
            old: ComponentKey::Transition(old),
            new: ComponentKey::Transition(new),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn two_place_net() -> Net {
        let mut net = Net::empty();
        net.add_token_kind(TokenKind::new("black", Color::BLACK)).unwrap();
        net.add_token_kind(TokenKind::new("red", Color::RED)).unwrap();
        net.add_place(Place::new("P")).unwrap();
        net.add_place(Place::new("Q").with_capacity(4)).unwrap();
        net.add_transition(Transition::new("T")).unwrap();
        net.add_arc(Arc::input("P", "T").with_weight("black", 1)).unwrap();
        net.add_arc(Arc::output("T", "Q").with_weight("red", 2)).unwrap();
        net.set_count("P", "black", 2).unwrap();
        net
    }

    #[test]
    fn duplicate_identifiers_are_rejected_per_namespace() {
        let mut net = two_place_net();
        assert_eq!(
            net.add_place(Place::new("P")),
            Err(NetError::duplicate(ComponentKind::Place, "P"))
        );
        assert!(matches!(
            net.add_token_kind(TokenKind::new("red", Color::BLUE)),
            Err(NetError::DuplicateIdentifier { .. })
        ));
        assert!(matches!(
            net.add_arc(Arc::input("P", "T")),
            Err(NetError::DuplicateIdentifier { .. })
        ));
        // 不同命名空间可以同名
        assert!(net.add_transition(Transition::new("P")).is_ok());
    }

    #[test]
    fn arcs_must_reference_existing_endpoints_and_kinds() {
        let mut net = two_place_net();
        let err = net.add_arc(Arc::input("X", "T")).unwrap_err();
        assert!(matches!(
            err,
            NetError::DanglingReference {
                missing: ComponentKind::Place,
                ..
            }
        ));
        let err = net
            .add_arc(Arc::output("T", "P").with_weight("green", 1))
            .unwrap_err();
        assert!(matches!(
            err,
            NetError::DanglingReference {
                missing: ComponentKind::TokenKind,
                ..
            }
        ));
        assert_eq!(net.arcs_len(), 2);
    }

    #[test]
    fn new_places_and_kinds_keep_the_marking_dense() {
        let mut net = two_place_net();
        net.add_place(Place::new("R")).unwrap();
        net.add_token_kind(TokenKind::new("blue", Color::BLUE)).unwrap();
        for place in ["P", "Q", "R"] {
            assert_eq!(net.marking().counts(place).map(|c| c.len()), Some(3));
        }
    }

    #[test]
    fn set_count_validates_sign_and_capacity() {
        let mut net = two_place_net();
        assert!(matches!(
            net.set_count("Q", "red", -1),
            Err(NetError::NegativeCount { value: -1, .. })
        ));
        net.set_count("Q", "red", 3).unwrap();
        assert_eq!(
            net.set_count("Q", "black", 2),
            Err(NetError::CapacityExceeded {
                place: PlaceId::new("Q"),
                total: 5,
                capacity: 4,
            })
        );
        assert_eq!(net.set_count("Q", "red", 4), Ok(3));
        assert!(matches!(
            net.set_count("Q", "green", 1),
            Err(NetError::ComponentNotFound {
                kind: ComponentKind::TokenKind,
                ..
            })
        ));
    }

    #[test]
    fn set_count_keeps_place_totals_in_range() {
        let mut net = Net::empty();
        for kind in ["a", "b", "c", "d"] {
            net.add_token_kind(TokenKind::new(kind, Color::BLACK)).unwrap();
        }
        net.add_place(Place::new("P")).unwrap();
        net.set_count("P", "a", i64::MAX).unwrap();
        net.set_count("P", "b", i64::MAX).unwrap();
        let overflow = Err(NetError::CountOverflow {
            place: PlaceId::new("P"),
        });
        assert_eq!(net.set_count("P", "c", i64::MAX), overflow);
        assert_eq!(net.set_count("P", "c", 1), Ok(0));
        assert_eq!(net.marking().total("P"), Weight::MAX);
        assert_eq!(net.set_count("P", "d", 1), overflow);
        assert_eq!(net.tokens_at("P", "d"), Ok(0));
        // 替换已有计数不会重复累计
        assert_eq!(net.set_count("P", "a", i64::MAX), Ok(i64::MAX as Weight));
    }

    #[test]
    fn restoring_a_kind_cannot_overflow_a_place() {
        let mut net = Net::empty();
        for kind in ["a", "b", "c"] {
            net.add_token_kind(TokenKind::new(kind, Color::BLACK)).unwrap();
        }
        net.add_place(Place::new("P")).unwrap();
        net.set_count("P", "a", i64::MAX).unwrap();
        net.set_count("P", "b", i64::MAX).unwrap();
        let removed = net.remove_token_kind("b").unwrap();
        net.set_count("P", "c", i64::MAX).unwrap();
        let before = net.snapshot();
        assert!(matches!(
            net.restore_token_kind(removed),
            Err(NetError::CountOverflow { .. })
        ));
        assert_eq!(net.snapshot(), before);
    }

    #[test]
    fn node_ids_cannot_carry_the_arc_separator() {
        let mut net = two_place_net();
        for id in ["X TO Y", "TO Y", "X TO"] {
            assert!(matches!(
                net.add_place(Place::new(id)),
                Err(NetError::InvalidIdentifier {
                    kind: ComponentKind::Place,
                    ..
                })
            ));
            assert!(matches!(
                net.add_transition(Transition::new(id)),
                Err(NetError::InvalidIdentifier {
                    kind: ComponentKind::Transition,
                    ..
                })
            ));
        }
        let before = net.snapshot();
        assert!(matches!(
            net.rename_place("P", "P TO Q"),
            Err(NetError::InvalidIdentifier { .. })
        ));
        assert!(matches!(
            net.rename(&ComponentKey::Transition(TransitionId::new("T")), "TO T"),
            Err(NetError::InvalidIdentifier { .. })
        ));
        assert_eq!(net.snapshot(), before);
        assert!(net.add_place(Place::new("TOTAL")).is_ok());
    }

    #[test]
    fn capacity_cannot_drop_below_current_total() {
        let mut net = two_place_net();
        assert!(net.set_capacity("P", Some(1)).is_err());
        assert_eq!(net.set_capacity("P", Some(2)), Ok(None));
        assert_eq!(net.place("P").unwrap().capacity(), Some(2));
    }

    #[test]
    fn removing_a_transition_cascades_and_restores() {
        let mut net = two_place_net();
        let before = net.marking().clone();
        let removed = net
            .remove(&ComponentKey::Transition(TransitionId::new("T")))
            .unwrap();
        assert_eq!(removed.arcs.len(), 2);
        assert_eq!(net.arcs_len(), 0);
        assert!(matches!(
            net.arc("P TO T"),
            Err(NetError::ComponentNotFound { .. })
        ));
        assert_eq!(net.marking(), &before);

        net.restore(removed).unwrap();
        assert_eq!(
            net.arcs().map(|arc| arc.id().to_string()).collect::<Vec<_>>(),
            vec!["P TO T", "T TO Q"]
        );
    }

    #[test]
    fn removing_a_place_takes_its_counts_along() {
        let mut net = two_place_net();
        let removed = net.remove(&ComponentKey::Place(PlaceId::new("P"))).unwrap();
        assert!(!net.marking().contains_place("P"));
        assert_eq!(net.arcs_len(), 1);

        net.add_place(Place::new("P")).unwrap();
        assert!(matches!(
            net.restore(removed.clone()),
            Err(NetError::DuplicateIdentifier { .. })
        ));
        net.remove(&ComponentKey::Place(PlaceId::new("P"))).unwrap();
        net.restore(removed).unwrap();
        assert_eq!(net.tokens_at("P", "black"), Ok(2));
        assert_eq!(net.places().next().map(|p| p.id().as_str()), Some("P"));
    }

    #[test]
    fn renaming_a_place_updates_arcs_marking_and_expressions() {
        let mut net = two_place_net();
        net.set_arc_weight("T TO Q", "black", "#(P, black)".parse::<WeightExpr>().unwrap())
            .unwrap();
        net.rename_place("P", "Start").unwrap();

        assert!(net.place("P").is_err());
        assert!(net.arc("P TO T").is_err());
        let arc = net.arc("Start TO T").unwrap();
        assert_eq!(arc.place(), "Start");
        assert_eq!(net.tokens_at("Start", "black"), Ok(2));
        assert_eq!(
            net.arc("T TO Q").unwrap().weight("black").unwrap().to_string(),
            "#(Start, black)"
        );
        assert_eq!(net.places().next().map(|p| p.id().as_str()), Some("Start"));
    }

    #[test]
    fn failed_rename_leaves_everything_in_place() {
        let mut net = two_place_net();
        let before = net.snapshot();
        assert!(matches!(
            net.rename_place("P", "Q"),
            Err(NetError::DuplicateIdentifier { .. })
        ));
        assert!(matches!(
            net.rename(&ComponentKey::Arc(ArcId::new("P TO T")), "x"),
            Err(NetError::ImmutableIdentifier { .. })
        ));
        assert_eq!(net.snapshot(), before);
    }

    #[test]
    fn renaming_a_transition_rederives_arc_ids() {
        let mut net = two_place_net();
        net.rename_transition("T", "Go").unwrap();
        assert!(net.transition("T").is_err());
        assert!(net.arc("P TO Go").is_ok());
        assert!(net.arc("Go TO Q").is_ok());
        assert_eq!(net.arcs_of("Go").count(), 2);
    }

    #[test]
    fn token_kind_update_renames_and_recolors_independently() {
        let mut net = two_place_net();
        let events = Rc::new(RefCell::new(Vec::new()));
        {
            let events = Rc::clone(&events);
            net.subscribe(move |event| events.borrow_mut().push(event.clone()));
        }

        net.update_token_kind("red", "red", Color::RED).unwrap();
        assert!(RefCell::borrow(&events).is_empty());

        let previous = net.update_token_kind("red", "crimson", Color::RED).unwrap();
        assert_eq!(previous.id(), "red");
        assert_eq!(RefCell::borrow(&events).len(), 1);
        assert!(net.arc("T TO Q").unwrap().weight("crimson").is_some());
        assert_eq!(net.tokens_at("Q", "crimson"), Ok(0));

        net.update_token_kind("crimson", "crimson", Color::BLUE).unwrap();
        assert_eq!(net.token("crimson").unwrap().color(), Color::BLUE);
        assert_eq!(RefCell::borrow(&events).len(), 2);
        assert_eq!(
            net.tokens().map(|k| k.id().as_str()).collect::<Vec<_>>(),
            vec!["black", "crimson"]
        );
    }

    #[test]
    fn token_kind_removal_cascades_and_restores() {
        let mut net = two_place_net();
        let before = net.snapshot();
        let removed = net.remove_token_kind("black").unwrap();
        assert_eq!(removed.counts, vec![(PlaceId::new("P"), 2)]);
        assert_eq!(removed.weights.len(), 1);
        assert!(net.arc("P TO T").unwrap().weights().is_empty());
        assert!(net.marking().counts("P").unwrap().get("black").is_none());

        net.restore_token_kind(removed).unwrap();
        assert_eq!(net.snapshot(), before);
    }

    #[test]
    fn observers_see_completed_mutations_only() {
        let mut net = two_place_net();
        let events = Rc::new(RefCell::new(Vec::new()));
        let id = {
            let events = Rc::clone(&events);
            net.subscribe(move |event| events.borrow_mut().push(event.clone()))
        };
        let _ = net.add_place(Place::new("P"));
        net.add_place(Place::new("R")).unwrap();
        assert!(net.unsubscribe(id));
        net.add_place(Place::new("S")).unwrap();
        assert_eq!(
            *RefCell::borrow(&events),
            vec![NetEvent::PlaceAdded(PlaceId::new("R"))]
        );
        assert_eq!(net.clone().observers.len(), 0);
    }
}

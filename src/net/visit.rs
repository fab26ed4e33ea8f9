//! 组件访问协议：对库所、迁移、弧三类组件统一遍历，按种类分派到访问者。
use std::fmt;
use std::fmt::Write as _;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::net::core::{Net, NetError, RemovedComponents};
use crate::net::ids::{ArcId, PlaceId, TransitionId};
use crate::net::marking::Marking;
use crate::net::observer::NetEvent;
use crate::net::structure::{Arc, ArcDirection, Capabilities, ComponentKind, Place, Transition};

/// Owned handle naming one place, transition or arc.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKey {
    Place(PlaceId),
    Transition(TransitionId),
    Arc(ArcId),
}

impl ComponentKey {
    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentKey::Place(_) => ComponentKind::Place,
            ComponentKey::Transition(_) => ComponentKind::Transition,
            ComponentKey::Arc(_) => ComponentKind::Arc,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ComponentKey::Place(id) => id.as_str(),
            ComponentKey::Transition(id) => id.as_str(),
            ComponentKey::Arc(id) => id.as_str(),
        }
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

pub trait ComponentVisitor {
    type Output;

    fn visit_place(&mut self, place: &Place) -> Self::Output;
    fn visit_transition(&mut self, transition: &Transition) -> Self::Output;
    fn visit_arc(&mut self, arc: &Arc) -> Self::Output;
}

pub trait ComponentVisitorMut {
    type Output;

    fn visit_place(&mut self, place: &mut Place) -> Self::Output;
    fn visit_transition(&mut self, transition: &mut Transition) -> Self::Output;
    fn visit_arc(&mut self, arc: &mut Arc) -> Self::Output;
}

#[derive(Debug, Clone, Copy)]
pub enum ComponentRef<'a> {
    Place(&'a Place),
    Transition(&'a Transition),
    Arc(&'a Arc),
}

impl ComponentRef<'_> {
    pub fn accept<V: ComponentVisitor>(&self, visitor: &mut V) -> V::Output {
        match self {
            ComponentRef::Place(place) => visitor.visit_place(place),
            ComponentRef::Transition(transition) => visitor.visit_transition(transition),
            ComponentRef::Arc(arc) => visitor.visit_arc(arc),
        }
    }

    pub fn key(&self) -> ComponentKey {
        match self {
            ComponentRef::Place(place) => ComponentKey::Place(place.id().clone()),
            ComponentRef::Transition(transition) => {
                ComponentKey::Transition(transition.id().clone())
            }
            ComponentRef::Arc(arc) => ComponentKey::Arc(arc.id().clone()),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        capabilities_of(self.key().kind())
    }

    pub fn is_selectable(&self) -> bool {
        self.capabilities().contains(Capabilities::SELECTABLE)
    }

    pub fn is_draggable(&self) -> bool {
        self.capabilities().contains(Capabilities::DRAGGABLE)
    }
}

pub enum ComponentMut<'a> {
    Place(&'a mut Place),
    Transition(&'a mut Transition),
    Arc(&'a mut Arc),
}

impl ComponentMut<'_> {
    pub fn accept<V: ComponentVisitorMut>(&mut self, visitor: &mut V) -> V::Output {
        match self {
            ComponentMut::Place(place) => visitor.visit_place(place),
            ComponentMut::Transition(transition) => visitor.visit_transition(transition),
            ComponentMut::Arc(arc) => visitor.visit_arc(arc),
        }
    }
}

fn capabilities_of(kind: ComponentKind) -> Capabilities {
    match kind {
        ComponentKind::Place => Place::CAPABILITIES,
        ComponentKind::Transition => Transition::CAPABILITIES,
        ComponentKind::Arc => Arc::CAPABILITIES,
        ComponentKind::TokenKind => Capabilities::empty(),
    }
}

/// Moves places and transitions by a fixed offset; arcs have no coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationVisitor {
    pub dx: i32,
    pub dy: i32,
}

impl ComponentVisitorMut for TranslationVisitor {
    type Output = Option<(i32, i32)>;

    fn visit_place(&mut self, place: &mut Place) -> Self::Output {
        place.x = place.x.saturating_add(self.dx);
        place.y = place.y.saturating_add(self.dy);
        Some((place.x, place.y))
    }

    fn visit_transition(&mut self, transition: &mut Transition) -> Self::Output {
        transition.x = transition.x.saturating_add(self.dx);
        transition.y = transition.y.saturating_add(self.dy);
        Some((transition.x, transition.y))
    }

    fn visit_arc(&mut self, _arc: &mut Arc) -> Self::Output {
        None
    }
}

/// Graphviz rendering of the net structure with the given marking.
pub struct DotExport<'a> {
    marking: &'a Marking,
    dot: String,
}

impl<'a> DotExport<'a> {
    pub fn new(marking: &'a Marking) -> Self {
        let mut dot = String::new();
        let _ = writeln!(&mut dot, "digraph PetriNet {{");
        let _ = writeln!(&mut dot, "    rankdir=LR;");
        let _ = writeln!(&mut dot, "    node [fontname=\"Helvetica\"];");
        Self { marking, dot }
    }

    pub fn finish(mut self) -> String {
        self.dot.push_str("}\n");
        self.dot
    }
}

impl ComponentVisitor for DotExport<'_> {
    type Output = ();

    fn visit_place(&mut self, place: &Place) {
        let tokens = self
            .marking
            .counts(place.id())
            .into_iter()
            .flatten()
            .filter(|(_, count)| **count > 0)
            .map(|(token, count)| format!("{token}={count}"))
            .join(" ");
        let capacity = place
            .capacity()
            .map_or_else(|| "inf".to_string(), |capacity| capacity.to_string());
        let label = format!(
            "{}\\n{}\\n/{}",
            escape_label(place.id()),
            escape_label(&tokens),
            capacity
        );
        let _ = writeln!(
            &mut self.dot,
            "    \"p:{}\" [label=\"{}\", shape=circle, style=filled, fillcolor=\"#e3f2fd\"];",
            escape_label(place.id()),
            label
        );
    }

    fn visit_transition(&mut self, transition: &Transition) {
        let _ = writeln!(
            &mut self.dot,
            "    \"t:{0}\" [label=\"{0}\", shape=box, style=filled, fillcolor=\"#ffe0b2\"];",
            escape_label(transition.id())
        );
    }

    fn visit_arc(&mut self, arc: &Arc) {
        let place = format!("\"p:{}\"", escape_label(arc.place()));
        let transition = format!("\"t:{}\"", escape_label(arc.transition()));
        let (source, target) = match arc.direction() {
            ArcDirection::PlaceToTransition => (place, transition),
            ArcDirection::TransitionToPlace => (transition, place),
        };
        let label = arc
            .weights()
            .iter()
            .map(|(token, expr)| format!("{token}: {expr}"))
            .join(", ");
        let head = if arc.is_inhibitor() {
            ", arrowhead=odot"
        } else {
            ""
        };
        let _ = writeln!(
            &mut self.dot,
            "    {} -> {} [label=\"{}\"{}];",
            source,
            target,
            escape_label(&label),
            head
        );
    }
}

fn escape_label(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

impl Net {
    pub fn component(&self, key: &ComponentKey) -> Result<ComponentRef<'_>, NetError> {
        Ok(match key {
            ComponentKey::Place(id) => ComponentRef::Place(self.place(id)?),
            ComponentKey::Transition(id) => ComponentRef::Transition(self.transition(id)?),
            ComponentKey::Arc(id) => ComponentRef::Arc(self.arc(id)?),
        })
    }

    /// Looks a component up by category and id; a wrong category is the
    /// same as a missing id.
    pub fn component_by(
        &self,
        kind: ComponentKind,
        id: &str,
    ) -> Result<ComponentRef<'_>, NetError> {
        match kind {
            ComponentKind::Place => self.place(id).map(ComponentRef::Place),
            ComponentKind::Transition => self.transition(id).map(ComponentRef::Transition),
            ComponentKind::Arc => self.arc(id).map(ComponentRef::Arc),
            ComponentKind::TokenKind => Err(NetError::not_found(kind, id)),
        }
    }

    fn component_mut(&mut self, key: &ComponentKey) -> Result<ComponentMut<'_>, NetError> {
        let missing = || NetError::not_found(key.kind(), key.id());
        Ok(match key {
            ComponentKey::Place(id) => {
                ComponentMut::Place(self.places.get_mut(id.as_str()).ok_or_else(missing)?)
            }
            ComponentKey::Transition(id) => ComponentMut::Transition(
                self.transitions.get_mut(id.as_str()).ok_or_else(missing)?,
            ),
            ComponentKey::Arc(id) => {
                ComponentMut::Arc(self.arcs.get_mut(id.as_str()).ok_or_else(missing)?)
            }
        })
    }

    /// Places, then transitions, then arcs, each in insertion order.
    pub fn components(&self) -> impl Iterator<Item = ComponentRef<'_>> {
        self.places
            .values()
            .map(ComponentRef::Place)
            .chain(self.transitions.values().map(ComponentRef::Transition))
            .chain(self.arcs.values().map(ComponentRef::Arc))
    }

    pub fn visit<V: ComponentVisitor>(&self, visitor: &mut V) -> Vec<V::Output> {
        self.components()
            .map(|component| component.accept(visitor))
            .collect()
    }

    /// Moves every draggable component in `keys` by `(dx, dy)` and returns
    /// the keys that actually moved. Unknown keys fail the whole request;
    /// a key listed twice moves once.
    pub fn translate(
        &mut self,
        keys: &[ComponentKey],
        dx: i32,
        dy: i32,
    ) -> Result<Vec<ComponentKey>, NetError> {
        for key in keys {
            self.component(key)?;
        }
        let mut visitor = TranslationVisitor { dx, dy };
        let mut moved = Vec::new();
        let draggable = keys
            .iter()
            .unique()
            .filter(|key| capabilities_of(key.kind()).contains(Capabilities::DRAGGABLE));
        for key in draggable {
            let position = self.component_mut(key)?.accept(&mut visitor);
            if let Some((x, y)) = position {
                moved.push(key.clone());
                self.notify(NetEvent::Translated {
                    component: key.clone(),
                    x,
                    y,
                });
            }
        }
        log::debug!(
            "translated {} of {} components by ({dx}, {dy})",
            moved.len(),
            keys.len()
        );
        Ok(moved)
    }

    /// Deletes a selection. Keys already gone through an earlier cascade in
    /// the same call are skipped; unknown keys fail before anything is removed.
    pub fn remove_all(
        &mut self,
        keys: &[ComponentKey],
    ) -> Result<Vec<RemovedComponents>, NetError> {
        for key in keys {
            self.component(key)?;
        }
        let mut removed = Vec::new();
        for key in keys {
            if self.component(key).is_ok() {
                removed.push(self.remove(key)?);
            }
        }
        Ok(removed)
    }

    pub fn to_dot(&self) -> String {
        let mut export = DotExport::new(&self.marking);
        self.visit(&mut export);
        export.finish()
    }
}

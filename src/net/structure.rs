//! 网的静态结构元素：令牌种类、库所、迁移与弧。
use std::fmt;

use bitflags::bitflags;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::net::ids::{ArcId, PlaceId, TokenId, TransitionId};
use crate::net::weight::WeightExpr;

pub type Weight = u64;

/// The four identifier namespaces of a net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    TokenKind,
    Place,
    Transition,
    Arc,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComponentKind::TokenKind => "token kind",
            ComponentKind::Place => "place",
            ComponentKind::Transition => "transition",
            ComponentKind::Arc => "arc",
        })
    }
}

bitflags! {
    /// Flags consulted by selection and drag handling in front ends.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        const SELECTABLE = 1;
        const DRAGGABLE = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenKind {
    pub(crate) id: TokenId,
    pub(crate) color: Color,
}

impl TokenKind {
    pub fn new(id: impl Into<TokenId>, color: Color) -> Self {
        Self {
            id: id.into(),
            color,
        }
    }

    pub fn id(&self) -> &TokenId {
        &self.id
    }

    pub fn color(&self) -> Color {
        self.color
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub(crate) id: PlaceId,
    /// 总令牌数上限，`None` 表示无界
    pub(crate) capacity: Option<Weight>,
    pub x: i32,
    pub y: i32,
}

impl Place {
    pub const CAPABILITIES: Capabilities = Capabilities::SELECTABLE.union(Capabilities::DRAGGABLE);

    pub fn new(id: impl Into<PlaceId>) -> Self {
        Self {
            id: id.into(),
            capacity: None,
            x: 0,
            y: 0,
        }
    }

    pub fn with_capacity(mut self, capacity: Weight) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn id(&self) -> &PlaceId {
        &self.id
    }

    pub fn capacity(&self) -> Option<Weight> {
        self.capacity
    }

    /// Whether `total` tokens fit; an unbounded place admits anything.
    pub fn admits(&self, total: Weight) -> bool {
        self.capacity.is_none_or(|capacity| total <= capacity)
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub(crate) id: TransitionId,
    pub x: i32,
    pub y: i32,
    pub priority: u32,
    pub rate: f64,
    /// Timed transitions are enabled exactly like immediate ones; the flag
    /// only matters to schedulers.
    pub timed: bool,
    pub infinite_server: bool,
    pub guard: Option<String>,
}

impl Transition {
    pub const CAPABILITIES: Capabilities = Capabilities::SELECTABLE.union(Capabilities::DRAGGABLE);

    pub fn new(id: impl Into<TransitionId>) -> Self {
        Self {
            id: id.into(),
            x: 0,
            y: 0,
            priority: 1,
            rate: 1.0,
            timed: false,
            infinite_server: false,
            guard: None,
        }
    }

    pub fn timed(id: impl Into<TransitionId>, rate: f64) -> Self {
        Self {
            rate,
            timed: true,
            ..Self::new(id)
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn id(&self) -> &TransitionId {
        &self.id
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transition").field(&self.id).finish()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ArcDirection {
    PlaceToTransition,
    TransitionToPlace,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ArcKind {
    Normal,
    /// 仅测试阈值，不消耗也不产生令牌
    Inhibitor,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Arc {
    pub(crate) id: ArcId,
    pub(crate) place: PlaceId,
    pub(crate) transition: TransitionId,
    pub(crate) direction: ArcDirection,
    pub(crate) kind: ArcKind,
    pub(crate) weights: IndexMap<TokenId, WeightExpr>,
}

impl Arc {
    pub const CAPABILITIES: Capabilities = Capabilities::SELECTABLE;

    fn new(
        place: PlaceId,
        transition: TransitionId,
        direction: ArcDirection,
        kind: ArcKind,
    ) -> Self {
        let mut arc = Self {
            id: ArcId::new(String::new()),
            place,
            transition,
            direction,
            kind,
            weights: IndexMap::new(),
        };
        arc.refresh_id();
        arc
    }

    /// 输入弧: place -> transition
    pub fn input(place: impl Into<PlaceId>, transition: impl Into<TransitionId>) -> Self {
        Self::new(
            place.into(),
            transition.into(),
            ArcDirection::PlaceToTransition,
            ArcKind::Normal,
        )
    }

    /// 输出弧: transition -> place
    pub fn output(transition: impl Into<TransitionId>, place: impl Into<PlaceId>) -> Self {
        Self::new(
            place.into(),
            transition.into(),
            ArcDirection::TransitionToPlace,
            ArcKind::Normal,
        )
    }

    /// 抑制弧: place -o transition
    pub fn inhibitor(place: impl Into<PlaceId>, transition: impl Into<TransitionId>) -> Self {
        Self::new(
            place.into(),
            transition.into(),
            ArcDirection::PlaceToTransition,
            ArcKind::Inhibitor,
        )
    }

    pub fn with_weight(self, token: impl Into<TokenId>, weight: Weight) -> Self {
        self.with_expr(token, WeightExpr::Literal(weight))
    }

    pub fn with_expr(mut self, token: impl Into<TokenId>, expr: WeightExpr) -> Self {
        self.weights.insert(token.into(), expr);
        self
    }

    pub fn id(&self) -> &ArcId {
        &self.id
    }

    pub fn place(&self) -> &PlaceId {
        &self.place
    }

    pub fn transition(&self) -> &TransitionId {
        &self.transition
    }

    pub fn direction(&self) -> ArcDirection {
        self.direction
    }

    pub fn kind(&self) -> ArcKind {
        self.kind
    }

    pub fn is_inhibitor(&self) -> bool {
        self.kind == ArcKind::Inhibitor
    }

    pub fn weights(&self) -> &IndexMap<TokenId, WeightExpr> {
        &self.weights
    }

    pub fn weight(&self, token: &str) -> Option<&WeightExpr> {
        self.weights.get(token)
    }

    pub fn source(&self) -> &str {
        match self.direction {
            ArcDirection::PlaceToTransition => &self.place,
            ArcDirection::TransitionToPlace => &self.transition,
        }
    }

    pub fn target(&self) -> &str {
        match self.direction {
            ArcDirection::PlaceToTransition => &self.transition,
            ArcDirection::TransitionToPlace => &self.place,
        }
    }

    pub(crate) fn refresh_id(&mut self) {
        self.id = ArcId::between(self.source(), self.target());
    }
}

impl fmt::Debug for Arc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arc")
            .field("place", &self.place)
            .field("transition", &self.transition)
            .field("direction", &self.direction)
            .field("kind", &self.kind)
            .field("weights", &self.weights)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arc_ids_follow_direction() {
        assert_eq!(Arc::input("P0", "T0").id(), "P0 TO T0");
        assert_eq!(Arc::output("T0", "P0").id(), "T0 TO P0");
        assert_eq!(Arc::inhibitor("P0", "T0").source(), "P0");
        assert!(Arc::inhibitor("P0", "T0").is_inhibitor());
    }

    #[test]
    fn arcs_are_selectable_but_not_draggable() {
        assert!(Arc::CAPABILITIES.contains(Capabilities::SELECTABLE));
        assert!(!Arc::CAPABILITIES.contains(Capabilities::DRAGGABLE));
        assert!(Place::CAPABILITIES.contains(Capabilities::DRAGGABLE));
    }

    #[test]
    fn unbounded_place_admits_any_total() {
        assert!(Place::new("p").admits(u64::MAX));
        assert!(Place::new("p").with_capacity(5).admits(5));
        assert!(!Place::new("p").with_capacity(5).admits(6));
    }

    #[test]
    fn color_renders_as_hex() {
        assert_eq!(Color::rgb(160, 92, 240).to_string(), "#a05cf0");
    }
}

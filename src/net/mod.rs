//! # 着色 Petri 网核心
//!
//! 网由令牌种类、库所、迁移与弧组成，标识 `M` 为每个库所按种类计数的多重集。
//! 对弧 `a` 与种类 `k`，权重 `w(a, k)` 是常量或依赖当前标识的表达式。
//!
//! * 迁移 `t` **可激发** 当且仅当在当前标识 `M` 下同时满足：
//!   1. 对每条输入弧 `(p, t)`：`∀k: M[p][k] ≥ w(a, k)`；
//!   2. 对每条抑制弧 `(p, t)` 与每个 `w(a, k) > 0`：`M[p][k] < w(a, k)`；
//!   3. 对每个输出库所 `p`：`Σ_k M[p][k] + Σ_k w(a, k) ≤ cap(p)`（不考虑同次激发释放的令牌）。
//! * **激发** 以激发前标识一次算出增量 `Δ` 并整体写入 `M' = M + Δ`；
//!   撤销时回放 `-Δ`，不重新求值。
//!
//! 提供的核心 API 支持：
//! * 组件增删改名（级联删除、可逆恢复）与变更通知；
//! * 可激发集计算、单步激发、撤销与重做；
//! * 组件访问者、DOT 导出、有界可达图；
//! * JSON/RON 序列化。
//!
//! ## 示例
//!
//! ```rust
//! use pnsim::net::*;
//!
//! let mut net = Net::empty();
//! net.add_token_kind(TokenKind::new("black", Color::BLACK)).unwrap();
//! net.add_place(Place::new("p0")).unwrap();
//! net.add_place(Place::new("p1").with_capacity(1)).unwrap();
//! net.add_transition(Transition::new("t0")).unwrap();
//! net.add_arc(Arc::input("p0", "t0").with_weight("black", 1)).unwrap();
//! net.add_arc(Arc::output("t0", "p1").with_weight("black", 1)).unwrap();
//! net.set_count("p0", "black", 1).unwrap();
//!
//! assert_eq!(net.enabled_transitions().unwrap(), vec![TransitionId::new("t0")]);
//! let delta = net.fire("t0").unwrap();
//! assert_eq!(net.tokens_at("p1", "black").unwrap(), 1);
//! net.unfire(&delta).unwrap();
//! assert_eq!(net.tokens_at("p0", "black").unwrap(), 1);
//! ```

pub mod core;
pub mod firing;
pub mod ids;
pub mod io;
pub mod marking;
pub mod observer;
pub mod reachability;
pub mod structure;
pub mod visit;
pub mod weight;

pub use self::core::{Net, NetError, NetSnapshot, RemovedComponents, RemovedPlace, RemovedTokenKind};
pub use firing::FiringDelta;
pub use ids::{ArcId, PlaceId, TokenId, TransitionId};
pub use io::{IoError, OutputFormat};
pub use marking::{Marking, TokenCounts};
pub use observer::{NetEvent, SubscriberId};
pub use reachability::{ReachabilityEdge, ReachabilityGraph};
pub use structure::{
    Arc, ArcDirection, ArcKind, Capabilities, Color, ComponentKind, Place, TokenKind, Transition,
    Weight,
};
pub use visit::{
    ComponentKey, ComponentMut, ComponentRef, ComponentVisitor, ComponentVisitorMut, DotExport,
    TranslationVisitor,
};
pub use weight::{ArcWeightEvaluator, BinOp, EvalContext, ParseWeightError, WeightError, WeightExpr};

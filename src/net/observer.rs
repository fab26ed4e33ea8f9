//! 变更通知：变更完成后按订阅顺序同步回调。
//!
//! 回调只拿到事件本身，拿不到 `&mut Net`，因此无法重入触发它的变更。
use std::fmt;

use crate::net::ids::{ArcId, PlaceId, TokenId, TransitionId};
use crate::net::structure::{Color, Weight};
use crate::net::visit::ComponentKey;

#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    TokenKindAdded(TokenId),
    TokenKindRenamed {
        old: TokenId,
        new: TokenId,
    },
    TokenKindRecolored {
        token: TokenId,
        color: Color,
    },
    TokenKindRemoved(TokenId),
    PlaceAdded(PlaceId),
    TransitionAdded(TransitionId),
    ArcAdded(ArcId),
    ArcWeightChanged {
        arc: ArcId,
        token: TokenId,
    },
    Renamed {
        old: ComponentKey,
        new: ComponentKey,
    },
    ComponentsRemoved(Vec<ComponentKey>),
    ComponentsRestored(Vec<ComponentKey>),
    CapacityChanged {
        place: PlaceId,
        capacity: Option<Weight>,
    },
    CountChanged {
        place: PlaceId,
        token: TokenId,
        old: Weight,
        new: Weight,
    },
    Fired(TransitionId),
    Unfired(TransitionId),
    Replayed(TransitionId),
    Translated {
        component: ComponentKey,
        x: i32,
        y: i32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

pub type Subscriber = Box<dyn FnMut(&NetEvent)>;

#[derive(Default)]
pub(crate) struct Observers {
    next: u64,
    subscribers: Vec<(SubscriberId, Subscriber)>,
}

impl Observers {
    pub(crate) fn subscribe(&mut self, subscriber: Subscriber) -> SubscriberId {
        let id = SubscriberId(self.next);
        self.next += 1;
        self.subscribers.push((id, subscriber));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    pub(crate) fn notify(&mut self, event: NetEvent) {
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&event);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

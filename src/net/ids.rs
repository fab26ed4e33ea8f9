//! 组件标识符：库所、迁移、弧与令牌种类各自独立的命名空间。
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, stringify!($name))?;
                f.debug_tuple("").field(&self.0).finish()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

define_id!(TokenId);
define_id!(PlaceId);
define_id!(TransitionId);
define_id!(ArcId);

/// Separator between the two endpoints of a derived arc id.
pub const ARC_SEPARATOR: &str = " TO ";

impl ArcId {
    /// Arc identifiers are never chosen by the caller; they follow the
    /// endpoints so that one direction between two nodes maps to one id.
    pub fn between(source: &str, target: &str) -> Self {
        Self(format!("{source}{ARC_SEPARATOR}{target}"))
    }
}

/// Whether `id` may name a place or transition. The separator of a derived
/// arc id must occur exactly once in it, so an endpoint may neither contain
/// it nor complete it at either end.
pub fn is_endpoint_id(id: &str) -> bool {
    !(id.contains(ARC_SEPARATOR) || id.starts_with("TO ") || id.ends_with(" TO"))
}

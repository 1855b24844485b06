use std::any::Any;
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A type-erased, thread-safe container for a single annotation value.
pub type Dynamic = Arc<dyn Any + Send + Sync>;

/// Atomic reference-counted string type used for identifiers.
pub(crate) type ArcStr = Arc<str>;

/// Ordered set of annotation keys.
pub type KeySet = BTreeSet<Key>;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(ArcStr);

        impl $name {
            pub fn new(name: impl AsRef<str>) -> Self {
                Self(name.as_ref().into())
            }

            pub fn as_str(&self) -> &str {
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
                Self(value.into())
            }
        }

        impl From<&$name> for $name {
            fn from(value: &$name) -> Self {
                value.clone()
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:?}", &*self.0)
            }
        }
    };
}

identifier! {
    /// Names one kind of derived value, e.g. `"type-path"` or `"derived-id"`.
    ///
    /// Keys are unique within one [`Registry`](crate::Registry), and all
    /// strategies registered under the same key are requested and removed as a
    /// single unit.
    Key
}

identifier! {
    /// Stable identifier of a node's runtime shape, used to pick the strategy
    /// that applies to a node. Matching is exact, there is no notion of a
    /// supertype.
    Kind
}

/// Whether a strategy runs before or after the descendants of a node are
/// visited during the same traversal pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Pre,
    Post,
}

/// Collects anything key-like into a [`KeySet`].
pub fn keys<I, K>(keys: I) -> KeySet
where
    I: IntoIterator<Item = K>,
    K: Into<Key>,
{
    keys.into_iter().map(Into::into).collect()
}

pub(crate) fn format_keys(keys: &KeySet) -> String {
    let names: Vec<_> = keys.iter().map(Key::as_str).collect();
    format!("{{{}}}", names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_borrow_lookup() {
        let set = keys(["b", "a"]);
        assert!(set.contains("a"));
        assert_eq!(format_keys(&set), "{a, b}");
    }

    #[test]
    fn test_order_serde() {
        let order: Order = serde_json::from_str(r#""post""#).unwrap();
        assert_eq!(order, Order::Post);
        assert_eq!(Order::default(), Order::Pre);
    }
}

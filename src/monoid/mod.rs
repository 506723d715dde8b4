//! Combinable values
//!
//! A [`Monoid`] is a value with an associative `combine` and an `identity`
//! element. Every map-reduce in this crate folds per-task results through this
//! trait, so the order in which tasks finish never changes the combined value
//! beyond what associativity allows.
//!
//! # Example
//!
//! ```
//! use procmap::monoid::{msum, Monoid, Sum};
//!
//! let total = msum(vec![Sum(4), Sum(5)]);
//! assert_eq!(total, Sum(9));
//! assert_eq!(msum(Vec::<Sum<i64>>::new()), Sum::identity());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Add;

/// A value type with an associative merge and a two-sided identity.
///
/// Implementations must satisfy:
/// - `a.combine(b).combine(c) == a.combine(b.combine(c))`
/// - `Self::identity().combine(x) == x == x.combine(Self::identity())`
pub trait Monoid: Sized {
    /// The neutral element of [`Monoid::combine`]
    fn identity() -> Self;

    /// Merge two values; must be associative
    fn combine(self, other: Self) -> Self;
}

/// Fold a sequence of monoid values, starting from the identity.
pub fn msum<M, I>(items: I) -> M
where
    M: Monoid,
    I: IntoIterator<Item = M>,
{
    items.into_iter().fold(M::identity(), M::combine)
}

/// Numeric sum, with zero as identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sum<T>(pub T);

impl<T> Monoid for Sum<T>
where
    T: Add<Output = T> + Default,
{
    fn identity() -> Self {
        Sum(T::default())
    }

    fn combine(self, other: Self) -> Self {
        Sum(self.0 + other.0)
    }
}

impl<T> Monoid for Vec<T> {
    fn identity() -> Self {
        Vec::new()
    }

    fn combine(mut self, mut other: Self) -> Self {
        self.append(&mut other);
        self
    }
}

impl Monoid for String {
    fn identity() -> Self {
        String::new()
    }

    fn combine(mut self, other: Self) -> Self {
        self.push_str(&other);
        self
    }
}

impl Monoid for () {
    fn identity() -> Self {}

    fn combine(self, _other: Self) -> Self {}
}

impl<A: Monoid, B: Monoid> Monoid for (A, B) {
    fn identity() -> Self {
        (A::identity(), B::identity())
    }

    fn combine(self, other: Self) -> Self {
        (self.0.combine(other.0), self.1.combine(other.1))
    }
}

/// Key-wise merge; values under the same key are combined.
impl<K: Ord, V: Monoid> Monoid for BTreeMap<K, V> {
    fn identity() -> Self {
        BTreeMap::new()
    }

    fn combine(mut self, other: Self) -> Self {
        for (key, value) in other {
            let merged = match self.remove(&key) {
                Some(existing) => existing.combine(value),
                None => value,
            };
            self.insert(key, merged);
        }
        self
    }
}

mod codec;


pub use codec::{KeyCodec, order_cursor};

use derive_more::Deref;
use serde_json::Value;
use std::{
    cmp::Ordering,
    fmt::{self, Display},
};
use thiserror::Error as ThisError;

///
/// KeyError
/// (interface boundary: user-supplied keys)
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum KeyError {
    #[error("document key must be a non-empty string")]
    Empty,

    #[error("document key must be a finite number")]
    NonFinite,

    #[error("document key must be a string or a number, got {kind}")]
    NonScalar { kind: &'static str },
}

///
/// KeyElement
///
/// One component of a composite key. The element-wise total order is the
/// contract every KVS backend must preserve: null < bool < number < string,
/// numbers numerically, strings lexicographically by unicode scalar.
///

#[derive(Clone, Debug)]
pub enum KeyElement {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl KeyElement {
    /// Rank used to order heterogeneous element types.
    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Number(_) => 2,
            Self::String(_) => 3,
        }
    }

    /// Convert a JSON scalar into a key element.
    ///
    /// Arrays and objects have no position in the key order and yield `None`,
    /// which index maintenance treats the same as an absent value.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => {
                serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number)
            }
            Self::String(s) => Value::String(s.clone()),
        }
    }
}

impl PartialEq for KeyElement {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyElement {}

impl PartialOrd for KeyElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyElement {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Display for KeyElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<&str> for KeyElement {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for KeyElement {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for KeyElement {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for KeyElement {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&DocKey> for KeyElement {
    fn from(key: &DocKey) -> Self {
        match key {
            DocKey::Number(n) => Self::Number(*n),
            DocKey::String(s) => Self::String(s.clone()),
        }
    }
}

///
/// TupleKey
///
/// Ordered tuple of key elements. Backends order entries by the derived
/// lexicographic `Ord`; a shorter tuple sorts before every tuple it prefixes.
///

#[derive(Clone, Debug, Default, Deref, Eq, Ord, PartialEq, PartialOrd)]
pub struct TupleKey(Vec<KeyElement>);

impl TupleKey {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn from_elements(elements: Vec<KeyElement>) -> Self {
        Self(elements)
    }

    pub fn push(&mut self, element: impl Into<KeyElement>) {
        self.0.push(element.into());
    }

    /// Return a copy of `self` with `tail`'s elements appended.
    #[must_use]
    pub fn join(&self, tail: &Self) -> Self {
        let mut out = self.clone();
        out.0.extend(tail.0.iter().cloned());
        out
    }

    /// True when `prefix`'s elements are the leading elements of `self`.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl Display for TupleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, element) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{element}")?;
        }
        write!(f, "]")
    }
}

impl<E: Into<KeyElement>> FromIterator<E> for TupleKey {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

///
/// DocKey
///
/// User-supplied document identifier: a non-empty string or a finite number.
///

#[derive(Clone, Debug)]
pub enum DocKey {
    Number(f64),
    String(String),
}

impl DocKey {
    /// Reject keys the store cannot address: empty strings and non-finite
    /// numbers.
    pub fn validate(&self) -> Result<(), KeyError> {
        match self {
            Self::String(s) if s.is_empty() => Err(KeyError::Empty),
            Self::Number(n) if !n.is_finite() => Err(KeyError::NonFinite),
            _ => Ok(()),
        }
    }

    /// Decode a document key from the trailing element of a stored tuple.
    pub fn from_element(element: &KeyElement) -> Result<Self, KeyError> {
        match element {
            KeyElement::Number(n) => Ok(Self::Number(*n)),
            KeyElement::String(s) => Ok(Self::String(s.clone())),
            KeyElement::Null => Err(KeyError::NonScalar { kind: "null" }),
            KeyElement::Bool(_) => Err(KeyError::NonScalar { kind: "bool" }),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Number(n) => {
                serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number)
            }
            Self::String(s) => Value::String(s.clone()),
        }
    }
}

impl PartialEq for DocKey {
    fn eq(&self, other: &Self) -> bool {
        KeyElement::from(self) == KeyElement::from(other)
    }
}

impl Eq for DocKey {}

impl PartialOrd for DocKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DocKey {
    fn cmp(&self, other: &Self) -> Ordering {
        KeyElement::from(self).cmp(&KeyElement::from(other))
    }
}

impl Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for DocKey {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for DocKey {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for DocKey {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for DocKey {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<u32> for DocKey {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i32> for DocKey {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

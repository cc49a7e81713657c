//! Property values extracted from items for sorting, grouping and filtering.

use std::cmp::Ordering;
use std::fmt;

/// A dynamically typed value read from an item through a property path.
///
/// `PropertyValue` is what sort descriptors compare, what group descriptors
/// use as group keys, and what filter expressions test against.
///
/// # Example
///
/// ```
/// use horizon_views::PropertyValue;
///
/// let value = PropertyValue::from("Seattle");
/// assert_eq!(value.as_str(), Some("Seattle"));
/// assert!(PropertyValue::None < PropertyValue::from(0));
/// ```
#[derive(Debug, Clone, Default)]
pub enum PropertyValue {
    /// No value (null).
    #[default]
    None,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Text value.
    String(String),
}

impl PropertyValue {
    /// Returns `true` if this is `PropertyValue::None`.
    pub fn is_none(&self) -> bool {
        matches!(self, PropertyValue::None)
    }

    /// Attempts to get the value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Attempts to get the value as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to get the value as a float. Integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(n) => Some(*n),
            PropertyValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Attempts to get the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Rank used to order values of incompatible kinds.
    fn rank(&self) -> u8 {
        match self {
            PropertyValue::None => 0,
            PropertyValue::Bool(_) => 1,
            PropertyValue::Int(_) | PropertyValue::Float(_) => 2,
            PropertyValue::String(_) => 3,
        }
    }

    /// Culture-independent total order.
    ///
    /// Null sorts before everything, then values are ranked by kind
    /// (`Bool < Number < String`). Integers and floats compare numerically;
    /// strings compare by code point.
    pub fn compare_ordinal(&self, other: &Self) -> Ordering {
        self.compare_with(other, |a, b| a.cmp(b))
    }

    /// Like [`compare_ordinal`](Self::compare_ordinal), with a custom string comparison.
    pub fn compare_with<F>(&self, other: &Self, compare_text: F) -> Ordering
    where
        F: FnOnce(&str, &str) -> Ordering,
    {
        match (self, other) {
            (PropertyValue::None, PropertyValue::None) => Ordering::Equal,
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => a.cmp(b),
            (PropertyValue::Int(a), PropertyValue::Int(b)) => a.cmp(b),
            (PropertyValue::String(a), PropertyValue::String(b)) => compare_text(a, b),
            (a, b) if a.rank() == 2 && b.rank() == 2 => {
                let (x, y) = (a.as_float().unwrap_or_default(), b.as_float().unwrap_or_default());
                x.total_cmp(&y)
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        self.compare_ordinal(other).is_eq()
    }
}

impl PartialOrd for PropertyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare_ordinal(other))
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::None => write!(f, "(none)"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Int(n) => write!(f, "{n}"),
            PropertyValue::Float(n) => write!(f, "{n}"),
            PropertyValue::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<&String> for PropertyValue {
    fn from(s: &String) -> Self {
        PropertyValue::String(s.clone())
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Int(n)
    }
}

impl From<i32> for PropertyValue {
    fn from(n: i32) -> Self {
        PropertyValue::Int(n as i64)
    }
}

impl From<u32> for PropertyValue {
    fn from(n: u32) -> Self {
        PropertyValue::Int(n as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Float(n)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(PropertyValue::None, Into::into)
    }
}

//! Typed resource values and the arithmetic used to match them.
//!
//! Values come in three shapes: scalars (cpus, mem, disk), range sets
//! (ports) and discrete sets. Arithmetic is only defined between values of
//! the same shape; mixing shapes is an error for `add`/`subtract` and
//! always-insufficient for [`Value::is_satisfied_by`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Scalars are tracked with three decimal places of precision.
const SCALAR_PRECISION: f64 = 1000.0;

/// Shape of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Floating point quantity
    Scalar,
    /// Set of inclusive integer ranges
    Ranges,
    /// Set of discrete strings
    Set,
}

/// An inclusive integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Range {
    /// First value in the range
    pub begin: u64,
    /// Last value in the range
    pub end: u64,
}

impl Range {
    /// Create a range, swapping the bounds if given in reverse.
    pub fn new(begin: u64, end: u64) -> Self {
        if begin <= end {
            Self { begin, end }
        } else {
            Self { begin: end, end: begin }
        }
    }

    /// A range holding a single value.
    pub fn single(value: u64) -> Self {
        Self { begin: value, end: value }
    }

    fn contains(&self, other: &Range) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    fn overlaps(&self, other: &Range) -> bool {
        self.begin <= other.end && other.begin <= self.end
    }
}

/// A typed resource quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Floating point quantity
    Scalar(f64),
    /// Normalised set of inclusive ranges
    Ranges(Vec<Range>),
    /// Set of discrete strings
    Set(BTreeSet<String>),
}

impl Value {
    /// A scalar value, rounded to the tracked precision.
    pub fn scalar(value: f64) -> Self {
        Value::Scalar(round_scalar(value))
    }

    /// A range-set value, normalised.
    pub fn ranges(ranges: impl IntoIterator<Item = Range>) -> Self {
        Value::Ranges(normalize(ranges.into_iter().collect()))
    }

    /// A discrete-set value.
    pub fn set<S: Into<String>>(items: impl IntoIterator<Item = S>) -> Self {
        Value::Set(items.into_iter().map(Into::into).collect())
    }

    /// The zero value of the given type.
    pub fn zero(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Scalar => Value::Scalar(0.0),
            ValueType::Ranges => Value::Ranges(Vec::new()),
            ValueType::Set => Value::Set(BTreeSet::new()),
        }
    }

    /// Shape of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Scalar(_) => ValueType::Scalar,
            Value::Ranges(_) => ValueType::Ranges,
            Value::Set(_) => ValueType::Set,
        }
    }

    /// Whether nothing is left in this value.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Scalar(v) => *v <= 0.0,
            Value::Ranges(ranges) => ranges.is_empty(),
            Value::Set(items) => items.is_empty(),
        }
    }

    /// First range of a range-set value.
    pub fn first_range(&self) -> Option<Range> {
        match self {
            Value::Ranges(ranges) => ranges.first().copied(),
            _ => None,
        }
    }

    /// Sum of two values of the same type.
    pub fn add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::scalar(a + b)),
            (Value::Ranges(a), Value::Ranges(b)) => {
                let mut all = a.clone();
                all.extend(b.iter().copied());
                Ok(Value::Ranges(normalize(all)))
            }
            (Value::Set(a), Value::Set(b)) => Ok(Value::Set(a.union(b).cloned().collect())),
            _ => Err(self.mismatch(other)),
        }
    }

    /// `self` with `other` removed.
    ///
    /// Scalars may go negative; callers check sufficiency first.
    pub fn subtract(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::scalar(a - b)),
            (Value::Ranges(a), Value::Ranges(b)) => Ok(Value::Ranges(subtract_ranges(a, b))),
            (Value::Set(a), Value::Set(b)) => {
                Ok(Value::Set(a.difference(b).cloned().collect()))
            }
            _ => Err(self.mismatch(other)),
        }
    }

    /// Whether `available` holds at least this (desired) value.
    ///
    /// Values of different types never satisfy each other.
    pub fn is_satisfied_by(&self, available: &Value) -> bool {
        match (self, available) {
            (Value::Scalar(desired), Value::Scalar(avail)) => {
                round_scalar(avail - desired) >= 0.0
            }
            (Value::Ranges(desired), Value::Ranges(avail)) => {
                let avail = normalize(avail.clone());
                desired
                    .iter()
                    .all(|d| avail.iter().any(|a| a.contains(d)))
            }
            (Value::Set(desired), Value::Set(avail)) => desired.is_subset(avail),
            _ => false,
        }
    }

    fn mismatch(&self, other: &Value) -> CoreError {
        CoreError::ValueTypeMismatch {
            left: self.value_type(),
            right: other.value_type(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(v) => write!(f, "{}", v),
            Value::Ranges(ranges) => {
                let parts: Vec<String> = ranges
                    .iter()
                    .map(|r| format!("[{}-{}]", r.begin, r.end))
                    .collect();
                write!(f, "{}", parts.join(","))
            }
            Value::Set(items) => {
                let parts: Vec<&str> = items.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", parts.join(","))
            }
        }
    }
}

fn round_scalar(value: f64) -> f64 {
    (value * SCALAR_PRECISION).round() / SCALAR_PRECISION
}

/// Sort ranges and merge overlapping or adjacent ones.
fn normalize(mut ranges: Vec<Range>) -> Vec<Range> {
    ranges.sort();
    let mut merged: Vec<Range> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.begin <= last.end.saturating_add(1) => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

fn subtract_ranges(from: &[Range], remove: &[Range]) -> Vec<Range> {
    let mut remaining = normalize(from.to_vec());
    for cut in remove {
        let mut next = Vec::with_capacity(remaining.len() + 1);
        for range in remaining {
            if !range.overlaps(cut) {
                next.push(range);
                continue;
            }
            if cut.begin > range.begin {
                next.push(Range::new(range.begin, cut.begin - 1));
            }
            if cut.end < range.end {
                next.push(Range::new(cut.end + 1, range.end));
            }
        }
        remaining = next;
    }
    normalize(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_subtract_is_exact_to_precision() {
        let left = Value::scalar(4.0).subtract(&Value::scalar(2.4)).unwrap();
        assert_eq!(left, Value::Scalar(1.6));
    }

    #[test]
    fn test_scalar_sufficiency() {
        assert!(Value::scalar(2.4).is_satisfied_by(&Value::scalar(4.0)));
        assert!(Value::scalar(1.6).is_satisfied_by(&Value::scalar(1.6)));
        assert!(!Value::scalar(2.0).is_satisfied_by(&Value::scalar(1.6)));
    }

    #[test]
    fn test_ranges_merge_on_add() {
        let a = Value::ranges([Range::new(1000, 1005)]);
        let b = Value::ranges([Range::new(1006, 1010), Range::new(2000, 2000)]);
        assert_eq!(
            a.add(&b).unwrap(),
            Value::Ranges(vec![Range::new(1000, 1010), Range::single(2000)])
        );
    }

    #[test]
    fn test_ranges_subtract_splits() {
        let avail = Value::ranges([Range::new(1000, 1010)]);
        let left = avail.subtract(&Value::ranges([Range::new(1003, 1004)])).unwrap();
        assert_eq!(
            left,
            Value::Ranges(vec![Range::new(1000, 1002), Range::new(1005, 1010)])
        );
    }

    #[test]
    fn test_ranges_containment() {
        let avail = Value::ranges([Range::new(1000, 1002), Range::new(1005, 1010)]);
        assert!(Value::ranges([Range::single(1001)]).is_satisfied_by(&avail));
        assert!(!Value::ranges([Range::new(1001, 1006)]).is_satisfied_by(&avail));
    }

    #[test]
    fn test_set_difference() {
        let avail = Value::set(["a", "b", "c"]);
        let desired = Value::set(["b"]);
        assert!(desired.is_satisfied_by(&avail));
        assert_eq!(avail.subtract(&desired).unwrap(), Value::set(["a", "c"]));
        assert!(!Value::set(["z"]).is_satisfied_by(&avail));
    }

    #[test]
    fn test_type_mismatch() {
        let scalar = Value::scalar(1.0);
        let ranges = Value::ranges([Range::single(1)]);
        assert!(scalar.add(&ranges).is_err());
        assert!(scalar.subtract(&ranges).is_err());
        assert!(!scalar.is_satisfied_by(&ranges));
        assert!(!ranges.is_satisfied_by(&scalar));
    }

    #[test]
    fn test_zero_values_are_empty() {
        assert!(Value::zero(ValueType::Scalar).is_empty());
        assert!(Value::zero(ValueType::Ranges).is_empty());
        assert!(Value::zero(ValueType::Set).is_empty());
    }
}

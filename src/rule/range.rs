// SPDX-License-Identifier: Apache-2.0

//! Value ranges used by range sharding conditions.

use std::cmp::Ordering;
use std::ops::Bound;

use shardline_core::Value;

/// A possibly unbounded interval of comparable values.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub lower: Bound<Value>,
    pub upper: Bound<Value>,
}

impl ValueRange {
    pub fn new(lower: Bound<Value>, upper: Bound<Value>) -> Self {
        Self { lower, upper }
    }

    pub fn all() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    pub fn closed(lower: Value, upper: Value) -> Self {
        Self::new(Bound::Included(lower), Bound::Included(upper))
    }

    pub fn at_least(value: Value) -> Self {
        Self::new(Bound::Included(value), Bound::Unbounded)
    }

    pub fn greater_than(value: Value) -> Self {
        Self::new(Bound::Excluded(value), Bound::Unbounded)
    }

    pub fn at_most(value: Value) -> Self {
        Self::new(Bound::Unbounded, Bound::Included(value))
    }

    pub fn less_than(value: Value) -> Self {
        Self::new(Bound::Unbounded, Bound::Excluded(value))
    }

    pub fn lower_value(&self) -> Option<&Value> {
        bound_value(&self.lower)
    }

    pub fn upper_value(&self) -> Option<&Value> {
        bound_value(&self.upper)
    }

    /// Whether the value lies in the range. Incomparable values never do.
    pub fn contains(&self, value: &Value) -> bool {
        let above_lower = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(l) => matches!(value.compare(l), Some(Ordering::Greater | Ordering::Equal)),
            Bound::Excluded(l) => matches!(value.compare(l), Some(Ordering::Greater)),
        };
        let below_upper = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(u) => matches!(value.compare(u), Some(Ordering::Less | Ordering::Equal)),
            Bound::Excluded(u) => matches!(value.compare(u), Some(Ordering::Less)),
        };
        above_lower && below_upper
    }

    /// The intersection of both ranges, keeping the tighter bound on each side.
    pub fn intersect(&self, other: &ValueRange) -> ValueRange {
        ValueRange {
            lower: tighter(&self.lower, &other.lower, Ordering::Greater),
            upper: tighter(&self.upper, &other.upper, Ordering::Less),
        }
    }

    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
            (Bound::Included(l), Bound::Included(u)) => {
                matches!(l.compare(u), Some(Ordering::Greater))
            }
            (Bound::Included(l) | Bound::Excluded(l), Bound::Included(u) | Bound::Excluded(u)) => {
                matches!(l.compare(u), Some(Ordering::Greater | Ordering::Equal))
            }
        }
    }
}

fn bound_value(bound: &Bound<Value>) -> Option<&Value> {
    match bound {
        Bound::Included(v) | Bound::Excluded(v) => Some(v),
        Bound::Unbounded => None,
    }
}

/// Picks the bound that restricts more. `prefer` is the ordering of the
/// tighter value relative to the other (Greater for lower bounds).
fn tighter(a: &Bound<Value>, b: &Bound<Value>, prefer: Ordering) -> Bound<Value> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other.clone(),
        _ => {
            let (av, bv) = match (bound_value(a), bound_value(b)) {
                (Some(av), Some(bv)) => (av, bv),
                _ => return a.clone(),
            };
            match av.compare(bv) {
                Some(Ordering::Equal) => {
                    if matches!(a, Bound::Excluded(_)) {
                        a.clone()
                    } else {
                        b.clone()
                    }
                }
                Some(ord) if ord == prefer => a.clone(),
                Some(_) => b.clone(),
                None => a.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_respects_bound_kinds() {
        let range = ValueRange::new(Bound::Excluded(Value::Int(1)), Bound::Included(Value::Int(5)));
        assert!(!range.contains(&Value::Int(1)));
        assert!(range.contains(&Value::Int(2)));
        assert!(range.contains(&Value::Int(5)));
        assert!(!range.contains(&Value::Int(6)));
        assert!(!range.contains(&Value::from("3")));
    }

    #[test]
    fn intersection_keeps_tighter_bounds() {
        let a = ValueRange::at_least(Value::Int(3));
        let b = ValueRange::closed(Value::Int(1), Value::Int(10));
        let both = a.intersect(&b);
        assert_eq!(both.lower, Bound::Included(Value::Int(3)));
        assert_eq!(both.upper, Bound::Included(Value::Int(10)));

        let c = ValueRange::greater_than(Value::Int(3));
        assert_eq!(both.intersect(&c).lower, Bound::Excluded(Value::Int(3)));
    }

    #[test]
    fn detects_empty_ranges() {
        assert!(ValueRange::closed(Value::Int(5), Value::Int(1)).is_empty());
        assert!(!ValueRange::closed(Value::Int(1), Value::Int(1)).is_empty());
        assert!(ValueRange::new(Bound::Excluded(Value::Int(1)), Bound::Included(Value::Int(1))).is_empty());
        assert!(!ValueRange::all().is_empty());
    }
}

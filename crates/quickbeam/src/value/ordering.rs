//! Total order over values: none < numbers < forms < containers < strings

use std::cmp::Ordering;

use super::Value;

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Value::None => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Form(_) => 2,
            Value::Object(_) => 3,
            Value::String(_) => 4,
        }
    }
}

/// Both i32 and f32 embed exactly in f64, so comparing there is transitive.
fn wide(value: &Value) -> f64 {
    match value {
        Value::Int(n) => f64::from(*n),
        Value::Float(x) => f64::from(*x),
        _ => 0.0,
    }
}

fn compare_numbers(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        _ => {
            let (x, y) = (wide(a), wide(b));
            x.partial_cmp(&y).unwrap_or_else(|| x.total_cmp(&y))
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.rank().cmp(&other.rank()) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        match (self, other) {
            (Value::Form(a), Value::Form(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => a.handle().cmp(&b.handle()),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::None, Value::None) => Ordering::Equal,
            _ => compare_numbers(self, other),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality agrees with the order: Int(2) == Float(2.0), containers by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => a.same_target(b),
            _ => self.cmp(other) == Ordering::Equal,
        }
    }
}

impl Eq for Value {}

//! Display and Debug implementations for Value

use std::fmt;

use super::*;

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{:?}f", x),
            Value::String(s) => write!(f, "{:?}", s.as_ref()),
            Value::Form(id) => write!(f, "form({})", id),
            Value::Object(r) => write!(f, "object({})", r.handle()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => Ok(()),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Form(id) => write!(f, "{}", id),
            Value::Object(r) => write!(f, "#{}", r.handle()),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::NoValue => "no value",
            ValueType::None => "none",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Form => "form",
            ValueType::Object => "object",
            ValueType::String => "string",
        };
        f.write_str(name)
    }
}

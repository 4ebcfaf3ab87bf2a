//! Runtime values.
//!
//! Primitives are held inline. `byte` and `short` values are stored as
//! `Int`, `float` values as `Double`, after truncation to their range.
//! Objects, boxes and arrays live behind shared references and compare by
//! identity.

use crate::error::{Result, RuntimeError};
use kestrel_types::{ClassId, FieldId, PrimitiveKind, Type};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub type ObjectRef = Rc<RefCell<Object>>;

#[derive(Clone)]
pub enum Value {
    /// Result of a call to a void method
    Void,
    Null,
    Bool(bool),
    Char(char),
    Int(i32),
    Long(i64),
    Double(f64),
    Str(Rc<str>),
    Ref(ObjectRef),
}

#[derive(Debug)]
pub enum Object {
    Instance(Instance),
    Boxed { kind: PrimitiveKind, value: Value },
    Array { element: Type, values: Vec<Value> },
}

#[derive(Debug)]
pub struct Instance {
    pub class: ClassId,
    /// Creation order, used for the default string form
    pub serial: u32,
    pub fields: HashMap<FieldId, Value>,
    /// Enclosing instance of an inner-class object
    pub outer: Option<ObjectRef>,
}

impl Value {
    pub fn string(text: &str) -> Self {
        Value::Str(Rc::from(text))
    }

    pub fn object(object: Object) -> Self {
        Value::Ref(Rc::new(RefCell::new(object)))
    }

    pub fn boxed(kind: PrimitiveKind, value: Value) -> Self {
        Value::object(Object::Boxed { kind, value })
    }

    /// Zero value of a field, array element or uninitialized local of type `ty`
    pub fn default_for(ty: &Type) -> Self {
        match ty.primitive() {
            Some(PrimitiveKind::Boolean) => Value::Bool(false),
            Some(PrimitiveKind::Char) => Value::Char('\0'),
            Some(PrimitiveKind::Long) => Value::Long(0),
            Some(PrimitiveKind::Float | PrimitiveKind::Double) => Value::Double(0.0),
            Some(_) => Value::Int(0),
            None => Value::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self.unboxed()? {
            Value::Bool(b) => Ok(b),
            other => Err(RuntimeError::invalid(format!("expected a boolean, found {}", other.kind_name()))),
        }
    }

    pub fn as_int(&self) -> Result<i32> {
        Ok(Num::of(self)?.as_i32())
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Ref(object) => Some(object),
            _ => None,
        }
    }

    /// Same object (for references) or same value (for everything else)
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Ref(a), Value::Ref(b)) => Rc::ptr_eq(a, b),
            (Value::Null, Value::Null) | (Value::Void, Value::Void) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Ref(_) | Value::Null | Value::Str(_) | Value::Bool(_), _)
            | (_, Value::Ref(_) | Value::Null | Value::Str(_) | Value::Bool(_)) => false,
            _ => match (Num::of(self), Num::of(other)) {
                (Ok(a), Ok(b)) => a.compare(b) == Some(std::cmp::Ordering::Equal),
                _ => false,
            },
        }
    }

    /// Strip a box; `null` faults.
    pub fn unboxed(&self) -> Result<Value> {
        match self {
            Value::Null => Err(RuntimeError::null("unboxing null")),
            Value::Ref(object) => match &*object.borrow() {
                Object::Boxed { value, .. } => Ok(value.clone()),
                _ => Err(RuntimeError::ClassCast("object is not a boxed primitive".to_string())),
            },
            other => Ok(other.clone()),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Char(_) => "char",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Ref(object) => match &*object.borrow() {
                Object::Instance(_) => "object",
                Object::Boxed { .. } => "box",
                Object::Array { .. } => "array",
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Ref(object) => match &*object.borrow() {
                Object::Instance(instance) => write!(f, "Instance(#{}@{})", instance.class.0, instance.serial),
                Object::Boxed { kind, value } => write!(f, "{}({:?})", kind.boxed_name(), value),
                Object::Array { values, .. } => write!(f, "Array(len {})", values.len()),
            },
            other => write!(f, "{}", other),
        }
    }
}

/// Shallow string form; instances print as `#class@serial`
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => Ok(()),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Char(c) => write!(f, "{}", c),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Double(v) => f.write_str(&format_double(*v)),
            Value::Str(s) => f.write_str(s),
            Value::Ref(object) => match &*object.borrow() {
                Object::Instance(instance) => write!(f, "#{}@{}", instance.class.0, instance.serial),
                Object::Boxed { value, .. } => write!(f, "{}", value),
                Object::Array { values, .. } => {
                    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                    write!(f, "[{}]", parts.join(", "))
                }
            },
        }
    }
}

/// `1.0`, `0.25`, `1.0E10`
pub fn format_double(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        let sign = if v > 0.0 { "" } else { "-" };
        format!("{}Infinity", sign)
    } else if v == v.trunc() && v.abs() < 1e7 {
        format!("{:.1}", v)
    } else if v.abs() >= 1e7 {
        let exponent = v.abs().log10().floor() as i32;
        let mantissa = v / 10f64.powi(exponent);
        let mantissa = if mantissa == mantissa.trunc() {
            format!("{:.1}", mantissa)
        } else {
            format!("{}", mantissa)
        };
        format!("{}E{}", mantissa, exponent)
    } else {
        format!("{}", v)
    }
}

/// Binary numeric promotion result
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    I(i32),
    L(i64),
    D(f64),
}

impl Num {
    /// Numeric view of a primitive or boxed value.
    pub fn of(value: &Value) -> Result<Num> {
        match value.unboxed()? {
            Value::Int(v) => Ok(Num::I(v)),
            Value::Char(c) => Ok(Num::I(c as i32)),
            Value::Long(v) => Ok(Num::L(v)),
            Value::Double(v) => Ok(Num::D(v)),
            other => Err(RuntimeError::invalid(format!(
                "expected a number, found {}",
                other.kind_name()
            ))),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Num::I(v) => v,
            Num::L(v) => v as i32,
            Num::D(v) => v as i32,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Num::I(v) => v as i64,
            Num::L(v) => v,
            Num::D(v) => v as i64,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Num::I(v) => v as f64,
            Num::L(v) => v as f64,
            Num::D(v) => v,
        }
    }

    /// Promote both operands to their common kind.
    pub fn promote(a: Num, b: Num) -> (Num, Num) {
        match (a, b) {
            (Num::D(_), _) | (_, Num::D(_)) => (Num::D(a.as_f64()), Num::D(b.as_f64())),
            (Num::L(_), _) | (_, Num::L(_)) => (Num::L(a.as_i64()), Num::L(b.as_i64())),
            _ => (a, b),
        }
    }

    pub fn compare(self, other: Num) -> Option<std::cmp::Ordering> {
        match Num::promote(self, other) {
            (Num::I(a), Num::I(b)) => Some(a.cmp(&b)),
            (Num::L(a), Num::L(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Num::I(v) => Value::Int(v),
            Num::L(v) => Value::Long(v),
            Num::D(v) => Value::Double(v),
        }
    }
}

/// Primitive conversion with Java truncation rules.
pub fn convert(value: &Value, to: PrimitiveKind) -> Result<Value> {
    if to == PrimitiveKind::Boolean {
        return Ok(Value::Bool(value.as_bool()?));
    }
    let n = Num::of(value)?;
    Ok(match to {
        PrimitiveKind::Byte => Value::Int(n.as_i64() as i8 as i32),
        PrimitiveKind::Short => Value::Int(n.as_i64() as i16 as i32),
        PrimitiveKind::Char => Value::Char(char::from_u32(n.as_i64() as u16 as u32).unwrap_or('\u{FFFD}')),
        PrimitiveKind::Int => Value::Int(n.as_i32()),
        PrimitiveKind::Long => Value::Long(n.as_i64()),
        PrimitiveKind::Float => Value::Double(n.as_f64() as f32 as f64),
        PrimitiveKind::Double | PrimitiveKind::Boolean => Value::Double(n.as_f64()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions_truncate_like_java() {
        assert!(convert(&Value::Int(300), PrimitiveKind::Byte).unwrap().same(&Value::Int(44)));
        assert!(convert(&Value::Double(3.9), PrimitiveKind::Int).unwrap().same(&Value::Int(3)));
        assert!(convert(&Value::Long(1 << 40), PrimitiveKind::Int).unwrap().same(&Value::Int(0)));
        let boxed = Value::boxed(PrimitiveKind::Int, Value::Int(7));
        assert!(convert(&boxed, PrimitiveKind::Long).unwrap().same(&Value::Long(7)));
    }

    #[test]
    fn test_identity_and_display() {
        let a = Value::boxed(PrimitiveKind::Int, Value::Int(1));
        let b = Value::boxed(PrimitiveKind::Int, Value::Int(1));
        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
        assert_eq!(a.to_string(), "1");
        assert_eq!(Value::Double(2.0).to_string(), "2.0");
        assert_eq!(Value::Double(1e10).to_string(), "1.0E10");
        assert_eq!(Value::Null.to_string(), "null");
        assert!(matches!(Value::Null.unboxed(), Err(RuntimeError::NullPointer(_))));
    }
}

//! Runtime values for the sandboxed scriptlet language.

use std::collections::{BTreeMap, HashMap};

use crate::sandbox::builtins::BuiltinFn;
use crate::sandbox::modules::NativeModule;

/// A persistent per-user environment: identifier to value.
pub type Environment = HashMap<String, Value>;

/// A value produced or consumed by sandboxed code.
///
/// The set of value kinds is closed; nothing in here can reference the
/// filesystem, the network, or interpreter internals. Builtin functions and
/// module handles point into process-static tables.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The absence of a value.
    None,
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer. Arithmetic is checked.
    Int(i64),
    /// A 64-bit float.
    Float(f64),
    /// An owned string.
    Str(String),
    /// A list of values.
    List(Vec<Value>),
    /// A string-keyed map. Ordered so rendering is deterministic.
    Map(BTreeMap<String, Value>),
    /// A builtin function from the capability set or a module export.
    Builtin(&'static BuiltinFn),
    /// A handle to a loaded whitelisted module.
    Module(&'static NativeModule),
}

impl Value {
    /// The user-facing name of this value's kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Builtin(_) => "builtin",
            Value::Module(_) => "module",
        }
    }

    /// Truthiness, used by conditions and `and`/`or`/`not`.
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Builtin(_) | Value::Module(_) => true,
        }
    }

    /// Quoted, structure-preserving rendering (what `repr()` returns and how
    /// values appear inside containers).
    pub fn repr(&self) -> String {
        match self {
            Value::None => "none".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => format!("{:?}", s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Map(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{:?}: {}", k, v.repr()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Builtin(f) => format!("<builtin {}>", f.name),
            Value::Module(m) => format!("<module {}>", m.name),
        }
    }

    /// Plain string rendering (what `print()` and `str()` produce):
    /// strings appear unquoted, everything else as its repr.
    pub fn str_form(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.repr(),
        }
    }
}

/// Render a float the way users expect: integral floats keep a `.0` suffix.
fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

/// Structural equality with numeric promotion, used by `==`/`!=` and `in`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => *x as f64 == *y,
        (Value::List(xs), Value::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Map(xs), Value::Map(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys)
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(Value::Int(-1).truthy());
        assert!(!Value::Str(String::new()).truthy());
        assert!(Value::Str("x".to_string()).truthy());
        assert!(!Value::List(vec![]).truthy());
    }

    #[test]
    fn test_repr_and_str_form() {
        let list = Value::List(vec![Value::Int(1), Value::Str("a".to_string())]);
        assert_eq!(list.repr(), r#"[1, "a"]"#);

        assert_eq!(Value::Str("hi".to_string()).repr(), r#""hi""#);
        assert_eq!(Value::Str("hi".to_string()).str_form(), "hi");
        assert_eq!(Value::Float(2.0).repr(), "2.0");
        assert_eq!(Value::Float(2.5).repr(), "2.5");
    }

    #[test]
    fn test_numeric_equality_promotes() {
        assert!(values_equal(&Value::Int(2), &Value::Float(2.0)));
        assert!(!values_equal(&Value::Int(2), &Value::Float(2.5)));
        assert!(values_equal(
            &Value::List(vec![Value::Int(1)]),
            &Value::List(vec![Value::Float(1.0)])
        ));
    }
}

//! The capability builtin set: the closed table of native operations
//! available to sandboxed code.
//!
//! The table is fixed at startup and shared read-only by every execution.
//! Nothing here can touch the filesystem, the network, a process, or
//! interpreter state; builtins compute over [`Value`]s and nothing else.

use crate::sandbox::value::Value;

/// Result of a native call: a value or a runtime-failure message.
pub type NativeResult = Result<Value, String>;

/// A named native function exposed to sandboxed code.
pub struct BuiltinFn {
    /// User-facing name (qualified for module exports, e.g. `math.sqrt`).
    pub name: &'static str,
    /// The implementation.
    pub func: fn(&[Value]) -> NativeResult,
}

impl PartialEq for BuiltinFn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl std::fmt::Debug for BuiltinFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BuiltinFn({})", self.name)
    }
}

/// Largest list `range()` will materialize.
const MAX_RANGE: i64 = 1_000_000;

/// Look up a capability builtin by name.
pub fn lookup(name: &str) -> Option<&'static BuiltinFn> {
    CAPABILITY_SET.iter().find(|b| b.name == name)
}

/// Names in the capability set, for introspection.
pub fn names() -> impl Iterator<Item = &'static str> {
    CAPABILITY_SET.iter().map(|b| b.name)
}

/// The closed capability set. `print` is listed so it resolves as a name,
/// but its call is dispatched by the evaluator, which owns the collector.
pub static CAPABILITY_SET: &[BuiltinFn] = &[
    BuiltinFn { name: "abs", func: builtin_abs },
    BuiltinFn { name: "all", func: builtin_all },
    BuiltinFn { name: "any", func: builtin_any },
    BuiltinFn { name: "bool", func: builtin_bool },
    BuiltinFn { name: "chr", func: builtin_chr },
    BuiltinFn { name: "float", func: builtin_float },
    BuiltinFn { name: "hex", func: builtin_hex },
    BuiltinFn { name: "int", func: builtin_int },
    BuiltinFn { name: "len", func: builtin_len },
    BuiltinFn { name: "list", func: builtin_list },
    BuiltinFn { name: "max", func: builtin_max },
    BuiltinFn { name: "min", func: builtin_min },
    BuiltinFn { name: "oct", func: builtin_oct },
    BuiltinFn { name: "ord", func: builtin_ord },
    BuiltinFn { name: "print", func: builtin_print_marker },
    BuiltinFn { name: "range", func: builtin_range },
    BuiltinFn { name: "repr", func: builtin_repr },
    BuiltinFn { name: "reversed", func: builtin_reversed },
    BuiltinFn { name: "round", func: builtin_round },
    BuiltinFn { name: "sorted", func: builtin_sorted },
    BuiltinFn { name: "str", func: builtin_str },
    BuiltinFn { name: "sum", func: builtin_sum },
    BuiltinFn { name: "type", func: builtin_type },
];

/// Require an exact argument count.
pub fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), String> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(format!(
            "{}() takes {} argument(s), got {}",
            name,
            expected,
            args.len()
        ))
    }
}

/// Coerce a numeric value to f64.
pub fn as_float(name: &str, value: &Value) -> Result<f64, String> {
    match value {
        Value::Int(n) => Ok(*n as f64),
        Value::Float(f) => Ok(*f),
        other => Err(format!("{}() expects a number, got {}", name, other.type_name())),
    }
}

fn as_int(name: &str, value: &Value) -> Result<i64, String> {
    match value {
        Value::Int(n) => Ok(*n),
        other => Err(format!("{}() expects an int, got {}", name, other.type_name())),
    }
}

fn as_list<'a>(name: &str, value: &'a Value) -> Result<&'a [Value], String> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(format!("{}() expects a list, got {}", name, other.type_name())),
    }
}

fn builtin_abs(args: &[Value]) -> NativeResult {
    arity("abs", args, 1)?;
    match &args[0] {
        Value::Int(n) => n
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| "integer overflow in abs()".to_string()),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(format!("abs() expects a number, got {}", other.type_name())),
    }
}

fn builtin_all(args: &[Value]) -> NativeResult {
    arity("all", args, 1)?;
    let items = as_list("all", &args[0])?;
    Ok(Value::Bool(items.iter().all(Value::truthy)))
}

fn builtin_any(args: &[Value]) -> NativeResult {
    arity("any", args, 1)?;
    let items = as_list("any", &args[0])?;
    Ok(Value::Bool(items.iter().any(Value::truthy)))
}

fn builtin_bool(args: &[Value]) -> NativeResult {
    arity("bool", args, 1)?;
    Ok(Value::Bool(args[0].truthy()))
}

fn builtin_chr(args: &[Value]) -> NativeResult {
    arity("chr", args, 1)?;
    let code = as_int("chr", &args[0])?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::Str(c.to_string()))
        .ok_or_else(|| format!("chr() arg {} is not a valid code point", code))
}

fn builtin_float(args: &[Value]) -> NativeResult {
    arity("float", args, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("could not convert {:?} to float", s)),
        other => Err(format!("float() cannot convert {}", other.type_name())),
    }
}

fn builtin_hex(args: &[Value]) -> NativeResult {
    arity("hex", args, 1)?;
    let n = as_int("hex", &args[0])?;
    let s = if n < 0 {
        format!("-0x{:x}", n.unsigned_abs())
    } else {
        format!("0x{:x}", n)
    };
    Ok(Value::Str(s))
}

fn builtin_int(args: &[Value]) -> NativeResult {
    arity("int", args, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("could not convert {:?} to int", s)),
        other => Err(format!("int() cannot convert {}", other.type_name())),
    }
}

fn builtin_len(args: &[Value]) -> NativeResult {
    arity("len", args, 1)?;
    let n = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(entries) => entries.len(),
        other => return Err(format!("len() not supported for {}", other.type_name())),
    };
    Ok(Value::Int(n as i64))
}

fn builtin_list(args: &[Value]) -> NativeResult {
    arity("list", args, 1)?;
    match &args[0] {
        Value::List(items) => Ok(Value::List(items.clone())),
        Value::Str(s) => Ok(Value::List(
            s.chars().map(|c| Value::Str(c.to_string())).collect(),
        )),
        Value::Map(entries) => Ok(Value::List(
            entries.keys().map(|k| Value::Str(k.clone())).collect(),
        )),
        other => Err(format!("list() cannot convert {}", other.type_name())),
    }
}

fn extreme(name: &str, args: &[Value], want_max: bool) -> NativeResult {
    arity(name, args, 1)?;
    let items = as_list(name, &args[0])?;
    if items.is_empty() {
        return Err(format!("{}() of an empty list", name));
    }
    let mut best = &items[0];
    for item in &items[1..] {
        let ordering = compare_for_sort(name, item, best)?;
        let take = if want_max {
            ordering == std::cmp::Ordering::Greater
        } else {
            ordering == std::cmp::Ordering::Less
        };
        if take {
            best = item;
        }
    }
    Ok(best.clone())
}

fn builtin_max(args: &[Value]) -> NativeResult {
    extreme("max", args, true)
}

fn builtin_min(args: &[Value]) -> NativeResult {
    extreme("min", args, false)
}

fn builtin_oct(args: &[Value]) -> NativeResult {
    arity("oct", args, 1)?;
    let n = as_int("oct", &args[0])?;
    let s = if n < 0 {
        format!("-0o{:o}", n.unsigned_abs())
    } else {
        format!("0o{:o}", n)
    };
    Ok(Value::Str(s))
}

fn builtin_ord(args: &[Value]) -> NativeResult {
    arity("ord", args, 1)?;
    match &args[0] {
        Value::Str(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Int(c as i64)),
                _ => Err("ord() expects a single character".to_string()),
            }
        }
        other => Err(format!("ord() expects a str, got {}", other.type_name())),
    }
}

// Never called directly; the evaluator intercepts `print` so the output
// lands in the per-execution collector.
fn builtin_print_marker(_args: &[Value]) -> NativeResult {
    Err("print is only callable as a statement-level builtin".to_string())
}

fn builtin_range(args: &[Value]) -> NativeResult {
    let (start, stop, step) = match args {
        [stop] => (0, as_int("range", stop)?, 1),
        [start, stop] => (as_int("range", start)?, as_int("range", stop)?, 1),
        [start, stop, step] => (
            as_int("range", start)?,
            as_int("range", stop)?,
            as_int("range", step)?,
        ),
        _ => return Err(format!("range() takes 1 to 3 arguments, got {}", args.len())),
    };
    if step == 0 {
        return Err("range() step must not be zero".to_string());
    }
    let mut items = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        if items.len() as i64 >= MAX_RANGE {
            return Err(format!("range() result exceeds {} elements", MAX_RANGE));
        }
        items.push(Value::Int(current));
        current = match current.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Value::List(items))
}

fn builtin_repr(args: &[Value]) -> NativeResult {
    arity("repr", args, 1)?;
    Ok(Value::Str(args[0].repr()))
}

fn builtin_reversed(args: &[Value]) -> NativeResult {
    arity("reversed", args, 1)?;
    match &args[0] {
        Value::List(items) => Ok(Value::List(items.iter().rev().cloned().collect())),
        Value::Str(s) => Ok(Value::Str(s.chars().rev().collect())),
        other => Err(format!("reversed() not supported for {}", other.type_name())),
    }
}

fn builtin_round(args: &[Value]) -> NativeResult {
    match args {
        [Value::Int(n)] => Ok(Value::Int(*n)),
        [value] => {
            let f = as_float("round", value)?;
            Ok(Value::Int(f.round() as i64))
        }
        [value, digits] => {
            let f = as_float("round", value)?;
            let d = as_int("round", digits)?;
            let factor = 10f64.powi(d as i32);
            Ok(Value::Float((f * factor).round() / factor))
        }
        _ => Err(format!("round() takes 1 or 2 arguments, got {}", args.len())),
    }
}

/// Ordering for `sorted`/`max`/`min`: numbers with numbers, strings with
/// strings; anything else is a runtime failure.
fn compare_for_sort(name: &str, a: &Value, b: &Value) -> Result<std::cmp::Ordering, String> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => {
            let x = as_float(name, a)?;
            let y = as_float(name, b)?;
            x.partial_cmp(&y)
                .ok_or_else(|| format!("{}(): values are not orderable", name))
        }
    }
}

fn builtin_sorted(args: &[Value]) -> NativeResult {
    arity("sorted", args, 1)?;
    let mut items = as_list("sorted", &args[0])?.to_vec();
    let mut failure = None;
    items.sort_by(|a, b| match compare_for_sort("sorted", a, b) {
        Ok(ordering) => ordering,
        Err(e) => {
            failure.get_or_insert(e);
            std::cmp::Ordering::Equal
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(Value::List(items)),
    }
}

fn builtin_str(args: &[Value]) -> NativeResult {
    arity("str", args, 1)?;
    Ok(Value::Str(args[0].str_form()))
}

fn builtin_sum(args: &[Value]) -> NativeResult {
    arity("sum", args, 1)?;
    let items = as_list("sum", &args[0])?;
    let mut int_total: i64 = 0;
    let mut float_total = 0.0;
    let mut saw_float = false;
    for item in items {
        match item {
            Value::Int(n) => {
                int_total = int_total
                    .checked_add(*n)
                    .ok_or_else(|| "integer overflow in sum()".to_string())?;
            }
            Value::Float(f) => {
                saw_float = true;
                float_total += f;
            }
            other => return Err(format!("sum() expects numbers, got {}", other.type_name())),
        }
    }
    if saw_float {
        Ok(Value::Float(float_total + int_total as f64))
    } else {
        Ok(Value::Int(int_total))
    }
}

fn builtin_type(args: &[Value]) -> NativeResult {
    arity("type", args, 1)?;
    Ok(Value::Str(args[0].type_name().to_string()))
}

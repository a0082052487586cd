//! The import gate and the process-static registry of native modules.
//!
//! `import m` is allowed iff `m` is in the configured whitelist, or `m`'s
//! leading dot-separated segment is. The gate only restricts *which* modules
//! load; a loaded module is fully trusted. Modules are native Rust tables
//! exporting constants and [`BuiltinFn`]s over sandbox values.

use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::sandbox::builtins::{arity, as_float, BuiltinFn, NativeResult};
use crate::sandbox::value::Value;

/// A registered native module.
pub struct NativeModule {
    /// Import name.
    pub name: &'static str,
    member_fn: fn(&str) -> Option<Value>,
}

impl NativeModule {
    /// Resolve an exported member. Internal names never resolve; the guarded
    /// getter rejects `_`-prefixed attributes before this is consulted.
    pub fn member(&self, name: &str) -> Option<Value> {
        (self.member_fn)(name)
    }
}

impl PartialEq for NativeModule {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl std::fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NativeModule({})", self.name)
    }
}

static REGISTRY: [&NativeModule; 6] = [&MATH, &STRING, &RANDOM, &TIME, &JSON, &RE];

/// Every module this process can load. Fixed for the process lifetime.
pub fn registry() -> &'static [&'static NativeModule] {
    &REGISTRY
}

/// Gate deciding which module names may be imported.
///
/// The whitelist is set once at startup and immutable thereafter.
#[derive(Debug)]
pub struct ImportGate {
    whitelist: BTreeSet<String>,
}

impl ImportGate {
    /// Build a gate from an explicit whitelist.
    pub fn new<I>(whitelist: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            whitelist: whitelist.into_iter().collect(),
        }
    }

    /// The default whitelist: every registered module.
    pub fn default_whitelist() -> Vec<String> {
        registry().iter().map(|m| m.name.to_string()).collect()
    }

    /// Whether `module` may load: exact whitelist hit, or its top-level
    /// package is whitelisted (so submodules of an allowed package pass).
    pub fn allows(&self, module: &str) -> bool {
        if self.whitelist.contains(module) {
            return true;
        }
        match module.split_once('.') {
            Some((top, _)) => self.whitelist.contains(top),
            None => false,
        }
    }

    /// Load `module` through the gate: check the whitelist, then resolve the
    /// top-level package in the registry.
    pub fn load(&self, module: &str) -> Result<Value, String> {
        if !self.allows(module) {
            return Err(format!("module '{}' is not whitelisted", module));
        }
        let top = module.split('.').next().unwrap_or(module);
        registry()
            .iter()
            .find(|m| m.name == top)
            .map(|m| Value::Module(*m))
            .ok_or_else(|| format!("module '{}' is not available", module))
    }

    /// Whitelisted names, sorted, for the `lsmod` dump.
    pub fn names(&self) -> Vec<&str> {
        self.whitelist.iter().map(String::as_str).collect()
    }
}

impl Default for ImportGate {
    fn default() -> Self {
        Self::new(Self::default_whitelist())
    }
}

macro_rules! native_fn {
    ($static_name:ident, $name:literal, $func:ident) => {
        static $static_name: BuiltinFn = BuiltinFn {
            name: $name,
            func: $func,
        };
    };
}

// ---- math ----

static MATH: NativeModule = NativeModule {
    name: "math",
    member_fn: math_member,
};

fn math_member(name: &str) -> Option<Value> {
    let value = match name {
        "pi" => Value::Float(std::f64::consts::PI),
        "e" => Value::Float(std::f64::consts::E),
        "tau" => Value::Float(std::f64::consts::TAU),
        "sqrt" => Value::Builtin(&MATH_SQRT),
        "floor" => Value::Builtin(&MATH_FLOOR),
        "ceil" => Value::Builtin(&MATH_CEIL),
        "trunc" => Value::Builtin(&MATH_TRUNC),
        "pow" => Value::Builtin(&MATH_POW),
        "exp" => Value::Builtin(&MATH_EXP),
        "log" => Value::Builtin(&MATH_LOG),
        "log2" => Value::Builtin(&MATH_LOG2),
        "log10" => Value::Builtin(&MATH_LOG10),
        "sin" => Value::Builtin(&MATH_SIN),
        "cos" => Value::Builtin(&MATH_COS),
        "tan" => Value::Builtin(&MATH_TAN),
        "fabs" => Value::Builtin(&MATH_FABS),
        "fmod" => Value::Builtin(&MATH_FMOD),
        _ => return None,
    };
    Some(value)
}

native_fn!(MATH_SQRT, "math.sqrt", math_sqrt);
native_fn!(MATH_FLOOR, "math.floor", math_floor);
native_fn!(MATH_CEIL, "math.ceil", math_ceil);
native_fn!(MATH_TRUNC, "math.trunc", math_trunc);
native_fn!(MATH_POW, "math.pow", math_pow);
native_fn!(MATH_EXP, "math.exp", math_exp);
native_fn!(MATH_LOG, "math.log", math_log);
native_fn!(MATH_LOG2, "math.log2", math_log2);
native_fn!(MATH_LOG10, "math.log10", math_log10);
native_fn!(MATH_SIN, "math.sin", math_sin);
native_fn!(MATH_COS, "math.cos", math_cos);
native_fn!(MATH_TAN, "math.tan", math_tan);
native_fn!(MATH_FABS, "math.fabs", math_fabs);
native_fn!(MATH_FMOD, "math.fmod", math_fmod);

fn unary_float(name: &str, args: &[Value], f: fn(f64) -> f64) -> NativeResult {
    arity(name, args, 1)?;
    Ok(Value::Float(f(as_float(name, &args[0])?)))
}

fn math_sqrt(args: &[Value]) -> NativeResult {
    arity("math.sqrt", args, 1)?;
    let x = as_float("math.sqrt", &args[0])?;
    if x < 0.0 {
        return Err("math.sqrt of a negative number".to_string());
    }
    Ok(Value::Float(x.sqrt()))
}

fn math_floor(args: &[Value]) -> NativeResult {
    arity("math.floor", args, 1)?;
    Ok(Value::Int(as_float("math.floor", &args[0])?.floor() as i64))
}

fn math_ceil(args: &[Value]) -> NativeResult {
    arity("math.ceil", args, 1)?;
    Ok(Value::Int(as_float("math.ceil", &args[0])?.ceil() as i64))
}

fn math_trunc(args: &[Value]) -> NativeResult {
    arity("math.trunc", args, 1)?;
    Ok(Value::Int(as_float("math.trunc", &args[0])?.trunc() as i64))
}

fn math_pow(args: &[Value]) -> NativeResult {
    arity("math.pow", args, 2)?;
    let x = as_float("math.pow", &args[0])?;
    let y = as_float("math.pow", &args[1])?;
    Ok(Value::Float(x.powf(y)))
}

fn math_exp(args: &[Value]) -> NativeResult {
    unary_float("math.exp", args, f64::exp)
}

fn math_log(args: &[Value]) -> NativeResult {
    arity("math.log", args, 1)?;
    let x = as_float("math.log", &args[0])?;
    if x <= 0.0 {
        return Err("math.log domain error".to_string());
    }
    Ok(Value::Float(x.ln()))
}

fn math_log2(args: &[Value]) -> NativeResult {
    unary_float("math.log2", args, f64::log2)
}

fn math_log10(args: &[Value]) -> NativeResult {
    unary_float("math.log10", args, f64::log10)
}

fn math_sin(args: &[Value]) -> NativeResult {
    unary_float("math.sin", args, f64::sin)
}

fn math_cos(args: &[Value]) -> NativeResult {
    unary_float("math.cos", args, f64::cos)
}

fn math_tan(args: &[Value]) -> NativeResult {
    unary_float("math.tan", args, f64::tan)
}

fn math_fabs(args: &[Value]) -> NativeResult {
    unary_float("math.fabs", args, f64::abs)
}

fn math_fmod(args: &[Value]) -> NativeResult {
    arity("math.fmod", args, 2)?;
    let x = as_float("math.fmod", &args[0])?;
    let y = as_float("math.fmod", &args[1])?;
    if y == 0.0 {
        return Err("math.fmod by zero".to_string());
    }
    Ok(Value::Float(x % y))
}

// ---- string ----

static STRING: NativeModule = NativeModule {
    name: "string",
    member_fn: string_member,
};

fn string_member(name: &str) -> Option<Value> {
    let value = match name {
        "ascii_lowercase" => Value::Str("abcdefghijklmnopqrstuvwxyz".to_string()),
        "ascii_uppercase" => Value::Str("ABCDEFGHIJKLMNOPQRSTUVWXYZ".to_string()),
        "ascii_letters" => Value::Str(
            "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ".to_string(),
        ),
        "digits" => Value::Str("0123456789".to_string()),
        "hexdigits" => Value::Str("0123456789abcdefABCDEF".to_string()),
        "punctuation" => Value::Str(r##"!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~"##.to_string()),
        "whitespace" => Value::Str(" \t\n\r\x0b\x0c".to_string()),
        "capwords" => Value::Builtin(&STRING_CAPWORDS),
        _ => return None,
    };
    Some(value)
}

native_fn!(STRING_CAPWORDS, "string.capwords", string_capwords);

fn string_capwords(args: &[Value]) -> NativeResult {
    arity("string.capwords", args, 1)?;
    match &args[0] {
        Value::Str(s) => {
            let words: Vec<String> = s
                .split_whitespace()
                .map(|w| {
                    let mut chars = w.chars();
                    match chars.next() {
                        Some(first) => {
                            first.to_uppercase().collect::<String>()
                                + &chars.as_str().to_lowercase()
                        }
                        None => String::new(),
                    }
                })
                .collect();
            Ok(Value::Str(words.join(" ")))
        }
        other => Err(format!(
            "string.capwords expects a str, got {}",
            other.type_name()
        )),
    }
}

// ---- random ----

static RANDOM: NativeModule = NativeModule {
    name: "random",
    member_fn: random_member,
};

fn random_member(name: &str) -> Option<Value> {
    let value = match name {
        "random" => Value::Builtin(&RANDOM_RANDOM),
        "randint" => Value::Builtin(&RANDOM_RANDINT),
        "uniform" => Value::Builtin(&RANDOM_UNIFORM),
        "choice" => Value::Builtin(&RANDOM_CHOICE),
        "shuffle" => Value::Builtin(&RANDOM_SHUFFLE),
        _ => return None,
    };
    Some(value)
}

native_fn!(RANDOM_RANDOM, "random.random", random_random);
native_fn!(RANDOM_RANDINT, "random.randint", random_randint);
native_fn!(RANDOM_UNIFORM, "random.uniform", random_uniform);
native_fn!(RANDOM_CHOICE, "random.choice", random_choice);
native_fn!(RANDOM_SHUFFLE, "random.shuffle", random_shuffle);

fn random_random(args: &[Value]) -> NativeResult {
    arity("random.random", args, 0)?;
    Ok(Value::Float(rand::thread_rng().gen::<f64>()))
}

fn random_randint(args: &[Value]) -> NativeResult {
    arity("random.randint", args, 2)?;
    match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) if a <= b => {
            Ok(Value::Int(rand::thread_rng().gen_range(*a..=*b)))
        }
        (Value::Int(_), Value::Int(_)) => {
            Err("random.randint: empty range".to_string())
        }
        _ => Err("random.randint expects two ints".to_string()),
    }
}

fn random_uniform(args: &[Value]) -> NativeResult {
    arity("random.uniform", args, 2)?;
    let a = as_float("random.uniform", &args[0])?;
    let b = as_float("random.uniform", &args[1])?;
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    Ok(Value::Float(rand::thread_rng().gen_range(lo..=hi)))
}

fn random_choice(args: &[Value]) -> NativeResult {
    arity("random.choice", args, 1)?;
    match &args[0] {
        Value::List(items) => items
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| "random.choice from an empty list".to_string()),
        other => Err(format!(
            "random.choice expects a list, got {}",
            other.type_name()
        )),
    }
}

/// Returns a shuffled copy; sandbox values are copied, never aliased.
fn random_shuffle(args: &[Value]) -> NativeResult {
    arity("random.shuffle", args, 1)?;
    match &args[0] {
        Value::List(items) => {
            let mut shuffled = items.clone();
            shuffled.shuffle(&mut rand::thread_rng());
            Ok(Value::List(shuffled))
        }
        other => Err(format!(
            "random.shuffle expects a list, got {}",
            other.type_name()
        )),
    }
}

// ---- time ----

static TIME: NativeModule = NativeModule {
    name: "time",
    member_fn: time_member,
};

static PROCESS_START: LazyLock<Instant> = LazyLock::new(Instant::now);

fn time_member(name: &str) -> Option<Value> {
    let value = match name {
        "time" => Value::Builtin(&TIME_TIME),
        "monotonic" => Value::Builtin(&TIME_MONOTONIC),
        _ => return None,
    };
    Some(value)
}

native_fn!(TIME_TIME, "time.time", time_time);
native_fn!(TIME_MONOTONIC, "time.monotonic", time_monotonic);

fn time_time(args: &[Value]) -> NativeResult {
    arity("time.time", args, 0)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| format!("time.time: {}", e))?;
    Ok(Value::Float(now.as_secs_f64()))
}

fn time_monotonic(args: &[Value]) -> NativeResult {
    arity("time.monotonic", args, 0)?;
    Ok(Value::Float(PROCESS_START.elapsed().as_secs_f64()))
}

// ---- json ----

static JSON: NativeModule = NativeModule {
    name: "json",
    member_fn: json_member,
};

fn json_member(name: &str) -> Option<Value> {
    let value = match name {
        "dumps" => Value::Builtin(&JSON_DUMPS),
        "loads" => Value::Builtin(&JSON_LOADS),
        _ => return None,
    };
    Some(value)
}

native_fn!(JSON_DUMPS, "json.dumps", json_dumps);
native_fn!(JSON_LOADS, "json.loads", json_loads);

fn to_json(value: &Value) -> Result<serde_json::Value, String> {
    match value {
        Value::None => Ok(serde_json::Value::Null),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Int(n) => Ok(serde_json::Value::Number((*n).into())),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| "json.dumps: float is not finite".to_string()),
        Value::Str(s) => Ok(serde_json::Value::String(s.clone())),
        Value::List(items) => items
            .iter()
            .map(to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array),
        Value::Map(entries) => entries
            .iter()
            .map(|(k, v)| Ok((k.clone(), to_json(v)?)))
            .collect::<Result<serde_json::Map<_, _>, String>>()
            .map(serde_json::Value::Object),
        other => Err(format!(
            "json.dumps cannot serialize {}",
            other.type_name()
        )),
    }
}

fn from_json(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => {
            Value::List(items.into_iter().map(from_json).collect())
        }
        serde_json::Value::Object(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k, from_json(v)))
                .collect(),
        ),
    }
}

fn json_dumps(args: &[Value]) -> NativeResult {
    arity("json.dumps", args, 1)?;
    let json = to_json(&args[0])?;
    serde_json::to_string(&json).map(Value::Str).map_err(|e| format!("json.dumps: {}", e))
}

fn json_loads(args: &[Value]) -> NativeResult {
    arity("json.loads", args, 1)?;
    match &args[0] {
        Value::Str(s) => serde_json::from_str::<serde_json::Value>(s)
            .map(from_json)
            .map_err(|e| format!("json.loads: {}", e)),
        other => Err(format!(
            "json.loads expects a str, got {}",
            other.type_name()
        )),
    }
}

// ---- re ----

static RE: NativeModule = NativeModule {
    name: "re",
    member_fn: re_member,
};

fn re_member(name: &str) -> Option<Value> {
    let value = match name {
        "matches" => Value::Builtin(&RE_MATCHES),
        "search" => Value::Builtin(&RE_SEARCH),
        "findall" => Value::Builtin(&RE_FINDALL),
        _ => return None,
    };
    Some(value)
}

native_fn!(RE_MATCHES, "re.matches", re_matches);
native_fn!(RE_SEARCH, "re.search", re_search);
native_fn!(RE_FINDALL, "re.findall", re_findall);

fn re_args<'a>(name: &str, args: &'a [Value]) -> Result<(regex::Regex, &'a str), String> {
    arity(name, args, 2)?;
    match (&args[0], &args[1]) {
        (Value::Str(pattern), Value::Str(text)) => {
            let re = regex::Regex::new(pattern).map_err(|e| format!("{}: {}", name, e))?;
            Ok((re, text.as_str()))
        }
        _ => Err(format!("{} expects (pattern: str, text: str)", name)),
    }
}

fn re_matches(args: &[Value]) -> NativeResult {
    let (re, text) = re_args("re.matches", args)?;
    Ok(Value::Bool(re.is_match(text)))
}

fn re_search(args: &[Value]) -> NativeResult {
    let (re, text) = re_args("re.search", args)?;
    Ok(re
        .find(text)
        .map(|m| Value::Str(m.as_str().to_string()))
        .unwrap_or(Value::None))
}

fn re_findall(args: &[Value]) -> NativeResult {
    let (re, text) = re_args("re.findall", args)?;
    Ok(Value::List(
        re.find_iter(text)
            .map(|m| Value::Str(m.as_str().to_string()))
            .collect(),
    ))
}

//! The sandboxed evaluator.
//!
//! Compiles a fragment under the closed grammar and runs it against a copy
//! of the caller's environment. Builtins are the capability set plus the
//! guarded import/getattr/getitem hooks and the print-capture sink. The
//! evaluator never touches host state; everything it can reach is a
//! [`Value`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::SandboxError;
use crate::sandbox::ast::{BinOp, Expr, LogicOp, Program, Stmt, UnaryOp};
use crate::sandbox::builtins;
use crate::sandbox::modules::ImportGate;
use crate::sandbox::parser::parse;
use crate::sandbox::value::{values_equal, Environment, Value};

/// Longest string or list a repetition (`*`) may produce.
const MAX_REPEAT: usize = 100_000;

/// Result of one successful execution: the mutated environment and the
/// print collector's accumulated text.
#[derive(Debug, Clone)]
pub struct Execution {
    pub environment: Environment,
    pub output: String,
}

/// The sandbox compiler/executor. Cheap to share; holds only the import
/// gate and the fuel budget.
pub struct Interpreter {
    gate: Arc<ImportGate>,
    max_fuel: Option<u64>,
}

impl Interpreter {
    pub fn new(gate: Arc<ImportGate>, max_fuel: Option<u64>) -> Self {
        Self { gate, max_fuel }
    }

    /// The gate this interpreter imports through.
    pub fn gate(&self) -> &ImportGate {
        &self.gate
    }

    /// Compile and run `code` against a copy of `environment`.
    ///
    /// Compile failures surface as [`SandboxError::Compile`] with nothing
    /// executed; unhandled evaluation errors as [`SandboxError::Runtime`].
    /// Either way the caller's mapping is left untouched.
    pub fn execute(&self, code: &str, environment: &Environment) -> Result<Execution, SandboxError> {
        let program: Program = parse(code).map_err(SandboxError::Compile)?;
        let mut ev = Evaluator {
            env: environment.clone(),
            printed: String::new(),
            gate: &self.gate,
            max_fuel: self.max_fuel,
            consumed: 0,
        };
        ev.exec_block(&program.body)?;
        Ok(Execution {
            environment: ev.env,
            output: ev.printed,
        })
    }
}

/// Control flow escaping a statement: loop exits propagate up to the
/// nearest enclosing loop.
enum Flow {
    Normal,
    Break,
    Continue,
}

struct Evaluator<'a> {
    env: Environment,
    printed: String,
    gate: &'a ImportGate,
    max_fuel: Option<u64>,
    consumed: u64,
}

fn rt(message: impl Into<String>) -> SandboxError {
    SandboxError::Runtime(message.into())
}

impl Evaluator<'_> {
    /// Burn one unit of fuel. Statements and loop iterations each cost one.
    fn tick(&mut self) -> Result<(), SandboxError> {
        self.consumed += 1;
        if let Some(limit) = self.max_fuel {
            if self.consumed > limit {
                return Err(SandboxError::OutOfFuel {
                    consumed: self.consumed,
                });
            }
        }
        Ok(())
    }

    fn exec_block(&mut self, body: &[Stmt]) -> Result<Flow, SandboxError> {
        for stmt in body {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, SandboxError> {
        self.tick()?;
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Assign { name, op, value } => {
                let value = match op {
                    None => self.eval(value)?,
                    Some(op) => {
                        let current = self.lookup(name)?;
                        let rhs = self.eval(value)?;
                        self.binary(*op, current, rhs)?
                    }
                };
                self.env.insert(name.clone(), value);
                Ok(Flow::Normal)
            }
            Stmt::IndexAssign { name, index, value } => {
                let index = self.eval(index)?;
                let value = self.eval(value)?;
                let target = self
                    .env
                    .get_mut(name)
                    .ok_or_else(|| rt(format!("name '{}' is not defined", name)))?;
                match (target, index) {
                    (Value::List(items), Value::Int(i)) => {
                        let idx = normalize_index(i, items.len())
                            .ok_or_else(|| rt(format!("list index {} out of range", i)))?;
                        items[idx] = value;
                    }
                    (Value::Map(entries), Value::Str(key)) => {
                        entries.insert(key, value);
                    }
                    (Value::Map(_), other) => {
                        return Err(rt(format!(
                            "map keys must be str, got {}",
                            other.type_name()
                        )))
                    }
                    (target, _) => {
                        return Err(rt(format!(
                            "cannot assign into {}",
                            target.type_name()
                        )))
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Import { module } => {
                let handle = self.gate.load(module).map_err(rt)?;
                let binding = module.split('.').next().unwrap_or(module);
                self.env.insert(binding.to_string(), handle);
                Ok(Flow::Normal)
            }
            Stmt::If { arms, else_body } => {
                for (cond, body) in arms {
                    if self.eval(cond)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                if let Some(body) = else_body {
                    return self.exec_block(body);
                }
                Ok(Flow::Normal)
            }
            Stmt::While { cond, body } => {
                while self.eval(cond)?.truthy() {
                    self.tick()?;
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For { var, iter, body } => {
                let seq = self.eval(iter)?;
                let items = self.iterable(seq)?;
                for item in items {
                    self.tick()?;
                    self.env.insert(var.clone(), item);
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Pass => Ok(Flow::Normal),
        }
    }

    /// Guarded iteration: the closed set of iterable kinds.
    fn iterable(&self, value: Value) -> Result<Vec<Value>, SandboxError> {
        match value {
            Value::List(items) => Ok(items),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::Map(entries) => Ok(entries.keys().map(|k| Value::Str(k.clone())).collect()),
            other => Err(rt(format!("{} is not iterable", other.type_name()))),
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, SandboxError> {
        if let Some(value) = self.env.get(name) {
            return Ok(value.clone());
        }
        if let Some(builtin) = builtins::lookup(name) {
            return Ok(Value::Builtin(builtin));
        }
        Err(rt(format!("name '{}' is not defined", name)))
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, SandboxError> {
        match expr {
            Expr::None => Ok(Value::None),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            }
            Expr::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let key = match self.eval(key)? {
                        Value::Str(s) => s,
                        other => {
                            return Err(rt(format!(
                                "map keys must be str, got {}",
                                other.type_name()
                            )))
                        }
                    };
                    map.insert(key, self.eval(value)?);
                }
                Ok(Value::Map(map))
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                    UnaryOp::Neg => match value {
                        Value::Int(n) => n
                            .checked_neg()
                            .map(Value::Int)
                            .ok_or_else(|| rt("integer overflow")),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        other => Err(rt(format!("cannot negate {}", other.type_name()))),
                    },
                }
            }
            Expr::Logic { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                match op {
                    LogicOp::And if !lhs.truthy() => Ok(lhs),
                    LogicOp::Or if lhs.truthy() => Ok(lhs),
                    _ => self.eval(rhs),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                self.binary(*op, lhs, rhs)
            }
            Expr::Call { callee, args } => self.eval_call(callee, args),
            Expr::Attr { obj, name } => {
                let obj = self.eval(obj)?;
                self.getattr(&obj, name)
            }
            Expr::Index { obj, index } => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?;
                getitem(&obj, &index)
            }
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Value, SandboxError> {
        // Method calls are dispatched through the guarded getter path so the
        // receiver is evaluated once and mutating methods can write back.
        if let Expr::Attr { obj, name } = callee {
            return self.eval_method(obj, name, args);
        }
        let callee = self.eval(callee)?;
        let args = self.eval_args(args)?;
        self.call_value(&callee, &args)
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, SandboxError> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    fn call_value(&mut self, callee: &Value, args: &[Value]) -> Result<Value, SandboxError> {
        match callee {
            Value::Builtin(builtin) if builtin.name == "print" => {
                let line = args
                    .iter()
                    .map(Value::str_form)
                    .collect::<Vec<_>>()
                    .join(" ");
                self.printed.push_str(&line);
                self.printed.push('\n');
                Ok(Value::None)
            }
            Value::Builtin(builtin) => (builtin.func)(args).map_err(rt),
            other => Err(rt(format!("{} is not callable", other.type_name()))),
        }
    }

    /// Guarded attribute getter: internal attributes never resolve, module
    /// members come from the export table, and value methods are callable
    /// only (a bare method reference is not a value).
    fn getattr(&self, obj: &Value, name: &str) -> Result<Value, SandboxError> {
        if name.starts_with('_') {
            return Err(rt(format!("attribute '{}' is restricted", name)));
        }
        match obj {
            Value::Module(module) => module.member(name).ok_or_else(|| {
                rt(format!("module '{}' has no attribute '{}'", module.name, name))
            }),
            other => Err(rt(format!(
                "{} has no readable attribute '{}'",
                other.type_name(),
                name
            ))),
        }
    }

    fn eval_method(
        &mut self,
        obj: &Expr,
        name: &str,
        args: &[Expr],
    ) -> Result<Value, SandboxError> {
        if name.starts_with('_') {
            return Err(rt(format!("attribute '{}' is restricted", name)));
        }
        let receiver = self.eval(obj)?;

        // Module exports are plain builtins.
        if let Value::Module(module) = &receiver {
            let member = module.member(name).ok_or_else(|| {
                rt(format!("module '{}' has no attribute '{}'", module.name, name))
            })?;
            let args = self.eval_args(args)?;
            return self.call_value(&member, &args);
        }

        // `list.append` mutates its binding, so the receiver must be a name.
        if name == "append" {
            let args = self.eval_args(args)?;
            if args.len() != 1 {
                return Err(rt(format!("append() takes 1 argument, got {}", args.len())));
            }
            let Expr::Name(var) = obj else {
                return Err(rt("append() receiver must be a variable"));
            };
            match self.env.get_mut(var) {
                Some(Value::List(items)) => {
                    items.push(args.into_iter().next().unwrap_or(Value::None));
                    return Ok(Value::None);
                }
                Some(other) => {
                    return Err(rt(format!("append() on {}", other.type_name())));
                }
                None => return Err(rt(format!("name '{}' is not defined", var))),
            }
        }

        let args = self.eval_args(args)?;
        method_call(&receiver, name, &args)
    }

    fn binary(&self, op: BinOp, lhs: Value, rhs: Value) -> Result<Value, SandboxError> {
        use BinOp::*;
        match op {
            Eq => return Ok(Value::Bool(values_equal(&lhs, &rhs))),
            NotEq => return Ok(Value::Bool(!values_equal(&lhs, &rhs))),
            In => return contains(&lhs, &rhs),
            Lt | LtEq | Gt | GtEq => return order(op, &lhs, &rhs),
            _ => {}
        }
        match (op, lhs, rhs) {
            (Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (Add, Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (Mul, Value::Str(s), Value::Int(n)) | (Mul, Value::Int(n), Value::Str(s)) => {
                repeat_str(&s, n)
            }
            (Mul, Value::List(items), Value::Int(n))
            | (Mul, Value::Int(n), Value::List(items)) => repeat_list(&items, n),
            (op, Value::Int(a), Value::Int(b)) => int_arith(op, a, b),
            (op, lhs, rhs) => {
                let a = numeric(&lhs, op)?;
                let b = numeric(&rhs, op)?;
                float_arith(op, a, b)
            }
        }
    }
}

fn op_symbol(op: BinOp) -> &'static str {
    use BinOp::*;
    match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Mod => "%",
        Pow => "**",
        Eq => "==",
        NotEq => "!=",
        Lt => "<",
        LtEq => "<=",
        Gt => ">",
        GtEq => ">=",
        In => "in",
    }
}

fn numeric(value: &Value, op: BinOp) -> Result<f64, SandboxError> {
    match value {
        Value::Int(n) => Ok(*n as f64),
        Value::Float(f) => Ok(*f),
        other => Err(rt(format!(
            "unsupported operand for '{}': {}",
            op_symbol(op),
            other.type_name()
        ))),
    }
}

fn int_arith(op: BinOp, a: i64, b: i64) -> Result<Value, SandboxError> {
    use BinOp::*;
    let overflow = || rt("integer overflow");
    match op {
        Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        Div => {
            if b == 0 {
                Err(rt("division by zero"))
            } else {
                Ok(Value::Float(a as f64 / b as f64))
            }
        }
        Mod => {
            if b == 0 {
                Err(rt("modulo by zero"))
            } else {
                // Result takes the divisor's sign.
                let mut r = a % b;
                if r != 0 && (r < 0) != (b < 0) {
                    r += b;
                }
                Ok(Value::Int(r))
            }
        }
        Pow => {
            if b >= 0 {
                let exp = u32::try_from(b).map_err(|_| rt("exponent too large"))?;
                a.checked_pow(exp).map(Value::Int).ok_or_else(overflow)
            } else {
                Ok(Value::Float((a as f64).powi(b as i32)))
            }
        }
        _ => unreachable!("comparisons handled before arithmetic"),
    }
}

fn float_arith(op: BinOp, a: f64, b: f64) -> Result<Value, SandboxError> {
    use BinOp::*;
    match op {
        Add => Ok(Value::Float(a + b)),
        Sub => Ok(Value::Float(a - b)),
        Mul => Ok(Value::Float(a * b)),
        Div => {
            if b == 0.0 {
                Err(rt("division by zero"))
            } else {
                Ok(Value::Float(a / b))
            }
        }
        Mod => {
            if b == 0.0 {
                Err(rt("modulo by zero"))
            } else {
                Ok(Value::Float(a - b * (a / b).floor()))
            }
        }
        Pow => Ok(Value::Float(a.powf(b))),
        _ => unreachable!("comparisons handled before arithmetic"),
    }
}

fn order(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, SandboxError> {
    use std::cmp::Ordering;
    let ordering = match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => {
            let a = numeric(lhs, op)?;
            let b = numeric(rhs, op)?;
            a.partial_cmp(&b).ok_or_else(|| rt("values are not orderable"))?
        }
    };
    let result = match op {
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::LtEq => ordering != Ordering::Greater,
        BinOp::Gt => ordering == Ordering::Greater,
        BinOp::GtEq => ordering != Ordering::Less,
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn contains(needle: &Value, haystack: &Value) -> Result<Value, SandboxError> {
    let found = match (needle, haystack) {
        (Value::Str(n), Value::Str(h)) => h.contains(n.as_str()),
        (n, Value::List(items)) => items.iter().any(|v| values_equal(v, n)),
        (Value::Str(n), Value::Map(entries)) => entries.contains_key(n),
        (_, other) => {
            return Err(rt(format!(
                "'in' not supported for {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Bool(found))
}

fn repeat_str(s: &str, n: i64) -> Result<Value, SandboxError> {
    let n = usize::try_from(n.max(0)).unwrap_or(0);
    if s.len().saturating_mul(n) > MAX_REPEAT {
        return Err(rt("repetition result too large"));
    }
    Ok(Value::Str(s.repeat(n)))
}

fn repeat_list(items: &[Value], n: i64) -> Result<Value, SandboxError> {
    let n = usize::try_from(n.max(0)).unwrap_or(0);
    if items.len().saturating_mul(n) > MAX_REPEAT {
        return Err(rt("repetition result too large"));
    }
    let mut result = Vec::with_capacity(items.len() * n);
    for _ in 0..n {
        result.extend_from_slice(items);
    }
    Ok(Value::List(result))
}

/// Normalize a possibly negative index into `0..len`.
fn normalize_index(i: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if i < 0 { i + len } else { i };
    if (0..len).contains(&idx) {
        Some(idx as usize)
    } else {
        None
    }
}

/// Guarded item access.
fn getitem(obj: &Value, index: &Value) -> Result<Value, SandboxError> {
    match (obj, index) {
        (Value::List(items), Value::Int(i)) => normalize_index(*i, items.len())
            .map(|idx| items[idx].clone())
            .ok_or_else(|| rt(format!("list index {} out of range", i))),
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            normalize_index(*i, chars.len())
                .map(|idx| Value::Str(chars[idx].to_string()))
                .ok_or_else(|| rt(format!("string index {} out of range", i)))
        }
        (Value::Map(entries), Value::Str(key)) => entries
            .get(key)
            .cloned()
            .ok_or_else(|| rt(format!("key not found: {:?}", key))),
        (obj, index) => Err(rt(format!(
            "cannot index {} with {}",
            obj.type_name(),
            index.type_name()
        ))),
    }
}

/// The closed method surface for non-module values.
fn method_call(receiver: &Value, name: &str, args: &[Value]) -> Result<Value, SandboxError> {
    match receiver {
        Value::Str(s) => str_method(s, name, args),
        Value::List(items) => list_method(items, name, args),
        Value::Map(entries) => map_method(entries, name, args),
        other => Err(rt(format!(
            "{} has no method '{}'",
            other.type_name(),
            name
        ))),
    }
}

fn want_str<'a>(method: &str, value: Option<&'a Value>) -> Result<&'a str, SandboxError> {
    match value {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(rt(format!(
            "{}() expects a str, got {}",
            method,
            other.type_name()
        ))),
        None => Err(rt(format!("{}() is missing an argument", method))),
    }
}

fn str_method(s: &str, name: &str, args: &[Value]) -> Result<Value, SandboxError> {
    match name {
        "upper" => no_args(name, args).map(|_| Value::Str(s.to_uppercase())),
        "lower" => no_args(name, args).map(|_| Value::Str(s.to_lowercase())),
        "strip" => no_args(name, args).map(|_| Value::Str(s.trim().to_string())),
        "split" => {
            let parts: Vec<Value> = match args {
                [] => s
                    .split_whitespace()
                    .map(|p| Value::Str(p.to_string()))
                    .collect(),
                [_] => {
                    let sep = want_str("split", args.first())?;
                    if sep.is_empty() {
                        return Err(rt("split() separator must not be empty"));
                    }
                    s.split(sep).map(|p| Value::Str(p.to_string())).collect()
                }
                _ => return Err(rt("split() takes at most 1 argument")),
            };
            Ok(Value::List(parts))
        }
        "join" => match args {
            [Value::List(items)] => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Str(part) => parts.push(part.clone()),
                        other => {
                            return Err(rt(format!(
                                "join() expects a list of str, got {}",
                                other.type_name()
                            )))
                        }
                    }
                }
                Ok(Value::Str(parts.join(s)))
            }
            _ => Err(rt("join() takes a single list argument")),
        },
        "replace" => {
            if args.len() != 2 {
                return Err(rt("replace() takes 2 arguments"));
            }
            let from = want_str("replace", args.first())?;
            let to = want_str("replace", args.get(1))?;
            Ok(Value::Str(s.replace(from, to)))
        }
        "startswith" => Ok(Value::Bool(
            s.starts_with(want_str("startswith", args.first())?),
        )),
        "endswith" => Ok(Value::Bool(s.ends_with(want_str("endswith", args.first())?))),
        "find" => {
            let needle = want_str("find", args.first())?;
            let index = s
                .find(needle)
                .map(|byte_idx| s[..byte_idx].chars().count() as i64)
                .unwrap_or(-1);
            Ok(Value::Int(index))
        }
        _ => Err(rt(format!("str has no method '{}'", name))),
    }
}

fn list_method(items: &[Value], name: &str, args: &[Value]) -> Result<Value, SandboxError> {
    match name {
        "index" => {
            let needle = args
                .first()
                .ok_or_else(|| rt("index() is missing an argument"))?;
            items
                .iter()
                .position(|v| values_equal(v, needle))
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| rt("value not in list"))
        }
        "count" => {
            let needle = args
                .first()
                .ok_or_else(|| rt("count() is missing an argument"))?;
            Ok(Value::Int(
                items.iter().filter(|v| values_equal(v, needle)).count() as i64,
            ))
        }
        _ => Err(rt(format!("list has no method '{}'", name))),
    }
}

fn map_method(
    entries: &BTreeMap<String, Value>,
    name: &str,
    args: &[Value],
) -> Result<Value, SandboxError> {
    match name {
        "keys" => no_args(name, args).map(|_| {
            Value::List(entries.keys().map(|k| Value::Str(k.clone())).collect())
        }),
        "values" => no_args(name, args).map(|_| Value::List(entries.values().cloned().collect())),
        "get" => {
            let key = want_str("get", args.first())?;
            let fallback = args.get(1).cloned().unwrap_or(Value::None);
            Ok(entries.get(key).cloned().unwrap_or(fallback))
        }
        _ => Err(rt(format!("map has no method '{}'", name))),
    }
}

fn no_args(name: &str, args: &[Value]) -> Result<(), SandboxError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(rt(format!("{}() takes no arguments", name)))
    }
}

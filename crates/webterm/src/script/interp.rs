//! Tree-walking interpreter.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io;

use super::builtins;
use super::category;
use super::lexer::Part;
use super::parser::{BinOp, Expr, Stmt, UnaryOp};
use super::sandbox::Sandbox;
use super::value::{Array, Key, Number, Object, ObjectKind, Value};
use super::ScriptError;

/// Deepest array or object a script may build or assign. A stored payload
/// spends up to six JSON levels per value level, and reading a session file
/// back stops at serde_json's limit of 128.
const MAX_VALUE_DEPTH: usize = 20;

fn check_depth(depth: usize) -> Result<(), ScriptError> {
    if depth > MAX_VALUE_DEPTH {
        return Err(ScriptError::error("Maximum nesting depth exceeded"));
    }
    Ok(())
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

enum Segment {
    Index(Option<Key>),
    Prop(String),
}

pub(crate) struct Interp<'a> {
    pub(crate) host: &'a Sandbox,
    vars: BTreeMap<String, Value>,
    out: &'a mut dyn io::Write,
    steps: u64,
}

impl<'a> Interp<'a> {
    pub(crate) fn new(host: &'a Sandbox, out: &'a mut dyn io::Write) -> Self {
        Self {
            host,
            vars: BTreeMap::new(),
            out,
            steps: 0,
        }
    }

    pub(crate) fn set_var(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub(crate) fn into_vars(self) -> BTreeMap<String, Value> {
        self.vars
    }

    /// Run a program, returning the value of its first top-level `return`.
    pub(crate) fn run(&mut self, program: &[Stmt]) -> Result<Value, ScriptError> {
        match self.exec_block(program)? {
            Flow::Normal => Ok(Value::Null),
            Flow::Return(value) => Ok(value),
            Flow::Break | Flow::Continue => Err(ScriptError::error(
                "'break' not in the 'loop' context",
            )),
        }
    }

    pub(crate) fn write(&mut self, text: &str) -> Result<(), ScriptError> {
        self.out
            .write_all(text.as_bytes())
            .map_err(|e| ScriptError::error(format!("failed to write output: {}", e)))
    }

    fn tick(&mut self) -> Result<(), ScriptError> {
        self.steps += 1;
        if self.steps > self.host.max_steps() {
            return Err(ScriptError::error(format!(
                "Maximum execution steps of {} exceeded",
                self.host.max_steps()
            )));
        }
        Ok(())
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, ScriptError> {
        for stmt in stmts {
            match self.exec(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow, ScriptError> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
            Stmt::Echo(exprs) => {
                for expr in exprs {
                    let text = self.eval(expr)?.to_php_string()?;
                    self.write(&text)?;
                }
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.is_truthy() {
                        return self.exec_block(body);
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec_block(body);
                }
            }
            Stmt::While { cond, body } => loop {
                self.tick()?;
                if !self.eval(cond)?.is_truthy() {
                    break;
                }
                match self.exec_block(body)? {
                    Flow::Break => break,
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Normal | Flow::Continue => {}
                }
            },
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                for expr in init {
                    self.eval(expr)?;
                }
                loop {
                    self.tick()?;
                    let mut keep_going = true;
                    for expr in cond {
                        keep_going = self.eval(expr)?.is_truthy();
                    }
                    if !keep_going {
                        break;
                    }
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    for expr in step {
                        self.eval(expr)?;
                    }
                }
            }
            Stmt::Foreach {
                subject,
                key,
                value,
                body,
            } => {
                let subject = self.eval(subject)?;
                let entries: Vec<(Key, Value)> = match &subject {
                    Value::Array(array) => iter_entries(array),
                    Value::Object(obj) => match &obj.kind {
                        ObjectKind::Collection { items } => iter_entries(items),
                        _ => iter_entries(&obj.props),
                    },
                    other => {
                        return Err(ScriptError::type_error(format!(
                            "foreach() argument must be of type array|object, {} given",
                            short_type(other)
                        )));
                    }
                };
                for (k, v) in entries {
                    self.tick()?;
                    if let Some(key_name) = key {
                        self.vars.insert(key_name.clone(), k.to_value());
                    }
                    self.vars.insert(value.clone(), v);
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::Throw(expr) => {
                let value = self.eval(expr)?;
                return Err(match value {
                    Value::Object(obj) => {
                        let message = match obj.props.get(&Key::Str("message".into())) {
                            Some(m) => m.to_php_string()?,
                            None => String::new(),
                        };
                        ScriptError::new(obj.class.trim_start_matches('\\'), message)
                    }
                    _ => ScriptError::error("Can only throw objects"),
                });
            }
            Stmt::Block(stmts) => return self.exec_block(stmts),
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        match expr {
            Expr::Lit(value) => Ok(value.clone()),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        Part::Lit(text) => out.push_str(text),
                        Part::Var(name) => out.push_str(&self.var(name)?.to_php_string()?),
                    }
                }
                Ok(Value::Str(out))
            }
            Expr::Var(name) => self.var(name),
            Expr::Const(name) => constant(name),
            Expr::Array(items) => {
                let mut array = Array::new();
                for (key, value) in items {
                    let value = self.eval(value)?;
                    check_depth(value.depth() + 1)?;
                    match key {
                        Some(key) => {
                            let key = key_of(&self.eval(key)?)?;
                            array.insert(key, value);
                        }
                        None => array.push(value),
                    }
                }
                Ok(Value::Array(array))
            }
            Expr::Index { target, index } => {
                let base = self.eval(target)?;
                let Some(index) = index else {
                    return Err(ScriptError::error("Cannot use [] for reading"));
                };
                let key = key_of(&self.eval(index)?)?;
                read_index(&base, &key)
            }
            Expr::Prop { target, name } => match self.eval(target)? {
                Value::Object(obj) => obj
                    .props
                    .get(&Key::Str(name.clone()))
                    .cloned()
                    .ok_or_else(|| {
                        ScriptError::undefined(format!(
                            "Undefined property: {}::${}",
                            obj.class.trim_start_matches('\\'),
                            name
                        ))
                    }),
                other => Err(ScriptError::undefined(format!(
                    "Attempt to read property \"{}\" on {}",
                    name,
                    short_type(&other)
                ))),
            },
            Expr::Method { target, name, args } => {
                let target = self.eval(target)?;
                let args = self.eval_args(args)?;
                builtins::call_method(self, target, name, args)
            }
            Expr::Call { name, args } => {
                let lower = name.trim_start_matches('\\').to_ascii_lowercase();
                match lower.as_str() {
                    "isset" => {
                        for arg in args {
                            match self.eval_quiet(arg)? {
                                Some(Value::Null) | None => return Ok(Value::Bool(false)),
                                Some(_) => {}
                            }
                        }
                        Ok(Value::Bool(!args.is_empty()))
                    }
                    "empty" => {
                        let Some(arg) = args.first() else {
                            return Err(ScriptError::parse(
                                "syntax error, unexpected token \")\"",
                            ));
                        };
                        let value = self.eval_quiet(arg)?;
                        Ok(Value::Bool(!value.is_some_and(|v| v.is_truthy())))
                    }
                    _ => {
                        let args = self.eval_args(args)?;
                        builtins::call_function(self, &lower, args)
                    }
                }
            }
            Expr::Static {
                class,
                method,
                args,
            } => {
                let args = self.eval_args(args)?;
                self.host.call_static(class, method, &args)
            }
            Expr::New { class, args } => {
                let args = self.eval_args(args)?;
                self.construct(class, args)
            }
            Expr::Unary { op, expr } => {
                let value = self.eval(expr)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => binary(BinOp::Mul, value, Value::Int(-1)),
                    UnaryOp::Plus => binary(BinOp::Mul, value, Value::Int(1)),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, lhs, rhs)
            }
            Expr::And(lhs, rhs) => {
                let result = self.eval(lhs)?.is_truthy() && self.eval(rhs)?.is_truthy();
                Ok(Value::Bool(result))
            }
            Expr::Or(lhs, rhs) => {
                let result = self.eval(lhs)?.is_truthy() || self.eval(rhs)?.is_truthy();
                Ok(Value::Bool(result))
            }
            Expr::Coalesce(lhs, rhs) => match self.eval_quiet(lhs)? {
                Some(value) if value != Value::Null => Ok(value),
                _ => self.eval(rhs),
            },
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.eval(cond)?;
                if cond.is_truthy() {
                    match then {
                        Some(then) => self.eval(then),
                        None => Ok(cond),
                    }
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Assign { target, op, value } => {
                let mut value = self.eval(value)?;
                if let Some(op) = op {
                    let current = self.eval(target)?;
                    value = binary(*op, current, value)?;
                }
                self.assign(target, value.clone())?;
                Ok(value)
            }
            Expr::IncDec {
                target,
                delta,
                prefix,
            } => {
                let old = match self.eval_quiet(target)? {
                    Some(value) => value,
                    None => Value::Null,
                };
                let new = binary(BinOp::Add, old.clone(), Value::Int(*delta))?;
                self.assign(target, new.clone())?;
                Ok(if *prefix { new } else { old })
            }
            Expr::Print(expr) => {
                let text = self.eval(expr)?.to_php_string()?;
                self.write(&text)?;
                Ok(Value::Int(1))
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, ScriptError> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    /// Evaluate, mapping reads of undefined things to `None`.
    fn eval_quiet(&mut self, expr: &Expr) -> Result<Option<Value>, ScriptError> {
        match self.eval(expr) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.category == category::ERROR_EXCEPTION => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn var(&self, name: &str) -> Result<Value, ScriptError> {
        self.vars
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::undefined(format!("Undefined variable ${}", name)))
    }

    fn construct(&self, class: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        let name = class.trim_start_matches('\\');
        let basename = super::value::class_basename(name);
        if name.eq_ignore_ascii_case("stdClass") {
            return Ok(Value::Object(Object::plain("stdClass")));
        }
        if basename.ends_with("Exception") || basename.ends_with("Error") {
            let mut obj = Object::plain(name);
            let message = match args.first() {
                Some(m) => m.to_php_string()?,
                None => String::new(),
            };
            obj.props.insert(Key::Str("message".into()), Value::Str(message));
            obj.props.insert(
                Key::Str("code".into()),
                args.get(1).cloned().unwrap_or(Value::Int(0)),
            );
            return Ok(Value::Object(obj));
        }
        // Host classes are constructed through a registered `__construct`.
        self.host.call_static(class, "__construct", &args)
    }

    fn path(&mut self, target: &Expr) -> Result<(String, Vec<Segment>), ScriptError> {
        match target {
            Expr::Var(name) => Ok((name.clone(), Vec::new())),
            Expr::Index { target, index } => {
                let (root, mut segments) = self.path(target)?;
                let key = match index {
                    Some(index) => Some(key_of(&self.eval(index)?)?),
                    None => None,
                };
                segments.push(Segment::Index(key));
                Ok((root, segments))
            }
            Expr::Prop { target, name } => {
                let (root, mut segments) = self.path(target)?;
                segments.push(Segment::Prop(name.clone()));
                Ok((root, segments))
            }
            _ => Err(ScriptError::error("Cannot assign to this expression")),
        }
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Result<(), ScriptError> {
        let (root, segments) = self.path(target)?;
        check_depth(segments.len() + value.depth())?;
        let mut slot = self.vars.entry(root).or_insert(Value::Null);
        for segment in segments {
            slot = descend(slot, segment)?;
        }
        *slot = value;
        Ok(())
    }
}

fn descend(slot: &mut Value, segment: Segment) -> Result<&mut Value, ScriptError> {
    if *slot == Value::Null {
        match &segment {
            Segment::Index(_) => *slot = Value::Array(Array::new()),
            Segment::Prop(name) => {
                return Err(ScriptError::error(format!(
                    "Attempt to assign property \"{}\" on null",
                    name
                )));
            }
        }
    }
    match (slot, segment) {
        (Value::Array(array), Segment::Index(Some(key))) => Ok(array.entry(key)),
        (Value::Array(array), Segment::Index(None)) => Ok(array.push_entry()),
        (Value::Object(obj), Segment::Prop(name)) => Ok(obj.props.entry(Key::Str(name))),
        (Value::Object(obj), Segment::Index(_)) => Err(ScriptError::error(format!(
            "Cannot use object of type {} as array",
            obj.class.trim_start_matches('\\')
        ))),
        (_, Segment::Index(_)) => Err(ScriptError::error("Cannot use a scalar value as an array")),
        (other, Segment::Prop(name)) => Err(ScriptError::error(format!(
            "Attempt to assign property \"{}\" on {}",
            name,
            short_type(other)
        ))),
    }
}

fn iter_entries(array: &Array) -> Vec<(Key, Value)> {
    array.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

fn read_index(base: &Value, key: &Key) -> Result<Value, ScriptError> {
    let missing = || match key {
        Key::Int(n) => ScriptError::undefined(format!("Undefined array key {}", n)),
        Key::Str(s) => ScriptError::undefined(format!("Undefined array key \"{}\"", s)),
    };
    match base {
        Value::Array(array) => array.get(key).cloned().ok_or_else(missing),
        Value::Object(obj) => match &obj.kind {
            ObjectKind::Collection { items } => items.get(key).cloned().ok_or_else(missing),
            _ => Err(ScriptError::error(format!(
                "Cannot use object of type {} as array",
                obj.class.trim_start_matches('\\')
            ))),
        },
        Value::Str(s) => {
            let Key::Int(n) = key else {
                return Err(ScriptError::type_error(format!(
                    "Cannot access offset of type string on string: \"{}\"",
                    key
                )));
            };
            let len = s.chars().count() as i64;
            let index = if *n < 0 { len + n } else { *n };
            s.chars()
                .nth(usize::try_from(index).unwrap_or(usize::MAX))
                .map(|c| Value::Str(c.to_string()))
                .ok_or_else(|| {
                    ScriptError::undefined(format!("Uninitialized string offset {}", n))
                })
        }
        other => Err(ScriptError::undefined(format!(
            "Trying to access array offset on value of type {}",
            short_type(other)
        ))),
    }
}

/// Type names as used in error messages.
pub(crate) fn short_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::Str(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn key_of(value: &Value) -> Result<Key, ScriptError> {
    match value {
        Value::Int(n) => Ok(Key::Int(*n)),
        Value::Str(s) => Ok(Key::from_text(s)),
        Value::Bool(b) => Ok(Key::Int(i64::from(*b))),
        Value::Null => Ok(Key::Str(String::new())),
        Value::Float(f) => Ok(Key::Int(*f as i64)),
        other => Err(ScriptError::type_error(format!(
            "Illegal offset type: {}",
            short_type(other)
        ))),
    }
}

fn constant(name: &str) -> Result<Value, ScriptError> {
    match name.trim_start_matches('\\') {
        "PHP_EOL" => Ok(Value::str("\n")),
        "PHP_INT_MAX" => Ok(Value::Int(i64::MAX)),
        "PHP_INT_MIN" => Ok(Value::Int(i64::MIN)),
        "PHP_INT_SIZE" => Ok(Value::Int(8)),
        "PHP_FLOAT_EPSILON" => Ok(Value::Float(f64::EPSILON)),
        "M_PI" => Ok(Value::Float(std::f64::consts::PI)),
        "M_E" => Ok(Value::Float(std::f64::consts::E)),
        other => Err(ScriptError::error(format!("Undefined constant \"{}\"", other))),
    }
}

fn operand(value: &Value, op: BinOp, other: &Value) -> Result<Number, ScriptError> {
    match value {
        Value::Null => Ok(Number::Int(0)),
        Value::Bool(b) => Ok(Number::Int(i64::from(*b))),
        _ => value.as_number().ok_or_else(|| unsupported(op, value, other)),
    }
}

fn unsupported(op: BinOp, lhs: &Value, rhs: &Value) -> ScriptError {
    ScriptError::type_error(format!(
        "Unsupported operand types: {} {} {}",
        short_type(lhs),
        op.symbol(),
        short_type(rhs)
    ))
}

/// Apply a binary operator.
pub(crate) fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, ScriptError> {
    match op {
        BinOp::Concat => {
            let mut text = lhs.to_php_string()?;
            text.push_str(&rhs.to_php_string()?);
            return Ok(Value::Str(text));
        }
        BinOp::Eq => return Ok(Value::Bool(lhs.loose_eq(&rhs))),
        BinOp::NotEq => return Ok(Value::Bool(!lhs.loose_eq(&rhs))),
        BinOp::Identical => return Ok(Value::Bool(lhs.strict_eq(&rhs))),
        BinOp::NotIdentical => return Ok(Value::Bool(!lhs.strict_eq(&rhs))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ord = lhs.compare(&rhs);
            let result = match op {
                BinOp::Lt => ord == Some(Ordering::Less),
                BinOp::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
                BinOp::Gt => ord == Some(Ordering::Greater),
                _ => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    if let (BinOp::Add, Value::Array(a), Value::Array(b)) = (op, &lhs, &rhs) {
        let mut union = a.clone();
        for (k, v) in b.iter() {
            if union.get(k).is_none() {
                union.insert(k.clone(), v.clone());
            }
        }
        return Ok(Value::Array(union));
    }
    if matches!(lhs, Value::Array(_) | Value::Object(_))
        || matches!(rhs, Value::Array(_) | Value::Object(_))
    {
        return Err(unsupported(op, &lhs, &rhs));
    }

    let a = operand(&lhs, op, &rhs)?;
    let b = operand(&rhs, op, &lhs)?;
    arithmetic(op, a, b)
}

fn arithmetic(op: BinOp, a: Number, b: Number) -> Result<Value, ScriptError> {
    if op == BinOp::Mod {
        let x = int_of(a);
        let y = int_of(b);
        if y == 0 {
            return Err(ScriptError::new(category::DIVISION_BY_ZERO, "Modulo by zero"));
        }
        return Ok(Value::Int(x.checked_rem(y).unwrap_or(0)));
    }
    if op == BinOp::Div && b.as_f64() == 0.0 {
        return Err(ScriptError::new(category::DIVISION_BY_ZERO, "Division by zero"));
    }

    if let (Number::Int(x), Number::Int(y)) = (a, b) {
        let exact = match op {
            BinOp::Add => x.checked_add(y),
            BinOp::Sub => x.checked_sub(y),
            BinOp::Mul => x.checked_mul(y),
            BinOp::Div if x.checked_rem(y) == Some(0) => x.checked_div(y),
            _ => None,
        };
        if let Some(n) = exact {
            return Ok(Value::Int(n));
        }
    }

    let (x, y) = (a.as_f64(), b.as_f64());
    Ok(Value::Float(match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        _ => x / y,
    }))
}

fn int_of(n: Number) -> i64 {
    match n {
        Number::Int(i) => i,
        Number::Float(f) => f as i64,
    }
}

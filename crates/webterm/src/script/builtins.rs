//! Builtin functions and object methods.

use std::cmp::Ordering;
use std::fmt::Write as _;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use super::category;
use super::interp::{Interp, short_type};
use super::value::{Array, Key, Number, Object, ObjectKind, Value, format_float, parse_numeric};
use super::ScriptError;

/// Class of the date objects returned by `now()`.
const CARBON_CLASS: &str = r"Illuminate\Support\Carbon";

/// Largest string or array a builtin will build.
const MAX_BUILD: usize = 16 * 1024 * 1024;

const MAX_RANGE: usize = 1_000_000;

fn too_few(func: &str, needed: usize, given: usize) -> ScriptError {
    ScriptError::new(
        category::ARGUMENT_COUNT,
        format!(
            "{}() expects at least {} argument{}, {} given",
            func,
            needed,
            if needed == 1 { "" } else { "s" },
            given
        ),
    )
}

fn arg<'v>(args: &'v [Value], index: usize, func: &str) -> Result<&'v Value, ScriptError> {
    args.get(index)
        .ok_or_else(|| too_few(func, index + 1, args.len()))
}

fn string_arg(args: &[Value], index: usize, func: &str) -> Result<String, ScriptError> {
    let value = arg(args, index, func)?;
    match value {
        Value::Array(_) => {}
        Value::Object(obj) if obj.text.is_none() => {}
        _ => return value.to_php_string(),
    }
    Err(ScriptError::type_error(format!(
        "{}(): Argument #{} must be of type string, {} given",
        func,
        index + 1,
        short_type(value)
    )))
}

fn number_arg(args: &[Value], index: usize, func: &str) -> Result<Number, ScriptError> {
    let v = arg(args, index, func)?;
    match v {
        Value::Null => Ok(Number::Int(0)),
        Value::Bool(b) => Ok(Number::Int(i64::from(*b))),
        _ => v.as_number().ok_or_else(|| {
            ScriptError::type_error(format!(
                "{}(): Argument #{} must be of type int|float, {} given",
                func,
                index + 1,
                short_type(v)
            ))
        }),
    }
}

fn int_arg(args: &[Value], index: usize, func: &str) -> Result<i64, ScriptError> {
    Ok(match number_arg(args, index, func)? {
        Number::Int(n) => n,
        Number::Float(f) => f as i64,
    })
}

fn array_arg<'v>(args: &'v [Value], index: usize, func: &str) -> Result<&'v Array, ScriptError> {
    match arg(args, index, func)? {
        Value::Array(array) => Ok(array),
        other => Err(ScriptError::type_error(format!(
            "{}(): Argument #{} ($array) must be of type array, {} given",
            func,
            index + 1,
            short_type(other)
        ))),
    }
}

/// Call a builtin function. `name` is lowercase without a leading `\`.
pub(crate) fn call_function(
    interp: &mut Interp<'_>,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    let args = args.as_slice();
    match name {
        "count" => count(arg(args, 0, name)?, name),
        "strlen" => Ok(Value::Int(string_arg(args, 0, name)?.len() as i64)),
        "strtoupper" => Ok(Value::Str(string_arg(args, 0, name)?.to_ascii_uppercase())),
        "strtolower" => Ok(Value::Str(string_arg(args, 0, name)?.to_ascii_lowercase())),
        "ucfirst" => {
            let s = string_arg(args, 0, name)?;
            let mut chars = s.chars();
            Ok(Value::Str(match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => s,
            }))
        }
        "trim" => {
            let s = string_arg(args, 0, name)?;
            let chars = match args.get(1) {
                Some(_) => string_arg(args, 1, name)?,
                None => " \t\n\r\0\x0B".to_string(),
            };
            Ok(Value::str(s.trim_matches(|c| chars.contains(c))))
        }
        "str_repeat" => {
            let s = string_arg(args, 0, name)?;
            let times = int_arg(args, 1, name)?;
            let times = usize::try_from(times).map_err(|_| {
                ScriptError::new(
                    category::VALUE,
                    "str_repeat(): Argument #2 ($times) must be greater than or equal to 0",
                )
            })?;
            if s.len().saturating_mul(times) > MAX_BUILD {
                return Err(ScriptError::error("str_repeat(): result is too large"));
            }
            Ok(Value::Str(s.repeat(times)))
        }
        "str_contains" => {
            let haystack = string_arg(args, 0, name)?;
            let needle = string_arg(args, 1, name)?;
            Ok(Value::Bool(haystack.contains(&needle)))
        }
        "str_replace" => {
            let search = string_arg(args, 0, name)?;
            let replace = string_arg(args, 1, name)?;
            let subject = string_arg(args, 2, name)?;
            if search.is_empty() {
                return Ok(Value::Str(subject));
            }
            Ok(Value::Str(subject.replace(&search, &replace)))
        }
        "implode" | "join" => {
            let (glue, pieces) = match (args.first(), args.get(1)) {
                (Some(Value::Array(pieces)), None) => (String::new(), pieces),
                (Some(_), Some(Value::Array(pieces))) => (string_arg(args, 0, name)?, pieces),
                _ => return array_arg(args, 1, name).map(|_| Value::Null),
            };
            let parts = pieces
                .values()
                .map(Value::to_php_string)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Str(parts.join(&glue)))
        }
        "explode" => {
            let separator = string_arg(args, 0, name)?;
            let s = string_arg(args, 1, name)?;
            if separator.is_empty() {
                return Err(ScriptError::new(
                    category::VALUE,
                    "explode(): Argument #1 ($separator) cannot be empty",
                ));
            }
            let parts: Vec<Value> = match args.get(2) {
                Some(_) => {
                    let limit = int_arg(args, 2, name)?.max(1);
                    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
                    s.splitn(limit, separator.as_str()).map(Value::from).collect()
                }
                None => s.split(separator.as_str()).map(Value::from).collect(),
            };
            Ok(Value::list(parts))
        }
        "array_keys" => Ok(Value::list(
            array_arg(args, 0, name)?.keys().map(Key::to_value),
        )),
        "array_values" => Ok(Value::list(array_arg(args, 0, name)?.values().cloned())),
        "array_sum" => Ok(sum(array_arg(args, 0, name)?.values())),
        "array_merge" => {
            let mut merged = Array::new();
            for index in 0..args.len() {
                for (k, v) in array_arg(args, index, name)?.iter() {
                    match k {
                        Key::Int(_) => merged.push(v.clone()),
                        Key::Str(_) => merged.insert(k.clone(), v.clone()),
                    }
                }
            }
            Ok(Value::Array(merged))
        }
        "in_array" => {
            let needle = arg(args, 0, name)?;
            let haystack = array_arg(args, 1, name)?;
            let strict = args.get(2).is_some_and(Value::is_truthy);
            Ok(Value::Bool(haystack.values().any(|v| {
                if strict { v.strict_eq(needle) } else { v.loose_eq(needle) }
            })))
        }
        "range" => range(args),
        "max" | "min" => extreme(args, name),
        "abs" => Ok(match number_arg(args, 0, name)? {
            Number::Int(n) => n
                .checked_abs()
                .map(Value::Int)
                .unwrap_or(Value::Float((n as f64).abs())),
            Number::Float(f) => Value::Float(f.abs()),
        }),
        "round" => {
            let x = number_arg(args, 0, name)?.as_f64();
            let precision = match args.get(1) {
                Some(_) => int_arg(args, 1, name)?,
                None => 0,
            };
            let factor = 10f64.powi(precision.clamp(-15, 15) as i32);
            Ok(Value::Float((x * factor).round() / factor))
        }
        "json_encode" => {
            let value = arg(args, 0, name)?;
            serde_json::to_string(&value.to_json())
                .map(Value::Str)
                .map_err(|e| ScriptError::error(format!("json_encode(): {}", e)))
        }
        "var_dump" => {
            if args.is_empty() {
                return Err(too_few(name, 1, 0));
            }
            let mut text = String::new();
            for value in args {
                var_dump(value, 0, &mut text);
            }
            interp.write(&text)?;
            Ok(Value::Null)
        }
        "dump" => {
            let mut text = String::new();
            for value in args {
                dump(value, 0, &mut text);
                text.push('\n');
            }
            interp.write(&text)?;
            Ok(args.first().cloned().unwrap_or_default())
        }
        "date" => {
            let format = string_arg(args, 0, name)?;
            let at = match args.get(1) {
                Some(_) => timestamp(int_arg(args, 1, name)?)?,
                None => interp.host.now(),
            };
            Ok(Value::Str(format_date(&format, &at)))
        }
        "now" => Ok(Value::Object(carbon(interp.host.now()))),
        "env" => {
            let key = string_arg(args, 0, name)?;
            let default = args.get(1).cloned().unwrap_or_default();
            Ok(match std::env::var(&key) {
                Ok(raw) => match raw.to_ascii_lowercase().as_str() {
                    "true" | "(true)" => Value::Bool(true),
                    "false" | "(false)" => Value::Bool(false),
                    "null" | "(null)" => Value::Null,
                    "empty" | "(empty)" => Value::str(""),
                    _ => Value::Str(raw),
                },
                Err(_) => default,
            })
        }
        "config" => {
            let key = string_arg(args, 0, name)?;
            let default = args.get(1).cloned().unwrap_or_default();
            Ok(interp.host.config_value(&key).unwrap_or(default))
        }
        "collect" => Ok(Value::Object(Object::collection(match args.first() {
            None | Some(Value::Null) => Array::new(),
            Some(Value::Array(array)) => array.clone(),
            Some(Value::Object(obj)) if obj.items().is_some() => {
                obj.items().cloned().unwrap_or_default()
            }
            Some(other) => Array::from_list([other.clone()]),
        }))),
        "gettype" => Ok(Value::str(arg(args, 0, name)?.type_name())),
        "is_null" => Ok(Value::Bool(*arg(args, 0, name)? == Value::Null)),
        "is_array" => Ok(Value::Bool(matches!(arg(args, 0, name)?, Value::Array(_)))),
        "is_string" => Ok(Value::Bool(matches!(arg(args, 0, name)?, Value::Str(_)))),
        "is_int" | "is_integer" => Ok(Value::Bool(matches!(arg(args, 0, name)?, Value::Int(_)))),
        "is_numeric" => Ok(Value::Bool(match arg(args, 0, name)? {
            Value::Int(_) | Value::Float(_) => true,
            Value::Str(s) => parse_numeric(s).is_some(),
            _ => false,
        })),
        "intval" => Ok(Value::Int(intval(arg(args, 0, name)?))),
        "strval" => Ok(Value::Str(string_arg(args, 0, name)?)),
        _ => Err(ScriptError::error(format!(
            "Call to undefined function {}()",
            name
        ))),
    }
}

fn count(value: &Value, func: &str) -> Result<Value, ScriptError> {
    match value {
        Value::Array(array) => Ok(Value::Int(array.len() as i64)),
        Value::Object(obj) if obj.items().is_some() => {
            Ok(Value::Int(obj.items().map_or(0, Array::len) as i64))
        }
        other => Err(ScriptError::type_error(format!(
            "{}(): Argument #1 ($value) must be of type Countable|array, {} given",
            func,
            short_type(other)
        ))),
    }
}

fn sum<'v>(values: impl Iterator<Item = &'v Value>) -> Value {
    let mut int_total: i64 = 0;
    let mut float_total: Option<f64> = None;
    for value in values {
        match value.as_number() {
            Some(Number::Int(n)) => {
                if let Some(total) = float_total.as_mut() {
                    *total += n as f64;
                } else if let Some(next) = int_total.checked_add(n) {
                    int_total = next;
                } else {
                    float_total = Some(int_total as f64 + n as f64);
                }
            }
            Some(Number::Float(f)) => {
                *float_total.get_or_insert(int_total as f64) += f;
            }
            None => {}
        }
    }
    match float_total {
        Some(total) => Value::Float(total),
        None => Value::Int(int_total),
    }
}

fn intval(value: &Value) -> i64 {
    match value {
        Value::Null => 0,
        Value::Bool(b) => i64::from(*b),
        Value::Int(n) => *n,
        Value::Float(f) => *f as i64,
        Value::Str(s) => {
            let s = s.trim_start();
            let end = s
                .char_indices()
                .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+'))))
                .map_or(s.len(), |(i, _)| i);
            s[..end].parse().unwrap_or(0)
        }
        Value::Array(array) => i64::from(!array.is_empty()),
        Value::Object(_) => 1,
    }
}

fn range(args: &[Value]) -> Result<Value, ScriptError> {
    let start = arg(args, 0, "range")?;
    let end = arg(args, 1, "range")?;

    if let (Value::Str(a), Value::Str(b)) = (start, end)
        && a.chars().count() == 1
        && b.chars().count() == 1
        && parse_numeric(a).is_none()
    {
        let (a, b) = (a.chars().next().unwrap_or('a'), b.chars().next().unwrap_or('a'));
        let letters: Vec<Value> = if a <= b {
            (a..=b).map(|c| Value::Str(c.to_string())).collect()
        } else {
            (b..=a).rev().map(|c| Value::Str(c.to_string())).collect()
        };
        return Ok(Value::list(letters));
    }

    let step = match args.get(2) {
        Some(_) => number_arg(args, 2, "range")?,
        None => Number::Int(1),
    };
    let a = number_arg(args, 0, "range")?;
    let b = number_arg(args, 1, "range")?;
    if step.as_f64() == 0.0 {
        return Err(ScriptError::new(
            category::VALUE,
            "range(): Argument #3 ($step) cannot be 0",
        ));
    }
    let too_many = || ScriptError::new(category::VALUE, "range(): too many elements");

    if let (Number::Int(a), Number::Int(b), Number::Int(step)) = (a, b, step) {
        let step = step.unsigned_abs();
        let span = a.abs_diff(b);
        if span / step >= MAX_RANGE as u64 {
            return Err(too_many());
        }
        let values = (0..=span / step)
            .map(|i| {
                let offset = i * step;
                let n = if a <= b {
                    a.checked_add_unsigned(offset)
                } else {
                    a.checked_sub_unsigned(offset)
                };
                n.map(Value::Int).ok_or_else(|| {
                    ScriptError::new(category::VALUE, "range(): step exceeds the integer range")
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Value::list(values));
    }

    let (a, b, step) = (a.as_f64(), b.as_f64(), step.as_f64().abs());
    let n = ((a - b).abs() / step).floor();
    if !n.is_finite() || n >= MAX_RANGE as f64 {
        return Err(too_many());
    }
    let values = (0..=n as u64).map(|i| {
        let offset = i as f64 * step;
        Value::Float(if a <= b { a + offset } else { a - offset })
    });
    Ok(Value::list(values))
}

fn extreme(args: &[Value], func: &str) -> Result<Value, ScriptError> {
    let candidates: Vec<&Value> = match args {
        [Value::Array(array)] => array.values().collect(),
        [single] => {
            return Err(ScriptError::type_error(format!(
                "{}(): Argument #1 ($value) must be of type array, {} given",
                func,
                short_type(single)
            )));
        }
        _ => args.iter().collect(),
    };
    let want = if func == "max" {
        Ordering::Greater
    } else {
        Ordering::Less
    };
    let mut best: Option<&Value> = None;
    for candidate in candidates {
        best = match best {
            Some(current) if candidate.compare(current) != Some(want) => Some(current),
            _ => Some(candidate),
        };
    }
    best.cloned().ok_or_else(|| {
        ScriptError::new(
            category::VALUE,
            format!(
                "{}(): Argument #1 ($value) must contain at least one element",
                func
            ),
        )
    })
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, ScriptError> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| ScriptError::new(category::VALUE, "timestamp out of range"))
}

fn carbon(at: DateTime<Utc>) -> Object {
    let mut obj = Object::stringable(CARBON_CLASS, format_date("Y-m-d H:i:s", &at));
    obj.props
        .insert(Key::Str("timestamp".into()), Value::Int(at.timestamp()));
    obj
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map_or(30, |d| d.day())
}

/// Format `at` using `date()` format characters.
pub(crate) fn format_date(format: &str, at: &DateTime<Utc>) -> String {
    let mut out = String::new();
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        let spec = match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
                continue;
            }
            'd' => "%d",
            'D' => "%a",
            'j' => "%-d",
            'l' => "%A",
            'N' => "%u",
            'w' => "%w",
            'W' => "%V",
            'F' => "%B",
            'm' => "%m",
            'M' => "%b",
            'n' => "%-m",
            'Y' => "%Y",
            'y' => "%y",
            'a' => "%P",
            'A' => "%p",
            'g' => "%-I",
            'G' => "%-H",
            'h' => "%I",
            'H' => "%H",
            'i' => "%M",
            's' => "%S",
            'u' => "%6f",
            'v' => "%3f",
            'U' => "%s",
            'c' => "%Y-%m-%dT%H:%M:%S+00:00",
            'r' => "%a, %d %b %Y %H:%M:%S +0000",
            'e' | 'T' => "UTC",
            'P' => "+00:00",
            'O' => "+0000",
            'z' => {
                let _ = write!(out, "{}", at.ordinal0());
                continue;
            }
            't' => {
                let _ = write!(out, "{}", days_in_month(at.year(), at.month()));
                continue;
            }
            'L' => {
                let leap = NaiveDate::from_ymd_opt(at.year(), 2, 29).is_some();
                out.push(if leap { '1' } else { '0' });
                continue;
            }
            other => {
                out.push(other);
                continue;
            }
        };
        let _ = write!(out, "{}", at.format(spec));
    }
    out
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

fn var_dump(value: &Value, depth: usize, out: &mut String) {
    let pad = indent(depth);
    match value {
        Value::Null => {
            let _ = writeln!(out, "{}NULL", pad);
        }
        Value::Bool(b) => {
            let _ = writeln!(out, "{}bool({})", pad, b);
        }
        Value::Int(n) => {
            let _ = writeln!(out, "{}int({})", pad, n);
        }
        Value::Float(f) => {
            let _ = writeln!(out, "{}float({})", pad, format_float(*f));
        }
        Value::Str(s) => {
            let _ = writeln!(out, "{}string({}) \"{}\"", pad, s.len(), s);
        }
        Value::Array(array) => {
            let _ = writeln!(out, "{}array({}) {{", pad, array.len());
            dump_entries(array, depth, out);
            let _ = writeln!(out, "{}}}", pad);
        }
        Value::Object(obj) => {
            let entries = obj.items().unwrap_or(&obj.props);
            let _ = writeln!(
                out,
                "{}object({})#1 ({}) {{",
                pad,
                obj.class.trim_start_matches('\\'),
                entries.len()
            );
            dump_entries(entries, depth, out);
            let _ = writeln!(out, "{}}}", pad);
        }
    }
}

fn dump_entries(array: &Array, depth: usize, out: &mut String) {
    let pad = indent(depth + 1);
    for (k, v) in array.iter() {
        match k {
            Key::Int(n) => {
                let _ = writeln!(out, "{}[{}]=>", pad, n);
            }
            Key::Str(s) => {
                let _ = writeln!(out, "{}[\"{}\"]=>", pad, s);
            }
        }
        var_dump(v, depth + 1, out);
    }
}

/// Compact dump in the style of the framework's `dump()` helper.
fn dump(value: &Value, depth: usize, out: &mut String) {
    match value {
        Value::Str(s) => {
            let _ = write!(out, "\"{}\"", s);
        }
        Value::Array(array) => {
            let _ = write!(out, "array:{} [", array.len());
            dump_members(array, depth, out, |k| match k {
                Key::Int(n) => n.to_string(),
                Key::Str(s) => format!("\"{}\"", s),
            });
            out.push(']');
        }
        Value::Object(obj) => {
            let _ = write!(out, "{} {{", obj.class.trim_start_matches('\\'));
            match &obj.kind {
                ObjectKind::Collection { items } => {
                    dump_members(items, depth, out, |k| k.to_string());
                }
                _ => dump_members(&obj.props, depth, out, |k| format!("+\"{}\"", k)),
            }
            out.push('}');
        }
        other => out.push_str(&other.display()),
    }
}

fn dump_members(array: &Array, depth: usize, out: &mut String, key: impl Fn(&Key) -> String) {
    if array.is_empty() {
        return;
    }
    out.push('\n');
    for (k, v) in array.iter() {
        let _ = write!(out, "{}{} => ", indent(depth + 1), key(k));
        dump(v, depth + 1, out);
        out.push('\n');
    }
    out.push_str(&indent(depth));
}

/// Call a method on a value.
pub(crate) fn call_method(
    _interp: &mut Interp<'_>,
    target: Value,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    let Value::Object(obj) = target else {
        return Err(ScriptError::error(format!(
            "Call to a member function {}() on {}",
            name,
            short_type(&target)
        )));
    };
    let method = name.to_ascii_lowercase();
    let undefined = || {
        ScriptError::error(format!(
            "Call to undefined method {}::{}()",
            obj.class.trim_start_matches('\\'),
            name
        ))
    };

    if let ObjectKind::Collection { items } = &obj.kind {
        return match method.as_str() {
            "count" => Ok(Value::Int(items.len() as i64)),
            "first" => Ok(items.first().cloned().unwrap_or_default()),
            "last" => Ok(items.last().cloned().unwrap_or_default()),
            "all" => Ok(Value::Array(items.clone())),
            "toarray" => Ok(Value::Array(
                items.iter().map(|(k, v)| (k.clone(), to_array(v))).collect(),
            )),
            "tojson" => serde_json::to_string(&obj_json(&obj))
                .map(Value::Str)
                .map_err(|e| ScriptError::error(e.to_string())),
            "keys" => Ok(Value::Object(Object::collection(Array::from_list(
                items.keys().map(Key::to_value),
            )))),
            "pluck" => {
                let field = string_arg(&args, 0, "pluck")?;
                let plucked = items.values().map(|item| field_of(item, &field));
                Ok(Value::Object(Object::collection(Array::from_list(plucked))))
            }
            "sum" => Ok(match args.first() {
                Some(field) => {
                    let field = field.to_php_string()?;
                    let values: Vec<Value> =
                        items.values().map(|item| field_of(item, &field)).collect();
                    sum(values.iter())
                }
                None => sum(items.values()),
            }),
            "isempty" => Ok(Value::Bool(items.is_empty())),
            "isnotempty" => Ok(Value::Bool(!items.is_empty())),
            _ => Err(undefined()),
        };
    }

    match method.as_str() {
        "__tostring" | "tostring" if obj.text.is_some() => {
            Ok(Value::Str(obj.text.clone().unwrap_or_default()))
        }
        "format" | "todatestring" | "todatetimestring" if obj.class == CARBON_CLASS => {
            let secs = match obj.props.get(&Key::Str("timestamp".into())) {
                Some(v) => intval(v),
                None => 0,
            };
            let at = timestamp(secs)?;
            let format = match method.as_str() {
                "format" => string_arg(&args, 0, "format")?,
                "todatestring" => "Y-m-d".to_string(),
                _ => "Y-m-d H:i:s".to_string(),
            };
            Ok(Value::Str(format_date(&format, &at)))
        }
        "getkey" => match &obj.kind {
            ObjectKind::Model { key } => Ok(key
                .as_deref()
                .map(|k| Key::from_text(k).to_value())
                .unwrap_or_default()),
            _ => Err(undefined()),
        },
        "getattribute" => {
            let field = string_arg(&args, 0, "getAttribute")?;
            Ok(obj
                .props
                .get(&Key::Str(field))
                .cloned()
                .unwrap_or_default())
        }
        "toarray" => Ok(to_array(&Value::Object(obj.clone()))),
        "tojson" => serde_json::to_string(&obj_json(&obj))
            .map(Value::Str)
            .map_err(|e| ScriptError::error(e.to_string())),
        _ => Err(undefined()),
    }
}

fn obj_json(obj: &Object) -> serde_json::Value {
    Value::Object(obj.clone()).to_json()
}

fn to_array(value: &Value) -> Value {
    match value {
        Value::Object(obj) => match &obj.kind {
            ObjectKind::Collection { items } => Value::Array(
                items.iter().map(|(k, v)| (k.clone(), to_array(v))).collect(),
            ),
            _ if obj.text.is_some() => value.clone(),
            _ => Value::Array(
                obj.props
                    .iter()
                    .map(|(k, v)| (k.clone(), to_array(v)))
                    .collect(),
            ),
        },
        Value::Array(array) => Value::Array(
            array.iter().map(|(k, v)| (k.clone(), to_array(v))).collect(),
        ),
        other => other.clone(),
    }
}

fn field_of(item: &Value, field: &str) -> Value {
    let key = Key::from_text(field);
    match item {
        Value::Array(array) => array.get(&key).cloned().unwrap_or_default(),
        Value::Object(obj) => obj.props.get(&key).cloned().unwrap_or_default(),
        _ => Value::Null,
    }
}

//! Runtime values.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ScriptError;

/// Strings longer than this are cut in display strings.
const DISPLAY_MAX_CHARS: usize = 50;
const DISPLAY_KEEP_CHARS: usize = 47;

/// A value produced or consumed by a script.
///
/// Serialized with serde as the opaque payload of a stored variable, so a
/// value written in one call can be rebuilt exactly in the next.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// `null`
    #[default]
    Null,
    /// `true` or `false`
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// Double precision float.
    Float(f64),
    /// Byte string, kept as UTF-8.
    Str(String),
    /// Ordered map with integer and string keys.
    Array(Array),
    /// Object supplied by the host or built by the script.
    Object(Object),
}

/// Array key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// Integer key.
    Int(i64),
    /// String key.
    Str(String),
}

impl Key {
    /// Build a key from text, turning canonical decimal integers into
    /// integer keys the way array literals do.
    pub fn from_text(text: &str) -> Self {
        match text.parse::<i64>() {
            Ok(n) if n.to_string() == text => Key::Int(n),
            _ => Key::Str(text.to_string()),
        }
    }

    /// The key as a value.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Int(n) => Value::Int(*n),
            Key::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{}", n),
            Key::Str(s) => f.write_str(s),
        }
    }
}

/// Insertion-ordered array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Array {
    entries: Vec<(Key, Value)>,
    next_index: i64,
}

impl Array {
    /// Create an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a list with keys `0..n`.
    pub fn from_list(values: impl IntoIterator<Item = Value>) -> Self {
        let mut array = Self::new();
        for value in values {
            array.push(value);
        }
        array
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the array has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `key`.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up `key` mutably.
    pub fn get_mut(&mut self, key: &Key) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Insert or replace `key`, keeping the position of an existing entry.
    pub fn insert(&mut self, key: Key, value: Value) {
        if let Key::Int(n) = key
            && n >= self.next_index
        {
            self.next_index = n.saturating_add(1);
        }
        match self.get_mut(&key) {
            Some(slot) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Append with the next integer key.
    pub fn push(&mut self, value: Value) {
        let key = Key::Int(self.next_index);
        self.insert(key, value);
    }

    /// Slot for `key`, inserted as `Null` when missing.
    pub fn entry(&mut self, key: Key) -> &mut Value {
        let index = match self.entries.iter().position(|(k, _)| *k == key) {
            Some(index) => index,
            None => {
                self.insert(key, Value::Null);
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].1
    }

    /// Slot for a newly appended `Null` entry.
    pub fn push_entry(&mut self) -> &mut Value {
        self.push(Value::Null);
        let last = self.entries.len() - 1;
        &mut self.entries[last].1
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &Key) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Iterate over entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Iterate over keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Iterate over values in order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// First value, if any.
    pub fn first(&self) -> Option<&Value> {
        self.entries.first().map(|(_, v)| v)
    }

    /// Last value, if any.
    pub fn last(&self) -> Option<&Value> {
        self.entries.last().map(|(_, v)| v)
    }

    /// Whether keys are exactly `0..len` in order.
    pub fn is_list(&self) -> bool {
        self.entries
            .iter()
            .enumerate()
            .all(|(i, (k, _))| *k == Key::Int(i as i64))
    }
}

impl FromIterator<(Key, Value)> for Array {
    fn from_iter<I: IntoIterator<Item = (Key, Value)>>(iter: I) -> Self {
        let mut array = Array::new();
        for (k, v) in iter {
            array.insert(k, v);
        }
        array
    }
}

/// What kind of host object an [`Object`] stands for.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectKind {
    /// Plain object.
    #[default]
    Plain,
    /// Persisted entity identified by a primary key.
    Model {
        /// Primary key, if the entity has one yet.
        key: Option<String>,
    },
    /// Collection of items.
    Collection {
        /// Items in the collection.
        items: Array,
    },
}

/// An object value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Object {
    /// Fully qualified class name.
    pub class: String,
    /// Model, collection or plain.
    pub kind: ObjectKind,
    /// Public properties.
    pub props: Array,
    /// Natural string form, when the object has one.
    pub text: Option<String>,
}

/// Class used for collections built by scripts.
pub const COLLECTION_CLASS: &str = r"Illuminate\Support\Collection";

impl Object {
    /// A plain object of `class`.
    pub fn plain(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            ..Self::default()
        }
    }

    /// A model with an optional primary key and attributes.
    pub fn model(class: impl Into<String>, key: Option<String>, props: Array) -> Self {
        Self {
            class: class.into(),
            kind: ObjectKind::Model { key },
            props,
            text: None,
        }
    }

    /// A collection of `items`.
    pub fn collection(items: Array) -> Self {
        Self {
            class: COLLECTION_CLASS.to_string(),
            kind: ObjectKind::Collection { items },
            props: Array::new(),
            text: None,
        }
    }

    /// An object whose string form is `text`.
    pub fn stringable(class: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Class name without its namespace.
    pub fn basename(&self) -> &str {
        class_basename(&self.class)
    }

    /// Collection items, if this is a collection.
    pub fn items(&self) -> Option<&Array> {
        match &self.kind {
            ObjectKind::Collection { items } => Some(items),
            _ => None,
        }
    }
}

/// Class name without its namespace.
pub fn class_basename(class: &str) -> &str {
    class.rsplit('\\').next().unwrap_or(class)
}

/// A numeric operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
}

impl Number {
    /// The number as a float.
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }

    /// The number as a value.
    pub fn to_value(self) -> Value {
        match self {
            Number::Int(n) => Value::Int(n),
            Number::Float(f) => Value::Float(f),
        }
    }
}

/// Parse a numeric string, allowing surrounding whitespace.
pub fn parse_numeric(s: &str) -> Option<Number> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<i64>() {
        return Some(Number::Int(n));
    }
    // Rust also accepts "inf" and "nan", which are not numeric here.
    let plausible = s.chars().any(|c| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_digit() || "+-.eE".contains(c));
    if plausible {
        s.parse::<f64>().ok().map(Number::Float)
    } else {
        None
    }
}

/// Format a float the way the scripting language prints it.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NAN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    let abs = f.abs();
    if abs >= 1e15 || (abs != 0.0 && abs < 1e-4) {
        let formatted = format!("{:E}", f);
        let (mantissa, exponent) = formatted.split_once('E').unwrap_or((&formatted, "0"));
        let mantissa = if mantissa.contains('.') {
            mantissa.to_string()
        } else {
            format!("{}.0", mantissa)
        };
        let exponent = if exponent.starts_with('-') {
            exponent.to_string()
        } else {
            format!("+{}", exponent)
        };
        return format!("{}E{}", mantissa, exponent);
    }
    if f == f.trunc() {
        return format!("{}", f as i64);
    }
    format!("{}", f)
}

impl Value {
    /// Build a string value.
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// Build a list value.
    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Array::from_list(values))
    }

    /// Levels of array and object nesting: 0 for scalars, `[]` is 1.
    pub fn depth(&self) -> usize {
        let children: Box<dyn Iterator<Item = &Value> + '_> = match self {
            Value::Array(a) => Box::new(a.values()),
            Value::Object(obj) => Box::new(
                obj.props
                    .values()
                    .chain(obj.items().into_iter().flat_map(Array::values)),
            ),
            _ => return 0,
        };
        1 + children.map(Value::depth).max().unwrap_or(0)
    }

    /// Type tag as reported by `gettype()`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "double",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Short display string used when listing stored variables.
    pub fn display(&self) -> String {
        match self {
            Value::Object(obj) => match &obj.kind {
                ObjectKind::Model { key } => {
                    format!("{} #{}", obj.basename(), key.as_deref().unwrap_or("?"))
                }
                ObjectKind::Collection { items } => format!("Collection ({} items)", items.len()),
                ObjectKind::Plain => obj.basename().to_string(),
            },
            Value::Array(a) => format!("Array ({} items)", a.len()),
            Value::Str(s) => {
                if s.chars().count() > DISPLAY_MAX_CHARS {
                    let kept: String = s.chars().take(DISPLAY_KEEP_CHARS).collect();
                    format!("\"{}...\"", kept)
                } else {
                    format!("\"{}\"", s)
                }
            }
            Value::Bool(b) => b.to_string(),
            Value::Null => "null".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
        }
    }

    /// Truthiness in conditions.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty() && s != "0",
            Value::Array(a) => !a.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// Convert to a string as concatenation and `echo` do.
    pub fn to_php_string(&self) -> Result<String, ScriptError> {
        Ok(match self {
            Value::Null => String::new(),
            Value::Bool(true) => "1".to_string(),
            Value::Bool(false) => String::new(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => s.clone(),
            Value::Array(_) => "Array".to_string(),
            Value::Object(obj) => match &obj.text {
                Some(text) => text.clone(),
                None => {
                    return Err(ScriptError::error(format!(
                        "Object of class {} could not be converted to string",
                        obj.class
                    )));
                }
            },
        })
    }

    /// Numeric view of ints, floats and numeric strings.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Int(n) => Some(Number::Int(*n)),
            Value::Float(f) => Some(Number::Float(*f)),
            Value::Str(s) => parse_numeric(s),
            _ => None,
        }
    }

    /// Convert to JSON, as `json_encode()` does.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(n) => Json::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s.clone()),
            Value::Array(a) => array_to_json(a),
            Value::Object(obj) => match (&obj.text, &obj.kind) {
                (Some(text), _) => Json::String(text.clone()),
                (None, ObjectKind::Collection { items }) => array_to_json(items),
                (None, _) => {
                    let map = obj
                        .props
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_json()))
                        .collect();
                    Json::Object(map)
                }
            },
        }
    }

    /// Convert from JSON. Objects become string-keyed arrays.
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(0.0)),
            },
            Json::String(s) => Value::Str(s.clone()),
            Json::Array(items) => Value::list(items.iter().map(Value::from_json)),
            Json::Object(map) => Value::Array(
                map.iter()
                    .map(|(k, v)| (Key::from_text(k), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Strict identity (`===`).
    pub fn strict_eq(&self, other: &Value) -> bool {
        self == other
    }

    /// Loose equality (`==`).
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.loose_eq(w)))
            }
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Object(obj), Value::Str(s)) | (Value::Str(s), Value::Object(obj)) => {
                obj.text.as_deref() == Some(s.as_str())
            }
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }

    /// Three-way comparison for `<`, `>` and friends.
    ///
    /// Returns `None` for values that do not compare.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => match (parse_numeric(a), parse_numeric(b)) {
                (Some(x), Some(y)) => compare_numbers(x, y),
                _ => Some(a.cmp(b)),
            },
            (Value::Null, Value::Str(s)) => Some("".cmp(s.as_str())),
            (Value::Str(s), Value::Null) => Some(s.as_str().cmp("")),
            (Value::Bool(_), _) | (_, Value::Bool(_)) | (Value::Null, _) | (_, Value::Null) => {
                Some(self.is_truthy().cmp(&other.is_truthy()))
            }
            (Value::Array(a), Value::Array(b)) => match a.len().cmp(&b.len()) {
                Ordering::Equal if self.loose_eq(other) => Some(Ordering::Equal),
                Ordering::Equal => None,
                ord => Some(ord),
            },
            (Value::Str(s), Value::Int(_) | Value::Float(_)) => {
                let number = other.as_number()?;
                match parse_numeric(s) {
                    Some(x) => compare_numbers(x, number),
                    // A non-numeric string compares with the number's text.
                    None => {
                        let text = number.to_value().to_php_string().ok()?;
                        Some(s.as_str().cmp(text.as_str()))
                    }
                }
            }
            (Value::Int(_) | Value::Float(_), Value::Str(_)) => {
                other.compare(self).map(Ordering::reverse)
            }
            _ => match (self.as_number(), other.as_number()) {
                (Some(x), Some(y)) => compare_numbers(x, y),
                _ => None,
            },
        }
    }
}

fn compare_numbers(a: Number, b: Number) -> Option<Ordering> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => Some(x.cmp(&y)),
        _ => a.as_f64().partial_cmp(&b.as_f64()),
    }
}

fn array_to_json(array: &Array) -> serde_json::Value {
    if array.is_list() {
        serde_json::Value::Array(array.values().map(Value::to_json).collect())
    } else {
        serde_json::Value::Object(
            array
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_json()))
                .collect(),
        )
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Int(1).type_name(), "integer");
        assert_eq!(Value::Float(1.5).type_name(), "double");
        assert_eq!(Value::Null.type_name(), "NULL");
        assert_eq!(Value::list([]).type_name(), "array");
        assert_eq!(Value::Object(Object::plain("Foo")).type_name(), "object");
    }

    #[test]
    fn test_display_strings() {
        assert_eq!(Value::str("short").display(), "\"short\"");
        let long = "x".repeat(60);
        assert_eq!(Value::str(long).display(), format!("\"{}...\"", "x".repeat(47)));
        assert_eq!(Value::str("y".repeat(50)).display(), format!("\"{}\"", "y".repeat(50)));
        assert_eq!(Value::Bool(false).display(), "false");
        assert_eq!(Value::Null.display(), "null");
        assert_eq!(Value::list([Value::Int(1), Value::Int(2)]).display(), "Array (2 items)");

        let user = Object::model(r"App\Models\User", Some("7".into()), Array::new());
        assert_eq!(Value::Object(user).display(), "User #7");
        let unsaved = Object::model(r"App\Models\User", None, Array::new());
        assert_eq!(Value::Object(unsaved).display(), "User #?");
        let items = Array::from_list([Value::Int(1)]);
        assert_eq!(Value::Object(Object::collection(items)).display(), "Collection (1 items)");
        assert_eq!(Value::Object(Object::plain(r"App\Thing")).display(), "Thing");
    }

    #[test]
    fn test_depth() {
        assert_eq!(Value::Int(1).depth(), 0);
        assert_eq!(Value::list([]).depth(), 1);
        let nested = Value::list([Value::Int(1), Value::list([Value::list([])])]);
        assert_eq!(nested.depth(), 3);
        let collection = Object::collection(Array::from_list([nested]));
        assert_eq!(Value::Object(collection).depth(), 4);
    }

    #[test]
    fn test_array_keys_follow_insertion() {
        let mut array = Array::new();
        array.push(Value::Int(10));
        array.insert(Key::Int(5), Value::Int(20));
        array.push(Value::Int(30));
        array.insert(Key::Str("a".into()), Value::Int(40));
        array.insert(Key::Int(0), Value::Int(11));

        let keys: Vec<String> = array.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["0", "5", "6", "a"]);
        assert_eq!(array.get(&Key::Int(0)), Some(&Value::Int(11)));
        assert!(!array.is_list());
    }

    #[test]
    fn test_key_from_text() {
        assert_eq!(Key::from_text("12"), Key::Int(12));
        assert_eq!(Key::from_text("012"), Key::Str("012".into()));
        assert_eq!(Key::from_text("name"), Key::Str("name".into()));
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(1.0), "1");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(1.5e20), "1.5E+20");
        assert_eq!(format_float(1e-5), "1.0E-5");
        assert_eq!(format_float(f64::INFINITY), "INF");
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert!(Value::Int(5).loose_eq(&Value::str("5")));
        assert!(Value::Null.loose_eq(&Value::Bool(false)));
        assert!(Value::Null.loose_eq(&Value::str("")));
        assert!(!Value::Int(0).loose_eq(&Value::str("a")));
        assert!(!Value::Int(1).strict_eq(&Value::Float(1.0)));
        assert!(Value::list([Value::Int(1)]).loose_eq(&Value::list([Value::str("1")])));
    }

    #[test]
    fn test_compare() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Value::str("10").compare(&Value::str("9")), Some(Ordering::Greater));
        assert_eq!(Value::str("b").compare(&Value::str("a")), Some(Ordering::Greater));
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"name": "app", "list": [1, 2.5, null], "1": true});
        let value = Value::from_json(&json);
        let Value::Array(array) = &value else {
            panic!("expected array");
        };
        assert_eq!(array.get(&Key::Int(1)), Some(&Value::Bool(true)));
        assert_eq!(value.to_json()["list"], serde_json::json!([1, 2.5, null]));
    }

    #[test]
    fn test_serde_payload_round_trip() {
        let mut props = Array::new();
        props.insert(Key::Str("email".into()), Value::str("a@b.c"));
        let value = Value::list([
            Value::Int(1),
            Value::Object(Object::model(r"App\Models\User", Some("1".into()), props)),
        ]);

        let payload = serde_json::to_value(&value).unwrap();
        let back: Value = serde_json::from_value(payload).unwrap();
        assert_eq!(back, value);
    }
}

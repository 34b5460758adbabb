//! Rendering of evaluation results.
//!
//! The result line is independent of the store's display strings: strings
//! are never truncated here, and small arrays are shown in full.

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::script::{Array, Key, ObjectKind, Value, format_float};

/// Arrays with at most this many items are rendered in full.
pub const FULL_ARRAY_ITEMS: usize = 5;

/// Items shown before the "more" line of a large array.
pub const PREVIEW_ITEMS: usize = 3;

/// Render a returned value. The result may span several lines.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => format_float(*f),
        Value::Str(s) => format!("\"{}\"", s),
        Value::Array(array) if array.len() <= FULL_ARRAY_ITEMS => pretty_json(value),
        Value::Array(array) => preview(array),
        Value::Object(obj) => match (&obj.text, &obj.kind) {
            (Some(text), _) => format!("\"{}\"", text),
            (None, ObjectKind::Collection { items }) => {
                format!("{} ({} items)", obj.basename(), items.len())
            }
            (None, _) => value.display(),
        },
    }
}

/// JSON with four-space indentation.
fn pretty_json(value: &Value) -> String {
    let json = value.to_json();
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    match json.serialize(&mut ser) {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => json.to_string(),
    }
}

fn preview(array: &Array) -> String {
    let mut lines = vec![format!("Array ({} items) [", array.len())];
    for (key, item) in array.iter().take(PREVIEW_ITEMS) {
        let key = match key {
            Key::Int(n) => n.to_string(),
            Key::Str(s) => serde_json::Value::String(s.clone()).to_string(),
        };
        let item = match item {
            Value::Str(s) => format!("\"{}\"", s),
            other => other.to_json().to_string(),
        };
        lines.push(format!("  {} => {}", key, item));
    }
    lines.push(format!("  ...and {} more", array.len() - PREVIEW_ITEMS));
    lines.push("]".to_string());
    lines.join("\n")
}

//! The bundled restricted scripting backend.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::io;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::interp::Interp;
use super::parser;
use super::value::Value;
use super::{ScriptBackend, ScriptError, ScriptOutput, ScriptRequest};
use crate::session::{Clock, SystemClock};

/// Host function callable as `Class::method(...)` from scripts.
pub type StaticFn = Arc<dyn Fn(&[Value]) -> Result<Value, ScriptError> + Send + Sync>;

/// Loop iterations allowed per evaluation by default.
pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;

/// Restricted evaluator for a PHP-flavoured expression language.
///
/// Scripts cannot touch the filesystem, network or processes. The host
/// extends what they can reach by registering static functions, which is how
/// entity lookups such as `User::count()` are wired in.
///
/// ```
/// use webterm::script::{Sandbox, ScriptBackend, ScriptRequest, Value};
///
/// let mut sandbox = Sandbox::new();
/// sandbox.register_static(r"App\Models\User", "count", |_| Ok(Value::Int(3)));
///
/// let mut out = Vec::new();
/// let request = ScriptRequest::new(r"return \App\Models\User::count() * 2;");
/// let output = sandbox.evaluate(&request, &mut out).unwrap();
/// assert_eq!(output.value, Value::Int(6));
/// ```
pub struct Sandbox {
    config: BTreeMap<String, serde_json::Value>,
    statics: HashMap<String, StaticFn>,
    classes: HashSet<String>,
    clock: Arc<dyn Clock>,
    max_steps: u64,
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("config_keys", &self.config.keys().collect::<Vec<_>>())
            .field("classes", &self.classes)
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_class(class: &str) -> String {
    class.trim_start_matches('\\').to_ascii_lowercase()
}

impl Sandbox {
    /// Create a sandbox with no host functions.
    pub fn new() -> Self {
        Self {
            config: BTreeMap::new(),
            statics: HashMap::new(),
            classes: HashSet::new(),
            clock: Arc::new(SystemClock),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Values returned by the `config()` builtin.
    pub fn with_config(mut self, values: BTreeMap<String, serde_json::Value>) -> Self {
        self.config = values;
        self
    }

    /// Clock used by `date()` and `now()`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Cap on loop iterations per evaluation.
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Register `Class::method`. Class names match without a leading
    /// backslash and case-insensitively.
    ///
    /// Registering `__construct` makes `new Class(...)` available.
    pub fn register_static<F>(&mut self, class: &str, method: &str, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, ScriptError> + Send + Sync + 'static,
    {
        let class = normalize_class(class);
        let key = format!("{}::{}", class, method.to_ascii_lowercase());
        self.classes.insert(class);
        self.statics.insert(key, Arc::new(f));
    }

    pub(crate) fn call_static(
        &self,
        class: &str,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ScriptError> {
        let normalized = normalize_class(class);
        let key = format!("{}::{}", normalized, method.to_ascii_lowercase());
        if let Some(f) = self.statics.get(&key) {
            return f(args);
        }
        let display = class.trim_start_matches('\\');
        if self.classes.contains(&normalized) {
            Err(ScriptError::error(format!(
                "Call to undefined method {}::{}()",
                display, method
            )))
        } else {
            Err(ScriptError::error(format!("Class \"{}\" not found", display)))
        }
    }

    /// Look up a dotted configuration key.
    pub(crate) fn config_value(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.config.get(key) {
            return Some(Value::from_json(value));
        }
        let mut segments = key.split('.');
        let mut current = self.config.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                serde_json::Value::Object(map) => map.get(segment)?,
                serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(Value::from_json(current))
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn max_steps(&self) -> u64 {
        self.max_steps
    }
}

impl ScriptBackend for Sandbox {
    fn evaluate(
        &self,
        request: &ScriptRequest,
        out: &mut dyn io::Write,
    ) -> Result<ScriptOutput, ScriptError> {
        let program = parser::parse(&request.source)?;

        let mut interp = Interp::new(self, out);
        for binding in &request.bindings {
            match serde_json::from_value::<Value>(binding.payload.clone()) {
                Ok(value) => interp.set_var(binding.name.clone(), value),
                Err(e) => warn!(name = %binding.name, error = %e, "skipping undecodable binding"),
            }
        }

        let value = interp.run(&program)?;
        let bindings = request.capture.then(|| interp.into_vars());
        Ok(ScriptOutput { value, bindings })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::script::{Binding, Key, Object};
    use chrono::TimeZone;

    use crate::session::ManualClock;

    fn run(sandbox: &Sandbox, source: &str) -> (Result<ScriptOutput, ScriptError>, String) {
        let mut out = Vec::new();
        let result = sandbox.evaluate(&ScriptRequest::new(source), &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    fn value(source: &str) -> Value {
        run(&Sandbox::new(), source).0.unwrap().value
    }

    fn error(source: &str) -> ScriptError {
        run(&Sandbox::new(), source).0.unwrap_err()
    }

    #[test]
    fn test_expressions() {
        assert_eq!(value("return 1 + 2 * 3;"), Value::Int(7));
        assert_eq!(value("return 'a' . 'b' . 1;"), Value::str("ab1"));
        assert_eq!(value("return 10 / 4;"), Value::Float(2.5));
        assert_eq!(value("return null ?? 'x';"), Value::str("x"));
        assert_eq!(value("return 0 ?: 5;"), Value::Int(5));
        assert_eq!(value("return 1 < 2 && !false;"), Value::Bool(true));
        assert_eq!(value("return PHP_EOL;"), Value::str("\n"));
    }

    #[test]
    fn test_statements_without_return_yield_null() {
        assert_eq!(value("$x = 1;"), Value::Null);
    }

    #[test]
    fn test_echo_goes_to_sink() {
        let (result, out) = run(&Sandbox::new(), "$n = 'World'; echo \"Hello $n\", '!'; print 'x';");
        assert_eq!(result.unwrap().value, Value::Null);
        assert_eq!(out, "Hello World!x");
    }

    #[test]
    fn test_control_flow() {
        let source = "
            $total = 0;
            foreach ([1, 2, 3, 4] as $i => $n) {
                if ($n % 2 == 0) { continue; }
                $total += $n;
            }
            $j = 0;
            while (true) { $j++; if ($j >= 5) break; }
            for ($k = 0; $k < 3; $k++) { $total += 10; }
            return [$total, $j];
        ";
        assert_eq!(value(source), Value::list([Value::Int(34), Value::Int(5)]));
    }

    #[test]
    fn test_value_nesting_is_capped() {
        let err = error("$a = []; for ($i = 0; $i < 200000; $i++) { $a = [$a]; }");
        assert_eq!(err.category, "Error");
        assert_eq!(err.message, "Maximum nesting depth exceeded");

        let deep_index = format!("$a{} = 1;", "['k']".repeat(30));
        assert_eq!(error(&deep_index).message, "Maximum nesting depth exceeded");

        let err = error("$a = [[[1]]]; for ($i = 0; $i < 30; $i++) { $b[] = $a; $a = $b; $b = []; }");
        assert_eq!(err.message, "Maximum nesting depth exceeded");
    }

    #[test]
    fn test_deepest_allowed_value_survives_storage() {
        let deepest = value("$a = []; for ($i = 1; $i < 20; $i++) { $a = [$a]; } return $a;");
        assert_eq!(deepest.depth(), 20);

        let bytes = serde_json::to_vec(&deepest).unwrap();
        let restored: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored, deepest);
    }

    #[test]
    fn test_nested_array_assignment() {
        let source = "$a['x']['y'] = 1; $a['x'][] = 2; $a['list'][] = 'v'; return $a;";
        let result = value(source);
        assert_eq!(
            result.to_json(),
            serde_json::json!({"x": {"y": 1, "0": 2}, "list": ["v"]})
        );
    }

    #[test]
    fn test_error_categories() {
        let err = error("return $missing;");
        assert_eq!(err.category, "ErrorException");
        assert_eq!(err.message, "Undefined variable $missing");

        assert_eq!(error("return 1 / 0;").category, "DivisionByZeroError");
        assert_eq!(error("return nope();").message, "Call to undefined function nope()");
        assert_eq!(error("return 1 +;").category, "ParseError");
        assert_eq!(error("return [1]['k'];").message, "Undefined array key \"k\"");
        assert_eq!(
            error("return Foo::bar();").message,
            "Class \"Foo\" not found"
        );
    }

    #[test]
    fn test_throw_uses_class_as_category() {
        let err = error(r#"throw new \RuntimeException("boom");"#);
        assert_eq!(err.category, "RuntimeException");
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn test_isset_and_empty_are_quiet() {
        assert_eq!(value("return isset($nope);"), Value::Bool(false));
        assert_eq!(value("$a = ['k' => 0]; return [isset($a['k']), empty($a['k']), empty($a['z'])];"),
            Value::list([Value::Bool(true), Value::Bool(true), Value::Bool(true)]));
    }

    #[test]
    fn test_step_budget() {
        let sandbox = Sandbox::new().with_max_steps(100);
        let err = run(&sandbox, "while (true) {}").0.unwrap_err();
        assert!(err.message.contains("Maximum execution steps"));
    }

    #[test]
    fn test_registered_statics() {
        let mut sandbox = Sandbox::new();
        sandbox.register_static(r"\App\Models\User", "find", |args| {
            let key = args.first().cloned().unwrap_or_default();
            let mut props = crate::script::Array::new();
            props.insert(Key::Str("id".into()), key.clone());
            Ok(Value::Object(Object::model(
                r"App\Models\User",
                Some(key.to_php_string()?),
                props,
            )))
        });

        let (result, _) = run(&sandbox, r"return \App\Models\User::find(4)->id;");
        assert_eq!(result.unwrap().value, Value::Int(4));

        let (result, _) = run(&sandbox, r"return App\Models\user::missing();");
        assert_eq!(
            result.unwrap_err().message,
            r"Call to undefined method App\Models\user::missing()"
        );
    }

    #[test]
    fn test_bindings_restore_and_capture() {
        let sandbox = Sandbox::new();
        let request = ScriptRequest::new("$y = $x + 1;")
            .with_bindings(vec![Binding {
                name: "x".into(),
                payload: serde_json::to_value(Value::Int(41)).unwrap(),
            }])
            .capture(true);
        let mut out = Vec::new();
        let output = sandbox.evaluate(&request, &mut out).unwrap();
        let bindings = output.bindings.unwrap();

        assert_eq!(bindings.get("x"), Some(&Value::Int(41)));
        assert_eq!(bindings.get("y"), Some(&Value::Int(42)));
    }

    #[test]
    fn test_undecodable_binding_is_skipped() {
        let request = ScriptRequest::new("return isset($bad);").with_bindings(vec![Binding {
            name: "bad".into(),
            payload: serde_json::json!({"not": "a value"}),
        }]);
        let mut out = Vec::new();
        let output = Sandbox::new().evaluate(&request, &mut out).unwrap();
        assert_eq!(output.value, Value::Bool(false));
    }

    #[test]
    fn test_config_lookup() {
        let mut values = BTreeMap::new();
        values.insert("app".to_string(), serde_json::json!({"name": "Demo", "debug": true}));
        let sandbox = Sandbox::new().with_config(values);

        assert_eq!(sandbox.config_value("app.name"), Some(Value::str("Demo")));
        assert_eq!(sandbox.config_value("app.missing"), None);
        let (result, _) = run(&sandbox, r#"return config("app.debug");"#);
        assert_eq!(result.unwrap().value, Value::Bool(true));
    }

    #[test]
    fn test_clock_feeds_date() {
        let start = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        let sandbox = Sandbox::new().with_clock(Arc::new(ManualClock::new(start)));
        let (result, _) = run(&sandbox, "return date('Y-m-d H:i');");
        assert_eq!(result.unwrap().value, Value::str("2024-03-09 14:05"));
    }
}

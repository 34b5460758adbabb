//! Text repairs applied before a command is dispatched or evaluated.

use regex_lite::Regex;
use tracing::{debug, warn};

/// Strip a wrapping quote pair and unescape escaped quotes until stable.
///
/// Runs to a fixpoint so that `"'list'"` and `\"list\"` both end up as
/// `list`, and a second call never changes the result.
pub fn strip_quotes(input: &str) -> String {
    let mut current = input.trim().to_string();
    loop {
        let mut next = current.clone();
        if let Some(inner) = unwrap_quote_pair(&next) {
            next = inner.trim().to_string();
        }
        next = next.replace("\\\"", "\"").replace("\\'", "'");
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Inner text when `s` is wrapped in exactly one matching quote pair.
fn unwrap_quote_pair(s: &str) -> Option<&str> {
    let quote = s.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    if s.len() < 2 || !s.ends_with(quote) {
        return None;
    }
    let inner = &s[1..s.len() - 1];

    // `"a" "b"` starts and ends with a quote but is two quoted words.
    let mut escaped = false;
    for c in inner.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            c if c == quote && !escaped => return None,
            _ => escaped = false,
        }
    }
    Some(inner)
}

/// Qualifies bare entity names and collapses concatenated namespaces.
#[derive(Debug, Clone)]
pub struct NamespaceRepair {
    bare: Vec<(Regex, String)>,
    collapsed: Vec<(Regex, String)>,
}

impl NamespaceRepair {
    /// Build a repair for `models`, qualified with `model_namespace`.
    ///
    /// `model_namespace` is written with backslash separators, for example
    /// `\App\Models\`.
    pub fn new(models: &[&str], model_namespace: &str) -> Self {
        let bare = models
            .iter()
            .filter_map(|model| {
                let pattern = format!(r"\b{}::", regex_lite::escape(model));
                compile(&pattern).map(|re| (re, format!("{}{}::", model_namespace, model)))
            })
            .collect();

        // `AppModelsUser` -> `\App\Models\User`
        let collapsed = [
            (r"\bAppModels([A-Z][A-Za-z0-9_]*)", r"\App\Models\${1}"),
            (
                r"\bAppHttpControllers([A-Z][A-Za-z0-9_]*)",
                r"\App\Http\Controllers\${1}",
            ),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| {
            compile(pattern).map(|re| (re, replacement.to_string()))
        })
        .collect();

        Self { bare, collapsed }
    }

    /// Apply the repair.
    ///
    /// Bare names are only qualified when the text has no namespace
    /// separator anywhere; text that already names a namespace is trusted.
    pub fn apply(&self, input: &str) -> String {
        let mut out = input.to_string();

        if !out.contains('\\') {
            for (re, replacement) in &self.bare {
                if re.is_match(&out) {
                    out = re.replace_all(&out, replacement.as_str()).into_owned();
                }
            }
        }

        for (re, replacement) in &self.collapsed {
            out = re.replace_all(&out, replacement.as_str()).into_owned();
        }

        if out != input {
            debug!(before = %input, after = %out, "repaired namespaces");
        }
        out
    }
}

/// Wraps unquoted dotted or hyphenated arguments of known functions in quotes.
#[derive(Debug, Clone)]
pub struct QuoteRepair {
    patterns: Vec<(Regex, String)>,
}

impl QuoteRepair {
    /// Build a repair for the given function names.
    pub fn new(functions: &[&str]) -> Self {
        let patterns = functions
            .iter()
            .filter_map(|name| {
                let pattern = format!(
                    r"\b{}\s*\(\s*([A-Za-z0-9_.-]+)\s*\)",
                    regex_lite::escape(name)
                );
                compile(&pattern).map(|re| (re, format!("{}(\"${{1}}\")", name)))
            })
            .collect();
        Self { patterns }
    }

    /// Apply every substitution in order.
    pub fn apply(&self, input: &str) -> String {
        let mut out = input.to_string();
        for (re, replacement) in &self.patterns {
            out = re.replace_all(&out, replacement.as_str()).into_owned();
        }
        if out != input {
            debug!(before = %input, after = %out, "repaired missing quotes");
        }
        out
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern, error = %e, "skipping invalid repair pattern");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODELS: &[&str] = &["User", "Post"];
    const NAMESPACE: &str = r"\App\Models\";

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("  \"list\"  "), "list");
        assert_eq!(strip_quotes("'route:list'"), "route:list");
        assert_eq!(strip_quotes("\"'nested'\""), "nested");
        assert_eq!(strip_quotes(r#"echo \"hi\""#), r#"echo "hi""#);
    }

    #[test]
    fn test_strip_quotes_keeps_separate_quoted_words() {
        assert_eq!(strip_quotes(r#""a" "b""#), r#""a" "b""#);
    }

    #[test]
    fn test_strip_quotes_is_stable() {
        for input in [r#"\\\"x\\\""#, "\"\"", "'", "\"'a'\" ", r#""a\"b""#] {
            let once = strip_quotes(input);
            assert_eq!(strip_quotes(&once), once, "input: {input}");
        }
    }

    #[test]
    fn test_bare_model_is_qualified() {
        let repair = NamespaceRepair::new(MODELS, NAMESPACE);
        assert_eq!(repair.apply("User::count()"), r"\App\Models\User::count()");
        assert_eq!(
            repair.apply("User::count() + Post::count()"),
            r"\App\Models\User::count() + \App\Models\Post::count()"
        );
    }

    #[test]
    fn test_existing_separator_blocks_qualification() {
        let repair = NamespaceRepair::new(MODELS, NAMESPACE);
        let input = r"\Other\Thing::x() + User::count()";
        assert_eq!(repair.apply(input), input);
    }

    #[test]
    fn test_name_suffix_is_not_qualified() {
        let repair = NamespaceRepair::new(MODELS, NAMESPACE);
        assert_eq!(repair.apply("AdminUser::find(1)"), "AdminUser::find(1)");
    }

    #[test]
    fn test_collapsed_namespace() {
        let repair = NamespaceRepair::new(MODELS, NAMESPACE);
        assert_eq!(repair.apply("AppModelsInvoice::first()"), r"\App\Models\Invoice::first()");
        assert_eq!(
            repair.apply("AppHttpControllersHomeController"),
            r"\App\Http\Controllers\HomeController"
        );
    }

    #[test]
    fn test_quote_repair() {
        let repair = QuoteRepair::new(&["config", "date"]);
        assert_eq!(repair.apply("config(app.name)"), r#"config("app.name")"#);
        assert_eq!(repair.apply("date( Y-m-d )"), r#"date("Y-m-d")"#);
        assert_eq!(repair.apply(r#"config("app.name")"#), r#"config("app.name")"#);
        assert_eq!(repair.apply("config($key)"), "config($key)");
    }
}

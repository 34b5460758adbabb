//! Command normalization.
//!
//! Raw command text from a remote caller is never run as-is. [`Normalizer`]
//! repairs it in a fixed order of steps:
//!
//! 1. strip a wrapping quote pair and unescape escaped quotes
//! 2. qualify bare entity names (`User::count()` becomes
//!    `\App\Models\User::count()`)
//! 3. quote bare arguments of known helpers (`config(app.name)` becomes
//!    `config("app.name")`)
//! 4. append safety flags (`migrate` gets `--force`) and `--no-interaction`
//!
//! Normalizing is total and idempotent. Validation against a
//! [`PolicyHandler`] is a separate step so that the same normalized text can
//! be checked against different policies.
//!
//! ```
//! use webterm::normalize::Normalizer;
//!
//! let normalizer = Normalizer::default();
//! let cmd = normalizer.normalize("migrate");
//! assert_eq!(cmd.verb, "migrate");
//! assert_eq!(cmd.text, "migrate --force --no-interaction");
//! ```

mod args;
mod flags;
mod repair;

pub use args::{escape_arg, split_args};
pub use flags::{FlagRule, NO_INTERACTION, default_flag_rules};
pub use repair::{NamespaceRepair, QuoteRepair, strip_quotes};

use tracing::{debug, info};

use crate::error::Error;
use crate::policy::{PolicyDecision, PolicyHandler};

/// Entity names qualified by namespace repair.
pub const DEFAULT_MODELS: &[&str] = &[
    "User",
    "Category",
    "Product",
    "Post",
    "Order",
    "Customer",
    "Item",
    "Tag",
    "Role",
    "Permission",
];

/// Namespace prepended to bare entity names.
pub const DEFAULT_MODEL_NAMESPACE: &str = r"\App\Models\";

/// Helpers whose single bare argument gets quoted.
pub const DEFAULT_QUOTED_FUNCTIONS: &[&str] = &["date", "config", "env", "cache", "view", "route"];

/// Command run when the input is empty.
pub const DEFAULT_COMMAND: &str = "list";

/// Prefix some clients put in front of REPL code.
const COMMAND_OPTION_PREFIX: &str = "--command=";

/// A command ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCommand {
    /// Full normalized command line.
    pub text: String,
    /// Leading whitespace-delimited token.
    pub verb: String,
}

impl NormalizedCommand {
    /// Arguments after splitting with shell quoting rules.
    pub fn args(&self) -> Vec<String> {
        split_args(&self.text)
    }
}

/// Leading whitespace-delimited token of `text`.
pub fn verb_of(text: &str) -> String {
    text.split_whitespace().next().unwrap_or_default().to_string()
}

/// Repairs raw command text.
#[derive(Debug, Clone)]
pub struct Normalizer {
    namespaces: NamespaceRepair,
    quotes: QuoteRepair,
    flag_rules: Vec<FlagRule>,
    universal_flag: String,
    default_command: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_MODELS,
            DEFAULT_MODEL_NAMESPACE,
            DEFAULT_QUOTED_FUNCTIONS,
            default_flag_rules(),
        )
    }
}

impl Normalizer {
    /// Create a normalizer from explicit tables.
    pub fn new(
        models: &[&str],
        model_namespace: &str,
        quoted_functions: &[&str],
        flag_rules: Vec<FlagRule>,
    ) -> Self {
        Self {
            namespaces: NamespaceRepair::new(models, model_namespace),
            quotes: QuoteRepair::new(quoted_functions),
            flag_rules,
            universal_flag: NO_INTERACTION.to_string(),
            default_command: DEFAULT_COMMAND.to_string(),
        }
    }

    /// Normalize a console command line.
    pub fn normalize(&self, raw: &str) -> NormalizedCommand {
        let mut text = self.repair(raw);
        if text.is_empty() {
            text = self.default_command.clone();
        }

        let verb = verb_of(&text);
        for rule in &self.flag_rules {
            if rule.applies(&verb, &text) {
                text.push(' ');
                text.push_str(&rule.flag);
            }
        }
        if !text.contains(&self.universal_flag) {
            text.push(' ');
            text.push_str(&self.universal_flag);
        }

        debug!(raw, normalized = %text, "normalized command");
        NormalizedCommand { text, verb }
    }

    /// Normalize REPL code: quote, namespace and missing-quote repair only.
    ///
    /// A leading `--command=` option is unwrapped first.
    pub fn normalize_code(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        let code = trimmed
            .strip_prefix(COMMAND_OPTION_PREFIX)
            .unwrap_or(trimmed);
        self.repair(code)
    }

    fn repair(&self, raw: &str) -> String {
        let text = strip_quotes(raw);
        let text = self.namespaces.apply(&text);
        self.quotes.apply(&text)
    }

    /// Check a normalized command against `policy`.
    pub fn validate(
        &self,
        command: &NormalizedCommand,
        policy: &dyn PolicyHandler,
    ) -> Result<(), Error> {
        match policy.check_verb(&command.verb) {
            PolicyDecision::Allow => Ok(()),
            PolicyDecision::Deny(reason) => {
                info!(verb = %command.verb, %reason, "command denied");
                Err(Error::CommandDenied {
                    verb: command.verb.clone(),
                    reason,
                })
            }
        }
    }

    /// Normalize then validate.
    pub fn prepare(&self, raw: &str, policy: &dyn PolicyHandler) -> Result<NormalizedCommand, Error> {
        let command = self.normalize(raw);
        self.validate(&command, policy)?;
        Ok(command)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::policy::{AllowAllPolicy, console_policy};

    #[test]
    fn test_empty_input_becomes_default() {
        let normalizer = Normalizer::default();
        for raw in ["", "   ", "\"\"", "''"] {
            let cmd = normalizer.normalize(raw);
            assert_eq!(cmd.text, "list --no-interaction");
            assert_eq!(cmd.verb, "list");
        }
    }

    #[test]
    fn test_safety_flags() {
        let normalizer = Normalizer::default();

        let migrate = normalizer.normalize("migrate");
        assert!(migrate.text.contains("--force"));
        assert!(migrate.text.contains("--no-interaction"));

        let status = normalizer.normalize("migrate:status");
        assert!(!status.text.contains("--force"));
        assert_eq!(status.text, "migrate:status --no-interaction");

        assert_eq!(
            normalizer.normalize("db:seed").text,
            "db:seed --force --no-interaction"
        );
        assert_eq!(
            normalizer.normalize("vendor:publish --tag=config").text,
            "vendor:publish --tag=config --no-interaction"
        );
        assert_eq!(
            normalizer.normalize("vendor:publish").text,
            "vendor:publish --all --no-interaction"
        );
    }

    #[test]
    fn test_existing_flags_not_duplicated() {
        let normalizer = Normalizer::default();
        let cmd = normalizer.normalize("migrate --force --no-interaction");
        assert_eq!(cmd.text, "migrate --force --no-interaction");
    }

    #[test]
    fn test_arguments_keep_order_and_spacing() {
        let normalizer = Normalizer::default();
        let cmd = normalizer.normalize("make:model  Post   -m");
        assert_eq!(cmd.text, "make:model  Post   -m --no-interaction");
        assert_eq!(cmd.args(), vec!["make:model", "Post", "-m", "--no-interaction"]);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let normalizer = Normalizer::default();
        let inputs = [
            "",
            "list",
            "\"migrate\"",
            "'migrate:status'",
            r#"\"db:seed\""#,
            "vendor:publish",
            "User::count()",
            r"\App\Models\User::count()",
            "config(app.name)",
            r#"config("app.name")"#,
            "AppModelsInvoice::first()",
            "\"'a' 'b'\"",
            "route:list --json",
            "  migrate:fresh   --seed ",
        ];

        for raw in inputs {
            let once = normalizer.normalize(raw);
            let twice = normalizer.normalize(&once.text);
            assert_eq!(twice, once, "input: {raw:?}");
        }
    }

    #[test]
    fn test_normalize_code() {
        let normalizer = Normalizer::default();

        assert_eq!(normalizer.normalize_code("User::count()"), r"\App\Models\User::count()");
        assert_eq!(
            normalizer.normalize_code(r"\App\Models\User::where('a', 1) + User::count()"),
            r"\App\Models\User::where('a', 1) + User::count()"
        );
        assert_eq!(normalizer.normalize_code("config(app.name)"), r#"config("app.name")"#);
        assert_eq!(normalizer.normalize_code("--command=\"1 + 1\""), "1 + 1");
        // No console flags in code.
        assert_eq!(normalizer.normalize_code("$x = 1"), "$x = 1");
    }

    #[test]
    fn test_code_repair_is_idempotent() {
        let normalizer = Normalizer::default();
        for raw in ["config(app.name)", "User::find(1)", "'\"x\"'", "env(APP_ENV)"] {
            let once = normalizer.normalize_code(raw);
            assert_eq!(normalizer.normalize_code(&once), once, "input: {raw:?}");
        }
    }

    #[test]
    fn test_validate() {
        let normalizer = Normalizer::default();
        let policy = console_policy();

        let err = normalizer.prepare("down --secret=x", &policy).unwrap_err();
        match err {
            Error::CommandDenied { verb, reason } => {
                assert_eq!(verb, "down");
                assert!(reason.contains("deployment"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let cmd = normalizer.prepare("migrate", &policy).unwrap();
        assert_eq!(cmd.verb, "migrate");
        assert!(normalizer.prepare("serve", &AllowAllPolicy).is_ok());
    }
}

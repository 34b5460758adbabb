//! Safety flags appended to console commands.

/// A flag that must accompany a verb family when run without a terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagRule {
    /// Verbs starting with this text are covered.
    pub verb_prefix: String,
    /// Verbs starting with any of these are exempt.
    pub exempt: Vec<String>,
    /// Flag to append.
    pub flag: String,
    /// The flag is skipped when the command already contains any of these.
    pub unless_present: Vec<String>,
}

impl FlagRule {
    /// Rule appending `flag` to verbs starting with `verb_prefix`.
    pub fn new(verb_prefix: impl Into<String>, flag: impl Into<String>) -> Self {
        let flag = flag.into();
        Self {
            verb_prefix: verb_prefix.into(),
            exempt: Vec::new(),
            unless_present: vec![flag.clone()],
            flag,
        }
    }

    /// Exempt verbs starting with `prefix`.
    pub fn exempt(mut self, prefix: impl Into<String>) -> Self {
        self.exempt.push(prefix.into());
        self
    }

    /// Skip the flag when `text` already appears in the command.
    pub fn unless(mut self, text: impl Into<String>) -> Self {
        self.unless_present.push(text.into());
        self
    }

    /// Whether this rule adds its flag to `command`, whose verb is `verb`.
    pub fn applies(&self, verb: &str, command: &str) -> bool {
        verb.starts_with(&self.verb_prefix)
            && !self.exempt.iter().any(|e| verb.starts_with(e.as_str()))
            && !self.unless_present.iter().any(|u| command.contains(u.as_str()))
    }
}

/// Flags required by destructive or prompting verbs.
pub fn default_flag_rules() -> Vec<FlagRule> {
    vec![
        FlagRule::new("migrate", "--force")
            .exempt("migrate:status")
            .exempt("migrate:rollback"),
        FlagRule::new("db:seed", "--force"),
        FlagRule::new("vendor:publish", "--all")
            .unless("--provider")
            .unless("--tag"),
    ]
}

/// Flag appended to every console command.
pub const NO_INTERACTION: &str = "--no-interaction";

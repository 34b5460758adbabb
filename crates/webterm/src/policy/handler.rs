//! Verb policies: the decision type, the handler trait and the rule-based policy.

/// Outcome of checking a verb.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The verb may run.
    Allow,
    /// The verb is rejected; the string says why.
    Deny(String),
}

impl PolicyDecision {
    /// Whether the verb may run.
    pub fn is_allowed(&self) -> bool {
        *self == PolicyDecision::Allow
    }

    /// Why the verb was rejected, if it was.
    pub fn denial_reason(&self) -> Option<&str> {
        if let PolicyDecision::Deny(reason) = self {
            Some(reason)
        } else {
            None
        }
    }
}

/// Decides whether a command verb may run.
///
/// Checks happen before every dispatch and must not have side effects.
pub trait PolicyHandler: Send + Sync {
    /// Check a command whose leading token is `verb`.
    fn check_verb(&self, verb: &str) -> PolicyDecision;
}

impl PolicyHandler for std::sync::Arc<dyn PolicyHandler> {
    fn check_verb(&self, verb: &str) -> PolicyDecision {
        (**self).check_verb(verb)
    }
}

/// Lets every verb through.
#[derive(Clone, Debug, Default)]
pub struct AllowAllPolicy;

impl PolicyHandler for AllowAllPolicy {
    fn check_verb(&self, _verb: &str) -> PolicyDecision {
        PolicyDecision::Allow
    }
}

const NO_MATCH: &str = "no matching policy rule";

#[derive(Clone, Debug)]
enum RuleEffect {
    Allow,
    Deny(Option<String>),
}

#[derive(Clone, Debug)]
struct VerbRule {
    pattern: glob::Pattern,
    effect: RuleEffect,
}

impl VerbRule {
    fn decide(&self, verb: &str) -> PolicyDecision {
        match &self.effect {
            RuleEffect::Allow => PolicyDecision::Allow,
            RuleEffect::Deny(Some(reason)) => PolicyDecision::Deny(reason.clone()),
            RuleEffect::Deny(None) => {
                PolicyDecision::Deny(format!("command '{}' is not allowed", verb))
            }
        }
    }
}

/// Ordered verb rules with a fallback.
///
/// The first rule whose glob matches the verb decides; the fallback applies
/// when none does.
#[derive(Clone, Debug)]
pub struct CommandPolicy {
    rules: Vec<VerbRule>,
    fallback: PolicyDecision,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            fallback: PolicyDecision::Deny(NO_MATCH.to_string()),
        }
    }
}

impl CommandPolicy {
    /// An empty policy that denies everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty policy that allows everything.
    pub fn allow_all() -> Self {
        Self {
            rules: Vec::new(),
            fallback: PolicyDecision::Allow,
        }
    }
}

impl PolicyHandler for CommandPolicy {
    fn check_verb(&self, verb: &str) -> PolicyDecision {
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(verb))
            .map_or_else(|| self.fallback.clone(), |rule| rule.decide(verb))
    }
}

/// Fluent construction of a [`CommandPolicy`].
///
/// Exact rules match the whole verb; prefix rules match any verb starting
/// with the given text (`migrate` also covers `migrate:fresh`). Verb text is
/// escaped, so glob metacharacters in it are literal.
#[derive(Clone, Debug, Default)]
pub struct PolicyBuilder {
    rules: Vec<VerbRule>,
    allow_unmatched: bool,
}

impl PolicyBuilder {
    /// Start a policy that denies unmatched verbs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a policy that allows unmatched verbs.
    pub fn allow_by_default() -> Self {
        Self {
            allow_unmatched: true,
            ..Self::default()
        }
    }

    fn rule(mut self, pattern: &str, effect: RuleEffect) -> Self {
        match glob::Pattern::new(pattern) {
            Ok(pattern) => self.rules.push(VerbRule { pattern, effect }),
            Err(e) => tracing::warn!(pattern, error = %e, "ignoring invalid policy pattern"),
        }
        self
    }

    fn exact(verb: &str) -> String {
        glob::Pattern::escape(verb)
    }

    fn prefix(prefix: &str) -> String {
        format!("{}*", glob::Pattern::escape(prefix))
    }

    /// Allow exactly `verb`.
    pub fn allow(self, verb: &str) -> Self {
        self.rule(&Self::exact(verb), RuleEffect::Allow)
    }

    /// Allow every verb starting with `prefix`.
    pub fn allow_prefix(self, prefix: &str) -> Self {
        self.rule(&Self::prefix(prefix), RuleEffect::Allow)
    }

    /// Allow verbs matching a raw glob.
    pub fn allow_glob(self, pattern: &str) -> Self {
        self.rule(pattern, RuleEffect::Allow)
    }

    /// Deny exactly `verb`.
    pub fn deny(self, verb: &str) -> Self {
        self.rule(&Self::exact(verb), RuleEffect::Deny(None))
    }

    /// Deny exactly `verb`, reporting `reason`.
    pub fn deny_with_reason(self, verb: &str, reason: impl Into<String>) -> Self {
        self.rule(&Self::exact(verb), RuleEffect::Deny(Some(reason.into())))
    }

    /// Deny every verb starting with `prefix`.
    pub fn deny_prefix(self, prefix: &str) -> Self {
        self.rule(&Self::prefix(prefix), RuleEffect::Deny(None))
    }

    /// Deny verbs matching a raw glob.
    pub fn deny_glob(self, pattern: &str) -> Self {
        self.rule(pattern, RuleEffect::Deny(None))
    }

    /// Finish the policy.
    pub fn build(self) -> CommandPolicy {
        CommandPolicy {
            rules: self.rules,
            fallback: if self.allow_unmatched {
                PolicyDecision::Allow
            } else {
                PolicyDecision::Deny(NO_MATCH.to_string())
            },
        }
    }
}

/// Policy for gateway method names.
///
/// Safe verbs are listed first so that, for example, `migrate:status` is
/// allowed even though `migrate` is denied.
pub fn endpoint_policy() -> CommandPolicy {
    let allowed = [
        "list",
        "help",
        "route:list",
        "cache:clear",
        "config:clear",
        "view:clear",
        "migrate:status",
        "queue:work",
        "queue:restart",
        "storage:link",
        "optimize",
    ];
    let denied = ["migrate", "db:seed", "key:generate", "down", "up"];

    let builder = allowed
        .iter()
        .fold(PolicyBuilder::allow_by_default(), |b, verb| {
            b.allow_prefix(verb)
        });
    denied.iter().fold(builder, |b, verb| b.deny_prefix(verb)).build()
}

/// Policy for structured console commands run through the terminal.
pub fn console_policy() -> CommandPolicy {
    PolicyBuilder::allow_by_default()
        .deny_with_reason("down", "Maintenance mode should be handled through deployment")
        .deny_with_reason("serve", "Development server not applicable in web terminal")
        .build()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        assert!(AllowAllPolicy.check_verb("migrate").is_allowed());
        assert!(AllowAllPolicy.check_verb("").is_allowed());
        assert!(CommandPolicy::allow_all().check_verb("down").is_allowed());
    }

    #[test]
    fn test_denial_without_reason_names_verb() {
        let policy = PolicyBuilder::allow_by_default().deny("down").build();
        assert_eq!(
            policy.check_verb("down").denial_reason(),
            Some("command 'down' is not allowed")
        );
        assert_eq!(policy.check_verb("up").denial_reason(), None);
    }

    #[test]
    fn test_deny_by_default() {
        let policy = CommandPolicy::new();
        let decision = policy.check_verb("list");
        assert_eq!(decision.denial_reason(), Some("no matching policy rule"));
    }

    #[test]
    fn test_exact_rule_does_not_match_prefix() {
        let policy = PolicyBuilder::new().allow("list").build();

        assert!(policy.check_verb("list").is_allowed());
        assert!(!policy.check_verb("listing").is_allowed());
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let policy = PolicyBuilder::allow_by_default()
            .allow_prefix("migrate:status")
            .deny_prefix("migrate")
            .build();

        assert!(policy.check_verb("migrate:status").is_allowed());
        assert!(!policy.check_verb("migrate").is_allowed());
        assert!(!policy.check_verb("migrate:fresh").is_allowed());
        assert!(policy.check_verb("cache:clear").is_allowed());
    }

    #[test]
    fn test_glob_metacharacters_in_verbs_are_literal() {
        let policy = PolicyBuilder::new().allow("make:[model]").build();

        assert!(policy.check_verb("make:[model]").is_allowed());
        assert!(!policy.check_verb("make:m").is_allowed());
    }

    #[test]
    fn test_endpoint_policy() {
        let policy = endpoint_policy();

        for verb in ["list", "help", "route:list", "migrate:status", "optimize:clear"] {
            assert!(policy.check_verb(verb).is_allowed(), "{} should be allowed", verb);
        }
        for verb in ["migrate", "migrate:fresh", "db:seed", "key:generate", "down", "up"] {
            assert!(!policy.check_verb(verb).is_allowed(), "{} should be denied", verb);
        }
        // Unlisted verbs default to allowed.
        assert!(policy.check_verb("tinker").is_allowed());
        assert!(policy.check_verb("composer").is_allowed());
    }

    #[test]
    fn test_console_policy_reasons() {
        let policy = console_policy();

        assert_eq!(
            policy.check_verb("down").denial_reason(),
            Some("Maintenance mode should be handled through deployment")
        );
        assert!(!policy.check_verb("serve").is_allowed());
        assert!(policy.check_verb("migrate").is_allowed());
        // Exact match only: `download:x` is not the maintenance toggle.
        assert!(policy.check_verb("download:x").is_allowed());
    }
}

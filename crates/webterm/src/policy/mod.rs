//! Allow/deny policy for command verbs.
//!
//! Every command is classified by its verb (the first whitespace-delimited
//! token) before anything runs. A policy is an ordered list of glob rules
//! over that verb; the first matching rule decides, and a configurable
//! default applies when nothing matches.
//!
//! Two policies ship with the crate:
//!
//! - [`endpoint_policy`]: applied to the method name of gateway requests.
//!   Safe read-only or idempotent verbs are allowed outright, destructive
//!   verbs are denied, everything else is allowed.
//! - [`console_policy`]: applied to structured console commands. Denies the
//!   few verbs that make no sense headlessly, each with a reason.
//!
//! ## Example
//!
//! ```rust
//! use webterm::policy::{PolicyBuilder, PolicyHandler};
//!
//! let policy = PolicyBuilder::allow_by_default()
//!     .allow("migrate:status")
//!     .deny_prefix("migrate")
//!     .build();
//!
//! assert!(policy.check_verb("migrate:status").is_allowed());
//! assert!(!policy.check_verb("migrate:fresh").is_allowed());
//! assert!(policy.check_verb("route:list").is_allowed());
//! ```

mod handler;

pub use handler::{
    AllowAllPolicy, CommandPolicy, PolicyBuilder, PolicyDecision, PolicyHandler, console_policy,
    endpoint_policy,
};

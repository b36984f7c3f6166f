//! Compiled allow/deny rules evaluated against a source address.

use regex::Regex;
use tracing::{debug, warn};

use crate::config::{AccessLevel, AccessPolicy};

/// Outcome of evaluating a source address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl From<AccessLevel> for Decision {
    fn from(level: AccessLevel) -> Self {
        match level {
            AccessLevel::Allow => Decision::Allow,
            AccessLevel::Deny => Decision::Deny,
        }
    }
}

/// Immutable filter built once from an [`AccessPolicy`].
///
/// Evaluation is categorical: any deny match wins, then any allow match,
/// then the default. Patterns are unanchored regular expressions, so a rule
/// matches when it is found anywhere in the address.
#[derive(Debug, Clone)]
pub struct AccessFilter {
    deny: Vec<Regex>,
    allow: Vec<Regex>,
    default: Decision,
}

impl AccessFilter {
    /// Compile every rule of the policy. Rules whose pattern does not
    /// compile are skipped with a warning.
    pub fn compile(policy: &AccessPolicy) -> Self {
        let mut deny = Vec::new();
        let mut allow = Vec::new();

        for rule in &policy.rules {
            let regex = match Regex::new(&rule.origin) {
                Ok(regex) => regex,
                Err(e) => {
                    warn!(origin = %rule.origin, error = %e, "Failed to parse access rule; skipping");
                    continue;
                }
            };

            match rule.policy {
                AccessLevel::Allow => allow.push(regex),
                AccessLevel::Deny => deny.push(regex),
            }
        }

        Self {
            deny,
            allow,
            default: policy.default.into(),
        }
    }

    /// Decide whether `address` may proceed.
    pub fn evaluate(&self, address: &str) -> Decision {
        if let Some(rx) = self.deny.iter().find(|rx| rx.is_match(address)) {
            debug!(address, rule = %rx, "Address matched a deny rule");
            return Decision::Deny;
        }

        if let Some(rx) = self.allow.iter().find(|rx| rx.is_match(address)) {
            debug!(address, rule = %rx, "Address matched an allow rule");
            return Decision::Allow;
        }

        debug!(address, default = ?self.default, "No access rule matched; using default");
        self.default
    }

    pub fn default_decision(&self) -> Decision {
        self.default
    }

    /// Deny patterns in compilation order.
    pub fn deny_patterns(&self) -> impl Iterator<Item = &str> {
        self.deny.iter().map(Regex::as_str)
    }

    /// Allow patterns in compilation order.
    pub fn allow_patterns(&self) -> impl Iterator<Item = &str> {
        self.allow.iter().map(Regex::as_str)
    }
}

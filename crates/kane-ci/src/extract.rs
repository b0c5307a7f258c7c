//! Identifier extraction from loosely shaped response bodies.
//!
//! The provider is inconsistent about where it puts identifiers: some
//! endpoints wrap the payload in a `data` envelope, some return it flat, and
//! the field name varies. Each lookup is an ordered list of [`IdRule`]s; the
//! first rule that yields a non-empty value wins.

use serde_json::Value;

use crate::client::RemoteId;

/// A single place an identifier may live in a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRule {
    envelope: Option<&'static str>,
    field: &'static str,
}

impl IdRule {
    /// Field at the top level of the body.
    #[must_use]
    pub const fn top(field: &'static str) -> Self {
        Self {
            envelope: None,
            field,
        }
    }

    /// Field inside a named envelope object.
    #[must_use]
    pub const fn nested(envelope: &'static str, field: &'static str) -> Self {
        Self {
            envelope: Some(envelope),
            field,
        }
    }

    /// Applies the rule to `body`.
    #[must_use]
    pub fn apply(&self, body: &Value) -> Option<RemoteId> {
        let scope = match self.envelope {
            Some(name) => body.get(name)?,
            None => body,
        };
        RemoteId::from_value(scope.get(self.field)?)
    }
}

/// Where a created test run's id may appear.
pub const RUN_ID_RULES: &[IdRule] = &[
    IdRule::nested("data", "test_run_id"),
    IdRule::nested("data", "id"),
    IdRule::top("test_run_id"),
    IdRule::top("id"),
];

/// Where a triggered job's id may appear.
pub const JOB_ID_RULES: &[IdRule] = &[
    IdRule::top("job_id"),
    IdRule::top("id"),
    IdRule::nested("data", "job_id"),
];

/// Returns the value of the first matching rule.
#[must_use]
pub fn first_match(rules: &[IdRule], body: &Value) -> Option<RemoteId> {
    rules.iter().find_map(|rule| rule.apply(body))
}

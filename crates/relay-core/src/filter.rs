//! Filter engine deciding which notifications are forwarded.
//!
//! A decision runs three checks in order:
//!
//! 1. the master switch (`FilterConfig::enabled`),
//! 2. the source allow-list (empty admits every source),
//! 3. the trigger rule table: at least one rule that applies to the event's
//!    source must match the body.
//!
//! Rules are data. Each `TriggerRule` optionally scopes itself to one source
//! and carries a predicate, either a case-sensitive substring or a regular
//! expression. Rule tables are loaded from configuration as `RuleSpec`s, so
//! adding a payment provider or changing a marker needs no code change.
//!
//! The engine holds no mutable state and is shared across concurrently
//! processed events behind an `Arc`.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    error::{CoreError, Result},
    models::{FilterConfig, RawEvent},
};

/// Marker in the body of a payment-received notification.
pub const DEFAULT_TRIGGER: &str = "berhasil menerima Rp";

/// Body predicate of a trigger rule.
#[derive(Debug, Clone)]
pub enum TriggerPredicate {
    /// Case-sensitive exact substring match.
    Contains(String),
    /// Regular expression search anywhere in the body.
    Matches(Regex),
}

impl TriggerPredicate {
    /// Tests the predicate against a notification body.
    pub fn is_match(&self, body: &str) -> bool {
        match self {
            Self::Contains(needle) => body.contains(needle.as_str()),
            Self::Matches(regex) => regex.is_match(body),
        }
    }
}

/// A predicate optionally scoped to a single source.
#[derive(Debug, Clone)]
pub struct TriggerRule {
    source: Option<String>,
    predicate: TriggerPredicate,
}

impl TriggerRule {
    /// Rule matching bodies that contain `needle`, for every source.
    pub fn contains(needle: impl Into<String>) -> Self {
        Self { source: None, predicate: TriggerPredicate::Contains(needle.into()) }
    }

    /// Rule matching bodies against a regular expression, for every source.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidRule` if the pattern does not compile.
    pub fn regex(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| CoreError::invalid_rule(format!("bad pattern {pattern:?}: {e}")))?;
        Ok(Self { source: None, predicate: TriggerPredicate::Matches(regex) })
    }

    /// Restricts the rule to events from `source_id`.
    #[must_use]
    pub fn scoped_to(mut self, source_id: impl Into<String>) -> Self {
        self.source = Some(source_id.into());
        self
    }

    /// The source this rule is scoped to, if any.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Whether this rule is consulted for events from `source_id`.
    pub fn applies_to(&self, source_id: &str) -> bool {
        self.source.as_deref().map_or(true, |scope| scope == source_id)
    }

    /// Whether the rule applies to the event's source and its predicate
    /// matches the body.
    pub fn matches(&self, event: &RawEvent) -> bool {
        self.applies_to(&event.source_id) && self.predicate.is_match(event.body_or_empty())
    }
}

/// Serializable form of a trigger rule, as written in configuration.
///
/// Exactly one of `contains` and `regex` must be set.
///
/// ```toml
/// [[rules]]
/// source = "id.dana"
/// contains = "berhasil menerima Rp"
///
/// [[rules]]
/// regex = "received Rp[0-9.]+"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Source scope; absent means every source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Substring predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    /// Regular expression predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
}

impl RuleSpec {
    /// Unscoped substring rule.
    pub fn contains(needle: impl Into<String>) -> Self {
        Self { contains: Some(needle.into()), ..Self::default() }
    }
}

impl TryFrom<&RuleSpec> for TriggerRule {
    type Error = CoreError;

    fn try_from(spec: &RuleSpec) -> Result<Self> {
        let rule = match (&spec.contains, &spec.regex) {
            (Some(needle), None) => {
                if needle.is_empty() {
                    return Err(CoreError::invalid_rule("contains must not be empty"));
                }
                Self::contains(needle.clone())
            },
            (None, Some(pattern)) => Self::regex(pattern)?,
            (Some(_), Some(_)) => {
                return Err(CoreError::invalid_rule("set either contains or regex, not both"));
            },
            (None, None) => {
                return Err(CoreError::invalid_rule("rule needs contains or regex"));
            },
        };

        Ok(match &spec.source {
            Some(source) => rule.scoped_to(source.clone()),
            None => rule,
        })
    }
}

/// Ordered collection of trigger rules.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<TriggerRule>,
}

impl RuleTable {
    /// Builds a table from already constructed rules.
    pub fn new(rules: Vec<TriggerRule>) -> Self {
        Self { rules }
    }

    /// Builds a table from configuration.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidRule` for the first malformed spec.
    pub fn from_specs(specs: &[RuleSpec]) -> Result<Self> {
        let rules = specs.iter().map(TriggerRule::try_from).collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Whether any rule applicable to the event matches it.
    pub fn any_match(&self, event: &RawEvent) -> bool {
        self.rules.iter().any(|rule| rule.matches(event))
    }

    /// Number of rules in the table.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table has no rules. An empty table forwards nothing.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::new(vec![TriggerRule::contains(DEFAULT_TRIGGER)])
    }
}

/// Why an event was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Forwarding is switched off.
    Disabled,
    /// The allow-list is non-empty and does not contain the source.
    SourceNotAllowed,
    /// No applicable rule matched the body.
    NoRuleMatched,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::SourceNotAllowed => write!(f, "source_not_allowed"),
            Self::NoRuleMatched => write!(f, "no_rule_matched"),
        }
    }
}

/// Result of evaluating an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Event should be encoded and delivered.
    Forward,
    /// Event is discarded.
    Drop(DropReason),
}

impl FilterDecision {
    /// Whether the decision is `Forward`.
    pub fn is_forward(&self) -> bool {
        matches!(self, Self::Forward)
    }
}

/// Pure decision function over an event and a settings snapshot.
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    rules: RuleTable,
}

impl FilterEngine {
    /// Creates an engine with the given rule table.
    pub fn new(rules: RuleTable) -> Self {
        Self { rules }
    }

    /// The engine's rule table.
    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Evaluates an event, reporting why it was dropped.
    pub fn evaluate(&self, event: &RawEvent, config: &FilterConfig) -> FilterDecision {
        if !config.enabled {
            return FilterDecision::Drop(DropReason::Disabled);
        }

        if !config.allows_source(&event.source_id) {
            return FilterDecision::Drop(DropReason::SourceNotAllowed);
        }

        if !self.rules.any_match(event) {
            return FilterDecision::Drop(DropReason::NoRuleMatched);
        }

        FilterDecision::Forward
    }

    /// Whether the event should be forwarded.
    pub fn should_forward(&self, event: &RawEvent, config: &FilterConfig) -> bool {
        self.evaluate(event, config).is_forward()
    }
}

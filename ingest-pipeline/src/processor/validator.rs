//! Validator chain.
//!
//! An ordered list of rules, evaluated in registration order. The first rule
//! that does not pass decides the outcome.

use std::collections::HashSet;
use tracing::debug;

use crate::processor::rules::{
    EncodingRule, PayloadSizeRule, RequiredFieldsRule, SourceAllowListRule,
};
use ingest_shared::{RawDocument, Reason, ValidationOutcome};

/// Default payload bound: 1 MiB.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Verdict of a single rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleVerdict {
    Pass,
    Fail(Reason),
    Quarantine(Reason),
}

/// A validation rule.
///
/// Rules are pure functions of the document: they must not keep mutable
/// state between invocations, and they run on the blocking thread pool.
pub trait Rule: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn evaluate(&self, document: &RawDocument) -> RuleVerdict;
}

/// Configuration for the standard rule chain.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Documents with a larger payload are rejected.
    pub max_payload_bytes: usize,
    /// JSON fields the payload must carry. Empty disables the JSON check.
    pub required_fields: Vec<String>,
    /// Accepted origins. Empty allows every origin.
    pub allowed_sources: HashSet<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            required_fields: Vec::new(),
            allowed_sources: HashSet::new(),
        }
    }
}

impl ValidatorConfig {
    pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    pub fn with_required_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allowed_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_sources = sources.into_iter().map(Into::into).collect();
        self
    }
}

/// Ordered chain of validation rules.
#[derive(Default)]
pub struct Validator {
    rules: Vec<Box<dyn Rule>>,
}

impl Validator {
    /// An empty chain; every document is accepted.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard chain: size, encoding, required fields, source allow-list.
    pub fn standard(config: &ValidatorConfig) -> Self {
        Self::new()
            .with_rule(PayloadSizeRule::new(config.max_payload_bytes))
            .with_rule(EncodingRule)
            .with_rule(RequiredFieldsRule::new(config.required_fields.clone()))
            .with_rule(SourceAllowListRule::new(config.allowed_sources.clone()))
    }

    /// Append a rule to the end of the chain.
    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Run the chain, stopping at the first rule that does not pass.
    pub fn validate(&self, document: &RawDocument) -> ValidationOutcome {
        for rule in &self.rules {
            match rule.evaluate(document) {
                RuleVerdict::Pass => continue,
                RuleVerdict::Fail(reason) => {
                    debug!(
                        document_id = %document.document_id,
                        rule = rule.name(),
                        reason = %reason,
                        "Rule failed"
                    );
                    return ValidationOutcome::Rejected(reason);
                }
                RuleVerdict::Quarantine(reason) => {
                    debug!(
                        document_id = %document.document_id,
                        rule = rule.name(),
                        reason = %reason,
                        "Rule quarantined document"
                    );
                    return ValidationOutcome::Quarantined(reason);
                }
            }
        }
        ValidationOutcome::Accepted
    }
}

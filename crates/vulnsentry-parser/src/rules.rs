//! Deny-list rule engine over the lowered syntax tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vulnsentry_core::{RuleFinding, RuleVerdict};

use crate::parser::{CodeParser, ParseError};
use crate::syntax::SyntaxNode;

/// Mapping from a dangerous built-in name to a human-readable finding description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DenyList(BTreeMap<String, String>);

impl Default for DenyList {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            "eval".to_string(),
            "Use of eval(): evaluating dynamic input allows arbitrary code execution".to_string(),
        );
        Self(entries)
    }
}

impl DenyList {
    /// An empty deny-list (nothing is flagged).
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, identifier: impl Into<String>, description: impl Into<String>) -> Self {
        self.0.insert(identifier.into(), description.into());
        self
    }

    pub fn get(&self, identifier: &str) -> Option<&str> {
        self.0.get(identifier).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for DenyList {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self(entries)
    }
}

impl From<DenyList> for BTreeMap<String, String> {
    fn from(deny_list: DenyList) -> Self {
        deny_list.0
    }
}

/// Flags calls to deny-listed bare identifiers in Python snippets.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    deny_list: DenyList,
}

impl RuleEngine {
    pub fn new(deny_list: DenyList) -> Self {
        Self { deny_list }
    }

    pub fn deny_list(&self) -> &DenyList {
        &self.deny_list
    }

    /// Analyze a snippet. Syntax errors become a `ParseError` verdict.
    pub fn analyze(&self, code: &str) -> RuleVerdict {
        let tree = match CodeParser::new().and_then(|mut parser| parser.parse(code)) {
            Ok(tree) => tree,
            Err(e) => {
                log::debug!("Rule analysis skipped: {}", e);
                return e.into();
            }
        };

        let findings = self.findings(&tree);
        if findings.is_empty() {
            RuleVerdict::Clean
        } else {
            log::debug!("Rule analysis flagged {} call(s)", findings.len());
            RuleVerdict::Flagged { findings }
        }
    }

    /// All deny-listed calls in a parsed tree, in source order.
    pub fn findings(&self, tree: &SyntaxNode) -> Vec<RuleFinding> {
        let mut findings = Vec::new();
        self.visit(tree, &mut findings);
        findings
    }

    fn visit(&self, node: &SyntaxNode, findings: &mut Vec<RuleFinding>) {
        if let SyntaxNode::Call {
            callee, position, ..
        } = node
            && let SyntaxNode::Identifier { name, .. } = callee.as_ref()
            && let Some(description) = self.deny_list.get(name)
        {
            findings.push(RuleFinding {
                identifier: name.clone(),
                description: description.to_string(),
                line: position.line,
                column: position.column,
            });
        }
        for child in node.children() {
            self.visit(child, findings);
        }
    }
}

impl From<ParseError> for RuleVerdict {
    fn from(err: ParseError) -> Self {
        RuleVerdict::ParseError {
            message: err.to_string(),
        }
    }
}

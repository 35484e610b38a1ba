//! Tree-sitter based Python parser and deny-list rule engine.
//!
//! This crate provides:
//! - Snippet parsing with the tree-sitter Python grammar
//! - Lowering into a tagged syntax tree (SyntaxNode)
//! - A configurable deny-list rule engine producing RuleVerdicts

mod parser;
mod rules;
mod syntax;

pub use parser::{CodeParser, ParseError};
pub use rules::{DenyList, RuleEngine};
pub use syntax::{Position, SyntaxNode};

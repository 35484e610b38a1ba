//! Python snippet parser using tree-sitter.

use thiserror::Error;
use tree_sitter::{Language, Node, Parser};

use crate::syntax::{Position, SyntaxNode};

const MAX_SNIPPET_PREVIEW: usize = 24;

/// Deepest syntax tree accepted for lowering. Lowering and rule matching
/// recurse once per level.
const MAX_TREE_DEPTH: usize = 400;

/// Python 2 statement forms the grammar still accepts.
const LEGACY_STATEMENTS: [(&str, &str); 2] = [
    ("print_statement", "print"),
    ("exec_statement", "exec"),
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("failed to load Python grammar: {0}")]
    Grammar(String),

    #[error("parser produced no syntax tree")]
    NoTree,

    #[error("invalid syntax at line {line}, column {column}: {detail}")]
    Syntax {
        line: usize,
        column: usize,
        detail: String,
    },
}

/// Tree-sitter based parser for Python snippets.
pub struct CodeParser {
    parser: Parser,
}

impl CodeParser {
    /// Create a parser configured with the Python grammar.
    pub fn new() -> Result<Self, ParseError> {
        let language: Language = tree_sitter_python::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| ParseError::Grammar(e.to_string()))?;
        Ok(Self { parser })
    }

    /// Parse a snippet and lower it into a [`SyntaxNode`] tree.
    ///
    /// Tree-sitter recovers from errors, so any ERROR or MISSING node in the
    /// result is reported as a syntax error instead of being lowered. Python 2
    /// statements and trees nested deeper than `MAX_TREE_DEPTH` are
    /// rejected the same way.
    pub fn parse(&mut self, source: &str) -> Result<SyntaxNode, ParseError> {
        let tree = self.parser.parse(source, None).ok_or(ParseError::NoTree)?;
        let root = tree.root_node();

        if let Some(err) = scan_unsupported(root) {
            return Err(err);
        }

        if root.has_error() {
            return Err(first_syntax_error(root, source).unwrap_or(ParseError::Syntax {
                line: root.start_position().row + 1,
                column: root.start_position().column + 1,
                detail: "unrecognized syntax".to_string(),
            }));
        }

        Ok(lower(root, source))
    }
}

fn position(node: &Node) -> Position {
    let point = node.start_position();
    Position {
        line: point.row + 1,
        column: point.column + 1,
    }
}

fn text<'a>(node: &Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or_default()
}

fn named_children<'tree>(node: &Node<'tree>) -> Vec<Node<'tree>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Iterative pre-order walk that rejects excessive nesting and Python 2
/// statements before any recursive pass touches the tree.
fn scan_unsupported(root: Node) -> Option<ParseError> {
    let mut cursor = root.walk();
    let mut depth = 1;

    loop {
        let node = cursor.node();
        if depth > MAX_TREE_DEPTH {
            let pos = position(&node);
            return Some(ParseError::Syntax {
                line: pos.line,
                column: pos.column,
                detail: format!("nesting too deep (more than {} levels)", MAX_TREE_DEPTH),
            });
        }
        if let Some((_, keyword)) = LEGACY_STATEMENTS
            .iter()
            .find(|(kind, _)| *kind == node.kind())
        {
            let pos = position(&node);
            return Some(ParseError::Syntax {
                line: pos.line,
                column: pos.column,
                detail: format!("`{}` statement is Python 2 syntax", keyword),
            });
        }

        if cursor.goto_first_child() {
            depth += 1;
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
            depth -= 1;
        }
    }
}

/// Locate the first ERROR or MISSING node in document order.
fn first_syntax_error(node: Node, source: &str) -> Option<ParseError> {
    if node.is_missing() {
        let pos = position(&node);
        return Some(ParseError::Syntax {
            line: pos.line,
            column: pos.column,
            detail: format!("missing `{}`", node.kind()),
        });
    }
    if node.is_error() {
        let pos = position(&node);
        let snippet: String = text(&node, source)
            .chars()
            .take(MAX_SNIPPET_PREVIEW)
            .collect();
        return Some(ParseError::Syntax {
            line: pos.line,
            column: pos.column,
            detail: format!("unexpected `{}`", snippet.trim()),
        });
    }

    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error() || child.is_missing())
        .find_map(|child| first_syntax_error(child, source))
}

fn lower(node: Node, source: &str) -> SyntaxNode {
    match node.kind() {
        "module" => SyntaxNode::Module {
            body: named_children(&node)
                .into_iter()
                .map(|child| lower(child, source))
                .collect(),
        },
        "call" => {
            let Some(function) = node.child_by_field_name("function") else {
                return lower_other(node, source);
            };
            let arguments = node
                .child_by_field_name("arguments")
                .map(|args| {
                    named_children(&args)
                        .into_iter()
                        .map(|child| lower(child, source))
                        .collect()
                })
                .unwrap_or_default();
            SyntaxNode::Call {
                callee: Box::new(lower(function, source)),
                arguments,
                position: position(&node),
            }
        }
        "identifier" => SyntaxNode::Identifier {
            name: text(&node, source).to_string(),
            position: position(&node),
        },
        "attribute" => {
            match (
                node.child_by_field_name("object"),
                node.child_by_field_name("attribute"),
            ) {
                (Some(object), Some(attribute)) => SyntaxNode::Attribute {
                    object: Box::new(lower(object, source)),
                    attribute: text(&attribute, source).to_string(),
                    position: position(&node),
                },
                _ => lower_other(node, source),
            }
        }
        _ => lower_other(node, source),
    }
}

fn lower_other(node: Node, source: &str) -> SyntaxNode {
    SyntaxNode::Other {
        kind: node.kind().to_string(),
        children: named_children(&node)
            .into_iter()
            .map(|child| lower(child, source))
            .collect(),
    }
}

//! Tagged syntax tree used by the rule engine.

/// 1-based source position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// A lowered Python syntax node.
///
/// Only the shapes the rules inspect get their own variant; every other
/// grammar node becomes `Other` and keeps its named children.
#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxNode {
    Module {
        body: Vec<SyntaxNode>,
    },
    Call {
        callee: Box<SyntaxNode>,
        arguments: Vec<SyntaxNode>,
        position: Position,
    },
    Identifier {
        name: String,
        position: Position,
    },
    Attribute {
        object: Box<SyntaxNode>,
        attribute: String,
        position: Position,
    },
    Other {
        kind: String,
        children: Vec<SyntaxNode>,
    },
}

impl SyntaxNode {
    /// Direct children in source order.
    pub fn children(&self) -> Vec<&SyntaxNode> {
        match self {
            SyntaxNode::Module { body } | SyntaxNode::Other { children: body, .. } => {
                body.iter().collect()
            }
            SyntaxNode::Call {
                callee, arguments, ..
            } => std::iter::once(callee.as_ref())
                .chain(arguments.iter())
                .collect(),
            SyntaxNode::Attribute { object, .. } => vec![object.as_ref()],
            SyntaxNode::Identifier { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> SyntaxNode {
        SyntaxNode::Identifier {
            name: name.to_string(),
            position: Position { line: 1, column: 1 },
        }
    }

    #[test]
    fn test_children_of_call() {
        let call = SyntaxNode::Call {
            callee: Box::new(ident("f")),
            arguments: vec![ident("a"), ident("b")],
            position: Position { line: 1, column: 1 },
        };
        let children = call.children();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0], &ident("f"));
    }

    #[test]
    fn test_identifier_has_no_children() {
        assert!(ident("x").children().is_empty());
    }
}

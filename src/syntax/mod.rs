//! Call-expression index over JavaScript/TypeScript spec sources.
//!
//! Screenshot identity resolution only needs a thin slice of the source
//! language: which calls exist, what their callee text is, whether their
//! first argument is a plain string literal, and which call encloses them.
//! [`CallIndex`] is that query surface; [`CallTree`] is the bundled
//! implementation backed by tree-sitter's TSX grammar.

use anyhow::{Context, Result};
use tree_sitter::Node;

/// 1-based line and byte column of a node in the parsed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// A string literal used as a call's first argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringArg {
    /// Raw text between the quotes. Escape sequences are left untouched.
    pub value: String,
    pub position: Position,
}

pub type CallId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallExpr {
    /// Callee text, e.g. `Terra.validates.element` or `describe.only`.
    pub callee: String,
    pub name_arg: Option<StringArg>,
    /// Nearest call whose argument list contains this call.
    pub parent: Option<CallId>,
    pub position: Position,
}

/// Query surface over the call expressions of one source file.
pub trait CallIndex {
    /// All calls in source order; a call's [`CallId`] is its index here.
    fn calls(&self) -> &[CallExpr];

    fn call(&self, id: CallId) -> Option<&CallExpr> {
        self.calls().get(id)
    }

    /// Walk outwards from `id` (exclusive) and return the first enclosing call
    /// accepted by `predicate`.
    fn find_enclosing(&self, id: CallId, predicate: &dyn Fn(&CallExpr) -> bool) -> Option<&CallExpr> {
        let mut current = self.call(id)?.parent;
        while let Some(parent_id) = current {
            let parent = self.call(parent_id)?;
            if predicate(parent) {
                return Some(parent);
            }
            current = parent.parent;
        }
        None
    }
}

/// Calls collected from one spec source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallTree {
    calls: Vec<CallExpr>,
}

impl CallTree {
    /// Parses with the TSX grammar, which also accepts plain JavaScript and JSX.
    pub fn parse(source: &str) -> Result<Self> {
        let language: tree_sitter::Language = tree_sitter_typescript::LANGUAGE_TSX.into();
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&language)
            .context("Failed to load the TSX grammar")?;
        let tree = parser
            .parse(source, None)
            .context("Parser produced no syntax tree")?;
        Ok(Self {
            calls: collect_calls(tree.root_node(), source),
        })
    }
}

impl CallIndex for CallTree {
    fn calls(&self) -> &[CallExpr] {
        &self.calls
    }
}

/// Pre-order walk over `call_expression` nodes. A call is the parent of every
/// call inside its `arguments`; calls inside its callee keep the outer parent.
fn collect_calls(root: Node<'_>, source: &str) -> Vec<CallExpr> {
    let mut calls = Vec::new();
    let mut stack: Vec<(Node<'_>, Option<CallId>)> = vec![(root, None)];

    while let Some((node, parent)) = stack.pop() {
        if node.kind() == "call_expression"
            && let Some(function) = node.child_by_field_name("function")
        {
            let id = calls.len();
            calls.push(CallExpr {
                callee: compact(text(function, source)),
                name_arg: node
                    .child_by_field_name("arguments")
                    .and_then(|args| name_argument(args, source)),
                parent,
                position: position(node),
            });
            if let Some(args) = node.child_by_field_name("arguments") {
                stack.push((args, Some(id)));
            }
            stack.push((function, parent));
            continue;
        }

        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        for child in children.into_iter().rev() {
            stack.push((child, parent));
        }
    }

    calls
}

/// The first argument when it is a single quoted string literal.
fn name_argument(args: Node<'_>, source: &str) -> Option<StringArg> {
    let mut cursor = args.walk();
    let first = args
        .named_children(&mut cursor)
        .find(|child| child.kind() != "comment")?;
    if first.kind() != "string" {
        return None;
    }
    let raw = text(first, source);
    let value = raw.get(1..raw.len().saturating_sub(1)).unwrap_or_default();
    Some(StringArg {
        value: value.to_string(),
        position: position(first),
    })
}

fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or_default()
}

fn compact(callee: &str) -> String {
    callee.split_whitespace().collect()
}

fn position(node: Node<'_>) -> Position {
    let point = node.start_position();
    Position {
        line: point.row + 1,
        column: point.column + 1,
    }
}

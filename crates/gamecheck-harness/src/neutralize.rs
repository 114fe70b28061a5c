//! AST Neutralizer: strip blocking constructs before sandboxed execution.
//!
//! Works on the immutable tree-sitter tree of a [`ParsedModule`]. Every
//! statement selected for elision is spliced out of a copy of the source and
//! replaced by `pass` plus the newlines it spanned, so surviving statements
//! keep their line numbers and every block stays non-empty. The rendered text
//! is reparsed into a fresh `ParsedModule`; the input is never modified.

use std::ops::Range;

use gamecheck_error::ProbeError;
use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use crate::syntax::ParsedModule;

/// Which names count as blocking entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeutralizerRules {
    /// Method names elided at top level: `anything.<name>(...)`.
    pub blocking_methods: Vec<String>,
    /// Bare function names elided at top level: `<name>(...)`.
    pub blocking_functions: Vec<String>,
}

impl Default for NeutralizerRules {
    fn default() -> Self {
        Self {
            blocking_methods: ["init", "quit", "main", "run", "exit"]
                .map(String::from)
                .to_vec(),
            blocking_functions: ["main", "run_game", "run", "game_loop"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// Category of a removed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElisionKind {
    /// `if __name__ == "__main__":` at top level.
    EntryPointGuard,
    /// A `while` loop at any depth.
    BlockingLoop,
    /// A top-level call to an initializer or entry point.
    BlockingCall,
}

/// One removed statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Elision {
    /// Category.
    pub kind: ElisionKind,
    /// 1-based line where the statement started.
    pub line: usize,
    /// First line of the removed text.
    pub text: String,
}

/// A rewritten module with every blocking construct removed.
#[derive(Debug)]
pub struct NeutralizedProgram {
    module: ParsedModule,
    elisions: Vec<Elision>,
}

impl NeutralizedProgram {
    /// The rendered, reparsed module.
    pub fn module(&self) -> &ParsedModule {
        &self.module
    }

    /// The rendered source text.
    pub fn source(&self) -> &str {
        self.module.source()
    }

    /// Every elision, in source order.
    pub fn elisions(&self) -> &[Elision] {
        &self.elisions
    }
}

/// Neutralize `module` under `rules`.
pub fn neutralize(
    module: &ParsedModule,
    rules: &NeutralizerRules,
) -> Result<NeutralizedProgram, ProbeError> {
    let mut cuts: Vec<(Range<usize>, Elision)> = Vec::new();
    let root = module.root();
    let mut cursor = root.walk();
    for stmt in root.named_children(&mut cursor) {
        if let Some(kind) = top_level_kind(module, stmt, rules) {
            cuts.push((stmt.byte_range(), elision(module, stmt, kind)));
        } else {
            collect_loops(module, stmt, &mut cuts);
        }
    }

    let source = module.source();
    let mut rendered = String::with_capacity(source.len());
    let mut last = 0;
    for (range, _) in &cuts {
        rendered.push_str(&source[last..range.start]);
        rendered.push_str("pass");
        let newlines = source[range.clone()].matches('\n').count();
        rendered.extend(std::iter::repeat('\n').take(newlines));
        last = range.end;
    }
    rendered.push_str(&source[last..]);

    let elisions: Vec<Elision> = cuts.into_iter().map(|(_, e)| e).collect();
    for e in &elisions {
        tracing::debug!(kind = ?e.kind, line = e.line, text = %e.text, "elided statement");
    }

    let module = ParsedModule::parse(&rendered).map_err(|e| ProbeError::Neutralize(e.to_string()))?;
    Ok(NeutralizedProgram { module, elisions })
}

fn elision(module: &ParsedModule, node: Node<'_>, kind: ElisionKind) -> Elision {
    Elision {
        kind,
        line: node.start_position().row + 1,
        text: module
            .text(node)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string(),
    }
}

fn top_level_kind(
    module: &ParsedModule,
    stmt: Node<'_>,
    rules: &NeutralizerRules,
) -> Option<ElisionKind> {
    match stmt.kind() {
        "if_statement" if is_entry_point_guard(module, stmt) => Some(ElisionKind::EntryPointGuard),
        "while_statement" => Some(ElisionKind::BlockingLoop),
        "expression_statement" if is_blocking_call(module, stmt, rules) => {
            Some(ElisionKind::BlockingCall)
        }
        _ => None,
    }
}

/// Collect every `while` below `node`, without descending into one.
fn collect_loops(module: &ParsedModule, node: Node<'_>, cuts: &mut Vec<(Range<usize>, Elision)>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "while_statement" {
            cuts.push((child.byte_range(), elision(module, child, ElisionKind::BlockingLoop)));
        } else {
            collect_loops(module, child, cuts);
        }
    }
}

fn strip_parens(mut node: Node<'_>) -> Node<'_> {
    while node.kind() == "parenthesized_expression" {
        match node.named_child(0) {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

fn is_entry_point_guard(module: &ParsedModule, stmt: Node<'_>) -> bool {
    let Some(condition) = stmt.child_by_field_name("condition") else {
        return false;
    };
    let condition = strip_parens(condition);
    if condition.kind() != "comparison_operator" {
        return false;
    }
    let mut cursor = condition.walk();
    let found = condition
        .named_children(&mut cursor)
        .any(|operand| {
            let operand = strip_parens(operand);
            operand.kind() == "identifier" && module.text(operand) == "__name__"
        });
    found
}

fn is_blocking_call(module: &ParsedModule, stmt: Node<'_>, rules: &NeutralizerRules) -> bool {
    if stmt.named_child_count() != 1 {
        return false;
    }
    let Some(call) = stmt.named_child(0) else {
        return false;
    };
    if call.kind() != "call" {
        return false;
    }
    let Some(function) = call.child_by_field_name("function") else {
        return false;
    };
    match function.kind() {
        "identifier" => {
            let name = module.text(function);
            rules.blocking_functions.iter().any(|f| f == name)
        }
        "attribute" => function
            .child_by_field_name("attribute")
            .map(|attr| {
                let name = module.text(attr);
                rules.blocking_methods.iter().any(|m| m == name)
            })
            .unwrap_or(false),
        _ => false,
    }
}

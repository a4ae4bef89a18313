//! Binding from grammar-rule names to AST constructors.
//!
//! The parser collects the surviving items of each production (child nodes,
//! operator tokens, raw keyword text) and hands them to [`reduce`] together
//! with the rule's name. A static registry maps the name to a constructor;
//! the name `bin_op` is special-cased as a left fold over an alternating
//! node/operator list. A name with no registered constructor leaves its
//! items untransformed and the enclosing rule interprets them (the `comp_op`
//! production relies on this: its statement list passes through unchanged).

use crate::ast::{BinOp, Node, TypeSpec, Value};
use crate::span::Span;

/// A surviving item of a grammar production.
#[derive(Clone, Debug)]
pub enum SynItem {
    Node(Node),
    Op(BinOp),
    /// Raw token text: a literal lexeme or a type keyword.
    Word(String),
}

impl SynItem {
    fn into_node(self) -> Node {
        match self {
            SynItem::Node(node) => node,
            // The parser never reduces a rule with non-node items in node
            // position; recover with an empty statement list.
            _ => empty_stmt_list(),
        }
    }
}

pub type Constructor = fn(Vec<SynItem>, Span) -> Node;

const RULES: &[(&str, Constructor)] = &[
    ("literal", build_literal),
    ("ident", build_ident),
    ("array_ident", build_array_ident),
    ("ident_list", build_ident_list),
    ("type_spec", build_type_spec),
    ("var_decl", build_var_decl),
    ("array_decl", build_array_decl),
    ("vars_decl", build_vars_decl),
    ("assign", build_assign),
    ("call", build_call),
    ("if", build_if),
    ("while", build_while),
    ("repeat", build_repeat),
    ("for", build_for),
    ("stmt_list", build_stmt_list),
    ("body", build_body),
    ("params", build_params),
    ("procedure_decl", build_procedure_decl),
    ("function_decl", build_function_decl),
    ("program", build_program),
];

/// Look up the constructor registered for a rule name.
pub fn constructor(rule: &str) -> Option<Constructor> {
    RULES
        .iter()
        .find(|(name, _)| *name == rule)
        .map(|(_, build)| *build)
}

/// Apply a rule's constructor to its items. `bin_op` folds; registered
/// names collapse to a single node; unknown names pass through untouched.
pub fn reduce(rule: &str, items: Vec<SynItem>, span: Span) -> Vec<SynItem> {
    if rule == "bin_op" {
        return vec![SynItem::Node(fold_bin_op(items, span))];
    }
    match constructor(rule) {
        Some(build) => vec![SynItem::Node(build(items, span))],
        None => items,
    }
}

/// Left-fold `(x, op1, y, op2, z, …)` into `BinOp(op2, BinOp(op1, x, y), z)`.
/// A single-item list is already a node and folds to itself.
fn fold_bin_op(items: Vec<SynItem>, span: Span) -> Node {
    let mut iter = items.into_iter();
    let mut node = match iter.next() {
        Some(item) => item.into_node(),
        None => return empty_stmt_list(),
    };
    while let Some(op_item) = iter.next() {
        let op = match op_item {
            SynItem::Op(op) => op,
            _ => break,
        };
        let rhs = match iter.next() {
            Some(item) => item.into_node(),
            None => break,
        };
        node = Node::BinOp {
            op,
            lhs: Box::new(node),
            rhs: Box::new(rhs),
            span,
        };
    }
    node
}

fn empty_stmt_list() -> Node {
    Node::StmtList {
        stmts: Vec::new(),
        span: Span::dummy(),
    }
}

// --- Constructors ---

/// Decode a literal lexeme into its dynamic value, mirroring the source
/// forms: `True`/`False`, quoted strings (escapes resolved, lexeme kept
/// verbatim), integers, and fractional/exponent numbers.
fn build_literal(items: Vec<SynItem>, span: Span) -> Node {
    let lexeme = match items.into_iter().next() {
        Some(SynItem::Word(text)) => text,
        _ => "0".to_string(),
    };
    let value = decode_literal(&lexeme);
    Node::Literal {
        lexeme,
        value,
        span,
    }
}

fn decode_literal(lexeme: &str) -> Value {
    if lexeme == "True" {
        return Value::Bool(true);
    }
    if lexeme == "False" {
        return Value::Bool(false);
    }
    if lexeme.starts_with('"') {
        return Value::Str(unescape(lexeme.trim_matches('"')));
    }
    if let Ok(n) = lexeme.parse::<i64>() {
        return Value::Int(n);
    }
    match lexeme.parse::<f64>() {
        Ok(x) => Value::Real(x),
        Err(_) => Value::Int(0),
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn build_ident(items: Vec<SynItem>, span: Span) -> Node {
    let name = match items.into_iter().next() {
        Some(SynItem::Word(text)) => text,
        _ => "_error_".to_string(),
    };
    Node::Ident { name, span }
}

fn build_array_ident(items: Vec<SynItem>, span: Span) -> Node {
    let mut iter = items.into_iter();
    let name = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let subscript = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    Node::ArrayIdent {
        name: Box::new(name),
        subscript: Box::new(subscript),
        span,
    }
}

fn build_ident_list(items: Vec<SynItem>, span: Span) -> Node {
    Node::IdentList {
        idents: items.into_iter().map(SynItem::into_node).collect(),
        span,
    }
}

fn build_type_spec(items: Vec<SynItem>, span: Span) -> Node {
    let ty = match items.into_iter().next() {
        Some(SynItem::Word(text)) => TypeSpec::from_name(&text).unwrap_or(TypeSpec::Integer),
        _ => TypeSpec::Integer,
    };
    Node::TypeSpec { ty, span }
}

fn build_var_decl(items: Vec<SynItem>, span: Span) -> Node {
    let mut iter = items.into_iter();
    let idents = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let ty = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    Node::VarDecl {
        idents: Box::new(idents),
        ty: Box::new(ty),
        span,
    }
}

fn build_array_decl(items: Vec<SynItem>, span: Span) -> Node {
    let mut iter = items.into_iter();
    let idents = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let from = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let to = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let ty = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    Node::ArrayDecl {
        idents: Box::new(idents),
        from: Box::new(from),
        to: Box::new(to),
        ty: Box::new(ty),
        span,
    }
}

fn build_vars_decl(items: Vec<SynItem>, span: Span) -> Node {
    Node::VarsDecl {
        decls: items.into_iter().map(SynItem::into_node).collect(),
        span,
    }
}

fn build_assign(items: Vec<SynItem>, span: Span) -> Node {
    let mut iter = items.into_iter();
    let target = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let value = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    Node::Assign {
        target: Box::new(target),
        value: Box::new(value),
        span,
    }
}

fn build_call(items: Vec<SynItem>, span: Span) -> Node {
    let mut iter = items.into_iter();
    let callee = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    Node::Call {
        callee: Box::new(callee),
        args: iter.map(SynItem::into_node).collect(),
        span,
    }
}

fn build_if(items: Vec<SynItem>, span: Span) -> Node {
    let mut iter = items.into_iter();
    let cond = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let then_stmt = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let else_stmt = iter.next().map(|item| Box::new(item.into_node()));
    Node::If {
        cond: Box::new(cond),
        then_stmt: Box::new(then_stmt),
        else_stmt,
        span,
    }
}

fn build_while(items: Vec<SynItem>, span: Span) -> Node {
    let mut iter = items.into_iter();
    let cond = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let body = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    Node::While {
        cond: Box::new(cond),
        body: Box::new(body),
        span,
    }
}

fn build_repeat(items: Vec<SynItem>, span: Span) -> Node {
    let mut iter = items.into_iter();
    let body = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let cond = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    Node::Repeat {
        body: Box::new(body),
        cond: Box::new(cond),
        span,
    }
}

fn build_for(items: Vec<SynItem>, span: Span) -> Node {
    let mut iter = items.into_iter();
    let init = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let to = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let body = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    Node::For {
        init: Box::new(init),
        to: Box::new(to),
        body: Box::new(body),
        span,
    }
}

fn build_stmt_list(items: Vec<SynItem>, span: Span) -> Node {
    Node::StmtList {
        stmts: items.into_iter().map(SynItem::into_node).collect(),
        span,
    }
}

fn build_body(items: Vec<SynItem>, span: Span) -> Node {
    let stmts = items
        .into_iter()
        .next()
        .map(SynItem::into_node)
        .unwrap_or_else(empty_stmt_list);
    Node::Body {
        stmts: Box::new(stmts),
        span,
    }
}

fn build_params(items: Vec<SynItem>, span: Span) -> Node {
    Node::Params {
        decls: items.into_iter().map(SynItem::into_node).collect(),
        span,
    }
}

/// `procedure_decl` receives 3 or 4 items depending on whether a parameter
/// list was written.
fn build_procedure_decl(items: Vec<SynItem>, span: Span) -> Node {
    let with_params = items.len() == 4;
    let mut iter = items.into_iter();
    let name = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let params = if with_params {
        iter.next().map(|item| Box::new(item.into_node()))
    } else {
        None
    };
    let vars = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let body = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    Node::ProcedureDecl {
        name: Box::new(name),
        params,
        vars: Box::new(vars),
        body: Box::new(body),
        span,
    }
}

/// `function_decl` receives 4 or 5 items; the return type always precedes
/// the local declarations.
fn build_function_decl(items: Vec<SynItem>, span: Span) -> Node {
    let with_params = items.len() == 5;
    let mut iter = items.into_iter();
    let name = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let params = if with_params {
        iter.next().map(|item| Box::new(item.into_node()))
    } else {
        None
    };
    let ret = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let vars = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let body = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    Node::FunctionDecl {
        name: Box::new(name),
        params,
        ret: Box::new(ret),
        vars: Box::new(vars),
        body: Box::new(body),
        span,
    }
}

fn build_program(items: Vec<SynItem>, span: Span) -> Node {
    let mut iter = items.into_iter();
    let name = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let vars = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    let body = iter.next().map(SynItem::into_node).unwrap_or_else(empty_stmt_list);
    Node::Program {
        name: Box::new(name),
        vars: Box::new(vars),
        body: Box::new(body),
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> SynItem {
        SynItem::Node(Node::Ident {
            name: name.to_string(),
            span: Span::dummy(),
        })
    }

    #[test]
    fn test_bin_op_left_fold() {
        // a + b - c folds to ((a + b) - c)
        let items = vec![
            ident("a"),
            SynItem::Op(BinOp::Add),
            ident("b"),
            SynItem::Op(BinOp::Sub),
            ident("c"),
        ];
        let reduced = reduce("bin_op", items, Span::dummy());
        assert_eq!(reduced.len(), 1);
        let node = match &reduced[0] {
            SynItem::Node(node) => node,
            other => panic!("expected node, got {:?}", other),
        };
        match node {
            Node::BinOp { op, lhs, rhs, .. } => {
                assert_eq!(*op, BinOp::Sub);
                assert_eq!(rhs.label(), "c");
                match lhs.as_ref() {
                    Node::BinOp { op, lhs, rhs, .. } => {
                        assert_eq!(*op, BinOp::Add);
                        assert_eq!(lhs.label(), "a");
                        assert_eq!(rhs.label(), "b");
                    }
                    other => panic!("expected inner BinOp, got {:?}", other),
                }
            }
            other => panic!("expected BinOp, got {:?}", other),
        }
    }

    #[test]
    fn test_bin_op_single_operand_is_identity() {
        let reduced = reduce("bin_op", vec![ident("x")], Span::dummy());
        assert_eq!(reduced.len(), 1);
        match &reduced[0] {
            SynItem::Node(Node::Ident { name, .. }) => assert_eq!(name, "x"),
            other => panic!("expected the operand itself, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_rule_passes_items_through() {
        let items = vec![ident("a"), ident("b")];
        let reduced = reduce("comp_op", items, Span::dummy());
        assert_eq!(reduced.len(), 2, "unregistered rules must not collapse");
    }

    #[test]
    fn test_literal_decoding() {
        assert_eq!(decode_literal("42"), Value::Int(42));
        assert_eq!(decode_literal("-7"), Value::Int(-7));
        assert_eq!(decode_literal("3.5"), Value::Real(3.5));
        assert_eq!(decode_literal("1e3"), Value::Real(1000.0));
        assert_eq!(decode_literal("True"), Value::Bool(true));
        assert_eq!(decode_literal("False"), Value::Bool(false));
        assert_eq!(
            decode_literal("\"hi\\\"x\""),
            Value::Str("hi\"x".to_string())
        );
    }

    #[test]
    fn test_registry_covers_every_named_rule() {
        for rule in [
            "literal",
            "ident",
            "array_ident",
            "ident_list",
            "type_spec",
            "var_decl",
            "array_decl",
            "vars_decl",
            "assign",
            "call",
            "if",
            "while",
            "repeat",
            "for",
            "stmt_list",
            "body",
            "params",
            "procedure_decl",
            "function_decl",
            "program",
        ] {
            assert!(constructor(rule).is_some(), "missing constructor: {rule}");
        }
        assert!(constructor("comp_op").is_none());
    }

    #[test]
    fn test_function_decl_arity_dispatch() {
        // Without params: name, ret, vars, body
        let items = vec![
            ident("f"),
            SynItem::Node(Node::TypeSpec {
                ty: TypeSpec::Integer,
                span: Span::dummy(),
            }),
            SynItem::Node(Node::VarsDecl {
                decls: Vec::new(),
                span: Span::dummy(),
            }),
            SynItem::Node(Node::Body {
                stmts: Box::new(Node::StmtList {
                    stmts: Vec::new(),
                    span: Span::dummy(),
                }),
                span: Span::dummy(),
            }),
        ];
        match build_function_decl(items, Span::dummy()) {
            Node::FunctionDecl { params, .. } => assert!(params.is_none()),
            other => panic!("expected FunctionDecl, got {:?}", other),
        }
    }
}

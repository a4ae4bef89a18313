use crate::span::Span;

/// Binary operators, in the order of the expression grammar layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,        // +
    Sub,        // -
    Mul,        // *
    Division,   // /
    Div,        // div
    Mod,        // mod
    Ge,         // >=
    Le,         // <=
    Ne,         // !=
    Eq,         // ==
    Gt,         // >
    Lt,         // <
    LogicalAnd, // &&
    LogicalOr,  // ||
}

impl BinOp {
    /// Display form. Equality and inequality keep their Pascal spellings
    /// (`=` / `<>`) even though the grammar reads `==` / `!=`.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Division => "/",
            BinOp::Div => "div",
            BinOp::Mod => "mod",
            BinOp::Ge => ">=",
            BinOp::Le => "<=",
            BinOp::Ne => "<>",
            BinOp::Eq => "=",
            BinOp::Gt => ">",
            BinOp::Lt => "<",
            BinOp::LogicalAnd => "and",
            BinOp::LogicalOr => "or",
        }
    }

    /// Lowercased operator name, used as the `if_icmp` branch suffix.
    pub fn branch_suffix(&self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Division => "division",
            BinOp::Div => "div",
            BinOp::Mod => "mod",
            BinOp::Ge => "ge",
            BinOp::Le => "le",
            BinOp::Ne => "ne",
            BinOp::Eq => "eq",
            BinOp::Gt => "gt",
            BinOp::Lt => "lt",
            BinOp::LogicalAnd => "logical_and",
            BinOp::LogicalOr => "logical_or",
        }
    }
}

/// The decoded value of a literal. The dynamic category names feed the
/// type aliasing of the semantic walk (int→integer, str→char, bool→boolean).
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Real(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Real(_) => "float",
            Value::Str(_) => "str",
            Value::Bool(_) => "bool",
        }
    }
}

/// The three built-in types of the language.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeSpec {
    Integer,
    Char,
    Boolean,
}

impl TypeSpec {
    pub fn name(&self) -> &'static str {
        match self {
            TypeSpec::Integer => "integer",
            TypeSpec::Char => "char",
            TypeSpec::Boolean => "boolean",
        }
    }

    pub fn from_name(name: &str) -> Option<TypeSpec> {
        match name.to_ascii_lowercase().as_str() {
            "integer" => Some(TypeSpec::Integer),
            "char" => Some(TypeSpec::Char),
            "boolean" => Some(TypeSpec::Boolean),
            _ => None,
        }
    }
}

/// The AST: a closed sum over every syntactic form. Child nodes are stored
/// as `Node` so that one `children()` enumeration serves the semantic walk
/// and the tree printer alike; the parser guarantees the shapes (e.g. an
/// `ArrayIdent` name is always an `Ident`).
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Literal {
        lexeme: String,
        value: Value,
        span: Span,
    },
    Ident {
        name: String,
        span: Span,
    },
    ArrayIdent {
        name: Box<Node>,
        subscript: Box<Node>,
        span: Span,
    },
    BinOp {
        op: BinOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
        span: Span,
    },
    IdentList {
        idents: Vec<Node>,
        span: Span,
    },
    TypeSpec {
        ty: TypeSpec,
        span: Span,
    },
    VarDecl {
        idents: Box<Node>,
        ty: Box<Node>,
        span: Span,
    },
    ArrayDecl {
        idents: Box<Node>,
        from: Box<Node>,
        to: Box<Node>,
        ty: Box<Node>,
        span: Span,
    },
    VarsDecl {
        decls: Vec<Node>,
        span: Span,
    },
    Assign {
        target: Box<Node>,
        value: Box<Node>,
        span: Span,
    },
    Call {
        callee: Box<Node>,
        args: Vec<Node>,
        span: Span,
    },
    If {
        cond: Box<Node>,
        then_stmt: Box<Node>,
        else_stmt: Option<Box<Node>>,
        span: Span,
    },
    While {
        cond: Box<Node>,
        body: Box<Node>,
        span: Span,
    },
    Repeat {
        body: Box<Node>,
        cond: Box<Node>,
        span: Span,
    },
    For {
        init: Box<Node>,
        to: Box<Node>,
        body: Box<Node>,
        span: Span,
    },
    StmtList {
        stmts: Vec<Node>,
        span: Span,
    },
    Body {
        stmts: Box<Node>,
        span: Span,
    },
    Params {
        decls: Vec<Node>,
        span: Span,
    },
    ProcedureDecl {
        name: Box<Node>,
        params: Option<Box<Node>>,
        vars: Box<Node>,
        body: Box<Node>,
        span: Span,
    },
    FunctionDecl {
        name: Box<Node>,
        params: Option<Box<Node>>,
        ret: Box<Node>,
        vars: Box<Node>,
        body: Box<Node>,
        span: Span,
    },
    Program {
        name: Box<Node>,
        vars: Box<Node>,
        body: Box<Node>,
        span: Span,
    },
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Literal { span, .. }
            | Node::Ident { span, .. }
            | Node::ArrayIdent { span, .. }
            | Node::BinOp { span, .. }
            | Node::IdentList { span, .. }
            | Node::TypeSpec { span, .. }
            | Node::VarDecl { span, .. }
            | Node::ArrayDecl { span, .. }
            | Node::VarsDecl { span, .. }
            | Node::Assign { span, .. }
            | Node::Call { span, .. }
            | Node::If { span, .. }
            | Node::While { span, .. }
            | Node::Repeat { span, .. }
            | Node::For { span, .. }
            | Node::StmtList { span, .. }
            | Node::Body { span, .. }
            | Node::Params { span, .. }
            | Node::ProcedureDecl { span, .. }
            | Node::FunctionDecl { span, .. }
            | Node::Program { span, .. } => *span,
        }
    }

    /// Ordered children, as drawn by the tree printer and walked by the
    /// semantic visitor.
    pub fn children(&self) -> Vec<&Node> {
        match self {
            Node::Literal { .. } | Node::Ident { .. } | Node::TypeSpec { .. } => Vec::new(),
            // ArrayIdent renders as a single leaf `name [literal]`
            Node::ArrayIdent { .. } => Vec::new(),
            Node::BinOp { lhs, rhs, .. } => vec![lhs, rhs],
            Node::IdentList { idents, .. } => idents.iter().collect(),
            Node::VarDecl { idents, ty, .. } => vec![idents, ty],
            Node::ArrayDecl {
                idents,
                from,
                to,
                ty,
                ..
            } => vec![ty, idents, from, to],
            Node::VarsDecl { decls, .. } => decls.iter().collect(),
            Node::Assign { target, value, .. } => vec![target, value],
            Node::Call { callee, args, .. } => {
                let mut cs: Vec<&Node> = vec![callee];
                cs.extend(args.iter());
                cs
            }
            Node::If {
                cond,
                then_stmt,
                else_stmt,
                ..
            } => {
                let mut cs: Vec<&Node> = vec![cond, then_stmt];
                if let Some(e) = else_stmt {
                    cs.push(e);
                }
                cs
            }
            Node::While { cond, body, .. } => vec![cond, body],
            Node::Repeat { body, cond, .. } => vec![body, cond],
            Node::For { init, to, body, .. } => vec![init, to, body],
            Node::StmtList { stmts, .. } => stmts.iter().collect(),
            Node::Body { stmts, .. } => vec![stmts],
            Node::Params { decls, .. } => decls.iter().collect(),
            Node::ProcedureDecl {
                name,
                params,
                vars,
                body,
                ..
            } => {
                let mut cs: Vec<&Node> = vec![name];
                if let Some(p) = params {
                    cs.push(p);
                }
                cs.push(vars);
                cs.push(body);
                cs
            }
            Node::FunctionDecl {
                name,
                params,
                ret,
                vars,
                body,
                ..
            } => {
                let mut cs: Vec<&Node> = vec![name];
                if let Some(p) = params {
                    cs.push(p);
                }
                cs.push(ret);
                cs.push(vars);
                cs.push(body);
                cs
            }
            Node::Program {
                name, vars, body, ..
            } => vec![name, vars, body],
        }
    }

    /// One-line label for the tree drawing.
    pub fn label(&self) -> String {
        match self {
            Node::Literal { lexeme, value, .. } => format!("{} ({})", lexeme, value.kind()),
            Node::Ident { name, .. } => name.clone(),
            Node::ArrayIdent {
                name, subscript, ..
            } => format!("{} [{}]", name.label(), subscript.label()),
            Node::BinOp { op, .. } => op.as_str().to_string(),
            Node::IdentList { .. } => "idents".to_string(),
            Node::TypeSpec { ty, .. } => ty.name().to_string(),
            Node::VarDecl { .. } => "var_dec".to_string(),
            Node::ArrayDecl { .. } => "arr_decl".to_string(),
            Node::VarsDecl { .. } => "var".to_string(),
            Node::Assign { .. } => ":=".to_string(),
            Node::Call { .. } => "call".to_string(),
            Node::If { .. } => "if".to_string(),
            Node::While { .. } => "while".to_string(),
            Node::Repeat { .. } => "repeat".to_string(),
            Node::For { .. } => "for".to_string(),
            Node::StmtList { .. } => "...".to_string(),
            Node::Body { .. } => "Body".to_string(),
            Node::Params { .. } => "params".to_string(),
            Node::ProcedureDecl { .. } => "procedure".to_string(),
            Node::FunctionDecl { .. } => "function".to_string(),
            Node::Program { .. } => "Program".to_string(),
        }
    }

    /// The identifier name, for nodes the parser guarantees to be `Ident`.
    pub fn ident_name(&self) -> &str {
        match self {
            Node::Ident { name, .. } => name,
            _ => "_error_",
        }
    }
}

/// Draw a node and its descendants as box-drawing lines (`├`, `│`, `└`).
pub fn format_tree(node: &Node) -> Vec<String> {
    let mut res = vec![node.label()];
    let children = node.children();
    let count = children.len();
    for (i, child) in children.into_iter().enumerate() {
        let (first, rest) = if i == count - 1 {
            ('└', ' ')
        } else {
            ('├', '│')
        };
        for (j, line) in format_tree(child).into_iter().enumerate() {
            let prefix = if j == 0 { first } else { rest };
            res.push(format!("{} {}", prefix, line));
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;

    fn ident(name: &str) -> Node {
        Node::Ident {
            name: name.to_string(),
            span: Span::dummy(),
        }
    }

    fn int_lit(lexeme: &str) -> Node {
        Node::Literal {
            lexeme: lexeme.to_string(),
            value: Value::Int(lexeme.parse().unwrap()),
            span: Span::dummy(),
        }
    }

    #[test]
    fn test_binop_children_ordered() {
        let node = Node::BinOp {
            op: BinOp::Add,
            lhs: Box::new(ident("a")),
            rhs: Box::new(int_lit("1")),
            span: Span::dummy(),
        };
        let children = node.children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].label(), "a");
        assert_eq!(children[1].label(), "1 (int)");
    }

    #[test]
    fn test_binop_label_keeps_pascal_spelling() {
        assert_eq!(BinOp::Eq.as_str(), "=");
        assert_eq!(BinOp::Ne.as_str(), "<>");
        assert_eq!(BinOp::LogicalAnd.as_str(), "and");
    }

    #[test]
    fn test_branch_suffix() {
        assert_eq!(BinOp::Ge.branch_suffix(), "ge");
        assert_eq!(BinOp::Lt.branch_suffix(), "lt");
        assert_eq!(BinOp::LogicalAnd.branch_suffix(), "logical_and");
    }

    #[test]
    fn test_format_tree_drawing() {
        let node = Node::Assign {
            target: Box::new(ident("a")),
            value: Box::new(Node::BinOp {
                op: BinOp::Add,
                lhs: Box::new(ident("b")),
                rhs: Box::new(int_lit("2")),
                span: Span::dummy(),
            }),
            span: Span::dummy(),
        };
        let lines = format_tree(&node);
        assert_eq!(
            lines,
            vec![
                ":=".to_string(),
                "├ a".to_string(),
                "└ +".to_string(),
                "  ├ b".to_string(),
                "  └ 2 (int)".to_string(),
            ]
        );
    }

    #[test]
    fn test_real_literal_label() {
        let node = Node::Literal {
            lexeme: "3.14".to_string(),
            value: Value::Real(3.14),
            span: Span::dummy(),
        };
        assert_eq!(node.label(), "3.14 (float)");
    }

    #[test]
    fn test_var_decl_label() {
        let node = Node::VarDecl {
            idents: Box::new(Node::IdentList {
                idents: vec![ident("a")],
                span: Span::dummy(),
            }),
            ty: Box::new(Node::TypeSpec {
                ty: TypeSpec::Integer,
                span: Span::dummy(),
            }),
            span: Span::dummy(),
        };
        assert_eq!(node.label(), "var_dec");
    }

    #[test]
    fn test_array_ident_is_leaf() {
        let node = Node::ArrayIdent {
            name: Box::new(ident("g")),
            subscript: Box::new(int_lit("5")),
            span: Span::dummy(),
        };
        assert!(node.children().is_empty());
        assert_eq!(node.label(), "g [5 (int)]");
    }
}

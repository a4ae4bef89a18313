use crate::ast::{BinOp, Node, TypeSpec};
use crate::diagnostic::Diagnostic;
use crate::lexeme::Lexeme;
use crate::rules::{self, SynItem};
use crate::span::{Span, Spanned};

const MAX_NESTING_DEPTH: u32 = 256;

/// Recursive-descent parser over the layered expression grammar. Each
/// production gathers its surviving items and hands them to the rule
/// registry (`rules::reduce`) for AST construction.
pub struct Parser {
    tokens: Vec<Spanned<Lexeme>>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
    depth: u32,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned<Lexeme>>) -> Self {
        Self {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
            depth: 0,
        }
    }

    fn enter_nesting(&mut self) -> bool {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.error_with_help(
                "nesting depth exceeded (maximum 256 levels)",
                "split deeply nested statements into procedures",
            );
            return false;
        }
        true
    }

    fn exit_nesting(&mut self) {
        self.depth -= 1;
    }

    /// Parse a whole source file. The root is always a `Program` node.
    pub fn parse_program(mut self) -> Result<Node, Vec<Diagnostic>> {
        let start = self.current_span();

        self.expect(&Lexeme::Program);
        let name = self.expect_ident();
        self.expect(&Lexeme::Semicolon);
        let vars = self.parse_vars_decl();
        let body = self.parse_body();
        self.expect(&Lexeme::Dot);
        if !self.at(&Lexeme::Eof) {
            self.error_at_current("expected end of file after program '.'");
        }

        let span = start.merge(self.prev_span());
        let program = self.collapse(
            "program",
            vec![SynItem::Node(name), SynItem::Node(vars), SynItem::Node(body)],
            span,
        );

        if !self.diagnostics.is_empty() {
            return Err(self.diagnostics);
        }
        Ok(program)
    }

    // --- Declarations ---

    fn parse_vars_decl(&mut self) -> Node {
        let start = self.current_span();
        self.expect(&Lexeme::Var);

        let mut items = Vec::new();
        loop {
            if self.at(&Lexeme::Procedure) {
                items.push(SynItem::Node(self.parse_procedure_decl()));
            } else if self.at(&Lexeme::Function) {
                items.push(SynItem::Node(self.parse_function_decl()));
            } else if matches!(self.peek(), Lexeme::Ident(_)) {
                items.push(SynItem::Node(self.parse_var_or_array_decl()));
            } else {
                break;
            }
        }

        let span = start.merge(self.prev_span());
        self.collapse("vars_decl", items, span)
    }

    /// `ident_list ':' type_spec ';'` or
    /// `ident_list ':' 'array' '[' literal '..' literal ']' 'of' type_spec ';'`.
    fn parse_var_or_array_decl(&mut self) -> Node {
        let start = self.current_span();
        let idents = self.parse_ident_list();
        self.expect(&Lexeme::Colon);

        if self.eat(&Lexeme::Array) {
            self.expect(&Lexeme::LBracket);
            let from = self.parse_literal();
            self.expect(&Lexeme::DotDot);
            let to = self.parse_literal();
            self.expect(&Lexeme::RBracket);
            self.expect(&Lexeme::Of);
            let ty = self.parse_type_spec();
            self.expect(&Lexeme::Semicolon);
            let span = start.merge(self.prev_span());
            return self.collapse(
                "array_decl",
                vec![
                    SynItem::Node(idents),
                    SynItem::Node(from),
                    SynItem::Node(to),
                    SynItem::Node(ty),
                ],
                span,
            );
        }

        let ty = self.parse_type_spec();
        self.expect(&Lexeme::Semicolon);
        let span = start.merge(self.prev_span());
        self.collapse(
            "var_decl",
            vec![SynItem::Node(idents), SynItem::Node(ty)],
            span,
        )
    }

    fn parse_ident_list(&mut self) -> Node {
        let start = self.current_span();
        let mut items = vec![SynItem::Node(self.expect_ident())];
        while self.eat(&Lexeme::Comma) {
            items.push(SynItem::Node(self.expect_ident()));
        }
        let span = start.merge(self.prev_span());
        self.collapse("ident_list", items, span)
    }

    fn parse_type_spec(&mut self) -> Node {
        let span = self.current_span();
        let name = match self.peek() {
            Lexeme::IntegerTy => "integer",
            Lexeme::CharTy => "char",
            Lexeme::BooleanTy => "boolean",
            _ => {
                self.error_with_help(
                    &format!("expected type, found {}", self.peek().description()),
                    "valid types are integer, char, and boolean",
                );
                return Node::TypeSpec {
                    ty: TypeSpec::Integer,
                    span,
                };
            }
        };
        self.advance();
        self.collapse("type_spec", vec![SynItem::Word(name.to_string())], span)
    }

    /// `(ident_list ':' type_spec ';')* ident_list ':' type_spec` — one
    /// `var_decl` item per group, the final group without a semicolon.
    fn parse_params(&mut self) -> Node {
        let start = self.current_span();
        let mut items = Vec::new();
        loop {
            let group_start = self.current_span();
            let idents = self.parse_ident_list();
            self.expect(&Lexeme::Colon);
            let ty = self.parse_type_spec();
            let group_span = group_start.merge(self.prev_span());
            items.push(SynItem::Node(self.collapse(
                "var_decl",
                vec![SynItem::Node(idents), SynItem::Node(ty)],
                group_span,
            )));
            if !self.eat(&Lexeme::Semicolon) {
                break;
            }
        }
        let span = start.merge(self.prev_span());
        self.collapse("params", items, span)
    }

    fn parse_procedure_decl(&mut self) -> Node {
        let start = self.current_span();
        self.expect(&Lexeme::Procedure);
        let name = self.expect_ident();

        let mut items = vec![SynItem::Node(name)];
        if self.eat(&Lexeme::LParen) {
            items.push(SynItem::Node(self.parse_params()));
            self.expect(&Lexeme::RParen);
        }
        self.expect(&Lexeme::Semicolon);

        items.push(SynItem::Node(self.parse_vars_decl()));
        items.push(SynItem::Node(self.parse_body()));
        self.expect(&Lexeme::Semicolon);

        let span = start.merge(self.prev_span());
        self.collapse("procedure_decl", items, span)
    }

    fn parse_function_decl(&mut self) -> Node {
        let start = self.current_span();
        self.expect(&Lexeme::Function);
        let name = self.expect_ident();

        let mut items = vec![SynItem::Node(name)];
        if self.eat(&Lexeme::LParen) {
            items.push(SynItem::Node(self.parse_params()));
            self.expect(&Lexeme::RParen);
        }
        self.expect(&Lexeme::Semicolon);

        let vars = self.parse_vars_decl();

        // Return type, written `: type_spec` after the local declarations.
        // Defaults to integer when omitted.
        let ret = if self.eat(&Lexeme::Colon) {
            self.parse_type_spec()
        } else {
            Node::TypeSpec {
                ty: TypeSpec::Integer,
                span: self.current_span(),
            }
        };

        items.push(SynItem::Node(ret));
        items.push(SynItem::Node(vars));
        items.push(SynItem::Node(self.parse_body()));
        self.expect(&Lexeme::Semicolon);

        let span = start.merge(self.prev_span());
        self.collapse("function_decl", items, span)
    }

    // --- Statements ---

    fn parse_body(&mut self) -> Node {
        let start = self.current_span();
        self.expect(&Lexeme::Begin);
        let stmts = self.parse_stmt_list();
        self.expect(&Lexeme::End);
        let span = start.merge(self.prev_span());
        self.collapse("body", vec![SynItem::Node(stmts)], span)
    }

    /// `'begin' stmt_list 'end' ';'`. The rule has no constructor of its
    /// own: the statement list passes through `reduce` untransformed and
    /// becomes the statement.
    fn parse_comp_op(&mut self) -> Node {
        let start = self.current_span();
        self.expect(&Lexeme::Begin);
        let stmts = self.parse_stmt_list();
        self.expect(&Lexeme::End);
        self.expect(&Lexeme::Semicolon);
        let span = start.merge(self.prev_span());
        let mut items = rules::reduce("comp_op", vec![SynItem::Node(stmts)], span);
        match items.pop() {
            Some(SynItem::Node(node)) => node,
            _ => self.empty_stmt_list(),
        }
    }

    fn parse_stmt_list(&mut self) -> Node {
        let start = self.current_span();
        let mut items = Vec::new();
        loop {
            match self.peek() {
                Lexeme::If
                | Lexeme::For
                | Lexeme::While
                | Lexeme::Repeat
                | Lexeme::Begin
                | Lexeme::Ident(_) => {
                    items.push(SynItem::Node(self.parse_stmt()));
                    while self.eat(&Lexeme::Semicolon) {}
                }
                _ => break,
            }
        }
        let span = start.merge(self.prev_span());
        self.collapse("stmt_list", items, span)
    }

    fn parse_stmt(&mut self) -> Node {
        if !self.enter_nesting() {
            // The nesting error is already recorded; abandon the rest.
            while !self.at(&Lexeme::Eof) {
                self.advance();
            }
            return self.empty_stmt_list();
        }

        let node = match self.peek() {
            Lexeme::If => self.parse_if(),
            Lexeme::For => self.parse_for(),
            Lexeme::While => self.parse_while(),
            Lexeme::Repeat => self.parse_repeat(),
            Lexeme::Begin => self.parse_comp_op(),
            _ => {
                let stmt = self.parse_simple_stmt();
                self.expect(&Lexeme::Semicolon);
                stmt
            }
        };

        self.exit_nesting();
        node
    }

    /// `assign | call` — an identifier followed by `(` is a call, by `[`
    /// an array assignment, otherwise a scalar assignment.
    fn parse_simple_stmt(&mut self) -> Node {
        let start = self.current_span();
        let ident = self.expect_ident();

        if self.at(&Lexeme::LParen) {
            return self.parse_call_args(ident, start);
        }

        let target = if self.at(&Lexeme::LBracket) {
            self.parse_array_subscript(ident, start)
        } else {
            ident
        };

        self.expect(&Lexeme::Assign);
        let value = self.parse_expr();
        let span = start.merge(self.prev_span());
        self.collapse(
            "assign",
            vec![SynItem::Node(target), SynItem::Node(value)],
            span,
        )
    }

    fn parse_if(&mut self) -> Node {
        let start = self.current_span();
        self.expect(&Lexeme::If);
        self.expect(&Lexeme::LParen);
        let cond = self.parse_expr();
        self.expect(&Lexeme::RParen);
        self.expect(&Lexeme::Then);
        let then_stmt = self.parse_stmt();

        let mut items = vec![SynItem::Node(cond), SynItem::Node(then_stmt)];
        if self.eat(&Lexeme::Else) {
            items.push(SynItem::Node(self.parse_stmt()));
        }

        let span = start.merge(self.prev_span());
        self.collapse("if", items, span)
    }

    fn parse_while(&mut self) -> Node {
        let start = self.current_span();
        self.expect(&Lexeme::While);
        self.expect(&Lexeme::LParen);
        let cond = self.parse_expr();
        self.expect(&Lexeme::RParen);
        self.expect(&Lexeme::Do);
        let body = self.parse_stmt();
        let span = start.merge(self.prev_span());
        self.collapse(
            "while",
            vec![SynItem::Node(cond), SynItem::Node(body)],
            span,
        )
    }

    fn parse_repeat(&mut self) -> Node {
        let start = self.current_span();
        self.expect(&Lexeme::Repeat);
        let body = self.parse_stmt_list();
        self.expect(&Lexeme::Until);
        self.expect(&Lexeme::LParen);
        let cond = self.parse_expr();
        self.expect(&Lexeme::RParen);
        let span = start.merge(self.prev_span());
        self.collapse(
            "repeat",
            vec![SynItem::Node(body), SynItem::Node(cond)],
            span,
        )
    }

    /// `'for' '(' assign 'to' literal ')' 'do' (stmt | ';')`.
    fn parse_for(&mut self) -> Node {
        let start = self.current_span();
        self.expect(&Lexeme::For);
        self.expect(&Lexeme::LParen);

        let init_start = self.current_span();
        let target = self.expect_ident();
        self.expect(&Lexeme::Assign);
        let value = self.parse_expr();
        let init_span = init_start.merge(self.prev_span());
        let init = self.collapse(
            "assign",
            vec![SynItem::Node(target), SynItem::Node(value)],
            init_span,
        );

        self.expect(&Lexeme::To);
        let to = self.parse_literal();
        self.expect(&Lexeme::RParen);
        self.expect(&Lexeme::Do);

        // An empty loop body is written as a bare semicolon.
        let body = if self.eat(&Lexeme::Semicolon) {
            self.empty_stmt_list()
        } else {
            self.parse_stmt()
        };

        let span = start.merge(self.prev_span());
        self.collapse(
            "for",
            vec![SynItem::Node(init), SynItem::Node(to), SynItem::Node(body)],
            span,
        )
    }

    // --- Expressions (layered precedence, tightest first) ---

    fn parse_expr(&mut self) -> Node {
        if !self.enter_nesting() {
            while !self.at(&Lexeme::Eof) {
                self.advance();
            }
            return self.empty_stmt_list();
        }
        let node = self.parse_logical_or();
        self.exit_nesting();
        node
    }

    fn parse_logical_or(&mut self) -> Node {
        let start = self.current_span();
        let mut items = vec![SynItem::Node(self.parse_logical_and())];
        while self.eat(&Lexeme::PipePipe) {
            items.push(SynItem::Op(BinOp::LogicalOr));
            items.push(SynItem::Node(self.parse_logical_and()));
        }
        self.collapse_bin_op(items, start)
    }

    fn parse_logical_and(&mut self) -> Node {
        let start = self.current_span();
        let mut items = vec![SynItem::Node(self.parse_compare2())];
        while self.eat(&Lexeme::AmpAmp) {
            items.push(SynItem::Op(BinOp::LogicalAnd));
            items.push(SynItem::Node(self.parse_compare2()));
        }
        self.collapse_bin_op(items, start)
    }

    /// `==` / `!=` — at most one per level (non-associative).
    fn parse_compare2(&mut self) -> Node {
        let start = self.current_span();
        let mut items = vec![SynItem::Node(self.parse_compare1())];
        let op = match self.peek() {
            Lexeme::EqEq => Some(BinOp::Eq),
            Lexeme::BangEq => Some(BinOp::Ne),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            items.push(SynItem::Op(op));
            items.push(SynItem::Node(self.parse_compare1()));
        }
        self.collapse_bin_op(items, start)
    }

    /// `>=` / `<=` / `>` / `<` — at most one per level.
    fn parse_compare1(&mut self) -> Node {
        let start = self.current_span();
        let mut items = vec![SynItem::Node(self.parse_add())];
        let op = match self.peek() {
            Lexeme::Ge => Some(BinOp::Ge),
            Lexeme::Le => Some(BinOp::Le),
            Lexeme::Gt => Some(BinOp::Gt),
            Lexeme::Lt => Some(BinOp::Lt),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            items.push(SynItem::Op(op));
            items.push(SynItem::Node(self.parse_add()));
        }
        self.collapse_bin_op(items, start)
    }

    fn parse_add(&mut self) -> Node {
        let start = self.current_span();
        let mut items = vec![SynItem::Node(self.parse_mult())];
        loop {
            let op = match self.peek() {
                Lexeme::Plus => BinOp::Add,
                Lexeme::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            items.push(SynItem::Op(op));
            items.push(SynItem::Node(self.parse_mult()));
        }
        self.collapse_bin_op(items, start)
    }

    fn parse_mult(&mut self) -> Node {
        let start = self.current_span();
        let mut items = vec![SynItem::Node(self.parse_group())];
        loop {
            let op = match self.peek() {
                Lexeme::Star => BinOp::Mul,
                Lexeme::Slash => BinOp::Division,
                Lexeme::Mod => BinOp::Mod,
                Lexeme::Div => BinOp::Div,
                _ => break,
            };
            self.advance();
            items.push(SynItem::Op(op));
            items.push(SynItem::Node(self.parse_group()));
        }
        self.collapse_bin_op(items, start)
    }

    /// `literal | call | array_ident | ident | '(' expr ')'`.
    fn parse_group(&mut self) -> Node {
        let start = self.current_span();
        match self.peek().clone() {
            Lexeme::Number(_)
            | Lexeme::Str(_)
            | Lexeme::True
            | Lexeme::False => self.parse_literal(),
            // A sign directly before a number is part of the literal
            Lexeme::Minus | Lexeme::Plus
                if matches!(self.peek_next(), Lexeme::Number(_)) =>
            {
                self.parse_literal()
            }
            Lexeme::LParen => {
                self.advance();
                let expr = self.parse_expr();
                self.expect(&Lexeme::RParen);
                expr
            }
            Lexeme::Ident(_) => {
                let ident = self.expect_ident();
                if self.at(&Lexeme::LParen) {
                    self.parse_call_args(ident, start)
                } else if self.at(&Lexeme::LBracket) {
                    self.parse_array_subscript(ident, start)
                } else {
                    ident
                }
            }
            other => {
                self.error_with_help(
                    &format!("expected expression, found {}", other.description()),
                    "expressions are literals, identifiers, calls, and operators",
                );
                self.advance();
                self.collapse("literal", vec![SynItem::Word("0".to_string())], start)
            }
        }
    }

    /// `ident '(' [expr (',' expr)*] ')'` — the identifier node is already
    /// parsed by the caller.
    fn parse_call_args(&mut self, callee: Node, start: Span) -> Node {
        self.expect(&Lexeme::LParen);
        let mut items = vec![SynItem::Node(callee)];
        if !self.at(&Lexeme::RParen) {
            items.push(SynItem::Node(self.parse_expr()));
            while self.eat(&Lexeme::Comma) {
                items.push(SynItem::Node(self.parse_expr()));
            }
        }
        self.expect(&Lexeme::RParen);
        let span = start.merge(self.prev_span());
        self.collapse("call", items, span)
    }

    /// `ident '[' literal ']'` — the subscript is syntactically a literal.
    fn parse_array_subscript(&mut self, name: Node, start: Span) -> Node {
        self.expect(&Lexeme::LBracket);
        let subscript = self.parse_literal();
        self.expect(&Lexeme::RBracket);
        let span = start.merge(self.prev_span());
        self.collapse(
            "array_ident",
            vec![SynItem::Node(name), SynItem::Node(subscript)],
            span,
        )
    }

    fn parse_literal(&mut self) -> Node {
        let start = self.current_span();

        let sign = match self.peek() {
            Lexeme::Minus => {
                self.advance();
                "-"
            }
            Lexeme::Plus => {
                self.advance();
                "+"
            }
            _ => "",
        };

        let lexeme = match self.peek().clone() {
            Lexeme::Number(text) => {
                self.advance();
                format!("{}{}", sign, text)
            }
            Lexeme::Str(text) if sign.is_empty() => {
                self.advance();
                text
            }
            Lexeme::True if sign.is_empty() => {
                self.advance();
                "True".to_string()
            }
            Lexeme::False if sign.is_empty() => {
                self.advance();
                "False".to_string()
            }
            other => {
                self.error_at_current(&format!(
                    "expected literal, found {}",
                    other.description()
                ));
                self.advance();
                "0".to_string()
            }
        };

        let span = start.merge(self.prev_span());
        self.collapse("literal", vec![SynItem::Word(lexeme)], span)
    }

    // --- Rule reduction helpers ---

    /// Reduce a named rule to its single constructed node.
    fn collapse(&mut self, rule: &str, items: Vec<SynItem>, span: Span) -> Node {
        let mut reduced = rules::reduce(rule, items, span);
        match reduced.pop() {
            Some(SynItem::Node(node)) if reduced.is_empty() => node,
            _ => {
                self.error_at_current(&format!("rule '{}' did not produce a node", rule));
                self.empty_stmt_list()
            }
        }
    }

    fn collapse_bin_op(&mut self, items: Vec<SynItem>, start: Span) -> Node {
        let span = start.merge(self.prev_span());
        self.collapse("bin_op", items, span)
    }

    fn empty_stmt_list(&self) -> Node {
        Node::StmtList {
            stmts: Vec::new(),
            span: self.current_span(),
        }
    }

    // --- Utility methods ---

    fn peek(&self) -> &Lexeme {
        &self.tokens[self.pos].node
    }

    fn peek_next(&self) -> &Lexeme {
        if self.pos + 1 < self.tokens.len() {
            &self.tokens[self.pos + 1].node
        } else {
            &Lexeme::Eof
        }
    }

    fn current_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn prev_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            self.current_span()
        }
    }

    fn advance(&mut self) -> &Spanned<Lexeme> {
        let tok = &self.tokens[self.pos];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, token: &Lexeme) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(token)
    }

    fn eat(&mut self, token: &Lexeme) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Lexeme) -> Span {
        if self.at(token) {
            let span = self.current_span();
            self.advance();
            span
        } else {
            self.error_at_current(&format!(
                "expected {}, found {}",
                token.description(),
                self.peek().description()
            ));
            self.current_span()
        }
    }

    fn expect_ident(&mut self) -> Node {
        if let Lexeme::Ident(name) = self.peek().clone() {
            let span = self.current_span();
            self.advance();
            self.collapse("ident", vec![SynItem::Word(name)], span)
        } else {
            self.error_at_current(&format!(
                "expected identifier, found {}",
                self.peek().description()
            ));
            Node::Ident {
                name: "_error_".to_string(),
                span: self.current_span(),
            }
        }
    }

    fn error_at_current(&mut self, msg: &str) {
        self.diagnostics
            .push(Diagnostic::error(msg.to_string(), self.current_span()));
    }

    fn error_with_help(&mut self, msg: &str, help: &str) {
        self.diagnostics.push(
            Diagnostic::error(msg.to_string(), self.current_span()).with_help(help.to_string()),
        );
    }
}

use crate::ast::{BinOp, Node, TypeSpec, Value};
use crate::diagnostic::Diagnostic;
use crate::emit::Emitter;
use crate::span::Span;
use crate::symbols::{
    ArraySymbol, BuiltinFn, FunctionSymbol, ProcedureSymbol, ScopedSymbolTable, Symbol, VarSymbol,
};

/// Operand categories of the semantic walk. Literal categories arrive
/// already aliased (int→integer, str→char, bool→boolean); `Real` covers
/// fractional/exponent literals, which belong to no operator domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Ty {
    Integer,
    Char,
    Boolean,
    Real,
}

impl Ty {
    fn of(spec: TypeSpec) -> Ty {
        match spec {
            TypeSpec::Integer => Ty::Integer,
            TypeSpec::Char => Ty::Char,
            TypeSpec::Boolean => Ty::Boolean,
        }
    }

    fn of_value(value: &Value) -> Ty {
        match value {
            Value::Int(_) => Ty::Integer,
            Value::Str(_) => Ty::Char,
            Value::Bool(_) => Ty::Boolean,
            Value::Real(_) => Ty::Real,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Ty::Integer => "integer",
            Ty::Char => "char",
            Ty::Boolean => "boolean",
            Ty::Real => "float",
        }
    }
}

fn ty_name(ty: Option<Ty>) -> &'static str {
    ty.map(|t| t.name()).unwrap_or("unknown")
}

/// The assembly type letter: integer→I, char→C, boolean→Z.
fn jtype(spec: TypeSpec) -> &'static str {
    match spec {
        TypeSpec::Integer => "I",
        TypeSpec::Char => "C",
        TypeSpec::Boolean => "Z",
    }
}

/// The lowercase opcode prefix (`iload`, `istore`, `iastore`, …).
fn jprefix(spec: TypeSpec) -> &'static str {
    match spec {
        TypeSpec::Integer => "i",
        TypeSpec::Char => "c",
        TypeSpec::Boolean => "z",
    }
}

/// `true` iff either side is unknown or both categories agree.
fn type_check(a: Option<Ty>, b: Option<Ty>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

fn bin_op_arg_ok(op: BinOp, t: Ty) -> bool {
    match op {
        BinOp::Add => matches!(t, Ty::Integer | Ty::Char),
        BinOp::Sub | BinOp::Mul | BinOp::Division | BinOp::Div | BinOp::Mod => t == Ty::Integer,
        BinOp::Ge | BinOp::Le | BinOp::Gt | BinOp::Lt => matches!(t, Ty::Integer | Ty::Char),
        BinOp::Eq | BinOp::Ne => matches!(t, Ty::Integer | Ty::Char | Ty::Boolean),
        BinOp::LogicalAnd | BinOp::LogicalOr => t == Ty::Boolean,
    }
}

fn bin_op_result(op: BinOp, t: Ty) -> Ty {
    match op {
        BinOp::Add => t,
        BinOp::Sub | BinOp::Mul | BinOp::Division | BinOp::Div | BinOp::Mod => Ty::Integer,
        _ => Ty::Boolean,
    }
}

/// The `if_icmp` suffix for a branch on a condition: the lowercased name
/// of the comparison operator, `eq` when the condition is not a binary
/// operation.
fn cond_suffix(cond: &Node) -> &'static str {
    match cond {
        Node::BinOp { op, .. } => op.branch_suffix(),
        _ => "eq",
    }
}

/// The semantic walk: one dispatch-by-variant pass that resolves names,
/// checks types, and appends instructions as it goes. The first fault
/// aborts the walk; the emitter's partial state is discarded by the caller.
pub struct SemanticAnalyzer {
    table: ScopedSymbolTable,
    emitter: Emitter,
    /// Global array initialization, spliced to the top of `main`.
    arrays_init: Vec<String>,
    prog_name: String,
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        Self {
            table: ScopedSymbolTable::new(),
            emitter: Emitter::new(),
            arrays_init: Vec::new(),
            prog_name: String::new(),
        }
    }

    /// Run the walk over a `Program` root and return the finished listing.
    pub fn run(mut self, ast: &Node) -> Result<Vec<String>, Diagnostic> {
        self.visit(ast)?;
        Ok(self.emitter.into_lines())
    }

    fn visit(&mut self, node: &Node) -> Result<Option<Ty>, Diagnostic> {
        match node {
            Node::Program { name, vars, body, .. } => self.visit_program(name, vars, body),
            Node::VarsDecl { decls, .. } => {
                for decl in decls {
                    self.visit(decl)?;
                }
                Ok(None)
            }
            Node::VarDecl { idents, ty, span } => self.visit_var_decl(idents, ty, *span),
            Node::ArrayDecl {
                idents,
                from,
                to,
                ty,
                span,
            } => self.visit_array_decl(idents, from, to, ty, *span),
            Node::Literal { lexeme, value, .. } => {
                self.emit_literal(lexeme, value);
                Ok(Some(Ty::of_value(value)))
            }
            Node::Ident { name, span } => self.visit_ident(name, *span),
            Node::ArrayIdent {
                name,
                subscript,
                span,
            } => self.visit_array_ident(name, subscript, *span),
            Node::BinOp { op, lhs, rhs, span } => self.visit_bin_op(*op, lhs, rhs, *span),
            Node::Assign {
                target,
                value,
                span,
            } => self.visit_assign(target, value, *span),
            Node::Call { callee, args, span } => self.visit_call(callee, args, *span),
            Node::If {
                cond,
                then_stmt,
                else_stmt,
                span,
            } => self.visit_if(cond, then_stmt, else_stmt.as_deref(), *span),
            Node::While { cond, body, span } => self.visit_while(cond, body, *span),
            Node::Repeat { body, cond, span } => self.visit_repeat(body, cond, *span),
            Node::For {
                init, to, body, span,
            } => self.visit_for(init, to, body, *span),
            Node::StmtList { stmts, .. } => {
                for stmt in stmts {
                    self.visit(stmt)?;
                }
                Ok(None)
            }
            Node::Body { stmts, .. } => self.visit(stmts),
            Node::ProcedureDecl {
                name,
                params,
                vars,
                body,
                span,
            } => self.visit_procedure_decl(name, params.as_deref(), vars, body, *span),
            Node::FunctionDecl {
                name,
                params,
                ret,
                vars,
                body,
                span,
            } => self.visit_function_decl(name, params.as_deref(), ret, vars, body, *span),
            // Handled by their enclosing declarations
            Node::IdentList { .. } | Node::TypeSpec { .. } | Node::Params { .. } => Ok(None),
        }
    }

    fn visit_program(
        &mut self,
        name: &Node,
        vars: &Node,
        body: &Node,
    ) -> Result<Option<Ty>, Diagnostic> {
        let prog_name = name.ident_name().to_string();
        self.prog_name = prog_name.clone();
        self.table.enter(&prog_name);

        self.emitter
            .add(format!(".class public {}", self.prog_name));
        self.emitter.add(".super java/lang/Object");

        let result = self.visit_program_inner(vars, body);
        self.table.leave();
        result
    }

    fn visit_program_inner(
        &mut self,
        vars: &Node,
        body: &Node,
    ) -> Result<Option<Ty>, Diagnostic> {
        self.visit(vars)?;

        self.emitter
            .add(".method public static main([Ljava/lang/String;)V");
        self.emitter.add(".limit stack 100");
        self.emitter.add(".limit locals 100");

        for line in std::mem::take(&mut self.arrays_init) {
            self.emitter.add(line);
        }

        self.visit(body)?;

        self.emitter.add("return");
        self.emitter.add(".end method");
        Ok(None)
    }

    fn visit_var_decl(
        &mut self,
        idents: &Node,
        ty: &Node,
        span: Span,
    ) -> Result<Option<Ty>, Diagnostic> {
        let ty = type_spec_of(ty);
        for ident in idents.children() {
            let name = ident.ident_name().to_string();
            let index = self.table.next_index();
            let is_field = self.table.current_level() == 1;
            self.define(
                Symbol::Var(VarSymbol {
                    name: name.clone(),
                    ty,
                    index,
                    is_field,
                }),
                span,
            )?;
            if is_field {
                self.emitter
                    .add(format!(".field public static {} {}", name, jtype(ty)));
            }
        }
        Ok(None)
    }

    fn visit_array_decl(
        &mut self,
        idents: &Node,
        from: &Node,
        to: &Node,
        ty: &Node,
        span: Span,
    ) -> Result<Option<Ty>, Diagnostic> {
        let ty = type_spec_of(ty);
        let (from_lexeme, from_value) = literal_parts(from);
        let (to_lexeme, to_value) = literal_parts(to);
        if !matches!(from_value, Some(Value::Int(_))) || !matches!(to_value, Some(Value::Int(_))) {
            return Err(Diagnostic::error(
                format!(
                    "Array bounds must be integer literals, got {}..{}",
                    from_lexeme, to_lexeme
                ),
                span,
            ));
        }

        for ident in idents.children() {
            let name = ident.ident_name().to_string();
            let index = self.table.next_index();
            let is_field = self.table.current_level() == 1;
            self.define(
                Symbol::Array(ArraySymbol {
                    name: name.clone(),
                    ty,
                    index,
                    is_field,
                    from: from_lexeme.clone(),
                    to: to_lexeme.clone(),
                }),
                span,
            )?;
            if is_field {
                self.emitter
                    .add(format!(".field public static {} [{}", name, jtype(ty)));
                self.arrays_init.push(format!("ldc {}", to_lexeme));
                self.arrays_init.push("newarray int".to_string());
                self.arrays_init.push(format!(
                    "putstatic {}/{} [{}",
                    self.prog_name,
                    name,
                    jtype(ty)
                ));
            }
        }
        Ok(None)
    }

    fn emit_literal(&mut self, lexeme: &str, value: &Value) {
        match value {
            Value::Bool(true) => self.emitter.add("ldc 1"),
            Value::Bool(false) => self.emitter.add("ldc 0"),
            _ => self.emitter.add(format!("ldc {}", lexeme)),
        }
    }

    fn visit_ident(&mut self, name: &str, span: Span) -> Result<Option<Ty>, Diagnostic> {
        let symbol = match self.table.lookup(name, false) {
            Some(symbol) => symbol.clone(),
            None => {
                return Err(Diagnostic::error(
                    format!("Undefined identifier '{}'", name),
                    span,
                ))
            }
        };

        let (ty, index, is_field) = match &symbol {
            Symbol::Var(v) => (v.ty, v.index, v.is_field),
            Symbol::Array(a) => (a.ty, a.index, a.is_field),
            _ => {
                return Err(Diagnostic::error(
                    format!("'{}' is not a variable", name),
                    span,
                ))
            }
        };

        if is_field {
            self.emitter.add(format!(
                "getstatic {}/{} {}",
                self.prog_name,
                name,
                jtype(ty)
            ));
        } else {
            self.emitter
                .add(format!("{}load_{}", jprefix(ty), index));
        }
        Ok(Some(Ty::of(ty)))
    }

    fn visit_array_ident(
        &mut self,
        name: &Node,
        subscript: &Node,
        span: Span,
    ) -> Result<Option<Ty>, Diagnostic> {
        let arr_name = name.ident_name().to_string();
        let symbol = match self.table.lookup(&arr_name, false) {
            Some(symbol) => symbol.clone(),
            None => {
                return Err(Diagnostic::error(
                    format!("Undefined identifier '{}'", arr_name),
                    span,
                ))
            }
        };
        let arr = match symbol {
            Symbol::Array(a) => a,
            _ => {
                return Err(Diagnostic::error(
                    format!("'{}' is not an array", arr_name),
                    span,
                ))
            }
        };

        if self.table.level_of(&arr_name) == 1 {
            self.emitter.add(format!(
                "getstatic {}/{} [{}",
                self.prog_name,
                arr_name,
                jtype(arr.ty)
            ));
            self.visit(subscript)?;
            self.emitter.add(format!("{}aload", jprefix(arr.ty)));
        }

        self.check_bounds(&arr, subscript, span)?;
        Ok(Some(Ty::of(arr.ty)))
    }

    /// A literal subscript must fall inside the declared `from..to`.
    fn check_bounds(
        &self,
        arr: &ArraySymbol,
        subscript: &Node,
        span: Span,
    ) -> Result<(), Diagnostic> {
        let (lexeme, value) = literal_parts(subscript);
        let index = match value {
            Some(Value::Int(n)) => n,
            _ => {
                return Err(Diagnostic::error(
                    format!("Array subscript must be an integer literal, got {}", lexeme),
                    span,
                ))
            }
        };
        let from: i64 = arr.from.parse().unwrap_or(0);
        let to: i64 = arr.to.parse().unwrap_or(0);
        if index < from || index > to {
            return Err(Diagnostic::error(
                format!("Out of range '{}'", index),
                span,
            )
            .with_note(format!("'{}' is declared with bounds {}..{}", arr.name, arr.from, arr.to)));
        }
        Ok(())
    }

    fn visit_bin_op(
        &mut self,
        op: BinOp,
        lhs: &Node,
        rhs: &Node,
        span: Span,
    ) -> Result<Option<Ty>, Diagnostic> {
        let t1 = self.visit(lhs)?;
        let t2 = self.visit(rhs)?;

        self.emitter.add(match op {
            BinOp::Add => "iadd",
            BinOp::Sub => "isub",
            BinOp::Division => "idiv",
            BinOp::Mul => "imul",
            BinOp::LogicalAnd => "iand",
            BinOp::LogicalOr => "ior",
            BinOp::Div => "irem",
            // Comparisons (and `mod`) have no direct opcode here; the
            // branch is emitted by the consuming if/while/repeat.
            _ => "swap",
        });

        // A node whose operands are both binary operations was already
        // checked one level down; its own category stays unknown.
        if matches!(lhs, Node::BinOp { .. }) && matches!(rhs, Node::BinOp { .. }) {
            return Ok(None);
        }

        if !type_check(t1, t2) {
            return Err(Diagnostic::error(
                format!(
                    "Incompatible types {} and {}",
                    ty_name(t1),
                    ty_name(t2)
                ),
                span,
            ));
        }

        match t1 {
            Some(t) if bin_op_arg_ok(op, t) => Ok(Some(bin_op_result(op, t))),
            _ => Err(Diagnostic::error(
                format!(
                    "Operation {} not supported for types {} and {}",
                    op.branch_suffix().to_uppercase(),
                    ty_name(t1),
                    ty_name(t2)
                ),
                span,
            )),
        }
    }

    fn visit_assign(
        &mut self,
        target: &Node,
        value: &Node,
        span: Span,
    ) -> Result<Option<Ty>, Diagnostic> {
        match target {
            Node::ArrayIdent {
                name, subscript, ..
            } => {
                let arr_name = name.ident_name().to_string();
                let symbol = match self.table.lookup(&arr_name, false) {
                    Some(symbol) => symbol.clone(),
                    None => {
                        return Err(Diagnostic::error(
                            format!("Undefined variable '{}' found", arr_name),
                            span,
                        ))
                    }
                };
                let arr = match symbol {
                    Symbol::Array(a) => a,
                    _ => {
                        return Err(Diagnostic::error(
                            format!("'{}' is not an array", arr_name),
                            span,
                        ))
                    }
                };

                self.emitter.add(format!(
                    "getstatic {}/{} [{}",
                    self.prog_name,
                    arr_name,
                    jtype(arr.ty)
                ));
                self.visit(subscript)?;
                self.check_bounds(&arr, subscript, span)?;

                let value_ty = self.visit(value)?;
                self.emitter.add(format!("{}astore", jprefix(arr.ty)));

                if !type_check(value_ty, Some(Ty::of(arr.ty))) {
                    return Err(Diagnostic::error(
                        format!("Wrong type '{}' found", arr_name),
                        span,
                    ));
                }
                Ok(None)
            }
            _ => {
                let var_name = target.ident_name().to_string();
                let symbol = match self.table.lookup(&var_name, false) {
                    Some(symbol) => symbol.clone(),
                    None => {
                        return Err(Diagnostic::error(
                            format!("Undefined variable '{}' found", var_name),
                            span,
                        ))
                    }
                };
                let var = match symbol {
                    Symbol::Var(v) => v,
                    _ => {
                        return Err(Diagnostic::error(
                            format!("'{}' is not assignable", var_name),
                            span,
                        ))
                    }
                };

                let value_ty = self.visit(value)?;

                if var.is_field {
                    self.emitter.add(format!(
                        "putstatic {}/{} {}",
                        self.prog_name,
                        var_name,
                        jtype(var.ty)
                    ));
                } else {
                    self.emitter
                        .add(format!("{}store_{}", jprefix(var.ty), var.index));
                }

                if !type_check(value_ty, Some(Ty::of(var.ty))) {
                    return Err(Diagnostic::error(
                        format!("Wrong type '{}' found", var_name),
                        span,
                    ));
                }
                Ok(None)
            }
        }
    }

    fn visit_call(
        &mut self,
        callee: &Node,
        args: &[Node],
        span: Span,
    ) -> Result<Option<Ty>, Diagnostic> {
        let func_name = callee.ident_name().to_string();
        let symbol = match self.table.lookup(&func_name, false) {
            Some(symbol) => symbol.clone(),
            None => {
                return Err(Diagnostic::error(
                    format!("Undefined function '{}'", func_name),
                    span,
                ))
            }
        };

        match symbol {
            Symbol::Builtin(BuiltinFn::Write) | Symbol::Builtin(BuiltinFn::WriteLn) => {
                self.emitter
                    .add("getstatic java/lang/System/out Ljava/io/PrintStream;");
                let mut sig = String::new();
                for arg in args {
                    let ty = self.visit(arg)?;
                    sig.push_str(match ty {
                        Some(Ty::Char) => "C",
                        Some(Ty::Boolean) => "Z",
                        _ => "I",
                    });
                }
                self.emitter.add(format!(
                    "invokevirtual java/io/PrintStream/println({})V",
                    sig
                ));
                Ok(None)
            }
            Symbol::Builtin(BuiltinFn::Read) | Symbol::Builtin(BuiltinFn::ReadLn) => {
                self.emitter
                    .add("getstatic java/lang/System/in Ljava/io/InputStream;");
                let mut sig = String::new();
                let mut stores = Vec::new();
                for arg in args {
                    let var_name = match arg {
                        Node::Ident { name, .. } => name.clone(),
                        _ => {
                            return Err(Diagnostic::error(
                                format!("'{}' argument must be a variable", func_name),
                                arg.span(),
                            ))
                        }
                    };
                    let var = match self.table.lookup(&var_name, false) {
                        Some(Symbol::Var(v)) => v.clone(),
                        Some(_) => {
                            return Err(Diagnostic::error(
                                format!("'{}' is not assignable", var_name),
                                arg.span(),
                            ))
                        }
                        None => {
                            return Err(Diagnostic::error(
                                format!("Undefined variable '{}' found", var_name),
                                arg.span(),
                            ))
                        }
                    };
                    sig.push_str(jtype(var.ty));
                    if var.is_field {
                        stores.push(format!(
                            "putstatic {}/{} {}",
                            self.prog_name,
                            var.name,
                            jtype(var.ty)
                        ));
                    } else {
                        stores.push(format!("{}store_{}", jprefix(var.ty), var.index));
                    }
                }
                self.emitter
                    .add(format!("invokevirtual java/io/InputStream/read(){}", sig));
                for store in stores {
                    self.emitter.add(store);
                }
                Ok(None)
            }
            Symbol::Procedure(ProcedureSymbol { params, .. }) => {
                self.check_arity(&func_name, args.len(), params.len(), span)?;
                for arg in args {
                    self.visit(arg)?;
                }
                let sig: String = params.iter().map(|p| jtype(p.ty)).collect();
                self.emitter.add(format!(
                    "invokestatic {}/{}({})V",
                    self.prog_name, func_name, sig
                ));
                Ok(None)
            }
            Symbol::Function(FunctionSymbol {
                params, return_ty, ..
            }) => {
                self.check_arity(&func_name, args.len(), params.len(), span)?;
                for arg in args {
                    self.visit(arg)?;
                }
                let sig: String = params.iter().map(|p| jtype(p.ty)).collect();
                self.emitter.add(format!(
                    "invokestatic {}/{}({}){}",
                    self.prog_name,
                    func_name,
                    sig,
                    jtype(return_ty)
                ));
                Ok(Some(Ty::of(return_ty)))
            }
            _ => Err(Diagnostic::error(
                format!("'{}' is not callable", func_name),
                span,
            )),
        }
    }

    fn check_arity(
        &self,
        func_name: &str,
        got: usize,
        expected: usize,
        span: Span,
    ) -> Result<(), Diagnostic> {
        if got != expected {
            return Err(Diagnostic::error(
                format!(
                    "Wrong number of parameters specified for call to '{}'",
                    func_name
                ),
                span,
            )
            .with_note(format!("expected {}, got {}", expected, got)));
        }
        Ok(())
    }

    fn visit_if(
        &mut self,
        cond: &Node,
        then_stmt: &Node,
        else_stmt: Option<&Node>,
        span: Span,
    ) -> Result<Option<Ty>, Diagnostic> {
        let cond_ty = self.visit(cond)?;
        let n = self.emitter.last_index;

        let suffix = cond_suffix(cond);
        if else_stmt.is_none() {
            self.emitter.add(format!("if_icmp{}", suffix));
        } else {
            self.emitter.add(format!("if_icmp{} else_{}", suffix, n));
        }

        if cond_ty != Some(Ty::Boolean) {
            return Err(Diagnostic::error(
                format!("Wrong type of if condition '{}'", ty_name(cond_ty)),
                span,
            ));
        }

        self.visit(then_stmt)?;
        self.emitter.add(format!("goto endif_{}", n));

        self.emitter.last_index += 1;
        if let Some(else_stmt) = else_stmt {
            self.emitter.add(format!("else_{}:", n));
            self.visit(else_stmt)?;
        }
        self.emitter.add(format!("endif_{}:", n));
        Ok(None)
    }

    fn visit_while(
        &mut self,
        cond: &Node,
        body: &Node,
        span: Span,
    ) -> Result<Option<Ty>, Diagnostic> {
        let n = self.emitter.last_index;
        self.emitter.last_index += 1;

        self.emitter.add(format!("while_{}:", n));
        let cond_ty = self.visit(cond)?;
        self.emitter
            .add(format!("if_icmp{} done_{}", cond_suffix(cond), n));

        if cond_ty != Some(Ty::Boolean) {
            return Err(Diagnostic::error(
                format!("Wrong type of while condition '{}'", ty_name(cond_ty)),
                span,
            ));
        }

        self.visit(body)?;
        self.emitter.add(format!("goto while_{}", n));
        self.emitter.add(format!("done_{}:", n));
        Ok(None)
    }

    /// Post-test loop: the body runs once before the condition is seen.
    fn visit_repeat(
        &mut self,
        body: &Node,
        cond: &Node,
        span: Span,
    ) -> Result<Option<Ty>, Diagnostic> {
        let n = self.emitter.last_index;
        self.emitter.last_index += 1;

        self.emitter.add(format!("repeat_{}:", n));
        self.visit(body)?;
        let cond_ty = self.visit(cond)?;
        self.emitter
            .add(format!("if_icmp{} repeat_{}", cond_suffix(cond), n));

        if cond_ty != Some(Ty::Boolean) {
            return Err(Diagnostic::error(
                format!("Wrong type of repeat condition '{}'", ty_name(cond_ty)),
                span,
            ));
        }
        Ok(None)
    }

    fn visit_for(
        &mut self,
        init: &Node,
        to: &Node,
        body: &Node,
        span: Span,
    ) -> Result<Option<Ty>, Diagnostic> {
        self.visit(init)?;
        let to_ty = self.visit(to)?;
        if to_ty != Some(Ty::Integer) {
            return Err(Diagnostic::error(
                format!("Wrong type of for condition '{}'", ty_name(to_ty)),
                span,
            ));
        }
        self.visit(body)?;
        Ok(None)
    }

    fn visit_procedure_decl(
        &mut self,
        name: &Node,
        params: Option<&Node>,
        vars: &Node,
        body: &Node,
        span: Span,
    ) -> Result<Option<Ty>, Diagnostic> {
        let proc_name = name.ident_name().to_string();
        let param_syms = collect_params(params);

        self.define(
            Symbol::Procedure(ProcedureSymbol {
                name: proc_name.clone(),
                params: param_syms.clone(),
            }),
            span,
        )?;

        self.table.enter(&proc_name);
        let result = self.emit_method_common(&proc_name, &param_syms, "V", vars, body, span);
        if result.is_err() {
            self.table.leave();
            return result;
        }

        self.emitter.add("return");
        self.emitter.add(".end method");
        self.table.leave();
        Ok(None)
    }

    fn visit_function_decl(
        &mut self,
        name: &Node,
        params: Option<&Node>,
        ret: &Node,
        vars: &Node,
        body: &Node,
        span: Span,
    ) -> Result<Option<Ty>, Diagnostic> {
        let func_name = name.ident_name().to_string();
        let return_ty = type_spec_of(ret);
        let param_syms = collect_params(params);

        self.define(
            Symbol::Function(FunctionSymbol {
                name: func_name.clone(),
                params: param_syms.clone(),
                return_ty,
            }),
            span,
        )?;

        self.table.enter(&func_name);
        let result =
            self.emit_method_common(&func_name, &param_syms, jtype(return_ty), vars, body, span);
        if result.is_err() {
            self.table.leave();
            return result;
        }

        // The function result is the target of the body's last assignment.
        let load = self.function_result_load(&func_name, body, span);
        let load = match load {
            Ok(load) => load,
            Err(e) => {
                self.table.leave();
                return Err(e);
            }
        };
        self.emitter.add(load);
        self.emitter.add(format!("{}return", jprefix(return_ty)));
        self.emitter.add(".end method");
        self.table.leave();
        Ok(None)
    }

    /// Shared prologue + body walk of procedure and function methods:
    /// install parameters in the fresh scope, emit the method header with
    /// the computed signature, and visit declarations and statements.
    fn emit_method_common(
        &mut self,
        method_name: &str,
        param_syms: &[VarSymbol],
        return_letter: &str,
        vars: &Node,
        body: &Node,
        span: Span,
    ) -> Result<Option<Ty>, Diagnostic> {
        for param in param_syms {
            let index = self.table.next_index();
            self.define(
                Symbol::Var(VarSymbol {
                    index,
                    is_field: false,
                    ..param.clone()
                }),
                span,
            )?;
        }

        let sig: String = param_syms.iter().map(|p| jtype(p.ty)).collect();
        self.emitter.add(format!(
            ".method public static {}({}){}",
            method_name, sig, return_letter
        ));
        self.emitter.add(".limit stack 100");
        self.emitter.add(".limit locals 100");

        self.visit(vars)?;
        self.visit(body)?;
        Ok(None)
    }

    fn function_result_load(
        &self,
        func_name: &str,
        body: &Node,
        span: Span,
    ) -> Result<String, Diagnostic> {
        let last = match body {
            Node::Body { stmts, .. } => match stmts.as_ref() {
                Node::StmtList { stmts, .. } => stmts.last(),
                _ => None,
            },
            _ => None,
        };
        let target = match last {
            Some(Node::Assign { target, .. }) => target,
            _ => {
                return Err(Diagnostic::error(
                    format!(
                        "Function '{}' must end with an assignment to its result",
                        func_name
                    ),
                    span,
                ))
            }
        };
        let result_name = match target.as_ref() {
            Node::ArrayIdent { name, .. } => name.ident_name(),
            other => other.ident_name(),
        };
        match self.table.lookup(result_name, false) {
            Some(Symbol::Var(v)) => Ok(format!("{}load_{}", jprefix(v.ty), v.index)),
            _ => Err(Diagnostic::error(
                format!("Undefined variable '{}' found", result_name),
                span,
            )),
        }
    }

    fn define(&mut self, symbol: Symbol, span: Span) -> Result<(), Diagnostic> {
        self.table.define(symbol).map_err(|name| {
            Diagnostic::error(format!("Duplicate identifier '{}' found", name), span)
        })
    }
}

/// Flatten a `Params` node into one `VarSymbol` per declared name, slots
/// assigned in declaration order.
fn collect_params(params: Option<&Node>) -> Vec<VarSymbol> {
    let mut syms = Vec::new();
    let Some(Node::Params { decls, .. }) = params else {
        return syms;
    };
    for decl in decls {
        if let Node::VarDecl { idents, ty, .. } = decl {
            let ty = type_spec_of(ty);
            for ident in idents.children() {
                syms.push(VarSymbol {
                    name: ident.ident_name().to_string(),
                    ty,
                    index: syms.len() as u32,
                    is_field: false,
                });
            }
        }
    }
    syms
}

fn type_spec_of(node: &Node) -> TypeSpec {
    match node {
        Node::TypeSpec { ty, .. } => *ty,
        _ => TypeSpec::Integer,
    }
}

fn literal_parts(node: &Node) -> (String, Option<Value>) {
    match node {
        Node::Literal { lexeme, value, .. } => (lexeme.clone(), Some(value.clone())),
        _ => (node.label(), None),
    }
}

/// Run the semantic walk and return the finished instruction lines.
pub fn analyze_and_emit(ast: &Node) -> Result<Vec<String>, Diagnostic> {
    SemanticAnalyzer::new().run(ast)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn compile(source: &str) -> Result<Vec<String>, Diagnostic> {
        let (tokens, diags) = Lexer::new(source).tokenize();
        assert!(diags.is_empty(), "lex errors: {:?}", diags);
        let ast = Parser::new(tokens).parse_program().expect("parse failed");
        analyze_and_emit(&ast)
    }

    fn listing(source: &str) -> String {
        compile(source).expect("semantic failure").join("\n")
    }

    fn error(source: &str) -> Diagnostic {
        compile(source).expect_err("expected semantic failure")
    }

    /// Assert the needles occur in the listing in the given order.
    fn assert_in_order(listing: &str, needles: &[&str]) {
        let mut pos = 0;
        for needle in needles {
            match listing[pos..].find(needle) {
                Some(found) => pos += found + needle.len(),
                None => panic!("'{}' missing (in order) from:\n{}", needle, listing),
            }
        }
    }

    #[test]
    fn test_global_scalar_assign() {
        let out = listing("Program P;\nvar a: integer;\nbegin a:=1; end.");
        assert_in_order(
            &out,
            &[
                ".class public P",
                ".super java/lang/Object",
                ".field public static a I",
                ".method public static main([Ljava/lang/String;)V",
                ".limit stack 100",
                ".limit locals 100",
                "ldc 1",
                "putstatic P/a I",
                "return",
                ".end method",
            ],
        );
    }

    #[test]
    fn test_char_and_boolean_fields() {
        let out = listing("Program P;\nvar c: char; b: boolean;\nbegin b:=True; end.");
        assert_in_order(
            &out,
            &[".field public static c C", ".field public static b Z", "ldc 1", "putstatic P/b Z"],
        );
    }

    #[test]
    fn test_array_declaration_and_store() {
        let out =
            listing("Program P; var g: array [1..100] of integer; begin g[5]:=10; end.");
        assert_in_order(
            &out,
            &[
                ".field public static g [I",
                "ldc 100",
                "newarray int",
                "putstatic P/g [I",
                "getstatic P/g [I",
                "ldc 5",
                "ldc 10",
                "iastore",
                "return",
            ],
        );
    }

    #[test]
    fn test_array_load() {
        let out = listing(
            "Program P; var g: array [1..10] of integer; a: integer; begin a:=g[3]; end.",
        );
        assert_in_order(&out, &["getstatic P/g [I", "ldc 3", "iaload", "putstatic P/a I"]);
    }

    #[test]
    fn test_array_subscript_out_of_range() {
        let d = error("Program P; var g: array [1..100] of integer; begin g[200]:=0; end.");
        assert!(d.message.contains("Out of range '200'"), "{}", d.message);
    }

    #[test]
    fn test_array_read_out_of_range() {
        let d = error(
            "Program P; var g: array [1..100] of integer; a: integer; begin a:=g[101]; end.",
        );
        assert!(d.message.contains("Out of range"), "{}", d.message);
    }

    #[test]
    fn test_duplicate_identifier() {
        let d = error("Program P;\nvar a: integer; a: integer;\nbegin end.");
        assert!(
            d.message.contains("Duplicate identifier 'a'"),
            "{}",
            d.message
        );
    }

    #[test]
    fn test_duplicate_procedure_name() {
        let d = error(
            "Program P;\nvar a: integer;\nprocedure a;\nvar\nbegin end;\nbegin end.",
        );
        assert!(d.message.contains("Duplicate identifier"), "{}", d.message);
    }

    #[test]
    fn test_undefined_variable() {
        let d = error("Program P;\nvar\nbegin missing:=1; end.");
        assert!(
            d.message.contains("Undefined variable 'missing'"),
            "{}",
            d.message
        );
    }

    #[test]
    fn test_operator_domain_logical_on_integers() {
        let d = error("Program P;\nvar a: integer;\nbegin a:=1 && 2; end.");
        assert!(
            d.message.contains("not supported") || d.message.contains("Incompatible"),
            "{}",
            d.message
        );
    }

    #[test]
    fn test_incompatible_operand_types() {
        let d = error("Program P;\nvar a: integer; b: boolean;\nbegin a:=a+b; end.");
        assert!(d.message.contains("Incompatible types"), "{}", d.message);
    }

    #[test]
    fn test_wrong_assignment_type() {
        let d = error("Program P;\nvar a: integer;\nbegin a:=True; end.");
        assert!(d.message.contains("Wrong type 'a'"), "{}", d.message);
    }

    #[test]
    fn test_real_literal_rejected_in_integer_context() {
        let d = error("Program P;\nvar a: integer;\nbegin a:=1.5; end.");
        assert!(d.message.contains("Wrong type"), "{}", d.message);
    }

    #[test]
    fn test_binop_emission() {
        let out = listing("Program P;\nvar a: integer;\nbegin a:=1+2*3; end.");
        assert_in_order(&out, &["ldc 1", "ldc 2", "ldc 3", "imul", "iadd", "putstatic P/a I"]);
    }

    #[test]
    fn test_div_emits_irem() {
        let out = listing("Program P;\nvar a: integer;\nbegin a:=7 div 2; end.");
        assert_in_order(&out, &["ldc 7", "ldc 2", "irem"]);
    }

    #[test]
    fn test_division_emits_idiv() {
        let out = listing("Program P;\nvar a: integer;\nbegin a:=7 / 2; end.");
        assert_in_order(&out, &["ldc 7", "ldc 2", "idiv"]);
    }

    #[test]
    fn test_if_without_else() {
        let out = listing(
            "Program P;\nvar a: integer;\nbegin if (a < 1) then a:=2; end.",
        );
        assert_in_order(&out, &["swap", "if_icmplt", "ldc 2", "putstatic P/a I", "goto endif_0", "endif_0:"]);
    }

    #[test]
    fn test_if_with_else_labels() {
        let out = listing(
            "Program P;\nvar a: integer;\nbegin if (a >= 1) then a:=2; else a:=3; end.",
        );
        assert_in_order(
            &out,
            &["if_icmpge else_0", "goto endif_0", "else_0:", "endif_0:"],
        );
    }

    #[test]
    fn test_condition_not_boolean() {
        let d = error("Program P;\nvar a: integer;\nbegin if (a + 1) then a:=2; end.");
        assert!(
            d.message.contains("Wrong type of if condition"),
            "{}",
            d.message
        );
    }

    #[test]
    fn test_while_labels() {
        let out = listing(
            "Program P;\nvar a: integer;\nbegin while (a < 10) do a:=a+1; end.",
        );
        assert_in_order(
            &out,
            &["while_0:", "if_icmplt done_0", "goto while_0", "done_0:"],
        );
    }

    #[test]
    fn test_while_condition_not_boolean() {
        let d = error("Program P;\nvar a: integer;\nbegin while (a) do a:=a+1; end.");
        assert!(
            d.message.contains("Wrong type of while condition"),
            "{}",
            d.message
        );
    }

    #[test]
    fn test_sequential_ifs_get_distinct_labels() {
        let out = listing(
            "Program P;\nvar a: integer;\nbegin if (a < 1) then a:=2; if (a < 3) then a:=4; end.",
        );
        assert!(out.contains("endif_0:"), "{}", out);
        assert!(out.contains("endif_1:"), "{}", out);
    }

    #[test]
    fn test_repeat_post_test_loop() {
        let out = listing(
            "Program P;\nvar a: integer;\nbegin repeat a:=a+1; until (a > 3) end.",
        );
        assert_in_order(&out, &["repeat_0:", "iadd", "putstatic P/a I", "if_icmpgt repeat_0"]);
    }

    #[test]
    fn test_for_requires_integer_bound() {
        let out = listing(
            "Program P;\nvar i: integer;\nbegin for (i:=0 to 10) do i:=i+1; end.",
        );
        assert_in_order(&out, &["ldc 0", "putstatic P/i I", "ldc 10"]);
    }

    #[test]
    fn test_for_rejects_non_integer_bound() {
        let d = error("Program P;\nvar i: integer;\nbegin for (i:=0 to True) do ; end.");
        assert!(
            d.message.contains("Wrong type of for condition"),
            "{}",
            d.message
        );
    }

    #[test]
    fn test_procedure_method_and_call() {
        let out = listing(
            "Program P;\nvar a: integer;\nprocedure t(x: integer);\nvar d: integer;\nbegin d:=x; end;\nbegin t(5); end.",
        );
        assert_in_order(
            &out,
            &[
                ".method public static t(I)V",
                ".limit stack 100",
                ".limit locals 100",
                "iload_0",
                "istore_1",
                "return",
                ".end method",
                ".method public static main([Ljava/lang/String;)V",
                "ldc 5",
                "invokestatic P/t(I)V",
            ],
        );
    }

    #[test]
    fn test_procedure_locals_are_slots_not_fields() {
        let out = listing(
            "Program P;\nvar\nprocedure t;\nvar d: integer;\nbegin d:=1; end;\nbegin t(); end.",
        );
        assert!(!out.contains(".field public static d"), "{}", out);
        assert_in_order(&out, &["ldc 1", "istore_0"]);
    }

    #[test]
    fn test_procedure_local_not_visible_outside() {
        let d = error(
            "Program P;\nvar\nprocedure t;\nvar d: integer;\nbegin d:=1; end;\nbegin d:=2; end.",
        );
        assert!(
            d.message.contains("Undefined variable 'd'"),
            "{}",
            d.message
        );
    }

    #[test]
    fn test_call_arity_mismatch() {
        let d = error(
            "Program P;\nvar\nprocedure t(x: integer);\nvar\nbegin x:=1; end;\nbegin t(1, 2); end.",
        );
        assert!(
            d.message.contains("Wrong number of parameters"),
            "{}",
            d.message
        );
    }

    #[test]
    fn test_function_returns_last_assignment() {
        let out = listing(
            "Program P;\nvar a: integer;\nfunction f(x: integer);\nvar r: integer;\n: integer begin r:=x+1; end;\nbegin a:=f(1); end.",
        );
        assert_in_order(
            &out,
            &[
                ".method public static f(I)I",
                "iload_0",
                "ldc 1",
                "iadd",
                "istore_1",
                "iload_1",
                "ireturn",
                ".end method",
                "invokestatic P/f(I)I",
            ],
        );
    }

    #[test]
    fn test_function_without_final_assignment_fails() {
        let d = error(
            "Program P;\nvar a: integer;\nfunction f;\nvar r: integer;\n: integer begin WriteLn(r); end;\nbegin a:=f(); end.",
        );
        assert!(
            d.message.contains("must end with an assignment"),
            "{}",
            d.message
        );
    }

    #[test]
    fn test_writeln_signature_dispatch() {
        let out = listing("Program P;\nvar a: integer;\nbegin WriteLn(a); end.");
        assert_in_order(
            &out,
            &[
                "getstatic java/lang/System/out Ljava/io/PrintStream;",
                "getstatic P/a I",
                "invokevirtual java/io/PrintStream/println(I)V",
            ],
        );
    }

    #[test]
    fn test_write_two_args_signature() {
        let out = listing("Program P;\nvar a: integer; b: boolean;\nbegin Write(a, b); end.");
        assert!(
            out.contains("invokevirtual java/io/PrintStream/println(IZ)V"),
            "{}",
            out
        );
    }

    #[test]
    fn test_readln_stores_per_argument() {
        let out = listing(
            "Program P;\nvar a: integer;\nprocedure t;\nvar d: integer;\nbegin ReadLn(d); end;\nbegin ReadLn(a); end.",
        );
        assert_in_order(
            &out,
            &[
                "getstatic java/lang/System/in Ljava/io/InputStream;",
                "invokevirtual java/io/InputStream/read()I",
                "istore_0",
            ],
        );
        assert_in_order(
            &out,
            &[
                ".method public static main([Ljava/lang/String;)V",
                "getstatic java/lang/System/in Ljava/io/InputStream;",
                "invokevirtual java/io/InputStream/read()I",
                "putstatic P/a I",
            ],
        );
    }

    #[test]
    fn test_undefined_function() {
        let d = error("Program P;\nvar\nbegin nothere(1); end.");
        assert!(
            d.message.contains("Undefined function 'nothere'"),
            "{}",
            d.message
        );
    }

    #[test]
    fn test_every_branch_target_has_a_label() {
        let out = listing(
            "Program P;\nvar a: integer;\nbegin \
             while (a < 5) do begin \
               if (a < 2) then a:=a+1; else a:=a+2; \
               repeat a:=a+1; until (a > 4) \
             end; end.",
        );
        let lines: Vec<&str> = out.lines().collect();
        let labels: Vec<&str> = lines
            .iter()
            .filter(|l| l.ends_with(':'))
            .map(|l| l.trim_end_matches(':'))
            .collect();
        for line in &lines {
            let target = if let Some(rest) = line.strip_prefix("goto ") {
                Some(rest)
            } else if line.starts_with("if_icmp") {
                line.split_whitespace().nth(1)
            } else {
                None
            };
            if let Some(target) = target {
                assert!(
                    labels.contains(&target),
                    "branch target '{}' has no label in:\n{}",
                    target,
                    out
                );
            }
        }
    }

    #[test]
    fn test_emitter_state_discarded_on_failure() {
        // The Err carries only the diagnostic; no listing escapes.
        let result = compile("Program P;\nvar a: integer; a: integer;\nbegin end.");
        assert!(result.is_err());
    }
}

pub mod ast;
pub mod diagnostic;
pub mod emit;
pub mod lexeme;
pub mod lexer;
pub mod parser;
pub mod rules;
pub mod semantic;
pub mod span;
pub mod symbols;

pub use ast::{format_tree, Node};
pub use semantic::analyze_and_emit;

use diagnostic::{render_diagnostics, Diagnostic};
use lexer::Lexer;
use parser::Parser;

/// Parse a source buffer into its AST. The root is always a `Program`
/// node; any lex or parse fault is fatal.
pub fn parse(source: &str) -> Result<Node, Vec<Diagnostic>> {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    if !lex_errors.is_empty() {
        return Err(lex_errors);
    }
    Parser::new(tokens).parse_program()
}

/// Compile a source buffer to its AST and Jasmin listing, rendering any
/// diagnostics to stderr.
pub fn compile(source: &str, filename: &str) -> Result<(Node, Vec<String>), Vec<Diagnostic>> {
    compile_silent(source).map_err(|errors| {
        render_diagnostics(&errors, filename, source);
        errors
    })
}

/// Compile without rendering diagnostics.
pub fn compile_silent(source: &str) -> Result<(Node, Vec<String>), Vec<Diagnostic>> {
    let ast = parse(source)?;
    let listing = analyze_and_emit(&ast).map_err(|diag| vec![diag])?;
    Ok((ast, listing))
}

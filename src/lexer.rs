use crate::diagnostic::Diagnostic;
use crate::lexeme::Lexeme;
use crate::span::{Span, Spanned};

pub struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> (Vec<Spanned<Lexeme>>, Vec<Diagnostic>) {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = tok.node == Lexeme::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        (tokens, self.diagnostics)
    }

    fn next_token(&mut self) -> Spanned<Lexeme> {
        loop {
            self.skip_whitespace_and_comments();

            if self.pos >= self.source.len() {
                return self.make_token(Lexeme::Eof, self.pos, self.pos);
            }

            let start = self.pos;
            let ch = self.source[self.pos];

            // Identifiers and keywords
            if is_ident_start(ch) {
                return self.scan_ident_or_keyword();
            }

            // Numeric literals
            if ch.is_ascii_digit() {
                return self.scan_number();
            }

            // String literals
            if ch == b'"' {
                return self.scan_string();
            }

            // Symbols
            if let Some(tok) = self.scan_symbol(start) {
                return tok;
            }
            // scan_symbol returned None → error was recorded, try again
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.pos < self.source.len() && self.source[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }

            // Line comments: // ... \n
            if self.pos + 1 < self.source.len()
                && self.source[self.pos] == b'/'
                && self.source[self.pos + 1] == b'/'
            {
                while self.pos < self.source.len() && self.source[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }

            // Block comments: /* ... */
            if self.pos + 1 < self.source.len()
                && self.source[self.pos] == b'/'
                && self.source[self.pos + 1] == b'*'
            {
                let start = self.pos;
                self.pos += 2;
                loop {
                    if self.pos + 1 >= self.source.len() {
                        self.pos = self.source.len();
                        self.diagnostics.push(
                            Diagnostic::error(
                                "unterminated block comment".to_string(),
                                Span::new(start as u32, self.pos as u32),
                            )
                            .with_help("every `/*` must have a matching `*/`".to_string()),
                        );
                        break;
                    }
                    if self.source[self.pos] == b'*' && self.source[self.pos + 1] == b'/' {
                        self.pos += 2;
                        break;
                    }
                    self.pos += 1;
                }
                continue;
            }

            break;
        }
    }

    fn scan_ident_or_keyword(&mut self) -> Spanned<Lexeme> {
        let start = self.pos;
        while self.pos < self.source.len() && is_ident_continue(self.source[self.pos]) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        let token = Lexeme::from_keyword(text).unwrap_or_else(|| Lexeme::Ident(text.to_string()));
        self.make_token(token, start, self.pos)
    }

    /// Scan a number: digits, optional fraction, optional exponent.
    /// A `.` only begins a fraction when a digit follows, so `1..100`
    /// lexes as `1`, `..`, `100`.
    fn scan_number(&mut self) -> Spanned<Lexeme> {
        let start = self.pos;
        while self.pos < self.source.len() && self.source[self.pos].is_ascii_digit() {
            self.pos += 1;
        }

        if self.pos + 1 < self.source.len()
            && self.source[self.pos] == b'.'
            && self.source[self.pos + 1].is_ascii_digit()
        {
            self.pos += 1;
            while self.pos < self.source.len() && self.source[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
        }

        if self.pos < self.source.len()
            && (self.source[self.pos] == b'e' || self.source[self.pos] == b'E')
        {
            let mut ahead = self.pos + 1;
            if ahead < self.source.len()
                && (self.source[ahead] == b'+' || self.source[ahead] == b'-')
            {
                ahead += 1;
            }
            if ahead < self.source.len() && self.source[ahead].is_ascii_digit() {
                self.pos = ahead;
                while self.pos < self.source.len() && self.source[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
            }
        }

        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        self.make_token(Lexeme::Number(text.to_string()), start, self.pos)
    }

    /// Scan a double-quoted string with backslash escapes. The stored lexeme
    /// keeps the quotes and the escapes as written.
    fn scan_string(&mut self) -> Spanned<Lexeme> {
        let start = self.pos;
        self.pos += 1; // opening quote
        while self.pos < self.source.len() {
            match self.source[self.pos] {
                b'"' => {
                    self.pos += 1;
                    let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
                    return self.make_token(Lexeme::Str(text.to_string()), start, self.pos);
                }
                b'\\' if self.pos + 1 < self.source.len() => {
                    self.pos += 2;
                }
                b'\n' => break,
                _ => self.pos += 1,
            }
        }
        self.diagnostics.push(
            Diagnostic::error(
                "unterminated string literal".to_string(),
                Span::new(start as u32, self.pos as u32),
            )
            .with_help("string literals are closed with '\"' on the same line".to_string()),
        );
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        self.make_token(Lexeme::Str(text.to_string()), start, self.pos)
    }

    fn scan_symbol(&mut self, start: usize) -> Option<Spanned<Lexeme>> {
        let ch = self.source[self.pos];
        self.pos += 1;

        let token = match ch {
            b'(' => Lexeme::LParen,
            b')' => Lexeme::RParen,
            b'[' => Lexeme::LBracket,
            b']' => Lexeme::RBracket,
            b';' => Lexeme::Semicolon,
            b',' => Lexeme::Comma,
            b'+' => Lexeme::Plus,
            b'-' => Lexeme::Minus,
            b'*' => Lexeme::Star,
            b'/' => Lexeme::Slash,
            b':' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Lexeme::Assign
                } else {
                    Lexeme::Colon
                }
            }
            b'.' => {
                if self.peek() == Some(b'.') {
                    self.pos += 1;
                    Lexeme::DotDot
                } else {
                    Lexeme::Dot
                }
            }
            b'>' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Lexeme::Ge
                } else {
                    Lexeme::Gt
                }
            }
            b'<' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Lexeme::Le
                } else {
                    Lexeme::Lt
                }
            }
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Lexeme::EqEq
                } else {
                    self.diagnostics.push(
                        Diagnostic::error(
                            "unexpected '='".to_string(),
                            Span::new(start as u32, self.pos as u32),
                        )
                        .with_help(
                            "assignment is written ':=' and comparison '=='".to_string(),
                        ),
                    );
                    return None;
                }
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Lexeme::BangEq
                } else {
                    self.diagnostics.push(
                        Diagnostic::error(
                            "unexpected '!'".to_string(),
                            Span::new(start as u32, self.pos as u32),
                        )
                        .with_help("inequality is written '!='".to_string()),
                    );
                    return None;
                }
            }
            b'&' => {
                if self.peek() == Some(b'&') {
                    self.pos += 1;
                    Lexeme::AmpAmp
                } else {
                    self.diagnostics.push(
                        Diagnostic::error(
                            "unexpected '&'".to_string(),
                            Span::new(start as u32, self.pos as u32),
                        )
                        .with_help("logical and is written '&&'".to_string()),
                    );
                    return None;
                }
            }
            b'|' => {
                if self.peek() == Some(b'|') {
                    self.pos += 1;
                    Lexeme::PipePipe
                } else {
                    self.diagnostics.push(
                        Diagnostic::error(
                            "unexpected '|'".to_string(),
                            Span::new(start as u32, self.pos as u32),
                        )
                        .with_help("logical or is written '||'".to_string()),
                    );
                    return None;
                }
            }
            _ => {
                self.diagnostics.push(
                    Diagnostic::error(
                        format!("unexpected character '{}' (U+{:04X})", ch as char, ch),
                        Span::new(start as u32, self.pos as u32),
                    )
                    .with_help("this character is not part of the language syntax".to_string()),
                );
                return None;
            }
        };

        Some(self.make_token(token, start, self.pos))
    }

    fn peek(&self) -> Option<u8> {
        if self.pos < self.source.len() {
            Some(self.source[self.pos])
        } else {
            None
        }
    }

    fn make_token(&self, token: Lexeme, start: usize, end: usize) -> Spanned<Lexeme> {
        Spanned::new(token, Span::new(start as u32, end as u32))
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Lexeme> {
        let (tokens, diags) = Lexer::new(source).tokenize();
        assert!(diags.is_empty(), "unexpected errors: {:?}", diags);
        tokens.into_iter().map(|t| t.node).collect()
    }

    #[test]
    fn test_keywords() {
        let tokens = lex("Program var begin end procedure function if then else while do");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Program,
                Lexeme::Var,
                Lexeme::Begin,
                Lexeme::End,
                Lexeme::Procedure,
                Lexeme::Function,
                Lexeme::If,
                Lexeme::Then,
                Lexeme::Else,
                Lexeme::While,
                Lexeme::Do,
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let tokens = lex("PROGRAM Var BeGiN END");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Program,
                Lexeme::Var,
                Lexeme::Begin,
                Lexeme::End,
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_types_and_loops() {
        let tokens = lex("integer char boolean array of repeat until for to mod div");
        assert_eq!(
            tokens,
            vec![
                Lexeme::IntegerTy,
                Lexeme::CharTy,
                Lexeme::BooleanTy,
                Lexeme::Array,
                Lexeme::Of,
                Lexeme::Repeat,
                Lexeme::Until,
                Lexeme::For,
                Lexeme::To,
                Lexeme::Mod,
                Lexeme::Div,
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_symbols() {
        let tokens = lex("( ) [ ] ; , : := . .. + - * / && || >= <= > < == !=");
        assert_eq!(
            tokens,
            vec![
                Lexeme::LParen,
                Lexeme::RParen,
                Lexeme::LBracket,
                Lexeme::RBracket,
                Lexeme::Semicolon,
                Lexeme::Comma,
                Lexeme::Colon,
                Lexeme::Assign,
                Lexeme::Dot,
                Lexeme::DotDot,
                Lexeme::Plus,
                Lexeme::Minus,
                Lexeme::Star,
                Lexeme::Slash,
                Lexeme::AmpAmp,
                Lexeme::PipePipe,
                Lexeme::Ge,
                Lexeme::Le,
                Lexeme::Gt,
                Lexeme::Lt,
                Lexeme::EqEq,
                Lexeme::BangEq,
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens = lex("0 42 3.14 1e9 2.5e-3");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Number("0".into()),
                Lexeme::Number("42".into()),
                Lexeme::Number("3.14".into()),
                Lexeme::Number("1e9".into()),
                Lexeme::Number("2.5e-3".into()),
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_number_before_range() {
        // The '..' of array bounds must not be eaten as a fraction
        let tokens = lex("1..100");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Number("1".into()),
                Lexeme::DotDot,
                Lexeme::Number("100".into()),
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_string_keeps_quotes() {
        let tokens = lex(r#""hello" "a\"b""#);
        assert_eq!(
            tokens,
            vec![
                Lexeme::Str(r#""hello""#.into()),
                Lexeme::Str(r#""a\"b""#.into()),
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_comments() {
        let tokens = lex("a // line comment\n/* block\ncomment */ b");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Ident("a".into()),
                Lexeme::Ident("b".into()),
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_assign_vs_colon() {
        let tokens = lex("a := 1; b : integer");
        assert_eq!(tokens[1], Lexeme::Assign);
        assert_eq!(tokens[5], Lexeme::Colon);
    }

    #[test]
    fn test_boolean_literals() {
        let tokens = lex("True false");
        assert_eq!(tokens, vec![Lexeme::True, Lexeme::False, Lexeme::Eof]);
    }

    #[test]
    fn test_simple_program() {
        let tokens = lex("Program P;\nvar a: integer;\nbegin a:=1; end.");
        assert_eq!(tokens[0], Lexeme::Program);
        assert_eq!(tokens[1], Lexeme::Ident("P".into()));
        assert_eq!(tokens[2], Lexeme::Semicolon);
        assert_eq!(tokens[3], Lexeme::Var);
        assert_eq!(*tokens.last().unwrap(), Lexeme::Eof);
        assert_eq!(tokens[tokens.len() - 2], Lexeme::Dot);
    }

    // --- Error path tests ---

    fn lex_with_errors(source: &str) -> (Vec<Lexeme>, Vec<Diagnostic>) {
        let (tokens, diags) = Lexer::new(source).tokenize();
        let lexemes = tokens.into_iter().map(|t| t.node).collect();
        (lexemes, diags)
    }

    #[test]
    fn test_error_single_equals() {
        let (_tokens, diags) = lex_with_errors("a = 1");
        assert!(!diags.is_empty(), "should produce an error for '='");
        assert!(
            diags[0].help.as_deref().unwrap().contains(":="),
            "help should suggest ':='"
        );
    }

    #[test]
    fn test_error_single_ampersand() {
        let (_tokens, diags) = lex_with_errors("a & b");
        assert!(!diags.is_empty(), "should produce an error for '&'");
        assert!(diags[0].message.contains("unexpected '&'"));
    }

    #[test]
    fn test_error_unexpected_character() {
        let (_tokens, diags) = lex_with_errors("@");
        assert!(!diags.is_empty());
        assert!(
            diags[0].message.contains("unexpected character '@'"),
            "error should name the character, got: {}",
            diags[0].message
        );
    }

    #[test]
    fn test_error_unterminated_string() {
        let (_tokens, diags) = lex_with_errors("\"abc");
        assert!(!diags.is_empty());
        assert!(diags[0].message.contains("unterminated string"));
    }

    #[test]
    fn test_error_unterminated_block_comment() {
        let (_tokens, diags) = lex_with_errors("/* never closed");
        assert!(!diags.is_empty());
        assert!(diags[0].message.contains("unterminated block comment"));
    }
}

//! Lexer implementation

use std::iter::Peekable;
use std::str::CharIndices;

use vivarium_core::LexError;

use super::token::*;

/// Lexer for the configuration language.
pub struct Lexer<'a> {
    source: &'a str,
    source_name: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source text. `source_name` appears in
    /// diagnostics (a filename, "eval command", ...).
    pub fn new(source: &'a str, source_name: &'a str) -> Self {
        Self {
            source,
            source_name,
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            pos: 0,
        }
    }

    /// Tokenize the entire source. The returned stream always ends with an
    /// `Eof` token. Malformed input aborts the whole tokenization.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Get the next token from the source.
    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments()?;

        let start_pos = self.pos;
        let start_line = self.line;
        let start_col = self.column;

        let kind = match self.peek_char() {
            None => TokenKind::Eof,
            Some(c) => match c {
                '{' => self.single(Symbol::LBrace),
                '}' => self.single(Symbol::RBrace),
                '(' => self.single(Symbol::LParen),
                ')' => self.single(Symbol::RParen),
                ';' => self.single(Symbol::Semi),
                ',' => self.single(Symbol::Comma),
                '@' => self.single(Symbol::At),
                '+' => self.single(Symbol::Plus),
                '%' => self.single(Symbol::Percent),

                '-' => {
                    self.advance();
                    // A digit right after the minus makes a negative number
                    // literal; the grammar has no unary operators.
                    if self.peek_char().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                        self.scan_number(start_pos)?
                    } else {
                        TokenKind::Symbol(Symbol::Minus)
                    }
                }
                '/' => self.single(Symbol::Slash),

                '.' => self.scan_dots(),

                '*' => {
                    self.advance();
                    if self.peek_char() == Some('*') {
                        self.advance();
                        TokenKind::Symbol(Symbol::StarStar)
                    } else {
                        TokenKind::Symbol(Symbol::Star)
                    }
                }

                '=' => {
                    self.advance();
                    if self.peek_char() == Some('=') {
                        self.advance();
                        TokenKind::Symbol(Symbol::EqEq)
                    } else {
                        TokenKind::Symbol(Symbol::Assign)
                    }
                }

                '!' => {
                    self.advance();
                    if self.peek_char() == Some('=') {
                        self.advance();
                        TokenKind::Symbol(Symbol::NotEq)
                    } else {
                        return Err(self.error("Unexpected character: !"));
                    }
                }

                '<' => {
                    self.advance();
                    if self.peek_char() == Some('=') {
                        self.advance();
                        TokenKind::Symbol(Symbol::LtEq)
                    } else {
                        TokenKind::Symbol(Symbol::Lt)
                    }
                }

                '>' => {
                    self.advance();
                    if self.peek_char() == Some('=') {
                        self.advance();
                        TokenKind::Symbol(Symbol::GtEq)
                    } else {
                        TokenKind::Symbol(Symbol::Gt)
                    }
                }

                '&' => {
                    self.advance();
                    if self.peek_char() == Some('&') {
                        self.advance();
                        TokenKind::Symbol(Symbol::AndAnd)
                    } else {
                        return Err(self.error("Unexpected character: &"));
                    }
                }

                '|' => {
                    self.advance();
                    if self.peek_char() == Some('|') {
                        self.advance();
                        TokenKind::Symbol(Symbol::OrOr)
                    } else {
                        return Err(self.error("Unexpected character: |"));
                    }
                }

                '"' => self.scan_string()?,
                '\'' => self.scan_char()?,

                c if c.is_ascii_digit() => self.scan_number(start_pos)?,

                c if c.is_ascii_alphabetic() || c == '_' => self.scan_identifier(),

                c => {
                    self.advance();
                    return Err(self.error(format!("Unexpected character: {c}")));
                }
            },
        };

        Ok(Token {
            kind,
            span: Span {
                start: start_pos,
                end: self.pos,
                line: start_line,
                column: start_col,
            },
        })
    }

    fn single(&mut self, symbol: Symbol) -> TokenKind {
        self.advance();
        TokenKind::Symbol(symbol)
    }

    /// Scan an identifier: letter or underscore, then alphanumerics and
    /// underscores.
    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos;

        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        TokenKind::Identifier(self.source[start..self.pos].to_string())
    }

    /// Scan a run of dots; the count matters to the parser.
    fn scan_dots(&mut self) -> TokenKind {
        let mut count = 0;
        while self.peek_char() == Some('.') {
            self.advance();
            count += 1;
        }
        TokenKind::Dots(count)
    }

    /// Scan a decimal number (the sign, if any, was already consumed and is
    /// included via `start`) with optional fraction and exponent.
    fn scan_number(&mut self, start: usize) -> Result<TokenKind, LexError> {
        while self.peek_char().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.advance();
        }

        // Fraction, but only when a digit follows: a bare `.` after digits is
        // a scope-path dot.
        if self.peek_char() == Some('.')
            && self
                .peek_next_char()
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false)
        {
            self.advance();
            while self.peek_char().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.advance();
            }
        }

        // Exponent, but only when followed by digits (else `2e` is the
        // number 2 and the identifier e).
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let mut lookahead = self.source[self.pos..].chars();
            lookahead.next();
            let first = lookahead.next();
            let second = lookahead.next();
            let signed = matches!(first, Some('+') | Some('-'))
                && second.map(|c| c.is_ascii_digit()).unwrap_or(false);
            let unsigned = first.map(|c| c.is_ascii_digit()).unwrap_or(false);
            if signed || unsigned {
                self.advance(); // e
                if signed {
                    self.advance(); // sign
                }
                while self.peek_char().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    self.advance();
                }
            }
        }

        let text = &self.source[start..self.pos];
        Ok(TokenKind::Number(self.finish_number(text)?))
    }

    fn finish_number(&self, text: &str) -> Result<f64, LexError> {
        text.parse::<f64>()
            .map_err(|_| self.error(format!("Invalid number: {text}")))
    }

    /// Scan a double-quoted string literal with standard escapes.
    fn scan_string(&mut self) -> Result<TokenKind, LexError> {
        self.advance(); // consume opening quote
        let mut value = String::new();

        loop {
            match self.peek_char() {
                None => return Err(self.error("Unterminated string literal")),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    value.push(self.scan_escape('"')?);
                }
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }

        Ok(TokenKind::StrLit(value))
    }

    /// Scan a single-quoted char literal.
    fn scan_char(&mut self) -> Result<TokenKind, LexError> {
        self.advance(); // consume opening quote
        let c = match self.peek_char() {
            None => return Err(self.error("Unterminated char literal")),
            Some('\\') => {
                self.advance();
                self.scan_escape('\'')?
            }
            Some('\'') => return Err(self.error("Empty char literal")),
            Some(c) => {
                self.advance();
                c
            }
        };
        if self.peek_char() != Some('\'') {
            return Err(self.error("Unterminated char literal"));
        }
        self.advance();
        Ok(TokenKind::CharLit(c))
    }

    /// Resolve one character escape after a backslash.
    fn scan_escape(&mut self, quote: char) -> Result<char, LexError> {
        let c = match self.peek_char() {
            None => return Err(self.error("Unterminated escape sequence")),
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some('\\') => '\\',
            Some(c) if c == quote => quote,
            Some(c) => return Err(self.error(format!("Unknown escape sequence: \\{c}"))),
        };
        self.advance();
        Ok(c)
    }

    /// Skip whitespace and `//`, `#`, and `/* */` comments.
    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek_char() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.advance();
                }
                Some('\n') => {
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                }
                Some('#') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') => {
                    let next = self.peek_next_char();
                    if next == Some('/') {
                        // Line comment
                        while let Some(c) = self.peek_char() {
                            if c == '\n' {
                                break;
                            }
                            self.advance();
                        }
                    } else if next == Some('*') {
                        // Block comment
                        self.advance(); // /
                        self.advance(); // *
                        loop {
                            match self.peek_char() {
                                None => return Err(self.error("Unterminated block comment")),
                                Some('*') if self.peek_next_char() == Some('/') => {
                                    self.advance();
                                    self.advance();
                                    break;
                                }
                                Some('\n') => {
                                    self.advance();
                                    self.line += 1;
                                    self.column = 1;
                                }
                                _ => {
                                    self.advance();
                                }
                            }
                        }
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            line: Some(self.line),
            source: self.source_name.to_string(),
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next_char(&self) -> Option<char> {
        let mut iter = self.source[self.pos..].char_indices();
        iter.next();
        iter.next().map(|(_, c)| c)
    }

    fn advance(&mut self) -> Option<char> {
        if let Some((i, c)) = self.chars.next() {
            self.pos = i + c.len_utf8();
            self.column += 1;
            Some(c)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source, "test")
            .tokenize()
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn scans_the_operator_set() {
        let toks = kinds("a ** 2 <= b != c && d || e = f % g;");
        assert!(toks.contains(&TokenKind::Symbol(Symbol::StarStar)));
        assert!(toks.contains(&TokenKind::Symbol(Symbol::LtEq)));
        assert!(toks.contains(&TokenKind::Symbol(Symbol::NotEq)));
        assert!(toks.contains(&TokenKind::Symbol(Symbol::AndAnd)));
        assert!(toks.contains(&TokenKind::Symbol(Symbol::OrOr)));
        assert!(toks.contains(&TokenKind::Symbol(Symbol::Assign)));
        assert!(toks.contains(&TokenKind::Symbol(Symbol::Percent)));
    }

    #[test]
    fn numbers_take_fractions_and_exponents() {
        assert_eq!(kinds("1.5")[0], TokenKind::Number(1.5));
        assert_eq!(kinds("2e3")[0], TokenKind::Number(2000.0));
        assert_eq!(kinds("1.25e-2")[0], TokenKind::Number(0.0125));
    }

    #[test]
    fn a_dot_after_digits_is_a_path_dot() {
        let toks = kinds("f.j");
        assert_eq!(
            toks,
            vec![
                TokenKind::Identifier("f".into()),
                TokenKind::Dots(1),
                TokenKind::Identifier("j".into()),
                TokenKind::Eof,
            ]
        );
        // `3.j` lexes the 3 and then a path dot, not the fraction `3.`.
        let toks = kinds("3.j");
        assert_eq!(toks[0], TokenKind::Number(3.0));
        assert_eq!(toks[1], TokenKind::Dots(1));
    }

    #[test]
    fn dot_runs_keep_their_length() {
        assert_eq!(kinds("..a")[0], TokenKind::Dots(2));
        assert_eq!(kinds("...a")[0], TokenKind::Dots(3));
    }

    #[test]
    fn minus_glued_to_a_digit_is_a_negative_literal() {
        assert_eq!(kinds("-5")[0], TokenKind::Number(-5.0));
        assert_eq!(kinds("-0.5")[0], TokenKind::Number(-0.5));
        // With a space it stays an operator.
        let toks = kinds("a - 5");
        assert_eq!(toks[1], TokenKind::Symbol(Symbol::Minus));
    }

    #[test]
    fn string_and_char_literals_resolve_escapes() {
        assert_eq!(
            kinds(r#""99 \"balloons\"\n""#)[0],
            TokenKind::StrLit("99 \"balloons\"\n".into())
        );
        assert_eq!(kinds("'q'")[0], TokenKind::CharLit('q'));
        assert_eq!(kinds(r"'\n'")[0], TokenKind::CharLit('\n'));
    }

    #[test]
    fn comments_are_skipped_and_lines_tracked() {
        let tokens = Lexer::new("// one\n# two\n/* three\nfour */ x", "test")
            .tokenize()
            .unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Identifier("x".into()));
        assert_eq!(tokens[0].span.line, 4);
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let err = Lexer::new("\"open", "cfg").tokenize().unwrap_err();
        assert_eq!(err.to_string(), "Error (line 1 in 'cfg'): Unterminated string literal");
    }

    #[test]
    fn invalid_characters_are_fatal() {
        assert!(Lexer::new("a ~ b", "cfg").tokenize().is_err());
        assert!(Lexer::new("a & b", "cfg").tokenize().is_err());
    }
}

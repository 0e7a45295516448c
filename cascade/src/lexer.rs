//! Tokenizer for the CSS-shaped source syntax.
//!

use crate::Error;

// --- TokenKind -------------------------------------------------------------

/// What a [`Token`](struct.Token.html) is.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TokenKind {
    At,
    Colon,
    Comma,
    Eof,
    Eq,
    Ge,
    Gt,
    /// An identifier.  Dashes are allowed inside, as in CSS.
    Ident,
    LBrace,
    LBracket,
    Le,
    LParen,
    Lt,
    Ne,
    /// An integer or decimal literal, possibly negative.
    Number,
    RBrace,
    RBracket,
    RParen,
    Semicolon,
    /// A double-quoted string; the lexeme holds the unescaped content.
    Str,
    /// A `--name` token; the lexeme holds the name without the dashes.
    Var,
}

impl Copy for TokenKind {}

// --- Token -----------------------------------------------------------------

/// A token with its unescaped text and one-based source position.
///
#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

// --- Lexer -----------------------------------------------------------------

/// A streaming tokenizer.  `/* ... */` comments are skipped as trivia.
///
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Produce the next token, or `Error::Parse` on malformed input.
    ///
    pub fn next_token(&mut self) -> Result<Token, Error> {
        self.skip_trivia()?;
        let (line, column) = (self.line, self.column);
        let token = |kind, lexeme: String| Token {
            kind,
            lexeme,
            line,
            column,
        };
        let c = match self.bump() {
            Some(c) => c,
            None => return Ok(token(TokenKind::Eof, String::new())),
        };
        match c {
            '@' => Ok(token(TokenKind::At, String::new())),
            '{' => Ok(token(TokenKind::LBrace, String::new())),
            '}' => Ok(token(TokenKind::RBrace, String::new())),
            '[' => Ok(token(TokenKind::LBracket, String::new())),
            ']' => Ok(token(TokenKind::RBracket, String::new())),
            '(' => Ok(token(TokenKind::LParen, String::new())),
            ')' => Ok(token(TokenKind::RParen, String::new())),
            ':' => Ok(token(TokenKind::Colon, String::new())),
            ';' => Ok(token(TokenKind::Semicolon, String::new())),
            ',' => Ok(token(TokenKind::Comma, String::new())),
            '=' => Ok(token(TokenKind::Eq, String::new())),
            '!' => {
                if self.eat('=') {
                    Ok(token(TokenKind::Ne, String::new()))
                } else {
                    Err(Error::parse(line, column, "expected '=' after '!'"))
                }
            }
            '>' => {
                if self.eat('=') {
                    Ok(token(TokenKind::Ge, String::new()))
                } else {
                    Ok(token(TokenKind::Gt, String::new()))
                }
            }
            '<' => {
                if self.eat('=') {
                    Ok(token(TokenKind::Le, String::new()))
                } else {
                    Ok(token(TokenKind::Lt, String::new()))
                }
            }
            '"' => {
                let text = self.string(line, column)?;
                Ok(token(TokenKind::Str, text))
            }
            '-' => {
                if self.eat('-') {
                    match self.peek() {
                        Some(c) if is_ident_start(c) => {
                            Ok(token(TokenKind::Var, self.ident()))
                        }
                        _ => Err(Error::parse(
                            line,
                            column,
                            "expected a variable name after '--'",
                        )),
                    }
                } else if self.peek().map(|c| c.is_ascii_digit())
                    == Some(true)
                {
                    Ok(token(TokenKind::Number, {
                        let mut text = String::from("-");
                        text += &self.number();
                        text
                    }))
                } else {
                    Err(Error::parse(line, column, "unexpected '-'"))
                }
            }
            c if c.is_ascii_digit() => {
                let mut text = String::new();
                text.push(c);
                text += &self.number();
                Ok(token(TokenKind::Number, text))
            }
            c if is_ident_start(c) => {
                let mut text = String::new();
                text.push(c);
                text += &self.ident();
                Ok(token(TokenKind::Ident, text))
            }
            c => Err(Error::parse(
                line,
                column,
                format!("unexpected character '{}'", c),
            )),
        }
    }

    /// Capture the verbatim text up to the brace that closes the block the
    /// lexer is currently inside, consuming that brace.  Whitespace is
    /// preserved, nested braces are balanced, quoted text is opaque.
    ///
    /// Used for the `@database` body right after its `{` was tokenized.
    ///
    pub fn raw_block(&mut self) -> Result<String, Error> {
        let (line, column) = (self.line, self.column);
        let start = self.pos;
        let mut depth = 1usize;
        loop {
            let c = match self.bump() {
                Some(c) => c,
                None => {
                    return Err(Error::parse(
                        line,
                        column,
                        "unterminated block, expected '}'",
                    ));
                }
            };
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(self.source[start..self.pos - 1]
                            .to_string());
                    }
                }
                '\'' | '"' => {
                    while let Some(q) = self.bump() {
                        if q == c {
                            break;
                        }
                    }
                }
                _ => (),
            }
        }
    }

    // --- private -----------------------------------------------------------

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                self.bump();
            } else {
                break;
            }
        }
        self.source[start..self.pos].to_string()
    }

    fn number(&mut self) -> String {
        let start = self.pos;
        while self.peek().map(|c| c.is_ascii_digit()) == Some(true) {
            self.bump();
        }
        if self.peek() == Some('.')
            && self.peek_ahead(1).map(|c| c.is_ascii_digit()) == Some(true)
        {
            self.bump();
            while self.peek().map(|c| c.is_ascii_digit()) == Some(true) {
                self.bump();
            }
        }
        self.source[start..self.pos].to_string()
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(n)
    }

    fn skip_trivia(&mut self) -> Result<(), Error> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_ahead(1) == Some('*') => {
                    let (line, column) = (self.line, self.column);
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => (),
                            None => {
                                return Err(Error::parse(
                                    line,
                                    column,
                                    "unterminated comment",
                                ));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn string(
        &mut self,
        line: usize,
        column: usize,
    ) -> Result<String, Error> {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(text),
                Some('\\') => {
                    let (esc_line, esc_column) =
                        (self.line, self.column - 1);
                    match self.bump() {
                        Some('"') => text.push('"'),
                        Some('\\') => text.push('\\'),
                        Some('/') => text.push('/'),
                        Some('n') => text.push('\n'),
                        Some('r') => text.push('\r'),
                        Some('t') => text.push('\t'),
                        Some(c) => {
                            return Err(Error::parse(
                                esc_line,
                                esc_column,
                                format!("unknown escape '\\{}'", c),
                            ));
                        }
                        None => {
                            return Err(Error::parse(
                                line,
                                column,
                                "unterminated string",
                            ));
                        }
                    }
                }
                Some(c) => text.push(c),
                None => {
                    return Err(Error::parse(
                        line,
                        column,
                        "unterminated string",
                    ));
                }
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tokens(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    #[test]
    fn test_selector_tokens() {
        let kinds: Vec<TokenKind> = all_tokens("[path=\"/u/:id\"]:GET {")
            .iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::LBracket,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::Str,
                TokenKind::RBracket,
                TokenKind::Colon,
                TokenKind::Ident,
                TokenKind::LBrace,
                TokenKind::Eof,
            ],
        );
    }

    #[test]
    fn test_idents_keep_dashes() {
        let tokens = all_tokens("header(x-role)");
        assert_eq!(tokens[0].lexeme, "header");
        assert_eq!(tokens[2].lexeme, "x-role");
    }

    #[test]
    fn test_vars_and_numbers() {
        let tokens = all_tokens("--a: -1.5;");
        assert_eq!(tokens[0].kind, TokenKind::Var);
        assert_eq!(tokens[0].lexeme, "a");
        assert_eq!(tokens[2].kind, TokenKind::Number);
        assert_eq!(tokens[2].lexeme, "-1.5");
    }

    #[test]
    fn test_operators() {
        let kinds: Vec<TokenKind> = all_tokens(">= <= != = > <")
            .iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ge,
                TokenKind::Le,
                TokenKind::Ne,
                TokenKind::Eq,
                TokenKind::Gt,
                TokenKind::Lt,
                TokenKind::Eof,
            ],
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = all_tokens(r#""a\"b\n\t\\""#);
        assert_eq!(tokens[0].lexeme, "a\"b\n\t\\");
    }

    #[test]
    fn test_positions_are_one_based() {
        let mut lexer = Lexer::new("a\n  b");
        let a = lexer.next_token().unwrap();
        assert_eq!((a.line, a.column), (1, 1));
        let b = lexer.next_token().unwrap();
        assert_eq!((b.line, b.column), (2, 3));
    }

    #[test]
    fn test_bad_escape_position() {
        let mut lexer = Lexer::new("\"ab\\q\"");
        match lexer.next_token() {
            Err(Error::Parse(pe)) => {
                assert_eq!(pe.line, 1);
                assert!(pe.text.contains("\\q"), "{}", pe.text);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_comments_are_trivia() {
        let tokens = all_tokens("a /* b\nc */ d");
        assert_eq!(tokens[0].lexeme, "a");
        assert_eq!(tokens[1].lexeme, "d");
    }

    #[test]
    fn test_raw_block() {
        let source = "{ CREATE TABLE t(\n  id INTEGER\n); }";
        let mut lexer = Lexer::new(source);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::LBrace);
        let raw = lexer.raw_block().unwrap();
        assert_eq!(raw, " CREATE TABLE t(\n  id INTEGER\n); ");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_raw_block_balances_braces_and_quotes() {
        let source = "{ SELECT '}' , \"{\" ; { nested } } after";
        let mut lexer = Lexer::new(source);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::LBrace);
        let raw = lexer.raw_block().unwrap();
        assert_eq!(raw, " SELECT '}' , \"{\" ; { nested } ");
        let after = lexer.next_token().unwrap();
        assert_eq!(after.lexeme, "after");
    }
}

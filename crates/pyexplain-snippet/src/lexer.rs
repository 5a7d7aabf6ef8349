//! Lexer for the snippet language.
//!
//! Produces a flat token stream with explicit `Newline`, `Indent` and
//! `Dedent` tokens. Lines inside open brackets are joined, blank and
//! comment-only lines produce no tokens, and indentation mistakes surface as
//! `IndentationError` with CPython's wording.

use num_bigint::BigInt;

use crate::error::{ParseError, ParseResult};
use crate::token::{Keyword, Token, TokenKind};

/// CPython's tokenizer gives up past this many nested blocks.
const MAX_INDENT_LEVELS: usize = 100;

/// Tokenize a whole source text.
pub fn tokenize(source: &str) -> ParseResult<Vec<Token>> {
    let normalized = source.replace("\r\n", "\n").replace('\r', "\n");
    Lexer::new(&normalized).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    tokens: Vec<Token>,
    indents: Vec<u32>,
    brackets: Vec<(char, u32, u32)>,
    at_line_start: bool,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            tokens: Vec::new(),
            indents: vec![0],
            brackets: Vec::new(),
            at_line_start: true,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, line: u32, column: u32) {
        self.tokens.push(Token { kind, line, column });
    }

    fn run(mut self) -> ParseResult<Vec<Token>> {
        loop {
            if self.at_line_start && self.brackets.is_empty() && self.indentation()? {
                continue;
            }
            let Some(c) = self.peek() else { break };
            let (line, col) = (self.line, self.col);
            match c {
                '\n' => {
                    self.bump();
                    if self.brackets.is_empty() {
                        self.end_logical_line(line, col);
                        self.at_line_start = true;
                    }
                }
                ' ' | '\t' | '\x0c' => {
                    self.bump();
                }
                '#' => self.skip_comment(),
                '\\' => {
                    self.bump();
                    if self.peek() == Some('\n') {
                        self.bump();
                    } else {
                        return Err(ParseError::syntax(
                            "unexpected character after line continuation character",
                            line,
                            col,
                        ));
                    }
                }
                '0'..='9' => self.number()?,
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.number()?,
                '"' | '\'' => self.string(StringPrefix::default(), line, col)?,
                c if c == '_' || c.is_alphabetic() => self.identifier()?,
                _ => self.operator()?,
            }
        }
        self.finish()
    }

    /// Measure indentation at the start of a physical line. Returns `true`
    /// when the line was blank or comment-only and has been consumed.
    fn indentation(&mut self) -> ParseResult<bool> {
        let mut width = 0u32;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' => width = 0,
                _ => break,
            }
            self.bump();
        }
        match self.peek() {
            None => {
                self.at_line_start = false;
                return Ok(false);
            }
            Some('\n') => {
                self.bump();
                return Ok(true);
            }
            Some('#') => {
                self.skip_comment();
                if self.peek() == Some('\n') {
                    self.bump();
                }
                return Ok(true);
            }
            _ => {}
        }

        self.at_line_start = false;
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            if self.indents.len() > MAX_INDENT_LEVELS {
                return Err(ParseError::indentation(
                    "too many levels of indentation",
                    self.line,
                    width + 1,
                ));
            }
            self.indents.push(width);
            self.push(TokenKind::Indent, self.line, 1);
        } else if width < current {
            while self.indents.last().is_some_and(|&top| width < top) {
                self.indents.pop();
                self.push(TokenKind::Dedent, self.line, 1);
            }
            if self.indents.last().copied().unwrap_or(0) != width {
                return Err(ParseError::indentation(
                    "unindent does not match any outer indentation level",
                    self.line,
                    width + 1,
                ));
            }
        }
        Ok(false)
    }

    fn end_logical_line(&mut self, line: u32, col: u32) {
        let needs_newline = self
            .tokens
            .last()
            .is_some_and(|t| !matches!(t.kind, TokenKind::Newline));
        if needs_newline {
            self.push(TokenKind::Newline, line, col);
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn finish(mut self) -> ParseResult<Vec<Token>> {
        if let Some(&(open, line, col)) = self.brackets.last() {
            return Err(ParseError::syntax(
                format!("'{open}' was never closed"),
                line,
                col,
            ));
        }
        let (line, col) = (self.line, self.col);
        self.end_logical_line(line, col);
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, line, 1);
        }
        self.push(TokenKind::Eof, line, col);
        Ok(self.tokens)
    }

    fn identifier(&mut self) -> ParseResult<()> {
        let (line, col) = (self.line, self.col);
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }

        if matches!(self.peek(), Some('"') | Some('\'')) {
            if let Some(prefix) = StringPrefix::parse(&ident) {
                return self.string(prefix, line, col);
            }
        }

        let kind = match Keyword::from_ident(&ident) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Name(ident),
        };
        self.push(kind, line, col);
        Ok(())
    }

    fn number(&mut self) -> ParseResult<()> {
        let (line, col) = (self.line, self.col);

        if self.peek() == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x') | Some('X') => Some(16),
                Some('o') | Some('O') => Some(8),
                Some('b') | Some('B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.bump();
                self.bump();
                let mut digits = String::new();
                while let Some(c) = self.peek() {
                    if c == '_' {
                        self.bump();
                    } else if c.is_digit(radix) {
                        digits.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                let value = int_token(&digits, radix)
                    .ok_or_else(|| ParseError::syntax("invalid integer literal", line, col))?;
                self.push(value, line, col);
                return self.reject_trailing_ident(line, col);
            }
        }

        let mut text = String::new();
        let mut is_float = false;
        self.digits(&mut text);
        if self.peek() == Some('.') {
            is_float = true;
            text.push('.');
            self.bump();
            self.digits(&mut text);
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign_ok = matches!(self.peek_at(1), Some('+') | Some('-'))
                && self.peek_at(2).is_some_and(|c| c.is_ascii_digit());
            if sign_ok || self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                text.push('e');
                self.bump();
                if sign_ok {
                    if let Some(sign) = self.bump() {
                        text.push(sign);
                    }
                }
                self.digits(&mut text);
            }
        }
        if matches!(self.peek(), Some('j') | Some('J')) {
            return Err(ParseError::syntax(
                "complex numbers are not supported by the snippet evaluator",
                line,
                col,
            ));
        }

        let kind = if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| ParseError::syntax("invalid decimal literal", line, col))?;
            TokenKind::Float(value)
        } else {
            int_token(&text, 10)
                .ok_or_else(|| ParseError::syntax("invalid decimal literal", line, col))?
        };
        self.push(kind, line, col);
        self.reject_trailing_ident(line, col)
    }

    fn digits(&mut self, into: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                into.push(c);
                self.bump();
            } else if c == '_' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn reject_trailing_ident(&self, line: u32, col: u32) -> ParseResult<()> {
        match self.peek() {
            Some(c) if c == '_' || c.is_alphabetic() => {
                Err(ParseError::syntax("invalid decimal literal", line, col))
            }
            _ => Ok(()),
        }
    }

    fn string(&mut self, prefix: StringPrefix, line: u32, col: u32) -> ParseResult<()> {
        let Some(quote) = self.bump() else {
            return Ok(());
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.peek() else {
                let message = if triple {
                    format!(
                        "unterminated triple-quoted string literal (detected at line {})",
                        self.line
                    )
                } else {
                    format!("unterminated string literal (detected at line {})", self.line)
                };
                return Err(ParseError::syntax(message, line, col));
            };
            if c == '\n' && !triple {
                return Err(ParseError::syntax(
                    format!("unterminated string literal (detected at line {})", line),
                    line,
                    col,
                ));
            }
            if c == quote {
                if !triple {
                    self.bump();
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.bump();
                    self.bump();
                    self.bump();
                    break;
                }
            }
            self.bump();
            if c == '\\' && !prefix.raw {
                self.escape(&mut value);
            } else {
                value.push(c);
            }
        }

        let kind = if prefix.format {
            TokenKind::FString(value)
        } else {
            TokenKind::Str(value)
        };
        self.push(kind, line, col);
        Ok(())
    }

    fn escape(&mut self, into: &mut String) {
        let Some(c) = self.bump() else {
            into.push('\\');
            return;
        };
        match c {
            'n' => into.push('\n'),
            't' => into.push('\t'),
            'r' => into.push('\r'),
            '0' => into.push('\0'),
            '\\' => into.push('\\'),
            '\'' => into.push('\''),
            '"' => into.push('"'),
            '\n' => {}
            'x' | 'u' => {
                let width = if c == 'x' { 2 } else { 4 };
                let mut hex = String::new();
                for _ in 0..width {
                    match self.peek() {
                        Some(h) if h.is_ascii_hexdigit() => {
                            hex.push(h);
                            self.bump();
                        }
                        _ => break,
                    }
                }
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) if hex.len() == width => into.push(ch),
                    _ => {
                        into.push('\\');
                        into.push(c);
                        into.push_str(&hex);
                    }
                }
            }
            other => {
                into.push('\\');
                into.push(other);
            }
        }
    }

    fn operator(&mut self) -> ParseResult<()> {
        let (line, col) = (self.line, self.col);
        let c = self.peek().unwrap_or('\0');
        let next = self.peek_at(1);
        let next2 = self.peek_at(2);

        let (kind, width) = match (c, next, next2) {
            ('*', Some('*'), Some('=')) => (TokenKind::DoubleStarAssign, 3),
            ('/', Some('/'), Some('=')) => (TokenKind::DoubleSlashAssign, 3),
            ('*', Some('*'), _) => (TokenKind::DoubleStar, 2),
            ('/', Some('/'), _) => (TokenKind::DoubleSlash, 2),
            ('=', Some('='), _) => (TokenKind::EqEq, 2),
            ('!', Some('='), _) => (TokenKind::NotEq, 2),
            ('<', Some('='), _) => (TokenKind::LtEq, 2),
            ('>', Some('='), _) => (TokenKind::GtEq, 2),
            ('+', Some('='), _) => (TokenKind::PlusAssign, 2),
            ('-', Some('='), _) => (TokenKind::MinusAssign, 2),
            ('*', Some('='), _) => (TokenKind::StarAssign, 2),
            ('/', Some('='), _) => (TokenKind::SlashAssign, 2),
            ('%', Some('='), _) => (TokenKind::PercentAssign, 2),
            ('(', _, _) => (TokenKind::LParen, 1),
            (')', _, _) => (TokenKind::RParen, 1),
            ('[', _, _) => (TokenKind::LBracket, 1),
            (']', _, _) => (TokenKind::RBracket, 1),
            ('{', _, _) => (TokenKind::LBrace, 1),
            ('}', _, _) => (TokenKind::RBrace, 1),
            (',', _, _) => (TokenKind::Comma, 1),
            (':', _, _) => (TokenKind::Colon, 1),
            ('.', _, _) => (TokenKind::Dot, 1),
            (';', _, _) => (TokenKind::Semicolon, 1),
            ('+', _, _) => (TokenKind::Plus, 1),
            ('-', _, _) => (TokenKind::Minus, 1),
            ('*', _, _) => (TokenKind::Star, 1),
            ('/', _, _) => (TokenKind::Slash, 1),
            ('%', _, _) => (TokenKind::Percent, 1),
            ('=', _, _) => (TokenKind::Assign, 1),
            ('<', _, _) => (TokenKind::Lt, 1),
            ('>', _, _) => (TokenKind::Gt, 1),
            ('!', _, _) => return Err(ParseError::syntax("invalid syntax", line, col)),
            (other, _, _) => {
                return Err(ParseError::syntax(
                    format!("invalid character '{}' (U+{:04X})", other, other as u32),
                    line,
                    col,
                ))
            }
        };

        match kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                self.brackets.push((c, line, col));
            }
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                let Some((open, open_line, _)) = self.brackets.pop() else {
                    return Err(ParseError::syntax(format!("unmatched '{c}'"), line, col));
                };
                let expected = match open {
                    '(' => ')',
                    '[' => ']',
                    _ => '}',
                };
                if expected != c {
                    let message = if open_line == line {
                        format!(
                            "closing parenthesis '{c}' does not match opening parenthesis '{open}'"
                        )
                    } else {
                        format!(
                            "closing parenthesis '{c}' does not match opening parenthesis '{open}' on line {open_line}"
                        )
                    };
                    return Err(ParseError::syntax(message, line, col));
                }
            }
            _ => {}
        }

        for _ in 0..width {
            self.bump();
        }
        self.push(kind, line, col);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct StringPrefix {
    raw: bool,
    format: bool,
}

impl StringPrefix {
    fn parse(ident: &str) -> Option<Self> {
        let lower = ident.to_ascii_lowercase();
        let prefix = match lower.as_str() {
            "r" => StringPrefix { raw: true, format: false },
            "f" => StringPrefix { raw: false, format: true },
            "rf" | "fr" => StringPrefix { raw: true, format: true },
            "u" | "b" => StringPrefix::default(),
            "rb" | "br" => StringPrefix { raw: true, format: false },
            _ => return None,
        };
        Some(prefix)
    }
}

/// `Int` when the digits fit `i64`, `BigInt` otherwise.
fn int_token(digits: &str, radix: u32) -> Option<TokenKind> {
    if let Ok(value) = i64::from_str_radix(digits, radix) {
        return Some(TokenKind::Int(value));
    }
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    BigInt::parse_bytes(digits.as_bytes(), radix).map(TokenKind::BigInt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::ExcKind;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_assignment() {
        assert_eq!(
            kinds("x = 1 + 2.5\n"),
            vec![
                TokenKind::Name("x".into()),
                TokenKind::Assign,
                TokenKind::Int(1),
                TokenKind::Plus,
                TokenKind::Float(2.5),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_indent_and_dedent() {
        let toks = kinds("if x:\n    y = 1\nz = 2\n");
        assert!(toks.contains(&TokenKind::Indent));
        assert!(toks.contains(&TokenKind::Dedent));
        let indent = toks.iter().position(|t| *t == TokenKind::Indent).unwrap();
        let dedent = toks.iter().position(|t| *t == TokenKind::Dedent).unwrap();
        assert!(indent < dedent);
    }

    #[test]
    fn test_blank_and_comment_lines_are_skipped() {
        let toks = kinds("x = 1\n\n   # note\n\ny = 2");
        let newlines = toks.iter().filter(|t| **t == TokenKind::Newline).count();
        assert_eq!(newlines, 2);
    }

    #[test]
    fn test_brackets_join_lines() {
        let toks = kinds("x = [1,\n     2]\n");
        let newlines = toks.iter().filter(|t| **t == TokenKind::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn test_string_escapes_and_prefixes() {
        assert_eq!(kinds("'a\\nb'")[0], TokenKind::Str("a\nb".into()));
        assert_eq!(kinds("r'a\\nb'")[0], TokenKind::Str("a\\nb".into()));
        assert_eq!(kinds("f\"x={x}\"")[0], TokenKind::FString("x={x}".into()));
        assert_eq!(kinds("'''a\nb'''")[0], TokenKind::Str("a\nb".into()));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("x = 'abc\n").unwrap_err();
        assert_eq!(err.kind, ExcKind::SyntaxError);
        assert!(err.message.starts_with("unterminated string literal"));
    }

    #[test]
    fn test_unclosed_bracket() {
        let err = tokenize("print(1, 2\n").unwrap_err();
        assert_eq!(err.message, "'(' was never closed");
        assert_eq!((err.line, err.column), (1, 6));
    }

    #[test]
    fn test_mismatched_bracket() {
        let err = tokenize("x = (1]\n").unwrap_err();
        assert_eq!(
            err.message,
            "closing parenthesis ']' does not match opening parenthesis '('"
        );
    }

    #[test]
    fn test_bad_dedent() {
        let err = tokenize("if x:\n        a = 1\n    b = 2\n").unwrap_err();
        assert_eq!(err.kind, ExcKind::IndentationError);
        assert_eq!(
            err.message,
            "unindent does not match any outer indentation level"
        );
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_indentation_depth_is_bounded() {
        let mut src = String::new();
        for level in 0..120 {
            src.push_str(&" ".repeat(level));
            src.push_str("if x:\n");
        }
        src.push_str(&" ".repeat(120));
        src.push_str("pass\n");
        let err = tokenize(&src).unwrap_err();
        assert_eq!(err.kind, ExcKind::IndentationError);
        assert_eq!(err.message, "too many levels of indentation");
        assert_eq!(err.line, 102);
    }

    #[test]
    fn test_invalid_character() {
        let err = tokenize("x = 1 $ 2").unwrap_err();
        assert!(err.message.starts_with("invalid character '$'"));
    }

    #[test]
    fn test_radix_and_underscore_literals() {
        assert_eq!(kinds("0xff")[0], TokenKind::Int(255));
        assert_eq!(kinds("1_000")[0], TokenKind::Int(1000));
        let big: BigInt = "9223372036854775808".parse().unwrap();
        assert_eq!(kinds("9223372036854775808")[0], TokenKind::BigInt(big));
        assert!(matches!(kinds("0x1_0000_0000_0000_0000")[0], TokenKind::BigInt(_)));
        assert_eq!(kinds("1e3")[0], TokenKind::Float(1000.0));
    }
}

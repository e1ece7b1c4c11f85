//! Lua 5.4 tokenizer
//!
//! Tokens keep their raw source text so string and number literals can be
//! re-emitted exactly as written.

use super::ParseError;

/// Token categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier
    Name,
    /// Reserved word (`and`, `end`, `function`, ...)
    Keyword,
    /// Numeric literal
    Number,
    /// Short or long string literal
    Str,
    /// Operator or punctuation
    Symbol,
    /// End of input
    Eof,
}

/// A single token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Category
    pub kind: TokenKind,
    /// Raw text as it appears in the source
    pub text: String,
    /// 1-based line where the token starts
    pub line: u32,
}

impl Token {
    /// Whether this token is the given symbol
    #[must_use]
    pub fn is_symbol(&self, sym: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == sym
    }

    /// Whether this token is the given keyword
    #[must_use]
    pub fn is_keyword(&self, kw: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == kw
    }
}

const KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
    "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

// Longest first so greedy matching works.
const SYMBOLS: &[&str] = &[
    "...", "..", "==", "~=", "<=", ">=", "<<", ">>", "//", "::", "+", "-", "*", "/", "%", "^", "#",
    "&", "~", "|", "<", ">", "=", "(", ")", "{", "}", "[", "]", ";", ":", ",", ".",
];

/// Tokenize a whole chunk
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source).run()
}

const fn is_newline(c: u8) -> bool {
    c == b'\n' || c == b'\r'
}

/// Length of the line break at the start of `bytes`
///
/// `\n`, `\r`, `\r\n` and `\n\r` each count as one break, as in Lua.
fn newline_len(bytes: &[u8]) -> usize {
    match bytes {
        [a, b, ..] if is_newline(*a) && is_newline(*b) && a != b => 2,
        [a, ..] if is_newline(*a) => 1,
        _ => 0,
    }
}

/// Split text at every Lua line break
///
/// Like `str::split('\n')`, a trailing break yields a final empty part.
#[must_use]
pub fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let (mut start, mut i) = (0, 0);
    while i < bytes.len() {
        match newline_len(&bytes[i..]) {
            0 => i += 1,
            n => {
                parts.push(&text[start..i]);
                i += n;
                start = i;
            }
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Number of lines in `source`, counting line breaks the way Lua does
///
/// Agrees with `str::lines().count()` for `\n`-terminated text.
#[must_use]
pub fn count_lines(source: &str) -> u32 {
    let mut parts = split_lines(source);
    if parts.last().is_some_and(|p| p.is_empty()) {
        let _ = parts.pop();
    }
    parts.len() as u32
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    fn peek(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn at_newline(&self) -> bool {
        is_newline(self.peek(0))
    }

    fn skip_newline(&mut self) {
        self.pos += newline_len(&self.bytes[self.pos..]);
        self.line += 1;
    }

    fn skip_to_line_end(&mut self) {
        while self.pos < self.bytes.len() && !self.at_newline() {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, message)
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        if self.bytes.starts_with(b"#") {
            self.skip_to_line_end();
        }
        loop {
            self.skip_trivia()?;
            if self.pos >= self.bytes.len() {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    text: String::new(),
                    line: self.line,
                });
                return Ok(tokens);
            }
            tokens.push(self.next_token()?);
        }
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        while self.pos < self.bytes.len() {
            match self.peek(0) {
                b'\n' | b'\r' => self.skip_newline(),
                b' ' | b'\t' | 0x0b | 0x0c => self.pos += 1,
                b'-' if self.peek(1) == b'-' => {
                    self.pos += 2;
                    if let Some(level) = self.long_bracket_level() {
                        self.read_long_bracket(level)?;
                    } else {
                        self.skip_to_line_end();
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// If positioned at `[`, `[=`, `[==` ... followed by `[`, return the level
    fn long_bracket_level(&self) -> Option<usize> {
        if self.peek(0) != b'[' {
            return None;
        }
        let mut level = 0;
        while self.peek(1 + level) == b'=' {
            level += 1;
        }
        (self.peek(1 + level) == b'[').then_some(level)
    }

    fn read_long_bracket(&mut self, level: usize) -> Result<(), ParseError> {
        let start_line = self.line;
        self.pos += level + 2;
        while self.pos < self.bytes.len() {
            match self.peek(0) {
                b'\n' | b'\r' => self.skip_newline(),
                b']' => {
                    let mut eq = 0;
                    while self.peek(1 + eq) == b'=' {
                        eq += 1;
                    }
                    if eq == level && self.peek(1 + eq) == b']' {
                        self.pos += level + 2;
                        return Ok(());
                    }
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
        Err(ParseError::new(
            start_line,
            "unfinished long string or comment",
        ))
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        let line = self.line;
        let c = self.peek(0);

        let kind = if c.is_ascii_alphabetic() || c == b'_' {
            while self.peek(0).is_ascii_alphanumeric() || self.peek(0) == b'_' {
                self.pos += 1;
            }
            if KEYWORDS.contains(&&self.src[start..self.pos]) {
                TokenKind::Keyword
            } else {
                TokenKind::Name
            }
        } else if c.is_ascii_digit() || (c == b'.' && self.peek(1).is_ascii_digit()) {
            self.read_number();
            TokenKind::Number
        } else if c == b'"' || c == b'\'' {
            self.read_short_string(c)?;
            TokenKind::Str
        } else if let Some(level) = self.long_bracket_level() {
            self.read_long_bracket(level)?;
            TokenKind::Str
        } else {
            let rest = &self.src[self.pos..];
            let sym = SYMBOLS
                .iter()
                .find(|s| rest.starts_with(**s))
                .ok_or_else(|| self.error(format!("unexpected character '{}'", c as char)))?;
            self.pos += sym.len();
            TokenKind::Symbol
        };

        Ok(Token {
            kind,
            text: self.src[start..self.pos].to_string(),
            line,
        })
    }

    fn read_number(&mut self) {
        let hex = self.peek(0) == b'0' && matches!(self.peek(1), b'x' | b'X');
        if hex {
            self.pos += 2;
        }
        let exponent: &[u8] = if hex { b"pP" } else { b"eE" };
        loop {
            let c = self.peek(0);
            if exponent.contains(&c) {
                self.pos += 1;
                if matches!(self.peek(0), b'+' | b'-') {
                    self.pos += 1;
                }
            } else if c.is_ascii_hexdigit() && (hex || c.is_ascii_digit()) || c == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn read_short_string(&mut self, quote: u8) -> Result<(), ParseError> {
        let start_line = self.line;
        self.pos += 1;
        while self.pos < self.bytes.len() {
            match self.peek(0) {
                b'\\' => match self.peek(1) {
                    b'\n' | b'\r' => {
                        self.pos += 1;
                        self.skip_newline();
                    }
                    // `\z` skips the following whitespace, line breaks included
                    b'z' => {
                        self.pos += 2;
                        loop {
                            match self.peek(0) {
                                b'\n' | b'\r' => self.skip_newline(),
                                b' ' | b'\t' | 0x0b | 0x0c => self.pos += 1,
                                _ => break,
                            }
                        }
                    }
                    _ => self.pos += 2,
                },
                b'\n' | b'\r' => return Err(ParseError::new(start_line, "unfinished string")),
                c if c == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => self.pos += 1,
            }
        }
        Err(ParseError::new(start_line, "unfinished string"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<(TokenKind, String)> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_names_keywords_and_symbols() {
        let toks = kinds("local x = a..b");
        assert_eq!(toks[0], (TokenKind::Keyword, "local".to_string()));
        assert_eq!(toks[1], (TokenKind::Name, "x".to_string()));
        assert_eq!(toks[2], (TokenKind::Symbol, "=".to_string()));
        assert_eq!(toks[4], (TokenKind::Symbol, "..".to_string()));
        assert_eq!(toks.last().unwrap().0, TokenKind::Eof);
    }

    #[test]
    fn test_numbers_keep_raw_text() {
        let toks = kinds("0x1F 3.5e-2 .5 0xA.8p1 10");
        let nums: Vec<_> = toks
            .iter()
            .filter(|(k, _)| *k == TokenKind::Number)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(nums, vec!["0x1F", "3.5e-2", ".5", "0xA.8p1", "10"]);
    }

    #[test]
    fn test_comments_are_skipped_and_lines_counted() {
        let toks = tokenize("-- one\n--[[ two\nthree ]] x\n--[==[ ]] ]==] y").unwrap();
        assert_eq!(toks[0].text, "x");
        assert_eq!(toks[0].line, 3);
        assert_eq!(toks[1].text, "y");
        assert_eq!(toks[1].line, 4);
    }

    #[test]
    fn test_strings_with_escapes_and_long_brackets() {
        let toks = tokenize("s = 'it\\'s' t = [[a\nb]] u = \"x\\\ny\" v").unwrap();
        assert_eq!(toks[2].text, "'it\\'s'");
        assert_eq!(toks[5].text, "[[a\nb]]");
        assert_eq!(toks[8].text, "\"x\\\ny\"");
        assert_eq!(toks[9].line, 3);
    }

    #[test]
    fn test_z_escape_skips_line_breaks() {
        let toks = tokenize("s = \"a\\z\n   b\"\nreturn s\n").unwrap();
        assert_eq!(toks[2].kind, TokenKind::Str);
        assert_eq!(toks[2].text, "\"a\\z\n   b\"");
        assert!(toks[3].is_keyword("return"));
        assert_eq!(toks[3].line, 3);

        let toks = tokenize("s = 'a\\z\r\n\r\n  b' x").unwrap();
        assert_eq!(toks[3].text, "x");
        assert_eq!(toks[3].line, 3);
    }

    #[test]
    fn test_escaped_crlf_and_bare_cr_line_breaks() {
        let toks = tokenize("s = 'a\\\r\nb'\r\nx\ry\n\rz").unwrap();
        assert_eq!(toks[2].text, "'a\\\r\nb'");
        assert_eq!((toks[3].text.as_str(), toks[3].line), ("x", 3));
        assert_eq!((toks[4].text.as_str(), toks[4].line), ("y", 4));
        assert_eq!((toks[5].text.as_str(), toks[5].line), ("z", 5));
    }

    #[test]
    fn test_count_and_split_lines() {
        assert_eq!(count_lines(""), 0);
        assert_eq!(count_lines("a\nb\n"), 2);
        assert_eq!(count_lines("a\r\nb"), 2);
        assert_eq!(count_lines("a\rb\rc\r"), 3);
        assert_eq!(count_lines("a\n\nb"), 3);
        assert_eq!(split_lines("a\r\nb\n\rc\n"), vec!["a", "b", "c", ""]);
    }

    #[test]
    fn test_shebang_is_ignored() {
        let toks = tokenize("#!/usr/bin/lua\nreturn 1").unwrap();
        assert!(toks[0].is_keyword("return"));
        assert_eq!(toks[0].line, 2);
    }

    #[test]
    fn test_unfinished_string_is_error() {
        let err = tokenize("x = 'abc\ny = 1").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("unfinished string"));
    }

    #[test]
    fn test_unfinished_long_comment_is_error() {
        assert!(tokenize("--[[ never closed").is_err());
    }
}

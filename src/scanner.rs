//! Rune-level scanner.
//!
//! The scanner is a state machine in the style of Rob Pike's "Lexical Scanning
//! in Go": each state consumes input and names the state that follows. Tokens
//! are handed to an emitter callback one at a time, so a consumer on another
//! thread can receive them through a rendezvous channel while scanning is still
//! in progress (see [`crate::parser`]).
//!
//! Lexical errors are reported to an optional caller-supplied handler and are
//! also emitted as [`TokenKind::Error`] tokens, so a consumer always sees a
//! terminating [`TokenKind::Eof`] and never blocks waiting for input that will
//! not arrive.

use crate::Location;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    Symbol,
    Number,
    /// String literal, delimiters included in the token text
    Str,
    /// Character literal, leading backslash included in the token text
    Char,
    /// `^`, introduces an annotation
    Caret,
    /// `'`, quote shorthand
    Quote,
    /// A lexical error with its message
    Error(String),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// The source text covered by this token
    pub text: String,
    pub location: Location,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenKind::Eof => write!(f, "EOF"),
            TokenKind::Error(message) => write!(f, "{message}"),
            _ => write!(f, "{}", self.text),
        }
    }
}

/// Callback receiving every lexical error together with the offending token
pub type ErrorHandler<'a> = Box<dyn FnMut(&Token, &str) + Send + 'a>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Begin,
    Number,
    Symbol,
    Str,
    Char,
    LineComment,
    BlockComment,
}

pub struct Scanner<'a> {
    name: Arc<str>,
    input: &'a str,
    /// Byte offset where the pending token starts
    start: usize,
    /// Line number at `start`
    start_line: usize,
    /// Current byte offset
    pos: usize,
    /// Current line number
    line: usize,
    /// Width of the last rune read, for `backup`
    width: usize,
    error_count: usize,
    error_handler: Option<ErrorHandler<'a>>,
}

impl<'a> Scanner<'a> {
    pub fn new(name: impl Into<Arc<str>>, input: &'a str) -> Self {
        Scanner {
            name: name.into(),
            input,
            start: 0,
            start_line: 1,
            pos: 0,
            line: 1,
            width: 0,
            error_count: 0,
            error_handler: None,
        }
    }

    pub fn with_error_handler(mut self, handler: ErrorHandler<'a>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Scan the whole input, handing each token to `emit`.
    ///
    /// Scanning stops early when `emit` returns `false`, which is how a
    /// consumer that has gone away shuts the scanner down. Returns the number
    /// of lexical errors found.
    pub fn run(mut self, mut emit: impl FnMut(Token) -> bool) -> usize {
        let mut state = Some(State::Begin);
        while let Some(current) = state {
            match self.step(current, &mut emit) {
                Ok(next) => state = next,
                Err(Disconnected) => break,
            }
        }
        self.error_count
    }

    fn step(
        &mut self,
        state: State,
        emit: &mut impl FnMut(Token) -> bool,
    ) -> Result<Option<State>, Disconnected> {
        match state {
            State::Begin => self.scan_begin(emit),
            State::Number => self.scan_number(emit).map(Some),
            State::Symbol => {
                while self.next().is_some_and(is_symbolic) {}
                self.backup();
                self.emit(TokenKind::Symbol, emit)?;
                Ok(Some(State::Begin))
            }
            State::Str => self.scan_string(emit).map(Some),
            State::Char => {
                // First rune is taken verbatim; a run of letters may follow (`\newline`)
                self.next();
                if self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
                    while self.next().is_some_and(|c| c.is_ascii_alphabetic()) {}
                    self.backup();
                }
                self.emit(TokenKind::Char, emit)?;
                Ok(Some(State::Begin))
            }
            State::LineComment => {
                while self.next().is_some_and(|c| c != '\n' && c != '\r') {}
                self.backup();
                self.ignore();
                Ok(Some(State::Begin))
            }
            State::BlockComment => self.scan_block_comment(emit).map(Some),
        }
    }

    fn scan_begin(
        &mut self,
        emit: &mut impl FnMut(Token) -> bool,
    ) -> Result<Option<State>, Disconnected> {
        loop {
            let Some(c) = self.next() else {
                self.emit(TokenKind::Eof, emit)?;
                return Ok(None);
            };

            match c {
                ' ' | '\t' | '\r' | '\n' => self.ignore(),
                '(' => self.emit(TokenKind::LeftParen, emit)?,
                ')' => self.emit(TokenKind::RightParen, emit)?,
                '0'..='9' => {
                    self.rewind();
                    return Ok(Some(State::Number));
                }
                '+' | '-' => {
                    let next_is_digit = self.peek().is_some_and(|n| n.is_ascii_digit());
                    self.rewind();
                    return Ok(Some(if next_is_digit {
                        State::Number
                    } else {
                        State::Symbol
                    }));
                }
                '^' => self.emit(TokenKind::Caret, emit)?,
                '\'' => self.emit(TokenKind::Quote, emit)?,
                '\\' => return Ok(Some(State::Char)),
                ';' => return Ok(Some(State::LineComment)),
                '"' => return Ok(Some(State::Str)),
                '#' => match self.next() {
                    Some('|') => return Ok(Some(State::BlockComment)),
                    Some(other) => self.emit_error(
                        format!("unrecognized character sequence: '#{other}'"),
                        emit,
                    )?,
                    None => self.emit_error("unrecognized character sequence: '#'", emit)?,
                },
                c if is_symbolic(c) => {
                    self.rewind();
                    return Ok(Some(State::Symbol));
                }
                c => self.emit_error(format!("unrecognized character: '{c}'"), emit)?,
            }
        }
    }

    fn scan_number(&mut self, emit: &mut impl FnMut(Token) -> bool) -> Result<State, Disconnected> {
        const DECIMAL: &str = "0123456789";
        const HEXADECIMAL: &str = "0123456789abcdefABCDEF";

        self.accept("+-");
        let mut digits = DECIMAL;
        if self.accept("0") && self.accept("xX") {
            digits = HEXADECIMAL;
        }
        self.accept_run(digits);
        if self.accept(".") {
            self.accept_run(digits);
        }
        if self.accept("eE") {
            self.accept("+-");
            self.accept_run(DECIMAL);
        }

        // A number must end on a boundary
        if self.peek().is_some_and(|c| c.is_ascii_alphanumeric()) {
            self.next();
            let text = &self.input[self.start..self.pos];
            self.emit_error(format!("bad number syntax: \"{text}\""), emit)?;
        } else {
            self.emit(TokenKind::Number, emit)?;
        }
        Ok(State::Begin)
    }

    fn scan_string(&mut self, emit: &mut impl FnMut(Token) -> bool) -> Result<State, Disconnected> {
        // Runs to the next delimiter; no escape processing
        loop {
            match self.next() {
                Some('"') => {
                    self.emit(TokenKind::Str, emit)?;
                    return Ok(State::Begin);
                }
                Some(_) => {}
                None => {
                    self.emit_error("unterminated string", emit)?;
                    return Ok(State::Begin);
                }
            }
        }
    }

    fn scan_block_comment(
        &mut self,
        emit: &mut impl FnMut(Token) -> bool,
    ) -> Result<State, Disconnected> {
        while let Some(c) = self.next() {
            if c == '|' {
                if self.next() == Some('#') {
                    self.ignore();
                    return Ok(State::Begin);
                }
                // The rune after '|' may itself start the terminator
                self.backup();
            }
        }
        self.emit_error("non-terminated multiline comment", emit)?;
        Ok(State::Begin)
    }

    fn next(&mut self) -> Option<char> {
        let c = self.input[self.pos..].chars().next();
        match c {
            Some(c) => {
                self.width = c.len_utf8();
                self.pos += self.width;
                if c == '\n' {
                    self.line += 1;
                }
            }
            None => self.width = 0,
        }
        c
    }

    /// Step back one rune. Valid once per call of `next`.
    fn backup(&mut self) {
        self.pos -= self.width;
        if self.width > 0 && self.input[self.pos..].starts_with('\n') {
            self.line -= 1;
        }
        self.width = 0;
    }

    fn peek(&mut self) -> Option<char> {
        let c = self.next();
        self.backup();
        c
    }

    /// Return to the start of the pending token.
    fn rewind(&mut self) {
        self.pos = self.start;
        self.line = self.start_line;
        self.width = 0;
    }

    fn ignore(&mut self) {
        self.start = self.pos;
        self.start_line = self.line;
    }

    fn accept(&mut self, valid: &str) -> bool {
        if self.next().is_some_and(|c| valid.contains(c)) {
            return true;
        }
        self.backup();
        false
    }

    fn accept_run(&mut self, valid: &str) {
        while self.next().is_some_and(|c| valid.contains(c)) {}
        self.backup();
    }

    fn token(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            text: self.input[self.start..self.pos].to_owned(),
            location: Location::new(Arc::clone(&self.name), self.start_line, self.start),
        }
    }

    fn emit(
        &mut self,
        kind: TokenKind,
        emit: &mut impl FnMut(Token) -> bool,
    ) -> Result<(), Disconnected> {
        let token = self.token(kind);
        self.ignore();
        if emit(token) { Ok(()) } else { Err(Disconnected) }
    }

    fn emit_error(
        &mut self,
        message: impl Into<String>,
        emit: &mut impl FnMut(Token) -> bool,
    ) -> Result<(), Disconnected> {
        let message = message.into();
        let token = self.token(TokenKind::Error(message.clone()));
        if let Some(handler) = self.error_handler.as_mut() {
            handler(&token, &message);
        }
        self.error_count += 1;
        self.ignore();
        if emit(token) { Ok(()) } else { Err(Disconnected) }
    }
}

/// The token consumer has gone away.
struct Disconnected;

/// Characters allowed in symbols. `[ ] { } ( ) " , ' ` : ; # | \ ~` are reserved.
pub(crate) fn is_symbolic(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '?' | '+' | '-' | '*' | '/' | '=' | '<' | '>' | '!' | '&' | '_'
        )
}

/// Scan a whole source into a vector of tokens, ending with [`TokenKind::Eof`].
pub fn tokenize(name: &str, input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    Scanner::new(name, input).run(|token| {
        tokens.push(token);
        true
    });
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn kinds(input: &str) -> Vec<(TokenKind, String)> {
        tokenize("test", input)
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    fn tok(kind: TokenKind, text: &str) -> (TokenKind, String) {
        (kind, text.to_owned())
    }

    #[test]
    fn test_scanning_data_driven() {
        use TokenKind::*;

        let test_cases = vec![
            ("", vec![tok(Eof, "")]),
            (
                "(+ 1 2)",
                vec![
                    tok(LeftParen, "("),
                    tok(Symbol, "+"),
                    tok(Number, "1"),
                    tok(Number, "2"),
                    tok(RightParen, ")"),
                    tok(Eof, ""),
                ],
            ),
            (
                "-5 +3.25 - -x 1e10 2.5E-3 0x1F",
                vec![
                    tok(Number, "-5"),
                    tok(Number, "+3.25"),
                    tok(Symbol, "-"),
                    tok(Symbol, "-x"),
                    tok(Number, "1e10"),
                    tok(Number, "2.5E-3"),
                    tok(Number, "0x1F"),
                    tok(Eof, ""),
                ],
            ),
            (
                "'foo ^int bar",
                vec![
                    tok(Quote, "'"),
                    tok(Symbol, "foo"),
                    tok(Caret, "^"),
                    tok(Symbol, "int"),
                    tok(Symbol, "bar"),
                    tok(Eof, ""),
                ],
            ),
            (
                "\"hello world\" \\a \\newline \\(",
                vec![
                    tok(Str, "\"hello world\""),
                    tok(Char, "\\a"),
                    tok(Char, "\\newline"),
                    tok(Char, "\\("),
                    tok(Eof, ""),
                ],
            ),
            (
                "a ; comment (ignored)\nb #| block\n comment |# c",
                vec![
                    tok(Symbol, "a"),
                    tok(Symbol, "b"),
                    tok(Symbol, "c"),
                    tok(Eof, ""),
                ],
            ),
            (
                "update! a&b? <= _x",
                vec![
                    tok(Symbol, "update!"),
                    tok(Symbol, "a&b?"),
                    tok(Symbol, "<="),
                    tok(Symbol, "_x"),
                    tok(Eof, ""),
                ],
            ),
            // No escape processing: the string ends at the first delimiter
            (
                "\"a\\\"b",
                vec![tok(Str, "\"a\\\""), tok(Symbol, "b"), tok(Eof, "")],
            ),
            ("#| a || b |#x", vec![tok(Symbol, "x"), tok(Eof, "")]),
        ];

        for (input, expected) in test_cases {
            assert_eq!(kinds(input), expected, "input: {input:?}");
        }
    }

    #[test]
    fn test_scan_errors_data_driven() {
        let test_cases = vec![
            ("12abc", "bad number syntax: \"12a\""),
            ("#x", "unrecognized character sequence: '#x'"),
            ("[", "unrecognized character: '['"),
            ("#| never closed", "non-terminated multiline comment"),
            ("\"open", "unterminated string"),
        ];

        for (input, expected) in test_cases {
            let tokens = tokenize("test", input);
            let messages: Vec<_> = tokens
                .iter()
                .filter_map(|t| match &t.kind {
                    TokenKind::Error(message) => Some(message.as_str()),
                    _ => None,
                })
                .collect();
            assert_eq!(messages, vec![expected], "input: {input:?}");
            assert_eq!(
                tokens.last().map(|t| t.kind.clone()),
                Some(TokenKind::Eof),
                "input: {input:?}"
            );
        }
    }

    #[test]
    fn test_error_handler_receives_errors() {
        let seen = Mutex::new(Vec::new());
        let count = Scanner::new("test", "a [ b ~")
            .with_error_handler(Box::new(|token, message| {
                if let Ok(mut seen) = seen.lock() {
                    seen.push((token.location.pos, message.to_owned()));
                }
            }))
            .run(|_| true);

        assert_eq!(count, 2);
        let seen = seen.into_inner().unwrap_or_default();
        assert_eq!(
            seen,
            vec![
                (2, "unrecognized character: '['".to_owned()),
                (6, "unrecognized character: '~'".to_owned()),
            ]
        );
    }

    #[test]
    fn test_line_numbers() {
        let tokens = tokenize("test", "a\nb ; c\n\n#| x\ny |# d \"e\nf\" g");
        let lines: Vec<_> = tokens
            .iter()
            .map(|t| (t.text.as_str(), t.location.line))
            .collect();
        assert_eq!(
            lines,
            vec![
                ("a", 1),
                ("b", 2),
                ("d", 5),
                ("\"e\nf\"", 5),
                ("g", 6),
                ("", 6),
            ]
        );
    }

    #[test]
    fn test_stops_when_consumer_disconnects() {
        let mut received = 0;
        Scanner::new("test", "a b c d e").run(|_| {
            received += 1;
            received < 2
        });
        assert_eq!(received, 2);
    }
}

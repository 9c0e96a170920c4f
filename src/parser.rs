//! Recursive-descent parser over the scanner's token stream.
//!
//! Grammar:
//!
//! ```text
//! node      := atom | list | quoted | annotated
//! list      := '(' node* ')'
//! quoted    := "'" node                 ; desugars to (quote node)
//! annotated := '^' node node            ; first node annotates the second
//! ```
//!
//! The scanner runs on its own scoped thread and hands tokens over an
//! unbuffered channel; the parser blocks until each token exists. Errors never
//! stop the parse: each one is recorded and a `nil` placeholder stands in for
//! the broken node, so a single pass reports every independent problem.
//! Nesting deeper than [`MAX_PARSE_DEPTH`] is one such problem; the offending
//! node is skipped without recursing into it.

use nom::{
    IResult, Parser as _,
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{hex_digit1, one_of},
    combinator::{all_consuming, map_res, opt},
    number::complete::double,
};

use crate::ast::{Node, NumberType};
use crate::scanner::{Scanner, Token, TokenKind};
use crate::stack::ensure_sufficient_stack;
use crate::{Location, MAX_PARSE_DEPTH, ParseError, ParseErrors};
use crossbeam::channel::{self, Receiver};
use std::sync::Arc;

/// Parse a whole source, returning every top-level node and every error found.
pub fn parse_with_errors(input: &str, source_name: &str) -> (Vec<Node>, ParseErrors) {
    let source_name: Arc<str> = Arc::from(source_name);

    let (nodes, mut errors) = std::thread::scope(|scope| {
        let (sender, receiver) = channel::bounded::<Token>(0);
        let scanner = Scanner::new(Arc::clone(&source_name), input);
        scope.spawn(move || scanner.run(|token| sender.send(token).is_ok()));

        let mut parser = TokenParser::new(receiver, source_name);
        let nodes = parser.parse_nodes();
        (nodes, parser.errors)
    });

    errors.sort();
    tracing::debug!(nodes = nodes.len(), errors = errors.len(), "parsed source");
    (nodes, errors)
}

/// Parse a whole source; any error means no nodes are returned.
pub fn parse(input: &str, source_name: &str) -> Result<Vec<Node>, ParseErrors> {
    let (nodes, errors) = parse_with_errors(input, source_name);
    if errors.is_empty() {
        Ok(nodes)
    } else {
        Err(errors)
    }
}

struct TokenParser {
    tokens: Receiver<Token>,
    /// Two-token lookahead buffer; `lookahead[count - 1]` is the next token
    lookahead: [Option<Token>; 2],
    count: usize,
    source_name: Arc<str>,
    /// Location of the most recent token, for a synthesized end of input
    last_location: Option<Location>,
    /// Lists, quotes and annotations currently open
    depth: usize,
    errors: ParseErrors,
}

impl TokenParser {
    fn new(tokens: Receiver<Token>, source_name: Arc<str>) -> Self {
        TokenParser {
            tokens,
            lookahead: [None, None],
            count: 0,
            source_name,
            last_location: None,
            depth: 0,
            errors: ParseErrors::default(),
        }
    }

    /// Receive the next token from the scanner, recording and skipping error tokens.
    fn receive(&mut self) -> Token {
        loop {
            let token = match self.tokens.recv() {
                Ok(token) => token,
                // Scanner finished without a trailing EOF (it never does, but a
                // closed channel means the same thing)
                Err(_) => Token {
                    kind: TokenKind::Eof,
                    text: String::new(),
                    location: self.last_location.clone().unwrap_or_else(|| {
                        Location::new(Arc::clone(&self.source_name), 1, 0)
                    }),
                },
            };
            tracing::trace!(token = %token, line = token.location.line, "token");
            self.last_location = Some(token.location.clone());

            match &token.kind {
                TokenKind::Error(message) => {
                    self.errors
                        .push(ParseError::new(message.clone(), token.location.clone()));
                }
                _ => return token,
            }
        }
    }

    fn next(&mut self) -> Token {
        if self.count > 0 {
            self.count -= 1;
            if let Some(token) = self.lookahead[self.count].take() {
                return token;
            }
        }
        self.receive()
    }

    fn backup(&mut self, token: Token) {
        self.lookahead[self.count] = Some(token);
        self.count += 1;
    }

    fn peek(&mut self) -> TokenKind {
        if self.count == 0 {
            let token = self.receive();
            self.backup(token);
        }
        match &self.lookahead[self.count - 1] {
            Some(token) => token.kind.clone(),
            None => TokenKind::Eof,
        }
    }

    fn error(&mut self, message: impl Into<String>, location: &Location) {
        self.errors.push(ParseError::new(message, location.clone()));
    }

    fn parse_nodes(&mut self) -> Vec<Node> {
        let mut nodes = Vec::new();
        while self.peek() != TokenKind::Eof {
            nodes.push(self.parse_node());
        }
        nodes
    }

    fn parse_node(&mut self) -> Node {
        if self.depth >= MAX_PARSE_DEPTH {
            return self.skip_nested_node();
        }

        self.depth += 1;
        let node = ensure_sufficient_stack(|| self.parse_node_at_depth());
        self.depth -= 1;
        node
    }

    /// Record a nesting error and consume the next node iteratively.
    fn skip_nested_node(&mut self) -> Node {
        let location = match self.peek() {
            TokenKind::Eof | TokenKind::RightParen => {
                // Nothing to skip; the caller reports the missing node
                return self.parse_node_at_depth();
            }
            _ => self.lookahead_location(),
        };
        self.error(
            format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
            &location,
        );

        // Nodes still to consume, and parentheses open inside the current one
        let mut pending = 1usize;
        let mut open = 0usize;
        while pending > 0 {
            let kind = self.peek();
            if kind == TokenKind::Eof || (kind == TokenKind::RightParen && open == 0) {
                break;
            }
            self.next();
            match kind {
                TokenKind::LeftParen => open += 1,
                TokenKind::RightParen => {
                    open -= 1;
                    if open == 0 {
                        pending -= 1;
                    }
                }
                TokenKind::Caret if open == 0 => pending += 1,
                TokenKind::Quote if open == 0 => {}
                _ if open == 0 => pending -= 1,
                _ => {}
            }
        }
        Node::nil().with_location(location)
    }

    fn lookahead_location(&self) -> Location {
        match self.count.checked_sub(1).and_then(|i| self.lookahead[i].as_ref()) {
            Some(token) => token.location.clone(),
            None => Location::new(Arc::clone(&self.source_name), 1, 0),
        }
    }

    fn parse_node_at_depth(&mut self) -> Node {
        let token = self.next();
        let location = token.location.clone();

        match token.kind {
            TokenKind::LeftParen => self.parse_list(location),
            TokenKind::RightParen => {
                self.error("Unbalanced parentheses", &location);
                Node::nil().with_location(location)
            }
            TokenKind::Number => self.parse_number(&token),
            TokenKind::Symbol if token.text == "nil" => Node::nil().with_location(location),
            TokenKind::Symbol => Node::symbol(token.text).with_location(location),
            TokenKind::Str => {
                let content = &token.text[1..token.text.len() - 1];
                Node::string(content).with_location(location)
            }
            TokenKind::Char => self.parse_char(&token),
            TokenKind::Caret => {
                let annotation = self.parse_node();
                self.parse_node().with_annotation(annotation)
            }
            TokenKind::Quote => {
                let quoted = self.parse_node();
                Node::list(vec![
                    Node::symbol("quote").with_location(location.clone()),
                    quoted,
                ])
                .with_location(location)
            }
            TokenKind::Eof => {
                // A prefix token was the last thing in the input
                self.error("Unexpected end of input", &location);
                self.backup(token);
                Node::nil().with_location(location)
            }
            TokenKind::Error(_) => Node::nil().with_location(location),
        }
    }

    fn parse_list(&mut self, open: Location) -> Node {
        let mut nodes = Vec::new();
        loop {
            match self.peek() {
                TokenKind::RightParen => {
                    self.next();
                    return Node::list(nodes).with_location(open);
                }
                TokenKind::Eof => {
                    self.error("Unbalanced parentheses", &open);
                    return Node::nil().with_location(open);
                }
                _ => nodes.push(self.parse_node()),
            }
        }
    }

    fn parse_number(&mut self, token: &Token) -> Node {
        match number_literal(&token.text) {
            Some(n) => Node::number(n).with_location(token.location.clone()),
            None => {
                self.error(format!("Invalid number: {}", token.text), &token.location);
                Node::number(0.0).with_location(token.location.clone())
            }
        }
    }

    fn parse_char(&mut self, token: &Token) -> Node {
        let mut chars = token.text.chars().skip(1);
        let c = match (token.text.as_str(), chars.next(), chars.next()) {
            ("\\newline", _, _) => Some('\n'),
            (_, Some(c), None) => Some(c),
            _ => None,
        };

        match c {
            Some(c) => Node::char(c).with_location(token.location.clone()),
            None => {
                self.error(
                    format!("Invalid character literal: {}", token.text),
                    &token.location,
                );
                Node::char('\0').with_location(token.location.clone())
            }
        }
    }
}

/// Convert the text of a number token. Hexadecimal literals are integers.
fn number_literal(text: &str) -> Option<NumberType> {
    all_consuming(alt((hexadecimal, double)))
        .parse(text)
        .ok()
        .map(|(_, n)| n)
}

fn hexadecimal(input: &str) -> IResult<&str, NumberType> {
    let (input, sign) = opt(one_of("+-")).parse(input)?;
    let (input, _) = tag_no_case("0x").parse(input)?;
    let (input, magnitude) =
        map_res(hex_digit1, |digits: &str| u64::from_str_radix(digits, 16)).parse(input)?;

    let magnitude = magnitude as NumberType;
    Ok((input, if sign == Some('-') { -magnitude } else { magnitude }))
}

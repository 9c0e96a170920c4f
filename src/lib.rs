//! Sprig - a small Lisp with macros, tail calls and rendezvous channels
//!
//! This crate implements a complete pipeline from source text to values:
//! a rune-level scanner, a recursive-descent parser, lexically scoped
//! environments, and an evaluator whose every step is driven by a
//! trampoline so that tail calls run in constant native stack space.
//!
//! ## Language tour
//!
//! ```text
//! (def square (fn (x) (* x x)))
//! (square 7)                           ; => 49
//! (let (a 1 b (+ a 1)) (list a b))     ; => (1 2)
//! (def unless (macro (fn (c body) (list 'if c nil body))))
//! (unless false "ran")                 ; => "ran"
//! (def c (chan))
//! (go (send! c 42))
//! (take! c)                            ; => 42
//! ```
//!
//! ## Truthiness
//!
//! The symbol `false` and `nil` are falsy; every other value is truthy.
//! Primitives that answer questions return the symbols `true` and `false`.
//!
//! ## Errors
//!
//! Parsing accumulates every error it can find in one pass and reports them
//! as [`ParseErrors`]; evaluation never starts on input that failed to parse.
//! Evaluation aborts with the first [`EvalError`], which carries the source
//! location of the offending node when one is known.
//!
//! ## Modules
//!
//! - `scanner`: token stream produced by a state machine on its own thread
//! - `parser`: node sequence plus parse errors
//! - `ast`: nodes, values and the collection capability
//! - `evaluator`: special forms, application and the trampoline
//! - `runtime`: primitives, functions and channels
//! - `builtinops`: the primitive catalogue bound in the root environment

use std::fmt;
use std::sync::Arc;

/// Parameter name that collects the remaining arguments of a call into a list
pub const REST_MARKER: &str = "&rest";

/// Name of the root environment produced by [`evaluator::create_global_env`]
pub const TOP_LEVEL_ENV_NAME: &str = "TopLevel";

/// Display name of a function that was never bound with `def`
pub const ANONYMOUS_FUNCTION_NAME: &str = "anonymous";

/// Maximum nesting of lists, quotes and annotations in parsed source
pub const MAX_PARSE_DEPTH: usize = 1_000;

/// Maximum number of nested non-tail evaluations on one thread.
/// Tail calls do not count against it.
pub const MAX_EVAL_DEPTH: usize = 20_000;

/// A position in a named source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: Arc<str>,
    /// 1-based line number
    pub line: usize,
    /// Byte offset from the start of the source, used to order diagnostics
    pub pos: usize,
}

impl Location {
    pub fn new(file: impl Into<Arc<str>>, line: usize, pos: usize) -> Self {
        Location {
            file: file.into(),
            line,
            pos,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file, self.line)
    }
}

/// A single syntax problem found while scanning or parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Error (line {}): {message}", .location.line)]
pub struct ParseError {
    pub message: String,
    pub location: Location,
}

impl ParseError {
    pub fn new(message: impl Into<String>, location: Location) -> Self {
        ParseError {
            message: message.into(),
            location,
        }
    }
}

/// Every parse error found in one pass over a source, ordered by position.
#[derive(Debug, Clone, PartialEq, Default, thiserror::Error)]
#[error("{}", one_per_line(.0))]
pub struct ParseErrors(pub Vec<ParseError>);

fn one_per_line(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl ParseErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParseError> {
        self.0.iter()
    }

    pub(crate) fn push(&mut self, error: ParseError) {
        self.0.push(error);
    }

    /// Stable sort by source position; errors found at the same spot keep their order.
    pub(crate) fn sort(&mut self) {
        self.0.sort_by_key(|e| e.location.pos);
    }
}

/// Broad category of an evaluation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    /// Malformed special form or literal discovered at evaluation time
    Syntax,
    /// Undefined symbol, duplicate definition, or update of an unbound name
    Name,
    /// Wrong number of arguments to a special form, primitive, function or macro
    Arity,
    /// A value of the wrong kind where a specific kind was required
    Type,
    /// Raised on purpose by the guest program via `panic`
    Explicit,
    /// Any other guest-triggered failure (no matching `cond` clause, closed channel, I/O)
    Runtime,
}

/// An evaluation failure, converted into a plain value at the evaluation entry point.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}{}", location_suffix(.location))]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub message: String,
    pub location: Option<Location>,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        EvalError {
            kind,
            message: message.into(),
            location: None,
        }
    }

    /// Attach a location unless one was already recorded closer to the fault.
    pub fn at(mut self, location: Option<&Location>) -> Self {
        if self.location.is_none() {
            self.location = location.cloned();
        }
        self
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Syntax, message)
    }

    pub fn name(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Name, message)
    }

    pub fn arity(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Arity, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Type, message)
    }

    pub fn explicit(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Explicit, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Runtime, message)
    }
}

fn location_suffix(location: &Option<Location>) -> String {
    match location {
        Some(location) => format!(" ({location})"),
        None => String::new(),
    }
}

/// Result type used throughout evaluation
pub type EvalResult<T> = Result<T, EvalError>;

/// Error returned by entry points that both parse and evaluate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Parse(#[from] ParseErrors),
    #[error("{0}")]
    Eval(#[from] EvalError),
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod parser;
pub mod runtime;
pub mod scanner;
mod stack;

pub use evaluator::{Context, Environment, create_global_env, eval, parse_eval};

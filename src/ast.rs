//! This module defines the node type produced by the parser and consumed by the
//! evaluator. A [`Node`] pairs a [`Value`] with optional metadata: an annotation
//! attached with `^ann value` syntax and the source location it was read from.
//! Metadata never takes part in equality.
//!
//! [`Value`] is a closed sum: the six syntactic variants the parser can produce
//! (`Number`, `Symbol`, `Str`, `Char`, `List`, `Nil`) plus four runtime-only
//! variants that exist only as results of evaluation. `List`, `Nil` and `Str`
//! share the collection capability exposed through [`Coll`].

use crate::evaluator::Environment;
use crate::runtime::{Channel, Function, Primitive};
use crate::{EvalError, EvalResult, Location};
use std::fmt;
use std::sync::Arc;

/// Type alias for number values in the interpreter
pub type NumberType = f64;

/// Core value type
#[derive(Clone)]
pub enum Value {
    Number(NumberType),
    Symbol(Arc<str>),
    /// String literal, indexed by code point
    Str(Arc<str>),
    Char(char),
    List(Arc<[Node]>),
    /// The unique empty/absent value
    Nil,
    /// Native operation from the primitive catalogue
    Primitive(&'static Primitive),
    /// User-defined function or macro
    Function(Arc<Function>),
    /// A reified environment
    Environment(Environment),
    Channel(Arc<Channel>),
}

/// A value together with its annotation and source location.
#[derive(Clone)]
pub struct Node {
    pub value: Value,
    pub annotation: Option<Arc<Node>>,
    pub location: Option<Location>,
}

impl Node {
    pub fn new(value: Value) -> Self {
        Node {
            value,
            annotation: None,
            location: None,
        }
    }

    pub fn number(n: NumberType) -> Self {
        Self::new(Value::Number(n))
    }

    pub fn symbol(name: impl Into<Arc<str>>) -> Self {
        Self::new(Value::Symbol(name.into()))
    }

    pub fn string(text: impl Into<Arc<str>>) -> Self {
        Self::new(Value::Str(text.into()))
    }

    pub fn char(c: char) -> Self {
        Self::new(Value::Char(c))
    }

    pub fn list(nodes: Vec<Node>) -> Self {
        Self::new(Value::List(nodes.into()))
    }

    pub fn nil() -> Self {
        Self::new(Value::Nil)
    }

    /// The symbol `true` or `false`
    pub fn boolean(b: bool) -> Self {
        Self::symbol(if b { "true" } else { "false" })
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_annotation(mut self, annotation: Node) -> Self {
        self.annotation = Some(Arc::new(annotation));
        self
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.value, Value::Nil)
    }

    /// The symbol `false` and `nil` are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match &self.value {
            Value::Nil => false,
            Value::Symbol(name) => name.as_ref() != "false",
            _ => true,
        }
    }

    /// Name of the symbol, if this node is one
    pub fn as_symbol(&self) -> Option<&str> {
        match &self.value {
            Value::Symbol(name) => Some(name.as_ref()),
            _ => None,
        }
    }

    /// View this node as a collection, if it supports the collection capability.
    pub fn as_coll(&self) -> Option<Coll<'_>> {
        match &self.value {
            Value::List(nodes) => Some(Coll::List(nodes)),
            Value::Nil => Some(Coll::Nil),
            Value::Str(text) => Some(Coll::Str(text)),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.value.type_name()
    }

    /// Structural equality as seen by the `=` primitive.
    ///
    /// Comparing a runtime-only value (primitive, function, environment or
    /// channel) with anything is an error, even when nested inside a list.
    pub fn try_equals(&self, other: &Node) -> EvalResult<bool> {
        for side in [self, other] {
            if side.value.is_runtime_only() {
                return Err(EvalError::runtime(format!(
                    "Cannot compare the values of {}s: {} and {}",
                    side.type_name(),
                    self,
                    other
                ))
                .at(self.location().or(other.location())));
            }
        }

        match (&self.value, &other.value) {
            (Value::List(a), Value::List(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !x.try_equals(y)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(self.value == other.value),
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Symbol(_) => "symbol",
            Value::Str(_) => "string",
            Value::Char(_) => "char",
            Value::List(_) => "list",
            Value::Nil => "nil",
            Value::Primitive(_) => "primitive",
            Value::Function(f) if f.is_macro => "macro",
            Value::Function(_) => "function",
            Value::Environment(_) => "environment",
            Value::Channel(_) => "chan",
        }
    }

    fn is_runtime_only(&self) -> bool {
        matches!(
            self,
            Value::Primitive(_) | Value::Function(_) | Value::Environment(_) | Value::Channel(_)
        )
    }
}

/// Structural equality ignoring annotations and locations.
/// Runtime-only values never compare equal, not even to themselves.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            _ => false,
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Symbol(name) => write!(f, "{name}"),
            // No escape processing in either direction
            Value::Str(text) => write!(f, "\"{text}\""),
            Value::Char('\n') => write!(f, "\\newline"),
            Value::Char(c) => write!(f, "\\{c}"),
            Value::List(nodes) => {
                write!(f, "(")?;
                for (i, node) in nodes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{node}")?;
                }
                write!(f, ")")
            }
            Value::Nil => write!(f, "nil"),
            Value::Primitive(p) => write!(f, "{p}"),
            Value::Function(func) => write!(f, "{func}"),
            Value::Environment(env) => write!(f, "#environment<{}>", env.name()),
            Value::Channel(chan) => write!(f, "{chan}"),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(annotation) = &self.annotation {
            write!(f, "^{annotation} ")?;
        }
        write!(f, "{}", self.value)
    }
}

// Runtime values are shown by their display form; environments can be
// cyclic through closures, so a derived Debug would never terminate.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Char(c) => write!(f, "Char({c:?})"),
            Value::List(nodes) => f.debug_tuple("List").field(&&**nodes).finish(),
            Value::Nil => write!(f, "Nil"),
            other => write!(f, "{other}"),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(annotation) = &self.annotation {
            write!(f, "^{annotation:?} ")?;
        }
        write!(f, "{:?}", self.value)
    }
}

/// Borrowed view of a value that supports the collection capability.
#[derive(Debug, Clone, Copy)]
pub enum Coll<'a> {
    List(&'a [Node]),
    Nil,
    Str(&'a str),
}

impl Coll<'_> {
    pub fn len(&self) -> usize {
        match self {
            Coll::List(nodes) => nodes.len(),
            Coll::Nil => 0,
            Coll::Str(text) => text.chars().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Coll::List(nodes) => nodes.is_empty(),
            Coll::Nil => true,
            Coll::Str(text) => text.is_empty(),
        }
    }

    /// Elements as nodes; a string yields its characters.
    pub fn children(&self) -> Vec<Node> {
        match self {
            Coll::List(nodes) => nodes.to_vec(),
            Coll::Nil => Vec::new(),
            Coll::Str(text) => text.chars().map(Node::char).collect(),
        }
    }

    /// First element, or `nil` when empty
    pub fn first(&self) -> Node {
        match self {
            Coll::List(nodes) => nodes.first().cloned().unwrap_or_else(Node::nil),
            Coll::Nil => Node::nil(),
            Coll::Str(text) => text.chars().next().map_or_else(Node::nil, Node::char),
        }
    }

    /// Everything after the first element. The rest of `nil` is the empty list.
    pub fn rest(&self) -> Node {
        match self {
            Coll::List(nodes) => Node::list(nodes.iter().skip(1).cloned().collect()),
            Coll::Nil => Node::list(Vec::new()),
            Coll::Str(text) => {
                let mut chars = text.chars();
                chars.next();
                Node::string(chars.as_str())
            }
        }
    }

    pub fn cons(&self, elem: Node) -> EvalResult<Node> {
        match self {
            Coll::List(nodes) => {
                let mut result = Vec::with_capacity(nodes.len() + 1);
                result.push(elem);
                result.extend_from_slice(nodes);
                Ok(Node::list(result))
            }
            Coll::Nil => Ok(Node::list(vec![elem])),
            Coll::Str(text) => match elem.value {
                Value::Char(c) => Ok(Node::string(format!("{c}{text}"))),
                _ => Err(EvalError::type_error(format!(
                    "Cannot cons a non-character onto a string: {elem}"
                ))),
            },
        }
    }

    pub fn append(&self, other: Coll<'_>) -> EvalResult<Node> {
        match self {
            Coll::List(nodes) => {
                let mut result = nodes.to_vec();
                result.extend(other.children());
                Ok(Node::list(result))
            }
            Coll::Nil => Ok(other.to_node()),
            Coll::Str(text) => match other {
                _ if other.is_empty() => Ok(self.to_node()),
                Coll::Str(tail) => Ok(Node::string(format!("{text}{tail}"))),
                _ => Err(EvalError::type_error(format!(
                    "Cannot append a non-string onto a string: {}",
                    other.to_node()
                ))),
            },
        }
    }

    fn to_node(self) -> Node {
        match self {
            Coll::List(nodes) => Node::list(nodes.to_vec()),
            Coll::Nil => Node::nil(),
            Coll::Str(text) => Node::string(text),
        }
    }
}

// From trait implementations for Node - enables .into() conversion in tests and builders
impl From<f64> for Node {
    fn from(n: f64) -> Self {
        Node::number(n)
    }
}

impl From<i32> for Node {
    fn from(n: i32) -> Self {
        Node::number(f64::from(n))
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::string(s)
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::string(s)
    }
}

impl From<char> for Node {
    fn from(c: char) -> Self {
        Node::char(c)
    }
}

impl<T: Into<Node>> From<Vec<T>> for Node {
    fn from(v: Vec<T>) -> Self {
        Node::list(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Node>, const N: usize> From<[T; N]> for Node {
    fn from(arr: [T; N]) -> Self {
        Node::list(arr.into_iter().map(Into::into).collect())
    }
}

/// Helper for creating symbols in mixed lists
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Node {
    Node::symbol(name.as_ref())
}

/// Helper for creating nodes from anything convertible
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Node>>(value: T) -> Node {
    value.into()
}

#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Node {
    Node::nil()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rendering_data_driven() {
        let test_cases = vec![
            (val(42), "42"),
            (val(-3.5), "-3.5"),
            (val(0.1), "0.1"),
            (val(1e21), "1000000000000000000000"),
            (sym("foo-bar?"), "foo-bar?"),
            (val("hi there"), "\"hi there\""),
            (val('a'), "\\a"),
            (val('\n'), "\\newline"),
            (nil(), "nil"),
            (val(Vec::<Node>::new()), "()"),
            (val(vec![sym("+"), val(1), val(vec![val(2), val(3)])]), "(+ 1 (2 3))"),
            (val(1).with_annotation(sym("int")), "^int 1"),
            (
                val(vec![sym("a")]).with_annotation(val(vec![sym("k"), val("v")])),
                "^(k \"v\") (a)",
            ),
        ];

        for (node, expected) in test_cases {
            assert_eq!(node.to_string(), expected);
        }
    }

    #[test]
    fn test_equality_is_structural_and_length_sensitive() {
        assert_eq!(val([1, 2]), val([1, 2]));
        assert_ne!(val([1, 2]), val([1, 2, 3]));
        assert_eq!(nil(), nil());
        assert_ne!(nil(), val(Vec::<Node>::new()));
        assert_ne!(nil(), sym("nil"));
        assert_ne!(val("a"), val('a'));
        assert_ne!(val(1), val("1"));
        // Metadata is ignored
        assert_eq!(val(7).with_annotation(sym("x")), val(7));
    }

    #[test]
    fn test_truthiness() {
        assert!(!sym("false").is_truthy());
        assert!(!nil().is_truthy());
        assert!(sym("true").is_truthy());
        assert!(val(0).is_truthy());
        assert!(val("").is_truthy());
        assert!(val(Vec::<Node>::new()).is_truthy());
    }

    #[test]
    fn test_try_equals_rejects_runtime_values() {
        let env = Node::new(Value::Environment(crate::create_global_env()));
        let err = env.try_equals(&env).unwrap_err();
        assert_eq!(err.kind, crate::EvalErrorKind::Runtime);
        assert!(err.message.contains("environment"));

        let nested = val(vec![val(1), env.clone()]);
        nested.try_equals(&val([1, 2])).unwrap_err();
        assert!(val([1, 2]).try_equals(&val([1, 2])).unwrap());
        assert!(!val([1, 2]).try_equals(&val([1])).unwrap());
    }

    #[test]
    fn test_coll_first_rest() {
        let list = val([1, 2, 3]);
        let coll = list.as_coll().unwrap();
        assert_eq!(coll.first(), val(1));
        assert_eq!(coll.rest(), val([2, 3]));
        assert_eq!(coll.len(), 3);

        let empty = val(Vec::<Node>::new());
        assert_eq!(empty.as_coll().unwrap().first(), nil());
        assert_eq!(empty.as_coll().unwrap().rest(), val(Vec::<Node>::new()));

        assert_eq!(Coll::Nil.first(), nil());
        assert_eq!(Coll::Nil.rest(), val(Vec::<Node>::new()));

        let text = val("héllo");
        let coll = text.as_coll().unwrap();
        assert_eq!(coll.len(), 5);
        assert_eq!(coll.first(), val('h'));
        assert_eq!(coll.rest(), val("éllo"));
        assert_eq!(coll.children()[1], val('é'));
        assert_eq!(Coll::Str("").first(), nil());
        assert_eq!(Coll::Str("").rest(), val(""));

        assert!(val(5).as_coll().is_none());
    }

    #[test]
    fn test_coll_cons_and_append() {
        assert_eq!(Coll::Nil.cons(val(1)).unwrap(), val([1]));
        assert_eq!(Coll::List(&[val(2)]).cons(val(1)).unwrap(), val([1, 2]));
        assert_eq!(Coll::Str("bc").cons(val('a')).unwrap(), val("abc"));
        Coll::Str("bc").cons(val(1)).unwrap_err();

        let tail = [val(3)];
        assert_eq!(
            Coll::List(&[val(1), val(2)]).append(Coll::List(&tail)).unwrap(),
            val([1, 2, 3])
        );
        assert_eq!(Coll::Nil.append(Coll::Str("x")).unwrap(), val("x"));
        assert_eq!(Coll::Str("ab").append(Coll::Str("cd")).unwrap(), val("abcd"));
        assert_eq!(Coll::Str("ab").append(Coll::Nil).unwrap(), val("ab"));
        Coll::Str("ab").append(Coll::List(&tail)).unwrap_err();
        assert_eq!(
            Coll::List(&[val(1)]).append(Coll::Str("hi")).unwrap(),
            val([val(1), val('h'), val('i')])
        );
    }

    #[test]
    fn test_type_names() {
        let test_cases = vec![
            (val(1), "number"),
            (sym("x"), "symbol"),
            (val("s"), "string"),
            (val('c'), "char"),
            (val([1]), "list"),
            (nil(), "nil"),
        ];
        for (node, expected) in test_cases {
            assert_eq!(node.type_name(), expected);
        }
    }
}

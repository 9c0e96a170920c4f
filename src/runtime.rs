//! Values that only evaluation can produce: primitives, functions (and the
//! macros derived from them) and channels.

use crate::ast::{Node, Value};
use crate::evaluator::{Context, Environment};
use crate::{ANONYMOUS_FUNCTION_NAME, EvalError, EvalResult, REST_MARKER};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Allowed argument counts for a callable
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Between min and max arguments (inclusive)
    Range(usize, usize),
}

impl Arity {
    /// Check `got` against this arity. `kind` and `name` identify the callee
    /// in the error message, e.g. `Primitive 'first'`.
    pub fn validate(&self, kind: &str, name: &str, got: usize) -> EvalResult<()> {
        let message = match *self {
            Arity::Exact(n) if got != n => {
                format!("{kind} '{name}' expects {n} argument(s), but was given {got}")
            }
            Arity::AtLeast(n) if got < n => {
                format!("{kind} '{name}' expects at least {n} argument(s), but was given {got}")
            }
            Arity::Range(min, max) if got < min || got > max => format!(
                "{kind} '{name}' expects between {min} and {max} arguments, but was given {got}"
            ),
            _ => return Ok(()),
        };
        Err(EvalError::arity(message))
    }
}

/// Native implementation of a primitive. Receives already-evaluated arguments,
/// the calling environment and the execution context.
pub type PrimitiveFn = fn(&[Node], &Environment, &Context) -> EvalResult<Node>;

/// A named native operation from the primitive catalogue
#[derive(Debug)]
pub struct Primitive {
    pub name: &'static str,
    pub arity: Arity,
    pub op: PrimitiveFn,
}

impl Primitive {
    pub fn call(&self, args: &[Node], env: &Environment, ctx: &Context) -> EvalResult<Node> {
        self.arity.validate("Primitive", self.name, args.len())?;
        (self.op)(args, env, ctx)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#primitive<{}>", self.name)
    }
}

/// A user-defined function, or a macro when `is_macro` is set.
#[derive(Clone)]
pub struct Function {
    pub name: String,
    /// Positional parameter names, rest marker excluded
    pub params: Vec<String>,
    /// Name that collects the remaining arguments, if any
    pub rest: Option<String>,
    pub body: Node,
    /// The environment the function was created in
    pub env: Environment,
    pub is_macro: bool,
}

impl Function {
    /// Build a function from the parameter nodes of an `fn` form.
    ///
    /// Parameters must be symbols; the rest marker must be followed by
    /// exactly one name.
    pub fn new(param_nodes: &[Node], body: Node, env: Environment) -> EvalResult<Self> {
        let mut params = Vec::new();
        let mut rest = None;
        let mut names = param_nodes.iter();

        while let Some(param) = names.next() {
            let Some(name) = param.as_symbol() else {
                return Err(EvalError::syntax(format!(
                    "Function parameters should only be symbols: {param}"
                ))
                .at(param.location()));
            };

            if name == REST_MARKER {
                match (names.next().and_then(Node::as_symbol), names.next()) {
                    (Some(rest_name), None) if rest_name != REST_MARKER => {
                        rest = Some(rest_name.to_owned());
                    }
                    _ => {
                        return Err(EvalError::syntax(format!(
                            "'{REST_MARKER}' must be followed by exactly one parameter name"
                        ))
                        .at(param.location()));
                    }
                }
            } else {
                params.push(name.to_owned());
            }
        }

        Ok(Function {
            name: ANONYMOUS_FUNCTION_NAME.to_owned(),
            params,
            rest,
            body,
            env,
            is_macro: false,
        })
    }

    /// A copy of this function carrying a display name.
    pub fn named(&self, name: &str) -> Self {
        Function {
            name: name.to_owned(),
            ..self.clone()
        }
    }

    /// A copy of this function tagged as a macro.
    pub fn to_macro(&self) -> Self {
        Function {
            is_macro: true,
            ..self.clone()
        }
    }

    fn kind(&self) -> &'static str {
        if self.is_macro { "Macro" } else { "Function" }
    }

    pub fn arity(&self) -> Arity {
        match self.rest {
            Some(_) => Arity::AtLeast(self.params.len()),
            None => Arity::Exact(self.params.len()),
        }
    }

    /// The parameter list as written, rest marker included.
    pub fn param_list(&self) -> Node {
        let mut nodes: Vec<Node> = self.params.iter().map(|p| Node::symbol(p.as_str())).collect();
        if let Some(rest) = &self.rest {
            nodes.push(Node::symbol(REST_MARKER));
            nodes.push(Node::symbol(rest.as_str()));
        }
        Node::list(nodes)
    }

    /// Create the scope for one application: a child of the defining
    /// environment with every parameter bound.
    pub fn bind_arguments(&self, args: Vec<Node>) -> EvalResult<Environment> {
        self.arity().validate(self.kind(), &self.name, args.len())?;

        let scope = self.env.child(self.name.as_str());
        let mut args = args.into_iter();
        for param in &self.params {
            if let Some(arg) = args.next() {
                scope.set(param, arg)?;
            }
        }
        if let Some(rest) = &self.rest {
            scope.set(rest, Node::list(args.collect()))?;
        }
        Ok(scope)
    }
}

// Shown by display form; the captured environment can be cyclic.
impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_macro {
            write!(f, "#macro<{}>", self.name)
        } else {
            write!(f, "#function<{}>", self.name)
        }
    }
}

static NEXT_CHANNEL_ID: AtomicUsize = AtomicUsize::new(0);

/// Unbuffered rendezvous channel with a one-shot close signal.
///
/// Closing drops the only sender of the close signal; from then on the
/// signal's receiver is permanently ready, which wakes every blocked `take`
/// with `nil` and every blocked `send` with an error.
pub struct Channel {
    id: usize,
    data_tx: Sender<Node>,
    data_rx: Receiver<Node>,
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
}

impl Channel {
    pub fn new() -> Self {
        let (data_tx, data_rx) = channel::bounded(0);
        let (close_tx, close_rx) = channel::bounded(0);
        let id = NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id, "channel created");
        Channel {
            id,
            data_tx,
            data_rx,
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.close_tx.lock().is_none()
    }

    /// Block until a taker receives `value`. Fails once the channel is closed.
    pub fn send(&self, value: Node) -> EvalResult<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        channel::select! {
            send(self.data_tx, value) -> result => result.map_err(|_| self.closed_error()),
            recv(self.close_rx) -> _ => Err(self.closed_error()),
        }
    }

    /// Block until a sender hands over a value; `nil` once the channel is closed.
    pub fn take(&self) -> Node {
        if self.is_closed() {
            return Node::nil();
        }
        channel::select! {
            recv(self.data_rx) -> value => value.unwrap_or_else(|_| Node::nil()),
            recv(self.close_rx) -> _ => Node::nil(),
        }
    }

    /// Idempotent.
    pub fn close(&self) {
        if self.close_tx.lock().take().is_some() {
            tracing::debug!(id = self.id, "channel closed");
        }
    }

    fn closed_error(&self) -> EvalError {
        EvalError::runtime(format!("Cannot send on a closed chan: {self}"))
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#chan<{}>", self.id)
    }
}

impl From<Channel> for Node {
    fn from(channel: Channel) -> Self {
        Node::new(Value::Channel(Arc::new(channel)))
    }
}

impl From<Function> for Node {
    fn from(function: Function) -> Self {
        Node::new(Value::Function(Arc::new(function)))
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::EvalErrorKind;
    use crate::ast::{sym, val};
    use pretty_assertions::assert_eq;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_arity_validation() {
        use Arity::*;

        Exact(2).validate("Primitive", "cons", 2).unwrap();
        AtLeast(1).validate("Primitive", "println", 3).unwrap();
        Range(1, 2).validate("Special form", "eval", 2).unwrap();

        let test_cases = vec![
            (Exact(2), 1, "Primitive 'p' expects 2 argument(s), but was given 1"),
            (AtLeast(1), 0, "Primitive 'p' expects at least 1 argument(s), but was given 0"),
            (Range(1, 2), 3, "Primitive 'p' expects between 1 and 2 arguments, but was given 3"),
        ];
        for (arity, got, expected) in test_cases {
            let err = arity.validate("Primitive", "p", got).unwrap_err();
            assert_eq!(err.kind, EvalErrorKind::Arity);
            assert_eq!(err.message, expected);
        }
    }

    #[test]
    fn test_function_parameter_validation() {
        let env = Environment::new("t");
        let f = Function::new(&[sym("a"), sym("&rest"), sym("more")], val(1), env.clone()).unwrap();
        assert_eq!(f.params, vec!["a".to_owned()]);
        assert_eq!(f.rest.as_deref(), Some("more"));
        assert_eq!(f.arity(), Arity::AtLeast(1));
        assert_eq!(f.param_list().to_string(), "(a &rest more)");
        assert_eq!(f.to_string(), "#function<anonymous>");

        let bad = vec![
            vec![val(1)],
            vec![sym("&rest")],
            vec![sym("&rest"), sym("a"), sym("b")],
            vec![sym("&rest"), val("s")],
        ];
        for params in bad {
            let err = Function::new(&params, val(1), env.clone()).unwrap_err();
            assert_eq!(err.kind, EvalErrorKind::Syntax, "params: {params:?}");
        }
    }

    #[test]
    fn test_bind_arguments() {
        let env = Environment::new("t");
        let f = Function::new(&[sym("x"), sym("&rest"), sym("xs")], val(1), env)
            .unwrap()
            .named("collect");

        let scope = f.bind_arguments(vec![val(1), val(2), val(3)]).unwrap();
        assert_eq!(scope.name(), "collect");
        assert_eq!(scope.get("x"), Some(val(1)));
        assert_eq!(scope.get("xs"), Some(val([2, 3])));

        let scope = f.bind_arguments(vec![val(1)]).unwrap();
        assert_eq!(scope.get("xs"), Some(val(Vec::<Node>::new())));

        let err = f.bind_arguments(vec![]).unwrap_err();
        assert_eq!(
            err.message,
            "Function 'collect' expects at least 1 argument(s), but was given 0"
        );
    }

    #[test]
    fn test_named_and_macro_copies() {
        let f = Function::new(&[], val(1), Environment::new("t")).unwrap();
        let m = f.named("m").to_macro();
        assert_eq!(m.to_string(), "#macro<m>");
        assert!(!f.is_macro);
        assert_eq!(f.name, "anonymous");
    }

    #[test]
    fn test_channel_rendezvous() {
        let chan = Arc::new(Channel::new());
        let sender = Arc::clone(&chan);
        let handle = thread::spawn(move || sender.send(val(42)));
        assert_eq!(chan.take(), val(42));
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_channel_close() {
        let chan = Channel::new();
        chan.close();
        chan.close();
        assert!(chan.is_closed());
        assert!(chan.take().is_nil());
        let err = chan.send(val(1)).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::Runtime);
    }

    #[test]
    fn test_close_wakes_blocked_taker() {
        let chan = Arc::new(Channel::new());
        let taker = Arc::clone(&chan);
        let handle = thread::spawn(move || taker.take());
        thread::sleep(Duration::from_millis(20));
        chan.close();
        assert!(handle.join().unwrap().is_nil());
    }

    #[test]
    fn test_channel_ids_are_distinct() {
        let a = Channel::new();
        let b = Channel::new();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.to_string(), format!("#chan<{}>", a.id()));
    }
}

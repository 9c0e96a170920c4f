//! The primitive catalogue bound in the root environment.
//!
//! Primitives receive evaluated arguments. Each one is registered once in
//! [`PRIMITIVES`] with its name and [`Arity`]; the arity is checked before the
//! native operation runs, so operations index `args` freely.
//!
//! ```text
//! (+ 1 2)                ; arithmetic takes exactly two numbers
//! (first "abc")          ; => \a
//! (concat '(1) '(2 3))   ; => (1 2 3)
//! (str "n=" 4 \!)        ; => "n=4!"
//! (typeof first)         ; => primitive
//! ```
//!
//! Questions answer with the symbols `true` and `false`.
//!
//! ## Groups
//!
//! - **Arithmetic**: `+ - * / < > =`
//! - **Collections**: `list first rest cons concat`, defined for lists, `nil`
//!   and strings
//! - **Reflection**: `typeof current-environment routine-params routine-body
//!   routine-environment read-string readable-string`
//! - **Text and I/O**: `str println read-line load`
//! - **Host**: `now sleep panic`
//! - **Concurrency**: `chan send! take! close!`

use crate::ast::{Node, NumberType, Value};
use crate::evaluator::{Context, Environment, parse_eval};
use crate::runtime::{Arity, Channel, Function, Primitive, PrimitiveFn};
use crate::{Error, EvalError, EvalResult};
use std::sync::LazyLock;
use chrono::{Datelike, Local, Timelike};
use std::time::Duration;

//
// Argument helpers
//

fn number(node: &Node) -> EvalResult<NumberType> {
    match node.value {
        Value::Number(n) => Ok(n),
        _ => Err(
            EvalError::type_error(format!("Expression is not a number: {node}"))
                .at(node.location()),
        ),
    }
}

fn function<'a>(node: &'a Node, primitive: &str) -> EvalResult<&'a Function> {
    match &node.value {
        Value::Function(function) => Ok(function),
        _ => Err(EvalError::type_error(format!(
            "Argument to '{primitive}' not a function: {node}"
        ))),
    }
}

fn channel<'a>(node: &'a Node, message: &str) -> EvalResult<&'a Channel> {
    match &node.value {
        Value::Channel(chan) => Ok(chan),
        _ => Err(EvalError::type_error(format!("{message}: {node}"))),
    }
}

/// Strings contribute their raw text, everything else its rendering.
fn join_for_display(args: &[Node]) -> String {
    args.iter()
        .map(|arg| match &arg.value {
            Value::Str(text) => text.to_string(),
            _ => arg.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

//
// Arithmetic
//

macro_rules! arithmetic {
    ($name:ident, $op:tt) => {
        fn $name(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
            Ok(Node::number(number(&args[0])? $op number(&args[1])?))
        }
    };
}

macro_rules! comparison {
    ($name:ident, $op:tt) => {
        fn $name(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
            Ok(Node::boolean(number(&args[0])? $op number(&args[1])?))
        }
    };
}

arithmetic!(prim_add, +);
arithmetic!(prim_sub, -);
arithmetic!(prim_mul, *);
arithmetic!(prim_div, /);
comparison!(prim_lt, <);
comparison!(prim_gt, >);

fn prim_equals(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    Ok(Node::boolean(args[0].try_equals(&args[1])?))
}

//
// Collections
//

fn prim_list(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    Ok(Node::list(args.to_vec()))
}

fn prim_first(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    let arg = &args[0];
    arg.as_coll().map(|coll| coll.first()).ok_or_else(|| {
        EvalError::type_error(format!("Cannot get first from a non-collection: {arg}"))
    })
}

fn prim_rest(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    let arg = &args[0];
    arg.as_coll().map(|coll| coll.rest()).ok_or_else(|| {
        EvalError::type_error(format!("Cannot get rest from a non-collection: {arg}"))
    })
}

fn prim_cons(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    let (elem, target) = (&args[0], &args[1]);
    match target.as_coll() {
        Some(coll) => coll.cons(elem.clone()),
        None => Err(EvalError::type_error(format!(
            "Cannot cons onto a non-collection: {target}"
        ))),
    }
}

fn prim_concat(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    let Some((first, rest)) = args.split_first() else {
        return Ok(Node::nil());
    };

    let mut sum = first.clone();
    for arg in rest {
        let Some(acc) = sum.as_coll() else {
            return Err(EvalError::type_error(format!(
                "Cannot concat a non-collection type: {sum}"
            )));
        };
        let Some(next) = arg.as_coll() else {
            return Err(EvalError::type_error(format!(
                "Cannot concat a collection with a non-collection: {arg}"
            )));
        };
        sum = acc.append(next)?;
    }
    Ok(sum)
}

//
// Reflection
//

fn prim_typeof(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    Ok(Node::symbol(args[0].type_name()))
}

fn prim_current_environment(_args: &[Node], env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    Ok(Node::new(Value::Environment(env.clone())))
}

fn prim_routine_params(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    Ok(function(&args[0], "routine-params")?.param_list())
}

fn prim_routine_body(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    Ok(function(&args[0], "routine-body")?.body.clone())
}

fn prim_routine_environment(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    let routine = function(&args[0], "routine-environment")?;
    Ok(Node::new(Value::Environment(routine.env.clone())))
}

fn prim_read_string(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    let arg = &args[0];
    let Value::Str(text) = &arg.value else {
        return Err(EvalError::type_error(format!(
            "Argument to 'read-string' not a string: {arg}"
        )));
    };

    match crate::parser::parse(text, "string") {
        Ok(nodes) => Ok(nodes.into_iter().next().unwrap_or_else(Node::nil)),
        Err(errors) => Err(EvalError::syntax(format!(
            "Unable to read string {arg}: {errors}"
        ))),
    }
}

fn prim_readable_string(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    Ok(Node::string(args[0].to_string()))
}

//
// Text and I/O
//

fn prim_str(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    let mut result = String::new();
    for arg in args {
        match &arg.value {
            Value::Str(text) => result.push_str(text),
            Value::Char(c) => result.push(*c),
            _ => result.push_str(&arg.to_string()),
        }
    }
    Ok(Node::string(result))
}

fn prim_println(args: &[Node], _env: &Environment, ctx: &Context) -> EvalResult<Node> {
    let mut line = join_for_display(args);
    line.push('\n');
    ctx.write(&line);
    Ok(Node::nil())
}

fn prim_read_line(_args: &[Node], _env: &Environment, ctx: &Context) -> EvalResult<Node> {
    let line = ctx.read_line();
    Ok(Node::string(line.strip_suffix('\n').unwrap_or(&line)))
}

fn prim_load(args: &[Node], env: &Environment, ctx: &Context) -> EvalResult<Node> {
    match &args[0].value {
        Value::Str(path) => load(env, path, ctx),
        _ => Err(EvalError::type_error(format!(
            "Argument to 'load' not a string: {}",
            args[0]
        ))),
    }
}

/// Evaluate every node of the file at `path` in `env`, stopping at the first
/// evaluation error. An empty path loads nothing.
#[tracing::instrument(level = "debug", skip(env, ctx))]
pub fn load(env: &Environment, path: &str, ctx: &Context) -> EvalResult<Node> {
    if path.is_empty() {
        return Ok(Node::nil());
    }

    let source = std::fs::read_to_string(path)
        .map_err(|err| EvalError::runtime(format!("Error while loading file <{path}>: {err}")))?;
    tracing::debug!(bytes = source.len(), "loading file");

    match parse_eval(env, &source, path, ctx) {
        Ok(_) => Ok(Node::nil()),
        Err(Error::Eval(err)) => Err(err),
        Err(Error::Parse(errors)) => Err(EvalError::syntax(format!(
            "Error while loading file <{path}>: {errors}"
        ))),
    }
}

//
// Host
//

fn prim_now(_args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    Ok(date_components(&Local::now()))
}

/// `(year month day hour minute second)` of a wall-clock time
fn date_components<T: Datelike + Timelike>(time: &T) -> Node {
    let components = [
        NumberType::from(time.year()),
        NumberType::from(time.month()),
        NumberType::from(time.day()),
        NumberType::from(time.hour()),
        NumberType::from(time.minute()),
        NumberType::from(time.second()),
    ];
    Node::list(components.into_iter().map(Node::number).collect())
}

fn prim_sleep(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    let millis = match args[0].value {
        Value::Number(n) => n,
        _ => {
            return Err(EvalError::type_error(format!(
                "Argument to 'sleep' not a number: {}",
                args[0]
            )));
        }
    };

    let duration = Duration::try_from_secs_f64(millis.max(0.0) / 1000.0).map_err(|err| {
        EvalError::type_error(format!("Argument to 'sleep' not a duration: {}: {err}", args[0]))
    })?;
    std::thread::sleep(duration);
    Ok(Node::nil())
}

fn prim_panic(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    Err(EvalError::explicit(join_for_display(args)))
}

//
// Concurrency
//

fn prim_chan(_args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    Ok(Node::from(Channel::new()))
}

fn prim_send(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    channel(&args[0], "Target of a send! must be a chan")?.send(args[1].clone())?;
    Ok(Node::nil())
}

fn prim_take(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    Ok(channel(&args[0], "Source of a take! must be a chan")?.take())
}

fn prim_close(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Node> {
    channel(&args[0], "Argument to 'close!' must be a chan")?.close();
    Ok(Node::nil())
}

/// Global catalogue of all primitives, built once.
static PRIMITIVES: LazyLock<Vec<Primitive>> = LazyLock::new(|| {
    use Arity::*;

    let catalogue: [(&'static str, Arity, PrimitiveFn); 30] = [
        // Arithmetic
        ("+", Exact(2), prim_add),
        ("-", Exact(2), prim_sub),
        ("*", Exact(2), prim_mul),
        ("/", Exact(2), prim_div),
        ("<", Exact(2), prim_lt),
        (">", Exact(2), prim_gt),
        ("=", Exact(2), prim_equals),
        // Collections
        ("list", AtLeast(0), prim_list),
        ("first", Exact(1), prim_first),
        ("rest", Exact(1), prim_rest),
        ("cons", Exact(2), prim_cons),
        ("concat", AtLeast(0), prim_concat),
        // Reflection
        ("typeof", Exact(1), prim_typeof),
        ("current-environment", Exact(0), prim_current_environment),
        ("routine-params", Exact(1), prim_routine_params),
        ("routine-body", Exact(1), prim_routine_body),
        ("routine-environment", Exact(1), prim_routine_environment),
        ("read-string", Exact(1), prim_read_string),
        ("readable-string", Exact(1), prim_readable_string),
        // Text and I/O
        ("str", AtLeast(0), prim_str),
        ("println", AtLeast(1), prim_println),
        ("read-line", Exact(0), prim_read_line),
        ("load", Exact(1), prim_load),
        // Host
        ("now", Exact(0), prim_now),
        ("sleep", Exact(1), prim_sleep),
        ("panic", AtLeast(0), prim_panic),
        // Concurrency
        ("chan", Exact(0), prim_chan),
        ("send!", Exact(2), prim_send),
        ("take!", Exact(1), prim_take),
        ("close!", Exact(1), prim_close),
    ];

    catalogue
        .into_iter()
        .map(|(name, arity, op)| Primitive { name, arity, op })
        .collect()
});

/// Every primitive in the catalogue
pub(crate) fn get_primitives() -> &'static [Primitive] {
    PRIMITIVES.as_slice()
}

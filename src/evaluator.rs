//! Evaluation of nodes against an environment.
//!
//! Every evaluation step produces a [`Step`]: either a final value or a
//! node still to be evaluated in some environment. [`eval`] runs the driver
//! loop that keeps taking steps until a value appears, so anything a special
//! form or an application leaves in tail position is evaluated iteratively
//! rather than by native recursion. Sub-expressions that are not in tail
//! position (arguments, conditions, `let` initialisers) recurse through
//! [`eval`] normally; that recursion grows the stack on demand and fails with
//! an evaluation error once it nests deeper than [`MAX_EVAL_DEPTH`].

use crate::ast::{Node, Value};
use crate::builtinops::get_primitives;
use crate::runtime::Function;
use crate::stack::ensure_sufficient_stack;
use crate::{Error, EvalError, EvalResult, Location, MAX_EVAL_DEPTH, TOP_LEVEL_ENV_NAME};
use std::cell::Cell;

mod context;
mod environment;
mod specialforms;

pub use context::{BufferSink, Context, LineReader, OutputSink};
pub use environment::Environment;

/// Outcome of one evaluation step
pub(crate) enum Step {
    /// Evaluation finished with this value
    Done(Node),
    /// Continue by evaluating `node` in `env`
    TailEval { node: Node, env: Environment },
    /// Continue with the body of a function applied at `site`
    TailCall {
        function: String,
        site: Option<Location>,
        node: Node,
        env: Environment,
    },
}

thread_local! {
    /// Nested [`eval`] calls active on this thread
    static EVAL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Evaluate a node (public API)
pub fn eval(env: &Environment, node: &Node, ctx: &Context) -> EvalResult<Node> {
    let depth = EVAL_DEPTH.get();
    if depth >= MAX_EVAL_DEPTH {
        return Err(EvalError::runtime(format!(
            "Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
        ))
        .at(node.location()));
    }

    EVAL_DEPTH.set(depth + 1);
    let result = ensure_sufficient_stack(|| run_trampoline(env, node, ctx));
    EVAL_DEPTH.set(depth);
    result
}

/// Drive evaluation steps until one produces a value
fn run_trampoline(env: &Environment, node: &Node, ctx: &Context) -> EvalResult<Node> {
    let mut bounces = 0usize;
    let mut current_call: Option<(String, Option<Location>)> = None;
    let mut step = eval_step(node, env, ctx);

    loop {
        match step {
            Ok(Step::Done(value)) => {
                tracing::trace!(bounces, "trampoline finished");
                return Ok(value);
            }
            Ok(Step::TailEval { node, env }) => {
                bounces += 1;
                step = eval_step(&node, &env, ctx);
            }
            Ok(Step::TailCall {
                function,
                site,
                node,
                env,
            }) => {
                bounces += 1;
                current_call = Some((function, site));
                step = eval_step(&node, &env, ctx);
            }
            Err(err) => {
                if let Some((function, site)) = &current_call {
                    match site {
                        Some(site) => {
                            tracing::debug!(%function, %site, error = %err, "error escaped function body");
                        }
                        None => tracing::debug!(%function, error = %err, "error escaped function body"),
                    }
                }
                return Err(err);
            }
        }
    }
}

/// Parse `source` and evaluate every node it contains in order, returning the
/// value of the last one (`nil` for empty input). Nothing is evaluated when
/// the source has parse errors.
#[tracing::instrument(level = "debug", skip_all, fields(source = source_name))]
pub fn parse_eval(
    env: &Environment,
    source: &str,
    source_name: &str,
    ctx: &Context,
) -> Result<Node, Error> {
    let nodes = crate::parser::parse(source, source_name)?;
    let mut result = Node::nil();
    for node in &nodes {
        result = eval(env, node, ctx)?;
    }
    Ok(result)
}

/// Create the root environment with the primitive catalogue and the
/// symbols `true` and `false` bound
pub fn create_global_env() -> Environment {
    let env = Environment::new(TOP_LEVEL_ENV_NAME);

    for primitive in get_primitives() {
        env.define(primitive.name, Node::new(Value::Primitive(primitive)));
    }
    env.define("true", Node::boolean(true));
    env.define("false", Node::boolean(false));

    env
}

/// Take one evaluation step for `node`
fn eval_step(node: &Node, env: &Environment, ctx: &Context) -> EvalResult<Step> {
    match &node.value {
        Value::Symbol(name) => env
            .get(name)
            .map(Step::Done)
            .ok_or_else(|| EvalError::name(format!("Name not defined: {name}")).at(node.location())),

        Value::List(elements) => eval_list(elements, env, ctx).map_err(|err| err.at(node.location())),

        // Everything else evaluates to itself
        _ => Ok(Step::Done(node.clone())),
    }
}

/// Evaluate a list as code: a special form or an application
fn eval_list(elements: &[Node], env: &Environment, ctx: &Context) -> EvalResult<Step> {
    let Some((head, arg_forms)) = elements.split_first() else {
        return Err(EvalError::syntax("Empty list cannot be evaluated: ()"));
    };

    // Special forms are recognised by name before anything is evaluated
    if let Some(name) = head.as_symbol()
        && let Some(form) = specialforms::find_special_form(name)
    {
        return form.apply(arg_forms, env, ctx);
    }

    let callee = eval(env, head, ctx)?;
    let args = if is_macro(&callee) {
        arg_forms.to_vec()
    } else {
        eval_args(arg_forms, env, ctx)?
    };
    invoke(&callee, args, env, ctx, head.location())
}

/// Evaluate argument expressions left to right
fn eval_args(arg_forms: &[Node], env: &Environment, ctx: &Context) -> EvalResult<Vec<Node>> {
    arg_forms.iter().map(|arg| eval(env, arg, ctx)).collect()
}

fn is_macro(node: &Node) -> bool {
    matches!(&node.value, Value::Function(f) if f.is_macro)
}

/// Apply a callable to arguments that are final: evaluated values for
/// primitives and functions, unevaluated forms for macros.
pub(crate) fn invoke(
    callee: &Node,
    args: Vec<Node>,
    env: &Environment,
    ctx: &Context,
    site: Option<&Location>,
) -> EvalResult<Step> {
    match &callee.value {
        Value::Primitive(primitive) => primitive.call(&args, env, ctx).map(Step::Done),
        Value::Function(function) if function.is_macro => {
            // The expansion runs where the macro was used, not where it was defined
            let expansion = expand_macro(function, args, ctx)?;
            Ok(Step::TailEval {
                node: expansion,
                env: env.clone(),
            })
        }
        Value::Function(function) => {
            let scope = function.bind_arguments(args)?;
            Ok(Step::TailCall {
                function: function.name.clone(),
                site: site.cloned(),
                node: function.body.clone(),
                env: scope,
            })
        }
        _ => Err(EvalError::type_error(format!(
            "First item in list not a function: {callee}"
        ))),
    }
}

/// Run a macro body over unevaluated argument forms, yielding its expansion.
pub(crate) fn expand_macro(
    function: &Function,
    arg_forms: Vec<Node>,
    ctx: &Context,
) -> EvalResult<Node> {
    let scope = function.bind_arguments(arg_forms)?;
    eval(&scope, &function.body, ctx)
}

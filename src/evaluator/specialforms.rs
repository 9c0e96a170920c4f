//! The fixed table of special forms.
//!
//! A special form receives its argument forms unevaluated and decides itself
//! what to evaluate, and when. Whatever a form leaves in tail position is
//! returned as a [`Step`] for the driver loop instead of being evaluated here.

use super::{Context, Environment, Step, eval, expand_macro, invoke};
use crate::ast::{Node, Value};
use crate::runtime::{Arity, Function};
use crate::{EvalError, EvalResult};
use std::collections::HashMap;
use std::sync::LazyLock;

type SpecialFormFn = fn(&[Node], &Environment, &Context) -> EvalResult<Step>;

pub(crate) struct SpecialForm {
    pub name: &'static str,
    pub arity: Arity,
    handler: SpecialFormFn,
}

impl SpecialForm {
    pub fn apply(&self, args: &[Node], env: &Environment, ctx: &Context) -> EvalResult<Step> {
        self.arity.validate("Special form", self.name, args.len())?;
        (self.handler)(args, env, ctx)
    }
}

static SPECIAL_FORMS: LazyLock<HashMap<&'static str, SpecialForm>> = LazyLock::new(|| {
    use Arity::*;

    let forms: [(&'static str, Arity, SpecialFormFn); 13] = [
        ("apply", Exact(2), eval_apply),
        ("begin", AtLeast(0), eval_begin),
        ("cond", AtLeast(2), eval_cond),
        ("def", Exact(2), eval_define),
        ("eval", Range(1, 2), eval_eval),
        ("fn", Exact(2), eval_fn),
        ("go", AtLeast(0), eval_go),
        ("if", Exact(3), eval_if),
        ("let", Exact(2), eval_let),
        ("macro", Exact(1), eval_macro),
        ("macroexpand1", Exact(1), eval_macroexpand1),
        ("quote", Exact(1), eval_quote),
        ("update!", Exact(2), eval_update),
    ];

    forms
        .into_iter()
        .map(|(name, arity, handler)| {
            (
                name,
                SpecialForm {
                    name,
                    arity,
                    handler,
                },
            )
        })
        .collect()
});

/// Find the special form called `name`, if there is one
pub(crate) fn find_special_form(name: &str) -> Option<&'static SpecialForm> {
    SPECIAL_FORMS.get(name)
}

fn done(node: Node) -> EvalResult<Step> {
    Ok(Step::Done(node))
}

fn bounce(node: &Node, env: &Environment) -> EvalResult<Step> {
    Ok(Step::TailEval {
        node: node.clone(),
        env: env.clone(),
    })
}

/// The elements of a parameter or binding list; `nil` counts as empty.
fn list_elements<'a>(node: &'a Node, form: &str) -> EvalResult<&'a [Node]> {
    match &node.value {
        Value::List(nodes) => Ok(nodes),
        Value::Nil => Ok(&[]),
        _ => Err(EvalError::syntax(format!(
            "Expected list as first argument to '{form}': {node}"
        ))
        .at(node.location())),
    }
}

fn symbol_name<'a>(node: &'a Node, what: &str) -> EvalResult<&'a str> {
    node.as_symbol().ok_or_else(|| {
        EvalError::syntax(format!("{what} must be a symbol: {node}")).at(node.location())
    })
}

fn eval_quote(args: &[Node], _env: &Environment, _ctx: &Context) -> EvalResult<Step> {
    done(args[0].clone())
}

fn eval_define(args: &[Node], env: &Environment, ctx: &Context) -> EvalResult<Step> {
    let name = symbol_name(&args[0], "First argument to 'def'")?;
    let value = eval(env, &args[1], ctx)?;

    // Functions and macros take the name they are defined under
    let value = match &value.value {
        Value::Function(function) => Node::from(function.named(name)),
        _ => value,
    };

    env.set(name, value).map_err(|err| err.at(args[0].location()))?;
    done(Node::nil())
}

fn eval_update(args: &[Node], env: &Environment, ctx: &Context) -> EvalResult<Step> {
    let name = symbol_name(&args[0], "First argument to 'update!'")?;
    let value = eval(env, &args[1], ctx)?;

    if !env.update(name, value) {
        return Err(
            EvalError::name(format!("Cannot 'update!' an undefined name: {name}"))
                .at(args[0].location()),
        );
    }
    done(Node::nil())
}

fn eval_if(args: &[Node], env: &Environment, ctx: &Context) -> EvalResult<Step> {
    if eval(env, &args[0], ctx)?.is_truthy() {
        bounce(&args[1], env)
    } else {
        bounce(&args[2], env)
    }
}

fn eval_cond(args: &[Node], env: &Environment, ctx: &Context) -> EvalResult<Step> {
    if args.len() % 2 != 0 {
        return Err(EvalError::syntax("cond expects an even number of arguments"));
    }

    for clause in args.chunks_exact(2) {
        if eval(env, &clause[0], ctx)?.is_truthy() {
            return bounce(&clause[1], env);
        }
    }

    Err(EvalError::runtime(format!(
        "No matching cond clause: {}",
        Node::list(args.to_vec())
    )))
}

fn eval_let(args: &[Node], env: &Environment, ctx: &Context) -> EvalResult<Step> {
    let bindings = list_elements(&args[0], "let")?;
    if bindings.len() % 2 != 0 {
        return Err(EvalError::syntax(format!(
            "'let' bindings need an even number of elements: {}",
            args[0]
        ))
        .at(args[0].location()));
    }

    // Each initialiser sees the bindings before it
    let scope = env.child("let");
    for pair in bindings.chunks_exact(2) {
        let name = symbol_name(&pair[0], "Binding name in 'let'")?;
        let value = eval(&scope, &pair[1], ctx)?;
        scope.set(name, value).map_err(|err| err.at(pair[0].location()))?;
    }

    bounce(&args[1], &scope)
}

fn eval_begin(args: &[Node], env: &Environment, ctx: &Context) -> EvalResult<Step> {
    let Some((last, init)) = args.split_last() else {
        return done(Node::nil());
    };

    for node in init {
        eval(env, node, ctx)?;
    }
    bounce(last, env)
}

fn eval_fn(args: &[Node], env: &Environment, _ctx: &Context) -> EvalResult<Step> {
    let params = list_elements(&args[0], "fn")?;
    let function = Function::new(params, args[1].clone(), env.clone())?;
    done(Node::from(function))
}

fn eval_macro(args: &[Node], env: &Environment, ctx: &Context) -> EvalResult<Step> {
    let value = eval(env, &args[0], ctx)?;
    match &value.value {
        Value::Function(function) => done(Node::from(function.to_macro())),
        _ => Err(EvalError::type_error(format!(
            "macro expects a function argument but got: {value}"
        ))),
    }
}

fn eval_macroexpand1(args: &[Node], env: &Environment, ctx: &Context) -> EvalResult<Step> {
    let form = eval(env, &args[0], ctx)?;
    let Value::List(elements) = &form.value else {
        return Err(EvalError::type_error(format!(
            "macroexpand1 expected a list but got: {form}"
        )));
    };
    let Some((head, arg_forms)) = elements.split_first() else {
        return Err(EvalError::type_error(
            "macroexpand1 expected a macro call but got: ()",
        ));
    };

    match eval(env, head, ctx)?.value {
        Value::Function(function) if function.is_macro => {
            done(expand_macro(&function, arg_forms.to_vec(), ctx)?)
        }
        _ => Err(EvalError::type_error(format!(
            "macroexpand1 expected a macro call but got: {form}"
        ))),
    }
}

fn eval_apply(args: &[Node], env: &Environment, ctx: &Context) -> EvalResult<Step> {
    let callee = eval(env, &args[0], ctx)?;
    let list = eval(env, &args[1], ctx)?;

    // List elements are passed as they are, never evaluated again
    let call_args = match &list.value {
        Value::List(nodes) => nodes.to_vec(),
        Value::Nil => Vec::new(),
        _ => {
            return Err(EvalError::type_error(format!(
                "Second argument to 'apply' must be a list: {list}"
            )));
        }
    };
    invoke(&callee, call_args, env, ctx, args[0].location())
}

fn eval_eval(args: &[Node], env: &Environment, ctx: &Context) -> EvalResult<Step> {
    let node = eval(env, &args[0], ctx)?;

    match args.get(1) {
        None => Ok(Step::TailEval {
            node,
            env: env.clone(),
        }),
        Some(target) => match eval(env, target, ctx)?.value {
            Value::Environment(target_env) => Ok(Step::TailEval {
                node,
                env: target_env,
            }),
            other => Err(EvalError::type_error(format!(
                "Second arg to 'eval' must be an environment: {other}"
            ))),
        },
    }
}

fn eval_go(args: &[Node], env: &Environment, ctx: &Context) -> EvalResult<Step> {
    let body = args.to_vec();
    let env = env.clone();
    let ctx = ctx.clone();

    tracing::debug!(expressions = body.len(), "spawning go sequence");
    std::thread::Builder::new()
        .name("go".to_owned())
        .spawn(move || {
            for node in &body {
                if let Err(err) = eval(&env, node, &ctx) {
                    tracing::warn!(error = %err, "go sequence failed");
                    return;
                }
            }
        })
        .map_err(|err| EvalError::runtime(format!("Unable to start go sequence: {err}")))?;

    done(Node::nil())
}

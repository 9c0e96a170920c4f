use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use sprig::ast::{Node, Value};
use sprig::{Context, Environment, builtinops, create_global_env, parse_eval};
use std::panic;
use std::process;

const USAGE: &str = "usage: repl [-l <file>]... [script]";

fn main() {
    init_tracing();

    let result = panic::catch_unwind(run);

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

/// Log to stderr, only when RUST_LOG is set.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn run() {
    let env = create_global_env();
    let ctx = Context::stdio();

    let mut args = std::env::args().skip(1);
    let mut script = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-l" => {
                let Some(path) = args.next() else {
                    eprintln!("{USAGE}");
                    process::exit(2);
                };
                if let Err(err) = builtinops::load(&env, &path, &ctx) {
                    eprintln!("{err}");
                    process::exit(1);
                }
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return;
            }
            _ => script = Some(arg),
        }
    }

    // A script runs to completion without entering the interactive loop
    if let Some(path) = script {
        if let Err(err) = builtinops::load(&env, &path, &ctx) {
            eprintln!("{err}");
            process::exit(1);
        }
        return;
    }

    run_repl(&env, &ctx);
}

fn run_repl(env: &Environment, ctx: &Context) {
    println!("Sprig - a small Lisp with macros, tail calls and channels");
    println!("Enter expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            process::exit(1);
        }
    };

    loop {
        match rl.readline("sprig> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(command) = line.strip_prefix(':') {
                    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
                    match name {
                        "help" => print_help(),
                        "env" => print_environment(env),
                        "inspect" => inspect(env, ctx, rest.trim()),
                        "quit" | "exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => println!("Unknown command :{name} (try :help)"),
                    }
                    continue;
                }

                match parse_eval(env, line, "repl", ctx) {
                    Ok(result) => println!("{result}"),
                    Err(e) => println!("{e}"),
                }
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  :help           - Show this help message");
    println!("  :env            - Show top-level bindings");
    println!("  :inspect <expr> - Describe the value of an expression");
    println!("  :quit           - Exit the interpreter");
    println!("  :exit           - Exit the interpreter");
    println!();
    println!("Examples:");
    println!("  (def square (fn (x) (* x x)))");
    println!("  (square 12)");
    println!("  (def c (chan)) (go (send! c 42)) (take! c)");
    println!("  (macroexpand1 '(some-macro arg))");
    println!();
}

fn inspect(env: &Environment, ctx: &Context, source: &str) {
    if source.is_empty() {
        println!("usage: :inspect <expr>");
        return;
    }

    let node = match parse_eval(env, source, "repl", ctx) {
        Ok(node) => node,
        Err(e) => {
            println!("{e}");
            return;
        }
    };

    println!("{node} : {}", node.type_name());
    match &node.value {
        Value::Environment(scope) => {
            let mut chain = vec![scope.name().to_owned()];
            let mut parent = scope.parent();
            while let Some(p) = parent {
                chain.push(p.name().to_owned());
                parent = p.parent();
            }
            println!("  scope chain: {}", chain.join(" -> "));
            for (name, value) in scope.local_bindings() {
                println!("  {name} = {value}");
            }
        }
        Value::Function(function) => {
            println!("  params: {}", function.param_list());
            println!("  body: {}", function.body);
            println!("  defined in: {}", function.env.name());
        }
        _ => {
            if let Some(annotation) = &node.annotation {
                println!("  annotation: {annotation}");
            }
        }
    }
}

fn print_environment(env: &Environment) {
    let bindings = env.all_bindings();

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    let (primitives, user_defined): (Vec<(String, Node)>, Vec<(String, Node)>) = bindings
        .into_iter()
        .partition(|(_, value)| matches!(value.value, Value::Primitive(_)));

    if !primitives.is_empty() {
        println!("Primitives ({}):", primitives.len());
        // Print in columns for readability
        let mut col = 0;
        for (name, _) in primitives {
            print!("  {name:<20}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}

use paramlisp::Error;
use paramlisp::ast::Value;
use paramlisp::builtinops::Arity;
use paramlisp::driver::{Outcome, Session, SessionConfig, needs_more_input};
use paramlisp::evaluator::{EvalConfig, Interpreter};
use paramlisp::scheme::ParseConfig;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;
use std::process;

const EVAL_STACK_SIZE: usize = 512 * 1024 * 1024;

struct Options {
    config: SessionConfig,
    script: Option<PathBuf>,
}

fn parse_options() -> Result<Options, String> {
    let mut args = pico_args::Arguments::from_env();

    if args.contains(["-h", "--help"]) {
        println!("Usage: repl [options] [script]");
        println!("Options:");
        println!("  -h, --help: Print this help message");
        println!("  --max-depth <n>: Evaluation depth limit (default: {})", paramlisp::MAX_EVAL_DEPTH);
        println!("  --no-comments: Do not strip ';' comments from input");
        process::exit(0);
    }

    let max_depth = match args.opt_value_from_str::<_, usize>("--max-depth") {
        Ok(Some(depth)) => depth,
        Ok(None) => paramlisp::MAX_EVAL_DEPTH,
        Err(e) => return Err(e.to_string()),
    };
    let handle_comments = !args.contains("--no-comments");
    let script = args
        .opt_free_from_str::<PathBuf>()
        .map_err(|e| e.to_string())?;

    Ok(Options {
        config: SessionConfig {
            eval: EvalConfig { max_depth },
            parse: ParseConfig { handle_comments },
        },
        script,
    })
}

fn main() {
    env_logger::init();

    let options = match parse_options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };

    // The evaluator recurses on the native stack, one level per procedure call
    let worker = std::thread::Builder::new()
        .name("paramlisp".to_owned())
        .stack_size(EVAL_STACK_SIZE)
        .spawn(move || serve(options));
    match worker {
        Ok(handle) => {
            if handle.join().is_err() {
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: cannot start interpreter thread: {e}");
            process::exit(1);
        }
    }
}

fn serve(options: Options) {
    let mut session = Session::with_config(options.config);

    // Register custom function that can be called from user code for demonstration purposes
    if let Err(e) = session
        .interpreter_mut()
        .register_builtin_function("help", Arity::Exact(0), print_help)
    {
        eprintln!("Error: {e}");
    }

    match options.script {
        Some(path) => run_script(&session, &path),
        None => run_repl(&session),
    }
}

fn run_script(session: &Session, path: &PathBuf) {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: cannot read {}: {e}", path.display());
            process::exit(1);
        }
    };

    let mut failed = false;
    for outcome in session.run_script(&source) {
        match outcome {
            Outcome::Value(value) => println!("{value}"),
            Outcome::Error(e) => {
                eprintln!("Error: {e}");
                failed = true;
            }
            Outcome::Silent | Outcome::Exit => {}
        }
    }
    if failed {
        process::exit(1);
    }
}

fn run_repl(session: &Session) {
    println!("paramlisp - Lisp with per-parameter passing strategies");
    println!("Enter S-expressions like: (define (twice (delayed e)) (+ e e))");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Could not initialize REPL: {e}");
            process::exit(1);
        }
    };

    // Lines of an expression that is still open
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { "paramlisp> " } else { "...        " };
        let line = match rl.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                pending.clear();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // End of input is evaluated like any other item
                if session.eval_item(&Value::Eof) == Outcome::Exit {
                    println!("Goodbye!");
                }
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        };

        if pending.is_empty() {
            let command = line.trim();
            if command.is_empty() {
                continue;
            }
            let _ = rl.add_history_entry(command);

            match command {
                ":help" => {
                    _ = print_help(&[]).is_ok();
                    continue;
                }
                ":env" => {
                    print_environment(session.interpreter());
                    continue;
                }
                ":forms" => {
                    print_forms(session.interpreter());
                    continue;
                }
                ":quit" | ":exit" => {
                    println!("Goodbye!");
                    break;
                }
                _ => {}
            }
        } else {
            let _ = rl.add_history_entry(line.trim());
            pending.push('\n');
        }
        pending.push_str(&line);

        match session.eval_line(&pending) {
            Outcome::Error(e) if needs_more_input(&e) => continue,
            Outcome::Value(value) => println!("{value}"),
            Outcome::Silent => {}
            Outcome::Error(e) => println!("Error: {e}"),
            Outcome::Exit => {
                println!("Goodbye!");
                break;
            }
        }
        pending.clear();
    }
}

fn print_help(_args: &[Value]) -> Result<Value, Error> {
    println!("paramlisp commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current global bindings");
    println!("  :forms     - List installed special forms");
    println!("  :quit      - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Parameter passing (per parameter, in lambda lists):");
    println!("  x              - evaluated before the call");
    println!("  (delayed x)    - re-evaluated in the caller on every use");
    println!("  (dynamic x)    - evaluated against the active callers' bindings");
    println!("  (reference x)  - aliases the caller's variable");
    println!();
    println!("Examples:");
    println!("  (define (double! (reference r)) (set! r (* r 2)))");
    println!("  (define (ints n) (cons-stream n (ints (+ n 1))))");
    println!("  (stream-car (stream-cdr (ints 0)))");
    println!();

    Ok(Value::Unspecified)
}

fn print_environment(interp: &Interpreter) {
    let bindings = interp.global_env().get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate built-in functions from user-defined values
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::BuiltinFunction { .. } => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-in functions ({}):", builtins.len());
        print_columns(&builtins);
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}

fn print_forms(interp: &Interpreter) {
    let names = interp.special_forms().names();
    println!("Special forms ({}):", names.len());
    print_columns(&names);
}

fn print_columns<S: AsRef<str>>(names: &[S]) {
    let mut col = 0;
    for name in names {
        print!("  {:<22}", name.as_ref());
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

//! marl - run Marl scripts, or talk to the interpreter directly.
//!
//! Usage:
//!   marl script.ml [args...]    # run a script
//!   marl -e '1 + 2'             # evaluate one expression and print
//!   marl                        # interactive REPL
//!
//! The REPL keeps its definitions in a scope chained under the shared
//! base scope, so `x := 5;` on one line is visible on the next.
//! History lives in ~/.marl_history. Set MARL_REPORT=text|json for
//! interpreter statistics on exit, and RUST_LOG for tracing output.

use clap::Parser;
use marl_core::interp::{enter, leave};
use marl_core::map::new_map_with_super;
use marl_core::object::Obj;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "marl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "The Marl interpreter", long_about = None)]
struct Args {
    /// Script to run (starts the REPL if omitted)
    file: Option<PathBuf>,

    /// Arguments passed to the script as `argv`
    #[arg(trailing_var_arg = true)]
    script_args: Vec<String>,

    /// Evaluate one expression, print its value, and exit
    #[arg(short = 'e', long = "eval", value_name = "EXPR")]
    expr: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(_) = marl_runtime::init() {
        eprintln!(
            "marl: failed to initialise: {}",
            marl_core::get_error().unwrap_or_default()
        );
        std::process::exit(1);
    }
    marl_runtime::diagnostics::install();

    let status = run(&args);
    marl_runtime::shutdown();
    std::process::exit(status);
}

fn run(args: &Args) -> i32 {
    // argv: the script name (or "marl") followed by its arguments.
    {
        let ip = enter();
        let mut argv = vec![args
            .file
            .as_ref()
            .map_or_else(|| "marl".to_string(), |p| p.display().to_string())];
        argv.extend(args.script_args.iter().cloned());
        let r = marl_runtime::set_argv(ip, &argv);
        leave();
        if r.is_err() {
            return fail("setting argv");
        }
    }

    if let Some(expr) = &args.expr {
        let ip = enter();
        let r = marl_runtime::eval(ip, expr);
        let out = r.map(|v| {
            let text = marl_runtime::render(ip, v);
            v.decref();
            text
        });
        leave();
        return match out {
            Ok(text) => {
                println!("{text}");
                0
            }
            Err(_) => fail("evaluating expression"),
        };
    }

    if let Some(path) = &args.file {
        let ip = enter();
        let base = ip.base_scope;
        let scope = match new_map_with_super(ip, base) {
            Ok(s) => s,
            Err(_) => {
                leave();
                return fail("creating script scope");
            }
        };
        let r = marl_runtime::parse_path(ip, &path.display().to_string(), scope);
        scope.decref();
        leave();
        return match r {
            Ok(()) => 0,
            Err(_) => fail("running script"),
        };
    }

    repl()
}

fn fail(doing: &str) -> i32 {
    eprintln!(
        "marl: error {doing}: {}",
        marl_core::get_error().unwrap_or_else(|| "unknown error".to_string())
    );
    marl_core::clear_error();
    1
}

fn history_path() -> Option<PathBuf> {
    std::env::var("MARL_HISTORY")
        .map(PathBuf::from)
        .ok()
        .or_else(|| home::home_dir().map(|h| h.join(".marl_history")))
}

fn repl() -> i32 {
    println!("marl {} - type expressions or statements, ^D to exit", marl_core::VERSION);

    let mut editor = match DefaultEditor::new() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("marl: cannot start line editor: {e}");
            return 1;
        }
    };
    let history = history_path();
    if let Some(h) = &history {
        let _ = editor.load_history(h);
    }

    // REPL definitions live under the base scope and persist between
    // lines.
    let scope: Obj = {
        let ip = enter();
        let base = ip.base_scope;
        let s = match new_map_with_super(ip, base) {
            Ok(s) => s,
            Err(_) => {
                leave();
                return fail("creating REPL scope");
            }
        };
        leave();
        s
    };

    loop {
        match editor.readline("marl> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(trimmed);
                run_line(scope, trimmed);
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("marl: read error: {e}");
                break;
            }
        }
    }

    if let Some(h) = &history {
        let _ = editor.save_history(h);
    }
    let ip = enter();
    scope.decref();
    let _ = ip;
    leave();
    0
}

/// A line ending in ';' or '}' is statements run against the REPL
/// scope; anything else is an expression whose value prints.
fn run_line(scope: Obj, line: &str) {
    let ip = enter();
    if line.ends_with(';') || line.ends_with('}') {
        if marl_runtime::parse_data(ip, line.as_bytes(), "<repl>", scope).is_err() {
            eprintln!("error: {}", marl_core::get_error().unwrap_or_default());
            marl_core::clear_error();
        }
    } else {
        // Evaluate in the REPL scope: temporarily make it current.
        let r = with_scope(ip, scope, line);
        match r {
            Ok(text) => println!("{text}"),
            Err(_) => {
                eprintln!("error: {}", marl_core::get_error().unwrap_or_default());
                marl_core::clear_error();
            }
        }
    }
    leave();
}

fn with_scope(
    ip: &mut marl_core::Interp,
    scope: Obj,
    line: &str,
) -> marl_core::Res<String> {
    ip.vs_push(scope)?;
    let r = marl_runtime::eval(ip, line);
    ip.vs().pop();
    let v = r?;
    let text = marl_runtime::render(ip, v);
    v.decref();
    Ok(text)
}

//! Parse-and-go: the top-level statement loop, `parse_file` and
//! `eval`.
//!
//! Each top-level statement is compiled into its own code array and
//! executed as soon as it is complete, so definitions made by earlier
//! statements (including function literals' captured scopes) are live
//! while later ones parse.

use crate::parser::Parser;
use marl_core::array::new_array;
use marl_core::err::{set_error, Res};
use marl_core::file::open_charbuf;
use marl_core::interp::Interp;
use marl_core::object::Obj;
use marl_core::parse::new_parse;
use marl_core::string::{new_str, strof};
use marl_core::vm::exec_code;
use tracing::trace;

/// Parse and run every statement of `file` with `scope` as the
/// current scope.
pub fn parse_file(ip: &mut Interp, file: Obj, scope: Obj) -> Res {
    let name = marl_core::file::fileof(file).name;
    ip.vs_push(scope)?;
    let r = parse_loop(ip, file, name);
    ip.vs().pop();
    r
}

fn parse_loop(ip: &mut Interp, file: Obj, name: Obj) -> Res {
    let parse = new_parse(ip, file)?;
    let fname_disp = strof(name).text().into_owned();
    let mut parser = match Parser::new(ip, parse, name) {
        Ok(p) => p,
        Err(msg) => {
            parse.decref();
            return set_error(format!("{fname_disp}: {msg}"));
        }
    };

    let mut result: Res = Ok(());
    loop {
        let code = match new_array(parser.ip, 16) {
            Ok(c) => c,
            Err(e) => {
                result = Err(e);
                break;
            }
        };
        match parser.stmt(code) {
            Ok(false) => {
                code.decref();
                break;
            }
            Ok(true) => {
                trace!(file = %fname_disp, "executing top-level statement");
                let r = exec_code(parser.ip, code);
                code.decref();
                parser.drain_owned();
                match r {
                    Ok(v) => v.decref(),
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            }
            Err(msg) => {
                code.decref();
                parser.drain_owned();
                result = set_error(format!("{fname_disp}: {msg}"));
                break;
            }
        }
    }
    parser.drain_owned();
    parse.decref();
    result
}

/// Parse and run `source` (a whole module) against `scope`.
pub fn parse_data(ip: &mut Interp, source: &[u8], name: &str, scope: Obj) -> Res {
    let n = new_str(ip, name.as_bytes())?;
    let file = open_charbuf(ip, source, n)?;
    n.decref();
    let r = parse_file(ip, file, scope);
    let _ = marl_core::file::close_file(ip, file);
    file.decref();
    r
}

/// Read and run the script at `path` against `scope`.
pub fn parse_path(ip: &mut Interp, path: &str, scope: Obj) -> Res {
    let data = match std::fs::read(path) {
        Ok(d) => d,
        Err(e) => return set_error(format!("{path}: {e}")),
    };
    parse_data(ip, &data, path, scope)
}

/// Evaluate `source` as a single expression in the current scope and
/// return its value (owned).
pub fn eval(ip: &mut Interp, source: &str) -> Res<Obj> {
    let n = new_str(ip, b"<eval>")?;
    let file = open_charbuf(ip, source.as_bytes(), n)?;
    n.decref();
    let parse = new_parse(ip, file)?;

    let r = (|ip: &mut Interp| -> Res<Obj> {
        let name = marl_core::file::fileof(file).name;
        let mut parser = match Parser::new(ip, parse, name) {
            Ok(p) => p,
            Err(msg) => return set_error(format!("<eval>: {msg}")),
        };
        let code = new_array(parser.ip, 16)?;
        let compiled = (|p: &mut Parser| -> Result<(), String> {
            let arena = bumpalo::Bump::new();
            let e = p.expr(&arena)?;
            crate::compile::compile_expr(p.ip, code, e, true).map_err(|_| {
                let m = marl_core::get_error().unwrap_or_default();
                marl_core::clear_error();
                m
            })
        })(&mut parser);
        let r = match compiled {
            Ok(()) => exec_code(parser.ip, code),
            Err(msg) => set_error(format!("<eval>: {msg}")),
        };
        code.decref();
        parser.drain_owned();
        r
    })(ip);

    parse.decref();
    let _ = marl_core::file::close_file(ip, file);
    file.decref();
    r
}

//! Pathname search: locating script modules on the interpreter's
//! search path.
//!
//! The path is the colon-separated `MARL_PATH` environment variable;
//! the current directory is always searched first. `load(name)` runs
//! the first `name.ml` found against the current scope.

use marl_core::cfunc::{CfuncImpl, Frame};
use marl_core::err::{set_error, Res};
use marl_core::interp::Interp;
use marl_core::object::Obj;
use marl_core::string::strof;
use std::path::PathBuf;

pub const CFUNCS: &[(&str, CfuncImpl)] = &[("load", f_load), ("atom", f_atom)];

/// Find `name` (with the script extension appended when it has none)
/// on the search path. Returns the first hit.
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let file = if name.contains('.') {
        name.to_string()
    } else {
        format!("{name}.ml")
    };
    let mut dirs = vec![PathBuf::from(".")];
    if let Ok(path) = std::env::var("MARL_PATH") {
        dirs.extend(path.split(':').filter(|d| !d.is_empty()).map(PathBuf::from));
    }
    dirs.into_iter()
        .map(|d| d.join(&file))
        .find(|p| p.is_file())
}

/// `load(name)`: parse and run the named module from the search path
/// in the current scope; returns the path that was run.
fn f_load(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "s")?;
    let name = strof(fr.str_obj(ip, 0)?).text().into_owned();
    let Some(path) = find_on_path(&name) else {
        return set_error(format!("\"{name}\" not found on path"));
    };
    let display = path.display().to_string();
    let scope = ip.scope();
    marl_compiler::parse_path(ip, &display, scope)?;
    marl_core::string::new_str(ip, display.as_bytes())
}

/// `atom(o)`: the canonical interned object equal to `o`.
fn f_atom(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(1)?;
    let o = fr.arg(ip, 0);
    ip.atom(o, false)
}

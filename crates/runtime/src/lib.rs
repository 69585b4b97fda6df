//! marl-runtime: the intrinsic function tables scripts see, the stdio
//! file adapter, process diagnostics and interpreter bootstrap.

pub mod aggr;
pub mod basic;
pub mod diagnostics;
pub mod io;
pub mod math;
pub mod pathfind;
pub mod render;
pub mod report;
pub mod strings;
pub mod thread;

use marl_core::array::{new_array, push};
use marl_core::cfunc::define_cfuncs;
use marl_core::err::Res;
use marl_core::interp::{enter, leave, Interp};
use marl_core::map::assign_base;
use marl_core::string::new_str;

pub use marl_compiler::{eval, parse_data, parse_file, parse_path};
pub use render::render;

/// Bootstrap the interpreter: core init, the intrinsic tables and the
/// standard files. Call once at process start.
pub fn init() -> Res {
    marl_core::init()?;
    let ip = enter();
    let r = init_tables(ip);
    leave();
    r
}

fn init_tables(ip: &mut Interp) -> Res {
    define_cfuncs(ip, aggr::CFUNCS)?;
    define_cfuncs(ip, basic::CFUNCS)?;
    define_cfuncs(ip, strings::CFUNCS)?;
    define_cfuncs(ip, math::CFUNCS)?;
    define_cfuncs(ip, thread::CFUNCS)?;
    define_cfuncs(ip, io::CFUNCS)?;
    define_cfuncs(ip, pathfind::CFUNCS)?;
    io::init_stdio(ip)?;
    Ok(())
}

/// Expose the script's arguments as the `argv` array (of strings) in
/// the base scope. The GIL must be held.
pub fn set_argv(ip: &mut Interp, args: &[String]) -> Res {
    let arr = new_array(ip, args.len())?;
    for a in args {
        let s = new_str(ip, a.as_bytes())?;
        push(ip, arr, s)?;
        s.decref();
    }
    let key = ip.sstr.argv;
    let base = ip.base_scope;
    assign_base(ip, base, key, arr)?;
    arr.decref();
    Ok(())
}

/// Shutdown hook: emit the `MARL_REPORT` statistics (if configured)
/// and tear the interpreter down.
pub fn shutdown() {
    let ip = enter();
    report::emit_if_configured(ip);
    leave();
    marl_core::uninit();
}

//! Shared scaffolding for the interpreter integration tests.
//! Everything goes through the process-wide interpreter, so every
//! test is `#[serial]`.

use marl_core::interp::{enter, leave, Interp};
use marl_core::map::new_map_with_super;
use marl_core::object::Obj;
use marl_core::string::{new_str, strof};
use std::sync::Once;

static INIT: Once = Once::new();

pub fn with_ip<R>(f: impl FnOnce(&mut Interp) -> R) -> R {
    INIT.call_once(|| {
        marl_runtime::init().expect("interpreter bootstrap failed");
    });

    /// Releases the GIL on drop so a panicking `f` can't leave it
    /// held, which would deadlock every later test on `enter`.
    struct LeaveOnDrop;
    impl Drop for LeaveOnDrop {
        fn drop(&mut self) {
            leave();
        }
    }

    let ip = enter();
    marl_core::attach_thread(ip).expect("attach failed");
    let _guard = LeaveOnDrop;
    f(ip)
}

/// Run a script in a fresh module scope chained under the base scope;
/// returns the scope so tests can pull variables out of it.
pub fn run_script(ip: &mut Interp, source: &str) -> Obj {
    let base = ip.base_scope;
    let scope = new_map_with_super(ip, base).expect("scope");
    if let Err(_) = marl_runtime::parse_data(ip, source.as_bytes(), "<test>", scope) {
        let msg = marl_core::get_error().unwrap_or_default();
        panic!("script failed: {msg}");
    }
    scope
}

/// Fetch a variable of the script's scope as an int.
pub fn get_int(ip: &mut Interp, scope: Obj, name: &str) -> i64 {
    let k = new_str(ip, name.as_bytes()).unwrap();
    let v = ip.fetch(scope, k).unwrap();
    k.decref();
    assert_eq!(
        v.tcode(),
        marl_core::object::TC_INT,
        "{name} is not an int"
    );
    let n = marl_core::int::intof(v).value;
    v.decref();
    n
}

/// Fetch a variable of the script's scope as text.
pub fn get_str(ip: &mut Interp, scope: Obj, name: &str) -> String {
    let k = new_str(ip, name.as_bytes()).unwrap();
    let v = ip.fetch(scope, k).unwrap();
    k.decref();
    assert_eq!(
        v.tcode(),
        marl_core::object::TC_STRING,
        "{name} is not a string"
    );
    let s = strof(v).text().into_owned();
    v.decref();
    s
}

/// Evaluate an expression, expecting an int result.
pub fn eval_int(ip: &mut Interp, expr: &str) -> i64 {
    let v = marl_runtime::eval(ip, expr).expect("eval failed");
    assert_eq!(v.tcode(), marl_core::object::TC_INT);
    let n = marl_core::int::intof(v).value;
    v.decref();
    n
}

/// Evaluate an expression, expecting an error; returns the message.
pub fn eval_err(ip: &mut Interp, expr: &str) -> String {
    let r = marl_runtime::eval(ip, expr);
    assert!(r.is_err(), "{expr} unexpectedly succeeded");
    let msg = marl_core::get_error().unwrap_or_default();
    marl_core::clear_error();
    msg
}

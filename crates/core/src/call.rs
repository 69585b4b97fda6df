//! Calling script code from native code.
//!
//! `call_obj` builds an argument frame on the operand stack — mark,
//! arguments, callable — and runs the engine until the call returns,
//! handing back the result. This is how cfuncs, signal delivery and
//! embedding code invoke callables.

use crate::err::Res;
use crate::interp::Interp;
use crate::object::Obj;
use crate::op::{ecode, new_op};
use crate::string::new_str;
use crate::vm::evaluate;

/// Call `callable(args...)`; returns the owned result.
pub fn call_obj(ip: &mut Interp, callable: Obj, args: &[Obj]) -> Res<Obj> {
    ip.os_push(ip.o_mark)?;
    for &a in args {
        ip.os_push(a)?;
    }
    ip.os_push(callable)?;
    let op = new_op(ip, None, ecode::CALL, 0)?;
    let r = evaluate(ip, op);
    op.decref();
    r
}

/// Call the named function from the base scope.
pub fn call_by_name(ip: &mut Interp, name: &str, args: &[Obj]) -> Res<Obj> {
    let n = new_str(ip, name.as_bytes())?;
    let base = ip.base_scope;
    let f = ip.fetch(base, n)?;
    n.decref();
    let r = call_obj(ip, f, args);
    f.decref();
    r
}

//! The execution engine.
//!
//! Executing means popping the top of the execution stack and
//! evaluating it:
//!
//! - a pc fetches the next element of its code array and pushes it
//!   back on `xs`;
//! - an op dispatches on its execution code;
//! - a src marker records the current source position;
//! - a catcher surfacing naturally is a scope exit: error catchers
//!   uninstall, loop frames re-enter their body (a back edge), call
//!   frames return NULL;
//! - a string is a variable name, looked up through the scope chain
//!   onto the operand stack;
//! - anything else pushes itself onto the operand stack.
//!
//! ## Rooting discipline
//!
//! Any allocation may collect, and the collector only sees the stacks,
//! the exec records and pinned (`nrefs > 0`) objects. The engine
//! therefore never holds an object in a native local across an
//! allocation without either leaving it on a stack or bracketing it
//! with `incref`/`decref`.

use crate::array::arrayof;
use crate::catcher::{catcherof, new_catcher, CATCH_CALL, CATCH_ERROR, CATCH_LOOP};
use crate::err::{get_error, set_error, Fail, Res};
use crate::exec::{engine_stack_check, execof_mut};
use crate::int::{intof, new_int};
use crate::interp::{Interp, ABORTED};
use crate::map::{lookup_base, mapof};
use crate::object::{
    Obj, TC_CATCHER, TC_FLOAT, TC_INT, TC_MAP, TC_NULL, TC_OP, TC_PC, TC_SRC, TC_STRING,
};
use crate::op::{ecode, opof};
use crate::pc::{new_pc, pcof, pcof_mut};
use crate::signal::{invoke_signal_handlers, signals_pending};
use crate::string::{new_str, strof};
use std::sync::atomic::Ordering;

/// Truth of a value: NULL, int 0 and float 0.0 are false, everything
/// else is true.
pub fn is_true(_ip: &Interp, o: Obj) -> bool {
    match o.tcode() {
        TC_NULL => false,
        TC_INT => intof(o).value != 0,
        TC_FLOAT => crate::float::floatof(o).value != 0.0,
        _ => true,
    }
}

/// Evaluate one object to completion: push it on the execution stack
/// and run until the stack returns to its entry depth. Returns the
/// value produced on the operand stack (owned), or NULL if the
/// evaluation produced none.
pub fn evaluate(ip: &mut Interp, o: Obj) -> Res<Obj> {
    let depth0 = ip.xs().len();
    let os0 = ip.os().len();
    ip.xs_push(o)?;
    match main_loop(ip, depth0) {
        Ok(()) => {
            let os = ip.os();
            if os.len() > os0 {
                let v = os.pop();
                v.incref();
                ip.os().truncate(os0);
                Ok(v)
            } else {
                ip.o_null.incref();
                Ok(ip.o_null)
            }
        }
        Err(e) => {
            let os = ip.os();
            let keep = os0.min(os.len());
            os.truncate(keep);
            if ip.xs().len() > depth0 {
                ip.xs().truncate(depth0);
            }
            Err(e)
        }
    }
}

/// Execute a compiled code array and return its value.
pub fn exec_code(ip: &mut Interp, code: Obj) -> Res<Obj> {
    let pc = new_pc(ip, code, 0)?;
    let r = evaluate(ip, pc);
    pc.decref();
    r
}

fn main_loop(ip: &mut Interp, depth0: usize) -> Res {
    loop {
        if ABORTED.load(Ordering::Relaxed) {
            ip.xs().truncate(depth0);
            return set_error("aborted");
        }
        let xs = ip.xs();
        if xs.len() == depth0 {
            return Ok(());
        }
        debug_assert!(xs.len() > depth0);
        let o = xs.top_obj();

        let r: Res = match o.tcode() {
            TC_PC => step_pc(ip, o),
            TC_SRC => {
                ip.xs().pop();
                // Still rooted by its code array.
                execof_mut(ip.ex()).src = o;
                Ok(())
            }
            TC_OP => {
                ip.xs().pop();
                exec_op(ip, o)
            }
            TC_CATCHER => surface_catcher(ip, o),
            TC_STRING => lookup_name(ip, o),
            _ => {
                // A value: operand-stack bound. Push before popping so
                // it stays rooted across a possible stack grow.
                ip.os_push(o)?;
                ip.xs().pop();
                Ok(())
            }
        };

        if r.is_err() {
            match unwind_to_catcher(ip, depth0) {
                Ok(true) => {}
                Ok(false) => return Err(Fail),
                Err(_) => return Err(Fail),
            }
        }
    }
}

/// Fetch the next element of a pc's code array onto the execution
/// stack, or pop an exhausted pc.
fn step_pc(ip: &mut Interp, pco: Obj) -> Res {
    let (code, offset) = {
        let pc = pcof(pco);
        (pc.code, pc.offset)
    };
    let c = arrayof(code);
    if offset >= c.len() {
        ip.xs().pop();
        return Ok(());
    }
    let o = c.get(offset);
    pcof_mut(pco).offset = offset + 1;
    // o stays rooted by the code array.
    ip.xs_push(o)
}

/// A catcher has surfaced naturally on the execution stack.
fn surface_catcher(ip: &mut Interp, o: Obj) -> Res {
    match catcherof(o).kind {
        CATCH_ERROR => {
            // The protected region completed; uninstall.
            ip.xs().pop();
            Ok(())
        }
        CATCH_LOOP => {
            // Back edge: deliver pending signals, then re-enter the
            // body from the top.
            if signals_pending() {
                invoke_signal_handlers(ip)?;
            }
            let target = catcherof(o).target;
            let pc = new_pc(ip, target, 0)?;
            ip.xs_push(pc)?;
            pc.decref();
            Ok(())
        }
        _ => {
            // A call frame: the function body fell off its end.
            // Return NULL to the caller.
            let (odepth, vdepth) = {
                let c = catcherof(o);
                (c.odepth as usize, c.vdepth as usize)
            };
            ip.xs().pop();
            ip.vs().truncate(vdepth);
            ip.os().truncate(odepth);
            ip.os_push(ip.o_null)
        }
    }
}

/// A string on the execution stack is a variable name: look it up
/// through the scope chain.
fn lookup_name(ip: &mut Interp, name: Obj) -> Res {
    let scope = ip.scope();
    let t = ip.type_of(scope);
    match t.fetch_super(ip, scope, name)? {
        Some(v) => {
            // v is rooted by the scope that bound it.
            ip.os_push(v)?;
            ip.xs().pop();
            Ok(())
        }
        None => set_error(format!("\"{}\" undefined", strof(name).text())),
    }
}

/// The opcode dispatch. The op has been popped; its fields are read
/// before anything can allocate (ops are atoms, and atoms not on a
/// stack can be collected).
fn exec_op(ip: &mut Interp, o: Obj) -> Res {
    let (func, ec, code) = {
        let op = opof(o);
        (op.func, op.ecode, op.code)
    };
    match ec {
        ecode::OTHER => match func {
            Some(f) => f(ip),
            None => set_error("bad op"),
        },

        ecode::CALL => {
            if signals_pending() {
                invoke_signal_handlers(ip)?;
            }
            engine_stack_check(ip)?;
            let f = ip.os().pop();
            f.incref();
            let t = ip.type_of(f);
            let r = t.call(ip, f, None);
            f.decref();
            r
        }

        ecode::QUOTE => {
            // The element after this op in the executing code array is
            // a literal; the pc is back on top of xs now.
            let pco = ip.xs().top_obj();
            debug_assert_eq!(pco.tcode(), TC_PC);
            let (codearr, offset) = {
                let pc = pcof(pco);
                (pc.code, pc.offset)
            };
            let lit = arrayof(codearr).get(offset);
            pcof_mut(pco).offset = offset + 1;
            ip.os_push(lit)
        }

        ecode::BINOP => crate::binop::op_binop(ip, code),
        ecode::UNARY => op_unary(ip, code),

        ecode::ASSIGN => {
            let n = ip.os().len();
            let (a, k, v) = (ip.os().get(n - 3), ip.os().get(n - 2), ip.os().get(n - 1));
            ip.assign(a, k, v)?;
            v.incref();
            ip.os().truncate(n - 3);
            ip.os_push(v)?;
            v.decref();
            Ok(())
        }

        ecode::ASSIGN_NAME => {
            let n = ip.os().len();
            let (name, v) = (ip.os().get(n - 2), ip.os().get(n - 1));
            let scope = ip.scope();
            if code == 1 {
                // ":=" defines in the innermost scope.
                let t = ip.type_of(scope);
                t.assign_base(ip, scope, name, v)?;
            } else {
                // "=" updates an existing binding on the chain, else
                // defines in the innermost writable scope.
                let t = ip.type_of(scope);
                if !t.assign_super(ip, scope, name, v)? {
                    t.assign_base(ip, scope, name, v)?;
                }
            }
            v.incref();
            ip.os().truncate(n - 2);
            ip.os_push(v)?;
            v.decref();
            Ok(())
        }

        ecode::FETCH | ecode::FETCH_KEEP => {
            let n = ip.os().len();
            let (a, k) = (ip.os().get(n - 2), ip.os().get(n - 1));
            let v = ip.fetch(a, k)?;
            if ec == ecode::FETCH {
                ip.os().truncate(n - 2);
            }
            ip.os_push(v)?;
            v.decref();
            Ok(())
        }

        ecode::MKPTR => {
            let n = ip.os().len();
            let (a, k) = (ip.os().get(n - 2), ip.os().get(n - 1));
            let p = crate::ptr::new_ptr(ip, a, k)?;
            ip.os().truncate(n - 2);
            ip.os_push(p)?;
            p.decref();
            Ok(())
        }

        ecode::MKPTR_NAME => {
            let n = ip.os().len();
            let name = ip.os().get(n - 1);
            // Point at the scope that binds the name, or the innermost
            // scope for a new binding.
            let mut holder = ip.scope();
            let mut cur = holder;
            while cur.tcode() == TC_MAP {
                if lookup_base(ip, cur, name).is_some() {
                    holder = cur;
                    break;
                }
                match mapof(cur).super_map() {
                    Some(s) => cur = s,
                    None => break,
                }
            }
            let p = crate::ptr::new_ptr(ip, holder, name)?;
            ip.os().truncate(n - 1);
            ip.os_push(p)?;
            p.decref();
            Ok(())
        }

        ecode::OPENPTR | ecode::OPENPTR_KEEP => {
            let n = ip.os().len();
            let po = ip.os().get(n - 1);
            if po.tcode() != crate::object::TC_PTR {
                return set_error(format!(
                    "attempt to dereference a {}",
                    ip.type_name(po)
                ));
            }
            let (aggr, key) = {
                let p = crate::ptr::ptrof(po);
                (p.aggr, p.key)
            };
            let v = ip.fetch(aggr, key)?;
            if ec == ecode::OPENPTR {
                ip.os().truncate(n - 1);
            }
            ip.os_push(v)?;
            v.decref();
            Ok(())
        }

        ecode::ASSIGN_PTR => {
            let n = ip.os().len();
            let (po, v) = (ip.os().get(n - 2), ip.os().get(n - 1));
            if po.tcode() != crate::object::TC_PTR {
                return set_error(format!("attempt to assign through a {}", ip.type_name(po)));
            }
            let (aggr, key) = {
                let p = crate::ptr::ptrof(po);
                (p.aggr, p.key)
            };
            ip.assign(aggr, key, v)?;
            v.incref();
            ip.os().truncate(n - 2);
            ip.os_push(v)?;
            v.decref();
            Ok(())
        }

        ecode::IF => {
            let n = ip.os().len();
            let (cond, arr) = (ip.os().get(n - 2), ip.os().get(n - 1));
            arr.incref();
            ip.os().truncate(n - 2);
            let r = if is_true(ip, cond) {
                let pc = new_pc(ip, arr, 0)?;
                ip.xs_push(pc)?;
                pc.decref();
                Ok(())
            } else {
                Ok(())
            };
            arr.decref();
            r
        }

        ecode::IFELSE => {
            let n = ip.os().len();
            let (cond, then_a, else_a) = (
                ip.os().get(n - 3),
                ip.os().get(n - 2),
                ip.os().get(n - 1),
            );
            let arr = if is_true(ip, cond) { then_a } else { else_a };
            arr.incref();
            ip.os().truncate(n - 3);
            let pc = new_pc(ip, arr, 0);
            let r = match pc {
                Ok(pc) => {
                    ip.xs_push(pc)?;
                    pc.decref();
                    Ok(())
                }
                Err(e) => Err(e),
            };
            arr.decref();
            r
        }

        ecode::IFNOTBREAK => {
            let cond = ip.os().pop();
            if is_true(ip, cond) {
                Ok(())
            } else {
                do_break(ip)
            }
        }

        ecode::LOOP => {
            let n = ip.os().len();
            let arr = ip.os().get(n - 1);
            arr.incref();
            ip.os().truncate(n - 1);
            let odepth = ip.os().len();
            let vdepth = ip.vs().len();
            let r = (|| {
                let frame = new_catcher(ip, arr, odepth, vdepth, CATCH_LOOP)?;
                ip.xs_push(frame)?;
                frame.decref();
                let pc = new_pc(ip, arr, code as usize)?;
                ip.xs_push(pc)?;
                pc.decref();
                Ok(())
            })();
            arr.decref();
            r
        }

        ecode::BREAK => do_break(ip),

        ecode::CONTINUE => {
            // Unwind to the nearest loop frame, leaving it in place:
            // the main loop re-enters the body from the top.
            loop {
                let xs = ip.xs();
                if xs.is_empty() {
                    return set_error("continue outside a loop");
                }
                let t = xs.top_obj();
                if t.tcode() == TC_CATCHER {
                    let c = catcherof(t);
                    if c.kind == CATCH_LOOP {
                        let (od, vd) = (c.odepth as usize, c.vdepth as usize);
                        ip.os().truncate(od);
                        ip.vs().truncate(vd);
                        return Ok(());
                    }
                    if c.kind == CATCH_CALL {
                        return set_error("continue outside a loop");
                    }
                }
                xs.pop();
            }
        }

        ecode::ANDAND => {
            let n = ip.os().len();
            let (lhs, arr) = (ip.os().get(n - 2), ip.os().get(n - 1));
            let is_and = code == 1;
            let lhs_true = is_true(ip, lhs);
            if is_and != lhs_true {
                // Short circuit: && with a false lhs, || with a true
                // one. The small-int result involves no allocation.
                let v = new_int(ip, lhs_true as i64)?;
                ip.os().truncate(n - 2);
                ip.os_push(v)?;
                v.decref();
                Ok(())
            } else {
                arr.incref();
                ip.os().truncate(n - 2);
                let r = (|| {
                    let pc = new_pc(ip, arr, 0)?;
                    ip.xs_push(pc)?;
                    pc.decref();
                    Ok(())
                })();
                arr.decref();
                r
            }
        }

        ecode::ISTRUE => {
            let v = ip.os().pop();
            let b = new_int(ip, is_true(ip, v) as i64)?;
            ip.os_push(b)?;
            b.decref();
            Ok(())
        }

        ecode::RETURN => op_return(ip),

        ecode::ONERROR => {
            let n = ip.os().len();
            let (try_a, handler_a) = (ip.os().get(n - 2), ip.os().get(n - 1));
            try_a.incref();
            handler_a.incref();
            ip.os().truncate(n - 2);
            let odepth = ip.os().len();
            let vdepth = ip.vs().len();
            let r = (|| {
                let c = new_catcher(ip, handler_a, odepth, vdepth, CATCH_ERROR)?;
                ip.xs_push(c)?;
                c.decref();
                let pc = new_pc(ip, try_a, 0)?;
                ip.xs_push(pc)?;
                pc.decref();
                Ok(())
            })();
            try_a.decref();
            handler_a.decref();
            r
        }

        ecode::POP => {
            debug_assert!(!ip.os().is_empty());
            ip.os().pop();
            Ok(())
        }

        _ => set_error(format!("bad execution code {ec}")),
    }
}

/// `-x`, `!x`, `~x`.
fn op_unary(ip: &mut Interp, code: i16) -> Res {
    let n = ip.os().len();
    let v = ip.os().get(n - 1);
    let r = match code {
        0 => match v.tcode() {
            TC_INT => new_int(ip, intof(v).value.wrapping_neg())?,
            TC_FLOAT => crate::float::new_float(ip, -crate::float::floatof(v).value)?,
            _ => {
                return set_error(format!("attempt to negate a {}", ip.type_name(v)));
            }
        },
        1 => new_int(ip, !is_true(ip, v) as i64)?,
        _ => match v.tcode() {
            TC_INT => new_int(ip, !intof(v).value)?,
            _ => {
                return set_error(format!("attempt to complement a {}", ip.type_name(v)));
            }
        },
    };
    ip.os().truncate(n - 1);
    ip.os_push(r)?;
    r.decref();
    Ok(())
}

/// Unwind to the nearest loop frame, popping it, and restore the
/// depths it recorded.
fn do_break(ip: &mut Interp) -> Res {
    loop {
        let xs = ip.xs();
        if xs.is_empty() {
            return set_error("break outside a loop");
        }
        let t = xs.pop();
        if t.tcode() == TC_CATCHER {
            let c = catcherof(t);
            match c.kind {
                CATCH_LOOP => {
                    let (od, vd) = (c.odepth as usize, c.vdepth as usize);
                    ip.os().truncate(od);
                    ip.vs().truncate(vd);
                    return Ok(());
                }
                CATCH_CALL => return set_error("break outside a loop"),
                _ => {}
            }
        }
    }
}

/// Return from the current function: the return value is on the
/// operand stack top.
fn op_return(ip: &mut Interp) -> Res {
    let v = ip.os().pop();
    v.incref();
    let r = (|| loop {
        let xs = ip.xs();
        if xs.is_empty() {
            return set_error("return outside a function");
        }
        let t = xs.pop();
        if t.tcode() == TC_CATCHER {
            let c = catcherof(t);
            if c.kind == CATCH_CALL {
                let (od, vd) = (c.odepth as usize, c.vdepth as usize);
                ip.vs().truncate(vd);
                ip.os().truncate(od);
                return Ok(());
            }
        }
    })();
    match r {
        Ok(()) => {
            ip.os_push(v)?;
            v.decref();
            Ok(())
        }
        Err(e) => {
            v.decref();
            Err(e)
        }
    }
}

/// Raising: pop the execution stack to the nearest error catcher,
/// restore its depths, bind the error text to `error` in the restored
/// scope and enter the handler. `Ok(false)` means no catcher above
/// the entry depth: the error propagates to the evaluate caller.
fn unwind_to_catcher(ip: &mut Interp, depth0: usize) -> Res<bool> {
    let msg = get_error().unwrap_or_else(|| "error".to_string());
    loop {
        if ip.xs().len() <= depth0 {
            return Ok(false);
        }
        let t = ip.xs().pop();
        if t.tcode() != TC_CATCHER {
            continue;
        }
        let (kind, target, od, vd) = {
            let c = catcherof(t);
            (c.kind, c.target, c.odepth as usize, c.vdepth as usize)
        };
        if kind != CATCH_ERROR {
            continue;
        }
        target.incref();
        ip.os().truncate(od);
        ip.vs().truncate(vd);
        let r = (|| {
            // Make the error text available to the handler as `error`.
            let es = new_str(ip, msg.as_bytes())?;
            let scope = ip.scope();
            let st = ip.type_of(scope);
            let error_name = ip.sstr.error;
            st.assign_base(ip, scope, error_name, es)?;
            es.decref();
            let pc = new_pc(ip, target, 0)?;
            ip.xs_push(pc)?;
            pc.decref();
            Ok(())
        })();
        target.decref();
        return match r {
            Ok(()) => Ok(true),
            Err(e) => Err(e),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{new_array, push};
    use crate::call::call_obj;
    use crate::cfunc::{new_cfunc, Frame};
    use crate::int::{intof, new_int};
    use crate::interp::Interp;
    use crate::op::new_op;
    use crate::testutil::with_interp;
    use serial_test::serial;

    fn emit(ip: &mut Interp, code: Obj, o: Obj) {
        push(ip, code, o).unwrap();
        o.decref();
    }

    #[test]
    #[serial]
    fn test_binop_over_hand_assembled_code() {
        with_interp(|ip| {
            // [40, 2, +] leaves 42 on the operand stack.
            let code = new_array(ip, 4).unwrap();
            let forty = new_int(ip, 40).unwrap();
            emit(ip, code, forty);
            let two = new_int(ip, 2).unwrap();
            emit(ip, code, two);
            let add = new_op(ip, None, ecode::BINOP, crate::binop::ADD).unwrap();
            emit(ip, code, add);
            let v = exec_code(ip, code).unwrap();
            assert_eq!(intof(v).value, 42);
            v.decref();
            code.decref();
        });
    }

    #[test]
    #[serial]
    fn test_operand_stack_balanced_across_evaluate() {
        with_interp(|ip| {
            let d0 = ip.os().len();
            let code = new_array(ip, 4).unwrap();
            let seven = new_int(ip, 7).unwrap();
            emit(ip, code, seven);
            let v = exec_code(ip, code).unwrap();
            assert_eq!(intof(v).value, 7);
            assert_eq!(ip.os().len(), d0);
            v.decref();
            code.decref();
        });
    }

    fn native_sum(ip: &mut Interp, fr: &Frame) -> crate::err::Res<Obj> {
        let mut total = 0;
        for i in 0..fr.nargs {
            total += fr.int(ip, i)?;
        }
        new_int(ip, total)
    }

    #[test]
    #[serial]
    fn test_native_call_through_the_engine() {
        with_interp(|ip| {
            let cf = new_cfunc(ip, "sum", native_sum).unwrap();
            let a = new_int(ip, 10).unwrap();
            let b = new_int(ip, 32).unwrap();
            let r = call_obj(ip, cf, &[a, b]).unwrap();
            assert_eq!(intof(r).value, 42);
            r.decref();
            a.decref();
            b.decref();
            cf.decref();
        });
    }

    #[test]
    #[serial]
    fn test_cfunc_argument_errors() {
        with_interp(|ip| {
            let cf = new_cfunc(ip, "sum", native_sum).unwrap();
            let f = crate::float::new_float(ip, 1.5).unwrap();
            let r = call_obj(ip, cf, &[f]);
            assert!(r.is_err());
            let msg = crate::err::get_error().unwrap();
            assert!(msg.contains("argument 0"), "got: {msg}");
            crate::err::clear_error();
            f.decref();
            cf.decref();
        });
    }

    #[test]
    #[serial]
    fn test_truthiness() {
        with_interp(|ip| {
            let zero = new_int(ip, 0).unwrap();
            let one = new_int(ip, 1).unwrap();
            let fz = crate::float::new_float(ip, 0.0).unwrap();
            assert!(!is_true(ip, ip.o_null));
            assert!(!is_true(ip, zero));
            assert!(!is_true(ip, fz));
            assert!(is_true(ip, one));
            zero.decref();
            one.decref();
            fz.decref();
        });
    }
}

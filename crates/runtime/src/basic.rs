//! Scalar conversions, control intrinsics and interpreter plumbing.

use crate::render::render;
use marl_core::array::arrayof;
use marl_core::call::call_obj;
use marl_core::cfunc::{CfuncImpl, Frame};
use marl_core::err::{set_error, Res};
use marl_core::float::{floatof, new_float};
use marl_core::int::{intof, new_int};
use marl_core::interp::Interp;
use marl_core::map::new_map_with_super;
use marl_core::method::new_method;
use marl_core::object::{Obj, TC_FLOAT, TC_INT, TC_MAP, TC_STRING};
use marl_core::string::{new_str, strof};

pub const CFUNCS: &[(&str, CfuncImpl)] = &[
    ("typeof", f_typeof),
    ("int", f_int),
    ("float", f_float),
    ("num", f_num),
    ("string", f_string),
    ("tochar", f_tochar),
    ("toint", f_toint),
    ("fail", f_fail),
    ("eval", f_eval),
    ("parse", f_parse),
    ("call", f_call),
    ("method", f_method),
    ("alloc", f_alloc),
    ("gc", f_gc),
    ("sleep", f_sleep),
    ("trap", f_trap),
    ("abort", f_abort),
];

/// `typeof(o)`: the type name as a string.
fn f_typeof(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(1)?;
    let name = ip.type_name(fr.arg(ip, 0));
    new_str(ip, name.as_bytes())
}

fn parse_int_text(text: &str) -> Option<i64> {
    let t = text.trim();
    let (neg, t) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t),
    };
    let v = if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if t.len() > 1 && t.starts_with('0') {
        i64::from_str_radix(&t[1..], 8).ok()?
    } else {
        t.parse::<i64>().ok()?
    };
    Some(if neg { -v } else { v })
}

/// `int(x)`: ints pass through, floats truncate, strings scan with
/// the C radix conventions.
fn f_int(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(1)?;
    let o = fr.arg(ip, 0);
    match o.tcode() {
        TC_INT => {
            o.incref();
            Ok(o)
        }
        TC_FLOAT => new_int(ip, floatof(o).value as i64),
        TC_STRING => match parse_int_text(&strof(o).text()) {
            Some(v) => new_int(ip, v),
            None => new_int(ip, 0),
        },
        _ => marl_core::argerror(0),
    }
}

/// `float(x)`.
fn f_float(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(1)?;
    let o = fr.arg(ip, 0);
    match o.tcode() {
        TC_FLOAT => {
            o.incref();
            Ok(o)
        }
        TC_INT => new_float(ip, intof(o).value as f64),
        TC_STRING => new_float(ip, strof(o).text().trim().parse().unwrap_or(0.0)),
        _ => marl_core::argerror(0),
    }
}

/// `num(x)`: a number from a string (int if it scans as one, float
/// otherwise); numbers pass through.
fn f_num(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(1)?;
    let o = fr.arg(ip, 0);
    match o.tcode() {
        TC_INT | TC_FLOAT => {
            o.incref();
            Ok(o)
        }
        TC_STRING => {
            let text = strof(o).text().into_owned();
            if let Some(v) = parse_int_text(&text) {
                return new_int(ip, v);
            }
            match text.trim().parse::<f64>() {
                Ok(v) => new_float(ip, v),
                Err(_) => set_error(format!("\"{text}\" is not a number")),
            }
        }
        _ => marl_core::argerror(0),
    }
}

/// `string(x)`: render to a string.
fn f_string(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(1)?;
    let text = render(ip, fr.arg(ip, 0));
    new_str(ip, text.as_bytes())
}

/// `tochar(i)`: the one-character string of byte `i`.
fn f_tochar(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "i")?;
    let v = fr.int(ip, 0)?;
    if !(0..=255).contains(&v) {
        return set_error("character out of range");
    }
    new_str(ip, &[v as u8])
}

/// `toint(s)`: the first byte of a one-character string.
fn f_toint(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "s")?;
    let s = fr.str_obj(ip, 0)?;
    if strof(s).nchars != 1 {
        return set_error("toint wants a one-character string");
    }
    new_int(ip, strof(s).bytes()[0] as i64)
}

/// `fail(msg)`: raise an error with the given text.
fn f_fail(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "s")?;
    let s = fr.str_obj(ip, 0)?;
    set_error(strof(s).text().into_owned())
}

/// `eval(s)`: evaluate a source string as one expression in the
/// current scope.
fn f_eval(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "s")?;
    let s = fr.str_obj(ip, 0)?;
    let source = strof(s).text().into_owned();
    marl_compiler::eval(ip, &source)
}

/// `parse(s [, scope])`: run a module source string against `scope`
/// (default: a fresh map under the current scope); returns the scope.
fn f_parse(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need_between(1, 2)?;
    let s = fr.str_obj(ip, 0)?;
    let scope = if fr.nargs == 2 {
        let m = fr.arg(ip, 1);
        if m.tcode() != TC_MAP {
            return marl_core::argerror(1);
        }
        m.incref();
        m
    } else {
        let cur = ip.scope();
        new_map_with_super(ip, cur)?
    };
    let source = strof(s).bytes().to_vec();
    let r = marl_compiler::parse_data(ip, &source, "<parse>", scope);
    match r {
        Ok(()) => Ok(scope),
        Err(e) => {
            scope.decref();
            Err(e)
        }
    }
}

/// `call(f, args)`: call with arguments taken from an array.
fn f_call(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(2)?;
    let f = fr.callable(ip, 0)?;
    let a = fr.array(ip, 1)?;
    let args: Vec<Obj> = (0..arrayof(a).len()).map(|i| arrayof(a).get(i)).collect();
    call_obj(ip, f, &args)
}

/// `method(subject, callable)`.
fn f_method(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(2)?;
    let subject = fr.arg(ip, 0);
    let callable = fr.callable(ip, 1)?;
    new_method(ip, subject, callable)
}

unsafe fn free_mem(p: *mut u8) {
    libc::free(p as *mut libc::c_void);
}

/// `alloc(n [, accessz])`: a zeroed mem object of `n` elements of 1,
/// 2, 4 or 8 bytes.
fn f_alloc(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need_between(1, 2)?;
    let n = fr.int(ip, 0)?;
    let accessz = if fr.nargs == 2 { fr.int(ip, 1)? } else { 1 };
    if n < 0 || !matches!(accessz, 1 | 2 | 4 | 8) {
        return marl_core::argerror(1);
    }
    let bytes = (n as usize).saturating_mul(accessz as usize).max(1);
    let base = unsafe { libc::calloc(bytes, 1) as *mut u8 };
    if base.is_null() {
        return set_error("ran out of memory");
    }
    marl_core::mem::new_mem(ip, base, n as usize, accessz as usize, Some(free_mem))
}

/// `gc()`: force a collection; returns the lifetime collection count.
fn f_gc(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(0)?;
    ip.reclaim();
    let n = ip.ncollects as i64;
    new_int(ip, n)
}

/// `sleep(seconds)`: block without holding the interpreter lock.
fn f_sleep(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(1)?;
    let secs = fr.num(ip, 0)?;
    if secs < 0.0 {
        return marl_core::argerror(0);
    }
    let dur = std::time::Duration::from_secs_f64(secs);
    // The lock is dropped for the duration; see the waitfor contract.
    marl_core::interp::leave();
    std::thread::sleep(dur);
    let _ = marl_core::interp::enter();
    ip.o_null.incref();
    Ok(ip.o_null)
}

/// `trap(signo, handler)`: deliver `signo` to `handler(signo)` at the
/// VM's next back edge.
fn f_trap(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(2)?;
    let signo = fr.int(ip, 0)?;
    let handler = fr.callable(ip, 1)?;
    marl_core::signal::trap_signal(ip, signo, handler)?;
    ip.o_null.incref();
    Ok(ip.o_null)
}

/// `abort()`: stop every interpreter thread at its next check.
fn f_abort(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(0)?;
    marl_core::interp::ABORTED.store(true, std::sync::atomic::Ordering::SeqCst);
    ip.o_null.incref();
    Ok(ip.o_null)
}

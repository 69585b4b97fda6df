//! Thread and channel intrinsics: the blessed way for scripts to run
//! and talk across OS threads.

use marl_core::cfunc::{CfuncImpl, Frame};
use marl_core::channel::{channel_get, channel_put, new_channel};
use marl_core::err::Res;
use marl_core::exec::go_thread;
use marl_core::interp::{wakeup, Interp};
use marl_core::object::Obj;

pub const CFUNCS: &[(&str, CfuncImpl)] = &[
    ("channel", f_channel),
    ("get", f_get),
    ("put", f_put),
    ("go", f_go),
    ("wakeup", f_wakeup),
];

/// `channel([capacity])`: a new channel, capacity >= 1 (default 1).
fn f_channel(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need_between(0, 1)?;
    let cap = if fr.nargs == 1 { fr.int(ip, 0)? } else { 1 };
    if cap < 1 {
        return marl_core::argerror(0);
    }
    new_channel(ip, cap as usize)
}

/// `get(ch)`: blocking receive.
fn f_get(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(1)?;
    let ch = fr.channel(ip, 0)?;
    channel_get(ip, ch)
}

/// `put(ch, v)`: blocking send; returns the value.
fn f_put(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(2)?;
    let ch = fr.channel(ip, 0)?;
    let v = fr.arg(ip, 1);
    channel_put(ip, ch, v)?;
    v.incref();
    Ok(v)
}

/// `go(f, args...)`: run `f(args...)` on a new interpreter thread
/// with its own execution context. Returns the thread's exec object;
/// a wakeup is posted on it when the thread finishes.
fn f_go(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    if fr.nargs < 1 {
        return marl_core::argcount(1, fr.nargs);
    }
    let f = fr.callable(ip, 0)?;
    let args: Vec<Obj> = (1..fr.nargs).map(|i| fr.arg(ip, i)).collect();
    go_thread(ip, f, &args)
}

/// `wakeup(o)`: wake threads blocked waiting on `o`.
fn f_wakeup(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(1)?;
    wakeup(fr.arg(ip, 0));
    ip.o_null.incref();
    Ok(ip.o_null)
}

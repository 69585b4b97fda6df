//! Numeric intrinsics over the int and float types.

use marl_core::cfunc::{CfuncImpl, Frame};
use marl_core::err::{set_error, Res};
use marl_core::float::new_float;
use marl_core::int::{intof, new_int};
use marl_core::interp::Interp;
use marl_core::object::{Obj, TC_INT};

pub const CFUNCS: &[(&str, CfuncImpl)] = &[
    ("abs", f_abs),
    ("min", f_min),
    ("max", f_max),
    ("floor", f_floor),
    ("ceil", f_ceil),
    ("sqrt", f_sqrt),
    ("pow", f_pow),
    ("exp", f_exp),
    ("log", f_log),
    ("sin", f_sin),
    ("cos", f_cos),
    ("atan2", f_atan2),
];

fn f_abs(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "n")?;
    let o = fr.arg(ip, 0);
    if o.tcode() == TC_INT {
        new_int(ip, intof(o).value.wrapping_abs())
    } else {
        let v = fr.float(ip, 0)?;
        new_float(ip, v.abs())
    }
}

fn extreme(ip: &mut Interp, fr: &Frame, want_max: bool) -> Res<Obj> {
    if fr.nargs == 0 {
        return marl_core::argcount(1, 0);
    }
    let mut best = 0usize;
    let mut best_v = fr.num(ip, 0)?;
    for i in 1..fr.nargs {
        let v = fr.num(ip, i)?;
        if (want_max && v > best_v) || (!want_max && v < best_v) {
            best = i;
            best_v = v;
        }
    }
    let o = fr.arg(ip, best);
    o.incref();
    Ok(o)
}

/// `min(n...)` returns the smallest argument, preserving its type.
fn f_min(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    extreme(ip, fr, false)
}

/// `max(n...)`.
fn f_max(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    extreme(ip, fr, true)
}

fn f_floor(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "n")?;
    new_int(ip, fr.num(ip, 0)?.floor() as i64)
}

fn f_ceil(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "n")?;
    new_int(ip, fr.num(ip, 0)?.ceil() as i64)
}

fn f_sqrt(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "n")?;
    let v = fr.num(ip, 0)?;
    if v < 0.0 {
        return set_error("sqrt of a negative number");
    }
    new_float(ip, v.sqrt())
}

fn f_pow(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "nn")?;
    let (a, b) = (fr.num(ip, 0)?, fr.num(ip, 1)?);
    new_float(ip, a.powf(b))
}

fn f_exp(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "n")?;
    new_float(ip, fr.num(ip, 0)?.exp())
}

fn f_log(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "n")?;
    let v = fr.num(ip, 0)?;
    if v <= 0.0 {
        return set_error("log of a non-positive number");
    }
    new_float(ip, v.ln())
}

fn f_sin(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "n")?;
    new_float(ip, fr.num(ip, 0)?.sin())
}

fn f_cos(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "n")?;
    new_float(ip, fr.num(ip, 0)?.cos())
}

fn f_atan2(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "nn")?;
    let (y, x) = (fr.num(ip, 0)?, fr.num(ip, 1)?);
    new_float(ip, y.atan2(x))
}

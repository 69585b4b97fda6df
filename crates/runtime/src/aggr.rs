//! Aggregate intrinsics: constructors, copying, sizing, key
//! enumeration and the deque operations.

use marl_core::array::{arrayof, arrayof_mut, new_array, push, rpush};
use marl_core::cfunc::{CfuncImpl, Frame};
use marl_core::err::{set_error, Res};
use marl_core::int::new_int;
use marl_core::interp::Interp;
use marl_core::map::{mapof, new_map, set_super};
use marl_core::object::{Obj, TC_MAP, TC_NULL};
use marl_core::set::new_set;

pub const CFUNCS: &[(&str, CfuncImpl)] = &[
    ("array", f_array),
    ("map", f_map),
    ("set", f_set),
    ("copy", f_copy),
    ("len", f_len),
    ("nels", f_len),
    ("keys", f_keys),
    ("push", f_push),
    ("pop", f_pop),
    ("rpush", f_rpush),
    ("rpop", f_rpop),
    ("super", f_super),
    ("unassign", f_unassign),
    ("sort", f_sort),
];

/// `array(e...)`: a new array of the arguments.
fn f_array(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    let a = new_array(ip, fr.nargs)?;
    for i in 0..fr.nargs {
        let v = fr.arg(ip, i);
        push(ip, a, v)?;
    }
    Ok(a)
}

/// `map(k1, v1, k2, v2, ...)`: a new map of the pairs.
fn f_map(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    if fr.nargs % 2 != 0 {
        return set_error("map() wants an even number of arguments");
    }
    let m = new_map(ip)?;
    for i in (0..fr.nargs).step_by(2) {
        let (k, v) = (fr.arg(ip, i), fr.arg(ip, i + 1));
        marl_core::map::assign_base(ip, m, k, v)?;
    }
    Ok(m)
}

/// `set(e...)`: a new set of the arguments.
fn f_set(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    let s = new_set(ip)?;
    for i in 0..fr.nargs {
        let v = fr.arg(ip, i);
        marl_core::set::add(ip, s, v)?;
    }
    Ok(s)
}

/// `copy(o)`: a new non-atomic object with the same value.
fn f_copy(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(1)?;
    let o = fr.arg(ip, 0);
    let t = ip.type_of(o);
    t.copy(ip, o)
}

/// `len(o)` / `nels(o)`: element count.
fn f_len(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(1)?;
    let o = fr.arg(ip, 0);
    let t = ip.type_of(o);
    let n = t.len(ip, o)?;
    new_int(ip, n as i64)
}

/// `keys(o)`: a fresh array of the aggregate's keys.
fn f_keys(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(1)?;
    let o = fr.arg(ip, 0);
    let t = ip.type_of(o);
    t.keys(ip, o)
}

/// `push(a, v)`: append; returns the value.
fn f_push(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "ao")?;
    let (a, v) = (fr.arg(ip, 0), fr.arg(ip, 1));
    if a.is_atom() {
        return set_error("attempt to push onto an atomic array");
    }
    push(ip, a, v)?;
    v.incref();
    Ok(v)
}

/// `pop(a)`: remove and return the last element, NULL when empty.
fn f_pop(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "a")?;
    let a = fr.arg(ip, 0);
    if a.is_atom() {
        return set_error("attempt to pop an atomic array");
    }
    if arrayof(a).is_empty() {
        ip.o_null.incref();
        return Ok(ip.o_null);
    }
    let v = arrayof_mut(a).pop();
    v.incref();
    Ok(v)
}

/// `rpush(a, v)`: prepend; returns the value.
fn f_rpush(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "ao")?;
    let (a, v) = (fr.arg(ip, 0), fr.arg(ip, 1));
    if a.is_atom() {
        return set_error("attempt to push onto an atomic array");
    }
    rpush(ip, a, v)?;
    v.incref();
    Ok(v)
}

/// `rpop(a)`: remove and return the first element, NULL when empty.
fn f_rpop(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "a")?;
    let a = fr.arg(ip, 0);
    if a.is_atom() {
        return set_error("attempt to pop an atomic array");
    }
    if arrayof(a).is_empty() {
        ip.o_null.incref();
        return Ok(ip.o_null);
    }
    let v = arrayof_mut(a).rpop();
    v.incref();
    Ok(v)
}

/// `super(m)`: the map's super, or NULL. `super(m, s)`: set it (NULL
/// clears); returns the previous super.
fn f_super(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need_between(1, 2)?;
    let m = fr.map(ip, 0)?;
    let old = mapof(m).super_map().unwrap_or(ip.o_null);
    if fr.nargs == 2 {
        let s = fr.arg(ip, 1);
        match s.tcode() {
            TC_MAP => set_super(ip, m, Some(s))?,
            TC_NULL => set_super(ip, m, None)?,
            _ => return marl_core::argerror(1),
        }
    }
    old.incref();
    Ok(old)
}

/// `sort(a [, cmp])`: sort an array in place and return it. Without a
/// comparator, elements must be mutually comparable numbers or
/// strings; with one, `cmp(x, y)` returns a negative, zero or
/// positive int.
fn f_sort(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need_between(1, 2)?;
    let a = fr.array(ip, 0)?;
    if a.is_atom() {
        return set_error("attempt to sort an atomic array");
    }
    let cmp = if fr.nargs == 2 {
        Some(fr.callable(ip, 1)?)
    } else {
        None
    };

    // An insertion sort over the array object itself: stable and
    // simple. The comparator runs script code, so the array's size is
    // re-checked around every callback.
    let n = arrayof(a).len();
    for i in 1..n {
        let mut j = i;
        while j > 0 {
            if arrayof(a).len() != n {
                return set_error("array changed size during sort");
            }
            let (x, y) = (arrayof(a).get(j - 1), arrayof(a).get(j));
            if order(ip, cmp, x, y)? <= 0 {
                break;
            }
            let aa = arrayof_mut(a);
            aa.put(j - 1, y);
            aa.put(j, x);
            j -= 1;
        }
    }
    a.incref();
    Ok(a)
}

fn order(ip: &mut Interp, cmp: Option<Obj>, x: Obj, y: Obj) -> Res<i64> {
    use marl_core::float::floatof;
    use marl_core::int::intof;
    use marl_core::object::{TC_FLOAT, TC_INT, TC_STRING};
    use marl_core::string::strof;

    if let Some(f) = cmp {
        let r = marl_core::call::call_obj(ip, f, &[x, y])?;
        if r.tcode() != TC_INT {
            r.decref();
            return set_error("sort comparator must return an int");
        }
        let v = intof(r).value;
        r.decref();
        return Ok(v);
    }
    let num = |o: Obj| -> Option<f64> {
        match o.tcode() {
            TC_INT => Some(intof(o).value as f64),
            TC_FLOAT => Some(floatof(o).value),
            _ => None,
        }
    };
    match (num(x), num(y)) {
        (Some(a), Some(b)) => Ok(if a < b {
            -1
        } else {
            (a > b) as i64
        }),
        _ if x.tcode() == TC_STRING && y.tcode() == TC_STRING => {
            Ok(match strof(x).bytes().cmp(strof(y).bytes()) {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            })
        }
        _ => set_error("sort over incomparable elements"),
    }
}

/// `unassign(m, k)`: remove a key from a map or set.
fn f_unassign(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(2)?;
    let (o, k) = (fr.arg(ip, 0), fr.arg(ip, 1));
    match o.tcode() {
        TC_MAP => marl_core::map::unassign(ip, o, k)?,
        marl_core::object::TC_SET => marl_core::set::unassign(ip, o, k)?,
        _ => return marl_core::argerror(0),
    }
    ip.o_null.incref();
    Ok(ip.o_null)
}

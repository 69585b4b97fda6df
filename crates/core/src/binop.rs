//! Binary operators: one entry point keyed on the two operand type
//! codes and the operator, organised as nested matches.
//!
//! Numeric types cover every int/float pairing. Strings concatenate
//! with `+` and compare lexicographically. Arrays catenate with `+`
//! and broadcast `- * /` element-wise over numeric elements, as do
//! scalar/array mixes (including `+`). Sets get union, intersection,
//! difference and the subset comparisons. Equality falls back to
//! value equality for any like-typed pair.

use crate::array::{arrayof, new_array, push};
use crate::err::{set_error, Res};
use crate::float::{floatof, new_float};
use crate::int::{intof, new_int};
use crate::interp::Interp;
use crate::object::{Obj, TC_ARRAY, TC_FLOAT, TC_INT, TC_PTR, TC_SET, TC_STRING};
use crate::set::{contains, new_set, set_ispropersubset, set_issubset, setof};
use crate::string::{new_str, strof};

pub const ADD: i16 = 0;
pub const SUB: i16 = 1;
pub const MUL: i16 = 2;
pub const DIV: i16 = 3;
pub const MOD: i16 = 4;
pub const SHL: i16 = 5;
pub const SHR: i16 = 6;
pub const LT: i16 = 7;
pub const GT: i16 = 8;
pub const LE: i16 = 9;
pub const GE: i16 = 10;
pub const EQ: i16 = 11;
pub const NE: i16 = 12;
pub const BAND: i16 = 13;
pub const BXOR: i16 = 14;
pub const BOR: i16 = 15;

/// Operator spelling, for diagnostics.
pub fn binop_name(code: i16) -> &'static str {
    match code {
        ADD => "+",
        SUB => "-",
        MUL => "*",
        DIV => "/",
        MOD => "%",
        SHL => "<<",
        SHR => ">>",
        LT => "<",
        GT => ">",
        LE => "<=",
        GE => ">=",
        EQ => "==",
        NE => "!=",
        BAND => "&",
        BXOR => "^",
        BOR => "|",
        _ => "?",
    }
}

fn mismatch(ip: &Interp, a: Obj, b: Obj, code: i16) -> Res<Obj> {
    set_error(format!(
        "attempt to perform \"{} {} {}\"",
        ip.type_name(a),
        binop_name(code),
        ip.type_name(b)
    ))
}

/// The binop path: takes the two top operand-stack entries, produces
/// the result in their place.
pub fn op_binop(ip: &mut Interp, code: i16) -> Res {
    let n = ip.os().len();
    debug_assert!(n >= 2);
    let (a, b) = (ip.os().get(n - 2), ip.os().get(n - 1));
    // Operands stay rooted on the stack until the result exists.
    let r = compute(ip, a, b, code)?;
    ip.os().truncate(n - 2);
    ip.os_push(r)?;
    r.decref();
    Ok(())
}

fn compute(ip: &mut Interp, a: Obj, b: Obj, code: i16) -> Res<Obj> {
    match (a.tcode(), b.tcode()) {
        (TC_INT, TC_INT) => int_int(ip, intof(a).value, intof(b).value, code),
        (TC_INT, TC_FLOAT) => float_float(ip, intof(a).value as f64, floatof(b).value, code),
        (TC_FLOAT, TC_INT) => float_float(ip, floatof(a).value, intof(b).value as f64, code),
        (TC_FLOAT, TC_FLOAT) => float_float(ip, floatof(a).value, floatof(b).value, code),

        (TC_STRING, TC_STRING) => str_str(ip, a, b, code),

        (TC_ARRAY, TC_ARRAY) => match code {
            ADD => catenate(ip, a, b),
            SUB | MUL | DIV => vec_vec(ip, a, b, code),
            EQ | NE => equality(ip, a, b, code),
            _ => mismatch(ip, a, b, code),
        },
        (TC_ARRAY, TC_INT) | (TC_ARRAY, TC_FLOAT) => match code {
            ADD | SUB | MUL | DIV => vec_scalar(ip, a, b, code, false),
            _ => mismatch(ip, a, b, code),
        },
        (TC_INT, TC_ARRAY) | (TC_FLOAT, TC_ARRAY) => match code {
            ADD | SUB | MUL | DIV => vec_scalar(ip, b, a, code, true),
            _ => mismatch(ip, a, b, code),
        },

        (TC_SET, TC_SET) => set_set(ip, a, b, code),

        (TC_PTR, TC_INT) => match code {
            ADD => crate::ptr::ptr_offset(ip, a, intof(b).value),
            SUB => crate::ptr::ptr_offset(ip, a, -intof(b).value),
            EQ | NE => equality(ip, a, b, code),
            _ => mismatch(ip, a, b, code),
        },

        _ => match code {
            EQ | NE => equality(ip, a, b, code),
            _ => mismatch(ip, a, b, code),
        },
    }
}

fn equality(ip: &mut Interp, a: Obj, b: Obj, code: i16) -> Res<Obj> {
    let eq = ip.obj_eq(a, b);
    new_int(ip, (eq == (code == EQ)) as i64)
}

fn int_int(ip: &mut Interp, a: i64, b: i64, code: i16) -> Res<Obj> {
    let v = match code {
        ADD => a.wrapping_add(b),
        SUB => a.wrapping_sub(b),
        MUL => a.wrapping_mul(b),
        DIV => {
            if b == 0 {
                return set_error("division by 0");
            }
            a.wrapping_div(b)
        }
        MOD => {
            if b == 0 {
                return set_error("modulus by 0");
            }
            a.wrapping_rem(b)
        }
        SHL => a.wrapping_shl(b as u32),
        SHR => a.wrapping_shr(b as u32),
        LT => (a < b) as i64,
        GT => (a > b) as i64,
        LE => (a <= b) as i64,
        GE => (a >= b) as i64,
        EQ => (a == b) as i64,
        NE => (a != b) as i64,
        BAND => a & b,
        BXOR => a ^ b,
        BOR => a | b,
        _ => return set_error("bad binary operator"),
    };
    new_int(ip, v)
}

fn float_float(ip: &mut Interp, a: f64, b: f64, code: i16) -> Res<Obj> {
    match code {
        ADD => new_float(ip, a + b),
        SUB => new_float(ip, a - b),
        MUL => new_float(ip, a * b),
        DIV => {
            if b == 0.0 {
                return set_error("division by 0.0");
            }
            new_float(ip, a / b)
        }
        MOD => {
            if b == 0.0 {
                return set_error("modulus by 0.0");
            }
            new_float(ip, a % b)
        }
        LT => new_int(ip, (a < b) as i64),
        GT => new_int(ip, (a > b) as i64),
        LE => new_int(ip, (a <= b) as i64),
        GE => new_int(ip, (a >= b) as i64),
        EQ => new_int(ip, (a == b) as i64),
        NE => new_int(ip, (a != b) as i64),
        _ => set_error(format!("attempt to perform \"float {} float\"", binop_name(code))),
    }
}

fn str_str(ip: &mut Interp, a: Obj, b: Obj, code: i16) -> Res<Obj> {
    match code {
        ADD => {
            let mut bytes = Vec::with_capacity(strof(a).nchars + strof(b).nchars);
            bytes.extend_from_slice(strof(a).bytes());
            bytes.extend_from_slice(strof(b).bytes());
            new_str(ip, &bytes)
        }
        LT | GT | LE | GE | EQ | NE => {
            let ord = strof(a).bytes().cmp(strof(b).bytes());
            let v = match code {
                LT => ord.is_lt(),
                GT => ord.is_gt(),
                LE => ord.is_le(),
                GE => ord.is_ge(),
                EQ => ord.is_eq(),
                _ => ord.is_ne(),
            };
            new_int(ip, v as i64)
        }
        _ => mismatch(ip, a, b, code),
    }
}

fn catenate(ip: &mut Interp, a: Obj, b: Obj) -> Res<Obj> {
    let (la, lb) = (arrayof(a).len(), arrayof(b).len());
    let r = new_array(ip, la + lb)?;
    for i in 0..la {
        push(ip, r, arrayof(a).get(i))?;
    }
    for i in 0..lb {
        push(ip, r, arrayof(b).get(i))?;
    }
    Ok(r)
}

/// One numeric element of a vector operand.
fn num_elem(ip: &Interp, a: Obj, i: usize) -> Res<f64> {
    let o = arrayof(a).get(i);
    match o.tcode() {
        TC_INT => Ok(intof(o).value as f64),
        TC_FLOAT => Ok(floatof(o).value),
        _ => set_error(format!(
            "attempt vector arithmetic over a {} element",
            ip.type_name(o)
        )),
    }
}

fn both_int(a: Obj, b: Option<Obj>, i: usize) -> bool {
    let ai = arrayof(a).get(i).tcode() == TC_INT;
    match b {
        Some(b) => ai && arrayof(b).get(i).tcode() == TC_INT,
        None => ai,
    }
}

fn apply_num(x: f64, y: f64, code: i16) -> Res<f64> {
    Ok(match code {
        ADD => x + y,
        SUB => x - y,
        MUL => x * y,
        _ => {
            if y == 0.0 {
                return set_error("division by 0 in vector arithmetic");
            }
            x / y
        }
    })
}

/// Element-wise array (+|-|*|/) array.
fn vec_vec(ip: &mut Interp, a: Obj, b: Obj, code: i16) -> Res<Obj> {
    let len = arrayof(a).len();
    if arrayof(b).len() != len {
        return set_error("vector lengths differ");
    }
    let r = new_array(ip, len)?;
    for i in 0..len {
        let x = num_elem(ip, a, i)?;
        let y = num_elem(ip, b, i)?;
        let v = apply_num(x, y, code)?;
        let e = if both_int(a, Some(b), i) {
            new_int(ip, v as i64)?
        } else {
            new_float(ip, v)?
        };
        push(ip, r, e)?;
        e.decref();
    }
    Ok(r)
}

/// Element-wise array op scalar (or scalar op array when
/// `scalar_on_left`).
fn vec_scalar(ip: &mut Interp, arr: Obj, scalar: Obj, code: i16, scalar_on_left: bool) -> Res<Obj> {
    let s = match scalar.tcode() {
        TC_INT => intof(scalar).value as f64,
        _ => floatof(scalar).value,
    };
    let s_is_int = scalar.tcode() == TC_INT;
    let len = arrayof(arr).len();
    let r = new_array(ip, len)?;
    for i in 0..len {
        let x = num_elem(ip, arr, i)?;
        let v = if scalar_on_left {
            apply_num(s, x, code)?
        } else {
            apply_num(x, s, code)?
        };
        let e = if s_is_int && both_int(arr, None, i) {
            new_int(ip, v as i64)?
        } else {
            new_float(ip, v)?
        };
        push(ip, r, e)?;
        e.decref();
    }
    Ok(r)
}

fn set_set(ip: &mut Interp, a: Obj, b: Obj, code: i16) -> Res<Obj> {
    match code {
        BOR => {
            // Union.
            let r = new_set(ip)?;
            for side in [a, b] {
                // Collected up front: inserting can grow r, and the
                // source sets must not be iterated across allocations.
                let members: Vec<Obj> = setof(side).members().collect();
                for m in members {
                    crate::set::add(ip, r, m)?;
                }
            }
            Ok(r)
        }
        BAND => {
            // Intersection.
            let r = new_set(ip)?;
            let members: Vec<Obj> = setof(a).members().collect();
            for m in members {
                if contains(ip, b, m) {
                    crate::set::add(ip, r, m)?;
                }
            }
            Ok(r)
        }
        SUB => {
            // Difference.
            let r = new_set(ip)?;
            let members: Vec<Obj> = setof(a).members().collect();
            for m in members {
                if !contains(ip, b, m) {
                    crate::set::add(ip, r, m)?;
                }
            }
            Ok(r)
        }
        LE => new_int(ip, set_issubset(ip, a, b) as i64),
        LT => new_int(ip, set_ispropersubset(ip, a, b) as i64),
        GE => new_int(ip, set_issubset(ip, b, a) as i64),
        GT => new_int(ip, set_ispropersubset(ip, b, a) as i64),
        EQ | NE => equality(ip, a, b, code),
        _ => mismatch(ip, a, b, code),
    }
}

//! IEEE-754 doubles. Atomic, hashed and compared on the bit pattern,
//! so `-0.0` and `0.0` are distinct atoms and NaN equals itself as a
//! value.

use crate::archiver::Archiver;
use crate::err::Res;
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_ATOM, O_MARK, TC_FLOAT};

#[repr(C)]
pub struct FloatObj {
    pub header: Object,
    pub value: f64,
}

const FLOAT_PRIME: u64 = 0x00D1_B7C5_93A1;

#[inline(always)]
pub fn floatof<'a>(o: Obj) -> &'a FloatObj {
    debug_assert_eq!(o.tcode(), TC_FLOAT);
    unsafe { &*(o.ptr() as *const FloatObj) }
}

/// Hash a double on its (endian-normalised) bit pattern.
pub fn hash_float(v: f64) -> u64 {
    let bits = v.to_bits();
    let mut h = FLOAT_PRIME.wrapping_add(bits ^ (bits >> 32).wrapping_mul(31));
    h ^= (h >> 12) ^ (h >> 24);
    h
}

/// The float object with value `v` (by bit pattern), reference hint
/// bumped.
pub fn new_float(ip: &mut Interp, v: f64) -> Res<Obj> {
    let bits = v.to_bits();
    let (found, slot) = ip.atom_probe2(hash_float(v), |_, e| {
        e.tcode() == TC_FLOAT && floatof(e).value.to_bits() == bits
    });
    if let Some(o) = found {
        o.incref();
        return Ok(o);
    }
    let pause = ip.pause_gc();
    let p: *mut FloatObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_FLOAT, O_ATOM, 1, std::mem::size_of::<FloatObj>());
    unsafe { (*p).value = v };
    ip.rego(o);
    drop(pause);
    ip.store_atom_and_count(slot, o);
    Ok(o)
}

pub struct FloatType;

impl ObjType for FloatType {
    fn name(&self) -> &'static str {
        "float"
    }

    fn mark(&self, _ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        std::mem::size_of::<FloatObj>()
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        ip.tfree::<FloatObj>(o.cast());
    }

    fn hash(&self, _ip: &Interp, o: Obj) -> u64 {
        hash_float(floatof(o).value)
    }

    fn eq(&self, _ip: &Interp, a: Obj, b: Obj) -> bool {
        floatof(a).value.to_bits() == floatof(b).value.to_bits()
    }

    fn save(&self, _ip: &mut Interp, ar: &mut dyn Archiver, o: Obj) -> Res {
        ar.write_f64(floatof(o).value)
    }

    fn restore(&self, ip: &mut Interp, ar: &mut dyn Archiver) -> Res<Obj> {
        let v = ar.read_f64()?;
        new_float(ip, v)
    }
}

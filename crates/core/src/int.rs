//! 64-bit signed integers. Intrinsically atomic: equal ints are the
//! same object, and the values 0..=255 are pre-allocated singletons.

use crate::archiver::Archiver;
use crate::err::Res;
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_ATOM, O_MARK, TC_INT};

#[repr(C)]
pub struct IntObj {
    pub header: Object,
    pub value: i64,
}

pub const INT_PRIME: u64 = 0x0004_9A2B_9A2B_9A2B;

/// Highest value served from the small-int cache.
pub const SMALL_INT_MAX: i64 = 255;

#[inline(always)]
pub fn intof<'a>(o: Obj) -> &'a IntObj {
    debug_assert_eq!(o.tcode(), TC_INT);
    unsafe { &*(o.ptr() as *const IntObj) }
}

#[inline(always)]
fn int_hash(v: i64) -> u64 {
    (v as u64).wrapping_mul(INT_PRIME)
}

/// Allocate-and-intern an int atom; the probe slot has already been
/// established by the caller.
fn make_int_atom(ip: &mut Interp, v: i64, slot: usize) -> Res<Obj> {
    let pause = ip.pause_gc();
    let p: *mut IntObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_INT, O_ATOM, 1, std::mem::size_of::<IntObj>());
    unsafe { (*p).value = v };
    ip.rego(o);
    drop(pause);
    ip.store_atom_and_count(slot, o);
    Ok(o)
}

/// The int object with value `v`, with its reference hint bumped.
/// Small values come straight from the singleton cache.
pub fn new_int(ip: &mut Interp, v: i64) -> Res<Obj> {
    if (0..=SMALL_INT_MAX).contains(&v) && !ip.small_ints.is_empty() {
        let o = ip.small_ints[v as usize];
        o.incref();
        return Ok(o);
    }
    let (found, slot) =
        ip.atom_probe2(int_hash(v), |_, e| e.tcode() == TC_INT && intof(e).value == v);
    if let Some(o) = found {
        o.incref();
        return Ok(o);
    }
    make_int_atom(ip, v, slot)
}

/// Populate the small-int cache at boot.
pub fn boot_small_ints(ip: &mut Interp) -> Res {
    for v in 0..=SMALL_INT_MAX {
        let (found, slot) =
            ip.atom_probe2(int_hash(v), |_, e| e.tcode() == TC_INT && intof(e).value == v);
        debug_assert!(found.is_none());
        let _ = found;
        let o = make_int_atom(ip, v, slot)?;
        ip.small_ints.push(o);
    }
    Ok(())
}

pub struct IntType;

impl ObjType for IntType {
    fn name(&self) -> &'static str {
        "int"
    }

    fn mark(&self, _ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        std::mem::size_of::<IntObj>()
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        ip.tfree::<IntObj>(o.cast());
    }

    fn hash(&self, _ip: &Interp, o: Obj) -> u64 {
        int_hash(intof(o).value)
    }

    fn eq(&self, _ip: &Interp, a: Obj, b: Obj) -> bool {
        intof(a).value == intof(b).value
    }

    fn save(&self, _ip: &mut Interp, ar: &mut dyn Archiver, o: Obj) -> Res {
        ar.write_i64(intof(o).value)
    }

    fn restore(&self, ip: &mut Interp, ar: &mut dyn Archiver) -> Res<Obj> {
        let v = ar.read_i64()?;
        new_int(ip, v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::with_interp;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_small_ints_are_singletons() {
        with_interp(|ip| {
            for v in [0i64, 1, 17, 255] {
                let a = new_int(ip, v).unwrap();
                let b = new_int(ip, v).unwrap();
                assert_eq!(a, b);
                assert_eq!(intof(a).value, v);
                a.decref();
                b.decref();
            }
        });
    }

    #[test]
    #[serial]
    fn test_large_ints_intern() {
        with_interp(|ip| {
            let a = new_int(ip, -1234567890123).unwrap();
            let b = new_int(ip, -1234567890123).unwrap();
            assert_eq!(a, b);
            assert!(a.is_atom());
            a.decref();
            b.decref();
        });
    }

    #[test]
    #[serial]
    fn test_negative_values_distinct() {
        with_interp(|ip| {
            let a = new_int(ip, 300).unwrap();
            let b = new_int(ip, -300).unwrap();
            assert_ne!(a, b);
            a.decref();
            b.decref();
        });
    }
}

//! Pointers: an (aggregate, key) pair denoting an assignable place.
//!
//! `*p` reads `fetch(aggregate, key)`, `*p = v` performs
//! `assign(aggregate, key, v)`. Pointers whose key is an int support
//! offset arithmetic.

use crate::err::{set_error, Res};
use crate::int::{intof, new_int};
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_MARK, TC_INT, TC_PTR};

#[repr(C)]
pub struct PtrObj {
    pub header: Object,
    pub aggr: Obj,
    pub key: Obj,
}

const PTR_PRIME: u64 = 0x0003_C92D_1B6D;

#[inline(always)]
pub fn ptrof<'a>(o: Obj) -> &'a PtrObj {
    debug_assert_eq!(o.tcode(), TC_PTR);
    unsafe { &*(o.ptr() as *const PtrObj) }
}

/// A new pointer to `aggr[key]`, reference hint bumped.
pub fn new_ptr(ip: &mut Interp, aggr: Obj, key: Obj) -> Res<Obj> {
    let p: *mut PtrObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_PTR, 0, 1, 0);
    unsafe {
        (*p).aggr = aggr;
        (*p).key = key;
    }
    ip.rego(o);
    Ok(o)
}

/// A new pointer offset by `n` elements; only int-keyed pointers
/// support arithmetic.
pub fn ptr_offset(ip: &mut Interp, p: Obj, n: i64) -> Res<Obj> {
    let pp = ptrof(p);
    if pp.key.tcode() != TC_INT {
        return set_error("attempt arithmetic on a non-indexed pointer");
    }
    let k = new_int(ip, intof(pp.key).value + n)?;
    let r = new_ptr(ip, pp.aggr, k);
    k.decref();
    r
}

pub struct PtrType;

impl ObjType for PtrType {
    fn name(&self) -> &'static str {
        "ptr"
    }

    fn mark(&self, ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        let p = ptrof(o);
        std::mem::size_of::<PtrObj>()
            + crate::gc::mark_obj(ip, p.aggr)
            + crate::gc::mark_obj(ip, p.key)
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        ip.tfree::<PtrObj>(o.cast());
    }

    fn hash(&self, ip: &Interp, o: Obj) -> u64 {
        let p = ptrof(o);
        PTR_PRIME
            .wrapping_mul(crate::atom::ptr_hash(p.aggr.addr()))
            .wrapping_add(ip.obj_hash(p.key))
    }

    fn eq(&self, ip: &Interp, a: Obj, b: Obj) -> bool {
        let (pa, pb) = (ptrof(a), ptrof(b));
        pa.aggr == pb.aggr && ip.obj_eq(pa.key, pb.key)
    }

    fn copy(&self, ip: &mut Interp, o: Obj) -> Res<Obj> {
        let p = ptrof(o);
        new_ptr(ip, p.aggr, p.key)
    }
}

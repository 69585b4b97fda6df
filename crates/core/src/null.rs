//! The NULL singleton.

use crate::err::Res;
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_ATOM, TC_NULL};

#[repr(C)]
pub struct NullObj {
    pub header: Object,
}

const NULL_PRIME: u64 = 0x4A52_55C3;

pub struct NullType;

impl ObjType for NullType {
    fn name(&self) -> &'static str {
        "NULL"
    }

    fn mark(&self, _ip: &Interp, o: Obj) -> usize {
        o.set_flag(crate::object::O_MARK);
        std::mem::size_of::<NullObj>()
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        ip.tfree::<NullObj>(o.cast());
    }

    fn hash(&self, _ip: &Interp, _o: Obj) -> u64 {
        NULL_PRIME
    }

    fn eq(&self, _ip: &Interp, _a: Obj, _b: Obj) -> bool {
        true
    }

    fn save(&self, _ip: &mut Interp, _ar: &mut dyn crate::archiver::Archiver, _o: Obj) -> crate::err::Res {
        Ok(())
    }

    fn restore(&self, ip: &mut Interp, _ar: &mut dyn crate::archiver::Archiver) -> crate::err::Res<Obj> {
        ip.o_null.incref();
        Ok(ip.o_null)
    }
}

/// Allocate the NULL singleton. Runs once, at interpreter boot; the
/// singleton is pinned for the life of the process.
pub fn boot_null(ip: &mut Interp) -> Res<Obj> {
    let p: *mut NullObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut crate::object::Object) };
    o.set_tfnz(TC_NULL, O_ATOM, 1, std::mem::size_of::<NullObj>());
    ip.rego(o);
    Ok(o)
}

/// Is this the NULL object?
#[inline(always)]
pub fn isnull(ip: &Interp, o: Obj) -> bool {
    o == ip.o_null
}

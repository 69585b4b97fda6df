//! Program counters: a code array plus an offset. One lives on the
//! execution stack for every active code array; executing it fetches
//! the next element and advances.

use crate::err::Res;
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_MARK, TC_PC};

#[repr(C)]
pub struct PcObj {
    pub header: Object,
    pub code: Obj,
    pub offset: usize,
}

#[inline(always)]
pub fn pcof<'a>(o: Obj) -> &'a PcObj {
    debug_assert_eq!(o.tcode(), TC_PC);
    unsafe { &*(o.ptr() as *const PcObj) }
}

#[inline(always)]
pub fn pcof_mut<'a>(o: Obj) -> &'a mut PcObj {
    debug_assert_eq!(o.tcode(), TC_PC);
    unsafe { &mut *(o.ptr() as *mut PcObj) }
}

pub fn new_pc(ip: &mut Interp, code: Obj, offset: usize) -> Res<Obj> {
    let p: *mut PcObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_PC, 0, 1, 0);
    unsafe {
        (*p).code = code;
        (*p).offset = offset;
    }
    ip.rego(o);
    Ok(o)
}

pub struct PcType;

impl ObjType for PcType {
    fn name(&self) -> &'static str {
        "pc"
    }

    fn mark(&self, ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        std::mem::size_of::<PcObj>() + crate::gc::mark_obj(ip, pcof(o).code)
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        ip.tfree::<PcObj>(o.cast());
    }
}

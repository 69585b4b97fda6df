//! Src markers: (filename, line) pairs the compiler plants in code
//! arrays. Executing one just records the position on the current
//! exec, so error reports and the debugger know where they are.

use crate::err::Res;
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_MARK, TC_SRC};

#[repr(C)]
pub struct SrcObj {
    pub header: Object,
    pub line: u32,
    /// Filename string, or NULL.
    pub filename: Obj,
}

#[inline(always)]
pub fn srcof<'a>(o: Obj) -> &'a SrcObj {
    debug_assert_eq!(o.tcode(), TC_SRC);
    unsafe { &*(o.ptr() as *const SrcObj) }
}

pub fn new_src(ip: &mut Interp, line: u32, filename: Obj) -> Res<Obj> {
    let p: *mut SrcObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_SRC, 0, 1, 0);
    unsafe {
        (*p).line = line;
        (*p).filename = filename;
    }
    ip.rego(o);
    Ok(o)
}

pub struct SrcType;

impl ObjType for SrcType {
    fn name(&self) -> &'static str {
        "src"
    }

    fn mark(&self, ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        std::mem::size_of::<SrcObj>() + crate::gc::mark_obj(ip, srcof(o).filename)
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        ip.tfree::<SrcObj>(o.cast());
    }
}

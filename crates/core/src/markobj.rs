//! The stack-boundary mark singleton.
//!
//! A single process-wide sentinel the VM pushes onto the operand stack
//! to delimit variable-length argument frames. It evaluates to itself,
//! so a mark embedded in a code array lands on the operand stack when
//! executed.

use crate::err::Res;
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_ATOM, O_MARK, TC_MARK};

#[repr(C)]
pub struct MarkObj {
    pub header: Object,
}

pub struct MarkType;

impl ObjType for MarkType {
    fn name(&self) -> &'static str {
        "mark"
    }

    fn mark(&self, _ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        std::mem::size_of::<MarkObj>()
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        ip.tfree::<MarkObj>(o.cast());
    }
}

/// Allocate the mark singleton at boot; pinned forever.
pub fn boot_mark(ip: &mut Interp) -> Res<Obj> {
    let p: *mut MarkObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_MARK, O_ATOM, 1, std::mem::size_of::<MarkObj>());
    ip.rego(o);
    Ok(o)
}

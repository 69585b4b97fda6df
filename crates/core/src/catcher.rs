//! Catchers: execution-stack frames that record how to restore the
//! world. One object type serves three jobs, distinguished by `kind`:
//!
//! - `CATCH_ERROR`: a `try`/`onerror` frame. Raising unwinds to the
//!   nearest one, truncates the operand and scope stacks to the
//!   recorded depths, and enters the handler.
//! - `CATCH_LOOP`: a loop frame. Surfacing naturally re-enters the
//!   loop body; `break`/`continue` unwind to the nearest one.
//! - `CATCH_CALL`: a function-call frame. `return` (or falling off
//!   the end of the body) unwinds it, restoring the caller's scope.

use crate::err::Res;
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_MARK, TC_CATCHER};

pub const CATCH_ERROR: u8 = 0;
pub const CATCH_LOOP: u8 = 1;
pub const CATCH_CALL: u8 = 2;

#[repr(C)]
pub struct CatcherObj {
    pub header: Object,
    /// What to run on entry: the handler code array (error), the loop
    /// code array (loop), or NULL (call).
    pub target: Obj,
    /// Operand-stack depth to restore.
    pub odepth: u32,
    /// Scope-stack depth to restore.
    pub vdepth: u32,
    pub kind: u8,
}

#[inline(always)]
pub fn catcherof<'a>(o: Obj) -> &'a CatcherObj {
    debug_assert_eq!(o.tcode(), TC_CATCHER);
    unsafe { &*(o.ptr() as *const CatcherObj) }
}

pub fn new_catcher(
    ip: &mut Interp,
    target: Obj,
    odepth: usize,
    vdepth: usize,
    kind: u8,
) -> Res<Obj> {
    let p: *mut CatcherObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_CATCHER, 0, 1, 0);
    unsafe {
        (*p).target = target;
        (*p).odepth = odepth as u32;
        (*p).vdepth = vdepth as u32;
        (*p).kind = kind;
    }
    ip.rego(o);
    Ok(o)
}

pub struct CatcherType;

impl ObjType for CatcherType {
    fn name(&self) -> &'static str {
        "catcher"
    }

    fn mark(&self, ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        std::mem::size_of::<CatcherObj>() + crate::gc::mark_obj(ip, catcherof(o).target)
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        ip.tfree::<CatcherObj>(o.cast());
    }
}

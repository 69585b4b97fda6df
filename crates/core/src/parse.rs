//! Parse objects: the lexer state bound to a file while it is being
//! compiled. The compiler crate drives the actual tokenising; this
//! type exists so the file and position are garbage-collected state
//! like everything else and error messages can say where they are.

use crate::err::Res;
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_MARK, TC_PARSE};

#[repr(C)]
pub struct ParseObj {
    pub header: Object,
    /// The file being parsed.
    pub file: Obj,
    /// Current line number, 1-based.
    pub lineno: u32,
    /// Pushed-back characters, most recent last; -1 marks an empty
    /// slot. Two slots cover the lexer's worst case.
    pub ungot: [i32; 2],
}

#[inline(always)]
pub fn parseof<'a>(o: Obj) -> &'a ParseObj {
    debug_assert_eq!(o.tcode(), TC_PARSE);
    unsafe { &*(o.ptr() as *const ParseObj) }
}

#[inline(always)]
pub fn parseof_mut<'a>(o: Obj) -> &'a mut ParseObj {
    debug_assert_eq!(o.tcode(), TC_PARSE);
    unsafe { &mut *(o.ptr() as *mut ParseObj) }
}

pub fn new_parse(ip: &mut Interp, file: Obj) -> Res<Obj> {
    let p: *mut ParseObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_PARSE, 0, 1, 0);
    unsafe {
        (*p).file = file;
        (*p).lineno = 1;
        (*p).ungot = [-1, -1];
    }
    ip.rego(o);
    Ok(o)
}

pub struct ParseType;

impl ObjType for ParseType {
    fn name(&self) -> &'static str {
        "parse"
    }

    fn mark(&self, ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        std::mem::size_of::<ParseObj>() + crate::gc::mark_obj(ip, parseof(o).file)
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        ip.tfree::<ParseObj>(o.cast());
    }
}

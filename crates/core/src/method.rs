//! Bound methods: a (subject, callable) pair. Calling one forwards to
//! the callable with the subject bound — script functions see it as
//! the auto `this`, natives through their frame.

use crate::err::Res;
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_MARK, TC_METHOD};

#[repr(C)]
pub struct MethodObj {
    pub header: Object,
    pub subject: Obj,
    pub callable: Obj,
}

#[inline(always)]
pub fn methodof<'a>(o: Obj) -> &'a MethodObj {
    debug_assert_eq!(o.tcode(), TC_METHOD);
    unsafe { &*(o.ptr() as *const MethodObj) }
}

pub fn new_method(ip: &mut Interp, subject: Obj, callable: Obj) -> Res<Obj> {
    let p: *mut MethodObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_METHOD, 0, 1, 0);
    unsafe {
        (*p).subject = subject;
        (*p).callable = callable;
    }
    ip.rego(o);
    Ok(o)
}

pub struct MethodType;

impl ObjType for MethodType {
    fn name(&self) -> &'static str {
        "method"
    }

    fn mark(&self, ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        let m = methodof(o);
        std::mem::size_of::<MethodObj>()
            + crate::gc::mark_obj(ip, m.subject)
            + crate::gc::mark_obj(ip, m.callable)
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        ip.tfree::<MethodObj>(o.cast());
    }

    fn eq(&self, _ip: &Interp, a: Obj, b: Obj) -> bool {
        let (ma, mb) = (methodof(a), methodof(b));
        ma.subject == mb.subject && ma.callable == mb.callable
    }

    fn call(&self, ip: &mut Interp, o: Obj, _subject: Option<Obj>) -> Res {
        let m = methodof(o);
        let t = ip.type_of(m.callable);
        t.call(ip, m.callable, Some(m.subject))
    }
}

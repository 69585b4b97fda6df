//! Script functions: a compiled code array, the argument names, a
//! template for the locals map, and a name for diagnostics.
//!
//! The autos template's super link is the scope that was active when
//! the function literal was compiled; a call copies the template, so
//! every activation gets fresh locals chained to that captured scope.

use crate::array::arrayof;
use crate::catcher::{new_catcher, CATCH_CALL};
use crate::err::{set_error, Res};
use crate::interp::Interp;
use crate::map::assign_base;
use crate::object::{Obj, ObjType, Object, O_MARK, TC_FUNC};
use crate::pc::new_pc;

#[repr(C)]
pub struct FuncObj {
    pub header: Object,
    /// The compiled body.
    pub code: Obj,
    /// Array of parameter-name strings, in order.
    pub args: Obj,
    /// Locals-map template; its super is the captured scope.
    pub autos: Obj,
    /// Function name for diagnostics ("" for anonymous literals).
    pub name: Obj,
}

#[inline(always)]
pub fn funcof<'a>(o: Obj) -> &'a FuncObj {
    debug_assert_eq!(o.tcode(), TC_FUNC);
    unsafe { &*(o.ptr() as *const FuncObj) }
}

pub fn new_func(ip: &mut Interp, code: Obj, args: Obj, autos: Obj, name: Obj) -> Res<Obj> {
    let p: *mut FuncObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_FUNC, 0, 1, 0);
    unsafe {
        (*p).code = code;
        (*p).args = args;
        (*p).autos = autos;
        (*p).name = name;
    }
    ip.rego(o);
    Ok(o)
}

/// Locate the argument-frame mark on the operand stack. Returns its
/// index; everything above it is the arguments.
pub fn find_arg_mark(ip: &Interp) -> Res<usize> {
    let os = ip.os();
    let mark = ip.o_mark;
    let mut i = os.len();
    while i > 0 {
        if os.get(i - 1) == mark {
            return Ok(i - 1);
        }
        i -= 1;
    }
    set_error("function call with no argument frame")
}

pub struct FuncType;

impl ObjType for FuncType {
    fn name(&self) -> &'static str {
        "func"
    }

    fn mark(&self, ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        let f = funcof(o);
        std::mem::size_of::<FuncObj>()
            + crate::gc::mark_obj(ip, f.code)
            + crate::gc::mark_obj(ip, f.args)
            + crate::gc::mark_obj(ip, f.autos)
            + crate::gc::mark_obj(ip, f.name)
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        ip.tfree::<FuncObj>(o.cast());
    }

    fn copy(&self, ip: &mut Interp, o: Obj) -> Res<Obj> {
        // Shares the code; fresh locals template.
        let f = funcof(o);
        let autos_t = ip.type_of(f.autos);
        let autos = autos_t.copy(ip, f.autos)?;
        let c = new_func(ip, f.code, f.args, autos, f.name);
        autos.decref();
        c
    }

    /// Enter the function: bind arguments into a fresh locals map,
    /// install a call frame and a pc, and push the new scope. The
    /// engine's main loop does the rest.
    fn call(&self, ip: &mut Interp, o: Obj, subject: Option<Obj>) -> Res {
        let mark_idx = find_arg_mark(ip)?;
        let nargs = ip.os().len() - mark_idx - 1;

        let f = funcof(o);
        let autos_t = ip.type_of(f.autos);
        let locals = autos_t.copy(ip, f.autos)?;

        // Bind declared parameters while the actuals are still rooted
        // by the operand stack; missing ones become NULL, extras are
        // dropped with the frame.
        let nparams = arrayof(f.args).len();
        for i in 0..nparams {
            let name = arrayof(f.args).get(i);
            let v = if i < nargs {
                ip.os().get(mark_idx + 1 + i)
            } else {
                ip.o_null
            };
            assign_base(ip, locals, name, v)?;
        }
        if let Some(subj) = subject {
            let this = ip.sstr.this;
            assign_base(ip, locals, this, subj)?;
        }

        ip.os().truncate(mark_idx);
        let odepth = ip.os().len();
        let vdepth = ip.vs().len();

        let null = ip.o_null;
        let frame = new_catcher(ip, null, odepth, vdepth, CATCH_CALL)?;
        ip.xs_push(frame)?;
        frame.decref();

        ip.vs_push(locals)?;
        locals.decref();

        let pc = new_pc(ip, funcof(o).code, 0)?;
        ip.xs_push(pc)?;
        pc.decref();
        Ok(())
    }
}

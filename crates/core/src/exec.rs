//! Execution records: one per interpreter thread.
//!
//! An exec owns the thread's three stacks — execution (`xs`), operand
//! (`os`) and scope (`vs`) — plus the most recent source marker. The
//! stacks are ordinary arrays on the object registry, so growing one
//! goes through the allocator and all three are marked through the
//! exec, which the collector treats as a root for as long as the
//! thread lives.
//!
//! The current thread's exec is reached through a thread local (see
//! `interp::cur_ex`); the global `error` the scripts see resolves
//! against the same thread.

use crate::array::{arrayof, arrayof_mut, new_array, push, ArrayObj};
use crate::err::{set_error, Res};
use crate::interp::{cur_ex, enter, leave, set_cur_ex, wakeup, Interp};
use crate::object::{Obj, ObjType, Object, SendObj, O_MARK, TC_EXEC};
use tracing::warn;

#[repr(C)]
pub struct ExecObj {
    pub header: Object,
    /// Execution stack: pcs, ops, marks, catchers.
    pub xs: Obj,
    /// Operand stack: values being produced and consumed.
    pub os: Obj,
    /// Scope stack: the top is the current scope.
    pub vs: Obj,
    /// Most recently executed source marker, or NULL.
    pub src: Obj,
}

#[inline(always)]
pub fn execof<'a>(o: Obj) -> &'a ExecObj {
    debug_assert_eq!(o.tcode(), TC_EXEC);
    unsafe { &*(o.ptr() as *const ExecObj) }
}

#[inline(always)]
pub fn execof_mut<'a>(o: Obj) -> &'a mut ExecObj {
    debug_assert_eq!(o.tcode(), TC_EXEC);
    unsafe { &mut *(o.ptr() as *mut ExecObj) }
}

/// A new execution record, registered as a collector root. The caller
/// still owns pushing an initial scope onto `vs`.
pub fn new_exec(ip: &mut Interp) -> Res<Obj> {
    let p: *mut ExecObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_EXEC, 0, 1, 0);
    unsafe {
        (*p).xs = ip.o_null;
        (*p).os = ip.o_null;
        (*p).vs = ip.o_null;
        (*p).src = ip.o_null;
    }
    ip.rego(o);
    // The exec is pinned (nrefs = 1), so the partially filled record
    // survives the allocations below.
    let xs = new_array(ip, 64)?;
    execof_mut(o).xs = xs;
    xs.decref();
    let os = new_array(ip, 64)?;
    execof_mut(o).os = os;
    os.decref();
    let vs = new_array(ip, 16)?;
    execof_mut(o).vs = vs;
    vs.decref();
    ip.execs.push(o);
    Ok(o)
}

/// Drop an exec from the root set (at thread exit).
pub fn remove_exec(ip: &mut Interp, ex: Obj) {
    ip.execs.retain(|&e| e != ex);
    ex.decref();
}

impl Interp {
    /// The current thread's exec. Panics if the thread never attached.
    pub fn ex(&self) -> Obj {
        cur_ex().expect("no execution context on this thread")
    }

    pub fn xs(&self) -> &'static mut ArrayObj {
        arrayof_mut(execof(self.ex()).xs)
    }

    pub fn os(&self) -> &'static mut ArrayObj {
        arrayof_mut(execof(self.ex()).os)
    }

    pub fn vs(&self) -> &'static mut ArrayObj {
        arrayof_mut(execof(self.ex()).vs)
    }

    /// The current scope: top of the scope stack.
    pub fn scope(&self) -> Obj {
        let vs = arrayof(execof(self.ex()).vs);
        debug_assert!(!vs.is_empty());
        vs.top_obj()
    }

    pub fn xs_push(&mut self, o: Obj) -> Res {
        let xs = execof(self.ex()).xs;
        push(self, xs, o)
    }

    pub fn os_push(&mut self, o: Obj) -> Res {
        let os = execof(self.ex()).os;
        push(self, os, o)
    }

    pub fn vs_push(&mut self, o: Obj) -> Res {
        let vs = execof(self.ex()).vs;
        push(self, vs, o)
    }
}

pub struct ExecType;

impl ObjType for ExecType {
    fn name(&self) -> &'static str {
        "exec"
    }

    fn mark(&self, ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        let e = execof(o);
        std::mem::size_of::<ExecObj>()
            + crate::gc::mark_obj(ip, e.xs)
            + crate::gc::mark_obj(ip, e.os)
            + crate::gc::mark_obj(ip, e.vs)
            + crate::gc::mark_obj(ip, e.src)
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        ip.tfree::<ExecObj>(o.cast());
    }
}

/// Spawn an interpreter thread running `callable(args...)` in a fresh
/// execution context whose initial scope is the shared base scope.
/// Returns the new exec object; a `wakeup` on it is posted when the
/// thread finishes.
pub fn go_thread(ip: &mut Interp, callable: Obj, args: &[Obj]) -> Res<Obj> {
    let ex = new_exec(ip)?;
    let scope = ip.base_scope;
    {
        let vs = execof(ex).vs;
        push(ip, vs, scope)?;
    }
    // Pin everything crossing the thread boundary until the callee has
    // it rooted on its own stacks.
    callable.incref();
    for a in args {
        a.incref();
    }
    let t_ex = SendObj(ex);
    let t_callable = SendObj(callable);
    let t_args: Vec<SendObj> = args.iter().map(|&a| SendObj(a)).collect();

    std::thread::spawn(move || {
        let (t_ex, t_callable, t_args) = (t_ex, t_callable, t_args);
        let ip = enter();
        let ex = t_ex.0;
        set_cur_ex(Some(ex));
        let callable = t_callable.0;
        let args: Vec<Obj> = t_args.iter().map(|a| a.0).collect();
        match crate::call::call_obj(ip, callable, &args) {
            Ok(r) => r.decref(),
            Err(_) => {
                let msg = crate::err::get_error().unwrap_or_default();
                warn!("uncaught error in interpreter thread: {msg}");
                crate::err::clear_error();
            }
        }
        callable.decref();
        for a in &args {
            a.decref();
        }
        remove_exec(ip, ex);
        set_cur_ex(None);
        wakeup(ex);
        leave();
    });
    // The thread owns the creation reference (dropped by
    // `remove_exec`); the caller gets its own.
    ex.incref();
    Ok(ex)
}

/// Fail unless the execution stack has room left; guards runaway
/// recursion before it exhausts memory.
pub fn engine_stack_check(ip: &mut Interp) -> Res {
    const MAX_DEPTH: usize = 100_000;
    if ip.xs().len() > MAX_DEPTH {
        return set_error("excessive recursion");
    }
    Ok(())
}

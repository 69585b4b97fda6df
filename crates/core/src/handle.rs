//! Handles: script-level wrappers around foreign pointers.
//!
//! A handle carries a type name, an optional lazily created member
//! map for per-instance state, and an optional callback run just
//! before the collector frees it. Closing a handle sets the CLOSED
//! flag; member access on a closed handle fails.

use crate::err::{set_error, Res};
use crate::interp::Interp;
use crate::map::{assign_base, lookup_chain, new_map};
use crate::object::{Obj, ObjType, Object, O_CLOSED, O_MARK, TC_HANDLE};

pub type HandlePreFree = unsafe fn(*mut libc::c_void);

#[repr(C)]
pub struct HandleObj {
    pub header: Object,
    /// The wrapped foreign pointer.
    pub ptr: *mut libc::c_void,
    /// The handle's type name (an interned string).
    pub name: Obj,
    /// Per-instance member map, created on first assignment; NULL
    /// until then.
    members: *mut Object,
    pre_free: Option<HandlePreFree>,
}

#[inline(always)]
pub fn handleof<'a>(o: Obj) -> &'a HandleObj {
    debug_assert_eq!(o.tcode(), TC_HANDLE);
    unsafe { &*(o.ptr() as *const HandleObj) }
}

#[inline(always)]
pub fn handleof_mut<'a>(o: Obj) -> &'a mut HandleObj {
    debug_assert_eq!(o.tcode(), TC_HANDLE);
    unsafe { &mut *(o.ptr() as *mut HandleObj) }
}

impl HandleObj {
    pub fn members(&self) -> Option<Obj> {
        if self.members.is_null() {
            None
        } else {
            Some(unsafe { Obj::from_raw(self.members) })
        }
    }
}

pub fn new_handle(
    ip: &mut Interp,
    ptr: *mut libc::c_void,
    name: Obj,
    pre_free: Option<HandlePreFree>,
) -> Res<Obj> {
    let p: *mut HandleObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_HANDLE, 0, 1, 0);
    unsafe {
        (*p).ptr = ptr;
        (*p).name = name;
        (*p).members = std::ptr::null_mut();
        (*p).pre_free = pre_free;
    }
    ip.rego(o);
    Ok(o)
}

/// End the handle's life early: run the pre-free callback now and
/// mark it closed. Further member access fails; the collector will
/// not run the callback again.
pub fn close_handle(_ip: &mut Interp, h: Obj) -> Res {
    if h.has_flag(O_CLOSED) {
        return set_error("attempt to close an already closed handle");
    }
    let hh = handleof_mut(h);
    if let Some(f) = hh.pre_free.take() {
        unsafe { f(hh.ptr) };
    }
    h.set_flag(O_CLOSED);
    Ok(())
}

pub struct HandleType;

impl ObjType for HandleType {
    fn name(&self) -> &'static str {
        "handle"
    }

    fn mark(&self, ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        let h = handleof(o);
        let mut z = std::mem::size_of::<HandleObj>() + crate::gc::mark_obj(ip, h.name);
        if let Some(m) = h.members() {
            z += crate::gc::mark_obj(ip, m);
        }
        z
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        let h = handleof_mut(o);
        if let Some(f) = h.pre_free.take() {
            if !o.has_flag(O_CLOSED) {
                f(h.ptr);
            }
        }
        ip.tfree::<HandleObj>(o.cast());
    }

    fn hash(&self, _ip: &Interp, o: Obj) -> u64 {
        crate::atom::ptr_hash(handleof(o).ptr as usize)
            ^ crate::atom::ptr_hash(handleof(o).name.addr())
    }

    fn eq(&self, _ip: &Interp, a: Obj, b: Obj) -> bool {
        let (ha, hb) = (handleof(a), handleof(b));
        ha.ptr == hb.ptr && ha.name == hb.name
    }

    fn fetch(&self, ip: &mut Interp, o: Obj, k: Obj) -> Res<Obj> {
        if o.has_flag(O_CLOSED) {
            return set_error("attempt to access a closed handle");
        }
        if let Some(m) = handleof(o).members() {
            if let Some(v) = lookup_chain(ip, m, k) {
                v.incref();
                return Ok(v);
            }
        }
        ip.o_null.incref();
        Ok(ip.o_null)
    }

    fn assign(&self, ip: &mut Interp, o: Obj, k: Obj, v: Obj) -> Res {
        if o.has_flag(O_CLOSED) {
            return set_error("attempt to access a closed handle");
        }
        let m = match handleof(o).members() {
            Some(m) => m,
            None => {
                let m = new_map(ip)?;
                handleof_mut(o).members = m.ptr();
                m.decref();
                m
            }
        };
        assign_base(ip, m, k, v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::int::{intof, new_int};
    use crate::string::new_str;
    use crate::testutil::with_interp;
    use serial_test::serial;

    static mut FREED: u32 = 0;

    unsafe fn count_free(_p: *mut libc::c_void) {
        FREED += 1;
    }

    #[test]
    #[serial]
    fn test_members_and_identity() {
        with_interp(|ip| {
            let name = new_str(ip, b"widget").unwrap();
            let h = new_handle(ip, 0x1000 as *mut libc::c_void, name, None).unwrap();
            let k = new_str(ip, b"size").unwrap();
            let v = new_int(ip, 9).unwrap();
            ip.assign(h, k, v).unwrap();
            let got = ip.fetch(h, k).unwrap();
            assert_eq!(intof(got).value, 9);
            got.decref();

            // Same pointer and name: equal by value.
            let h2 = new_handle(ip, 0x1000 as *mut libc::c_void, name, None).unwrap();
            assert!(ip.obj_eq(h, h2));
            h2.decref();
            h.decref();
            k.decref();
            v.decref();
            name.decref();
        });
    }

    #[test]
    #[serial]
    fn test_pre_free_runs_once() {
        with_interp(|ip| {
            let name = new_str(ip, b"res").unwrap();
            let h = new_handle(ip, std::ptr::null_mut(), name, Some(count_free)).unwrap();
            let before = unsafe { FREED };
            close_handle(ip, h).unwrap();
            assert_eq!(unsafe { FREED }, before + 1);
            // Closed: member access fails, and collection must not run
            // the callback again.
            let k = new_str(ip, b"k").unwrap();
            assert!(ip.fetch(h, k).is_err());
            crate::err::clear_error();
            h.decref();
            ip.reclaim();
            assert_eq!(unsafe { FREED }, before + 1);
            k.decref();
            name.decref();
        });
    }
}

//! Mem: a typed window over externally-owned memory.
//!
//! The window is `len` elements of `accessz` bytes (1, 2, 4 or 8)
//! starting at `base`. Indexing reads and writes integers through the
//! window; an optional release callback runs when the object is
//! collected.

use crate::err::{set_error, Res};
use crate::int::{intof, new_int};
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_MARK, TC_INT, TC_MEM};

pub type MemFree = unsafe fn(*mut u8);

#[repr(C)]
pub struct MemObj {
    pub header: Object,
    pub base: *mut u8,
    /// Number of elements, not bytes.
    pub len: usize,
    /// Element size in bytes: 1, 2, 4 or 8.
    pub accessz: usize,
    free_fn: Option<MemFree>,
}

const MEM_PRIME: u64 = 0x0005_8F19_D52B;

#[inline(always)]
pub fn memof<'a>(o: Obj) -> &'a MemObj {
    debug_assert_eq!(o.tcode(), TC_MEM);
    unsafe { &*(o.ptr() as *const MemObj) }
}

/// A new memory window. `free_fn`, when given, runs on `base` at
/// collection.
pub fn new_mem(
    ip: &mut Interp,
    base: *mut u8,
    len: usize,
    accessz: usize,
    free_fn: Option<MemFree>,
) -> Res<Obj> {
    if !matches!(accessz, 1 | 2 | 4 | 8) {
        return set_error("bad memory access size");
    }
    let p: *mut MemObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_MEM, 0, 1, std::mem::size_of::<MemObj>());
    unsafe {
        (*p).base = base;
        (*p).len = len;
        (*p).accessz = accessz;
        (*p).free_fn = free_fn;
    }
    ip.rego(o);
    Ok(o)
}

pub struct MemType;

impl ObjType for MemType {
    fn name(&self) -> &'static str {
        "mem"
    }

    fn mark(&self, _ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        std::mem::size_of::<MemObj>()
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        let m = memof(o);
        if let Some(f) = m.free_fn {
            f(m.base);
        }
        ip.tfree::<MemObj>(o.cast());
    }

    fn hash(&self, _ip: &Interp, o: Obj) -> u64 {
        let m = memof(o);
        MEM_PRIME
            .wrapping_mul(m.base as u64)
            .wrapping_add((m.len as u64) ^ ((m.accessz as u64) << 32))
    }

    fn eq(&self, _ip: &Interp, a: Obj, b: Obj) -> bool {
        let (ma, mb) = (memof(a), memof(b));
        ma.base == mb.base && ma.len == mb.len && ma.accessz == mb.accessz
    }

    fn fetch(&self, ip: &mut Interp, o: Obj, k: Obj) -> Res<Obj> {
        if k.tcode() != TC_INT {
            return set_error("non-integer mem index");
        }
        let i = intof(k).value;
        let m = memof(o);
        if i < 0 || i as usize >= m.len {
            return set_error("mem index out of range");
        }
        let i = i as usize;
        let v = unsafe {
            match m.accessz {
                1 => *m.base.add(i) as i64,
                2 => (m.base as *const u16).add(i).read_unaligned() as i64,
                4 => (m.base as *const u32).add(i).read_unaligned() as i64,
                _ => (m.base as *const i64).add(i).read_unaligned(),
            }
        };
        new_int(ip, v)
    }

    fn assign(&self, _ip: &mut Interp, o: Obj, k: Obj, v: Obj) -> Res {
        if k.tcode() != TC_INT || v.tcode() != TC_INT {
            return set_error("non-integer mem assignment");
        }
        let i = intof(k).value;
        let m = memof(o);
        if i < 0 || i as usize >= m.len {
            return set_error("mem index out of range");
        }
        let i = i as usize;
        let val = intof(v).value;
        unsafe {
            match m.accessz {
                1 => *m.base.add(i) = val as u8,
                2 => (m.base as *mut u16).add(i).write_unaligned(val as u16),
                4 => (m.base as *mut u32).add(i).write_unaligned(val as u32),
                _ => (m.base as *mut i64).add(i).write_unaligned(val),
            }
        }
        Ok(())
    }

    fn len(&self, _ip: &Interp, o: Obj) -> Res<usize> {
        Ok(memof(o).len)
    }
}

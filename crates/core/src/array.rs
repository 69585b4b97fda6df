//! Arrays: a circular-buffer deque of object references with O(1)
//! push/pop at both ends.
//!
//! ## Layout
//!
//! ```text
//! base                                   limit
//!   │ ................ elements ........... │
//!   ▼                                       ▼
//!   ┌───┬───┬───┬───┬───┬───┬───┬───┬───┬───┐
//!   │   │ e4│ e5│   │   │   │ e0│ e1│ e2│ e3│
//!   └───┴───┴───┴───┴───┴───┴───┴───┴───┴───┘
//!             ▲           ▲
//!            top         bot
//! ```
//!
//! `bot` is the first element, `top` one past the last, both wrapping
//! at `limit`. One slot always stays unused so `bot == top` means
//! empty. Traversal uses the `astart`/`alimit`/`anext`/`aprev`
//! primitives.
//!
//! The VM's value, operand and execution stacks are ordinary arrays:
//! they are on the object registry and participate in marking like
//! anything else, and growing one goes through the normal allocator.

use crate::err::{set_error, Res};
use crate::int::{intof, new_int};
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_MARK, TC_ARRAY, TC_INT};

#[repr(C)]
pub struct ArrayObj {
    pub header: Object,
    /// Start of the slot allocation.
    base: *mut Obj,
    /// One past the end of the slot allocation.
    limit: *mut Obj,
    /// First element.
    bot: *mut Obj,
    /// One past the last element.
    top: *mut Obj,
}

#[inline(always)]
pub fn arrayof<'a>(o: Obj) -> &'a ArrayObj {
    debug_assert_eq!(o.tcode(), TC_ARRAY);
    unsafe { &*(o.ptr() as *const ArrayObj) }
}

#[inline(always)]
pub fn arrayof_mut<'a>(o: Obj) -> &'a mut ArrayObj {
    debug_assert_eq!(o.tcode(), TC_ARRAY);
    unsafe { &mut *(o.ptr() as *mut ArrayObj) }
}

impl ArrayObj {
    #[inline(always)]
    fn nslots(&self) -> usize {
        unsafe { self.limit.offset_from(self.base) as usize }
    }

    /// Number of elements.
    #[inline(always)]
    pub fn len(&self) -> usize {
        let d = unsafe { self.top.offset_from(self.bot) };
        if d >= 0 {
            d as usize
        } else {
            (d + self.nslots() as isize) as usize
        }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.bot == self.top
    }

    /// First element position, for traversal.
    #[inline(always)]
    pub fn astart(&self) -> *mut Obj {
        self.bot
    }

    /// One-past-last position, for traversal.
    #[inline(always)]
    pub fn alimit(&self) -> *mut Obj {
        self.top
    }

    /// The position after `e`, wrapping at the end of the allocation.
    #[inline(always)]
    pub fn anext(&self, e: *mut Obj) -> *mut Obj {
        let n = unsafe { e.add(1) };
        if n == self.limit {
            self.base
        } else {
            n
        }
    }

    /// The position before `e`, wrapping at the start.
    #[inline(always)]
    pub fn aprev(&self, e: *mut Obj) -> *mut Obj {
        if e == self.base {
            unsafe { self.limit.sub(1) }
        } else {
            unsafe { e.sub(1) }
        }
    }

    /// The `i`th element.
    #[inline(always)]
    pub fn get(&self, i: usize) -> Obj {
        debug_assert!(i < self.len());
        unsafe {
            let mut p = self.bot.add(i);
            if p >= self.limit {
                p = self.base.add(p.offset_from(self.limit) as usize);
            }
            *p
        }
    }

    /// Overwrite the `i`th element.
    #[inline(always)]
    pub fn put(&mut self, i: usize, o: Obj) {
        debug_assert!(i < self.len());
        unsafe {
            let mut p = self.bot.add(i);
            if p >= self.limit {
                p = self.base.add(p.offset_from(self.limit) as usize);
            }
            *p = o;
        }
    }

    /// The last element.
    #[inline(always)]
    pub fn top_obj(&self) -> Obj {
        debug_assert!(!self.is_empty());
        unsafe { *self.aprev(self.top) }
    }

    /// Remove and return the last element. The value is no longer
    /// rooted by this array: root it before the next allocation.
    #[inline(always)]
    pub fn pop(&mut self) -> Obj {
        debug_assert!(!self.is_empty());
        self.top = self.aprev(self.top);
        unsafe { *self.top }
    }

    /// Remove and return the first element; same rooting caveat as
    /// `pop`.
    #[inline(always)]
    pub fn rpop(&mut self) -> Obj {
        debug_assert!(!self.is_empty());
        let v = unsafe { *self.bot };
        self.bot = self.anext(self.bot);
        v
    }

    /// Drop elements until `n` remain.
    pub fn truncate(&mut self, n: usize) {
        debug_assert!(n <= self.len());
        while self.len() > n {
            self.pop();
        }
    }
}

/// A new array with room for at least `cap` elements before the first
/// grow, reference hint bumped.
pub fn new_array(ip: &mut Interp, cap: usize) -> Res<Obj> {
    // One spare slot distinguishes empty from full; the floor of 8
    // slots keeps small arrays on the 64-byte fast path.
    let nslots = (cap + 1).max(8);
    let p: *mut ArrayObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_ARRAY, 0, 1, 0);
    unsafe {
        (*p).base = std::ptr::null_mut();
        (*p).limit = std::ptr::null_mut();
        (*p).bot = std::ptr::null_mut();
        (*p).top = std::ptr::null_mut();
    }
    ip.rego(o);
    let base = ip.nalloc(nslots * std::mem::size_of::<Obj>())? as *mut Obj;
    let a = arrayof_mut(o);
    a.base = base;
    a.limit = unsafe { base.add(nslots) };
    a.bot = base;
    a.top = base;
    Ok(o)
}

/// Grow the slot allocation, unwrapping any circularity.
fn grow(ip: &mut Interp, o: Obj) -> Res {
    let (old_base, old_nslots, len) = {
        let a = arrayof(o);
        (a.base, a.nslots(), a.len())
    };
    let new_nslots = (old_nslots * 2).max(8);
    let base = ip.nalloc(new_nslots * std::mem::size_of::<Obj>())? as *mut Obj;
    {
        let a = arrayof_mut(o);
        let mut e = a.astart();
        for i in 0..len {
            unsafe { *base.add(i) = *e };
            e = a.anext(e);
        }
        a.base = base;
        a.limit = unsafe { base.add(new_nslots) };
        a.bot = base;
        a.top = unsafe { base.add(len) };
    }
    ip.nfree(old_base as *mut u8, old_nslots * std::mem::size_of::<Obj>());
    Ok(())
}

/// Make room for `n` more elements without reallocation, so a
/// subsequent burst of pushes cannot move the buffer or collect.
pub fn push_check(ip: &mut Interp, o: Obj, n: usize) -> Res {
    while arrayof(o).len() + n + 1 > arrayof(o).nslots() {
        grow(ip, o)?;
    }
    Ok(())
}

/// Append at the back.
pub fn push(ip: &mut Interp, o: Obj, v: Obj) -> Res {
    push_check(ip, o, 1)?;
    let a = arrayof_mut(o);
    unsafe { *a.top = v };
    a.top = a.anext(a.top);
    Ok(())
}

/// Prepend at the front.
pub fn rpush(ip: &mut Interp, o: Obj, v: Obj) -> Res {
    push_check(ip, o, 1)?;
    let a = arrayof_mut(o);
    a.bot = a.aprev(a.bot);
    unsafe { *a.bot = v };
    Ok(())
}

pub struct ArrayType;

impl ObjType for ArrayType {
    fn name(&self) -> &'static str {
        "array"
    }

    fn mark(&self, ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        let a = arrayof(o);
        let mut z = std::mem::size_of::<ArrayObj>() + a.nslots() * std::mem::size_of::<Obj>();
        let mut e = a.astart();
        while e != a.alimit() {
            z += crate::gc::mark_obj(ip, unsafe { *e });
            e = a.anext(e);
        }
        z
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        let (base, nslots) = {
            let a = arrayof(o);
            (a.base, a.nslots())
        };
        if !base.is_null() {
            ip.nfree(base as *mut u8, nslots * std::mem::size_of::<Obj>());
        }
        ip.tfree::<ArrayObj>(o.cast());
    }

    fn hash(&self, ip: &Interp, o: Obj) -> u64 {
        const ARRAY_PRIME: u64 = 0x0009_57C3_9BB1;
        let a = arrayof(o);
        let mut h = ARRAY_PRIME.wrapping_mul(a.len() as u64 + 1);
        let mut e = a.astart();
        while e != a.alimit() {
            h = h.wrapping_mul(31).wrapping_add(ip.obj_hash(unsafe { *e }));
            e = a.anext(e);
        }
        h
    }

    fn eq(&self, ip: &Interp, a: Obj, b: Obj) -> bool {
        let (aa, ab) = (arrayof(a), arrayof(b));
        if aa.len() != ab.len() {
            return false;
        }
        for i in 0..aa.len() {
            if !ip.obj_eq(aa.get(i), ab.get(i)) {
                return false;
            }
        }
        true
    }

    fn copy(&self, ip: &mut Interp, o: Obj) -> Res<Obj> {
        let len = arrayof(o).len();
        let c = new_array(ip, len)?;
        for i in 0..len {
            // Elements stay rooted by the source throughout.
            push(ip, c, arrayof(o).get(i))?;
        }
        Ok(c)
    }

    fn fetch(&self, ip: &mut Interp, o: Obj, k: Obj) -> Res<Obj> {
        if k.tcode() != TC_INT {
            return set_error("non-integer array index");
        }
        let i = intof(k).value;
        let a = arrayof(o);
        if i < 0 || i as usize >= a.len() {
            return set_error("array index out of range");
        }
        let v = a.get(i as usize);
        v.incref();
        Ok(v)
    }

    fn assign(&self, ip: &mut Interp, o: Obj, k: Obj, v: Obj) -> Res {
        if o.is_atom() {
            return set_error("attempt to assign to an atomic array");
        }
        if k.tcode() != TC_INT {
            return set_error("non-integer array index");
        }
        let i = intof(k).value;
        let len = arrayof(o).len();
        if i < 0 || i as usize > len {
            return set_error("array index out of range");
        }
        if i as usize == len {
            push(ip, o, v)
        } else {
            arrayof_mut(o).put(i as usize, v);
            Ok(())
        }
    }

    fn len(&self, _ip: &Interp, o: Obj) -> Res<usize> {
        Ok(arrayof(o).len())
    }

    fn keys(&self, ip: &mut Interp, o: Obj) -> Res<Obj> {
        let len = arrayof(o).len();
        let ks = new_array(ip, len)?;
        for i in 0..len {
            let k = new_int(ip, i as i64)?;
            push(ip, ks, k)?;
            k.decref();
        }
        Ok(ks)
    }

    fn save(&self, ip: &mut Interp, ar: &mut dyn crate::archiver::Archiver, o: Obj) -> Res {
        let len = arrayof(o).len();
        ar.write_i64(len as i64)?;
        for i in 0..len {
            let e = arrayof(o).get(i);
            crate::archiver::save_obj(ip, ar, e)?;
        }
        Ok(())
    }

    fn restore(&self, ip: &mut Interp, ar: &mut dyn crate::archiver::Archiver) -> Res<Obj> {
        let len = ar.read_i64()? as usize;
        let a = new_array(ip, len)?;
        for _ in 0..len {
            let e = crate::archiver::restore_obj(ip, ar)?;
            push(ip, a, e)?;
            e.decref();
        }
        Ok(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::with_interp;
    use serial_test::serial;

    fn push_int(ip: &mut crate::interp::Interp, a: Obj, v: i64) {
        let o = new_int(ip, v).unwrap();
        push(ip, a, o).unwrap();
        o.decref();
    }

    #[test]
    #[serial]
    fn test_push_pop_both_ends() {
        with_interp(|ip| {
            let a = new_array(ip, 0).unwrap();
            for v in 0..10 {
                push_int(ip, a, v);
            }
            let front = new_int(ip, -1).unwrap();
            rpush(ip, a, front).unwrap();
            front.decref();
            assert_eq!(arrayof(a).len(), 11);
            assert_eq!(intof(arrayof(a).get(0)).value, -1);
            assert_eq!(intof(arrayof_mut(a).rpop()).value, -1);
            assert_eq!(intof(arrayof_mut(a).pop()).value, 9);
            assert_eq!(arrayof(a).len(), 9);
            a.decref();
        });
    }

    #[test]
    #[serial]
    fn test_growth_preserves_values_through_wrap() {
        with_interp(|ip| {
            let a = new_array(ip, 4).unwrap();
            // Rotate enough to force wrap-around, then grow.
            for v in 0..6 {
                push_int(ip, a, v);
            }
            arrayof_mut(a).rpop();
            arrayof_mut(a).rpop();
            for v in 6..40 {
                push_int(ip, a, v);
            }
            assert_eq!(arrayof(a).len(), 38);
            for i in 0..38 {
                assert_eq!(intof(arrayof(a).get(i)).value, i as i64 + 2);
            }
            a.decref();
        });
    }

    #[test]
    #[serial]
    fn test_traversal_primitives_cover_all_elements() {
        with_interp(|ip| {
            let a = new_array(ip, 0).unwrap();
            for v in 0..5 {
                push_int(ip, a, v);
            }
            let aa = arrayof(a);
            let mut seen = Vec::new();
            let mut e = aa.astart();
            while e != aa.alimit() {
                seen.push(intof(unsafe { *e }).value);
                e = aa.anext(e);
            }
            assert_eq!(seen, vec![0, 1, 2, 3, 4]);
            let prev = aa.aprev(aa.alimit());
            assert_eq!(intof(unsafe { *prev }).value, 4);
            a.decref();
        });
    }

    #[test]
    #[serial]
    fn test_copy_is_shallow_and_independent() {
        with_interp(|ip| {
            let a = new_array(ip, 0).unwrap();
            for v in [1, 2, 3] {
                push_int(ip, a, v);
            }
            let t = ip.type_of(a);
            let b = t.copy(ip, a).unwrap();
            assert!(!b.is_atom());
            let ten = new_int(ip, 10).unwrap();
            arrayof_mut(a).put(0, ten);
            ten.decref();
            assert_eq!(intof(arrayof(b).get(0)).value, 1);
            a.decref();
            b.decref();
        });
    }
}

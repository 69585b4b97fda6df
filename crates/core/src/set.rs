//! Sets: open-addressed hash tables of object keys.
//!
//! Assigning a true value inserts the key, assigning a false value
//! removes it, and fetching yields 1 or 0; so `s[k] = 1` and
//! `if (s[k]) ...` read naturally in script code.

use crate::array::{new_array, push};
use crate::err::{set_error, Res};
use crate::int::new_int;
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_MARK, TC_SET};
use crate::vm::is_true;

#[repr(C)]
pub struct SetObj {
    pub header: Object,
    nels: usize,
    nslots: usize,
    slots: *mut *mut Object,
}

const INITIAL_SLOTS: usize = 8;
const SET_PRIME: u64 = 0x000B_94E5_A3D7;

#[inline(always)]
pub fn setof<'a>(o: Obj) -> &'a SetObj {
    debug_assert_eq!(o.tcode(), TC_SET);
    unsafe { &*(o.ptr() as *const SetObj) }
}

#[inline(always)]
pub fn setof_mut<'a>(o: Obj) -> &'a mut SetObj {
    debug_assert_eq!(o.tcode(), TC_SET);
    unsafe { &mut *(o.ptr() as *mut SetObj) }
}

impl SetObj {
    #[inline(always)]
    pub fn nels(&self) -> usize {
        self.nels
    }

    #[inline(always)]
    fn slot(&self, i: usize) -> *mut Object {
        unsafe { *self.slots.add(i) }
    }

    #[inline(always)]
    fn set_slot(&mut self, i: usize, p: *mut Object) {
        unsafe { *self.slots.add(i) = p };
    }

    /// Iterate members.
    pub fn members(&self) -> impl Iterator<Item = Obj> + '_ {
        (0..self.nslots).filter_map(move |i| {
            let p = self.slot(i);
            if p.is_null() {
                None
            } else {
                Some(unsafe { Obj::from_raw(p) })
            }
        })
    }
}

/// A new empty set, reference hint bumped.
pub fn new_set(ip: &mut Interp) -> Res<Obj> {
    let p: *mut SetObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_SET, 0, 1, 0);
    unsafe {
        (*p).nels = 0;
        (*p).nslots = 0;
        (*p).slots = std::ptr::null_mut();
    }
    ip.rego(o);
    let slots = ip.nalloc(INITIAL_SLOTS * std::mem::size_of::<*mut Object>())? as *mut *mut Object;
    unsafe {
        std::ptr::write_bytes(slots as *mut u8, 0, INITIAL_SLOTS * std::mem::size_of::<*mut Object>())
    };
    let s = setof_mut(o);
    s.nslots = INITIAL_SLOTS;
    s.slots = slots;
    Ok(o)
}

fn find_slot(ip: &Interp, s: &SetObj, k: Obj) -> usize {
    let mask = s.nslots - 1;
    let mut i = (ip.obj_hash(k) as usize) & mask;
    loop {
        let p = s.slot(i);
        if p.is_null() {
            return i;
        }
        if ip.obj_eq(unsafe { Obj::from_raw(p) }, k) {
            return i;
        }
        i = i.wrapping_sub(1) & mask;
    }
}

/// Membership test.
pub fn contains(ip: &Interp, s: Obj, k: Obj) -> bool {
    let ss = setof(s);
    !ss.slot(find_slot(ip, ss, k)).is_null()
}

fn grow(ip: &mut Interp, o: Obj) -> Res {
    let (old_slots, old_nslots) = {
        let s = setof(o);
        (s.slots, s.nslots)
    };
    let new_nslots = old_nslots * 2;
    let slots = ip.nalloc(new_nslots * std::mem::size_of::<*mut Object>())? as *mut *mut Object;
    unsafe {
        std::ptr::write_bytes(slots as *mut u8, 0, new_nslots * std::mem::size_of::<*mut Object>())
    };
    {
        let s = setof_mut(o);
        s.slots = slots;
        s.nslots = new_nslots;
    }
    for i in 0..old_nslots {
        let p = unsafe { *old_slots.add(i) };
        if !p.is_null() {
            let k = unsafe { Obj::from_raw(p) };
            let j = find_slot(ip, setof(o), k);
            setof_mut(o).set_slot(j, p);
        }
    }
    ip.nfree(old_slots as *mut u8, old_nslots * std::mem::size_of::<*mut Object>());
    Ok(())
}

/// Insert `k`.
pub fn add(ip: &mut Interp, o: Obj, k: Obj) -> Res {
    if o.is_atom() {
        return set_error("attempt to assign to an atomic set");
    }
    if setof(o).nels * 3 > setof(o).nslots * 2 {
        grow(ip, o)?;
    }
    let i = find_slot(ip, setof(o), k);
    let s = setof_mut(o);
    if s.slot(i).is_null() {
        s.set_slot(i, k.ptr());
        s.nels += 1;
    }
    Ok(())
}

/// Remove `k`, closing the probe cluster.
pub fn unassign(ip: &mut Interp, o: Obj, k: Obj) -> Res {
    if o.is_atom() {
        return set_error("attempt to unassign from an atomic set");
    }
    let s = setof_mut(o);
    let mask = s.nslots - 1;
    let i = find_slot(ip, s, k);
    if s.slot(i).is_null() {
        return Ok(());
    }
    s.set_slot(i, std::ptr::null_mut());
    s.nels -= 1;

    let mut hole = i;
    let mut t = i.wrapping_sub(1) & mask;
    while !s.slot(t).is_null() {
        let e = unsafe { Obj::from_raw(s.slot(t)) };
        let home = (ip.obj_hash(e) as usize) & mask;
        let d_hole = home.wrapping_sub(hole) & mask;
        let d_t = home.wrapping_sub(t) & mask;
        if d_hole < d_t {
            let p = s.slot(t);
            s.set_slot(hole, p);
            s.set_slot(t, std::ptr::null_mut());
            hole = t;
        }
        t = t.wrapping_sub(1) & mask;
    }
    Ok(())
}

/// Is `a` a subset of `b`?
pub fn set_issubset(ip: &Interp, a: Obj, b: Obj) -> bool {
    setof(a).members().all(|m| contains(ip, b, m))
}

/// Is `a` a proper subset of `b`?
pub fn set_ispropersubset(ip: &Interp, a: Obj, b: Obj) -> bool {
    setof(a).nels < setof(b).nels && set_issubset(ip, a, b)
}

pub struct SetType;

impl ObjType for SetType {
    fn name(&self) -> &'static str {
        "set"
    }

    fn mark(&self, ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        let s = setof(o);
        let mut z = std::mem::size_of::<SetObj>() + s.nslots * std::mem::size_of::<*mut Object>();
        for m in s.members() {
            z += crate::gc::mark_obj(ip, m);
        }
        z
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        let (slots, nslots) = {
            let s = setof(o);
            (s.slots, s.nslots)
        };
        if !slots.is_null() {
            ip.nfree(slots as *mut u8, nslots * std::mem::size_of::<*mut Object>());
        }
        ip.tfree::<SetObj>(o.cast());
    }

    fn hash(&self, ip: &Interp, o: Obj) -> u64 {
        let s = setof(o);
        let mut h = SET_PRIME.wrapping_mul(s.nels as u64 + 1);
        for m in s.members() {
            h = h.wrapping_add(ip.obj_hash(m));
        }
        h
    }

    fn eq(&self, ip: &Interp, a: Obj, b: Obj) -> bool {
        setof(a).nels == setof(b).nels && set_issubset(ip, a, b)
    }

    fn copy(&self, ip: &mut Interp, o: Obj) -> Res<Obj> {
        let c = new_set(ip)?;
        let n = setof(o).nslots;
        for i in 0..n {
            let p = setof(o).slot(i);
            if !p.is_null() {
                add(ip, c, unsafe { Obj::from_raw(p) })?;
            }
        }
        Ok(c)
    }

    fn fetch(&self, ip: &mut Interp, o: Obj, k: Obj) -> Res<Obj> {
        new_int(ip, contains(ip, o, k) as i64)
    }

    fn assign(&self, ip: &mut Interp, o: Obj, k: Obj, v: Obj) -> Res {
        if is_true(ip, v) {
            add(ip, o, k)
        } else {
            unassign(ip, o, k)
        }
    }

    fn len(&self, _ip: &Interp, o: Obj) -> Res<usize> {
        Ok(setof(o).nels)
    }

    fn keys(&self, ip: &mut Interp, o: Obj) -> Res<Obj> {
        let ks = new_array(ip, setof(o).nels)?;
        let n = setof(o).nslots;
        for i in 0..n {
            let p = setof(o).slot(i);
            if !p.is_null() {
                push(ip, ks, unsafe { Obj::from_raw(p) })?;
            }
        }
        Ok(ks)
    }

    fn save(&self, ip: &mut Interp, ar: &mut dyn crate::archiver::Archiver, o: Obj) -> Res {
        ar.write_i64(setof(o).nels as i64)?;
        let n = setof(o).nslots;
        for i in 0..n {
            let p = setof(o).slot(i);
            if !p.is_null() {
                crate::archiver::save_obj(ip, ar, unsafe { Obj::from_raw(p) })?;
            }
        }
        Ok(())
    }

    fn restore(&self, ip: &mut Interp, ar: &mut dyn crate::archiver::Archiver) -> Res<Obj> {
        let nels = ar.read_i64()? as usize;
        let s = new_set(ip)?;
        for _ in 0..nels {
            let m = crate::archiver::restore_obj(ip, ar)?;
            add(ip, s, m)?;
            m.decref();
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::int::new_int;
    use crate::testutil::with_interp;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_membership_and_removal() {
        with_interp(|ip| {
            let s = new_set(ip).unwrap();
            let mut keys = Vec::new();
            for i in 0..50 {
                let k = new_int(ip, 2000 + i).unwrap();
                add(ip, s, k).unwrap();
                keys.push(k);
            }
            assert_eq!(setof(s).nels(), 50);
            for k in &keys {
                assert!(contains(ip, s, *k));
            }
            for k in keys.iter().take(25) {
                unassign(ip, s, *k).unwrap();
            }
            assert_eq!(setof(s).nels(), 25);
            for (i, k) in keys.iter().enumerate() {
                assert_eq!(contains(ip, s, *k), i >= 25);
            }
            for k in keys {
                k.decref();
            }
            s.decref();
        });
    }

    #[test]
    #[serial]
    fn test_truthy_assign_inserts_falsy_removes() {
        with_interp(|ip| {
            let s = new_set(ip).unwrap();
            let k = new_int(ip, 7).unwrap();
            let one = new_int(ip, 1).unwrap();
            let zero = new_int(ip, 0).unwrap();
            ip.assign(s, k, one).unwrap();
            assert!(contains(ip, s, k));
            ip.assign(s, k, zero).unwrap();
            assert!(!contains(ip, s, k));
            s.decref();
            k.decref();
            one.decref();
            zero.decref();
        });
    }

    #[test]
    #[serial]
    fn test_subset_relations() {
        with_interp(|ip| {
            let small = new_set(ip).unwrap();
            let big = new_set(ip).unwrap();
            for i in 0..3 {
                let k = new_int(ip, i).unwrap();
                add(ip, small, k).unwrap();
                add(ip, big, k).unwrap();
                k.decref();
            }
            let extra = new_int(ip, 99).unwrap();
            add(ip, big, extra).unwrap();
            extra.decref();
            assert!(set_issubset(ip, small, big));
            assert!(set_ispropersubset(ip, small, big));
            assert!(!set_issubset(ip, big, small));
            assert!(!set_ispropersubset(ip, small, small));
            assert!(set_issubset(ip, small, small));
            small.decref();
            big.decref();
        });
    }
}

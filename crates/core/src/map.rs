//! Maps ("structs"): open-addressed hash tables from object keys to
//! object values, with an optional `super` link to a parent map.
//!
//! Fetch walks the super chain; plain assign stores in the base map.
//! The chain-walking assignment used for variable resolution is the
//! separate `assign_super` entry point, so `m.k = v` on a map whose
//! parent binds `k` shadows the parent rather than updating it.
//!
//! Keys are stored as-is and hashed by value: mutating an object while
//! it is a key leaves it unfindable. Use atoms as keys.

use crate::array::{new_array, push};
use crate::err::{set_error, Res};
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_MARK, O_SUPER, TC_MAP};

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Slot {
    pub key: *mut Object,
    pub value: *mut Object,
}

#[repr(C)]
pub struct MapObj {
    pub header: Object,
    /// Parent scope, or null. The O_SUPER header flag mirrors this.
    super_: *mut Object,
    /// Occupied slots.
    nels: usize,
    /// Total slots; a power of two.
    nslots: usize,
    slots: *mut Slot,
}

const INITIAL_SLOTS: usize = 8;
const MAP_PRIME: u64 = 0x0007_3D1F_0F4B;

#[inline(always)]
pub fn mapof<'a>(o: Obj) -> &'a MapObj {
    debug_assert_eq!(o.tcode(), TC_MAP);
    unsafe { &*(o.ptr() as *const MapObj) }
}

#[inline(always)]
pub fn mapof_mut<'a>(o: Obj) -> &'a mut MapObj {
    debug_assert_eq!(o.tcode(), TC_MAP);
    unsafe { &mut *(o.ptr() as *mut MapObj) }
}

impl MapObj {
    #[inline(always)]
    pub fn nels(&self) -> usize {
        self.nels
    }

    /// The parent map, if any.
    #[inline(always)]
    pub fn super_map(&self) -> Option<Obj> {
        if self.super_.is_null() {
            None
        } else {
            Some(unsafe { Obj::from_raw(self.super_) })
        }
    }

    #[inline(always)]
    fn slot(&self, i: usize) -> &Slot {
        unsafe { &*self.slots.add(i) }
    }

    #[inline(always)]
    fn slot_mut(&mut self, i: usize) -> &mut Slot {
        unsafe { &mut *self.slots.add(i) }
    }

    /// Iterate occupied slots as (key, value) pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (Obj, Obj)> + '_ {
        (0..self.nslots).filter_map(move |i| {
            let s = self.slot(i);
            if s.key.is_null() {
                None
            } else {
                Some(unsafe { (Obj::from_raw(s.key), Obj::from_raw(s.value)) })
            }
        })
    }
}

/// Set or clear a map's super link.
pub fn set_super(_ip: &mut Interp, m: Obj, sup: Option<Obj>) -> Res {
    if m.is_atom() {
        return set_error("attempt to set the super of an atomic map");
    }
    mapof_mut(m).super_ = sup.map_or(std::ptr::null_mut(), |s| s.ptr());
    if sup.is_some() {
        m.set_flag(O_SUPER);
    } else {
        m.clear_flag(O_SUPER);
    }
    Ok(())
}

/// A new empty map with no super, reference hint bumped.
pub fn new_map(ip: &mut Interp) -> Res<Obj> {
    let p: *mut MapObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_MAP, 0, 1, 0);
    unsafe {
        (*p).super_ = std::ptr::null_mut();
        (*p).nels = 0;
        (*p).nslots = 0;
        (*p).slots = std::ptr::null_mut();
    }
    ip.rego(o);
    let slots = ip.nalloc(INITIAL_SLOTS * std::mem::size_of::<Slot>())? as *mut Slot;
    unsafe { std::ptr::write_bytes(slots as *mut u8, 0, INITIAL_SLOTS * std::mem::size_of::<Slot>()) };
    let m = mapof_mut(o);
    m.nslots = INITIAL_SLOTS;
    m.slots = slots;
    Ok(o)
}

/// A new empty map whose super is `sup`.
pub fn new_map_with_super(ip: &mut Interp, sup: Obj) -> Res<Obj> {
    let m = new_map(ip)?;
    set_super(ip, m, Some(sup))?;
    Ok(m)
}

/// Find the slot index holding `k`, or the empty slot where it would
/// be inserted. Probes downward with wrap, like the atom table.
fn find_slot(ip: &Interp, m: &MapObj, k: Obj) -> usize {
    let mask = m.nslots - 1;
    let mut i = (ip.obj_hash(k) as usize) & mask;
    loop {
        let s = m.slot(i);
        if s.key.is_null() {
            return i;
        }
        let key = unsafe { Obj::from_raw(s.key) };
        if ip.obj_eq(key, k) {
            return i;
        }
        i = i.wrapping_sub(1) & mask;
    }
}

/// Look `k` up in `m` alone (no chain). Returns a borrowed value.
pub fn lookup_base(ip: &Interp, m: Obj, k: Obj) -> Option<Obj> {
    let mm = mapof(m);
    let i = find_slot(ip, mm, k);
    let s = mm.slot(i);
    if s.key.is_null() {
        None
    } else {
        Some(unsafe { Obj::from_raw(s.value) })
    }
}

/// Look `k` up through the super chain. Returns a borrowed value.
pub fn lookup_chain(ip: &Interp, m: Obj, k: Obj) -> Option<Obj> {
    let mut cur = m;
    loop {
        if cur.tcode() == TC_MAP {
            if let Some(v) = lookup_base(ip, cur, k) {
                return Some(v);
            }
            match mapof(cur).super_map() {
                Some(s) => cur = s,
                None => return None,
            }
        } else {
            return None;
        }
    }
}

fn grow(ip: &mut Interp, m: Obj) -> Res {
    let (old_slots, old_nslots) = {
        let mm = mapof(m);
        (mm.slots, mm.nslots)
    };
    let new_nslots = old_nslots * 2;
    let slots = ip.nalloc(new_nslots * std::mem::size_of::<Slot>())? as *mut Slot;
    unsafe { std::ptr::write_bytes(slots as *mut u8, 0, new_nslots * std::mem::size_of::<Slot>()) };
    {
        let mm = mapof_mut(m);
        mm.slots = slots;
        mm.nslots = new_nslots;
        // Reinsert from the old table.
        for i in 0..old_nslots {
            let s = unsafe { *old_slots.add(i) };
            if !s.key.is_null() {
                let k = unsafe { Obj::from_raw(s.key) };
                let j = find_slot(ip, mapof(m), k);
                *mapof_mut(m).slot_mut(j) = s;
            }
        }
    }
    ip.nfree(old_slots as *mut u8, old_nslots * std::mem::size_of::<Slot>());
    Ok(())
}

/// Store `k -> v` in the base map. Both stay rooted by the caller
/// across the possible grow.
pub fn assign_base(ip: &mut Interp, m: Obj, k: Obj, v: Obj) -> Res {
    if m.is_atom() {
        return set_error("attempt to assign to an atomic map");
    }
    if mapof(m).nels * 3 > mapof(m).nslots * 2 {
        grow(ip, m)?;
    }
    let i = find_slot(ip, mapof(m), k);
    let mm = mapof_mut(m);
    let s = mm.slot_mut(i);
    if s.key.is_null() {
        s.key = k.ptr();
        s.value = v.ptr();
        mm.nels += 1;
    } else {
        s.value = v.ptr();
    }
    Ok(())
}

/// Remove `k` from the base map, closing the probe cluster.
pub fn unassign(ip: &mut Interp, m: Obj, k: Obj) -> Res {
    if m.is_atom() {
        return set_error("attempt to unassign from an atomic map");
    }
    let mm = mapof_mut(m);
    let mask = mm.nslots - 1;
    let i = find_slot(ip, mm, k);
    if mm.slot(i).key.is_null() {
        return Ok(());
    }
    *mm.slot_mut(i) = Slot {
        key: std::ptr::null_mut(),
        value: std::ptr::null_mut(),
    };
    mm.nels -= 1;

    // Backshift along the downward probe direction.
    let mut hole = i;
    let mut t = i.wrapping_sub(1) & mask;
    while !mm.slot(t).key.is_null() {
        let e = unsafe { Obj::from_raw(mm.slot(t).key) };
        let home = (ip.obj_hash(e) as usize) & mask;
        let d_hole = home.wrapping_sub(hole) & mask;
        let d_t = home.wrapping_sub(t) & mask;
        if d_hole < d_t {
            *mm.slot_mut(hole) = *mm.slot(t);
            *mm.slot_mut(t) = Slot {
                key: std::ptr::null_mut(),
                value: std::ptr::null_mut(),
            };
            hole = t;
        }
        t = t.wrapping_sub(1) & mask;
    }
    Ok(())
}

pub struct MapType;

impl ObjType for MapType {
    fn name(&self) -> &'static str {
        "map"
    }

    fn mark(&self, ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        let m = mapof(o);
        let mut z = std::mem::size_of::<MapObj>() + m.nslots * std::mem::size_of::<Slot>();
        for (k, v) in m.pairs() {
            z += crate::gc::mark_obj(ip, k);
            z += crate::gc::mark_obj(ip, v);
        }
        if let Some(s) = m.super_map() {
            z += crate::gc::mark_obj(ip, s);
        }
        z
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        let (slots, nslots) = {
            let m = mapof(o);
            (m.slots, m.nslots)
        };
        if !slots.is_null() {
            ip.nfree(slots as *mut u8, nslots * std::mem::size_of::<Slot>());
        }
        ip.tfree::<MapObj>(o.cast());
    }

    fn hash(&self, ip: &Interp, o: Obj) -> u64 {
        // Order-independent, so equal maps hash equal regardless of
        // slot layout.
        let m = mapof(o);
        let mut h = MAP_PRIME.wrapping_mul(m.nels as u64 + 1);
        for (k, v) in m.pairs() {
            h = h.wrapping_add(ip.obj_hash(k) ^ ip.obj_hash(v).rotate_left(17));
        }
        h
    }

    fn eq(&self, ip: &Interp, a: Obj, b: Obj) -> bool {
        let (ma, mb) = (mapof(a), mapof(b));
        if ma.nels != mb.nels || ma.super_ != mb.super_ {
            return false;
        }
        for (k, v) in ma.pairs() {
            match lookup_base(ip, b, k) {
                Some(w) if ip.obj_eq(v, w) => {}
                _ => return false,
            }
        }
        true
    }

    fn copy(&self, ip: &mut Interp, o: Obj) -> Res<Obj> {
        let c = new_map(ip)?;
        if let Some(s) = mapof(o).super_map() {
            set_super(ip, c, Some(s))?;
        }
        let n = mapof(o).nslots;
        for i in 0..n {
            let s = *mapof(o).slot(i);
            if !s.key.is_null() {
                let (k, v) = unsafe { (Obj::from_raw(s.key), Obj::from_raw(s.value)) };
                assign_base(ip, c, k, v)?;
            }
        }
        Ok(c)
    }

    fn fetch(&self, ip: &mut Interp, o: Obj, k: Obj) -> Res<Obj> {
        match lookup_chain(ip, o, k) {
            Some(v) => {
                v.incref();
                Ok(v)
            }
            None => {
                ip.o_null.incref();
                Ok(ip.o_null)
            }
        }
    }

    fn assign(&self, ip: &mut Interp, o: Obj, k: Obj, v: Obj) -> Res {
        assign_base(ip, o, k, v)
    }

    fn assign_base(&self, ip: &mut Interp, o: Obj, k: Obj, v: Obj) -> Res {
        assign_base(ip, o, k, v)
    }

    fn assign_super(&self, ip: &mut Interp, o: Obj, k: Obj, v: Obj) -> Res<bool> {
        let mut cur = o;
        loop {
            if cur.tcode() != TC_MAP {
                return Ok(false);
            }
            if !cur.is_atom() && lookup_base(ip, cur, k).is_some() {
                assign_base(ip, cur, k, v)?;
                return Ok(true);
            }
            match mapof(cur).super_map() {
                Some(s) => cur = s,
                None => return Ok(false),
            }
        }
    }

    fn fetch_super(&self, ip: &mut Interp, o: Obj, k: Obj) -> Res<Option<Obj>> {
        Ok(lookup_chain(ip, o, k))
    }

    fn len(&self, _ip: &Interp, o: Obj) -> Res<usize> {
        Ok(mapof(o).nels)
    }

    fn keys(&self, ip: &mut Interp, o: Obj) -> Res<Obj> {
        let ks = new_array(ip, mapof(o).nels)?;
        let n = mapof(o).nslots;
        for i in 0..n {
            let key = mapof(o).slot(i).key;
            if !key.is_null() {
                push(ip, ks, unsafe { Obj::from_raw(key) })?;
            }
        }
        Ok(ks)
    }

    fn save(&self, ip: &mut Interp, ar: &mut dyn crate::archiver::Archiver, o: Obj) -> Res {
        // The super link is not transmitted; scope chains are
        // per-process state.
        ar.write_i64(mapof(o).nels as i64)?;
        let n = mapof(o).nslots;
        for i in 0..n {
            let s = *mapof(o).slot(i);
            if !s.key.is_null() {
                let (k, v) = unsafe { (Obj::from_raw(s.key), Obj::from_raw(s.value)) };
                crate::archiver::save_obj(ip, ar, k)?;
                crate::archiver::save_obj(ip, ar, v)?;
            }
        }
        Ok(())
    }

    fn restore(&self, ip: &mut Interp, ar: &mut dyn crate::archiver::Archiver) -> Res<Obj> {
        let nels = ar.read_i64()? as usize;
        let m = new_map(ip)?;
        for _ in 0..nels {
            let k = crate::archiver::restore_obj(ip, ar)?;
            let v = crate::archiver::restore_obj(ip, ar);
            let v = match v {
                Ok(v) => v,
                Err(e) => {
                    k.decref();
                    m.decref();
                    return Err(e);
                }
            };
            assign_base(ip, m, k, v)?;
            k.decref();
            v.decref();
        }
        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::int::{intof, new_int};
    use crate::string::new_str;
    use crate::testutil::with_interp;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_assign_then_fetch_roundtrip() {
        with_interp(|ip| {
            let m = new_map(ip).unwrap();
            let k = new_str(ip, b"k").unwrap();
            let v = new_int(ip, 42).unwrap();
            ip.assign(m, k, v).unwrap();
            let got = ip.fetch(m, k).unwrap();
            assert_eq!(got, v);
            got.decref();
            m.decref();
            k.decref();
            v.decref();
        });
    }

    #[test]
    #[serial]
    fn test_many_keys_survive_growth() {
        with_interp(|ip| {
            let m = new_map(ip).unwrap();
            for i in 0..200 {
                let k = new_str(ip, format!("key{i}").as_bytes()).unwrap();
                let v = new_int(ip, i).unwrap();
                assign_base(ip, m, k, v).unwrap();
                k.decref();
                v.decref();
            }
            assert_eq!(mapof(m).nels(), 200);
            for i in 0..200 {
                let k = new_str(ip, format!("key{i}").as_bytes()).unwrap();
                let v = lookup_base(ip, m, k).unwrap();
                assert_eq!(intof(v).value, i);
                k.decref();
            }
            m.decref();
        });
    }

    #[test]
    #[serial]
    fn test_fetch_walks_super_chain_but_assign_shadows() {
        with_interp(|ip| {
            let parent = new_map(ip).unwrap();
            let child = new_map(ip).unwrap();
            set_super(ip, child, Some(parent)).unwrap();
            let y = new_str(ip, b"y").unwrap();
            let two = new_int(ip, 2).unwrap();
            assign_base(ip, parent, y, two).unwrap();

            // Fetch sees the parent's binding through the chain.
            let got = ip.fetch(child, y).unwrap();
            assert_eq!(intof(got).value, 2);
            got.decref();

            // Plain assign stores at base level; the parent keeps 2.
            let twenty = new_int(ip, 20).unwrap();
            ip.assign(child, y, twenty).unwrap();
            let child_v = ip.fetch(child, y).unwrap();
            let parent_v = ip.fetch(parent, y).unwrap();
            assert_eq!(intof(child_v).value, 20);
            assert_eq!(intof(parent_v).value, 2);

            child_v.decref();
            parent_v.decref();
            twenty.decref();
            two.decref();
            y.decref();
            child.decref();
            parent.decref();
        });
    }

    #[test]
    #[serial]
    fn test_assign_super_updates_existing_binding() {
        with_interp(|ip| {
            let parent = new_map(ip).unwrap();
            let child = new_map(ip).unwrap();
            set_super(ip, child, Some(parent)).unwrap();
            let x = new_str(ip, b"x").unwrap();
            let one = new_int(ip, 1).unwrap();
            assign_base(ip, parent, x, one).unwrap();

            let t = ip.type_of(child);
            let nine = new_int(ip, 9).unwrap();
            assert!(t.assign_super(ip, child, x, nine).unwrap());
            // Bound in the parent, not shadowed in the child.
            assert!(lookup_base(ip, child, x).is_none());
            assert_eq!(intof(lookup_base(ip, parent, x).unwrap()).value, 9);

            nine.decref();
            one.decref();
            x.decref();
            child.decref();
            parent.decref();
        });
    }

    #[test]
    #[serial]
    fn test_unassign_closes_probe_clusters() {
        with_interp(|ip| {
            let m = new_map(ip).unwrap();
            let mut keys = Vec::new();
            for i in 0..40 {
                let k = new_int(ip, 1000 + i).unwrap();
                let v = new_int(ip, i).unwrap();
                assign_base(ip, m, k, v).unwrap();
                keys.push(k);
                v.decref();
            }
            for (i, k) in keys.iter().enumerate() {
                if i % 2 == 0 {
                    unassign(ip, m, *k).unwrap();
                }
            }
            assert_eq!(mapof(m).nels(), 20);
            for (i, k) in keys.iter().enumerate() {
                let found = lookup_base(ip, m, *k);
                if i % 2 == 0 {
                    assert!(found.is_none());
                } else {
                    assert_eq!(intof(found.unwrap()).value, i as i64);
                }
            }
            for k in keys {
                k.decref();
            }
            m.decref();
        });
    }

    #[test]
    #[serial]
    fn test_atomic_map_rejects_assignment() {
        with_interp(|ip| {
            let m = new_map(ip).unwrap();
            let k = new_str(ip, b"frozen").unwrap();
            let v = new_int(ip, 1).unwrap();
            assign_base(ip, m, k, v).unwrap();
            let a = ip.atom(m, true).unwrap();
            assert!(a.is_atom());
            assert!(assign_base(ip, a, k, v).is_err());
            marl_err_reset();
            a.decref();
            k.decref();
            v.decref();
        });
    }

    fn marl_err_reset() {
        crate::err::clear_error();
    }
}

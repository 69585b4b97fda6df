//! The atom table: interning for immutable objects.
//!
//! An open-addressed hash table mapping a value to the one canonical
//! object with that value, keyed by each type's `hash` and resolved by
//! its `eq`. Probing runs *downward* through the table with
//! wrap-around. Equal atoms of the same type are therefore always the
//! same object, and atom equality is pointer equality.
//!
//! The table is weak with respect to the collector: marking does not
//! traverse it, and the sweep removes entries for atoms that proved
//! unreachable (see `gc.rs`). While an atom is reachable it stays in
//! the table; invariant: every atomic object is either in the table or
//! garbage.

use crate::err::Res;
use crate::interp::Interp;
use crate::object::{Obj, O_ATOM};
use tracing::trace;

/// Initial slot count; must be a power of two.
const INITIAL_SLOTS: usize = 512;

/// Pointer hash used for identity-keyed types and internal addressing.
/// Never the raw pointer: the low bits of an allocator address carry
/// almost no entropy.
#[inline(always)]
pub fn ptr_hash(p: usize) -> u64 {
    (((p >> 4) as u64).wrapping_mul(31)) ^ (((p >> 12) as u64).wrapping_mul(17))
}

/// Atom table storage. All behaviour lives in methods on [`Interp`]
/// because probing hashes through type dispatch.
pub struct AtomTable {
    pub(crate) slots: Vec<Option<Obj>>,
    pub(crate) natoms: usize,
}

impl AtomTable {
    pub fn new() -> AtomTable {
        AtomTable {
            slots: vec![None; INITIAL_SLOTS],
            natoms: 0,
        }
    }

    /// Number of interned atoms.
    pub fn len(&self) -> usize {
        self.natoms
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.natoms == 0
    }

    #[inline(always)]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    /// The slot below `i`, wrapping at zero.
    #[inline(always)]
    fn below(&self, i: usize) -> usize {
        i.wrapping_sub(1) & self.mask()
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        AtomTable::new()
    }
}

impl Interp {
    /// Find the atom equal to a prospective value without inserting
    /// anything. `h` is the value's hash and `pred` its equality test;
    /// returns the atom if present together with the slot at which an
    /// insertion would go.
    ///
    /// The slot index stays valid only while the table cannot change:
    /// callers that go on to allocate must hold a GC pause, since a
    /// collection may delete atoms and reshuffle the table.
    pub fn atom_probe2(&self, h: u64, pred: impl Fn(&Interp, Obj) -> bool) -> (Option<Obj>, usize) {
        let mut i = (h as usize) & self.atoms.mask();
        loop {
            match self.atoms.slots[i] {
                None => return (None, i),
                Some(o) => {
                    if pred(self, o) {
                        return (Some(o), i);
                    }
                }
            }
            i = self.atoms.below(i);
        }
    }

    /// Find the canonical atom equal to `o`, if one is interned.
    pub fn atom_probe(&self, o: Obj) -> Option<Obj> {
        if o.is_atom() {
            return Some(o);
        }
        let h = self.obj_hash(o);
        let tc = o.tcode();
        let (found, _) = self.atom_probe2(h, |ip, e| e.tcode() == tc && ip.type_of(e).eq(ip, e, o));
        found
    }

    /// Return the canonical atom equivalent to `o`, interning `o`
    /// itself if no equal atom exists yet. The returned object carries
    /// a fresh reference hint; if `lose` is set, `o`'s own reference
    /// is consumed (so a typical prototype is simply discarded when an
    /// equivalent atom already existed).
    pub fn atom(&mut self, o: Obj, lose: bool) -> Res<Obj> {
        if o.is_atom() {
            if !lose {
                o.incref();
            }
            return Ok(o);
        }
        let h = self.obj_hash(o);
        let tc = o.tcode();
        let (found, slot) =
            self.atom_probe2(h, |ip, e| e.tcode() == tc && ip.type_of(e).eq(ip, e, o));
        if let Some(a) = found {
            a.incref();
            if lose {
                o.decref();
            }
            return Ok(a);
        }
        o.set_flag(O_ATOM);
        self.store_atom_and_count(slot, o);
        if !lose {
            o.incref();
        }
        Ok(o)
    }

    /// Store a new atom at a slot previously obtained from
    /// `atom_probe2` and grow the table if occupancy demands it.
    /// The object must already have `O_ATOM` set by the caller's
    /// construction protocol, or be given it here.
    pub fn store_atom_and_count(&mut self, slot: usize, o: Obj) {
        debug_assert!(self.atoms.slots[slot].is_none());
        o.set_flag(O_ATOM);
        self.atoms.slots[slot] = Some(o);
        self.atoms.natoms += 1;
        // Keep occupancy strictly below 2/3.
        if self.atoms.natoms * 3 > self.atoms.slots.len() * 2 {
            self.grow_atoms(self.atoms.slots.len() * 2);
        }
    }

    #[cfg(test)]
    pub(crate) fn atoms_of_type(&self, tcode: u8) -> usize {
        self.atoms
            .slots
            .iter()
            .flatten()
            .filter(|o| o.tcode() == tcode)
            .count()
    }

    /// Rebuild the table with `newz` slots (a power of two).
    pub fn grow_atoms(&mut self, newz: usize) {
        debug_assert!(newz.is_power_of_two() && newz >= self.atoms.natoms * 2);
        trace!(from = self.atoms.slots.len(), to = newz, "growing atom table");
        let old = std::mem::replace(&mut self.atoms.slots, vec![None; newz]);
        for o in old.into_iter().flatten() {
            let h = self.obj_hash(o);
            let mut i = (h as usize) & self.atoms.mask();
            while self.atoms.slots[i].is_some() {
                i = self.atoms.below(i);
            }
            self.atoms.slots[i] = Some(o);
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::int::{intof, new_int};
    use crate::object::TC_STRING;
    use crate::string::{new_str, strof};
    use crate::testutil::with_interp;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_equal_atoms_are_pointer_equal() {
        with_interp(|ip| {
            let a = new_int(ip, 987654321).unwrap();
            let b = new_int(ip, 987654321).unwrap();
            assert_eq!(a, b);
            assert_eq!(intof(a).value, 987654321);

            let s1 = new_str(ip, b"atom table test").unwrap();
            let s2 = new_str(ip, b"atom table test").unwrap();
            assert_eq!(s1, s2);
            a.decref();
            b.decref();
            s1.decref();
            s2.decref();
        });
    }

    #[test]
    #[serial]
    fn test_equal_atoms_hash_equal() {
        with_interp(|ip| {
            let s1 = new_str(ip, b"hash me").unwrap();
            let f1 = crate::float::new_float(ip, 2.5).unwrap();
            let f2 = crate::float::new_float(ip, 2.5).unwrap();
            assert_eq!(ip.obj_hash(f1), ip.obj_hash(f2));
            assert_eq!(f1, f2);
            assert_eq!(ip.obj_hash(s1), crate::string::str_hash(b"hash me"));
            s1.decref();
            f1.decref();
            f2.decref();
        });
    }

    #[test]
    #[serial]
    fn test_atom_is_idempotent() {
        with_interp(|ip| {
            let buf = crate::string::new_str_buf(ip, 8).unwrap();
            crate::string::str_append(ip, buf, b"xyzzy").unwrap();
            // A copy interned twice lands on the same canonical atom.
            let c1 = {
                let t = ip.type_of(buf);
                t.copy(ip, buf).unwrap()
            };
            let a1 = ip.atom(c1, true).unwrap();
            let a2 = ip.atom(a1, true).unwrap();
            assert_eq!(a1, a2);
            assert!(a1.is_atom());
            assert_eq!(strof(a1).bytes(), b"xyzzy");
            a2.decref();
            buf.decref();
        });
    }

    #[test]
    #[serial]
    fn test_atom_probe_does_not_insert() {
        with_interp(|ip| {
            let before = ip.atoms.len();
            let buf = crate::string::new_str_buf(ip, 8).unwrap();
            crate::string::str_append(ip, buf, b"never interned").unwrap();
            assert!(ip.atom_probe(buf).is_none());
            assert_eq!(ip.atoms.len(), before);
            buf.decref();
        });
    }

    #[test]
    #[serial]
    fn test_dropped_atoms_leave_the_table_on_collection() {
        with_interp(|ip| {
            // A thousand distinct strings, all interned.
            let mut held = Vec::new();
            for i in 0..1000 {
                let text = format!("s{i}");
                held.push(new_str(ip, text.as_bytes()).unwrap());
            }
            let with_strings = ip.atoms_of_type(TC_STRING);
            ip.reclaim();
            // Still referenced: all survive the collection.
            assert_eq!(ip.atoms_of_type(TC_STRING), with_strings);

            for s in held.drain(..) {
                s.decref();
            }
            ip.reclaim();
            let after = ip.atoms_of_type(TC_STRING);
            assert_eq!(with_strings - after, 1000);
        });
    }
}

//! Stop-the-world, precise, mark-and-sweep collection.
//!
//! Roots are the execution records (each marks its three stacks, its
//! scope and its current source marker) and every object whose
//! reference-count hint is non-zero; the latter is what keeps a value
//! alive between its factory returning it and the caller parking it
//! somewhere reachable. The atom table is weak: it is not marked, and
//! entries whose objects did not survive are pruned before the sweep
//! frees anything.
//!
//! The sweep compacts the object registry in place, moving survivors
//! down over the slots of the freed, and finishes by recomputing the
//! allocator's trigger to roughly twice the surviving set.

use crate::interp::Interp;
use crate::object::{Obj, O_MARK};
use tracing::debug;

/// Floor added to the recomputed collection trigger so tiny heaps do
/// not collect constantly.
const SMALL_FLOOR: usize = 32 * 1024;

/// Mark `o` and everything reachable from it; returns the bytes newly
/// marked. Re-entry (already marked) contributes nothing, which is
/// what terminates cycles. Objects with a non-zero `leafz` are marked
/// without a dispatch.
pub fn mark_obj(ip: &Interp, o: Obj) -> usize {
    if o.is_marked() {
        return 0;
    }
    let lz = o.leafz();
    if lz != 0 {
        o.set_flag(O_MARK);
        return lz as usize;
    }
    ip.type_of(o).mark(ip, o)
}

impl Interp {
    /// Run a collection, unless one is currently inhibited — in which
    /// case only the trigger is raised so the caller's allocation can
    /// proceed.
    ///
    /// Safe to call at any allocation point: every object is on the
    /// registry from the instant it is allocated, and in-progress
    /// constructions either pin their pieces or hold a GC pause.
    pub fn collect(&mut self) {
        if self.supress_collect > 0 {
            self.heap.limit = self.heap.mem * 2 + SMALL_FLOOR;
            return;
        }

        let before = self.objs.len();

        // Mark phase. Exec records root the world of running code;
        // pinned objects (nrefs > 0) root natively-held temporaries,
        // the singletons, and the base scope.
        let mut marked_bytes = 0usize;
        for i in 0..self.execs.len() {
            let ex = self.execs[i];
            marked_bytes += mark_obj(self, ex);
        }
        for i in 0..self.objs.len() {
            let o = self.objs[i];
            if o.nrefs() > 0 {
                marked_bytes += mark_obj(self, o);
            }
        }

        // Prune atoms that did not survive, before anything is freed,
        // so table maintenance never hashes through dead objects.
        let dead_atoms = self
            .atoms
            .slots
            .iter()
            .flatten()
            .any(|o| !o.is_marked());
        if dead_atoms {
            let nslots = self.atoms.slots.len();
            let old = std::mem::replace(&mut self.atoms.slots, vec![None; nslots]);
            self.atoms.natoms = 0;
            for o in old.into_iter().flatten() {
                if o.is_marked() {
                    let h = self.obj_hash(o);
                    let mask = nslots - 1;
                    let mut i = (h as usize) & mask;
                    while self.atoms.slots[i].is_some() {
                        i = i.wrapping_sub(1) & mask;
                    }
                    self.atoms.slots[i] = Some(o);
                    self.atoms.natoms += 1;
                }
            }
        }

        // Sweep: free the unmarked, clear the mark on the rest, and
        // compact the registry over the holes.
        let mut kept = 0usize;
        for i in 0..self.objs.len() {
            let o = self.objs[i];
            if o.is_marked() {
                o.clear_flag(O_MARK);
                self.objs[kept] = o;
                kept += 1;
            } else {
                let t = self.type_of(o);
                // Safety: o is unreachable; nothing can use it again.
                unsafe { t.free(self, o) };
            }
        }
        self.objs.truncate(kept);

        self.heap.limit = self.heap.mem * 2 + SMALL_FLOOR;
        self.ncollects += 1;
        debug!(
            ncollects = self.ncollects,
            swept = before - kept,
            kept,
            marked_bytes,
            mem = self.heap.mem,
            new_limit = self.heap.limit,
            "collection"
        );
    }

    /// Force a full collection now, regardless of allocator pressure.
    /// (Still a no-op under an active GC pause.)
    pub fn reclaim(&mut self) {
        self.heap.limit = 0;
        self.collect();
    }
}

#[cfg(test)]
mod tests {
    use crate::array::{arrayof, new_array, push};
    use crate::int::new_int;
    use crate::map::{assign_base, new_map};
    use crate::string::new_str_buf;
    use crate::testutil::with_interp;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_registered_objects_are_discoverable() {
        with_interp(|ip| {
            let a = new_array(ip, 0).unwrap();
            assert!(ip.objs.contains(&a));
            a.decref();
        });
    }

    #[test]
    #[serial]
    fn test_no_mark_flags_survive_a_collection() {
        with_interp(|ip| {
            let m = new_map(ip).unwrap();
            ip.reclaim();
            for o in ip.objs.iter() {
                assert!(!o.is_marked());
            }
            m.decref();
        });
    }

    #[test]
    #[serial]
    fn test_unreachable_objects_are_reclaimed() {
        with_interp(|ip| {
            ip.reclaim();
            let baseline = ip.objs.len();
            let mut garbage = Vec::new();
            for _ in 0..100 {
                garbage.push(new_str_buf(ip, 32).unwrap());
            }
            ip.reclaim();
            // All pinned: everything survives.
            assert_eq!(ip.objs.len(), baseline + 100);
            for g in garbage.drain(..) {
                g.decref();
            }
            ip.reclaim();
            assert_eq!(ip.objs.len(), baseline);
        });
    }

    #[test]
    #[serial]
    fn test_cycles_are_collected() {
        with_interp(|ip| {
            ip.reclaim();
            let baseline = ip.objs.len();
            // A map and an array that own each other.
            let m = new_map(ip).unwrap();
            let a = new_array(ip, 0).unwrap();
            push(ip, a, m).unwrap();
            let k = new_int(ip, 0).unwrap();
            assign_base(ip, m, k, a).unwrap();
            k.decref();
            m.decref();
            a.decref();
            ip.reclaim();
            assert_eq!(ip.objs.len(), baseline);
        });
    }

    #[test]
    #[serial]
    fn test_reachable_cycles_survive() {
        with_interp(|ip| {
            let a = new_array(ip, 0).unwrap();
            push(ip, a, a).unwrap();
            ip.reclaim();
            assert_eq!(arrayof(a).len(), 1);
            assert_eq!(arrayof(a).get(0), a);
            a.decref();
            ip.reclaim();
        });
    }

    #[test]
    #[serial]
    fn test_gc_pause_inhibits_collection() {
        with_interp(|ip| {
            ip.reclaim();
            let n = ip.ncollects;
            {
                let _pause = ip.pause_gc();
                ip.reclaim();
            }
            assert_eq!(ip.ncollects, n);
            ip.reclaim();
            assert_eq!(ip.ncollects, n + 1);
        });
    }
}

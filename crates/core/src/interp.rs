//! The interpreter instance and the global interpreter lock.
//!
//! There is one `Interp` per process. It owns the allocator, the
//! object registry the collector sweeps, the atom table, the type
//! registry and the per-thread execution records. All of it is only
//! ever touched by the thread currently holding the GIL.
//!
//! ## Locking model
//!
//! `enter()` acquires the GIL and hands out the (unique) mutable view
//! of the interpreter; `leave()` releases it. Blocking operations
//! (channel get/put, blocking system calls) bracket themselves with
//! `leave`/`enter` or use `waitfor`/`wakeup`, which atomically release
//! the GIL, sleep until some thread signals the object being waited
//! on, and re-acquire before returning. Exactly one thread runs
//! interpreter code at any moment.

use crate::alloc::Alloc;
use crate::err::{set_error, Res};
use crate::object::{Obj, ObjType, MAX_TYPES};
use std::cell::{Cell, UnsafeCell};
use std::sync::atomic::AtomicBool;
use std::sync::{Condvar, Mutex, OnceLock};

/// Process-global "stop everything" flag, consulted by every VM at
/// back edges. Set from signal handlers or other threads.
pub static ABORTED: AtomicBool = AtomicBool::new(false);

/// Initial collection trigger; recomputed after every collection.
const INITIAL_MEM_LIMIT: usize = 64 * 1024;

thread_local! {
    /// The execution record of the current thread, set once the thread
    /// has entered the interpreter and created (or adopted) an exec.
    static CUR_EX: Cell<Option<Obj>> = const { Cell::new(None) };
}

/// The interpreter proper. One per process, behind the GIL.
pub struct Interp {
    /// Allocator state; see `alloc.rs`.
    pub heap: Alloc,
    /// The type registry: `types[tcode]` is the descriptor for that
    /// code. Index 0 is a reserved placeholder.
    types: Vec<&'static dyn ObjType>,
    /// The object registry: every live heap object, from the moment it
    /// is allocated until the sweep that frees it.
    pub objs: Vec<Obj>,
    /// The atom (interning) table.
    pub atoms: crate::atom::AtomTable,
    /// While non-zero, collection is inhibited. Manipulated only
    /// through [`Interp::pause_gc`].
    pub(crate) supress_collect: u32,
    /// Number of collections run so far.
    pub ncollects: u64,
    /// Execution records of all live threads; GC roots.
    pub execs: Vec<Obj>,
    /// Pre-allocated int singletons for values 0..=255.
    pub small_ints: Vec<Obj>,
    /// The NULL singleton.
    pub o_null: Obj,
    /// The stack-boundary mark singleton.
    pub o_mark: Obj,
    /// The outermost writable scope shared by every thread.
    pub base_scope: Obj,
    /// Map from signal number to script handler.
    pub sig_handlers: Obj,
    /// Strings the core itself needs to name things.
    pub sstr: crate::sstring::SStrings,
}

// Safety: Interp is only ever accessed by the thread holding the GIL;
// the raw object pointers it contains never cross threads unlocked.
unsafe impl Send for Interp {}

impl Interp {
    /// Construct and bootstrap the interpreter: allocator, empty
    /// registries, the built-in types in their fixed order, the
    /// singletons, the small-int cache and the base scope.
    pub(crate) fn boot() -> Res<Interp> {
        let mut ip = Interp {
            heap: Alloc::new(INITIAL_MEM_LIMIT),
            types: Vec::with_capacity(MAX_TYPES),
            objs: Vec::with_capacity(1024),
            atoms: crate::atom::AtomTable::new(),
            supress_collect: 0,
            ncollects: 0,
            execs: Vec::new(),
            small_ints: Vec::new(),
            o_null: Obj::dangling(),
            o_mark: Obj::dangling(),
            base_scope: Obj::dangling(),
            sig_handlers: Obj::dangling(),
            sstr: crate::sstring::SStrings::dangling(),
        };
        crate::types::register_builtin_types(&mut ip)?;
        ip.o_null = crate::null::boot_null(&mut ip)?;
        ip.o_mark = crate::markobj::boot_mark(&mut ip)?;
        crate::int::boot_small_ints(&mut ip)?;
        ip.sstr = crate::sstring::SStrings::boot(&mut ip)?;
        ip.base_scope = crate::map::new_map(&mut ip)?;
        ip.sig_handlers = crate::map::new_map(&mut ip)?;
        Ok(ip)
    }

    /// The descriptor for an object's type.
    #[inline(always)]
    pub fn type_of(&self, o: Obj) -> &'static dyn ObjType {
        self.types[o.tcode() as usize]
    }

    /// The descriptor for a raw type code.
    #[inline(always)]
    pub fn type_of_code(&self, tcode: u8) -> &'static dyn ObjType {
        self.types[tcode as usize]
    }

    /// Name of an object's type, for diagnostics.
    pub fn type_name(&self, o: Obj) -> &'static str {
        self.type_of(o).name()
    }

    /// Register a type descriptor, returning its assigned tcode.
    /// Core types register at boot in a fixed order; loadable modules
    /// get whatever comes next.
    pub fn register_type(&mut self, t: &'static dyn ObjType) -> Res<u8> {
        if self.types.len() >= MAX_TYPES {
            return set_error("too many registered types");
        }
        let tcode = self.types.len() as u8;
        self.types.push(t);
        Ok(tcode)
    }

    /// Number of registered types.
    pub fn num_types(&self) -> usize {
        self.types.len()
    }

    /// Put a freshly allocated object on the registry. Every object
    /// must be registered before the next allocation can happen, or a
    /// collection could never find (and never free) it.
    #[inline(always)]
    pub fn rego(&mut self, o: Obj) {
        self.objs.push(o);
    }

    /// Inhibit collection until the returned guard drops. Used around
    /// multi-step constructions whose intermediate states would
    /// confuse the mark phase or invalidate a held atom-table slot.
    pub fn pause_gc(&mut self) -> GcPause {
        self.supress_collect += 1;
        GcPause(&mut self.supress_collect)
    }

    // --- Dispatch sugar -------------------------------------------------

    /// `o[k]`, through `o`'s type.
    pub fn fetch(&mut self, o: Obj, k: Obj) -> Res<Obj> {
        let t = self.type_of(o);
        t.fetch(self, o, k)
    }

    /// `o[k] = v`, through `o`'s type.
    pub fn assign(&mut self, o: Obj, k: Obj, v: Obj) -> Res {
        let t = self.type_of(o);
        t.assign(self, o, k, v)
    }

    /// Value equality through type dispatch; objects of different
    /// types are never equal (numeric cross-type comparison is the
    /// binary-operator path's business, not this one's).
    pub fn obj_eq(&self, a: Obj, b: Obj) -> bool {
        if a == b {
            return true;
        }
        if a.tcode() != b.tcode() {
            return false;
        }
        self.type_of(a).eq(self, a, b)
    }

    /// Value hash through type dispatch.
    pub fn obj_hash(&self, o: Obj) -> u64 {
        self.type_of(o).hash(self, o)
    }
}

/// Lexical guard inhibiting collection; see [`Interp::pause_gc`].
pub struct GcPause(*mut u32);

impl Drop for GcPause {
    fn drop(&mut self) {
        // Safety: the counter lives in the process-global Interp,
        // which outlives any guard, and the GIL serialises access.
        unsafe { *self.0 -= 1 }
    }
}

// --- The global interpreter lock ---------------------------------------

struct Global {
    interp: UnsafeCell<Interp>,
    /// true while some thread holds the GIL.
    locked: Mutex<bool>,
    /// Signalled when the GIL is released.
    gil_free: Condvar,
    /// Signalled by `wakeup`; waiters re-check their predicates.
    wait: Condvar,
}

// Safety: the UnsafeCell is only dereferenced by the thread that has
// set `locked` to true, which the mutex/condvar protocol serialises.
unsafe impl Sync for Global {}

static GLOBAL: OnceLock<Global> = OnceLock::new();

/// Bootstrap the process-wide interpreter. Must be called exactly once
/// before any `enter`. Subsequent calls fail.
pub fn init_interp() -> Res {
    let ip = Interp::boot()?;
    let g = Global {
        interp: UnsafeCell::new(ip),
        locked: Mutex::new(false),
        gil_free: Condvar::new(),
        wait: Condvar::new(),
    };
    if GLOBAL.set(g).is_err() {
        return set_error("interpreter already initialised");
    }
    Ok(())
}

/// Has `init_interp` run?
pub fn is_initialised() -> bool {
    GLOBAL.get().is_some()
}

fn global() -> &'static Global {
    GLOBAL.get().expect("interpreter not initialised")
}

/// Acquire the GIL and return the interpreter. The returned reference
/// is exclusive until the matching [`leave`].
///
/// Not re-entrant: a thread that already holds the GIL must not call
/// `enter` again.
pub fn enter() -> &'static mut Interp {
    let g = global();
    let mut locked = g.locked.lock().expect("GIL mutex poisoned");
    while *locked {
        locked = g.gil_free.wait(locked).expect("GIL mutex poisoned");
    }
    *locked = true;
    // Safety: we hold the GIL; no other thread can be inside.
    unsafe { &mut *g.interp.get() }
}

/// Release the GIL. The `&mut Interp` obtained from `enter` must not
/// be used again until the next `enter`.
pub fn leave() {
    let g = global();
    let mut locked = g.locked.lock().expect("GIL mutex poisoned");
    debug_assert!(*locked);
    *locked = false;
    drop(locked);
    g.gil_free.notify_one();
}

/// Atomically release the GIL, sleep until some thread calls
/// [`wakeup`], and re-acquire the GIL before returning.
///
/// Wakeups are not keyed: callers must loop, re-checking the condition
/// they are waiting for. `_o` names the object being waited on purely
/// as documentation of the rendezvous.
///
/// # Safety contract
/// While this call sleeps, other threads run interpreter code: any
/// `&mut Interp` held by the caller must be considered invalidated
/// across the call and re-derived state re-read after it.
pub fn waitfor(_o: Obj) {
    let g = global();
    let mut locked = g.locked.lock().expect("GIL mutex poisoned");
    debug_assert!(*locked);
    *locked = false;
    g.gil_free.notify_one();
    locked = g.wait.wait(locked).expect("GIL mutex poisoned");
    while *locked {
        locked = g.gil_free.wait(locked).expect("GIL mutex poisoned");
    }
    *locked = true;
}

/// Wake every thread blocked in [`waitfor`]. The GIL must be held.
pub fn wakeup(_o: Obj) {
    global().wait.notify_all();
}

/// The execution record of the current thread, if it has one.
pub fn cur_ex() -> Option<Obj> {
    CUR_EX.with(|c| c.get())
}

/// Install the execution record for the current thread.
pub fn set_cur_ex(ex: Option<Obj>) {
    CUR_EX.with(|c| c.set(ex));
}

//! The common object header and the type descriptor trait.
//!
//! Every heap value starts with a 4-byte [`Object`] header: a type
//! code indexing the process-wide type registry, a flag byte, a small
//! reference-count *hint*, and a leaf-size byte that lets the collector
//! mark reference-free objects without a dispatch. Payload structs are
//! `#[repr(C)]` with the header as their first field, so a pointer to
//! the payload is a pointer to the header and vice versa.
//!
//! ## Object layout
//!
//! ```text
//! ┌────────┬────────┬────────┬────────┬──────────────────────┐
//! │ tcode  │ flags  │ nrefs  │ leafz  │ payload ...          │
//! │ (1 B)  │ (1 B)  │ (1 B)  │ (1 B)  │ (type specific)      │
//! └────────┴────────┴────────┴────────┴──────────────────────┘
//! ```

use crate::archiver::Archiver;
use crate::err::{set_error, Res};
use crate::interp::Interp;
use std::ptr::NonNull;

/// Set during the mark phase of a collection; clear between cycles.
pub const O_MARK: u8 = 0x01;
/// The object is interned: immutable and canonical for its value.
pub const O_ATOM: u8 = 0x02;
/// The object has a parent-scope (`super`) link.
pub const O_SUPER: u8 = 0x04;
/// A lifecycle-ended handle or file.
pub const O_CLOSED: u8 = 0x08;
/// Reserved for each type's private use.
pub const O_USER1: u8 = 0x20;
pub const O_USER2: u8 = 0x40;
pub const O_USER3: u8 = 0x80;

// Type codes of the built-in types. These are stable: they are
// assigned in registration order at startup and transmissible values
// depend on them, so the list may grow but never reorder.
pub const TC_NONE: u8 = 0;
pub const TC_PC: u8 = 1;
pub const TC_SRC: u8 = 2;
pub const TC_PARSE: u8 = 3;
pub const TC_OP: u8 = 4;
pub const TC_STRING: u8 = 5;
pub const TC_CATCHER: u8 = 6;
pub const TC_FUNC: u8 = 7;
pub const TC_CFUNC: u8 = 8;
pub const TC_METHOD: u8 = 9;
pub const TC_MARK: u8 = 10;
pub const TC_NULL: u8 = 11;
pub const TC_INT: u8 = 12;
pub const TC_FLOAT: u8 = 13;
pub const TC_ARRAY: u8 = 14;
pub const TC_MAP: u8 = 15;
pub const TC_SET: u8 = 16;
pub const TC_EXEC: u8 = 17;
pub const TC_FILE: u8 = 18;
pub const TC_MEM: u8 = 19;
pub const TC_PTR: u8 = 20;
pub const TC_REGEXP: u8 = 21;
pub const TC_HANDLE: u8 = 22;
pub const TC_CHANNEL: u8 = 23;

/// First tcode available to dynamically registered types. Codes below
/// this are reserved for the core so they stay stable across builds.
pub const TC_MAX_CORE: u8 = 40;

/// Hard limit on the number of registered types (tcode is a u8, and
/// 0 is reserved).
pub const MAX_TYPES: usize = 128;

/// The header at the start of every heap object.
#[repr(C)]
pub struct Object {
    pub tcode: u8,
    pub flags: u8,
    pub nrefs: u8,
    pub leafz: u8,
}

/// A reference to a heap object: a non-null pointer to its header.
///
/// `Obj` is `Copy` and carries no lifetime; validity is the garbage
/// collector's business. All objects live until a collection proves
/// them unreachable from the roots, so holding an `Obj` that is also
/// reachable from a root (a VM stack, the atom table, a pinned
/// `nrefs`) is always sound. Holding one across an allocation without
/// a root is the classic way to lose it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Obj(NonNull<Object>);

impl Obj {
    /// Wrap a raw header pointer.
    ///
    /// # Safety
    /// `p` must point to a live, properly initialised object header.
    pub unsafe fn from_raw(p: *mut Object) -> Obj {
        Obj(NonNull::new_unchecked(p))
    }

    /// A placeholder reference used only while the interpreter is
    /// being bootstrapped. Dereferencing it is undefined behaviour.
    pub fn dangling() -> Obj {
        Obj(NonNull::dangling())
    }

    #[inline(always)]
    pub fn ptr(self) -> *mut Object {
        self.0.as_ptr()
    }

    /// The object's address, used for identity hashing and the
    /// wait/wakeup rendezvous.
    #[inline(always)]
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Reinterpret as a pointer to the concrete payload struct.
    ///
    /// # Safety
    /// The object's `tcode` must match `T`'s layout.
    #[inline(always)]
    pub unsafe fn cast<T>(self) -> *mut T {
        self.0.as_ptr() as *mut T
    }

    #[inline(always)]
    fn hdr(self) -> &'static Object {
        unsafe { &*self.0.as_ptr() }
    }

    #[inline(always)]
    fn hdr_mut(self) -> &'static mut Object {
        unsafe { &mut *self.0.as_ptr() }
    }

    #[inline(always)]
    pub fn tcode(self) -> u8 {
        self.hdr().tcode
    }

    #[inline(always)]
    pub fn flags(self) -> u8 {
        self.hdr().flags
    }

    #[inline(always)]
    pub fn has_flag(self, f: u8) -> bool {
        self.hdr().flags & f != 0
    }

    #[inline(always)]
    pub fn set_flag(self, f: u8) {
        self.hdr_mut().flags |= f;
    }

    #[inline(always)]
    pub fn clear_flag(self, f: u8) {
        self.hdr_mut().flags &= !f;
    }

    #[inline(always)]
    pub fn is_atom(self) -> bool {
        self.has_flag(O_ATOM)
    }

    #[inline(always)]
    pub fn is_marked(self) -> bool {
        self.has_flag(O_MARK)
    }

    #[inline(always)]
    pub fn leafz(self) -> u8 {
        self.hdr().leafz
    }

    #[inline(always)]
    pub fn nrefs(self) -> u8 {
        self.hdr().nrefs
    }

    /// Bump the reference-count hint. This is not a correctness
    /// mechanism: it only pins the object against collection until the
    /// matching `decref`, which is what makes a freshly created value
    /// safe to hold in a native local across an allocation.
    #[inline(always)]
    pub fn incref(self) {
        let h = self.hdr_mut();
        h.nrefs = h.nrefs.saturating_add(1);
    }

    /// Drop the reference-count hint. Once it reaches zero the object
    /// lives or dies purely by reachability.
    #[inline(always)]
    pub fn decref(self) {
        let h = self.hdr_mut();
        h.nrefs = h.nrefs.saturating_sub(1);
    }

    /// Initialise all four header fields in one go, in the order
    /// tcode, flags, nrefs, leafz. Every factory calls this right
    /// after allocation.
    #[inline(always)]
    pub fn set_tfnz(self, tcode: u8, flags: u8, nrefs: u8, leafz: usize) {
        let h = self.hdr_mut();
        h.tcode = tcode;
        h.flags = flags;
        h.nrefs = nrefs;
        h.leafz = if leafz <= u8::MAX as usize { leafz as u8 } else { 0 };
    }
}

impl std::fmt::Debug for Obj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Obj({:p}, tc={})", self.0.as_ptr(), self.tcode())
    }
}

/// An `Obj` that may cross threads: used to hand a callable to a
/// spawned interpreter thread.
///
/// Safety: objects are only ever touched under the global interpreter
/// lock, and the wrapped object is pinned (`incref`ed) by the sender
/// until the receiving thread has rooted it.
pub struct SendObj(pub Obj);
unsafe impl Send for SendObj {}

/// The virtual operations of a type. One static instance per type is
/// registered with the interpreter and found through the header's
/// tcode; dispatch is a single indirect call.
///
/// Methods take the interpreter explicitly because most of them may
/// allocate (and so may trigger a collection).
pub trait ObjType: Sync {
    /// The name used in "attempt to ... a <name>" diagnostics.
    fn name(&self) -> &'static str;

    /// Set `O_MARK` on `o`, recursively mark every object it owns, and
    /// return the total size in bytes of everything newly marked.
    /// Implementations must short-circuit on re-entry (the generic
    /// driver `gc::mark_obj` already does this before dispatching).
    fn mark(&self, ip: &Interp, o: Obj) -> usize;

    /// Release `o` back to the allocator.
    ///
    /// # Safety
    /// Only the sweep phase may call this, and only for unreachable
    /// objects.
    unsafe fn free(&self, ip: &mut Interp, o: Obj);

    /// Value hash. For atomisable types, `eq(a, b)` implies
    /// `hash(a) == hash(b)`. The default hashes identity.
    fn hash(&self, _ip: &Interp, o: Obj) -> u64 {
        crate::atom::ptr_hash(o.addr())
    }

    /// Value equality between two objects of this type. The default is
    /// identity.
    fn eq(&self, _ip: &Interp, a: Obj, b: Obj) -> bool {
        a == b
    }

    /// A new non-atomic object with the same observable value.
    /// Intrinsically atomic scalars return themselves.
    fn copy(&self, _ip: &mut Interp, o: Obj) -> Res<Obj> {
        o.incref();
        Ok(o)
    }

    /// Indexed store `o[k] = v`. Fails by default.
    fn assign(&self, _ip: &mut Interp, _o: Obj, _k: Obj, _v: Obj) -> Res {
        set_error(format!("attempt to assign to a {}", self.name()))
    }

    /// Indexed load `o[k]`. Fails by default.
    fn fetch(&self, _ip: &mut Interp, _o: Obj, _k: Obj) -> Res<Obj> {
        set_error(format!("attempt to read an element of a {}", self.name()))
    }

    /// Scope-chain store: walk the super chain and assign where the
    /// key is already bound in a writable map. `Ok(true)` means the
    /// assignment happened somewhere on the chain.
    fn assign_super(&self, _ip: &mut Interp, _o: Obj, _k: Obj, _v: Obj) -> Res<bool> {
        Ok(false)
    }

    /// Scope-chain load: walk the super chain. `Ok(None)` means the
    /// key is bound nowhere on the chain.
    fn fetch_super(&self, _ip: &mut Interp, _o: Obj, _k: Obj) -> Res<Option<Obj>> {
        Ok(None)
    }

    /// Store into this object only, never the chain.
    fn assign_base(&self, ip: &mut Interp, o: Obj, k: Obj, v: Obj) -> Res {
        self.assign(ip, o, k, v)
    }

    /// Number of elements, for types with a size.
    fn len(&self, _ip: &Interp, _o: Obj) -> Res<usize> {
        set_error(format!("attempt to take the length of a {}", self.name()))
    }

    /// Number of keys, for keyed aggregates.
    fn nkeys(&self, ip: &Interp, o: Obj) -> Res<usize> {
        self.len(ip, o)
    }

    /// A fresh array of this aggregate's keys.
    fn keys(&self, _ip: &mut Interp, _o: Obj) -> Res<Obj> {
        set_error(format!("attempt to enumerate the keys of a {}", self.name()))
    }

    /// Invoke the object. `subject` is the bound subject when the call
    /// came through a method value.
    fn call(&self, _ip: &mut Interp, _o: Obj, _subject: Option<Obj>) -> Res {
        set_error(format!("attempt to call a {}", self.name()))
    }

    /// Serialization hook. Types that are not transmissible keep the
    /// default.
    fn save(&self, _ip: &mut Interp, _ar: &mut dyn Archiver, _o: Obj) -> Res {
        set_error(format!("attempt to save a {}", self.name()))
    }

    /// Deserialization hook, the inverse of `save`.
    fn restore(&self, _ip: &mut Interp, _ar: &mut dyn Archiver) -> Res<Obj> {
        set_error(format!("attempt to restore a {}", self.name()))
    }
}

/// Format an object for diagnostics: type name plus a short rendering
/// of scalar values.
pub fn objname(ip: &Interp, o: Obj) -> String {
    use crate::{float::floatof, int::intof, string::strof};
    match o.tcode() {
        TC_INT => format!("{}", intof(o).value),
        TC_FLOAT => format!("{}", floatof(o).value),
        TC_STRING => {
            let s = strof(o);
            let text = String::from_utf8_lossy(s.bytes());
            if text.len() <= 24 {
                format!("\"{text}\"")
            } else {
                format!("\"{}\"...", &text[..24])
            }
        }
        TC_NULL => "NULL".to_string(),
        tc => ip.type_of_code(tc).name().to_string(),
    }
}

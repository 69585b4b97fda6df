//! marl-core: the heart of the Marl interpreter.
//!
//! The pieces, roughly bottom-up:
//!
//! - `alloc`: size-classed free lists over chunk arenas, raw
//!   fall-through, collection triggering.
//! - `object`: the 4-byte object header, the `Obj` reference and the
//!   `ObjType` descriptor trait.
//! - `atom`: the interning table; equal atoms are pointer-equal.
//! - `gc`: stop-the-world mark-sweep over the object registry.
//! - the value types, one module each.
//! - `exec`/`vm`/`binop`/`call`: the three-stack engine.
//! - `interp`: the process-wide interpreter and its lock.
//!
//! The compiler and the intrinsic function tables live in their own
//! crates on top of this one.

pub mod alloc;
pub mod archiver;
pub mod array;
pub mod atom;
pub mod binop;
pub mod call;
pub mod catcher;
pub mod cfunc;
pub mod channel;
pub mod err;
pub mod exec;
pub mod file;
pub mod float;
pub mod func;
pub mod gc;
pub mod handle;
pub mod int;
pub mod interp;
pub mod map;
pub mod markobj;
pub mod mem;
pub mod method;
pub mod null;
pub mod object;
pub mod op;
pub mod parse;
pub mod pc;
pub mod ptr;
pub mod regexp;
pub mod set;
pub mod signal;
pub mod src;
pub mod sstring;
pub mod string;
pub mod types;
pub mod vm;

#[cfg(test)]
pub(crate) mod testutil;

pub use err::{argcount, argerror, clear_error, get_error, set_error, Fail, Res};
pub use interp::{enter, leave, waitfor, wakeup, Interp};
pub use object::{Obj, ObjType};

use exec::{execof, new_exec};
use interp::{cur_ex, set_cur_ex};

/// Interpreter version, reported by the CLI and scripts.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bootstrap the process-wide interpreter and attach the calling
/// thread as its first execution context. Call once, before anything
/// else; the runtime crate's `init` wraps this and adds the intrinsic
/// tables.
pub fn init() -> Res {
    interp::init_interp()?;
    let ip = enter();
    let r = attach_thread(ip);
    leave();
    r.map(|_| ())
}

/// Give the calling thread an execution context whose initial scope
/// is the shared base scope. The GIL must be held.
pub fn attach_thread(ip: &mut Interp) -> Res<Obj> {
    if let Some(ex) = cur_ex() {
        return Ok(ex);
    }
    let ex = new_exec(ip)?;
    let vs = execof(ex).vs;
    let base = ip.base_scope;
    array::push(ip, vs, base)?;
    set_cur_ex(Some(ex));
    Ok(ex)
}

/// Tear the interpreter down: unpin everything, collect the world,
/// release the allocator's chunks. The interpreter is unusable
/// afterwards (the process-wide instance cannot be re-created); meant
/// for leak checking at process exit.
pub fn uninit() {
    let ip = enter();
    if let Some(ex) = cur_ex() {
        exec::remove_exec(ip, ex);
        set_cur_ex(None);
    }
    ip.execs.clear();
    ip.small_ints.clear();
    for i in 0..ip.objs.len() {
        let o = ip.objs[i];
        unsafe { (*o.ptr()).nrefs = 0 };
    }
    ip.reclaim();
    unsafe { ip.heap.drop_all_small_allocations() };
    leave();
}

//! Deferred signal delivery.
//!
//! Signal handlers only set atomic flags; nothing else runs in signal
//! context. The VM consumes the pending set at back edges (loop
//! re-entry and call boundaries) and invokes the script handler
//! registered for each signal on the current thread.

use crate::call::call_obj;
use crate::err::{set_error, Res};
use crate::int::new_int;
use crate::interp::Interp;
use crate::map::lookup_base;
use crate::object::Obj;
use std::sync::atomic::{AtomicU64, Ordering};

/// Highest signal number tracked (covers the standard Unix set).
pub const MAX_SIGNAL: i64 = 32;

/// Pending-signal bitmask, set by the handler, drained at back edges.
static PENDING: AtomicU64 = AtomicU64::new(0);

/// Delivery counts, for diagnostics.
static DELIVERED: AtomicU64 = AtomicU64::new(0);

/// The handler: async-signal-safe, one atomic OR.
extern "C" fn flag_signal_handler(sig: libc::c_int) {
    if (0..MAX_SIGNAL).contains(&(sig as i64)) {
        PENDING.fetch_or(1 << sig, Ordering::SeqCst);
    }
}

/// Any signals waiting? Cheap enough for every back edge.
#[inline(always)]
pub fn signals_pending() -> bool {
    PENDING.load(Ordering::Relaxed) != 0
}

/// Lifetime count of delivered signals.
pub fn signals_delivered() -> u64 {
    DELIVERED.load(Ordering::Relaxed)
}

/// Trap `signo`: future deliveries set a pending bit instead of the
/// default action, and the VM calls `handler(signo)` at its next back
/// edge.
pub fn trap_signal(ip: &mut Interp, signo: i64, handler: Obj) -> Res {
    if !(1..MAX_SIGNAL).contains(&signo) {
        return set_error(format!("bad signal number {signo}"));
    }
    let k = new_int(ip, signo)?;
    let sig_handlers = ip.sig_handlers;
    crate::map::assign_base(ip, sig_handlers, k, handler)?;
    k.decref();
    unsafe {
        libc::signal(signo as libc::c_int, flag_signal_handler as libc::sighandler_t);
    }
    Ok(())
}

/// Drain the pending set, calling each signal's script handler on the
/// current thread. Errors from a handler propagate to the caller's
/// unwinding like any other error.
pub fn invoke_signal_handlers(ip: &mut Interp) -> Res {
    let pending = PENDING.swap(0, Ordering::SeqCst);
    if pending == 0 {
        return Ok(());
    }
    for sig in 1..MAX_SIGNAL {
        if pending & (1 << sig) == 0 {
            continue;
        }
        DELIVERED.fetch_add(1, Ordering::Relaxed);
        let k = new_int(ip, sig)?;
        let handler = lookup_base(ip, ip.sig_handlers, k);
        k.decref();
        if let Some(h) = handler {
            let arg = new_int(ip, sig)?;
            let r = call_obj(ip, h, &[arg]);
            arg.decref();
            r?.decref();
        }
    }
    Ok(())
}

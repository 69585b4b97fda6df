//! Shared scaffolding for tests that need the process-wide
//! interpreter. Everything using this must run `#[serial]`.

use crate::interp::{enter, leave, Interp};
use std::sync::Once;

static INIT: Once = Once::new();

/// Run `f` with the interpreter locked, bootstrapping it (and the
/// calling thread's execution context) on first use.
pub fn with_interp<R>(f: impl FnOnce(&mut Interp) -> R) -> R {
    INIT.call_once(|| {
        crate::init().expect("interpreter bootstrap failed");
    });

    /// Releases the GIL on drop so a panicking `f` can't leave it
    /// held, which would deadlock every later test on `enter`.
    struct LeaveOnDrop;
    impl Drop for LeaveOnDrop {
        fn drop(&mut self) {
            leave();
        }
    }

    let ip = enter();
    crate::attach_thread(ip).expect("attach failed");
    let _guard = LeaveOnDrop;
    f(ip)
}

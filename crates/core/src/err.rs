//! Error convention for the interpreter core.
//!
//! Primitives fail by storing a short human-readable message in a
//! thread-local slot and returning the `Fail` marker. Callers propagate
//! with `?`; the VM checks the result of every dispatch and unwinds to
//! the nearest catcher. The message is per-thread because each OS
//! thread runs its own execution context; `error` as seen by script
//! code resolves through this slot.

use std::cell::RefCell;

thread_local! {
    /// Thread-local storage for the current error message.
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Marker for the failure arm of [`Res`]. Carries no data; the message
/// lives in the thread-local error slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fail;

/// Result type used by every fallible primitive in the core.
pub type Res<T = ()> = Result<T, Fail>;

/// Record an error message and fail.
///
/// Written so a primitive can `return set_error(...)` directly:
/// the return type unifies with any `Res<T>`.
pub fn set_error<T>(msg: impl Into<String>) -> Res<T> {
    LAST_ERROR.with(|e| *e.borrow_mut() = Some(msg.into()));
    Err(Fail)
}

/// The current error message, if any. The message stays set until
/// `clear_error` (or the next `set_error` replaces it).
pub fn get_error() -> Option<String> {
    LAST_ERROR.with(|e| e.borrow().clone())
}

/// Clear any pending error.
pub fn clear_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

/// Standard complaint about argument `i` (0-based) of an intrinsic.
pub fn argerror<T>(i: usize) -> Res<T> {
    set_error(format!("argument {i} is the wrong type"))
}

/// Standard complaint about an intrinsic called with the wrong number
/// of arguments.
pub fn argcount<T>(want: usize, got: usize) -> Res<T> {
    set_error(format!("{got} arguments given, {want} expected"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_error() {
        clear_error();
        assert!(get_error().is_none());

        let r: Res<i32> = set_error("test error");
        assert_eq!(r, Err(Fail));
        assert_eq!(get_error().as_deref(), Some("test error"));

        clear_error();
        assert!(get_error().is_none());
    }

    #[test]
    fn test_argerror_names_index() {
        let r: Res<()> = argerror(0);
        assert!(r.is_err());
        assert!(get_error().unwrap().contains("argument 0"));
        clear_error();
    }
}

//! Strings the core itself needs by name, interned once at boot and
//! pinned for the life of the process.

use crate::err::Res;
use crate::interp::Interp;
use crate::object::Obj;
use crate::string::new_str;

pub struct SStrings {
    /// "error": the variable the raiser binds in the catching scope.
    pub error: Obj,
    /// "this": the auto a method call binds its subject to.
    pub this: Obj,
    /// "argv": the script's argument vector in the base scope.
    pub argv: Obj,
    /// "": the empty string.
    pub empty: Obj,
}

impl SStrings {
    pub(crate) fn dangling() -> SStrings {
        SStrings {
            error: Obj::dangling(),
            this: Obj::dangling(),
            argv: Obj::dangling(),
            empty: Obj::dangling(),
        }
    }

    pub(crate) fn boot(ip: &mut Interp) -> Res<SStrings> {
        Ok(SStrings {
            error: new_str(ip, b"error")?,
            this: new_str(ip, b"this")?,
            argv: new_str(ip, b"argv")?,
            empty: new_str(ip, b"")?,
        })
    }
}

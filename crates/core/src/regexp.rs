//! Compiled regular expressions: the pattern (via the `regex` crate)
//! plus its source string. Atomic on (source, flags).

use crate::err::{set_error, Res};
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_ATOM, O_MARK, TC_REGEXP, TC_STRING};
use crate::string::strof;
use std::mem::ManuallyDrop;

/// Case-insensitive compilation.
pub const RE_ICASE: u32 = 0x1;

#[repr(C)]
pub struct RegexpObj {
    pub header: Object,
    /// The compiled pattern. Dropped explicitly in `free`.
    re: ManuallyDrop<regex::bytes::Regex>,
    /// The source pattern text (an interned string).
    pub source: Obj,
    pub flags: u32,
}

const RE_PRIME: u64 = 0x0006_63B1_7F3D;

#[inline(always)]
pub fn regexpof<'a>(o: Obj) -> &'a RegexpObj {
    debug_assert_eq!(o.tcode(), TC_REGEXP);
    unsafe { &*(o.ptr() as *const RegexpObj) }
}

impl RegexpObj {
    pub fn regex(&self) -> &regex::bytes::Regex {
        &self.re
    }
}

/// Compile (or find the existing atom for) the pattern in `source`.
pub fn new_regexp(ip: &mut Interp, source: Obj, flags: u32) -> Res<Obj> {
    debug_assert_eq!(source.tcode(), TC_STRING);
    let source = ip.atom(source, false)?;
    let h = RE_PRIME
        .wrapping_mul(crate::atom::ptr_hash(source.addr()))
        .wrapping_add(flags as u64);
    let (found, slot) = ip.atom_probe2(h, |_, e| {
        e.tcode() == TC_REGEXP && regexpof(e).source == source && regexpof(e).flags == flags
    });
    if let Some(o) = found {
        o.incref();
        source.decref();
        return Ok(o);
    }

    let pattern = strof(source).text().into_owned();
    let compiled = regex::bytes::RegexBuilder::new(&pattern)
        .case_insensitive(flags & RE_ICASE != 0)
        .build();
    let compiled = match compiled {
        Ok(re) => re,
        Err(e) => return set_error(format!("invalid regular expression: {e}")),
    };

    let pause = ip.pause_gc();
    let p: *mut RegexpObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_REGEXP, O_ATOM, 1, 0);
    unsafe {
        std::ptr::write(&mut (*p).re, ManuallyDrop::new(compiled));
        (*p).source = source;
        (*p).flags = flags;
    }
    ip.rego(o);
    drop(pause);
    ip.store_atom_and_count(slot, o);
    source.decref();
    Ok(o)
}

pub struct RegexpType;

impl ObjType for RegexpType {
    fn name(&self) -> &'static str {
        "regexp"
    }

    fn mark(&self, ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        std::mem::size_of::<RegexpObj>() + crate::gc::mark_obj(ip, regexpof(o).source)
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        let p = o.ptr() as *mut RegexpObj;
        ManuallyDrop::drop(&mut (*p).re);
        ip.tfree::<RegexpObj>(p);
    }

    fn hash(&self, _ip: &Interp, o: Obj) -> u64 {
        let r = regexpof(o);
        RE_PRIME
            .wrapping_mul(crate::atom::ptr_hash(r.source.addr()))
            .wrapping_add(r.flags as u64)
    }

    fn eq(&self, _ip: &Interp, a: Obj, b: Obj) -> bool {
        let (ra, rb) = (regexpof(a), regexpof(b));
        ra.source == rb.source && ra.flags == rb.flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::string::new_str;
    use crate::testutil::with_interp;
    use serial_test::serial;

    fn matches(o: Obj, text: &[u8]) -> bool {
        regexpof(o).regex().is_match(text)
    }

    #[test]
    #[serial]
    fn test_atomic_on_source_and_flags() {
        with_interp(|ip| {
            let src = new_str(ip, b"ab+c").unwrap();
            let r1 = new_regexp(ip, src, 0).unwrap();
            let r2 = new_regexp(ip, src, 0).unwrap();
            let r3 = new_regexp(ip, src, RE_ICASE).unwrap();
            assert_eq!(r1, r2);
            assert_ne!(r1, r3);
            assert!(matches(r1, b"xabbbc"));
            assert!(!matches(r1, b"AbC"));
            assert!(matches(r3, b"AbbC"));
            src.decref();
            r1.decref();
            r2.decref();
            r3.decref();
        });
    }

    #[test]
    #[serial]
    fn test_bad_pattern_reports() {
        with_interp(|ip| {
            let src = new_str(ip, b"(unclosed").unwrap();
            assert!(new_regexp(ip, src, 0).is_err());
            assert!(crate::err::get_error()
                .unwrap()
                .contains("invalid regular expression"));
            crate::err::clear_error();
            src.decref();
        });
    }
}

//! Byte strings.
//!
//! Two flavours share one payload struct:
//!
//! - the common interned form, where the characters live inline after
//!   the header in a single sized allocation, and
//! - the mutable "string buffer" form (`new_str_buf`), whose
//!   characters live in a separately allocated growable buffer and
//!   whose atom flag stays off.
//!
//! Every string keeps one guard NUL past its last character. Interned
//! strings cache their hash.

use crate::archiver::Archiver;
use crate::err::{set_error, Res};
use crate::int::new_int;
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_ATOM, O_MARK, TC_INT, TC_STRING};

#[repr(C)]
pub struct StrObj {
    pub header: Object,
    /// Cached value hash; 0 means not yet computed.
    hash: u64,
    /// Number of characters, excluding the guard NUL.
    pub nchars: usize,
    /// The characters: inline (right after this struct) for interned
    /// strings, a separate allocation for string buffers.
    chars: *mut u8,
    /// Size of the separate buffer, including the guard byte;
    /// 0 for the inline form.
    bufz: usize,
}

/// Allocation size of an inline string of `n` characters.
#[inline(always)]
pub fn str_alloc_size(n: usize) -> usize {
    std::mem::size_of::<StrObj>() + n + 1
}

#[inline(always)]
pub fn strof<'a>(o: Obj) -> &'a StrObj {
    debug_assert_eq!(o.tcode(), TC_STRING);
    unsafe { &*(o.ptr() as *const StrObj) }
}

#[inline(always)]
pub fn strof_mut<'a>(o: Obj) -> &'a mut StrObj {
    debug_assert_eq!(o.tcode(), TC_STRING);
    unsafe { &mut *(o.ptr() as *mut StrObj) }
}

impl StrObj {
    #[inline(always)]
    pub fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.chars, self.nchars) }
    }

    /// Lossy UTF-8 view, for diagnostics and printing.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.bytes())
    }

    #[inline(always)]
    fn is_buffer(&self) -> bool {
        self.bufz != 0
    }
}

const STR_PRIME: u64 = 0x0001_01F1_A7B9;

/// String hash: Hsieh's superfast hash over the bytes, folded with a
/// type prime.
pub fn str_hash(data: &[u8]) -> u64 {
    let len = data.len();
    let mut hash = len as u32;
    let get16 = |d: &[u8], i: usize| -> u32 { (d[i] as u32) | ((d[i + 1] as u32) << 8) };

    let mut i = 0;
    let mut rem = len;
    while rem >= 4 {
        hash = hash.wrapping_add(get16(data, i));
        let tmp = (get16(data, i + 2) << 11) ^ hash;
        hash = (hash << 16) ^ tmp;
        i += 4;
        rem -= 4;
        hash = hash.wrapping_add(hash >> 11);
    }
    match rem {
        3 => {
            hash = hash.wrapping_add(get16(data, i));
            hash ^= hash << 16;
            hash ^= (data[i + 2] as u32) << 18;
            hash = hash.wrapping_add(hash >> 11);
        }
        2 => {
            hash = hash.wrapping_add(get16(data, i));
            hash ^= hash << 11;
            hash = hash.wrapping_add(hash >> 17);
        }
        1 => {
            hash = hash.wrapping_add(data[i] as u32);
            hash ^= hash << 10;
            hash = hash.wrapping_add(hash >> 1);
        }
        _ => {}
    }
    // Avalanche the final bits.
    hash ^= hash << 3;
    hash = hash.wrapping_add(hash >> 5);
    hash ^= hash << 4;
    hash = hash.wrapping_add(hash >> 17);
    hash ^= hash << 25;
    hash = hash.wrapping_add(hash >> 6);

    (hash as u64).wrapping_mul(STR_PRIME)
}

/// Allocate an uninterned inline string of `n` characters, content
/// zeroed, for the caller to fill and then pass to [`str_intern`].
pub fn str_alloc(ip: &mut Interp, n: usize) -> Res<Obj> {
    let z = str_alloc_size(n);
    let p = ip.nalloc(z)? as *mut StrObj;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_STRING, 0, 1, if z <= u8::MAX as usize { z } else { 0 });
    unsafe {
        let chars = (p as *mut u8).add(std::mem::size_of::<StrObj>());
        std::ptr::write_bytes(chars, 0, n + 1);
        (*p).hash = 0;
        (*p).nchars = n;
        (*p).chars = chars;
        (*p).bufz = 0;
    }
    ip.rego(o);
    Ok(o)
}

/// Intern a filled inline string: the canonical equal atom is
/// returned and `o`'s own reference consumed.
pub fn str_intern(ip: &mut Interp, o: Obj) -> Res<Obj> {
    debug_assert!(!strof(o).is_buffer());
    ip.atom(o, true)
}

/// The interned string with the given bytes, reference hint bumped.
pub fn new_str(ip: &mut Interp, data: &[u8]) -> Res<Obj> {
    let h = str_hash(data);
    let (found, slot) = ip.atom_probe2(h, |_, e| {
        e.tcode() == TC_STRING && strof(e).bytes() == data
    });
    if let Some(o) = found {
        o.incref();
        return Ok(o);
    }
    let pause = ip.pause_gc();
    let o = str_alloc(ip, data.len())?;
    let s = strof_mut(o);
    unsafe {
        std::ptr::copy_nonoverlapping(data.as_ptr(), s.chars, data.len());
    }
    s.hash = h;
    o.set_flag(O_ATOM);
    drop(pause);
    ip.store_atom_and_count(slot, o);
    Ok(o)
}

/// Convenience for Rust string literals and `&str` data.
pub fn new_str_nul_term(ip: &mut Interp, s: &str) -> Res<Obj> {
    new_str(ip, s.as_bytes())
}

/// A mutable string buffer with room for `cap` characters. Never
/// atomic; grow with [`str_need_size`] or [`str_append`].
pub fn new_str_buf(ip: &mut Interp, cap: usize) -> Res<Obj> {
    let bufz = cap + 1;
    let p: *mut StrObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_STRING, 0, 1, 0);
    unsafe {
        (*p).hash = 0;
        (*p).nchars = 0;
        (*p).chars = std::ptr::null_mut();
        (*p).bufz = 0;
    }
    // Register before the buffer allocation: that allocation can
    // collect, and the string must be discoverable (its null chars
    // field just means "no buffer yet").
    ip.rego(o);
    let chars = ip.nalloc(bufz)?;
    let s = strof_mut(o);
    unsafe { *chars = 0 };
    s.chars = chars;
    s.bufz = bufz;
    Ok(o)
}

/// Ensure a string buffer can hold `n` characters plus the guard.
pub fn str_need_size(ip: &mut Interp, o: Obj, n: usize) -> Res {
    if o.is_atom() {
        return set_error("attempt to grow an atomic string");
    }
    let (old_chars, old_bufz, nchars) = {
        let s = strof(o);
        (s.chars, s.bufz, s.nchars)
    };
    if old_bufz >= n + 1 {
        return Ok(());
    }
    let newz = (n + 1).next_power_of_two().max(16);
    let chars = ip.nalloc(newz)?;
    unsafe {
        if !old_chars.is_null() {
            std::ptr::copy_nonoverlapping(old_chars, chars, nchars + 1);
        } else {
            *chars = 0;
        }
    }
    let s = strof_mut(o);
    s.chars = chars;
    s.bufz = newz;
    s.hash = 0;
    if !old_chars.is_null() && old_bufz != 0 {
        ip.nfree(old_chars, old_bufz);
    }
    Ok(())
}

/// Append bytes to a string buffer, growing as needed and keeping the
/// guard NUL.
pub fn str_append(ip: &mut Interp, o: Obj, data: &[u8]) -> Res {
    let n = strof(o).nchars + data.len();
    str_need_size(ip, o, n)?;
    let s = strof_mut(o);
    unsafe {
        std::ptr::copy_nonoverlapping(data.as_ptr(), s.chars.add(s.nchars), data.len());
        *s.chars.add(n) = 0;
    }
    s.nchars = n;
    s.hash = 0;
    Ok(())
}

pub struct StrType;

impl ObjType for StrType {
    fn name(&self) -> &'static str {
        "string"
    }

    fn mark(&self, _ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        let s = strof(o);
        if s.is_buffer() {
            std::mem::size_of::<StrObj>() + s.bufz
        } else {
            str_alloc_size(s.nchars)
        }
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        let (chars, bufz, nchars) = {
            let s = strof(o);
            (s.chars, s.bufz, s.nchars)
        };
        if bufz != 0 {
            ip.nfree(chars, bufz);
            ip.tfree::<StrObj>(o.cast());
        } else if chars.is_null() {
            // A buffer whose first allocation never happened.
            ip.tfree::<StrObj>(o.cast());
        } else {
            ip.nfree(o.ptr() as *mut u8, str_alloc_size(nchars));
        }
    }

    fn hash(&self, _ip: &Interp, o: Obj) -> u64 {
        let s = strof(o);
        if s.hash != 0 && o.is_atom() {
            return s.hash;
        }
        let h = str_hash(s.bytes());
        if o.is_atom() {
            strof_mut(o).hash = h;
        }
        h
    }

    fn eq(&self, _ip: &Interp, a: Obj, b: Obj) -> bool {
        strof(a).bytes() == strof(b).bytes()
    }

    fn copy(&self, ip: &mut Interp, o: Obj) -> Res<Obj> {
        let n = strof(o).nchars;
        let c = new_str_buf(ip, n)?;
        // Re-read the source after the allocations above.
        str_append(ip, c, strof(o).bytes())?;
        Ok(c)
    }

    fn fetch(&self, ip: &mut Interp, o: Obj, k: Obj) -> Res<Obj> {
        if k.tcode() != TC_INT {
            return set_error("non-integer string index");
        }
        let i = crate::int::intof(k).value;
        let s = strof(o);
        if i < 0 || i as usize >= s.nchars {
            return new_str(ip, b"");
        }
        let b = [s.bytes()[i as usize]];
        new_str(ip, &b)
    }

    fn len(&self, _ip: &Interp, o: Obj) -> Res<usize> {
        Ok(strof(o).nchars)
    }

    fn save(&self, _ip: &mut Interp, ar: &mut dyn Archiver, o: Obj) -> Res {
        let s = strof(o);
        ar.write_i64(s.nchars as i64)?;
        ar.write(s.bytes())
    }

    fn restore(&self, ip: &mut Interp, ar: &mut dyn Archiver) -> Res<Obj> {
        let n = ar.read_i64()? as usize;
        let mut buf = vec![0u8; n];
        ar.read(&mut buf)?;
        new_str(ip, &buf)
    }
}

/// The character (byte) at `i`, as an int, or an error out of range.
pub fn str_char_at(ip: &mut Interp, o: Obj, i: usize) -> Res<Obj> {
    let s = strof(o);
    if i >= s.nchars {
        return set_error("string index out of range");
    }
    new_int(ip, s.bytes()[i] as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::with_interp;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_nul_guard_past_last_character() {
        with_interp(|ip| {
            let s = new_str(ip, b"guarded").unwrap();
            let st = strof(s);
            let guard = unsafe { *st.bytes().as_ptr().add(st.nchars) };
            assert_eq!(guard, 0);

            let buf = new_str_buf(ip, 4).unwrap();
            str_append(ip, buf, b"grow me past the initial capacity").unwrap();
            let bt = strof(buf);
            let guard = unsafe { *bt.bytes().as_ptr().add(bt.nchars) };
            assert_eq!(guard, 0);
            s.decref();
            buf.decref();
        });
    }

    #[test]
    #[serial]
    fn test_interned_strings_cache_their_hash() {
        with_interp(|ip| {
            let s = new_str(ip, b"cached hash").unwrap();
            assert_eq!(ip.obj_hash(s), str_hash(b"cached hash"));
            assert_eq!(strof(s).hash, str_hash(b"cached hash"));
            s.decref();
        });
    }

    #[test]
    #[serial]
    fn test_copy_is_never_atomic_and_compares_equal() {
        with_interp(|ip| {
            let s = new_str(ip, b"copy source").unwrap();
            let t = ip.type_of(s);
            let c = t.copy(ip, s).unwrap();
            assert!(!c.is_atom());
            assert!(ip.obj_eq(s, c));
            assert_ne!(s, c);
            s.decref();
            c.decref();
        });
    }

    #[test]
    #[serial]
    fn test_buffer_grows_in_place_of_value() {
        with_interp(|ip| {
            let buf = new_str_buf(ip, 2).unwrap();
            for _ in 0..100 {
                str_append(ip, buf, b"ab").unwrap();
            }
            assert_eq!(strof(buf).nchars, 200);
            assert!(strof(buf).bytes().iter().all(|&b| b == b'a' || b == b'b'));
            buf.decref();
        });
    }

    #[test]
    #[serial]
    fn test_string_fetch_and_len() {
        with_interp(|ip| {
            let s = new_str(ip, b"abc").unwrap();
            let t = ip.type_of(s);
            assert_eq!(t.len(ip, s).unwrap(), 3);
            let k = crate::int::new_int(ip, 1).unwrap();
            let ch = ip.fetch(s, k).unwrap();
            assert_eq!(strof(ch).bytes(), b"b");
            s.decref();
            k.decref();
            ch.decref();
        });
    }
}

//! Files: a raw handle paired with an ftype, the dispatch table that
//! knows how to drive it.
//!
//! The core supplies the ftype contract and the in-memory character
//! buffer ftype the parser reads strings through; the stdio adapter
//! lives with the runtime intrinsics. Files are not transmissible and
//! carry the CLOSED flag once closed.

use crate::err::{set_error, Res};
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_CLOSED, O_MARK, TC_FILE};

/// End-of-file return from `getch`.
pub const EOF: i32 = -1;

/// The operations a file implementation provides. `f` is the file's
/// raw handle, owned by the implementation.
pub trait Ftype: Sync {
    fn getch(&self, f: *mut libc::c_void) -> i32;
    fn ungetch(&self, f: *mut libc::c_void, c: i32) -> i32;
    fn read(&self, f: *mut libc::c_void, buf: &mut [u8]) -> Res<usize> {
        let mut n = 0;
        while n < buf.len() {
            let c = self.getch(f);
            if c == EOF {
                break;
            }
            buf[n] = c as u8;
            n += 1;
        }
        Ok(n)
    }
    fn write(&self, _f: *mut libc::c_void, _data: &[u8]) -> Res<usize> {
        set_error("attempt to write a read-only file")
    }
    fn flush(&self, _f: *mut libc::c_void) -> Res {
        Ok(())
    }
    /// Release the handle. Runs once, from `close_file` or the
    /// collector.
    unsafe fn close(&self, f: *mut libc::c_void) -> Res;
    fn eof(&self, f: *mut libc::c_void) -> bool;
    fn seek(&self, _f: *mut libc::c_void, _off: i64, _whence: i32) -> Res<i64> {
        set_error("attempt to seek an unseekable file")
    }
}

#[repr(C)]
pub struct FileObj {
    pub header: Object,
    /// Implementation handle; meaning is the ftype's business.
    pub inner: *mut libc::c_void,
    pub ftype: &'static dyn Ftype,
    /// Display name (an interned string).
    pub name: Obj,
}

#[inline(always)]
pub fn fileof<'a>(o: Obj) -> &'a FileObj {
    debug_assert_eq!(o.tcode(), TC_FILE);
    unsafe { &*(o.ptr() as *const FileObj) }
}

pub fn new_file(
    ip: &mut Interp,
    inner: *mut libc::c_void,
    ftype: &'static dyn Ftype,
    name: Obj,
) -> Res<Obj> {
    let p: *mut FileObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_FILE, 0, 1, 0);
    unsafe {
        (*p).inner = inner;
        (*p).ftype = ftype;
        (*p).name = name;
    }
    ip.rego(o);
    Ok(o)
}

/// Close a file now. Idempotent: a second close fails but does not
/// touch the handle again.
pub fn close_file(_ip: &mut Interp, f: Obj) -> Res {
    if f.has_flag(O_CLOSED) {
        return set_error("attempt to close an already closed file");
    }
    f.set_flag(O_CLOSED);
    let ff = fileof(f);
    unsafe { ff.ftype.close(ff.inner) }
}

pub struct FileType;

impl ObjType for FileType {
    fn name(&self) -> &'static str {
        "file"
    }

    fn mark(&self, ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        std::mem::size_of::<FileObj>() + crate::gc::mark_obj(ip, fileof(o).name)
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        if !o.has_flag(O_CLOSED) {
            let f = fileof(o);
            let _ = f.ftype.close(f.inner);
        }
        ip.tfree::<FileObj>(o.cast());
    }
}

// --- The character-buffer ftype ----------------------------------------

struct CharBuf {
    data: Vec<u8>,
    pos: usize,
}

/// Read-only in-memory file over a byte buffer; what `eval` and
/// string parsing read through.
pub struct CharBufFtype;

pub static CHARBUF_FTYPE: CharBufFtype = CharBufFtype;

impl Ftype for CharBufFtype {
    fn getch(&self, f: *mut libc::c_void) -> i32 {
        let cb = unsafe { &mut *(f as *mut CharBuf) };
        if cb.pos >= cb.data.len() {
            EOF
        } else {
            let c = cb.data[cb.pos];
            cb.pos += 1;
            c as i32
        }
    }

    fn ungetch(&self, f: *mut libc::c_void, c: i32) -> i32 {
        let cb = unsafe { &mut *(f as *mut CharBuf) };
        if c == EOF || cb.pos == 0 {
            return EOF;
        }
        cb.pos -= 1;
        c
    }

    unsafe fn close(&self, f: *mut libc::c_void) -> Res {
        drop(Box::from_raw(f as *mut CharBuf));
        Ok(())
    }

    fn eof(&self, f: *mut libc::c_void) -> bool {
        let cb = unsafe { &*(f as *const CharBuf) };
        cb.pos >= cb.data.len()
    }

    fn seek(&self, f: *mut libc::c_void, off: i64, whence: i32) -> Res<i64> {
        let cb = unsafe { &mut *(f as *mut CharBuf) };
        let base = match whence {
            0 => 0i64,
            1 => cb.pos as i64,
            2 => cb.data.len() as i64,
            _ => return set_error("bad seek whence"),
        };
        let target = base + off;
        if target < 0 || target as usize > cb.data.len() {
            return set_error("seek out of range");
        }
        cb.pos = target as usize;
        Ok(target)
    }
}

/// Open a read-only file over a copy of `data`. `name` is the display
/// name used in source markers.
pub fn open_charbuf(ip: &mut Interp, data: &[u8], name: Obj) -> Res<Obj> {
    let cb = Box::new(CharBuf {
        data: data.to_vec(),
        pos: 0,
    });
    new_file(ip, Box::into_raw(cb) as *mut libc::c_void, &CHARBUF_FTYPE, name)
}

//! The stdio file adapter and the I/O intrinsics.
//!
//! The adapter implements the core's ftype contract over the process
//! streams and ordinary files. Reads are buffered; one character of
//! pushback is kept in the handle, as the lexer expects of any file
//! it is given.

use crate::render::render;
use marl_core::cfunc::{CfuncImpl, Frame};
use marl_core::err::{set_error, Res};
use marl_core::file::{close_file, fileof, new_file, Ftype, EOF};
use marl_core::int::new_int;
use marl_core::interp::Interp;
use marl_core::object::{Obj, O_CLOSED};
use marl_core::string::{new_str, strof};
use std::io::{BufRead, BufReader, Read, Write};

enum Stream {
    In,
    Out,
    Err,
    Reader(BufReader<std::fs::File>),
    Writer(std::fs::File),
}

struct StdioInner {
    stream: Stream,
    ungot: i32,
    at_eof: bool,
}

pub struct StdioFtype;

pub static STDIO_FTYPE: StdioFtype = StdioFtype;

fn inner<'a>(f: *mut libc::c_void) -> &'a mut StdioInner {
    unsafe { &mut *(f as *mut StdioInner) }
}

impl Ftype for StdioFtype {
    fn getch(&self, f: *mut libc::c_void) -> i32 {
        let s = inner(f);
        if s.ungot != -1 {
            let c = s.ungot;
            s.ungot = -1;
            return c;
        }
        let mut b = [0u8; 1];
        let n = match &mut s.stream {
            Stream::In => std::io::stdin().read(&mut b),
            Stream::Reader(r) => r.read(&mut b),
            _ => return EOF,
        };
        match n {
            Ok(1) => b[0] as i32,
            _ => {
                s.at_eof = true;
                EOF
            }
        }
    }

    fn ungetch(&self, f: *mut libc::c_void, c: i32) -> i32 {
        let s = inner(f);
        if c == EOF || s.ungot != -1 {
            return EOF;
        }
        s.ungot = c;
        c
    }

    fn write(&self, f: *mut libc::c_void, data: &[u8]) -> Res<usize> {
        let s = inner(f);
        let r = match &mut s.stream {
            Stream::Out => std::io::stdout().write_all(data),
            Stream::Err => std::io::stderr().write_all(data),
            Stream::Writer(w) => w.write_all(data),
            _ => return set_error("attempt to write a read-only file"),
        };
        match r {
            Ok(()) => Ok(data.len()),
            Err(e) => set_error(format!("write failed: {e}")),
        }
    }

    fn flush(&self, f: *mut libc::c_void) -> Res {
        let s = inner(f);
        let r = match &mut s.stream {
            Stream::Out => std::io::stdout().flush(),
            Stream::Err => std::io::stderr().flush(),
            Stream::Writer(w) => w.flush(),
            _ => Ok(()),
        };
        if let Err(e) = r {
            return set_error(format!("flush failed: {e}"));
        }
        Ok(())
    }

    unsafe fn close(&self, f: *mut libc::c_void) -> Res {
        drop(Box::from_raw(f as *mut StdioInner));
        Ok(())
    }

    fn eof(&self, f: *mut libc::c_void) -> bool {
        inner(f).at_eof
    }
}

fn make_stdio(ip: &mut Interp, stream: Stream, name: &str) -> Res<Obj> {
    let boxed = Box::new(StdioInner {
        stream,
        ungot: -1,
        at_eof: false,
    });
    let n = new_str(ip, name.as_bytes())?;
    let f = new_file(ip, Box::into_raw(boxed) as *mut libc::c_void, &STDIO_FTYPE, n);
    n.decref();
    f
}

/// Bind `stdin`, `stdout` and `stderr` in the base scope.
pub fn init_stdio(ip: &mut Interp) -> Res {
    for (name, stream) in [
        ("stdin", Stream::In),
        ("stdout", Stream::Out),
        ("stderr", Stream::Err),
    ] {
        let f = make_stdio(ip, stream, name)?;
        let key = new_str(ip, name.as_bytes())?;
        let base = ip.base_scope;
        marl_core::map::assign_base(ip, base, key, f)?;
        key.decref();
        f.decref();
    }
    Ok(())
}

pub const CFUNCS: &[(&str, CfuncImpl)] = &[
    ("print", f_print),
    ("println", f_println),
    ("getline", f_getline),
    ("fopen", f_fopen),
    ("close", f_close),
    ("read", f_read),
    ("write", f_write),
    ("eof", f_eof),
    ("flush", f_flush),
];

fn print_args(ip: &mut Interp, fr: &Frame) -> Res {
    let mut out = String::new();
    for i in 0..fr.nargs {
        out.push_str(&render(ip, fr.arg(ip, i)));
    }
    if std::io::stdout().write_all(out.as_bytes()).is_err() {
        return set_error("write to stdout failed");
    }
    Ok(())
}

/// `print(x...)`: render the arguments to stdout.
fn f_print(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    print_args(ip, fr)?;
    let _ = std::io::stdout().flush();
    ip.o_null.incref();
    Ok(ip.o_null)
}

/// `println(x...)`: print plus a newline.
fn f_println(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    print_args(ip, fr)?;
    let r = std::io::stdout().write_all(b"\n");
    let _ = std::io::stdout().flush();
    if r.is_err() {
        return set_error("write to stdout failed");
    }
    ip.o_null.incref();
    Ok(ip.o_null)
}

/// `getline([file])`: the next line without its newline, or NULL at
/// end of input.
fn f_getline(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need_between(0, 1)?;
    if fr.nargs == 1 {
        let f = fr.file(ip, 0)?;
        if f.has_flag(O_CLOSED) {
            return set_error("attempt to read a closed file");
        }
        let ff = fileof(f);
        let mut line = Vec::new();
        loop {
            let c = ff.ftype.getch(ff.inner);
            if c == EOF {
                if line.is_empty() {
                    ip.o_null.incref();
                    return Ok(ip.o_null);
                }
                break;
            }
            if c == b'\n' as i32 {
                break;
            }
            line.push(c as u8);
        }
        return new_str(ip, &line);
    }
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) => {
            ip.o_null.incref();
            Ok(ip.o_null)
        }
        Ok(_) => {
            let trimmed = line.trim_end_matches(['\n', '\r']);
            new_str(ip, trimmed.as_bytes())
        }
        Err(e) => set_error(format!("read from stdin failed: {e}")),
    }
}

/// `fopen(path [, mode])`: mode "r" (default), "w" or "a".
fn f_fopen(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need_between(1, 2)?;
    let path_obj = fr.str_obj(ip, 0)?;
    let path = strof(path_obj).text().into_owned();
    let mode = if fr.nargs == 2 {
        strof(fr.str_obj(ip, 1)?).text().into_owned()
    } else {
        "r".to_string()
    };
    let stream = match mode.as_str() {
        "r" => match std::fs::File::open(&path) {
            Ok(f) => Stream::Reader(BufReader::new(f)),
            Err(e) => return set_error(format!("{path}: {e}")),
        },
        "w" => match std::fs::File::create(&path) {
            Ok(f) => Stream::Writer(f),
            Err(e) => return set_error(format!("{path}: {e}")),
        },
        "a" => match std::fs::OpenOptions::new().append(true).create(true).open(&path) {
            Ok(f) => Stream::Writer(f),
            Err(e) => return set_error(format!("{path}: {e}")),
        },
        _ => return set_error(format!("bad open mode \"{mode}\"")),
    };
    make_stdio(ip, stream, &path)
}

/// `close(f)`.
fn f_close(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(1)?;
    let f = fr.file(ip, 0)?;
    close_file(ip, f)?;
    ip.o_null.incref();
    Ok(ip.o_null)
}

/// `read(f [, n])`: up to `n` bytes (default: the rest) as a string.
fn f_read(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need_between(1, 2)?;
    let f = fr.file(ip, 0)?;
    if f.has_flag(O_CLOSED) {
        return set_error("attempt to read a closed file");
    }
    let want = if fr.nargs == 2 {
        fr.int(ip, 1)?.max(0) as usize
    } else {
        usize::MAX
    };
    let ff = fileof(f);
    let mut data = Vec::new();
    while data.len() < want {
        let c = ff.ftype.getch(ff.inner);
        if c == EOF {
            break;
        }
        data.push(c as u8);
    }
    new_str(ip, &data)
}

/// `write(f, s)`: returns the byte count written.
fn f_write(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(2)?;
    let f = fr.file(ip, 0)?;
    if f.has_flag(O_CLOSED) {
        return set_error("attempt to write a closed file");
    }
    let s = fr.str_obj(ip, 1)?;
    let data = strof(s).bytes().to_vec();
    let ff = fileof(f);
    let n = ff.ftype.write(ff.inner, &data)?;
    new_int(ip, n as i64)
}

/// `eof(f)`.
fn f_eof(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(1)?;
    let f = fr.file(ip, 0)?;
    let ff = fileof(f);
    new_int(ip, ff.ftype.eof(ff.inner) as i64)
}

/// `flush(f)`.
fn f_flush(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(1)?;
    let f = fr.file(ip, 0)?;
    let ff = fileof(f);
    ff.ftype.flush(ff.inner)?;
    ip.o_null.incref();
    Ok(ip.o_null)
}

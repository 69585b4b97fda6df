//! Native callables and the argument frame they receive.
//!
//! A cfunc implementation gets the interpreter and a [`Frame`]
//! describing the arguments sitting on the operand stack; it returns
//! an owned result object, and the call machinery replaces the
//! argument frame with it. `Frame`'s accessors are the `typecheck`
//! surface: they validate and extract native-style parameters, and
//! complain with `argerror`/`argcount` in the standard format.

use crate::err::{argcount, argerror, set_error, Res};
use crate::func::find_arg_mark;
use crate::interp::Interp;
use crate::object::{
    Obj, ObjType, Object, O_MARK, TC_ARRAY, TC_CFUNC, TC_CHANNEL, TC_FILE, TC_FLOAT, TC_FUNC,
    TC_INT, TC_MAP, TC_METHOD, TC_REGEXP, TC_SET, TC_STRING,
};

/// A native function: receives its argument frame, returns an owned
/// result.
pub type CfuncImpl = fn(&mut Interp, &Frame) -> Res<Obj>;

#[repr(C)]
pub struct CfuncObj {
    pub header: Object,
    pub name: &'static str,
    pub func: CfuncImpl,
    /// Two uninterpreted words a table can use to make one native
    /// implementation serve several intrinsics.
    pub arg1: usize,
    pub arg2: usize,
}

#[inline(always)]
pub fn cfuncof<'a>(o: Obj) -> &'a CfuncObj {
    debug_assert_eq!(o.tcode(), TC_CFUNC);
    unsafe { &*(o.ptr() as *const CfuncObj) }
}

pub fn new_cfunc(ip: &mut Interp, name: &'static str, func: CfuncImpl) -> Res<Obj> {
    new_cfunc_args(ip, name, func, 0, 0)
}

pub fn new_cfunc_args(
    ip: &mut Interp,
    name: &'static str,
    func: CfuncImpl,
    arg1: usize,
    arg2: usize,
) -> Res<Obj> {
    let p: *mut CfuncObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_CFUNC, 0, 1, 0);
    unsafe {
        (*p).name = name;
        (*p).func = func;
        (*p).arg1 = arg1;
        (*p).arg2 = arg2;
    }
    ip.rego(o);
    Ok(o)
}

/// The argument frame of an in-progress native call.
pub struct Frame {
    /// Index of the mark on the operand stack.
    pub base: usize,
    pub nargs: usize,
    /// Bound subject when invoked through a method value.
    pub subject: Option<Obj>,
    /// The cfunc being run: its name for diagnostics, its aux words
    /// for shared implementations.
    pub cf: Obj,
    pub name: &'static str,
}

impl Frame {
    /// The `i`th argument (borrowed: it stays rooted by the operand
    /// stack for the duration of the call).
    pub fn arg(&self, ip: &Interp, i: usize) -> Obj {
        debug_assert!(i < self.nargs);
        ip.os().get(self.base + 1 + i)
    }

    /// Fail unless exactly `n` arguments were passed.
    pub fn need(&self, n: usize) -> Res {
        if self.nargs != n {
            return argcount(n, self.nargs);
        }
        Ok(())
    }

    /// Fail unless between `lo` and `hi` arguments were passed.
    pub fn need_between(&self, lo: usize, hi: usize) -> Res {
        if self.nargs < lo || self.nargs > hi {
            return argcount(lo, self.nargs);
        }
        Ok(())
    }

    pub fn int(&self, ip: &Interp, i: usize) -> Res<i64> {
        let o = self.arg(ip, i);
        if o.tcode() != TC_INT {
            return argerror(i);
        }
        Ok(crate::int::intof(o).value)
    }

    pub fn float(&self, ip: &Interp, i: usize) -> Res<f64> {
        let o = self.arg(ip, i);
        if o.tcode() != TC_FLOAT {
            return argerror(i);
        }
        Ok(crate::float::floatof(o).value)
    }

    /// Any number, widened to a double.
    pub fn num(&self, ip: &Interp, i: usize) -> Res<f64> {
        let o = self.arg(ip, i);
        match o.tcode() {
            TC_INT => Ok(crate::int::intof(o).value as f64),
            TC_FLOAT => Ok(crate::float::floatof(o).value),
            _ => argerror(i),
        }
    }

    pub fn str_obj(&self, ip: &Interp, i: usize) -> Res<Obj> {
        let o = self.arg(ip, i);
        if o.tcode() != TC_STRING {
            return argerror(i);
        }
        Ok(o)
    }

    pub fn array(&self, ip: &Interp, i: usize) -> Res<Obj> {
        let o = self.arg(ip, i);
        if o.tcode() != TC_ARRAY {
            return argerror(i);
        }
        Ok(o)
    }

    pub fn map(&self, ip: &Interp, i: usize) -> Res<Obj> {
        let o = self.arg(ip, i);
        if o.tcode() != TC_MAP {
            return argerror(i);
        }
        Ok(o)
    }

    pub fn channel(&self, ip: &Interp, i: usize) -> Res<Obj> {
        let o = self.arg(ip, i);
        if o.tcode() != TC_CHANNEL {
            return argerror(i);
        }
        Ok(o)
    }

    pub fn file(&self, ip: &Interp, i: usize) -> Res<Obj> {
        let o = self.arg(ip, i);
        if o.tcode() != TC_FILE {
            return argerror(i);
        }
        Ok(o)
    }

    pub fn regexp(&self, ip: &Interp, i: usize) -> Res<Obj> {
        let o = self.arg(ip, i);
        if o.tcode() != TC_REGEXP {
            return argerror(i);
        }
        Ok(o)
    }

    pub fn callable(&self, ip: &Interp, i: usize) -> Res<Obj> {
        let o = self.arg(ip, i);
        match o.tcode() {
            TC_FUNC | TC_CFUNC | TC_METHOD => Ok(o),
            _ => argerror(i),
        }
    }

    /// Validate the whole frame against a type-spec string: one
    /// character per argument, `i` int, `f` float, `n` any number,
    /// `s` string, `a` array, `m` map, `e` set, `r` regexp, `u` file,
    /// `c` callable, `o` anything; a trailing `*` allows extras.
    pub fn typecheck(&self, ip: &Interp, spec: &str) -> Res {
        let mut want = 0usize;
        for (i, ch) in spec.chars().enumerate() {
            if ch == '*' {
                return Ok(());
            }
            want = i + 1;
            if i >= self.nargs {
                return argcount(spec.chars().filter(|&c| c != '*').count(), self.nargs);
            }
            let o = self.arg(ip, i);
            let ok = match ch {
                'i' => o.tcode() == TC_INT,
                'f' => o.tcode() == TC_FLOAT,
                'n' => matches!(o.tcode(), TC_INT | TC_FLOAT),
                's' => o.tcode() == TC_STRING,
                'a' => o.tcode() == TC_ARRAY,
                'm' => o.tcode() == TC_MAP,
                'e' => o.tcode() == TC_SET,
                'r' => o.tcode() == TC_REGEXP,
                'u' => o.tcode() == TC_FILE,
                'c' => matches!(o.tcode(), TC_FUNC | TC_CFUNC | TC_METHOD),
                'o' => true,
                _ => return set_error(format!("bad typecheck spec character '{ch}'")),
            };
            if !ok {
                return argerror(i);
            }
        }
        if self.nargs != want {
            return argcount(want, self.nargs);
        }
        Ok(())
    }
}

/// Define a table of natives in the base scope, keyed by their names.
pub fn define_cfuncs(ip: &mut Interp, table: &[(&'static str, CfuncImpl)]) -> Res {
    for &(name, func) in table {
        let cf = new_cfunc(ip, name, func)?;
        let key = crate::string::new_str(ip, name.as_bytes())?;
        let base = ip.base_scope;
        crate::map::assign_base(ip, base, key, cf)?;
        key.decref();
        cf.decref();
    }
    Ok(())
}

pub struct CfuncType;

impl ObjType for CfuncType {
    fn name(&self) -> &'static str {
        "cfunc"
    }

    fn mark(&self, _ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        std::mem::size_of::<CfuncObj>()
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        ip.tfree::<CfuncObj>(o.cast());
    }

    /// Run the native function over its frame: it reads the arguments
    /// off the operand stack and its single result replaces the frame
    /// down to the mark.
    fn call(&self, ip: &mut Interp, o: Obj, subject: Option<Obj>) -> Res {
        let base = find_arg_mark(ip)?;
        let frame = Frame {
            base,
            nargs: ip.os().len() - base - 1,
            subject,
            cf: o,
            name: cfuncof(o).name,
        };
        let r = (cfuncof(o).func)(ip, &frame)?;
        ip.os().truncate(base);
        ip.os_push(r)?;
        r.decref();
        Ok(())
    }
}

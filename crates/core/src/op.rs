//! Ops: the units of VM work. An op is an execution code (selecting a
//! case in the engine's dispatch), a 16-bit operand baked in at
//! compile time, and an optional native function for ops supplied by
//! extensions. Ops are atomic, so the compiler shares one object per
//! distinct (func, ecode, code) triple.

use crate::err::Res;
use crate::interp::Interp;
use crate::object::{Obj, ObjType, Object, O_ATOM, O_MARK, TC_OP};

/// Execution codes; the engine's big switch is keyed on these.
pub mod ecode {
    /// Call the op's native function.
    pub const OTHER: u16 = 0;
    /// Call: operand stack holds mark, args, callable.
    pub const CALL: u16 = 1;
    /// Take the next code-array element literally onto the operand
    /// stack (escapes the "string means variable" rule).
    pub const QUOTE: u16 = 2;
    /// Binary operator; `code` is the `binop::Binop` discriminant.
    pub const BINOP: u16 = 3;
    /// Unary operator; `code` is 0 `-`, 1 `!`, 2 `~`.
    pub const UNARY: u16 = 4;
    /// Pop value, key, aggregate; assign; push value.
    pub const ASSIGN: u16 = 5;
    /// Pop value then name; assign through the scope chain
    /// (`code` 0) or define in the innermost scope (`code` 1).
    pub const ASSIGN_NAME: u16 = 6;
    /// Pop key, aggregate; push the fetched element.
    pub const FETCH: u16 = 7;
    /// As FETCH but leaves aggregate and key in place (for compound
    /// assignment).
    pub const FETCH_KEEP: u16 = 8;
    /// Pop key, aggregate; push a ptr.
    pub const MKPTR: u16 = 9;
    /// Pop a name; push a ptr to the scope binding it.
    pub const MKPTR_NAME: u16 = 10;
    /// Pop a ptr; push the value it addresses.
    pub const OPENPTR: u16 = 11;
    /// As OPENPTR but leaves the ptr in place.
    pub const OPENPTR_KEEP: u16 = 12;
    /// Pop value, then a ptr; assign through the ptr; push the value.
    pub const ASSIGN_PTR: u16 = 13;
    /// Pop a branch array and the condition; maybe enter the branch.
    pub const IF: u16 = 14;
    /// Pop else-array, then-array, condition; enter one.
    pub const IFELSE: u16 = 15;
    /// Pop the condition; break out of the loop when false.
    pub const IFNOTBREAK: u16 = 16;
    /// Pop the loop code array; install a loop frame. `code` is the
    /// first-entry offset into the array.
    pub const LOOP: u16 = 17;
    pub const BREAK: u16 = 18;
    pub const CONTINUE: u16 = 19;
    /// Short-circuit logical op; `code` 1 for `&&`, 0 for `||`.
    pub const ANDAND: u16 = 20;
    /// Pop a value; push 1 or 0 by its truth.
    pub const ISTRUE: u16 = 21;
    /// Return from the current function call.
    pub const RETURN: u16 = 22;
    /// Pop handler array; install an error catcher.
    pub const ONERROR: u16 = 23;
    /// Discard the operand stack top (expression statements).
    pub const POP: u16 = 24;
}

/// Native op implementation.
pub type OpFunc = fn(&mut Interp) -> Res<()>;

#[repr(C)]
pub struct OpObj {
    pub header: Object,
    pub func: Option<OpFunc>,
    pub ecode: u16,
    pub code: i16,
}

const OP_PRIME: u64 = 0x0008_E60D_2C4F;

#[inline(always)]
pub fn opof<'a>(o: Obj) -> &'a OpObj {
    debug_assert_eq!(o.tcode(), TC_OP);
    unsafe { &*(o.ptr() as *const OpObj) }
}

#[inline(always)]
fn op_hash(func: Option<OpFunc>, ecode: u16, code: i16) -> u64 {
    let f = func.map_or(0usize, |f| f as usize) as u64;
    OP_PRIME.wrapping_mul(f.wrapping_add(ecode as u64).wrapping_add(code as u64))
}

/// The op with the given fields; an existing atom is reused.
pub fn new_op(ip: &mut Interp, func: Option<OpFunc>, ecode: u16, code: i16) -> Res<Obj> {
    let h = op_hash(func, ecode, code);
    let (found, slot) = ip.atom_probe2(h, |_, e| {
        if e.tcode() != TC_OP {
            return false;
        }
        let op = opof(e);
        op.func.map(|f| f as usize) == func.map(|f| f as usize)
            && op.ecode == ecode
            && op.code == code
    });
    if let Some(o) = found {
        o.incref();
        return Ok(o);
    }
    let pause = ip.pause_gc();
    let p: *mut OpObj = ip.talloc()?;
    let o = unsafe { Obj::from_raw(p as *mut Object) };
    o.set_tfnz(TC_OP, O_ATOM, 1, std::mem::size_of::<OpObj>());
    unsafe {
        (*p).func = func;
        (*p).ecode = ecode;
        (*p).code = code;
    }
    ip.rego(o);
    drop(pause);
    ip.store_atom_and_count(slot, o);
    Ok(o)
}

pub struct OpType;

impl ObjType for OpType {
    fn name(&self) -> &'static str {
        "op"
    }

    fn mark(&self, _ip: &Interp, o: Obj) -> usize {
        o.set_flag(O_MARK);
        std::mem::size_of::<OpObj>()
    }

    unsafe fn free(&self, ip: &mut Interp, o: Obj) {
        ip.tfree::<OpObj>(o.cast());
    }

    fn hash(&self, _ip: &Interp, o: Obj) -> u64 {
        let op = opof(o);
        op_hash(op.func, op.ecode, op.code)
    }

    fn eq(&self, _ip: &Interp, a: Obj, b: Obj) -> bool {
        let (oa, ob) = (opof(a), opof(b));
        oa.func.map(|f| f as usize) == ob.func.map(|f| f as usize)
            && oa.ecode == ob.ecode
            && oa.code == ob.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::with_interp;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_ops_intern_on_their_fields() {
        with_interp(|ip| {
            let a = new_op(ip, None, ecode::BINOP, 3).unwrap();
            let b = new_op(ip, None, ecode::BINOP, 3).unwrap();
            let c = new_op(ip, None, ecode::BINOP, 4).unwrap();
            assert_eq!(a, b);
            assert_ne!(a, c);
            assert!(a.is_atom());
            a.decref();
            b.decref();
            c.decref();
        });
    }
}

//! Expression compilation: conventional left-to-right post-order
//! emission of an expression tree into a code array.
//!
//! Code arrays hold ops (shared atoms), literal object references and
//! src markers. A bare string in a code array is a variable reference,
//! so string literals are escaped with a quote op. Short-circuit `&&`
//! and `||` compile their right operand into a nested code array
//! entered conditionally.

use crate::ast::{AssignKind, Expr, UnOp};
use marl_core::array::{new_array, push};
use marl_core::err::{set_error, Res};
use marl_core::interp::Interp;
use marl_core::object::Obj;
use marl_core::op::{ecode, new_op};

/// Append an owned object to a code array, transferring the
/// reference.
pub(crate) fn emit_owned(ip: &mut Interp, code: Obj, o: Obj) -> Res {
    push(ip, code, o)?;
    o.decref();
    Ok(())
}

/// Append a borrowed object to a code array.
pub(crate) fn emit(ip: &mut Interp, code: Obj, o: Obj) -> Res {
    push(ip, code, o)
}

/// Append the op with the given execution code and operand.
pub(crate) fn emit_op(ip: &mut Interp, code: Obj, ec: u16, operand: i16) -> Res {
    let op = new_op(ip, None, ec, operand)?;
    emit_owned(ip, code, op)
}

/// Append a quoted literal: the quote op plus the object itself.
pub(crate) fn emit_quoted(ip: &mut Interp, code: Obj, o: Obj) -> Res {
    emit_op(ip, code, ecode::QUOTE, 0)?;
    emit(ip, code, o)
}

/// Compile `e` into `code`. With `for_value` false the value is
/// discarded (expression statements).
pub fn compile_expr(ip: &mut Interp, code: Obj, e: &Expr, for_value: bool) -> Res {
    compile_value(ip, code, e)?;
    if !for_value {
        emit_op(ip, code, ecode::POP, 0)?;
    }
    Ok(())
}

fn compile_value(ip: &mut Interp, code: Obj, e: &Expr) -> Res {
    match *e {
        Expr::Literal(o) => emit(ip, code, o),
        Expr::StrLit(s) => emit_quoted(ip, code, s),
        Expr::Name(n) => emit(ip, code, n),

        Expr::Unary(op, operand) => {
            compile_value(ip, code, operand)?;
            let c = match op {
                UnOp::Neg => 0,
                UnOp::Not => 1,
                UnOp::Compl => 2,
            };
            emit_op(ip, code, ecode::UNARY, c)
        }

        Expr::Binary(bop, lhs, rhs) => {
            compile_value(ip, code, lhs)?;
            compile_value(ip, code, rhs)?;
            emit_op(ip, code, ecode::BINOP, bop)
        }

        Expr::LogAnd(lhs, rhs) => compile_logical(ip, code, lhs, rhs, 1),
        Expr::LogOr(lhs, rhs) => compile_logical(ip, code, lhs, rhs, 0),

        Expr::Index(aggr, key) => {
            compile_value(ip, code, aggr)?;
            compile_value(ip, code, key)?;
            emit_op(ip, code, ecode::FETCH, 0)
        }

        Expr::Call(f, args) => {
            emit(ip, code, ip.o_mark)?;
            for a in args {
                compile_value(ip, code, a)?;
            }
            compile_value(ip, code, f)?;
            emit_op(ip, code, ecode::CALL, 0)
        }

        Expr::Assign(kind, lhs, rhs) => compile_assign(ip, code, kind, lhs, rhs),

        Expr::Addr(lv) => match *lv {
            Expr::Name(n) => {
                emit_quoted(ip, code, n)?;
                emit_op(ip, code, ecode::MKPTR_NAME, 0)
            }
            Expr::Index(aggr, key) => {
                compile_value(ip, code, aggr)?;
                compile_value(ip, code, key)?;
                emit_op(ip, code, ecode::MKPTR, 0)
            }
            _ => set_error("attempt to take the address of a non-lvalue"),
        },

        Expr::Deref(p) => {
            compile_value(ip, code, p)?;
            emit_op(ip, code, ecode::OPENPTR, 0)
        }
    }
}

/// `lhs && rhs` / `lhs || rhs`: the right operand goes into a nested
/// code array ending in a truth test; the andand op either short
/// circuits to 0/1 or enters it.
fn compile_logical(ip: &mut Interp, code: Obj, lhs: &Expr, rhs: &Expr, is_and: i16) -> Res {
    compile_value(ip, code, lhs)?;
    let sub = new_array(ip, 4)?;
    let r = (|| {
        compile_value(ip, sub, rhs)?;
        emit_op(ip, sub, ecode::ISTRUE, 0)?;
        emit(ip, code, sub)?;
        emit_op(ip, code, ecode::ANDAND, is_and)
    })();
    sub.decref();
    r
}

/// Assignments classify their left side: a bare name resolves through
/// the scope chain (or defines locally for `:=`), an aggregate access
/// emits aggregate + key + assign, a deref assigns through the ptr.
/// Compound forms re-fetch the current value with the keep variants
/// so the aggregate and key are evaluated once.
fn compile_assign(ip: &mut Interp, code: Obj, kind: AssignKind, lhs: &Expr, rhs: &Expr) -> Res {
    match *lhs {
        Expr::Name(n) => {
            emit_quoted(ip, code, n)?;
            match kind {
                AssignKind::Plain => {
                    compile_value(ip, code, rhs)?;
                    emit_op(ip, code, ecode::ASSIGN_NAME, 0)
                }
                AssignKind::Define => {
                    compile_value(ip, code, rhs)?;
                    emit_op(ip, code, ecode::ASSIGN_NAME, 1)
                }
                AssignKind::Compound(bop) => {
                    emit(ip, code, n)?;
                    compile_value(ip, code, rhs)?;
                    emit_op(ip, code, ecode::BINOP, bop)?;
                    emit_op(ip, code, ecode::ASSIGN_NAME, 0)
                }
            }
        }

        Expr::Index(aggr, key) => {
            compile_value(ip, code, aggr)?;
            compile_value(ip, code, key)?;
            match kind {
                AssignKind::Plain | AssignKind::Define => {
                    compile_value(ip, code, rhs)?;
                    emit_op(ip, code, ecode::ASSIGN, 0)
                }
                AssignKind::Compound(bop) => {
                    emit_op(ip, code, ecode::FETCH_KEEP, 0)?;
                    compile_value(ip, code, rhs)?;
                    emit_op(ip, code, ecode::BINOP, bop)?;
                    emit_op(ip, code, ecode::ASSIGN, 0)
                }
            }
        }

        Expr::Deref(p) => {
            compile_value(ip, code, p)?;
            match kind {
                AssignKind::Plain | AssignKind::Define => {
                    compile_value(ip, code, rhs)?;
                    emit_op(ip, code, ecode::ASSIGN_PTR, 0)
                }
                AssignKind::Compound(bop) => {
                    emit_op(ip, code, ecode::OPENPTR_KEEP, 0)?;
                    compile_value(ip, code, rhs)?;
                    emit_op(ip, code, ecode::BINOP, bop)?;
                    emit_op(ip, code, ecode::ASSIGN_PTR, 0)
                }
            }
        }

        _ => set_error("attempt to assign to a non-lvalue"),
    }
}

//! The recursive-descent parser.
//!
//! Statements compile straight into code arrays as they are parsed
//! (the engine runs each top-level statement as soon as it is
//! complete); expressions build arena trees handed to `compile`.
//! Parse-time constructs — literal aggregates and function literals —
//! are evaluated immediately, so a function's captured scope is
//! whatever scope is active at its definition point.

use crate::ast::{AssignKind, Expr, UnOp};
use crate::compile::{compile_expr, emit, emit_op, emit_owned};
use crate::lex::Lexer;
use crate::token::Tok;
use bumpalo::Bump;
use marl_core::array::{arrayof, new_array, push};
use marl_core::err::{get_error, Res};
use marl_core::func::new_func;
use marl_core::interp::Interp;
use marl_core::map::{assign_base, new_map_with_super};
use marl_core::object::Obj;
use marl_core::op::ecode;
use marl_core::regexp::new_regexp;
use marl_core::set::add as set_add;
use marl_core::src::new_src;
use marl_core::string::new_str;
use marl_core::vm::exec_code;
use marl_core::{binop, set_error};

pub type PResult<T> = Result<T, String>;

pub struct Parser<'ip> {
    pub ip: &'ip mut Interp,
    lexer: Lexer,
    tok: Tok,
    /// Display name of the source, for src markers.
    filename: Obj,
    /// Objects created for the current statement, pinned until it has
    /// been compiled (and usually run).
    owned: Vec<Obj>,
    loop_depth: u32,
}

impl<'ip> Parser<'ip> {
    pub fn new(ip: &'ip mut Interp, parse: Obj, filename: Obj) -> PResult<Parser<'ip>> {
        let mut p = Parser {
            ip,
            lexer: Lexer::new(parse),
            tok: Tok::Eof,
            filename,
            owned: Vec::new(),
            loop_depth: 0,
        };
        p.advance()?;
        Ok(p)
    }

    /// Release the per-statement pins.
    pub fn drain_owned(&mut self) {
        for o in self.owned.drain(..) {
            o.decref();
        }
    }

    fn advance(&mut self) -> PResult<()> {
        self.tok = self.lexer.next()?;
        Ok(())
    }

    fn err<T>(&self, msg: impl Into<String>) -> PResult<T> {
        Err(format!("line {}: {}", self.lexer.lineno(), msg.into()))
    }

    /// Convert a core failure into a parse error, consuming the
    /// thread-local message.
    fn r<T>(&self, x: Res<T>) -> PResult<T> {
        x.map_err(|_| {
            let msg = get_error().unwrap_or_else(|| "error".to_string());
            marl_core::clear_error();
            msg
        })
    }

    fn own(&mut self, o: Obj) -> Obj {
        self.owned.push(o);
        o
    }

    fn expect(&mut self, t: Tok, what: &str) -> PResult<()> {
        if self.tok == t {
            self.advance()
        } else {
            self.err(format!("expected {what}, got {:?}", self.tok))
        }
    }

    fn name_obj(&mut self, name: &str) -> PResult<Obj> {
        let bytes = name.as_bytes().to_vec();
        let s = {
            let r = new_str(self.ip, &bytes);
            self.r(r)?
        };
        Ok(self.own(s))
    }

    // --- Statements ----------------------------------------------------

    /// Parse one statement into `code`. Returns false at end of input.
    pub fn stmt(&mut self, code: Obj) -> PResult<bool> {
        if self.tok == Tok::Eof {
            return Ok(false);
        }
        self.stmt_inner(code)?;
        Ok(true)
    }

    /// Every statement opens with a src marker recording its position.
    fn stmt_inner(&mut self, code: Obj) -> PResult<()> {
        let src = {
            let line = self.lexer.lineno();
            let filename = self.filename;
            let r = new_src(self.ip, line, filename);
            self.r(r)?
        };
        let r = emit_owned(self.ip, code, src);
        self.r(r)?;
        self.stmt_body(code)
    }

    fn stmt_body(&mut self, code: Obj) -> PResult<()> {
        match self.tok.clone() {
            Tok::Semi => self.advance(),
            Tok::LBrace => {
                self.advance()?;
                while self.tok != Tok::RBrace {
                    if self.tok == Tok::Eof {
                        return self.err("unexpected end of input in compound statement");
                    }
                    self.stmt_inner(code)?;
                }
                self.advance()
            }
            Tok::If => self.if_stmt(code),
            Tok::While => self.while_stmt(code),
            Tok::Do => self.do_stmt(code),
            Tok::For => self.for_stmt(code),
            Tok::Try => self.try_stmt(code),
            Tok::Return => {
                self.advance()?;
                if self.tok == Tok::Semi {
                    let null = self.ip.o_null;
                    let r = emit(self.ip, code, null);
                    self.r(r)?;
                } else {
                    self.expr_into(code, true)?;
                }
                self.expect(Tok::Semi, "';'")?;
                let r = emit_op(self.ip, code, ecode::RETURN, 0);
                self.r(r)
            }
            Tok::Break => {
                if self.loop_depth == 0 {
                    return self.err("break outside a loop");
                }
                self.advance()?;
                self.expect(Tok::Semi, "';'")?;
                let r = emit_op(self.ip, code, ecode::BREAK, 0);
                self.r(r)
            }
            Tok::Continue => {
                if self.loop_depth == 0 {
                    return self.err("continue outside a loop");
                }
                self.advance()?;
                self.expect(Tok::Semi, "';'")?;
                let r = emit_op(self.ip, code, ecode::CONTINUE, 0);
                self.r(r)
            }
            _ => {
                self.expr_into(code, false)?;
                self.expect(Tok::Semi, "';'")
            }
        }
    }

    /// Parse an expression and compile it into `code`.
    fn expr_into(&mut self, code: Obj, for_value: bool) -> PResult<()> {
        let arena = Bump::new();
        let e = self.expr(&arena)?;
        let r = compile_expr(self.ip, code, e, for_value);
        self.r(r)
    }

    /// Compile a statement into a fresh (pinned) code array.
    fn sub_block(&mut self) -> PResult<Obj> {
        let a = {
            let r = new_array(self.ip, 8);
            self.r(r)?
        };
        let a = self.own(a);
        self.stmt_inner(a)?;
        Ok(a)
    }

    fn if_stmt(&mut self, code: Obj) -> PResult<()> {
        self.advance()?;
        self.expect(Tok::LParen, "'(' after if")?;
        self.expr_into(code, true)?;
        self.expect(Tok::RParen, "')'")?;
        let then_a = self.sub_block()?;
        if self.tok == Tok::Else {
            self.advance()?;
            let else_a = self.sub_block()?;
            let r = (|ip: &mut Interp| {
                emit(ip, code, then_a)?;
                emit(ip, code, else_a)?;
                emit_op(ip, code, ecode::IFELSE, 0)
            })(self.ip);
            self.r(r)
        } else {
            let r = (|ip: &mut Interp| {
                emit(ip, code, then_a)?;
                emit_op(ip, code, ecode::IF, 0)
            })(self.ip);
            self.r(r)
        }
    }

    /// `while (cond) body` becomes a loop array `[cond, ifnotbreak,
    /// body]` entered at 0.
    fn while_stmt(&mut self, code: Obj) -> PResult<()> {
        self.advance()?;
        self.expect(Tok::LParen, "'(' after while")?;
        let l = {
            let r = new_array(self.ip, 8);
            self.r(r)?
        };
        let l = self.own(l);
        let arena = Bump::new();
        let cond = self.expr(&arena)?;
        let r = compile_expr(self.ip, l, cond, true);
        self.r(r)?;
        drop(arena);
        self.expect(Tok::RParen, "')'")?;
        let r = emit_op(self.ip, l, ecode::IFNOTBREAK, 0);
        self.r(r)?;
        self.loop_depth += 1;
        let body = self.stmt_inner(l);
        self.loop_depth -= 1;
        body?;
        let r = (|ip: &mut Interp| {
            emit(ip, code, l)?;
            emit_op(ip, code, ecode::LOOP, 0)
        })(self.ip);
        self.r(r)
    }

    /// `do body while (cond);` becomes `[cond, ifnotbreak, body]`
    /// entered at the body, so `continue` re-tests the condition.
    fn do_stmt(&mut self, code: Obj) -> PResult<()> {
        self.advance()?;
        let b = {
            let r = new_array(self.ip, 8);
            self.r(r)?
        };
        let b = self.own(b);
        self.loop_depth += 1;
        let body = self.stmt_inner(b);
        self.loop_depth -= 1;
        body?;
        if !matches!(self.tok, Tok::While) {
            return self.err("expected while after do body");
        }
        self.advance()?;
        self.expect(Tok::LParen, "'(' after while")?;
        let l = {
            let r = new_array(self.ip, 8);
            self.r(r)?
        };
        let l = self.own(l);
        self.expr_into(l, true)?;
        self.expect(Tok::RParen, "')'")?;
        self.expect(Tok::Semi, "';'")?;
        let r = (|ip: &mut Interp| -> Res<i16> {
            emit_op(ip, l, ecode::IFNOTBREAK, 0)?;
            let entry = check_entry_fits(arrayof(l).len())?;
            for i in 0..arrayof(b).len() {
                emit(ip, l, arrayof(b).get(i))?;
            }
            Ok(entry)
        })(self.ip);
        let entry = self.r(r)?;
        let r = (|ip: &mut Interp| {
            emit(ip, code, l)?;
            emit_op(ip, code, ecode::LOOP, entry)
        })(self.ip);
        self.r(r)
    }

    /// `for (init; cond; step) body` becomes `[step, cond,
    /// ifnotbreak, body]` entered at the condition; `continue` runs
    /// the step first, like C.
    fn for_stmt(&mut self, code: Obj) -> PResult<()> {
        self.advance()?;
        self.expect(Tok::LParen, "'(' after for")?;
        if self.tok != Tok::Semi {
            self.expr_into(code, false)?;
        }
        self.expect(Tok::Semi, "';'")?;

        // Condition and step compile into holding arrays first; the
        // loop array wants them in execution order, not source order.
        let cond_a = {
            let r = new_array(self.ip, 4);
            let a = self.r(r)?;
            self.own(a)
        };
        if self.tok != Tok::Semi {
            self.expr_into(cond_a, true)?;
        } else {
            let one = {
                let r = marl_core::int::new_int(self.ip, 1);
                self.r(r)?
            };
            let one = self.own(one);
            let r = emit(self.ip, cond_a, one);
            self.r(r)?;
        }
        self.expect(Tok::Semi, "';'")?;

        let step_a = {
            let r = new_array(self.ip, 4);
            let a = self.r(r)?;
            self.own(a)
        };
        if self.tok != Tok::RParen {
            self.expr_into(step_a, false)?;
        }
        self.expect(Tok::RParen, "')'")?;

        let l = {
            let r = new_array(self.ip, 16);
            let a = self.r(r)?;
            self.own(a)
        };
        let r = (|ip: &mut Interp| -> Res<i16> {
            for i in 0..arrayof(step_a).len() {
                emit(ip, l, arrayof(step_a).get(i))?;
            }
            let entry = check_entry_fits(arrayof(l).len())?;
            for i in 0..arrayof(cond_a).len() {
                emit(ip, l, arrayof(cond_a).get(i))?;
            }
            emit_op(ip, l, ecode::IFNOTBREAK, 0)?;
            Ok(entry)
        })(self.ip);
        let entry = self.r(r)?;

        self.loop_depth += 1;
        let body = self.stmt_inner(l);
        self.loop_depth -= 1;
        body?;

        let r = (|ip: &mut Interp| {
            emit(ip, code, l)?;
            emit_op(ip, code, ecode::LOOP, entry)
        })(self.ip);
        self.r(r)
    }

    fn try_stmt(&mut self, code: Obj) -> PResult<()> {
        self.advance()?;
        let try_a = self.sub_block()?;
        if !matches!(self.tok, Tok::OnError) {
            return self.err("expected onerror after try statement");
        }
        self.advance()?;
        let handler_a = self.sub_block()?;
        let r = (|ip: &mut Interp| {
            emit(ip, code, try_a)?;
            emit(ip, code, handler_a)?;
            emit_op(ip, code, ecode::ONERROR, 0)
        })(self.ip);
        self.r(r)
    }

    // --- Expressions ---------------------------------------------------

    /// Full expression: assignment level, right associative.
    pub fn expr<'b>(&mut self, a: &'b Bump) -> PResult<&'b Expr<'b>> {
        let lhs = self.binary(a, 1)?;
        let kind = match self.tok {
            Tok::Assign => AssignKind::Plain,
            Tok::ColonAssign => AssignKind::Define,
            Tok::PlusEq => AssignKind::Compound(binop::ADD),
            Tok::MinusEq => AssignKind::Compound(binop::SUB),
            Tok::StarEq => AssignKind::Compound(binop::MUL),
            Tok::SlashEq => AssignKind::Compound(binop::DIV),
            Tok::PercentEq => AssignKind::Compound(binop::MOD),
            _ => return Ok(lhs),
        };
        self.advance()?;
        let rhs = self.expr(a)?;
        Ok(a.alloc(Expr::Assign(kind, lhs, rhs)))
    }

    /// Binding power of a binary operator token, with its binop code.
    fn binop_of(tok: &Tok) -> Option<(u8, i16)> {
        Some(match tok {
            Tok::Star => (10, binop::MUL),
            Tok::Slash => (10, binop::DIV),
            Tok::Percent => (10, binop::MOD),
            Tok::Plus => (9, binop::ADD),
            Tok::Minus => (9, binop::SUB),
            Tok::Shl => (8, binop::SHL),
            Tok::Shr => (8, binop::SHR),
            Tok::Lt => (7, binop::LT),
            Tok::Gt => (7, binop::GT),
            Tok::Le => (7, binop::LE),
            Tok::Ge => (7, binop::GE),
            Tok::EqEq => (6, binop::EQ),
            Tok::Ne => (6, binop::NE),
            Tok::Amp => (5, binop::BAND),
            Tok::Caret => (4, binop::BXOR),
            Tok::Bar => (3, binop::BOR),
            _ => return None,
        })
    }

    /// Precedence climbing over the binary operators; levels 1 and 2
    /// are `||` and `&&`.
    fn binary<'b>(&mut self, a: &'b Bump, min_bp: u8) -> PResult<&'b Expr<'b>> {
        let mut lhs = self.unary(a)?;
        loop {
            if min_bp <= 1 && self.tok == Tok::OrOr {
                self.advance()?;
                let rhs = self.binary(a, 2)?;
                lhs = a.alloc(Expr::LogOr(lhs, rhs));
                continue;
            }
            if min_bp <= 2 && self.tok == Tok::AndAnd {
                self.advance()?;
                let rhs = self.binary(a, 3)?;
                lhs = a.alloc(Expr::LogAnd(lhs, rhs));
                continue;
            }
            match Self::binop_of(&self.tok) {
                Some((bp, code)) if bp >= min_bp.max(3) => {
                    self.advance()?;
                    let rhs = self.binary(a, bp + 1)?;
                    lhs = a.alloc(Expr::Binary(code, lhs, rhs));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn unary<'b>(&mut self, a: &'b Bump) -> PResult<&'b Expr<'b>> {
        match self.tok.clone() {
            Tok::Minus => {
                self.advance()?;
                let e = self.unary(a)?;
                Ok(a.alloc(Expr::Unary(UnOp::Neg, e)))
            }
            Tok::Bang => {
                self.advance()?;
                let e = self.unary(a)?;
                Ok(a.alloc(Expr::Unary(UnOp::Not, e)))
            }
            Tok::Tilde => {
                self.advance()?;
                let e = self.unary(a)?;
                Ok(a.alloc(Expr::Unary(UnOp::Compl, e)))
            }
            Tok::Star => {
                self.advance()?;
                let e = self.unary(a)?;
                Ok(a.alloc(Expr::Deref(e)))
            }
            Tok::Amp => {
                self.advance()?;
                let e = self.unary(a)?;
                Ok(a.alloc(Expr::Addr(e)))
            }
            _ => self.postfix(a),
        }
    }

    fn postfix<'b>(&mut self, a: &'b Bump) -> PResult<&'b Expr<'b>> {
        let mut e = self.primary(a)?;
        loop {
            match self.tok.clone() {
                Tok::LParen => {
                    self.advance()?;
                    let mut args: Vec<&'b Expr<'b>> = Vec::new();
                    if self.tok != Tok::RParen {
                        loop {
                            args.push(self.expr(a)?);
                            if self.tok == Tok::Comma {
                                self.advance()?;
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(Tok::RParen, "')'")?;
                    let args = a.alloc_slice_copy(&args);
                    e = a.alloc(Expr::Call(e, args));
                }
                Tok::LBracket => {
                    self.advance()?;
                    let k = self.expr(a)?;
                    self.expect(Tok::RBracket, "']'")?;
                    e = a.alloc(Expr::Index(e, k));
                }
                Tok::Dot => {
                    self.advance()?;
                    match self.tok.clone() {
                        Tok::Name(name) => {
                            self.advance()?;
                            let s = self.name_obj(&name)?;
                            let k = a.alloc(Expr::StrLit(s));
                            e = a.alloc(Expr::Index(e, k));
                        }
                        _ => return self.err("expected a member name after '.'"),
                    }
                }
                _ => return Ok(e),
            }
        }
    }

    fn primary<'b>(&mut self, a: &'b Bump) -> PResult<&'b Expr<'b>> {
        match self.tok.clone() {
            Tok::Int(v) => {
                self.advance()?;
                let o = {
                    let r = marl_core::int::new_int(self.ip, v);
                    self.r(r)?
                };
                Ok(a.alloc(Expr::Literal(self.own(o))))
            }
            Tok::Float(v) => {
                self.advance()?;
                let o = {
                    let r = marl_core::float::new_float(self.ip, v);
                    self.r(r)?
                };
                Ok(a.alloc(Expr::Literal(self.own(o))))
            }
            Tok::Str(data) => {
                self.advance()?;
                let o = {
                    let r = new_str(self.ip, &data);
                    self.r(r)?
                };
                Ok(a.alloc(Expr::StrLit(self.own(o))))
            }
            Tok::Regexp(data) => {
                self.advance()?;
                let s = {
                    let r = new_str(self.ip, &data);
                    self.r(r)?
                };
                let s = self.own(s);
                let re = {
                    let r = new_regexp(self.ip, s, 0);
                    self.r(r)?
                };
                Ok(a.alloc(Expr::Literal(self.own(re))))
            }
            Tok::Null => {
                self.advance()?;
                let null = self.ip.o_null;
                Ok(a.alloc(Expr::Literal(null)))
            }
            Tok::Name(name) => {
                self.advance()?;
                let s = self.name_obj(&name)?;
                Ok(a.alloc(Expr::Name(s)))
            }
            Tok::LParen => {
                self.advance()?;
                let e = self.expr(a)?;
                self.expect(Tok::RParen, "')'")?;
                Ok(e)
            }
            Tok::LBracket => {
                let o = self.literal_aggregate()?;
                Ok(a.alloc(Expr::Literal(o)))
            }
            t => self.err(format!("unexpected token {t:?} in expression")),
        }
    }

    // --- Parse-time literals -------------------------------------------

    /// Evaluate an expression right now, at parse time: used for the
    /// elements of literal aggregates.
    fn const_value(&mut self) -> PResult<Obj> {
        let code = {
            let r = new_array(self.ip, 8);
            self.r(r)?
        };
        let code = self.own(code);
        let arena = Bump::new();
        let e = self.expr(&arena)?;
        let r = compile_expr(self.ip, code, e, true);
        self.r(r)?;
        drop(arena);
        let v = {
            let r = exec_code(self.ip, code);
            self.r(r)?
        };
        Ok(self.own(v))
    }

    /// `[array ...]`, `[set ...]`, `[map k = v, ...]` and
    /// `[func (params) body]`.
    fn literal_aggregate(&mut self) -> PResult<Obj> {
        self.expect(Tok::LBracket, "'['")?;
        let kind = match self.tok.clone() {
            Tok::Name(n) => n,
            t => return self.err(format!("expected array, map, set or func after '[', got {t:?}")),
        };
        self.advance()?;
        match kind.as_str() {
            "array" => {
                let arr = {
                    let r = new_array(self.ip, 8);
                    self.r(r)?
                };
                let arr = self.own(arr);
                while self.tok != Tok::RBracket {
                    let v = self.const_value()?;
                    let r = push(self.ip, arr, v);
                    self.r(r)?;
                    if self.tok == Tok::Comma {
                        self.advance()?;
                    } else {
                        break;
                    }
                }
                self.expect(Tok::RBracket, "']'")?;
                Ok(arr)
            }
            "set" => {
                let s = {
                    let r = marl_core::set::new_set(self.ip);
                    self.r(r)?
                };
                let s = self.own(s);
                while self.tok != Tok::RBracket {
                    let v = self.const_value()?;
                    let r = set_add(self.ip, s, v);
                    self.r(r)?;
                    if self.tok == Tok::Comma {
                        self.advance()?;
                    } else {
                        break;
                    }
                }
                self.expect(Tok::RBracket, "']'")?;
                Ok(s)
            }
            "map" => {
                let m = {
                    let r = marl_core::map::new_map(self.ip);
                    self.r(r)?
                };
                let m = self.own(m);
                while self.tok != Tok::RBracket {
                    let k = match self.tok.clone() {
                        Tok::Name(n) => {
                            self.advance()?;
                            self.name_obj(&n)?
                        }
                        _ => self.const_value()?,
                    };
                    self.expect(Tok::Assign, "'=' in map literal")?;
                    let v = self.const_value()?;
                    let r = assign_base(self.ip, m, k, v);
                    self.r(r)?;
                    if self.tok == Tok::Comma {
                        self.advance()?;
                    } else {
                        break;
                    }
                }
                self.expect(Tok::RBracket, "']'")?;
                Ok(m)
            }
            "func" => {
                let f = self.func_literal()?;
                self.expect(Tok::RBracket, "']'")?;
                Ok(f)
            }
            other => self.err(format!("unknown literal kind \"{other}\"")),
        }
    }

    /// `func (params) { body }`: the body compiles eagerly; the
    /// captured scope is the one active right now.
    fn func_literal(&mut self) -> PResult<Obj> {
        self.expect(Tok::LParen, "'(' after func")?;
        let params = {
            let r = new_array(self.ip, 4);
            self.r(r)?
        };
        let params = self.own(params);
        if self.tok != Tok::RParen {
            loop {
                match self.tok.clone() {
                    Tok::Name(n) => {
                        self.advance()?;
                        let s = self.name_obj(&n)?;
                        let r = push(self.ip, params, s);
                        self.r(r)?;
                    }
                    t => return self.err(format!("expected parameter name, got {t:?}")),
                }
                if self.tok == Tok::Comma {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        self.expect(Tok::RParen, "')'")?;

        // Fresh locals template chained to the definition scope.
        let scope = self.ip.scope();
        let autos = {
            let r = new_map_with_super(self.ip, scope);
            self.r(r)?
        };
        let autos = self.own(autos);

        let body = {
            let r = new_array(self.ip, 16);
            self.r(r)?
        };
        let body = self.own(body);
        if self.tok != Tok::LBrace {
            return self.err("expected '{' for function body");
        }
        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        let r = self.stmt_inner(body);
        self.loop_depth = saved_loops;
        r?;

        let name = self.ip.sstr.empty;
        let f = {
            let r = new_func(self.ip, body, params, autos, name);
            self.r(r)?
        };
        Ok(self.own(f))
    }
}

/// Compile-time guard: loop first-entry offsets ride in an op's i16.
pub(crate) fn check_entry_fits(entry: usize) -> Res<i16> {
    if entry > i16::MAX as usize {
        return set_error("loop header too large");
    }
    Ok(entry as i16)
}

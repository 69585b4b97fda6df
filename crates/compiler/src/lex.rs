//! The lexer. Reads characters through a parse object's file (so the
//! position survives in garbage-collected state) and produces [`Tok`]s
//! one at a time.
//!
//! Number scanning follows the C conventions: leading `0x`/`0X` hex,
//! leading `0` octal, a `.`, exponent or trailing float syntax making
//! it a float. Strings take the usual backslash escapes; character
//! constants yield ints; `#...#` is a regular-expression literal.

use crate::token::Tok;
use marl_core::file::{fileof, EOF};
use marl_core::object::Obj;
use marl_core::parse::{parseof, parseof_mut};

pub struct Lexer {
    /// The parse object: file + line number + one pushed-back char.
    pub parse: Obj,
}

pub type LexResult<T> = Result<T, String>;

impl Lexer {
    pub fn new(parse: Obj) -> Lexer {
        Lexer { parse }
    }

    /// Current 1-based line number.
    pub fn lineno(&self) -> u32 {
        parseof(self.parse).lineno
    }

    fn err<T>(&self, msg: impl Into<String>) -> LexResult<T> {
        Err(format!("line {}: {}", self.lineno(), msg.into()))
    }

    fn getch(&mut self) -> i32 {
        let p = parseof_mut(self.parse);
        let c = if p.ungot[1] != -1 {
            let c = p.ungot[1];
            p.ungot[1] = -1;
            c
        } else if p.ungot[0] != -1 {
            let c = p.ungot[0];
            p.ungot[0] = -1;
            c
        } else {
            let f = fileof(p.file);
            f.ftype.getch(f.inner)
        };
        if c == b'\n' as i32 {
            parseof_mut(self.parse).lineno += 1;
        }
        c
    }

    fn ungetch(&mut self, c: i32) {
        if c == EOF {
            return;
        }
        if c == b'\n' as i32 {
            parseof_mut(self.parse).lineno -= 1;
        }
        let p = parseof_mut(self.parse);
        if p.ungot[0] == -1 {
            p.ungot[0] = c;
        } else {
            debug_assert_eq!(p.ungot[1], -1);
            p.ungot[1] = c;
        }
    }

    /// Skip whitespace and comments; returns the first significant
    /// character.
    fn skip_space(&mut self) -> LexResult<i32> {
        loop {
            let c = self.getch();
            match c {
                c if c == b' ' as i32
                    || c == b'\t' as i32
                    || c == b'\n' as i32
                    || c == b'\r' as i32 => {}
                c if c == b'/' as i32 => {
                    let c2 = self.getch();
                    if c2 == b'/' as i32 {
                        loop {
                            let c3 = self.getch();
                            if c3 == EOF || c3 == b'\n' as i32 {
                                break;
                            }
                        }
                    } else if c2 == b'*' as i32 {
                        let mut prev = 0;
                        loop {
                            let c3 = self.getch();
                            if c3 == EOF {
                                return self.err("unterminated comment");
                            }
                            if prev == b'*' as i32 && c3 == b'/' as i32 {
                                break;
                            }
                            prev = c3;
                        }
                    } else {
                        self.ungetch(c2);
                        return Ok(c);
                    }
                }
                _ => return Ok(c),
            }
        }
    }

    /// The next token.
    pub fn next(&mut self) -> LexResult<Tok> {
        let c = self.skip_space()?;
        if c == EOF {
            return Ok(Tok::Eof);
        }
        let ch = c as u8;
        match ch {
            b'0'..=b'9' => self.scan_number(ch),
            b'.' => {
                let c2 = self.getch();
                if (b'0'..=b'9').contains(&(c2 as u8)) && c2 != EOF {
                    self.ungetch(c2);
                    self.scan_number(ch)
                } else {
                    self.ungetch(c2);
                    Ok(Tok::Dot)
                }
            }
            b'"' => self.scan_string(),
            b'\'' => self.scan_char(),
            b'#' => self.scan_regexp(),
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => self.scan_name(ch),
            b'(' => Ok(Tok::LParen),
            b')' => Ok(Tok::RParen),
            b'{' => Ok(Tok::LBrace),
            b'}' => Ok(Tok::RBrace),
            b'[' => Ok(Tok::LBracket),
            b']' => Ok(Tok::RBracket),
            b';' => Ok(Tok::Semi),
            b',' => Ok(Tok::Comma),
            b'~' => Ok(Tok::Tilde),
            b'^' => Ok(Tok::Caret),
            b'+' => Ok(self.maybe_eq(Tok::Plus, Tok::PlusEq)),
            b'-' => Ok(self.maybe_eq(Tok::Minus, Tok::MinusEq)),
            b'*' => Ok(self.maybe_eq(Tok::Star, Tok::StarEq)),
            b'/' => Ok(self.maybe_eq(Tok::Slash, Tok::SlashEq)),
            b'%' => Ok(self.maybe_eq(Tok::Percent, Tok::PercentEq)),
            b'=' => {
                let c2 = self.getch();
                if c2 == b'=' as i32 {
                    Ok(Tok::EqEq)
                } else {
                    self.ungetch(c2);
                    Ok(Tok::Assign)
                }
            }
            b'!' => {
                let c2 = self.getch();
                if c2 == b'=' as i32 {
                    Ok(Tok::Ne)
                } else {
                    self.ungetch(c2);
                    Ok(Tok::Bang)
                }
            }
            b':' => {
                let c2 = self.getch();
                if c2 == b'=' as i32 {
                    Ok(Tok::ColonAssign)
                } else {
                    self.ungetch(c2);
                    self.err("unexpected ':'")
                }
            }
            b'<' => {
                let c2 = self.getch();
                match c2 as u8 {
                    b'<' => Ok(Tok::Shl),
                    b'=' => Ok(Tok::Le),
                    _ => {
                        self.ungetch(c2);
                        Ok(Tok::Lt)
                    }
                }
            }
            b'>' => {
                let c2 = self.getch();
                match c2 as u8 {
                    b'>' => Ok(Tok::Shr),
                    b'=' => Ok(Tok::Ge),
                    _ => {
                        self.ungetch(c2);
                        Ok(Tok::Gt)
                    }
                }
            }
            b'&' => {
                let c2 = self.getch();
                if c2 == b'&' as i32 {
                    Ok(Tok::AndAnd)
                } else {
                    self.ungetch(c2);
                    Ok(Tok::Amp)
                }
            }
            b'|' => {
                let c2 = self.getch();
                if c2 == b'|' as i32 {
                    Ok(Tok::OrOr)
                } else {
                    self.ungetch(c2);
                    Ok(Tok::Bar)
                }
            }
            _ => self.err(format!("unexpected character '{}'", ch as char)),
        }
    }

    fn maybe_eq(&mut self, plain: Tok, with_eq: Tok) -> Tok {
        let c = self.getch();
        if c == b'=' as i32 {
            with_eq
        } else {
            self.ungetch(c);
            plain
        }
    }

    fn scan_name(&mut self, first: u8) -> LexResult<Tok> {
        let mut name = String::new();
        name.push(first as char);
        loop {
            let c = self.getch();
            let ch = c as u8;
            if c != EOF && (ch == b'_' || ch.is_ascii_alphanumeric()) {
                name.push(ch as char);
            } else {
                self.ungetch(c);
                break;
            }
        }
        Ok(Tok::keyword(&name).unwrap_or(Tok::Name(name)))
    }

    /// Ints in decimal, hex (0x) and octal (leading 0); a '.', an
    /// exponent, or a fraction makes it a float.
    fn scan_number(&mut self, first: u8) -> LexResult<Tok> {
        let mut text = String::new();
        text.push(first as char);
        let mut is_float = first == b'.';

        if first == b'0' {
            let c = self.getch();
            if c == b'x' as i32 || c == b'X' as i32 {
                let mut hex = String::new();
                loop {
                    let c2 = self.getch();
                    if c2 != EOF && (c2 as u8).is_ascii_hexdigit() {
                        hex.push(c2 as u8 as char);
                    } else {
                        self.ungetch(c2);
                        break;
                    }
                }
                if hex.is_empty() {
                    return self.err("malformed hex constant");
                }
                return match i64::from_str_radix(&hex, 16) {
                    Ok(v) => Ok(Tok::Int(v)),
                    Err(_) => self.err("hex constant out of range"),
                };
            }
            self.ungetch(c);
        }

        loop {
            let c = self.getch();
            let ch = c as u8;
            if c == EOF {
                break;
            }
            if ch.is_ascii_digit() {
                text.push(ch as char);
            } else if ch == b'.' && !is_float {
                is_float = true;
                text.push('.');
            } else if (ch == b'e' || ch == b'E') && !text.ends_with(['e', 'E']) {
                let c2 = self.getch();
                let c2h = c2 as u8;
                if c2h.is_ascii_digit() || c2h == b'+' || c2h == b'-' {
                    is_float = true;
                    text.push(ch as char);
                    text.push(c2h as char);
                } else {
                    self.ungetch(c2);
                    self.ungetch(c);
                    break;
                }
            } else {
                self.ungetch(c);
                break;
            }
        }

        if is_float {
            match text.parse::<f64>() {
                Ok(v) => Ok(Tok::Float(v)),
                Err(_) => self.err("malformed float constant"),
            }
        } else if text.len() > 1 && text.starts_with('0') {
            match i64::from_str_radix(&text[1..], 8) {
                Ok(v) => Ok(Tok::Int(v)),
                Err(_) => self.err("malformed octal constant"),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => Ok(Tok::Int(v)),
                Err(_) => self.err("int constant out of range"),
            }
        }
    }

    fn scan_escape(&mut self) -> LexResult<u8> {
        let c = self.getch();
        if c == EOF {
            return self.err("unterminated escape");
        }
        Ok(match c as u8 {
            b'n' => b'\n',
            b't' => b'\t',
            b'r' => b'\r',
            b'0' => 0,
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0C,
            b'v' => 0x0B,
            b'x' => {
                let mut v = 0u32;
                let mut any = false;
                loop {
                    let c2 = self.getch();
                    let ch = c2 as u8;
                    if c2 != EOF && ch.is_ascii_hexdigit() {
                        any = true;
                        v = v * 16 + (ch as char).to_digit(16).unwrap();
                        if v > 0xFF {
                            return self.err("hex escape out of range");
                        }
                    } else {
                        self.ungetch(c2);
                        break;
                    }
                }
                if !any {
                    return self.err("malformed hex escape");
                }
                v as u8
            }
            ch => ch,
        })
    }

    fn scan_string(&mut self) -> LexResult<Tok> {
        let mut data = Vec::new();
        loop {
            let c = self.getch();
            if c == EOF {
                return self.err("unterminated string literal");
            }
            match c as u8 {
                b'"' => return Ok(Tok::Str(data)),
                b'\\' => data.push(self.scan_escape()?),
                b'\n' => return self.err("newline in string literal"),
                ch => data.push(ch),
            }
        }
    }

    fn scan_char(&mut self) -> LexResult<Tok> {
        let c = self.getch();
        if c == EOF {
            return self.err("unterminated character constant");
        }
        let v = if c == b'\\' as i32 {
            self.scan_escape()?
        } else {
            c as u8
        };
        let c2 = self.getch();
        if c2 != b'\'' as i32 {
            return self.err("malformed character constant");
        }
        Ok(Tok::Int(v as i64))
    }

    fn scan_regexp(&mut self) -> LexResult<Tok> {
        let mut data = Vec::new();
        loop {
            let c = self.getch();
            if c == EOF {
                return self.err("unterminated regexp literal");
            }
            match c as u8 {
                b'#' => return Ok(Tok::Regexp(data)),
                b'\\' => {
                    let c2 = self.getch();
                    if c2 == b'#' as i32 {
                        data.push(b'#');
                    } else {
                        data.push(b'\\');
                        self.ungetch(c2);
                    }
                }
                ch => data.push(ch),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marl_core::file::open_charbuf;
    use marl_core::interp::{enter, leave};
    use marl_core::parse::new_parse;
    use marl_core::string::new_str;
    use serial_test::serial;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn tokens(source: &str) -> Vec<Tok> {
        INIT.call_once(|| {
            marl_core::init().expect("interpreter bootstrap failed");
        });
        let ip = enter();
        marl_core::attach_thread(ip).expect("attach failed");
        let name = new_str(ip, b"<lex-test>").unwrap();
        let file = open_charbuf(ip, source.as_bytes(), name).unwrap();
        name.decref();
        let parse = new_parse(ip, file).unwrap();
        let mut lexer = Lexer::new(parse);
        let mut out = Vec::new();
        loop {
            let t = lexer.next().expect("lex error");
            if t == Tok::Eof {
                break;
            }
            out.push(t);
        }
        parse.decref();
        let _ = marl_core::file::close_file(ip, file);
        file.decref();
        leave();
        out
    }

    #[test]
    #[serial]
    fn test_numbers() {
        assert_eq!(
            tokens("0 42 0x1F 017 1.5 2e3 1.25e-2"),
            vec![
                Tok::Int(0),
                Tok::Int(42),
                Tok::Int(31),
                Tok::Int(15),
                Tok::Float(1.5),
                Tok::Float(2000.0),
                Tok::Float(0.0125),
            ]
        );
    }

    #[test]
    #[serial]
    fn test_strings_and_chars() {
        assert_eq!(
            tokens(r#""hello" "a\tb" "\x41" 'z' '\n'"#),
            vec![
                Tok::Str(b"hello".to_vec()),
                Tok::Str(b"a\tb".to_vec()),
                Tok::Str(b"A".to_vec()),
                Tok::Int(b'z' as i64),
                Tok::Int(b'\n' as i64),
            ]
        );
    }

    #[test]
    #[serial]
    fn test_operators_longest_match() {
        assert_eq!(
            tokens("<< <= < == = := += && & ~"),
            vec![
                Tok::Shl,
                Tok::Le,
                Tok::Lt,
                Tok::EqEq,
                Tok::Assign,
                Tok::ColonAssign,
                Tok::PlusEq,
                Tok::AndAnd,
                Tok::Amp,
                Tok::Tilde,
            ]
        );
    }

    #[test]
    #[serial]
    fn test_keywords_names_and_regexps() {
        assert_eq!(
            tokens("while whale NULL #ab\\#c#"),
            vec![
                Tok::While,
                Tok::Name("whale".to_string()),
                Tok::Null,
                Tok::Regexp(b"ab#c".to_vec()),
            ]
        );
    }

    #[test]
    #[serial]
    fn test_comments_are_skipped() {
        assert_eq!(
            tokens("1 // to end of line\n2 /* in the\nmiddle */ 3"),
            vec![Tok::Int(1), Tok::Int(2), Tok::Int(3)]
        );
    }

    #[test]
    #[serial]
    fn test_unterminated_string_is_an_error() {
        INIT.call_once(|| {
            marl_core::init().expect("interpreter bootstrap failed");
        });
        let ip = enter();
        marl_core::attach_thread(ip).expect("attach failed");
        let name = new_str(ip, b"<lex-test>").unwrap();
        let file = open_charbuf(ip, b"\"never closed", name).unwrap();
        name.decref();
        let parse = new_parse(ip, file).unwrap();
        let mut lexer = Lexer::new(parse);
        let err = lexer.next().unwrap_err();
        assert!(err.contains("line 1"), "got: {err}");
        assert!(err.contains("unterminated string"), "got: {err}");
        parse.decref();
        let _ = marl_core::file::close_file(ip, file);
        file.decref();
        leave();
    }
}

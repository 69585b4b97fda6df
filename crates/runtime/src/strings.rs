//! String and regexp intrinsics.

use marl_core::array::{new_array, push};
use marl_core::cfunc::{CfuncImpl, Frame};
use marl_core::err::{set_error, Res};
use marl_core::float::floatof;
use marl_core::int::{intof, new_int};
use marl_core::interp::Interp;
use marl_core::object::{Obj, TC_FLOAT, TC_INT, TC_REGEXP, TC_STRING};
use marl_core::regexp::regexpof;
use marl_core::string::{new_str, strof};

pub const CFUNCS: &[(&str, CfuncImpl)] = &[
    ("match", f_match),
    ("search", f_search),
    ("split", f_split),
    ("sprint", f_sprint),
    ("tolower", f_tolower),
    ("toupper", f_toupper),
    ("substr", f_substr),
];

/// `match(re, s)`: the matched substring, or NULL.
fn f_match(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "rs")?;
    let re = fr.regexp(ip, 0)?;
    let s = fr.str_obj(ip, 1)?;
    match regexpof(re).regex().find(strof(s).bytes()) {
        Some(m) => {
            let found = m.as_bytes().to_vec();
            new_str(ip, &found)
        }
        None => {
            ip.o_null.incref();
            Ok(ip.o_null)
        }
    }
}

/// `search(re, s)`: byte index of the first match, or -1.
fn f_search(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "rs")?;
    let re = fr.regexp(ip, 0)?;
    let s = fr.str_obj(ip, 1)?;
    let idx = regexpof(re)
        .regex()
        .find(strof(s).bytes())
        .map_or(-1, |m| m.start() as i64);
    new_int(ip, idx)
}

/// `split(s, sep)`: array of pieces; `sep` is a string or a regexp.
fn f_split(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need(2)?;
    let s = fr.str_obj(ip, 0)?;
    let sep = fr.arg(ip, 1);
    let text = strof(s).bytes().to_vec();

    let pieces: Vec<Vec<u8>> = match sep.tcode() {
        TC_STRING => {
            let pat = strof(sep).bytes().to_vec();
            if pat.is_empty() {
                return set_error("empty split separator");
            }
            split_bytes(&text, &pat)
        }
        TC_REGEXP => regexpof(sep)
            .regex()
            .split(&text)
            .map(|p| p.to_vec())
            .collect(),
        _ => return marl_core::argerror(1),
    };

    let out = new_array(ip, pieces.len())?;
    for p in &pieces {
        let piece = new_str(ip, p)?;
        push(ip, out, piece)?;
        piece.decref();
    }
    Ok(out)
}

fn split_bytes(text: &[u8], pat: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i + pat.len() <= text.len() {
        if &text[i..i + pat.len()] == pat {
            out.push(text[start..i].to_vec());
            i += pat.len();
            start = i;
        } else {
            i += 1;
        }
    }
    out.push(text[start..].to_vec());
    out
}

/// `sprint(fmt, ...)`: minimal printf: %d, %f, %s, %%.
fn f_sprint(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    if fr.nargs < 1 {
        return marl_core::argcount(1, fr.nargs);
    }
    let fmt_obj = fr.str_obj(ip, 0)?;
    let fmt = strof(fmt_obj).text().into_owned();
    let mut out = String::new();
    let mut argi = 1;
    let mut chars = fmt.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('d') => {
                if argi >= fr.nargs {
                    return marl_core::argcount(argi + 1, fr.nargs);
                }
                let o = fr.arg(ip, argi);
                argi += 1;
                match o.tcode() {
                    TC_INT => out.push_str(&intof(o).value.to_string()),
                    TC_FLOAT => out.push_str(&(floatof(o).value as i64).to_string()),
                    _ => return marl_core::argerror(argi - 1),
                }
            }
            Some('f') => {
                if argi >= fr.nargs {
                    return marl_core::argcount(argi + 1, fr.nargs);
                }
                let v = fr.num(ip, argi)?;
                argi += 1;
                out.push_str(&format!("{v}"));
            }
            Some('s') => {
                if argi >= fr.nargs {
                    return marl_core::argcount(argi + 1, fr.nargs);
                }
                let o = fr.arg(ip, argi);
                argi += 1;
                out.push_str(&crate::render::render(ip, o));
            }
            _ => return set_error("bad conversion in sprint format"),
        }
    }
    new_str(ip, out.as_bytes())
}

fn f_tolower(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "s")?;
    let s = fr.str_obj(ip, 0)?;
    let lowered: Vec<u8> = strof(s).bytes().iter().map(|b| b.to_ascii_lowercase()).collect();
    new_str(ip, &lowered)
}

fn f_toupper(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.typecheck(ip, "s")?;
    let s = fr.str_obj(ip, 0)?;
    let raised: Vec<u8> = strof(s).bytes().iter().map(|b| b.to_ascii_uppercase()).collect();
    new_str(ip, &raised)
}

/// `substr(s, start [, len])`.
fn f_substr(ip: &mut Interp, fr: &Frame) -> Res<Obj> {
    fr.need_between(2, 3)?;
    let s = fr.str_obj(ip, 0)?;
    let start = fr.int(ip, 1)?.max(0) as usize;
    let total = strof(s).nchars;
    let start = start.min(total);
    let len = if fr.nargs == 3 {
        (fr.int(ip, 2)?.max(0) as usize).min(total - start)
    } else {
        total - start
    };
    let bytes = strof(s).bytes()[start..start + len].to_vec();
    new_str(ip, &bytes)
}

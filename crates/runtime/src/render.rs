//! Rendering values for `print`, `string()` and the REPL.

use marl_core::array::arrayof;
use marl_core::float::floatof;
use marl_core::func::funcof;
use marl_core::int::intof;
use marl_core::interp::Interp;
use marl_core::map::mapof;
use marl_core::object::{
    Obj, TC_ARRAY, TC_CHANNEL, TC_FLOAT, TC_FUNC, TC_INT, TC_MAP, TC_NULL, TC_PTR, TC_REGEXP,
    TC_SET, TC_STRING,
};
use marl_core::regexp::regexpof;
use marl_core::set::setof;
use marl_core::string::strof;

const MAX_DEPTH: usize = 8;

/// Human-readable rendering. Strings render raw at the top level and
/// quoted inside aggregates.
pub fn render(ip: &Interp, o: Obj) -> String {
    let mut out = String::new();
    render_into(ip, o, &mut out, 0, false);
    out
}

fn render_into(ip: &Interp, o: Obj, out: &mut String, depth: usize, quoted: bool) {
    if depth > MAX_DEPTH {
        out.push_str("...");
        return;
    }
    match o.tcode() {
        TC_NULL => out.push_str("NULL"),
        TC_INT => out.push_str(&intof(o).value.to_string()),
        TC_FLOAT => {
            let v = floatof(o).value;
            if v == v.trunc() && v.is_finite() && v.abs() < 1e15 {
                out.push_str(&format!("{v:.1}"));
            } else {
                out.push_str(&v.to_string());
            }
        }
        TC_STRING => {
            if quoted {
                out.push('"');
                out.push_str(&strof(o).text());
                out.push('"');
            } else {
                out.push_str(&strof(o).text());
            }
        }
        TC_REGEXP => {
            out.push('#');
            out.push_str(&strof(regexpof(o).source).text());
            out.push('#');
        }
        TC_ARRAY => {
            out.push('[');
            let a = arrayof(o);
            for i in 0..a.len() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_into(ip, a.get(i), out, depth + 1, true);
            }
            out.push(']');
        }
        TC_MAP => {
            out.push('{');
            let mut first = true;
            for (k, v) in mapof(o).pairs() {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                render_into(ip, k, out, depth + 1, true);
                out.push_str(" = ");
                render_into(ip, v, out, depth + 1, true);
            }
            out.push('}');
        }
        TC_SET => {
            out.push_str("[set");
            for m in setof(o).members() {
                out.push(' ');
                render_into(ip, m, out, depth + 1, true);
            }
            out.push(']');
        }
        TC_FUNC => {
            let name = strof(funcof(o).name).text().into_owned();
            if name.is_empty() {
                out.push_str("<func>");
            } else {
                out.push_str(&format!("<func {name}>"));
            }
        }
        TC_PTR => out.push_str("<ptr>"),
        TC_CHANNEL => out.push_str("<channel>"),
        _ => {
            out.push('<');
            out.push_str(ip.type_name(o));
            out.push('>');
        }
    }
}

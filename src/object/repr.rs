//! Canonical text forms of scalars and a debug rendering of whole objects.
//!
//! The scalar forms here are part of the generated-program format: the
//! expression parser reads back exactly what these functions write.

use std::fmt::Write;

use super::{Obj, Object, Receiver};

/// Text of a float: shortest round-trip digits, always with a decimal point
/// or exponent; `inf`, `-inf` and `nan` for non-finite values.
pub fn float_repr(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        format!("{value:?}")
    }
}

/// Text of a complex number.
///
/// Finite values use literal syntax, `2.0j` or `(1.0+2.0j)`. Non-finite
/// values use `complex(re, im)` since literal syntax cannot spell them.
pub fn complex_repr(re: f64, im: f64) -> String {
    if !(re.is_finite() && im.is_finite()) {
        return format!("complex({}, {})", float_repr(re), float_repr(im));
    }
    if re == 0.0 && re.is_sign_positive() {
        return format!("{}j", float_repr(im));
    }
    let sign = if im.is_sign_negative() { '-' } else { '+' };
    format!("({}{}{}j)", float_repr(re), sign, float_repr(im.abs()))
}

/// Quoted string literal.
pub fn str_repr(value: &str) -> String {
    let quote = if value.contains('\'') && !value.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Byte string literal, `b'...'`.
pub fn bytes_repr(value: &[u8]) -> String {
    let quote = if value.contains(&b'\'') && !value.contains(&b'"') { b'"' } else { b'\'' };
    let mut out = String::with_capacity(value.len() + 3);
    out.push('b');
    out.push(char::from(quote));
    for &byte in value {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b if b == quote => {
                out.push('\\');
                out.push(char::from(b));
            }
            0x20..=0x7e => out.push(char::from(byte)),
            _ => {
                let _ = write!(out, "\\x{byte:02x}");
            }
        }
    }
    out.push(char::from(quote));
    out
}

/// Debug text of an object.
///
/// Scalars, strings and plain containers of them render as evaluable
/// literals. Objects with no literal form render in angle brackets.
pub fn repr_of(obj: &Obj) -> String {
    let mut out = String::new();
    let mut active = Vec::new();
    write_repr(obj, &mut out, &mut active);
    out
}

fn write_items(items: &[Obj], out: &mut String, active: &mut Vec<usize>) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_repr(item, out, active);
    }
}

fn write_repr(obj: &Obj, out: &mut String, active: &mut Vec<usize>) {
    if active.contains(&obj.id()) {
        out.push_str("[...]");
        return;
    }
    match obj.kind() {
        Object::None => out.push_str("None"),
        Object::Bool(b) => out.push_str(if *b { "True" } else { "False" }),
        Object::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Object::Float(f) => out.push_str(&float_repr(*f)),
        Object::Complex(re, im) => out.push_str(&complex_repr(*re, *im)),
        Object::Str(s) => out.push_str(&str_repr(s)),
        Object::Bytes(b) => out.push_str(&bytes_repr(b)),
        Object::List(list) => {
            active.push(obj.id());
            if let Some(class) = &list.class {
                let _ = write!(out, "{}(", class.name);
            }
            out.push('[');
            write_items(&list.items(), out, active);
            out.push(']');
            if list.class.is_some() {
                out.push(')');
            }
            active.pop();
        }
        Object::Tuple(tuple) => {
            active.push(obj.id());
            if let Some(class) = &tuple.class {
                let _ = write!(out, "{}(", class.name);
            }
            out.push('(');
            write_items(&tuple.items, out, active);
            if tuple.items.len() == 1 {
                out.push(',');
            }
            out.push(')');
            if tuple.class.is_some() {
                out.push(')');
            }
            active.pop();
        }
        Object::Dict(dict) => {
            active.push(obj.id());
            if let Some(class) = &dict.class {
                let _ = write!(out, "{}(", class.name);
            }
            out.push('{');
            for (i, (key, value)) in dict.entries().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_repr(key, out, active);
                out.push_str(": ");
                write_repr(value, out, active);
            }
            out.push('}');
            if dict.class.is_some() {
                out.push(')');
            }
            active.pop();
        }
        Object::Array(array) => {
            let _ = write!(
                out,
                "array(shape={:?}, dtype='{}')",
                array.shape(),
                array.dtype().descr()
            );
        }
        Object::Sparse(m) => {
            let _ = write!(
                out,
                "<{}x{} sparse matrix of format '{}'>",
                m.shape.0,
                m.shape.1,
                m.format.class_name()
            );
        }
        Object::Type(t) => {
            let _ = write!(out, "<class '{}'>", t.path);
        }
        Object::Function(f) => {
            let _ = write!(out, "<function {}.{}>", f.module, f.qualname);
        }
        Object::Method(m) => match &m.receiver {
            Receiver::Instance(instance) => {
                let _ = write!(out, "<bound method {}.{}>", instance.type_path().name, m.name);
            }
            Receiver::Class(class) => {
                let _ = write!(out, "<function {}.{}>", class.name, m.name);
            }
        },
        Object::Module(name) => {
            let _ = write!(out, "<module '{name}'>");
        }
        Object::Instance(value) => match value.repr() {
            Some(text) => out.push_str(&text),
            None => {
                let _ = write!(out, "<{} object>", value.type_path());
            }
        },
    }
}

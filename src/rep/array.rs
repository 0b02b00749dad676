//! Dense array and sparse matrix strategies.

use std::fmt::Write;

use crate::error::ArchiveError;
use crate::object::repr::{bytes_repr, complex_repr, float_repr};
use crate::object::{ArrayData, NdArray, Obj, SparseMatrix};

use super::{Import, PersistentRep};

/// Python tuple text for a shape: `()`, `(3,)`, `(2, 3)`.
pub(crate) fn shape_repr(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [n] => format!("({n},)"),
        _ => format!("({})", shape.iter().map(usize::to_string).collect::<Vec<_>>().join(", ")),
    }
}

fn element_text(data: &ArrayData, i: usize) -> String {
    match data {
        ArrayData::Bool(v) => if v[i] { "True" } else { "False" }.to_string(),
        ArrayData::Int(v) => v[i].to_string(),
        ArrayData::Float(v) => float_repr(v[i]),
        ArrayData::Complex(v) => complex_repr(v[i].0, v[i].1),
    }
}

fn write_nested(out: &mut String, data: &ArrayData, shape: &[usize], offset: usize) {
    let Some((&n, rest)) = shape.split_first() else {
        out.push_str(&element_text(data, offset));
        return;
    };
    let stride: usize = rest.iter().product();
    out.push('[');
    for i in 0..n {
        if i > 0 {
            out.push_str(", ");
        }
        write_nested(out, data, rest, offset + i * stride);
    }
    out.push(']');
}

/// Inline array rebuilt from raw bytes (`tostring`) or from nested
/// literal elements.
pub(super) fn ndarray_rep(array: &NdArray, tostring: bool) -> PersistentRep {
    let descr = array.dtype().descr();
    if tostring {
        let rep = format!(
            "numpy.frombuffer({}, dtype='{}').reshape({})",
            bytes_repr(&array.to_bytes()),
            descr,
            shape_repr(array.shape())
        );
        return PersistentRep::new(rep).with_import(Import::module("numpy", "numpy"));
    }

    let mut rep = String::from("numpy.array(");
    write_nested(&mut rep, array.data(), array.shape(), 0);
    let _ = write!(rep, ", dtype='{descr}')");
    // Nested lists cannot express a zero-length axis below the first.
    if array.ndim() > 1 && array.shape().contains(&0) {
        let _ = write!(rep, ".reshape({})", shape_repr(array.shape()));
    }

    let mut imports = vec![Import::module("numpy", "numpy")];
    let (infinite, nan, complex_call) = match array.data() {
        ArrayData::Float(v) => {
            (v.iter().any(|x| x.is_infinite()), v.iter().any(|x| x.is_nan()), false)
        }
        ArrayData::Complex(v) => {
            let inf = v.iter().any(|(re, im)| re.is_infinite() || im.is_infinite());
            let nan = v.iter().any(|(re, im)| re.is_nan() || im.is_nan());
            (inf, nan, inf || nan)
        }
        _ => (false, false, false),
    };
    if infinite {
        imports.push(Import::member("numpy", "inf", "inf"));
    }
    if nan {
        imports.push(Import::member("numpy", "nan", "nan"));
    }
    if complex_call {
        imports.push(Import::member("builtins", "complex", "complex"));
    }
    PersistentRep { imports, ..PersistentRep::new(rep) }
}

/// `Class(args, shape=(r, c))` with the component arrays as one tuple arg.
pub(super) fn sparse_rep(matrix: &SparseMatrix) -> Result<PersistentRep, ArchiveError> {
    let class = matrix.format.class_name();
    match matrix.format.component_count() {
        Some(n) if n == matrix.parts.len() => {}
        Some(n) => {
            return Err(ArchiveError::InvalidArgument(format!(
                "{class} needs {n} component arrays, found {}",
                matrix.parts.len()
            )))
        }
        None => return Err(ArchiveError::Unsupported(format!("scipy.sparse.{class}"))),
    }
    let rep = format!("{class}(args, shape={})", shape_repr(&[matrix.shape.0, matrix.shape.1]));
    Ok(PersistentRep::new(rep)
        .with_arg("args", Obj::tuple(matrix.parts.clone()))
        .with_import(Import::member("scipy.sparse", class, class)))
}

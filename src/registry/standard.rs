//! The modules every archive may import.

use std::path::Path;

use crate::arrays::{self, ArrayFormat};
use crate::error::RestoreError;
use crate::object::{
    CallArgs, DType, Element, Function, NdArray, Obj, Object, SparseFormat, SparseMatrix,
    TypeObject, TypePath,
};
use crate::rep::pickle;

use super::{ClassDef, Registry};

pub(super) fn install(registry: &mut Registry) {
    install_builtins(registry);
    for name in ["FunctionType", "BuiltinFunctionType", "MethodType", "ModuleType"] {
        registry.register_class(ClassDef::new("types", name));
    }
    install_numpy(registry);
    install_sparse(registry);
    registry.register_function(Function::native("pickle", "loads", |registry, args| {
        match args.required(0, "data")?.kind() {
            Object::Bytes(bytes) => pickle::loads(registry, bytes),
            _ => Err(RestoreError::Type("a bytes-like object is required".to_string())),
        }
    }));
    registry.register_function(Function::native("persist.arrays", "load", load_arrays));
}

// ─── builtins ────────────────────────────────────────────────────────────────

fn install_builtins(registry: &mut Registry) {
    registry.register_class(ClassDef::new("builtins", "list").constructor(|_, args| {
        Ok(Obj::list(optional_items(&args)?))
    }));
    registry.register_class(ClassDef::new("builtins", "tuple").constructor(|_, args| {
        Ok(Obj::tuple(optional_items(&args)?))
    }));
    registry.register_class(ClassDef::new("builtins", "dict").constructor(|_, args| {
        Ok(Obj::dict(dict_entries(&args)?))
    }));
    registry.register_class(ClassDef::new("builtins", "int").constructor(|_, args| {
        let Some(x) = args.get(0, "x") else { return Ok(Obj::int(0)) };
        match x.kind() {
            Object::Int(_) | Object::Bool(_) => Ok(Obj::int(x.as_int().unwrap_or_default())),
            Object::Float(v) if v.is_finite() => Ok(Obj::int(v.trunc() as i64)),
            Object::Float(v) => Err(RestoreError::Value(format!(
                "cannot convert float {v} to integer"
            ))),
            Object::Str(s) => s.trim().parse().map(Obj::int).map_err(|_| {
                RestoreError::Value(format!("invalid literal for int() with base 10: {s:?}"))
            }),
            _ => Err(type_error("int", x)),
        }
    }));
    registry.register_class(ClassDef::new("builtins", "float").constructor(|_, args| {
        let Some(x) = args.get(0, "x") else { return Ok(Obj::float(0.0)) };
        match x.kind() {
            Object::Str(s) => parse_float(s).map(Obj::float),
            _ => x.as_float().map(Obj::float).ok_or_else(|| type_error("float", x)),
        }
    }));
    registry.register_class(ClassDef::new("builtins", "complex").constructor(|_, args| {
        let real = match args.get(0, "real") {
            Some(x) => match x.kind() {
                Object::Complex(re, im) => (*re, *im),
                _ => (x.as_float().ok_or_else(|| type_error("complex", x))?, 0.0),
            },
            None => (0.0, 0.0),
        };
        let imag = match args.get(1, "imag") {
            Some(x) => x.as_float().ok_or_else(|| type_error("complex", x))?,
            None => 0.0,
        };
        Ok(Obj::complex(real.0, real.1 + imag))
    }));
    registry.register_class(ClassDef::new("builtins", "str").constructor(|_, args| {
        Ok(match args.get(0, "object") {
            Some(x) => match x.kind() {
                Object::Str(_) => x.clone(),
                _ => Obj::str(crate::object::repr_of(x)),
            },
            None => Obj::str(""),
        })
    }));
    registry.register_class(ClassDef::new("builtins", "bool").constructor(|_, args| {
        Ok(Obj::bool(args.get(0, "x").is_some_and(truthy)))
    }));
    registry.register_class(ClassDef::new("builtins", "bytes").constructor(|_, args| {
        let Some(x) = args.get(0, "source") else { return Ok(Obj::bytes(Vec::new())) };
        match x.kind() {
            Object::Bytes(_) => Ok(x.clone()),
            _ => iterate(x)?
                .iter()
                .map(|b| {
                    b.as_int()
                        .and_then(|b| u8::try_from(b).ok())
                        .ok_or_else(|| {
                            RestoreError::Value("bytes must be in range(0, 256)".to_string())
                        })
                })
                .collect::<Result<Vec<u8>, _>>()
                .map(Obj::bytes),
        }
    }));
    registry.register_class(ClassDef::new("builtins", "object"));
    registry.register_class(ClassDef::new("builtins", "type").constructor(|registry, args| {
        Ok(registry.type_of(args.required(0, "object")?))
    }));
    registry.set_none_type(Obj::type_object(TypeObject::new(TypePath::none_type())));
}

fn type_error(target: &str, x: &Obj) -> RestoreError {
    RestoreError::Type(format!(
        "{target}() argument must be a string or a number, not '{}'",
        x.type_path().name
    ))
}

fn parse_float(s: &str) -> Result<f64, RestoreError> {
    let t = s.trim();
    let (sign, body) = match t.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, t.strip_prefix('+').unwrap_or(t)),
    };
    match body.to_ascii_lowercase().as_str() {
        "inf" | "infinity" => Ok(sign * f64::INFINITY),
        "nan" => Ok(f64::NAN),
        _ => t.parse().map_err(|_| {
            RestoreError::Value(format!("could not convert string to float: {s:?}"))
        }),
    }
}

fn truthy(x: &Obj) -> bool {
    match x.kind() {
        Object::None => false,
        Object::Bool(b) => *b,
        Object::Int(i) => *i != 0,
        Object::Float(f) => *f != 0.0,
        Object::Complex(re, im) => *re != 0.0 || *im != 0.0,
        Object::Str(s) => !s.is_empty(),
        Object::Bytes(b) => !b.is_empty(),
        Object::List(l) => !l.items().is_empty(),
        Object::Tuple(t) => !t.items.is_empty(),
        Object::Dict(d) => !d.entries().is_empty(),
        _ => true,
    }
}

/// Elements of an iterable: sequence items, dict keys or string characters.
pub(crate) fn iterate(x: &Obj) -> Result<Vec<Obj>, RestoreError> {
    if let Some(items) = x.sequence_items() {
        return Ok(items);
    }
    match x.kind() {
        Object::Dict(d) => Ok(d.entries().iter().map(|(k, _)| k.clone()).collect()),
        Object::Str(s) => Ok(s.chars().map(|c| Obj::str(c.to_string())).collect()),
        Object::Bytes(b) => Ok(b.iter().map(|b| Obj::int(i64::from(*b))).collect()),
        _ => Err(RestoreError::Type(format!("'{}' object is not iterable", x.type_path().name))),
    }
}

fn optional_items(args: &CallArgs) -> Result<Vec<Obj>, RestoreError> {
    match args.get(0, "iterable") {
        Some(iterable) => iterate(iterable),
        None => Ok(Vec::new()),
    }
}

/// Entries for `dict(...)`: a mapping or a sequence of pairs, then keywords.
pub(crate) fn dict_entries(args: &CallArgs) -> Result<Vec<(Obj, Obj)>, RestoreError> {
    let mut entries = Vec::new();
    if let Some(source) = args.args.first() {
        match source.kind() {
            Object::Dict(d) => entries.extend(d.entries().iter().cloned()),
            _ => {
                for (i, pair) in iterate(source)?.into_iter().enumerate() {
                    match pair.sequence_items().as_deref() {
                        Some([k, v]) => entries.push((k.clone(), v.clone())),
                        _ => {
                            return Err(RestoreError::Value(format!(
                                "dictionary update sequence element #{i} is not a pair"
                            )))
                        }
                    }
                }
            }
        }
    }
    entries.extend(args.kwargs.iter().map(|(k, v)| (Obj::str(k.as_str()), v.clone())));
    Ok(entries)
}

// ─── numpy ───────────────────────────────────────────────────────────────────

fn install_numpy(registry: &mut Registry) {
    registry.register("numpy", "inf", Obj::float(f64::INFINITY));
    registry.register("numpy", "nan", Obj::float(f64::NAN));
    registry.register_class(ClassDef::new("numpy", "ndarray"));
    registry.register_function(Function::native("numpy", "array", |_, args| {
        let object = args.required(0, "object")?;
        let dtype = dtype_arg(&args)?;
        if let Some(array) = object.as_array() {
            return match dtype {
                Some(dtype) if dtype != array.dtype() => {
                    let elements: Vec<Element> =
                        (0..array.size()).filter_map(|i| array.element(i)).collect();
                    let shape = array.shape().to_vec();
                    Ok(Obj::array(NdArray::from_elements(shape, &elements, Some(dtype))?))
                }
                _ => Ok(Obj::array(array.clone())),
            };
        }
        let mut shape = Vec::new();
        let mut elements = Vec::new();
        flatten(object, 0, &mut shape, &mut elements)?;
        if elements.len() != shape.iter().product::<usize>() {
            return Err(ragged_sequence());
        }
        Ok(Obj::array(NdArray::from_elements(shape, &elements, dtype)?))
    }));
    registry.register_function(Function::native("numpy", "frombuffer", |_, args| {
        let Object::Bytes(buffer) = args.required(0, "buffer")?.kind() else {
            return Err(RestoreError::Type("a bytes-like object is required".to_string()));
        };
        let dtype = dtype_arg(&args)?.unwrap_or(DType::Float64);
        Ok(Obj::array(NdArray::from_bytes(dtype, buffer)?))
    }));
}

fn dtype_arg(args: &CallArgs) -> Result<Option<DType>, RestoreError> {
    let Some(dtype) = args.get(1, "dtype") else { return Ok(None) };
    let descr = match dtype.kind() {
        Object::None => return Ok(None),
        Object::Str(s) => s.as_str(),
        Object::Type(t) => t.path.name.as_str(),
        _ => {
            return Err(RestoreError::Type(format!(
                "data type {} not understood",
                crate::object::repr_of(dtype)
            )))
        }
    };
    Ok(Some(DType::from_descr(descr)?))
}

fn ragged_sequence() -> RestoreError {
    RestoreError::Value(
        "setting an array element with a sequence: inhomogeneous shape".to_string(),
    )
}

fn flatten(
    obj: &Obj,
    depth: usize,
    shape: &mut Vec<usize>,
    out: &mut Vec<Element>,
) -> Result<(), RestoreError> {
    if let Some(items) = obj.sequence_items() {
        match shape.get(depth) {
            Some(&n) if n != items.len() => return Err(ragged_sequence()),
            Some(_) => {}
            None if out.is_empty() => shape.push(items.len()),
            None => return Err(ragged_sequence()),
        }
        return items.iter().try_for_each(|item| flatten(item, depth + 1, shape, out));
    }
    if depth != shape.len() {
        return Err(ragged_sequence());
    }
    let element = match obj.kind() {
        Object::Bool(b) => Element::Bool(*b),
        Object::Int(i) => Element::Int(*i),
        Object::Float(f) => Element::Float(*f),
        Object::Complex(re, im) => Element::Complex(*re, *im),
        _ => {
            return Err(RestoreError::Type(format!(
                "array elements must be numbers, not '{}'",
                obj.type_path().name
            )))
        }
    };
    out.push(element);
    Ok(())
}

// ─── scipy.sparse ────────────────────────────────────────────────────────────

fn install_sparse(registry: &mut Registry) {
    for format in SparseFormat::ALL {
        let def = ClassDef::new("scipy.sparse", format.class_name());
        let def = match format.component_count() {
            Some(count) => def.constructor(move |_, args| {
                let parts = args.required(0, "arg1")?.sequence_items().unwrap_or_default();
                if parts.len() != count || parts.iter().any(|p| p.as_array().is_none()) {
                    return Err(RestoreError::Value(format!(
                        "{} expects a tuple of {count} arrays",
                        format.class_name()
                    )));
                }
                let shape = shape_arg(args.get(1, "shape"))?;
                Ok(Obj::sparse(SparseMatrix::new(format, shape, parts)))
            }),
            None => def,
        };
        registry.register_class(def);
    }
}

fn shape_arg(shape: Option<&Obj>) -> Result<(usize, usize), RestoreError> {
    let dims: Option<Vec<usize>> = shape.and_then(Obj::sequence_items).map(|items| {
        items
            .iter()
            .filter_map(|d| d.as_int().and_then(|d| usize::try_from(d).ok()))
            .collect()
    });
    match dims.as_deref() {
        Some(&[rows, cols]) => Ok((rows, cols)),
        _ => Err(RestoreError::Value("shape must be a pair of non-negative integers".to_string())),
    }
}

// ─── persist.arrays ──────────────────────────────────────────────────────────

fn load_arrays(_: &Registry, args: CallArgs) -> Result<Obj, RestoreError> {
    let format = args.str(0, "format")?;
    let format: ArrayFormat = format.parse().map_err(RestoreError::Value)?;
    let location = args.str(1, "location")?;
    let filename = args.str(2, "filename")?;
    let names = iterate(args.required(3, "names")?)?
        .iter()
        .map(|n| {
            n.as_str()
                .map(str::to_string)
                .ok_or_else(|| RestoreError::Type("array names must be str".into()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let loaded = arrays::load(format, Path::new(&location), &filename, &names)?;
    Ok(Obj::dict(
        loaded
            .into_iter()
            .map(|(name, array)| (Obj::str(name), Obj::array(array)))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(
        registry: &Registry,
        module: &str,
        name: &str,
        args: CallArgs,
    ) -> Result<Obj, RestoreError> {
        let callee = registry.lookup(module, name).unwrap();
        crate::restore::ops::call(registry, callee, args)
    }

    #[test]
    fn test_dict_from_pairs_and_keywords() {
        let registry = Registry::standard();
        let pairs = Obj::list(vec![Obj::tuple(vec![Obj::int(1), Obj::str("a")])]);
        let args = CallArgs { args: vec![pairs], kwargs: vec![("b".into(), Obj::int(2))] };
        let d = call(&registry, "builtins", "dict", args).unwrap();
        assert_eq!(d, Obj::dict(vec![(Obj::int(1), Obj::str("a")), (Obj::str("b"), Obj::int(2))]));
    }

    #[test]
    fn test_float_parses_special_values() {
        let registry = Registry::standard();
        let float = |text: &str| {
            call(&registry, "builtins", "float", CallArgs::positional(vec![Obj::str(text)]))
        };
        assert_eq!(float("-inf").unwrap().as_float(), Some(f64::NEG_INFINITY));
        assert!(float("nan").unwrap().as_float().is_some_and(f64::is_nan));
        assert!(float("x").is_err());
    }

    #[test]
    fn test_numpy_array_from_nested_lists() {
        let registry = Registry::standard();
        let nested = Obj::list(vec![
            Obj::list(vec![Obj::int(1), Obj::int(2)]),
            Obj::list(vec![Obj::int(3), Obj::int(4)]),
        ]);
        let a = call(&registry, "numpy", "array", CallArgs::positional(vec![nested])).unwrap();
        let a = a.as_array().unwrap();
        assert_eq!(a.shape(), &[2, 2]);
        assert_eq!(a.dtype(), DType::Int64);

        let ragged = Obj::list(vec![Obj::list(vec![Obj::int(1)]), Obj::list(vec![])]);
        assert!(call(&registry, "numpy", "array", CallArgs::positional(vec![ragged])).is_err());
    }

    #[test]
    fn test_numpy_array_scalar_and_empty() {
        let registry = Registry::standard();
        let scalar = CallArgs::positional(vec![Obj::float(2.5)]);
        let a = call(&registry, "numpy", "array", scalar).unwrap();
        assert_eq!(a.as_array().unwrap().shape(), &[] as &[usize]);
        let args = CallArgs {
            args: vec![Obj::list(vec![])],
            kwargs: vec![("dtype".into(), Obj::str("<i8"))],
        };
        let a = call(&registry, "numpy", "array", args).unwrap();
        assert_eq!(a.as_array().unwrap().shape(), &[0]);
        assert_eq!(a.as_array().unwrap().dtype(), DType::Int64);
    }

    #[test]
    fn test_sparse_constructor_checks_parts() {
        let registry = Registry::standard();
        let parts = Obj::tuple(vec![
            Obj::array(NdArray::from_f64(vec![1.0])),
            Obj::array(NdArray::from_i64(vec![0])),
        ]);
        let shape = Obj::tuple(vec![Obj::int(1), Obj::int(1)]);
        let args = CallArgs {
            args: vec![parts.clone()],
            kwargs: vec![("shape".into(), shape.clone())],
        };
        let m = call(&registry, "scipy.sparse", "dia_matrix", args).unwrap();
        assert!(matches!(m.kind(), Object::Sparse(s) if s.shape == (1, 1)));

        let args = CallArgs { args: vec![parts], kwargs: vec![("shape".into(), shape)] };
        assert!(call(&registry, "scipy.sparse", "csr_matrix", args).is_err());
        assert!(call(&registry, "scipy.sparse", "coo_matrix", CallArgs::default()).is_err());
    }
}

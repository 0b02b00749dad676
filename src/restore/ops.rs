//! Calls, attribute access, subscripts and arithmetic on [`Obj`] values.

use crate::error::RestoreError;
use crate::expr::{BinOp, UnaryOp};
use crate::object::{CallArgs, Callable, Function, Obj, Object, Receiver, SparseFormat};
use crate::registry::Registry;

use super::interp;

fn type_name(obj: &Obj) -> String {
    obj.type_path().name
}

/// Call `callee` with `args`.
pub(crate) fn call(registry: &Registry, callee: &Obj, args: CallArgs) -> Result<Obj, RestoreError> {
    match callee.kind() {
        Object::Function(function) => match &function.body {
            Callable::Native(f) => f(registry, args),
            Callable::Script(script) => {
                interp::call_script(registry, &function.qualname, script, args)
            }
            Callable::Opaque => Err(RestoreError::Type(format!(
                "{}.{} cannot be called by a restored program",
                function.module, function.qualname
            ))),
        },
        Object::Type(class) => match &class.constructor {
            Some(f) => f(registry, args),
            None => Err(RestoreError::Type(format!("cannot create '{}' instances", class.path))),
        },
        _ => Err(RestoreError::Type(format!("'{}' object is not callable", type_name(callee)))),
    }
}

fn no_attribute(owner: &Obj, attr: &str) -> RestoreError {
    RestoreError::Attribute { owner: type_name(owner), attr: attr.to_string() }
}

fn shape_tuple(shape: &[usize]) -> Obj {
    Obj::tuple(shape.iter().map(|d| Obj::int(*d as i64)).collect())
}

/// `obj.attr`.
pub(crate) fn attribute(registry: &Registry, obj: &Obj, attr: &str) -> Result<Obj, RestoreError> {
    let found = match obj.kind() {
        Object::Module(module) => registry
            .lookup(module, attr)
            .cloned()
            .or_else(|| registry.module(&format!("{module}.{attr}")).map(|m| m.handle().clone())),
        Object::Type(class) => class.attr(attr).cloned(),
        Object::Instance(value) => value.attr(attr).or_else(|| {
            let path = value.type_path();
            let Object::Type(class) = registry.lookup(&path.module, &path.name)?.kind() else {
                return None;
            };
            let member = class.attr(attr)?;
            match member.kind() {
                Object::Method(m) if matches!(m.receiver, Receiver::Class(_)) => {
                    Some(Obj::bound_method(obj.clone(), m.name.as_str()))
                }
                _ => Some(member.clone()),
            }
        }),
        Object::Array(array) => match attr {
            "shape" => Some(shape_tuple(array.shape())),
            "size" => Some(Obj::int(array.size() as i64)),
            "ndim" => Some(Obj::int(array.ndim() as i64)),
            "dtype" => Some(Obj::str(array.dtype().descr())),
            "reshape" => {
                let array = array.clone();
                Some(Obj::function(Function::native("numpy", "ndarray.reshape", move |_, args| {
                    let dims = match args.args.as_slice() {
                        [single] if single.sequence_items().is_some() => {
                            single.sequence_items().unwrap_or_default()
                        }
                        many => many.to_vec(),
                    };
                    let shape = dims
                        .iter()
                        .map(|d| d.as_int().and_then(|d| usize::try_from(d).ok()))
                        .collect::<Option<Vec<usize>>>()
                        .ok_or_else(|| {
                            RestoreError::Type("shape must be non-negative integers".to_string())
                        })?;
                    Ok(Obj::array(array.reshape(shape)?))
                })))
            }
            _ => None,
        },
        Object::Sparse(matrix) => match attr {
            "shape" => Some(shape_tuple(&[matrix.shape.0, matrix.shape.1])),
            "format" => Some(Obj::str(&matrix.format.class_name()[..3])),
            _ => {
                let names: &[&str] = match matrix.format {
                    SparseFormat::Csr | SparseFormat::Csc | SparseFormat::Bsr => {
                        &["data", "indices", "indptr"]
                    }
                    SparseFormat::Dia => &["data", "offsets"],
                    _ => &[],
                };
                names.iter().position(|n| *n == attr).and_then(|i| matrix.parts.get(i).cloned())
            }
        },
        Object::Complex(re, im) => match attr {
            "real" => Some(Obj::float(*re)),
            "imag" => Some(Obj::float(*im)),
            _ => None,
        },
        _ => None,
    };
    found.ok_or_else(|| no_attribute(obj, attr))
}

fn sequence_index(len: usize, index: &Obj, kind: &str) -> Result<usize, RestoreError> {
    let i = index.as_int().ok_or_else(|| {
        RestoreError::Type(format!("{kind} indices must be integers, not {}", type_name(index)))
    })?;
    let resolved = if i < 0 { i + len as i64 } else { i };
    usize::try_from(resolved)
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| RestoreError::Index(format!("{kind} index out of range")))
}

/// `obj[index]`.
pub(crate) fn subscript(obj: &Obj, index: &Obj) -> Result<Obj, RestoreError> {
    match obj.kind() {
        Object::List(list) => {
            let items = list.items();
            Ok(items[sequence_index(items.len(), index, "list")?].clone())
        }
        Object::Tuple(tuple) => {
            Ok(tuple.items[sequence_index(tuple.items.len(), index, "tuple")?].clone())
        }
        Object::Dict(dict) => {
            dict.get(index).ok_or_else(|| RestoreError::Key(crate::object::repr_of(index)))
        }
        _ => Err(RestoreError::Type(format!(
            "'{}' object is not subscriptable",
            type_name(obj)
        ))),
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
    Complex(f64, f64),
}

impl Num {
    fn of(obj: &Obj) -> Option<Self> {
        match obj.kind() {
            Object::Bool(_) | Object::Int(_) => obj.as_int().map(Self::Int),
            Object::Float(f) => Some(Self::Float(*f)),
            Object::Complex(re, im) => Some(Self::Complex(*re, *im)),
            _ => None,
        }
    }

    fn complex(self) -> (f64, f64) {
        match self {
            Self::Int(i) => (i as f64, 0.0),
            Self::Float(f) => (f, 0.0),
            Self::Complex(re, im) => (re, im),
        }
    }

    fn float(self) -> f64 {
        self.complex().0
    }
}

fn zero_division() -> RestoreError {
    RestoreError::Value("division by zero".to_string())
}

fn overflow() -> RestoreError {
    RestoreError::Value("integer overflow".to_string())
}

fn numeric(op: BinOp, left: Num, right: Num) -> Result<Obj, RestoreError> {
    match (left, right) {
        (Num::Int(a), Num::Int(b)) => match op {
            BinOp::Add => a.checked_add(b).map(Obj::int).ok_or_else(overflow),
            BinOp::Sub => a.checked_sub(b).map(Obj::int).ok_or_else(overflow),
            BinOp::Mul => a.checked_mul(b).map(Obj::int).ok_or_else(overflow),
            BinOp::Div if b == 0 => Err(zero_division()),
            BinOp::Div => Ok(Obj::float(a as f64 / b as f64)),
        },
        (Num::Complex(..), _) | (_, Num::Complex(..)) => {
            let ((a, b), (c, d)) = (left.complex(), right.complex());
            let (re, im) = match op {
                BinOp::Add => (a + c, b + d),
                BinOp::Sub => (a - c, b - d),
                BinOp::Mul => (a * c - b * d, a * d + b * c),
                BinOp::Div => {
                    let denom = c * c + d * d;
                    if denom == 0.0 {
                        return Err(zero_division());
                    }
                    ((a * c + b * d) / denom, (b * c - a * d) / denom)
                }
            };
            Ok(Obj::complex(re, im))
        }
        _ => {
            let (a, b) = (left.float(), right.float());
            Ok(Obj::float(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div if b == 0.0 => return Err(zero_division()),
                BinOp::Div => a / b,
            }))
        }
    }
}

fn repeat(items: &[Obj], times: i64) -> Vec<Obj> {
    let times = usize::try_from(times).unwrap_or(0);
    items.iter().cloned().cycle().take(items.len() * times).collect()
}

fn symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
    }
}

/// `left <op> right`.
pub(crate) fn binary(op: BinOp, left: &Obj, right: &Obj) -> Result<Obj, RestoreError> {
    if let (Some(a), Some(b)) = (Num::of(left), Num::of(right)) {
        return numeric(op, a, b);
    }
    let result = match (op, left.kind(), right.kind()) {
        (BinOp::Add, Object::Str(a), Object::Str(b)) => Some(Obj::str(format!("{a}{b}"))),
        (BinOp::Add, Object::Bytes(a), Object::Bytes(b)) => {
            Some(Obj::bytes([a.as_slice(), b.as_slice()].concat()))
        }
        (BinOp::Add, Object::List(a), Object::List(b)) => {
            let mut items = a.items().clone();
            items.extend(b.items().iter().cloned());
            Some(Obj::list(items))
        }
        (BinOp::Add, Object::Tuple(a), Object::Tuple(b)) => {
            Some(Obj::tuple(a.items.iter().chain(&b.items).cloned().collect()))
        }
        (BinOp::Mul, Object::Str(s), Object::Int(n))
        | (BinOp::Mul, Object::Int(n), Object::Str(s)) => {
            Some(Obj::str(s.repeat(usize::try_from(*n).unwrap_or(0))))
        }
        (BinOp::Mul, Object::List(l), Object::Int(n))
        | (BinOp::Mul, Object::Int(n), Object::List(l)) => {
            Some(Obj::list(repeat(&l.items(), *n)))
        }
        (BinOp::Mul, Object::Tuple(t), Object::Int(n))
        | (BinOp::Mul, Object::Int(n), Object::Tuple(t)) => {
            Some(Obj::tuple(repeat(&t.items, *n)))
        }
        _ => None,
    };
    result.ok_or_else(|| {
        RestoreError::Type(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            symbol(op),
            type_name(left),
            type_name(right)
        ))
    })
}

/// `<op> operand`.
pub(crate) fn unary(op: UnaryOp, operand: &Obj) -> Result<Obj, RestoreError> {
    let num = Num::of(operand).ok_or_else(|| {
        let symbol = if op == UnaryOp::Neg { "-" } else { "+" };
        RestoreError::Type(format!("bad operand type for unary {symbol}: '{}'", type_name(operand)))
    })?;
    Ok(match (op, num) {
        (UnaryOp::Pos, Num::Int(i)) => Obj::int(i),
        (UnaryOp::Pos, _) => operand.clone(),
        (UnaryOp::Neg, Num::Int(i)) => Obj::int(i.checked_neg().ok_or_else(overflow)?),
        (UnaryOp::Neg, Num::Float(f)) => Obj::float(-f),
        (UnaryOp::Neg, Num::Complex(re, im)) => Obj::complex(-re, -im),
    })
}

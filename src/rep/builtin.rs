//! Strategies for built-in kinds and the repr fallback.

use crate::error::ArchiveError;
use crate::expr::parse_expr;
use crate::names::UniqueNames;
use crate::object::repr::{complex_repr, float_repr};
use crate::object::{Env, Function, Method, Obj, Object, Receiver, TypeObject, TypePath};
use crate::registry::Registry;

use super::{Import, PersistentRep};

/// Whether an object is fully described by its literal text: booleans,
/// integers, strings, `None`, finite floats and complex numbers, and tuples
/// of simple values.
///
/// Simple objects are always inlined into their referrers, even when
/// shared, since duplicating them cannot change meaning.
pub fn is_simple(obj: &Obj) -> bool {
    match obj.kind() {
        Object::None | Object::Bool(_) | Object::Int(_) | Object::Str(_) => true,
        Object::Float(v) => v.is_finite(),
        Object::Complex(re, im) => re.is_finite() && im.is_finite(),
        Object::Tuple(t) => t.class.is_none() && t.items.iter().all(is_simple),
        _ => false,
    }
}

fn special_float_imports(values: &[f64]) -> Vec<Import> {
    let mut imports = Vec::new();
    if values.iter().any(|v| v.is_infinite()) {
        imports.push(Import::member("numpy", "inf", "inf"));
    }
    if values.iter().any(|v| v.is_nan()) {
        imports.push(Import::member("numpy", "nan", "nan"));
    }
    imports
}

pub(super) fn float_rep(value: f64) -> PersistentRep {
    PersistentRep {
        imports: special_float_imports(&[value]),
        ..PersistentRep::new(float_repr(value))
    }
}

pub(super) fn complex_rep(re: f64, im: f64) -> PersistentRep {
    let mut imports = special_float_imports(&[re, im]);
    if !(re.is_finite() && im.is_finite()) {
        imports.push(Import::member("builtins", "complex", "complex"));
    }
    PersistentRep { imports, ..PersistentRep::new(complex_repr(re, im)) }
}

/// Element names `_l_0, _l_1, ...` avoiding names visible in `env`.
fn element_args(items: &[Obj], env: &Env) -> (Vec<String>, PersistentRep) {
    let mut names = UniqueNames::new(env.keys().cloned());
    let mut rep = PersistentRep::default();
    let mut parts = Vec::with_capacity(items.len());
    for (name, item) in names.unique_names("_l_0").zip(items) {
        rep.args.push((name.clone(), item.clone()));
        parts.push(name);
    }
    (parts, rep)
}

fn wrap_class(rep: &mut PersistentRep, class: Option<&TypePath>) {
    if let Some(class) = class {
        rep.rep = format!("{}({})", class.name, rep.rep);
        rep.imports.push(Import::member(&class.module, &class.name, &class.name));
    }
}

pub(super) fn list_rep(items: &[Obj], class: Option<&TypePath>, env: &Env) -> PersistentRep {
    let (parts, mut rep) = element_args(items, env);
    rep.rep = format!("[{}]", parts.join(", "));
    wrap_class(&mut rep, class);
    rep
}

pub(super) fn tuple_rep(items: &[Obj], class: Option<&TypePath>, env: &Env) -> PersistentRep {
    let (parts, mut rep) = element_args(items, env);
    rep.rep = if parts.len() == 1 {
        format!("({}, )", parts[0])
    } else {
        format!("({})", parts.join(", "))
    };
    wrap_class(&mut rep, class);
    rep
}

/// `dict([(k, v), ...])`; the item tuples become nodes of their own.
pub(super) fn dict_rep(
    entries: &[(Obj, Obj)],
    class: Option<&TypePath>,
    env: &Env,
) -> PersistentRep {
    let items: Vec<Obj> = entries
        .iter()
        .map(|(k, v)| Obj::tuple(vec![k.clone(), v.clone()]))
        .collect();
    let mut rep = list_rep(&items, None, env);
    let class = class.cloned().unwrap_or_else(|| TypePath::builtin("dict"));
    wrap_class(&mut rep, Some(&class));
    rep
}

/// Reference to an object exported by name from its module.
fn toplevel_rep(
    registry: &Registry,
    obj: &Obj,
    module: &str,
    name: &str,
) -> Result<PersistentRep, ArchiveError> {
    match registry.lookup(module, name) {
        Some(found) if found == obj => {
            Ok(PersistentRep::new(name).with_import(Import::member(module, name, name)))
        }
        _ => Err(ArchiveError::NotInModule { module: module.to_string(), name: name.to_string() }),
    }
}

pub(super) fn type_rep(
    registry: &Registry,
    obj: &Obj,
    class: &TypeObject,
) -> Result<PersistentRep, ArchiveError> {
    if class.path == TypePath::none_type() {
        return Ok(PersistentRep::new("type(None)"));
    }
    for module in ["builtins", "types"] {
        let Some(members) = registry.module(module) else { continue };
        if let Some((name, _)) = members.iter().find(|(_, member)| member.is(obj)) {
            let name = name.as_str();
            return Ok(PersistentRep::new(name).with_import(Import::member(module, name, name)));
        }
    }
    toplevel_rep(registry, obj, &class.path.module, &class.path.name)
}

pub(super) fn function_rep(
    registry: &Registry,
    obj: &Obj,
    function: &Function,
) -> Result<PersistentRep, ArchiveError> {
    match function.qualname.split_once('.') {
        Some((class, _)) => Ok(PersistentRep::new(function.qualname.as_str())
            .with_import(Import::member(&function.module, class, class))),
        None => toplevel_rep(registry, obj, &function.module, &function.qualname),
    }
}

pub(super) fn method_rep(
    registry: &Registry,
    method: &Method,
) -> Result<PersistentRep, ArchiveError> {
    match &method.receiver {
        Receiver::Instance(instance) => Ok(PersistentRep::new(format!("_instance.{}", method.name))
            .with_arg("_instance", instance.clone())),
        Receiver::Class(class) => {
            let class_obj = registry.lookup(&class.module, &class.name).ok_or_else(|| {
                ArchiveError::NotInModule { module: class.module.clone(), name: class.name.clone() }
            })?;
            let mut rep = toplevel_rep(registry, class_obj, &class.module, &class.name)?;
            rep.rep = format!("{}.{}", rep.rep, method.name);
            Ok(rep)
        }
    }
}

pub(super) fn module_rep(name: &str) -> PersistentRep {
    let alias = name.rsplit('.').next().unwrap_or(name);
    PersistentRep::new(alias).with_import(Import::module(name, alias))
}

/// Evaluate-the-repr fallback: every free name in `text` must resolve in
/// `env`, the defining module or `builtins`, and becomes an import.
pub(super) fn repr_rep(
    registry: &Registry,
    module: &str,
    text: &str,
    env: &Env,
) -> Result<PersistentRep, ArchiveError> {
    let expr = parse_expr(text)?;
    let mut rep = PersistentRep::new(text);
    for name in expr.free_names() {
        let resolved = env
            .get(name)
            .or_else(|| registry.lookup(module, name))
            .or_else(|| registry.lookup("builtins", name))
            .ok_or_else(|| ArchiveError::UnresolvedName {
                name: name.to_string(),
                rep: text.to_string(),
            })?;
        if let (Some(source), Some(exported)) =
            (resolved.defining_module(), resolved.defining_name())
        {
            rep.imports.push(Import::member(source, exported, name));
        }
    }
    Ok(rep)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_objects() {
        assert!(is_simple(&Obj::int(1)));
        assert!(is_simple(&Obj::str("Hi")));
        assert!(is_simple(&Obj::complex(0.0, 1.0)));
        assert!(is_simple(&Obj::tuple(vec![Obj::none(), Obj::float(1.0)])));
        assert!(!is_simple(&Obj::float(f64::INFINITY)));
        assert!(!is_simple(&Obj::list(vec![Obj::int(1)])));
        assert!(!is_simple(&Obj::tuple(vec![Obj::list(vec![])])));
        assert!(!is_simple(&Obj::dict(vec![])));
    }

    #[test]
    fn test_list_names_avoid_env() {
        let env: Env = [("_l_0".to_string(), Obj::none())].into_iter().collect();
        let rep = list_rep(&[Obj::int(1), Obj::int(2)], None, &env);
        assert_eq!(rep.rep, "[_l_1, _l_2]");
        assert_eq!(rep.args.len(), 2);
    }

    #[test]
    fn test_tuple_and_dict_forms() {
        let env = Env::new();
        assert_eq!(tuple_rep(&[Obj::int(1)], None, &env).rep, "(_l_0, )");
        assert_eq!(tuple_rep(&[], None, &env).rep, "()");
        let rep = dict_rep(&[(Obj::str("a"), Obj::int(1))], None, &env);
        assert_eq!(rep.rep, "dict([_l_0])");
        assert_eq!(rep.imports, vec![Import::member("builtins", "dict", "dict")]);
    }

    #[test]
    fn test_subclass_wraps_constructor() {
        let class = TypePath::new("mylib", "Stack");
        let rep = list_rep(&[Obj::int(1)], Some(&class), &Env::new());
        assert_eq!(rep.rep, "Stack([_l_0])");
        assert_eq!(rep.imports, vec![Import::member("mylib", "Stack", "Stack")]);
    }

    #[test]
    fn test_special_floats_import_numpy() {
        let rep = float_rep(f64::NEG_INFINITY);
        assert_eq!(rep.rep, "-inf");
        assert_eq!(rep.imports, vec![Import::member("numpy", "inf", "inf")]);
        let rep = complex_rep(f64::NAN, 1.0);
        assert_eq!(rep.rep, "complex(nan, 1.0)");
        assert_eq!(rep.imports.len(), 2);
    }

    #[test]
    fn test_none_type() {
        let registry = Registry::standard();
        let none_type = registry.type_of(&Obj::none());
        let Object::Type(class) = none_type.kind() else { panic!("not a type") };
        assert_eq!(type_rep(&registry, &none_type, class).unwrap().rep, "type(None)");
    }

    #[test]
    fn test_builtin_types_found_by_identity() {
        let registry = Registry::standard();
        let int_type = registry.type_of(&Obj::int(3));
        let Object::Type(class) = int_type.kind() else { panic!("not a type") };
        let rep = type_rep(&registry, &int_type, class).unwrap();
        assert_eq!(rep.rep, "int");
        assert_eq!(rep.imports, vec![Import::member("builtins", "int", "int")]);
    }

    #[test]
    fn test_unregistered_class_is_not_in_module() {
        let registry = Registry::standard();
        let class = Obj::type_object(TypeObject::new(TypePath::new("nowhere", "Ghost")));
        let Object::Type(t) = class.kind() else { panic!("not a type") };
        assert!(matches!(type_rep(&registry, &class, t), Err(ArchiveError::NotInModule { .. })));
    }

    #[test]
    fn test_repr_names_must_resolve() {
        let registry = Registry::standard();
        let rep = repr_rep(&registry, "builtins", "dict(a=1)", &Env::new()).unwrap();
        assert_eq!(rep.imports, vec![Import::member("builtins", "dict", "dict")]);
        let err = repr_rep(&registry, "builtins", "Mystery(1)", &Env::new()).unwrap_err();
        assert!(matches!(err, ArchiveError::UnresolvedName { .. }));
    }
}

//! Dynamic object model.
//!
//! Archived values form a graph of reference-counted [`Obj`] handles. Two
//! handles are *the same object* when they share an allocation
//! ([`Obj::is`]); aliasing among archived names is tracked by that identity,
//! never by value equality.
//!
//! Built-in kinds cover what the archiver has dedicated strategies for:
//! scalars, strings, sequences, mappings, dense and sparse arrays, classes,
//! functions, bound and unbound methods, and modules. Everything else is an
//! [`Object::Instance`] of a user type implementing [`Archivable`].

pub mod array;
pub mod repr;
pub mod sparse;

use std::any::Any;
use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

pub use array::{ArrayData, DType, Element, NdArray};
pub use repr::repr_of;
pub use sparse::{SparseFormat, SparseMatrix};

use crate::error::{CapabilityError, RestoreError};
use crate::registry::Registry;
use crate::rep::PersistentRep;
use crate::restore::ScriptFunction;

/// Names visible to the archiver when resolving representations.
pub type Env = BTreeMap<String, Obj>;

/// Fully qualified class name: defining module plus name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypePath {
    /// Defining module, e.g. `builtins` or `scipy.sparse`.
    pub module: String,
    /// Class name within the module.
    pub name: String,
}

impl TypePath {
    /// Create a type path.
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self { module: module.into(), name: name.into() }
    }

    /// Path of a class in `builtins`.
    pub fn builtin(name: &str) -> Self {
        Self::new("builtins", name)
    }

    /// Path of the type of `None`, which no module exports.
    pub fn none_type() -> Self {
        Self::builtin("NoneType")
    }
}

impl fmt::Display for TypePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// Positional and keyword arguments of a call.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    /// Positional arguments in order.
    pub args: Vec<Obj>,
    /// Keyword arguments in source order.
    pub kwargs: Vec<(String, Obj)>,
}

impl CallArgs {
    /// Arguments with positional values only.
    pub fn positional(args: Vec<Obj>) -> Self {
        Self { args, kwargs: Vec::new() }
    }

    /// Argument at `index`, or passed by keyword as `name`.
    pub fn get(&self, index: usize, name: &str) -> Option<&Obj> {
        self.args.get(index).or_else(|| self.kwarg(name))
    }

    /// Keyword argument `name`.
    pub fn kwarg(&self, name: &str) -> Option<&Obj> {
        self.kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Required argument.
    pub fn required(&self, index: usize, name: &str) -> Result<&Obj, RestoreError> {
        self.get(index, name)
            .ok_or_else(|| RestoreError::Type(format!("missing required argument: '{name}'")))
    }

    /// Required integer argument.
    pub fn int(&self, index: usize, name: &str) -> Result<i64, RestoreError> {
        let value = self.required(index, name)?;
        value.as_int().ok_or_else(|| wrong_type(name, "int", value))
    }

    /// Required float argument; integers are widened.
    pub fn float(&self, index: usize, name: &str) -> Result<f64, RestoreError> {
        let value = self.required(index, name)?;
        value.as_float().ok_or_else(|| wrong_type(name, "float", value))
    }

    /// Required string argument.
    pub fn str(&self, index: usize, name: &str) -> Result<String, RestoreError> {
        let value = self.required(index, name)?;
        value.as_str().map(str::to_string).ok_or_else(|| wrong_type(name, "str", value))
    }
}

fn wrong_type(name: &str, expected: &str, value: &Obj) -> RestoreError {
    RestoreError::Type(format!(
        "argument '{name}' must be {expected}, not {}",
        value.type_path().name
    ))
}

/// Native callable installed in a [`Registry`].
pub type NativeFn = Rc<dyn Fn(&Registry, CallArgs) -> Result<Obj, RestoreError>>;

/// What happens when a function object is called.
#[derive(Clone)]
pub enum Callable {
    /// Implemented in Rust.
    Native(NativeFn),
    /// Defined by a `def` statement in a restored program.
    Script(Rc<ScriptFunction>),
    /// Named for archiving only; calling it fails.
    Opaque,
}

/// A function reachable as `module.qualname`.
#[derive(Clone)]
pub struct Function {
    /// Defining module.
    pub module: String,
    /// Qualified name; `Cls.meth` for functions living on a class.
    pub qualname: String,
    pub(crate) body: Callable,
}

impl Function {
    /// Function implemented in Rust.
    pub fn native(
        module: impl Into<String>,
        qualname: impl Into<String>,
        f: impl Fn(&Registry, CallArgs) -> Result<Obj, RestoreError> + 'static,
    ) -> Self {
        Self {
            module: module.into(),
            qualname: qualname.into(),
            body: Callable::Native(Rc::new(f)),
        }
    }

    /// Function that can be archived by name but not called.
    pub fn opaque(module: impl Into<String>, qualname: impl Into<String>) -> Self {
        Self { module: module.into(), qualname: qualname.into(), body: Callable::Opaque }
    }

    pub(crate) fn script(qualname: impl Into<String>, body: ScriptFunction) -> Self {
        Self {
            module: "__main__".to_string(),
            qualname: qualname.into(),
            body: Callable::Script(Rc::new(body)),
        }
    }

    /// Unqualified name.
    pub fn name(&self) -> &str {
        self.qualname.rsplit('.').next().unwrap_or(&self.qualname)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("module", &self.module)
            .field("qualname", &self.qualname)
            .finish_non_exhaustive()
    }
}

/// A class object.
#[derive(Clone)]
pub struct TypeObject {
    /// Where the class lives.
    pub path: TypePath,
    pub(crate) constructor: Option<NativeFn>,
    pub(crate) attrs: BTreeMap<String, Obj>,
}

impl TypeObject {
    /// Class with no constructor and no attributes.
    pub fn new(path: TypePath) -> Self {
        Self { path, constructor: None, attrs: BTreeMap::new() }
    }

    /// Class attribute, if set.
    pub fn attr(&self, name: &str) -> Option<&Obj> {
        self.attrs.get(name)
    }

    /// Whether calling the class creates instances.
    pub fn is_callable(&self) -> bool {
        self.constructor.is_some()
    }
}

impl fmt::Debug for TypeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeObject").field("path", &self.path).finish_non_exhaustive()
    }
}

/// The object a method is bound to.
#[derive(Debug, Clone)]
pub enum Receiver {
    /// Bound method of an instance.
    Instance(Obj),
    /// Unbound method reached through its class.
    Class(TypePath),
}

/// A method reference.
#[derive(Debug, Clone)]
pub struct Method {
    /// Binding.
    pub receiver: Receiver,
    /// Method name.
    pub name: String,
}

/// A mutable list, optionally of a user subclass.
#[derive(Debug)]
pub struct ListObject {
    /// Subclass, `None` for plain `list`.
    pub class: Option<TypePath>,
    items: RefCell<Vec<Obj>>,
}

impl ListObject {
    /// Borrow the elements.
    pub fn items(&self) -> Ref<'_, Vec<Obj>> {
        self.items.borrow()
    }

    /// Append an element. Lists are the only way to build reference cycles.
    pub fn push(&self, item: Obj) {
        self.items.borrow_mut().push(item);
    }
}

/// An immutable tuple, optionally of a user subclass.
#[derive(Debug)]
pub struct TupleObject {
    /// Subclass, `None` for plain `tuple`.
    pub class: Option<TypePath>,
    /// Elements.
    pub items: Vec<Obj>,
}

/// An insertion-ordered mapping, optionally of a user subclass.
#[derive(Debug)]
pub struct DictObject {
    /// Subclass, `None` for plain `dict`.
    pub class: Option<TypePath>,
    entries: RefCell<Vec<(Obj, Obj)>>,
}

impl DictObject {
    /// Borrow the entries in insertion order.
    pub fn entries(&self) -> Ref<'_, Vec<(Obj, Obj)>> {
        self.entries.borrow()
    }

    /// Value stored under a key equal to `key`.
    pub fn get(&self, key: &Obj) -> Option<Obj> {
        self.entries.borrow().iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    /// Insert or overwrite an entry.
    pub fn insert(&self, key: Obj, value: Obj) {
        let mut entries = self.entries.borrow_mut();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
    }
}

/// A value of a user type.
///
/// The archiver tries, in order: [`persistent_rep`](Archivable::persistent_rep),
/// the deprecated [`archive_1`](Archivable::archive_1), the textual
/// [`repr`](Archivable::repr) evaluated against the defining module, and
/// finally [`pickle_state`](Archivable::pickle_state).
pub trait Archivable: fmt::Debug {
    /// Class of the value. Its module is where repr names are resolved.
    fn type_path(&self) -> TypePath;

    /// Upcast for downcasting back to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Representation capability. `None` means not implemented.
    fn persistent_rep(&self, _env: &Env) -> Option<Result<PersistentRep, CapabilityError>> {
        None
    }

    /// Legacy representation capability.
    #[deprecated(note = "implement `persistent_rep` instead")]
    fn archive_1(&self, _env: &Env) -> Option<Result<PersistentRep, CapabilityError>> {
        None
    }

    /// Evaluable text form. `None` or text starting with `<` means the value
    /// has no useful textual form.
    fn repr(&self) -> Option<String> {
        None
    }

    /// Opaque state for the pickle fallback, consumed by the unpickler
    /// registered for [`type_path`](Archivable::type_path).
    fn pickle_state(&self) -> Option<Vec<u8>> {
        None
    }

    /// Attribute lookup used by restored programs.
    fn attr(&self, _name: &str) -> Option<Obj> {
        None
    }

    /// Value equality against another instance of the same type path.
    fn dyn_eq(&self, _other: &dyn Archivable) -> bool {
        false
    }
}

/// Payload of an [`Obj`].
pub enum Object {
    /// `None`.
    None,
    /// Boolean.
    Bool(bool),
    /// Machine integer.
    Int(i64),
    /// Double precision float.
    Float(f64),
    /// Complex number `(re, im)`.
    Complex(f64, f64),
    /// Text.
    Str(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Mutable list.
    List(ListObject),
    /// Tuple.
    Tuple(TupleObject),
    /// Mapping.
    Dict(DictObject),
    /// Dense array.
    Array(NdArray),
    /// Sparse matrix.
    Sparse(SparseMatrix),
    /// Class.
    Type(TypeObject),
    /// Function.
    Function(Function),
    /// Method reference.
    Method(Method),
    /// Module, by dotted name.
    Module(String),
    /// Value of a user type.
    Instance(Box<dyn Archivable>),
}

/// Shared handle to an object.
#[derive(Clone)]
pub struct Obj(Rc<Object>);

impl Obj {
    /// Wrap a payload in a fresh allocation.
    pub fn new(object: Object) -> Self {
        Self(Rc::new(object))
    }

    /// `None`.
    pub fn none() -> Self {
        Self::new(Object::None)
    }

    /// Boolean.
    pub fn bool(value: bool) -> Self {
        Self::new(Object::Bool(value))
    }

    /// Integer.
    pub fn int(value: i64) -> Self {
        Self::new(Object::Int(value))
    }

    /// Float.
    pub fn float(value: f64) -> Self {
        Self::new(Object::Float(value))
    }

    /// Complex number.
    pub fn complex(re: f64, im: f64) -> Self {
        Self::new(Object::Complex(re, im))
    }

    /// String.
    pub fn str(value: impl Into<String>) -> Self {
        Self::new(Object::Str(value.into()))
    }

    /// Byte string.
    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::new(Object::Bytes(value.into()))
    }

    /// Plain list.
    pub fn list(items: Vec<Obj>) -> Self {
        Self::list_of(None, items)
    }

    /// List, optionally of a subclass.
    pub fn list_of(class: Option<TypePath>, items: Vec<Obj>) -> Self {
        Self::new(Object::List(ListObject { class, items: RefCell::new(items) }))
    }

    /// Plain tuple.
    pub fn tuple(items: Vec<Obj>) -> Self {
        Self::tuple_of(None, items)
    }

    /// Tuple, optionally of a subclass.
    pub fn tuple_of(class: Option<TypePath>, items: Vec<Obj>) -> Self {
        Self::new(Object::Tuple(TupleObject { class, items }))
    }

    /// Plain dict with entries in the given order. Later duplicate keys win.
    pub fn dict(entries: Vec<(Obj, Obj)>) -> Self {
        Self::dict_of(None, entries)
    }

    /// Dict, optionally of a subclass.
    pub fn dict_of(class: Option<TypePath>, entries: Vec<(Obj, Obj)>) -> Self {
        let dict = DictObject { class, entries: RefCell::new(Vec::with_capacity(entries.len())) };
        for (key, value) in entries {
            dict.insert(key, value);
        }
        Self::new(Object::Dict(dict))
    }

    /// Dense array.
    pub fn array(array: NdArray) -> Self {
        Self::new(Object::Array(array))
    }

    /// Sparse matrix.
    pub fn sparse(matrix: SparseMatrix) -> Self {
        Self::new(Object::Sparse(matrix))
    }

    /// Class object.
    pub fn type_object(class: TypeObject) -> Self {
        Self::new(Object::Type(class))
    }

    /// Function object.
    pub fn function(function: Function) -> Self {
        Self::new(Object::Function(function))
    }

    /// Method bound to an instance.
    pub fn bound_method(instance: Obj, name: impl Into<String>) -> Self {
        Self::new(Object::Method(Method {
            receiver: Receiver::Instance(instance),
            name: name.into(),
        }))
    }

    /// Method reached through its class.
    pub fn unbound_method(class: TypePath, name: impl Into<String>) -> Self {
        Self::new(Object::Method(Method { receiver: Receiver::Class(class), name: name.into() }))
    }

    /// Module reference.
    pub fn module(name: impl Into<String>) -> Self {
        Self::new(Object::Module(name.into()))
    }

    /// Value of a user type.
    pub fn instance(value: impl Archivable + 'static) -> Self {
        Self::new(Object::Instance(Box::new(value)))
    }

    /// Payload.
    pub fn kind(&self) -> &Object {
        &self.0
    }

    /// Identity token, stable for the lifetime of the allocation.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Whether both handles refer to the same object.
    pub fn is(&self, other: &Obj) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Integer value; booleans count as integers.
    pub fn as_int(&self) -> Option<i64> {
        match self.kind() {
            Object::Int(v) => Some(*v),
            Object::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Float value; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self.kind() {
            Object::Float(v) => Some(*v),
            Object::Int(v) => Some(*v as f64),
            Object::Bool(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        }
    }

    /// String value.
    pub fn as_str(&self) -> Option<&str> {
        match self.kind() {
            Object::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Dense array payload.
    pub fn as_array(&self) -> Option<&NdArray> {
        match self.kind() {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Borrow a user instance as its concrete type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self.kind() {
            Object::Instance(value) => (**value).as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Elements of a list or tuple, cloned out of any borrow.
    pub fn sequence_items(&self) -> Option<Vec<Obj>> {
        match self.kind() {
            Object::List(list) => Some(list.items().clone()),
            Object::Tuple(tuple) => Some(tuple.items.clone()),
            _ => None,
        }
    }

    /// Class of this object.
    pub fn type_path(&self) -> TypePath {
        match self.kind() {
            Object::None => TypePath::none_type(),
            Object::Bool(_) => TypePath::builtin("bool"),
            Object::Int(_) => TypePath::builtin("int"),
            Object::Float(_) => TypePath::builtin("float"),
            Object::Complex(..) => TypePath::builtin("complex"),
            Object::Str(_) => TypePath::builtin("str"),
            Object::Bytes(_) => TypePath::builtin("bytes"),
            Object::List(l) => l.class.clone().unwrap_or_else(|| TypePath::builtin("list")),
            Object::Tuple(t) => t.class.clone().unwrap_or_else(|| TypePath::builtin("tuple")),
            Object::Dict(d) => d.class.clone().unwrap_or_else(|| TypePath::builtin("dict")),
            Object::Array(_) => TypePath::new("numpy", "ndarray"),
            Object::Sparse(m) => TypePath::new("scipy.sparse", m.format.class_name()),
            Object::Type(_) => TypePath::builtin("type"),
            Object::Function(_) => TypePath::new("types", "FunctionType"),
            Object::Method(_) => TypePath::new("types", "MethodType"),
            Object::Module(_) => TypePath::new("types", "ModuleType"),
            Object::Instance(value) => value.type_path(),
        }
    }

    /// Module an object can be imported from by name, for classes and
    /// functions.
    pub fn defining_module(&self) -> Option<&str> {
        match self.kind() {
            Object::Type(t) => Some(&t.path.module),
            Object::Function(f) => Some(&f.module),
            _ => None,
        }
    }

    /// Name the object is exported under in its defining module.
    pub fn defining_name(&self) -> Option<&str> {
        match self.kind() {
            Object::Type(t) => Some(&t.path.name),
            Object::Function(f) => Some(&f.qualname),
            _ => None,
        }
    }
}

impl PartialEq for Obj {
    fn eq(&self, other: &Self) -> bool {
        if self.is(other) {
            return true;
        }
        match (self.kind(), other.kind()) {
            (Object::None, Object::None) => true,
            (Object::Bool(a), Object::Bool(b)) => a == b,
            (Object::Int(a), Object::Int(b)) => a == b,
            (Object::Float(a), Object::Float(b)) => a == b,
            (Object::Int(a), Object::Float(b)) | (Object::Float(b), Object::Int(a)) => {
                *a as f64 == *b
            }
            (Object::Complex(ar, ai), Object::Complex(br, bi)) => ar == br && ai == bi,
            (Object::Str(a), Object::Str(b)) => a == b,
            (Object::Bytes(a), Object::Bytes(b)) => a == b,
            (Object::List(a), Object::List(b)) => a.class == b.class && *a.items() == *b.items(),
            (Object::Tuple(a), Object::Tuple(b)) => a.class == b.class && a.items == b.items,
            (Object::Dict(a), Object::Dict(b)) => {
                a.class == b.class && *a.entries() == *b.entries()
            }
            (Object::Array(a), Object::Array(b)) => a == b,
            (Object::Sparse(a), Object::Sparse(b)) => a == b,
            (Object::Type(a), Object::Type(b)) => a.path == b.path,
            (Object::Function(a), Object::Function(b)) => {
                a.module == b.module && a.qualname == b.qualname
            }
            (Object::Method(a), Object::Method(b)) => {
                a.name == b.name
                    && match (&a.receiver, &b.receiver) {
                        (Receiver::Instance(x), Receiver::Instance(y)) => x == y,
                        (Receiver::Class(x), Receiver::Class(y)) => x == y,
                        _ => false,
                    }
            }
            (Object::Module(a), Object::Module(b)) => a == b,
            (Object::Instance(a), Object::Instance(b)) => {
                a.type_path() == b.type_path() && a.dyn_eq(&**b)
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&repr_of(self))
    }
}

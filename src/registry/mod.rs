//! Importable modules shared by archiving and restoring.
//!
//! Archiving looks up classes and functions here to decide whether they can
//! be referenced by name, and resolves free names of repr text against their
//! defining module. Restoring executes `import` statements against the same
//! table, so a program only restores in a registry that exports every name
//! it imports.

mod standard;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use crate::error::RestoreError;
use crate::object::{CallArgs, Function, NativeFn, Obj, Object, TypeObject, TypePath};

/// Rebuilds an instance from the state bytes of its pickle envelope.
pub type Unpickler = Rc<dyn Fn(&Registry, &[u8]) -> Result<Obj, RestoreError>>;

/// A module: a handle plus named members.
#[derive(Debug, Clone)]
pub struct Module {
    handle: Obj,
    members: BTreeMap<String, Obj>,
}

impl Module {
    fn new(name: &str) -> Self {
        Self { handle: Obj::module(name), members: BTreeMap::new() }
    }

    /// The module object bound by `import`.
    pub fn handle(&self) -> &Obj {
        &self.handle
    }

    /// Member by name.
    pub fn get(&self, name: &str) -> Option<&Obj> {
        self.members.get(name)
    }

    /// Members in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Obj)> {
        self.members.iter()
    }
}

/// Builder for a user class.
///
/// ```
/// use persist::{ClassDef, Obj, Registry};
///
/// let mut registry = Registry::standard();
/// let stack = registry.register_class(ClassDef::list_subclass("mylib", "Stack"));
/// assert!(registry.lookup("mylib", "Stack").is_some_and(|c| c.is(&stack)));
/// ```
pub struct ClassDef {
    class: TypeObject,
    unpickler: Option<Unpickler>,
}

impl ClassDef {
    /// Class `module.name` with no constructor.
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self { class: TypeObject::new(TypePath::new(module, name)), unpickler: None }
    }

    /// Subclass of `list`: calling it wraps the items of an iterable.
    pub fn list_subclass(module: impl Into<String>, name: impl Into<String>) -> Self {
        let def = Self::new(module, name);
        let path = def.class.path.clone();
        def.constructor(move |_, args| {
            let items = match args.get(0, "iterable") {
                Some(iterable) => standard::iterate(iterable)?,
                None => Vec::new(),
            };
            Ok(Obj::list_of(Some(path.clone()), items))
        })
    }

    /// Subclass of `tuple`.
    pub fn tuple_subclass(module: impl Into<String>, name: impl Into<String>) -> Self {
        let def = Self::new(module, name);
        let path = def.class.path.clone();
        def.constructor(move |_, args| {
            let items = match args.get(0, "iterable") {
                Some(iterable) => standard::iterate(iterable)?,
                None => Vec::new(),
            };
            Ok(Obj::tuple_of(Some(path.clone()), items))
        })
    }

    /// Subclass of `dict`: accepts a sequence of pairs and keywords.
    pub fn dict_subclass(module: impl Into<String>, name: impl Into<String>) -> Self {
        let def = Self::new(module, name);
        let path = def.class.path.clone();
        def.constructor(move |_, args| {
            Ok(Obj::dict_of(Some(path.clone()), standard::dict_entries(&args)?))
        })
    }

    /// Set what calling the class does.
    pub fn constructor(
        mut self,
        f: impl Fn(&Registry, CallArgs) -> Result<Obj, RestoreError> + 'static,
    ) -> Self {
        self.class.constructor = Some(Rc::new(f) as NativeFn);
        self
    }

    /// Set how `pickle.loads` rebuilds instances of this class.
    pub fn unpickler(
        mut self,
        f: impl Fn(&Registry, &[u8]) -> Result<Obj, RestoreError> + 'static,
    ) -> Self {
        self.unpickler = Some(Rc::new(f));
        self
    }

    /// Add a class attribute.
    pub fn attr(mut self, name: impl Into<String>, value: Obj) -> Self {
        self.class.attrs.insert(name.into(), value);
        self
    }

    /// Add a method, reachable as `Class.name` and bound on instances.
    pub fn method(self, name: &str) -> Self {
        let method = Obj::unbound_method(self.class.path.clone(), name);
        self.attr(name, method)
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef").field("class", &self.class).finish_non_exhaustive()
    }
}

/// Table of modules.
#[derive(Clone, Default)]
pub struct Registry {
    modules: BTreeMap<String, Module>,
    unpicklers: HashMap<TypePath, Unpickler>,
    none_type: Option<Obj>,
}

impl Registry {
    /// Registry with no modules at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with `builtins`, `types`, `numpy`, `scipy.sparse`, `pickle`
    /// and `persist.arrays`.
    pub fn standard() -> Self {
        let mut registry = Self::default();
        standard::install(&mut registry);
        registry
    }

    /// Create `module` if missing.
    pub fn add_module(&mut self, module: &str) -> &mut Self {
        self.modules.entry(module.to_string()).or_insert_with(|| Module::new(module));
        self
    }

    /// Export `value` from `module` under `name`.
    pub fn register(&mut self, module: &str, name: impl Into<String>, value: Obj) -> &mut Self {
        self.modules
            .entry(module.to_string())
            .or_insert_with(|| Module::new(module))
            .members
            .insert(name.into(), value);
        self
    }

    /// Export a class from its module and return the class object.
    pub fn register_class(&mut self, def: ClassDef) -> Obj {
        let ClassDef { class, unpickler } = def;
        let path = class.path.clone();
        if let Some(unpickler) = unpickler {
            self.unpicklers.insert(path.clone(), unpickler);
        }
        let class = Obj::type_object(class);
        self.register(&path.module, path.name.as_str(), class.clone());
        class
    }

    /// Export a function under the first segment of its qualified name.
    pub fn register_function(&mut self, function: Function) -> Obj {
        let module = function.module.clone();
        let name = function.qualname.split('.').next().unwrap_or(&function.qualname).to_string();
        let function = Obj::function(function);
        self.register(&module, name, function.clone());
        function
    }

    pub(crate) fn set_none_type(&mut self, class: Obj) {
        self.none_type = Some(class);
    }

    /// Module by dotted name.
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// `module.name`, if exported.
    pub fn lookup(&self, module: &str, name: &str) -> Option<&Obj> {
        self.modules.get(module).and_then(|m| m.members.get(name))
    }

    /// Member of `builtins`.
    pub fn builtin(&self, name: &str) -> Option<&Obj> {
        self.lookup("builtins", name)
    }

    /// Unpickler registered for a class.
    pub fn unpickler(&self, class: &TypePath) -> Option<&Unpickler> {
        self.unpicklers.get(class)
    }

    /// Class object of `obj`: the exported class when registered, the type
    /// of `None` for `None`, else a fresh unexported class.
    pub fn type_of(&self, obj: &Obj) -> Obj {
        if let (Object::None, Some(none_type)) = (obj.kind(), &self.none_type) {
            return none_type.clone();
        }
        let path = obj.type_path();
        match self.lookup(&path.module, &path.name) {
            Some(class) if matches!(class.kind(), Object::Type(_)) => class.clone(),
            _ => Obj::type_object(TypeObject::new(path)),
        }
    }

    /// Module names in order.
    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

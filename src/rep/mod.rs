//! Persistent representations and the per-object dispatch that builds them.
//!
//! A [`PersistentRep`] is an expression template plus the objects its free
//! names stand for (`args`) and the imports it relies on. Dispatch order for
//! one object:
//!
//! 1. A user type's [`persistent_rep`](crate::Archivable::persistent_rep)
//!    capability, then the deprecated `archive_1`.
//! 2. A dedicated strategy for the built-in kind (containers, floats,
//!    arrays, classes, functions, methods, modules).
//! 3. The object's textual repr, with free names resolved against the env,
//!    the defining module and `builtins`.
//! 4. Pickling, when the repr is not evaluable.

mod array;
mod builtin;
pub(crate) mod pickle;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::archive::ArchiveConfig;
use crate::error::ArchiveError;
use crate::graph::RepSource;
use crate::object::{repr_of, Archivable, Env, Obj, Object};
use crate::registry::Registry;

pub(crate) use array::shape_repr;
pub use builtin::is_simple;

/// An import a representation needs: `import module as alias` when `name`
/// is `None`, else `from module import name as alias`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Import {
    /// Module path.
    pub module: String,
    /// Member name, `None` to import the module itself.
    pub name: Option<String>,
    /// Name bound in the importing scope.
    pub alias: String,
}

impl Import {
    /// `import module as alias`.
    pub fn module(module: impl Into<String>, alias: impl Into<String>) -> Self {
        Self { module: module.into(), name: None, alias: alias.into() }
    }

    /// `from module import name as alias`.
    pub fn member(
        module: impl Into<String>,
        name: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self { module: module.into(), name: Some(name.into()), alias: alias.into() }
    }

    /// Source line for this import.
    pub fn statement(&self) -> String {
        match &self.name {
            None if self.module == self.alias => format!("import {}", self.module),
            None => format!("import {} as {}", self.module, self.alias),
            Some(name) if *name == self.alias => format!("from {} import {}", self.module, name),
            Some(name) => format!("from {} import {} as {}", self.module, name, self.alias),
        }
    }
}

/// Template plus bindings describing how to rebuild one object.
#[derive(Debug, Clone, Default)]
pub struct PersistentRep {
    /// Expression template.
    pub rep: String,
    /// Free names standing for other objects, in binding order.
    pub args: Vec<(String, Obj)>,
    /// Imports the template needs.
    pub imports: Vec<Import>,
}

impl PersistentRep {
    /// Template with no bindings.
    pub fn new(rep: impl Into<String>) -> Self {
        Self { rep: rep.into(), args: Vec::new(), imports: Vec::new() }
    }

    /// Bind a free name to an object.
    pub fn with_arg(mut self, name: impl Into<String>, obj: Obj) -> Self {
        self.args.push((name.into(), obj));
        self
    }

    /// Add an import.
    pub fn with_import(mut self, import: Import) -> Self {
        self.imports.push(import);
        self
    }
}

/// Builds persistent representations, recording large arrays as side data.
pub struct Dispatcher<'a> {
    registry: &'a Registry,
    tostring: bool,
    array_threshold: Option<usize>,
    data_name: &'a str,
    data: &'a mut BTreeMap<String, Obj>,
}

impl<'a> Dispatcher<'a> {
    /// Dispatcher configured from an archive's settings.
    pub fn new(
        config: &'a ArchiveConfig,
        registry: &'a Registry,
        data: &'a mut BTreeMap<String, Obj>,
    ) -> Self {
        Self {
            registry,
            tostring: config.tostring,
            array_threshold: config.array_threshold,
            data_name: &config.data_name,
            data,
        }
    }

    /// Representation of one object.
    pub fn persistent_rep(&mut self, obj: &Obj, env: &Env) -> Result<PersistentRep, ArchiveError> {
        match obj.kind() {
            Object::Instance(value) => self.instance_rep(&**value, env),
            Object::None | Object::Bool(_) | Object::Int(_) | Object::Str(_) | Object::Bytes(_) => {
                Ok(PersistentRep::new(repr_of(obj)))
            }
            Object::Float(v) => Ok(builtin::float_rep(*v)),
            Object::Complex(re, im) => Ok(builtin::complex_rep(*re, *im)),
            Object::List(list) => Ok(builtin::list_rep(&list.items(), list.class.as_ref(), env)),
            Object::Tuple(tuple) => Ok(builtin::tuple_rep(&tuple.items, tuple.class.as_ref(), env)),
            Object::Dict(dict) => Ok(builtin::dict_rep(&dict.entries(), dict.class.as_ref(), env)),
            Object::Array(a) => Ok(self.ndarray_rep(obj, a)),
            Object::Sparse(m) => array::sparse_rep(m),
            Object::Type(t) => builtin::type_rep(self.registry, obj, t),
            Object::Function(f) => builtin::function_rep(self.registry, obj, f),
            Object::Method(m) => builtin::method_rep(self.registry, m),
            Object::Module(name) => Ok(builtin::module_rep(name)),
        }
    }

    #[allow(deprecated)]
    fn instance_rep(
        &mut self,
        value: &dyn Archivable,
        env: &Env,
    ) -> Result<PersistentRep, ArchiveError> {
        let path = value.type_path();
        match value.persistent_rep(env) {
            Some(Ok(rep)) => return Ok(rep),
            Some(Err(err)) => {
                warn!(class = %path, error = %err, "persistent_rep() failed; falling back");
            }
            None => {}
        }
        match value.archive_1(env) {
            Some(Ok(rep)) => {
                warn!(class = %path, "archive_1 is deprecated; implement persistent_rep instead");
                return Ok(rep);
            }
            Some(Err(err)) => {
                warn!(class = %path, error = %err, "archive_1() failed; falling back");
            }
            None => {}
        }
        let text = value.repr().unwrap_or_else(|| format!("<{path} object>"));
        if text.starts_with('<') {
            return pickle::pickle_rep(value, &text);
        }
        builtin::repr_rep(self.registry, &path.module, &text, env)
    }

    fn ndarray_rep(&mut self, obj: &Obj, a: &crate::object::NdArray) -> PersistentRep {
        match self.array_threshold {
            Some(threshold) if threshold < a.size() => {
                let name = self.side_data_name(obj);
                PersistentRep::new(format!("{}['{}']", self.data_name, name))
            }
            _ => array::ndarray_rep(a, self.tostring),
        }
    }

    /// Key of `obj` in the side-data table, adding it if needed.
    fn side_data_name(&mut self, obj: &Obj) -> String {
        if let Some((name, _)) = self.data.iter().find(|(_, stored)| stored.is(obj)) {
            return name.clone();
        }
        let mut i = self.data.len();
        let name = loop {
            let candidate = format!("array_{i}");
            if !self.data.contains_key(&candidate) {
                break candidate;
            }
            i += 1;
        };
        self.data.insert(name.clone(), obj.clone());
        name
    }
}

impl RepSource for Dispatcher<'_> {
    fn persistent_rep(&mut self, obj: &Obj, env: &Env) -> Result<PersistentRep, ArchiveError> {
        Dispatcher::persistent_rep(self, obj, env)
    }
}

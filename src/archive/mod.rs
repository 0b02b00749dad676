//! The caller-facing archive.
//!
//! An [`Archive`] accumulates named objects and renders them as a program
//! that rebuilds them when executed with [`restore`](crate::restore()).
//!
//! ```
//! use persist::{restore, Archive, Env, Obj};
//!
//! let shared = Obj::list(vec![Obj::int(1), Obj::int(2)]);
//! let mut archive = Archive::default();
//! archive.insert("a", Obj::list(vec![shared.clone(), shared])).unwrap();
//!
//! let ns = restore(&archive.render().unwrap(), &Env::new()).unwrap();
//! let a = ns["a"].sequence_items().unwrap();
//! assert!(a[0].is(&a[1]));
//! ```

mod config;
mod render;
mod save;

use std::cell::RefCell;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::canonical::canonical_hash_hex;
use crate::error::ArchiveError;
use crate::graph::{Entry, Graph, Mode};
use crate::names::{is_identifier, UniqueNames};
use crate::object::{Env, Obj};
use crate::registry::Registry;
use crate::rep::{Dispatcher, Import};

pub use config::{ArchiveConfig, DEFAULT_DATA_NAME, DEFAULT_GNAME_PREFIX};
pub use save::{backup, SaveOptions, SaveReport};

/// Flat form of an archive: imports to execute, then `name = rep`
/// definitions in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persistent {
    /// Imports with their final aliases.
    pub imports: Vec<Import>,
    /// `(name, expression)` pairs, dependencies first, aliases last.
    pub defs: Vec<(String, String)>,
}

impl Persistent {
    /// Stable hash of the imports and definitions.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        canonical_hash_hex(self)
    }
}

/// Accumulator of named objects.
#[derive(Debug)]
pub struct Archive {
    config: ArchiveConfig,
    registry: Registry,
    entries: Vec<Entry>,
    data: RefCell<BTreeMap<String, Obj>>,
}

impl Default for Archive {
    fn default() -> Self {
        Self::new(ArchiveConfig::default())
    }
}

impl Archive {
    /// Empty archive resolving names against [`Registry::standard`].
    pub fn new(config: ArchiveConfig) -> Self {
        Self::with_registry(config, Registry::standard())
    }

    /// Empty archive resolving names against `registry`.
    pub fn with_registry(config: ArchiveConfig, registry: Registry) -> Self {
        Self { config, registry, entries: Vec::new(), data: RefCell::new(BTreeMap::new()) }
    }

    /// Settings.
    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Mutable settings; takes effect at the next render.
    pub fn config_mut(&mut self) -> &mut ArchiveConfig {
        &mut self.config
    }

    /// Modules names are resolved against.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable access for registering classes and functions.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Insert `obj` under `name`.
    pub fn insert(&mut self, name: &str, obj: Obj) -> Result<(), ArchiveError> {
        self.insert_env(name, obj, &Env::new())
    }

    /// Insert `obj` under `name`, resolving names in its repr text against
    /// `env`.
    ///
    /// Inserting the same object under the same name again does nothing; a
    /// different object under a taken name is a [`ArchiveError::Duplicate`].
    pub fn insert_env(&mut self, name: &str, obj: Obj, env: &Env) -> Result<(), ArchiveError> {
        if self.config.single_item_mode {
            if let Some(first) = self.entries.first() {
                if first.name != name {
                    return Err(ArchiveError::SingleItem(format!(
                        "Can't insert '{name}' into single_item_mode=True archive with '{}'.",
                        first.name
                    )));
                }
            }
        }
        self.insert_one(name, obj, env)
    }

    /// Insert several named objects sharing one env.
    pub fn insert_many<I, S>(&mut self, items: I, env: &Env) -> Result<(), ArchiveError>
    where
        I: IntoIterator<Item = (S, Obj)>,
        S: AsRef<str>,
    {
        let items: Vec<(S, Obj)> = items.into_iter().collect();
        if self.config.single_item_mode && items.len() != 1 {
            return Err(ArchiveError::SingleItem(format!(
                "Can't insert {} items when single_item_mode=True",
                items.len()
            )));
        }
        for (name, obj) in items {
            self.insert_env(name.as_ref(), obj, env)?;
        }
        Ok(())
    }

    fn insert_one(&mut self, name: &str, obj: Obj, env: &Env) -> Result<(), ArchiveError> {
        if !is_identifier(name) {
            return Err(ArchiveError::InvalidName(name.to_string()));
        }
        if name.starts_with('_') && !self.config.is_allowed(name) {
            return Err(ArchiveError::PrivateName(name.to_string()));
        }
        if let Some(existing) = self.entries.iter().find(|e| e.name == name) {
            if existing.obj.is(&obj) {
                return Ok(());
            }
            return Err(ArchiveError::Duplicate(name.to_string()));
        }
        if self.config.check_on_insert {
            let mut scratch = BTreeMap::new();
            Dispatcher::new(&self.config, &self.registry, &mut scratch).persistent_rep(&obj, env)?;
        }
        self.entries.push(Entry { name: name.to_string(), obj, env: env.clone() });
        Ok(())
    }

    /// A name not yet used in this archive, derived from `name`.
    pub fn unique_name(&self, name: &str) -> String {
        UniqueNames::new(self.names()).unique(name)
    }

    /// Inserted names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Object inserted under `name`.
    pub fn get(&self, name: &str) -> Option<&Obj> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.obj)
    }

    /// Number of inserted names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been inserted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Side data of the latest render: arrays above the threshold, keyed
    /// by the name the program looks them up under.
    pub fn data(&self) -> BTreeMap<String, Obj> {
        self.data.borrow().clone()
    }

    /// Env binding the side-data table, for restoring a rendered program
    /// without saving its data to disk.
    pub fn data_env(&self) -> Env {
        let table =
            self.data.borrow().iter().map(|(k, v)| (Obj::str(k.as_str()), v.clone())).collect();
        Env::from([(self.config.data_name.clone(), Obj::dict(table))])
    }

    /// Every build starts from an empty side-data table, so it only ever
    /// holds the arrays of the latest render.
    fn build_graph(&self, mode: Mode) -> Result<Graph, ArchiveError> {
        let mut data = self.data.borrow_mut();
        data.clear();
        let mut source = Dispatcher::new(&self.config, &self.registry, &mut data);
        Graph::build(&self.entries, &mut source, mode, &self.config.graph_options())
    }

    /// Build and reduce the flat graph and return its imports and
    /// definitions. A name whose object was also inserted under a later
    /// name is emitted as an alias of it.
    pub fn make_persistent(&self) -> Result<Persistent, ArchiveError> {
        let mut graph = self.build_graph(Mode::Flat)?;
        graph.reduce()?;
        let mut defs: Vec<(String, String)> =
            graph.ordered_nodes().map(|node| (node.name.clone(), node.rep.clone())).collect();
        let aliases = self.aliases(&graph, |name| defs.iter().any(|(def, _)| def == name));
        defs.extend(aliases);
        debug!(imports = graph.imports().len(), defs = defs.len(), "made persistent");
        Ok(Persistent { imports: graph.imports().to_vec(), defs })
    }

    /// `(name, target)` for every inserted name not bound by `defined`.
    fn aliases(&self, graph: &Graph, defined: impl Fn(&str) -> bool) -> Vec<(String, String)> {
        let mut aliases: Vec<(String, String)> = Vec::new();
        for entry in &self.entries {
            if defined(&entry.name) || aliases.iter().any(|(name, _)| *name == entry.name) {
                continue;
            }
            if let Some(node) = graph.token_of(&entry.obj).and_then(|token| graph.node(token)) {
                aliases.push((entry.name.clone(), node.name.clone()));
            }
        }
        aliases
    }
}

/// Imports naming the class of `obj`, for writing
/// [`persistent_rep`](crate::Archivable::persistent_rep) implementations
/// that call the class as a constructor.
pub fn get_imports(obj: &Obj) -> Vec<Import> {
    let class = obj.type_path();
    let module = obj.defining_module().unwrap_or(&class.module);
    vec![Import::member(module, class.name.as_str(), class.name.as_str())]
}

/// Import of a class or function by the name its module exports it under,
/// with the local name to use for it.
///
/// Fails unless `registry` maps that module and name to this very object.
pub fn get_toplevel_imports(
    registry: &Registry,
    obj: &Obj,
) -> Result<(Vec<Import>, String), ArchiveError> {
    let (Some(module), Some(name)) = (obj.defining_module(), obj.defining_name()) else {
        return Err(ArchiveError::InvalidArgument(format!(
            "{} has no module-level name",
            obj.type_path()
        )));
    };
    match registry.lookup(module, name) {
        Some(found) if found.is(obj) => {
            Ok((vec![Import::member(module, name, name)], name.to_string()))
        }
        _ => Err(ArchiveError::NotInModule { module: module.to_string(), name: name.to_string() }),
    }
}

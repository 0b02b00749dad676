//! Dependency graph of archived objects.
//!
//! Nodes are keyed by a [`Token`] handed out by an [`IdentityMap`] on first
//! encounter, so equal-valued but distinct objects get distinct nodes and
//! shared objects get exactly one. Discovery is a depth-first walk driven by
//! an explicit stack; the node map doubles as the visited set, so cycles are
//! not followed here but surface in the topological sort.
//!
//! # Modes
//!
//! - [`Mode::Flat`]: every node is bound in one global namespace. Imports are
//!   merged and renamed, generated names are made globally unique, and each
//!   template is rewritten to use the final names. Flat graphs can be
//!   [reduced](Graph::reduce).
//! - [`Mode::Scoped`]: templates are left untouched; the renderer evaluates
//!   each node in its own function scope instead.

mod reduce;
mod topo;

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ArchiveError, CycleError};
use crate::names::UniqueNames;
use crate::object::{Env, Obj};
use crate::rep::{Import, PersistentRep};
use crate::replace::{replace_rep, Replacements};

pub(crate) use topo::topsort;

/// Identity token of an object within one graph build.
pub type Token = usize;

/// Edge-discovery oracle: the representation of one object.
pub trait RepSource {
    /// Representation of `obj`, resolving repr names against `env`.
    fn persistent_rep(&mut self, obj: &Obj, env: &Env) -> Result<PersistentRep, ArchiveError>;
}

/// Sequential tokens for live objects.
///
/// The map keeps a handle to every object it has seen, so an address can
/// never be recycled to a different object while the map exists.
#[derive(Debug, Default)]
pub struct IdentityMap {
    tokens: HashMap<usize, Token>,
    held: Vec<Obj>,
}

impl IdentityMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token of `obj`, assigning the next one on first encounter.
    pub fn token(&mut self, obj: &Obj) -> Token {
        if let Some(&token) = self.tokens.get(&obj.id()) {
            return token;
        }
        let token = self.held.len();
        self.tokens.insert(obj.id(), token);
        self.held.push(obj.clone());
        token
    }

    /// Token of `obj` if it has one.
    pub fn get(&self, obj: &Obj) -> Option<Token> {
        self.tokens.get(&obj.id()).copied()
    }

    /// Number of tokens handed out.
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Whether no object has been seen.
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

/// A named root: `(name, object, env)`.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Caller-chosen name.
    pub name: String,
    /// Archived object.
    pub obj: Obj,
    /// Names used to resolve repr text of this object and its dependencies.
    pub env: Env,
}

impl Entry {
    /// Root with an empty env.
    pub fn new(name: impl Into<String>, obj: Obj) -> Self {
        Self { name: name.into(), obj, env: Env::new() }
    }
}

/// How the graph will be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// One global namespace with textual renaming.
    Flat,
    /// One function scope per node.
    Scoped,
}

/// Build options.
#[derive(Debug, Clone)]
pub struct GraphOptions {
    /// Use the exact parse-tree substitution engine.
    pub robust_replace: bool,
    /// Prefix of generated node names.
    pub gname_prefix: String,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self { robust_replace: true, gname_prefix: "_g".to_string() }
    }
}

/// One vertex: an object and how to rebuild it.
#[derive(Debug, Clone)]
pub struct Node {
    /// The object.
    pub obj: Obj,
    /// Expression template.
    pub rep: String,
    /// Names in `rep` bound to dependencies.
    pub args: Vec<(String, Obj)>,
    /// Binding name; final once the graph is built.
    pub name: String,
    /// Imports as requested by the representation.
    pub imports: Vec<Import>,
    /// Dependency tokens, one per reference.
    pub children: Vec<Token>,
    /// Referrer tokens, one per reference.
    pub parents: Vec<Token>,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({}={})", self.name, self.rep)
    }
}

/// Dependency graph over a set of named roots.
#[derive(Debug)]
pub struct Graph {
    mode: Mode,
    options: GraphOptions,
    ids: IdentityMap,
    nodes: HashMap<Token, Node>,
    discovered: Vec<Token>,
    roots: BTreeSet<Token>,
    imports: Vec<Import>,
    names: UniqueNames,
    order: Vec<Token>,
}

impl Graph {
    /// Build the graph reachable from `entries`.
    ///
    /// Roots keep their names. In flat mode every other node is named
    /// from its token (`_g3`) and made unique; in scoped mode generated
    /// names are made unique but templates are not rewritten.
    pub fn build(
        entries: &[Entry],
        source: &mut dyn RepSource,
        mode: Mode,
        options: &GraphOptions,
    ) -> Result<Self, ArchiveError> {
        let mut ids = IdentityMap::new();
        for entry in entries {
            ids.token(&entry.obj);
        }
        let mut graph = Self {
            mode,
            options: options.clone(),
            ids,
            nodes: HashMap::new(),
            discovered: Vec::new(),
            roots: BTreeSet::new(),
            imports: Vec::new(),
            names: UniqueNames::new(entries.iter().map(|e| e.name.as_str())),
            order: Vec::new(),
        };

        let mut envs: HashMap<Token, &Env> = HashMap::new();
        for entry in entries {
            let token = graph.ids.token(&entry.obj);
            let node = graph.new_node(source, &entry.obj, &entry.env, entry.name.clone())?;
            graph.roots.insert(token);
            envs.insert(token, &entry.env);
            graph.insert(token, node);
        }

        let roots: Vec<Token> = graph.roots.iter().copied().collect();
        for root in roots {
            let env = envs.get(&root).copied().cloned().unwrap_or_default();
            graph.discover(source, root, &env)?;
        }

        graph.order = graph.topological_order()?;
        match mode {
            Mode::Flat => graph.assign_names()?,
            Mode::Scoped => graph.link_parents(),
        }
        debug!(
            nodes = graph.nodes.len(),
            roots = graph.roots.len(),
            imports = graph.imports.len(),
            ?mode,
            "built graph"
        );
        Ok(graph)
    }

    fn insert(&mut self, token: Token, node: Node) {
        if self.nodes.insert(token, node).is_none() {
            self.discovered.push(token);
        }
    }

    fn new_node(
        &mut self,
        source: &mut dyn RepSource,
        obj: &Obj,
        env: &Env,
        name: String,
    ) -> Result<Node, ArchiveError> {
        let PersistentRep { rep, args, imports } = source.persistent_rep(obj, env)?;
        let rep = match self.mode {
            Mode::Flat => self.process_imports(&rep, &args, &imports)?,
            Mode::Scoped => rep,
        };
        let children = args.iter().map(|(_, child)| self.ids.token(child)).collect();
        Ok(Node { obj: obj.clone(), rep, args, name, imports, children, parents: Vec::new() })
    }

    /// Depth-first discovery below `root`; newly found nodes inherit `env`.
    fn discover(
        &mut self,
        source: &mut dyn RepSource,
        root: Token,
        env: &Env,
    ) -> Result<(), ArchiveError> {
        let mut stack: Vec<(Token, usize)> = vec![(root, 0)];
        while let Some(frame) = stack.last_mut() {
            let (token, index) = *frame;
            let next = self
                .nodes
                .get(&token)
                .and_then(|node| node.args.get(index))
                .map(|(_, obj)| obj.clone());
            let Some(child) = next else {
                stack.pop();
                continue;
            };
            frame.1 += 1;
            let child_token = self.ids.token(&child);
            if !self.nodes.contains_key(&child_token) {
                let name = format!("{}{}", self.options.gname_prefix, child_token);
                let node = self.new_node(source, &child, env, name)?;
                self.insert(child_token, node);
                stack.push((child_token, 0));
            }
        }
        Ok(())
    }

    /// Merge a node's imports into the global list and rewrite its template
    /// to the aliases actually imported.
    ///
    /// An import of an already imported `(module, name)` reuses that alias.
    /// New aliases get a leading `_` and avoid the node's argument names.
    fn process_imports(
        &mut self,
        rep: &str,
        args: &[(String, Obj)],
        imports: &[Import],
    ) -> Result<String, ArchiveError> {
        let mut arg_names: Vec<&str> = args.iter().map(|(name, _)| name.as_str()).collect();
        arg_names.sort_unstable();

        let mut replacements = Replacements::new();
        for import in imports {
            let existing = self
                .imports
                .iter()
                .find(|known| known.module == import.module && known.name == import.name)
                .map(|known| known.alias.clone());
            let alias = match existing {
                Some(alias) => alias,
                None => {
                    let candidate = if import.alias.starts_with('_') {
                        import.alias.clone()
                    } else {
                        format!("_{}", import.alias)
                    };
                    let alias = self.names.unique_with(&candidate, &arg_names);
                    self.imports.push(Import { alias: alias.clone(), ..import.clone() });
                    alias
                }
            };
            if alias != import.alias {
                replacements.insert(import.alias.clone(), alias);
            }
        }
        replace_rep(rep, &replacements, self.options.robust_replace)
    }

    /// Final names in dependency order, with every template rewritten to
    /// refer to its dependencies by those names.
    fn assign_names(&mut self) -> Result<(), ArchiveError> {
        let robust = self.options.robust_replace;
        for token in self.order.clone() {
            if !self.roots.contains(&token) {
                if let Some(node) = self.nodes.get_mut(&token) {
                    let candidate = if node.name.starts_with('_') {
                        node.name.clone()
                    } else {
                        format!("_{}", node.name)
                    };
                    node.name = self.names.unique(&candidate);
                }
            }

            let node = &self.nodes[&token];
            let mut args: Vec<(String, Obj)> = Vec::with_capacity(node.args.len());
            let mut replacements = Replacements::new();
            for ((name, obj), child) in node.args.iter().zip(&node.children) {
                let child_name = &self.nodes[child].name;
                if !args.iter().any(|(known, _)| known == child_name) {
                    args.push((child_name.clone(), obj.clone()));
                }
                if name != child_name {
                    replacements.insert(name.clone(), child_name.clone());
                }
            }
            let children = node.children.clone();
            let rep = replace_rep(&node.rep, &replacements, robust)?;

            for child in children {
                if let Some(cnode) = self.nodes.get_mut(&child) {
                    cnode.parents.push(token);
                }
            }
            if let Some(node) = self.nodes.get_mut(&token) {
                node.args = args;
                node.rep = rep;
            }
        }
        Ok(())
    }

    fn link_parents(&mut self) {
        for token in self.order.clone() {
            let Some(node) = self.nodes.get_mut(&token) else { continue };
            if !self.roots.contains(&token) {
                node.name = self.names.unique(&node.name);
            }
            let children = node.children.clone();
            for child in children {
                if let Some(cnode) = self.nodes.get_mut(&child) {
                    cnode.parents.push(token);
                }
            }
        }
    }

    /// Edges `(referrer, dependency)` in discovery order, one per distinct
    /// binding name.
    pub fn edges(&self) -> Vec<(Token, Token)> {
        self.discovered
            .iter()
            .filter_map(|token| self.nodes.get(token).map(|node| (*token, node)))
            .flat_map(|(token, node)| {
                node.args.iter().filter_map(move |(_, obj)| self.ids.get(obj).map(|c| (token, c)))
            })
            .collect()
    }

    /// Dependencies first; roots with no edges at all come last.
    fn topological_order(&self) -> Result<Vec<Token>, CycleError> {
        let mut order = topsort(&self.edges())?;
        order.reverse();
        for &root in &self.roots {
            if !order.contains(&root) {
                order.push(root);
            }
        }
        Ok(order)
    }

    /// Whether every child link has a matching parent link.
    pub fn check(&self) -> bool {
        self.nodes.iter().all(|(token, node)| {
            node.children
                .iter()
                .all(|child| self.nodes.get(child).is_some_and(|c| c.parents.contains(token)))
        })
    }

    /// Every path from a root to a leaf.
    pub fn paths(&self) -> Vec<Vec<Token>> {
        let mut paths = Vec::new();
        let mut stack: Vec<Vec<Token>> = self.roots.iter().rev().map(|root| vec![*root]).collect();
        while let Some(path) = stack.pop() {
            let Some(last) = path.last() else { continue };
            let children =
                self.nodes.get(last).map(|node| node.children.as_slice()).unwrap_or_default();
            if children.is_empty() {
                paths.push(path);
                continue;
            }
            for child in children.iter().rev() {
                let mut longer = path.clone();
                longer.push(*child);
                stack.push(longer);
            }
        }
        paths
    }

    /// Rendering mode the graph was built for.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Evaluation order, dependencies first.
    pub fn order(&self) -> &[Token] {
        &self.order
    }

    /// Node for `token`.
    pub fn node(&self, token: Token) -> Option<&Node> {
        self.nodes.get(&token)
    }

    /// Nodes in evaluation order.
    pub fn ordered_nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.order.iter().filter_map(|token| self.nodes.get(token))
    }

    /// Token of `obj` if it was seen while building.
    pub fn token_of(&self, obj: &Obj) -> Option<Token> {
        self.ids.get(obj)
    }

    /// Root tokens.
    pub fn roots(&self) -> &BTreeSet<Token> {
        &self.roots
    }

    /// Merged imports with their final aliases (flat mode).
    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveConfig;
    use crate::registry::Registry;
    use crate::rep::Dispatcher;
    use std::collections::BTreeMap;

    fn build(entries: &[Entry], mode: Mode) -> Graph {
        let config = ArchiveConfig::default();
        let registry = Registry::standard();
        let mut data = BTreeMap::new();
        let mut source = Dispatcher::new(&config, &registry, &mut data);
        Graph::build(entries, &mut source, mode, &GraphOptions::default()).unwrap()
    }

    fn s(v: &str) -> Obj {
        Obj::str(v)
    }

    #[test]
    fn test_identity_tokens() {
        let mut ids = IdentityMap::new();
        let a = Obj::list(vec![]);
        let b = Obj::list(vec![]);
        assert_eq!(ids.token(&a), 0);
        assert_eq!(ids.token(&b), 1);
        assert_eq!(ids.token(&a.clone()), 0);
        assert_eq!(ids.get(&Obj::none()), None);
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_diamond_nodes_and_names() {
        let g = s("G");
        let f = s("F");
        let d = Obj::list(vec![g.clone()]);
        let e = Obj::list(vec![g]);
        let c = Obj::list(vec![f.clone(), d, e]);
        let b = Obj::list(vec![f]);
        let a = Obj::list(vec![b, c]);
        let graph = build(&[Entry::new("A", a)], Mode::Flat);
        assert_eq!(graph.len(), 7);
        assert!(graph.check());
        let root = graph.node(0).unwrap();
        assert_eq!(root.rep, "[_g1, _g2]");
        assert_eq!(graph.node(3).unwrap().name, "_g3");
        assert_eq!(graph.node(3).unwrap().parents, vec![2, 1]);
    }

    #[test]
    fn test_shared_child_keeps_multiplicity() {
        let f = Obj::list(vec![s("F")]);
        let a = Obj::list(vec![f.clone(), f]);
        let graph = build(&[Entry::new("A", a)], Mode::Flat);
        assert_eq!(graph.len(), 3);
        let root = graph.node(0).unwrap();
        assert_eq!(root.rep, "[_g1, _g1]");
        assert_eq!(root.args.len(), 1);
        assert_eq!(root.children, vec![1, 1]);
        assert_eq!(graph.node(1).unwrap().parents, vec![0, 0]);
    }

    #[test]
    fn test_cycle_detected() {
        let x = Obj::list(vec![]);
        if let crate::object::Object::List(list) = x.kind() {
            list.push(x.clone());
        }
        let config = ArchiveConfig::default();
        let registry = Registry::standard();
        let mut data = BTreeMap::new();
        let mut source = Dispatcher::new(&config, &registry, &mut data);
        let entries = [Entry::new("x", x)];
        let err = Graph::build(&entries, &mut source, Mode::Flat, &GraphOptions::default())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Cycle(_)));
    }

    #[test]
    fn test_imports_are_merged() {
        let a = Obj::dict(vec![]);
        let b = Obj::dict(vec![]);
        let graph = build(&[Entry::new("a", a), Entry::new("b", b)], Mode::Flat);
        assert_eq!(graph.imports(), &[Import::member("builtins", "dict", "_dict")]);
        assert!(graph.ordered_nodes().all(|node| node.rep == "_dict([])"));
    }

    #[test]
    fn test_scoped_templates_untouched() {
        let shared = Obj::list(vec![Obj::int(1)]);
        let a = Obj::list(vec![shared.clone(), shared]);
        let graph = build(&[Entry::new("a", a)], Mode::Scoped);
        let root = graph.node(0).unwrap();
        assert_eq!(root.rep, "[_l_0, _l_1]");
        assert_eq!(graph.node(1).unwrap().name, "_g1");
        assert!(graph.imports().is_empty());
    }

    #[test]
    fn test_paths() {
        let leaf = s("x");
        let mid = Obj::list(vec![leaf.clone()]);
        let a = Obj::list(vec![mid, leaf]);
        let graph = build(&[Entry::new("a", a)], Mode::Flat);
        assert_eq!(graph.paths(), vec![vec![0, 1, 2], vec![0, 2]]);
    }
}

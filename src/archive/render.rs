//! Program text for an archive.
//!
//! Flat programs bind everything in one namespace. Archiving
//! `a = [s, s]` with `s = [1]`:
//!
//! ```text
//! _g1 = [1]
//! a = [_g1, _g1]
//! del _g1
//! try: del __builtins__, _arrays
//! except NameError: pass
//! ```
//!
//! Scoped programs wrap every node with dependencies or imports in a
//! function whose parameters default to the already bound dependencies:
//!
//! ```text
//! _g2 = 1
//!
//! def _g1(_l_0=_g2):
//!     return [_l_0]
//! _g1 = _g1()
//!
//! def a(_l_0=_g1,_l_1=_g1):
//!     return [_l_0, _l_1]
//! a = a()
//! del _g2, _g1
//! try: del __builtins__, _arrays
//! except NameError: pass
//! ```

use std::collections::HashSet;

use tracing::debug;

use crate::error::ArchiveError;
use crate::graph::{Graph, Mode, Node};

use super::Archive;

impl Archive {
    /// Render the archive as a program, flat or scoped according to the
    /// config. Arrays above the threshold are added to [`Archive::data`].
    pub fn render(&self) -> Result<String, ArchiveError> {
        let program = if self.config.scoped { self.render_scoped()? } else { self.render_flat()? };
        debug!(
            scoped = self.config.scoped,
            bytes = program.len(),
            data = self.data.borrow().len(),
            "rendered archive"
        );
        Ok(program)
    }

    fn cleanup_lines(&self) -> [String; 2] {
        [
            format!("try: del __builtins__, {}", self.config.data_name),
            "except NameError: pass".to_string(),
        ]
    }

    fn render_flat(&self) -> Result<String, ArchiveError> {
        let persistent = self.make_persistent()?;
        let imports: Vec<String> =
            persistent.imports.iter().map(|import| import.statement()).collect();
        let mut dels: Vec<String> =
            persistent.imports.iter().map(|import| format!("del {}", import.alias)).collect();

        let temp: Vec<&str> = persistent
            .defs
            .iter()
            .map(|(name, _)| name.as_str())
            .filter(|name| name.starts_with('_') && !self.config.is_allowed(name))
            .collect();
        if !temp.is_empty() {
            dels.push(format!("del {}", temp.join(",")));
        }
        dels.extend(self.cleanup_lines());

        let defs: Vec<String> =
            persistent.defs.iter().map(|(name, rep)| format!("{name} = {rep}")).collect();
        let sections = [imports.join("\n"), defs.join("\n"), dels.join("\n")];
        Ok(sections
            .into_iter()
            .filter(|section| !section.is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn render_scoped(&self) -> Result<String, ArchiveError> {
        let graph = self.build_graph(Mode::Scoped)?;
        let mut lines = Vec::with_capacity(graph.len() + 4);
        let mut defined: Vec<&str> = Vec::with_capacity(graph.len());
        for node in graph.ordered_nodes() {
            lines.push(scoped_definition(&graph, node)?);
            defined.push(&node.name);
        }

        let bound: HashSet<&str> = defined.iter().copied().collect();
        for (name, target) in self.aliases(&graph, |name| bound.contains(name)) {
            lines.push(format!("{name} = {target}"));
        }

        let generated: Vec<&str> = defined
            .into_iter()
            .filter(|name| {
                name.starts_with(&self.config.gname_prefix) && !self.config.is_allowed(name)
            })
            .collect();
        if !generated.is_empty() {
            lines.push(format!("del {}", generated.join(", ")));
        }
        lines.extend(self.cleanup_lines());
        Ok(lines.join("\n"))
    }
}

/// `name = rep`, or a function evaluating `rep` in its own scope.
fn scoped_definition(graph: &Graph, node: &Node) -> Result<String, ArchiveError> {
    let name = &node.name;
    if node.args.is_empty() && node.imports.is_empty() {
        return Ok(format!("{name} = {}", node.rep));
    }
    let mut params = Vec::with_capacity(node.args.len());
    for (arg, obj) in &node.args {
        let child = graph
            .token_of(obj)
            .and_then(|token| graph.node(token))
            .ok_or_else(|| ArchiveError::UnresolvedName {
                name: arg.clone(),
                rep: node.rep.clone(),
            })?;
        params.push(format!("{arg}={}", child.name));
    }
    let imports: String =
        node.imports.iter().map(|import| format!("\n    {}", import.statement())).collect();
    Ok(format!(
        "\ndef {name}({}):{imports}\n    return {}\n{name} = {name}()",
        params.join(","),
        node.rep
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveConfig;
    use crate::object::Obj;
    use pretty_assertions::assert_eq;

    fn dict_of_shared() -> Obj {
        let shared = Obj::list(vec![Obj::int(1), Obj::int(2)]);
        Obj::dict(vec![(Obj::str("a"), shared.clone()), (Obj::str("b"), shared)])
    }

    #[test]
    fn test_flat_program() {
        let mut archive = Archive::new(ArchiveConfig::default().with_scoped(false));
        archive.insert("x", dict_of_shared()).unwrap();
        let expected = "\
from builtins import dict as _dict
_g4 = [1, 2]
x = _dict([('a', _g4), ('b', _g4)])
del _dict
del _g4
try: del __builtins__, _arrays
except NameError: pass";
        assert_eq!(archive.render().unwrap(), expected);
    }

    #[test]
    fn test_scoped_program() {
        let mut archive = Archive::default();
        archive.insert("x", dict_of_shared()).unwrap();
        let program = archive.render().unwrap();
        assert!(program.contains("\ndef x("));
        assert!(program.contains("\n    from builtins import dict\n"));
        assert!(program.contains("\nx = x()\n"));
        assert!(program.ends_with("try: del __builtins__, _arrays\nexcept NameError: pass"));
    }

    #[test]
    fn test_scoped_shared_list() {
        let shared = Obj::list(vec![Obj::int(1)]);
        let mut archive = Archive::default();
        archive.insert("a", Obj::list(vec![shared.clone(), shared])).unwrap();
        let expected = "\
_g2 = 1

def _g1(_l_0=_g2):
    return [_l_0]
_g1 = _g1()

def a(_l_0=_g1,_l_1=_g1):
    return [_l_0, _l_1]
a = a()
del _g2, _g1
try: del __builtins__, _arrays
except NameError: pass";
        assert_eq!(archive.render().unwrap(), expected);
    }

    #[test]
    fn test_scoped_leaf_is_plain_assignment() {
        let mut archive = Archive::default();
        archive.insert("n", Obj::int(3)).unwrap();
        assert_eq!(
            archive.render().unwrap(),
            "n = 3\ntry: del __builtins__, _arrays\nexcept NameError: pass"
        );
    }

    #[test]
    fn test_scoped_alias() {
        let mut archive = Archive::default();
        let value = Obj::str("v");
        archive.insert("a", value.clone()).unwrap();
        archive.insert("b", value).unwrap();
        let program = archive.render().unwrap();
        assert!(program.starts_with("b = 'v'\na = b\n"));
    }

    #[test]
    fn test_empty_archive() {
        let archive = Archive::new(ArchiveConfig::default().with_scoped(false));
        assert_eq!(
            archive.render().unwrap(),
            "try: del __builtins__, _arrays\nexcept NameError: pass"
        );
    }
}

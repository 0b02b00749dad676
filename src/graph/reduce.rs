//! Inlining of single-use and simple nodes.

use tracing::debug;

use crate::error::ArchiveError;
use crate::rep::is_simple;
use crate::replace::{replace_rep, Replacements};

use super::{Graph, Mode, Token};

impl Graph {
    /// Whether a node may be inlined into its referrers: it is not a root,
    /// and either its value is simple or it is referenced exactly once.
    pub fn is_reducible(&self, token: Token) -> bool {
        match self.nodes.get(&token) {
            Some(node) => {
                !self.roots.contains(&token) && (is_simple(&node.obj) || node.parents.len() == 1)
            }
            None => false,
        }
    }

    /// Inline every reducible node into its referrers, leaves first, and
    /// recompute the evaluation order. Returns the number of nodes removed.
    ///
    /// A node referenced twice from one parent counts two parents and is
    /// kept, so both references keep naming the same object. Reducing an
    /// already reduced graph removes nothing.
    pub fn reduce(&mut self) -> Result<usize, ArchiveError> {
        if self.mode != Mode::Flat {
            return Err(ArchiveError::Unsupported("reduction of a scoped graph".to_string()));
        }
        debug_assert!(self.check());
        let reducible: Vec<Token> =
            self.order.iter().copied().filter(|token| self.is_reducible(*token)).collect();
        for &token in &reducible {
            self.reduce_node(token)?;
        }
        self.order = self.topological_order()?;
        debug!(removed = reducible.len(), remaining = self.nodes.len(), "reduced graph");
        Ok(reducible.len())
    }

    fn reduce_node(&mut self, token: Token) -> Result<(), ArchiveError> {
        let Some(node) = self.nodes.remove(&token) else {
            return Ok(());
        };
        self.discovered.retain(|t| *t != token);
        let robust = self.options.robust_replace;
        let replacements = Replacements::from([(node.name.clone(), node.rep.clone())]);

        for parent in &node.parents {
            let Some(pnode) = self.nodes.get_mut(parent) else { continue };
            pnode.rep = replace_rep(&pnode.rep, &replacements, robust)?;
            if let Some(i) = pnode.children.iter().position(|c| *c == token) {
                pnode.children.remove(i);
            }
            pnode.children.extend_from_slice(&node.children);
            pnode.args.retain(|(name, _)| *name != node.name);
            for (name, obj) in &node.args {
                if !pnode.args.iter().any(|(known, _)| known == name) {
                    pnode.args.push((name.clone(), obj.clone()));
                }
            }
        }

        for child in &node.children {
            let Some(cnode) = self.nodes.get_mut(child) else { continue };
            if let Some(i) = cnode.parents.iter().position(|p| *p == token) {
                cnode.parents.remove(i);
            }
            cnode.parents.extend_from_slice(&node.parents);
        }
        Ok(())
    }
}

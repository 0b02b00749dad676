//! Identifier substitution inside representation templates.
//!
//! Two engines implement [`Substitution`]:
//!
//! - [`ParseTree`] parses the template and rewrites exactly the spans of
//!   free name references. String contents, attribute names and keyword
//!   argument names are never touched.
//! - [`TokenBoundary`] scans text for the old identifier delimited by
//!   non-identifier characters, skipping occurrences followed by `=`
//!   (keyword arguments). It is faster but will also rewrite matching text
//!   inside string literals; its `check` mode compares the replacement
//!   count with the parse tree and fails on disagreement.
//!
//! Both engines collect every match against the *unmodified* template and
//! splice once, so a replacement value that happens to contain another
//! old name is never rewritten again.

use std::collections::BTreeMap;

use crate::error::{ArchiveError, ReplacementError};
use crate::expr::parse_expr;

/// Map from old identifier to replacement text.
pub type Replacements = BTreeMap<String, String>;

/// Rewrites identifiers in a template.
pub trait Substitution {
    /// Return `rep` with every free occurrence of each key replaced.
    fn substitute(&self, rep: &str, replacements: &Replacements) -> Result<String, ArchiveError>;
}

/// Exact substitution driven by the expression parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseTree;

/// Text substitution at identifier boundaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenBoundary {
    /// Verify the number of replacements against the parse tree.
    pub check: bool,
}

impl Substitution for ParseTree {
    fn substitute(&self, rep: &str, replacements: &Replacements) -> Result<String, ArchiveError> {
        if replacements.is_empty() {
            return Ok(rep.to_string());
        }
        let expr = parse_expr(rep)?;
        let mut out = String::with_capacity(rep.len());
        let mut pos = 0;
        for name in expr.names() {
            if let Some(new) = replacements.get(&name.id) {
                out.push_str(&rep[pos..name.span.start]);
                out.push_str(new);
                pos = name.span.end;
            }
        }
        out.push_str(&rep[pos..]);
        Ok(out)
    }
}

fn is_identifier_byte(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric()
}

impl Substitution for TokenBoundary {
    fn substitute(&self, rep: &str, replacements: &Replacements) -> Result<String, ArchiveError> {
        if replacements.is_empty() {
            return Ok(rep.to_string());
        }
        let counts = if self.check {
            let expr = parse_expr(rep)?;
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for name in expr.names() {
                *counts.entry(name.id.clone()).or_default() += 1;
            }
            Some(counts)
        } else {
            None
        };

        let bytes = rep.as_bytes();
        let mut spots: Vec<(usize, usize, &str)> = Vec::new();
        for (old, new) in replacements {
            if old.is_empty() {
                continue;
            }
            let mut found = 0;
            for (start, _) in rep.match_indices(old.as_str()) {
                let end = start + old.len();
                let before = start == 0 || !is_identifier_byte(bytes[start - 1]);
                let after = end == bytes.len() || !is_identifier_byte(bytes[end]);
                if !(before && after) {
                    continue;
                }
                if rep[end..].trim_start().starts_with('=') {
                    continue;
                }
                spots.push((start, end, new.as_str()));
                found += 1;
            }
            if let Some(counts) = &counts {
                let expected = counts.get(old).copied().unwrap_or(0);
                if expected != found {
                    return Err(ReplacementError {
                        old: old.clone(),
                        new: new.clone(),
                        expected,
                        actual: found,
                    }
                    .into());
                }
            }
        }

        spots.sort_by_key(|spot| spot.0);
        let mut out = String::with_capacity(rep.len());
        let mut pos = 0;
        for (start, end, new) in spots {
            out.push_str(&rep[pos..start]);
            out.push_str(new);
            pos = end;
        }
        out.push_str(&rep[pos..]);
        Ok(out)
    }
}

/// Substitute with the exact engine when `robust`, else the heuristic one.
pub fn replace_rep(
    rep: &str,
    replacements: &Replacements,
    robust: bool,
) -> Result<String, ArchiveError> {
    if robust {
        ParseTree.substitute(rep, replacements)
    } else {
        TokenBoundary::default().substitute(rep, replacements)
    }
}

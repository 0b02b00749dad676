//! Unique name generation.
//!
//! [`UniqueNames`] hands out identifiers that collide neither with each other
//! nor with a reserved set. A name `base_N` is split into its base and
//! numeric suffix, and each base remembers the next free suffix, so
//! generating many names from one base stays linear.
//!
//! ```
//! use persist::UniqueNames;
//!
//! let mut names = UniqueNames::new(["a", "b_3"]);
//! assert_eq!(names.unique("a"), "a_0");
//! assert_eq!(names.unique("a"), "a_1");
//! assert_eq!(names.unique("a_4"), "a_4");
//! assert_eq!(names.unique("a_2"), "a_5");
//! assert_eq!(names.unique("b"), "b_4");
//! ```

use std::collections::{HashMap, HashSet};

use regex_lite::Regex;

/// Reserved words that can never be bound as names.
pub const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// Whether `name` is a reserved word.
pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// Whether `name` is an ASCII identifier that is not a reserved word.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric()) && !is_keyword(name)
}

/// Generator of names unique within a growing set.
#[derive(Debug, Clone)]
pub struct UniqueNames {
    sep: String,
    suffix: Regex,
    names: HashSet<String>,
    bases: HashMap<String, u64>,
}

impl UniqueNames {
    /// Reserve `names`, using `_` as the suffix separator.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_separator(names, "_")
    }

    /// Reserve `names` with a custom suffix separator.
    pub fn with_separator<I, S>(names: I, sep: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pattern = format!(r"^(.*){}(\d+)$", regex_lite::escape(sep));
        // The pattern is built from an escaped literal, so it always compiles.
        let suffix =
            Regex::new(&pattern).unwrap_or_else(|_| unreachable!("invalid suffix pattern"));
        let mut this = Self {
            sep: sep.to_string(),
            suffix,
            names: HashSet::new(),
            bases: HashMap::new(),
        };
        for name in names {
            let name = name.into();
            this.reserve(&name);
            this.names.insert(name);
        }
        this
    }

    /// Whether `name` has been reserved or handed out.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of reserved names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no names are reserved.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn split(&self, name: &str) -> (String, Option<u64>) {
        if let Some(caps) = self.suffix.captures(name) {
            let base = caps.get(1).map_or("", |m| m.as_str());
            if let Some(Ok(c)) = caps.get(2).map(|m| m.as_str().parse::<u64>()) {
                return (base.to_string(), Some(c));
            }
        }
        (name.to_string(), None)
    }

    fn join(&self, base: &str, c: u64) -> String {
        format!("{base}{}{c}", self.sep)
    }

    /// Advance the suffix counter past `name` without marking it taken.
    fn reserve(&mut self, name: &str) {
        let (base, c) = self.split(name);
        let next = c.map_or(0, |c| c + 1);
        let entry = self.bases.entry(base).or_insert(0);
        *entry = (*entry).max(next);
    }

    /// Next unused name derived from `name`.
    ///
    /// An unclaimed name comes back as-is; otherwise the suffix counter of
    /// its base is used.
    pub fn unique(&mut self, name: &str) -> String {
        self.unique_names(name).next().unwrap_or_default()
    }

    /// Like [`unique`](Self::unique), first reserving `others`.
    ///
    /// The suffix counters move past `others`, but they are not recorded as
    /// taken names.
    pub fn unique_with<S: AsRef<str>>(&mut self, name: &str, others: &[S]) -> String {
        for other in others {
            self.reserve(other.as_ref());
        }
        self.unique(name)
    }

    /// Endless sequence of fresh names derived from `name`.
    pub fn unique_names(&mut self, name: &str) -> UniqueNameIter<'_> {
        let (base, c) = match self.split(name) {
            (base, Some(c)) => (base, c as i64),
            (base, None) if name.is_empty() => (base, 0),
            (base, None) => (base, -1),
        };
        let first = match self.bases.get(&base) {
            None if !name.is_empty() => (c, name.to_string()),
            known => {
                let c = c.max(known.map_or(-1, |k| *k as i64));
                (c, self.join(&base, c.max(0) as u64))
            }
        };
        UniqueNameIter { owner: self, base, first: Some(first) }
    }
}

/// Iterator returned by [`UniqueNames::unique_names`].
#[derive(Debug)]
pub struct UniqueNameIter<'a> {
    owner: &'a mut UniqueNames,
    base: String,
    first: Option<(i64, String)>,
}

impl Iterator for UniqueNameIter<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let (mut c, mut name) = match self.first.take() {
            Some(first) => first,
            None => {
                let c = self.owner.bases.get(&self.base).copied().unwrap_or(0);
                (c as i64, self.owner.join(&self.base, c))
            }
        };
        while self.owner.names.contains(&name) {
            c += 1;
            name = self.owner.join(&self.base, c.max(0) as u64);
        }
        self.owner.bases.insert(self.base.clone(), (c + 1).max(0) as u64);
        self.owner.names.insert(name.clone());
        Some(name)
    }
}

//! # persist
//!
//! Archive graphs of in-memory objects as deterministic, re-executable
//! programs.
//!
//! An [`Archive`] takes named objects and renders a program that rebuilds
//! them. Executing it with [`restore()`] yields equal values, and objects that
//! were shared before archiving are shared again afterwards.
//!
//! ## Pipeline
//!
//! ```text
//! Archive::insert → Graph::build (Dispatcher per object) → topsort
//!                        ↓
//!      flat: names + reduce + substitution │ scoped: one function per node
//!                        ↓
//!                  program text (+ side data)
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same inserts in the same order → identical program text
//! - Identity tokens are sequential per build, never raw addresses
//! - Reference cycles are rejected with [`CycleError`], never truncated

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod archive;
pub mod arrays;
pub mod canonical;
pub mod error;
pub mod expr;
pub mod graph;
pub mod names;
pub mod object;
pub mod registry;
pub mod replace;
pub mod rep;
pub mod restore;

// Re-exports
pub use archive::{
    backup, get_imports, get_toplevel_imports, Archive, ArchiveConfig, Persistent, SaveOptions,
    SaveReport,
};
pub use arrays::{ArrayFormat, ArrayManager};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use error::{
    ArchiveError, ArrayError, CapabilityError, CycleError, ParseError, ReplacementError,
    RestoreError,
};
pub use graph::{Entry, Graph, GraphOptions, IdentityMap, Mode, Node, RepSource, Token};
pub use names::{is_identifier, UniqueNames};
pub use object::{
    repr_of, Archivable, CallArgs, DType, Env, Function, NdArray, Obj, Object, SparseFormat,
    SparseMatrix, TypeObject, TypePath,
};
pub use registry::{ClassDef, Module, Registry};
pub use replace::{replace_rep, ParseTree, Replacements, Substitution, TokenBoundary};
pub use rep::{Dispatcher, Import, PersistentRep};
pub use restore::{literal_eval, load_module, restore, restore_with};

//! Error types shared across the archival engine.
//!
//! Archiving errors are fatal to the current render call: the generated
//! program is only meaningful as a whole, so no partial output is returned.

use std::path::PathBuf;

use crate::graph::Token;

/// The reference graph among archived objects contains a cycle.
///
/// Carries the edges `(referrer, referenced)` that could not be ordered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Archive contains cyclic dependencies.")]
pub struct CycleError {
    /// Edges between nodes that remain after topological ordering stalled.
    pub edges: Vec<(Token, Token)>,
}

/// Heuristic substitution disagreed with the parse tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Replacement {old}->{new}: Expected {expected}, replaced {actual}")]
pub struct ReplacementError {
    /// Identifier being replaced.
    pub old: String,
    /// Replacement text.
    pub new: String,
    /// Number of free references found in the parse tree.
    pub expected: usize,
    /// Number of occurrences actually replaced.
    pub actual: usize,
}

/// Syntax error in an expression or program.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (at byte {offset})")]
pub struct ParseError {
    /// Human-readable description.
    pub message: String,
    /// Byte offset into the source text.
    pub offset: usize,
}

impl ParseError {
    /// Create a parse error at `offset`.
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self { message: message.into(), offset }
    }
}

/// A capability method could not produce a representation for this call.
///
/// This is not fatal: dispatch logs a warning and falls through to the next
/// strategy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CapabilityError(pub String);

/// Array construction or reshaping failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArrayError {
    /// Target shape does not hold the same number of elements.
    #[error("cannot reshape array of size {size} into shape {shape:?}")]
    Reshape {
        /// Element count of the source array.
        size: usize,
        /// Requested shape.
        shape: Vec<usize>,
    },
    /// Raw buffer is not a whole number of elements.
    #[error("buffer size {len} must be a multiple of element size {itemsize}")]
    BufferSize {
        /// Buffer length in bytes.
        len: usize,
        /// Bytes per element.
        itemsize: usize,
    },
    /// Unknown or unsupported dtype descriptor.
    #[error("data type {0:?} not understood")]
    DType(String),
    /// Nested sequence is not rectangular or holds non-numeric values.
    #[error("{0}")]
    Elements(String),
}

/// Errors raised while executing an archived program.
///
/// Variants mirror the exception classes a program can name in an
/// `except` clause; see [`RestoreError::exception_name`].
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    /// The program text is not valid.
    #[error("SyntaxError: {0}")]
    Syntax(#[from] ParseError),
    /// A name was read or deleted before being bound.
    #[error("NameError: name '{0}' is not defined")]
    Name(String),
    /// Attribute lookup failed.
    #[error("AttributeError: '{owner}' object has no attribute '{attr}'")]
    Attribute {
        /// Type of the object the attribute was looked up on.
        owner: String,
        /// Attribute name.
        attr: String,
    },
    /// Operation applied to an object of the wrong kind.
    #[error("TypeError: {0}")]
    Type(String),
    /// Module or module member is not registered.
    #[error("ImportError: {0}")]
    Import(String),
    /// Mapping lookup failed.
    #[error("KeyError: {0}")]
    Key(String),
    /// Sequence index out of range.
    #[error("IndexError: {0}")]
    Index(String),
    /// Argument has the right kind but an invalid value.
    #[error("ValueError: {0}")]
    Value(String),
    /// `return` executed at module level.
    #[error("SyntaxError: 'return' outside function")]
    ReturnOutsideFunction,
    /// Reading side-data files failed.
    #[error("OSError: {0}")]
    Io(#[from] std::io::Error),
}

impl RestoreError {
    /// Exception class name used to match `except <Name>:` handlers.
    pub fn exception_name(&self) -> &'static str {
        match self {
            Self::Syntax(_) | Self::ReturnOutsideFunction => "SyntaxError",
            Self::Name(_) => "NameError",
            Self::Attribute { .. } => "AttributeError",
            Self::Type(_) => "TypeError",
            Self::Import(_) => "ImportError",
            Self::Key(_) => "KeyError",
            Self::Index(_) => "IndexError",
            Self::Value(_) => "ValueError",
            Self::Io(_) => "OSError",
        }
    }

    /// Whether an `except <handler>:` clause catches this error.
    pub fn is_caught_by(&self, handler: &str) -> bool {
        match handler {
            "Exception" | "BaseException" => true,
            "LookupError" => matches!(self, Self::Key(_) | Self::Index(_)),
            "ArithmeticError" | "ZeroDivisionError" => {
                matches!(self, Self::Value(msg) if msg.contains("division by zero"))
            }
            other => self.exception_name() == other,
        }
    }
}

impl From<ArrayError> for RestoreError {
    fn from(err: ArrayError) -> Self {
        Self::Value(err.to_string())
    }
}

/// Errors raised by archiving, rendering and saving.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Reference graph is not acyclic.
    #[error(transparent)]
    Cycle(#[from] CycleError),
    /// Name already bound to a different object.
    #[error("Object with name '{0}' already exists in archive.")]
    Duplicate(String),
    /// Name starts with `_` and is not whitelisted.
    #[error("name must not start with '_': '{0}'")]
    PrivateName(String),
    /// Name is not a usable identifier.
    #[error("'{0}' is not a valid identifier")]
    InvalidName(String),
    /// Insertion violates `single_item_mode`.
    #[error("{0}")]
    SingleItem(String),
    /// Object belongs to a recognized family but this subtype is not handled.
    #[error("archiving {0} is not implemented")]
    Unsupported(String),
    /// Every strategy, pickling included, failed.
    #[error("Could not archive object {repr}.  Even tried pickling!")]
    Unarchivable {
        /// Text representation of the failing object.
        repr: String,
    },
    /// Top-level object is not reachable under its name in its module.
    #[error("name {name} is not in module {module}")]
    NotInModule {
        /// Module searched.
        module: String,
        /// Name looked up.
        name: String,
    },
    /// A free name in a repr could not be resolved.
    #[error("name '{name}' in representation {rep:?} could not be resolved")]
    UnresolvedName {
        /// Unresolved identifier.
        name: String,
        /// Representation it appeared in.
        rep: String,
    },
    /// Invalid argument to a save or array operation.
    #[error("{0}")]
    InvalidArgument(String),
    /// Target file exists and `force` is off.
    #[error("File {} exists and force=False.", .0.display())]
    FileExists(PathBuf),
    /// Path exists but is not a directory.
    #[error("{} exists and is not a directory.", .0.display())]
    NotADirectory(PathBuf),
    /// `save` needs a name unless the archive holds a single item.
    #[error("Must provide name unless single_item_mode=True")]
    MissingName,
    /// Representation template could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Heuristic substitution check failed.
    #[error(transparent)]
    Replacement(#[from] ReplacementError),
    /// Array data is malformed.
    #[error(transparent)]
    Array(#[from] ArrayError),
    /// Executing generated code (side-data loaders) failed.
    #[error(transparent)]
    Restore(#[from] RestoreError),
    /// Pickle envelope could not be encoded.
    #[error("pickling failed: {0}")]
    Pickle(#[from] bincode::Error),
    /// Multi-array file could not be written.
    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// Configuration or fingerprint serialization failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

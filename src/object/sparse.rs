//! Sparse matrices, stored as the component arrays of their format.

use super::Obj;

/// Storage format of a sparse matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SparseFormat {
    /// Compressed sparse row: `(data, indices, indptr)`.
    Csr,
    /// Compressed sparse column: `(data, indices, indptr)`.
    Csc,
    /// Block sparse row: `(data, indices, indptr)`.
    Bsr,
    /// Diagonal: `(data, offsets)`.
    Dia,
    /// Coordinate.
    Coo,
    /// List of lists.
    Lil,
    /// Dictionary of keys.
    Dok,
}

impl SparseFormat {
    /// Every format, in declaration order.
    pub const ALL: [SparseFormat; 7] = [
        Self::Csr,
        Self::Csc,
        Self::Bsr,
        Self::Dia,
        Self::Coo,
        Self::Lil,
        Self::Dok,
    ];

    /// Class name exported by `scipy.sparse`.
    pub fn class_name(self) -> &'static str {
        match self {
            Self::Csr => "csr_matrix",
            Self::Csc => "csc_matrix",
            Self::Bsr => "bsr_matrix",
            Self::Dia => "dia_matrix",
            Self::Coo => "coo_matrix",
            Self::Lil => "lil_matrix",
            Self::Dok => "dok_matrix",
        }
    }

    /// Number of component arrays the archiver and constructor understand,
    /// `None` for formats without support.
    pub fn component_count(self) -> Option<usize> {
        match self {
            Self::Csr | Self::Csc | Self::Bsr => Some(3),
            Self::Dia => Some(2),
            Self::Coo | Self::Lil | Self::Dok => None,
        }
    }
}

/// A sparse matrix of a given format and shape.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    /// Storage format.
    pub format: SparseFormat,
    /// `(rows, cols)`.
    pub shape: (usize, usize),
    /// Component arrays in format order.
    pub parts: Vec<Obj>,
}

impl SparseMatrix {
    /// Matrix from raw components.
    pub fn new(format: SparseFormat, shape: (usize, usize), parts: Vec<Obj>) -> Self {
        Self { format, shape, parts }
    }

    /// CSR matrix from `(data, indices, indptr)`.
    pub fn csr(data: Obj, indices: Obj, indptr: Obj, shape: (usize, usize)) -> Self {
        Self::new(SparseFormat::Csr, shape, vec![data, indices, indptr])
    }

    /// DIA matrix from `(data, offsets)`.
    pub fn dia(data: Obj, offsets: Obj, shape: (usize, usize)) -> Self {
        Self::new(SparseFormat::Dia, shape, vec![data, offsets])
    }
}

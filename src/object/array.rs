//! Dense n-dimensional arrays of a single numeric dtype.

use serde::{Deserialize, Serialize};

use crate::error::ArrayError;

/// Element type of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DType {
    /// One byte per element, 0 or 1.
    Bool,
    /// Little-endian 64-bit signed integer.
    Int64,
    /// Little-endian IEEE double.
    Float64,
    /// Pair of little-endian doubles.
    Complex128,
}

impl DType {
    /// Array-protocol type string, as written in `.npy` headers.
    pub fn descr(self) -> &'static str {
        match self {
            Self::Bool => "|b1",
            Self::Int64 => "<i8",
            Self::Float64 => "<f8",
            Self::Complex128 => "<c16",
        }
    }

    /// Parse a type string or a common alias.
    pub fn from_descr(descr: &str) -> Result<Self, ArrayError> {
        match descr {
            "|b1" | "?" | "bool" => Ok(Self::Bool),
            "<i8" | "i8" | "int64" | "int" => Ok(Self::Int64),
            "<f8" | "f8" | "float64" | "float" | "d" => Ok(Self::Float64),
            "<c16" | "c16" | "complex128" | "complex" => Ok(Self::Complex128),
            other => Err(ArrayError::DType(other.to_string())),
        }
    }

    /// Bytes per element.
    pub fn itemsize(self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Int64 | Self::Float64 => 8,
            Self::Complex128 => 16,
        }
    }
}

/// A single array element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Element {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// Complex `(re, im)`.
    Complex(f64, f64),
}

impl Element {
    fn dtype(self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::Int(_) => DType::Int64,
            Self::Float(_) => DType::Float64,
            Self::Complex(..) => DType::Complex128,
        }
    }

    fn as_complex(self) -> (f64, f64) {
        match self {
            Self::Bool(b) => (f64::from(u8::from(b)), 0.0),
            Self::Int(i) => (i as f64, 0.0),
            Self::Float(f) => (f, 0.0),
            Self::Complex(re, im) => (re, im),
        }
    }
}

/// Flat element storage.
#[derive(Debug, Clone)]
pub enum ArrayData {
    /// `|b1` elements.
    Bool(Vec<bool>),
    /// `<i8` elements.
    Int(Vec<i64>),
    /// `<f8` elements.
    Float(Vec<f64>),
    /// `<c16` elements.
    Complex(Vec<(f64, f64)>),
}

impl ArrayData {
    fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Complex(v) => v.len(),
        }
    }
}

// NaN compares equal to NaN so restored arrays match their originals.
fn same_float(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

impl PartialEq for ArrayData {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_float(*x, *y))
            }
            (Self::Complex(a), Self::Complex(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| same_float(x.0, y.0) && same_float(x.1, y.1))
            }
            _ => false,
        }
    }
}

/// Row-major n-dimensional array.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NdArray {
    /// Array with an explicit shape; the shape must hold exactly the data.
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self, ArrayError> {
        let size: usize = shape.iter().product();
        if size != data.len() {
            return Err(ArrayError::Reshape { size: data.len(), shape });
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional float array.
    pub fn from_f64(values: Vec<f64>) -> Self {
        Self { shape: vec![values.len()], data: ArrayData::Float(values) }
    }

    /// One-dimensional integer array.
    pub fn from_i64(values: Vec<i64>) -> Self {
        Self { shape: vec![values.len()], data: ArrayData::Int(values) }
    }

    /// One-dimensional boolean array.
    pub fn from_bool(values: Vec<bool>) -> Self {
        Self { shape: vec![values.len()], data: ArrayData::Bool(values) }
    }

    /// One-dimensional complex array.
    pub fn from_complex(values: Vec<(f64, f64)>) -> Self {
        Self { shape: vec![values.len()], data: ArrayData::Complex(values) }
    }

    /// Build from elements, promoting to the widest kind present unless
    /// `dtype` forces one.
    pub fn from_elements(
        shape: Vec<usize>,
        elements: &[Element],
        dtype: Option<DType>,
    ) -> Result<Self, ArrayError> {
        let dtype = dtype.unwrap_or_else(|| {
            elements.iter().map(|e| e.dtype()).max().unwrap_or(DType::Float64)
        });
        let data = match dtype {
            DType::Bool => ArrayData::Bool(
                elements
                    .iter()
                    .map(|e| {
                        let (re, im) = e.as_complex();
                        re != 0.0 || im != 0.0
                    })
                    .collect(),
            ),
            DType::Int64 => ArrayData::Int(
                elements
                    .iter()
                    .map(|e| match *e {
                        Element::Bool(b) => Ok(i64::from(b)),
                        Element::Int(i) => Ok(i),
                        Element::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
                        other => {
                            Err(ArrayError::Elements(format!("cannot convert {other:?} to int64")))
                        }
                    })
                    .collect::<Result<_, _>>()?,
            ),
            DType::Float64 => ArrayData::Float(
                elements
                    .iter()
                    .map(|e| match *e {
                        Element::Complex(..) => {
                            Err(ArrayError::Elements(format!("cannot convert {e:?} to float64")))
                        }
                        other => Ok(other.as_complex().0),
                    })
                    .collect::<Result<_, _>>()?,
            ),
            DType::Complex128 => {
                ArrayData::Complex(elements.iter().map(|e| e.as_complex()).collect())
            }
        };
        Self::new(shape, data)
    }

    /// Shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Element type.
    pub fn dtype(&self) -> DType {
        match self.data {
            ArrayData::Bool(_) => DType::Bool,
            ArrayData::Int(_) => DType::Int64,
            ArrayData::Float(_) => DType::Float64,
            ArrayData::Complex(_) => DType::Complex128,
        }
    }

    /// Flat storage.
    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    /// Element at flat index.
    pub fn element(&self, index: usize) -> Option<Element> {
        match &self.data {
            ArrayData::Bool(v) => v.get(index).map(|b| Element::Bool(*b)),
            ArrayData::Int(v) => v.get(index).map(|i| Element::Int(*i)),
            ArrayData::Float(v) => v.get(index).map(|f| Element::Float(*f)),
            ArrayData::Complex(v) => v.get(index).map(|(re, im)| Element::Complex(*re, *im)),
        }
    }

    /// Same data under a new shape.
    pub fn reshape(&self, shape: Vec<usize>) -> Result<Self, ArrayError> {
        Self::new(shape, self.data.clone())
    }

    /// Raw little-endian element bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size() * self.dtype().itemsize());
        match &self.data {
            ArrayData::Bool(v) => out.extend(v.iter().map(|b| u8::from(*b))),
            ArrayData::Int(v) => v.iter().for_each(|i| out.extend_from_slice(&i.to_le_bytes())),
            ArrayData::Float(v) => v.iter().for_each(|f| out.extend_from_slice(&f.to_le_bytes())),
            ArrayData::Complex(v) => v.iter().for_each(|(re, im)| {
                out.extend_from_slice(&re.to_le_bytes());
                out.extend_from_slice(&im.to_le_bytes());
            }),
        }
        out
    }

    /// One-dimensional array over raw little-endian bytes.
    pub fn from_bytes(dtype: DType, bytes: &[u8]) -> Result<Self, ArrayError> {
        let itemsize = dtype.itemsize();
        if bytes.len() % itemsize != 0 {
            return Err(ArrayError::BufferSize { len: bytes.len(), itemsize });
        }
        let word = |chunk: &[u8]| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&chunk[..8]);
            buf
        };
        let array = match dtype {
            DType::Bool => Self::from_bool(bytes.iter().map(|b| *b != 0).collect()),
            DType::Int64 => {
                Self::from_i64(bytes.chunks_exact(8).map(|c| i64::from_le_bytes(word(c))).collect())
            }
            DType::Float64 => {
                Self::from_f64(bytes.chunks_exact(8).map(|c| f64::from_le_bytes(word(c))).collect())
            }
            DType::Complex128 => Self::from_complex(
                bytes
                    .chunks_exact(16)
                    .map(|c| (f64::from_le_bytes(word(&c[..8])), f64::from_le_bytes(word(&c[8..]))))
                    .collect(),
            ),
        };
        Ok(array)
    }
}

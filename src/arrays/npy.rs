//! The `.npy` array file format, versions 1.0 to 3.0 for reading and 1.0
//! for writing.

use std::io::{Read, Write};

use crate::error::{ArrayError, RestoreError};
use crate::object::{DType, NdArray, Object};
use crate::rep::shape_repr;
use crate::restore::literal_eval;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const ALIGN: usize = 64;

/// Header text: a dict literal padded with spaces to the alignment boundary
/// and terminated by a newline.
fn header(array: &NdArray) -> Vec<u8> {
    let dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        array.dtype().descr(),
        shape_repr(array.shape())
    );
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (ALIGN - unpadded % ALIGN) % ALIGN;
    let mut out = dict.into_bytes();
    out.extend(std::iter::repeat(b' ').take(padding));
    out.push(b'\n');
    out
}

/// Write `array` in format version 1.0.
pub fn write<W: Write>(mut out: W, array: &NdArray) -> std::io::Result<()> {
    let header = header(array);
    let len = u16::try_from(header.len())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "npy header too long"))?;
    out.write_all(MAGIC)?;
    out.write_all(&[1, 0])?;
    out.write_all(&len.to_le_bytes())?;
    out.write_all(&header)?;
    out.write_all(&array.to_bytes())?;
    out.flush()
}

/// Encode `array` to bytes.
pub fn to_vec(array: &NdArray) -> Vec<u8> {
    let mut out = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write(&mut out, array);
    out
}

fn invalid(message: impl Into<String>) -> RestoreError {
    RestoreError::Value(format!("invalid npy data: {}", message.into()))
}

/// Read one array.
pub fn read<R: Read>(mut input: R) -> Result<NdArray, RestoreError> {
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;
    from_slice(&bytes)
}

/// Decode an array from the full file contents.
pub fn from_slice(bytes: &[u8]) -> Result<NdArray, RestoreError> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(invalid("bad magic string"));
    }
    let (header_len, start) = match bytes[6] {
        1 => (usize::from(u16::from_le_bytes([bytes[8], bytes[9]])), 10),
        2 | 3 if bytes.len() >= 12 => {
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            (usize::try_from(len).map_err(|_| invalid("header too long"))?, 12)
        }
        major => return Err(invalid(format!("unsupported format version {major}"))),
    };
    let end = start + header_len;
    let text = bytes
        .get(start..end)
        .and_then(|h| std::str::from_utf8(h).ok())
        .ok_or_else(|| invalid("truncated header"))?;

    let header = literal_eval(text.trim())?;
    let Object::Dict(header) = header.kind() else {
        return Err(invalid("header is not a dict"));
    };
    let field = |name: &str| {
        header
            .get(&crate::object::Obj::str(name))
            .ok_or_else(|| invalid(format!("header has no '{name}'")))
    };
    let descr = field("descr")?;
    let dtype = DType::from_descr(descr.as_str().ok_or_else(|| invalid("descr is not a string"))?)?;
    if field("fortran_order")?.as_int() != Some(0) {
        return Err(invalid("Fortran-ordered arrays are not supported"));
    }
    let shape = field("shape")?
        .sequence_items()
        .ok_or_else(|| invalid("shape is not a tuple"))?
        .iter()
        .map(|d| d.as_int().and_then(|d| usize::try_from(d).ok()))
        .collect::<Option<Vec<usize>>>()
        .ok_or_else(|| invalid("shape holds a non-integer"))?;

    let size: usize = shape.iter().product();
    let data = bytes
        .get(end..end + size * dtype.itemsize())
        .ok_or(ArrayError::BufferSize { len: bytes.len() - end, itemsize: dtype.itemsize() })?;
    Ok(NdArray::from_bytes(dtype, data)?.reshape(shape)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ArrayData;

    #[test]
    fn test_header_is_aligned() {
        let bytes = to_vec(&NdArray::from_f64(vec![1.0, 2.0, 3.0]));
        let header_len = usize::from(u16::from_le_bytes([bytes[8], bytes[9]]));
        assert_eq!((10 + header_len) % 64, 0);
        assert_eq!(bytes[10 + header_len - 1], b'\n');
        let header = std::str::from_utf8(&bytes[10..10 + header_len]).unwrap();
        assert!(header.starts_with("{'descr': '<f8', 'fortran_order': False, 'shape': (3,), }"));
    }

    #[test]
    fn test_read_back_matrix() {
        let array = NdArray::from_i64(vec![1, 2, 3, 4, 5, 6]).reshape(vec![2, 3]).unwrap();
        let back = from_slice(&to_vec(&array)).unwrap();
        assert_eq!(back.shape(), &[2, 3]);
        assert_eq!(back.data(), &ArrayData::Int(vec![1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(from_slice(b"not an array").is_err());
        let mut bytes = to_vec(&NdArray::from_f64(vec![1.0, 2.0]));
        bytes.truncate(bytes.len() - 4);
        assert!(from_slice(&bytes).is_err());
    }
}

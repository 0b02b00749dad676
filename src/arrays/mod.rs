//! Side-data storage for arrays too large to inline.
//!
//! Arrays are written either as one `.npy` file per array inside a
//! directory, or as the `.npy` members of a single `.npz` zip file. Saving
//! returns loader code that, prepended to an archive, binds the data table
//! before the archive's own definitions run.

pub mod npy;

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::archive::backup;
use crate::error::{ArchiveError, RestoreError};
use crate::object::repr::str_repr;
use crate::object::{Env, NdArray, Obj};
use crate::registry::Registry;
use crate::restore::restore_with;

/// On-disk layout of side data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayFormat {
    /// Directory with one `<name>.npy` per array.
    #[default]
    Npy,
    /// Zip file of `<name>.npy` members.
    Npz,
}

impl ArrayFormat {
    /// Suffix appended to the data file name.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Npy => "",
            Self::Npz => ".npz",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Npy => "npy",
            Self::Npz => "npz",
        }
    }
}

impl fmt::Display for ArrayFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArrayFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "npy" => Ok(Self::Npy),
            "npz" => Ok(Self::Npz),
            other => Err(format!("Expected data_format in ['npz', 'npy'], got {other:?}")),
        }
    }
}

/// Lowercased extension of the last path component, if any.
fn extension_of(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    base.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Saves and loads side-data tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayManager;

impl ArrayManager {
    /// Write `arrays` below `dirname` and return `(loader code, files written)`.
    ///
    /// With [`ArrayFormat::Npy`] the files go to `dirname/filename/` (or
    /// `dirname/` when `filename` is `None`). With [`ArrayFormat::Npz`] a
    /// filename is required and `.npz` is appended unless already present.
    /// Overwritten files are backed up and the backups removed unless `keep`.
    /// After the loader code runs, the arrays are bound in a dict named
    /// `arrays_name`.
    pub fn save_arrays(
        arrays: &BTreeMap<String, Obj>,
        dirname: &Path,
        filename: Option<&str>,
        keep: bool,
        format: ArrayFormat,
        arrays_name: &str,
    ) -> Result<(String, Vec<PathBuf>), ArchiveError> {
        let mut files = Vec::new();
        let filename = match format {
            ArrayFormat::Npy => {
                let dir = match filename {
                    Some(f) => dirname.join(f),
                    None => dirname.to_path_buf(),
                };
                fs::create_dir_all(&dir)?;
                for (name, array) in arrays {
                    let array = as_array(name, array)?;
                    let path = dir.join(format!("{name}.npy"));
                    backup(&path, keep, |_| {
                        npy::write(BufWriter::new(File::create(&path)?), array)?;
                        Ok(())
                    })?;
                    files.push(path);
                }
                filename.unwrap_or_default().to_string()
            }
            ArrayFormat::Npz => {
                let filename = filename.ok_or_else(|| {
                    ArchiveError::InvalidArgument(format!(
                        "Must specify filename for data_format='{format}'"
                    ))
                })?;
                let filename = match extension_of(filename).as_deref() {
                    Some("npz") => filename.to_string(),
                    _ => format!("{filename}.npz"),
                };
                let path = dirname.join(&filename);
                backup(&path, keep, |_| write_npz(&path, arrays))?;
                files.push(path);
                filename
            }
        };
        debug!(count = arrays.len(), %format, files = files.len(), "saved side data");
        Ok((loader_code(format, dirname, &filename, arrays.keys(), arrays_name), files))
    }

    /// Execute loader code and return the table it binds.
    pub fn load_arrays(
        registry: &Registry,
        rep: &str,
        arrays_name: &str,
    ) -> Result<Obj, ArchiveError> {
        let mut namespace = restore_with(registry, rep, &Env::new())?;
        namespace
            .remove(arrays_name)
            .ok_or_else(|| RestoreError::Name(arrays_name.to_string()).into())
    }
}

fn as_array<'a>(name: &str, obj: &'a Obj) -> Result<&'a NdArray, ArchiveError> {
    obj.as_array()
        .ok_or_else(|| ArchiveError::InvalidArgument(format!("side data {name:?} is not an array")))
}

fn write_npz(path: &Path, arrays: &BTreeMap<String, Obj>) -> Result<(), ArchiveError> {
    let mut zip = zip::ZipWriter::new(File::create(path)?);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, array) in arrays {
        zip.start_file(format!("{name}.npy"), options)?;
        zip.write_all(&npy::to_vec(as_array(name, array)?))?;
    }
    zip.finish()?;
    Ok(())
}

fn loader_code<'a>(
    format: ArrayFormat,
    dirname: &Path,
    filename: &str,
    names: impl Iterator<Item = &'a String>,
    arrays_name: &str,
) -> String {
    let names: Vec<String> = names.map(|n| str_repr(n)).collect();
    let load = format!("{arrays_name}_load");
    let dir = format!("{arrays_name}_dir");
    [
        format!("from persist.arrays import load as {load}"),
        format!("try: {dir} = __file__"),
        format!("except NameError: {dir} = {}", str_repr(&dirname.display().to_string())),
        format!(
            "{arrays_name} = {load}('{format}', {dir}, {}, [{}])",
            str_repr(filename),
            names.join(", ")
        ),
        format!("del {load}, {dir}"),
        String::new(),
    ]
    .join("\n")
}

/// Read the named arrays.
///
/// `location` is a directory, or a file whose parent directory is used; the
/// data lives at `location/filename`.
pub fn load(
    format: ArrayFormat,
    location: &Path,
    filename: &str,
    names: &[String],
) -> Result<BTreeMap<String, NdArray>, RestoreError> {
    let dir = if location.is_file() {
        location.parent().unwrap_or(Path::new("."))
    } else {
        location
    };
    let path = dir.join(filename);
    let mut out = BTreeMap::new();
    match format {
        ArrayFormat::Npy => {
            for name in names {
                let file = File::open(path.join(format!("{name}.npy")))?;
                out.insert(name.clone(), npy::read(file)?);
            }
        }
        ArrayFormat::Npz => {
            let mut zip = zip::ZipArchive::new(File::open(&path)?)
                .map_err(|err| RestoreError::Value(format!("{}: {err}", path.display())))?;
            for name in names {
                let mut member = zip
                    .by_name(&format!("{name}.npy"))
                    .map_err(|_| {
                        RestoreError::Key(format!("{name:?} is not a file in the archive"))
                    })?;
                let mut bytes = Vec::new();
                member.read_to_end(&mut bytes)?;
                out.insert(name.clone(), npy::from_slice(&bytes)?);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> BTreeMap<String, Obj> {
        BTreeMap::from([
            ("array_0".to_string(), Obj::array(NdArray::from_f64(vec![1.0, 2.0, 3.0]))),
            ("array_1".to_string(), Obj::array(NdArray::from_i64(vec![4, 5]))),
        ])
    }

    fn save(
        dir: &Path,
        filename: Option<&str>,
        keep: bool,
        format: ArrayFormat,
    ) -> Result<(String, Vec<PathBuf>), ArchiveError> {
        ArrayManager::save_arrays(&table(), dir, filename, keep, format, "_arrays")
    }

    #[test]
    fn test_npy_directory_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (rep, files) = save(dir.path(), Some("_arrays"), false, ArrayFormat::Npy).unwrap();
        assert_eq!(files.len(), 2);
        assert!(dir.path().join("_arrays").join("array_0.npy").is_file());

        let loaded = ArrayManager::load_arrays(&Registry::standard(), &rep, "_arrays").unwrap();
        assert_eq!(loaded, Obj::dict(table().into_iter().map(|(k, v)| (Obj::str(k), v)).collect()));
    }

    #[test]
    fn test_npz_appends_extension() {
        let dir = tempfile::tempdir().unwrap();
        let (rep, files) = save(dir.path(), Some("data"), false, ArrayFormat::Npz).unwrap();
        assert_eq!(files, vec![dir.path().join("data.npz")]);
        assert!(rep.contains("'data.npz'"));

        let names = vec!["array_1".to_string()];
        let location = dir.path().join("data.npz");
        let loaded = load(ArrayFormat::Npz, &location, "data.npz", &names).unwrap();
        assert_eq!(loaded["array_1"], NdArray::from_i64(vec![4, 5]));
    }

    #[test]
    fn test_npz_requires_filename() {
        let dir = tempfile::tempdir().unwrap();
        let err = save(dir.path(), None, false, ArrayFormat::Npz);
        assert!(matches!(err, Err(ArchiveError::InvalidArgument(_))));
    }

    #[test]
    fn test_overwrite_keeps_backup_on_request() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), Some("d"), true, ArrayFormat::Npz).unwrap();
        save(dir.path(), Some("d"), true, ArrayFormat::Npz).unwrap();
        assert!(dir.path().join("d.npz.bak").is_file());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("npz".parse::<ArrayFormat>().unwrap(), ArrayFormat::Npz);
        assert!("hdf5".parse::<ArrayFormat>().is_err());
        assert_eq!(ArrayFormat::Npy.extension(), "");
    }
}

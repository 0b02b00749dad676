//! Writing archives to disk.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::arrays::{ArrayFormat, ArrayManager};
use crate::error::ArchiveError;

use super::Archive;

/// Move `path` out of the way while `f` runs.
///
/// An existing `path` is renamed to `path.bak`, or `path_N.bak` for the
/// first free `N`, and `f` receives the backup's path. When `f` succeeds the
/// backup is removed unless `keep`; when it fails the backup stays.
pub fn backup<T>(
    path: &Path,
    keep: bool,
    f: impl FnOnce(Option<&Path>) -> Result<T, ArchiveError>,
) -> Result<T, ArchiveError> {
    let saved = if path.exists() {
        let mut candidate = with_suffix(path, ".bak");
        let mut n = 1;
        while candidate.exists() {
            candidate = with_suffix(path, &format!("_{n}.bak"));
            n += 1;
        }
        fs::rename(path, &candidate)?;
        Some(candidate)
    } else {
        None
    };

    let result = f(saved.as_deref())?;

    if let Some(saved) = saved.filter(|_| !keep) {
        if saved.is_dir() {
            fs::remove_dir_all(&saved)?;
        } else {
            fs::remove_file(&saved)?;
        }
    }
    Ok(result)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// How [`Archive::save`] lays out its files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Package or module name; defaults to the single name in
    /// single-item mode.
    pub name: Option<String>,
    /// `<dir>/<name>/__init__.py` when set, `<dir>/<name>.py` otherwise.
    pub package: bool,
    /// File or directory name of the side data.
    pub arrays_name: String,
    /// Side-data layout.
    pub format: ArrayFormat,
    /// Overwrite existing files.
    pub force: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            name: None,
            package: true,
            arrays_name: "_arrays".to_string(),
            format: ArrayFormat::default(),
            force: false,
        }
    }
}

impl SaveOptions {
    /// Options saving under `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::default() }
    }

    /// Set the package layout.
    pub fn with_package(mut self, package: bool) -> Self {
        self.package = package;
        self
    }

    /// Set the side-data format.
    pub fn with_format(mut self, format: ArrayFormat) -> Self {
        self.format = format;
        self
    }

    /// Set overwriting.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Paths written by [`Archive::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    /// The program: `__init__.py` or `<name>.py`.
    pub init_file: PathBuf,
    /// Directory the side data was written below.
    pub package_dir: PathBuf,
    /// Side-data files.
    pub data_files: Vec<PathBuf>,
}

impl Archive {
    /// Write the side-data table and return the loader code to prepend to
    /// the program plus the files written.
    ///
    /// Without a `datafile` nothing is written and a warning is logged when
    /// there is data. For formats other than `npy` with no `filename`, the
    /// last component of `datafile` is the file name.
    pub fn save_data(
        &self,
        datafile: Option<&Path>,
        filename: Option<&str>,
        format: ArrayFormat,
    ) -> Result<(Option<String>, Vec<PathBuf>), ArchiveError> {
        let data = self.data.borrow();
        if data.is_empty() {
            return Ok((None, Vec::new()));
        }
        let Some(datafile) = datafile else {
            let names: Vec<&String> = data.keys().collect();
            warn!(
                arrays = ?names,
                "Data arrays exist but no datafile specified. \
                 Save data manually and populate in {} dict.",
                self.config.data_name
            );
            return Ok((None, Vec::new()));
        };

        let mut dirname = datafile.to_path_buf();
        let mut filename = filename.map(str::to_string);
        if filename.is_none() && format != ArrayFormat::Npy {
            dirname = datafile.parent().map(Path::to_path_buf).unwrap_or_default();
            filename = datafile.file_name().map(|name| name.to_string_lossy().into_owned());
        }
        let (rep, files) = ArrayManager::save_arrays(
            &data,
            &dirname,
            filename.as_deref(),
            self.config.backup_data,
            format,
            &self.config.data_name,
        )?;
        Ok((Some(rep), files))
    }

    /// Save the archive as an importable package or module below `dirname`.
    ///
    /// Packages go to `<dirname>/<name>/__init__.py` with side data in
    /// `<dirname>/<name>/<arrays_name>`; modules go to `<dirname>/<name>.py`
    /// with side data in `<dirname>/<name><arrays_name>`. Existing files are
    /// an error unless `force`, in which case they are backed up while
    /// writing.
    pub fn save(&self, dirname: &Path, options: &SaveOptions) -> Result<SaveReport, ArchiveError> {
        // Rendering fills the side-data table checked below.
        let program = self.render()?;

        let name = match &options.name {
            Some(name) => name.clone(),
            None if self.config.single_item_mode => {
                let first = self.entries.first().ok_or(ArchiveError::MissingName)?;
                first.name.clone()
            }
            None => return Err(ArchiveError::MissingName),
        };

        let mut arrays_file = format!("{}{}", options.arrays_name, options.format.extension());
        let (init_file, package_dir) = if options.package {
            (dirname.join(&name).join("__init__.py"), dirname.join(&name))
        } else {
            arrays_file = format!("{name}{arrays_file}");
            (dirname.join(format!("{name}.py")), dirname.to_path_buf())
        };

        if dirname.exists() {
            if !dirname.is_dir() {
                return Err(ArchiveError::NotADirectory(dirname.to_path_buf()));
            }
            if !options.force {
                if init_file.exists() {
                    return Err(ArchiveError::FileExists(init_file));
                }
                let data_path = package_dir.join(&arrays_file);
                if !self.data.borrow().is_empty() && data_path.exists() {
                    return Err(ArchiveError::FileExists(data_path));
                }
            }
            if options.package && package_dir.exists() && !package_dir.is_dir() {
                if !options.force {
                    return Err(ArchiveError::NotADirectory(package_dir));
                }
                backup(&package_dir, true, |_| Ok(()))?;
            }
        } else {
            info!(dir = %dirname.display(), "Making directory for archive");
            fs::create_dir_all(dirname)?;
        }

        if options.package && !package_dir.exists() {
            info!(dir = %package_dir.display(), "Making directory for archive");
            fs::create_dir_all(&package_dir)?;
        }

        let (loader, data_files) =
            self.save_data(Some(&package_dir), Some(&arrays_file), options.format)?;
        backup(&init_file, self.config.backup_data, |_| {
            let mut text = loader.unwrap_or_default();
            text.push_str(&program);
            text.push('\n');
            fs::write(&init_file, text)?;
            Ok(())
        })?;
        Ok(SaveReport { init_file, package_dir, data_files })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, "one").unwrap();
        backup(&path, true, |saved| {
            assert_eq!(saved, Some(dir.path().join("f.txt.bak").as_path()));
            fs::write(&path, "two")?;
            Ok(())
        })
        .unwrap();
        backup(&path, true, |saved| {
            assert_eq!(saved, Some(dir.path().join("f.txt_1.bak").as_path()));
            Ok(())
        })
        .unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("f.txt.bak")).unwrap(), "one");
        assert_eq!(fs::read_to_string(dir.path().join("f.txt_1.bak")).unwrap(), "two");
    }

    #[test]
    fn test_backup_removed_on_success_kept_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, "one").unwrap();
        backup(&path, false, |_| Ok(())).unwrap();
        assert!(!dir.path().join("f.txt.bak").exists());

        fs::write(&path, "two").unwrap();
        let result: Result<(), _> = backup(&path, false, |_| {
            Err(ArchiveError::InvalidArgument("write failed".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(dir.path().join("f.txt.bak")).unwrap(), "two");
    }

    #[test]
    fn test_backup_of_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let value = backup(&dir.path().join("absent"), false, |saved| {
            assert!(saved.is_none());
            Ok(7)
        })
        .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_save_data_without_datafile_writes_nothing() {
        let config = crate::ArchiveConfig::default().with_array_threshold(Some(0));
        let mut archive = Archive::new(config);
        let array = crate::object::NdArray::from_f64(vec![1.0]);
        archive.insert("a", crate::Obj::array(array)).unwrap();
        archive.render().unwrap();
        assert_eq!(archive.data().len(), 1);
        let (rep, files) = archive.save_data(None, None, ArrayFormat::Npy).unwrap();
        assert!(rep.is_none());
        assert!(files.is_empty());
    }
}

//! Kernel program sources.
//!
//! A [`ProgramSource`] carries the text units loaded from a kernel directory
//! (compiled by device backends) and the host implementations of its entry
//! points (run by [`crate::CpuBackend`]).

use crate::{ComputeError, HostKernel};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One source file of a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub text: String,
}

#[derive(Clone, Default)]
pub struct ProgramSource {
    units: Vec<SourceUnit>,
    host_kernels: BTreeMap<String, Arc<dyn HostKernel>>,
}

impl ProgramSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every file in `dir` with the given extension, ordered by file name.
    ///
    /// # Errors
    ///
    /// [`ComputeError::SourceIo`] when the directory or one of its files
    /// cannot be read.
    pub fn from_dir(dir: impl AsRef<Path>, extension: &str) -> Result<Self, ComputeError> {
        let dir = dir.as_ref();
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ComputeError::SourceIo { path, source }
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err(dir))? {
            let path = entry.map_err(io_err(dir))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut source = Self::new();
        for path in paths {
            let text = fs::read_to_string(&path).map_err(io_err(&path))?;
            source.units.push(SourceUnit { path, text });
        }
        tracing::debug!(dir = ?dir, units = source.units.len(), "loaded kernel sources");
        Ok(source)
    }

    #[must_use]
    pub fn with_unit(mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        self.units.push(SourceUnit {
            path: path.into(),
            text: text.into(),
        });
        self
    }

    /// Registers the host implementation of `entry_point`.
    #[must_use]
    pub fn with_host_kernel(
        mut self,
        entry_point: impl Into<String>,
        kernel: Arc<dyn HostKernel>,
    ) -> Self {
        self.host_kernels.insert(entry_point.into(), kernel);
        self
    }

    #[must_use]
    pub fn units(&self) -> &[SourceUnit] {
        &self.units
    }

    #[must_use]
    pub fn host_kernel(&self, entry_point: &str) -> Option<&Arc<dyn HostKernel>> {
        self.host_kernels.get(entry_point)
    }

    pub fn host_entry_points(&self) -> impl Iterator<Item = &str> {
        self.host_kernels.keys().map(String::as_str)
    }

    /// All units joined into one compilation unit, in load order.
    #[must_use]
    pub fn concatenated(&self) -> String {
        let mut out = String::new();
        for unit in &self.units {
            out.push_str(&unit.text);
            if !unit.text.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}

impl fmt::Debug for ProgramSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramSource")
            .field("units", &self.units.iter().map(|u| &u.path).collect::<Vec<_>>())
            .field("host_kernels", &self.host_kernels.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("compute-source-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn loads_matching_files_in_name_order() {
        let dir = scratch_dir("order");
        fs::write(dir.join("b.wgsl"), "// b").unwrap();
        fs::write(dir.join("a.wgsl"), "// a\n").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let source = ProgramSource::from_dir(&dir, "wgsl").unwrap();
        let names: Vec<_> = source
            .units()
            .iter()
            .map(|u| u.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.wgsl", "b.wgsl"]);
        assert_eq!(source.concatenated(), "// a\n// b\n");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = std::env::temp_dir().join("compute-source-does-not-exist");
        let err = ProgramSource::from_dir(&dir, "wgsl").unwrap_err();
        assert!(matches!(err, ComputeError::SourceIo { .. }));
    }
}

//! File manifest for a servable and its ZIP packaging

use crate::error::{DlhubError, DlhubResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;

/// Logical file names plus any unnamed supporting files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileManifest {
    named: BTreeMap<String, PathBuf>,
    other: Vec<PathBuf>,
}

impl FileManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file, under a logical name when given
    ///
    /// Relative paths are made absolute against the current directory.
    pub fn add(&mut self, path: impl AsRef<Path>, name: Option<&str>) -> DlhubResult<()> {
        let path = std::path::absolute(path.as_ref())?;
        match name {
            Some(name) => {
                self.named.insert(name.to_string(), path);
            }
            None => {
                if !self.other.contains(&path) {
                    self.other.push(path);
                }
            }
        }
        Ok(())
    }

    /// Record every regular file under `dir` as an unnamed file
    ///
    /// Returns the number of files added.
    pub fn add_directory(&mut self, dir: impl AsRef<Path>, recursive: bool) -> DlhubResult<usize> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(DlhubError::InvalidArgument(format!(
                "{:?} is not a directory",
                dir
            )));
        }

        let mut found = Vec::new();
        collect_files(dir, recursive, &mut found)?;
        found.sort();

        let count = found.len();
        for path in found {
            self.add(path, None)?;
        }
        Ok(count)
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.named.get(name).map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.other.is_empty()
    }

    /// All referenced files, named ones first, without duplicates
    pub fn list(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = Vec::new();
        for path in self.named.values().chain(self.other.iter()) {
            if !files.contains(path) {
                files.push(path.clone());
            }
        }
        files
    }

    /// Deepest directory containing every file
    pub fn common_root(&self) -> Option<PathBuf> {
        let files = self.list();
        let mut parents = files.iter().filter_map(|p| p.parent());

        let mut root: PathBuf = parents.next()?.to_path_buf();
        for parent in parents {
            while !parent.starts_with(&root) {
                if !root.pop() {
                    return Some(PathBuf::new());
                }
            }
        }
        Some(root)
    }

    /// The `dlhub.files` value
    pub fn to_json(&self, simplify_paths: bool) -> Value {
        let root = if simplify_paths {
            self.common_root()
        } else {
            None
        };
        let render = |path: &Path| match &root {
            Some(root) => relative_name(path, root),
            None => path.to_string_lossy().to_string(),
        };

        let mut map = Map::new();
        for (name, path) in &self.named {
            map.insert(name.clone(), Value::String(render(path)));
        }
        if !self.other.is_empty() {
            map.insert(
                "other".to_string(),
                Value::Array(
                    self.other
                        .iter()
                        .map(|p| Value::String(render(p)))
                        .collect(),
                ),
            );
        }
        Value::Object(map)
    }

    /// Write every file into a ZIP archive at `dest`, named relative to the common root
    pub fn write_zip(&self, dest: &Path) -> DlhubResult<()> {
        let file = File::create(dest)?;
        let mut writer = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let root = self.common_root().unwrap_or_default();
        for path in self.list() {
            let name = relative_name(&path, &root);
            tracing::debug!(file = ?path, entry = %name, "Adding file to archive");

            let mut source = File::open(&path).map_err(|e| {
                DlhubError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to open {:?}: {}", path, e),
                ))
            })?;
            writer.start_file(name, options)?;
            std::io::copy(&mut source, &mut writer)?;
        }

        writer.finish()?;
        Ok(())
    }
}

/// Path of `path` as it appears in simplified metadata and in the archive
fn relative_name(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn collect_files(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> DlhubResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                collect_files(&path, recursive, out)?;
            }
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::util::ensure_directory;

/// Method-scoped area where phases write and remove synthetic artifacts.
///
/// Paths are relative to the area root.
pub trait StagingArea {
    fn write_file(&mut self, relative: &Path, contents: &str) -> Result<()>;
    fn file_exists(&self, relative: &Path) -> bool;
    fn dir_exists(&self, relative: &Path) -> bool;
    /// Immediate children of `relative`, as paths relative to the area root.
    fn list_dir(&self, relative: &Path) -> Result<Vec<PathBuf>>;
    /// Removes a file, or a directory and everything below it.
    fn remove_path(&mut self, relative: &Path) -> Result<()>;
    fn display_path(&self, relative: &Path) -> String;
}

pub fn dir_is_clean(staging: &dyn StagingArea, relative: &Path) -> Result<bool> {
    if !staging.dir_exists(relative) {
        return Ok(true);
    }
    Ok(staging.list_dir(relative)?.is_empty())
}

fn ensure_relative(relative: &Path) -> Result<()> {
    let escapes = relative.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        bail!(
            "staging path must stay inside the staging root: {}",
            relative.display()
        );
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DiskStaging {
    root: PathBuf,
    label_root: PathBuf,
}

impl DiskStaging {
    /// `label_root` is the prefix used when naming paths in phase output.
    pub fn new(root: PathBuf, label_root: PathBuf) -> Self {
        Self { root, label_root }
    }
}

impl StagingArea for DiskStaging {
    fn write_file(&mut self, relative: &Path, contents: &str) -> Result<()> {
        ensure_relative(relative)?;
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            ensure_directory(parent)?;
        }
        fs::write(&path, contents)
            .with_context(|| format!("failed to write staging file: {}", path.display()))
    }

    fn file_exists(&self, relative: &Path) -> bool {
        self.root.join(relative).is_file()
    }

    fn dir_exists(&self, relative: &Path) -> bool {
        self.root.join(relative).is_dir()
    }

    fn list_dir(&self, relative: &Path) -> Result<Vec<PathBuf>> {
        let path = self.root.join(relative);
        let entries = fs::read_dir(&path)
            .with_context(|| format!("failed to read staging directory: {}", path.display()))?;

        let mut children = Vec::new();
        for entry in entries {
            let entry = entry
                .with_context(|| format!("failed to read entry in {}", path.display()))?;
            children.push(relative.join(entry.file_name()));
        }
        children.sort();
        Ok(children)
    }

    fn remove_path(&mut self, relative: &Path) -> Result<()> {
        ensure_relative(relative)?;
        let path = self.root.join(relative);
        if path.is_dir() {
            fs::remove_dir_all(&path)
                .with_context(|| format!("failed to remove directory: {}", path.display()))
        } else if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove file: {}", path.display()))
        } else {
            Ok(())
        }
    }

    fn display_path(&self, relative: &Path) -> String {
        self.label_root.join(relative).display().to_string()
    }
}

/// Staging area kept entirely in memory. Directories exist while they hold a file.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryStaging {
    files: BTreeMap<PathBuf, String>,
}

#[cfg(test)]
impl MemoryStaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, relative: &Path) -> Option<&str> {
        self.files.get(relative).map(String::as_str)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
impl StagingArea for MemoryStaging {
    fn write_file(&mut self, relative: &Path, contents: &str) -> Result<()> {
        ensure_relative(relative)?;
        self.files
            .insert(relative.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn file_exists(&self, relative: &Path) -> bool {
        self.files.contains_key(relative)
    }

    fn dir_exists(&self, relative: &Path) -> bool {
        self.files
            .keys()
            .any(|path| path != relative && path.starts_with(relative))
    }

    fn list_dir(&self, relative: &Path) -> Result<Vec<PathBuf>> {
        let mut children = BTreeSet::new();
        for path in self.files.keys() {
            let Ok(rest) = path.strip_prefix(relative) else {
                continue;
            };
            if let Some(first) = rest.components().next() {
                children.insert(relative.join(first.as_os_str()));
            }
        }
        Ok(children.into_iter().collect())
    }

    fn remove_path(&mut self, relative: &Path) -> Result<()> {
        ensure_relative(relative)?;
        self.files.retain(|path, _| !path.starts_with(relative));
        Ok(())
    }

    fn display_path(&self, relative: &Path) -> String {
        relative.display().to_string()
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use walkdir::{DirEntry, WalkDir};

use crate::metrics::compress_text;
use crate::util::truncate_chars;

const README_HEAD_LINES: usize = 20;
const README_HEAD_CHARS: usize = 500;
const SOURCE_EXTENSIONS: [&str; 4] = ["rs", "ts", "tsx", "py"];
const SKIPPED_DIRS: [&str; 2] = ["target", "node_modules"];

static CARGO_PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*name\s*=\s*"([^"]+)""#).expect("valid cargo package name regex")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectSnapshot {
    pub name: String,
    pub docs_md_files: usize,
    pub src_files: usize,
    pub readme_head: String,
}

pub trait ProjectScanner: Send + Sync {
    fn scan(&self) -> Result<ProjectSnapshot>;
}

pub struct DiskProjectScanner {
    root: PathBuf,
}

impl DiskProjectScanner {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl ProjectScanner for DiskProjectScanner {
    fn scan(&self) -> Result<ProjectSnapshot> {
        let readme = self.root.join("README.md");
        let readme_head = if readme.is_file() {
            let raw = fs::read_to_string(&readme)
                .with_context(|| format!("failed to read {}", readme.display()))?;
            let head = raw
                .lines()
                .take(README_HEAD_LINES)
                .collect::<Vec<&str>>()
                .join("\n");
            truncate_chars(&head, README_HEAD_CHARS).to_string()
        } else {
            String::new()
        };

        let docs_md_files = count_files(&self.root.join("docs"), |ext| ext == "md")?;
        let src_files = count_files(&self.root.join("src"), |ext| {
            SOURCE_EXTENSIONS.contains(&ext)
        })?;

        Ok(ProjectSnapshot {
            name: read_package_name(&self.root),
            docs_md_files,
            src_files,
            readme_head,
        })
    }
}

fn read_package_name(root: &Path) -> String {
    let cargo_name = fs::read_to_string(root.join("Cargo.toml"))
        .ok()
        .and_then(|raw| {
            CARGO_PACKAGE_NAME
                .captures(&raw)
                .and_then(|captures| captures.get(1))
                .map(|m| m.as_str().to_string())
        });
    if let Some(name) = cargo_name {
        return name;
    }

    fs::read(root.join("package.json"))
        .ok()
        .and_then(|raw| serde_json::from_slice::<serde_json::Value>(&raw).ok())
        .and_then(|value| value.get("name").and_then(|name| name.as_str()).map(ToOwned::to_owned))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Directories that never hold project docs or sources.
fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.iter().any(|skipped| name == *skipped)
}

fn count_files(dir: &Path, keep_extension: impl Fn(&str) -> bool) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let mut count = 0usize;
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry));
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| keep_extension(&ext.to_ascii_lowercase()));
        if matches {
            count += 1;
        }
    }

    Ok(count)
}

/// Compact project-state digest; the same shape before and after the workflow.
pub fn render_project_digest(
    snapshot: &ProjectSnapshot,
    signal_label: &str,
    signal: &str,
    max_chars: usize,
) -> String {
    let summary = format!(
        "name={}\ndocs_md_files={}\nsrc_files={}\nreadme_head={}\n{}={}\n",
        snapshot.name,
        snapshot.docs_md_files,
        snapshot.src_files,
        snapshot.readme_head,
        signal_label,
        signal
    );
    compress_text(&summary, max_chars)
}

//! Filesystem connector.
//!
//! Walks each configured path (file or directory), applies glob
//! include/exclude filters, and yields a [`SourceItem`] for every file whose
//! extension the converter (C2) supports. Generalizes the teacher's
//! single-root walker to a list of paths with quote-stripping, per
//! SPEC_FULL §4.1.

use std::path::Path;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::FilesystemConnectorConfig;
use crate::models::SourceItem;

use super::{mime_for_extension, strip_quotes, Connector};

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

pub struct FilesystemConnector {
    config: FilesystemConnectorConfig,
}

impl FilesystemConnector {
    pub fn new(config: FilesystemConnectorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for FilesystemConnector {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn scan(&self) -> Result<Vec<SourceItem>> {
        scan(&self.config)
    }
}

pub fn scan(config: &FilesystemConnectorConfig) -> Result<Vec<SourceItem>> {
    let include_set = build_globset(&config.include_globs)?;
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut items = Vec::new();
    for raw_path in &config.paths {
        let path_str = strip_quotes(raw_path);
        let root = Path::new(path_str);
        if !root.exists() {
            bail!("filesystem source path does not exist: {}", root.display());
        }

        if root.is_file() {
            let parent = root.parent().unwrap_or(root);
            if let Some(item) = file_to_item(root, parent, &include_set, &exclude_set)? {
                items.push(item);
            }
            continue;
        }

        let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(item) = file_to_item(entry.path(), root, &include_set, &exclude_set)? {
                items.push(item);
            }
        }
    }

    items.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    Ok(items)
}

fn file_to_item(
    path: &Path,
    root: &Path,
    include_set: &GlobSet,
    exclude_set: &GlobSet,
) -> Result<Option<SourceItem>> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let rel_str = relative.to_string_lossy().to_string();

    if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
        return Ok(None);
    }

    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();
    let Some(mime) = mime_for_extension(&ext) else {
        return Ok(None);
    };

    let metadata = std::fs::metadata(path)?;
    let modified: DateTime<Utc> = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    let bytes = std::fs::read(path)?;
    let display_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(Some(SourceItem {
        display_name,
        source_id: rel_str,
        mime: mime.to_string(),
        bytes,
        updated_at: Some(modified),
    }))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &std::path::Path, name: &str, content: &str) {
        let path = dir.join(name);
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn scans_supported_files_and_skips_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.md", "# Hello");
        write_file(dir.path(), "b.bin", "not supported");

        let config = FilesystemConnectorConfig {
            paths: vec![dir.path().to_string_lossy().to_string()],
            include_globs: vec!["**/*".to_string()],
            exclude_globs: vec![],
            follow_symlinks: false,
        };

        let items = scan(&config).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].display_name, "a.md");
    }

    #[test]
    fn strips_quotes_from_configured_paths() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", "hello");
        let quoted = format!("\"{}\"", dir.path().to_string_lossy());

        let config = FilesystemConnectorConfig {
            paths: vec![quoted],
            include_globs: vec!["**/*".to_string()],
            exclude_globs: vec![],
            follow_symlinks: false,
        };

        let items = scan(&config).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn missing_path_is_an_error() {
        let config = FilesystemConnectorConfig {
            paths: vec!["/does/not/exist".to_string()],
            include_globs: vec!["**/*".to_string()],
            exclude_globs: vec![],
            follow_symlinks: false,
        };
        assert!(scan(&config).is_err());
    }
}

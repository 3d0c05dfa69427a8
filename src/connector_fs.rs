//! Knowledge folder scanner.
//!
//! Walks `[knowledge].root`, applies include/exclude globs, and converts each
//! matching file to text. Unreadable or unsupported files are reported as
//! [`SkippedFile`]s rather than failing the scan.

use anyhow::Result;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::KnowledgeConfig;
use crate::extract;
use crate::models::{SkippedFile, SourceDocument};

#[derive(Debug, Default)]
pub struct ScanResult {
    pub documents: Vec<SourceDocument>,
    pub skipped: Vec<SkippedFile>,
    /// The root did not exist and was created empty.
    pub created_root: bool,
}

pub fn scan_knowledge(config: &KnowledgeConfig) -> Result<ScanResult> {
    let root = &config.root;
    let mut result = ScanResult::default();

    if !root.exists() {
        std::fs::create_dir_all(root)?;
        info!(root = %root.display(), "created empty knowledge folder");
        result.created_root = true;
        return Ok(result);
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match read_document(path, &rel_str) {
            Ok(doc) => result.documents.push(doc),
            Err(reason) => {
                warn!(path = %rel_str, %reason, "skipping file");
                result.skipped.push(SkippedFile {
                    source_path: rel_str,
                    reason,
                });
            }
        }
    }

    result
        .documents
        .sort_by(|a, b| a.source_path.cmp(&b.source_path));

    Ok(result)
}

fn read_document(path: &Path, relative_path: &str) -> std::result::Result<SourceDocument, String> {
    let content_type = extract::content_type_for(path)
        .ok_or_else(|| "unsupported file extension".to_string())?;

    let metadata = std::fs::metadata(path).map_err(|e| e.to_string())?;
    let updated_at: DateTime<Utc> = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    let body = if extract::is_binary(content_type) {
        let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
        extract::extract_text(&bytes, content_type).map_err(|e| e.to_string())?
    } else {
        std::fs::read_to_string(path).map_err(|e| e.to_string())?
    };

    let title = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| relative_path.to_string());

    Ok(SourceDocument {
        source_path: relative_path.to_string(),
        title,
        content_type: content_type.to_string(),
        updated_at,
        body,
    })
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
    use std::fs;
    use tempfile::TempDir;

    fn knowledge(root: &Path) -> KnowledgeConfig {
        KnowledgeConfig {
            root: root.to_path_buf(),
            ..KnowledgeConfig::default()
        }
    }

    #[test]
    fn test_missing_root_is_created() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("docs");
        let result = scan_knowledge(&knowledge(&root)).unwrap();
        assert!(result.created_root);
        assert!(result.documents.is_empty());
        assert!(root.is_dir());
    }

    #[test]
    fn test_globs_and_skips() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("policies")).unwrap();
        fs::write(root.join("policies/refunds.md"), "Refunds within 30 days.").unwrap();
        fs::write(root.join("notes.txt"), "Shipping is free.").unwrap();
        fs::write(root.join("image.png"), [0u8, 1, 2]).unwrap();
        fs::write(root.join("broken.pdf"), "not really a pdf").unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git/HEAD.txt"), "ref").unwrap();

        let result = scan_knowledge(&knowledge(root)).unwrap();
        let paths: Vec<&str> = result
            .documents
            .iter()
            .map(|d| d.source_path.as_str())
            .collect();
        assert_eq!(paths, vec!["notes.txt", "policies/refunds.md"]);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].source_path, "broken.pdf");
        assert_eq!(result.documents[1].content_type, extract::MIME_MARKDOWN);
    }

    #[test]
    fn test_exclude_globs() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("drafts")).unwrap();
        fs::write(root.join("drafts/wip.md"), "draft").unwrap();
        fs::write(root.join("final.md"), "final").unwrap();

        let mut cfg = knowledge(root);
        cfg.exclude_globs = vec!["drafts/**".to_string()];
        let result = scan_knowledge(&cfg).unwrap();
        assert_eq!(result.documents.len(), 1);
        assert_eq!(result.documents[0].source_path, "final.md");
    }
}

//! Source extraction: turns a [`DocumentSource`] into normalized documents.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

use crate::error::IndexError;
use crate::models::{Document, DocumentSource, FileType, IndexingConfig};
use crate::utils::file::sniff_text_file;
use crate::utils::{matches_any, normalize_whitespace, read_file_content, title_from_path};

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    match Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->") {
        Ok(regex) => regex,
        Err(err) => panic!("script/style regex is invalid: {err}"),
    }
});

static BLOCK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = r"(?i)</?(p|div|br|h[1-6]|li|ul|ol|tr|table|section|article|header|footer|pre|blockquote)\b[^>]*>";
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(err) => panic!("block tag regex is invalid: {err}"),
    }
});

static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| match Regex::new(r"<[^>]*>") {
    Ok(regex) => regex,
    Err(err) => panic!("tag regex is invalid: {err}"),
});

static HTML_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    match Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>") {
        Ok(regex) => regex,
        Err(err) => panic!("title regex is invalid: {err}"),
    }
});

/// One extracted document, or the reason a candidate could not be read.
#[derive(Debug)]
pub struct Extracted {
    /// Path or inline name the candidate came from.
    pub location: String,
    pub document: Result<Document, IndexError>,
}

/// Reads files, directories and inline text into [`Document`]s.
#[derive(Debug, Clone)]
pub struct SourceExtractor {
    exclude_patterns: Vec<String>,
    max_file_size: u64,
}

impl SourceExtractor {
    pub fn new(config: &IndexingConfig) -> Self {
        Self {
            exclude_patterns: config.exclude_patterns.clone(),
            max_file_size: config.max_file_size,
        }
    }

    /// Extract every document a source refers to.
    ///
    /// Source-level problems (missing path, empty directory) are returned as
    /// `Err`; per-file problems are reported inside each [`Extracted`].
    pub fn extract(&self, source: &DocumentSource) -> Result<Vec<Extracted>, IndexError> {
        match source {
            DocumentSource::FilePath(path) => {
                if !path.is_file() {
                    return Err(IndexError::InvalidInput(format!(
                        "not a file: {}",
                        path.display()
                    )));
                }
                Ok(vec![Extracted {
                    location: path.display().to_string(),
                    document: self.read_file(path, true),
                }])
            }
            DocumentSource::DirectoryPath(root) => self.extract_directory(root),
            DocumentSource::InlineText { name, text } => Ok(vec![Extracted {
                location: name.clone(),
                document: extract_inline(name, text),
            }]),
        }
    }

    fn extract_directory(&self, root: &Path) -> Result<Vec<Extracted>, IndexError> {
        if !root.is_dir() {
            return Err(IndexError::InvalidInput(format!(
                "not a directory: {}",
                root.display()
            )));
        }

        let mut extracted = Vec::new();

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let location = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.display().to_string());
                    extracted.push(Extracted {
                        location,
                        document: Err(IndexError::WalkError(e.to_string())),
                    });
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_file() || matches_any(path, &self.exclude_patterns) {
                continue;
            }
            if detect_file_type(path).is_none() {
                tracing::debug!(path = %path.display(), "skipping unsupported file");
                continue;
            }

            extracted.push(Extracted {
                location: path.display().to_string(),
                document: self.read_file(path, false),
            });
        }

        if extracted.is_empty() {
            return Err(IndexError::NoFilesFound);
        }

        Ok(extracted)
    }

    fn read_file(&self, path: &Path, explicit: bool) -> Result<Document, IndexError> {
        let file_type = detect_file_type(path).ok_or_else(|| {
            IndexError::InvalidInput(format!("unsupported file type: {}", path.display()))
        })?;
        if explicit && matches_any(path, &self.exclude_patterns) {
            tracing::warn!(path = %path.display(), "indexing a path that matches an exclude pattern");
        }

        let canonical: PathBuf = path
            .canonicalize()
            .map_err(|e| IndexError::FileReadError(format!("{}: {}", path.display(), e)))?;
        let raw = read_file_content(&canonical, self.max_file_size)
            .map_err(|e| IndexError::FileReadError(format!("{}: {}", path.display(), e)))?;

        let title = extract_title(file_type, &raw).unwrap_or_else(|| title_from_path(path));
        let location = format!("file:{}", canonical.display());

        let mut document = Document::new(
            &location,
            canonical.display().to_string(),
            title,
            file_type,
            clean_text(file_type, &raw),
        )
        .with_metadata("line_count", line_count(&raw));
        document.size_bytes = raw.len() as u64;

        if let Some(extension) = canonical.extension().and_then(|e| e.to_str()) {
            document = document.with_metadata("extension", extension.to_lowercase());
        }
        if let Some(parent) = canonical.parent() {
            document = document.with_metadata("directory", parent.display().to_string());
        }
        if let Ok(modified) = std::fs::metadata(&canonical).and_then(|m| m.modified()) {
            let modified: DateTime<Utc> = modified.into();
            document = document.with_metadata("modified", modified.to_rfc3339());
        }

        Ok(document)
    }
}

fn extract_inline(name: &str, text: &str) -> Result<Document, IndexError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(IndexError::InvalidInput(
            "inline text needs a non-empty name".to_string(),
        ));
    }

    let file_type = FileType::from_path(Path::new(name)).unwrap_or(FileType::Text);
    let title = extract_title(file_type, text).unwrap_or_else(|| name.to_string());

    let mut document = Document::new(
        &format!("inline:{}", name),
        name,
        title,
        file_type,
        clean_text(file_type, text),
    )
    .with_metadata("line_count", line_count(text));
    document.size_bytes = text.len() as u64;

    Ok(document)
}

fn line_count(raw: &str) -> i64 {
    raw.lines().count() as i64
}

/// Known extension, or sniffed plain text for extension-less files.
fn detect_file_type(path: &Path) -> Option<FileType> {
    match path.extension() {
        Some(_) => FileType::from_path(path),
        None if sniff_text_file(path) => Some(FileType::Text),
        None => None,
    }
}

/// Strip markup when needed and normalize whitespace.
pub fn clean_text(file_type: FileType, raw: &str) -> String {
    if file_type.is_markup() {
        normalize_whitespace(&strip_markup(raw))
    } else {
        normalize_whitespace(raw)
    }
}

/// Reduce HTML/XML to its text content.
pub fn strip_markup(raw: &str) -> String {
    let text = SCRIPT_STYLE.replace_all(raw, " ");
    let text = BLOCK_TAG.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    decode_entities(&text)
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Title from the content itself: first Markdown heading or HTML `<title>`.
fn extract_title(file_type: FileType, raw: &str) -> Option<String> {
    let title = match file_type {
        FileType::Markdown => raw
            .lines()
            .find_map(|l| l.trim().strip_prefix("# "))
            .map(|t| t.trim().to_string()),
        FileType::Html => HTML_TITLE
            .captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| decode_entities(m.as_str().trim())),
        _ => None,
    };
    title.filter(|t| !t.is_empty())
}

//! Document sources and file type classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Supported document file types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    Text,
    Markdown,
    Json,
    Csv,
    Html,
    Xml,
    Yaml,
    Code,
}

impl FileType {
    /// Classify a path by its extension.
    ///
    /// Returns `None` for binary or unrecognised extensions and for paths
    /// without an extension; callers decide whether to sniff those.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        Self::from_extension(&ext)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let file_type = match ext {
            "txt" | "text" | "log" | "rst" | "adoc" | "org" => FileType::Text,
            "md" | "markdown" | "mdx" => FileType::Markdown,
            "json" | "jsonl" => FileType::Json,
            "csv" | "tsv" => FileType::Csv,
            "html" | "htm" | "xhtml" => FileType::Html,
            "xml" => FileType::Xml,
            "yaml" | "yml" | "toml" | "ini" | "cfg" | "conf" => FileType::Yaml,
            "rs" | "py" | "js" | "ts" | "jsx" | "tsx" | "go" | "java" | "kt" | "c" | "h"
            | "cpp" | "hpp" | "cs" | "rb" | "php" | "swift" | "scala" | "sh" | "sql" | "abap" => {
                FileType::Code
            }
            _ => return None,
        };
        Some(file_type)
    }

    /// Whether markup should be stripped before chunking.
    pub fn is_markup(self) -> bool {
        matches!(self, FileType::Html | FileType::Xml)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileType::Text => "text",
            FileType::Markdown => "markdown",
            FileType::Json => "json",
            FileType::Csv => "csv",
            FileType::Html => "html",
            FileType::Xml => "xml",
            FileType::Yaml => "yaml",
            FileType::Code => "code",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(FileType::Text),
            "markdown" | "md" => Ok(FileType::Markdown),
            "json" => Ok(FileType::Json),
            "csv" => Ok(FileType::Csv),
            "html" => Ok(FileType::Html),
            "xml" => Ok(FileType::Xml),
            "yaml" | "yml" => Ok(FileType::Yaml),
            "code" => Ok(FileType::Code),
            other => Err(format!("unknown file type: {}", other)),
        }
    }
}

/// Where document text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// A single file on disk.
    FilePath(PathBuf),
    /// A directory walked recursively.
    DirectoryPath(PathBuf),
    /// Text supplied directly by the caller, identified by `name`.
    InlineText { name: String, text: String },
}

impl DocumentSource {
    /// Build a file or directory source depending on what `path` points at.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            DocumentSource::DirectoryPath(path)
        } else {
            DocumentSource::FilePath(path)
        }
    }

    pub fn inline(name: impl Into<String>, text: impl Into<String>) -> Self {
        DocumentSource::InlineText {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Short description used in logs and error messages.
    pub fn describe(&self) -> String {
        match self {
            DocumentSource::FilePath(p) => format!("file {}", p.display()),
            DocumentSource::DirectoryPath(p) => format!("directory {}", p.display()),
            DocumentSource::InlineText { name, .. } => format!("inline text '{}'", name),
        }
    }
}

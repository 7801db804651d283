// Catalog Parser
// Reads the tab-separated catalog of aligner configurations

use crate::catalog::models::{ConfigEntry, Tool};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const FIELD_COUNT: usize = 6;

/// Errors raised while reading the catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("line {line}: expected {FIELD_COUNT} tab-separated fields, got {found}: {content}")]
    FieldCount {
        line: usize,
        found: usize,
        content: String,
    },

    #[error("line {line}: {message}")]
    UnknownTool { line: usize, message: String },

    #[error("line {line}: threads per process must be a non-negative integer, got \"{value}\"")]
    InvalidThreads { line: usize, value: String },

    #[error("line {line}: configuration name is empty")]
    EmptyName { line: usize },

    #[error("entry '{name}' uses {found}, but the catalog was established with {expected}")]
    ToolMismatch {
        name: String,
        expected: Tool,
        found: Tool,
    },

    #[error("catalog contains no configurations")]
    Empty,

    #[error("cannot read catalog \"{}\": {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Parsed catalog, in file order
#[derive(Debug, Clone)]
pub struct Catalog {
    pub entries: Vec<ConfigEntry>,
}

impl Catalog {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, CatalogError> {
        let mut entries = Vec::new();
        for (idx, raw) in content.lines().enumerate() {
            if let Some(entry) = parse_line(raw, idx + 1)? {
                entries.push(entry);
            }
        }
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        let catalog = Self { entries };
        catalog.tool()?;
        Ok(catalog)
    }

    /// The single tool every entry uses; the first entry establishes it
    pub fn tool(&self) -> Result<Tool, CatalogError> {
        let first = self.entries.first().ok_or(CatalogError::Empty)?;
        for entry in &self.entries[1..] {
            if entry.tool != first.tool {
                return Err(CatalogError::ToolMismatch {
                    name: entry.name.clone(),
                    expected: first.tool,
                    found: entry.tool,
                });
            }
        }
        Ok(first.tool)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConfigEntry> {
        self.entries.iter()
    }
}

fn parse_line(raw: &str, line: usize) -> Result<Option<ConfigEntry>, CatalogError> {
    let raw = raw.trim_end_matches('\r');
    if raw.trim().is_empty() || raw.starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = raw.split('\t').collect();
    if fields.len() >= 3 && fields[0] == "name" && fields[1] == "tool" && fields[2] == "branch" {
        return Ok(None);
    }
    if fields.len() != FIELD_COUNT {
        return Err(CatalogError::FieldCount {
            line,
            found: fields.len(),
            content: raw.to_string(),
        });
    }

    let name = fields[0].trim();
    if name.is_empty() {
        return Err(CatalogError::EmptyName { line });
    }
    let tool = fields[1]
        .trim()
        .parse::<Tool>()
        .map_err(|message| CatalogError::UnknownTool { line, message })?;
    let threads_per_process =
        fields[3]
            .trim()
            .parse::<u32>()
            .map_err(|_| CatalogError::InvalidThreads {
                line,
                value: fields[3].to_string(),
            })?;

    Ok(Some(ConfigEntry {
        name: name.to_string(),
        tool,
        branch: fields[2].trim().to_string(),
        threads_per_process,
        build_flags: fields[4].to_string(),
        aligner_args: fields[5].trim_end().to_string(),
    }))
}

//! # Parser Module
//!
//! @title Front-End Input Loading
//! @author Ramprasad
//!
//! This module loads the JSON documents produced by an external front-end
//! (a compiler AST export or an independent parser) and lowers each contract
//! into a [`ContractUnit`](crate::analysis::ContractUnit).
//!
//! ## Submodules
//!
//! - [`ast`] - Serde model of the front-end syntax tree
//! - [`dialect`] - Builtin recognition per source dialect
//! - `lower` - Validation and lowering into contract units
//!
//! ## Input Document
//!
//! ```json
//! { "path": "contracts/Vault.sol", "dialect": "solidity",
//!   "source_path": "Vault.sol", "contracts": [ ... ] }
//! ```

pub mod ast;
pub mod dialect;
mod lower;

pub use dialect::{CallShape, Capabilities, Dialect};
pub use lower::{lower_contract, MalformedInputError};

use crate::analysis::ContractUnit;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One front-end document as found on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceFile {
    /// Path of the original contract source (e.g. `contracts/Vault.sol`).
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub dialect: Dialect,

    /// Original source text, used for inline suppression annotations.
    #[serde(default)]
    pub source: Option<String>,

    /// Path to the original source text, relative to the JSON document.
    #[serde(default)]
    pub source_path: Option<String>,

    /// Contract nodes, kept raw so one bad contract cannot hide the others.
    #[serde(default)]
    pub contracts: Vec<serde_json::Value>,
}

/// Result of loading one front-end document.
#[derive(Debug)]
pub struct LoadedFile {
    /// File path reported in findings.
    pub path: String,

    pub dialect: Dialect,

    /// Original source text, when the document provided it.
    pub source: Option<String>,

    /// Lowered contracts in document order; malformed ones are kept as errors.
    pub units: Vec<std::result::Result<ContractUnit, MalformedInputError>>,
}

impl LoadedFile {
    /// Lowers a front-end document that has already been read into memory.
    ///
    /// Never fails: a document that is not valid JSON becomes a single
    /// [`MalformedInputError`] at path `$`.
    ///
    /// # Arguments
    ///
    /// * `fallback_path` - Path used when the document has no `path` field
    /// * `text` - Raw JSON text
    pub fn from_json(fallback_path: &str, text: &str) -> Self {
        let document: SourceFile = match serde_json::from_str(text) {
            Ok(doc) => doc,
            Err(e) => {
                return Self {
                    path: fallback_path.to_string(),
                    dialect: Dialect::default(),
                    source: None,
                    units: vec![Err(MalformedInputError {
                        file: fallback_path.to_string(),
                        contract: None,
                        path: "$".to_string(),
                        message: e.to_string(),
                    })],
                };
            }
        };

        Self::from_document(fallback_path, document)
    }

    /// Lowers an already deserialized document.
    pub fn from_document(fallback_path: &str, document: SourceFile) -> Self {
        let path = document
            .path
            .clone()
            .unwrap_or_else(|| fallback_path.to_string());

        let units = document
            .contracts
            .iter()
            .enumerate()
            .map(|(i, value)| lower_contract(&path, document.dialect, i, value))
            .collect();

        Self {
            path,
            dialect: document.dialect,
            source: document.source,
            units,
        }
    }

    /// Number of contracts in the document, malformed ones included.
    pub fn contract_count(&self) -> usize {
        self.units.len()
    }
}

/// Reads and lowers a front-end JSON document from disk.
///
/// When the document names a `source_path`, the original source text is
/// read as well so inline suppression annotations can be honored.
///
/// # Errors
///
/// Returns an error if the file cannot be read. Malformed content is not an
/// error; it is reported per contract in [`LoadedFile::units`].
pub fn parse_contract_file(path: &Path) -> Result<LoadedFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let display = display_path(path);

    let document: SourceFile = match serde_json::from_str(&text) {
        Ok(doc) => doc,
        Err(_) => return Ok(LoadedFile::from_json(&display, &text)),
    };

    let mut loaded = LoadedFile::from_document(&display, document.clone());
    if loaded.source.is_none() {
        if let Some(rel) = &document.source_path {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            match std::fs::read_to_string(base.join(rel)) {
                Ok(source) => loaded.source = Some(source),
                Err(e) => log::warn!("Cannot read source text {}: {}", rel, e),
            }
        }
    }

    Ok(loaded)
}

/// Collects front-end documents from files and directories.
///
/// Files given explicitly are always included. Directories are walked for
/// `*.json` files, skipping `target` and hidden directories. The result is
/// sorted so runs are reproducible.
///
/// # Errors
///
/// Returns an error if a path does not exist.
pub fn collect_input_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            anyhow::bail!("input path does not exist: {}", path.display());
        }

        let walker = WalkDir::new(path).into_iter().filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && e
                        .file_name()
                        .to_str()
                        .map(|n| n.starts_with('.') || n == "target")
                        .unwrap_or(false))
        });

        files.extend(
            walker
                .filter_map(|e| e.ok())
                .filter(|e| {
                    e.file_type().is_file()
                        && e.path().extension().map_or(false, |ext| ext == "json")
                })
                .map(|e| e.path().to_path_buf()),
        );
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Renders `path` relative to the current directory when possible.
pub fn display_path(path: &Path) -> String {
    let relative = std::env::current_dir()
        .ok()
        .and_then(|cwd| {
            let absolute = if path.is_absolute() {
                path.to_path_buf()
            } else {
                cwd.join(path)
            };
            pathdiff::diff_paths(absolute, cwd)
        })
        .unwrap_or_else(|| path.to_path_buf());

    relative.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const DOCUMENT: &str = r#"{
        "path": "contracts/Two.sol",
        "dialect": "solidity",
        "contracts": [
            { "name": "Good", "functions": [ { "name": "f", "body": [] } ] },
            { "name": "Bad", "functions": [ { "name": "g", "body": [ { "node": "continue" } ] } ] }
        ]
    }"#;

    #[test]
    fn test_malformed_contract_does_not_hide_others() {
        let loaded = LoadedFile::from_json("two.json", DOCUMENT);

        assert_eq!(loaded.path, "contracts/Two.sol");
        assert_eq!(loaded.contract_count(), 2);
        assert!(loaded.units[0].is_ok());
        let err = loaded.units[1].as_ref().unwrap_err();
        assert_eq!(err.path, "contracts[1].functions[0].body[0]");
    }

    #[test]
    fn test_invalid_json_is_one_malformed_unit() {
        let loaded = LoadedFile::from_json("broken.json", "{ not json");
        assert_eq!(loaded.units.len(), 1);
        assert_eq!(loaded.units[0].as_ref().unwrap_err().path, "$");
    }

    #[test]
    fn test_collect_skips_hidden_and_target() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::create_dir_all(dir.path().join(".cache")).unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        fs::write(dir.path().join("nested/b.json"), "{}").unwrap();
        fs::write(dir.path().join("nested/notes.txt"), "").unwrap();
        fs::write(dir.path().join("target/c.json"), "{}").unwrap();
        fs::write(dir.path().join(".cache/d.json"), "{}").unwrap();

        let files = collect_input_files(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_source_path_is_read_next_to_document() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Vault.sol"), "contract Vault {}\n").unwrap();
        fs::write(
            dir.path().join("vault.json"),
            r#"{ "path": "Vault.sol", "source_path": "Vault.sol", "contracts": [] }"#,
        )
        .unwrap();

        let loaded = parse_contract_file(&dir.path().join("vault.json")).unwrap();
        assert_eq!(loaded.source.as_deref(), Some("contract Vault {}\n"));
    }
}

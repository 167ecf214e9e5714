//! Test case loading
//!
//! Walks an input folder for `.yaml`, `.yml` and `.json` files in sorted
//! order, validates each against the pipeline, and assigns each case its id
//! (relative path without extension) and the SHA-256 of its raw bytes.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{TestCase, TestCaseFile, TestCaseValidator, ValidationError};

/// Fields the loader assigns; source files may not carry them
const RESERVED_FIELDS: [&str; 2] = ["testCaseId", "sha256"];

const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Test case loading errors, attributed to the offending file
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("In {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("In {path}: field \"{field}\" is assigned by the loader and may not appear in test case files")]
    ReservedField { path: PathBuf, field: String },

    #[error("In {path}: invalid test case\n{source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },
}

impl LoadError {
    pub fn path(&self) -> &Path {
        match self {
            LoadError::Io { path, .. }
            | LoadError::Walk { path, .. }
            | LoadError::Parse { path, .. }
            | LoadError::ReservedField { path, .. }
            | LoadError::Invalid { path, .. } => path,
        }
    }
}

/// Hex SHA-256 of raw bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Id of a test case file: relative path without extension, `/`-separated
pub fn test_case_id(folder: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(folder).unwrap_or(path);
    let relative = relative.with_extension("");
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Test case files under `folder`, in sorted walk order
pub fn test_case_files(folder: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(folder).sort_by_file_name() {
        let entry = entry.map_err(|source| LoadError::Walk {
            path: folder.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if matches {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Load and validate every test case under `folder`
pub fn load_test_cases(
    folder: impl AsRef<Path>,
    validator: &TestCaseValidator,
) -> Result<Vec<TestCase>, LoadError> {
    let folder = folder.as_ref();
    let files = test_case_files(folder)?;
    tracing::debug!(folder = %folder.display(), count = files.len(), "Found test case files");

    files
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
                path: path.clone(),
                source,
            })?;
            parse_test_case(folder, path, &bytes, validator)
        })
        .collect()
}

fn parse_test_case(
    folder: &Path,
    path: &Path,
    bytes: &[u8],
    validator: &TestCaseValidator,
) -> Result<TestCase, LoadError> {
    let parse_error = |message: String| LoadError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let document: Value = if is_json {
        serde_json::from_slice(bytes).map_err(|e| parse_error(e.to_string()))?
    } else {
        serde_yaml::from_slice(bytes).map_err(|e| parse_error(e.to_string()))?
    };

    if let Some(object) = document.as_object() {
        if let Some(field) = RESERVED_FIELDS.iter().find(|f| object.contains_key(**f)) {
            return Err(LoadError::ReservedField {
                path: path.to_path_buf(),
                field: field.to_string(),
            });
        }
    }

    validator
        .validate(&document)
        .map_err(|source| LoadError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;

    let file: TestCaseFile =
        serde_json::from_value(document).map_err(|e| parse_error(e.to_string()))?;

    Ok(TestCase {
        test_case_id: test_case_id(folder, path),
        sha256: sha256_hex(bytes),
        tags: file.tags,
        input: file.input,
        expected: file.expected,
    })
}

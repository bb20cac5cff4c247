//! Model registry: the list of models the user may pick from.
//!
//! The registry file is plain text, one model per line:
//!
//! ```text
//! # label | reference
//! Qwen 2.5 7B | ~/models/qwen2.5-7b-instruct
//! Llama 3.2   | bartowski/Llama-3.2-3B-Instruct-GGUF
//! Separator   | -
//! ```
//!
//! A reference of `-` is a placeholder entry that is listed but never loaded.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::RegistryError;

/// Reference value marking an entry with no model behind it.
pub const PLACEHOLDER_REFERENCE: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    label: String,
    reference: String,
}

impl ModelEntry {
    #[must_use]
    pub fn new(label: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            reference: reference.into(),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.reference == PLACEHOLDER_REFERENCE
    }
}

/// Ordered label → reference table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelRegistry {
    entries: Vec<ModelEntry>,
}

impl ModelRegistry {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::parse(&text)?;
        tracing::info!(
            path = %path.display(),
            models = registry.entries.len(),
            "loaded model registry"
        );
        Ok(registry)
    }

    pub fn parse(text: &str) -> Result<Self, RegistryError> {
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let malformed = || RegistryError::MalformedLine {
                line,
                content: trimmed.to_string(),
            };
            let (label, reference) = trimmed.split_once('|').ok_or_else(malformed)?;
            if reference.contains('|') {
                return Err(malformed());
            }
            let (label, reference) = (label.trim(), reference.trim());
            if label.is_empty() || reference.is_empty() {
                return Err(malformed());
            }
            if !seen.insert(label.to_string()) {
                return Err(RegistryError::DuplicateLabel {
                    line,
                    label: label.to_string(),
                });
            }
            entries.push(ModelEntry::new(label, reference));
        }

        if entries.is_empty() {
            return Err(RegistryError::Empty);
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, label: &str) -> Option<&ModelEntry> {
        self.entries.iter().find(|entry| entry.label == label)
    }

    #[must_use]
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(ModelEntry::label)
    }

    /// The first entry that names a real model.
    #[must_use]
    pub fn first_loadable(&self) -> Option<&ModelEntry> {
        self.entries.iter().find(|entry| !entry.is_placeholder())
    }
}

/// Where a reference points once home-directory shorthand is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Local(PathBuf),
    Hub(String),
}

/// Resolve a registry reference to a local path or a hub repository id.
///
/// `~` is expanded against the home directory; the expansion is used only
/// when the resulting path exists. Anything that is not an existing path is
/// treated as a hub repository id.
#[must_use]
pub fn resolve_reference(reference: &str) -> ModelSource {
    resolve_reference_with_home(reference, dirs::home_dir().as_deref())
}

fn resolve_reference_with_home(reference: &str, home: Option<&Path>) -> ModelSource {
    if let Some(expanded) = expand_home(reference, home)
        && expanded.exists()
    {
        return ModelSource::Local(expanded);
    }
    let path = Path::new(reference);
    if path.exists() {
        return ModelSource::Local(path.to_path_buf());
    }
    ModelSource::Hub(reference.to_string())
}

fn expand_home(reference: &str, home: Option<&Path>) -> Option<PathBuf> {
    let home = home?;
    if reference == "~" {
        return Some(home.to_path_buf());
    }
    let rest = reference.strip_prefix("~/")?;
    Some(home.join(rest))
}

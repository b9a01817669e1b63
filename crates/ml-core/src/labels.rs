use std::{fs, path::Path};

use anyhow::{Context, Result};

use crate::ModelError;

/// Labels of the deployed quantized classifier, in output order.
pub const DEFAULT_LABELS: [&str; 6] = ["deer", "frog", "human", "nothing", "orangutan", "tiger"];

/// Ordered class names; index `i` names output score `i`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelSet(Vec<String>);

impl LabelSet {
    pub fn new(labels: Vec<String>) -> Result<Self, ModelError> {
        if labels.is_empty() {
            return Err(ModelError::EmptyLabels);
        }
        if let Some(index) = labels.iter().position(|label| label.trim().is_empty()) {
            return Err(ModelError::BlankLabel(index));
        }
        Ok(Self(labels))
    }

    /// Parse a comma separated list such as `deer,frog,tiger`.
    pub fn parse_list(list: &str) -> Result<Self, ModelError> {
        Self::new(list.split(',').map(|label| label.trim().to_string()).collect())
    }

    /// One label per line; blank lines and `#` comments are skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read label file {}", path.display()))?;
        let labels = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self::new(labels).with_context(|| format!("invalid label file {}", path.display()))
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self(DEFAULT_LABELS.iter().map(|label| label.to_string()).collect())
    }
}

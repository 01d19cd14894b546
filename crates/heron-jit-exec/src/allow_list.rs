//! Exact-name allow-list oracle.
//!
//! One qualified name per line; blank lines and lines starting with `#` are
//! ignored. Pattern or wildcard semantics belong to richer external oracles.

use std::path::Path;

use rustc_hash::FxHashSet;

use crate::engine::EligibilityOracle;
use crate::error::ConfigError;
use crate::handle::JitFunction;

/// Set of qualified names permitted to be compiled.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    names: FxHashSet<String>,
}

impl AllowList {
    /// Create an empty list (nothing is eligible).
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse list contents.
    pub fn parse(contents: &str) -> Self {
        let names = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_owned)
            .collect();
        Self { names }
    }

    /// Read and parse a list file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let list = Self::parse(&contents);
        tracing::debug!(
            target: "heron::jit",
            path = %path.display(),
            entries = list.len(),
            "loaded jit allow-list"
        );
        Ok(list)
    }

    /// Add a qualified name.
    pub fn insert(&mut self, qualname: impl Into<String>) -> bool {
        self.names.insert(qualname.into())
    }

    /// Membership test by qualified name.
    pub fn contains(&self, qualname: &str) -> bool {
        self.names.contains(qualname)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Entries in sorted order.
    pub fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.iter().cloned().collect();
        names.sort();
        names
    }
}

impl FromIterator<String> for AllowList {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

impl EligibilityOracle for AllowList {
    fn is_eligible(&self, function: &JitFunction) -> bool {
        self.contains(function.qualname())
    }
}

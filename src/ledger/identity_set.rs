use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::snapshot::{read_json, write_json};
use crate::error::Result;

/// Persisted set of identity tokens, used as a cheap "already done" check.
///
/// The document is a JSON array in insertion order, replaced wholesale on
/// every insertion. Membership goes through an in-memory index.
#[derive(Debug)]
pub struct IdentitySet {
    path: PathBuf,
    tokens: Vec<String>,
    index: HashSet<String>,
}

impl IdentitySet {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut tokens: Vec<String> = read_json(&path)?.unwrap_or_default();

        let before = tokens.len();
        let mut index = HashSet::with_capacity(tokens.len());
        tokens.retain(|t| index.insert(t.clone()));
        if tokens.len() != before {
            debug!("Dropped {} duplicate tokens", before - tokens.len());
        }

        info!("Loaded {} identity tokens from {}", tokens.len(), path.display());
        Ok(Self {
            path,
            tokens,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.index.contains(token)
    }

    /// Tokens in the order they were first recorded.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Add `token` and persist. Returns false when it was already present.
    pub fn insert(&mut self, token: &str) -> Result<bool> {
        if self.contains(token) {
            return Ok(false);
        }

        self.tokens.push(token.to_string());
        if let Err(e) = write_json(&self.path, &self.tokens) {
            self.tokens.pop();
            return Err(e);
        }
        self.index.insert(token.to_string());
        Ok(true)
    }
}

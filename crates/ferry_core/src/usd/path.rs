//! Absolute hierarchical prim paths.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing a prim path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Prim path must be absolute: '{0}'")]
    NotAbsolute(String),

    #[error("Invalid prim name '{name}' in path '{path}'")]
    InvalidName { path: String, name: String },
}

/// An absolute prim path such as `/World/Cube`. The pseudo-root is `/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScenePath(String);

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ScenePath {
    /// The pseudo-root path `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parses and validates an absolute path. A trailing slash is tolerated.
    pub fn parse(text: &str) -> Result<Self, PathError> {
        let trimmed = text.trim();
        if !trimmed.starts_with('/') {
            return Err(PathError::NotAbsolute(text.to_string()));
        }
        let body = trimmed.trim_end_matches('/');
        if body.is_empty() {
            return Ok(Self::root());
        }
        for name in body[1..].split('/') {
            if !is_valid_name(name) {
                return Err(PathError::InvalidName {
                    path: text.to_string(),
                    name: name.to_string(),
                });
            }
        }
        Ok(Self(body.to_string()))
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path component; empty for the pseudo-root.
    pub fn name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => "",
        }
    }

    /// Parent path, or `None` for the pseudo-root.
    pub fn parent(&self) -> Option<ScenePath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Parent path, with the pseudo-root being its own parent.
    pub fn parent_or_root(&self) -> ScenePath {
        self.parent().unwrap_or_else(Self::root)
    }

    /// Appends a child name. The name is not validated.
    pub fn child(&self, name: &str) -> ScenePath {
        if self.is_root() {
            Self(format!("/{name}"))
        } else {
            Self(format!("{}/{name}", self.0))
        }
    }

    /// Path components from the top, excluding the pseudo-root.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Number of components; zero for the pseudo-root.
    pub fn depth(&self) -> usize {
        self.components().count()
    }

    /// True if `prefix` is this path or one of its ancestors.
    pub fn has_prefix(&self, prefix: &ScenePath) -> bool {
        if prefix.is_root() || prefix == self {
            return true;
        }
        self.0.len() > prefix.0.len()
            && self.0.starts_with(&prefix.0)
            && self.0.as_bytes()[prefix.0.len()] == b'/'
    }

    /// Replaces the `from` prefix of this path with `to`.
    pub fn replace_prefix(&self, from: &ScenePath, to: &ScenePath) -> Option<ScenePath> {
        if !self.has_prefix(from) {
            return None;
        }
        let rest: Vec<&str> = self.components().skip(from.depth()).collect();
        Some(rest.iter().fold(to.clone(), |path, name| path.child(name)))
    }

    /// This path followed by each ancestor up to and including `/`.
    pub fn ancestors(&self) -> impl Iterator<Item = ScenePath> {
        std::iter::successors(Some(self.clone()), |p| p.parent())
    }
}

impl fmt::Display for ScenePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ScenePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ScenePath::parse(&value)
    }
}

impl From<ScenePath> for String {
    fn from(path: ScenePath) -> Self {
        path.0
    }
}

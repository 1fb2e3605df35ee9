use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A remote location: a repository name plus zero or more name segments.
///
/// Rendered as dot-joined segments, e.g. `alice.public.base`. The sync
/// engine treats paths opaquely beyond serialization.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SharePath {
    pub repo_name: String,
    pub segments: Vec<String>,
}

impl SharePath {
    /// A path addressing the root of a repository.
    pub fn root(repo_name: impl Into<String>) -> Self {
        Self {
            repo_name: repo_name.into(),
            segments: Vec::new(),
        }
    }

    /// Extend the path with a child segment.
    pub fn child(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Parse from dot-joined form, e.g. `alice.public.base`.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let mut parts = s.split('.');
        let repo_name = match parts.next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(TypeError::InvalidPath("empty repository name".into())),
        };
        let mut segments = Vec::new();
        for part in parts {
            if part.is_empty() {
                return Err(TypeError::InvalidPath(format!("empty segment in {s:?}")));
            }
            segments.push(part.to_string());
        }
        Ok(Self {
            repo_name,
            segments,
        })
    }
}

impl fmt::Display for SharePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repo_name)?;
        for segment in &self.segments {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::jwt::HashJwt;

/// The kind of a non-causal entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    Namespace,
    Term,
    Type,
    Patch,
    Bytes,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Term => "term",
            Self::Type => "type",
            Self::Patch => "patch",
            Self::Bytes => "bytes",
        }
    }
}

/// A fully parsed entity payload, tagged by kind.
///
/// A causal carries the hash of its namespace snapshot plus the set of its
/// parent causals; every other kind carries its dependency references and an
/// opaque body (the store-level encoding is not interpreted here).
///
/// Dependency references are expressed as [`HashJwt`]s so that a freshly
/// downloaded entity carries fetch permission for everything it needs. The
/// set returned by [`Entity::dependencies`] is exactly the set of hashes
/// that must be present in the store before the entity may be written to
/// main storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entity {
    Causal {
        namespace: HashJwt,
        parents: BTreeSet<HashJwt>,
    },
    Object {
        kind: ObjectKind,
        deps: Vec<HashJwt>,
        body: Vec<u8>,
    },
}

impl Entity {
    /// Every dependency reference embedded in this entity.
    pub fn dependencies(&self) -> Vec<HashJwt> {
        match self {
            Self::Causal { namespace, parents } => {
                let mut deps = Vec::with_capacity(1 + parents.len());
                deps.push(namespace.clone());
                deps.extend(parents.iter().cloned());
                deps
            }
            Self::Object { deps, .. } => deps.clone(),
        }
    }

    /// The parent causals, if this entity is a causal.
    pub fn causal_parents(&self) -> Option<&BTreeSet<HashJwt>> {
        match self {
            Self::Causal { parents, .. } => Some(parents),
            Self::Object { .. } => None,
        }
    }

    pub fn is_causal(&self) -> bool {
        matches!(self, Self::Causal { .. })
    }

    /// Kind name for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Causal { .. } => "causal",
            Self::Object { kind, .. } => kind.as_str(),
        }
    }
}

use weft_types::Hash32;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The entity was expected in main or temp storage but is absent.
    #[error("entity not found: {0}")]
    EntityAbsent(Hash32),

    /// A temp row must record at least one missing dependency.
    #[error("temp entity {0} has an empty missing-dependency set")]
    EmptyMissingSet(Hash32),

    /// Attempted to write an entity to main before its dependencies.
    #[error("entity {entity} depends on {dependency}, which is not in main storage")]
    DependencyNotInMain { entity: Hash32, dependency: Hash32 },

    /// Failure in the underlying storage backend.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

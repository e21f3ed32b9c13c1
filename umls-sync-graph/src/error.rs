//! Error types for umls-sync-graph.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("failed to connect to the graph database: {0}")]
    Connection(String),

    #[error("{context}: {message}")]
    Query { context: String, message: String },

    #[error("APOC procedures are not available on the server ({0}); install the APOC plugin before syncing")]
    ApocMissing(String),

    #[error("cycle in MERGEDCUI merge mapping: {}", .0.join(" -> "))]
    MergeCycle(Vec<String>),

    #[error("graph is already at version {0}; pass --reapply to run the sync again")]
    VersionUnchanged(String),

    #[error("requested version {requested} is older than installed version {installed}")]
    VersionRegression { requested: String, installed: String },

    #[error("no UmlsMeta node found; run `full-import` and `init-meta` before `incremental-sync`")]
    MetaNodeMissing,

    #[error("stored meta version is not a valid release tag: {0}")]
    InvalidStoredVersion(String),

    #[error("sync cancelled")]
    Cancelled,

    #[error("bulk CSV write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    pub fn query(context: impl Into<String>, message: impl Into<String>) -> Self {
        GraphError::Query {
            context: context.into(),
            message: message.into(),
        }
    }
}

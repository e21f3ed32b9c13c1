//! Shared foundations for the umls-sync workspace.
//!
//! Everything the parser, graph, and CLI crates agree on lives here: the
//! snapshot record types exchanged between pipeline stages, the static
//! UMLS-to-Biolink mapping tables, the validated release-version type, the
//! typed runtime configuration, and the sync run report.

pub mod biolink;
pub mod cancel;
pub mod config;
pub mod model;
pub mod report;
pub mod version;

pub use cancel::CancelFlag;
pub use config::{ConfigError, EnvSource, GraphSettings, Settings, SuppressionHandling};
pub use model::{CodeRecord, ConceptEdge, ConceptRecord, HasCodeLink, MergePair, Snapshot};
pub use report::{PhaseTiming, SyncReport};
pub use version::{ReleaseVersion, VersionError};

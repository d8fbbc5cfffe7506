//! Card identification service.
//!
//! [`CardMatcher`] owns the embedding extractor and the currently loaded
//! [`IndexSnapshot`](cardvault_cardindex::IndexSnapshot). The snapshot is
//! obtained by the [`Provisioner`] state machine:
//!
//! ```text
//! START -> TRY_REMOTE -> LOADED
//!              |
//!              v
//!       TRY_LOCAL_ARTIFACT -> LOADED
//!              |
//!              v
//!           REBUILD -> LOADED
//!              |
//!              v
//!           FAILED
//! ```
//!
//! Queries read the snapshot through an `Arc` and never wait on
//! provisioning; a new snapshot replaces the old one in a single swap.

pub mod config;
pub mod error;
pub mod matcher;
pub mod provision;
pub mod store;


pub use config::{MatchConfig, RemoteConfig};
pub use error::{ConfigError, ProvisionError, QueryError, RemoteFetchError};
pub use matcher::{
    is_match, CandidateMatch, CardMatcher, MatchResult, ServiceStatus, SnapshotInfo, UNIT_NORM_TOLERANCE,
};
pub use provision::{ProvisionConfig, ProvisionState, Provisioned, Provisioner, SnapshotSource};
pub use store::{ArtifactStore, DirArtifactStore, HttpArtifactStore};

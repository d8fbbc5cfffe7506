pub mod artifact_io;
pub mod builder;
pub mod corpus;
pub mod error;
pub mod flat;
pub mod labels;
pub mod snapshot;

#[cfg(test)]
mod testutil;

pub use artifact_io::{load_artifact, save_artifact, ArtifactPaths, INDEX_FILE_NAME, LABELS_FILE_NAME};
pub use builder::{BuildItemError, BuildOutput, BuildReport, BuilderConfig, FailedItem, IndexBuilder};
pub use corpus::{Corpus, CorpusFailure, CorpusItem, ManifestCorpus, MemoryCorpus};
pub use error::{BuildError, IndexError};
pub use flat::{inner_product, FlatIndex, Hit, Metric};
pub use labels::{CardLabel, LabelTable};
pub use snapshot::{ArtifactMeta, IndexSnapshot};

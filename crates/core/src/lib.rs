//! Shared types, error taxonomy, and backend traits for the hierarchical
//! memory subsystem.
//!
//! Nothing in this crate performs I/O. It exists so that `memory-engine`
//! (the tiered store implementation) and `memory-session` (the concrete
//! session backends) can share a single vocabulary without depending on
//! each other.

pub mod config;
pub mod error;
pub mod fact;
pub mod message;
pub mod recall;
pub mod session;
pub mod traits;

pub use config::{ImportanceWeights, MemoryConfig, SummarizationMode};
pub use error::{CoreError, Result};
pub use fact::Fact;
pub use message::{Message, Metadata, Role, ScoredMessage};
pub use recall::{RecallOptions, SearchFilter, TimeRange};
pub use session::{SessionSnapshot, SNAPSHOT_VERSION};
pub use traits::{
    Deadline, EmbeddingProvider, FilterOp, MetadataFilter, SearchByTextOptions, SessionBackend,
    VectorDocument, VectorMatch, VectorStore,
};

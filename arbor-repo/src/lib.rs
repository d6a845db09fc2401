//! Repository, fetch protocol and format registry (spec.md §4.4-§4.5).

pub mod codec;
pub mod fetch_spec;
pub mod format;
pub mod repository;

pub use fetch_spec::FetchSpec;
pub use format::{
    default_prober_chain, Format, FormatRegistry, Knit1Format, Prober, ProberChain, RegistryProber,
    RichRootFormat,
};
pub use repository::{FetchStats, Repository, RepositoryStats, RevisionTree};

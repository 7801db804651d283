// Build Module
// Working-copy management and compilation of the aligner under test

pub mod resolver;
pub mod toolchain;

// Re-export key types
pub use resolver::{BuildAction, BuildResolver, ResolveSummary, ResolvedArtifact, ResolverOptions};
pub use toolchain::{is_commit_hash, BuildTool, Git, Make, ToolStatus, VersionControl};

// Catalog Module
// Configuration entries and the tab-separated catalog they are read from

pub mod models;
pub mod parser;

// Re-export key types
pub use models::{ConfigEntry, ScalingRegime, Tool, WorkerLayout};
pub use parser::{Catalog, CatalogError};

// Public modules
pub mod catalog;
pub mod defaults;
pub mod error;
pub mod interrupt;
pub mod layout;
pub mod passthrough;
pub mod patch;
pub mod pipeline;
pub mod preset;
pub mod toolchain;

// Internal modules - not part of public API
pub(crate) mod paths;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};

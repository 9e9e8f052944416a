//! Replace-based file editing.
//!
//! `edit` defines the wire-level descriptor and batch validation; `engine`
//! applies validated batches sequentially and assembles the result (diff,
//! edit count, content hash, preserved encoding).

pub mod edit;
pub mod engine;

pub use edit::EditDescriptor;
pub use engine::{EditEngine, EditResult};

pub mod error;
pub mod file;

// Public library API - the transport/tool-dispatch layer sitting on top of
// this crate should only ever need these types.
pub use error::FileGuardError;
pub use file::access::FileAccessManager;
pub use file::encoding::DetectedEncoding;
pub use file::ignore::IgnoreRuleEngine;
pub use file::modify::{EditDescriptor, EditEngine, EditResult};
pub use file::resolver::PathResolver;
pub use file::roots::{AccessRoot, AccessRootRegistry};

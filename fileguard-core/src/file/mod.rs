//! Sandboxed file system primitives.
//!
//! ## Architecture
//!
//! ### roots.rs
//! The registry of access roots. The first root is the implicit default;
//! mutation is rare and locked, reads are copy-on-write snapshots.
//!
//! ### resolver.rs
//! Turns untrusted path strings (relative, absolute, or `alias:/...`) into
//! canonical absolute paths and enforces that every result stays inside a
//! registered root. Everything that touches the disk resolves through here.
//!
//! ### ignore.rs
//! Gitignore-style rule parsing, caching, and matching. Listings and
//! searches consult it; files in ignored locations simply never surface.
//!
//! ### encoding.rs
//! BOM/content-based encoding detection plus encoding-aware read and write,
//! so edits preserve a file's original byte encoding.
//!
//! ### modify/
//! The replace-based edit engine: wire-format descriptors, batch validation,
//! sequential application, first-difference diffs, and dry-run preview.
//!
//! ### access.rs
//! The facade tying the pieces together for read/list/search consumers. It
//! owns the registry handle and the ignore cache as an injected context
//! rather than process-global state.

pub mod access;
pub mod encoding;
pub mod ignore;
pub mod modify;
pub mod resolver;
pub mod roots;

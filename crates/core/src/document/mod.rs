//! Document structure, pages, and security.
//!
//! This module contains:
//! - `pages` - page tree traversal and inherited attributes
//! - `selection` - page selection expressions
//! - `permissions` - /P bits and per-command requirements
//! - `security` - Standard Security Handler, revisions 2 to 6

pub mod pages;
pub mod permissions;
pub mod security;
pub mod selection;

pub use pages::{PageRef, page_count, page_refs};
pub use permissions::{Permission, Permissions, Requirement};
pub use security::{EncryptionState, Role};
pub use selection::{parse_selection, parse_selection_ordered};

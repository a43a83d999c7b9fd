//! Document model: objects, the cross-reference table and the context.
//!
//! - `objects` - PDF object types (Object, Dict, Stream, ObjRef)
//! - `xref` - cross-reference table entries
//! - `context` - the root document handle

pub mod context;
pub mod objects;
pub mod xref;

pub use context::Context;
pub use objects::{Dict, ObjRef, Object, Stream};
pub use xref::{XRefEntry, XRefTable};
